use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer};

use crate::models::StageTag;

/// Fluorescence channel of a mosaic.
/// The set is closed: every dataset carries at most these four images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Channel {
    Cy5,
    Tritc,
    Gfp,
    Dapi,
}

impl Channel {
    /// Fixed processing order, also the order channel lines appear in options files
    pub const ALL: [Channel; 4] = [Channel::Cy5, Channel::Tritc, Channel::Gfp, Channel::Dapi];

    pub fn name(&self) -> &'static str {
        match self {
            Channel::Cy5 => "Cy5",
            Channel::Tritc => "TRITC",
            Channel::Gfp => "GFP",
            Channel::Dapi => "DAPI",
        }
    }

    /// Marker the acquisition software puts at the end of the raw file stem
    /// (e.g. `slide3_GFPdsu.nrrd`).
    pub fn source_marker(&self) -> &'static str {
        match self {
            Channel::Cy5 => "Cy5dsu",
            Channel::Tritc => "TRITCdsu",
            Channel::Gfp => "GFPdsu",
            Channel::Dapi => "DAPIdsu",
        }
    }

    /// Glob-style pattern of the raw source file, for display
    pub fn source_pattern(&self, extension: &str) -> String {
        format!("*{}.{}", self.source_marker(), extension)
    }

    /// True when `file_name` is this channel's raw image
    pub fn matches_source(&self, file_name: &str, extension: &str) -> bool {
        file_name
            .strip_suffix(extension)
            .and_then(|rest| rest.strip_suffix('.'))
            .map(|stem| stem.ends_with(self.source_marker()))
            .unwrap_or(false)
    }

    /// Flag naming this channel's image in segmentation and tracing options
    pub fn option_flag(&self) -> &'static str {
        match self {
            Channel::Cy5 => "Cy5_Image",
            Channel::Tritc => "TRI_Image",
            Channel::Gfp => "GFP_Image",
            Channel::Dapi => "DAP_Image",
        }
    }

    /// Whether the channel goes through curvelet denoising.
    /// Only the GFP (neuron) channel is denoised; everything downstream of
    /// background subtraction branches off the curvelet artifact for it.
    pub fn receives_curvelet(&self) -> bool {
        matches!(self, Channel::Gfp)
    }

    /// Whether the 8-bit rescale also exports an MHD copy
    pub fn exports_mhd(&self) -> bool {
        self.receives_curvelet()
    }

    /// Artifact handed to the segmentation tool
    pub fn segmentation_input(&self) -> StageTag {
        StageTag::Rescaled8Bit
    }

    /// Artifact handed to the tracing tool.
    /// Tracing works on float intensities of the denoised channel.
    pub fn tracing_input(&self) -> StageTag {
        if self.receives_curvelet() {
            StageTag::RescaledFloat
        } else {
            StageTag::Rescaled8Bit
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cy5" => Ok(Channel::Cy5),
            "tritc" => Ok(Channel::Tritc),
            "gfp" => Ok(Channel::Gfp),
            "dapi" => Ok(Channel::Dapi),
            _ => Err(format!(
                "Invalid channel: '{}'. Expected one of Cy5, TRITC, GFP, DAPI.",
                s
            )),
        }
    }
}

impl<'de> Deserialize<'de> for Channel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
