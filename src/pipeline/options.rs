use std::fs;
use std::path::Path;

use crate::config::{SegmentationSettings, TracingSettings};
use crate::models::{Channel, DatasetPaths};
use crate::pipeline::DatasetError;

/// Ordered `-flag value` directives handed to an external tool.
/// Lines are written in insertion order; no quoting or escaping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageOptions {
    entries: Vec<(String, String)>,
}

impl StageOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, flag: &str, value: impl ToString) -> &mut Self {
        self.entries.push((flag.to_string(), value.to_string()));
        self
    }

    /// Path values must already be absolute; nothing is resolved here
    pub fn push_path(&mut self, flag: &str, path: &Path) -> &mut Self {
        self.push(flag, path.display())
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn get(&self, flag: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(f, _)| f == flag)
            .map(|(_, v)| v.as_str())
    }

    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|(flag, value)| format!("-{} {}\n", flag, value))
            .collect()
    }

    /// Write the options file, replacing any previous one
    pub fn write(&self, path: &Path) -> Result<(), DatasetError> {
        fs::write(path, self.render()).map_err(|source| DatasetError::ConfigWrite {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn small_flag(small: bool) -> &'static str {
    if small {
        "1"
    } else {
        "0"
    }
}

/// Options for the segmentation tool.
/// `images` holds one 8-bit artifact per active channel, in channel order.
pub fn segmentation_options(
    settings: &SegmentationSettings,
    paths: &DatasetPaths,
    images: &[(Channel, String)],
) -> StageOptions {
    let mut options = StageOptions::new();
    options
        .push("xTile", settings.tile.x)
        .push("yTile", settings.tile.y)
        .push("zTile", settings.tile.z)
        .push("xTileBor", settings.border.x)
        .push("yTileBor", settings.border.y)
        .push("zTileBor", settings.border.z)
        .push("num_threads", settings.threads);
    for (channel, image) in images {
        options.push(channel.option_flag(), image);
    }
    options
        .push("isSmall", small_flag(settings.small_image))
        .push_path("segParams", &paths.parameter("Seg_Params.ini"))
        .push_path("projectDefinition", &paths.parameter("ProjectDefinition.xml"))
        .push_path("optionsMNT", &paths.parameter("options_mnt"))
        .push_path("outPath", &paths.segm)
        .push_path("outPathDebug", &paths.segm_debug)
        .push_path("outPathDebugLevel2", &paths.segm_debug_l2)
        .push_path("outPathTemp", &paths.segm_temp);
    options
}

/// Options for the tracing tool.
/// `soma_source` is the GFP 8-bit artifact whose soma montage and centroid
/// table segmentation left next to it; omitted when GFP is inactive.
pub fn tracing_options(
    settings: &TracingSettings,
    paths: &DatasetPaths,
    images: &[(Channel, String)],
    soma_source: Option<&str>,
) -> StageOptions {
    let mut options = StageOptions::new();
    options
        .push("xTile", settings.tile.x)
        .push("yTile", settings.tile.y)
        .push("zTile", settings.tile.z)
        .push("num_threads", settings.threads);
    for (channel, image) in images {
        options.push(channel.option_flag(), image);
    }
    if let Some(soma) = soma_source {
        options
            .push("Soma_Centroids", format!("{}_soma_table_centroids.txt", soma))
            .push("Soma_Montage", format!("{}_soma", soma));
    }
    options
        .push("isSmall", small_flag(settings.small_image))
        .push_path("traceParams", &paths.parameter("options_mnt"))
        .push_path("outPath", &paths.trace_results)
        .push_path("outPathDebug", &paths.trace_debug)
        .push_path("outPathDebugLevel2", &paths.trace_debug_l2)
        .push_path("outPathTemp", &paths.trace_temp);
    options
}
