use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::models::Channel;

/// Suffix a stage appends to the name of the artifact it consumes.
/// Declaration order is the order tags may be applied to one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StageTag {
    BackgroundSubtracted,
    Curvelet,
    RescaledFloat,
    Rescaled8Bit,
}

impl StageTag {
    pub fn suffix(&self) -> &'static str {
        match self {
            StageTag::BackgroundSubtracted => "_BS",
            StageTag::Curvelet => "_CV",
            StageTag::RescaledFloat => "_RE",
            StageTag::Rescaled8Bit => "_RE_bit",
        }
    }

    /// Branch tags fork off the trunk without moving it: both rescales read
    /// the same denoised artifact.
    pub fn is_branch(&self) -> bool {
        matches!(self, StageTag::RescaledFloat | StageTag::Rescaled8Bit)
    }
}

impl fmt::Display for StageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Name of the artifact `tag` produces from `base`
pub fn derive(base: &str, tag: StageTag) -> String {
    format!("{}{}", base, tag.suffix())
}

/// On-disk file of an artifact name (names carry no extension)
pub fn artifact_file(name: &str, extension: &str) -> PathBuf {
    PathBuf::from(format!("{}.{}", name, extension))
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LineageError {
    #[error("{channel}: stage tag {tag} was already applied")]
    AlreadyApplied { channel: Channel, tag: StageTag },
    #[error("{channel}: stage tag {tag} does not apply to this channel")]
    NotApplicable { channel: Channel, tag: StageTag },
    #[error("{channel}: stage tag {tag} cannot follow {after}")]
    OutOfOrder { channel: Channel, tag: StageTag, after: StageTag },
    #[error("{channel}: {tag} is a branch tag and cannot advance the trunk")]
    BranchOnTrunk { channel: Channel, tag: StageTag },
    #[error("{channel}: {tag} is a trunk tag and cannot start a branch")]
    TrunkAsBranch { channel: Channel, tag: StageTag },
}

/// Artifact names of one channel through a dataset run.
///
/// The trunk is the raw image followed by background subtraction and, for
/// channels that receive it, curvelet denoising. Rescaled artifacts branch
/// off whatever the trunk is when they are derived. Every derived name is
/// kept in application order so the chain can be audited after the run.
#[derive(Debug, Clone)]
pub struct ArtifactLineage {
    channel: Channel,
    raw: String,
    derived: Vec<(StageTag, String)>,
}

impl ArtifactLineage {
    pub fn new(channel: Channel, raw: impl Into<String>) -> Self {
        Self {
            channel,
            raw: raw.into(),
            derived: Vec::new(),
        }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Latest trunk artifact: the input of the next trunk or branch stage
    pub fn current(&self) -> &str {
        self.derived
            .iter()
            .rev()
            .find(|(tag, _)| !tag.is_branch())
            .map(|(_, name)| name.as_str())
            .unwrap_or(&self.raw)
    }

    /// Tags applied so far, in order
    pub fn history(&self) -> Vec<StageTag> {
        self.derived.iter().map(|(tag, _)| *tag).collect()
    }

    pub fn artifact(&self, tag: StageTag) -> Option<&str> {
        self.derived
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, name)| name.as_str())
    }

    /// Apply a trunk tag and return the new current artifact name
    pub fn advance(&mut self, tag: StageTag) -> Result<&str, LineageError> {
        let channel = self.channel;
        if tag.is_branch() {
            return Err(LineageError::BranchOnTrunk { channel, tag });
        }
        if tag == StageTag::Curvelet && !channel.receives_curvelet() {
            return Err(LineageError::NotApplicable { channel, tag });
        }
        self.check_fresh(tag)?;
        if let Some((after, _)) = self.derived.last() {
            if *after > tag || after.is_branch() {
                return Err(LineageError::OutOfOrder { channel, tag, after: *after });
            }
        }

        let name = derive(self.current(), tag);
        self.derived.push((tag, name));
        Ok(self.current())
    }

    /// Derive a branch artifact from the current trunk and return its name
    pub fn branch(&mut self, tag: StageTag) -> Result<&str, LineageError> {
        if !tag.is_branch() {
            return Err(LineageError::TrunkAsBranch { channel: self.channel, tag });
        }
        self.check_fresh(tag)?;

        let name = derive(self.current(), tag);
        self.derived.push((tag, name));
        Ok(&self.derived[self.derived.len() - 1].1)
    }

    fn check_fresh(&self, tag: StageTag) -> Result<(), LineageError> {
        if self.artifact(tag).is_some() {
            Err(LineageError::AlreadyApplied { channel: self.channel, tag })
        } else {
            Ok(())
        }
    }
}
