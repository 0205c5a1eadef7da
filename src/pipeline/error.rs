use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::models::{Channel, LineageError, Stage};
use crate::pipeline::{Tool, ToolExit};

/// Recoverable failure of one channel within a per-channel stage.
/// The channel is dropped for the rest of the dataset; siblings carry on.
#[derive(Debug, Error)]
pub enum ChannelFailure {
    #[error("{channel}: input {} is missing or empty", .path.display())]
    MissingInput { channel: Channel, path: PathBuf },
    #[error("{channel}: {tool} did not produce {}", .path.display())]
    MissingOutput {
        channel: Channel,
        tool: Tool,
        path: PathBuf,
    },
    #[error("{channel}: {tool} failed with {exit}")]
    ToolFailed {
        channel: Channel,
        tool: Tool,
        exit: ToolExit,
    },
    #[error("{channel}: could not launch {tool}: {source}")]
    Launch {
        channel: Channel,
        tool: Tool,
        #[source]
        source: io::Error,
    },
    #[error("{channel}: failed to copy {} to {}: {source}", .from.display(), .to.display())]
    Copy {
        channel: Channel,
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ChannelFailure {
    pub fn channel(&self) -> Channel {
        match self {
            ChannelFailure::MissingInput { channel, .. }
            | ChannelFailure::MissingOutput { channel, .. }
            | ChannelFailure::ToolFailed { channel, .. }
            | ChannelFailure::Launch { channel, .. }
            | ChannelFailure::Copy { channel, .. } => *channel,
        }
    }
}

/// Failure that abandons the remaining stages of a dataset
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to create folder {}", .path.display())]
    Bootstrap {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {}", .path.display())]
    ConfigWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{stage} failed: {tool} exited with {exit}")]
    AggregateStage {
        stage: Stage,
        tool: Tool,
        exit: ToolExit,
    },
    #[error("{stage} failed: could not launch {tool}")]
    AggregateLaunch {
        stage: Stage,
        tool: Tool,
        #[source]
        source: io::Error,
    },
    #[error("failed to remove temp directory {}", .path.display())]
    Cleanup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Lineage(#[from] LineageError),
}

/// Render an error followed by its causes, `outer: cause: root`
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_chain_includes_cause() {
        let err = DatasetError::Cleanup {
            path: PathBuf::from("/d/Segm/Temp"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "permission denied"),
        };
        assert_eq!(
            error_chain(&err),
            "failed to remove temp directory /d/Segm/Temp: permission denied"
        );
    }

    #[test]
    fn test_failure_channel() {
        let failure = ChannelFailure::MissingInput {
            channel: Channel::Dapi,
            path: PathBuf::from("/d/Data/x_DAPIdsu.nrrd"),
        };
        assert_eq!(failure.channel(), Channel::Dapi);
        assert_eq!(failure.to_string(), "DAPI: input /d/Data/x_DAPIdsu.nrrd is missing or empty");
    }
}
