use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Local};

use crate::models::Channel;

/// Processing stage of the pipeline, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Copy,
    BackgroundSubtraction,
    Curvelet,
    RescaleFloat,
    Rescale8Bit,
    Segmentation,
    Tracing,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Copy,
        Stage::BackgroundSubtraction,
        Stage::Curvelet,
        Stage::RescaleFloat,
        Stage::Rescale8Bit,
        Stage::Segmentation,
        Stage::Tracing,
    ];

    /// Name used for log files and configuration keys
    pub fn key(&self) -> &'static str {
        match self {
            Stage::Copy => "copy",
            Stage::BackgroundSubtraction => "background",
            Stage::Curvelet => "curvelet",
            Stage::RescaleFloat => "rescale",
            Stage::Rescale8Bit => "rescale_bit",
            Stage::Segmentation => "segmentation",
            Stage::Tracing => "tracing",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Stage::Copy => "Copy",
            Stage::BackgroundSubtraction => "Background subtraction",
            Stage::Curvelet => "Curvelets",
            Stage::RescaleFloat => "Rescale",
            Stage::Rescale8Bit => "Rescale 8-bit",
            Stage::Segmentation => "Segmentation",
            Stage::Tracing => "Tracing",
        }
    }

    /// Aggregate stages run once per dataset instead of once per channel.
    /// Their failure abandons the dataset.
    pub fn is_aggregate(&self) -> bool {
        matches!(self, Stage::Segmentation | Stage::Tracing)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// Main run of a stage or its debug-projection pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    Main,
    Debug,
}

impl Pass {
    pub fn log_file_name(&self, stage: Stage) -> String {
        match self {
            Pass::Main => format!("{}.log", stage.key()),
            Pass::Debug => format!("{}_db.log", stage.key()),
        }
    }
}

/// Progress of one dataset through the pipeline.
/// A disabled stage still moves the dataset to its state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DatasetState {
    Init,
    FoldersReady,
    Copied,
    BackgroundSubtracted,
    CurveletApplied,
    RescaledFloat,
    Rescaled8Bit,
    Segmented,
    TempSegmCleaned,
    Traced,
    TempTracCleaned,
    Done,
    Failed,
}

impl DatasetState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DatasetState::Done | DatasetState::Failed)
    }

    pub fn label(&self) -> &'static str {
        match self {
            DatasetState::Init => "INIT",
            DatasetState::FoldersReady => "FOLDERS_READY",
            DatasetState::Copied => "COPIED",
            DatasetState::BackgroundSubtracted => "BACKGROUND_SUBTRACTED",
            DatasetState::CurveletApplied => "CURVELET_APPLIED",
            DatasetState::RescaledFloat => "RESCALED_FLOAT",
            DatasetState::Rescaled8Bit => "RESCALED_8BIT",
            DatasetState::Segmented => "SEGMENTED",
            DatasetState::TempSegmCleaned => "TEMP_SEGM_CLEANED",
            DatasetState::Traced => "TRACED",
            DatasetState::TempTracCleaned => "TEMP_TRAC_CLEANED",
            DatasetState::Done => "DONE",
            DatasetState::Failed => "FAILED",
        }
    }
}

impl fmt::Display for DatasetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Record of one stage execution, dropped once it has been logged
#[derive(Debug)]
pub struct StageRun {
    pub stage: Stage,
    pub pass: Pass,
    pub started: DateTime<Local>,
    pub elapsed: Duration,
    pub log_path: PathBuf,
    /// Channels whose invocation failed during a per-channel stage
    pub failed: Vec<Channel>,
}

impl StageRun {
    pub fn succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}
