use std::path::{Path, PathBuf};

use crate::models::Channel;

/// One mosaic in the work list.
/// Built once from configuration and never changed during its run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    pub id: String,
    /// Local working root, `<data_root>/<id>`
    pub local_root: PathBuf,
    /// Folder holding the raw channel images
    pub source_root: PathBuf,
    /// Shared parameter folder synced into `Parameters`
    pub params_source: PathBuf,
    /// Where results are delivered
    pub results_dest: PathBuf,
    /// Channels the operator asked for on this dataset
    pub requested: Vec<Channel>,
}

impl Dataset {
    pub fn requests(&self, channel: Channel) -> bool {
        self.requested.contains(&channel)
    }

    pub fn paths(&self) -> DatasetPaths {
        DatasetPaths::new(&self.local_root)
    }
}

/// Fixed folder layout under a dataset root.
/// External tools locate their inputs and outputs by these names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetPaths {
    pub root: PathBuf,
    pub parameters: PathBuf,
    pub exe: PathBuf,
    pub log: PathBuf,
    pub debug: PathBuf,
    pub data: PathBuf,
    pub data_debug: PathBuf,
    pub segm: PathBuf,
    pub segm_debug: PathBuf,
    pub segm_debug_l2: PathBuf,
    pub segm_temp: PathBuf,
    pub trace: PathBuf,
    pub trace_results: PathBuf,
    pub trace_debug: PathBuf,
    pub trace_debug_l2: PathBuf,
    pub trace_temp: PathBuf,
}

impl DatasetPaths {
    pub fn new(root: &Path) -> Self {
        let debug = root.join("Debug");
        let segm = root.join("Segm");
        let segm_debug = debug.join("Segm");
        let trace = root.join("Trace");
        let trace_debug = debug.join("Trace");

        Self {
            root: root.to_path_buf(),
            parameters: root.join("Parameters"),
            exe: root.join("Exe"),
            log: root.join("Log"),
            data: root.join("Data"),
            data_debug: debug.join("Data"),
            segm_debug_l2: segm_debug.join("Level2"),
            segm_temp: segm.join("Temp"),
            trace_results: trace.join("Results"),
            trace_debug_l2: trace_debug.join("Level2"),
            trace_temp: trace.join("Temp"),
            debug,
            segm,
            segm_debug,
            trace,
            trace_debug,
        }
    }

    /// Every folder of the layout, parents before children
    pub fn folders(&self) -> Vec<&Path> {
        vec![
            &self.root,
            &self.parameters,
            &self.exe,
            &self.log,
            &self.debug,
            &self.data,
            &self.data_debug,
            &self.segm,
            &self.segm_debug,
            &self.segm_debug_l2,
            &self.segm_temp,
            &self.trace,
            &self.trace_results,
            &self.trace_debug,
            &self.trace_debug_l2,
            &self.trace_temp,
        ]
        .into_iter()
        .map(PathBuf::as_path)
        .collect()
    }

    pub fn segmentation_options(&self) -> PathBuf {
        self.segm.join("options_segmentation")
    }

    pub fn tracing_options(&self) -> PathBuf {
        self.trace.join("options_tracing")
    }

    pub fn parameter(&self, name: &str) -> PathBuf {
        self.parameters.join(name)
    }
}
