use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Local;
use log::{info, warn};

use crate::models::{Channel, Pass, Stage, StageRun};
use crate::pipeline::{ChannelFailure, DatasetError};
use crate::utils::format_elapsed;

/// Per-stage log file in the dataset's Log folder
#[derive(Debug)]
pub struct StageLog {
    path: PathBuf,
}

impl StageLog {
    /// Truncate the file and write its header line
    pub fn create(path: PathBuf, header: &str) -> io::Result<Self> {
        fs::write(&path, format!("{}\n", header))?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, line: &str) -> io::Result<()> {
        let mut file = self.append_handle()?;
        writeln!(file, "{}", line)
    }

    /// Handle for external tool output
    pub fn append_handle(&self) -> io::Result<File> {
        OpenOptions::new().append(true).open(&self.path)
    }
}

/// Executes stages for one dataset: log header, timing, per-channel
/// iteration and failure bookkeeping. The actual work is a closure.
pub struct StageRunner<'a> {
    dataset_id: &'a str,
    log_dir: &'a Path,
}

impl<'a> StageRunner<'a> {
    pub fn new(dataset_id: &'a str, log_dir: &'a Path) -> Self {
        Self { dataset_id, log_dir }
    }

    fn open_log(&self, stage: Stage, pass: Pass) -> Result<StageLog, DatasetError> {
        let path = self.log_dir.join(pass.log_file_name(stage));
        let title = match pass {
            Pass::Main => stage.title().to_string(),
            Pass::Debug => format!("{} projections", stage.title()),
        };
        let header = format!(
            "{} log | dataset {} | started {}",
            title,
            self.dataset_id,
            Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        StageLog::create(path.clone(), &header).map_err(|source| DatasetError::ConfigWrite { path, source })
    }

    /// Run `work` once per unit, one channel at a time.
    /// A failing unit is logged and recorded; the remaining units still run.
    pub fn per_channel<T, F>(
        &self,
        stage: Stage,
        pass: Pass,
        units: Vec<(Channel, T)>,
        mut work: F,
    ) -> Result<StageRun, DatasetError>
    where
        F: FnMut(Channel, T, &StageLog) -> Result<(), ChannelFailure>,
    {
        let log = self.open_log(stage, pass)?;
        let started = Local::now();
        let clock = Instant::now();
        info!(
            "[{}] {}{}: {} unit(s)",
            self.dataset_id,
            stage,
            debug_suffix(pass),
            units.len()
        );

        let mut failed = Vec::new();
        for (channel, unit) in units {
            if let Err(failure) = work(channel, unit, &log) {
                warn!("[{}] {}{}: {}", self.dataset_id, stage, debug_suffix(pass), failure);
                self.note(&log, &format!("FAILED {}", failure));
                if !failed.contains(&channel) {
                    failed.push(channel);
                }
            }
        }

        self.finish(stage, pass, log, started, clock, failed)
    }

    /// Run a stage that is invoked once for the whole dataset.
    /// Any error from `work` is returned after being written to the stage log.
    pub fn aggregate<F>(&self, stage: Stage, pass: Pass, work: F) -> Result<StageRun, DatasetError>
    where
        F: FnOnce(&StageLog) -> Result<(), DatasetError>,
    {
        let log = self.open_log(stage, pass)?;
        let started = Local::now();
        let clock = Instant::now();
        info!("[{}] {}{}", self.dataset_id, stage, debug_suffix(pass));

        if let Err(err) = work(&log) {
            self.note(&log, &format!("FAILED {}", err));
            self.note(&log, &format!("Elapsed: {}", format_elapsed(clock.elapsed())));
            return Err(err);
        }

        self.finish(stage, pass, log, started, clock, Vec::new())
    }

    fn finish(
        &self,
        stage: Stage,
        pass: Pass,
        log: StageLog,
        started: chrono::DateTime<Local>,
        clock: Instant,
        failed: Vec<Channel>,
    ) -> Result<StageRun, DatasetError> {
        let elapsed = clock.elapsed();
        log.append(&format!("Elapsed: {}", format_elapsed(elapsed)))
            .map_err(|source| DatasetError::ConfigWrite {
                path: log.path().to_path_buf(),
                source,
            })?;
        info!(
            "[{}] {}{} finished in {}",
            self.dataset_id,
            stage,
            debug_suffix(pass),
            format_elapsed(elapsed)
        );

        Ok(StageRun {
            stage,
            pass,
            started,
            elapsed,
            log_path: log.path,
            failed,
        })
    }

    fn note(&self, log: &StageLog, line: &str) {
        if let Err(e) = log.append(line) {
            warn!("[{}] could not write to {}: {}", self.dataset_id, log.path().display(), e);
        }
    }
}

fn debug_suffix(pass: Pass) -> &'static str {
    match pass {
        Pass::Main => "",
        Pass::Debug => " (debug projections)",
    }
}
