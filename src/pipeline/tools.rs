use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use log::debug;

use crate::config::ToolSettings;
use crate::pipeline::StageLog;

/// External executables the pipeline drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    BackgroundSubtraction,
    Curvelets,
    Rescale,
    Rescale8Bit,
    Rescale8BitMhd,
    Projection,
    Projection8Bit,
    ProjectionRgb,
    ProjectionFloat,
    Segmentation,
    Tracing,
}

impl Tool {
    pub const ALL: [Tool; 11] = [
        Tool::BackgroundSubtraction,
        Tool::Curvelets,
        Tool::Rescale,
        Tool::Rescale8Bit,
        Tool::Rescale8BitMhd,
        Tool::Projection,
        Tool::Projection8Bit,
        Tool::ProjectionRgb,
        Tool::ProjectionFloat,
        Tool::Segmentation,
        Tool::Tracing,
    ];

    /// Configuration key, also the default executable name
    pub fn key(&self) -> &'static str {
        match self {
            Tool::BackgroundSubtraction => "background_subtraction",
            Tool::Curvelets => "curvelets",
            Tool::Rescale => "rescale",
            Tool::Rescale8Bit => "rescale_8bit",
            Tool::Rescale8BitMhd => "rescale_8bit_mhd",
            Tool::Projection => "projection",
            Tool::Projection8Bit => "projection_8bit",
            Tool::ProjectionRgb => "projection_rgb",
            Tool::ProjectionFloat => "projection_float",
            Tool::Segmentation => "segmentation",
            Tool::Tracing => "tracing",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A fully resolved external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub tool: Tool,
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl ToolInvocation {
    pub fn new(tool: Tool, settings: &ToolSettings) -> Self {
        Self {
            tool,
            program: settings.executable(tool),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        let arg = path.to_string_lossy().into_owned();
        self.arg(arg)
    }
}

impl fmt::Display for ToolInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Exit status of an external tool.
/// `code` is `None` when the process was terminated by a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolExit {
    pub code: Option<i32>,
}

impl ToolExit {
    pub const SUCCESS: ToolExit = ToolExit { code: Some(0) };

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl fmt::Display for ToolExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {}", code),
            None => f.write_str("termination by signal"),
        }
    }
}

/// Seam between the orchestrator and the external executables.
/// `run` blocks until the tool exits.
pub trait ToolRunner {
    fn run(&mut self, invocation: &ToolInvocation, log: &StageLog) -> io::Result<ToolExit>;
}

/// Runs tools as child processes, appending their output to the stage log
#[derive(Debug, Default)]
pub struct ProcessRunner;

impl ToolRunner for ProcessRunner {
    fn run(&mut self, invocation: &ToolInvocation, log: &StageLog) -> io::Result<ToolExit> {
        debug!("Running {}", invocation);
        let stdout = log.append_handle()?;
        let stderr = stdout.try_clone()?;

        let status = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .status()?;

        Ok(ToolExit { code: status.code() })
    }
}
