// Batch configuration: file lookup, parsing and validation

pub mod loader;
pub mod settings;

pub use loader::*;
pub use settings::*;

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No configuration file found (looked in {0})")]
    NotFound(String),
    #[error("Failed to read configuration file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid configuration file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("The work list is empty; add at least one [[datasets]] entry")]
    EmptyWorkList,
    #[error("Dataset '{0}' appears more than once in the work list")]
    DuplicateDataset(String),
    #[error("Invalid dataset '{id}': {reason}")]
    InvalidDataset { id: String, reason: String },
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("Unknown tool '{name}' in [tools.executables]{}", did_you_mean(.suggestion))]
    UnknownTool {
        name: String,
        suggestion: Option<String>,
    },
}

fn did_you_mean(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(s) => format!("\n  Did you mean '{}'?", s),
        None => String::new(),
    }
}
