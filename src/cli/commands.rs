use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use crate::cli::output::{format_outcomes, format_work_list};
use crate::config::ConfigLoader;
use crate::pipeline::{PipelineDriver, ProcessRunner};
use crate::utils::init_logging;

#[derive(Parser)]
#[command(name = "mosaic")]
#[command(about = "Batch orchestrator for multi-stage microscopy mosaic processing")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Process every dataset in the work list
    Run {
        /// Configuration file (defaults to $MOSAIC_PIPELINE_CONFIG, then ~/.mosaic-pipeline/pipeline.toml)
        #[arg(short = 'c', long)]
        config: Option<PathBuf>,
        /// Also write the batch log to this file
        #[arg(long = "log-file", value_name = "PATH")]
        log_file: Option<PathBuf>,
    },
    /// Validate the configuration and show the work list without running anything
    Check {
        /// Configuration file (defaults to $MOSAIC_PIPELINE_CONFIG, then ~/.mosaic-pipeline/pipeline.toml)
        #[arg(short = 'c', long)]
        config: Option<PathBuf>,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run { config, log_file } => handle_run(config, log_file),
        Commands::Check { config } => handle_check(config),
    }
}

fn handle_run(config: Option<PathBuf>, log_file: Option<PathBuf>) -> Result<()> {
    init_logging(log_file.as_deref()).with_context(|| match &log_file {
        Some(path) => format!("Failed to open log file {}", path.display()),
        None => "Failed to initialize logging".to_string(),
    })?;

    let path = ConfigLoader::resolve_path(config.as_deref())?;
    let config = ConfigLoader::load(&path)?;
    let work_list = config.work_list();
    info!("Work list: {}", work_list.iter().map(|d| d.id.as_str()).collect::<Vec<_>>().join(", "));

    let mut driver = PipelineDriver::new(config, ProcessRunner);
    let outcomes = driver.run_all(&work_list);
    print!("{}", format_outcomes(&outcomes));
    Ok(())
}

fn handle_check(config: Option<PathBuf>) -> Result<()> {
    let path = ConfigLoader::resolve_path(config.as_deref())?;
    let config = ConfigLoader::load(&path)?;
    println!("Configuration: {}", path.display());
    print!("{}", format_work_list(&config));
    Ok(())
}
