//! Mosaic pipeline - batch orchestrator for multi-stage microscopy mosaic processing
//!
//! For every dataset in the work list the pipeline brings the raw channel
//! images (Cy5, TRITC, GFP, DAPI) into a fixed local folder layout and drives
//! the external tools over them in order: background subtraction, curvelet
//! enhancement (GFP), float and 8-bit rescaling, segmentation and tracing.
//! Debug projections are written along the way for visual QA.
//!
//! This library provides:
//! - Batch configuration loading and validation
//! - Data models for channels, artifacts, stages and datasets
//! - Per-dataset stage sequencing with channel deactivation on failure
//! - The `mosaic` command-line interface
//!
//! # Example
//!
//! ```no_run
//! use mosaic_pipeline::cli::run;
//!
//! fn main() {
//!     if let Err(e) = run() {
//!         eprintln!("Error: {}", e);
//!         std::process::exit(1);
//!     }
//! }
//! ```

pub mod cli;
pub mod config;
pub mod models;
pub mod pipeline;
pub mod utils;
