// Pipeline orchestration: channel bookkeeping, options files, stage
// execution and the per-dataset driver

pub mod bootstrap;
pub mod driver;
pub mod error;
pub mod options;
pub mod registry;
pub mod runner;
pub mod tools;

pub use driver::*;
pub use error::*;
pub use options::*;
pub use registry::*;
pub use runner::*;
pub use tools::*;
