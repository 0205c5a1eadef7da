// Core data models for the pipeline
// Channels, artifact naming, dataset layout and stage bookkeeping

pub mod artifact;
pub mod channel;
pub mod dataset;
pub mod stage;

pub use artifact::*;
pub use channel::*;
pub use dataset::*;
pub use stage::*;
