pub mod duration;
pub mod fuzzy;
pub mod logging;

pub use duration::*;
pub use logging::*;
