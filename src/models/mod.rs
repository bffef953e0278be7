//! Data models

pub mod audit;
pub mod features;
pub mod insights;
pub mod prediction;

pub use audit::*;
pub use features::*;
pub use insights::*;
pub use prediction::*;
