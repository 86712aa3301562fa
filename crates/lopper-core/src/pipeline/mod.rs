//! Sequencing of module transforms.

pub mod config;
pub mod transform;

pub use config::PassConfig;
pub use transform::{Transform, TransformPipeline, TransformResult};
