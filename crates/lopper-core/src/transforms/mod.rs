//! IR rewrites.

pub mod simplify_cfg;
pub mod util;

use crate::pipeline::{PassConfig, TransformPipeline};

/// Assemble the standard pipeline described by `config`.
pub fn default_pipeline(config: &PassConfig) -> TransformPipeline {
    let mut pipeline = TransformPipeline::with_fixpoint(config.fixpoint);
    if config.simplify_cfg {
        pipeline.add(Box::new(simplify_cfg::SimplifyCfg::new(
            config.simplify.clone(),
        )));
    }
    pipeline
}
