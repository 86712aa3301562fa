//! Module transforms and the pipeline that sequences them.

use tracing::{debug, info};

use crate::error::CoreError;
use crate::ir::Module;

/// Output of one transform application.
pub struct TransformResult {
    pub module: Module,
    pub changed: bool,
}

/// A whole-module rewrite. Transforms take the module by value and hand
/// it back; a transform that declines to act returns it unchanged with
/// `changed: false`.
pub trait Transform {
    fn name(&self) -> &str;

    fn apply(&self, module: Module) -> Result<TransformResult, CoreError>;
}

/// An ordered list of transforms, optionally rerun until a full round
/// leaves the module untouched.
pub struct TransformPipeline {
    transforms: Vec<Box<dyn Transform>>,
    fixpoint: bool,
}

/// Bound on fixpoint rounds so a rewrite oscillation cannot hang the
/// driver. Hitting it is a bug in some transform, not expected behavior.
const MAX_ROUNDS: usize = 16;

impl TransformPipeline {
    pub fn new() -> Self {
        Self::with_fixpoint(false)
    }

    pub fn with_fixpoint(fixpoint: bool) -> Self {
        Self {
            transforms: Vec::new(),
            fixpoint,
        }
    }

    pub fn add(&mut self, transform: Box<dyn Transform>) {
        self.transforms.push(transform);
    }

    pub fn run(&self, module: Module) -> Result<TransformResult, CoreError> {
        let mut module = module;
        let mut changed = false;
        for round in 0..MAX_ROUNDS {
            let mut round_changed = false;
            for transform in &self.transforms {
                let result = transform.apply(module)?;
                module = result.module;
                if result.changed {
                    debug!(pass = transform.name(), round, "pass changed the module");
                    round_changed = true;
                }
            }
            changed |= round_changed;
            if !self.fixpoint || !round_changed {
                break;
            }
            if round + 1 == MAX_ROUNDS {
                info!("pipeline did not settle within {MAX_ROUNDS} rounds");
            }
        }
        Ok(TransformResult { module, changed })
    }
}

impl Default for TransformPipeline {
    fn default() -> Self {
        Self::new()
    }
}
