//! Cost model queried by profitability gates.

use crate::ir::{Op, Type};

pub const COST_FREE: u32 = 0;
pub const COST_BASIC: u32 = 1;
pub const COST_EXPENSIVE: u32 = 4;

/// Target-dependent answers to "is this rewrite worth it".
///
/// The simplifier asks, it never assumes. Embedders with a real target
/// description can override any of these.
pub trait CostModel {
    /// Latency-ish cost of executing `op` once.
    fn user_cost(&self, op: &Op) -> u32;

    /// Whether moving `op` above a branch is acceptable.
    fn is_profitable_to_hoist(&self, _op: &Op) -> bool {
        true
    }

    /// Whether `ty` is cheap to materialize and index on this target.
    fn is_type_legal(&self, ty: &Type) -> bool;

    fn should_build_lookup_tables(&self) -> bool {
        true
    }

    /// Weight percentage above which a branch counts as predictable and is
    /// not worth flattening.
    fn predictable_branch_threshold(&self) -> u32 {
        99
    }
}

/// Cost model with no target knowledge.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultCostModel;

impl CostModel for DefaultCostModel {
    fn user_cost(&self, op: &Op) -> u32 {
        if op.is_free() {
            return COST_FREE;
        }
        match op {
            Op::Const(_) | Op::BlockAddress(_) | Op::Cast(..) => COST_FREE,
            Op::Div(..) | Op::Rem(..) | Op::Call { .. } => COST_EXPENSIVE,
            _ => COST_BASIC,
        }
    }

    fn is_type_legal(&self, ty: &Type) -> bool {
        match ty.bit_width() {
            Some(w) => w.is_power_of_two() && w <= 64,
            None => matches!(ty, Type::Ptr | Type::Float(32) | Type::Float(64)),
        }
    }
}
