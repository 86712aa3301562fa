//! Analyses consulted by the rewrites: cost modelling, known-bits value
//! tracking, and dominator update plumbing.

pub mod cost;
pub mod domtree;
pub mod known_bits;

pub use cost::{CostModel, DefaultCostModel, COST_BASIC, COST_EXPENSIVE, COST_FREE};
pub use domtree::{net_updates, DomUpdate, DomUpdateSink, RecordingSink};
pub use known_bits::{known_bits, width_mask, KnownBits};
