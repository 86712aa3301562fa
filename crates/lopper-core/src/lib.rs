//! Control-flow graph simplification over an arena-based IR.
//!
//! Modules are loaded from JSON, rewritten by the transforms in
//! [`transforms`], and written back out. The heart of the crate is
//! [`transforms::simplify_cfg`], a catalogue of local CFG rewrites driven
//! to fixpoint: branch folding, select formation, switch-to-lookup-table
//! conversion, and unreachable-code trimming.

pub mod analysis;
pub mod entity;
pub mod error;
pub mod ir;
pub mod pipeline;
pub mod transforms;
