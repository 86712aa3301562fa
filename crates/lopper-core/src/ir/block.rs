use serde::{Deserialize, Serialize};

use crate::define_entity;

use super::inst::InstId;
use super::value::ValueId;

define_entity!(BlockId);

/// One arm of a `Switch` terminator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchCase {
    pub value: i64,
    pub dest: BlockId,
}

/// Block terminator. Every block has exactly one; successor edges are read
/// off the terminator and nowhere else.
///
/// Branch weights are optional profile data. On `CondBr` the order is
/// `[then, else]`; on `Switch` index 0 is the default and index `i + 1`
/// belongs to `cases[i]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Terminator {
    Br {
        target: BlockId,
    },
    CondBr {
        cond: ValueId,
        then_dest: BlockId,
        else_dest: BlockId,
        weights: Option<[u64; 2]>,
    },
    Switch {
        value: ValueId,
        cases: Vec<SwitchCase>,
        default: BlockId,
        weights: Option<Vec<u64>>,
    },
    Return {
        value: Option<ValueId>,
    },
    /// Propagate an in-flight exception to the caller.
    Resume {
        value: ValueId,
    },
    CleanupRet {
        pad: ValueId,
        unwind: Option<BlockId>,
    },
    Unreachable,
    IndirectBr {
        address: ValueId,
        dests: Vec<BlockId>,
    },
    Invoke {
        func: String,
        args: Vec<ValueId>,
        result: Option<ValueId>,
        normal: BlockId,
        unwind: BlockId,
    },
}

impl Terminator {
    /// Successor blocks, in terminator order. May contain duplicates when
    /// several switch cases share a destination.
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Terminator::Br { target } => vec![*target],
            Terminator::CondBr {
                then_dest,
                else_dest,
                ..
            } => vec![*then_dest, *else_dest],
            Terminator::Switch { cases, default, .. } => {
                let mut out = vec![*default];
                out.extend(cases.iter().map(|c| c.dest));
                out
            }
            Terminator::Return { .. } | Terminator::Resume { .. } | Terminator::Unreachable => {
                Vec::new()
            }
            Terminator::CleanupRet { unwind, .. } => unwind.iter().copied().collect(),
            Terminator::IndirectBr { dests, .. } => dests.clone(),
            Terminator::Invoke { normal, unwind, .. } => vec![*normal, *unwind],
        }
    }

    /// Redirect every edge that targets `old` to `new`.
    pub fn replace_successor(&mut self, old: BlockId, new: BlockId) {
        let patch = |b: &mut BlockId| {
            if *b == old {
                *b = new;
            }
        };
        match self {
            Terminator::Br { target } => patch(target),
            Terminator::CondBr {
                then_dest,
                else_dest,
                ..
            } => {
                patch(then_dest);
                patch(else_dest);
            }
            Terminator::Switch { cases, default, .. } => {
                patch(default);
                for case in cases {
                    patch(&mut case.dest);
                }
            }
            Terminator::CleanupRet { unwind, .. } => {
                if let Some(b) = unwind {
                    patch(b);
                }
            }
            Terminator::IndirectBr { dests, .. } => {
                for d in dests {
                    patch(d);
                }
            }
            Terminator::Invoke { normal, unwind, .. } => {
                patch(normal);
                patch(unwind);
            }
            Terminator::Return { .. } | Terminator::Resume { .. } | Terminator::Unreachable => {}
        }
    }
}

/// A basic block: phis, then straight-line instructions, then a terminator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub phis: Vec<InstId>,
    pub insts: Vec<InstId>,
    pub term: Terminator,
}

impl Block {
    pub fn new() -> Self {
        Self {
            phis: Vec::new(),
            insts: Vec::new(),
            term: Terminator::Unreachable,
        }
    }
}

impl Default for Block {
    fn default() -> Self {
        Self::new()
    }
}
