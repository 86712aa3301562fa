use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::define_entity;
use crate::entity::PrimaryMap;
use crate::error::CoreError;
use crate::transforms::util::{substitute_values_in_op, substitute_values_in_term};

use super::block::{Block, BlockId, Terminator};
use super::inst::{Inst, InstId, Op, Span};
use super::ty::{FunctionSig, Type};
use super::value::{Constant, ValueId};

define_entity!(FuncId);

/// A function body.
///
/// Blocks, instructions, and values live in arenas on the function. Blocks
/// reference instructions by id; instructions reference values by id. A
/// "deleted" block is emptied in place and terminated with `Unreachable`,
/// keeping every id stable across rewrites.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub sig: FunctionSig,
    pub params: Vec<ValueId>,
    pub blocks: PrimaryMap<BlockId, Block>,
    pub insts: PrimaryMap<InstId, Inst>,
    pub value_types: PrimaryMap<ValueId, Type>,
    pub entry: BlockId,
    #[serde(default)]
    pub value_names: HashMap<ValueId, String>,
}

impl Function {
    pub fn new(name: impl Into<String>, sig: FunctionSig) -> Self {
        let mut blocks = PrimaryMap::new();
        let entry = blocks.push(Block::new());
        Self {
            name: name.into(),
            sig,
            params: Vec::new(),
            blocks,
            insts: PrimaryMap::new(),
            value_types: PrimaryMap::new(),
            entry,
            value_names: HashMap::new(),
        }
    }

    pub fn new_value(&mut self, ty: Type) -> ValueId {
        self.value_types.push(ty)
    }

    pub fn new_block(&mut self) -> BlockId {
        self.blocks.push(Block::new())
    }

    /// Successor blocks of `block`, in terminator order (may repeat).
    pub fn successors(&self, block: BlockId) -> Vec<BlockId> {
        self.blocks[block].term.successors()
    }

    /// Map from each block to its unique predecessors, in block order.
    pub fn predecessor_map(&self) -> HashMap<BlockId, Vec<BlockId>> {
        let mut map: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
        for (bb, block) in self.blocks.iter() {
            let mut seen = HashSet::new();
            for succ in block.term.successors() {
                if seen.insert(succ) {
                    map.entry(succ).or_default().push(bb);
                }
            }
        }
        map
    }

    /// Unique predecessors of `block`, in block order.
    pub fn predecessors(&self, block: BlockId) -> Vec<BlockId> {
        let mut preds = Vec::new();
        for (bb, b) in self.blocks.iter() {
            if b.term.successors().contains(&block) {
                preds.push(bb);
            }
        }
        preds
    }

    pub fn single_predecessor(&self, block: BlockId) -> Option<BlockId> {
        let preds = self.predecessors(block);
        if preds.len() == 1 {
            Some(preds[0])
        } else {
            None
        }
    }

    /// The value `phi` takes when control arrives from `pred`.
    pub fn phi_incoming(&self, phi: InstId, pred: BlockId) -> Option<ValueId> {
        match &self.insts[phi].op {
            Op::Phi { incoming } => incoming
                .iter()
                .find(|(b, _)| *b == pred)
                .map(|(_, v)| *v),
            _ => None,
        }
    }

    /// Resolve `value` as seen from `pred` when entering `block`: if it is
    /// a phi defined in `block`, read the incoming slot for `pred`.
    pub fn translate_through_phis(&self, block: BlockId, pred: BlockId, value: ValueId) -> ValueId {
        for &phi in &self.blocks[block].phis {
            if self.insts[phi].result == Some(value) {
                if let Some(v) = self.phi_incoming(phi, pred) {
                    return v;
                }
            }
        }
        value
    }

    /// Drop the incoming entry for `pred` from every phi in `block`.
    pub fn remove_phi_incoming(&mut self, block: BlockId, pred: BlockId) {
        let phis = self.blocks[block].phis.clone();
        for phi in phis {
            if let Op::Phi { incoming } = &mut self.insts[phi].op {
                incoming.retain(|(b, _)| *b != pred);
            }
        }
    }

    /// Rekey phi entries in `block` from `old_pred` to `new_pred`.
    pub fn rename_phi_pred(&mut self, block: BlockId, old_pred: BlockId, new_pred: BlockId) {
        let phis = self.blocks[block].phis.clone();
        for phi in phis {
            if let Op::Phi { incoming } = &mut self.insts[phi].op {
                for (b, _) in incoming.iter_mut() {
                    if *b == old_pred {
                        *b = new_pred;
                    }
                }
            }
        }
    }

    /// Give every phi in `block` an entry for `new_pred`, copying the value
    /// carried by the existing `from_pred` entry.
    pub fn add_phi_incoming_from(&mut self, block: BlockId, new_pred: BlockId, from_pred: BlockId) {
        let phis = self.blocks[block].phis.clone();
        for phi in phis {
            if let Op::Phi { incoming } = &mut self.insts[phi].op {
                if incoming.iter().any(|(b, _)| *b == new_pred) {
                    continue;
                }
                if let Some(&(_, v)) = incoming.iter().find(|(b, _)| *b == from_pred) {
                    incoming.push((new_pred, v));
                }
            }
        }
    }

    /// Replace every use of `old` with `new` across all instructions and
    /// terminators. The definition of `old` is left alone.
    pub fn replace_all_uses(&mut self, old: ValueId, new: ValueId) {
        let mut subst = HashMap::new();
        subst.insert(old, new);
        for (_, inst) in self.insts.iter_mut() {
            substitute_values_in_op(&mut inst.op, &subst);
        }
        for (_, block) in self.blocks.iter_mut() {
            substitute_values_in_term(&mut block.term, &subst);
        }
    }

    /// Insert a fresh block on the `pred -> succ` edge and return it.
    /// Phi entries in `succ` keyed on `pred` are rekeyed to the new block.
    pub fn split_edge(&mut self, pred: BlockId, succ: BlockId) -> BlockId {
        let mid = self.new_block();
        self.blocks[mid].term = Terminator::Br { target: succ };
        self.blocks[pred].term.replace_successor(succ, mid);
        self.rename_phi_pred(succ, pred, mid);
        mid
    }

    /// Empty `block` and terminate it with `Unreachable`. The caller is
    /// responsible for phi and dominator bookkeeping in the successors.
    pub fn clear_block(&mut self, block: BlockId) {
        let b = &mut self.blocks[block];
        b.phis.clear();
        b.insts.clear();
        b.term = Terminator::Unreachable;
    }

    /// The instruction defining `value`, if any.
    pub fn def_of(&self, value: ValueId) -> Option<&Inst> {
        self.insts
            .values()
            .find(|inst| inst.result == Some(value))
    }

    /// Constant definition of `value`, looking through `Copy`.
    pub fn constant_of(&self, value: ValueId) -> Option<&Constant> {
        let mut v = value;
        for _ in 0..8 {
            match self.def_of(v).map(|inst| &inst.op) {
                Some(Op::Const(c)) => return Some(c),
                Some(Op::Copy(inner)) => v = *inner,
                _ => return None,
            }
        }
        None
    }

    /// Append an instruction with a result to `block`.
    pub fn emit_in(&mut self, block: BlockId, op: Op, ty: Type) -> ValueId {
        let result = self.new_value(ty);
        let inst = self.insts.push(Inst {
            op,
            result: Some(result),
            span: Span::default(),
        });
        self.blocks[block].insts.push(inst);
        result
    }

    /// Append a result-less instruction to `block`.
    pub fn emit_void_in(&mut self, block: BlockId, op: Op) -> InstId {
        let inst = self.insts.push(Inst {
            op,
            result: None,
            span: Span::default(),
        });
        self.blocks[block].insts.push(inst);
        inst
    }

    /// Check that every phi's incoming keys match its block's unique
    /// predecessor set exactly, with no duplicate keys.
    pub fn verify_phis(&self) -> Result<(), CoreError> {
        let pred_map = self.predecessor_map();
        for (bb, block) in self.blocks.iter() {
            let preds: HashSet<BlockId> = pred_map
                .get(&bb)
                .map(|p| p.iter().copied().collect())
                .unwrap_or_default();
            for &phi in &block.phis {
                let incoming = match &self.insts[phi].op {
                    Op::Phi { incoming } => incoming,
                    other => {
                        return Err(CoreError::Verify(format!(
                            "{}: non-phi op {:?} in phi list of block {:?}",
                            self.name, other, bb
                        )))
                    }
                };
                let mut keys = HashSet::new();
                for (b, _) in incoming {
                    if !keys.insert(*b) {
                        return Err(CoreError::Verify(format!(
                            "{}: duplicate phi key {:?} in block {:?}",
                            self.name, b, bb
                        )));
                    }
                }
                if keys != preds {
                    return Err(CoreError::Verify(format!(
                        "{}: phi keys {:?} do not match predecessors {:?} of block {:?}",
                        self.name, keys, preds, bb
                    )));
                }
            }
        }
        Ok(())
    }
}
