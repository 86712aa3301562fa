//! Shared helpers for rewrites: operand traversal, value substitution, and
//! local dead-code cleanup.

use std::collections::{HashMap, HashSet};

use crate::ir::{BlockId, Function, Op, Terminator, ValueId};

/// Value operands read by `op`, in positional order.
pub fn value_operands(op: &Op) -> Vec<ValueId> {
    match op {
        Op::Const(_) | Op::LandingPad | Op::CleanupPad | Op::BlockAddress(_) => Vec::new(),
        Op::DebugMarker(_) => Vec::new(),
        Op::Add(a, b)
        | Op::Sub(a, b)
        | Op::Mul(a, b)
        | Op::Div(a, b)
        | Op::Rem(a, b)
        | Op::BitAnd(a, b)
        | Op::BitOr(a, b)
        | Op::BitXor(a, b)
        | Op::Shl(a, b)
        | Op::Shr(a, b)
        | Op::Cmp(_, a, b) => vec![*a, *b],
        Op::Neg(a) | Op::BitNot(a) | Op::Not(a) | Op::Assume(a) | Op::Copy(a) => vec![*a],
        Op::Cast(a, _) => vec![*a],
        Op::Select {
            cond,
            on_true,
            on_false,
        } => vec![*cond, *on_true, *on_false],
        Op::Phi { incoming } => incoming.iter().map(|(_, v)| *v).collect(),
        Op::Load { ptr, .. } => vec![*ptr],
        Op::Store { ptr, value, .. } => vec![*ptr, *value],
        Op::Call { args, .. } => args.clone(),
        Op::ArrayInit(elems) => elems.clone(),
        Op::GetIndex { array, index } => vec![*array, *index],
    }
}

/// Value operands read by `term`.
pub fn term_value_operands(term: &Terminator) -> Vec<ValueId> {
    match term {
        Terminator::Br { .. } | Terminator::Unreachable => Vec::new(),
        Terminator::CondBr { cond, .. } => vec![*cond],
        Terminator::Switch { value, .. } => vec![*value],
        Terminator::Return { value } => value.iter().copied().collect(),
        Terminator::Resume { value } => vec![*value],
        Terminator::CleanupRet { pad, .. } => vec![*pad],
        Terminator::IndirectBr { address, .. } => vec![*address],
        Terminator::Invoke { args, .. } => args.clone(),
    }
}

fn subst(v: &mut ValueId, map: &HashMap<ValueId, ValueId>) {
    if let Some(&n) = map.get(v) {
        *v = n;
    }
}

/// Rewrite every value operand of `op` through `map`.
pub fn substitute_values_in_op(op: &mut Op, map: &HashMap<ValueId, ValueId>) {
    match op {
        Op::Const(_) | Op::LandingPad | Op::CleanupPad | Op::BlockAddress(_) => {}
        Op::DebugMarker(_) => {}
        Op::Add(a, b)
        | Op::Sub(a, b)
        | Op::Mul(a, b)
        | Op::Div(a, b)
        | Op::Rem(a, b)
        | Op::BitAnd(a, b)
        | Op::BitOr(a, b)
        | Op::BitXor(a, b)
        | Op::Shl(a, b)
        | Op::Shr(a, b)
        | Op::Cmp(_, a, b) => {
            subst(a, map);
            subst(b, map);
        }
        Op::Neg(a) | Op::BitNot(a) | Op::Not(a) | Op::Assume(a) | Op::Copy(a) => subst(a, map),
        Op::Cast(a, _) => subst(a, map),
        Op::Select {
            cond,
            on_true,
            on_false,
        } => {
            subst(cond, map);
            subst(on_true, map);
            subst(on_false, map);
        }
        Op::Phi { incoming } => {
            for (_, v) in incoming.iter_mut() {
                subst(v, map);
            }
        }
        Op::Load { ptr, .. } => subst(ptr, map),
        Op::Store { ptr, value, .. } => {
            subst(ptr, map);
            subst(value, map);
        }
        Op::Call { args, .. } => {
            for a in args.iter_mut() {
                subst(a, map);
            }
        }
        Op::ArrayInit(elems) => {
            for e in elems.iter_mut() {
                subst(e, map);
            }
        }
        Op::GetIndex { array, index } => {
            subst(array, map);
            subst(index, map);
        }
    }
}

/// Rewrite every value operand of `term` through `map`.
pub fn substitute_values_in_term(term: &mut Terminator, map: &HashMap<ValueId, ValueId>) {
    match term {
        Terminator::Br { .. } | Terminator::Unreachable => {}
        Terminator::CondBr { cond, .. } => subst(cond, map),
        Terminator::Switch { value, .. } => subst(value, map),
        Terminator::Return { value } => {
            if let Some(v) = value {
                subst(v, map);
            }
        }
        Terminator::Resume { value } => subst(value, map),
        Terminator::CleanupRet { pad, .. } => subst(pad, map),
        Terminator::IndirectBr { address, .. } => subst(address, map),
        Terminator::Invoke { args, .. } => {
            for a in args.iter_mut() {
                subst(a, map);
            }
        }
    }
}

/// All values used anywhere in the function, as a set.
pub fn used_values(func: &Function) -> HashSet<ValueId> {
    let mut used = HashSet::new();
    for (_, block) in func.blocks.iter() {
        for &id in block.phis.iter().chain(block.insts.iter()) {
            used.extend(value_operands(&func.insts[id].op));
        }
        used.extend(term_value_operands(&block.term));
    }
    used
}

/// Drop side-effect-free instructions in `block` whose results have no
/// users anywhere in the function. Runs backwards so a chain of dead
/// definitions disappears in one call.
pub fn remove_dead_defs(func: &mut Function, block: BlockId) -> bool {
    let mut changed = false;
    loop {
        let used = used_values(func);
        let insts = func.blocks[block].insts.clone();
        let mut removed_any = false;
        for &id in insts.iter().rev() {
            let inst = &func.insts[id];
            if inst.op.has_side_effects() {
                continue;
            }
            let dead = match inst.result {
                Some(r) => !used.contains(&r),
                // Result-less pure instructions hold no state worth keeping.
                None => !matches!(inst.op, Op::DebugMarker(_)),
            };
            if dead {
                func.blocks[block].insts.retain(|&i| i != id);
                removed_any = true;
                changed = true;
                break;
            }
        }
        if !removed_any {
            break;
        }
    }
    changed
}
