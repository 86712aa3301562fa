//! Rewrites for conditional and unconditional branches.

use std::collections::HashMap;

use tracing::debug;

use crate::analysis::DomUpdate;
use crate::ir::{
    BlockId, CmpKind, Constant, Function, InstId, Op, SwitchCase, Terminator, Type, ValueId,
};
use crate::transforms::util::{term_value_operands, value_operands};

use super::eq_cases::{canonical_value, fold_value_comparison_into_predecessors};
use super::{compare_chain, hoist_sink, speculate, SimplifyCtx};

fn as_cond_br(term: &Terminator) -> Option<(ValueId, BlockId, BlockId, Option<[u64; 2]>)> {
    match term {
        Terminator::CondBr {
            cond,
            then_dest,
            else_dest,
            weights,
        } => Some((*cond, *then_dest, *else_dest, *weights)),
        _ => None,
    }
}

/// Count how often `value` is read anywhere in the function.
fn use_count(func: &Function, value: ValueId) -> usize {
    let mut count = 0;
    for (_, block) in func.blocks.iter() {
        for &id in block.phis.iter().chain(block.insts.iter()) {
            count += value_operands(&func.insts[id].op)
                .iter()
                .filter(|&&v| v == value)
                .count();
        }
        count += term_value_operands(&block.term)
            .iter()
            .filter(|&&v| v == value)
            .count();
    }
    count
}

/// Whether every value defined in `block` is used only by instructions and
/// the terminator of `block` itself.
fn defs_confined(func: &Function, block: BlockId) -> bool {
    let b = &func.blocks[block];
    let local: Vec<InstId> = b.phis.iter().chain(b.insts.iter()).copied().collect();
    for &id in &local {
        let result = match func.insts[id].result {
            Some(r) => r,
            None => continue,
        };
        for (other_bb, other) in func.blocks.iter() {
            for &oid in other.phis.iter().chain(other.insts.iter()) {
                if value_operands(&func.insts[oid].op).contains(&result)
                    && (other_bb != block || !local.contains(&oid))
                {
                    return false;
                }
            }
            if term_value_operands(&other.term).contains(&result) && other_bb != block {
                return false;
            }
        }
    }
    true
}

pub(crate) fn simplify_cond_branch(ctx: &mut SimplifyCtx, block: BlockId) -> bool {
    if !ctx.options.simplify_cond_branch {
        return false;
    }
    let (cond, then_dest, else_dest, _) = match as_cond_br(&ctx.func.blocks[block].term) {
        Some(t) => t,
        None => return false,
    };

    // Both arms identical: this is an unconditional branch in disguise.
    if then_dest == else_dest {
        ctx.func.blocks[block].term = Terminator::Br { target: then_dest };
        return true;
    }

    // Constant condition: keep the taken arm.
    if let Some(taken) = ctx.func.constant_of(cond).and_then(|c| c.as_bool()) {
        let (kept, dropped) = if taken {
            (then_dest, else_dest)
        } else {
            (else_dest, then_dest)
        };
        ctx.func.remove_phi_incoming(dropped, block);
        ctx.func.blocks[block].term = Terminator::Br { target: kept };
        ctx.record_dom(vec![DomUpdate::Delete(block, dropped)]);
        ctx.delete_block_if_dead(dropped);
        return true;
    }

    if fold_value_comparison_into_predecessors(ctx, block) {
        return true;
    }
    if compare_chain::simplify_branch_on_icmp_chain(ctx, block) {
        return true;
    }
    if fold_dominated_condition(ctx, block) {
        return true;
    }
    if ctx.options.hoist_common_insts && hoist_sink::hoist_then_else_common(ctx, block) {
        return true;
    }
    if speculate::speculatively_execute_block(ctx, block) {
        return true;
    }
    if fold_cond_branch_on_phi(ctx, block) {
        return true;
    }
    if fold_branch_to_common_dest(ctx, block) {
        return true;
    }
    if merge_conditional_stores(ctx, block) {
        return true;
    }
    false
}

/// If an ancestor on an unbroken single-predecessor chain branches on the
/// same condition value, that ancestor already decided it.
fn fold_dominated_condition(ctx: &mut SimplifyCtx, block: BlockId) -> bool {
    let (cond, then_dest, else_dest, _) = match as_cond_br(&ctx.func.blocks[block].term) {
        Some(t) => t,
        None => return false,
    };
    let mut child = block;
    for _ in 0..16 {
        let p = match ctx.func.single_predecessor(child) {
            Some(p) if p != child => p,
            _ => return false,
        };
        if let Some((pcond, pt, pf, _)) = as_cond_br(&ctx.func.blocks[p].term) {
            if pcond == cond && pt != pf {
                let decided = if pt == child && pf != child {
                    Some(true)
                } else if pf == child && pt != child {
                    Some(false)
                } else {
                    None
                };
                if let Some(value) = decided {
                    let (kept, dropped) = if value {
                        (then_dest, else_dest)
                    } else {
                        (else_dest, then_dest)
                    };
                    debug!(?block, ?p, value, "condition decided by dominating branch");
                    ctx.func.remove_phi_incoming(dropped, block);
                    ctx.func.blocks[block].term = Terminator::Br { target: kept };
                    ctx.record_dom(vec![DomUpdate::Delete(block, dropped)]);
                    ctx.delete_block_if_dead(dropped);
                    return true;
                }
            }
        }
        child = p;
    }
    false
}

/// Fold a two-way branch into a predecessor's two-way branch when they
/// share a destination, combining the conditions with and/or.
pub(crate) fn fold_branch_to_common_dest(ctx: &mut SimplifyCtx, block: BlockId) -> bool {
    let (bcond, bt, bf, bweights) = match as_cond_br(&ctx.func.blocks[block].term) {
        Some(t) => t,
        None => return false,
    };
    if bt == bf || bt == block || bf == block {
        return false;
    }
    let body = ctx.func.blocks[block].insts.clone();
    let mut bonus = 0u32;
    for &id in &body {
        let op = &ctx.func.insts[id].op;
        if matches!(op, Op::DebugMarker(_)) {
            continue;
        }
        if !op.is_safe_to_speculate() {
            return false;
        }
        if ctx.cost.user_cost(op) > 0 {
            bonus += 1;
        }
    }
    if bonus > ctx.options.bonus_inst_threshold {
        return false;
    }
    let mut changed = false;
    for pred in ctx.func.predecessors(block) {
        if pred == block {
            continue;
        }
        if fold_branch_into_one_pred(ctx, block, bcond, bt, bf, bweights, &body, pred) {
            changed = true;
        }
    }
    if changed {
        ctx.delete_block_if_dead(block);
    }
    changed
}

#[allow(clippy::too_many_arguments)]
fn fold_branch_into_one_pred(
    ctx: &mut SimplifyCtx,
    block: BlockId,
    bcond: ValueId,
    bt: BlockId,
    bf: BlockId,
    bweights: Option<[u64; 2]>,
    body: &[InstId],
    pred: BlockId,
) -> bool {
    let (pcond, pt, pf, pweights) = match as_cond_br(&ctx.func.blocks[pred].term) {
        Some(t) => t,
        None => return false,
    };
    if pt == pf {
        return false;
    }
    // Four shapes share a destination. `shared` is the arm both branches
    // already agree on; `gained` is the arm pred acquires from block.
    enum Row {
        OrDirect,     // pred falls through on false, then arms match
        AndNegated,   // pred falls through on false, cross arms match
        AndDirect,    // pred falls through on true, else arms match
        OrNegated,    // pred falls through on true, cross arms match
    }
    let (row, shared, gained, direct_on_true) = if pf == block && pt == bt {
        (Row::OrDirect, bt, bf, true)
    } else if pf == block && pt == bf {
        (Row::AndNegated, bf, bt, true)
    } else if pt == block && pf == bf {
        (Row::AndDirect, bf, bt, false)
    } else if pt == block && pf == bt {
        (Row::OrNegated, bt, bf, false)
    } else {
        return false;
    };
    if gained == pred || shared == pred {
        return false;
    }
    // Skip folding into a branch the profile says is already decided.
    if let Some([wt, wf]) = pweights {
        let into_block = if pt == block { wt } else { wf };
        let sum = wt.saturating_add(wf);
        let spare = 100u64.saturating_sub(ctx.cost.predictable_branch_threshold() as u64);
        if sum > 0 && into_block.saturating_mul(100) < spare.saturating_mul(sum) {
            return false;
        }
    }

    // Clone the bonus instructions into pred, rewriting block-phi operands
    // to the values pred feeds them.
    let mut map: HashMap<ValueId, ValueId> = HashMap::new();
    for &phi in &ctx.func.blocks[block].phis.clone() {
        if let Some(r) = ctx.func.insts[phi].result {
            if let Some(v) = ctx.func.phi_incoming(phi, pred) {
                map.insert(r, v);
            }
        }
    }
    for &id in body {
        let inst = ctx.func.insts[id].clone();
        if matches!(inst.op, Op::DebugMarker(_)) {
            continue;
        }
        let mut op = inst.op;
        crate::transforms::util::substitute_values_in_op(&mut op, &map);
        if let Some(r) = inst.result {
            let ty = ctx.func.value_types[r].clone();
            let nv = ctx.func.emit_in(pred, op, ty);
            map.insert(r, nv);
        }
    }
    let mc = *map.get(&bcond).unwrap_or(&bcond);

    let combined = match row {
        Row::OrDirect => ctx.func.emit_in(pred, Op::BitOr(pcond, mc), Type::Bool),
        Row::AndDirect => ctx.func.emit_in(pred, Op::BitAnd(pcond, mc), Type::Bool),
        Row::AndNegated => {
            let n = ctx.func.emit_in(pred, Op::Not(pcond), Type::Bool);
            ctx.func.emit_in(pred, Op::BitAnd(n, mc), Type::Bool)
        }
        Row::OrNegated => {
            let n = ctx.func.emit_in(pred, Op::Not(pcond), Type::Bool);
            ctx.func.emit_in(pred, Op::BitOr(n, mc), Type::Bool)
        }
    };

    let weights = if pweights.is_some() || bweights.is_some() {
        let [pt_w, pf_w] = pweights.unwrap_or([1, 1]);
        let [bt_w, bf_w] = bweights.unwrap_or([1, 1]);
        let sum_b = bt_w.saturating_add(bf_w);
        let (then_w, else_w) = match row {
            Row::OrDirect => (
                pt_w.saturating_mul(sum_b)
                    .saturating_add(pf_w.saturating_mul(bt_w)),
                pf_w.saturating_mul(bf_w),
            ),
            Row::AndNegated => (
                pf_w.saturating_mul(bt_w),
                pt_w.saturating_mul(sum_b)
                    .saturating_add(pf_w.saturating_mul(bf_w)),
            ),
            Row::AndDirect => (
                pt_w.saturating_mul(bt_w),
                pf_w.saturating_mul(sum_b)
                    .saturating_add(pt_w.saturating_mul(bf_w)),
            ),
            Row::OrNegated => (
                pf_w.saturating_mul(sum_b)
                    .saturating_add(pt_w.saturating_mul(bt_w)),
                pt_w.saturating_mul(bf_w),
            ),
        };
        let mut w = [then_w, else_w];
        while w.iter().any(|&x| x > u32::MAX as u64) {
            for x in w.iter_mut() {
                *x = (*x / 2).max(1);
            }
        }
        Some(w)
    } else {
        None
    };

    // The gained arm's phis get an entry for pred carrying whatever value
    // used to flow in from block on that path.
    let gained_phis = ctx.func.blocks[gained].phis.clone();
    for phi in gained_phis {
        if let Some(v_b) = ctx.func.phi_incoming(phi, block) {
            let resolved = *map.get(&v_b).unwrap_or(&v_b);
            if let Op::Phi { incoming } = &mut ctx.func.insts[phi].op {
                incoming.push((pred, resolved));
            }
        }
    }
    // On the shared arm the direct path and the path through block may
    // disagree; merge them with a select on pred's original condition.
    let shared_phis = ctx.func.blocks[shared].phis.clone();
    for phi in shared_phis {
        let pv = match ctx.func.phi_incoming(phi, pred) {
            Some(v) => v,
            None => continue,
        };
        let v_b = match ctx.func.phi_incoming(phi, block) {
            Some(v) => v,
            None => continue,
        };
        let resolved = *map.get(&v_b).unwrap_or(&v_b);
        if pv == resolved {
            continue;
        }
        let ty = ctx.func.value_types[pv].clone();
        let (on_true, on_false) = if direct_on_true {
            (pv, resolved)
        } else {
            (resolved, pv)
        };
        let sel = ctx.func.emit_in(
            pred,
            Op::Select {
                cond: pcond,
                on_true,
                on_false,
            },
            ty,
        );
        if let Op::Phi { incoming } = &mut ctx.func.insts[phi].op {
            for (b, v) in incoming.iter_mut() {
                if *b == pred {
                    *v = sel;
                }
            }
        }
    }

    ctx.func.blocks[pred].term = Terminator::CondBr {
        cond: combined,
        then_dest: bt,
        else_dest: bf,
        weights,
    };
    ctx.func.remove_phi_incoming(block, pred);
    ctx.record_dom(vec![
        DomUpdate::Delete(pred, block),
        DomUpdate::Insert(pred, gained),
    ]);
    debug!(?pred, ?block, "folded branch into predecessor");
    true
}

/// Thread a branch on a phi with constant incoming values: predecessors
/// that pin the phi jump straight to the decided destination through a
/// copy of the block's body.
fn fold_cond_branch_on_phi(ctx: &mut SimplifyCtx, block: BlockId) -> bool {
    let (cond, bt, bf, _) = match as_cond_br(&ctx.func.blocks[block].term) {
        Some(t) => t,
        None => return false,
    };
    if bt == bf || bt == block || bf == block {
        return false;
    }
    if ctx.options.need_canonical_loops && ctx.loop_headers.contains(&block) {
        return false;
    }
    let phi_id = match ctx.func.blocks[block]
        .phis
        .iter()
        .find(|&&p| ctx.func.insts[p].result == Some(cond))
    {
        Some(&p) => p,
        None => return false,
    };
    // Degenerate single-entry phi: just a rename of the incoming value.
    if let Op::Phi { incoming } = &ctx.func.insts[phi_id].op {
        if incoming.len() == 1 {
            let v = incoming[0].1;
            ctx.func.blocks[block].phis.retain(|&p| p != phi_id);
            ctx.func.replace_all_uses(cond, v);
            return true;
        }
    }
    if use_count(ctx.func, cond) != 1 {
        return false;
    }
    let body = ctx.func.blocks[block].insts.clone();
    let bonus = body
        .iter()
        .filter(|&&id| !matches!(ctx.func.insts[id].op, Op::DebugMarker(_)))
        .count();
    if bonus > 10 {
        return false;
    }
    if !defs_confined(ctx.func, block) {
        return false;
    }

    let incoming = match &ctx.func.insts[phi_id].op {
        Op::Phi { incoming } => incoming.clone(),
        _ => return false,
    };
    let mut changed = false;
    // Bounded by the incoming list as it was before any threading.
    for (p, v) in incoming {
        if p == block {
            continue;
        }
        let taken = match ctx.func.constant_of(v).and_then(|c| c.as_bool()) {
            Some(b) => b,
            None => continue,
        };
        let dest = if taken { bt } else { bf };

        let edge = ctx.func.new_block();
        let mut map: HashMap<ValueId, ValueId> = HashMap::new();
        for &phi in &ctx.func.blocks[block].phis.clone() {
            if let Some(r) = ctx.func.insts[phi].result {
                if let Some(iv) = ctx.func.phi_incoming(phi, p) {
                    map.insert(r, iv);
                }
            }
        }
        for &id in &body {
            let inst = ctx.func.insts[id].clone();
            let mut op = inst.op;
            crate::transforms::util::substitute_values_in_op(&mut op, &map);
            match inst.result {
                Some(r) => {
                    let ty = ctx.func.value_types[r].clone();
                    let nv = ctx.func.emit_in(edge, op, ty);
                    map.insert(r, nv);
                }
                None => {
                    ctx.func.emit_void_in(edge, op);
                }
            }
        }
        ctx.func.blocks[edge].term = Terminator::Br { target: dest };
        ctx.func.blocks[p].term.replace_successor(block, edge);
        // Block defs are confined, so dest phi values arriving from block
        // are defined above it and stay valid on the new edge.
        ctx.func.add_phi_incoming_from(dest, edge, block);
        ctx.func.remove_phi_incoming(block, p);
        ctx.record_dom(vec![
            DomUpdate::Insert(p, edge),
            DomUpdate::Insert(edge, dest),
            DomUpdate::Delete(p, block),
        ]);
        debug!(?block, pred = ?p, "threaded constant phi branch");
        changed = true;
    }
    if changed {
        ctx.delete_block_if_dead(block);
    }
    changed
}

/// Flatten a store diamond: both arms store to the same address and fall
/// through to the same block, so a select picks the stored value.
fn merge_conditional_stores(ctx: &mut SimplifyCtx, block: BlockId) -> bool {
    let (cond, t, f, _) = match as_cond_br(&ctx.func.blocks[block].term) {
        Some(x) => x,
        None => return false,
    };
    if t == f || t == block || f == block {
        return false;
    }
    let arm_store = |ctx: &SimplifyCtx, arm: BlockId| -> Option<(ValueId, ValueId, BlockId)> {
        if ctx.func.single_predecessor(arm) != Some(block)
            || !ctx.func.blocks[arm].phis.is_empty()
        {
            return None;
        }
        let join = match ctx.func.blocks[arm].term {
            Terminator::Br { target } => target,
            _ => return None,
        };
        let mut store = None;
        for &id in &ctx.func.blocks[arm].insts {
            match &ctx.func.insts[id].op {
                Op::DebugMarker(_) => {}
                Op::Store {
                    ptr,
                    value,
                    volatile: false,
                } if store.is_none() => store = Some((*ptr, *value)),
                _ => return None,
            }
        }
        store.map(|(ptr, value)| (ptr, value, join))
    };
    let (tp, tv, tj) = match arm_store(ctx, t) {
        Some(x) => x,
        None => return false,
    };
    let (fp, fv, fj) = match arm_store(ctx, f) {
        Some(x) => x,
        None => return false,
    };
    if tp != fp || tj != fj || tj == block || tj == t || tj == f {
        return false;
    }
    let join = tj;

    let ty = ctx.func.value_types[tv].clone();
    let sel = ctx.func.emit_in(
        block,
        Op::Select {
            cond,
            on_true: tv,
            on_false: fv,
        },
        ty,
    );
    ctx.func.emit_void_in(
        block,
        Op::Store {
            ptr: tp,
            value: sel,
            volatile: false,
        },
    );
    // Collapse the two join phi entries into one for block.
    let phis = ctx.func.blocks[join].phis.clone();
    for phi in phis {
        let pv_t = ctx.func.phi_incoming(phi, t);
        let pv_f = ctx.func.phi_incoming(phi, f);
        let merged = match (pv_t, pv_f) {
            (Some(a), Some(b)) if a == b => a,
            (Some(a), Some(b)) => {
                let ty = ctx.func.value_types[a].clone();
                ctx.func.emit_in(
                    block,
                    Op::Select {
                        cond,
                        on_true: a,
                        on_false: b,
                    },
                    ty,
                )
            }
            _ => continue,
        };
        if let Op::Phi { incoming } = &mut ctx.func.insts[phi].op {
            incoming.retain(|(b, _)| *b != t && *b != f);
            incoming.push((block, merged));
        }
    }
    ctx.func.blocks[block].term = Terminator::Br { target: join };
    ctx.func.clear_block(t);
    ctx.func.clear_block(f);
    ctx.record_dom(vec![
        DomUpdate::Delete(block, t),
        DomUpdate::Delete(block, f),
        DomUpdate::Delete(t, join),
        DomUpdate::Delete(f, join),
        DomUpdate::Insert(block, join),
    ]);
    debug!(?block, "merged conditional stores into a select");
    true
}

pub(crate) fn simplify_uncond_branch(ctx: &mut SimplifyCtx, block: BlockId) -> bool {
    let target = match ctx.func.blocks[block].term {
        Terminator::Br { target } => target,
        _ => return false,
    };
    if target == block {
        return false;
    }
    if try_fold_empty_block(ctx, block, target) {
        return true;
    }
    if try_absorb_compare_into_pred_switch(ctx, block, target) {
        return true;
    }
    if try_merge_successor(ctx, block, target) {
        return true;
    }
    false
}

/// Remove a block that only forwards control: every predecessor branches
/// straight to the successor, with phi entries translated per predecessor.
fn try_fold_empty_block(ctx: &mut SimplifyCtx, block: BlockId, succ: BlockId) -> bool {
    if block == ctx.func.entry {
        return false;
    }
    if ctx.options.need_canonical_loops && ctx.loop_headers.contains(&block) {
        return false;
    }
    if ctx.func.blocks[block]
        .insts
        .iter()
        .any(|&id| !matches!(ctx.func.insts[id].op, Op::DebugMarker(_)))
    {
        return false;
    }
    // Block phis may only feed the successor's phis; anything else would
    // lose its definition.
    for &phi in &ctx.func.blocks[block].phis {
        let r = match ctx.func.insts[phi].result {
            Some(r) => r,
            None => continue,
        };
        for (bb, b) in ctx.func.blocks.iter() {
            for &id in b.insts.iter() {
                if value_operands(&ctx.func.insts[id].op).contains(&r) {
                    return false;
                }
            }
            for &id in b.phis.iter() {
                if value_operands(&ctx.func.insts[id].op).contains(&r) && bb != succ && bb != block
                {
                    return false;
                }
            }
            if term_value_operands(&b.term).contains(&r) {
                return false;
            }
        }
    }
    let preds = ctx.func.predecessors(block);
    if preds.contains(&block) {
        return false;
    }
    // Conflict check: a predecessor that already reaches succ must agree
    // with the value it would now route around block.
    let succ_phis = ctx.func.blocks[succ].phis.clone();
    for &p in &preds {
        for &phi in &succ_phis {
            let v_b = match ctx.func.phi_incoming(phi, block) {
                Some(v) => v,
                None => return false,
            };
            let translated = ctx.func.translate_through_phis(block, p, v_b);
            if let Some(existing) = ctx.func.phi_incoming(phi, p) {
                if existing != translated {
                    return false;
                }
            }
        }
    }

    let mut updates = vec![DomUpdate::Delete(block, succ)];
    for &p in &preds {
        let already = ctx.func.successors(p).contains(&succ);
        for &phi in &succ_phis {
            let v_b = match ctx.func.phi_incoming(phi, block) {
                Some(v) => v,
                None => continue,
            };
            let translated = ctx.func.translate_through_phis(block, p, v_b);
            if ctx.func.phi_incoming(phi, p).is_none() {
                if let Op::Phi { incoming } = &mut ctx.func.insts[phi].op {
                    incoming.push((p, translated));
                }
            }
        }
        ctx.func.blocks[p].term.replace_successor(block, succ);
        updates.push(DomUpdate::Delete(p, block));
        if !already {
            updates.push(DomUpdate::Insert(p, succ));
        }
    }
    ctx.func.remove_phi_incoming(succ, block);
    ctx.func.clear_block(block);
    ctx.record_dom(updates);
    debug!(?block, ?succ, "removed forwarding block");
    true
}

/// A block holding only `x == C` (or `!=`) whose single predecessor is a
/// switch on `x` can resolve or split the comparison.
fn try_absorb_compare_into_pred_switch(
    ctx: &mut SimplifyCtx,
    block: BlockId,
    succ: BlockId,
) -> bool {
    if !ctx.func.blocks[block].phis.is_empty() {
        return false;
    }
    let pred = match ctx.func.single_predecessor(block) {
        Some(p) if p != block => p,
        _ => return false,
    };
    // Exactly one non-free instruction: the compare.
    let mut cmp = None;
    for &id in &ctx.func.blocks[block].insts {
        match &ctx.func.insts[id].op {
            Op::DebugMarker(_) => {}
            Op::Cmp(kind @ (CmpKind::Eq | CmpKind::Ne), a, b) if cmp.is_none() => {
                cmp = Some((id, *kind, *a, *b));
            }
            Op::Const(_) => {}
            _ => return false,
        }
    }
    let (cmp_id, kind, a, b) = match cmp {
        Some(c) => c,
        None => return false,
    };
    let result = match ctx.func.insts[cmp_id].result {
        Some(r) => r,
        None => return false,
    };
    let (scrutinee, constant) = if let Some(c) = ctx.func.constant_of(b).and_then(|c| c.as_int()) {
        (a, c)
    } else if let Some(c) = ctx.func.constant_of(a).and_then(|c| c.as_int()) {
        (b, c)
    } else {
        return false;
    };
    let (sw_value, cases, default) = match &ctx.func.blocks[pred].term {
        Terminator::Switch {
            value,
            cases,
            default,
            ..
        } => (*value, cases.clone(), *default),
        _ => return false,
    };
    if default != block {
        return false;
    }
    if canonical_value(ctx.func, sw_value) != canonical_value(ctx.func, scrutinee) {
        return false;
    }

    if cases.iter().any(|c| c.value == constant) {
        // On the default path the scrutinee cannot equal the constant.
        let folded = ctx
            .func
            .emit_in(block, Op::Const(Constant::Bool(kind == CmpKind::Ne)), Type::Bool);
        ctx.func.blocks[block].insts.retain(|&i| i != cmp_id);
        ctx.func.replace_all_uses(result, folded);
        debug!(?block, constant, "compare on severed switch constant folded");
        return true;
    }

    // The constant is not covered: peel it off the default with its own
    // case. The compare's one use must be a phi in the successor.
    if use_count(ctx.func, result) != 1 {
        return false;
    }
    let target_phi = match ctx.func.blocks[succ]
        .phis
        .iter()
        .find(|&&p| ctx.func.phi_incoming(p, block) == Some(result))
    {
        Some(&p) => p,
        None => return false,
    };
    // Other successor phis must not depend on values defined in block.
    for &phi in &ctx.func.blocks[succ].phis {
        if phi == target_phi {
            continue;
        }
        if let Some(v) = ctx.func.phi_incoming(phi, block) {
            if ctx.func.blocks[block]
                .insts
                .iter()
                .any(|&id| ctx.func.insts[id].result == Some(v))
            {
                return false;
            }
        }
    }

    let new_bb = ctx.func.new_block();
    ctx.func.blocks[new_bb].term = Terminator::Br { target: succ };
    let tv = ctx
        .func
        .emit_in(new_bb, Op::Const(Constant::Bool(kind == CmpKind::Eq)), Type::Bool);
    let fv = ctx
        .func
        .emit_in(block, Op::Const(Constant::Bool(kind == CmpKind::Ne)), Type::Bool);
    ctx.func.blocks[block].insts.retain(|&i| i != cmp_id);
    // New insts go after the retain so ordering stays: const, then term.
    ctx.func.add_phi_incoming_from(succ, new_bb, block);
    let phis = ctx.func.blocks[succ].phis.clone();
    for phi in phis {
        if phi != target_phi {
            continue;
        }
        if let Op::Phi { incoming } = &mut ctx.func.insts[phi].op {
            for (b, v) in incoming.iter_mut() {
                if *b == block {
                    *v = fv;
                } else if *b == new_bb {
                    *v = tv;
                }
            }
        }
    }
    if let Terminator::Switch { cases, weights, .. } = &mut ctx.func.blocks[pred].term {
        cases.push(SwitchCase {
            value: constant,
            dest: new_bb,
        });
        cases.sort_by_key(|c| c.value);
        if let Some(w) = weights {
            w.push(1);
        }
    }
    ctx.record_dom(vec![
        DomUpdate::Insert(pred, new_bb),
        DomUpdate::Insert(new_bb, succ),
    ]);
    debug!(?block, constant, "peeled compare constant into switch case");
    true
}

/// Merge a block with its successor when the successor has no other way
/// in.
fn try_merge_successor(ctx: &mut SimplifyCtx, block: BlockId, target: BlockId) -> bool {
    if target == ctx.func.entry || target == block {
        return false;
    }
    if ctx.func.single_predecessor(target) != Some(block) {
        return false;
    }
    // Single-predecessor phis are just renamings.
    let phis = std::mem::take(&mut ctx.func.blocks[target].phis);
    for phi in phis {
        if let (Some(r), Op::Phi { incoming }) =
            (ctx.func.insts[phi].result, ctx.func.insts[phi].op.clone())
        {
            if let Some(&(_, v)) = incoming.first() {
                ctx.func.replace_all_uses(r, v);
            }
        }
    }
    let insts = std::mem::take(&mut ctx.func.blocks[target].insts);
    let term = std::mem::replace(&mut ctx.func.blocks[target].term, Terminator::Unreachable);
    let succs = term.successors();
    ctx.func.blocks[block].insts.extend(insts);
    ctx.func.blocks[block].term = term;
    let mut updates = vec![DomUpdate::Delete(block, target)];
    let mut seen = std::collections::HashSet::new();
    for s in succs {
        if seen.insert(s) {
            ctx.func.rename_phi_pred(s, target, block);
            updates.push(DomUpdate::Delete(target, s));
            updates.push(DomUpdate::Insert(block, s));
        }
    }
    ctx.record_dom(updates);
    debug!(?block, ?target, "merged block with sole successor");
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FunctionBuilder, FunctionSig};
    use crate::transforms::simplify_cfg::testing::simplify;

    fn sig(params: &[Type]) -> FunctionSig {
        FunctionSig {
            params: params.to_vec(),
            return_ty: Type::Int(32),
        }
    }

    fn ret_const(b: &mut FunctionBuilder, bb: BlockId, v: i64) {
        b.switch_to_block(bb);
        let c = b.const_int(v, Type::Int(32));
        b.ret(Some(c));
    }

    /// A forwarding block between two side-effecting arms and the join
    /// disappears; its predecessors branch to the join directly.
    #[test]
    fn forwarding_block_is_removed() {
        let mut b = FunctionBuilder::new("forward", sig(&[Type::Bool]));
        let c = b.param(0);
        let p1 = b.create_block();
        let p2 = b.create_block();
        let mid = b.create_block();
        let join = b.create_block();
        b.cond_br(c, p1, p2);
        b.switch_to_block(p1);
        b.call_void("left", &[]);
        b.br(mid);
        b.switch_to_block(p2);
        b.call_void("right", &[]);
        b.br(mid);
        b.switch_to_block(mid);
        b.br(join);
        b.switch_to_block(join);
        let z = b.const_int(0, Type::Int(32));
        b.ret(Some(z));

        let func = simplify(b.finish());
        assert!(matches!(func.blocks[p1].term, Terminator::Br { target } if target == join));
        assert!(matches!(func.blocks[p2].term, Terminator::Br { target } if target == join));
        assert!(matches!(func.blocks[mid].term, Terminator::Unreachable));
    }

    /// `if a { if b { X } else { Y } } else { Y }` folds the two branches
    /// into one test of `a & b`.
    #[test]
    fn nested_branch_folds_into_and() {
        let mut b = FunctionBuilder::new("andfold", sig(&[Type::Int(32)]));
        let x = b.param(0);
        let mid = b.create_block();
        let t2 = b.create_block();
        let end = b.create_block();
        let zero = b.const_int(0, Type::Int(32));
        let c1 = b.cmp(CmpKind::Gt, x, zero);
        b.cond_br(c1, mid, end);
        b.switch_to_block(mid);
        let ten = b.const_int(10, Type::Int(32));
        let c2 = b.cmp(CmpKind::Lt, x, ten);
        b.cond_br(c2, t2, end);
        ret_const(&mut b, t2, 1);
        ret_const(&mut b, end, 0);

        let func = simplify(b.finish());
        match func.blocks[func.entry].term {
            Terminator::CondBr {
                cond,
                then_dest,
                else_dest,
                ..
            } => {
                assert_eq!(then_dest, t2);
                assert_eq!(else_dest, end);
                assert!(matches!(
                    func.def_of(cond).map(|i| &i.op),
                    Some(Op::BitAnd(..))
                ));
            }
            ref other => panic!("expected combined branch, got {other:?}"),
        }
        assert!(matches!(func.blocks[mid].term, Terminator::Unreachable));
    }

    /// `if a { X } else { if b { X } else { Y } }` folds into one test of
    /// `a | b`, with branch weights combined to preserve the profile.
    #[test]
    fn nested_branch_folds_into_or() {
        let mut b = FunctionBuilder::new("orfold", sig(&[Type::Bool, Type::Bool]));
        let c1 = b.param(0);
        let c2 = b.param(1);
        let mid = b.create_block();
        let t = b.create_block();
        let e = b.create_block();
        b.cond_br_weighted(c1, t, mid, [3, 5]);
        b.switch_to_block(mid);
        b.cond_br_weighted(c2, t, e, [7, 9]);
        ret_const(&mut b, t, 1);
        ret_const(&mut b, e, 0);

        let func = simplify(b.finish());
        match func.blocks[func.entry].term {
            Terminator::CondBr {
                cond,
                then_dest,
                else_dest,
                weights,
            } => {
                assert_eq!(then_dest, t);
                assert_eq!(else_dest, e);
                assert_eq!(weights, Some([83, 45]));
                match func.def_of(cond).map(|i| &i.op) {
                    Some(Op::BitOr(a, bb)) => {
                        assert_eq!(*a, c1);
                        assert_eq!(*bb, c2);
                    }
                    other => panic!("expected or of both conditions, got {other:?}"),
                }
            }
            ref other => panic!("expected combined branch, got {other:?}"),
        }
        assert!(matches!(func.blocks[mid].term, Terminator::Unreachable));
    }

    /// `if a { Y } else { if b { X } else { Y } }` folds into a test of
    /// `!a & b`; only the path through both branches reaches X.
    #[test]
    fn nested_branch_folds_into_negated_and() {
        let mut b = FunctionBuilder::new("negandfold", sig(&[Type::Bool, Type::Bool]));
        let c1 = b.param(0);
        let c2 = b.param(1);
        let mid = b.create_block();
        let t = b.create_block();
        let e = b.create_block();
        b.cond_br_weighted(c1, e, mid, [3, 5]);
        b.switch_to_block(mid);
        b.cond_br_weighted(c2, t, e, [7, 9]);
        ret_const(&mut b, t, 1);
        ret_const(&mut b, e, 0);

        let func = simplify(b.finish());
        match func.blocks[func.entry].term {
            Terminator::CondBr {
                cond,
                then_dest,
                else_dest,
                weights,
            } => {
                assert_eq!(then_dest, t);
                assert_eq!(else_dest, e);
                assert_eq!(weights, Some([35, 93]));
                match func.def_of(cond).map(|i| &i.op) {
                    Some(Op::BitAnd(n, bb)) => {
                        assert!(matches!(
                            func.def_of(*n).map(|i| &i.op),
                            Some(Op::Not(v)) if *v == c1
                        ));
                        assert_eq!(*bb, c2);
                    }
                    other => panic!("expected and with negated outer, got {other:?}"),
                }
            }
            ref other => panic!("expected combined branch, got {other:?}"),
        }
        assert!(matches!(func.blocks[mid].term, Terminator::Unreachable));
    }

    /// `if a { if b { X } else { Y } } else { X }` folds into a test of
    /// `!a | b`.
    #[test]
    fn nested_branch_folds_into_negated_or() {
        let mut b = FunctionBuilder::new("negorfold", sig(&[Type::Bool, Type::Bool]));
        let c1 = b.param(0);
        let c2 = b.param(1);
        let mid = b.create_block();
        let t = b.create_block();
        let e = b.create_block();
        b.cond_br_weighted(c1, mid, t, [3, 5]);
        b.switch_to_block(mid);
        b.cond_br_weighted(c2, t, e, [7, 9]);
        ret_const(&mut b, t, 1);
        ret_const(&mut b, e, 0);

        let func = simplify(b.finish());
        match func.blocks[func.entry].term {
            Terminator::CondBr {
                cond,
                then_dest,
                else_dest,
                weights,
            } => {
                assert_eq!(then_dest, t);
                assert_eq!(else_dest, e);
                assert_eq!(weights, Some([101, 27]));
                match func.def_of(cond).map(|i| &i.op) {
                    Some(Op::BitOr(n, bb)) => {
                        assert!(matches!(
                            func.def_of(*n).map(|i| &i.op),
                            Some(Op::Not(v)) if *v == c1
                        ));
                        assert_eq!(*bb, c2);
                    }
                    other => panic!("expected or with negated outer, got {other:?}"),
                }
            }
            ref other => panic!("expected combined branch, got {other:?}"),
        }
        assert!(matches!(func.blocks[mid].term, Terminator::Unreachable));
    }

    /// When the folded branches share a destination with a phi, the two
    /// incoming values merge into a select on the outer condition. The
    /// direct edge ran when the outer condition held, so its value sits
    /// on the true side.
    #[test]
    fn shared_arm_phi_becomes_select() {
        let mut b = FunctionBuilder::new(
            "sharedarm",
            sig(&[Type::Bool, Type::Bool, Type::Int(32), Type::Int(32)]),
        );
        let c1 = b.param(0);
        let c2 = b.param(1);
        let xv = b.param(2);
        let yv = b.param(3);
        let entry = b.current_block();
        let mid = b.create_block();
        let t = b.create_block();
        let e = b.create_block();
        b.cond_br(c1, t, mid);
        b.switch_to_block(mid);
        b.cond_br(c2, t, e);
        b.switch_to_block(t);
        let p = b.phi(Type::Int(32), &[(entry, xv), (mid, yv)]);
        b.ret(Some(p));
        ret_const(&mut b, e, 0);

        let func = simplify(b.finish());
        let sel = match func
            .blocks[t]
            .phis
            .first()
            .map(|&p| func.insts[p].op.clone())
        {
            Some(Op::Phi { incoming }) => {
                assert_eq!(incoming.len(), 1);
                assert_eq!(incoming[0].0, func.entry);
                incoming[0].1
            }
            other => panic!("expected merged phi, got {other:?}"),
        };
        match func.def_of(sel).map(|i| &i.op) {
            Some(Op::Select {
                cond,
                on_true,
                on_false,
            }) => {
                assert_eq!(*cond, c1);
                assert_eq!(*on_true, xv);
                assert_eq!(*on_false, yv);
            }
            other => panic!("expected select over the arm values, got {other:?}"),
        }
    }

    /// A branch on a condition an ancestor already tested follows the
    /// decided edge.
    #[test]
    fn dominated_condition_is_decided() {
        let mut b = FunctionBuilder::new("dominated", sig(&[Type::Bool]));
        let c = b.param(0);
        let a = b.create_block();
        let t = b.create_block();
        let f = b.create_block();
        let end = b.create_block();
        b.cond_br(c, a, end);
        b.switch_to_block(a);
        b.call_void("work", &[]);
        b.cond_br(c, t, f);
        ret_const(&mut b, t, 1);
        ret_const(&mut b, f, 0);
        ret_const(&mut b, end, 2);

        let func = simplify(b.finish());
        // The second test of c is gone; the work block returns 1 directly.
        match func.blocks[a].term {
            Terminator::Return { value: Some(v) } => {
                assert_eq!(func.constant_of(v), Some(&Constant::Int(1)));
            }
            ref other => panic!("expected direct return, got {other:?}"),
        }
    }

    /// Predecessors that pin a branch phi to a constant jump straight to
    /// the decided destination.
    #[test]
    fn constant_phi_arms_are_threaded() {
        let mut b = FunctionBuilder::new("phithread", sig(&[Type::Int(32), Type::Bool]));
        let x = b.param(0);
        let y = b.param(1);
        let a = b.create_block();
        let bb = b.create_block();
        let m = b.create_block();
        let t = b.create_block();
        let e = b.create_block();
        b.switch(x, &[(1, a)], bb);
        b.switch_to_block(a);
        let ct = b.const_bool(true);
        b.br(m);
        b.switch_to_block(bb);
        b.br(m);
        b.switch_to_block(m);
        let p = b.phi(Type::Bool, &[(a, ct), (bb, y)]);
        b.cond_br(p, t, e);
        ret_const(&mut b, t, 1);
        ret_const(&mut b, e, 0);

        let func = simplify(b.finish());
        // The a-path reaches t without ever testing y; the remaining
        // branch tests y itself once the phi degenerates.
        assert!(matches!(func.blocks[a].term, Terminator::Br { target } if target == t));
        assert!(matches!(
            func.blocks[m].term,
            Terminator::CondBr { cond, then_dest, else_dest, .. }
                if cond == y && then_dest == t && else_dest == e
        ));
        assert!(func.blocks[m].phis.is_empty());
    }

    /// An uncovered compare below a switch default becomes its own case.
    #[test]
    fn uncovered_compare_becomes_switch_case() {
        let mut b = FunctionBuilder::new("peel", sig(&[Type::Int(32), Type::Bool]));
        let x = b.param(0);
        let y = b.param(1);
        let d1 = b.create_block();
        let db = b.create_block();
        let join = b.create_block();
        b.switch(x, &[(17, d1)], db);
        b.switch_to_block(db);
        let n = b.const_int(99, Type::Int(32));
        let cmp = b.cmp(CmpKind::Eq, x, n);
        b.br(join);
        b.switch_to_block(d1);
        b.br(join);
        b.switch_to_block(join);
        let r = b.phi(Type::Bool, &[(db, cmp), (d1, y)]);
        let _ = r;
        let c = b.const_int(0, Type::Int(32));
        b.ret(Some(c));

        let func = simplify(b.finish());
        let (cases, _) = match &func.blocks[func.entry].term {
            Terminator::Switch { cases, default, .. } => (cases.clone(), *default),
            other => panic!("expected switch, got {other:?}"),
        };
        assert_eq!(cases.iter().map(|c| c.value).collect::<Vec<_>>(), vec![17, 99]);
        let new_bb = cases[1].dest;
        let (db_v, nb_v) = match func
            .blocks[join]
            .phis
            .first()
            .map(|&p| func.insts[p].op.clone())
        {
            Some(Op::Phi { incoming }) => {
                let db_v = incoming.iter().find(|(b, _)| *b == db).map(|(_, v)| *v);
                let nb_v = incoming.iter().find(|(b, _)| *b == new_bb).map(|(_, v)| *v);
                (db_v.unwrap(), nb_v.unwrap())
            }
            other => panic!("expected phi, got {other:?}"),
        };
        assert_eq!(func.constant_of(db_v), Some(&Constant::Bool(false)));
        assert_eq!(func.constant_of(nb_v), Some(&Constant::Bool(true)));
    }

    /// Two arms that store different values to the same slot collapse to
    /// one store of a select.
    #[test]
    fn store_diamond_becomes_select() {
        let mut b = FunctionBuilder::new(
            "storediamond",
            FunctionSig {
                params: vec![Type::Bool, Type::Ptr, Type::Int(32), Type::Int(32)],
                return_ty: Type::Void,
            },
        );
        let c = b.param(0);
        let ptr = b.param(1);
        let v1 = b.param(2);
        let v2 = b.param(3);
        let t = b.create_block();
        let f = b.create_block();
        let s = b.create_block();
        b.cond_br(c, t, f);
        b.switch_to_block(t);
        b.store(ptr, v1);
        b.br(s);
        b.switch_to_block(f);
        b.store(ptr, v2);
        b.br(s);
        b.switch_to_block(s);
        b.ret(None);

        let func = simplify(b.finish());
        let entry = &func.blocks[func.entry];
        assert!(matches!(entry.term, Terminator::Return { value: None }));
        let ops: Vec<_> = entry
            .insts
            .iter()
            .map(|&id| func.insts[id].op.clone())
            .collect();
        assert!(ops.iter().any(|op| matches!(op, Op::Select { .. })));
        assert!(ops.iter().any(|op| matches!(op, Op::Store { .. })));
        assert!(matches!(func.blocks[t].term, Terminator::Unreachable));
        assert!(matches!(func.blocks[f].term, Terminator::Unreachable));
    }
}
