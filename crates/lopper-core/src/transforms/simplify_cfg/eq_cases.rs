//! Value-equality comparisons and folding them between blocks.
//!
//! A conditional branch on `x == C` and a switch on `x` are the same
//! shape: a scrutinee, a list of (constant, destination) cases, and a
//! default. When a block and one of its predecessors both branch on the
//! same scrutinee, the predecessor's edges into the block can be routed
//! around it by merging the two case lists.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::analysis::DomUpdate;
use crate::ir::{BlockId, CmpKind, Function, Op, SwitchCase, Terminator, Type, ValueId};
use crate::transforms::util::remove_dead_defs;

use super::SimplifyCtx;

/// A decoded value-equality terminator.
#[derive(Debug, Clone)]
pub(crate) struct ValueComparison {
    /// Canonical scrutinee.
    pub value: ValueId,
    pub cases: Vec<(i64, BlockId)>,
    pub default: BlockId,
    /// Index 0 is the default edge, index `i + 1` belongs to `cases[i]`.
    pub weights: Option<Vec<u64>>,
}

/// Strip value-preserving wrappers (copies and lossless casts) so that two
/// comparisons on the same underlying value decode to the same scrutinee.
pub(crate) fn canonical_value(func: &Function, value: ValueId) -> ValueId {
    let mut v = value;
    for _ in 0..8 {
        let op = match func.def_of(v) {
            Some(inst) => &inst.op,
            None => break,
        };
        match op {
            Op::Copy(inner) => v = *inner,
            Op::Cast(inner, to_ty) => {
                let from_ty = match func.value_types.get(*inner) {
                    Some(t) => t,
                    None => break,
                };
                let lossless = match (from_ty.bit_width(), to_ty.bit_width()) {
                    (Some(a), Some(b)) => a == b,
                    _ => *from_ty == Type::Ptr && to_ty.bit_width() == Some(64),
                };
                if !lossless {
                    break;
                }
                v = *inner;
            }
            _ => break,
        }
    }
    v
}

/// Decode `block`'s terminator as a value-equality comparison, if it is
/// one. Switches decode directly; a conditional branch qualifies when its
/// condition is an equality compare against an integer constant.
pub(crate) fn value_equality_comparison(func: &Function, block: BlockId) -> Option<ValueComparison> {
    match &func.blocks[block].term {
        Terminator::Switch {
            value,
            cases,
            default,
            weights,
        } => Some(ValueComparison {
            value: canonical_value(func, *value),
            cases: cases.iter().map(|c| (c.value, c.dest)).collect(),
            default: *default,
            weights: weights.clone(),
        }),
        Terminator::CondBr {
            cond,
            then_dest,
            else_dest,
            weights,
        } => {
            let (kind, a, b) = match func.def_of(*cond).map(|i| &i.op) {
                Some(Op::Cmp(kind @ (CmpKind::Eq | CmpKind::Ne), a, b)) => (*kind, *a, *b),
                _ => return None,
            };
            let (scrutinee, constant) = if let Some(c) = func.constant_of(b).and_then(|c| c.as_int())
            {
                (a, c)
            } else if let Some(c) = func.constant_of(a).and_then(|c| c.as_int()) {
                (b, c)
            } else {
                return None;
            };
            let value = canonical_value(func, scrutinee);
            match kind {
                CmpKind::Eq => Some(ValueComparison {
                    value,
                    cases: vec![(constant, *then_dest)],
                    default: *else_dest,
                    weights: (*weights).map(|[t, e]| vec![e, t]),
                }),
                CmpKind::Ne => Some(ValueComparison {
                    value,
                    cases: vec![(constant, *else_dest)],
                    default: *then_dest,
                    weights: (*weights).map(|[t, e]| vec![t, e]),
                }),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Fold `block`'s value comparison into every predecessor that branches on
/// the same scrutinee, rerouting the predecessor's edges around `block`.
pub(crate) fn fold_value_comparison_into_predecessors(
    ctx: &mut SimplifyCtx,
    block: BlockId,
) -> bool {
    let bcomp = match value_equality_comparison(ctx.func, block) {
        Some(c) => c,
        None => return false,
    };
    let preds = ctx.func.predecessors(block);
    let work = preds.len() as u32 * (bcomp.cases.len() as u32 + 1);
    if work > ctx.options.max_predecessor_fold_work {
        return false;
    }
    let mut changed = false;
    for pred in preds {
        if pred == block {
            continue;
        }
        if fold_into_pred(ctx, block, &bcomp, pred) {
            debug!(?pred, ?block, "folded value comparison into predecessor");
            changed = true;
        }
    }
    if changed {
        ctx.delete_block_if_dead(block);
    }
    changed
}

fn defined_in_block(func: &Function, block: BlockId, value: ValueId) -> bool {
    let b = &func.blocks[block];
    b.phis
        .iter()
        .chain(b.insts.iter())
        .any(|&id| func.insts[id].result == Some(value))
}

fn fold_into_pred(
    ctx: &mut SimplifyCtx,
    block: BlockId,
    bcomp: &ValueComparison,
    pred: BlockId,
) -> bool {
    let pcomp = match value_equality_comparison(ctx.func, pred) {
        Some(c) => c,
        None => return false,
    };
    if pcomp.value != bcomp.value {
        return false;
    }

    let has_weights = pcomp.weights.is_some() || bcomp.weights.is_some();
    let pw = pcomp
        .weights
        .clone()
        .unwrap_or_else(|| vec![1; pcomp.cases.len() + 1]);
    let tw = bcomp
        .weights
        .clone()
        .unwrap_or_else(|| vec![1; bcomp.cases.len() + 1]);
    let sum_t: u64 = tw.iter().fold(0u64, |a, &b| a.saturating_add(b));

    // Merge the case lists. Each merged weight is the product of one
    // predecessor weight and one block weight so ratios stay consistent.
    // Entries marked rerouted travel through block and carry block's phi
    // values; the rest are pred's surviving edges.
    let mut new_cases: Vec<(i64, BlockId, u64, bool)> = Vec::new();
    let default_dest;
    let default_weight;
    let default_rerouted;

    if pcomp.default == block {
        // Constants the predecessor already settles elsewhere.
        let handled: HashSet<i64> = pcomp
            .cases
            .iter()
            .filter(|(_, d)| *d != block)
            .map(|(c, _)| *c)
            .collect();
        // Total weight flowing from pred into block, including explicit
        // cases that target it.
        let mut w_pb = pw[0];
        for (i, (_, d)) in pcomp.cases.iter().enumerate() {
            if *d == block {
                w_pb = w_pb.saturating_add(pw[i + 1]);
            }
        }
        default_dest = bcomp.default;
        default_weight = w_pb.saturating_mul(tw[0]);
        default_rerouted = true;
        for (i, (c, d)) in pcomp.cases.iter().enumerate() {
            if *d != block {
                new_cases.push((*c, *d, pw[i + 1].saturating_mul(sum_t), false));
            }
        }
        for (j, (c, d)) in bcomp.cases.iter().enumerate() {
            if !handled.contains(c) && *d != bcomp.default {
                new_cases.push((*c, *d, w_pb.saturating_mul(tw[j + 1]), true));
            }
        }
    } else {
        // Pred reaches block only through explicit cases; route each of
        // those constants to wherever block's comparison sends it.
        default_dest = pcomp.default;
        default_weight = pw[0].saturating_mul(sum_t);
        default_rerouted = false;
        for (i, (c, d)) in pcomp.cases.iter().enumerate() {
            if *d != block {
                new_cases.push((*c, *d, pw[i + 1].saturating_mul(sum_t), false));
            } else {
                match bcomp.cases.iter().position(|(bc, _)| bc == c) {
                    Some(j) => new_cases.push((
                        *c,
                        bcomp.cases[j].1,
                        pw[i + 1].saturating_mul(tw[j + 1]),
                        true,
                    )),
                    None => {
                        new_cases.push((*c, bcomp.default, pw[i + 1].saturating_mul(tw[0]), true))
                    }
                }
            }
        }
    }

    // Phi consistency. Edges rerouted through block carry block's incoming
    // phi values translated to pred; those values must not be defined
    // inside block itself. A destination pred already reaches with a
    // different value gets its surviving edges moved onto a forwarding
    // block so the two keys can coexist.
    let old_succs: HashSet<BlockId> = ctx.func.successors(pred).into_iter().collect();
    let mut rerouted_dests: Vec<BlockId> = Vec::new();
    if default_rerouted {
        rerouted_dests.push(default_dest);
    }
    for (_, d, _, rerouted) in &new_cases {
        if *rerouted && !rerouted_dests.contains(d) {
            rerouted_dests.push(*d);
        }
    }
    let mut phi_additions: Vec<(crate::ir::InstId, ValueId)> = Vec::new();
    let mut split_dests: Vec<BlockId> = Vec::new();
    for &s in &rerouted_dests {
        if s == block {
            continue;
        }
        let gained = !old_succs.contains(&s);
        let mut conflict = false;
        let mut translated_vals: Vec<(crate::ir::InstId, ValueId)> = Vec::new();
        let phis = ctx.func.blocks[s].phis.clone();
        for phi in phis {
            let v_b = match ctx.func.phi_incoming(phi, block) {
                Some(v) => v,
                None => return false,
            };
            let translated = ctx.func.translate_through_phis(block, pred, v_b);
            if defined_in_block(ctx.func, block, translated) {
                return false;
            }
            translated_vals.push((phi, translated));
            if !gained && ctx.func.phi_incoming(phi, pred) != Some(translated) {
                conflict = true;
            }
        }
        if gained || conflict {
            phi_additions.extend(translated_vals);
        }
        if conflict {
            split_dests.push(s);
        }
    }

    // Commit. Conflicting destinations first: the old edges slide onto a
    // split block so the rerouted edges can take over pred's phi key.
    let mut updates = vec![DomUpdate::Delete(pred, block)];
    let mut split_mids: HashMap<BlockId, BlockId> = HashMap::new();
    for &s in &split_dests {
        let mid = ctx.func.split_edge(pred, s);
        updates.push(DomUpdate::Insert(pred, mid));
        updates.push(DomUpdate::Insert(mid, s));
        split_mids.insert(s, mid);
    }
    // Edges that would target block itself become a fresh self-looping
    // block: they are unreachable in practice, but the terminator still
    // needs a destination.
    let mut sentinel: Option<BlockId> = None;
    let mut resolve = |ctx: &mut SimplifyCtx, d: BlockId, updates: &mut Vec<DomUpdate>| {
        if d != block {
            return d;
        }
        let sb = *sentinel.get_or_insert_with(|| {
            let sb = ctx.func.new_block();
            ctx.func.blocks[sb].term = Terminator::Br { target: sb };
            sb
        });
        updates.push(DomUpdate::Insert(pred, sb));
        sb
    };
    let final_default = if default_rerouted {
        resolve(ctx, default_dest, &mut updates)
    } else {
        *split_mids.get(&default_dest).unwrap_or(&default_dest)
    };
    let mut cases: Vec<SwitchCase> = Vec::new();
    let mut case_weights: Vec<u64> = Vec::new();
    let mut merged: Vec<(i64, BlockId, u64, bool)> = new_cases;
    merged.sort_by_key(|(c, _, _, _)| *c);
    for (c, d, w, rerouted) in merged {
        let dest = if rerouted {
            resolve(ctx, d, &mut updates)
        } else {
            *split_mids.get(&d).unwrap_or(&d)
        };
        cases.push(SwitchCase { value: c, dest });
        case_weights.push(w);
    }
    for &s in &rerouted_dests {
        if s != block && !old_succs.contains(&s) {
            updates.push(DomUpdate::Insert(pred, s));
        }
    }
    for (phi, v) in phi_additions {
        if let Op::Phi { incoming } = &mut ctx.func.insts[phi].op {
            incoming.push((pred, v));
        }
    }

    let weights = if has_weights {
        let mut w: Vec<u64> = std::iter::once(default_weight).chain(case_weights).collect();
        while w.iter().any(|&x| x > u32::MAX as u64) {
            for x in w.iter_mut() {
                *x = (*x / 2).max(1);
            }
        }
        Some(w)
    } else {
        None
    };

    ctx.func.blocks[pred].term = Terminator::Switch {
        value: bcomp.value,
        cases,
        default: final_default,
        weights,
    };
    ctx.func.remove_phi_incoming(block, pred);
    // A compare that only fed pred's old branch is dead now.
    remove_dead_defs(ctx.func, pred);
    ctx.record_dom(updates);
    true
}
