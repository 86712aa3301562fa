//! Hoisting of identical leading instructions out of branch arms, and
//! sinking of identical trailing instructions out of predecessors.

use tracing::debug;

use crate::analysis::DomUpdate;
use crate::ir::{BlockId, InstId, Op, Terminator};

use super::SimplifyCtx;

fn next_real(ctx: &SimplifyCtx, block: BlockId, from: usize) -> Option<(usize, InstId)> {
    ctx.func.blocks[block]
        .insts
        .iter()
        .enumerate()
        .skip(from)
        .find(|(_, &id)| !matches!(ctx.func.insts[id].op, Op::DebugMarker(_)))
        .map(|(i, &id)| (i, id))
}

/// Hoist instructions both arms of a two-way branch start with into the
/// branching block. When the arms empty out completely the terminator is
/// hoisted too, merging value differences with selects.
pub(crate) fn hoist_then_else_common(ctx: &mut SimplifyCtx, block: BlockId) -> bool {
    let (cond, t, f) = match ctx.func.blocks[block].term {
        Terminator::CondBr {
            cond,
            then_dest,
            else_dest,
            ..
        } => (cond, then_dest, else_dest),
        _ => return false,
    };
    if t == f || t == block || f == block {
        return false;
    }
    for arm in [t, f] {
        if ctx.func.single_predecessor(arm) != Some(block)
            || !ctx.func.blocks[arm].phis.is_empty()
        {
            return false;
        }
    }

    let mut changed = false;
    let (mut ti, mut fi) = (0usize, 0usize);
    loop {
        let (tpos, tid) = match next_real(ctx, t, ti) {
            Some(x) => x,
            None => break,
        };
        let (fpos, fid) = match next_real(ctx, f, fi) {
            Some(x) => x,
            None => break,
        };
        let same_op = ctx.func.insts[tid].op == ctx.func.insts[fid].op;
        if !same_op || !ctx.cost.is_profitable_to_hoist(&ctx.func.insts[tid].op) {
            break;
        }
        ctx.func.blocks[t].insts.remove(tpos);
        ctx.func.blocks[f].insts.remove(fpos);
        ctx.func.blocks[block].insts.push(tid);
        if let (Some(ra), Some(rb)) = (ctx.func.insts[tid].result, ctx.func.insts[fid].result) {
            ctx.func.replace_all_uses(rb, ra);
        }
        ti = tpos;
        fi = fpos;
        changed = true;
    }

    // Only markers left on both sides: the terminator itself may be common.
    if next_real(ctx, t, ti).is_none() && next_real(ctx, f, fi).is_none() {
        match (ctx.func.blocks[t].term.clone(), ctx.func.blocks[f].term.clone()) {
            (Terminator::Br { target: ts }, Terminator::Br { target: fs })
                if ts == fs && ts != block && ts != t && ts != f =>
            {
                let succ = ts;
                let phis = ctx.func.blocks[succ].phis.clone();
                for phi in phis {
                    let vt = match ctx.func.phi_incoming(phi, t) {
                        Some(v) => v,
                        None => continue,
                    };
                    let vf = match ctx.func.phi_incoming(phi, f) {
                        Some(v) => v,
                        None => continue,
                    };
                    let merged = if vt == vf {
                        vt
                    } else {
                        let ty = ctx.func.value_types[vt].clone();
                        ctx.func.emit_in(
                            block,
                            Op::Select {
                                cond,
                                on_true: vt,
                                on_false: vf,
                            },
                            ty,
                        )
                    };
                    if let Op::Phi { incoming } = &mut ctx.func.insts[phi].op {
                        incoming.retain(|(b, _)| *b != t && *b != f);
                        incoming.push((block, merged));
                    }
                }
                ctx.func.blocks[block].term = Terminator::Br { target: succ };
                ctx.func.clear_block(t);
                ctx.func.clear_block(f);
                ctx.record_dom(vec![
                    DomUpdate::Delete(block, t),
                    DomUpdate::Delete(block, f),
                    DomUpdate::Delete(t, succ),
                    DomUpdate::Delete(f, succ),
                    DomUpdate::Insert(block, succ),
                ]);
                debug!(?block, ?succ, "hoisted common branch into select");
                return true;
            }
            (Terminator::Return { value: vt }, Terminator::Return { value: vf }) => {
                let value = match (vt, vf) {
                    (None, None) => None,
                    (Some(a), Some(b)) if a == b => Some(a),
                    (Some(a), Some(b)) => {
                        let ty = ctx.func.value_types[a].clone();
                        Some(ctx.func.emit_in(
                            block,
                            Op::Select {
                                cond,
                                on_true: a,
                                on_false: b,
                            },
                            ty,
                        ))
                    }
                    _ => return changed,
                };
                ctx.func.blocks[block].term = Terminator::Return { value };
                ctx.func.clear_block(t);
                ctx.func.clear_block(f);
                ctx.record_dom(vec![
                    DomUpdate::Delete(block, t),
                    DomUpdate::Delete(block, f),
                ]);
                debug!(?block, "hoisted common return");
                return true;
            }
            _ => {}
        }
    }
    changed
}

/// Sink an instruction every unconditional predecessor ends with into the
/// head of the block.
pub(crate) fn sink_common_from_predecessors(ctx: &mut SimplifyCtx, block: BlockId) -> bool {
    let preds = ctx.func.predecessors(block);
    if preds.len() < 2 || preds.contains(&block) {
        return false;
    }
    for &p in &preds {
        if !matches!(ctx.func.blocks[p].term, Terminator::Br { target } if target == block) {
            return false;
        }
    }

    let mut changed = false;
    loop {
        let mut lasts = Vec::with_capacity(preds.len());
        for &p in &preds {
            match ctx.func.blocks[p].insts.last().copied() {
                Some(id) if !matches!(ctx.func.insts[id].op, Op::DebugMarker(_)) => {
                    lasts.push(id)
                }
                _ => return changed,
            }
        }
        let first = lasts[0];
        if !lasts[1..]
            .iter()
            .all(|&id| ctx.func.insts[id].op == ctx.func.insts[first].op)
        {
            return changed;
        }
        for &p in &preds {
            ctx.func.blocks[p].insts.pop();
        }
        ctx.func.blocks[block].insts.insert(0, first);
        if let Some(ra) = ctx.func.insts[first].result {
            for &id in &lasts[1..] {
                if let Some(rb) = ctx.func.insts[id].result {
                    ctx.func.replace_all_uses(rb, ra);
                }
            }
        }
        debug!(?block, "sank common instruction out of predecessors");
        changed = true;
    }
}
