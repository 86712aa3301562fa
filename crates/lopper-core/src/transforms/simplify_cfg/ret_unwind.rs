//! Folding of trivial return blocks into their predecessors and removal
//! of exception plumbing that does no work: landing pads that immediately
//! resume and cleanup pads with empty bodies.

use tracing::debug;

use crate::analysis::DomUpdate;
use crate::ir::{BlockId, Function, Inst, Op, Span, Terminator, ValueId};
use crate::transforms::util::{term_value_operands, value_operands};

use super::SimplifyCtx;

fn markers_only(func: &Function, block: BlockId) -> bool {
    func.blocks[block]
        .insts
        .iter()
        .all(|&id| matches!(func.insts[id].op, Op::DebugMarker(_)))
}

/// Uses of `value` in placed instructions and phis, not counting
/// terminators.
fn inst_use_count(func: &Function, value: ValueId) -> usize {
    let mut n = 0;
    for (_, b) in func.blocks.iter() {
        for &id in b.phis.iter().chain(b.insts.iter()) {
            n += value_operands(&func.insts[id].op)
                .iter()
                .filter(|&&v| v == value)
                .count();
        }
    }
    n
}

/// Uses of `value` in terminators of blocks other than `except`.
fn term_use_elsewhere(func: &Function, value: ValueId, except: BlockId) -> bool {
    func.blocks
        .iter()
        .any(|(bb, b)| bb != except && term_value_operands(&b.term).contains(&value))
}

fn convert_invoke_to_call(ctx: &mut SimplifyCtx, pred: BlockId) {
    if let Terminator::Invoke {
        func,
        args,
        result,
        normal,
        ..
    } = ctx.func.blocks[pred].term.clone()
    {
        let id = ctx.func.insts.push(Inst {
            op: Op::Call { func, args },
            result,
            span: Span::default(),
        });
        ctx.func.blocks[pred].insts.push(id);
        ctx.func.blocks[pred].term = Terminator::Br { target: normal };
    }
}

/// Fold a trivial return block into predecessors: a conditional branch
/// whose arms both immediately return becomes a returned select, and with
/// the duplication option on, unconditional predecessors get their own
/// copy of the return.
pub(crate) fn simplify_return(ctx: &mut SimplifyCtx, block: BlockId) -> bool {
    let ret_value = match ctx.func.blocks[block].term {
        Terminator::Return { value } => value,
        _ => return false,
    };
    if !markers_only(ctx.func, block) {
        return false;
    }
    let preds = ctx.func.predecessors(block);
    for &p in &preds {
        match ctx.func.blocks[p].term.clone() {
            Terminator::CondBr {
                cond,
                then_dest,
                else_dest,
                ..
            } if then_dest != else_dest => {
                let other = if then_dest == block { else_dest } else { then_dest };
                let other_value = match ctx.func.blocks[other].term {
                    Terminator::Return { value } => value,
                    _ => continue,
                };
                if !markers_only(ctx.func, other) {
                    continue;
                }
                let (bv, ov) = (ret_value, other_value);
                let resolve = |ctx: &SimplifyCtx, bb: BlockId, v: Option<ValueId>| {
                    v.map(|v| ctx.func.translate_through_phis(bb, p, v))
                };
                let value = match (resolve(ctx, block, bv), resolve(ctx, other, ov)) {
                    (None, None) => None,
                    (Some(a), Some(b)) if a == b => Some(a),
                    (Some(a), Some(b)) => {
                        let (on_true, on_false) = if then_dest == block { (a, b) } else { (b, a) };
                        let ty = ctx.func.value_types[on_true].clone();
                        Some(ctx.func.emit_in(
                            p,
                            Op::Select {
                                cond,
                                on_true,
                                on_false,
                            },
                            ty,
                        ))
                    }
                    _ => continue,
                };
                ctx.func.blocks[p].term = Terminator::Return { value };
                ctx.func.remove_phi_incoming(block, p);
                ctx.func.remove_phi_incoming(other, p);
                ctx.record_dom(vec![
                    DomUpdate::Delete(p, block),
                    DomUpdate::Delete(p, other),
                ]);
                ctx.delete_block_if_dead(block);
                ctx.delete_block_if_dead(other);
                debug!(?p, "folded two return arms into a select");
                return true;
            }
            Terminator::Br { .. }
                if ctx.options.fold_return_into_predecessors && preds.len() > 1 =>
            {
                let value = ret_value.map(|v| ctx.func.translate_through_phis(block, p, v));
                ctx.func.blocks[p].term = Terminator::Return { value };
                ctx.func.remove_phi_incoming(block, p);
                ctx.record_dom(vec![DomUpdate::Delete(p, block)]);
                ctx.delete_block_if_dead(block);
                debug!(?p, ?block, "duplicated return into predecessor");
                return true;
            }
            _ => {}
        }
    }
    false
}

/// A landing pad that only resumes does nothing: the exception would have
/// propagated anyway, so the invokes feeding it become plain calls.
pub(crate) fn simplify_resume(ctx: &mut SimplifyCtx, block: BlockId) -> bool {
    let value = match ctx.func.blocks[block].term {
        Terminator::Resume { value } => value,
        _ => return false,
    };
    if is_trivial_pad(ctx.func, block, value, |op| matches!(op, Op::LandingPad)) {
        return retire_resume_pad(ctx, block, value);
    }
    // A resume of a phi: incoming arms that are themselves trivial landing
    // pad forwarders can be retired one at a time.
    let phi = match ctx.func.blocks[block]
        .phis
        .iter()
        .find(|&&id| ctx.func.insts[id].result == Some(value))
    {
        Some(&phi) if markers_only(ctx.func, block) => phi,
        _ => return false,
    };
    let incoming = match &ctx.func.insts[phi].op {
        Op::Phi { incoming } => incoming.clone(),
        _ => return false,
    };
    let mut changed = false;
    for (p, v) in incoming {
        if !is_trivial_pad(ctx.func, p, v, |op| matches!(op, Op::LandingPad))
            || !matches!(ctx.func.blocks[p].term, Terminator::Br { target } if target == block)
        {
            continue;
        }
        if retire_resume_pad(ctx, p, v) {
            changed = true;
        }
    }
    if changed {
        ctx.delete_block_if_dead(block);
    }
    changed
}

/// Body is exactly one pad instruction defining `pad`, plus markers, with
/// no phis and no other users of the pad token.
fn is_trivial_pad(
    func: &Function,
    block: BlockId,
    pad: ValueId,
    is_pad: impl Fn(&Op) -> bool,
) -> bool {
    if !func.blocks[block].phis.is_empty() {
        return false;
    }
    let mut found = false;
    for &id in &func.blocks[block].insts {
        let inst = &func.insts[id];
        match &inst.op {
            Op::DebugMarker(_) => {}
            op if is_pad(op) && inst.result == Some(pad) && !found => found = true,
            _ => return false,
        }
    }
    found
}

fn retire_resume_pad(ctx: &mut SimplifyCtx, block: BlockId, pad: ValueId) -> bool {
    if inst_use_count(ctx.func, pad) > pad_uses_in_phis(ctx.func, block, pad)
        || term_use_elsewhere(ctx.func, pad, block)
    {
        return false;
    }
    let preds = ctx.func.predecessors(block);
    if preds.is_empty() {
        return false;
    }
    for &p in &preds {
        if !matches!(ctx.func.blocks[p].term, Terminator::Invoke { unwind, .. } if unwind == block)
        {
            return false;
        }
    }
    for &p in &preds {
        convert_invoke_to_call(ctx, p);
        ctx.record_dom(vec![DomUpdate::Delete(p, block)]);
    }
    ctx.delete_block_if_dead(block);
    debug!(?block, "removed landing pad that only resumes");
    true
}

/// Uses of `pad` as a phi operand keyed by `block`; those disappear with
/// the block, so they do not pin it.
fn pad_uses_in_phis(func: &Function, block: BlockId, pad: ValueId) -> usize {
    let mut n = 0;
    for (_, b) in func.blocks.iter() {
        for &id in &b.phis {
            if let Op::Phi { incoming } = &func.insts[id].op {
                n += incoming
                    .iter()
                    .filter(|&&(p, v)| p == block && v == pad)
                    .count();
            }
        }
    }
    n
}

/// An empty cleanup pad does no cleanup: unwind edges into it can go
/// straight to wherever its cleanupret goes.
pub(crate) fn simplify_cleanup_return(ctx: &mut SimplifyCtx, block: BlockId) -> bool {
    let (pad, unwind) = match ctx.func.blocks[block].term {
        Terminator::CleanupRet { pad, unwind } => (pad, unwind),
        _ => return false,
    };
    if unwind == Some(block)
        || !is_trivial_pad(ctx.func, block, pad, |op| matches!(op, Op::CleanupPad))
    {
        return false;
    }
    if inst_use_count(ctx.func, pad) > 0 || term_use_elsewhere(ctx.func, pad, block) {
        return false;
    }
    let preds = ctx.func.predecessors(block);
    if preds.is_empty() {
        return false;
    }
    for &p in &preds {
        let ok = match ctx.func.blocks[p].term {
            Terminator::Invoke { unwind: u, .. } => u == block,
            Terminator::CleanupRet { unwind: u, .. } => u == Some(block),
            _ => false,
        };
        if !ok {
            return false;
        }
    }
    // Predecessors gaining an edge to the unwind destination must agree
    // with the value this block feeds its phis.
    if let Some(dest) = unwind {
        for &p in &preds {
            if p == dest {
                return false;
            }
            for &phi in &ctx.func.blocks[dest].phis {
                let vb = match ctx.func.phi_incoming(phi, block) {
                    Some(v) => v,
                    None => return false,
                };
                if let Some(vp) = ctx.func.phi_incoming(phi, p) {
                    if vp != vb {
                        return false;
                    }
                }
            }
        }
    }

    for &p in &preds {
        match (ctx.func.blocks[p].term.clone(), unwind) {
            (Terminator::Invoke { .. }, None) => {
                convert_invoke_to_call(ctx, p);
                ctx.record_dom(vec![DomUpdate::Delete(p, block)]);
            }
            (Terminator::Invoke { .. }, Some(dest)) => {
                ctx.func.add_phi_incoming_from(dest, p, block);
                if let Terminator::Invoke { unwind: u, .. } = &mut ctx.func.blocks[p].term {
                    *u = dest;
                }
                ctx.record_dom(vec![
                    DomUpdate::Delete(p, block),
                    DomUpdate::Insert(p, dest),
                ]);
            }
            (Terminator::CleanupRet { pad: pp, .. }, u) => {
                if let Some(dest) = u {
                    ctx.func.add_phi_incoming_from(dest, p, block);
                }
                ctx.func.blocks[p].term = Terminator::CleanupRet { pad: pp, unwind: u };
                let mut updates = vec![DomUpdate::Delete(p, block)];
                if let Some(dest) = u {
                    updates.push(DomUpdate::Insert(p, dest));
                }
                ctx.record_dom(updates);
            }
            _ => {}
        }
    }
    ctx.delete_block_if_dead(block);
    debug!(?block, "removed empty cleanup pad");
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FunctionBuilder, FunctionSig, Type};
    use crate::transforms::simplify_cfg::testing::{simplify, simplify_with};
    use crate::transforms::simplify_cfg::SimplifyOptions;

    fn sig(params: &[Type], ret: Type) -> FunctionSig {
        FunctionSig {
            params: params.to_vec(),
            return_ty: ret,
        }
    }

    /// Two arms that immediately return different values collapse to one
    /// returned select, even with instruction hoisting turned off.
    #[test]
    fn return_arms_collapse_to_select() {
        let mut b = FunctionBuilder::new(
            "tworet",
            sig(&[Type::Bool, Type::Int(32), Type::Int(32)], Type::Int(32)),
        );
        let c = b.param(0);
        let x = b.param(1);
        let y = b.param(2);
        let t = b.create_block();
        let f = b.create_block();
        b.cond_br(c, t, f);
        b.switch_to_block(t);
        b.ret(Some(x));
        b.switch_to_block(f);
        b.ret(Some(y));

        let options = SimplifyOptions {
            hoist_common_insts: false,
            ..SimplifyOptions::default()
        };
        let func = simplify_with(b.finish(), options);
        match func.blocks[func.entry].term {
            Terminator::Return { value: Some(v) } => {
                assert!(matches!(
                    func.def_of(v).map(|i| &i.op),
                    Some(Op::Select { cond, on_true, on_false })
                        if *cond == c && *on_true == x && *on_false == y
                ));
            }
            ref other => panic!("expected return, got {other:?}"),
        }
    }

    /// With duplication enabled, a shared return block is copied into each
    /// unconditional predecessor and the whole diamond folds away.
    #[test]
    fn shared_return_is_duplicated_into_predecessors() {
        let mut b = FunctionBuilder::new(
            "dupret",
            sig(&[Type::Bool, Type::Int(32), Type::Int(32)], Type::Int(32)),
        );
        let c = b.param(0);
        let x = b.param(1);
        let y = b.param(2);
        let t = b.create_block();
        let f = b.create_block();
        let rb = b.create_block();
        b.cond_br(c, t, f);
        b.switch_to_block(t);
        b.br(rb);
        b.switch_to_block(f);
        b.br(rb);
        b.switch_to_block(rb);
        let p = b.phi(Type::Int(32), &[(t, x), (f, y)]);
        b.ret(Some(p));

        let options = SimplifyOptions {
            hoist_common_insts: false,
            fold_return_into_predecessors: true,
            ..SimplifyOptions::default()
        };
        let func = simplify_with(b.finish(), options);
        match func.blocks[func.entry].term {
            Terminator::Return { value: Some(v) } => {
                assert!(matches!(
                    func.def_of(v).map(|i| &i.op),
                    Some(Op::Select { cond, on_true, on_false })
                        if *cond == c && *on_true == x && *on_false == y
                ));
            }
            ref other => panic!("expected return, got {other:?}"),
        }
    }

    /// An invoke whose landing pad immediately resumes keeps no exception
    /// behavior; it becomes a plain call.
    #[test]
    fn resume_only_landing_pad_degrades_invoke_to_call() {
        let mut b = FunctionBuilder::new("respad", sig(&[], Type::Void));
        let n = b.create_block();
        let lp = b.create_block();
        b.invoke_void("may_throw", &[], n, lp);
        b.switch_to_block(lp);
        let tok = b.landing_pad();
        b.resume(tok);
        b.switch_to_block(n);
        b.ret(None);

        let func = simplify(b.finish());
        let entry = &func.blocks[func.entry];
        assert!(entry
            .insts
            .iter()
            .any(|&id| matches!(func.insts[id].op, Op::Call { .. })));
        assert!(matches!(entry.term, Terminator::Return { value: None }));
        assert!(func.blocks[lp].insts.is_empty());
    }

    /// A chain of empty cleanup pads unwinds into nothing: the invoke
    /// becomes a call once both pads are retired.
    #[test]
    fn empty_cleanup_chain_is_retired() {
        let mut b = FunctionBuilder::new("cleanchain", sig(&[], Type::Void));
        let n = b.create_block();
        let cp1 = b.create_block();
        let cp2 = b.create_block();
        b.invoke_void("may_throw", &[], n, cp1);
        b.switch_to_block(cp1);
        let t1 = b.cleanup_pad();
        b.cleanup_ret(t1, Some(cp2));
        b.switch_to_block(cp2);
        let t2 = b.cleanup_pad();
        b.cleanup_ret(t2, None);
        b.switch_to_block(n);
        b.ret(None);

        let func = simplify(b.finish());
        let entry = &func.blocks[func.entry];
        assert!(entry
            .insts
            .iter()
            .any(|&id| matches!(func.insts[id].op, Op::Call { .. })));
        assert!(matches!(entry.term, Terminator::Return { value: None }));
        assert!(func.blocks[cp1].insts.is_empty());
        assert!(func.blocks[cp2].insts.is_empty());
    }
}
