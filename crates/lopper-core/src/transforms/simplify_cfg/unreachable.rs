//! Propagation of unreachable terminators into predecessors, and
//! resolution of indirect branches with known or impossible targets.

use tracing::debug;

use crate::analysis::DomUpdate;
use crate::ir::{BlockId, Op, Terminator};
use crate::transforms::util::used_values;

use super::SimplifyCtx;

/// Strip instructions above an unreachable terminator and, once the block
/// is empty, rewrite each predecessor so the doomed edge disappears.
pub(crate) fn simplify_unreachable(ctx: &mut SimplifyCtx, block: BlockId) -> bool {
    if !matches!(ctx.func.blocks[block].term, Terminator::Unreachable) {
        return false;
    }
    let mut changed = false;

    // Work backwards: anything that cannot fault or be observed before
    // the program dies here can go. A store is dead too, but a call or an
    // assumption might not return at all and has to stay.
    while let Some(&id) = ctx.func.blocks[block].insts.last() {
        let droppable = match &ctx.func.insts[id].op {
            Op::Store { volatile, .. } => !*volatile,
            op if !op.has_side_effects() => true,
            _ => false,
        };
        if !droppable {
            break;
        }
        if let Some(r) = ctx.func.insts[id].result {
            if used_values(ctx.func).contains(&r) {
                break;
            }
        }
        ctx.func.blocks[block].insts.pop();
        changed = true;
    }

    if block == ctx.func.entry
        || !ctx.func.blocks[block].insts.is_empty()
        || !ctx.func.blocks[block].phis.is_empty()
    {
        return changed;
    }

    for p in ctx.func.predecessors(block) {
        match ctx.func.blocks[p].term.clone() {
            Terminator::Br { .. } => {
                ctx.func.blocks[p].term = Terminator::Unreachable;
                ctx.record_dom(vec![DomUpdate::Delete(p, block)]);
                changed = true;
            }
            Terminator::CondBr {
                cond,
                then_dest,
                else_dest,
                ..
            } => {
                if then_dest == block && else_dest == block {
                    ctx.func.blocks[p].term = Terminator::Unreachable;
                } else {
                    // One arm survives; record what the branch taught us.
                    let (live, taken) = if then_dest == block {
                        let not = ctx.func.emit_in(p, Op::Not(cond), crate::ir::Type::Bool);
                        (else_dest, not)
                    } else {
                        (then_dest, cond)
                    };
                    ctx.func.emit_void_in(p, Op::Assume(taken));
                    ctx.func.blocks[p].term = Terminator::Br { target: live };
                }
                ctx.record_dom(vec![DomUpdate::Delete(p, block)]);
                changed = true;
            }
            Terminator::Switch {
                default, cases, ..
            } => {
                if let Terminator::Switch { cases, weights, .. } = &mut ctx.func.blocks[p].term {
                    for i in (0..cases.len()).rev() {
                        if cases[i].dest == block {
                            cases.remove(i);
                            if let Some(w) = weights {
                                w.remove(i + 1);
                            }
                        }
                    }
                }
                if default == block {
                    if cases.iter().all(|c| c.dest == block) {
                        ctx.func.blocks[p].term = Terminator::Unreachable;
                    } else {
                        let trap = ctx.func.new_block();
                        if let Terminator::Switch {
                            default: d,
                            weights,
                            ..
                        } = &mut ctx.func.blocks[p].term
                        {
                            *d = trap;
                            if let Some(w) = weights {
                                w[0] = 0;
                            }
                        }
                        ctx.record_dom(vec![DomUpdate::Insert(p, trap)]);
                    }
                }
                ctx.record_dom(vec![DomUpdate::Delete(p, block)]);
                changed = true;
            }
            Terminator::Invoke { unwind, .. } if unwind == block => {
                if let Terminator::Invoke {
                    func,
                    args,
                    result,
                    normal,
                    ..
                } = ctx.func.blocks[p].term.clone()
                {
                    let id = ctx.func.insts.push(crate::ir::Inst {
                        op: Op::Call { func, args },
                        result,
                        span: crate::ir::Span::default(),
                    });
                    ctx.func.blocks[p].insts.push(id);
                    ctx.func.blocks[p].term = Terminator::Br { target: normal };
                }
                ctx.record_dom(vec![DomUpdate::Delete(p, block)]);
                changed = true;
            }
            Terminator::CleanupRet { pad, unwind } if unwind == Some(block) => {
                ctx.func.blocks[p].term = Terminator::CleanupRet { pad, unwind: None };
                ctx.record_dom(vec![DomUpdate::Delete(p, block)]);
                changed = true;
            }
            Terminator::IndirectBr { .. } => {
                if let Terminator::IndirectBr { dests, .. } = &mut ctx.func.blocks[p].term {
                    dests.retain(|&d| d != block);
                    if dests.is_empty() {
                        ctx.func.blocks[p].term = Terminator::Unreachable;
                    }
                }
                ctx.record_dom(vec![DomUpdate::Delete(p, block)]);
                changed = true;
            }
            _ => {}
        }
    }
    if changed {
        debug!(?block, "propagated unreachable into predecessors");
    }
    changed
}

/// Resolve an indirect branch: drop duplicate and never-taken targets,
/// and degrade to direct control flow when few targets remain.
pub(crate) fn simplify_indirect_branch(ctx: &mut SimplifyCtx, block: BlockId) -> bool {
    let (address, dests) = match &ctx.func.blocks[block].term {
        Terminator::IndirectBr { address, dests } => (*address, dests.clone()),
        _ => return false,
    };

    let mut kept: Vec<BlockId> = Vec::new();
    let mut removed: Vec<BlockId> = Vec::new();
    for &d in &dests {
        if kept.contains(&d) {
            continue;
        }
        if block_address_taken(ctx, d) {
            kept.push(d);
        } else if !removed.contains(&d) {
            removed.push(d);
        }
    }
    let mut changed = kept.len() != dests.len();
    if changed {
        if let Terminator::IndirectBr { dests, .. } = &mut ctx.func.blocks[block].term {
            *dests = kept.clone();
        }
        let mut updates = Vec::new();
        for &d in &removed {
            ctx.func.remove_phi_incoming(d, block);
            updates.push(DomUpdate::Delete(block, d));
        }
        ctx.record_dom(updates);
        for d in removed {
            ctx.delete_block_if_dead(d);
        }
    }

    match kept.len() {
        0 => {
            ctx.func.blocks[block].term = Terminator::Unreachable;
            changed = true;
        }
        1 => {
            ctx.func.blocks[block].term = Terminator::Br { target: kept[0] };
            changed = true;
        }
        2 => {
            // An address selected between two block addresses is just a
            // conditional branch in disguise.
            if let Some(Op::Select {
                cond,
                on_true,
                on_false,
            }) = ctx.func.def_of(address).map(|i| i.op.clone())
            {
                let bt = block_address_target(ctx, on_true);
                let bf = block_address_target(ctx, on_false);
                if let (Some(bt), Some(bf)) = (bt, bf) {
                    if bt != bf && kept.contains(&bt) && kept.contains(&bf) {
                        ctx.func.blocks[block].term = Terminator::CondBr {
                            cond,
                            then_dest: bt,
                            else_dest: bf,
                            weights: None,
                        };
                        changed = true;
                    }
                }
            }
        }
        _ => {}
    }
    if changed {
        debug!(?block, "simplified indirect branch");
    }
    changed
}

fn block_address_taken(ctx: &SimplifyCtx, dest: BlockId) -> bool {
    ctx.func.blocks.iter().any(|(_, b)| {
        b.insts
            .iter()
            .any(|&id| matches!(ctx.func.insts[id].op, Op::BlockAddress(d) if d == dest))
    })
}

fn block_address_target(ctx: &SimplifyCtx, value: crate::ir::ValueId) -> Option<BlockId> {
    match ctx.func.def_of(value).map(|i| &i.op) {
        Some(Op::BlockAddress(d)) => Some(*d),
        _ => None,
    }
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

    /// A dead store before an unreachable goes away, and the branch that
    /// led there turns into an assumption about its condition.
    #[test]
    fn doomed_branch_arm_becomes_assumption() {
        let mut b = FunctionBuilder::new(
            "doomed",
            sig(&[Type::Bool, Type::Ptr, Type::Int(32)], Type::Void),
        );
        let c = b.param(0);
        let ptr = b.param(1);
        let v = b.param(2);
        let u = b.create_block();
        let ok = b.create_block();
        b.cond_br(c, u, ok);
        b.switch_to_block(u);
        b.store(ptr, v);
        b.unreachable_term();
        b.switch_to_block(ok);
        b.ret(None);

        let func = simplify(b.finish());
        let entry = &func.blocks[func.entry];
        assert!(matches!(entry.term, Terminator::Return { value: None }));
        assert!(entry
            .insts
            .iter()
            .any(|&id| matches!(func.insts[id].op, Op::Assume(_))));
        assert!(entry
            .insts
            .iter()
            .all(|&id| !matches!(func.insts[id].op, Op::Store { .. })));
    }

    /// A call before the unreachable may not return; the block and the
    /// branch into it must survive.
    #[test]
    fn aborting_call_pins_the_block() {
        let mut b = FunctionBuilder::new("abortcall", sig(&[Type::Bool], Type::Void));
        let c = b.param(0);
        let u = b.create_block();
        let ok = b.create_block();
        b.cond_br(c, u, ok);
        b.switch_to_block(u);
        b.call_void("abort", &[]);
        b.unreachable_term();
        b.switch_to_block(ok);
        b.ret(None);

        let func = simplify(b.finish());
        assert!(matches!(
            func.blocks[func.entry].term,
            Terminator::CondBr { .. }
        ));
        assert!(func.blocks[u]
            .insts
            .iter()
            .any(|&id| matches!(func.insts[id].op, Op::Call { .. })));
    }

    /// A switch case aiming at an unreachable block is dropped; the lone
    /// survivor then folds into a compare.
    #[test]
    fn switch_case_into_unreachable_is_dropped() {
        let mut b = FunctionBuilder::new("deadcase", sig(&[Type::Int(32)], Type::Int(32)));
        let x = b.param(0);
        let u = b.create_block();
        let a = b.create_block();
        let d = b.create_block();
        b.switch(x, &[(1, u), (2, a)], d);
        b.switch_to_block(u);
        b.unreachable_term();
        b.switch_to_block(a);
        let c1 = b.const_int(1, Type::Int(32));
        b.ret(Some(c1));
        b.switch_to_block(d);
        let c0 = b.const_int(0, Type::Int(32));
        b.ret(Some(c0));

        let func = simplify(b.finish());
        assert!(matches!(
            func.blocks[func.entry].term,
            Terminator::CondBr { then_dest, else_dest, .. }
                if then_dest == a && else_dest == d
        ));
    }

    /// An indirect branch over a select of two block addresses is a
    /// conditional branch; its two return arms then fold down to one
    /// returned select.
    #[test]
    fn select_of_block_addresses_becomes_cond_br() {
        let mut b = FunctionBuilder::new(
            "indirect",
            sig(&[Type::Bool, Type::Int(32), Type::Int(32)], Type::Int(32)),
        );
        let c = b.param(0);
        let x = b.param(1);
        let y = b.param(2);
        let a = b.create_block();
        let bb = b.create_block();
        let ba1 = b.block_address(a);
        let ba2 = b.block_address(bb);
        let sel = b.select(c, ba1, ba2, Type::BlockAddr);
        b.indirect_br(sel, &[a, bb]);
        b.switch_to_block(a);
        b.ret(Some(x));
        b.switch_to_block(bb);
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

    /// A target whose address is never taken cannot be reached; with no
    /// targets left the branch is unreachable and the block dies.
    #[test]
    fn untaken_target_makes_indirect_branch_unreachable() {
        let mut b = FunctionBuilder::new("untaken", sig(&[Type::BlockAddr], Type::Int(32)));
        let addr = b.param(0);
        let a = b.create_block();
        b.indirect_br(addr, &[a]);
        b.switch_to_block(a);
        let c1 = b.const_int(1, Type::Int(32));
        b.ret(Some(c1));

        let func = simplify(b.finish());
        assert!(matches!(
            func.blocks[func.entry].term,
            Terminator::Unreachable
        ));
        assert!(func.blocks[a].insts.is_empty());
    }
}
