//! Speculative execution of a small side-effect-free branch arm, turning a
//! triangle into a straight line with selects.

use tracing::debug;

use crate::analysis::{DomUpdate, COST_EXPENSIVE};
use crate::ir::{BlockId, Op, Terminator};
use crate::transforms::util::value_operands;

use super::SimplifyCtx;

pub(crate) fn speculatively_execute_block(ctx: &mut SimplifyCtx, block: BlockId) -> bool {
    let (cond, bt, bf) = match ctx.func.blocks[block].term {
        Terminator::CondBr {
            cond,
            then_dest,
            else_dest,
            ..
        } => (cond, then_dest, else_dest),
        _ => return false,
    };
    if bt == bf || bt == block || bf == block {
        return false;
    }
    for (spec, other) in [(bt, bf), (bf, bt)] {
        if try_speculate(ctx, block, cond, spec, other, spec == bt) {
            return true;
        }
    }
    false
}

fn try_speculate(
    ctx: &mut SimplifyCtx,
    block: BlockId,
    cond: crate::ir::ValueId,
    spec: BlockId,
    other: BlockId,
    spec_on_true: bool,
) -> bool {
    if ctx.func.single_predecessor(spec) != Some(block)
        || !ctx.func.blocks[spec].phis.is_empty()
        || !matches!(ctx.func.blocks[spec].term, Terminator::Br { target } if target == other)
    {
        return false;
    }
    // The body runs unconditionally afterwards, so every instruction must
    // be safe to execute on the path that used to skip it, and cheap
    // enough that the removed branch pays for it.
    let body = ctx.func.blocks[spec].insts.clone();
    let mut total = 0u32;
    let mut nonfree = 0u32;
    let mut expensive = 0u32;
    for &id in &body {
        let op = &ctx.func.insts[id].op;
        if !op.is_safe_to_speculate() {
            return false;
        }
        let cost = ctx.cost.user_cost(op);
        total = total.saturating_add(cost);
        if cost > 0 {
            nonfree += 1;
        }
        if cost >= COST_EXPENSIVE {
            expensive += 1;
        }
    }
    if nonfree > 1 || expensive > 1 || total > ctx.options.max_speculation_cost {
        return false;
    }
    // Results may escape only into the join block's phis.
    for &id in &body {
        let r = match ctx.func.insts[id].result {
            Some(r) => r,
            None => continue,
        };
        for (bb, b) in ctx.func.blocks.iter() {
            for &oid in b.insts.iter() {
                if bb != spec && value_operands(&ctx.func.insts[oid].op).contains(&r) {
                    return false;
                }
            }
            for &oid in b.phis.iter() {
                if bb != other && value_operands(&ctx.func.insts[oid].op).contains(&r) {
                    return false;
                }
            }
            if crate::transforms::util::term_value_operands(&b.term).contains(&r) && bb != spec {
                return false;
            }
        }
    }
    // The join must already be reached from block directly so its phis
    // carry a value for both paths.
    let phis = ctx.func.blocks[other].phis.clone();
    for &phi in &phis {
        if ctx.func.phi_incoming(phi, block).is_none()
            || ctx.func.phi_incoming(phi, spec).is_none()
        {
            return false;
        }
    }

    let insts = std::mem::take(&mut ctx.func.blocks[spec].insts);
    ctx.func.blocks[block].insts.extend(insts);
    for phi in phis {
        let v_spec = ctx.func.phi_incoming(phi, spec).unwrap_or(cond);
        let v_block = ctx.func.phi_incoming(phi, block).unwrap_or(cond);
        let merged = if v_spec == v_block {
            v_spec
        } else {
            let ty = ctx.func.value_types[v_spec].clone();
            let (on_true, on_false) = if spec_on_true {
                (v_spec, v_block)
            } else {
                (v_block, v_spec)
            };
            ctx.func.emit_in(
                block,
                Op::Select {
                    cond,
                    on_true,
                    on_false,
                },
                ty,
            )
        };
        if let Op::Phi { incoming } = &mut ctx.func.insts[phi].op {
            incoming.retain(|(b, _)| *b != spec);
            for (b, v) in incoming.iter_mut() {
                if *b == block {
                    *v = merged;
                }
            }
        }
    }
    ctx.func.blocks[block].term = Terminator::Br { target: other };
    ctx.func.clear_block(spec);
    ctx.record_dom(vec![
        DomUpdate::Delete(block, spec),
        DomUpdate::Delete(spec, other),
    ]);
    debug!(?block, ?spec, "speculated branch arm");
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FunctionBuilder, FunctionSig, Type};
    use crate::transforms::simplify_cfg::testing::simplify;

    fn sig() -> FunctionSig {
        FunctionSig {
            params: vec![Type::Bool, Type::Int(32), Type::Int(32)],
            return_ty: Type::Int(32),
        }
    }

    /// A one-instruction arm is executed unconditionally and merged with a
    /// select.
    #[test]
    fn cheap_arm_is_speculated() {
        let mut b = FunctionBuilder::new("spec", sig());
        let c = b.param(0);
        let x = b.param(1);
        let y = b.param(2);
        let entry = b.current_block();
        let sp = b.create_block();
        let j = b.create_block();
        b.cond_br(c, sp, j);
        b.switch_to_block(sp);
        let v = b.add(x, y, Type::Int(32));
        b.br(j);
        b.switch_to_block(j);
        let p = b.phi(Type::Int(32), &[(sp, v), (entry, x)]);
        b.ret(Some(p));

        let func = simplify(b.finish());
        let entry = &func.blocks[func.entry];
        match entry.term {
            Terminator::Return { value: Some(r) } => match func.def_of(r).map(|i| &i.op) {
                Some(Op::Select {
                    cond,
                    on_true,
                    on_false,
                }) => {
                    assert_eq!(*cond, c);
                    assert_eq!(*on_true, v);
                    assert_eq!(*on_false, x);
                }
                other => panic!("expected select, got {other:?}"),
            },
            ref other => panic!("expected return, got {other:?}"),
        }
        assert!(matches!(func.blocks[sp].term, Terminator::Unreachable));
    }

    /// An arm with two real instructions stays behind its branch.
    #[test]
    fn wide_arm_is_not_speculated() {
        let mut b = FunctionBuilder::new("nospec", sig());
        let c = b.param(0);
        let x = b.param(1);
        let y = b.param(2);
        let entry = b.current_block();
        let sp = b.create_block();
        let j = b.create_block();
        b.cond_br(c, sp, j);
        b.switch_to_block(sp);
        let v1 = b.add(x, y, Type::Int(32));
        let v2 = b.add(v1, y, Type::Int(32));
        b.br(j);
        b.switch_to_block(j);
        let p = b.phi(Type::Int(32), &[(sp, v2), (entry, x)]);
        b.ret(Some(p));

        let func = simplify(b.finish());
        assert!(matches!(
            func.blocks[func.entry].term,
            Terminator::CondBr { .. }
        ));
    }
}
