//! Lookup-table synthesis for switches whose arms only pick constants, and
//! the constant-propagation machinery it shares with select conversion.

use std::collections::HashMap;

use tracing::debug;

use crate::analysis::{width_mask, DomUpdate};
use crate::ir::{BlockId, CmpKind, Constant, Function, InstId, Op, Terminator, Type, ValueId};
use crate::transforms::util::remove_dead_defs;

use super::SimplifyCtx;

/// A block that does nothing but trap: no phis, no real instructions, and
/// an unreachable terminator.
pub(crate) fn is_trivially_unreachable(func: &Function, bb: BlockId) -> bool {
    func.blocks[bb].phis.is_empty()
        && func.blocks[bb]
            .insts
            .iter()
            .all(|&id| matches!(func.insts[id].op, Op::DebugMarker(_)))
        && matches!(func.blocks[bb].term, Terminator::Unreachable)
}

fn norm_int(v: i64, ty: &Type) -> i64 {
    match ty {
        Type::Bool => v & 1,
        Type::Int(w) if *w < 64 => (v << (64 - *w as u32)) >> (64 - *w as u32),
        Type::UInt(w) if *w < 64 => ((v as u64) & width_mask(*w as u32)) as i64,
        _ => v,
    }
}

fn lookup(func: &Function, env: &HashMap<ValueId, Constant>, v: ValueId) -> Option<Constant> {
    env.get(&v)
        .cloned()
        .or_else(|| func.constant_of(v).cloned())
}

/// Evaluate one pure operation over known-constant operands.
fn eval_op(
    func: &Function,
    env: &HashMap<ValueId, Constant>,
    op: &Op,
    ty: &Type,
) -> Option<Constant> {
    let int = |v: ValueId| lookup(func, env, v).and_then(|c| c.as_int());
    let raw = match op {
        Op::Const(c) => return Some(c.clone()),
        Op::Copy(a) => return lookup(func, env, *a),
        Op::Add(a, b) => int(*a)?.wrapping_add(int(*b)?),
        Op::Sub(a, b) => int(*a)?.wrapping_sub(int(*b)?),
        Op::Mul(a, b) => int(*a)?.wrapping_mul(int(*b)?),
        Op::Div(a, b) => int(*a)?.checked_div(int(*b)?)?,
        Op::Rem(a, b) => int(*a)?.checked_rem(int(*b)?)?,
        Op::Neg(a) => int(*a)?.wrapping_neg(),
        Op::BitAnd(a, b) => int(*a)? & int(*b)?,
        Op::BitOr(a, b) => int(*a)? | int(*b)?,
        Op::BitXor(a, b) => int(*a)? ^ int(*b)?,
        Op::BitNot(a) => !int(*a)?,
        Op::Shl(a, b) => {
            let s = int(*b)?;
            if !(0..64).contains(&s) {
                return None;
            }
            int(*a)? << s
        }
        Op::Shr(a, b) => {
            let s = int(*b)?;
            let w = ty.bit_width()?;
            if !(0..w as i64).contains(&s) {
                return None;
            }
            if ty.is_unsigned() || matches!(ty, Type::Bool) {
                (((int(*a)? as u64) & width_mask(w)) >> s) as i64
            } else {
                norm_int(int(*a)?, ty) >> s
            }
        }
        Op::Cmp(kind, a, b) => {
            let w = func.value_types[*a].bit_width().unwrap_or(64);
            let (x, y) = (int(*a)?, int(*b)?);
            let (ux, uy) = ((x as u64) & width_mask(w), (y as u64) & width_mask(w));
            let r = match kind {
                CmpKind::Eq => x == y,
                CmpKind::Ne => x != y,
                CmpKind::Lt => x < y,
                CmpKind::Le => x <= y,
                CmpKind::Gt => x > y,
                CmpKind::Ge => x >= y,
                CmpKind::ULt => ux < uy,
                CmpKind::ULe => ux <= uy,
                CmpKind::UGt => ux > uy,
                CmpKind::UGe => ux >= uy,
            };
            return Some(Constant::Bool(r));
        }
        Op::Not(a) => {
            return lookup(func, env, *a)
                .and_then(|c| c.as_bool())
                .map(|b| Constant::Bool(!b))
        }
        Op::Select {
            cond,
            on_true,
            on_false,
        } => {
            let c = lookup(func, env, *cond)?.as_bool()?;
            return lookup(func, env, if c { *on_true } else { *on_false });
        }
        Op::Cast(a, to) => {
            if !to.is_integer() && !matches!(to, Type::Bool) {
                return None;
            }
            let v = int(*a)?;
            return Some(match to {
                Type::Bool => Constant::Bool(v & 1 == 1),
                _ => Constant::Int(norm_int(v, to)),
            });
        }
        _ => return None,
    };
    Some(match ty {
        Type::Bool => Constant::Bool(raw & 1 == 1),
        _ => Constant::Int(norm_int(raw, ty)),
    })
}

/// Walk from a switch destination toward the join block, folding the
/// constants a given case value pins, and read off what the join's phis
/// would receive on that path.
///
/// `common` is discovered on the first call and must agree afterwards.
/// Every hop must be owned by this path alone so the caller can retire it.
pub(crate) fn case_results(
    func: &Function,
    block: BlockId,
    scrutinee: ValueId,
    case_value: Option<i64>,
    dest: BlockId,
    common: &mut Option<BlockId>,
) -> Option<(BlockId, Vec<(InstId, Constant)>)> {
    let mut env: HashMap<ValueId, Constant> = HashMap::new();
    if let Some(cv) = case_value {
        env.insert(scrutinee, Constant::Int(cv));
    }
    let mut arrival = block;
    let mut cur = dest;
    for _ in 0..5 {
        let at_common = match *common {
            Some(c) => cur == c,
            None => !func.blocks[cur].phis.is_empty(),
        };
        if at_common {
            *common = Some(cur);
            let mut out = Vec::new();
            for &phi in &func.blocks[cur].phis {
                let v = func.phi_incoming(phi, arrival)?;
                out.push((phi, lookup(func, &env, v)?));
            }
            return Some((arrival, out));
        }
        if func.single_predecessor(cur) != Some(arrival) {
            return None;
        }
        for &id in &func.blocks[cur].insts {
            let inst = &func.insts[id];
            if matches!(inst.op, Op::DebugMarker(_)) {
                continue;
            }
            let r = inst.result?;
            let ty = func.value_types[r].clone();
            let c = eval_op(func, &env, &inst.op, &ty)?;
            env.insert(r, c);
        }
        match func.blocks[cur].term {
            Terminator::Br { target } if target != cur => {
                arrival = cur;
                cur = target;
            }
            _ => return None,
        }
    }
    None
}

enum TableKind {
    Single(Constant),
    Linear { base: i64, step: i64 },
    BitMap { bits: u64, width: u32 },
    Array(Vec<Constant>),
}

fn plan_table(values: &[Constant], ty: &Type) -> TableKind {
    if values.iter().all(|v| v == &values[0]) {
        return TableKind::Single(values[0].clone());
    }
    let ints: Option<Vec<i64>> = values.iter().map(|v| v.as_int()).collect();
    if let (Some(ints), Some(w)) = (ints, ty.bit_width()) {
        let step = ints[1].wrapping_sub(ints[0]);
        let linear = ints.iter().enumerate().all(|(i, &v)| {
            norm_int(ints[0].wrapping_add(step.wrapping_mul(i as i64)), ty) == norm_int(v, ty)
        });
        if linear {
            return TableKind::Linear {
                base: ints[0],
                step,
            };
        }
        if w as usize * ints.len() <= 64 {
            let mut bits = 0u64;
            for (i, &v) in ints.iter().enumerate() {
                bits |= ((v as u64) & width_mask(w)) << (i as u32 * w);
            }
            return TableKind::BitMap { bits, width: w };
        }
    }
    TableKind::Array(values.to_vec())
}

fn emit_table_read(
    func: &mut Function,
    bb: BlockId,
    kind: TableKind,
    idx: ValueId,
    scrutinee_ty: &Type,
    result_ty: &Type,
) -> ValueId {
    match kind {
        TableKind::Single(c) => func.emit_in(bb, Op::Const(c), result_ty.clone()),
        TableKind::Linear { base, step } => {
            let idx = if scrutinee_ty == result_ty {
                idx
            } else {
                func.emit_in(bb, Op::Cast(idx, result_ty.clone()), result_ty.clone())
            };
            let step_c = func.emit_in(
                bb,
                Op::Const(Constant::Int(norm_int(step, result_ty))),
                result_ty.clone(),
            );
            let mul = func.emit_in(bb, Op::Mul(idx, step_c), result_ty.clone());
            let base_c = func.emit_in(
                bb,
                Op::Const(Constant::Int(norm_int(base, result_ty))),
                result_ty.clone(),
            );
            func.emit_in(bb, Op::Add(mul, base_c), result_ty.clone())
        }
        TableKind::BitMap { bits, width } => {
            let u64ty = Type::UInt(64);
            let idx64 = func.emit_in(bb, Op::Cast(idx, u64ty.clone()), u64ty.clone());
            let wc = func.emit_in(
                bb,
                Op::Const(Constant::Int(width as i64)),
                u64ty.clone(),
            );
            let shift = func.emit_in(bb, Op::Mul(idx64, wc), u64ty.clone());
            let bits_c = func.emit_in(bb, Op::Const(Constant::Int(bits as i64)), u64ty.clone());
            let shifted = func.emit_in(bb, Op::Shr(bits_c, shift), u64ty.clone());
            let mask_c = func.emit_in(
                bb,
                Op::Const(Constant::Int(width_mask(width) as i64)),
                u64ty.clone(),
            );
            let entry = func.emit_in(bb, Op::BitAnd(shifted, mask_c), u64ty);
            func.emit_in(bb, Op::Cast(entry, result_ty.clone()), result_ty.clone())
        }
        TableKind::Array(values) => {
            let elems: Vec<ValueId> = values
                .into_iter()
                .map(|c| func.emit_in(bb, Op::Const(c), result_ty.clone()))
                .collect();
            let arr = func.emit_in(bb, Op::ArrayInit(elems), Type::Ptr);
            func.emit_in(
                bb,
                Op::GetIndex { array: arr, index: idx },
                result_ty.clone(),
            )
        }
    }
}

/// Replace a dense switch whose arms only feed constants into a join block
/// with a table lookup.
pub(crate) fn switch_to_lookup_table(ctx: &mut SimplifyCtx, block: BlockId) -> bool {
    let (value, cases, default) = match &ctx.func.blocks[block].term {
        Terminator::Switch {
            value,
            cases,
            default,
            ..
        } => (*value, cases.clone(), *default),
        _ => return false,
    };
    if cases.len() < 3 {
        return false;
    }
    let ty_s = ctx.func.value_types[value].clone();
    let width = match ty_s.bit_width() {
        Some(w) if ty_s.is_integer() => w,
        _ => return false,
    };

    let mut common = None;
    let mut per_case: Vec<(i64, Vec<(InstId, Constant)>)> = Vec::new();
    for case in &cases {
        match case_results(ctx.func, block, value, Some(case.value), case.dest, &mut common) {
            Some((_, res)) => per_case.push((case.value, res)),
            None => return false,
        }
    }
    let common = match common {
        Some(c) if c != block && c != default => c,
        _ => return false,
    };
    if cases.iter().any(|c| c.dest == common) {
        return false;
    }

    let default_unreachable = is_trivially_unreachable(ctx.func, default);
    let default_res = if default_unreachable {
        None
    } else {
        case_results(ctx.func, block, value, None, default, &mut Some(common)).map(|(_, res)| res)
    };

    let min = cases.iter().map(|c| c.value).min().unwrap_or(0);
    let max = cases.iter().map(|c| c.value).max().unwrap_or(0);
    let span = (max as i128 - min as i128 + 1) as u128;
    if span > 1 << 20 || span > width_mask(width) as u128 {
        return false;
    }
    let tsize = span as usize;
    let holes = tsize - cases.len();

    let phi_tys: Vec<(InstId, Type)> = per_case[0]
        .1
        .iter()
        .map(|(phi, _)| {
            let r = ctx.func.insts[*phi].result.expect("phi without result");
            (*phi, ctx.func.value_types[r].clone())
        })
        .collect();
    if phi_tys.is_empty() {
        return false;
    }
    if !phi_tys.iter().all(|(_, ty)| ctx.cost.is_type_legal(ty))
        && (cases.len() * 100) < ctx.options.min_density_percent as usize * tsize
    {
        return false;
    }

    // A reachable default with holes needs either a foldable default
    // result to fill them with, or a hole bitmask small enough to test.
    let use_mask = !default_unreachable && holes > 0 && default_res.is_none();
    if use_mask && tsize > 64 {
        return false;
    }

    let mut tables: Vec<(InstId, Vec<Constant>, Type)> = Vec::new();
    for (i, (phi, ty)) in phi_tys.iter().enumerate() {
        let fill = match (&default_res, default_unreachable || use_mask) {
            (Some(res), false) => res[i].1.clone(),
            _ => Constant::Undef,
        };
        let mut values = vec![fill; tsize];
        for (cv, res) in &per_case {
            values[(cv - min) as usize] = res[i].1.clone();
        }
        tables.push((*phi, values, ty.clone()));
    }

    let idx = if min != 0 {
        let mc = ctx
            .func
            .emit_in(block, Op::Const(Constant::Int(norm_int(min, &ty_s))), ty_s.clone());
        ctx.func.emit_in(block, Op::Sub(value, mc), ty_s.clone())
    } else {
        value
    };

    let mut updates = Vec::new();
    let read_bb;
    let mut range_check = None;
    if default_unreachable {
        read_bb = block;
        updates.push(DomUpdate::Insert(block, common));
    } else {
        read_bb = ctx.func.new_block();
        ctx.func.blocks[read_bb].term = Terminator::Br { target: common };
        let sz = ctx
            .func
            .emit_in(block, Op::Const(Constant::Int(tsize as i64)), ty_s.clone());
        let in_range = ctx
            .func
            .emit_in(block, Op::Cmp(CmpKind::ULt, idx, sz), Type::Bool);
        if use_mask {
            let hole_bb = ctx.func.new_block();
            let mut bits = 0u64;
            for case in &cases {
                bits |= 1u64 << ((case.value - min) as u32);
            }
            let u64ty = Type::UInt(64);
            let idx64 = ctx
                .func
                .emit_in(hole_bb, Op::Cast(idx, u64ty.clone()), u64ty.clone());
            let bits_c = ctx
                .func
                .emit_in(hole_bb, Op::Const(Constant::Int(bits as i64)), u64ty.clone());
            let shifted = ctx.func.emit_in(hole_bb, Op::Shr(bits_c, idx64), u64ty.clone());
            let one = ctx
                .func
                .emit_in(hole_bb, Op::Const(Constant::Int(1)), u64ty.clone());
            let bit = ctx.func.emit_in(hole_bb, Op::BitAnd(shifted, one), u64ty.clone());
            let zero = ctx
                .func
                .emit_in(hole_bb, Op::Const(Constant::Int(0)), u64ty);
            let live = ctx
                .func
                .emit_in(hole_bb, Op::Cmp(CmpKind::Ne, bit, zero), Type::Bool);
            ctx.func.blocks[hole_bb].term = Terminator::CondBr {
                cond: live,
                then_dest: read_bb,
                else_dest: default,
                weights: None,
            };
            ctx.func.blocks[block].term = Terminator::CondBr {
                cond: in_range,
                then_dest: hole_bb,
                else_dest: default,
                weights: None,
            };
            ctx.func.add_phi_incoming_from(default, hole_bb, block);
            updates.push(DomUpdate::Insert(block, hole_bb));
            updates.push(DomUpdate::Insert(hole_bb, read_bb));
            updates.push(DomUpdate::Insert(hole_bb, default));
        } else {
            ctx.func.blocks[block].term = Terminator::CondBr {
                cond: in_range,
                then_dest: read_bb,
                else_dest: default,
                weights: None,
            };
            updates.push(DomUpdate::Insert(block, read_bb));
            range_check = Some(in_range);
        }
        updates.push(DomUpdate::Insert(read_bb, common));
    }

    for (phi, values, ty) in tables {
        let kind = plan_table(&values, &ty);
        let v = emit_table_read(ctx.func, read_bb, kind, idx, &ty_s, &ty);
        if let Op::Phi { incoming } = &mut ctx.func.insts[phi].op {
            incoming.push((read_bb, v));
        }
    }
    if default_unreachable {
        ctx.func.blocks[block].term = Terminator::Br { target: common };
    }

    let mut old_dests: Vec<BlockId> = Vec::new();
    for case in &cases {
        if case.dest != default && !old_dests.contains(&case.dest) {
            old_dests.push(case.dest);
        }
    }
    for &d in &old_dests {
        updates.push(DomUpdate::Delete(block, d));
    }
    if default_unreachable {
        updates.push(DomUpdate::Delete(block, default));
    }
    ctx.record_dom(updates);
    for d in old_dests {
        ctx.delete_block_if_dead(d);
    }
    if default_unreachable {
        ctx.delete_block_if_dead(default);
    }
    // With no holes, a compare of a looked-up phi that every live entry
    // decides one way and the default decides the other is the range check
    // over again.
    if holes == 0 {
        if let (Some(rc), Some(dres)) = (range_check, &default_res) {
            for (i, (phi, _)) in phi_tys.iter().enumerate() {
                if let Some(r) = ctx.func.insts[*phi].result {
                    let case_consts: Vec<Constant> =
                        per_case.iter().map(|(_, res)| res[i].1.clone()).collect();
                    if reuse_range_check(ctx, block, common, rc, r, &dres[i].1, &case_consts) {
                        remove_dead_defs(ctx.func, common);
                    }
                }
            }
        }
    }
    debug!(?block, entries = tsize, "built switch lookup table");
    true
}

/// Replace compares of `phi_result` in the join block whose outcome every
/// table entry shares and the default result contradicts with the range
/// check itself (or its inverse).
fn reuse_range_check(
    ctx: &mut SimplifyCtx,
    branch_block: BlockId,
    phi_block: BlockId,
    range_check: ValueId,
    phi_result: ValueId,
    default_const: &Constant,
    case_consts: &[Constant],
) -> bool {
    // The range check must decide entry into the join: every predecessor
    // is the checking block or forwards straight from it.
    for p in ctx.func.predecessors(phi_block) {
        if p != branch_block && ctx.func.single_predecessor(p) != Some(branch_block) {
            return false;
        }
    }
    let mut changed = false;
    for id in ctx.func.blocks[phi_block].insts.clone() {
        let inst = ctx.func.insts[id].clone();
        let result = match (&inst.op, inst.result) {
            (Op::Cmp(_, a, b), Some(r)) if *a == phi_result || *b == phi_result => r,
            _ => continue,
        };
        let outcome = |c: &Constant| {
            let mut env = HashMap::new();
            env.insert(phi_result, c.clone());
            eval_op(ctx.func, &env, &inst.op, &Type::Bool).and_then(|v| v.as_bool())
        };
        let on_default = match outcome(default_const) {
            Some(x) => x,
            None => continue,
        };
        if !case_consts.iter().all(|c| outcome(c) == Some(!on_default)) {
            continue;
        }
        let replacement = if on_default {
            ctx.func.emit_in(branch_block, Op::Not(range_check), Type::Bool)
        } else {
            range_check
        };
        ctx.func.replace_all_uses(result, replacement);
        debug!(?phi_block, "reused lookup range check for a phi compare");
        changed = true;
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityRef;
    use crate::ir::{FunctionBuilder, FunctionSig, Type};
    use crate::transforms::simplify_cfg::testing::simplify_with;
    use crate::transforms::simplify_cfg::SimplifyOptions;

    fn options() -> SimplifyOptions {
        SimplifyOptions {
            convert_switch_to_lookup_table: true,
            ..SimplifyOptions::default()
        }
    }

    fn sig(ret: Type) -> FunctionSig {
        FunctionSig {
            params: vec![Type::Int(32)],
            return_ty: ret,
        }
    }

    /// Results forming an affine sequence compile to base + index * step
    /// instead of a memory table.
    #[test]
    fn affine_results_become_linear_formula() {
        let mut b = FunctionBuilder::new("linear", sig(Type::Int(32)));
        let x = b.param(0);
        let d0 = b.create_block();
        let d1 = b.create_block();
        let d2 = b.create_block();
        let db = b.create_block();
        let common = b.create_block();
        b.switch(x, &[(0, d0), (1, d1), (2, d2)], db);
        b.switch_to_block(db);
        b.unreachable_term();
        b.switch_to_block(d0);
        let c10 = b.const_int(10, Type::Int(32));
        b.br(common);
        b.switch_to_block(d1);
        let c11 = b.const_int(11, Type::Int(32));
        b.br(common);
        b.switch_to_block(d2);
        let c12 = b.const_int(12, Type::Int(32));
        b.br(common);
        b.switch_to_block(common);
        let p = b.phi(Type::Int(32), &[(d0, c10), (d1, c11), (d2, c12)]);
        b.ret(Some(p));

        let func = simplify_with(b.finish(), options());
        let entry = &func.blocks[func.entry];
        let ret = match entry.term {
            Terminator::Return { value: Some(v) } => v,
            ref other => panic!("expected return, got {other:?}"),
        };
        assert!(matches!(func.def_of(ret).map(|i| &i.op), Some(Op::Add(..))));
        assert!(entry
            .insts
            .iter()
            .any(|&id| matches!(func.insts[id].op, Op::Mul(..))));
        for bb in [d0, d1, d2, db] {
            assert!(matches!(func.blocks[bb].term, Terminator::Unreachable));
            assert!(func.blocks[bb].insts.is_empty());
        }
    }

    /// A sparse table with a reachable default keeps a range check and
    /// falls back to an in-memory table when no cheaper shape fits.
    #[test]
    fn sparse_table_keeps_range_check() {
        let mut b = FunctionBuilder::new("sparse", sig(Type::Int(32)));
        let x = b.param(0);
        let a = b.create_block();
        let bb = b.create_block();
        let db = b.create_block();
        let common = b.create_block();
        b.switch(x, &[(0, a), (2, bb), (3, a)], db);
        b.switch_to_block(a);
        let c5 = b.const_int(5, Type::Int(32));
        b.br(common);
        b.switch_to_block(bb);
        let c7 = b.const_int(7, Type::Int(32));
        b.br(common);
        b.switch_to_block(db);
        let c9 = b.const_int(9, Type::Int(32));
        b.br(common);
        b.switch_to_block(common);
        let p = b.phi(Type::Int(32), &[(a, c5), (bb, c7), (db, c9)]);
        b.ret(Some(p));

        let func = simplify_with(b.finish(), options());
        let (read_bb, else_bb) = match func.blocks[func.entry].term {
            Terminator::CondBr {
                then_dest,
                else_dest,
                ..
            } => (then_dest, else_dest),
            ref other => panic!("expected range check, got {other:?}"),
        };
        assert_eq!(else_bb, db);
        assert!(func.blocks[read_bb]
            .insts
            .iter()
            .any(|&id| matches!(func.insts[id].op, Op::GetIndex { .. })));
        let phi = func.blocks[common].phis[0];
        match &func.insts[phi].op {
            Op::Phi { incoming } => {
                let mut keys: Vec<BlockId> = incoming.iter().map(|(b, _)| *b).collect();
                keys.sort_by_key(|k| k.index());
                let mut want = vec![read_bb, db];
                want.sort_by_key(|k| k.index());
                assert_eq!(keys, want);
            }
            other => panic!("expected phi, got {other:?}"),
        }
    }

    /// A compare that is false on the default result and true on every
    /// table entry is the range check over again; the join returns the
    /// check directly instead of testing the loaded value.
    #[test]
    fn phi_compare_reuses_range_check() {
        let mut b = FunctionBuilder::new("reusecheck", sig(Type::Bool));
        let x = b.param(0);
        let d0 = b.create_block();
        let d1 = b.create_block();
        let d2 = b.create_block();
        let db = b.create_block();
        let common = b.create_block();
        b.switch(x, &[(1, d0), (2, d1), (3, d2)], db);
        b.switch_to_block(d0);
        let c10 = b.const_int(10, Type::Int(32));
        b.br(common);
        b.switch_to_block(d1);
        let c20 = b.const_int(20, Type::Int(32));
        b.br(common);
        b.switch_to_block(d2);
        let c30 = b.const_int(30, Type::Int(32));
        b.br(common);
        b.switch_to_block(db);
        let c0 = b.const_int(0, Type::Int(32));
        b.br(common);
        b.switch_to_block(common);
        let p = b.phi(Type::Int(32), &[(d0, c10), (d1, c20), (d2, c30), (db, c0)]);
        let z = b.const_int(0, Type::Int(32));
        let nz = b.cmp(CmpKind::Ne, p, z);
        b.ret(Some(nz));

        let func = simplify_with(b.finish(), options());
        let cond = match func.blocks[func.entry].term {
            Terminator::CondBr {
                cond, else_dest, ..
            } => {
                assert_eq!(else_dest, db);
                cond
            }
            ref other => panic!("expected range check, got {other:?}"),
        };
        assert!(matches!(
            func.def_of(cond).map(|i| &i.op),
            Some(Op::Cmp(CmpKind::ULt, ..))
        ));
        assert!(matches!(
            func.blocks[common].term,
            Terminator::Return { value: Some(v) } if v == cond
        ));
        assert!(func.blocks[common].insts.is_empty());
    }

    /// A phi whose table entries are all the same constant costs nothing:
    /// it folds to that constant while its sibling keeps a real lookup.
    #[test]
    fn uniform_table_column_folds_to_constant() {
        let mut b = FunctionBuilder::new("singlecol", sig(Type::Int(32)));
        let x = b.param(0);
        let d0 = b.create_block();
        let d1 = b.create_block();
        let d2 = b.create_block();
        let db = b.create_block();
        let common = b.create_block();
        b.switch(x, &[(0, d0), (1, d1), (2, d2)], db);
        b.switch_to_block(db);
        b.unreachable_term();
        b.switch_to_block(d0);
        let a0 = b.const_int(42, Type::Int(32));
        let b0 = b.const_int(10, Type::Int(32));
        b.br(common);
        b.switch_to_block(d1);
        let a1 = b.const_int(42, Type::Int(32));
        let b1 = b.const_int(20, Type::Int(32));
        b.br(common);
        b.switch_to_block(d2);
        let a2 = b.const_int(42, Type::Int(32));
        let b2 = b.const_int(30, Type::Int(32));
        b.br(common);
        b.switch_to_block(common);
        let pa = b.phi(Type::Int(32), &[(d0, a0), (d1, a1), (d2, a2)]);
        let pb = b.phi(Type::Int(32), &[(d0, b0), (d1, b1), (d2, b2)]);
        let sum = b.add(pa, pb, Type::Int(32));
        b.ret(Some(sum));

        let func = simplify_with(b.finish(), options());
        let entry = &func.blocks[func.entry];
        let ret = match entry.term {
            Terminator::Return { value: Some(v) } => v,
            ref other => panic!("expected return, got {other:?}"),
        };
        let (a, bb) = match func.def_of(ret).map(|i| &i.op) {
            Some(Op::Add(a, bb)) => (*a, *bb),
            other => panic!("expected sum of the two columns, got {other:?}"),
        };
        assert_eq!(func.constant_of(a), Some(&Constant::Int(42)));
        assert!(matches!(func.def_of(bb).map(|i| &i.op), Some(Op::Add(..))));
        assert!(!entry
            .insts
            .iter()
            .any(|&id| matches!(func.insts[id].op, Op::GetIndex { .. })));
    }

    /// Narrow results packed into one word are read back with shifts.
    #[test]
    fn narrow_results_pack_into_bitmap() {
        let mut b = FunctionBuilder::new("bitmap", sig(Type::Int(8)));
        let x = b.param(0);
        let a = b.create_block();
        let c = b.create_block();
        let d = b.create_block();
        let db = b.create_block();
        let common = b.create_block();
        b.switch(x, &[(0, a), (1, c), (2, d)], db);
        b.switch_to_block(db);
        b.unreachable_term();
        b.switch_to_block(a);
        let v1 = b.const_int(1, Type::Int(8));
        b.br(common);
        b.switch_to_block(c);
        let v5 = b.const_int(5, Type::Int(8));
        b.br(common);
        b.switch_to_block(d);
        let v2 = b.const_int(2, Type::Int(8));
        b.br(common);
        b.switch_to_block(common);
        let p = b.phi(Type::Int(8), &[(a, v1), (c, v5), (d, v2)]);
        b.ret(Some(p));

        let func = simplify_with(b.finish(), options());
        let entry = &func.blocks[func.entry];
        let ret = match entry.term {
            Terminator::Return { value: Some(v) } => v,
            ref other => panic!("expected return, got {other:?}"),
        };
        assert!(matches!(
            func.def_of(ret).map(|i| &i.op),
            Some(Op::Cast(_, Type::Int(8)))
        ));
        assert!(entry
            .insts
            .iter()
            .any(|&id| matches!(func.insts[id].op, Op::Shr(..))));
    }
}
