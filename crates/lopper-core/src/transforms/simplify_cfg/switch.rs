//! Switch rewrites: constant folding, dead case pruning, range compression,
//! and conversion to compares, selects, or lookup tables.

use tracing::debug;

use crate::analysis::{known_bits, width_mask, DomUpdate};
use crate::ir::{BlockId, CmpKind, Constant, Op, SwitchCase, Terminator, Type, ValueId};

use super::eq_cases::fold_value_comparison_into_predecessors;
use super::lookup_table::{self, is_trivially_unreachable};
use super::SimplifyCtx;

fn as_switch(
    term: &Terminator,
) -> Option<(ValueId, Vec<SwitchCase>, BlockId, Option<Vec<u64>>)> {
    match term {
        Terminator::Switch {
            value,
            cases,
            default,
            weights,
        } => Some((*value, cases.clone(), *default, weights.clone())),
        _ => None,
    }
}

fn renorm2(mut w: [u64; 2]) -> [u64; 2] {
    while w.iter().any(|&x| x > u32::MAX as u64) {
        for x in w.iter_mut() {
            *x = (*x / 2).max(1);
        }
    }
    w
}

pub(crate) fn simplify_switch(ctx: &mut SimplifyCtx, block: BlockId) -> bool {
    let (value, cases, default, _) = match as_switch(&ctx.func.blocks[block].term) {
        Some(s) => s,
        None => return false,
    };

    // Known scrutinee: only one edge survives.
    if let Some(c) = ctx.func.constant_of(value).and_then(|k| k.as_int()) {
        let taken = cases
            .iter()
            .find(|cs| cs.value == c)
            .map(|cs| cs.dest)
            .unwrap_or(default);
        let mut dropped: Vec<BlockId> = Vec::new();
        for s in ctx.func.successors(block) {
            if s != taken && !dropped.contains(&s) {
                dropped.push(s);
            }
        }
        for &d in &dropped {
            ctx.func.remove_phi_incoming(d, block);
        }
        ctx.func.blocks[block].term = Terminator::Br { target: taken };
        ctx.record_dom(dropped.iter().map(|&d| DomUpdate::Delete(block, d)).collect());
        for d in dropped {
            ctx.delete_block_if_dead(d);
        }
        debug!(?block, scrutinee = c, "folded switch on constant");
        return true;
    }

    // A case that jumps where the default already goes says nothing.
    if cases.iter().any(|c| c.dest == default) {
        if let Terminator::Switch { cases, weights, .. } = &mut ctx.func.blocks[block].term {
            for i in (0..cases.len()).rev() {
                if cases[i].dest == default {
                    cases.remove(i);
                    if let Some(w) = weights {
                        let wc = w.remove(i + 1);
                        w[0] = w[0].saturating_add(wc);
                    }
                }
            }
        }
        return true;
    }

    if cases.is_empty() {
        ctx.func.blocks[block].term = Terminator::Br { target: default };
        return true;
    }

    if fold_value_comparison_into_predecessors(ctx, block) {
        return true;
    }
    if turn_switch_range_into_icmp(ctx, block) {
        return true;
    }
    if eliminate_dead_switch_cases(ctx, block) {
        return true;
    }
    if ctx.options.forward_switch_cond && forward_switch_cond_to_phi(ctx, block) {
        return true;
    }
    if switch_to_select(ctx, block) {
        return true;
    }
    if ctx.options.convert_switch_to_lookup_table
        && ctx.cost.should_build_lookup_tables()
        && lookup_table::switch_to_lookup_table(ctx, block)
    {
        return true;
    }
    if reduce_switch_range(ctx, block) {
        return true;
    }
    false
}

/// A switch whose cases form one contiguous run into a single destination
/// is really a range test.
fn turn_switch_range_into_icmp(ctx: &mut SimplifyCtx, block: BlockId) -> bool {
    let (value, cases, default, weights) = match as_switch(&ctx.func.blocks[block].term) {
        Some(s) => s,
        None => return false,
    };
    let dest = cases[0].dest;
    if dest == default || cases.iter().any(|c| c.dest != dest) {
        return false;
    }
    let ty = ctx.func.value_types[value].clone();
    if !ty.is_integer() {
        return false;
    }
    let mut vals: Vec<i64> = cases.iter().map(|c| c.value).collect();
    vals.sort_unstable();
    let (min, max) = (vals[0], *vals.last().expect("nonempty"));
    if max as i128 - min as i128 + 1 != vals.len() as i128 {
        return false;
    }

    let idx = if min != 0 {
        let mc = ctx
            .func
            .emit_in(block, Op::Const(Constant::Int(min)), ty.clone());
        ctx.func.emit_in(block, Op::Sub(value, mc), ty.clone())
    } else {
        value
    };
    let len_c = ctx
        .func
        .emit_in(block, Op::Const(Constant::Int(vals.len() as i64)), ty);
    let cmp = ctx
        .func
        .emit_in(block, Op::Cmp(CmpKind::ULt, idx, len_c), Type::Bool);
    let new_weights = weights.map(|w| {
        let hit: u64 = w[1..].iter().fold(0u64, |a, &b| a.saturating_add(b));
        renorm2([hit, w[0]])
    });
    ctx.func.blocks[block].term = Terminator::CondBr {
        cond: cmp,
        then_dest: dest,
        else_dest: default,
        weights: new_weights,
    };
    debug!(?block, min, max, "switch range became a compare");
    true
}

/// Drop cases the scrutinee's known bits rule out; when the survivors
/// cover every value the unknown bits can form, the default is dead too.
fn eliminate_dead_switch_cases(ctx: &mut SimplifyCtx, block: BlockId) -> bool {
    let (value, cases, default, _) = match as_switch(&ctx.func.blocks[block].term) {
        Some(s) => s,
        None => return false,
    };
    let ty = ctx.func.value_types[value].clone();
    let width = match ty.bit_width() {
        Some(w) if ty.is_integer() => w,
        _ => return false,
    };
    let kb = known_bits(ctx.func, value, width);

    let mut dead: Vec<usize> = Vec::new();
    for (i, case) in cases.iter().enumerate() {
        let masked = (case.value as u64) & width_mask(width);
        let fits = if width == 64 {
            true
        } else if ty.is_unsigned() {
            case.value as u64 <= width_mask(width)
        } else {
            ((case.value << (64 - width)) >> (64 - width)) == case.value
        };
        if !fits || !kb.permits(masked, width) {
            dead.push(i);
        }
    }

    let mut changed = false;
    if !dead.is_empty() {
        let mut lost: Vec<BlockId> = Vec::new();
        if let Terminator::Switch { cases, weights, .. } = &mut ctx.func.blocks[block].term {
            for &i in dead.iter().rev() {
                let case = cases.remove(i);
                if !lost.contains(&case.dest) {
                    lost.push(case.dest);
                }
                if let Some(w) = weights {
                    w.remove(i + 1);
                }
            }
        }
        let mut updates = Vec::new();
        for &d in &lost {
            if !ctx.func.successors(block).contains(&d) {
                ctx.func.remove_phi_incoming(d, block);
                updates.push(DomUpdate::Delete(block, d));
            }
        }
        ctx.record_dom(updates);
        for d in lost {
            ctx.delete_block_if_dead(d);
        }
        debug!(?block, removed = dead.len(), "removed impossible switch cases");
        changed = true;
    }

    let remaining = cases.len() - dead.len();
    let unknown = kb.unknown_bit_count(width);
    if unknown < 64
        && remaining as u128 == 1u128 << unknown
        && !is_trivially_unreachable(ctx.func, default)
    {
        let trap = ctx.func.new_block();
        if let Terminator::Switch {
            default: d,
            weights,
            ..
        } = &mut ctx.func.blocks[block].term
        {
            *d = trap;
            if let Some(w) = weights {
                w[0] = 0;
            }
        }
        let mut updates = vec![DomUpdate::Insert(block, trap)];
        if !ctx.func.successors(block).contains(&default) {
            ctx.func.remove_phi_incoming(default, block);
            updates.push(DomUpdate::Delete(block, default));
        }
        ctx.record_dom(updates);
        ctx.delete_block_if_dead(default);
        debug!(?block, "switch cases are exhaustive, default unreachable");
        changed = true;
    }
    changed
}

/// Replace a phi operand that repeats a case's constant with the switch
/// scrutinee itself, freeing the constant's edge for later merging.
fn forward_switch_cond_to_phi(ctx: &mut SimplifyCtx, block: BlockId) -> bool {
    let (value, cases, default, _) = match as_switch(&ctx.func.blocks[block].term) {
        Some(s) => s,
        None => return false,
    };
    let ty_s = ctx.func.value_types[value].clone();
    let mut changed = false;
    for case in &cases {
        if case.dest == default
            || cases.iter().filter(|c| c.dest == case.dest).count() != 1
        {
            continue;
        }
        for phi in ctx.func.blocks[case.dest].phis.clone() {
            let v = match ctx.func.phi_incoming(phi, block) {
                Some(v) => v,
                None => continue,
            };
            if v == value
                || ctx.func.constant_of(v).and_then(|c| c.as_int()) != Some(case.value)
                || ctx.func.value_types[v] != ty_s
            {
                continue;
            }
            if let Op::Phi { incoming } = &mut ctx.func.insts[phi].op {
                for (b, iv) in incoming.iter_mut() {
                    if *b == block {
                        *iv = value;
                    }
                }
            }
            changed = true;
        }
    }
    changed
}

fn build_membership_test(
    ctx: &mut SimplifyCtx,
    block: BlockId,
    value: ValueId,
    vals: &[i64],
    ty: &Type,
) -> Option<ValueId> {
    match vals.len() {
        1 => {
            let c = ctx
                .func
                .emit_in(block, Op::Const(Constant::Int(vals[0])), ty.clone());
            Some(ctx.func.emit_in(block, Op::Cmp(CmpKind::Eq, value, c), Type::Bool))
        }
        n if vals[n - 1] as i128 - vals[0] as i128 + 1 == n as i128 => {
            let idx = if vals[0] != 0 {
                let mc = ctx
                    .func
                    .emit_in(block, Op::Const(Constant::Int(vals[0])), ty.clone());
                ctx.func.emit_in(block, Op::Sub(value, mc), ty.clone())
            } else {
                value
            };
            let len_c = ctx
                .func
                .emit_in(block, Op::Const(Constant::Int(n as i64)), ty.clone());
            Some(ctx.func.emit_in(block, Op::Cmp(CmpKind::ULt, idx, len_c), Type::Bool))
        }
        2 => {
            let c0 = ctx
                .func
                .emit_in(block, Op::Const(Constant::Int(vals[0])), ty.clone());
            let e0 = ctx
                .func
                .emit_in(block, Op::Cmp(CmpKind::Eq, value, c0), Type::Bool);
            let c1 = ctx
                .func
                .emit_in(block, Op::Const(Constant::Int(vals[1])), ty.clone());
            let e1 = ctx
                .func
                .emit_in(block, Op::Cmp(CmpKind::Eq, value, c1), Type::Bool);
            Some(ctx.func.emit_in(block, Op::BitOr(e0, e1), Type::Bool))
        }
        _ => None,
    }
}

/// A switch whose arms only choose between two constant outcomes per phi
/// becomes a select on a membership test.
fn switch_to_select(ctx: &mut SimplifyCtx, block: BlockId) -> bool {
    let (value, cases, default, _) = match as_switch(&ctx.func.blocks[block].term) {
        Some(s) => s,
        None => return false,
    };
    let ty_s = ctx.func.value_types[value].clone();
    if !ty_s.is_integer() {
        return false;
    }
    let mut common = None;
    let mut per_case: Vec<(i64, Vec<(crate::ir::InstId, Constant)>)> = Vec::new();
    for case in &cases {
        match lookup_table::case_results(
            ctx.func,
            block,
            value,
            Some(case.value),
            case.dest,
            &mut common,
        ) {
            Some((_, res)) if !res.is_empty() => per_case.push((case.value, res)),
            _ => return false,
        }
    }
    let common = match common {
        Some(c) if c != block && c != default => c,
        _ => return false,
    };
    if cases.iter().any(|c| c.dest == common) {
        return false;
    }

    let uniform = per_case
        .iter()
        .all(|(_, r)| r.iter().map(|(_, c)| c).eq(per_case[0].1.iter().map(|(_, c)| c)));
    let default_unreachable = is_trivially_unreachable(ctx.func, default);

    let mut sels: Vec<(crate::ir::InstId, ValueId)> = Vec::new();
    if default_unreachable {
        if uniform {
            for (phi, rc) in &per_case[0].1 {
                let r = ctx.func.insts[*phi].result.expect("phi without result");
                let ty = ctx.func.value_types[r].clone();
                let v = ctx.func.emit_in(block, Op::Const(rc.clone()), ty);
                sels.push((*phi, v));
            }
        } else if cases.len() == 2 {
            let c0 = ctx
                .func
                .emit_in(block, Op::Const(Constant::Int(per_case[0].0)), ty_s.clone());
            let test = ctx
                .func
                .emit_in(block, Op::Cmp(CmpKind::Eq, value, c0), Type::Bool);
            for i in 0..per_case[0].1.len() {
                let (phi, ref rc) = per_case[0].1[i];
                let rd = per_case[1].1[i].1.clone();
                let r = ctx.func.insts[phi].result.expect("phi without result");
                let ty = ctx.func.value_types[r].clone();
                let tv = ctx.func.emit_in(block, Op::Const(rc.clone()), ty.clone());
                let fv = ctx.func.emit_in(block, Op::Const(rd), ty.clone());
                let sel = ctx.func.emit_in(
                    block,
                    Op::Select {
                        cond: test,
                        on_true: tv,
                        on_false: fv,
                    },
                    ty,
                );
                sels.push((phi, sel));
            }
        } else {
            return false;
        }
    } else {
        if !uniform {
            return false;
        }
        let default_res =
            match lookup_table::case_results(ctx.func, block, value, None, default, &mut Some(common))
            {
                Some((_, res)) => res,
                None => return false,
            };
        let mut vals: Vec<i64> = per_case.iter().map(|(v, _)| *v).collect();
        vals.sort_unstable();
        let test = match build_membership_test(ctx, block, value, &vals, &ty_s) {
            Some(t) => t,
            None => return false,
        };
        for (i, (phi, rc)) in per_case[0].1.clone().into_iter().enumerate() {
            let rd = default_res[i].1.clone();
            let r = ctx.func.insts[phi].result.expect("phi without result");
            let ty = ctx.func.value_types[r].clone();
            let v = if rc == rd {
                ctx.func.emit_in(block, Op::Const(rc), ty)
            } else {
                let tv = ctx.func.emit_in(block, Op::Const(rc), ty.clone());
                let fv = ctx.func.emit_in(block, Op::Const(rd), ty.clone());
                ctx.func.emit_in(
                    block,
                    Op::Select {
                        cond: test,
                        on_true: tv,
                        on_false: fv,
                    },
                    ty,
                )
            };
            sels.push((phi, v));
        }
    }

    let old_succs: Vec<BlockId> = {
        let mut v = Vec::new();
        for s in ctx.func.successors(block) {
            if !v.contains(&s) {
                v.push(s);
            }
        }
        v
    };
    ctx.func.blocks[block].term = Terminator::Br { target: common };
    for (phi, v) in sels {
        if let Op::Phi { incoming } = &mut ctx.func.insts[phi].op {
            incoming.push((block, v));
        }
    }
    let mut updates = vec![DomUpdate::Insert(block, common)];
    for &s in &old_succs {
        updates.push(DomUpdate::Delete(block, s));
    }
    ctx.record_dom(updates);
    for s in old_succs {
        ctx.delete_block_if_dead(s);
    }
    debug!(?block, "switch became a select");
    true
}

/// Rebase and rotate the scrutinee so the cases sit against zero, shrinking
/// the spanned range when all case gaps share a power-of-two factor.
fn reduce_switch_range(ctx: &mut SimplifyCtx, block: BlockId) -> bool {
    let (value, cases, _, _) = match as_switch(&ctx.func.blocks[block].term) {
        Some(s) => s,
        None => return false,
    };
    let ty = ctx.func.value_types[value].clone();
    if !ty.is_unsigned() {
        return false;
    }
    let width = match ty.bit_width() {
        Some(w) => w,
        None => return false,
    };
    let vals: Vec<u64> = cases
        .iter()
        .map(|c| (c.value as u64) & width_mask(width))
        .collect();
    let min = *vals.iter().min().expect("nonempty");
    let max = *vals.iter().max().expect("nonempty");
    let mut shift = 64u32;
    for &v in &vals {
        let d = v - min;
        if d != 0 {
            shift = shift.min(d.trailing_zeros());
        }
    }
    if shift == 0 || shift >= width {
        return false;
    }
    let old_span = (max - min) as u128 + 1;
    let new_span = ((max - min) >> shift) as u128 + 1;
    if new_span >= old_span {
        return false;
    }
    if (cases.len() as u128) * 100 < ctx.options.min_density_percent as u128 * new_span {
        return false;
    }

    let shifted = if min != 0 {
        let base = ctx
            .func
            .emit_in(block, Op::Const(Constant::Int(min as i64)), ty.clone());
        ctx.func.emit_in(block, Op::Sub(value, base), ty.clone())
    } else {
        value
    };
    // Rotate rather than shift so values with nonzero low bits cannot
    // collide with rebased case values.
    let sh_c = ctx
        .func
        .emit_in(block, Op::Const(Constant::Int(shift as i64)), ty.clone());
    let lo = ctx.func.emit_in(block, Op::Shr(shifted, sh_c), ty.clone());
    let inv_c = ctx.func.emit_in(
        block,
        Op::Const(Constant::Int((width - shift) as i64)),
        ty.clone(),
    );
    let hi = ctx.func.emit_in(block, Op::Shl(shifted, inv_c), ty.clone());
    let rot = ctx.func.emit_in(block, Op::BitOr(lo, hi), ty);

    if let Terminator::Switch { value, cases, .. } = &mut ctx.func.blocks[block].term {
        *value = rot;
        for case in cases.iter_mut() {
            case.value = ((((case.value as u64) & width_mask(width)) - min) >> shift) as i64;
        }
    }
    debug!(?block, shift, "compressed switch range");
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FunctionBuilder, FunctionSig, Type};
    use crate::transforms::simplify_cfg::testing::simplify;

    fn sig(param: Type) -> FunctionSig {
        FunctionSig {
            params: vec![param],
            return_ty: Type::Int(32),
        }
    }

    fn ret_const(b: &mut FunctionBuilder, bb: BlockId, v: i64) {
        b.switch_to_block(bb);
        let c = b.const_int(v, Type::Int(32));
        b.ret(Some(c));
    }

    /// A contiguous run of cases into one block becomes a range test, with
    /// the default and hit weights carried over.
    #[test]
    fn contiguous_cases_become_range_test() {
        let mut b = FunctionBuilder::new("range", sig(Type::Int(32)));
        let x = b.param(0);
        let d = b.create_block();
        let e = b.create_block();
        b.switch_weighted(x, &[(5, d), (6, d), (7, d)], e, vec![4, 1, 2, 3]);
        ret_const(&mut b, d, 1);
        ret_const(&mut b, e, 0);

        let func = simplify(b.finish());
        match &func.blocks[func.entry].term {
            Terminator::CondBr {
                cond,
                then_dest,
                else_dest,
                weights,
            } => {
                assert_eq!(*then_dest, d);
                assert_eq!(*else_dest, e);
                assert_eq!(*weights, Some([6, 4]));
                assert!(matches!(
                    func.def_of(*cond).map(|i| &i.op),
                    Some(Op::Cmp(CmpKind::ULt, ..))
                ));
            }
            other => panic!("expected range test, got {other:?}"),
        }
    }

    /// Cases the scrutinee's known bits cannot produce disappear.
    #[test]
    fn masked_scrutinee_prunes_cases() {
        let mut b = FunctionBuilder::new("deadcases", sig(Type::Int(32)));
        let y = b.param(0);
        let a = b.create_block();
        let bb = b.create_block();
        let cc = b.create_block();
        let e = b.create_block();
        let three = b.const_int(3, Type::Int(32));
        let band = b.bit_and(y, three, Type::Int(32));
        b.switch(band, &[(1, a), (4, bb), (7, cc)], e);
        ret_const(&mut b, a, 1);
        ret_const(&mut b, bb, 2);
        ret_const(&mut b, cc, 3);
        ret_const(&mut b, e, 0);

        let func = simplify(b.finish());
        // Only the case for 1 can fire; the lone survivor then becomes a
        // compare against the default.
        assert!(matches!(
            func.blocks[func.entry].term,
            Terminator::CondBr { then_dest, else_dest, .. }
                if then_dest == a && else_dest == e
        ));
        assert!(matches!(func.blocks[bb].term, Terminator::Unreachable));
        assert!(matches!(func.blocks[cc].term, Terminator::Unreachable));
    }

    /// When the surviving cases cover every value the unknown bits allow,
    /// the default edge is rerouted to a trap block.
    #[test]
    fn exhaustive_cases_kill_the_default() {
        let mut b = FunctionBuilder::new("exhaustive", sig(Type::Int(32)));
        let y = b.param(0);
        let a = b.create_block();
        let bb = b.create_block();
        let cc = b.create_block();
        let dd = b.create_block();
        let e = b.create_block();
        let three = b.const_int(3, Type::Int(32));
        let band = b.bit_and(y, three, Type::Int(32));
        b.switch(band, &[(0, a), (1, bb), (2, cc), (3, dd)], e);
        ret_const(&mut b, a, 1);
        ret_const(&mut b, bb, 2);
        ret_const(&mut b, cc, 3);
        ret_const(&mut b, dd, 4);
        ret_const(&mut b, e, 0);

        let func = simplify(b.finish());
        match &func.blocks[func.entry].term {
            Terminator::Switch { cases, default, .. } => {
                assert_eq!(cases.len(), 4);
                assert_ne!(*default, e);
                assert!(matches!(
                    func.blocks[*default].term,
                    Terminator::Unreachable
                ));
            }
            other => panic!("expected switch, got {other:?}"),
        }
        // The old default block is gone.
        assert!(func.blocks[e].insts.is_empty());
        assert!(matches!(func.blocks[e].term, Terminator::Unreachable));
    }

    /// Two sparse cases with one shared result fold to a select on a
    /// two-way membership test.
    #[test]
    fn uniform_cases_fold_to_select() {
        let mut b = FunctionBuilder::new("select", sig(Type::Int(32)));
        let x = b.param(0);
        let a = b.create_block();
        let bb = b.create_block();
        let db = b.create_block();
        let common = b.create_block();
        b.switch(x, &[(1, a), (3, bb)], db);
        b.switch_to_block(a);
        let c7a = b.const_int(7, Type::Int(32));
        b.br(common);
        b.switch_to_block(bb);
        let c7b = b.const_int(7, Type::Int(32));
        b.br(common);
        b.switch_to_block(db);
        let c9 = b.const_int(9, Type::Int(32));
        b.br(common);
        b.switch_to_block(common);
        let p = b.phi(Type::Int(32), &[(a, c7a), (bb, c7b), (db, c9)]);
        b.ret(Some(p));

        let func = simplify(b.finish());
        let ret = match func.blocks[func.entry].term {
            Terminator::Return { value: Some(v) } => v,
            ref other => panic!("expected return, got {other:?}"),
        };
        match func.def_of(ret).map(|i| &i.op) {
            Some(Op::Select { cond, .. }) => {
                assert!(matches!(
                    func.def_of(*cond).map(|i| &i.op),
                    Some(Op::BitOr(..))
                ));
            }
            other => panic!("expected select, got {other:?}"),
        }
    }

    /// Two cases over an unreachable default need only an equality test.
    #[test]
    fn two_cases_without_default_fold_to_select() {
        let mut b = FunctionBuilder::new("twocase", sig(Type::Int(32)));
        let x = b.param(0);
        let a = b.create_block();
        let bb = b.create_block();
        let db = b.create_block();
        let common = b.create_block();
        b.switch(x, &[(10, a), (20, bb)], db);
        b.switch_to_block(db);
        b.unreachable_term();
        b.switch_to_block(a);
        let c1 = b.const_int(1, Type::Int(32));
        b.br(common);
        b.switch_to_block(bb);
        let c2 = b.const_int(2, Type::Int(32));
        b.br(common);
        b.switch_to_block(common);
        let p = b.phi(Type::Int(32), &[(a, c1), (bb, c2)]);
        b.ret(Some(p));

        let func = simplify(b.finish());
        let ret = match func.blocks[func.entry].term {
            Terminator::Return { value: Some(v) } => v,
            ref other => panic!("expected return, got {other:?}"),
        };
        match func.def_of(ret).map(|i| &i.op) {
            Some(Op::Select { cond, .. }) => {
                assert!(matches!(
                    func.def_of(*cond).map(|i| &i.op),
                    Some(Op::Cmp(CmpKind::Eq, ..))
                ));
            }
            other => panic!("expected select, got {other:?}"),
        }
    }

    /// Unsigned cases sharing a power-of-two stride get rebased and
    /// rotated down against zero.
    #[test]
    fn strided_cases_are_compressed() {
        let mut b = FunctionBuilder::new("stride", sig(Type::UInt(32)));
        let x = b.param(0);
        let a = b.create_block();
        let bb = b.create_block();
        let e = b.create_block();
        b.switch(x, &[(16, a), (48, bb)], e);
        ret_const(&mut b, a, 1);
        ret_const(&mut b, bb, 2);
        ret_const(&mut b, e, 0);

        let func = simplify(b.finish());
        match &func.blocks[func.entry].term {
            Terminator::Switch { value, cases, .. } => {
                let vals: Vec<i64> = cases.iter().map(|c| c.value).collect();
                assert_eq!(vals, vec![0, 1]);
                assert!(matches!(
                    func.def_of(*value).map(|i| &i.op),
                    Some(Op::BitOr(..))
                ));
            }
            other => panic!("expected switch, got {other:?}"),
        }
    }
}
