//! Turning chains of constant equality tests into a switch.
//!
//! `br (x == 1 | x == 3 | x == 11), t, e` hides a three-way dispatch on
//! `x`. The gatherer walks the or/and tree of the branch condition and
//! collects every constant the scrutinee is compared against; the rewrite
//! then replaces the branch with a switch. One operand of the tree is
//! allowed to be an arbitrary boolean, tested by a separate branch in
//! front of the switch.

use std::collections::HashSet;

use tracing::debug;

use crate::analysis::{width_mask, DomUpdate};
use crate::ir::{BlockId, CmpKind, Function, Op, SwitchCase, Terminator, ValueId};
use crate::transforms::util::remove_dead_defs;

use super::eq_cases::canonical_value;
use super::SimplifyCtx;

/// Constants gathered from a comparison chain over one scrutinee.
#[derive(Debug)]
pub(crate) struct ConstantCompares {
    pub value: ValueId,
    pub vals: Vec<i64>,
    /// A single operand of the tree that is not a constant compare.
    pub extra: Option<ValueId>,
    /// Number of compare instructions absorbed. Rewrites require at least
    /// two so a lone compare is not churned into a switch.
    pub used_cmps: u32,
}

/// Walk the condition tree of a branch. In `match_on_true` mode the tree
/// is a disjunction of equalities (`x == C1 | x == C2`); otherwise it is a
/// conjunction of inequalities whose leaves are inverted before matching.
pub(crate) fn gather_constant_compares(
    func: &Function,
    cond: ValueId,
    match_on_true: bool,
    max_span: u64,
) -> Option<ConstantCompares> {
    let mut out = ConstantCompares {
        value: cond,
        vals: Vec::new(),
        extra: None,
        used_cmps: 0,
    };
    let mut scrutinee: Option<ValueId> = None;
    let mut visited: HashSet<ValueId> = HashSet::new();
    let mut worklist = vec![cond];
    while let Some(v) = worklist.pop() {
        if !visited.insert(v) {
            continue;
        }
        match func.def_of(v).map(|i| &i.op) {
            Some(Op::BitOr(a, b)) if match_on_true => {
                worklist.push(*a);
                worklist.push(*b);
            }
            Some(Op::BitAnd(a, b)) if !match_on_true => {
                worklist.push(*a);
                worklist.push(*b);
            }
            _ => {
                if match_leaf(func, v, match_on_true, max_span, &mut scrutinee, &mut out) {
                    out.used_cmps += 1;
                } else {
                    if out.extra.is_some() {
                        return None;
                    }
                    out.extra = Some(v);
                }
            }
        }
    }
    let value = scrutinee?;
    out.value = value;
    out.vals.sort_unstable();
    out.vals.dedup();
    Some(out)
}

/// Swap a predicate's operand order: `C < x` reads as `x > C`.
fn mirror(kind: CmpKind) -> CmpKind {
    match kind {
        CmpKind::Eq => CmpKind::Eq,
        CmpKind::Ne => CmpKind::Ne,
        CmpKind::Lt => CmpKind::Gt,
        CmpKind::Le => CmpKind::Ge,
        CmpKind::Gt => CmpKind::Lt,
        CmpKind::Ge => CmpKind::Le,
        CmpKind::ULt => CmpKind::UGt,
        CmpKind::ULe => CmpKind::UGe,
        CmpKind::UGt => CmpKind::ULt,
        CmpKind::UGe => CmpKind::ULe,
    }
}

fn match_leaf(
    func: &Function,
    v: ValueId,
    match_on_true: bool,
    max_span: u64,
    scrutinee: &mut Option<ValueId>,
    out: &mut ConstantCompares,
) -> bool {
    let (raw_kind, a, b) = match func.def_of(v).map(|i| &i.op) {
        Some(Op::Cmp(kind, a, b)) => (*kind, *a, *b),
        _ => return false,
    };
    // Normalize the constant to the right-hand side.
    let (kind, lhs, constant) = if let Some(c) = func.constant_of(b).and_then(|c| c.as_int()) {
        (raw_kind, a, c)
    } else if let Some(c) = func.constant_of(a).and_then(|c| c.as_int()) {
        (mirror(raw_kind), b, c)
    } else {
        return false;
    };
    // In conjunction mode the leaf holds on the branch we do NOT match,
    // so the predicate is inverted.
    let kind = if match_on_true { kind } else { kind.inverse() };

    let width = func
        .value_types
        .get(lhs)
        .and_then(|t| t.bit_width())
        .unwrap_or(64);
    let unsigned = func
        .value_types
        .get(lhs)
        .map(|t| t.is_unsigned())
        .unwrap_or(false);

    // Masked equality idioms expand to two candidate constants.
    if kind == CmpKind::Eq {
        match func.def_of(lhs).map(|i| &i.op) {
            Some(Op::BitAnd(x0, k)) => {
                if let Some(kc) = func.constant_of(*k).and_then(|c| c.as_int()) {
                    let mask = !(kc as u64) & width_mask(width);
                    if mask.count_ones() == 1 && (constant as u64) & mask == 0 {
                        return record(
                            func,
                            *x0,
                            &[constant, constant | mask as i64],
                            scrutinee,
                            out,
                        );
                    }
                }
            }
            Some(Op::BitOr(x0, k)) => {
                if let Some(kc) = func.constant_of(*k).and_then(|c| c.as_int()) {
                    let bit = kc as u64 & width_mask(width);
                    if bit.is_power_of_two() && (constant as u64) & bit == bit {
                        return record(
                            func,
                            *x0,
                            &[constant, constant & !(bit as i64)],
                            scrutinee,
                            out,
                        );
                    }
                }
            }
            _ => {}
        }
        return record(func, lhs, &[constant], scrutinee, out);
    }

    // Small unsigned ranges starting at zero.
    let range: Option<(u64, u64)> = match kind {
        CmpKind::ULt => Some((0, constant as u64)),
        CmpKind::ULe => Some((0, (constant as u64).wrapping_add(1))),
        CmpKind::Lt if unsigned => Some((0, constant as u64)),
        CmpKind::Le if unsigned => Some((0, (constant as u64).wrapping_add(1))),
        _ => None,
    };
    if let Some((lo, hi)) = range {
        if hi > lo && hi - lo <= max_span && hi <= width_mask(width).wrapping_add(1) {
            let vals: Vec<i64> = (lo..hi).map(|c| c as i64).collect();
            return record(func, lhs, &vals, scrutinee, out);
        }
    }
    false
}

fn record(
    func: &Function,
    raw: ValueId,
    vals: &[i64],
    scrutinee: &mut Option<ValueId>,
    out: &mut ConstantCompares,
) -> bool {
    let x = canonical_value(func, raw);
    match scrutinee {
        Some(existing) if *existing != x => return false,
        Some(_) => {}
        None => *scrutinee = Some(x),
    }
    out.vals.extend_from_slice(vals);
    true
}

/// Rewrite a branch on an or/and chain of constant compares into a switch.
pub(crate) fn simplify_branch_on_icmp_chain(ctx: &mut SimplifyCtx, block: BlockId) -> bool {
    let (cond, then_dest, else_dest) = match ctx.func.blocks[block].term {
        Terminator::CondBr {
            cond,
            then_dest,
            else_dest,
            ..
        } => (cond, then_dest, else_dest),
        _ => return false,
    };
    if then_dest == else_dest {
        return false;
    }
    let max_span = ctx.options.max_small_range_width;
    for match_on_true in [true, false] {
        let cc = match gather_constant_compares(ctx.func, cond, match_on_true, max_span) {
            Some(cc) if cc.used_cmps >= 2 && !cc.vals.is_empty() => cc,
            _ => continue,
        };
        let (match_dest, other) = if match_on_true {
            (then_dest, else_dest)
        } else {
            (else_dest, then_dest)
        };

        let switch_block = if let Some(extra) = cc.extra {
            // Test the odd operand up front, then dispatch on the rest.
            let tail = ctx.func.new_block();
            ctx.func.blocks[block].term = if match_on_true {
                Terminator::CondBr {
                    cond: extra,
                    then_dest: match_dest,
                    else_dest: tail,
                    weights: None,
                }
            } else {
                Terminator::CondBr {
                    cond: extra,
                    then_dest: tail,
                    else_dest: match_dest,
                    weights: None,
                }
            };
            // match_dest keeps block as a predecessor and gains tail;
            // other is now reached through tail alone.
            ctx.func.add_phi_incoming_from(match_dest, tail, block);
            ctx.func.rename_phi_pred(other, block, tail);
            ctx.record_dom(vec![
                DomUpdate::Insert(block, tail),
                DomUpdate::Insert(tail, match_dest),
                DomUpdate::Insert(tail, other),
                DomUpdate::Delete(block, other),
            ]);
            tail
        } else {
            block
        };

        let cases: Vec<SwitchCase> = cc
            .vals
            .iter()
            .map(|&value| SwitchCase {
                value,
                dest: match_dest,
            })
            .collect();
        ctx.func.blocks[switch_block].term = Terminator::Switch {
            value: cc.value,
            cases,
            default: other,
            weights: None,
        };
        remove_dead_defs(ctx.func, block);
        debug!(
            ?block,
            values = cc.vals.len(),
            "rewrote compare chain into switch"
        );
        return true;
    }
    false
}
