//! Control-flow graph simplification.
//!
//! A catalogue of local rewrites driven to fixpoint: folding branches
//! between blocks that test the same value, flattening small conditional
//! regions into selects, turning switches into arithmetic or lookup
//! tables, and trimming unreachable control flow. Each rewrite is a guard
//! followed by a mutation; a failed guard returns `false` and leaves the
//! function untouched.

use std::collections::HashSet;

use tracing::debug;

use crate::analysis::{
    net_updates, CostModel, DefaultCostModel, DomUpdate, DomUpdateSink,
};
use crate::error::CoreError;
use crate::ir::{BlockId, Function, Module, Terminator};
use crate::pipeline::transform::{Transform, TransformResult};

pub mod branch;
pub mod compare_chain;
pub mod eq_cases;
pub mod hoist_sink;
pub mod lookup_table;
pub mod ret_unwind;
pub mod speculate;
pub mod switch;
pub mod unreachable;

/// Tuning knobs for the simplifier.
#[derive(Debug, Clone)]
pub struct SimplifyOptions {
    /// Extra instructions allowed to be duplicated when folding a branch
    /// into a predecessor.
    pub bonus_inst_threshold: u32,
    /// Replace phi arms fed by a single-case switch with the case constant.
    pub forward_switch_cond: bool,
    /// Allow switch-to-lookup-table conversion.
    pub convert_switch_to_lookup_table: bool,
    /// Keep loop headers intact so loop passes still recognize them.
    pub need_canonical_loops: bool,
    pub hoist_common_insts: bool,
    pub sink_common_insts: bool,
    /// Master switch for conditional-branch rewrites.
    pub simplify_cond_branch: bool,
    pub fold_return_into_predecessors: bool,
    /// Cap on predecessors times cases when folding value comparisons.
    pub max_predecessor_fold_work: u32,
    /// Minimum percentage of a lookup table that must hold real entries.
    pub min_density_percent: u32,
    /// Total cost budget for speculatively executed instructions.
    pub max_speculation_cost: u32,
    /// Widest unsigned range a comparison chain leaf may cover.
    pub max_small_range_width: u64,
}

impl Default for SimplifyOptions {
    fn default() -> Self {
        Self {
            bonus_inst_threshold: 1,
            forward_switch_cond: false,
            convert_switch_to_lookup_table: false,
            need_canonical_loops: true,
            hoist_common_insts: true,
            sink_common_insts: false,
            simplify_cond_branch: true,
            fold_return_into_predecessors: false,
            max_predecessor_fold_work: 128,
            min_density_percent: 40,
            max_speculation_cost: 4,
            max_small_range_width: 8,
        }
    }
}

/// Shared state threaded through every rewrite.
pub(crate) struct SimplifyCtx<'a, 'b> {
    pub func: &'a mut Function,
    pub cost: &'a dyn CostModel,
    pub dom: Option<&'a mut (dyn DomUpdateSink + 'b)>,
    pub options: &'a SimplifyOptions,
    pub loop_headers: &'a HashSet<BlockId>,
}

impl SimplifyCtx<'_, '_> {
    /// Forward edge updates to the sink, reduced to their net effect.
    pub fn record_dom(&mut self, updates: Vec<DomUpdate>) {
        if let Some(sink) = self.dom.as_deref_mut() {
            let net = net_updates(&updates);
            if !net.is_empty() {
                sink.apply_updates(&net);
            }
        }
    }

    /// Delete `block` if nothing branches to it (a self-loop does not
    /// count), cascading into successors that lose their last predecessor.
    /// The entry block is never deleted.
    pub fn delete_block_if_dead(&mut self, block: BlockId) {
        let mut queue = vec![block];
        while let Some(bb) = queue.pop() {
            if bb == self.func.entry {
                continue;
            }
            let preds = self.func.predecessors(bb);
            if !preds.iter().all(|&p| p == bb) {
                continue;
            }
            let mut succs: Vec<BlockId> = Vec::new();
            for s in self.func.successors(bb) {
                if s != bb && !succs.contains(&s) {
                    succs.push(s);
                }
            }
            let mut updates = Vec::new();
            for &s in &succs {
                self.func.remove_phi_incoming(s, bb);
                updates.push(DomUpdate::Delete(bb, s));
            }
            self.func.clear_block(bb);
            self.record_dom(updates);
            queue.extend(succs);
        }
    }
}

/// Run rewrites on `block` until none fires, returning whether anything
/// changed.
pub fn simplify_control_flow(
    func: &mut Function,
    block: BlockId,
    cost: &dyn CostModel,
    mut dom: Option<&mut dyn DomUpdateSink>,
    options: &SimplifyOptions,
    loop_headers: &HashSet<BlockId>,
) -> bool {
    let mut changed = false;
    loop {
        let mut ctx = SimplifyCtx {
            func,
            cost,
            dom: dom.as_deref_mut(),
            options,
            loop_headers,
        };
        if !simplify_once(&mut ctx, block) {
            break;
        }
        changed = true;
    }
    changed
}

fn simplify_once(ctx: &mut SimplifyCtx, block: BlockId) -> bool {
    if ctx.options.sink_common_insts && hoist_sink::sink_common_from_predecessors(ctx, block) {
        return true;
    }
    match ctx.func.blocks[block].term {
        Terminator::Br { .. } => branch::simplify_uncond_branch(ctx, block),
        Terminator::CondBr { .. } => branch::simplify_cond_branch(ctx, block),
        Terminator::Switch { .. } => switch::simplify_switch(ctx, block),
        Terminator::Return { .. } => ret_unwind::simplify_return(ctx, block),
        Terminator::Resume { .. } => ret_unwind::simplify_resume(ctx, block),
        Terminator::CleanupRet { .. } => ret_unwind::simplify_cleanup_return(ctx, block),
        Terminator::Unreachable => unreachable::simplify_unreachable(ctx, block),
        Terminator::IndirectBr { .. } => unreachable::simplify_indirect_branch(ctx, block),
        Terminator::Invoke { .. } => false,
    }
}

/// Blocks that are the target of a back edge on some DFS path from entry.
pub fn find_loop_headers(func: &Function) -> HashSet<BlockId> {
    let mut headers = HashSet::new();
    let mut on_stack: HashSet<BlockId> = HashSet::new();
    let mut visited: HashSet<BlockId> = HashSet::new();
    // Explicit DFS stack of (block, next successor index).
    let mut stack: Vec<(BlockId, usize)> = vec![(func.entry, 0)];
    visited.insert(func.entry);
    on_stack.insert(func.entry);
    while let Some(frame) = stack.last_mut() {
        let bb = frame.0;
        let succs = func.successors(bb);
        if frame.1 < succs.len() {
            let s = succs[frame.1];
            frame.1 += 1;
            if on_stack.contains(&s) {
                headers.insert(s);
            } else if visited.insert(s) {
                on_stack.insert(s);
                stack.push((s, 0));
            }
        } else {
            on_stack.remove(&bb);
            stack.pop();
        }
    }
    headers
}

/// Blocks reachable from entry.
pub fn find_reachable_blocks(func: &Function) -> HashSet<BlockId> {
    let mut reachable = HashSet::new();
    let mut queue = vec![func.entry];
    reachable.insert(func.entry);
    while let Some(bb) = queue.pop() {
        for s in func.successors(bb) {
            if reachable.insert(s) {
                queue.push(s);
            }
        }
    }
    reachable
}

/// Clear blocks that cannot be reached from entry, dropping their phi
/// contributions to reachable successors.
pub fn remove_unreachable_blocks(func: &mut Function) -> bool {
    let reachable = find_reachable_blocks(func);
    let mut changed = false;
    let blocks: Vec<BlockId> = func.blocks.keys().collect();
    for bb in blocks {
        if reachable.contains(&bb) {
            continue;
        }
        let block = &func.blocks[bb];
        if block.phis.is_empty()
            && block.insts.is_empty()
            && matches!(block.term, Terminator::Unreachable)
        {
            continue;
        }
        for s in func.successors(bb) {
            if reachable.contains(&s) {
                func.remove_phi_incoming(s, bb);
            }
        }
        func.clear_block(bb);
        changed = true;
    }
    changed
}

/// Drive the whole function to fixpoint.
pub fn simplify_function(
    func: &mut Function,
    cost: &dyn CostModel,
    options: &SimplifyOptions,
) -> bool {
    let mut changed = false;
    loop {
        let mut iteration_changed = remove_unreachable_blocks(func);
        let loop_headers = if options.need_canonical_loops {
            find_loop_headers(func)
        } else {
            HashSet::new()
        };
        let reachable = find_reachable_blocks(func);
        let blocks: Vec<BlockId> = func.blocks.keys().collect();
        for bb in blocks {
            if !reachable.contains(&bb) {
                continue;
            }
            iteration_changed |=
                simplify_control_flow(func, bb, cost, None, options, &loop_headers);
        }
        if !iteration_changed {
            break;
        }
        changed = true;
    }
    if changed {
        remove_unreachable_blocks(func);
    }
    changed
}

/// The simplify-cfg pass.
#[derive(Debug, Default)]
pub struct SimplifyCfg {
    pub options: SimplifyOptions,
}

impl SimplifyCfg {
    pub fn new(options: SimplifyOptions) -> Self {
        Self { options }
    }
}

impl Transform for SimplifyCfg {
    fn name(&self) -> &str {
        "simplify-cfg"
    }

    fn apply(&self, mut module: Module) -> Result<TransformResult, CoreError> {
        let cost = DefaultCostModel;
        let mut changed = false;
        let funcs: Vec<_> = module.functions.keys().collect();
        for id in funcs {
            let func = &mut module.functions[id];
            if simplify_function(func, &cost, &self.options) {
                debug!(function = %func.name, "simplified control flow");
                changed = true;
            }
            func.verify_phis()?;
        }
        Ok(TransformResult { module, changed })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::analysis::RecordingSink;
    use crate::entity::EntityRef;
    use crate::ir::{FuncId, ModuleBuilder};

    /// Run the pass over a single function with default options.
    pub fn simplify(func: Function) -> Function {
        simplify_with(func, SimplifyOptions::default())
    }

    /// Run the pass over a single function with the given options.
    pub fn simplify_with(func: Function, options: SimplifyOptions) -> Function {
        let mut builder = ModuleBuilder::new("test");
        builder.add_function(func);
        let pass = SimplifyCfg::new(options);
        let result = pass.apply(builder.finish()).expect("simplify failed");
        let out = result.module.functions[FuncId::new(0)].clone();
        out.verify_phis().expect("phis inconsistent after simplify");
        out
    }

    /// Run rewrites on one block only, recording dominator updates.
    pub fn simplify_block(
        mut func: Function,
        block: BlockId,
        options: SimplifyOptions,
    ) -> (Function, bool, Vec<DomUpdate>) {
        let cost = DefaultCostModel;
        let loop_headers = find_loop_headers(&func);
        let mut sink = RecordingSink::default();
        let changed = simplify_control_flow(
            &mut func,
            block,
            &cost,
            Some(&mut sink),
            &options,
            &loop_headers,
        );
        (func, changed, sink.updates)
    }
}

#[cfg(test)]
mod tests {
    use super::testing::simplify;
    use super::*;
    use crate::ir::{CmpKind, FunctionBuilder, FunctionSig, ModuleBuilder, Type};

    fn int_sig(params: usize) -> FunctionSig {
        FunctionSig {
            params: vec![Type::Int(32); params],
            return_ty: Type::Int(32),
        }
    }

    /// A straight chain of empty blocks collapses to a single return.
    #[test]
    fn collapses_empty_chain() {
        let mut b = FunctionBuilder::new("chain", int_sig(1));
        let x = b.param(0);
        let b1 = b.create_block();
        let b2 = b.create_block();
        b.br(b1);
        b.switch_to_block(b1);
        b.br(b2);
        b.switch_to_block(b2);
        b.ret(Some(x));

        let func = simplify(b.finish());
        assert!(matches!(
            func.blocks[func.entry].term,
            Terminator::Return { .. }
        ));
    }

    /// Running the pass twice reports no change the second time.
    #[test]
    fn second_run_is_a_fixpoint() {
        let mut b = FunctionBuilder::new("fix", int_sig(2));
        let x = b.param(0);
        let y = b.param(1);
        let then_bb = b.create_block();
        let else_bb = b.create_block();
        let join = b.create_block();
        let c = b.cmp(CmpKind::Lt, x, y);
        b.cond_br(c, then_bb, else_bb);
        b.switch_to_block(then_bb);
        b.br(join);
        b.switch_to_block(else_bb);
        b.br(join);
        b.switch_to_block(join);
        let p = b.phi(Type::Int(32), &[(then_bb, x), (else_bb, y)]);
        b.ret(Some(p));

        let once = simplify(b.finish());
        let mut builder = ModuleBuilder::new("test");
        builder.add_function(once);
        let result = SimplifyCfg::default()
            .apply(builder.finish())
            .expect("second run failed");
        assert!(!result.changed);
    }

    /// Blocks with no path from entry are emptied out.
    #[test]
    fn unreachable_blocks_are_cleared() {
        let mut b = FunctionBuilder::new("dead", int_sig(1));
        let x = b.param(0);
        let dead = b.create_block();
        b.ret(Some(x));
        b.switch_to_block(dead);
        let v = b.const_int(1, Type::Int(32));
        b.ret(Some(v));

        let func = simplify(b.finish());
        assert!(func.blocks[dead].insts.is_empty());
        assert!(matches!(func.blocks[dead].term, Terminator::Unreachable));
    }

    /// Collapsing a branch on a constant reports the severed edge to the
    /// dominator update sink.
    #[test]
    fn dom_updates_are_recorded() {
        let mut b = FunctionBuilder::new("dom", int_sig(1));
        let x = b.param(0);
        let entry = b.current_block();
        let t = b.create_block();
        let f = b.create_block();
        let c = b.const_bool(true);
        b.cond_br(c, t, f);
        b.switch_to_block(t);
        b.ret(Some(x));
        b.switch_to_block(f);
        b.ret(Some(x));

        let (func, changed, updates) =
            testing::simplify_block(b.finish(), entry, SimplifyOptions::default());
        assert!(changed);
        assert!(updates.contains(&DomUpdate::Delete(entry, f)));
        assert!(matches!(
            func.blocks[func.entry].term,
            Terminator::Return { .. }
        ));
    }
}
