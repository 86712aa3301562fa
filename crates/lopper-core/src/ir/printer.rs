//! Human-readable IR printing for the CLI and for test failure output.

use std::fmt;

use crate::entity::EntityRef;

use super::block::Terminator;
use super::func::Function;
use super::inst::Op;
use super::module::Module;
use super::value::ValueId;

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "module {} {{", self.name)?;
        for func in self.functions.values() {
            write!(f, "{func}")?;
        }
        writeln!(f, "}}")
    }
}

impl Function {
    fn val(&self, v: ValueId) -> String {
        match self.value_names.get(&v) {
            Some(name) => format!("%{name}"),
            None => format!("%{}", v.index()),
        }
    }

    fn vals(&self, vs: &[ValueId]) -> String {
        vs.iter()
            .map(|&v| self.val(v))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params = self
            .params
            .iter()
            .map(|&p| self.val(p))
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(f, "  fn {}({params}) {{", self.name)?;
        for (bb, block) in self.blocks.iter() {
            let entry = if bb == self.entry { " (entry)" } else { "" };
            writeln!(f, "    b{}:{entry}", bb.index())?;
            for &phi in &block.phis {
                let inst = &self.insts[phi];
                if let (Some(r), Op::Phi { incoming }) = (inst.result, &inst.op) {
                    let arms = incoming
                        .iter()
                        .map(|(b, v)| format!("b{}: {}", b.index(), self.val(*v)))
                        .collect::<Vec<_>>()
                        .join(", ");
                    writeln!(f, "      {} = phi [{arms}]", self.val(r))?;
                }
            }
            for &id in &block.insts {
                let inst = &self.insts[id];
                match inst.result {
                    Some(r) => writeln!(f, "      {} = {}", self.val(r), self.op_str(&inst.op))?,
                    None => writeln!(f, "      {}", self.op_str(&inst.op))?,
                }
            }
            writeln!(f, "      {}", self.term_str(&block.term))?;
        }
        writeln!(f, "  }}")
    }
}

impl Function {
    fn op_str(&self, op: &Op) -> String {
        match op {
            Op::Const(c) => format!("const {c:?}"),
            Op::Add(a, b) => format!("add {}, {}", self.val(*a), self.val(*b)),
            Op::Sub(a, b) => format!("sub {}, {}", self.val(*a), self.val(*b)),
            Op::Mul(a, b) => format!("mul {}, {}", self.val(*a), self.val(*b)),
            Op::Div(a, b) => format!("div {}, {}", self.val(*a), self.val(*b)),
            Op::Rem(a, b) => format!("rem {}, {}", self.val(*a), self.val(*b)),
            Op::Neg(a) => format!("neg {}", self.val(*a)),
            Op::BitAnd(a, b) => format!("and {}, {}", self.val(*a), self.val(*b)),
            Op::BitOr(a, b) => format!("or {}, {}", self.val(*a), self.val(*b)),
            Op::BitXor(a, b) => format!("xor {}, {}", self.val(*a), self.val(*b)),
            Op::BitNot(a) => format!("bitnot {}", self.val(*a)),
            Op::Shl(a, b) => format!("shl {}, {}", self.val(*a), self.val(*b)),
            Op::Shr(a, b) => format!("shr {}, {}", self.val(*a), self.val(*b)),
            Op::Cmp(kind, a, b) => {
                format!("cmp.{kind:?} {}, {}", self.val(*a), self.val(*b))
            }
            Op::Not(a) => format!("not {}", self.val(*a)),
            Op::Select {
                cond,
                on_true,
                on_false,
            } => format!(
                "select {}, {}, {}",
                self.val(*cond),
                self.val(*on_true),
                self.val(*on_false)
            ),
            Op::Phi { incoming } => {
                let arms = incoming
                    .iter()
                    .map(|(b, v)| format!("b{}: {}", b.index(), self.val(*v)))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("phi [{arms}]")
            }
            Op::Load { ptr, volatile } => {
                let v = if *volatile { "volatile " } else { "" };
                format!("load {v}{}", self.val(*ptr))
            }
            Op::Store {
                ptr,
                value,
                volatile,
            } => {
                let v = if *volatile { "volatile " } else { "" };
                format!("store {v}{}, {}", self.val(*ptr), self.val(*value))
            }
            Op::Call { func, args } => format!("call {func}({})", self.vals(args)),
            Op::Assume(v) => format!("assume {}", self.val(*v)),
            Op::LandingPad => "landingpad".to_string(),
            Op::CleanupPad => "cleanuppad".to_string(),
            Op::BlockAddress(b) => format!("blockaddress b{}", b.index()),
            Op::Cast(v, ty) => format!("cast {} to {ty:?}", self.val(*v)),
            Op::Copy(v) => format!("copy {}", self.val(*v)),
            Op::ArrayInit(elems) => format!("array [{}]", self.vals(elems)),
            Op::GetIndex { array, index } => {
                format!("index {}[{}]", self.val(*array), self.val(*index))
            }
            Op::DebugMarker(text) => format!("dbg \"{text}\""),
        }
    }

    fn term_str(&self, term: &Terminator) -> String {
        match term {
            Terminator::Br { target } => format!("br b{}", target.index()),
            Terminator::CondBr {
                cond,
                then_dest,
                else_dest,
                weights,
            } => {
                let w = match weights {
                    Some([t, e]) => format!(" !{{{t}, {e}}}"),
                    None => String::new(),
                };
                format!(
                    "condbr {}, b{}, b{}{w}",
                    self.val(*cond),
                    then_dest.index(),
                    else_dest.index()
                )
            }
            Terminator::Switch {
                value,
                cases,
                default,
                weights,
            } => {
                let arms = cases
                    .iter()
                    .map(|c| format!("{} -> b{}", c.value, c.dest.index()))
                    .collect::<Vec<_>>()
                    .join(", ");
                let w = match weights {
                    Some(ws) => format!(" !{ws:?}"),
                    None => String::new(),
                };
                format!(
                    "switch {} [{arms}], default b{}{w}",
                    self.val(*value),
                    default.index()
                )
            }
            Terminator::Return { value } => match value {
                Some(v) => format!("ret {}", self.val(*v)),
                None => "ret".to_string(),
            },
            Terminator::Resume { value } => format!("resume {}", self.val(*value)),
            Terminator::CleanupRet { pad, unwind } => match unwind {
                Some(b) => format!("cleanupret {} unwind b{}", self.val(*pad), b.index()),
                None => format!("cleanupret {} to caller", self.val(*pad)),
            },
            Terminator::Unreachable => "unreachable".to_string(),
            Terminator::IndirectBr { address, dests } => {
                let ds = dests
                    .iter()
                    .map(|d| format!("b{}", d.index()))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("indirectbr {} [{ds}]", self.val(*address))
            }
            Terminator::Invoke {
                func,
                args,
                result,
                normal,
                unwind,
            } => {
                let r = match result {
                    Some(v) => format!("{} = ", self.val(*v)),
                    None => String::new(),
                };
                format!(
                    "{r}invoke {func}({}) to b{} unwind b{}",
                    self.vals(args),
                    normal.index(),
                    unwind.index()
                )
            }
        }
    }
}
