use serde::{Deserialize, Serialize};

use crate::define_entity;

use super::block::BlockId;
use super::ty::Type;
use super::value::{Constant, ValueId};

define_entity!(InstId);

/// Source location carried through rewrites for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    pub line: u32,
    pub col: u32,
}

/// An instruction: an operation plus its (optional) result value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inst {
    pub op: Op,
    pub result: Option<ValueId>,
    pub span: Span,
}

/// Comparison predicate. `Lt`/`Le`/`Gt`/`Ge` are signed; the `U`-prefixed
/// kinds compare as unsigned regardless of the operand type's signedness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpKind {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    ULt,
    ULe,
    UGt,
    UGe,
}

impl CmpKind {
    pub fn inverse(self) -> CmpKind {
        match self {
            CmpKind::Eq => CmpKind::Ne,
            CmpKind::Ne => CmpKind::Eq,
            CmpKind::Lt => CmpKind::Ge,
            CmpKind::Le => CmpKind::Gt,
            CmpKind::Gt => CmpKind::Le,
            CmpKind::Ge => CmpKind::Lt,
            CmpKind::ULt => CmpKind::UGe,
            CmpKind::ULe => CmpKind::UGt,
            CmpKind::UGt => CmpKind::ULe,
            CmpKind::UGe => CmpKind::ULt,
        }
    }
}

/// Non-terminator operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Op {
    Const(Constant),

    Add(ValueId, ValueId),
    Sub(ValueId, ValueId),
    Mul(ValueId, ValueId),
    Div(ValueId, ValueId),
    Rem(ValueId, ValueId),
    Neg(ValueId),

    BitAnd(ValueId, ValueId),
    BitOr(ValueId, ValueId),
    BitXor(ValueId, ValueId),
    BitNot(ValueId),
    Shl(ValueId, ValueId),
    Shr(ValueId, ValueId),

    Cmp(CmpKind, ValueId, ValueId),
    Not(ValueId),
    Select {
        cond: ValueId,
        on_true: ValueId,
        on_false: ValueId,
    },

    /// Merge point value. One entry per unique predecessor block.
    Phi {
        incoming: Vec<(BlockId, ValueId)>,
    },

    Load {
        ptr: ValueId,
        volatile: bool,
    },
    Store {
        ptr: ValueId,
        value: ValueId,
        volatile: bool,
    },
    Call {
        func: String,
        args: Vec<ValueId>,
    },
    /// Tells downstream analyses the operand is true on this path.
    Assume(ValueId),

    /// Entry marker of an exception landing block.
    LandingPad,
    /// Entry marker of a cleanup block; yields a token for `CleanupRet`.
    CleanupPad,
    BlockAddress(BlockId),
    Cast(ValueId, Type),
    Copy(ValueId),
    ArrayInit(Vec<ValueId>),
    GetIndex {
        array: ValueId,
        index: ValueId,
    },
    /// Debug breadcrumb; transparent to every rewrite.
    DebugMarker(String),
}

impl Op {
    /// Operations whose removal or reordering is observable.
    pub fn has_side_effects(&self) -> bool {
        match self {
            Op::Store { .. }
            | Op::Call { .. }
            | Op::Assume(_)
            | Op::LandingPad
            | Op::CleanupPad => true,
            Op::Load { volatile, .. } => *volatile,
            _ => false,
        }
    }

    /// Whether the operation can execute on a path where it originally did
    /// not. Division can trap, loads can fault, and phis and indexing are
    /// position-dependent.
    pub fn is_safe_to_speculate(&self) -> bool {
        if self.has_side_effects() {
            return false;
        }
        !matches!(
            self,
            Op::Div(..) | Op::Rem(..) | Op::Load { .. } | Op::Phi { .. } | Op::GetIndex { .. }
        )
    }

    /// Operations that cost nothing at runtime.
    pub fn is_free(&self) -> bool {
        matches!(self, Op::DebugMarker(_) | Op::Copy(_))
    }
}
