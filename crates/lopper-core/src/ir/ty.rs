use serde::{Deserialize, Serialize};

/// A value type in the IR.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Type {
    Void,
    Bool,
    /// Signed integer of the given bit width.
    Int(u8),
    /// Unsigned integer of the given bit width.
    UInt(u8),
    Float(u8),
    Ptr,
    /// Opaque token produced by a cleanup pad.
    Token,
    /// The address of a basic block, as consumed by `IndirectBr`.
    BlockAddr,
}

impl Type {
    /// Bit width for integer-like types. `Bool` counts as one bit.
    pub fn bit_width(&self) -> Option<u32> {
        match self {
            Type::Bool => Some(1),
            Type::Int(w) | Type::UInt(w) => Some(*w as u32),
            _ => None,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Type::Int(_) | Type::UInt(_))
    }

    pub fn is_unsigned(&self) -> bool {
        matches!(self, Type::UInt(_))
    }
}

/// A function signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSig {
    pub params: Vec<Type>,
    pub return_ty: Type,
}

impl Default for FunctionSig {
    fn default() -> Self {
        Self {
            params: Vec::new(),
            return_ty: Type::Void,
        }
    }
}
