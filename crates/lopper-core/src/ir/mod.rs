//! The intermediate representation: arena-backed functions made of basic
//! blocks, instructions, and typed values.

pub mod block;
pub mod builder;
pub mod func;
pub mod inst;
pub mod module;
pub mod printer;
pub mod ty;
pub mod value;

pub use block::{Block, BlockId, SwitchCase, Terminator};
pub use builder::{FunctionBuilder, ModuleBuilder};
pub use func::{FuncId, Function};
pub use inst::{CmpKind, Inst, InstId, Op, Span};
pub use module::Module;
pub use ty::{FunctionSig, Type};
pub use value::{Constant, ValueId};
