use super::block::{BlockId, SwitchCase, Terminator};
use super::func::Function;
use super::inst::{CmpKind, Inst, Op, Span};
use super::module::Module;
use super::ty::{FunctionSig, Type};
use super::value::{Constant, ValueId};

/// Builder for constructing functions block by block.
///
/// Positioned at one block at a time; instruction emitters append to the
/// current block, terminator setters replace its terminator.
pub struct FunctionBuilder {
    pub func: Function,
    current_block: BlockId,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<String>, sig: FunctionSig) -> Self {
        let mut func = Function::new(name, sig.clone());
        for ty in &sig.params {
            let v = func.new_value(ty.clone());
            func.params.push(v);
        }
        let current_block = func.entry;
        Self {
            func,
            current_block,
        }
    }

    pub fn finish(self) -> Function {
        self.func
    }

    pub fn param(&self, index: usize) -> ValueId {
        self.func.params[index]
    }

    pub fn current_block(&self) -> BlockId {
        self.current_block
    }

    pub fn create_block(&mut self) -> BlockId {
        self.func.new_block()
    }

    pub fn switch_to_block(&mut self, block: BlockId) {
        self.current_block = block;
    }

    fn emit(&mut self, op: Op, ty: Type) -> ValueId {
        self.func.emit_in(self.current_block, op, ty)
    }

    fn emit_void(&mut self, op: Op) {
        self.func.emit_void_in(self.current_block, op);
    }

    // Constants

    pub fn const_bool(&mut self, v: bool) -> ValueId {
        self.emit(Op::Const(Constant::Bool(v)), Type::Bool)
    }

    pub fn const_int(&mut self, v: i64, ty: Type) -> ValueId {
        self.emit(Op::Const(Constant::Int(v)), ty)
    }

    pub fn const_float(&mut self, v: f64) -> ValueId {
        self.emit(Op::Const(Constant::Float(v)), Type::Float(64))
    }

    pub fn undef(&mut self, ty: Type) -> ValueId {
        self.emit(Op::Const(Constant::Undef), ty)
    }

    // Arithmetic

    pub fn add(&mut self, a: ValueId, b: ValueId, ty: Type) -> ValueId {
        self.emit(Op::Add(a, b), ty)
    }

    pub fn sub(&mut self, a: ValueId, b: ValueId, ty: Type) -> ValueId {
        self.emit(Op::Sub(a, b), ty)
    }

    pub fn mul(&mut self, a: ValueId, b: ValueId, ty: Type) -> ValueId {
        self.emit(Op::Mul(a, b), ty)
    }

    pub fn div(&mut self, a: ValueId, b: ValueId, ty: Type) -> ValueId {
        self.emit(Op::Div(a, b), ty)
    }

    pub fn rem(&mut self, a: ValueId, b: ValueId, ty: Type) -> ValueId {
        self.emit(Op::Rem(a, b), ty)
    }

    pub fn neg(&mut self, a: ValueId, ty: Type) -> ValueId {
        self.emit(Op::Neg(a), ty)
    }

    // Bitwise

    pub fn bit_and(&mut self, a: ValueId, b: ValueId, ty: Type) -> ValueId {
        self.emit(Op::BitAnd(a, b), ty)
    }

    pub fn bit_or(&mut self, a: ValueId, b: ValueId, ty: Type) -> ValueId {
        self.emit(Op::BitOr(a, b), ty)
    }

    pub fn bit_xor(&mut self, a: ValueId, b: ValueId, ty: Type) -> ValueId {
        self.emit(Op::BitXor(a, b), ty)
    }

    pub fn bit_not(&mut self, a: ValueId, ty: Type) -> ValueId {
        self.emit(Op::BitNot(a), ty)
    }

    pub fn shl(&mut self, a: ValueId, b: ValueId, ty: Type) -> ValueId {
        self.emit(Op::Shl(a, b), ty)
    }

    pub fn shr(&mut self, a: ValueId, b: ValueId, ty: Type) -> ValueId {
        self.emit(Op::Shr(a, b), ty)
    }

    // Logic and selection

    pub fn cmp(&mut self, kind: CmpKind, a: ValueId, b: ValueId) -> ValueId {
        self.emit(Op::Cmp(kind, a, b), Type::Bool)
    }

    pub fn not(&mut self, a: ValueId) -> ValueId {
        self.emit(Op::Not(a), Type::Bool)
    }

    pub fn select(&mut self, cond: ValueId, on_true: ValueId, on_false: ValueId, ty: Type) -> ValueId {
        self.emit(
            Op::Select {
                cond,
                on_true,
                on_false,
            },
            ty,
        )
    }

    /// Add a phi to the current block. Incoming entries are keyed by unique
    /// predecessor block.
    pub fn phi(&mut self, ty: Type, incoming: &[(BlockId, ValueId)]) -> ValueId {
        let result = self.func.new_value(ty);
        let inst = self.func.insts.push(Inst {
            op: Op::Phi {
                incoming: incoming.to_vec(),
            },
            result: Some(result),
            span: Span::default(),
        });
        self.func.blocks[self.current_block].phis.push(inst);
        result
    }

    // Memory and calls

    pub fn load(&mut self, ptr: ValueId, ty: Type) -> ValueId {
        self.emit(
            Op::Load {
                ptr,
                volatile: false,
            },
            ty,
        )
    }

    pub fn store(&mut self, ptr: ValueId, value: ValueId) {
        self.emit_void(Op::Store {
            ptr,
            value,
            volatile: false,
        });
    }

    pub fn volatile_store(&mut self, ptr: ValueId, value: ValueId) {
        self.emit_void(Op::Store {
            ptr,
            value,
            volatile: true,
        });
    }

    pub fn call(&mut self, func: impl Into<String>, args: &[ValueId], ty: Type) -> ValueId {
        self.emit(
            Op::Call {
                func: func.into(),
                args: args.to_vec(),
            },
            ty,
        )
    }

    pub fn call_void(&mut self, func: impl Into<String>, args: &[ValueId]) {
        self.emit_void(Op::Call {
            func: func.into(),
            args: args.to_vec(),
        });
    }

    pub fn assume(&mut self, cond: ValueId) {
        self.emit_void(Op::Assume(cond));
    }

    // Misc

    pub fn landing_pad(&mut self) -> ValueId {
        self.emit(Op::LandingPad, Type::Token)
    }

    pub fn cleanup_pad(&mut self) -> ValueId {
        self.emit(Op::CleanupPad, Type::Token)
    }

    pub fn block_address(&mut self, block: BlockId) -> ValueId {
        self.emit(Op::BlockAddress(block), Type::BlockAddr)
    }

    pub fn cast(&mut self, value: ValueId, ty: Type) -> ValueId {
        self.emit(Op::Cast(value, ty.clone()), ty)
    }

    pub fn copy(&mut self, value: ValueId, ty: Type) -> ValueId {
        self.emit(Op::Copy(value), ty)
    }

    pub fn array_init(&mut self, elems: &[ValueId], ty: Type) -> ValueId {
        self.emit(Op::ArrayInit(elems.to_vec()), ty)
    }

    pub fn get_index(&mut self, array: ValueId, index: ValueId, ty: Type) -> ValueId {
        self.emit(Op::GetIndex { array, index }, ty)
    }

    pub fn debug_marker(&mut self, text: impl Into<String>) {
        self.emit_void(Op::DebugMarker(text.into()));
    }

    // Terminators

    pub fn br(&mut self, target: BlockId) {
        self.func.blocks[self.current_block].term = Terminator::Br { target };
    }

    pub fn cond_br(&mut self, cond: ValueId, then_dest: BlockId, else_dest: BlockId) {
        self.func.blocks[self.current_block].term = Terminator::CondBr {
            cond,
            then_dest,
            else_dest,
            weights: None,
        };
    }

    pub fn cond_br_weighted(
        &mut self,
        cond: ValueId,
        then_dest: BlockId,
        else_dest: BlockId,
        weights: [u64; 2],
    ) {
        self.func.blocks[self.current_block].term = Terminator::CondBr {
            cond,
            then_dest,
            else_dest,
            weights: Some(weights),
        };
    }

    pub fn switch(&mut self, value: ValueId, cases: &[(i64, BlockId)], default: BlockId) {
        self.func.blocks[self.current_block].term = Terminator::Switch {
            value,
            cases: cases
                .iter()
                .map(|&(value, dest)| SwitchCase { value, dest })
                .collect(),
            default,
            weights: None,
        };
    }

    pub fn switch_weighted(
        &mut self,
        value: ValueId,
        cases: &[(i64, BlockId)],
        default: BlockId,
        weights: Vec<u64>,
    ) {
        self.func.blocks[self.current_block].term = Terminator::Switch {
            value,
            cases: cases
                .iter()
                .map(|&(value, dest)| SwitchCase { value, dest })
                .collect(),
            default,
            weights: Some(weights),
        };
    }

    pub fn ret(&mut self, value: Option<ValueId>) {
        self.func.blocks[self.current_block].term = Terminator::Return { value };
    }

    pub fn resume(&mut self, value: ValueId) {
        self.func.blocks[self.current_block].term = Terminator::Resume { value };
    }

    pub fn cleanup_ret(&mut self, pad: ValueId, unwind: Option<BlockId>) {
        self.func.blocks[self.current_block].term = Terminator::CleanupRet { pad, unwind };
    }

    pub fn unreachable_term(&mut self) {
        self.func.blocks[self.current_block].term = Terminator::Unreachable;
    }

    pub fn indirect_br(&mut self, address: ValueId, dests: &[BlockId]) {
        self.func.blocks[self.current_block].term = Terminator::IndirectBr {
            address,
            dests: dests.to_vec(),
        };
    }

    pub fn invoke(
        &mut self,
        func: impl Into<String>,
        args: &[ValueId],
        ty: Type,
        normal: BlockId,
        unwind: BlockId,
    ) -> ValueId {
        let result = self.func.new_value(ty);
        self.func.blocks[self.current_block].term = Terminator::Invoke {
            func: func.into(),
            args: args.to_vec(),
            result: Some(result),
            normal,
            unwind,
        };
        result
    }

    pub fn invoke_void(
        &mut self,
        func: impl Into<String>,
        args: &[ValueId],
        normal: BlockId,
        unwind: BlockId,
    ) {
        self.func.blocks[self.current_block].term = Terminator::Invoke {
            func: func.into(),
            args: args.to_vec(),
            result: None,
            normal,
            unwind,
        };
    }
}

/// Builder for assembling modules out of finished functions.
pub struct ModuleBuilder {
    module: Module,
}

impl ModuleBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            module: Module::new(name),
        }
    }

    pub fn add_function(&mut self, func: Function) -> super::func::FuncId {
        self.module.functions.push(func)
    }

    pub fn finish(self) -> Module {
        self.module
    }
}
