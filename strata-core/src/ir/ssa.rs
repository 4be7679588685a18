//! SSA form of the strata IR.
//!
//! - **SSA values** (ValueId) produced exactly once
//! - **Explicit CFG** with block parameters (MLIR/Cranelift style, not phi nodes)
//! - **Module-scope variables** referenced from function bodies through
//!   `Global` instructions
//!
//! Side effects are ordered by program order within a block.

use std::collections::HashMap;
use std::fmt;

use super::types::{AccessMode, AddressSpace, BindingPoint, Type};
use crate::IdArena;

// =============================================================================
// ID Types
// =============================================================================

/// SSA value - defined exactly once.
///
/// Values are produced by instructions, function parameters or block parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueId(pub u32);

impl ValueId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for ValueId {
    fn from(id: u32) -> Self {
        ValueId(id)
    }
}

/// Instruction within a function.
///
/// Instructions are stored in a flat arena and referenced by InstId. An
/// instruction that is not listed in any block is dead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstId(pub u32);

impl InstId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for InstId {
    fn from(id: u32) -> Self {
        InstId(id)
    }
}

/// Basic block within a function.
///
/// BlockId(0) is always the entry block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub u32);

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// The entry block is always BlockId(0).
    pub const ENTRY: BlockId = BlockId(0);
}

impl From<u32> for BlockId {
    fn from(id: u32) -> Self {
        BlockId(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncId(pub u32);

impl From<u32> for FuncId {
    fn from(id: u32) -> Self {
        FuncId(id)
    }
}

/// Module-scope variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlobalId(pub u32);

impl From<u32> for GlobalId {
    fn from(id: u32) -> Self {
        GlobalId(id)
    }
}

/// Source location of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

impl Span {
    pub fn new(start_line: u32, start_col: u32, end_line: u32, end_col: u32) -> Self {
        Span {
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start_line, self.start_col)
    }
}

// =============================================================================
// Basic Blocks
// =============================================================================

/// Structured control flow header information.
#[derive(Debug, Clone)]
pub enum ControlHeader {
    /// This block is a loop header.
    Loop {
        /// The block where the loop exits to (post-loop code).
        merge: BlockId,
        /// The block that branches back to the header.
        continue_block: BlockId,
    },
    /// This block is a selection header (if-then-else).
    Selection { merge: BlockId },
}

/// A basic block in the CFG.
#[derive(Debug, Clone, Default)]
pub struct Block {
    /// Block parameters (replaces phi nodes).
    pub params: Vec<BlockParam>,

    /// Instructions in execution order.
    pub insts: Vec<InstId>,

    /// How control leaves this block.
    pub terminator: Option<Terminator>,

    pub control: Option<ControlHeader>,
}

impl Block {
    pub fn new() -> Self {
        Block::default()
    }

    pub fn with_params(params: Vec<BlockParam>) -> Self {
        Block {
            params,
            ..Block::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct BlockParam {
    pub value: ValueId,
    pub ty: Type,
    pub name: Option<String>,
}

/// How control leaves a basic block.
#[derive(Debug, Clone)]
pub enum Terminator {
    /// Unconditional branch: `br target(args...)`
    Branch { target: BlockId, args: Vec<ValueId> },

    /// Conditional branch: `br_if cond, then(then_args...), else(else_args...)`
    CondBranch {
        cond: ValueId,
        then_target: BlockId,
        then_args: Vec<ValueId>,
        else_target: BlockId,
        else_args: Vec<ValueId>,
    },

    Return(ValueId),

    ReturnUnit,

    Unreachable,
}

impl Terminator {
    pub fn operands(&self) -> Vec<ValueId> {
        match self {
            Terminator::Branch { args, .. } => args.clone(),
            Terminator::CondBranch {
                cond,
                then_args,
                else_args,
                ..
            } => std::iter::once(*cond).chain(then_args.iter().copied()).chain(else_args.iter().copied()).collect(),
            Terminator::Return(value) => vec![*value],
            Terminator::ReturnUnit | Terminator::Unreachable => vec![],
        }
    }

    pub fn for_each_operand_mut(&mut self, mut f: impl FnMut(&mut ValueId)) {
        match self {
            Terminator::Branch { args, .. } => args.iter_mut().for_each(f),
            Terminator::CondBranch {
                cond,
                then_args,
                else_args,
                ..
            } => {
                f(cond);
                then_args.iter_mut().for_each(&mut f);
                else_args.iter_mut().for_each(f);
            }
            Terminator::Return(value) => f(value),
            Terminator::ReturnUnit | Terminator::Unreachable => {}
        }
    }
}

// =============================================================================
// Instructions
// =============================================================================

/// Constant operand values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal {
    I32(i32),
    U32(u32),
    F32(f32),
    /// Raw IEEE binary16 bits.
    F16(u16),
    Bool(bool),
}

impl Literal {
    pub fn ty(self) -> Type {
        match self {
            Literal::I32(_) => Type::i32(),
            Literal::U32(_) => Type::u32(),
            Literal::F32(_) => Type::f32(),
            Literal::F16(_) => Type::f16(),
            Literal::Bool(_) => Type::bool(),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::I32(v) => write!(f, "{}i", v),
            Literal::U32(v) => write!(f, "{}u", v),
            Literal::F32(v) => write!(f, "{:?}f", v),
            Literal::F16(bits) => write!(f, "0x{:04x}h", bits),
            Literal::Bool(v) => write!(f, "{}", v),
        }
    }
}

/// One index of an access chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Index {
    Static(u32),
    Dynamic(ValueId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    /// Unsigned minimum.
    Min,
    Equal,
    GreaterThanEqual,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
            BinaryOp::Min => "min",
            BinaryOp::Equal => "eq",
            BinaryOp::GreaterThanEqual => "gte",
        };
        f.write_str(s)
    }
}

/// Atomic builtins operating through a pointer to an `atomic<T>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtomicOp {
    Load,
    Store,
    Add,
    Sub,
    Max,
    Min,
    And,
    Or,
    Xor,
    Exchange,
    /// Arguments `(comparator, value)`; yields `{old_value, exchanged}`.
    CompareExchangeWeak,
}

impl fmt::Display for AtomicOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AtomicOp::Load => "atomicLoad",
            AtomicOp::Store => "atomicStore",
            AtomicOp::Add => "atomicAdd",
            AtomicOp::Sub => "atomicSub",
            AtomicOp::Max => "atomicMax",
            AtomicOp::Min => "atomicMin",
            AtomicOp::And => "atomicAnd",
            AtomicOp::Or => "atomicOr",
            AtomicOp::Xor => "atomicXor",
            AtomicOp::Exchange => "atomicExchange",
            AtomicOp::CompareExchangeWeak => "atomicCompareExchangeWeak",
        };
        f.write_str(s)
    }
}

/// Word loads on a buffer handle. The `F16` variants read half-precision
/// lanes (two per word) and yield the typed value directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferLoadOp {
    Load,
    Load2,
    Load3,
    Load4,
    LoadF16,
    Load2F16,
    Load3F16,
    Load4F16,
}

impl BufferLoadOp {
    pub fn words(count: u32) -> Option<BufferLoadOp> {
        match count {
            1 => Some(BufferLoadOp::Load),
            2 => Some(BufferLoadOp::Load2),
            3 => Some(BufferLoadOp::Load3),
            4 => Some(BufferLoadOp::Load4),
            _ => None,
        }
    }

    pub fn halves(count: u32) -> Option<BufferLoadOp> {
        match count {
            1 => Some(BufferLoadOp::LoadF16),
            2 => Some(BufferLoadOp::Load2F16),
            3 => Some(BufferLoadOp::Load3F16),
            4 => Some(BufferLoadOp::Load4F16),
            _ => None,
        }
    }
}

impl fmt::Display for BufferLoadOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferStoreOp {
    Store,
    Store2,
    Store3,
    Store4,
    StoreF16,
    Store2F16,
    Store3F16,
    Store4F16,
}

impl BufferStoreOp {
    pub fn words(count: u32) -> Option<BufferStoreOp> {
        match count {
            1 => Some(BufferStoreOp::Store),
            2 => Some(BufferStoreOp::Store2),
            3 => Some(BufferStoreOp::Store3),
            4 => Some(BufferStoreOp::Store4),
            _ => None,
        }
    }

    pub fn halves(count: u32) -> Option<BufferStoreOp> {
        match count {
            1 => Some(BufferStoreOp::StoreF16),
            2 => Some(BufferStoreOp::Store2F16),
            3 => Some(BufferStoreOp::Store3F16),
            4 => Some(BufferStoreOp::Store4F16),
            _ => None,
        }
    }
}

impl fmt::Display for BufferStoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Raw atomic word operations on a buffer handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferAtomicOp {
    AtomicLoad,
    AtomicStore,
    AtomicIAdd,
    AtomicISub,
    AtomicSMax,
    AtomicUMax,
    AtomicSMin,
    AtomicUMin,
    AtomicAnd,
    AtomicOr,
    AtomicXor,
    AtomicExchange,
    /// Arguments `(comparator, value)`; yields the original word.
    AtomicCompareExchange,
}

impl fmt::Display for BufferAtomicOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// An SSA instruction.
#[derive(Debug, Clone)]
pub struct Inst {
    /// The value this instruction produces, if any.
    pub result: Option<ValueId>,
    /// Type of the result (Void if no result).
    pub result_ty: Type,
    pub kind: InstKind,
    /// Source location for diagnostics.
    pub span: Span,
}

/// The kind of operation an instruction performs.
#[derive(Debug, Clone)]
pub enum InstKind {
    Literal(Literal),
    /// Zero value of the result type.
    Zero,

    /// Pointer to (or, once decomposed, handle of) a module-scope variable.
    Global(GlobalId),
    /// Function-scope variable; the result is a pointer.
    Var { name: String, init: Option<ValueId> },
    /// Transparent alias of another value.
    Let { name: String, value: ValueId },
    /// Pointer to an element of the pointee of `base`.
    Access { base: ValueId, indices: Vec<Index> },

    Load { ptr: ValueId },
    Store { ptr: ValueId, value: ValueId },
    LoadVectorElement { ptr: ValueId, index: Index },
    StoreVectorElement { ptr: ValueId, index: Index, value: ValueId },
    Atomic { op: AtomicOp, ptr: ValueId, args: Vec<ValueId> },

    Binary { op: BinaryOp, lhs: ValueId, rhs: ValueId },
    /// Reinterprets the bits of `value` as the result type.
    Bitcast { value: ValueId },
    Construct(Vec<ValueId>),
    /// Static member/element/column of a composite value.
    Extract { composite: ValueId, index: u32 },
    Call { func: FuncId, args: Vec<ValueId> },

    // =========================================================================
    // Byte-address buffer operations
    // =========================================================================
    BufferLoad { buffer: ValueId, op: BufferLoadOp, offset: ValueId },
    BufferStore {
        buffer: ValueId,
        op: BufferStoreOp,
        offset: ValueId,
        value: ValueId,
    },
    BufferAtomic {
        buffer: ValueId,
        op: BufferAtomicOp,
        offset: ValueId,
        args: Vec<ValueId>,
    },
    /// Size of the buffer in bytes, queried at runtime.
    BufferLength { buffer: ValueId },
}

impl InstKind {
    /// Values read by this instruction, in operand order.
    pub fn operands(&self) -> Vec<ValueId> {
        let mut out = Vec::new();
        self.clone().for_each_operand_mut(|v| out.push(*v));
        out
    }

    pub fn for_each_operand_mut(&mut self, mut f: impl FnMut(&mut ValueId)) {
        fn index(f: &mut dyn FnMut(&mut ValueId), index: &mut Index) {
            if let Index::Dynamic(v) = index {
                f(v);
            }
        }
        match self {
            InstKind::Literal(_) | InstKind::Zero | InstKind::Global(_) => {}
            InstKind::Var { init, .. } => {
                if let Some(v) = init {
                    f(v);
                }
            }
            InstKind::Let { value, .. } => f(value),
            InstKind::Access { base, indices } => {
                f(base);
                for i in indices {
                    index(&mut f, i);
                }
            }
            InstKind::Load { ptr } => f(ptr),
            InstKind::Store { ptr, value } => {
                f(ptr);
                f(value);
            }
            InstKind::LoadVectorElement { ptr, index: i } => {
                f(ptr);
                index(&mut f, i);
            }
            InstKind::StoreVectorElement { ptr, index: i, value } => {
                f(ptr);
                index(&mut f, i);
                f(value);
            }
            InstKind::Atomic { ptr, args, .. } => {
                f(ptr);
                args.iter_mut().for_each(f);
            }
            InstKind::Binary { lhs, rhs, .. } => {
                f(lhs);
                f(rhs);
            }
            InstKind::Bitcast { value } => f(value),
            InstKind::Construct(operands) => operands.iter_mut().for_each(f),
            InstKind::Extract { composite, .. } => f(composite),
            InstKind::Call { args, .. } => args.iter_mut().for_each(f),
            InstKind::BufferLoad { buffer, offset, .. } => {
                f(buffer);
                f(offset);
            }
            InstKind::BufferStore {
                buffer, offset, value, ..
            } => {
                f(buffer);
                f(offset);
                f(value);
            }
            InstKind::BufferAtomic {
                buffer, offset, args, ..
            } => {
                f(buffer);
                f(offset);
                args.iter_mut().for_each(f);
            }
            InstKind::BufferLength { buffer } => f(buffer),
        }
    }

    /// Whether this instruction reads or writes memory through a pointer.
    pub fn dereferences(&self) -> Option<ValueId> {
        match self {
            InstKind::Load { ptr }
            | InstKind::Store { ptr, .. }
            | InstKind::LoadVectorElement { ptr, .. }
            | InstKind::StoreVectorElement { ptr, .. }
            | InstKind::Atomic { ptr, .. } => Some(*ptr),
            _ => None,
        }
    }
}

// =============================================================================
// Function Body
// =============================================================================

/// An SSA function body.
///
/// Contains blocks forming a CFG, with BlockId(0) as the entry block.
#[derive(Debug, Clone)]
pub struct FuncBody {
    /// Function parameters (value, type, name).
    pub params: Vec<(ValueId, Type, String)>,

    pub return_ty: Type,

    /// Basic blocks. BlockId(0) is the entry block.
    pub blocks: Vec<Block>,

    /// Instruction arena. Indexed by InstId.
    pub insts: Vec<Inst>,

    /// Type of each value. Indexed by ValueId.
    pub value_types: Vec<Type>,
}

impl FuncBody {
    /// Create a new function body with the given parameters and return type.
    pub fn new(params: Vec<(Type, String)>, return_ty: Type) -> Self {
        let mut value_types = Vec::new();
        let mut func_params = Vec::new();

        for (i, (ty, name)) in params.into_iter().enumerate() {
            value_types.push(ty.clone());
            func_params.push((ValueId(i as u32), ty, name));
        }

        FuncBody {
            params: func_params,
            return_ty,
            blocks: vec![Block::new()],
            insts: Vec::new(),
            value_types,
        }
    }

    pub fn alloc_value(&mut self, ty: Type) -> ValueId {
        let id = ValueId(self.value_types.len() as u32);
        self.value_types.push(ty);
        id
    }

    pub fn get_value_type(&self, value: ValueId) -> &Type {
        &self.value_types[value.index()]
    }

    pub fn get_block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    pub fn get_block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.index()]
    }

    pub fn get_inst(&self, id: InstId) -> &Inst {
        &self.insts[id.index()]
    }

    pub fn get_inst_mut(&mut self, id: InstId) -> &mut Inst {
        &mut self.insts[id.index()]
    }

    /// Add an instruction to the arena without placing it in a block.
    pub fn add_inst(&mut self, inst: Inst) -> InstId {
        let id = InstId(self.insts.len() as u32);
        self.insts.push(inst);
        id
    }

    /// Live instructions in program order, with their block.
    pub fn placed_insts(&self) -> Vec<(BlockId, InstId)> {
        self.blocks
            .iter()
            .enumerate()
            .flat_map(|(b, block)| block.insts.iter().map(move |&i| (BlockId(b as u32), i)))
            .collect()
    }

    /// Map from each instruction result to its producing instruction.
    pub fn value_defs(&self) -> HashMap<ValueId, InstId> {
        self.placed_insts()
            .into_iter()
            .filter_map(|(_, id)| self.get_inst(id).result.map(|v| (v, id)))
            .collect()
    }

    /// Unlink an instruction from its block; the arena entry becomes dead.
    pub fn remove_inst(&mut self, block: BlockId, inst: InstId) {
        self.get_block_mut(block).insts.retain(|&i| i != inst);
    }

    /// Rewrite every use of `old` to `new`, including terminators.
    pub fn replace_all_uses(&mut self, old: ValueId, new: ValueId) {
        let swap = |v: &mut ValueId| {
            if *v == old {
                *v = new;
            }
        };
        for inst in &mut self.insts {
            inst.kind.for_each_operand_mut(swap);
        }
        for block in &mut self.blocks {
            if let Some(term) = &mut block.terminator {
                term.for_each_operand_mut(swap);
            }
        }
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn num_insts(&self) -> usize {
        self.insts.len()
    }

    pub fn num_values(&self) -> usize {
        self.value_types.len()
    }
}

impl Default for FuncBody {
    fn default() -> Self {
        FuncBody::new(Vec::new(), Type::Void)
    }
}

// =============================================================================
// Module
// =============================================================================

/// Module-scope variable declaration (the root block `var`s).
#[derive(Debug, Clone)]
pub struct GlobalVar {
    pub name: String,
    pub space: AddressSpace,
    /// Store type, replaced by `BufferHandle` once the variable is decomposed.
    pub ty: Type,
    pub access: AccessMode,
    pub binding: Option<BindingPoint>,
}

impl GlobalVar {
    pub fn new(name: &str, space: AddressSpace, ty: Type, access: AccessMode) -> Self {
        GlobalVar {
            name: name.to_string(),
            space,
            ty,
            access,
            binding: None,
        }
    }

    pub fn with_binding(mut self, group: u32, binding: u32) -> Self {
        self.binding = Some(BindingPoint::new(group, binding));
        self
    }

    /// Type of the pointer a `Global` instruction yields for this variable.
    pub fn pointer_type(&self) -> Type {
        match &self.ty {
            Type::BufferHandle(_) => self.ty.clone(),
            ty => Type::ptr(self.space, ty.clone(), self.access),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub body: FuncBody,
    /// Synthesized by a lowering pass rather than written by the user.
    pub generated: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Module {
    pub globals: IdArena<GlobalId, GlobalVar>,
    pub functions: IdArena<FuncId, Function>,
}

impl Module {
    pub fn new() -> Self {
        Module::default()
    }

    pub fn add_global(&mut self, var: GlobalVar) -> GlobalId {
        self.globals.alloc(var)
    }

    pub fn add_function(&mut self, name: &str, body: FuncBody) -> FuncId {
        self.functions.alloc(Function {
            name: name.to_string(),
            body,
            generated: false,
        })
    }

    pub fn global(&self, id: GlobalId) -> &GlobalVar {
        &self.globals[id]
    }

    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id]
    }

    pub fn function_by_name(&self, name: &str) -> Option<(FuncId, &Function)> {
        self.functions.iter().find(|(_, f)| f.name == name).map(|(id, f)| (*id, f))
    }
}

// =============================================================================
// Display Implementations
// =============================================================================

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

impl fmt::Display for InstId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "i{}", self.0)
    }
}
