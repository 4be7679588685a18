//! SSA function builder.
//!
//! Provides a safe API for constructing SSA functions, ensuring:
//! - Blocks are properly terminated before switching
//! - Values are allocated before use
//! - The entry block is set up correctly
//!
//! Passes that rewrite an existing body in place emit through [`InsertBefore`]
//! instead. Both implement [`Emit`], so lowering code is written once against
//! the trait.

use super::ssa::{
    BinaryOp, Block, BlockId, BlockParam, ControlHeader, FuncBody, Inst, InstId, InstKind, Literal, Span,
    Terminator, ValueId,
};
use super::types::Type;

/// Error during function building.
#[derive(Debug, Clone)]
pub enum BuilderError {
    /// Tried to add instructions without selecting a block.
    NoCurrentBlock,
    /// Current block was not terminated before finishing.
    UnterminatedBlock(BlockId),
    /// Block was terminated but instructions were added after.
    BlockAlreadyTerminated(BlockId),
    /// Function has no blocks.
    NoBlocks,
    /// The instruction to insert before is not in the target block.
    AnchorNotFound(InstId),
}

impl std::fmt::Display for BuilderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuilderError::NoCurrentBlock => write!(f, "No current block selected"),
            BuilderError::UnterminatedBlock(id) => write!(f, "Block {} has no terminator", id),
            BuilderError::BlockAlreadyTerminated(id) => {
                write!(f, "Block {} already terminated", id)
            }
            BuilderError::NoBlocks => write!(f, "Function has no blocks"),
            BuilderError::AnchorNotFound(id) => write!(f, "Instruction {} is not in the block", id),
        }
    }
}

impl std::error::Error for BuilderError {}

// =============================================================================
// Emission interface
// =============================================================================

/// Sink for new instructions, wherever they end up.
pub trait Emit {
    fn value_type(&self, value: ValueId) -> Type;

    /// Emit an instruction producing a value of type `ty`.
    fn emit(&mut self, kind: InstKind, ty: Type) -> Result<ValueId, BuilderError>;

    /// Emit an instruction with no result.
    fn emit_void(&mut self, kind: InstKind) -> Result<(), BuilderError>;

    fn literal(&mut self, lit: Literal) -> Result<ValueId, BuilderError> {
        self.emit(InstKind::Literal(lit), lit.ty())
    }

    fn const_u32(&mut self, value: u32) -> Result<ValueId, BuilderError> {
        self.literal(Literal::U32(value))
    }

    fn binary(&mut self, op: BinaryOp, lhs: ValueId, rhs: ValueId, ty: Type) -> Result<ValueId, BuilderError> {
        self.emit(InstKind::Binary { op, lhs, rhs }, ty)
    }

    fn bitcast(&mut self, value: ValueId, ty: Type) -> Result<ValueId, BuilderError> {
        self.emit(InstKind::Bitcast { value }, ty)
    }

    fn construct(&mut self, operands: Vec<ValueId>, ty: Type) -> Result<ValueId, BuilderError> {
        self.emit(InstKind::Construct(operands), ty)
    }

    fn extract(&mut self, composite: ValueId, index: u32, ty: Type) -> Result<ValueId, BuilderError> {
        self.emit(InstKind::Extract { composite, index }, ty)
    }
}

// =============================================================================
// Function builder
// =============================================================================

/// Builder for constructing SSA functions.
///
/// # Example
///
/// ```ignore
/// let mut builder = FuncBuilder::new(vec![(Type::u32(), "x".to_string())], Type::u32());
///
/// // Entry block is current by default
/// let x = builder.get_param(0);
/// let one = builder.const_u32(1)?;
/// let result = builder.binary(BinaryOp::Add, x, one, Type::u32())?;
/// builder.terminate(Terminator::Return(result))?;
///
/// let body = builder.finish()?;
/// ```
pub struct FuncBuilder {
    body: FuncBody,
    current_block: Option<BlockId>,
    span: Span,
}

impl FuncBuilder {
    /// Create a new function builder.
    ///
    /// The entry block (BlockId(0)) is created automatically and set as current.
    pub fn new(params: Vec<(Type, String)>, return_ty: Type) -> Self {
        FuncBuilder {
            body: FuncBody::new(params, return_ty),
            current_block: Some(BlockId::ENTRY),
            span: Span::default(),
        }
    }

    /// Get the value for a function parameter by index.
    pub fn get_param(&self, index: usize) -> ValueId {
        self.body.params[index].0
    }

    /// Span attached to every instruction pushed from now on.
    pub fn set_span(&mut self, span: Span) {
        self.span = span;
    }

    /// Create a new basic block with no parameters.
    pub fn create_block(&mut self) -> BlockId {
        let id = BlockId(self.body.blocks.len() as u32);
        self.body.blocks.push(Block::new());
        id
    }

    /// Create a new basic block with parameters.
    ///
    /// Returns the block ID and the values defined by the parameters.
    pub fn create_block_with_params(&mut self, param_types: Vec<Type>) -> (BlockId, Vec<ValueId>) {
        let named = param_types.into_iter().map(|ty| (ty, None)).collect();
        self.create_block_with_param_names(named)
    }

    /// Create a new block with named parameters.
    pub fn create_block_with_named_params(&mut self, params: Vec<(Type, String)>) -> (BlockId, Vec<ValueId>) {
        let named = params.into_iter().map(|(ty, name)| (ty, Some(name))).collect();
        self.create_block_with_param_names(named)
    }

    fn create_block_with_param_names(&mut self, params: Vec<(Type, Option<String>)>) -> (BlockId, Vec<ValueId>) {
        let id = BlockId(self.body.blocks.len() as u32);

        let mut block_params = Vec::new();
        let mut values = Vec::new();

        for (ty, name) in params {
            let value = self.body.alloc_value(ty.clone());
            block_params.push(BlockParam { value, ty, name });
            values.push(value);
        }

        self.body.blocks.push(Block::with_params(block_params));
        (id, values)
    }

    /// Switch to building in the specified block.
    ///
    /// The previous block must be terminated (have a terminator set).
    pub fn switch_to_block(&mut self, block: BlockId) -> Result<(), BuilderError> {
        if let Some(prev) = self.current_block {
            if self.body.get_block(prev).terminator.is_none() {
                return Err(BuilderError::UnterminatedBlock(prev));
            }
        }
        self.current_block = Some(block);
        Ok(())
    }

    /// Switch to a block without checking if the previous block is terminated.
    ///
    /// Use this when you need to build blocks out of order.
    pub fn switch_to_block_unchecked(&mut self, block: BlockId) {
        self.current_block = Some(block);
    }

    pub fn current_block(&self) -> Option<BlockId> {
        self.current_block
    }

    pub fn is_current_terminated(&self) -> bool {
        self.current_block.map(|b| self.body.get_block(b).terminator.is_some()).unwrap_or(false)
    }

    fn push_inst_internal(
        &mut self,
        kind: InstKind,
        result_ty: Type,
        has_result: bool,
    ) -> Result<(InstId, Option<ValueId>), BuilderError> {
        let block_id = self.current_block.ok_or(BuilderError::NoCurrentBlock)?;

        if self.body.get_block(block_id).terminator.is_some() {
            return Err(BuilderError::BlockAlreadyTerminated(block_id));
        }

        let result = if has_result { Some(self.body.alloc_value(result_ty.clone())) } else { None };

        let inst_id = self.body.add_inst(Inst {
            result,
            result_ty,
            kind,
            span: self.span,
        });
        self.body.get_block_mut(block_id).insts.push(inst_id);

        Ok((inst_id, result))
    }

    /// Push an instruction that produces a value.
    pub fn push_inst(&mut self, kind: InstKind, ty: Type) -> Result<ValueId, BuilderError> {
        match self.push_inst_internal(kind, ty, true)? {
            (_, Some(value)) => Ok(value),
            (_, None) => Err(BuilderError::NoCurrentBlock),
        }
    }

    /// Push an instruction that produces no value (e.g., Store).
    pub fn push_void_inst(&mut self, kind: InstKind) -> Result<InstId, BuilderError> {
        let (inst_id, _) = self.push_inst_internal(kind, Type::Void, false)?;
        Ok(inst_id)
    }

    /// Set the terminator for the current block.
    pub fn terminate(&mut self, term: Terminator) -> Result<(), BuilderError> {
        let block_id = self.current_block.ok_or(BuilderError::NoCurrentBlock)?;

        if self.body.get_block(block_id).terminator.is_some() {
            return Err(BuilderError::BlockAlreadyTerminated(block_id));
        }

        self.body.get_block_mut(block_id).terminator = Some(term);
        Ok(())
    }

    /// Finish building and return the function body.
    ///
    /// All blocks must be terminated.
    pub fn finish(self) -> Result<FuncBody, BuilderError> {
        if self.body.blocks.is_empty() {
            return Err(BuilderError::NoBlocks);
        }

        for (i, block) in self.body.blocks.iter().enumerate() {
            if block.terminator.is_none() {
                return Err(BuilderError::UnterminatedBlock(BlockId(i as u32)));
            }
        }

        Ok(self.body)
    }

    /// Finish without checking termination (for testing).
    pub fn finish_unchecked(self) -> FuncBody {
        self.body
    }

    // =========================================================================
    // Convenience methods for memory instructions
    // =========================================================================

    /// Push a function-scope variable; returns the pointer.
    pub fn push_var(&mut self, name: &str, ptr_ty: Type, init: Option<ValueId>) -> Result<ValueId, BuilderError> {
        self.push_inst(
            InstKind::Var {
                name: name.to_string(),
                init,
            },
            ptr_ty,
        )
    }

    pub fn push_load(&mut self, ptr: ValueId, ty: Type) -> Result<ValueId, BuilderError> {
        self.push_inst(InstKind::Load { ptr }, ty)
    }

    pub fn push_store(&mut self, ptr: ValueId, value: ValueId) -> Result<InstId, BuilderError> {
        self.push_void_inst(InstKind::Store { ptr, value })
    }

    // =========================================================================
    // Control Flow Pattern Helpers
    // =========================================================================
    //
    // ## Counted Loop Pattern
    //
    // ```text
    // entry:
    //     %zero = 0u
    //     br header(%zero)
    //
    // header(%idx: u32):                 ; loop merge=exit continue=continuing
    //     %done = gte %idx, %count
    //     br_if %done, exit(), body()
    //
    // body:
    //     ... ; use %idx
    //     br continuing()
    //
    // continuing:
    //     %next = add %idx, 1u
    //     br header(%next)
    //
    // exit:
    // ```

    /// Create the block structure for a loop counting a `u32` index up from
    /// zero.
    ///
    /// The caller branches to `header` with the initial index, emits the exit
    /// test in `header`, fills `body`, and increments in `continuing`.
    pub fn create_counted_loop(&mut self) -> CountedLoopBlocks {
        let (header, header_params) = self.create_block_with_named_params(vec![(Type::u32(), "idx".to_string())]);
        let index = header_params[0];

        let body = self.create_block();
        let continuing = self.create_block();
        let exit = self.create_block();

        self.body.blocks[header.index()].control = Some(ControlHeader::Loop {
            merge: exit,
            continue_block: continuing,
        });

        CountedLoopBlocks {
            header,
            index,
            body,
            continuing,
            exit,
        }
    }
}

impl Emit for FuncBuilder {
    fn value_type(&self, value: ValueId) -> Type {
        self.body.get_value_type(value).clone()
    }

    fn emit(&mut self, kind: InstKind, ty: Type) -> Result<ValueId, BuilderError> {
        self.push_inst(kind, ty)
    }

    fn emit_void(&mut self, kind: InstKind) -> Result<(), BuilderError> {
        self.push_void_inst(kind).map(|_| ())
    }
}

/// Block structure for a counted loop.
#[derive(Debug, Clone)]
pub struct CountedLoopBlocks {
    /// Loop header block (has the index parameter).
    pub header: BlockId,
    /// The loop index value (header's parameter).
    pub index: ValueId,
    pub body: BlockId,
    /// Continue target; increments the index and branches back to the header.
    pub continuing: BlockId,
    /// Merge block of the loop.
    pub exit: BlockId,
}

// =============================================================================
// In-place insertion
// =============================================================================

/// Emits new instructions into an existing body, immediately before `anchor`
/// and in emission order.
pub struct InsertBefore<'a> {
    body: &'a mut FuncBody,
    block: BlockId,
    anchor: InstId,
    span: Span,
}

impl<'a> InsertBefore<'a> {
    /// New instructions inherit the anchor's span.
    pub fn new(body: &'a mut FuncBody, block: BlockId, anchor: InstId) -> Self {
        let span = body.get_inst(anchor).span;
        InsertBefore {
            body,
            block,
            anchor,
            span,
        }
    }

    fn place(&mut self, inst: Inst) -> Result<InstId, BuilderError> {
        let insts = &self.body.get_block(self.block).insts;
        let at = insts.iter().position(|&i| i == self.anchor).ok_or(BuilderError::AnchorNotFound(self.anchor))?;
        let id = self.body.add_inst(inst);
        self.body.get_block_mut(self.block).insts.insert(at, id);
        Ok(id)
    }
}

impl Emit for InsertBefore<'_> {
    fn value_type(&self, value: ValueId) -> Type {
        self.body.get_value_type(value).clone()
    }

    fn emit(&mut self, kind: InstKind, ty: Type) -> Result<ValueId, BuilderError> {
        let result = self.body.alloc_value(ty.clone());
        self.place(Inst {
            result: Some(result),
            result_ty: ty,
            kind,
            span: self.span,
        })?;
        Ok(result)
    }

    fn emit_void(&mut self, kind: InstKind) -> Result<(), BuilderError> {
        self.place(Inst {
            result: None,
            result_ty: Type::Void,
            kind,
            span: self.span,
        })?;
        Ok(())
    }
}
