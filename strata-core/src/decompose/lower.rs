//! Lowering of individual buffer dereferences to word-level operations.

use std::collections::HashMap;

use log::trace;

use crate::error::Result;
use crate::ir::{
    AccessMode, AddressSpace, ArraySize, AtomicOp, BinaryOp, BlockId, BufferAtomicOp, BufferLoadOp, BufferStoreOp,
    Emit, FuncBody, FuncId, Function, GlobalId, GlobalVar, Index, InsertBefore, InstId, InstKind, ScalarKind, Span,
    Type, ValueId,
};
use crate::layout::LayoutOracle;
use crate::{IdArena, bail_access, err_access, err_atomic, err_layout};

use super::DecomposeOptions;
use super::chain::{self, AccessChain};
use super::helpers::HelperCache;
use super::offset::{self, ByteOffset};

/// The buffer an emission reads or writes.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Target {
    pub global: GlobalId,
    /// Buffer handle value, valid where the emission happens.
    pub handle: ValueId,
    pub access: AccessMode,
    pub span: Span,
}

pub(crate) struct Lowerer<'a> {
    pub globals: &'a IdArena<GlobalId, GlobalVar>,
    pub functions: &'a mut IdArena<FuncId, Function>,
    pub layout: &'a dyn LayoutOracle,
    pub options: &'a DecomposeOptions,
    pub helpers: HelperCache,
    pub lowered: usize,
}

/// Access mode of the handle replacing `var`. Uniform buffers are read-only.
pub(crate) fn handle_access(var: &GlobalVar) -> AccessMode {
    match var.space {
        AddressSpace::Uniform => AccessMode::Read,
        _ => var.access,
    }
}

impl<'a> Lowerer<'a> {
    /// Replace the dereference `inst` with word-level operations inserted
    /// before it, then unlink it.
    pub fn lower_inst(
        &mut self,
        body: &mut FuncBody,
        defs: &HashMap<ValueId, InstId>,
        block: BlockId,
        inst_id: InstId,
    ) -> Result<()> {
        let inst = body.get_inst(inst_id).clone();
        let span = inst.span;
        let Some(ptr) = inst.kind.dereferences() else {
            bail_access!(span, "{} does not dereference a pointer", inst_id);
        };

        let globals = self.globals;
        let chain = chain::resolve(body, defs, globals, ptr, span)?;
        let var = &globals[chain.global];
        let target = Target {
            global: chain.global,
            handle: chain.handle,
            access: handle_access(var),
            span,
        };
        let writes = matches!(inst.kind, InstKind::Store { .. } | InstKind::StoreVectorElement { .. });
        if writes && !target.access.is_writable() {
            bail_access!(span, "store into read-only {} buffer '{}'", var.space, var.name);
        }

        let mut e = InsertBefore::new(body, block, inst_id);
        let mut at = offset::fold_chain(&mut e, self.layout, &chain, span)?;

        let replacement = match &inst.kind {
            InstKind::Load { .. } => Some(self.load(&mut e, &target, &chain.leaf, at)?),
            InstKind::Store { value, .. } => {
                self.store(&mut e, &target, &chain.leaf, at, *value)?;
                None
            }
            InstKind::LoadVectorElement { index, .. } => {
                let elem = self.vector_element(&chain, &mut at, &mut e, *index, span)?;
                Some(self.load(&mut e, &target, &Type::Scalar(elem), at)?)
            }
            InstKind::StoreVectorElement { index, value, .. } => {
                let elem = self.vector_element(&chain, &mut at, &mut e, *index, span)?;
                self.store(&mut e, &target, &Type::Scalar(elem), at, *value)?;
                None
            }
            InstKind::Atomic { op, args, .. } => {
                self.atomic(&mut e, &target, var, &chain, at, *op, args, &inst.result_ty)?
            }
            _ => bail_access!(span, "{} does not dereference a pointer", inst_id),
        };

        trace!(
            "lowered {} on '{}' at offset {}{}",
            inst_id,
            var.name,
            at.constant,
            if at.dynamic.is_some() { " + dynamic" } else { "" }
        );

        if let (Some(old), Some(new)) = (inst.result, replacement) {
            body.replace_all_uses(old, new);
        }
        body.remove_inst(block, inst_id);
        self.lowered += 1;
        Ok(())
    }

    /// Offset `at` to a component of the vector the chain points at.
    fn vector_element(
        &self,
        chain: &AccessChain,
        at: &mut ByteOffset,
        e: &mut dyn Emit,
        index: Index,
        span: Span,
    ) -> Result<ScalarKind> {
        let Type::Vector { elem, .. } = chain.leaf else {
            bail_access!(span, "vector element access through a pointer to {}", chain.leaf);
        };
        let size = elem.byte_size().ok_or_else(|| err_layout!(span, "{} has no byte size", elem))?;
        at.add_scaled(e, index, size, span)?;
        Ok(elem)
    }

    /// Whether a value of `ty` is decomposed in place rather than via a helper.
    pub fn is_inline(&self, ty: &Type) -> bool {
        match ty {
            Type::Scalar(_) | Type::Vector { .. } | Type::Matrix { .. } | Type::Atomic(_) => true,
            Type::Struct(s) => {
                s.members.len() <= self.options.inline_struct_member_limit
                    && s.members.iter().all(|m| self.is_inline(&m.ty))
            }
            Type::Array {
                elem,
                size: ArraySize::Fixed(n),
            } => *n <= self.options.inline_array_limit && self.is_inline(elem),
            Type::Array {
                size: ArraySize::Runtime,
                ..
            } => false,
            Type::Void | Type::Pointer { .. } | Type::BufferHandle(_) => false,
        }
    }

    fn stride(&self, ty: &Type, span: Span) -> Result<u32> {
        self.layout.stride_of(ty).ok_or_else(|| err_layout!(span, "no array stride for {}", ty))
    }

    // =========================================================================
    // Loads
    // =========================================================================

    /// Load a value of type `ty` stored at `at`.
    pub fn load(&mut self, e: &mut dyn Emit, target: &Target, ty: &Type, at: ByteOffset) -> Result<ValueId> {
        let span = target.span;
        match ty {
            Type::Scalar(kind) => self.load_words(e, target, *kind, 1, at),
            Type::Vector { elem, width } => self.load_words(e, target, *elem, *width, at),
            Type::Matrix { elem, cols, rows } => {
                let stride = offset::column_stride(self.layout, ty, span)?;
                let mut columns = Vec::with_capacity(*cols as usize);
                for c in 0..*cols {
                    columns.push(self.load_words(e, target, *elem, *rows, at.plus_scaled(c, stride, span)?)?);
                }
                Ok(e.construct(columns, ty.clone())?)
            }
            Type::Struct(s) if self.is_inline(ty) => {
                let mut members = Vec::with_capacity(s.members.len());
                for (i, m) in s.members.iter().enumerate() {
                    let member = self
                        .layout
                        .member_offset(s, i as u32)
                        .ok_or_else(|| err_layout!(span, "no offset for member {} of {}", m.name, s.name))?;
                    members.push(self.load(e, target, &m.ty, at.plus(member, span)?)?);
                }
                Ok(e.construct(members, ty.clone())?)
            }
            Type::Array {
                elem,
                size: ArraySize::Fixed(n),
            } if self.is_inline(ty) => {
                let stride = self.stride(elem, span)?;
                let mut elements = Vec::with_capacity(*n as usize);
                for i in 0..*n {
                    elements.push(self.load(e, target, elem, at.plus_scaled(i, stride, span)?)?);
                }
                Ok(e.construct(elements, ty.clone())?)
            }
            Type::Struct(_) | Type::Array { .. } => {
                let loader = self.loader(ty, target)?;
                let offset = at.materialize(e)?;
                Ok(e.emit(
                    InstKind::Call {
                        func: loader,
                        args: vec![offset],
                    },
                    ty.clone(),
                )?)
            }
            Type::Atomic(_) => bail_access!(span, "atomic values are only accessible through atomic operations"),
            other => bail_access!(span, "cannot load a value of type {} from a buffer", other),
        }
    }

    /// Load `width` scalars of `kind`. 32-bit scalars are read as raw words
    /// and bitcast; f16 loads yield the typed value directly.
    fn load_words(
        &mut self,
        e: &mut dyn Emit,
        target: &Target,
        kind: ScalarKind,
        width: u32,
        at: ByteOffset,
    ) -> Result<ValueId> {
        let span = target.span;
        let ty = Type::scalar_or_vec(kind, width);
        if kind == ScalarKind::Bool {
            return Err(err_layout!(span, "{} is not host-shareable", ty));
        }
        let op = if kind.is_f16() { BufferLoadOp::halves(width) } else { BufferLoadOp::words(width) };
        let op = op.ok_or_else(|| err_access!(span, "no buffer load for {}", ty))?;

        let offset = at.materialize(e)?;
        let load = InstKind::BufferLoad {
            buffer: target.handle,
            op,
            offset,
        };
        if kind.is_f16() {
            return Ok(e.emit(load, ty)?);
        }
        let raw = e.emit(load, Type::scalar_or_vec(ScalarKind::U32, width))?;
        Ok(e.bitcast(raw, ty)?)
    }

    // =========================================================================
    // Stores
    // =========================================================================

    /// Store `value` of type `ty` at `at`.
    pub fn store(&mut self, e: &mut dyn Emit, target: &Target, ty: &Type, at: ByteOffset, value: ValueId) -> Result<()> {
        let span = target.span;
        match ty {
            Type::Scalar(kind) => self.store_words(e, target, *kind, 1, at, value),
            Type::Vector { elem, width } => self.store_words(e, target, *elem, *width, at, value),
            Type::Matrix { elem, cols, rows } => {
                let stride = offset::column_stride(self.layout, ty, span)?;
                let column_ty = Type::vec(*elem, *rows);
                for c in 0..*cols {
                    let column = e.extract(value, c, column_ty.clone())?;
                    self.store_words(e, target, *elem, *rows, at.plus_scaled(c, stride, span)?, column)?;
                }
                Ok(())
            }
            Type::Struct(s) if self.is_inline(ty) => {
                for (i, m) in s.members.iter().enumerate() {
                    let member = self
                        .layout
                        .member_offset(s, i as u32)
                        .ok_or_else(|| err_layout!(span, "no offset for member {} of {}", m.name, s.name))?;
                    let part = e.extract(value, i as u32, m.ty.clone())?;
                    self.store(e, target, &m.ty, at.plus(member, span)?, part)?;
                }
                Ok(())
            }
            Type::Array {
                elem,
                size: ArraySize::Fixed(n),
            } if self.is_inline(ty) => {
                let stride = self.stride(elem, span)?;
                for i in 0..*n {
                    let part = e.extract(value, i, (**elem).clone())?;
                    self.store(e, target, elem, at.plus_scaled(i, stride, span)?, part)?;
                }
                Ok(())
            }
            Type::Struct(_) | Type::Array { .. } => {
                let storer = self.storer(ty, target)?;
                let offset = at.materialize(e)?;
                e.emit_void(InstKind::Call {
                    func: storer,
                    args: vec![offset, value],
                })?;
                Ok(())
            }
            Type::Atomic(_) => bail_access!(span, "atomic values are only accessible through atomic operations"),
            other => bail_access!(span, "cannot store a value of type {} to a buffer", other),
        }
    }

    /// Store `width` scalars of `kind`. Values are bitcast to raw `u32` words,
    /// except f16 vectors, which use the typed half-precision stores.
    fn store_words(
        &mut self,
        e: &mut dyn Emit,
        target: &Target,
        kind: ScalarKind,
        width: u32,
        at: ByteOffset,
        value: ValueId,
    ) -> Result<()> {
        let span = target.span;
        let ty = Type::scalar_or_vec(kind, width);
        if kind == ScalarKind::Bool {
            return Err(err_layout!(span, "{} is not host-shareable", ty));
        }

        let (op, stored) = if kind.is_f16() && width > 1 {
            (BufferStoreOp::halves(width), value)
        } else {
            let raw = e.bitcast(value, Type::scalar_or_vec(ScalarKind::U32, width))?;
            (BufferStoreOp::words(width), raw)
        };
        let op = op.ok_or_else(|| err_access!(span, "no buffer store for {}", ty))?;

        let offset = at.materialize(e)?;
        e.emit_void(InstKind::BufferStore {
            buffer: target.handle,
            op,
            offset,
            value: stored,
        })?;
        Ok(())
    }

    // =========================================================================
    // Atomics
    // =========================================================================

    #[allow(clippy::too_many_arguments)]
    fn atomic(
        &mut self,
        e: &mut dyn Emit,
        target: &Target,
        var: &GlobalVar,
        chain: &AccessChain,
        at: ByteOffset,
        op: AtomicOp,
        args: &[ValueId],
        result_ty: &Type,
    ) -> Result<Option<ValueId>> {
        let span = target.span;
        if var.space == AddressSpace::Uniform {
            return Err(err_atomic!(span, "{} on uniform buffer '{}'", op, var.name));
        }
        if !target.access.is_writable() {
            return Err(err_atomic!(span, "{} on read-only storage buffer '{}'", op, var.name));
        }
        let Type::Atomic(kind) = chain.leaf else {
            bail_access!(span, "{} through a pointer to non-atomic {}", op, chain.leaf);
        };

        let signed = kind.is_signed_int();
        let raw_op = match op {
            AtomicOp::Load => BufferAtomicOp::AtomicLoad,
            AtomicOp::Store => BufferAtomicOp::AtomicStore,
            AtomicOp::Add => BufferAtomicOp::AtomicIAdd,
            AtomicOp::Sub => BufferAtomicOp::AtomicISub,
            AtomicOp::Max if signed => BufferAtomicOp::AtomicSMax,
            AtomicOp::Max => BufferAtomicOp::AtomicUMax,
            AtomicOp::Min if signed => BufferAtomicOp::AtomicSMin,
            AtomicOp::Min => BufferAtomicOp::AtomicUMin,
            AtomicOp::And => BufferAtomicOp::AtomicAnd,
            AtomicOp::Or => BufferAtomicOp::AtomicOr,
            AtomicOp::Xor => BufferAtomicOp::AtomicXor,
            AtomicOp::Exchange => BufferAtomicOp::AtomicExchange,
            AtomicOp::CompareExchangeWeak => BufferAtomicOp::AtomicCompareExchange,
        };

        let offset = at.materialize(e)?;
        let kind_inst = InstKind::BufferAtomic {
            buffer: target.handle,
            op: raw_op,
            offset,
            args: args.to_vec(),
        };

        match op {
            AtomicOp::Store => {
                e.emit_void(kind_inst)?;
                Ok(None)
            }
            AtomicOp::CompareExchangeWeak => {
                let [comparator, _] = args else {
                    bail_access!(span, "{} takes a comparator and a value", op);
                };
                let old = e.emit(kind_inst, Type::Scalar(kind))?;
                let exchanged = e.binary(BinaryOp::Equal, old, *comparator, Type::bool())?;
                Ok(Some(e.construct(vec![old, exchanged], result_ty.clone())?))
            }
            _ => Ok(Some(e.emit(kind_inst, Type::Scalar(kind))?)),
        }
    }
}
