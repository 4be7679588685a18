//! Generated loader and storer functions for composites that are not
//! unrolled inline.
//!
//! Helpers are memoized per `(type, access, variable, direction)`. A loader
//! takes the byte offset of the value and returns it; a storer takes the
//! offset and the value. Both read the buffer handle of their variable
//! directly, so callers pass only the offset.

use std::collections::HashSet;

use indexmap::IndexMap;
use log::debug;

use crate::error::Result;
use crate::ir::{
    AccessMode, AddressSpace, ArraySize, BinaryOp, CountedLoopBlocks, Emit, FuncBody, FuncBuilder, FuncId, Function,
    GlobalId, Index, InstKind, Span, StructType, Terminator, Type, ValueId,
};
use crate::{bail_access, err_layout};

use super::lower::{Lowerer, Target, handle_access};
use super::offset::ByteOffset;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Load,
    Store,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HelperKey {
    pub ty: Type,
    pub access: AccessMode,
    pub global: GlobalId,
    pub direction: Direction,
}

/// `Generating` guards against re-entry while a helper's body is being built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelperState {
    Generating(FuncId),
    Ready(FuncId),
}

impl HelperState {
    pub fn func(self) -> FuncId {
        match self {
            HelperState::Generating(id) | HelperState::Ready(id) => id,
        }
    }
}

#[derive(Debug, Default)]
pub struct HelperCache {
    entries: IndexMap<HelperKey, HelperState>,
    /// Names taken by user and generated functions.
    names: HashSet<String>,
}

impl HelperCache {
    pub fn new<'n>(existing: impl IntoIterator<Item = &'n str>) -> Self {
        HelperCache {
            entries: IndexMap::new(),
            names: existing.into_iter().map(str::to_string).collect(),
        }
    }

    pub fn get(&self, key: &HelperKey) -> Option<HelperState> {
        self.entries.get(key).copied()
    }

    /// Number of helpers generated so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn unique_name(&mut self, base: String) -> String {
        let mut name = base.clone();
        let mut n = 1;
        while self.names.contains(&name) {
            name = format!("{}_{}", base, n);
            n += 1;
        }
        self.names.insert(name.clone());
        name
    }
}

/// Identifier-safe spelling of a type, used in helper names.
pub fn mangle(ty: &Type) -> String {
    match ty {
        Type::Scalar(k) | Type::Atomic(k) => k.to_string(),
        Type::Vector { elem, width } => format!("vec{}{}", width, elem),
        Type::Matrix { elem, cols, rows } => format!("mat{}x{}{}", cols, rows, elem),
        Type::Array {
            elem,
            size: ArraySize::Fixed(n),
        } => format!("arr{}_{}", n, mangle(elem)),
        Type::Array {
            elem,
            size: ArraySize::Runtime,
        } => format!("rtarr_{}", mangle(elem)),
        Type::Struct(s) => s.name.clone(),
        Type::Void | Type::Pointer { .. } | Type::BufferHandle(_) => "void".to_string(),
    }
}

impl Lowerer<'_> {
    /// Loader for `ty` reading from the buffer of `target`.
    pub(crate) fn loader(&mut self, ty: &Type, target: &Target) -> Result<FuncId> {
        self.helper(ty, target, Direction::Load)
    }

    /// Storer for `ty` writing to the buffer of `target`.
    pub(crate) fn storer(&mut self, ty: &Type, target: &Target) -> Result<FuncId> {
        self.helper(ty, target, Direction::Store)
    }

    fn helper(&mut self, ty: &Type, target: &Target, direction: Direction) -> Result<FuncId> {
        let key = HelperKey {
            ty: ty.clone(),
            access: target.access,
            global: target.global,
            direction,
        };
        if let Some(state) = self.helpers.get(&key) {
            return Ok(state.func());
        }

        let id = self.functions.alloc_id();
        self.helpers.entries.insert(key.clone(), HelperState::Generating(id));

        let body = match direction {
            Direction::Load => self.build_loader(ty, target)?,
            Direction::Store => self.build_storer(ty, target)?,
        };

        let var = &self.globals[target.global];
        let verb = match direction {
            Direction::Load => "load",
            Direction::Store => "store",
        };
        let name = self
            .helpers
            .unique_name(format!("{}_{}_{}_{}", self.options.helper_prefix, var.name, verb, mangle(ty)));
        debug!("generated {} for {} on '{}'", name, ty, var.name);

        self.functions.insert(
            id,
            Function {
                name,
                body,
                generated: true,
            },
        );
        self.helpers.entries.insert(key, HelperState::Ready(id));
        Ok(id)
    }

    /// Start a helper body: emit the handle and return the target for it.
    fn begin_helper(&self, b: &mut FuncBuilder, target: &Target) -> Result<Target> {
        b.set_span(target.span);
        let var = &self.globals[target.global];
        let access = handle_access(var);
        let handle = b.push_inst(InstKind::Global(target.global), Type::BufferHandle(access))?;
        Ok(Target {
            handle,
            access,
            ..*target
        })
    }

    /// Element count of an array helper: static, or what fits in the buffer
    /// after `offset` for runtime-sized arrays. An offset past the end of the
    /// buffer yields zero elements.
    fn element_count(
        &self,
        b: &mut FuncBuilder,
        target: &Target,
        size: ArraySize,
        offset: ValueId,
        stride: u32,
    ) -> Result<ValueId> {
        match size {
            ArraySize::Fixed(n) => Ok(b.const_u32(n)?),
            ArraySize::Runtime => {
                let len = b.push_inst(InstKind::BufferLength { buffer: target.handle }, Type::u32())?;
                let start = b.binary(BinaryOp::Min, offset, len, Type::u32())?;
                let available = b.binary(BinaryOp::Sub, len, start, Type::u32())?;
                let stride = b.const_u32(stride)?;
                Ok(b.binary(BinaryOp::Div, available, stride, Type::u32())?)
            }
        }
    }

    // Array helpers loop over a local copy of the array:
    //
    //     %a = var a
    //     br header(0u)
    //   header(%idx):
    //     br_if gte %idx, %count, exit(), body()
    //   body:
    //     %p = access %a, %idx
    //     ... element at offset + idx * stride ...
    //   continuing:
    //     br header(add %idx, 1u)
    //   exit:

    fn build_loader(&mut self, ty: &Type, target: &Target) -> Result<FuncBody> {
        let span = target.span;
        let mut b = FuncBuilder::new(vec![(Type::u32(), "offset".to_string())], ty.clone());
        let target = self.begin_helper(&mut b, target)?;
        let offset = b.get_param(0);

        match ty {
            Type::Struct(s) => {
                let mut members = Vec::with_capacity(s.members.len());
                for (i, m) in s.members.iter().enumerate() {
                    let at = ByteOffset::dynamic(offset).plus(self.member_offset(s, i, span)?, span)?;
                    members.push(self.load(&mut b, &target, &m.ty, at)?);
                }
                let value = b.construct(members, ty.clone())?;
                b.terminate(Terminator::Return(value))?;
            }
            Type::Array { elem, size } => {
                let stride = self.layout.stride_of(elem).ok_or_else(|| err_layout!(span, "no array stride for {}", elem))?;
                let count = self.element_count(&mut b, &target, *size, offset, stride)?;
                let zero = b.push_inst(InstKind::Zero, ty.clone())?;
                let acc = b.push_var("a", Type::ptr(AddressSpace::Function, ty.clone(), AccessMode::ReadWrite), Some(zero))?;

                let (lp, idx) = self.begin_loop(&mut b, count)?;
                let slot = b.push_inst(
                    InstKind::Access {
                        base: acc,
                        indices: vec![Index::Dynamic(idx)],
                    },
                    Type::ptr(AddressSpace::Function, (**elem).clone(), AccessMode::ReadWrite),
                )?;
                let at = self.element_offset(&mut b, offset, idx, stride)?;
                let value = self.load(&mut b, &target, elem, at)?;
                b.push_store(slot, value)?;
                self.end_loop(&mut b, &lp, idx)?;

                let result = b.push_load(acc, ty.clone())?;
                b.terminate(Terminator::Return(result))?;
            }
            other => bail_access!(span, "no loader for non-composite type {}", other),
        }

        Ok(b.finish()?)
    }

    fn build_storer(&mut self, ty: &Type, target: &Target) -> Result<FuncBody> {
        let span = target.span;
        let mut b = FuncBuilder::new(
            vec![(Type::u32(), "offset".to_string()), (ty.clone(), "value".to_string())],
            Type::Void,
        );
        let target = self.begin_helper(&mut b, target)?;
        let offset = b.get_param(0);
        let value = b.get_param(1);

        match ty {
            Type::Struct(s) => {
                for (i, m) in s.members.iter().enumerate() {
                    let at = ByteOffset::dynamic(offset).plus(self.member_offset(s, i, span)?, span)?;
                    let part = b.extract(value, i as u32, m.ty.clone())?;
                    self.store(&mut b, &target, &m.ty, at, part)?;
                }
            }
            Type::Array { elem, size } => {
                let stride = self.layout.stride_of(elem).ok_or_else(|| err_layout!(span, "no array stride for {}", elem))?;
                let count = self.element_count(&mut b, &target, *size, offset, stride)?;
                let copy = b.push_var(
                    "a",
                    Type::ptr(AddressSpace::Function, ty.clone(), AccessMode::ReadWrite),
                    Some(value),
                )?;

                let (lp, idx) = self.begin_loop(&mut b, count)?;
                let slot = b.push_inst(
                    InstKind::Access {
                        base: copy,
                        indices: vec![Index::Dynamic(idx)],
                    },
                    Type::ptr(AddressSpace::Function, (**elem).clone(), AccessMode::ReadWrite),
                )?;
                let element = b.push_load(slot, (**elem).clone())?;
                let at = self.element_offset(&mut b, offset, idx, stride)?;
                self.store(&mut b, &target, elem, at, element)?;
                self.end_loop(&mut b, &lp, idx)?;
            }
            other => bail_access!(span, "no storer for non-composite type {}", other),
        }

        b.terminate(Terminator::ReturnUnit)?;
        Ok(b.finish()?)
    }

    fn member_offset(&self, s: &StructType, index: usize, span: Span) -> Result<u32> {
        self.layout
            .member_offset(s, index as u32)
            .ok_or_else(|| err_layout!(span, "no offset for member {} of {}", index, s.name))
    }

    /// `offset + idx * stride` as a dynamic byte offset.
    fn element_offset(&self, b: &mut FuncBuilder, offset: ValueId, idx: ValueId, stride: u32) -> Result<ByteOffset> {
        let stride = b.const_u32(stride)?;
        let scaled = b.binary(BinaryOp::Mul, idx, stride, Type::u32())?;
        let at = b.binary(BinaryOp::Add, offset, scaled, Type::u32())?;
        Ok(ByteOffset::dynamic(at))
    }

    /// Branch into a new counted loop and leave the builder in its body.
    fn begin_loop(&self, b: &mut FuncBuilder, count: ValueId) -> Result<(CountedLoopBlocks, ValueId)> {
        let lp = b.create_counted_loop();
        let zero = b.const_u32(0)?;
        b.terminate(Terminator::Branch {
            target: lp.header,
            args: vec![zero],
        })?;

        b.switch_to_block(lp.header)?;
        let done = b.binary(BinaryOp::GreaterThanEqual, lp.index, count, Type::bool())?;
        b.terminate(Terminator::CondBranch {
            cond: done,
            then_target: lp.exit,
            then_args: vec![],
            else_target: lp.body,
            else_args: vec![],
        })?;

        b.switch_to_block(lp.body)?;
        let idx = lp.index;
        Ok((lp, idx))
    }

    /// Close the loop body and leave the builder in the exit block.
    fn end_loop(&self, b: &mut FuncBuilder, lp: &CountedLoopBlocks, idx: ValueId) -> Result<()> {
        b.terminate(Terminator::Branch {
            target: lp.continuing,
            args: vec![],
        })?;

        b.switch_to_block(lp.continuing)?;
        let one = b.const_u32(1)?;
        let next = b.binary(BinaryOp::Add, idx, one, Type::u32())?;
        b.terminate(Terminator::Branch {
            target: lp.header,
            args: vec![next],
        })?;

        b.switch_to_block(lp.exit)?;
        Ok(())
    }
}
