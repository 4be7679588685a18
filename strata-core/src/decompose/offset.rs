//! Byte offset folding.
//!
//! Static contributions are summed into a single constant at compile time;
//! only dynamic indices produce instructions, and the constant is added to the
//! dynamic part once, when the offset is materialized.

use crate::error::Result;
use crate::ir::{BinaryOp, Emit, Index, ScalarKind, Span, Type, ValueId};
use crate::layout::LayoutOracle;
use crate::{err_access, err_layout};

use super::chain::AccessChain;

/// `constant + dynamic` bytes from the start of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteOffset {
    pub constant: u32,
    /// `u32` value computed at runtime, if any index was dynamic.
    pub dynamic: Option<ValueId>,
}

impl ByteOffset {
    pub fn constant(constant: u32) -> Self {
        ByteOffset {
            constant,
            dynamic: None,
        }
    }

    pub fn dynamic(value: ValueId) -> Self {
        ByteOffset {
            constant: 0,
            dynamic: Some(value),
        }
    }

    /// This offset moved `bytes` further into the buffer.
    pub fn plus(&self, bytes: u32, span: Span) -> Result<ByteOffset> {
        let constant = self
            .constant
            .checked_add(bytes)
            .ok_or_else(|| err_access!(span, "byte offset overflows u32"))?;
        Ok(ByteOffset { constant, ..*self })
    }

    /// Offset of element `index` of `stride`-byte elements starting here.
    pub fn plus_scaled(&self, index: u32, stride: u32, span: Span) -> Result<ByteOffset> {
        let bytes = index
            .checked_mul(stride)
            .ok_or_else(|| err_access!(span, "byte offset overflows u32"))?;
        self.plus(bytes, span)
    }

    /// Add `index * stride`. Static indices fold into the constant.
    pub fn add_scaled(&mut self, e: &mut dyn Emit, index: Index, stride: u32, span: Span) -> Result<()> {
        match index {
            Index::Static(i) => *self = self.plus_scaled(i, stride, span)?,
            Index::Dynamic(value) => {
                let index = match e.value_type(value) {
                    Type::Scalar(ScalarKind::U32) => value,
                    Type::Scalar(ScalarKind::I32) => e.bitcast(value, Type::u32())?,
                    other => return Err(err_access!(span, "index {} has non-integer type {}", value, other)),
                };
                let stride = e.const_u32(stride)?;
                let scaled = e.binary(BinaryOp::Mul, index, stride, Type::u32())?;
                self.dynamic = Some(match self.dynamic {
                    Some(prev) => e.binary(BinaryOp::Add, prev, scaled, Type::u32())?,
                    None => scaled,
                });
            }
        }
        Ok(())
    }

    /// Emit the offset as a single `u32` value.
    pub fn materialize(&self, e: &mut dyn Emit) -> Result<ValueId> {
        Ok(match self.dynamic {
            None => e.const_u32(self.constant)?,
            Some(dynamic) if self.constant == 0 => dynamic,
            Some(dynamic) => {
                let constant = e.const_u32(self.constant)?;
                e.binary(BinaryOp::Add, dynamic, constant, Type::u32())?
            }
        })
    }
}

/// Column stride of a matrix, 16 bytes for every supported row count.
pub fn column_stride(layout: &dyn LayoutOracle, matrix: &Type, span: Span) -> Result<u32> {
    layout
        .column_stride_of(matrix)
        .ok_or_else(|| err_layout!(span, "no column stride for {}", matrix))
}

/// Fold every index of `chain` into a byte offset from the buffer start.
pub fn fold_chain(e: &mut dyn Emit, layout: &dyn LayoutOracle, chain: &AccessChain, span: Span) -> Result<ByteOffset> {
    let mut offset = ByteOffset::constant(0);

    for step in &chain.steps {
        match (&step.container, step.index) {
            (Type::Struct(s), Index::Static(i)) => {
                let member = layout
                    .member_offset(s, i)
                    .ok_or_else(|| err_layout!(span, "no offset for member {} of {}", i, s.name))?;
                offset = offset.plus(member, span)?;
            }
            (Type::Array { elem, .. }, index) => {
                let stride = layout.stride_of(elem).ok_or_else(|| err_layout!(span, "no array stride for {}", elem))?;
                offset.add_scaled(e, index, stride, span)?;
            }
            (matrix @ Type::Matrix { .. }, index) => {
                let stride = column_stride(layout, matrix, span)?;
                offset.add_scaled(e, index, stride, span)?;
            }
            (Type::Vector { elem, .. }, index) => {
                let size = elem.byte_size().ok_or_else(|| err_layout!(span, "{} has no byte size", elem))?;
                offset.add_scaled(e, index, size, span)?;
            }
            (other, _) => return Err(err_access!(span, "cannot index into {}", other)),
        }
    }

    Ok(offset)
}
