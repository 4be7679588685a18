//! Type size and alignment queries for buffer layout calculations.
//!
//! Struct member offsets are computed before decomposition and stored on the
//! struct type itself; the oracle only reads them back. [`HostShareableLayout`]
//! implements the host-shareable rules for everything else and
//! [`lay_out_struct`] builds struct types that follow the same rules.

use crate::ir::{ArraySize, ScalarKind, StructMember, StructType, Type};

/// Round `value` up to a multiple of `align`, or `None` on overflow.
pub fn round_up(align: u32, value: u32) -> Option<u32> {
    if align == 0 { Some(value) } else { value.checked_next_multiple_of(align) }
}

/// Size, alignment and member offsets of host-shareable types.
///
/// Every method returns `None` for types without a host-shareable layout
/// (`bool`, pointers, handles) and `size_of` also for runtime-sized arrays.
pub trait LayoutOracle {
    fn size_of(&self, ty: &Type) -> Option<u32>;

    fn align_of(&self, ty: &Type) -> Option<u32>;

    /// Distance between consecutive elements of type `ty` in an array.
    fn stride_of(&self, ty: &Type) -> Option<u32> {
        round_up(self.align_of(ty)?, self.size_of(ty)?)
    }

    /// Distance between consecutive columns of a matrix: the column vector's
    /// alignment rounded up to 16 bytes.
    fn column_stride_of(&self, matrix: &Type) -> Option<u32> {
        round_up(16, self.align_of(&matrix.column_type()?)?)
    }

    fn member_offset(&self, ty: &StructType, index: u32) -> Option<u32> {
        ty.member(index).map(|m| m.offset)
    }
}

/// Host-shareable layout: vec2 aligns to twice its scalar, vec3/vec4 to four
/// times. Matrix columns sit 16 bytes apart and arrays are strided at the
/// element's aligned size.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostShareableLayout;

impl HostShareableLayout {
    fn scalar_size(kind: ScalarKind) -> Option<u32> {
        kind.byte_size()
    }

    fn vector_align(kind: ScalarKind, width: u32) -> Option<u32> {
        let s = Self::scalar_size(kind)?;
        Some(if width == 2 { 2 * s } else { 4 * s })
    }
}

impl LayoutOracle for HostShareableLayout {
    fn size_of(&self, ty: &Type) -> Option<u32> {
        match ty {
            Type::Scalar(k) | Type::Atomic(k) => Self::scalar_size(*k),
            Type::Vector { elem, width } => width.checked_mul(Self::scalar_size(*elem)?),
            Type::Matrix { cols, .. } => cols.checked_mul(self.column_stride_of(ty)?),
            Type::Array {
                elem,
                size: ArraySize::Fixed(n),
            } => n.checked_mul(self.stride_of(elem)?),
            Type::Array {
                size: ArraySize::Runtime,
                ..
            } => None,
            Type::Struct(s) => {
                let last = s.members.last()?;
                if matches!(last.ty, Type::Array { size: ArraySize::Runtime, .. }) {
                    return None;
                }
                round_up(self.align_of(ty)?, last.offset.checked_add(last.size)?)
            }
            Type::Void | Type::Pointer { .. } | Type::BufferHandle(_) => None,
        }
    }

    fn align_of(&self, ty: &Type) -> Option<u32> {
        match ty {
            Type::Scalar(k) | Type::Atomic(k) => Self::scalar_size(*k),
            Type::Vector { elem, width } => Self::vector_align(*elem, *width),
            Type::Matrix { .. } => self.column_stride_of(ty),
            Type::Array { elem, .. } => self.align_of(elem),
            Type::Struct(s) => s.members.iter().map(|m| m.align).max(),
            Type::Void | Type::Pointer { .. } | Type::BufferHandle(_) => None,
        }
    }
}

/// Lay out a struct from `(name, type)` pairs, each member at the next offset
/// aligned for its type. A runtime-sized array is only accepted last.
pub fn lay_out_struct(layout: &dyn LayoutOracle, name: &str, fields: Vec<(&str, Type)>) -> Option<StructType> {
    let count = fields.len();
    let mut members = Vec::with_capacity(count);
    let mut cursor = 0u32;

    for (i, (member_name, ty)) in fields.into_iter().enumerate() {
        let align = layout.align_of(&ty)?;
        let offset = round_up(align, cursor)?;
        let size = match &ty {
            Type::Array {
                size: ArraySize::Runtime,
                ..
            } if i + 1 == count => 0,
            _ => layout.size_of(&ty)?,
        };
        cursor = offset.checked_add(size)?;
        members.push(StructMember {
            name: member_name.to_string(),
            ty,
            offset,
            align,
            size,
        });
    }

    Some(StructType {
        name: name.to_string(),
        members,
    })
}
