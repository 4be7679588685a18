//! Types of the strata IR.
//!
//! Types are plain owned values compared structurally. Struct types carry
//! their member layout (offset, alignment, size), which is computed by an
//! earlier pass and only read here.

use std::fmt;

/// Scalar element kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    I32,
    U32,
    F32,
    F16,
    Bool,
}

impl ScalarKind {
    /// Byte width in host-shareable memory. `bool` has no host-shareable
    /// representation.
    pub fn byte_size(self) -> Option<u32> {
        match self {
            ScalarKind::I32 | ScalarKind::U32 | ScalarKind::F32 => Some(4),
            ScalarKind::F16 => Some(2),
            ScalarKind::Bool => None,
        }
    }

    pub fn is_f16(self) -> bool {
        self == ScalarKind::F16
    }

    pub fn is_signed_int(self) -> bool {
        self == ScalarKind::I32
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScalarKind::I32 => "i32",
            ScalarKind::U32 => "u32",
            ScalarKind::F32 => "f32",
            ScalarKind::F16 => "f16",
            ScalarKind::Bool => "bool",
        };
        f.write_str(s)
    }
}

/// Memory regions a pointer may refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressSpace {
    Storage,
    Uniform,
    Workgroup,
    Function,
    Private,
    PushConstant,
}

impl AddressSpace {
    /// Storage and uniform memory are exposed by the target only as flat byte
    /// buffers.
    pub fn is_buffer_backed(self) -> bool {
        matches!(self, AddressSpace::Storage | AddressSpace::Uniform)
    }
}

impl fmt::Display for AddressSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AddressSpace::Storage => "storage",
            AddressSpace::Uniform => "uniform",
            AddressSpace::Workgroup => "workgroup",
            AddressSpace::Function => "function",
            AddressSpace::Private => "private",
            AddressSpace::PushConstant => "push_constant",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    Read,
    ReadWrite,
}

impl AccessMode {
    pub fn is_writable(self) -> bool {
        self == AccessMode::ReadWrite
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessMode::Read => f.write_str("read"),
            AccessMode::ReadWrite => f.write_str("read_write"),
        }
    }
}

/// `(group, binding)` pair naming the external resource behind a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingPoint {
    pub group: u32,
    pub binding: u32,
}

impl BindingPoint {
    pub fn new(group: u32, binding: u32) -> Self {
        BindingPoint { group, binding }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArraySize {
    Fixed(u32),
    Runtime,
}

/// A struct member with its precomputed layout.
///
/// Runtime-sized members (only legal as the last member) report a size of 0.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructMember {
    pub name: String,
    pub ty: Type,
    pub offset: u32,
    pub align: u32,
    pub size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructType {
    pub name: String,
    pub members: Vec<StructMember>,
}

impl StructType {
    pub fn member(&self, index: u32) -> Option<&StructMember> {
        self.members.get(index as usize)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Scalar(ScalarKind),
    Vector {
        elem: ScalarKind,
        width: u32,
    },
    /// Column-major matrix: `cols` column vectors of `rows` elements.
    Matrix {
        elem: ScalarKind,
        cols: u32,
        rows: u32,
    },
    Array {
        elem: Box<Type>,
        size: ArraySize,
    },
    Struct(StructType),
    Pointer {
        space: AddressSpace,
        pointee: Box<Type>,
        access: AccessMode,
    },
    Atomic(ScalarKind),
    /// Opaque byte-address buffer replacing a buffer-backed variable.
    BufferHandle(AccessMode),
}

impl Type {
    pub fn u32() -> Type {
        Type::Scalar(ScalarKind::U32)
    }

    pub fn i32() -> Type {
        Type::Scalar(ScalarKind::I32)
    }

    pub fn f32() -> Type {
        Type::Scalar(ScalarKind::F32)
    }

    pub fn f16() -> Type {
        Type::Scalar(ScalarKind::F16)
    }

    pub fn bool() -> Type {
        Type::Scalar(ScalarKind::Bool)
    }

    pub fn vec(elem: ScalarKind, width: u32) -> Type {
        Type::Vector { elem, width }
    }

    pub fn mat(elem: ScalarKind, cols: u32, rows: u32) -> Type {
        Type::Matrix { elem, cols, rows }
    }

    pub fn array(elem: Type, count: u32) -> Type {
        Type::Array {
            elem: Box::new(elem),
            size: ArraySize::Fixed(count),
        }
    }

    pub fn runtime_array(elem: Type) -> Type {
        Type::Array {
            elem: Box::new(elem),
            size: ArraySize::Runtime,
        }
    }

    pub fn ptr(space: AddressSpace, pointee: Type, access: AccessMode) -> Type {
        Type::Pointer {
            space,
            pointee: Box::new(pointee),
            access,
        }
    }

    /// Vector of `width` elements, or the bare scalar when `width == 1`.
    pub fn scalar_or_vec(elem: ScalarKind, width: u32) -> Type {
        if width == 1 { Type::Scalar(elem) } else { Type::vec(elem, width) }
    }

    pub fn address_space(&self) -> Option<AddressSpace> {
        match self {
            Type::Pointer { space, .. } => Some(*space),
            _ => None,
        }
    }

    /// Whether this is a pointer into buffer-backed memory.
    pub fn is_buffer_pointer(&self) -> bool {
        self.address_space().is_some_and(AddressSpace::is_buffer_backed)
    }

    /// Column vector type of a matrix.
    pub fn column_type(&self) -> Option<Type> {
        match self {
            Type::Matrix { elem, rows, .. } => Some(Type::vec(*elem, *rows)),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => f.write_str("void"),
            Type::Scalar(k) => write!(f, "{}", k),
            Type::Vector { elem, width } => write!(f, "vec{}<{}>", width, elem),
            Type::Matrix { elem, cols, rows } => write!(f, "mat{}x{}<{}>", cols, rows, elem),
            Type::Array {
                elem,
                size: ArraySize::Fixed(n),
            } => write!(f, "array<{}, {}>", elem, n),
            Type::Array {
                elem,
                size: ArraySize::Runtime,
            } => write!(f, "array<{}>", elem),
            Type::Struct(s) => f.write_str(&s.name),
            Type::Pointer {
                space,
                pointee,
                access,
            } => write!(f, "ptr<{}, {}, {}>", space, pointee, access),
            Type::Atomic(k) => write!(f, "atomic<{}>", k),
            Type::BufferHandle(access) => write!(f, "buffer<{}>", access),
        }
    }
}
