//! Errors and diagnostics of the buffer decomposition pass.

use thiserror::Error;

use crate::ir::{BuilderError, Span};

pub type Result<T> = std::result::Result<T, DecomposeError>;

/// Fatal pass errors. Each carries the location of the offending instruction.
#[derive(Debug, Clone, Error)]
pub enum DecomposeError {
    #[error("{span}: unsupported access pattern: {detail}")]
    UnsupportedAccessPattern { span: Span, detail: String },

    #[error("{span}: atomic operation in unsupported address space: {detail}")]
    UnsupportedAtomicAddressSpace { span: Span, detail: String },

    #[error("{span}: missing type layout: {detail}")]
    TypeLayoutMissing { span: Span, detail: String },
}

/// Discriminant of [`DecomposeError`], reported to diagnostic sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UnsupportedAccessPattern,
    UnsupportedAtomicAddressSpace,
    TypeLayoutMissing,
}

impl DecomposeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DecomposeError::UnsupportedAccessPattern { .. } => ErrorKind::UnsupportedAccessPattern,
            DecomposeError::UnsupportedAtomicAddressSpace { .. } => ErrorKind::UnsupportedAtomicAddressSpace,
            DecomposeError::TypeLayoutMissing { .. } => ErrorKind::TypeLayoutMissing,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            DecomposeError::UnsupportedAccessPattern { span, .. }
            | DecomposeError::UnsupportedAtomicAddressSpace { span, .. }
            | DecomposeError::TypeLayoutMissing { span, .. } => *span,
        }
    }

    /// Attach `at` if the error has no location yet.
    pub fn or_at(mut self, at: Span) -> Self {
        match &mut self {
            DecomposeError::UnsupportedAccessPattern { span, .. }
            | DecomposeError::UnsupportedAtomicAddressSpace { span, .. }
            | DecomposeError::TypeLayoutMissing { span, .. } => {
                if *span == Span::default() {
                    *span = at;
                }
            }
        }
        self
    }

    pub fn detail(&self) -> &str {
        match self {
            DecomposeError::UnsupportedAccessPattern { detail, .. }
            | DecomposeError::UnsupportedAtomicAddressSpace { detail, .. }
            | DecomposeError::TypeLayoutMissing { detail, .. } => detail,
        }
    }
}

/// Builder failures carry no location; callers attach one with
/// [`DecomposeError::or_at`].
impl From<BuilderError> for DecomposeError {
    fn from(err: BuilderError) -> Self {
        DecomposeError::UnsupportedAccessPattern {
            span: Span::default(),
            detail: format!("IR construction failed: {}", err),
        }
    }
}

/// Construct an `UnsupportedAccessPattern` error at a span.
#[macro_export]
macro_rules! err_access {
    ($span:expr, $($arg:tt)*) => {
        $crate::error::DecomposeError::UnsupportedAccessPattern {
            span: $span,
            detail: format!($($arg)*),
        }
    };
}

/// Return early with an `UnsupportedAccessPattern` error.
#[macro_export]
macro_rules! bail_access {
    ($span:expr, $($arg:tt)*) => {
        return Err($crate::err_access!($span, $($arg)*))
    };
}

/// Construct a `TypeLayoutMissing` error at a span.
#[macro_export]
macro_rules! err_layout {
    ($span:expr, $($arg:tt)*) => {
        $crate::error::DecomposeError::TypeLayoutMissing {
            span: $span,
            detail: format!($($arg)*),
        }
    };
}

/// Construct an `UnsupportedAtomicAddressSpace` error at a span.
#[macro_export]
macro_rules! err_atomic {
    ($span:expr, $($arg:tt)*) => {
        $crate::error::DecomposeError::UnsupportedAtomicAddressSpace {
            span: $span,
            detail: format!($($arg)*),
        }
    };
}

// =============================================================================
// Diagnostics
// =============================================================================

/// One reported failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub span: Span,
    pub message: String,
}

impl From<&DecomposeError> for Diagnostic {
    fn from(err: &DecomposeError) -> Self {
        Diagnostic {
            kind: err.kind(),
            span: err.span(),
            message: err.detail().to_string(),
        }
    }
}

/// Receiver for pass diagnostics, owned by the caller.
pub trait DiagnosticSink {
    fn report(&mut self, diagnostic: Diagnostic);
}

/// Sink that keeps every diagnostic in order.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    pub items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics::default()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl DiagnosticSink for Diagnostics {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.items.push(diagnostic);
    }
}
