//! Typed SSA intermediate representation consumed and produced by the
//! lowering passes.
//!
//! Assumptions:
//! - Type checking has already occurred; every value carries a concrete type
//! - Struct member offsets, alignments and sizes have been computed
//! - Module-scope variables are declared once in `Module::globals`

pub mod builder;
pub mod print;
pub mod ssa;
pub mod types;
pub mod verify;

#[cfg(test)]
mod builder_tests;
#[cfg(test)]
mod print_tests;

pub use builder::{BuilderError, CountedLoopBlocks, Emit, FuncBuilder, InsertBefore};
pub use ssa::*;
pub use types::*;
pub use verify::{DefLocation, VerifyError, verify_func, verify_module};
