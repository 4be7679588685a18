//! Structured memory access lowering.
//!
//! The target exposes storage and uniform memory only as flat byte-address
//! buffers with word-sized loads and stores. This pass rewrites every
//! dereference of a pointer into such memory:
//!
//! - the access chain is resolved back to its variable and folded into a
//!   byte offset (static parts become one constant)
//! - scalars, vectors and matrices become `BufferLoad`/`BufferStore` of raw
//!   words plus `Bitcast`
//! - small structs and arrays are unrolled inline; anything larger calls a
//!   generated, memoized loader or storer function
//! - atomics become `BufferAtomic` word operations
//!
//! Afterwards the now unused `Access`/`Let` pointer instructions are removed
//! and each buffer variable takes the `BufferHandle` type, keeping its binding.
//!
//! Functions are processed in declaration order, instructions in program
//! order. Work lists are snapshotted before mutation and generated helper
//! bodies are never revisited.

pub mod chain;
pub mod helpers;
pub mod lower;
pub mod offset;


use std::collections::HashSet;

use log::debug;

use crate::IdArena;
use crate::bail_access;
use crate::error::Result;
use crate::ir::{BlockId, FuncBody, FuncId, GlobalId, GlobalVar, InstId, InstKind, Module, Span, Type, ValueId};
use crate::layout::LayoutOracle;

use helpers::HelperCache;
use lower::{Lowerer, handle_access};

/// Tuning knobs of the pass.
#[derive(Debug, Clone)]
pub struct DecomposeOptions {
    /// Fixed-size arrays with at most this many inline-unrollable elements
    /// are unrolled in place.
    pub inline_array_limit: u32,
    /// Structs with at most this many inline-unrollable members are unrolled
    /// in place.
    pub inline_struct_member_limit: usize,
    /// Prefix of generated helper function names.
    pub helper_prefix: String,
}

impl Default for DecomposeOptions {
    fn default() -> Self {
        DecomposeOptions {
            inline_array_limit: 4,
            inline_struct_member_limit: 8,
            helper_prefix: "_buf".to_string(),
        }
    }
}

impl DecomposeOptions {
    pub fn with_inline_array_limit(mut self, limit: u32) -> Self {
        self.inline_array_limit = limit;
        self
    }

    pub fn with_inline_struct_member_limit(mut self, limit: usize) -> Self {
        self.inline_struct_member_limit = limit;
        self
    }

    pub fn with_helper_prefix(mut self, prefix: &str) -> Self {
        self.helper_prefix = prefix.to_string();
        self
    }
}

/// What the pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecomposeStats {
    /// Buffer variables rewritten to handles.
    pub buffers: usize,
    /// Dereferencing instructions replaced.
    pub lowered: usize,
    /// Helper functions generated.
    pub helpers: usize,
}

/// Run the pass over `module`. On error the module must be discarded.
pub fn run(module: &mut Module, layout: &dyn LayoutOracle, options: &DecomposeOptions) -> Result<DecomposeStats> {
    let buffers: HashSet<GlobalId> = module
        .globals
        .iter()
        .filter(|(_, var)| var.space.is_buffer_backed() && !matches!(var.ty, Type::BufferHandle(_)))
        .map(|(id, _)| *id)
        .collect();
    if buffers.is_empty() {
        return Ok(DecomposeStats::default());
    }

    let func_ids: Vec<FuncId> = module.functions.iter().filter(|(_, f)| !f.generated).map(|(id, _)| *id).collect();

    let Module { globals, functions } = &mut *module;
    let helpers = HelperCache::new(functions.values().map(|f| f.name.as_str()));
    let mut lowerer = Lowerer {
        globals,
        functions,
        layout,
        options,
        helpers,
        lowered: 0,
    };

    for id in func_ids {
        let Some(func) = lowerer.functions.get_mut(id) else {
            continue;
        };
        let mut body = std::mem::take(&mut func.body);
        let result = lower_function(&mut lowerer, &mut body, &buffers);
        if let Some(func) = lowerer.functions.get_mut(id) {
            func.body = body;
        }
        result?;
    }

    let stats = DecomposeStats {
        buffers: buffers.len(),
        lowered: lowerer.lowered,
        helpers: lowerer.helpers.len(),
    };

    for id in &buffers {
        if let Some(var) = module.globals.get_mut(*id) {
            var.ty = Type::BufferHandle(handle_access(var));
            debug!("rewrote buffer variable '{}' to {}", var.name, var.ty);
        }
    }

    debug!(
        "decomposed {} buffer accesses in {} variables, {} helper functions",
        stats.lowered, stats.buffers, stats.helpers
    );
    Ok(stats)
}

/// Instructions of one function, sorted by their role in the pass.
#[derive(Debug, Default)]
struct Classified {
    /// Dereferences of buffer pointers, in program order.
    work: Vec<(BlockId, InstId)>,
    /// `Access`/`Let` instructions producing buffer pointers.
    dead: Vec<(BlockId, InstId)>,
    /// `Global` instructions naming buffer variables.
    handles: Vec<(InstId, GlobalId)>,
}

fn classify(body: &FuncBody, buffers: &HashSet<GlobalId>) -> Result<Classified> {
    let is_buffer_ptr = |v: ValueId| body.get_value_type(v).is_buffer_pointer();
    let mut out = Classified::default();

    for (block, id) in body.placed_insts() {
        let inst = body.get_inst(id);
        match &inst.kind {
            InstKind::Global(g) if buffers.contains(g) => out.handles.push((id, *g)),
            InstKind::Access { base, .. } if is_buffer_ptr(*base) => out.dead.push((block, id)),
            InstKind::Let { value, .. } if is_buffer_ptr(*value) => out.dead.push((block, id)),
            kind => {
                let ptr = kind.dereferences().filter(|p| is_buffer_ptr(*p));
                let escaping = kind.operands().into_iter().filter(|v| Some(*v) != ptr).any(is_buffer_ptr);
                if escaping {
                    bail_access!(inst.span, "buffer pointer used by {} other than as an access chain", id);
                }
                if ptr.is_some() {
                    out.work.push((block, id));
                }
            }
        }
    }

    for (b, block) in body.blocks.iter().enumerate() {
        let Some(term) = &block.terminator else {
            continue;
        };
        if let Some(ptr) = term.operands().into_iter().find(|v| is_buffer_ptr(*v)) {
            // Terminators have no location; report where the pointer was made.
            let span = body
                .value_defs()
                .get(&ptr)
                .map_or(Span::default(), |&def| body.get_inst(def).span);
            bail_access!(
                span,
                "buffer pointer {} escapes through the terminator of {}",
                ptr,
                BlockId(b as u32)
            );
        }
    }

    Ok(out)
}

fn lower_function(lowerer: &mut Lowerer<'_>, body: &mut FuncBody, buffers: &HashSet<GlobalId>) -> Result<()> {
    let classified = classify(body, buffers)?;
    if classified.work.is_empty() && classified.handles.is_empty() {
        return Ok(());
    }

    let defs = body.value_defs();
    for &(block, inst) in &classified.work {
        let span = body.get_inst(inst).span;
        lowerer.lower_inst(body, &defs, block, inst).map_err(|err| err.or_at(span))?;
    }

    for &(block, inst) in &classified.dead {
        body.remove_inst(block, inst);
    }

    retype_handles(body, lowerer.globals, &classified.handles);
    Ok(())
}

fn retype_handles(body: &mut FuncBody, globals: &IdArena<GlobalId, GlobalVar>, handles: &[(InstId, GlobalId)]) {
    for &(id, g) in handles {
        let Some(var) = globals.get(g) else {
            continue;
        };
        let ty = Type::BufferHandle(handle_access(var));
        let inst = body.get_inst_mut(id);
        inst.result_ty = ty.clone();
        if let Some(result) = inst.result {
            body.value_types[result.index()] = ty;
        }
    }
}
