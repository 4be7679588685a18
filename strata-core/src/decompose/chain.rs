//! Access chain resolution.
//!
//! Walks a pointer back through `Let` aliases and `Access` instructions to the
//! buffer variable it was derived from, and rebuilds the full index list from
//! the variable's store type outwards.

use std::collections::{HashMap, HashSet};

use log::trace;

use crate::bail_access;
use crate::error::Result;
use crate::ir::{FuncBody, GlobalId, GlobalVar, Index, InstId, InstKind, Span, Type, ValueId};
use crate::IdArena;

/// One index of a resolved chain, with the type it indexes into.
#[derive(Debug, Clone)]
pub struct ChainStep {
    pub container: Type,
    pub index: Index,
}

/// A pointer expressed as `root variable` plus indices.
#[derive(Debug, Clone)]
pub struct AccessChain {
    pub global: GlobalId,
    /// Result of the `Global` instruction at the root; becomes the handle.
    pub handle: ValueId,
    pub steps: Vec<ChainStep>,
    /// Type the pointer points to.
    pub leaf: Type,
}

pub fn resolve(
    body: &FuncBody,
    defs: &HashMap<ValueId, InstId>,
    globals: &IdArena<GlobalId, GlobalVar>,
    ptr: ValueId,
    span: Span,
) -> Result<AccessChain> {
    let mut segments: Vec<Vec<Index>> = Vec::new();
    let mut visited = HashSet::new();
    let mut cur = ptr;

    let (global, handle) = loop {
        if !visited.insert(cur) {
            bail_access!(span, "pointer {} is defined in terms of itself", cur);
        }
        let Some(&def) = defs.get(&cur) else {
            bail_access!(span, "pointer {} does not originate from a module-scope variable", cur);
        };
        match &body.get_inst(def).kind {
            InstKind::Let { value, .. } => cur = *value,
            InstKind::Access { base, indices } => {
                segments.push(indices.clone());
                cur = *base;
            }
            InstKind::Global(g) => break (*g, cur),
            _ => bail_access!(span, "pointer {} is not an access chain into a variable", cur),
        }
    };

    let Some(var) = globals.get(global) else {
        bail_access!(span, "unknown module-scope variable {}", global.0);
    };
    if !var.space.is_buffer_backed() {
        bail_access!(span, "variable '{}' lives in {} memory, not a buffer", var.name, var.space);
    }

    // Segments were collected from the use outwards.
    let indices: Vec<Index> = segments.into_iter().rev().flatten().collect();

    let mut steps = Vec::with_capacity(indices.len());
    let mut ty = var.ty.clone();
    for index in indices {
        let next = match (&ty, index) {
            (Type::Struct(s), Index::Static(i)) => match s.member(i) {
                Some(m) => m.ty.clone(),
                None => bail_access!(span, "struct {} has no member {}", s.name, i),
            },
            (Type::Struct(s), Index::Dynamic(_)) => {
                bail_access!(span, "dynamic index selects a member of struct {}", s.name)
            }
            (Type::Array { elem, .. }, _) => (**elem).clone(),
            (Type::Matrix { elem, rows, .. }, _) => Type::vec(*elem, *rows),
            (Type::Vector { elem, .. }, _) => Type::Scalar(*elem),
            (other, _) => bail_access!(span, "cannot index into {}", other),
        };
        steps.push(ChainStep { container: ty, index });
        ty = next;
    }

    trace!("resolved {} to {} with {} indices", ptr, var.name, steps.len());

    Ok(AccessChain {
        global,
        handle,
        steps,
        leaf: ty,
    })
}
