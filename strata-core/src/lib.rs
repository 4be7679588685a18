pub mod decompose;
pub mod error;
pub mod ir;
pub mod layout;

#[cfg(test)]
mod layout_tests;

use std::hash::Hash;
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

use indexmap::IndexMap;

pub use decompose::{DecomposeOptions, DecomposeStats};
pub use error::{DecomposeError, Diagnostic, DiagnosticSink, Diagnostics, ErrorKind, Result};
pub use layout::{HostShareableLayout, LayoutOracle};

// =============================================================================
// Generic ID allocation
// =============================================================================

/// Generic counter for generating unique IDs.
///
/// The ID type must implement `From<u32>` to convert the raw counter value.
#[derive(Debug, Clone)]
pub struct IdSource<Id> {
    next_id: u32,
    _phantom: PhantomData<Id>,
}

impl<Id: From<u32>> IdSource<Id> {
    pub fn new() -> Self {
        IdSource {
            next_id: 0,
            _phantom: PhantomData,
        }
    }

    pub fn next(&mut self) -> Id {
        let id = Id::from(self.next_id);
        self.next_id += 1;
        id
    }
}

impl<Id: From<u32>> Default for IdSource<Id> {
    fn default() -> Self {
        Self::new()
    }
}

/// Arena that allocates IDs and stores associated items.
///
/// Uses IndexMap for deterministic iteration order (insertion order). An ID
/// reserved with `alloc_id` is only iterated once its item is inserted.
#[derive(Debug, Clone)]
pub struct IdArena<Id, T> {
    source: IdSource<Id>,
    items: IndexMap<Id, T>,
}

impl<Id: From<u32> + Copy + Eq + Hash, T> IdArena<Id, T> {
    pub fn new() -> Self {
        IdArena {
            source: IdSource::new(),
            items: IndexMap::new(),
        }
    }

    /// Allocate a new ID and store the item.
    pub fn alloc(&mut self, item: T) -> Id {
        let id = self.source.next();
        self.items.insert(id, item);
        id
    }

    /// Allocate a new ID without storing anything yet.
    /// Use `insert` later to store the item.
    pub fn alloc_id(&mut self) -> Id {
        self.source.next()
    }

    /// Insert an item with a pre-allocated ID.
    /// Panics if the ID is already in use.
    pub fn insert(&mut self, id: Id, item: T) {
        let old = self.items.insert(id, item);
        assert!(old.is_none(), "IdArena::insert called with duplicate ID");
    }

    pub fn get(&self, id: Id) -> Option<&T> {
        self.items.get(&id)
    }

    pub fn get_mut(&mut self, id: Id) -> Option<&mut T> {
        self.items.get_mut(&id)
    }

    /// Iterate over all (id, item) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&Id, &T)> {
        self.items.iter()
    }

    /// Iterate over all items (without IDs).
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<Id: From<u32> + Copy + Eq + Hash, T> Default for IdArena<Id, T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Panics on an unknown ID, like slice indexing.
impl<Id: From<u32> + Copy + Eq + Hash, T> Index<Id> for IdArena<Id, T> {
    type Output = T;

    fn index(&self, id: Id) -> &T {
        &self.items[&id]
    }
}

impl<Id: From<u32> + Copy + Eq + Hash, T> IndexMut<Id> for IdArena<Id, T> {
    fn index_mut(&mut self, id: Id) -> &mut T {
        &mut self.items[&id]
    }
}

impl<'a, Id: From<u32> + Copy + Eq + Hash, T> IntoIterator for &'a IdArena<Id, T> {
    type Item = (&'a Id, &'a T);
    type IntoIter = indexmap::map::Iter<'a, Id, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

// =============================================================================
// Pass entry points
// =============================================================================

/// Lower every access to storage and uniform buffers in `module` to
/// word-level buffer operations.
///
/// On error the module is left partially rewritten and must be discarded.
pub fn decompose_memory_access(
    module: &mut ir::Module,
    layout: &dyn LayoutOracle,
    options: &DecomposeOptions,
) -> Result<DecomposeStats> {
    decompose::run(module, layout, options)
}

/// Like [`decompose_memory_access`], also reporting a failure to `sink`.
pub fn decompose_memory_access_with_sink(
    module: &mut ir::Module,
    layout: &dyn LayoutOracle,
    options: &DecomposeOptions,
    sink: &mut dyn DiagnosticSink,
) -> Result<DecomposeStats> {
    decompose::run(module, layout, options).inspect_err(|err| sink.report(Diagnostic::from(err)))
}
