use std::any::Any;
use std::collections::HashMap;

use entmap_types::{RawKey, Shared};

/// Handle to the unit of work driving a save or load.
///
/// Lifecycle callbacks that ask for the unit of work receive this handle and
/// may downcast it to the concrete type through [`UnitOfWorkHandle::as_any`].
pub trait UnitOfWorkHandle: Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

/// A handle for translations that run outside of any unit of work.
#[derive(Clone, Copy, Debug, Default)]
pub struct Detached;

impl UnitOfWorkHandle for Detached {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

static DETACHED: Detached = Detached;

// ---------------------------------------------------------------------------
// SaveContext
// ---------------------------------------------------------------------------

/// Per-operation state threaded through a save.
#[derive(Clone, Copy)]
pub struct SaveContext<'a> {
    unit: &'a dyn UnitOfWorkHandle,
}

impl<'a> SaveContext<'a> {
    pub fn new(unit: &'a dyn UnitOfWorkHandle) -> Self {
        Self { unit }
    }

    pub fn unit(&self) -> &'a dyn UnitOfWorkHandle {
        self.unit
    }
}

impl SaveContext<'static> {
    pub fn detached() -> Self {
        Self::new(&DETACHED)
    }
}

// ---------------------------------------------------------------------------
// LoadContext
// ---------------------------------------------------------------------------

/// Per-operation state threaded through a load.
///
/// Eagerly loaded references are resolved before translation starts and
/// handed to the reference translators through [`LoadContext::resolved`].
pub struct LoadContext<'a> {
    unit: &'a dyn UnitOfWorkHandle,
    resolved: HashMap<RawKey, Shared>,
}

impl<'a> LoadContext<'a> {
    pub fn new(unit: &'a dyn UnitOfWorkHandle) -> Self {
        Self {
            unit,
            resolved: HashMap::new(),
        }
    }

    pub fn unit(&self) -> &'a dyn UnitOfWorkHandle {
        self.unit
    }

    /// Make `value` available to references pointing at `key`.
    pub fn resolve(&mut self, key: RawKey, value: Shared) {
        self.resolved.insert(key, value);
    }

    pub fn resolved(&self, key: &RawKey) -> Option<&Shared> {
        self.resolved.get(key)
    }

    pub fn resolved_count(&self) -> usize {
        self.resolved.len()
    }
}

impl LoadContext<'static> {
    pub fn detached() -> Self {
        Self::new(&DETACHED)
    }
}
