//! Mutation gate
//!
//! An inverted reader/writer lock: index *mutations* take the shared side
//! (the writer accepts concurrent callers), while `close`, `destroy` and
//! batch-mode transitions take the exclusive side so they run with no
//! mutation in flight. Searches never touch the gate.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Gate between concurrent mutations and exclusive lifecycle transitions
#[derive(Debug, Default)]
pub struct MutationGate {
    lock: RwLock<()>,
}

/// Shared permit held for the duration of one mutation
#[must_use = "the permit is released when dropped"]
pub struct MutationPermit<'a> {
    _guard: RwLockReadGuard<'a, ()>,
}

/// Exclusive permit held for a lifecycle transition
#[must_use = "the permit is released when dropped"]
pub struct ExclusivePermit<'a> {
    _guard: RwLockWriteGuard<'a, ()>,
}

impl MutationGate {
    /// Create an open gate
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire a shared permit; blocks while an exclusive permit is held
    pub fn permit(&self) -> MutationPermit<'_> {
        MutationPermit {
            _guard: self.lock.read(),
        }
    }

    /// Acquire the exclusive permit; waits for in-flight mutations to drain
    pub fn exclusive(&self) -> ExclusivePermit<'_> {
        ExclusivePermit {
            _guard: self.lock.write(),
        }
    }
}
