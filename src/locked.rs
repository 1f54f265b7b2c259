use spin::{Mutex, MutexGuard};

use crate::arena::RegionArena;
use crate::buffer::{BufferSource, SystemSource};
use crate::checks::{self, Stats, Validity};
use crate::error::Result;

/// A region arena behind a spin lock.
///
/// `RegionArena` itself does no locking; this is for callers that need to
/// share one arena between threads. Every operation goes through `lock()`,
/// which spins until the arena is free.
pub struct LockedArena<S: BufferSource = SystemSource> {
    arena: Mutex<RegionArena<S>>,
}

impl LockedArena<SystemSource> {
    pub fn create(capacity: usize) -> Result<Self> {
        RegionArena::create(capacity).map(LockedArena::new)
    }
}

impl<S: BufferSource> LockedArena<S> {
    pub fn new(arena: RegionArena<S>) -> Self {
        LockedArena {
            arena: Mutex::new(arena),
        }
    }

    /// Get a reference to the underlying arena.
    ///
    /// Other threads block on `lock()` while the guard is held.
    pub fn lock(&self) -> MutexGuard<RegionArena<S>> {
        self.arena.lock()
    }

    pub fn into_inner(self) -> RegionArena<S> {
        self.arena.into_inner()
    }

    pub fn stats(&self) -> (Validity, Stats) {
        let arena = self.lock();
        checks::stats(&*arena)
    }
}
