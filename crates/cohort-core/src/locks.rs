//! # Per-Guid Locks
//!
//! Each instance guid is the unit of synchronization. A mutation locks every
//! guid it will touch, always in ascending guid order, so two operations with
//! overlapping guid sets can never deadlock.
//!
//! Slots are created on demand and dropped once no guard or waiter refers to
//! them.

use crate::Guid;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

type Slot = Arc<Mutex<()>>;

/// Table of per-guid mutexes.
#[derive(Debug, Default)]
pub struct LockTable {
    slots: Mutex<BTreeMap<Guid, Slot>>,
}

impl LockTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock a set of guids, blocking until all are held.
    ///
    /// Duplicates are ignored; acquisition is in ascending guid order.
    pub fn lock<I>(&self, guids: I) -> GuidLocks<'_>
    where
        I: IntoIterator<Item = Guid>,
    {
        let guids: BTreeSet<Guid> = guids.into_iter().collect();
        let slots: Vec<Slot> = {
            let mut table = self.slots.lock();
            guids
                .iter()
                .map(|guid| Arc::clone(table.entry(guid.clone()).or_default()))
                .collect()
        };
        let guards = slots.into_iter().map(|slot| slot.lock_arc()).collect();
        GuidLocks {
            table: self,
            guids,
            guards,
        }
    }

    /// Number of guids with a live slot.
    #[must_use]
    pub fn active(&self) -> usize {
        self.slots.lock().len()
    }

    fn release(&self, guids: &BTreeSet<Guid>) {
        let mut table = self.slots.lock();
        for guid in guids {
            let idle = table
                .get(guid)
                .is_some_and(|slot| Arc::strong_count(slot) == 1);
            if idle {
                table.remove(guid);
            }
        }
    }
}

/// Held locks for a set of guids. Released on drop.
pub struct GuidLocks<'a> {
    table: &'a LockTable,
    guids: BTreeSet<Guid>,
    guards: Vec<ArcMutexGuard<RawMutex, ()>>,
}

impl GuidLocks<'_> {
    /// True when every guid in `needed` is held.
    pub fn covers<'g>(&self, needed: impl IntoIterator<Item = &'g Guid>) -> bool {
        needed.into_iter().all(|guid| self.guids.contains(guid))
    }

    #[must_use]
    pub fn guids(&self) -> &BTreeSet<Guid> {
        &self.guids
    }
}

impl std::fmt::Debug for GuidLocks<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuidLocks")
            .field("guids", &self.guids)
            .finish_non_exhaustive()
    }
}

impl Drop for GuidLocks<'_> {
    fn drop(&mut self) {
        self.guards.clear();
        self.table.release(&self.guids);
    }
}
