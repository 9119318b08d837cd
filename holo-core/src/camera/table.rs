//! Thread-safe camera-resource table.
//!
//! The table is touched by the rendering thread every tick and by
//! camera-added / camera-removed notifications that may arrive on any
//! platform thread. [`CameraResourceTable::with_table`] is the single
//! serialization point for both.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::debug;

use crate::camera::{CameraDescriptor, CameraId, CameraResourceRecord};

// ── CameraMap ────────────────────────────────────────────────────

/// The map guarded by [`CameraResourceTable`]; only reachable inside a
/// [`with_table`](CameraResourceTable::with_table) callback.
#[derive(Debug, Default)]
pub struct CameraMap {
    records: HashMap<CameraId, CameraResourceRecord>,
}

impl CameraMap {
    /// Create an empty record for a newly attached camera.
    ///
    /// Returns `false` (and keeps the existing record) if the camera is
    /// already known.
    pub(crate) fn add(
        &mut self,
        id: CameraId,
        descriptor: CameraDescriptor,
        device_generation: u64,
    ) -> bool {
        if self.records.contains_key(&id) {
            return false;
        }
        self.records
            .insert(id, CameraResourceRecord::new(id, descriptor, device_generation));
        true
    }

    /// Release the camera's GPU bindings, then erase its record.
    ///
    /// Returns `true` if the camera was known.
    pub(crate) fn remove(&mut self, id: CameraId) -> bool {
        match self.records.get_mut(&id) {
            Some(record) => {
                record.release_bindings();
                self.records.remove(&id);
                true
            }
            None => false,
        }
    }

    /// Drop every record's bindings and replace each with a fresh, empty
    /// record tagged with `device_generation`.
    pub(crate) fn reset_all(&mut self, device_generation: u64) {
        for record in self.records.values_mut() {
            record.release_bindings();
            let fresh = CameraResourceRecord::new(
                record.id(),
                record.descriptor().clone(),
                device_generation,
            );
            *record = fresh;
        }
        debug!(cameras = self.records.len(), "camera records reset");
    }

    pub(crate) fn get_mut(&mut self, id: CameraId) -> Option<&mut CameraResourceRecord> {
        self.records.get_mut(&id)
    }

    pub fn get(&self, id: CameraId) -> Option<&CameraResourceRecord> {
        self.records.get(&id)
    }

    pub fn contains(&self, id: CameraId) -> bool {
        self.records.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Camera ids in ascending order.
    pub fn ids(&self) -> Vec<CameraId> {
        let mut ids: Vec<CameraId> = self.records.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn iter(&self) -> impl Iterator<Item = &CameraResourceRecord> {
        self.records.values()
    }
}

// ── CameraResourceTable ──────────────────────────────────────────

/// Mutex-guarded [`CameraMap`] with a scoped-access primitive.
#[derive(Debug, Default)]
pub struct CameraResourceTable {
    map: Mutex<CameraMap>,
}

impl CameraResourceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with exclusive access to the map.
    ///
    /// The lock is released on every exit path, including an `Err`
    /// returned by `f` or a panic unwinding through it.
    ///
    /// Calling `with_table` again from inside `f` deadlocks; callers
    /// must not re-enter. A caller that observes device loss inside `f`
    /// returns it and reports it to the device owner after the lock is
    /// released.
    pub fn with_table<R>(&self, f: impl FnOnce(&mut CameraMap) -> R) -> R {
        let mut guard = self.map.lock();
        f(&mut guard)
    }
}

// ── Tests ────────────────────────────────────────────────────────
