// SPDX-License-Identifier: AGPL-3.0-or-later
// VexDB - Vector Database Segment Engine
// Copyright (C) 2026 Sushanth Reddy Vanagala (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Scoped access to pinned cells.
//!
//! A [`CellAccessor`] is produced by a resolved pin request: every cell it
//! covers is loaded and pinned for the accessor's lifetime, so lookups are
//! plain vector reads with no locking. [`PinWrapper`] carries a value
//! computed from pinned data across API layers without exposing the cache
//! vocabulary to the consumer.

use std::any::Any;
use std::sync::Arc;

use crate::cell::{CellPayload, CellPin};
use crate::slot::CacheSlot;
use crate::translator::{CellId, Uid};

/// A view over the cells resolved by one pin request.
///
/// Accessing a cell outside the pinned set returns `None`.
pub struct CellAccessor<T: CellPayload> {
    // Pins are declared before the slot reference so they drop first:
    // every pin is released strictly before the accessor lets go of the
    // slot that owns the cells.
    pins: Vec<CellPin<T>>,
    payloads: Vec<Option<Arc<T>>>,
    slot: Arc<CacheSlot<T>>,
}

impl<T: CellPayload> CellAccessor<T> {
    pub(crate) fn new(slot: Arc<CacheSlot<T>>, pins: Vec<CellPin<T>>) -> Self {
        let mut payloads = vec![None; slot.num_cells()];
        for pin in &pins {
            let cid = pin.cid() as usize;
            if let Some(entry) = payloads.get_mut(cid) {
                *entry = pin.payload();
            }
        }
        Self {
            pins,
            payloads,
            slot,
        }
    }

    /// Payload of the cell a user identifier maps to.
    pub fn get_cell(&self, uid: Uid) -> Option<&T> {
        self.get_ith_cell(self.slot.cell_id_of(uid))
    }

    /// Payload of cell `cid`.
    pub fn get_ith_cell(&self, cid: CellId) -> Option<&T> {
        self.payloads
            .get(cid as usize)
            .and_then(|p| p.as_deref())
    }

    /// Shared handle to the payload of cell `cid`. The payload stays
    /// resident only while a pin exists; callers packaging the handle for a
    /// longer lifetime must keep the accessor alongside it.
    pub fn get_ith_cell_shared(&self, cid: CellId) -> Option<Arc<T>> {
        self.payloads.get(cid as usize).and_then(|p| p.clone())
    }

    pub fn slot(&self) -> &Arc<CacheSlot<T>> {
        &self.slot
    }

    /// Number of pinned cells.
    pub fn pinned_len(&self) -> usize {
        self.pins.len()
    }
}

/// An opaque pin guard packaged with a value computed from it.
///
/// Lets a column return e.g. a chunk handle whose backing cells stay
/// resident exactly as long as the wrapper lives, without the caller ever
/// seeing accessors or pins.
pub struct PinWrapper<V> {
    guard: Option<Box<dyn Any + Send + Sync>>,
    value: V,
}

impl<V> PinWrapper<V> {
    /// Wrap `value` whose validity is tied to `guard`.
    pub fn new<G: Any + Send + Sync>(guard: G, value: V) -> Self {
        Self {
            guard: Some(Box::new(guard)),
            value,
        }
    }

    /// For values that need no pin (owned copies, growing-segment views).
    pub fn no_pin(value: V) -> Self {
        Self { guard: None, value }
    }

    pub fn get(&self) -> &V {
        &self.value
    }

    /// Map the value while keeping the same guard alive.
    pub fn transform<U, F: FnOnce(V) -> U>(self, f: F) -> PinWrapper<U> {
        PinWrapper {
            guard: self.guard,
            value: f(self.value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_wrapper_transform_keeps_guard() {
        use std::sync::atomic::{AtomicBool, Ordering};

        struct Guard(Arc<AtomicBool>);
        impl Drop for Guard {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let dropped = Arc::new(AtomicBool::new(false));
        let w = PinWrapper::new(Guard(dropped.clone()), vec![1, 2, 3]);
        let w2 = w.transform(|v| v.len());
        assert!(!dropped.load(Ordering::SeqCst));
        assert_eq!(*w2.get(), 3);
        drop(w2);
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_no_pin_wrapper() {
        let w = PinWrapper::no_pin(42u32);
        assert_eq!(*w.get(), 42);
    }
}
