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

//! Per-cell life cycle: pin counting, load completion broadcast, error
//! propagation.
//!
//! ```text
//! NotLoaded ──pin(first)──► Loading ──set_cell──► Loaded ──evict──► NotLoaded
//!     ▲                        │                    │ ▲
//!     │                        └──set_error──► Failed │ pin/unpin
//!     └───────── reset on next pin attempt ◄──┘       ▼
//!                                                  Loaded
//! ```
//!
//! Exactly one concurrent pinner observes the NotLoaded → Loading edge and
//! becomes the load requester; everyone else parks on the cell's condvar.
//! Each Loading edge bumps a generation counter so that a waiter from a
//! failed round never mistakes a later round's payload for its own pin: a
//! generation mismatch always resolves to that round's broadcast error.
//!
//! Lock order: the cell lock may be taken before the budget lock, never
//! after it (the budget's eviction walk calls [`CacheCell::evict`] only
//! after releasing its own lock).

use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use tracing::{error, trace};

use vexdb_core::{Error, Result};

use crate::budget::{EvictableCell, ResourceBudget};
use crate::config::CacheStats;
use crate::resource::ResourceUsage;
use crate::translator::CellId;

/// A value that can live in the cache. Sizes feed eviction telemetry and
/// give a later estimate-reconciliation pass a source of truth.
pub trait CellPayload: Send + Sync + 'static {
    fn byte_size(&self) -> usize;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellState {
    NotLoaded,
    Loading,
    Loaded,
    Failed,
}

struct CellInner<T> {
    state: CellState,
    pin_count: u32,
    /// Bumped on every NotLoaded → Loading edge.
    generation: u64,
    payload: Option<Arc<T>>,
    last_error: Option<Error>,
    /// Current position in the budget's LRU, when evictable.
    lru_seq: Option<u64>,
    life_start: Option<Instant>,
}

/// One cache cell. Owned by its slot; observed weakly by the budget's LRU.
pub(crate) struct CacheCell<T> {
    cid: CellId,
    /// `<slot key>:<cid>`, for logs.
    key: String,
    /// Translator-estimated size; charged for the cell's whole residency.
    size: ResourceUsage,
    budget: Arc<ResourceBudget>,
    stats: Arc<CacheStats>,
    inner: Mutex<CellInner<T>>,
    ready: Condvar,
}

impl<T: CellPayload> CacheCell<T> {
    pub(crate) fn new(
        slot_key: &str,
        cid: CellId,
        size: ResourceUsage,
        budget: Arc<ResourceBudget>,
        stats: Arc<CacheStats>,
    ) -> Arc<Self> {
        Arc::new(Self {
            cid,
            key: format!("{}:{}", slot_key, cid),
            size,
            budget,
            stats,
            inner: Mutex::new(CellInner {
                state: CellState::NotLoaded,
                pin_count: 0,
                generation: 0,
                payload: None,
                last_error: None,
                lru_seq: None,
                life_start: None,
            }),
            ready: Condvar::new(),
        })
    }

    pub(crate) fn cid(&self) -> CellId {
        self.cid
    }

    pub(crate) fn size(&self) -> ResourceUsage {
        self.size
    }

    /// Pin the cell. Returns whether this caller observed the
    /// NotLoaded → Loading edge (and therefore must run the load) plus a
    /// ticket that resolves once this load round completes.
    pub(crate) fn pin(self: &Arc<Self>) -> (bool, PinTicket<T>) {
        let mut inner = self.inner.lock();
        let need_load = match inner.state {
            CellState::NotLoaded => {
                inner.state = CellState::Loading;
                inner.generation += 1;
                true
            }
            CellState::Loading => false,
            CellState::Loaded => {
                if inner.pin_count == 0 {
                    if let Some(seq) = inner.lru_seq.take() {
                        self.budget.remove_evictable(seq);
                    }
                }
                false
            }
            CellState::Failed => {
                // Error resets on the next pin attempt.
                inner.state = CellState::Loading;
                inner.generation += 1;
                true
            }
        };
        inner.pin_count += 1;
        let generation = inner.generation;
        drop(inner);
        (
            need_load,
            PinTicket {
                cell: Arc::clone(self),
                generation,
                consumed: false,
            },
        )
    }

    /// Publish a loaded payload. Idempotent once Loaded: the first writer
    /// wins and later writers are counted, not applied. Budget accounting
    /// depends on the prior state: a Loading cell converts its reservation,
    /// anything else is an unreserved over-read charge.
    pub(crate) fn set_cell(self: &Arc<Self>, payload: T) {
        let mut inner = self.inner.lock();
        match inner.state {
            CellState::Loaded => {
                drop(inner);
                self.stats.record_duplicate_load();
                return;
            }
            CellState::Loading => {
                self.budget.commit_reserved(self.size);
            }
            CellState::NotLoaded | CellState::Failed => {
                self.budget.charge_unreserved(self.size);
            }
        }
        inner.payload = Some(Arc::new(payload));
        inner.state = CellState::Loaded;
        inner.last_error = None;
        inner.life_start = Some(Instant::now());
        if inner.pin_count == 0 && inner.lru_seq.is_none() {
            let weak = Arc::downgrade(self) as Weak<dyn EvictableCell>;
            inner.lru_seq = Some(self.budget.insert_evictable(weak));
        }
        drop(inner);
        self.stats.record_load();
        self.ready.notify_all();
    }

    /// Broadcast a load failure to every waiter of the current round and
    /// reset the pin count. `release_reservation` is false when the failure
    /// is the reservation itself (nothing was debited). A cell that was
    /// already completed by a concurrent over-reading load is left alone.
    pub(crate) fn set_error(&self, err: Error, release_reservation: bool) {
        let mut inner = self.inner.lock();
        if inner.state != CellState::Loading {
            return;
        }
        if release_reservation {
            self.budget.release_reserved(self.size);
        }
        inner.state = CellState::Failed;
        inner.last_error = Some(err);
        inner.pin_count = 0;
        drop(inner);
        self.stats.record_load_failure();
        self.ready.notify_all();
    }

    /// Unload iff Loaded and unpinned. Returns whether the eviction
    /// happened.
    pub(crate) fn manual_evict(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != CellState::Loaded || inner.pin_count > 0 {
            return false;
        }
        if let Some(seq) = inner.lru_seq.take() {
            self.budget.remove_evictable(seq);
        }
        self.unload_locked(&mut inner);
        drop(inner);
        self.budget.release_used(self.size);
        true
    }

    /// Payload of a loaded cell, if any.
    pub(crate) fn payload(&self) -> Option<Arc<T>> {
        self.inner.lock().payload.clone()
    }

    #[cfg(test)]
    pub(crate) fn pin_count(&self) -> u32 {
        self.inner.lock().pin_count
    }

    fn unload_locked(&self, inner: &mut CellInner<T>) {
        if let Some(start) = inner.life_start.take() {
            trace!(cell = %self.key, lifetime_secs = start.elapsed().as_secs(), "unload");
        }
        inner.payload = None;
        inner.state = CellState::NotLoaded;
        self.stats.record_eviction();
    }

    fn unpin(self: &Arc<Self>) {
        let mut inner = self.inner.lock();
        inner.pin_count = inner.pin_count.saturating_sub(1);
        if inner.pin_count == 0 && inner.state == CellState::Loaded && inner.lru_seq.is_none() {
            let weak = Arc::downgrade(self) as Weak<dyn EvictableCell>;
            inner.lru_seq = Some(self.budget.insert_evictable(weak));
        }
    }
}

impl<T: CellPayload> EvictableCell for CacheCell<T> {
    fn evict(&self, seq: u64) -> Option<ResourceUsage> {
        let mut inner = self.inner.lock();
        if inner.state != CellState::Loaded
            || inner.pin_count > 0
            || inner.lru_seq != Some(seq)
        {
            return None;
        }
        inner.lru_seq = None;
        self.unload_locked(&mut inner);
        Some(self.size)
    }

    fn descriptor(&self) -> String {
        self.key.clone()
    }
}

impl<T> Drop for CacheCell<T> {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if inner.state == CellState::Loading {
            error!(cell = %self.key, "cell destroyed while loading");
        }
    }
}

// ============================================================================
// Pin Handles
// ============================================================================

/// A claim on one load round of one cell. Resolves to a [`CellPin`] or to
/// the round's broadcast error. Dropping an unresolved ticket releases the
/// claim without waiting.
pub(crate) struct PinTicket<T: CellPayload> {
    cell: Arc<CacheCell<T>>,
    generation: u64,
    consumed: bool,
}

impl<T: CellPayload> PinTicket<T> {
    /// Block until this round resolves. The pin entry point's timeout
    /// applies to budget reservation only; once a load is running it runs
    /// to completion, so this wait is unbounded.
    pub(crate) fn wait(mut self) -> Result<CellPin<T>> {
        let mut inner = self.cell.inner.lock();
        while inner.state == CellState::Loading && inner.generation == self.generation {
            self.cell.ready.wait(&mut inner);
        }
        self.consumed = true;
        if inner.generation != self.generation {
            // Our round ended in a broadcast error and a newer round has
            // already claimed the cell.
            let err = inner
                .last_error
                .clone()
                .unwrap_or_else(|| Error::Unknown(format!("cell {} load superseded", self.cell.key)));
            return Err(err);
        }
        match inner.state {
            CellState::Loaded => {
                drop(inner);
                Ok(CellPin {
                    cell: Arc::clone(&self.cell),
                })
            }
            CellState::Failed => Err(inner
                .last_error
                .clone()
                .unwrap_or_else(|| Error::Unknown(format!("cell {} load failed", self.cell.key)))),
            CellState::NotLoaded | CellState::Loading => Err(Error::Unknown(format!(
                "cell {} resolved in unexpected state",
                self.cell.key
            ))),
        }
    }
}

impl<T: CellPayload> Drop for PinTicket<T> {
    fn drop(&mut self) {
        if self.consumed {
            return;
        }
        // Cancelled before resolution: give back the claimed pin, unless a
        // failed round already wiped the count (generation moved on or the
        // count was reset together with the error broadcast).
        let mut inner = self.cell.inner.lock();
        if inner.generation != self.generation || inner.state == CellState::Failed {
            return;
        }
        trace!(cell = %self.cell.key, "pin ticket dropped before resolution");
        inner.pin_count = inner.pin_count.saturating_sub(1);
        if inner.pin_count == 0 && inner.state == CellState::Loaded && inner.lru_seq.is_none() {
            let weak = Arc::downgrade(&self.cell) as Weak<dyn EvictableCell>;
            inner.lru_seq = Some(self.cell.budget.insert_evictable(weak));
        }
    }
}

/// A move-only handle that keeps one cell resident. Dropping it decrements
/// the pin count and, at zero, surrenders the cell to the eviction LRU.
pub struct CellPin<T: CellPayload> {
    cell: Arc<CacheCell<T>>,
}

impl<T: CellPayload> CellPin<T> {
    pub(crate) fn payload(&self) -> Option<Arc<T>> {
        self.cell.payload()
    }

    pub(crate) fn cid(&self) -> CellId {
        self.cell.cid()
    }
}

impl<T: CellPayload> Drop for CellPin<T> {
    fn drop(&mut self) {
        self.cell.unpin();
    }
}
