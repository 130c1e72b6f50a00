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

//! Global memory + disk budget with an LRU of evictable cells.
//!
//! The budget tracks three dimension-wise quantities under one lock:
//! `used` (loaded cells), `reserved` (loads in flight), and the configured
//! `limit`. Reservation is all-or-nothing across dimensions; a reservation
//! that cannot be satisfied immediately first drives the LRU eviction walk,
//! then parks on a condvar until capacity frees up or the timeout expires.
//!
//! The LRU is a map from monotonically increasing sequence numbers to weak
//! cell handles. A cell keeps its current sequence number; `touch` moves it
//! to a fresh (maximum) sequence, and a stale sequence popped by the
//! eviction walk simply fails the cell-side check and is skipped. Weak
//! handles keep the budget from owning cells (slots own cells; the budget
//! only observes them).
//!
//! Lock order: a cell's lock may be taken before the budget lock (pin and
//! unpin call into the budget), never the other way around. The eviction
//! walk therefore pops a victim under the budget lock, releases it, and only
//! then calls into the cell.

use std::collections::BTreeMap;
use std::sync::Weak;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use crate::config::CacheConfig;
use crate::resource::ResourceUsage;

/// A cache cell as seen by the eviction walk.
pub(crate) trait EvictableCell: Send + Sync {
    /// Unload if loaded, unpinned, and still holding `seq` as its LRU
    /// position. Returns the freed size, or `None` if the cell refused.
    fn evict(&self, seq: u64) -> Option<ResourceUsage>;

    /// Identity for logs.
    fn descriptor(&self) -> String;
}

#[derive(Default)]
struct BudgetInner {
    used: ResourceUsage,
    reserved: ResourceUsage,
    next_seq: u64,
    lru: BTreeMap<u64, Weak<dyn EvictableCell>>,
}

/// Process-wide (or per-tier) resource budget.
pub struct ResourceBudget {
    limit: ResourceUsage,
    inner: Mutex<BudgetInner>,
    freed: Condvar,
}

impl ResourceBudget {
    pub fn new(limit: ResourceUsage) -> Self {
        Self {
            limit,
            inner: Mutex::new(BudgetInner::default()),
            freed: Condvar::new(),
        }
    }

    pub fn with_config(config: &CacheConfig) -> Self {
        Self::new(config.limit())
    }

    pub fn limit(&self) -> ResourceUsage {
        self.limit
    }

    /// `(used, reserved)` snapshot.
    pub fn usage(&self) -> (ResourceUsage, ResourceUsage) {
        let inner = self.inner.lock();
        (inner.used, inner.reserved)
    }

    pub fn evictable_len(&self) -> usize {
        self.inner.lock().lru.len()
    }

    /// Debit `need` against the budget, evicting and then waiting up to
    /// `timeout` if necessary. Returns true iff the debit happened; on
    /// timeout nothing was debited.
    pub fn reserve_with_timeout(&self, need: ResourceUsage, timeout: Duration) -> bool {
        if need.is_zero() {
            return true;
        }
        if !need.fits_within(&self.limit) {
            debug!(%need, limit = %self.limit, "reservation larger than budget limit");
            return false;
        }
        let deadline = Instant::now() + timeout;
        loop {
            let deficit = {
                let mut inner = self.inner.lock();
                if Self::try_debit(&self.limit, &mut inner, need) {
                    return true;
                }
                (inner.used + inner.reserved + need).saturating_sub(&self.limit)
            };
            // Evict outside the lock; the walk calls into cells.
            self.evict_until(deficit);
            let mut inner = self.inner.lock();
            if Self::try_debit(&self.limit, &mut inner, need) {
                return true;
            }
            if self.freed.wait_until(&mut inner, deadline).timed_out() {
                let ok = Self::try_debit(&self.limit, &mut inner, need);
                if !ok {
                    debug!(%need, used = %inner.used, reserved = %inner.reserved,
                        "reservation timed out");
                }
                return ok;
            }
            // Spurious or coalesced wake: loop and re-attempt.
        }
    }

    /// Return an unconsumed reservation (failed load) to the pool.
    pub fn release_reserved(&self, amount: ResourceUsage) {
        if amount.is_zero() {
            return;
        }
        {
            let mut inner = self.inner.lock();
            inner.reserved -= amount;
        }
        self.freed.notify_all();
    }

    /// Convert a reservation into usage once the cell's payload landed.
    pub fn commit_reserved(&self, amount: ResourceUsage) {
        let mut inner = self.inner.lock();
        inner.reserved -= amount;
        inner.used += amount;
    }

    /// Charge usage that was never reserved (cells over-read by a bulk
    /// load). May transiently overshoot the limit; the overshoot is bounded
    /// by one bulk load and decays through eviction.
    pub fn charge_unreserved(&self, amount: ResourceUsage) {
        let mut inner = self.inner.lock();
        inner.used += amount;
    }

    /// Return usage freed by an unload to the pool and wake waiters.
    pub fn release_used(&self, amount: ResourceUsage) {
        if amount.is_zero() {
            return;
        }
        {
            let mut inner = self.inner.lock();
            inner.used -= amount;
        }
        self.freed.notify_all();
    }

    /// Walk the LRU from least recent, unloading unpinned cells until
    /// `at_least` has been freed (dimension-wise) or the list is exhausted.
    /// Returns what was actually freed.
    pub(crate) fn evict_until(&self, at_least: ResourceUsage) -> ResourceUsage {
        let mut freed = ResourceUsage::default();
        if at_least.is_zero() {
            return freed;
        }
        loop {
            if freed.covers(&at_least) {
                break;
            }
            let victim = {
                let mut inner = self.inner.lock();
                inner.lru.pop_first()
            };
            let Some((seq, weak)) = victim else {
                break;
            };
            let Some(cell) = weak.upgrade() else {
                continue;
            };
            if let Some(size) = cell.evict(seq) {
                trace!(cell = %cell.descriptor(), %size, "evicted");
                self.release_used(size);
                freed += size;
            }
            // A refusal means the cell got pinned or re-positioned since the
            // entry was queued; the stale entry is dropped either way.
        }
        freed
    }

    /// Register an unpinned loaded cell at the MRU end. Returns its
    /// sequence token.
    pub(crate) fn insert_evictable(&self, cell: Weak<dyn EvictableCell>) -> u64 {
        let mut inner = self.inner.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.lru.insert(seq, cell);
        seq
    }

    /// Drop a cell from the LRU (it got pinned or unloaded).
    pub(crate) fn remove_evictable(&self, seq: u64) {
        let mut inner = self.inner.lock();
        inner.lru.remove(&seq);
    }

    /// Move a cell to the MRU end, returning its new sequence token.
    pub(crate) fn touch_evictable(&self, seq: u64, cell: Weak<dyn EvictableCell>) -> u64 {
        let mut inner = self.inner.lock();
        inner.lru.remove(&seq);
        let new_seq = inner.next_seq;
        inner.next_seq += 1;
        inner.lru.insert(new_seq, cell);
        new_seq
    }

    fn try_debit(limit: &ResourceUsage, inner: &mut BudgetInner, need: ResourceUsage) -> bool {
        if (inner.used + inner.reserved + need).fits_within(limit) {
            inner.reserved += need;
            true
        } else {
            false
        }
    }
}
