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

//! Per-column cell cache.
//!
//! A [`CacheSlot`] owns a fixed vector of cells and a [`Translator`], and
//! coordinates pin → reserve → load → fulfil:
//!
//! 1. map user identifiers to cell ids and deduplicate,
//! 2. pin every involved cell before any load starts,
//! 3. reserve exactly the estimated size of the subset that needs loading,
//! 4. issue one bulk `get_cells` for that subset,
//! 5. publish results (or broadcast the failure) and resolve the accessor
//!    once every pin is ready.
//!
//! If the reservation fails, the Translator is never called: every cell in
//! the need-load subset resolves with `InsufficientResource` and nothing
//! was debited.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, trace, warn};

use vexdb_core::{Error, Result};

use crate::accessor::CellAccessor;
use crate::budget::ResourceBudget;
use crate::cell::{CacheCell, CellPayload};
use crate::config::CacheStats;
use crate::resource::ResourceUsage;
use crate::translator::{CellId, CellIdMapping, Meta, Translator, Uid, WarmupPolicy};

const WARMUP_TIMEOUT: Duration = Duration::from_secs(100);

/// A cache for a single column, composed of cells. Immutable after
/// construction except for cell state.
pub struct CacheSlot<T: CellPayload> {
    translator: Box<dyn Translator<Cell = T>>,
    mapping: CellIdMapping,
    cells: Vec<Arc<CacheCell<T>>>,
    budget: Arc<ResourceBudget>,
    stats: Arc<CacheStats>,
}

impl<T: CellPayload> CacheSlot<T> {
    /// Build a slot over `translator`, accounting against `budget`. Honors
    /// the translator's warmup policy before returning.
    pub fn new(
        translator: Box<dyn Translator<Cell = T>>,
        budget: Arc<ResourceBudget>,
    ) -> Arc<Self> {
        let stats = Arc::new(CacheStats::default());
        let key = translator.key().to_string();
        let num_cells = translator.num_cells();
        let cells = (0..num_cells)
            .map(|i| {
                let cid = i as CellId;
                CacheCell::new(
                    &key,
                    cid,
                    translator.estimated_byte_size_of_cell(cid),
                    Arc::clone(&budget),
                    Arc::clone(&stats),
                )
            })
            .collect();
        let mapping = translator.meta().mapping;
        let warmup = translator.meta().warmup;
        let slot = Arc::new(Self {
            translator,
            mapping,
            cells,
            budget,
            stats,
        });
        if warmup == WarmupPolicy::Sync {
            slot.warmup();
        }
        slot
    }

    /// Pin the cells the given user identifiers map to. Non-blocking: the
    /// returned request does nothing until [`PinRequest::wait`] is called.
    pub fn pin_cells(self: &Arc<Self>, uids: &[Uid], timeout: Duration) -> PinRequest<T> {
        PinRequest {
            slot: Arc::clone(self),
            target: PinTarget::Uids(uids.to_vec()),
            timeout,
        }
    }

    /// Pin every cell of the slot.
    pub fn pin_all_cells(self: &Arc<Self>, timeout: Duration) -> PinRequest<T> {
        PinRequest {
            slot: Arc::clone(self),
            target: PinTarget::All,
            timeout,
        }
    }

    /// Unload cell `cid` iff it is loaded and unpinned. Returns whether the
    /// eviction happened.
    pub fn manual_evict(&self, cid: CellId) -> bool {
        match self.cells.get(cid as usize) {
            Some(cell) => cell.manual_evict(),
            None => false,
        }
    }

    /// Unload every loaded, unpinned cell. Returns whether any eviction
    /// happened.
    pub fn manual_evict_all(&self) -> bool {
        let mut evicted = false;
        for cell in &self.cells {
            if cell.manual_evict() {
                evicted = true;
            }
        }
        evicted
    }

    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn size_of_cell(&self, cid: CellId) -> Option<ResourceUsage> {
        self.cells.get(cid as usize).map(|c| c.size())
    }

    pub fn meta(&self) -> &Meta {
        self.translator.meta()
    }

    pub fn key(&self) -> &str {
        self.translator.key()
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub(crate) fn cell_id_of(&self, uid: Uid) -> CellId {
        match self.mapping {
            CellIdMapping::Identical => uid as CellId,
            CellIdMapping::AlwaysZero => 0,
            CellIdMapping::Custom => self.translator.cell_id_of(uid),
        }
    }

    /// Best-effort eager load of every cell; failures are logged, not
    /// raised.
    fn warmup(self: &Arc<Self>) {
        match self.pin_all_cells(WARMUP_TIMEOUT).wait() {
            Ok(accessor) => drop(accessor),
            Err(e) => warn!(slot = self.key(), error = %e, "warmup failed"),
        }
    }

    fn pin_internal(self: &Arc<Self>, cids: Vec<CellId>, timeout: Duration) -> Result<CellAccessor<T>> {
        for &cid in &cids {
            if cid as usize >= self.cells.len() {
                return Err(Error::OutOfRange(format!(
                    "cid {} out of range, slot {} has {} cells",
                    cid,
                    self.key(),
                    self.cells.len()
                )));
            }
        }

        // Attach a pin to every involved cell before any load starts.
        let mut tickets = Vec::with_capacity(cids.len());
        let mut need_load = Vec::new();
        let mut resource_needed = ResourceUsage::default();
        for &cid in &cids {
            let cell = &self.cells[cid as usize];
            let (needs, ticket) = cell.pin();
            tickets.push(ticket);
            if needs {
                need_load.push(cid);
                resource_needed += cell.size();
            }
        }

        if !need_load.is_empty() {
            self.run_load(&need_load, resource_needed, timeout);
        }

        let mut pins = Vec::with_capacity(tickets.len());
        for ticket in tickets {
            // An error here drops the remaining tickets, which releases
            // their claims; no partial accessor is ever returned.
            pins.push(ticket.wait()?);
        }
        Ok(CellAccessor::new(Arc::clone(self), pins))
    }

    /// Reserve, bulk-load, and publish the need-load subset. Never returns
    /// an error: every outcome is delivered through the cells so that all
    /// waiters observe it.
    fn run_load(&self, need_load: &[CellId], resource_needed: ResourceUsage, timeout: Duration) {
        let start = Instant::now();
        if !self.budget.reserve_with_timeout(resource_needed, timeout) {
            let err = Error::InsufficientResource(format!(
                "slot {} failed to reserve {} for {} cells",
                self.key(),
                resource_needed,
                need_load.len()
            ));
            error!(slot = self.key(), needed = %resource_needed, "reservation failed");
            for &cid in need_load {
                self.cells[cid as usize].set_error(err.clone(), false);
            }
            return;
        }
        trace!(
            slot = self.key(),
            needed = %resource_needed,
            wait_ms = start.elapsed().as_millis() as u64,
            "reservation succeeded"
        );

        match self.translator.get_cells(need_load) {
            Ok(results) => {
                let mut missing: HashSet<CellId> = need_load.iter().copied().collect();
                for (cid, payload) in results {
                    match self.cells.get(cid as usize) {
                        Some(cell) => {
                            missing.remove(&cid);
                            cell.set_cell(payload);
                        }
                        None => {
                            warn!(slot = self.key(), cid, "translator returned unknown cid")
                        }
                    }
                }
                for cid in missing {
                    self.cells[cid as usize].set_error(
                        Error::Unknown(format!(
                            "translator for slot {} did not return requested cell {}",
                            self.key(),
                            cid
                        )),
                        true,
                    );
                }
                debug!(
                    slot = self.key(),
                    cells = need_load.len(),
                    latency_ms = start.elapsed().as_millis() as u64,
                    "bulk load finished"
                );
            }
            Err(e) => {
                warn!(slot = self.key(), error = %e, "bulk load failed");
                for &cid in need_load {
                    self.cells[cid as usize].set_error(e.clone(), true);
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn pin_count_of(&self, cid: CellId) -> u32 {
        self.cells[cid as usize].pin_count()
    }
}

enum PinTarget {
    All,
    Uids(Vec<Uid>),
}

/// An inert pin request. The pinning work starts when `wait` is called; a
/// request dropped unawaited starts nothing.
pub struct PinRequest<T: CellPayload> {
    slot: Arc<CacheSlot<T>>,
    target: PinTarget,
    timeout: Duration,
}

impl<T: CellPayload> PinRequest<T> {
    /// Execute the pin: map, pin, reserve, load, and resolve once every pin
    /// is ready.
    pub fn wait(self) -> Result<CellAccessor<T>> {
        let cids = match self.target {
            PinTarget::All => (0..self.slot.num_cells() as CellId).collect(),
            PinTarget::Uids(ref uids) => {
                let mut seen = HashSet::with_capacity(uids.len());
                let mut cids = Vec::with_capacity(uids.len());
                for &uid in uids {
                    let cid = self.slot.cell_id_of(uid);
                    if seen.insert(cid) {
                        cids.push(cid);
                    }
                }
                cids
            }
        };
        self.slot.pin_internal(cids, self.timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::ResourceBudget;
    use crate::translator::StorageKind;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex as StdMutex;

    struct Blob(Vec<u8>);

    impl CellPayload for Blob {
        fn byte_size(&self) -> usize {
            self.0.len()
        }
    }

    /// Handle onto a translator's recorded `get_cells` calls; survives the
    /// translator being boxed into a slot.
    #[derive(Clone, Default)]
    struct CallLog(Arc<StdMutex<Vec<Vec<CellId>>>>);

    impl CallLog {
        fn count(&self) -> usize {
            self.0.lock().unwrap().len()
        }

        fn requested_sets(&self) -> Vec<Vec<CellId>> {
            let mut sets = self.0.lock().unwrap().clone();
            for s in &mut sets {
                s.sort_unstable();
            }
            sets
        }
    }

    /// In-memory translator producing `cell_size`-byte blobs, recording
    /// every get_cells call.
    struct BlobTranslator {
        key: String,
        meta: Meta,
        num_cells: usize,
        cell_size: u64,
        calls: CallLog,
        fail: bool,
        /// Extra cids appended to every reply (over-read simulation).
        bonus: Vec<CellId>,
    }

    impl BlobTranslator {
        fn new(num_cells: usize, cell_size: u64) -> Self {
            Self {
                key: "col0".into(),
                meta: Meta::new(
                    StorageKind::Memory,
                    WarmupPolicy::Disable,
                    CellIdMapping::Identical,
                ),
                num_cells,
                cell_size,
                calls: CallLog::default(),
                fail: false,
                bonus: Vec::new(),
            }
        }
    }

    impl Translator for BlobTranslator {
        type Cell = Blob;

        fn key(&self) -> &str {
            &self.key
        }

        fn num_cells(&self) -> usize {
            self.num_cells
        }

        fn meta(&self) -> &Meta {
            &self.meta
        }

        fn estimated_byte_size_of_cell(&self, _cid: CellId) -> ResourceUsage {
            ResourceUsage::memory(self.cell_size)
        }

        fn get_cells(&self, cids: &[CellId]) -> Result<Vec<(CellId, Blob)>> {
            self.calls.0.lock().unwrap().push(cids.to_vec());
            if self.fail {
                return Err(Error::FileReadFailed("translator down".into()));
            }
            let mut out: Vec<(CellId, Blob)> = cids
                .iter()
                .map(|&cid| (cid, Blob(vec![cid as u8; self.cell_size as usize])))
                .collect();
            for &b in &self.bonus {
                if !cids.contains(&b) {
                    out.push((b, Blob(vec![b as u8; self.cell_size as usize])));
                }
            }
            Ok(out)
        }
    }

    fn big_budget() -> Arc<ResourceBudget> {
        Arc::new(ResourceBudget::new(ResourceUsage::new(1 << 30, 1 << 30)))
    }

    fn timeout() -> Duration {
        Duration::from_secs(5)
    }

    #[test]
    fn test_pin_cells_yields_loaded_payloads() {
        let slot = CacheSlot::new(Box::new(BlobTranslator::new(4, 32)), big_budget());
        let accessor = slot.pin_cells(&[0, 2], timeout()).wait().unwrap();
        // P2: every requested uid resolves to a payload of the right size
        for uid in [0u64, 2] {
            let cell = accessor.get_cell(uid).unwrap();
            assert_eq!(cell.byte_size(), 32);
        }
        assert!(accessor.get_cell(1).is_none());
    }

    #[test]
    fn test_duplicate_uids_pin_once() {
        let slot = CacheSlot::new(Box::new(BlobTranslator::new(4, 32)), big_budget());
        let accessor = slot.pin_cells(&[1, 1, 1], timeout()).wait().unwrap();
        assert_eq!(accessor.pinned_len(), 1);
        assert_eq!(slot.pin_count_of(1), 1);
        drop(accessor);
        assert_eq!(slot.pin_count_of(1), 0);
    }

    #[test]
    fn test_always_zero_mapping() {
        let mut translator = BlobTranslator::new(1, 16);
        translator.meta.mapping = CellIdMapping::AlwaysZero;
        let slot = CacheSlot::new(Box::new(translator), big_budget());
        let accessor = slot.pin_cells(&[7, 9000], timeout()).wait().unwrap();
        assert_eq!(accessor.pinned_len(), 1);
        assert!(accessor.get_cell(9000).is_some());
    }

    #[test]
    fn test_out_of_range_uid_rejected_before_pinning() {
        let slot = CacheSlot::new(Box::new(BlobTranslator::new(2, 16)), big_budget());
        let err = slot.pin_cells(&[5], timeout()).wait().err().unwrap();
        assert_eq!(err.kind(), vexdb_core::ErrorKind::OutOfRange);
        assert_eq!(slot.pin_count_of(0), 0);
        assert_eq!(slot.pin_count_of(1), 0);
    }

    #[test]
    fn test_concurrent_pins_load_once() {
        // S6: two concurrent pin_cells({5}) on a fresh slot; the translator
        // sees exactly one call including cid 5, both accessors see the same
        // payload, and the steady-state pin count is 2.
        let translator = BlobTranslator::new(8, 64);
        let calls = translator.calls.clone();
        let slot = CacheSlot::new(Box::new(translator), big_budget());
        let a = {
            let slot = Arc::clone(&slot);
            std::thread::spawn(move || slot.pin_cells(&[5], timeout()).wait().unwrap())
        };
        let b = {
            let slot = Arc::clone(&slot);
            std::thread::spawn(move || slot.pin_cells(&[5], timeout()).wait().unwrap())
        };
        let a = a.join().unwrap();
        let b = b.join().unwrap();

        assert_eq!(calls.count(), 1);
        assert_eq!(calls.requested_sets(), vec![vec![5]]);
        assert!(std::ptr::eq(
            a.get_cell(5).unwrap() as *const Blob,
            b.get_cell(5).unwrap() as *const Blob
        ));
        assert_eq!(slot.pin_count_of(5), 2);
        drop(a);
        drop(b);
        assert_eq!(slot.pin_count_of(5), 0);
    }

    #[test]
    fn test_need_load_order_does_not_matter() {
        // Permuting the uid order produces the same requested set and the
        // same outcome.
        for uids in [vec![0u64, 1, 2, 3], vec![3, 1, 0, 2], vec![2, 3, 1, 0]] {
            let translator = BlobTranslator::new(4, 16);
            let slot = CacheSlot::new(Box::new(translator), big_budget());
            let accessor = slot.pin_cells(&uids, timeout()).wait().unwrap();
            for uid in &uids {
                assert!(accessor.get_cell(*uid).is_some());
            }
            assert_eq!(slot.stats().snapshot().loads, 4);
        }
    }

    #[test]
    fn test_translator_failure_reaches_every_waiter() {
        let mut translator = BlobTranslator::new(4, 16);
        translator.fail = true;
        let budget = big_budget();
        let slot = CacheSlot::new(Box::new(translator), Arc::clone(&budget));
        let err = slot.pin_cells(&[0, 1], timeout()).wait().err().unwrap();
        assert_eq!(err.kind(), vexdb_core::ErrorKind::FileReadFailed);
        // the reservation was returned
        let (used, reserved) = budget.usage();
        assert!(used.is_zero() && reserved.is_zero());
        // a later pin retries and may fail again, independently
        assert!(slot.pin_cells(&[0], timeout()).wait().is_err());
    }

    #[test]
    fn test_reservation_failure_skips_translator() {
        let translator = BlobTranslator::new(2, 600);
        let budget = Arc::new(ResourceBudget::new(ResourceUsage::memory(100)));
        let slot = CacheSlot::new(Box::new(translator), budget);
        let err = slot
            .pin_cells(&[0], Duration::from_millis(20))
            .wait()
            .err()
            .unwrap();
        assert_eq!(err.kind(), vexdb_core::ErrorKind::InsufficientResource);
        // no get_cells was issued
        assert_eq!(slot.stats().snapshot().loads, 0);
        assert_eq!(slot.stats().snapshot().load_failures, 1);
    }

    #[test]
    fn test_overread_cells_are_published_and_evictable() {
        let mut translator = BlobTranslator::new(4, 16);
        translator.bonus = vec![3];
        let budget = big_budget();
        let slot = CacheSlot::new(Box::new(translator), Arc::clone(&budget));
        let accessor = slot.pin_cells(&[0], timeout()).wait().unwrap();
        // cell 3 arrived as a bonus: loaded, unpinned, evictable
        assert_eq!(slot.pin_count_of(3), 0);
        assert_eq!(budget.evictable_len(), 1);
        assert!(slot.manual_evict(3));
        drop(accessor);
    }

    #[test]
    fn test_missing_requested_cell_is_an_error() {
        struct Withholding(BlobTranslator);

        impl Translator for Withholding {
            type Cell = Blob;
            fn key(&self) -> &str {
                self.0.key()
            }
            fn num_cells(&self) -> usize {
                self.0.num_cells()
            }
            fn meta(&self) -> &Meta {
                self.0.meta()
            }
            fn estimated_byte_size_of_cell(&self, cid: CellId) -> ResourceUsage {
                self.0.estimated_byte_size_of_cell(cid)
            }
            fn get_cells(&self, cids: &[CellId]) -> Result<Vec<(CellId, Blob)>> {
                let mut out = self.0.get_cells(cids)?;
                out.retain(|(cid, _)| *cid != 1);
                Ok(out)
            }
        }

        let budget = big_budget();
        let slot = CacheSlot::new(
            Box::new(Withholding(BlobTranslator::new(4, 16))),
            Arc::clone(&budget),
        );
        let err = slot.pin_cells(&[0, 1], timeout()).wait().err().unwrap();
        assert_eq!(err.kind(), vexdb_core::ErrorKind::Unknown);
        // cell 0 landed and its share is accounted; cell 1's share returned
        let (used, reserved) = budget.usage();
        assert_eq!(used, ResourceUsage::memory(16));
        assert!(reserved.is_zero());
    }

    #[test]
    fn test_budget_invariant_under_load_and_eviction() {
        // P3: used + reserved never exceeds the limit when every load goes
        // through reservation.
        let translator = BlobTranslator::new(10, 100);
        let budget = Arc::new(ResourceBudget::new(ResourceUsage::memory(350)));
        let slot = CacheSlot::new(Box::new(translator), Arc::clone(&budget));
        for round in 0..10u64 {
            let accessor = slot
                .pin_cells(&[round % 10, (round + 1) % 10], timeout())
                .wait()
                .unwrap();
            let (used, reserved) = budget.usage();
            assert!(
                (used + reserved).fits_within(&budget.limit()),
                "round {}: {} + {} exceeds {}",
                round,
                used,
                reserved,
                budget.limit()
            );
            drop(accessor);
        }
    }

    #[test]
    fn test_pinned_cells_survive_budget_pressure() {
        // P4 at the slot level: a pinned cell is never evicted, later
        // reservations evict the unpinned ones instead.
        let translator = BlobTranslator::new(3, 100);
        let budget = Arc::new(ResourceBudget::new(ResourceUsage::memory(250)));
        let slot = CacheSlot::new(Box::new(translator), Arc::clone(&budget));
        let pinned = slot.pin_cells(&[0], timeout()).wait().unwrap();
        {
            let _tmp = slot.pin_cells(&[1], timeout()).wait().unwrap();
        }
        // loading cell 2 must evict cell 1, not cell 0
        let _third = slot.pin_cells(&[2], timeout()).wait().unwrap();
        assert!(pinned.get_cell(0).is_some());
        assert_eq!(slot.stats().snapshot().evictions, 1);
        assert_eq!(pinned.get_cell(0).unwrap().byte_size(), 100);
    }

    #[test]
    fn test_warmup_sync_loads_all_cells() {
        let mut translator = BlobTranslator::new(5, 8);
        translator.meta.warmup = WarmupPolicy::Sync;
        let slot = CacheSlot::new(Box::new(translator), big_budget());
        assert_eq!(slot.stats().snapshot().loads, 5);
        // warmup dropped its accessor: everything is evictable again
        assert!(slot.manual_evict_all());
        assert_eq!(slot.stats().snapshot().evictions, 5);
    }

    #[test]
    fn test_unawaited_request_starts_nothing() {
        let slot = CacheSlot::new(Box::new(BlobTranslator::new(4, 16)), big_budget());
        let request = slot.pin_cells(&[0, 1], timeout());
        drop(request);
        assert_eq!(slot.stats().snapshot().loads, 0);
        assert_eq!(slot.pin_count_of(0), 0);
    }

    #[test]
    fn test_requested_sets_are_deterministic() {
        let translator = BlobTranslator::new(6, 8);
        let calls = translator.calls.clone();
        let slot = CacheSlot::new(Box::new(translator), big_budget());
        let _a = slot.pin_cells(&[4, 2, 4, 2], timeout()).wait().unwrap();
        assert_eq!(calls.requested_sets(), vec![vec![2, 4]]);
    }

    #[test]
    fn test_pin_count_observable_across_threads() {
        // P1 at slot level with many threads over overlapping uid sets.
        let slot = CacheSlot::new(Box::new(BlobTranslator::new(4, 8)), big_budget());
        let loaded = Arc::new(AtomicU64::new(0));
        let mut handles = Vec::new();
        for t in 0..6u64 {
            let slot = Arc::clone(&slot);
            let loaded = Arc::clone(&loaded);
            handles.push(std::thread::spawn(move || {
                let accessor = slot
                    .pin_cells(&[t % 4, (t + 1) % 4], timeout())
                    .wait()
                    .unwrap();
                loaded.fetch_add(accessor.pinned_len() as u64, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        // each of the 4 cells was loaded exactly once despite 6 overlapping
        // pin sets
        assert_eq!(slot.stats().snapshot().loads, 4);
        for cid in 0..4 {
            assert_eq!(slot.pin_count_of(cid), 0);
        }
    }
}
