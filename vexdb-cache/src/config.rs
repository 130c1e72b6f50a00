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

//! Cache configuration and counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resource::ResourceUsage;

/// Configuration of the segment cache budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Memory budget for loaded cells, in bytes.
    pub memory_limit_bytes: u64,

    /// Local-disk budget for loaded cells, in bytes.
    pub disk_limit_bytes: u64,

    /// Default timeout for budget reservation on the pin path.
    pub pin_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_limit_bytes: 1 << 30,
            disk_limit_bytes: 4 << 30,
            pin_timeout_ms: 100_000,
        }
    }
}

impl CacheConfig {
    pub fn limit(&self) -> ResourceUsage {
        ResourceUsage::new(self.memory_limit_bytes, self.disk_limit_bytes)
    }

    pub fn pin_timeout(&self) -> Duration {
        Duration::from_millis(self.pin_timeout_ms)
    }
}

/// Per-slot counters. Plain atomics, readable at any time; exporting them is
/// the caller's concern.
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Cells loaded through the Translator.
    pub loads: AtomicU64,
    /// Cells whose load resolved with an error.
    pub load_failures: AtomicU64,
    /// `set_cell` calls that found the cell already loaded (over-reads from
    /// concurrent bulk loads).
    pub duplicate_loads: AtomicU64,
    /// Cells unloaded by the budget's LRU walk or by manual eviction.
    pub evictions: AtomicU64,
}

/// A point-in-time copy of [`CacheStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    pub loads: u64,
    pub load_failures: u64,
    pub duplicate_loads: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn record_load(&self) {
        self.loads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_load_failure(&self) {
        self.load_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate_load(&self) {
        self.duplicate_loads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            loads: self.loads.load(Ordering::Relaxed),
            load_failures: self.load_failures.load(Ordering::Relaxed),
            duplicate_loads: self.duplicate_loads.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}
