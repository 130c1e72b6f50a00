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

//! The pluggable loader contract.
//!
//! A [`Translator`] knows how a column's cells are produced: how many there
//! are, what they are expected to cost, and how to fetch a batch of them.
//! The cache treats it as opaque; everything behind it (object storage,
//! local files, in-memory builders) is the translator's business.

use serde::{Deserialize, Serialize};

use vexdb_core::Result;

use crate::cell::CellPayload;
use crate::resource::ResourceUsage;

/// Dense cell index within a slot, `[0, num_cells)`.
pub type CellId = u32;

/// User-visible identifier mapped onto cells by the slot.
pub type Uid = u64;

/// Where a slot's cells materialize, for log fields and capacity planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageKind {
    Memory,
    Disk,
    Hybrid,
}

/// Whether a slot loads its cells eagerly at construction.
///
/// Unrecognized configuration values deserialize as `Disable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String")]
pub enum WarmupPolicy {
    #[default]
    Disable,
    Sync,
}

impl From<String> for WarmupPolicy {
    fn from(s: String) -> Self {
        match s.as_str() {
            "sync" | "Sync" => WarmupPolicy::Sync,
            _ => WarmupPolicy::Disable,
        }
    }
}

/// How user identifiers map onto cell ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellIdMapping {
    /// `uid == cid`.
    Identical,
    /// Single-cell slot: every uid maps to cell 0.
    AlwaysZero,
    /// The translator defines the mapping via [`Translator::cell_id_of`].
    Custom,
}

/// Static description of a slot, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Meta {
    pub storage_kind: StorageKind,
    pub warmup: WarmupPolicy,
    pub mapping: CellIdMapping,
}

impl Meta {
    pub fn new(storage_kind: StorageKind, warmup: WarmupPolicy, mapping: CellIdMapping) -> Self {
        Self {
            storage_kind,
            warmup,
            mapping,
        }
    }
}

/// Bulk cell loader behind a [`crate::CacheSlot`].
///
/// `get_cells` may return cells beyond those requested (over-reading for
/// batching is fine) but must deliver every requested cid exactly once and
/// must not return duplicates.
pub trait Translator: Send + Sync {
    type Cell: CellPayload;

    /// Slot identity for logs and error messages.
    fn key(&self) -> &str;

    /// Fixed after construction.
    fn num_cells(&self) -> usize;

    fn meta(&self) -> &Meta;

    /// Pre-reservation estimate; may over- or under-estimate the real
    /// payload size.
    fn estimated_byte_size_of_cell(&self, cid: CellId) -> ResourceUsage;

    /// Required when `meta().mapping == CellIdMapping::Custom`; the default
    /// is the identity mapping.
    fn cell_id_of(&self, uid: Uid) -> CellId {
        uid as CellId
    }

    /// Bulk load. May block on I/O; the cache never holds a lock across
    /// this call.
    fn get_cells(&self, cids: &[CellId]) -> Result<Vec<(CellId, Self::Cell)>>;
}
