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

//! Index contracts consumed by the executor.
//!
//! Indexes are opaque collaborators: the executor only needs a handful of
//! narrow operations from each kind, and any of them may be absent for a
//! given field. Results are whole-column bitmaps that the executor caches
//! and slices per batch.

use vexdb_core::bitset::Bitset;
use vexdb_core::types::{OpType, ScalarValue};
use vexdb_core::Result;

/// Backend family of a scalar index. `Hybrid` and `Bitmap` cannot serve the
/// ARRAY element path; the dispatcher falls back to a data scan for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarIndexType {
    Sorted,
    Trie,
    Inverted,
    Bitmap,
    Hybrid,
}

/// Point / range index over one scalar field.
pub trait ScalarIndex: Send + Sync {
    /// Whole-column evaluation of `field OP value`.
    fn apply(&self, op: OpType, value: &ScalarValue) -> Result<Bitset>;

    fn index_type(&self) -> ScalarIndexType;

    /// Rows with a non-null value, over the rows the index covers.
    fn is_not_null(&self) -> Bitset;
}

/// Tokenized full-text index.
pub trait TextIndex: Send + Sync {
    fn match_query(&self, text: &str) -> Result<Bitset>;

    /// `slop` is the maximum token distance allowed between phrase terms.
    fn phrase_match_query(&self, text: &str, slop: u32) -> Result<Bitset>;

    fn is_not_null(&self) -> Bitset;
}

/// N-gram index over strings (or JSON string values at one path).
pub trait NgramIndex: Send + Sync {
    /// Evaluate a substring-family query. `Ok(None)` means the pattern
    /// cannot be served by n-grams and the caller must fall back.
    fn execute_query(&self, literal: &str, op: OpType) -> Result<Option<Bitset>>;

    fn is_not_null(&self) -> Bitset;
}

/// A primitive value the JSON-key index extracted at build time.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonInlineValue {
    Bool(bool),
    Int64(i64),
    Float(f32),
    Double(f64),
    Str(String),
}

/// One indexed row under a JSON pointer prefix. `value == None` marks a row
/// the index could not inline; the caller resolves it from the column.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonKeyEntry {
    pub row_id: u32,
    pub value: Option<JsonInlineValue>,
}

impl JsonKeyEntry {
    pub fn inline(row_id: u32, value: JsonInlineValue) -> Self {
        Self {
            row_id,
            value: Some(value),
        }
    }

    pub fn fallback(row_id: u32) -> Self {
        Self {
            row_id,
            value: None,
        }
    }
}

/// Index over the keys of a JSON column.
pub trait JsonKeyIndex: Send + Sync {
    /// Evaluate a row-level filter over every row indexed under `pointer`.
    ///
    /// The index allocates a zeroed bitmap of `active_count` bits, hands the
    /// matching entries to `filter` (possibly in several batches), and
    /// returns the bitmap. Rows never handed to the filter stay false.
    fn filter_by_path(
        &self,
        pointer: &str,
        active_count: usize,
        is_growing: bool,
        strong_consistency: bool,
        filter: &mut dyn FnMut(&[JsonKeyEntry], &mut Bitset),
    ) -> Result<Bitset>;
}
