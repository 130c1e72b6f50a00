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

//! VexDB Unary Predicate Executor
//!
//! Evaluates `column OP literal` over row batches of a segment, producing a
//! match bitmap and a validity bitmap per batch. Every byte of column data
//! is read through pinned cache accessors on [`column::ChunkedColumn`], so
//! scans and cache residency share one accounting path.
//!
//! ## Dispatch
//!
//! For each predicate the executor picks the cheapest applicable strategy,
//! in order:
//!
//! 1. full-text / phrase match through a text index,
//! 2. n-gram index for the substring-match family (the index may decline),
//! 3. scalar or JSON-key index scan,
//! 4. brute-force data scan over the column's chunks.
//!
//! A per-row offset input (an upstream selection vector) forces the data
//! scan; index-backed results are materialized once for the whole column
//! and sliced per batch.

pub mod column;
pub mod index;
pub(crate) mod kernels;
pub mod match_pattern;
pub mod unary;
pub(crate) mod value_arg;

pub use column::{CachedColumn, Chunk, ChunkData, ChunkedColumn, PrimitiveValue, ValueRef};
pub use index::{
    JsonInlineValue, JsonKeyEntry, JsonKeyIndex, NgramIndex, ScalarIndex, ScalarIndexType,
    TextIndex,
};
pub use match_pattern::PatternMatcher;
pub use unary::{EvalContext, FilterBatch, SegmentKind, UnaryFilterExecutor, UnaryFilterParams};
