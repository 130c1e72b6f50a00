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

//! Read-only chunked columns backed by the cell cache.
//!
//! A column is a sequence of [`Chunk`]s, each one a cache cell. The
//! executor never touches raw cells: [`ChunkedColumn::get_chunk`] returns a
//! [`PinWrapper`] whose pin keeps the chunk resident, and the bulk
//! accessors pin the chunks a row set touches exactly once per call.
//!
//! Bulk accessors that a column's data type cannot serve fail with
//! `Unsupported`.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as JsonValue;
use smallvec::SmallVec;

use vexdb_cache::{CacheSlot, CellId, CellPayload, PinWrapper};
use vexdb_core::bitset::Bitset;
use vexdb_core::types::{ArrayValue, DataType, VectorArrayValue};
use vexdb_core::{Error, Result};

// ============================================================================
// Chunk Storage
// ============================================================================

/// Typed storage of one chunk.
#[derive(Debug, Clone)]
pub enum ChunkData {
    Bool(Vec<bool>),
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Varchar(Vec<String>),
    Json(Vec<JsonValue>),
    Array(Vec<ArrayValue>),
    VectorArray(Vec<VectorArrayValue>),
}

impl ChunkData {
    pub fn len(&self) -> usize {
        match self {
            ChunkData::Bool(v) => v.len(),
            ChunkData::Int8(v) => v.len(),
            ChunkData::Int16(v) => v.len(),
            ChunkData::Int32(v) => v.len(),
            ChunkData::Int64(v) => v.len(),
            ChunkData::Float(v) => v.len(),
            ChunkData::Double(v) => v.len(),
            ChunkData::Varchar(v) => v.len(),
            ChunkData::Json(v) => v.len(),
            ChunkData::Array(v) => v.len(),
            ChunkData::VectorArray(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data_type(&self) -> DataType {
        match self {
            ChunkData::Bool(_) => DataType::Bool,
            ChunkData::Int8(_) => DataType::Int8,
            ChunkData::Int16(_) => DataType::Int16,
            ChunkData::Int32(_) => DataType::Int32,
            ChunkData::Int64(_) => DataType::Int64,
            ChunkData::Float(_) => DataType::Float,
            ChunkData::Double(_) => DataType::Double,
            ChunkData::Varchar(_) => DataType::Varchar,
            ChunkData::Json(_) => DataType::Json,
            ChunkData::Array(_) => DataType::Array,
            ChunkData::VectorArray(_) => DataType::VectorArray,
        }
    }

    fn byte_size(&self) -> usize {
        match self {
            ChunkData::Bool(v) => v.len(),
            ChunkData::Int8(v) => v.len(),
            ChunkData::Int16(v) => v.len() * 2,
            ChunkData::Int32(v) => v.len() * 4,
            ChunkData::Int64(v) => v.len() * 8,
            ChunkData::Float(v) => v.len() * 4,
            ChunkData::Double(v) => v.len() * 8,
            ChunkData::Varchar(v) => v.iter().map(|s| s.len() + 24).sum(),
            ChunkData::Json(v) => v.iter().map(json_byte_size).sum(),
            ChunkData::Array(v) => v
                .iter()
                .map(|a| a.values.len() * 16 + 24)
                .sum(),
            ChunkData::VectorArray(v) => v.iter().map(|a| a.data.len() * 4 + 16).sum(),
        }
    }
}

fn json_byte_size(v: &JsonValue) -> usize {
    match v {
        JsonValue::Null | JsonValue::Bool(_) => 8,
        JsonValue::Number(_) => 16,
        JsonValue::String(s) => s.len() + 24,
        JsonValue::Array(a) => 24 + a.iter().map(json_byte_size).sum::<usize>(),
        JsonValue::Object(o) => {
            24 + o
                .iter()
                .map(|(k, v)| k.len() + 24 + json_byte_size(v))
                .sum::<usize>()
        }
    }
}

/// One cached unit of a column: typed values plus an optional validity
/// bitset (`None` means every row is valid).
#[derive(Debug, Clone)]
pub struct Chunk {
    data: ChunkData,
    valid: Option<Bitset>,
}

impl Chunk {
    pub fn new(data: ChunkData, valid: Option<Bitset>) -> Result<Self> {
        if let Some(v) = &valid {
            if v.len() != data.len() {
                return Err(Error::InvalidParameter(format!(
                    "validity length {} does not match row count {}",
                    v.len(),
                    data.len()
                )));
            }
        }
        Ok(Self { data, valid })
    }

    pub fn num_rows(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &ChunkData {
        &self.data
    }

    pub fn valid(&self) -> Option<&Bitset> {
        self.valid.as_ref()
    }

    pub fn is_valid(&self, row: usize) -> bool {
        match &self.valid {
            Some(v) => v.get(row),
            None => true,
        }
    }

    pub fn str_at(&self, row: usize) -> Option<&str> {
        match &self.data {
            ChunkData::Varchar(v) => v.get(row).map(|s| s.as_str()),
            _ => None,
        }
    }

    pub fn json_at(&self, row: usize) -> Option<&JsonValue> {
        match &self.data {
            ChunkData::Json(v) => v.get(row),
            _ => None,
        }
    }

    pub fn array_at(&self, row: usize) -> Option<&ArrayValue> {
        match &self.data {
            ChunkData::Array(v) => v.get(row),
            _ => None,
        }
    }

    pub fn vector_array_at(&self, row: usize) -> Option<&VectorArrayValue> {
        match &self.data {
            ChunkData::VectorArray(v) => v.get(row),
            _ => None,
        }
    }

    pub fn primitive_at(&self, row: usize) -> Option<PrimitiveValue> {
        Some(match &self.data {
            ChunkData::Bool(v) => PrimitiveValue::Bool(*v.get(row)?),
            ChunkData::Int8(v) => PrimitiveValue::Int8(*v.get(row)?),
            ChunkData::Int16(v) => PrimitiveValue::Int16(*v.get(row)?),
            ChunkData::Int32(v) => PrimitiveValue::Int32(*v.get(row)?),
            ChunkData::Int64(v) => PrimitiveValue::Int64(*v.get(row)?),
            ChunkData::Float(v) => PrimitiveValue::Float(*v.get(row)?),
            ChunkData::Double(v) => PrimitiveValue::Double(*v.get(row)?),
            _ => return None,
        })
    }
}

impl CellPayload for Chunk {
    fn byte_size(&self) -> usize {
        self.data.byte_size() + self.valid.as_ref().map_or(0, |v| v.len() / 8)
    }
}

/// A fixed-width value read out of a chunk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PrimitiveValue {
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float(f32),
    Double(f64),
}

impl PrimitiveValue {
    /// Integral view, when the value is an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PrimitiveValue::Int8(v) => Some(*v as i64),
            PrimitiveValue::Int16(v) => Some(*v as i64),
            PrimitiveValue::Int32(v) => Some(*v as i64),
            PrimitiveValue::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view with widening.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PrimitiveValue::Bool(_) => None,
            PrimitiveValue::Float(v) => Some(*v as f64),
            PrimitiveValue::Double(v) => Some(*v),
            other => other.as_i64().map(|v| v as f64),
        }
    }
}

/// A borrowed value of any column type, for the generic bulk accessor.
#[derive(Debug, Clone, Copy)]
pub enum ValueRef<'a> {
    Primitive(PrimitiveValue),
    String(&'a str),
    Json(&'a JsonValue),
    Array(&'a ArrayValue),
    VectorArray(&'a VectorArrayValue),
}

// ============================================================================
// Column Interface
// ============================================================================

/// Read-only column API. Every accessor pins the chunks it touches for the
/// duration of the call (or, for [`Self::get_chunk`], for the lifetime of
/// the returned wrapper).
///
/// Bulk methods iterate externally supplied global row offsets and invoke
/// the callback with the position `i` of each offset in the input slice.
/// `bulk_raw_string_at` and `bulk_is_valid` also accept `None` to mean
/// "iterate all rows", in which case `i` is the row offset itself.
pub trait ChunkedColumn: Send + Sync {
    fn data_type(&self) -> DataType;

    fn is_nullable(&self) -> bool;

    fn num_rows(&self) -> usize;

    fn num_chunks(&self) -> usize;

    fn chunk_row_nums(&self, chunk_id: usize) -> Result<usize>;

    fn num_rows_until_chunk(&self, chunk_id: usize) -> Result<usize>;

    /// Pin and return one chunk. The chunk stays resident while the wrapper
    /// lives.
    fn get_chunk(&self, chunk_id: usize) -> Result<PinWrapper<Arc<Chunk>>>;

    /// Convert global row offsets to `(chunk_id, offset_in_chunk)` pairs.
    fn get_chunk_ids_by_offsets(&self, offsets: &[i64]) -> Result<Vec<(usize, usize)>>;

    /// `fn(value, i)` over any column type.
    fn bulk_value_at(
        &self,
        _offsets: &[i64],
        _f: &mut dyn FnMut(ValueRef<'_>, usize),
    ) -> Result<()> {
        Err(Error::Unsupported(
            "bulk_value_at not supported for this column type".into(),
        ))
    }

    /// `fn(value, i)` over fixed-width columns.
    fn bulk_primitive_value_at(
        &self,
        _offsets: &[i64],
        _f: &mut dyn FnMut(PrimitiveValue, usize),
    ) -> Result<()> {
        Err(Error::Unsupported(
            "bulk_primitive_value_at only supported for fixed-width columns".into(),
        ))
    }

    /// `fn(row_data, i)` over vector-array columns, flattened per row.
    fn bulk_vector_value_at(
        &self,
        _offsets: &[i64],
        _f: &mut dyn FnMut(&[f32], usize),
    ) -> Result<()> {
        Err(Error::Unsupported(
            "bulk_vector_value_at only supported for vector columns".into(),
        ))
    }

    /// `fn(value, i, is_valid)` over string columns. `None` offsets iterate
    /// every row.
    fn bulk_raw_string_at(
        &self,
        _offsets: Option<&[i64]>,
        _f: &mut dyn FnMut(&str, usize, bool),
    ) -> Result<()> {
        Err(Error::Unsupported(
            "bulk_raw_string_at only supported for variable-length columns".into(),
        ))
    }

    /// `fn(doc, i, is_valid)` over JSON columns.
    fn bulk_raw_json_at(
        &self,
        _offsets: &[i64],
        _f: &mut dyn FnMut(&JsonValue, usize, bool),
    ) -> Result<()> {
        Err(Error::Unsupported(
            "bulk_raw_json_at only supported for JSON columns".into(),
        ))
    }

    /// `fn(array, i, is_valid)` over ARRAY columns.
    fn bulk_array_at(
        &self,
        _offsets: &[i64],
        _f: &mut dyn FnMut(&ArrayValue, usize, bool),
    ) -> Result<()> {
        Err(Error::Unsupported(
            "bulk_array_at only supported for array columns".into(),
        ))
    }

    /// `fn(row, i, is_valid)` over VECTOR_ARRAY columns.
    fn bulk_vector_array_at(
        &self,
        _offsets: &[i64],
        _f: &mut dyn FnMut(&VectorArrayValue, usize, bool),
    ) -> Result<()> {
        Err(Error::Unsupported(
            "bulk_vector_array_at only supported for vector-array columns".into(),
        ))
    }

    /// `fn(is_valid, i)`. `None` offsets iterate every row.
    fn bulk_is_valid(
        &self,
        offsets: Option<&[i64]>,
        f: &mut dyn FnMut(bool, usize),
    ) -> Result<()>;
}

// ============================================================================
// Cache-Backed Column
// ============================================================================

/// A [`ChunkedColumn`] whose chunks live in a [`CacheSlot`]. Chunk `i` is
/// cell `i`; the slot's translator materializes chunks on demand.
pub struct CachedColumn {
    data_type: DataType,
    nullable: bool,
    slot: Arc<CacheSlot<Chunk>>,
    row_counts: Vec<usize>,
    /// `rows_until[i]` = rows in chunks `[0, i)`; one extra entry with the
    /// total.
    rows_until: Vec<usize>,
    pin_timeout: Duration,
}

impl CachedColumn {
    pub fn new(
        data_type: DataType,
        nullable: bool,
        slot: Arc<CacheSlot<Chunk>>,
        row_counts: Vec<usize>,
        pin_timeout: Duration,
    ) -> Result<Self> {
        if row_counts.len() != slot.num_cells() {
            return Err(Error::InvalidParameter(format!(
                "column has {} chunks but slot has {} cells",
                row_counts.len(),
                slot.num_cells()
            )));
        }
        let mut rows_until = Vec::with_capacity(row_counts.len() + 1);
        let mut acc = 0usize;
        rows_until.push(0);
        for &n in &row_counts {
            acc += n;
            rows_until.push(acc);
        }
        Ok(Self {
            data_type,
            nullable,
            slot,
            row_counts,
            rows_until,
            pin_timeout,
        })
    }

    pub fn slot(&self) -> &Arc<CacheSlot<Chunk>> {
        &self.slot
    }

    /// Drop every unpinned loaded chunk of this column.
    pub fn manual_evict_cache(&self) -> bool {
        self.slot.manual_evict_all()
    }

    fn locate(&self, offset: i64) -> Result<(usize, usize)> {
        if offset < 0 || offset as usize >= self.num_rows() {
            return Err(Error::OutOfRange(format!(
                "row offset {} out of range, column has {} rows",
                offset,
                self.num_rows()
            )));
        }
        let offset = offset as usize;
        // rows_until is sorted; partition_point finds the containing chunk.
        let chunk = self.rows_until.partition_point(|&r| r <= offset) - 1;
        Ok((chunk, offset - self.rows_until[chunk]))
    }

    /// Pin the set of chunks the given offsets touch and run `f` once per
    /// offset, in input order.
    fn for_each_pinned(
        &self,
        offsets: &[i64],
        mut f: impl FnMut(&Chunk, usize, usize),
    ) -> Result<()> {
        let mut located = Vec::with_capacity(offsets.len());
        let mut uids: SmallVec<[u64; 8]> = SmallVec::new();
        for &off in offsets {
            let (chunk, in_chunk) = self.locate(off)?;
            if !uids.contains(&(chunk as u64)) {
                uids.push(chunk as u64);
            }
            located.push((chunk, in_chunk));
        }
        let accessor = self.slot.pin_cells(&uids, self.pin_timeout).wait()?;
        for (i, (chunk_id, in_chunk)) in located.into_iter().enumerate() {
            let chunk = accessor.get_ith_cell(chunk_id as CellId).ok_or_else(|| {
                Error::Unknown(format!("chunk {} missing from pin set", chunk_id))
            })?;
            f(chunk, in_chunk, i);
        }
        Ok(())
    }

    /// Pin all chunks and run `f` for every row in order.
    fn for_all_rows_pinned(&self, mut f: impl FnMut(&Chunk, usize, usize)) -> Result<()> {
        let accessor = self.slot.pin_all_cells(self.pin_timeout).wait()?;
        let mut row = 0usize;
        for chunk_id in 0..self.num_chunks() {
            let chunk = accessor.get_ith_cell(chunk_id as CellId).ok_or_else(|| {
                Error::Unknown(format!("chunk {} missing from pin set", chunk_id))
            })?;
            for in_chunk in 0..chunk.num_rows() {
                f(chunk, in_chunk, row);
                row += 1;
            }
        }
        Ok(())
    }

    fn value_ref_at<'a>(&self, chunk: &'a Chunk, row: usize) -> Option<ValueRef<'a>> {
        match chunk.data() {
            ChunkData::Varchar(v) => v.get(row).map(|s| ValueRef::String(s.as_str())),
            ChunkData::Json(v) => v.get(row).map(ValueRef::Json),
            ChunkData::Array(v) => v.get(row).map(ValueRef::Array),
            ChunkData::VectorArray(v) => v.get(row).map(ValueRef::VectorArray),
            _ => chunk.primitive_at(row).map(ValueRef::Primitive),
        }
    }
}

impl ChunkedColumn for CachedColumn {
    fn data_type(&self) -> DataType {
        self.data_type
    }

    fn is_nullable(&self) -> bool {
        self.nullable
    }

    fn num_rows(&self) -> usize {
        *self.rows_until.last().unwrap_or(&0)
    }

    fn num_chunks(&self) -> usize {
        self.row_counts.len()
    }

    fn chunk_row_nums(&self, chunk_id: usize) -> Result<usize> {
        self.row_counts.get(chunk_id).copied().ok_or_else(|| {
            Error::OutOfRange(format!(
                "chunk {} out of range, column has {} chunks",
                chunk_id,
                self.num_chunks()
            ))
        })
    }

    fn num_rows_until_chunk(&self, chunk_id: usize) -> Result<usize> {
        self.rows_until.get(chunk_id).copied().ok_or_else(|| {
            Error::OutOfRange(format!(
                "chunk {} out of range, column has {} chunks",
                chunk_id,
                self.num_chunks()
            ))
        })
    }

    fn get_chunk(&self, chunk_id: usize) -> Result<PinWrapper<Arc<Chunk>>> {
        if chunk_id >= self.num_chunks() {
            return Err(Error::OutOfRange(format!(
                "chunk {} out of range, column has {} chunks",
                chunk_id,
                self.num_chunks()
            )));
        }
        let accessor = self
            .slot
            .pin_cells(&[chunk_id as u64], self.pin_timeout)
            .wait()?;
        let chunk = accessor
            .get_ith_cell_shared(chunk_id as CellId)
            .ok_or_else(|| Error::Unknown(format!("chunk {} missing after pin", chunk_id)))?;
        Ok(PinWrapper::new(accessor, chunk))
    }

    fn get_chunk_ids_by_offsets(&self, offsets: &[i64]) -> Result<Vec<(usize, usize)>> {
        offsets.iter().map(|&off| self.locate(off)).collect()
    }

    fn bulk_value_at(
        &self,
        offsets: &[i64],
        f: &mut dyn FnMut(ValueRef<'_>, usize),
    ) -> Result<()> {
        let mut missing = None;
        self.for_each_pinned(offsets, |chunk, row, i| match self.value_ref_at(chunk, row) {
            Some(v) => f(v, i),
            None => missing = Some(row),
        })?;
        match missing {
            Some(row) => Err(Error::OutOfRange(format!("row {} missing in chunk", row))),
            None => Ok(()),
        }
    }

    fn bulk_primitive_value_at(
        &self,
        offsets: &[i64],
        f: &mut dyn FnMut(PrimitiveValue, usize),
    ) -> Result<()> {
        if !self.data_type.is_primitive() {
            return Err(Error::Unsupported(format!(
                "bulk_primitive_value_at on {} column",
                self.data_type
            )));
        }
        self.for_each_pinned(offsets, |chunk, row, i| {
            if let Some(v) = chunk.primitive_at(row) {
                f(v, i);
            }
        })
    }

    fn bulk_vector_value_at(
        &self,
        offsets: &[i64],
        f: &mut dyn FnMut(&[f32], usize),
    ) -> Result<()> {
        if self.data_type != DataType::VectorArray {
            return Err(Error::Unsupported(format!(
                "bulk_vector_value_at on {} column",
                self.data_type
            )));
        }
        self.for_each_pinned(offsets, |chunk, row, i| {
            if let Some(v) = chunk.vector_array_at(row) {
                f(&v.data, i);
            }
        })
    }

    fn bulk_raw_string_at(
        &self,
        offsets: Option<&[i64]>,
        f: &mut dyn FnMut(&str, usize, bool),
    ) -> Result<()> {
        if self.data_type != DataType::Varchar {
            return Err(Error::Unsupported(format!(
                "bulk_raw_string_at on {} column",
                self.data_type
            )));
        }
        match offsets {
            Some(offsets) => self.for_each_pinned(offsets, |chunk, row, i| {
                if let Some(s) = chunk.str_at(row) {
                    f(s, i, chunk.is_valid(row));
                }
            }),
            None => self.for_all_rows_pinned(|chunk, row, i| {
                if let Some(s) = chunk.str_at(row) {
                    f(s, i, chunk.is_valid(row));
                }
            }),
        }
    }

    fn bulk_raw_json_at(
        &self,
        offsets: &[i64],
        f: &mut dyn FnMut(&JsonValue, usize, bool),
    ) -> Result<()> {
        if self.data_type != DataType::Json {
            return Err(Error::Unsupported(format!(
                "bulk_raw_json_at on {} column",
                self.data_type
            )));
        }
        self.for_each_pinned(offsets, |chunk, row, i| {
            if let Some(doc) = chunk.json_at(row) {
                f(doc, i, chunk.is_valid(row));
            }
        })
    }

    fn bulk_array_at(
        &self,
        offsets: &[i64],
        f: &mut dyn FnMut(&ArrayValue, usize, bool),
    ) -> Result<()> {
        if self.data_type != DataType::Array {
            return Err(Error::Unsupported(format!(
                "bulk_array_at on {} column",
                self.data_type
            )));
        }
        self.for_each_pinned(offsets, |chunk, row, i| {
            if let Some(a) = chunk.array_at(row) {
                f(a, i, chunk.is_valid(row));
            }
        })
    }

    fn bulk_vector_array_at(
        &self,
        offsets: &[i64],
        f: &mut dyn FnMut(&VectorArrayValue, usize, bool),
    ) -> Result<()> {
        if self.data_type != DataType::VectorArray {
            return Err(Error::Unsupported(format!(
                "bulk_vector_array_at on {} column",
                self.data_type
            )));
        }
        self.for_each_pinned(offsets, |chunk, row, i| {
            if let Some(v) = chunk.vector_array_at(row) {
                f(v, i, chunk.is_valid(row));
            }
        })
    }

    fn bulk_is_valid(
        &self,
        offsets: Option<&[i64]>,
        f: &mut dyn FnMut(bool, usize),
    ) -> Result<()> {
        match offsets {
            Some(offsets) => {
                self.for_each_pinned(offsets, |chunk, row, i| f(chunk.is_valid(row), i))
            }
            None => self.for_all_rows_pinned(|chunk, row, i| f(chunk.is_valid(row), i)),
        }
    }
}
