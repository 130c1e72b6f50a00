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

//! Data-scan kernels.
//!
//! Each kernel evaluates one operator over the rows of one pinned chunk and
//! writes match bits at the mapped output positions. The caller
//! pre-initializes the result to all-false and validity to all-true; rows
//! gated off by the upstream bitmap input are left untouched.
//!
//! Null rows resolve before the upstream gate in every kernel: a null row
//! reports `result = false, valid = false` even when its gate bit is off,
//! so validity masks stay consistent when they are AND-combined across
//! predicates.

use serde_json::Value as JsonValue;

use vexdb_core::bitset::Bitset;
use vexdb_core::types::{
    compare_json_ordered, compare_scalar, compare_scalar_values, OpType, ScalarValue,
};
use vexdb_core::{Error, Result};

use crate::column::{Chunk, ChunkData};
use crate::match_pattern::{match_str, PatternMatcher};

/// Mapping from chunk rows to output bit positions.
pub(crate) enum RowMap<'a> {
    /// Chunk rows `[chunk_start, chunk_start + count)` map to output bits
    /// `[out_start, out_start + count)`.
    Seq {
        chunk_start: usize,
        out_start: usize,
        count: usize,
    },
    /// Explicit `(out_idx, chunk_row)` pairs (offset-input scans).
    Pairs(&'a [(usize, usize)]),
}

impl RowMap<'_> {
    fn for_each(&self, mut f: impl FnMut(usize, usize)) {
        match self {
            RowMap::Seq {
                chunk_start,
                out_start,
                count,
            } => {
                for k in 0..*count {
                    f(out_start + k, chunk_start + k);
                }
            }
            RowMap::Pairs(pairs) => {
                for &(out_idx, row) in *pairs {
                    f(out_idx, row);
                }
            }
        }
    }
}

/// Output bitmaps of the running batch.
pub(crate) struct ScanOutput<'a> {
    pub res: &'a mut Bitset,
    pub valid: &'a mut Bitset,
    /// Upstream selection; bit position matches the output position.
    pub bitmap_input: Option<&'a Bitset>,
}

impl ScanOutput<'_> {
    #[inline]
    fn gated_off(&self, out_idx: usize) -> bool {
        matches!(self.bitmap_input, Some(b) if !b.get(out_idx))
    }

    #[inline]
    fn mark_null(&mut self, out_idx: usize) {
        self.res.set(out_idx, false);
        self.valid.set(out_idx, false);
    }
}

// ============================================================================
// Primitive Scan
// ============================================================================

/// Typed comparator over a fixed-width chunk. The literal must already be
/// normalized to the column's domain.
pub(crate) fn scan_primitive(
    op: OpType,
    literal: &ScalarValue,
    chunk: &Chunk,
    rows: RowMap<'_>,
    out: &mut ScanOutput<'_>,
) -> Result<()> {
    if !op.is_range() {
        return Err(Error::OpTypeInvalid(format!(
            "operator {} not valid for primitive scan",
            op
        )));
    }
    macro_rules! int_scan {
        ($vals:expr) => {{
            let lit = literal.require_i64()?;
            scan_rows(chunk, rows, out, |row| {
                compare_scalar(op, &($vals[row] as i64), &lit)
            });
        }};
    }
    match chunk.data() {
        ChunkData::Bool(vals) => {
            let lit = literal.as_bool().ok_or_else(|| {
                Error::DataTypeInvalid("bool column compared with non-bool literal".into())
            })?;
            scan_rows(chunk, rows, out, |row| compare_scalar(op, &vals[row], &lit));
        }
        ChunkData::Int8(vals) => int_scan!(vals),
        ChunkData::Int16(vals) => int_scan!(vals),
        ChunkData::Int32(vals) => int_scan!(vals),
        ChunkData::Int64(vals) => int_scan!(vals),
        ChunkData::Float(vals) => {
            let lit = literal.as_f64().ok_or_else(|| {
                Error::DataTypeInvalid("float column compared with non-numeric literal".into())
            })?;
            scan_rows(chunk, rows, out, |row| {
                compare_scalar(op, &(vals[row] as f64), &lit)
            });
        }
        ChunkData::Double(vals) => {
            let lit = literal.as_f64().ok_or_else(|| {
                Error::DataTypeInvalid("double column compared with non-numeric literal".into())
            })?;
            scan_rows(chunk, rows, out, |row| compare_scalar(op, &vals[row], &lit));
        }
        other => {
            return Err(Error::DataTypeInvalid(format!(
                "primitive scan over {} chunk",
                other.data_type()
            )))
        }
    }
    Ok(())
}

/// Shared row loop for the primitive/string family: nulls resolve before
/// the upstream gate.
fn scan_rows(
    chunk: &Chunk,
    rows: RowMap<'_>,
    out: &mut ScanOutput<'_>,
    mut eval: impl FnMut(usize) -> bool,
) {
    rows.for_each(|out_idx, row| {
        if !chunk.is_valid(row) {
            out.mark_null(out_idx);
            return;
        }
        if out.gated_off(out_idx) {
            return;
        }
        out.res.set(out_idx, eval(row));
    });
}

// ============================================================================
// String Scan
// ============================================================================

pub(crate) fn scan_string(
    op: OpType,
    literal: &ScalarValue,
    matcher: Option<&PatternMatcher>,
    chunk: &Chunk,
    rows: RowMap<'_>,
    out: &mut ScanOutput<'_>,
) -> Result<()> {
    let vals = match chunk.data() {
        ChunkData::Varchar(vals) => vals,
        other => {
            return Err(Error::DataTypeInvalid(format!(
                "string scan over {} chunk",
                other.data_type()
            )))
        }
    };
    let lit = literal.require_str()?;
    match op {
        _ if op.is_range() => {
            scan_rows(chunk, rows, out, |row| {
                compare_scalar(op, &vals[row].as_str(), &lit)
            });
        }
        OpType::PrefixMatch | OpType::PostfixMatch | OpType::InnerMatch => {
            scan_rows(chunk, rows, out, |row| match_str(&vals[row], lit, op));
        }
        OpType::Match => {
            let matcher = matcher.ok_or_else(|| {
                Error::Unknown("match operator executed without a compiled pattern".into())
            })?;
            scan_rows(chunk, rows, out, |row| matcher.matches(&vals[row]));
        }
        other => {
            return Err(Error::OpTypeInvalid(format!(
                "operator {} not valid for string scan",
                other
            )))
        }
    }
    Ok(())
}

// ============================================================================
// Array Scan
// ============================================================================

/// ARRAY rows resolve to the element at `nested_index` when set, otherwise
/// to the whole array. Whole-array comparison supports deep equality only.
pub(crate) fn scan_array(
    op: OpType,
    literal: &ScalarValue,
    nested_index: Option<usize>,
    matcher: Option<&PatternMatcher>,
    chunk: &Chunk,
    rows: RowMap<'_>,
    out: &mut ScanOutput<'_>,
) -> Result<()> {
    let vals = match chunk.data() {
        ChunkData::Array(vals) => vals,
        other => {
            return Err(Error::DataTypeInvalid(format!(
                "array scan over {} chunk",
                other.data_type()
            )))
        }
    };
    if !op.is_range() && !op.is_like_family() {
        return Err(Error::OpTypeInvalid(format!(
            "operator {} not valid for array scan",
            op
        )));
    }
    rows.for_each(|out_idx, row| {
        if !chunk.is_valid(row) {
            out.mark_null(out_idx);
            return;
        }
        if out.gated_off(out_idx) {
            return;
        }
        let arr = &vals[row];
        let hit = match nested_index {
            Some(idx) => match arr.get(idx) {
                Some(elem) => compare_element(elem, literal, op, matcher),
                None => false,
            },
            None => match (literal, op) {
                (ScalarValue::Array(lit), OpType::Equal) => arr.is_same_array(lit),
                (ScalarValue::Array(lit), OpType::NotEqual) => !arr.is_same_array(lit),
                _ => false,
            },
        };
        out.res.set(out_idx, hit);
    });
    Ok(())
}

fn compare_element(
    elem: &ScalarValue,
    literal: &ScalarValue,
    op: OpType,
    matcher: Option<&PatternMatcher>,
) -> bool {
    if op.is_range() {
        return compare_scalar_values(elem, literal, op);
    }
    match (elem.as_str(), literal.as_str()) {
        (Some(value), Some(lit)) => match op {
            OpType::Match => matcher.map_or(false, |m| m.matches(value)),
            _ => match_str(value, lit, op),
        },
        _ => false,
    }
}

// ============================================================================
// JSON Scan
// ============================================================================

/// Resolve `pointer` at each row and apply the operator. A failed lookup is
/// false for every operator except `NotEqual` (null-as-distinct).
pub(crate) fn scan_json(
    op: OpType,
    literal: &ScalarValue,
    pointer: &str,
    matcher: Option<&PatternMatcher>,
    chunk: &Chunk,
    rows: RowMap<'_>,
    out: &mut ScanOutput<'_>,
) -> Result<()> {
    let vals = match chunk.data() {
        ChunkData::Json(vals) => vals,
        other => {
            return Err(Error::DataTypeInvalid(format!(
                "json scan over {} chunk",
                other.data_type()
            )))
        }
    };
    if !op.is_range() && !op.is_like_family() {
        return Err(Error::OpTypeInvalid(format!(
            "operator {} not valid for json scan",
            op
        )));
    }
    rows.for_each(|out_idx, row| {
        if !chunk.is_valid(row) {
            out.mark_null(out_idx);
            return;
        }
        if out.gated_off(out_idx) {
            return;
        }
        let resolved = resolve_pointer(&vals[row], pointer);
        out.res
            .set(out_idx, eval_json(resolved, literal, op, matcher));
    });
    Ok(())
}

/// Shared JSON evaluation for the scan kernel and the index fallback path.
pub(crate) fn eval_json(
    resolved: Option<&JsonValue>,
    literal: &ScalarValue,
    op: OpType,
    matcher: Option<&PatternMatcher>,
) -> bool {
    if op.is_range() {
        return compare_json_ordered(resolved, literal, op);
    }
    match (resolved.and_then(|v| v.as_str()), literal.as_str()) {
        (Some(value), Some(lit)) => match op {
            OpType::Match => matcher.map_or(false, |m| m.matches(value)),
            _ => match_str(value, lit, op),
        },
        _ => false,
    }
}

pub(crate) fn resolve_pointer<'a>(doc: &'a JsonValue, pointer: &str) -> Option<&'a JsonValue> {
    if pointer.is_empty() {
        Some(doc)
    } else {
        doc.pointer(pointer)
    }
}
