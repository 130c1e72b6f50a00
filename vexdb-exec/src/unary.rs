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

//! The unary range / match filter executor.
//!
//! Evaluates `column OP literal` batch by batch, producing a match bitmap
//! and a validity bitmap per batch. Strategy selection per §dispatch order:
//! text index, n-gram index (which may decline), scalar / JSON-key index,
//! then the brute-force data scan. A per-row offset input forces the data
//! scan.
//!
//! Index-backed paths materialize one whole-column bitmap on first use and
//! slice it on every later batch; that cached state lives on the executor
//! and dies with it (one executor per expression per plan execution, used
//! single-threaded).

use std::collections::BTreeMap;
use std::sync::Arc;

use smallvec::SmallVec;
use tracing::debug;

use vexdb_core::bitset::Bitset;
use vexdb_core::types::{compare_scalar, DataType, OpType, ScalarValue};
use vexdb_core::{Error, Result};

use crate::column::{Chunk, ChunkData, ChunkedColumn};
use crate::index::{
    JsonInlineValue, JsonKeyIndex, NgramIndex, ScalarIndex, ScalarIndexType, TextIndex,
};
use crate::kernels::{
    eval_json, resolve_pointer, scan_array, scan_json, scan_primitive, scan_string, RowMap,
    ScanOutput,
};
use crate::match_pattern::PatternMatcher;
use crate::value_arg::{normalize_literal, precheck_overflow, OverflowShortCircuit};

const DEFAULT_BATCH_SIZE: usize = 8192;

/// Whether the segment still receives rows. Growing segments may have
/// indexes that trail the active row count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Growing,
    Sealed,
}

/// Construction parameters of one unary filter expression.
pub struct UnaryFilterParams {
    pub column: Arc<dyn ChunkedColumn>,
    pub op: OpType,
    pub literal: ScalarValue,
    /// JSON path segments below the column root; for ARRAY columns a single
    /// decimal element index.
    pub nested_path: Vec<String>,
    /// Phrase-match slop, validated against `[0, u32::MAX]`.
    pub slop: i64,
    pub batch_size: usize,
    /// Logically visible rows; defaults to the column's row count.
    pub active_count: usize,
    pub segment: SegmentKind,
    pub strong_consistency: bool,
    /// Element type of ARRAY columns, when known.
    pub element_type: Option<DataType>,
    pub scalar_index: Option<Arc<dyn ScalarIndex>>,
    pub text_index: Option<Arc<dyn TextIndex>>,
    pub ngram_index: Option<Arc<dyn NgramIndex>>,
    pub json_key_index: Option<Arc<dyn JsonKeyIndex>>,
}

impl UnaryFilterParams {
    pub fn new(column: Arc<dyn ChunkedColumn>, op: OpType, literal: ScalarValue) -> Self {
        let active_count = column.num_rows();
        Self {
            column,
            op,
            literal,
            nested_path: Vec::new(),
            slop: 0,
            batch_size: DEFAULT_BATCH_SIZE,
            active_count,
            segment: SegmentKind::Sealed,
            strong_consistency: false,
            element_type: None,
            scalar_index: None,
            text_index: None,
            ngram_index: None,
            json_key_index: None,
        }
    }

    pub fn nested_path(mut self, path: Vec<String>) -> Self {
        self.nested_path = path;
        self
    }

    pub fn slop(mut self, slop: i64) -> Self {
        self.slop = slop;
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn active_count(mut self, active_count: usize) -> Self {
        self.active_count = active_count;
        self
    }

    pub fn growing(mut self) -> Self {
        self.segment = SegmentKind::Growing;
        self
    }

    pub fn element_type(mut self, element_type: DataType) -> Self {
        self.element_type = Some(element_type);
        self
    }

    pub fn scalar_index(mut self, index: Arc<dyn ScalarIndex>) -> Self {
        self.scalar_index = Some(index);
        self
    }

    pub fn text_index(mut self, index: Arc<dyn TextIndex>) -> Self {
        self.text_index = Some(index);
        self
    }

    pub fn ngram_index(mut self, index: Arc<dyn NgramIndex>) -> Self {
        self.ngram_index = Some(index);
        self
    }

    pub fn json_key_index(mut self, index: Arc<dyn JsonKeyIndex>) -> Self {
        self.json_key_index = Some(index);
        self
    }
}

/// Per-call inputs: an optional upstream selection vector and an optional
/// row gate aligned with the batch.
#[derive(Default, Clone, Copy)]
pub struct EvalContext<'a> {
    /// Global row offsets to evaluate instead of the sequential cursor.
    /// Disables every index path.
    pub offsets: Option<&'a [i64]>,
    /// Rows whose bit is 0 are skipped; their output bits stay untouched.
    pub bitmap_input: Option<&'a Bitset>,
}

/// One evaluated batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterBatch {
    /// True where the predicate holds.
    pub result: Bitset,
    /// False where the row is null (or the index knows no value).
    pub valid: Bitset,
}

struct CachedBitmaps {
    res: Bitset,
    valid: Bitset,
}

/// Per-chunk min/max statistics for the primitive skip check. Only chunks
/// without nulls participate.
#[derive(Debug, Clone, Copy)]
enum ChunkStats {
    Int { min: i64, max: i64 },
    Float { min: f64, max: f64 },
    NotApplicable,
}

pub struct UnaryFilterExecutor {
    column: Arc<dyn ChunkedColumn>,
    data_type: DataType,
    op: OpType,
    literal: ScalarValue,
    pointer: String,
    array_index: Option<usize>,
    matcher: Option<PatternMatcher>,
    slop: u32,
    batch_size: usize,
    active_count: usize,
    segment: SegmentKind,
    strong_consistency: bool,
    element_type: Option<DataType>,
    scalar_index: Option<Arc<dyn ScalarIndex>>,
    text_index: Option<Arc<dyn TextIndex>>,
    ngram_index: Option<Arc<dyn NgramIndex>>,
    json_key_index: Option<Arc<dyn JsonKeyIndex>>,

    /// Sequential cursor over `[0, active_count)`.
    pos: usize,
    cached_index: Option<CachedBitmaps>,
    cached_text: Option<CachedBitmaps>,
    cached_ngram: Option<CachedBitmaps>,
    ngram_declined: bool,
    chunk_stats: Vec<Option<ChunkStats>>,
}

impl UnaryFilterExecutor {
    pub fn new(params: UnaryFilterParams) -> Result<Self> {
        let data_type = params.column.data_type();
        if data_type == DataType::VectorArray {
            return Err(Error::DataTypeInvalid(
                "vector array columns cannot be filtered".into(),
            ));
        }
        let literal = normalize_literal(data_type, params.op, &params.literal)?;

        let matcher = if params.op == OpType::Match {
            Some(PatternMatcher::translate(literal.require_str()?)?)
        } else {
            None
        };

        let slop = if params.op == OpType::PhraseMatch {
            u32::try_from(params.slop).map_err(|_| {
                Error::InvalidParameter(format!(
                    "slop {} is invalid in phrase match query, must be within [0, {}]",
                    params.slop,
                    u32::MAX
                ))
            })?
        } else {
            0
        };

        let (pointer, array_index) = match data_type {
            DataType::Json => (json_pointer(&params.nested_path), None),
            DataType::Array => {
                let idx = match params.nested_path.first() {
                    Some(seg) => Some(seg.parse::<usize>().map_err(|_| {
                        Error::InvalidParameter(format!(
                            "array element index '{}' is not a non-negative integer",
                            seg
                        ))
                    })?),
                    None => None,
                };
                (String::new(), idx)
            }
            _ => (String::new(), None),
        };

        if params.batch_size == 0 {
            return Err(Error::InvalidParameter("batch size must be positive".into()));
        }

        let num_chunks = params.column.num_chunks();
        Ok(Self {
            data_type,
            op: params.op,
            literal,
            pointer,
            array_index,
            matcher,
            slop,
            batch_size: params.batch_size,
            active_count: params.active_count,
            segment: params.segment,
            strong_consistency: params.strong_consistency,
            element_type: params.element_type,
            scalar_index: params.scalar_index,
            text_index: params.text_index,
            ngram_index: params.ngram_index,
            json_key_index: params.json_key_index,
            column: params.column,
            pos: 0,
            cached_index: None,
            cached_text: None,
            cached_ngram: None,
            ngram_declined: false,
            chunk_stats: vec![None; num_chunks],
        })
    }

    /// Rows consumed by sequential batches so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Evaluate the next batch. Returns `None` once the sequential cursor
    /// is exhausted. With an offset input the call is self-contained: it
    /// evaluates exactly those rows and leaves the cursor alone.
    pub fn next_batch(&mut self, ctx: &EvalContext<'_>) -> Result<Option<FilterBatch>> {
        if let Some(offsets) = ctx.offsets {
            if self.op.is_text_family() {
                return Err(Error::OpTypeInvalid(
                    "match query does not support iterative filter".into(),
                ));
            }
            return self.eval_offsets(offsets, ctx.bitmap_input).map(Some);
        }

        let n = self.batch_size.min(self.active_count.saturating_sub(self.pos));
        if n == 0 {
            return Ok(None);
        }

        if self.op.is_text_family() {
            return self.exec_text_match(n).map(Some);
        }
        if self.can_try_ngram() {
            if let Some(batch) = self.exec_ngram_match(n)? {
                return Ok(Some(batch));
            }
            debug!(op = %self.op, "ngram index declined, falling back");
        }

        match self.data_type {
            DataType::Json => self.eval_json_sequential(n, ctx).map(Some),
            DataType::Array => self.eval_array_sequential(n, ctx).map(Some),
            _ => self.eval_scalar_sequential(n, ctx).map(Some),
        }
    }

    // ------------------------------------------------------------------
    // scalar columns (primitives + strings)
    // ------------------------------------------------------------------

    fn eval_scalar_sequential(&mut self, n: usize, ctx: &EvalContext<'_>) -> Result<FilterBatch> {
        if let Some(hit) = precheck_overflow(self.data_type, self.op, &self.literal)? {
            let rows: Vec<i64> = (self.pos..self.pos + n).map(|r| r as i64).collect();
            let batch = self.overflow_batch(hit, &rows)?;
            self.pos += n;
            return Ok(batch);
        }
        if let Some(index) = self.scalar_index.clone() {
            if self.index_supports_op() {
                return self.exec_scalar_index(index.as_ref(), n);
            }
        }
        self.data_scan_sequential(n, ctx)
    }

    fn index_supports_op(&self) -> bool {
        self.op.is_range() || (self.op.is_like_family() && self.data_type == DataType::Varchar)
    }

    fn exec_scalar_index(&mut self, index: &dyn ScalarIndex, n: usize) -> Result<FilterBatch> {
        if self.cached_index.is_none() {
            let res = index.apply(self.op, &self.literal)?;
            let valid = index.is_not_null();
            self.cached_index = Some(self.seal_cached(res, valid));
        }
        Ok(self.slice_cached_index(n))
    }

    fn data_scan_sequential(&mut self, n: usize, ctx: &EvalContext<'_>) -> Result<FilterBatch> {
        let mut res = Bitset::new(n, false);
        let mut valid = Bitset::new(n, true);
        let mut cursor = 0usize;
        let mut pos = self.pos;
        while cursor < n {
            let (chunk_id, in_chunk) = self.locate(pos)?;
            let rows_in_chunk = self.column.chunk_row_nums(chunk_id)?;
            let take = (n - cursor).min(rows_in_chunk - in_chunk);
            let wrapper = self.column.get_chunk(chunk_id)?;
            let chunk: &Chunk = wrapper.get();
            if !self.chunk_can_skip(chunk_id, chunk) {
                let rows = RowMap::Seq {
                    chunk_start: in_chunk,
                    out_start: cursor,
                    count: take,
                };
                let mut out = ScanOutput {
                    res: &mut res,
                    valid: &mut valid,
                    bitmap_input: ctx.bitmap_input,
                };
                self.run_kernel(chunk, rows, &mut out)?;
            }
            cursor += take;
            pos += take;
        }
        self.pos = pos;
        Ok(FilterBatch { result: res, valid })
    }

    fn run_kernel(&self, chunk: &Chunk, rows: RowMap<'_>, out: &mut ScanOutput<'_>) -> Result<()> {
        match self.data_type {
            DataType::Varchar => scan_string(
                self.op,
                &self.literal,
                self.matcher.as_ref(),
                chunk,
                rows,
                out,
            ),
            DataType::Json => scan_json(
                self.op,
                &self.literal,
                &self.pointer,
                self.matcher.as_ref(),
                chunk,
                rows,
                out,
            ),
            DataType::Array => scan_array(
                self.op,
                &self.literal,
                self.array_index,
                self.matcher.as_ref(),
                chunk,
                rows,
                out,
            ),
            _ => scan_primitive(self.op, &self.literal, chunk, rows, out),
        }
    }

    // ------------------------------------------------------------------
    // offset-input path (data scan only)
    // ------------------------------------------------------------------

    fn eval_offsets(&mut self, offsets: &[i64], bitmap_input: Option<&Bitset>) -> Result<FilterBatch> {
        if self.data_type.is_integral() {
            if let Some(hit) = precheck_overflow(self.data_type, self.op, &self.literal)? {
                return self.overflow_batch(hit, offsets);
            }
        }
        let n = offsets.len();
        let mut res = Bitset::new(n, false);
        let mut valid = Bitset::new(n, true);

        let located = self.column.get_chunk_ids_by_offsets(offsets)?;
        let mut by_chunk: BTreeMap<usize, SmallVec<[(usize, usize); 16]>> = BTreeMap::new();
        for (i, (chunk_id, in_chunk)) in located.into_iter().enumerate() {
            by_chunk.entry(chunk_id).or_default().push((i, in_chunk));
        }
        for (chunk_id, pairs) in by_chunk {
            let wrapper = self.column.get_chunk(chunk_id)?;
            let chunk: &Chunk = wrapper.get();
            if self.chunk_can_skip(chunk_id, chunk) {
                continue;
            }
            let mut out = ScanOutput {
                res: &mut res,
                valid: &mut valid,
                bitmap_input,
            };
            self.run_kernel(chunk, RowMap::Pairs(&pairs), &mut out)?;
        }
        Ok(FilterBatch { result: res, valid })
    }

    // ------------------------------------------------------------------
    // overflow short-circuit
    // ------------------------------------------------------------------

    fn overflow_batch(&self, hit: OverflowShortCircuit, rows: &[i64]) -> Result<FilterBatch> {
        let valid = self.validity_of_rows(rows)?;
        let result = match hit {
            OverflowShortCircuit::AllFalse => Bitset::new(rows.len(), false),
            OverflowShortCircuit::AllTrue => valid.clone(),
        };
        Ok(FilterBatch { result, valid })
    }

    fn validity_of_rows(&self, rows: &[i64]) -> Result<Bitset> {
        let mut valid = Bitset::new(rows.len(), true);
        self.column
            .bulk_is_valid(Some(rows), &mut |is_valid, i| valid.set(i, is_valid))?;
        Ok(valid)
    }

    // ------------------------------------------------------------------
    // JSON columns
    // ------------------------------------------------------------------

    fn eval_json_sequential(&mut self, n: usize, ctx: &EvalContext<'_>) -> Result<FilterBatch> {
        if self.can_use_json_key_index() {
            return self.exec_json_key_index(n);
        }
        self.data_scan_sequential(n, ctx)
    }

    fn can_use_json_key_index(&self) -> bool {
        if self.json_key_index.is_none() {
            return false;
        }
        match &self.literal {
            ScalarValue::Array(_) => false,
            ScalarValue::String(_) => {
                // substring scans other than prefix cannot use the key index
                self.op.is_range() || self.op == OpType::PrefixMatch
            }
            _ => self.op.is_range(),
        }
    }

    fn exec_json_key_index(&mut self, n: usize) -> Result<FilterBatch> {
        if self.cached_index.is_none() {
            let index = self
                .json_key_index
                .clone()
                .ok_or_else(|| Error::Unknown("json key index disappeared".into()))?;
            let (prefix, suffix) = split_array_suffix(&self.pointer);
            let column = Arc::clone(&self.column);
            let literal = self.literal.clone();
            let op = self.op;
            let matcher = self.matcher.as_ref();
            let pointer = self.pointer.clone();
            let is_growing = self.segment == SegmentKind::Growing;
            let mut closure_err: Option<Error> = None;

            let res = index.filter_by_path(
                &prefix,
                self.active_count,
                is_growing,
                self.strong_consistency,
                &mut |entries, bits| {
                    let mut fallback_rows: Vec<i64> = Vec::new();
                    for entry in entries {
                        let row = entry.row_id as usize;
                        if row >= bits.len() {
                            continue;
                        }
                        match (&entry.value, suffix.is_empty()) {
                            (Some(inline), true) => {
                                bits.set(row, compare_inline(inline, &literal, op));
                            }
                            // rows the index could not inline, and every row
                            // under an array-suffixed pointer, re-read the
                            // document
                            _ => fallback_rows.push(entry.row_id as i64),
                        }
                    }
                    if !fallback_rows.is_empty() {
                        let outcome = column.bulk_raw_json_at(
                            &fallback_rows,
                            &mut |doc, i, is_valid| {
                                let row = fallback_rows[i] as usize;
                                let hit = is_valid
                                    && eval_json(
                                        resolve_pointer(doc, &pointer),
                                        &literal,
                                        op,
                                        matcher,
                                    );
                                bits.set(row, hit);
                            },
                        );
                        if let Err(e) = outcome {
                            closure_err.get_or_insert(e);
                        }
                    }
                },
            )?;
            if let Some(e) = closure_err {
                return Err(e);
            }
            // Validity comes from document presence, the same source the
            // scan kernel consults, so the two paths report null documents
            // identically.
            let all_rows: Vec<i64> = (0..self.active_count as i64).collect();
            let valid = self.validity_of_rows(&all_rows)?;
            self.cached_index = Some(self.seal_cached(res, valid));
        }
        Ok(self.slice_cached_index(n))
    }

    // ------------------------------------------------------------------
    // ARRAY columns
    // ------------------------------------------------------------------

    fn eval_array_sequential(&mut self, n: usize, ctx: &EvalContext<'_>) -> Result<FilterBatch> {
        if let Some(index) = self.scalar_index.clone() {
            if self.can_use_index_for_array(index.as_ref()) {
                return self.exec_array_index(index.as_ref(), n);
            }
        }
        self.data_scan_sequential(n, ctx)
    }

    /// Whole-array equality can be answered with an element index unless
    /// the elements are floating point (not exact) or the backend is a
    /// hybrid/bitmap index.
    fn can_use_index_for_array(&self, index: &dyn ScalarIndex) -> bool {
        if self.array_index.is_some() || !matches!(self.op, OpType::Equal | OpType::NotEqual) {
            return false;
        }
        let lit = match self.literal.as_array() {
            Some(lit) if !lit.is_empty() => lit,
            _ => return false,
        };
        let element_type = self.element_type.unwrap_or(lit.element_type);
        if element_type.is_floating() {
            return false;
        }
        !matches!(
            index.index_type(),
            ScalarIndexType::Hybrid | ScalarIndexType::Bitmap
        )
    }

    fn exec_array_index(&mut self, index: &dyn ScalarIndex, n: usize) -> Result<FilterBatch> {
        if self.cached_index.is_none() {
            let lit = self
                .literal
                .as_array()
                .ok_or_else(|| Error::Unknown("array literal disappeared".into()))?
                .clone();

            // distinct elements, in literal order
            let mut elems: Vec<&ScalarValue> = Vec::new();
            for v in &lit.values {
                if !elems.contains(&v) {
                    elems.push(v);
                }
            }
            // candidates: rows containing every distinct element
            let mut candidates: Option<Bitset> = None;
            for elem in elems {
                let bm = index.apply(OpType::Equal, elem)?;
                candidates = Some(match candidates {
                    Some(mut acc) => {
                        acc.and_assign(&bm);
                        acc
                    }
                    None => bm,
                });
            }
            let mut candidates =
                candidates.unwrap_or_else(|| Bitset::new(self.active_count, false));
            if candidates.len() < self.active_count {
                candidates.extend_false(self.active_count - candidates.len());
            }

            let mut valid = index.is_not_null();
            if valid.len() < self.active_count {
                valid.extend_false(self.active_count - valid.len());
            }
            let reverse = self.op == OpType::NotEqual;
            // Only candidate rows can equal the literal; everything else is
            // settled by the operator alone.
            let mut res = if reverse {
                valid.clone()
            } else {
                Bitset::new(valid.len(), false)
            };
            let rows: Vec<i64> = (0..candidates.len())
                .filter(|&i| candidates.get(i))
                .map(|i| i as i64)
                .collect();
            if !rows.is_empty() {
                self.column.bulk_array_at(&rows, &mut |arr, i, is_valid| {
                    let row = rows[i] as usize;
                    let same = is_valid && arr.is_same_array(&lit);
                    res.set(row, same != reverse);
                })?;
            }
            self.cached_index = Some(self.seal_cached(res, valid));
        }
        Ok(self.slice_cached_index(n))
    }

    // ------------------------------------------------------------------
    // text / ngram paths
    // ------------------------------------------------------------------

    fn exec_text_match(&mut self, n: usize) -> Result<FilterBatch> {
        let index = self
            .text_index
            .clone()
            .ok_or_else(|| Error::Unsupported("no text index for field".into()))?;
        if self.cached_text.is_none() {
            let query = self.literal.require_str()?;
            let res = match self.op {
                OpType::TextMatch => index.match_query(query)?,
                OpType::PhraseMatch => index.phrase_match_query(query, self.slop)?,
                other => {
                    return Err(Error::OpTypeInvalid(format!(
                        "operator {} is not a match query",
                        other
                    )))
                }
            };
            let valid = index.is_not_null();
            self.cached_text = Some(self.seal_cached(res, valid));
        }
        let cached = self.cached_text.as_ref().map(|c| slice_batch(c, self.pos, n));
        self.pos += n;
        cached.ok_or_else(|| Error::Unknown("text match cache missing".into()))
    }

    fn can_try_ngram(&self) -> bool {
        !self.ngram_declined
            && self.op.is_like_family()
            && self.ngram_index.is_some()
            && matches!(self.literal, ScalarValue::String(_))
            && matches!(self.data_type, DataType::Varchar | DataType::Json)
    }

    /// `Ok(None)` means the index declined and dispatch must fall through.
    fn exec_ngram_match(&mut self, n: usize) -> Result<Option<FilterBatch>> {
        let index = self
            .ngram_index
            .clone()
            .ok_or_else(|| Error::Unknown("ngram index disappeared".into()))?;
        if self.cached_ngram.is_none() {
            let literal = self.literal.require_str()?;
            match index.execute_query(literal, self.op)? {
                Some(res) => {
                    let valid = index.is_not_null();
                    self.cached_ngram = Some(self.seal_cached(res, valid));
                }
                None => {
                    self.ngram_declined = true;
                    return Ok(None);
                }
            }
        }
        let batch = self.cached_ngram.as_ref().map(|c| slice_batch(c, self.pos, n));
        self.pos += n;
        Ok(batch)
    }

    // ------------------------------------------------------------------
    // cached-bitmap plumbing
    // ------------------------------------------------------------------

    /// Pad a whole-column result to `active_count` (rows the index has not
    /// seen are false and invalid) and mask matches with validity.
    fn seal_cached(&self, mut res: Bitset, mut valid: Bitset) -> CachedBitmaps {
        if res.len() < self.active_count {
            res.extend_false(self.active_count - res.len());
        }
        if valid.len() < self.active_count {
            valid.extend_false(self.active_count - valid.len());
        }
        res.and_assign(&valid);
        CachedBitmaps { res, valid }
    }

    fn slice_cached_index(&mut self, n: usize) -> FilterBatch {
        let batch = self
            .cached_index
            .as_ref()
            .map(|c| slice_batch(c, self.pos, n))
            .unwrap_or_else(|| FilterBatch {
                result: Bitset::new(n, false),
                valid: Bitset::new(n, false),
            });
        self.pos += n;
        batch
    }

    // ------------------------------------------------------------------
    // chunk layout + skip statistics
    // ------------------------------------------------------------------

    fn locate(&self, pos: usize) -> Result<(usize, usize)> {
        for chunk_id in 0..self.column.num_chunks() {
            let start = self.column.num_rows_until_chunk(chunk_id)?;
            let rows = self.column.chunk_row_nums(chunk_id)?;
            if pos < start + rows {
                return Ok((chunk_id, pos - start));
            }
        }
        Err(Error::OutOfRange(format!(
            "row {} beyond column end {}",
            pos,
            self.column.num_rows()
        )))
    }

    /// A chunk whose value range cannot satisfy the predicate is skipped
    /// wholesale; the pre-initialized all-false result is already correct.
    /// Restricted to fully valid numeric chunks and range operators.
    fn chunk_can_skip(&mut self, chunk_id: usize, chunk: &Chunk) -> bool {
        if !self.data_type.is_numeric() || !self.op.is_range() || chunk.valid().is_some() {
            return false;
        }
        let stats = match self.chunk_stats.get(chunk_id).copied() {
            Some(Some(stats)) => stats,
            Some(None) => {
                let stats = compute_chunk_stats(chunk);
                self.chunk_stats[chunk_id] = Some(stats);
                stats
            }
            None => return false,
        };
        match (stats, &self.literal) {
            (ChunkStats::Int { min, max }, ScalarValue::Int64(lit)) => {
                range_excludes(self.op, &min, &max, lit)
            }
            (ChunkStats::Float { min, max }, ScalarValue::Float64(lit)) => {
                range_excludes(self.op, &min, &max, lit)
            }
            _ => false,
        }
    }
}

/// No value in `[min, max]` can satisfy `value OP literal`.
fn range_excludes<T: PartialOrd>(op: OpType, min: &T, max: &T, literal: &T) -> bool {
    match op {
        OpType::GreaterThan => max <= literal,
        OpType::GreaterEqual => max < literal,
        OpType::LessThan => min >= literal,
        OpType::LessEqual => min > literal,
        OpType::Equal => literal < min || literal > max,
        _ => false,
    }
}

fn compute_chunk_stats(chunk: &Chunk) -> ChunkStats {
    fn int_stats(vals: &[impl Copy + Into<i64>]) -> ChunkStats {
        let mut iter = vals.iter().map(|&v| v.into());
        match iter.next() {
            Some(first) => {
                let (mut min, mut max) = (first, first);
                for v in iter {
                    min = min.min(v);
                    max = max.max(v);
                }
                ChunkStats::Int { min, max }
            }
            None => ChunkStats::NotApplicable,
        }
    }
    fn float_stats(vals: impl Iterator<Item = f64>) -> ChunkStats {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut any = false;
        for v in vals {
            if v.is_nan() {
                return ChunkStats::NotApplicable;
            }
            any = true;
            min = min.min(v);
            max = max.max(v);
        }
        if any {
            ChunkStats::Float { min, max }
        } else {
            ChunkStats::NotApplicable
        }
    }
    match chunk.data() {
        ChunkData::Int8(v) => int_stats(v),
        ChunkData::Int16(v) => int_stats(v),
        ChunkData::Int32(v) => int_stats(v),
        ChunkData::Int64(v) => int_stats(v),
        ChunkData::Float(v) => float_stats(v.iter().map(|&x| x as f64)),
        ChunkData::Double(v) => float_stats(v.iter().copied()),
        _ => ChunkStats::NotApplicable,
    }
}

fn slice_batch(cached: &CachedBitmaps, pos: usize, n: usize) -> FilterBatch {
    let mut result = Bitset::default();
    let mut valid = Bitset::default();
    result.append_slice(&cached.res, pos, n);
    valid.append_slice(&cached.valid, pos, n);
    FilterBatch { result, valid }
}

/// Inline fast-path comparison for the JSON-key index: numeric kinds widen
/// across each other, strings only match strings. Type mismatch follows the
/// null-as-distinct rule.
fn compare_inline(inline: &JsonInlineValue, literal: &ScalarValue, op: OpType) -> bool {
    match inline {
        JsonInlineValue::Str(s) => match literal {
            ScalarValue::String(lit) => {
                if op == OpType::PrefixMatch {
                    s.starts_with(lit.as_str())
                } else {
                    compare_scalar(op, &s.as_str(), &lit.as_str())
                }
            }
            _ => op == OpType::NotEqual,
        },
        JsonInlineValue::Bool(b) => match literal {
            ScalarValue::Bool(lit) => compare_scalar(op, b, lit),
            _ => op == OpType::NotEqual,
        },
        JsonInlineValue::Int64(v) => compare_inline_numeric(*v as f64, Some(*v), literal, op),
        JsonInlineValue::Float(v) => compare_inline_numeric(*v as f64, None, literal, op),
        JsonInlineValue::Double(v) => compare_inline_numeric(*v, None, literal, op),
    }
}

fn compare_inline_numeric(
    widened: f64,
    exact: Option<i64>,
    literal: &ScalarValue,
    op: OpType,
) -> bool {
    match literal {
        ScalarValue::Int64(lit) => match exact {
            Some(v) => compare_scalar(op, &v, lit),
            None => compare_scalar(op, &widened, &(*lit as f64)),
        },
        ScalarValue::Float64(lit) => compare_scalar(op, &widened, lit),
        _ => op == OpType::NotEqual,
    }
}

/// Assemble a JSON pointer from path segments, escaping per RFC 6901.
fn json_pointer(path: &[String]) -> String {
    let mut out = String::new();
    for seg in path {
        out.push('/');
        out.push_str(&seg.replace('~', "~0").replace('/', "~1"));
    }
    out
}

/// Split a pointer at its first all-digit segment: `/k/0/x` becomes
/// (`/k`, `/0/x`). The prefix addresses the indexed key; the suffix indexes
/// into the value.
fn split_array_suffix(pointer: &str) -> (String, String) {
    let bytes = pointer.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'/' {
            let mut j = i + 1;
            while j < bytes.len() && bytes[j].is_ascii_digit() {
                j += 1;
            }
            if j > i + 1 && (j == bytes.len() || bytes[j] == b'/') {
                return (pointer[..i].to_string(), pointer[i..].to_string());
            }
        }
        i += 1;
    }
    (pointer.to_string(), String::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::testing::{
        array_column, column_from_chunks, int32_column, int_array, json_column, varchar_column,
    };
    use crate::column::ChunkData;
    use crate::index::testing::VecScalarIndex;
    use crate::index::JsonKeyEntry;
    use serde_json::json;
    use std::sync::atomic::Ordering;

    fn collect_all(exec: &mut UnaryFilterExecutor) -> (Vec<bool>, Vec<bool>) {
        let mut res = Vec::new();
        let mut valid = Vec::new();
        let ctx = EvalContext::default();
        while let Some(batch) = exec.next_batch(&ctx).unwrap() {
            res.extend(batch.result.to_vec());
            valid.extend(batch.valid.to_vec());
        }
        (res, valid)
    }

    fn executor(params: UnaryFilterParams) -> UnaryFilterExecutor {
        UnaryFilterExecutor::new(params).unwrap()
    }

    #[test]
    fn test_int_scan_with_nulls() {
        // S1: a = [1,2,3,null,5], a > 2
        let col = Arc::new(int32_column(
            "a",
            vec![vec![Some(1), Some(2), Some(3), None, Some(5)]],
        ));
        let mut exec = executor(UnaryFilterParams::new(
            col,
            OpType::GreaterThan,
            ScalarValue::Int64(2),
        ));
        let (res, valid) = collect_all(&mut exec);
        assert_eq!(res, vec![false, false, true, false, true]);
        assert_eq!(valid, vec![true, true, true, false, true]);
    }

    #[test]
    fn test_multi_chunk_batching_matches_single_batch() {
        let rows: Vec<Option<i32>> = (0..100).map(|i| Some(i * 3 % 17)).collect();
        let col_chunked = Arc::new(int32_column(
            "a",
            rows.chunks(7).map(|c| c.to_vec()).collect(),
        ));
        let col_single = Arc::new(int32_column("a", vec![rows.clone()]));

        let mut small_batches = executor(
            UnaryFilterParams::new(
                col_chunked,
                OpType::LessEqual,
                ScalarValue::Int64(8),
            )
            .batch_size(11),
        );
        let mut one_batch = executor(UnaryFilterParams::new(
            col_single,
            OpType::LessEqual,
            ScalarValue::Int64(8),
        ));
        assert_eq!(collect_all(&mut small_batches), collect_all(&mut one_batch));
    }

    #[test]
    fn test_overflow_short_circuit() {
        // S2: int8 column, literal 1000, >= → all false
        let chunk = Chunk::new(ChunkData::Int8(vec![1, 2, 127]), None).unwrap();
        let col = Arc::new(column_from_chunks("a", DataType::Int8, vec![chunk]));
        let mut exec = executor(UnaryFilterParams::new(
            col.clone(),
            OpType::GreaterEqual,
            ScalarValue::Int64(1000),
        ));
        let (res, valid) = collect_all(&mut exec);
        assert_eq!(res, vec![false, false, false]);
        assert_eq!(valid, vec![true, true, true]);

        // != 1000 → all valid rows true
        let mut exec = executor(UnaryFilterParams::new(
            col,
            OpType::NotEqual,
            ScalarValue::Int64(1000),
        ));
        let (res, _) = collect_all(&mut exec);
        assert_eq!(res, vec![true, true, true]);
    }

    #[test]
    fn test_varchar_prefix_match() {
        // S3
        let col = Arc::new(varchar_column(
            "s",
            vec![vec![Some("apple"), Some("ape"), Some("banana"), Some("apricot")]],
        ));
        let mut exec = executor(UnaryFilterParams::new(
            col,
            OpType::PrefixMatch,
            ScalarValue::String("ap".into()),
        ));
        let (res, _) = collect_all(&mut exec);
        assert_eq!(res, vec![true, true, false, true]);
    }

    #[test]
    fn test_like_round_trip_equals_equality() {
        // P9: a wildcard-free pattern selects exactly the equal rows
        let rows = vec![Some("apple"), Some("ape"), Some("app"), None, Some("apple")];
        let col = Arc::new(varchar_column("s", vec![rows]));
        let mut via_match = executor(UnaryFilterParams::new(
            col.clone(),
            OpType::Match,
            ScalarValue::String("apple".into()),
        ));
        let mut via_equal = executor(UnaryFilterParams::new(
            col,
            OpType::Equal,
            ScalarValue::String("apple".into()),
        ));
        assert_eq!(collect_all(&mut via_match), collect_all(&mut via_equal));
    }

    #[test]
    fn test_empty_pattern_rejected_at_construction() {
        let col = Arc::new(varchar_column("s", vec![vec![Some("a")]]));
        let err = UnaryFilterExecutor::new(UnaryFilterParams::new(
            col,
            OpType::Match,
            ScalarValue::String(String::new()),
        ))
        .err()
        .unwrap();
        assert_eq!(err.kind(), vexdb_core::ErrorKind::InvalidParameter);
    }

    #[test]
    fn test_percent_pattern_matches_non_null_rows() {
        let col = Arc::new(varchar_column("s", vec![vec![Some("x"), None, Some("")]]));
        let mut exec = executor(UnaryFilterParams::new(
            col,
            OpType::Match,
            ScalarValue::String("%".into()),
        ));
        let (res, valid) = collect_all(&mut exec);
        assert_eq!(res, vec![true, false, true]);
        assert_eq!(valid, vec![true, false, true]);
    }

    #[test]
    fn test_json_equality_with_widening() {
        // S4
        let col = Arc::new(json_column(
            "j",
            vec![vec![
                Some(json!({"k": 1})),
                Some(json!({"k": "1"})),
                Some(json!({"k": 1.0})),
                Some(json!({})),
            ]],
        ));
        let mut exec = executor(
            UnaryFilterParams::new(col, OpType::Equal, ScalarValue::Int64(1))
                .nested_path(vec!["k".into()]),
        );
        let (res, valid) = collect_all(&mut exec);
        assert_eq!(res, vec![true, false, true, false]);
        assert_eq!(valid, vec![true, true, true, true]);
    }

    #[test]
    fn test_array_whole_equality() {
        // S5
        let col = Arc::new(array_column(
            "arr",
            vec![vec![
                Some(int_array(&[1, 2])),
                Some(int_array(&[3])),
                Some(int_array(&[])),
                Some(int_array(&[1, 2])),
            ]],
        ));
        let lit = ScalarValue::Array(int_array(&[1, 2]));
        let mut exec = executor(UnaryFilterParams::new(col, OpType::Equal, lit));
        let (res, _) = collect_all(&mut exec);
        assert_eq!(res, vec![true, false, false, true]);
    }

    #[test]
    fn test_scalar_index_path_applies_once_and_matches_scan() {
        let rows: Vec<Option<i32>> = (0..50)
            .map(|i| if i % 9 == 0 { None } else { Some(i % 13) })
            .collect();
        let index = Arc::new(VecScalarIndex::new(
            rows.iter()
                .map(|r| r.map(|v| ScalarValue::Int64(v as i64)))
                .collect(),
        ));
        let col = Arc::new(int32_column("a", vec![rows.clone()]));
        let col_scan = Arc::new(int32_column("a", vec![rows]));

        let mut via_index = executor(
            UnaryFilterParams::new(col, OpType::LessThan, ScalarValue::Int64(6))
                .scalar_index(index.clone())
                .batch_size(16),
        );
        let mut via_scan = executor(
            UnaryFilterParams::new(col_scan, OpType::LessThan, ScalarValue::Int64(6))
                .batch_size(16),
        );
        assert_eq!(collect_all(&mut via_index), collect_all(&mut via_scan));
        // cached across batches: one apply despite ceil(50/16) = 4 batches
        assert_eq!(index.applies.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_offset_input_forces_data_scan() {
        let rows: Vec<Option<i32>> = (0..20).map(|i| Some(i)).collect();
        let index = Arc::new(VecScalarIndex::new(
            rows.iter()
                .map(|r| r.map(|v| ScalarValue::Int64(v as i64)))
                .collect(),
        ));
        let col = Arc::new(int32_column("a", vec![rows]));
        let mut exec = executor(
            UnaryFilterParams::new(col, OpType::GreaterEqual, ScalarValue::Int64(10))
                .scalar_index(index.clone()),
        );
        let offsets = [3i64, 15, 7, 19];
        let batch = exec
            .next_batch(&EvalContext {
                offsets: Some(&offsets),
                bitmap_input: None,
            })
            .unwrap()
            .unwrap();
        assert_eq!(batch.result.to_vec(), vec![false, true, false, true]);
        // the index was never consulted
        assert_eq!(index.applies.load(Ordering::SeqCst), 0);
        // and the sequential cursor did not move
        assert_eq!(exec.position(), 0);
    }

    #[test]
    fn test_bitmap_input_gates_rows() {
        let col = Arc::new(int32_column(
            "a",
            vec![vec![Some(5), Some(5), Some(5), Some(5)]],
        ));
        let mut exec = executor(UnaryFilterParams::new(
            col,
            OpType::Equal,
            ScalarValue::Int64(5),
        ));
        let gate: Bitset = [true, false, false, true].into_iter().collect();
        let batch = exec
            .next_batch(&EvalContext {
                offsets: None,
                bitmap_input: Some(&gate),
            })
            .unwrap()
            .unwrap();
        assert_eq!(batch.result.to_vec(), vec![true, false, false, true]);
    }

    struct FixedTextIndex {
        matches: Bitset,
        not_null: Bitset,
    }

    impl TextIndex for FixedTextIndex {
        fn match_query(&self, _text: &str) -> Result<Bitset> {
            Ok(self.matches.clone())
        }

        fn phrase_match_query(&self, _text: &str, _slop: u32) -> Result<Bitset> {
            Ok(self.matches.clone())
        }

        fn is_not_null(&self) -> Bitset {
            self.not_null.clone()
        }
    }

    #[test]
    fn test_text_match_growing_zero_padding() {
        // S8: active_count 10, index built at 7 rows
        let col = Arc::new(varchar_column(
            "t",
            vec![(0..10).map(|_| Some("doc")).collect()],
        ));
        let index = Arc::new(FixedTextIndex {
            matches: [true, false, true, false, true, false, true].into_iter().collect(),
            not_null: Bitset::new(7, true),
        });
        let mut exec = executor(
            UnaryFilterParams::new(col, OpType::TextMatch, ScalarValue::String("doc".into()))
                .text_index(index)
                .active_count(10)
                .growing(),
        );
        let (res, valid) = collect_all(&mut exec);
        assert_eq!(res.len(), 10);
        assert_eq!(
            res,
            vec![true, false, true, false, true, false, true, false, false, false]
        );
        assert_eq!(valid[7..], [false, false, false]);
        assert_eq!(valid[..7], [true; 7]);
    }

    #[test]
    fn test_phrase_slop_out_of_range_rejected() {
        let col = Arc::new(varchar_column("t", vec![vec![Some("a")]]));
        let err = UnaryFilterExecutor::new(
            UnaryFilterParams::new(
                col,
                OpType::PhraseMatch,
                ScalarValue::String("a b".into()),
            )
            .slop(-1),
        )
        .err()
        .unwrap();
        assert_eq!(err.kind(), vexdb_core::ErrorKind::InvalidParameter);
    }

    #[test]
    fn test_text_match_rejects_offset_input() {
        let col = Arc::new(varchar_column("t", vec![vec![Some("a")]]));
        let index = Arc::new(FixedTextIndex {
            matches: Bitset::new(1, true),
            not_null: Bitset::new(1, true),
        });
        let mut exec = executor(
            UnaryFilterParams::new(col, OpType::TextMatch, ScalarValue::String("a".into()))
                .text_index(index),
        );
        let err = exec
            .next_batch(&EvalContext {
                offsets: Some(&[0]),
                bitmap_input: None,
            })
            .err()
            .unwrap();
        assert_eq!(err.kind(), vexdb_core::ErrorKind::OpTypeInvalid);
    }

    struct FixedNgramIndex {
        answer: Option<Bitset>,
        not_null: Bitset,
    }

    impl NgramIndex for FixedNgramIndex {
        fn execute_query(&self, _literal: &str, _op: OpType) -> Result<Option<Bitset>> {
            Ok(self.answer.clone())
        }

        fn is_not_null(&self) -> Bitset {
            self.not_null.clone()
        }
    }

    #[test]
    fn test_ngram_decline_falls_back_to_scan() {
        // P10: with a declining ngram index the result equals the pure scan
        let rows = vec![Some("apple"), Some("grape"), None, Some("apricot")];
        let col = Arc::new(varchar_column("s", vec![rows.clone()]));
        let col_scan = Arc::new(varchar_column("s", vec![rows]));
        let ngram = Arc::new(FixedNgramIndex {
            answer: None,
            not_null: Bitset::new(4, true),
        });
        let mut with_ngram = executor(
            UnaryFilterParams::new(
                col,
                OpType::InnerMatch,
                ScalarValue::String("ap".into()),
            )
            .ngram_index(ngram),
        );
        let mut plain = executor(UnaryFilterParams::new(
            col_scan,
            OpType::InnerMatch,
            ScalarValue::String("ap".into()),
        ));
        assert_eq!(collect_all(&mut with_ngram), collect_all(&mut plain));
    }

    #[test]
    fn test_ngram_answer_is_used_and_sliced() {
        let rows: Vec<Option<&str>> = (0..6).map(|_| Some("x")).collect();
        let col = Arc::new(varchar_column("s", vec![rows]));
        let answer: Bitset = [true, false, true, false, true, false].into_iter().collect();
        let ngram = Arc::new(FixedNgramIndex {
            answer: Some(answer.clone()),
            not_null: Bitset::new(6, true),
        });
        let mut exec = executor(
            UnaryFilterParams::new(col, OpType::PrefixMatch, ScalarValue::String("x".into()))
                .ngram_index(ngram)
                .batch_size(4),
        );
        let (res, _) = collect_all(&mut exec);
        assert_eq!(res, answer.to_vec());
    }

    struct FixedJsonKeyIndex {
        entries: Vec<JsonKeyEntry>,
        seen_pointer: std::sync::Mutex<Option<String>>,
    }

    impl JsonKeyIndex for FixedJsonKeyIndex {
        fn filter_by_path(
            &self,
            pointer: &str,
            active_count: usize,
            _is_growing: bool,
            _strong_consistency: bool,
            filter: &mut dyn FnMut(&[JsonKeyEntry], &mut Bitset),
        ) -> Result<Bitset> {
            *self.seen_pointer.lock().unwrap() = Some(pointer.to_string());
            let mut bits = Bitset::new(active_count, false);
            filter(&self.entries, &mut bits);
            Ok(bits)
        }
    }

    #[test]
    fn test_json_key_index_inline_and_fallback() {
        let col = Arc::new(json_column(
            "j",
            vec![vec![
                Some(json!({"k": 5})),
                Some(json!({"k": 4.0})),
                Some(json!({"k": {"deep": 1}})),
                Some(json!({"k": 5})),
            ]],
        ));
        let index = Arc::new(FixedJsonKeyIndex {
            entries: vec![
                JsonKeyEntry::inline(0, JsonInlineValue::Int64(5)),
                JsonKeyEntry::inline(1, JsonInlineValue::Double(4.0)),
                // row 2 could not be inlined: resolved from the column
                JsonKeyEntry::fallback(2),
                JsonKeyEntry::fallback(3),
            ],
            seen_pointer: std::sync::Mutex::new(None),
        });
        let mut exec = executor(
            UnaryFilterParams::new(col, OpType::Equal, ScalarValue::Int64(5))
                .nested_path(vec!["k".into()])
                .json_key_index(index.clone()),
        );
        let (res, valid) = collect_all(&mut exec);
        assert_eq!(res, vec![true, false, false, true]);
        assert_eq!(valid, vec![true, true, true, true]);
        assert_eq!(index.seen_pointer.lock().unwrap().as_deref(), Some("/k"));
    }

    #[test]
    fn test_json_key_index_null_docs_agree_with_scan() {
        // null documents must be invalid on both paths
        let rows = vec![
            Some(json!({"k": 1})),
            None,
            Some(json!({"k": 2})),
            None,
        ];
        let col = Arc::new(json_column("j", vec![rows.clone()]));
        let col_scan = Arc::new(json_column("j", vec![rows]));
        let index = Arc::new(FixedJsonKeyIndex {
            entries: vec![
                JsonKeyEntry::inline(0, JsonInlineValue::Int64(1)),
                JsonKeyEntry::inline(2, JsonInlineValue::Int64(2)),
            ],
            seen_pointer: std::sync::Mutex::new(None),
        });
        let mut via_index = executor(
            UnaryFilterParams::new(col, OpType::Equal, ScalarValue::Int64(1))
                .nested_path(vec!["k".into()])
                .json_key_index(index.clone()),
        );
        let mut via_scan = executor(
            UnaryFilterParams::new(col_scan, OpType::Equal, ScalarValue::Int64(1))
                .nested_path(vec!["k".into()]),
        );
        let (index_res, index_valid) = collect_all(&mut via_index);
        let (scan_res, scan_valid) = collect_all(&mut via_scan);
        assert_eq!(index_res, scan_res);
        assert_eq!(index_valid, scan_valid);
        assert_eq!(index_valid, vec![true, false, true, false]);
        assert!(index.seen_pointer.lock().unwrap().is_some());
    }

    #[test]
    fn test_json_key_index_excluded_for_inner_match() {
        // InnerMatch on strings cannot use the key index; result must come
        // from the scan and still be correct
        let col = Arc::new(json_column(
            "j",
            vec![vec![Some(json!({"k": "apple"})), Some(json!({"k": "pear"}))]],
        ));
        let index = Arc::new(FixedJsonKeyIndex {
            entries: vec![],
            seen_pointer: std::sync::Mutex::new(None),
        });
        let mut exec = executor(
            UnaryFilterParams::new(
                col,
                OpType::InnerMatch,
                ScalarValue::String("pp".into()),
            )
            .nested_path(vec!["k".into()])
            .json_key_index(index.clone()),
        );
        let (res, _) = collect_all(&mut exec);
        assert_eq!(res, vec![true, false]);
        assert!(index.seen_pointer.lock().unwrap().is_none());
    }

    #[test]
    fn test_json_array_suffix_pointer_goes_through_fallback() {
        let col = Arc::new(json_column(
            "j",
            vec![vec![
                Some(json!({"k": [10, 20]})),
                Some(json!({"k": [10]})),
            ]],
        ));
        let index = Arc::new(FixedJsonKeyIndex {
            entries: vec![
                JsonKeyEntry::inline(0, JsonInlineValue::Int64(999)),
                JsonKeyEntry::fallback(1),
            ],
            seen_pointer: std::sync::Mutex::new(None),
        });
        // predicate on k/1: only row 0 has a second element
        let mut exec = executor(
            UnaryFilterParams::new(col, OpType::Equal, ScalarValue::Int64(20))
                .nested_path(vec!["k".into(), "1".into()])
                .json_key_index(index.clone()),
        );
        let (res, _) = collect_all(&mut exec);
        assert_eq!(res, vec![true, false]);
        // the index was queried with the prefix, not the element pointer
        assert_eq!(index.seen_pointer.lock().unwrap().as_deref(), Some("/k"));
    }

    #[test]
    fn test_array_index_path_matches_scan() {
        let rows = vec![
            Some(int_array(&[1, 2])),
            Some(int_array(&[2, 1])),
            Some(int_array(&[1, 2, 3])),
            None,
            Some(int_array(&[1, 2])),
        ];
        // element index: a row qualifies for an element when it contains it
        struct ContainsIndex {
            rows: Vec<Option<Vec<i64>>>,
        }
        impl ScalarIndex for ContainsIndex {
            fn apply(&self, _op: OpType, value: &ScalarValue) -> Result<Bitset> {
                let needle = value.as_i64().unwrap_or(i64::MIN);
                Ok(self
                    .rows
                    .iter()
                    .map(|r| matches!(r, Some(vals) if vals.contains(&needle)))
                    .collect())
            }
            fn index_type(&self) -> ScalarIndexType {
                ScalarIndexType::Inverted
            }
            fn is_not_null(&self) -> Bitset {
                self.rows.iter().map(|r| r.is_some()).collect()
            }
        }
        let index = Arc::new(ContainsIndex {
            rows: rows
                .iter()
                .map(|r| {
                    r.as_ref().map(|a| {
                        a.values
                            .iter()
                            .filter_map(|v| v.as_i64())
                            .collect::<Vec<i64>>()
                    })
                })
                .collect(),
        });
        let lit = ScalarValue::Array(int_array(&[1, 2]));

        let col = Arc::new(array_column("arr", vec![rows.clone()]));
        let col_scan = Arc::new(array_column("arr", vec![rows]));
        for op in [OpType::Equal, OpType::NotEqual] {
            let mut via_index = executor(
                UnaryFilterParams::new(col.clone(), op, lit.clone())
                    .element_type(DataType::Int64)
                    .scalar_index(index.clone()),
            );
            let mut via_scan =
                executor(UnaryFilterParams::new(col_scan.clone(), op, lit.clone()));
            assert_eq!(
                collect_all(&mut via_index),
                collect_all(&mut via_scan),
                "op {:?}",
                op
            );
        }
    }

    #[test]
    fn test_array_index_hybrid_backend_falls_back() {
        let rows = vec![Some(int_array(&[7]))];
        let index = Arc::new({
            let mut idx = VecScalarIndex::new(vec![Some(ScalarValue::Int64(7))]);
            idx.kind = ScalarIndexType::Hybrid;
            idx
        });
        let col = Arc::new(array_column("arr", vec![rows]));
        let mut exec = executor(
            UnaryFilterParams::new(
                col,
                OpType::Equal,
                ScalarValue::Array(int_array(&[7])),
            )
            .element_type(DataType::Int64)
            .scalar_index(index.clone()),
        );
        let (res, _) = collect_all(&mut exec);
        assert_eq!(res, vec![true]);
        // hybrid backends never serve the array path
        assert_eq!(index.applies.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_skip_stats_keep_results_exact() {
        // chunks far outside the literal range are skipped; results must be
        // identical to a full scan
        let chunks: Vec<Vec<Option<i32>>> = vec![
            (0..10).map(Some).collect(),
            (100..110).map(Some).collect(),
            (5..15).map(Some).collect(),
        ];
        let col = Arc::new(int32_column("a", chunks.clone()));
        let mut exec = executor(
            UnaryFilterParams::new(col, OpType::GreaterThan, ScalarValue::Int64(50))
                .batch_size(8),
        );
        let (res, _) = collect_all(&mut exec);
        let expect: Vec<bool> = chunks
            .into_iter()
            .flatten()
            .map(|v| v.unwrap() > 50)
            .collect();
        assert_eq!(res, expect);
    }

    #[test]
    fn test_bool_column() {
        let chunk = Chunk::new(ChunkData::Bool(vec![true, false, true]), None).unwrap();
        let col = Arc::new(column_from_chunks("b", DataType::Bool, vec![chunk]));
        let mut exec = executor(UnaryFilterParams::new(
            col,
            OpType::Equal,
            ScalarValue::Bool(true),
        ));
        let (res, _) = collect_all(&mut exec);
        assert_eq!(res, vec![true, false, true]);
    }

    #[test]
    fn test_type_mismatch_rejected_at_construction() {
        let col = Arc::new(int32_column("a", vec![vec![Some(1)]]));
        let err = UnaryFilterExecutor::new(UnaryFilterParams::new(
            col,
            OpType::Equal,
            ScalarValue::String("1".into()),
        ))
        .err()
        .unwrap();
        assert_eq!(err.kind(), vexdb_core::ErrorKind::DataTypeInvalid);
    }

    #[test]
    fn test_active_count_bounds_scan() {
        let col = Arc::new(int32_column(
            "a",
            vec![(0..10).map(|i| Some(i)).collect()],
        ));
        let mut exec = executor(
            UnaryFilterParams::new(col, OpType::GreaterEqual, ScalarValue::Int64(0))
                .active_count(6),
        );
        let (res, _) = collect_all(&mut exec);
        assert_eq!(res.len(), 6);
        assert!(res.iter().all(|&b| b));
    }

    #[test]
    fn test_random_data_offsets_agree_with_sequential() {
        use rand::{rngs::StdRng, Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(0x5eed);
        let rows: Vec<Option<i32>> = (0..200)
            .map(|_| {
                if rng.gen_bool(0.1) {
                    None
                } else {
                    Some(rng.gen_range(-50..50))
                }
            })
            .collect();
        let chunks: Vec<Vec<Option<i32>>> = rows.chunks(23).map(|c| c.to_vec()).collect();
        let col = Arc::new(int32_column("a", chunks));

        let mut sequential = executor(
            UnaryFilterParams::new(
                col.clone(),
                OpType::GreaterThan,
                ScalarValue::Int64(7),
            )
            .batch_size(64),
        );
        let (seq_res, seq_valid) = collect_all(&mut sequential);

        // the same rows through the offset path, in shuffled order
        let mut order: Vec<i64> = (0..200).collect();
        for i in (1..order.len()).rev() {
            order.swap(i, rng.gen_range(0..=i));
        }
        let mut by_offsets = executor(UnaryFilterParams::new(
            col,
            OpType::GreaterThan,
            ScalarValue::Int64(7),
        ));
        let batch = by_offsets
            .next_batch(&EvalContext {
                offsets: Some(&order),
                bitmap_input: None,
            })
            .unwrap()
            .unwrap();
        for (i, &row) in order.iter().enumerate() {
            assert_eq!(batch.result.get(i), seq_res[row as usize], "row {}", row);
            assert_eq!(batch.valid.get(i), seq_valid[row as usize], "row {}", row);
        }
    }

    #[test]
    fn test_pointer_helpers() {
        assert_eq!(json_pointer(&["a".into(), "b/c".into()]), "/a/b~1c");
        assert_eq!(
            split_array_suffix("/k/0/x"),
            ("/k".to_string(), "/0/x".to_string())
        );
        assert_eq!(split_array_suffix("/k"), ("/k".to_string(), String::new()));
        assert_eq!(
            split_array_suffix("/k/x0"),
            ("/k/x0".to_string(), String::new())
        );
    }
}
