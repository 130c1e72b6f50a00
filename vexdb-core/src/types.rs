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

//! Scalar value model of the filter engine.
//!
//! Predicates are dispatched over tagged unions (`DataType`, `OpType`,
//! `ScalarValue`) plus a small set of comparison helpers, instead of
//! monomorphizing every op-and-type combination. Mixed-type JSON comparison
//! rules (integer-vs-double widening, string-only-matches-string) are
//! encoded once in [`compare_json_ordered`] and shared by every JSON path.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{Error, Result};

// ============================================================================
// Data Types
// ============================================================================

/// Column data types understood by the segment engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Float,
    Double,
    /// Variable-length UTF-8 string (VARCHAR and STRING collapse here).
    Varchar,
    Json,
    Array,
    VectorArray,
}

impl DataType {
    /// Integral types subject to the literal overflow pre-check.
    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64
        )
    }

    pub fn is_floating(&self) -> bool {
        matches!(self, DataType::Float | DataType::Double)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integral() || self.is_floating()
    }

    /// Fixed-width types stored as plain vectors in a chunk.
    pub fn is_primitive(&self) -> bool {
        self.is_numeric() || *self == DataType::Bool
    }

    /// Inclusive representable range for integral types, as i64.
    pub fn integral_bounds(&self) -> Option<(i64, i64)> {
        match self {
            DataType::Int8 => Some((i8::MIN as i64, i8::MAX as i64)),
            DataType::Int16 => Some((i16::MIN as i64, i16::MAX as i64)),
            DataType::Int32 => Some((i32::MIN as i64, i32::MAX as i64)),
            DataType::Int64 => Some((i64::MIN, i64::MAX)),
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// Operators
// ============================================================================

/// Unary range / match operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpType {
    GreaterThan,
    GreaterEqual,
    LessThan,
    LessEqual,
    Equal,
    NotEqual,
    PrefixMatch,
    PostfixMatch,
    InnerMatch,
    Match,
    TextMatch,
    PhraseMatch,
}

impl OpType {
    /// Plain ordering / equality comparisons.
    pub fn is_range(&self) -> bool {
        matches!(
            self,
            OpType::GreaterThan
                | OpType::GreaterEqual
                | OpType::LessThan
                | OpType::LessEqual
                | OpType::Equal
                | OpType::NotEqual
        )
    }

    /// Substring family servable by an n-gram index.
    pub fn is_like_family(&self) -> bool {
        matches!(
            self,
            OpType::PrefixMatch | OpType::PostfixMatch | OpType::InnerMatch | OpType::Match
        )
    }

    /// Tokenized text queries, servable only by a full-text index.
    pub fn is_text_family(&self) -> bool {
        matches!(self, OpType::TextMatch | OpType::PhraseMatch)
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Ordering / equality comparison over any partially ordered type.
///
/// Callers validate the operator before entering a scan loop; a non-range
/// operator compares false here.
#[inline]
pub fn compare_scalar<T: PartialOrd + ?Sized>(op: OpType, lhs: &T, rhs: &T) -> bool {
    match op {
        OpType::GreaterThan => lhs > rhs,
        OpType::GreaterEqual => lhs >= rhs,
        OpType::LessThan => lhs < rhs,
        OpType::LessEqual => lhs <= rhs,
        OpType::Equal => lhs == rhs,
        OpType::NotEqual => lhs != rhs,
        _ => false,
    }
}

// ============================================================================
// Scalar Values
// ============================================================================

/// A typed literal (or ARRAY element) in a predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalarValue {
    Bool(bool),
    Int64(i64),
    Float64(f64),
    String(String),
    Array(ArrayValue),
}

impl ScalarValue {
    pub fn data_type(&self) -> DataType {
        match self {
            ScalarValue::Bool(_) => DataType::Bool,
            ScalarValue::Int64(_) => DataType::Int64,
            ScalarValue::Float64(_) => DataType::Double,
            ScalarValue::String(_) => DataType::Varchar,
            ScalarValue::Array(_) => DataType::Array,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ScalarValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ScalarValue::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view with integer-to-double widening.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Int64(v) => Some(*v as f64),
            ScalarValue::Float64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScalarValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayValue> {
        match self {
            ScalarValue::Array(a) => Some(a),
            _ => None,
        }
    }

    /// The literal as the exact i64 required by an integral column.
    pub fn require_i64(&self) -> Result<i64> {
        self.as_i64().ok_or_else(|| {
            Error::DataTypeInvalid(format!(
                "expected int64 literal, got {}",
                self.data_type()
            ))
        })
    }

    pub fn require_str(&self) -> Result<&str> {
        self.as_str().ok_or_else(|| {
            Error::DataTypeInvalid(format!(
                "expected string literal, got {}",
                self.data_type()
            ))
        })
    }
}

// ============================================================================
// Array Values
// ============================================================================

/// An ARRAY payload: a typed element list. Used both for stored rows and for
/// whole-array literals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayValue {
    pub element_type: DataType,
    pub values: Vec<ScalarValue>,
}

impl ArrayValue {
    pub fn new(element_type: DataType, values: Vec<ScalarValue>) -> Self {
        Self {
            element_type,
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&ScalarValue> {
        self.values.get(idx)
    }

    /// Whole-array deep equality. Element values compare with numeric
    /// widening; the declared element type is not part of equality, so a
    /// generic literal array can match a typed column row.
    pub fn is_same_array(&self, other: &ArrayValue) -> bool {
        self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(&other.values)
                .all(|(a, b)| compare_scalar_values(a, b, OpType::Equal))
    }

    /// Deep equality against a JSON array, element-wise with the JSON
    /// mixed-type equality rules.
    pub fn deep_eq_json(&self, arr: &[JsonValue]) -> bool {
        self.values.len() == arr.len()
            && self
                .values
                .iter()
                .zip(arr)
                .all(|(s, j)| json_eq_scalar(j, s))
    }
}

/// A VECTOR_ARRAY payload: a row holding a list of fixed-dimension vectors,
/// flattened for contiguity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorArrayValue {
    pub dim: usize,
    pub data: Vec<f32>,
}

impl VectorArrayValue {
    pub fn new(dim: usize, data: Vec<f32>) -> Self {
        debug_assert!(dim > 0 && data.len() % dim == 0);
        Self { dim, data }
    }

    pub fn num_vectors(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.data.len() / self.dim
        }
    }

    pub fn vector(&self, i: usize) -> Option<&[f32]> {
        let start = i.checked_mul(self.dim)?;
        self.data.get(start..start + self.dim)
    }
}

/// Ordering / equality of two scalars with numeric widening.
///
/// Int64 and Float64 compare across each other through f64 (exact i64
/// comparison when both sides are integers); any other type pairing is a
/// mismatch, which is false for every operator except `NotEqual`.
pub fn compare_scalar_values(lhs: &ScalarValue, rhs: &ScalarValue, op: OpType) -> bool {
    match (lhs, rhs) {
        (ScalarValue::Bool(a), ScalarValue::Bool(b)) => compare_scalar(op, a, b),
        (ScalarValue::Int64(a), ScalarValue::Int64(b)) => compare_scalar(op, a, b),
        (ScalarValue::String(a), ScalarValue::String(b)) => compare_scalar(op, a, b),
        (ScalarValue::Array(a), ScalarValue::Array(b)) => match op {
            OpType::Equal => a.is_same_array(b),
            OpType::NotEqual => !a.is_same_array(b),
            _ => false,
        },
        (a, b) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => compare_scalar(op, &x, &y),
            _ => op == OpType::NotEqual,
        },
    }
}

// ============================================================================
// Integral Overflow Pre-Check
// ============================================================================

/// Whether an i64 literal lies outside the representable range of an
/// integral column type.
pub fn int_out_of_range(dt: DataType, val: i64) -> bool {
    match dt.integral_bounds() {
        Some((lo, hi)) => val < lo || val > hi,
        None => false,
    }
}

/// Literal is below every representable value of the column type.
pub fn int_below_lower_bound(dt: DataType, val: i64) -> bool {
    matches!(dt.integral_bounds(), Some((lo, _)) if val < lo)
}

/// Literal is above every representable value of the column type.
pub fn int_above_upper_bound(dt: DataType, val: i64) -> bool {
    matches!(dt.integral_bounds(), Some((_, hi)) if val > hi)
}

// ============================================================================
// JSON Mixed-Type Comparison
// ============================================================================

/// Equality of one JSON value against one scalar, with numeric widening.
///
/// INT64 and DOUBLE compare across each other through f64; STRING only
/// matches STRING; BOOL only matches BOOL. Arrays recurse element-wise.
pub fn json_eq_scalar(json: &JsonValue, literal: &ScalarValue) -> bool {
    match literal {
        ScalarValue::Bool(b) => json.as_bool() == Some(*b),
        ScalarValue::Int64(v) => match json {
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    i == *v
                } else {
                    n.as_f64() == Some(*v as f64)
                }
            }
            _ => false,
        },
        ScalarValue::Float64(v) => json.as_f64() == Some(*v),
        ScalarValue::String(s) => json.as_str() == Some(s.as_str()),
        ScalarValue::Array(a) => match json.as_array() {
            Some(arr) => a.deep_eq_json(arr),
            None => false,
        },
    }
}

/// Ordering / equality of a resolved JSON value against a scalar literal.
///
/// `json` is `None` when the pointer lookup failed (missing key or document
/// null); that resolves to false for every operator except `NotEqual`, which
/// treats null as distinct from any literal. Type mismatches follow the same
/// rule. Array literals only participate in `Equal` / `NotEqual`, and a
/// non-array value compares false for both.
pub fn compare_json_ordered(json: Option<&JsonValue>, literal: &ScalarValue, op: OpType) -> bool {
    let json = match json {
        Some(v) => v,
        None => return op == OpType::NotEqual,
    };

    if let ScalarValue::Array(a) = literal {
        return match (op, json.as_array()) {
            (OpType::Equal, Some(arr)) => a.deep_eq_json(arr),
            (OpType::NotEqual, Some(arr)) => !a.deep_eq_json(arr),
            // Unlike the scalar case, a non-array value under an array
            // literal is false even for NotEqual.
            _ => false,
        };
    }

    match literal {
        ScalarValue::Bool(b) => match json.as_bool() {
            Some(v) => compare_scalar(op, &v, b),
            None => op == OpType::NotEqual,
        },
        ScalarValue::Int64(v) => match json {
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    compare_scalar(op, &i, v)
                } else {
                    match n.as_f64() {
                        Some(f) => compare_scalar(op, &f, &(*v as f64)),
                        None => op == OpType::NotEqual,
                    }
                }
            }
            _ => op == OpType::NotEqual,
        },
        ScalarValue::Float64(v) => match json.as_f64() {
            Some(f) => compare_scalar(op, &f, v),
            None => op == OpType::NotEqual,
        },
        ScalarValue::String(s) => match json.as_str() {
            Some(v) => compare_scalar(op, &v, &s.as_str()),
            None => op == OpType::NotEqual,
        },
        ScalarValue::Array(_) => unreachable!("array literals handled above"),
    }
}
