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

//! Typed literal preparation.
//!
//! The literal of a predicate is validated and converted to the column's
//! execution domain once per plan execution, not once per batch: integral
//! columns get an exact i64, floating columns a widened f64, and the
//! substring family a string. The integral overflow pre-check runs against
//! the raw i64 before any scan, so both the data and the index path see the
//! same short-circuit.

use vexdb_core::types::{
    int_above_upper_bound, int_below_lower_bound, int_out_of_range, DataType, OpType, ScalarValue,
};
use vexdb_core::{Error, Result};

/// Outcome of the integral overflow pre-check: the whole batch resolves
/// without touching data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OverflowShortCircuit {
    /// Every valid row matches (`result = valid`).
    AllTrue,
    /// No row matches.
    AllFalse,
}

/// Check an integral column's literal against the representable range.
/// `None` means no short-circuit: the literal is in range (or the column is
/// not integral).
pub(crate) fn precheck_overflow(
    column_type: DataType,
    op: OpType,
    literal: &ScalarValue,
) -> Result<Option<OverflowShortCircuit>> {
    if !column_type.is_integral() {
        return Ok(None);
    }
    let val = literal.require_i64()?;
    if !int_out_of_range(column_type, val) {
        return Ok(None);
    }
    let hit = match op {
        OpType::GreaterThan | OpType::GreaterEqual => {
            if int_below_lower_bound(column_type, val) {
                OverflowShortCircuit::AllTrue
            } else {
                OverflowShortCircuit::AllFalse
            }
        }
        OpType::LessThan | OpType::LessEqual => {
            if int_above_upper_bound(column_type, val) {
                OverflowShortCircuit::AllTrue
            } else {
                OverflowShortCircuit::AllFalse
            }
        }
        OpType::Equal => OverflowShortCircuit::AllFalse,
        OpType::NotEqual => OverflowShortCircuit::AllTrue,
        other => {
            return Err(Error::OpTypeInvalid(format!(
                "operator {} not valid for integral range check",
                other
            )))
        }
    };
    Ok(Some(hit))
}

/// Validate the literal against the column's execution domain and widen it
/// where the domain requires (i64 → f64 for floating columns).
///
/// JSON and ARRAY columns accept any literal; their kernels dispatch on the
/// literal type row by row.
pub(crate) fn normalize_literal(
    column_type: DataType,
    op: OpType,
    literal: &ScalarValue,
) -> Result<ScalarValue> {
    if op.is_like_family() || op.is_text_family() {
        // the whole match family operates on strings
        return match literal {
            ScalarValue::String(_) => Ok(literal.clone()),
            other => Err(Error::DataTypeInvalid(format!(
                "match operator {} requires a string literal, got {}",
                op,
                other.data_type()
            ))),
        };
    }
    match column_type {
        DataType::Bool => match literal {
            ScalarValue::Bool(_) => Ok(literal.clone()),
            other => Err(Error::DataTypeInvalid(format!(
                "bool column compared with {}",
                other.data_type()
            ))),
        },
        DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => {
            literal.require_i64().map(ScalarValue::Int64)
        }
        DataType::Float | DataType::Double => match literal.as_f64() {
            Some(v) => Ok(ScalarValue::Float64(v)),
            None => Err(Error::DataTypeInvalid(format!(
                "floating column compared with {}",
                literal.data_type()
            ))),
        },
        DataType::Varchar => literal
            .require_str()
            .map(|s| ScalarValue::String(s.to_string())),
        DataType::Json | DataType::Array => Ok(literal.clone()),
        DataType::VectorArray => Err(Error::DataTypeInvalid(
            "vector array columns cannot be filtered".into(),
        )),
    }
}
