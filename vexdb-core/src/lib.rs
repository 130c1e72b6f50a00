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

//! VexDB Core
//!
//! Shared foundation of the segment engine: error types, the scalar value
//! model used by filter predicates, and the dense bitsets that carry filter
//! results between operators.
//!
//! # Core Components
//!
//! - **Error model**: one engine-wide error enum with stable kinds, cloneable
//!   so a single failure can be broadcast to many waiters
//! - **Value model**: `DataType` / `OpType` / `ScalarValue` tagged unions;
//!   comparisons are dispatched over these rather than monomorphized per
//!   op-and-type pair
//! - **Bitsets**: length-aware dense bitsets with slice-append, the common
//!   currency of every filter path

pub mod bitset;
pub mod error;
pub mod types;

pub use bitset::Bitset;
pub use error::{Error, ErrorKind, Result};
pub use types::{ArrayValue, DataType, OpType, ScalarValue, VectorArrayValue};
