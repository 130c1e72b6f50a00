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

//! VexDB Tiered Cell Cache
//!
//! A pinning, resource-accounted cache that fronts a pluggable loader (the
//! [`Translator`]). Each column owns a [`CacheSlot`] of cells; pinning a set
//! of cells reserves budget, triggers at most one concurrent load per cell,
//! and hands back a [`CellAccessor`] whose pins keep every requested cell
//! resident until the accessor is dropped.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                       CacheSlot<T>                          │
//! │  uid → cid mapping       ┌──────────┐ ┌──────────┐          │
//! │  pin / load coordination │  Cell 0  │ │  Cell 1  │  ...     │
//! │                          └────┬─────┘ └────┬─────┘          │
//! └───────────────────────────────┼────────────┼────────────────┘
//!                                 │  evictable (pin_count == 0)
//!                        ┌────────▼────────────▼────────┐
//!                        │        ResourceBudget         │
//!                        │  used / reserved / limit      │
//!                        │  LRU of unpinned loaded cells │
//!                        └──────────────┬────────────────┘
//!                                       │ bulk get_cells
//!                               ┌───────▼────────┐
//!                               │   Translator    │
//!                               └────────────────┘
//! ```
//!
//! ## Concurrency model
//!
//! [`CacheSlot::pin_cells`] is non-blocking: it returns an inert
//! [`PinRequest`] and no work starts until `wait()` is called. Concurrent
//! waiters on the same cell block on that cell's condvar broadcast; exactly
//! one of them observes the NOT_LOADED → LOADING edge and runs the
//! Translator. Dropping a request after another requester started the load
//! does not abort that load; pins are simply released.

pub mod accessor;
pub mod budget;
pub mod cell;
pub mod config;
pub mod resource;
pub mod slot;
pub mod translator;

pub use accessor::{CellAccessor, PinWrapper};
pub use budget::ResourceBudget;
pub use cell::{CellPayload, CellPin};
pub use config::{CacheConfig, CacheStats, CacheStatsSnapshot};
pub use resource::ResourceUsage;
pub use slot::{CacheSlot, PinRequest};
pub use translator::{CellId, CellIdMapping, Meta, StorageKind, Translator, Uid, WarmupPolicy};
