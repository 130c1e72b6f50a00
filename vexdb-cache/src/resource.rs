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

//! Two-dimensional resource accounting values.

use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

use serde::{Deserialize, Serialize};

/// A `{memory, disk}` byte pair. All budget arithmetic is dimension-wise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub memory_bytes: u64,
    pub disk_bytes: u64,
}

impl ResourceUsage {
    pub const fn new(memory_bytes: u64, disk_bytes: u64) -> Self {
        Self {
            memory_bytes,
            disk_bytes,
        }
    }

    pub const fn memory(bytes: u64) -> Self {
        Self::new(bytes, 0)
    }

    pub const fn disk(bytes: u64) -> Self {
        Self::new(0, bytes)
    }

    pub fn is_zero(&self) -> bool {
        self.memory_bytes == 0 && self.disk_bytes == 0
    }

    /// Dimension-wise `self <= other`.
    pub fn fits_within(&self, other: &ResourceUsage) -> bool {
        self.memory_bytes <= other.memory_bytes && self.disk_bytes <= other.disk_bytes
    }

    /// Dimension-wise `self >= other` (e.g. "freed covers the deficit").
    pub fn covers(&self, other: &ResourceUsage) -> bool {
        self.memory_bytes >= other.memory_bytes && self.disk_bytes >= other.disk_bytes
    }

    pub fn saturating_sub(&self, other: &ResourceUsage) -> ResourceUsage {
        ResourceUsage {
            memory_bytes: self.memory_bytes.saturating_sub(other.memory_bytes),
            disk_bytes: self.disk_bytes.saturating_sub(other.disk_bytes),
        }
    }
}

impl Add for ResourceUsage {
    type Output = ResourceUsage;

    fn add(self, rhs: ResourceUsage) -> ResourceUsage {
        ResourceUsage {
            memory_bytes: self.memory_bytes + rhs.memory_bytes,
            disk_bytes: self.disk_bytes + rhs.disk_bytes,
        }
    }
}

impl AddAssign for ResourceUsage {
    fn add_assign(&mut self, rhs: ResourceUsage) {
        self.memory_bytes += rhs.memory_bytes;
        self.disk_bytes += rhs.disk_bytes;
    }
}

impl Sub for ResourceUsage {
    type Output = ResourceUsage;

    fn sub(self, rhs: ResourceUsage) -> ResourceUsage {
        self.saturating_sub(&rhs)
    }
}

impl SubAssign for ResourceUsage {
    fn sub_assign(&mut self, rhs: ResourceUsage) {
        *self = self.saturating_sub(&rhs);
    }
}

impl fmt::Display for ResourceUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mem={}B disk={}B",
            self.memory_bytes, self.disk_bytes
        )
    }
}
