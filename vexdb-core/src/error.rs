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

//! Error types for the segment engine.
//!
//! A failed cache load is delivered to every waiter that attached to the
//! cell, so `Error` is `Clone`: source errors are flattened into the message
//! at construction instead of being carried as boxed causes.

use thiserror::Error;

/// Stable identifier for an error class, independent of its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    OutOfRange,
    InsufficientResource,
    DataTypeInvalid,
    OpTypeInvalid,
    Unsupported,
    FileReadFailed,
    InvalidParameter,
    Unknown,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("out of range: {0}")]
    OutOfRange(String),

    #[error("insufficient resource: {0}")]
    InsufficientResource(String),

    #[error("invalid data type: {0}")]
    DataTypeInvalid(String),

    #[error("invalid operator: {0}")]
    OpTypeInvalid(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("file read failed: {0}")]
    FileReadFailed(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl Error {
    /// The stable kind of this error, for callers that dispatch on class
    /// rather than message.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::OutOfRange(_) => ErrorKind::OutOfRange,
            Error::InsufficientResource(_) => ErrorKind::InsufficientResource,
            Error::DataTypeInvalid(_) => ErrorKind::DataTypeInvalid,
            Error::OpTypeInvalid(_) => ErrorKind::OpTypeInvalid,
            Error::Unsupported(_) => ErrorKind::Unsupported,
            Error::FileReadFailed(_) => ErrorKind::FileReadFailed,
            Error::InvalidParameter(_) => ErrorKind::InvalidParameter,
            Error::Unknown(_) => ErrorKind::Unknown,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::FileReadFailed(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_is_stable_across_messages() {
        let a = Error::InsufficientResource("need 100 bytes".into());
        let b = Error::InsufficientResource("need 200 bytes".into());
        assert_eq!(a.kind(), b.kind());
        assert_ne!(a, b);
    }

    #[test]
    fn test_error_is_cloneable_for_broadcast() {
        let e = Error::FileReadFailed("segment chunk 3".into());
        let copies: Vec<Error> = (0..4).map(|_| e.clone()).collect();
        for c in copies {
            assert_eq!(c.kind(), ErrorKind::FileReadFailed);
        }
    }

    #[test]
    fn test_io_error_maps_to_file_read_failed() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let e: Error = io.into();
        assert_eq!(e.kind(), ErrorKind::FileReadFailed);
    }
}
