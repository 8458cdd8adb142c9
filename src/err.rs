// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Harness Error Codes
//!
//! Errors are configuration problems: the environment cannot support the
//! requested test. Hardware misbehaviour is never an `Err`, it is a failed
//! report.

use core::fmt;

/// Errors raised while setting up the GIC and ITS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GicError {
    /// Page allocator could not satisfy a request
    NoMemory { order: u32 },

    /// A fixed-size descriptor pool is full
    PoolExhausted { pool: &'static str, capacity: usize },

    /// Allocating another command would overwrite an unconsumed entry
    QueueFull,

    /// Hardware did not reach the expected state in time
    Timeout { what: &'static str },

    /// Required hardware block is missing
    NotPresent { what: &'static str },

    /// Invalid arguments
    InvalidArgs,
}

/// Result type used across the harness
pub type Result<T> = core::result::Result<T, GicError>;

impl fmt::Display for GicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GicError::NoMemory { order } => write!(f, "out of memory (order {})", order),
            GicError::PoolExhausted { pool, capacity } => {
                write!(f, "{} pool exhausted ({} entries)", pool, capacity)
            }
            GicError::QueueFull => write!(f, "ITS command queue full"),
            GicError::Timeout { what } => write!(f, "timeout waiting for {}", what),
            GicError::NotPresent { what } => write!(f, "{} not present", what),
            GicError::InvalidArgs => write!(f, "invalid arguments"),
        }
    }
}
