// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Bit Manipulation Utilities
//!
//! Field helpers for packing and unpacking GIC registers and ITS
//! command words.

/// Mask covering bits `high..=low`
#[inline]
pub const fn genmask(high: u32, low: u32) -> u64 {
    (!0u64 >> (63 - high)) & (!0u64 << low)
}

/// Extract a bitfield from a value
///
/// # Arguments
///
/// * `value` - The value to extract from
/// * `high` - High bit position (inclusive)
/// * `low` - Low bit position (inclusive)
///
/// # Examples
///
/// ```
/// use gictest::bits::bits_shift;
/// assert_eq!(bits_shift(0xf0u64, 7, 4), 0xf);
/// ```
#[inline]
pub fn bits_shift<T: Into<u64>>(value: T, high: u32, low: u32) -> u64 {
    (value.into() & genmask(high, low)) >> low
}

/// Replace bits `high..=low` of `value` with `field`
///
/// Bits of `field` that do not fit are dropped.
#[inline]
pub const fn set_field(value: u64, high: u32, low: u32, field: u64) -> u64 {
    let mask = genmask(high, low);
    (value & !mask) | ((field << low) & mask)
}

/// Check if a bit is set
#[inline]
pub fn is_bit_set<T: Into<u64>>(value: T, bit: u32) -> bool {
    (value.into() & (1u64 << bit)) != 0
}

/// Round up to next power of 2
#[inline]
pub const fn round_up_pow2(value: u64) -> u64 {
    if value <= 1 {
        1
    } else {
        1u64 << (64 - (value - 1).leading_zeros())
    }
}

/// Smallest `order` such that `2^order >= count`
#[inline]
pub const fn order_for(count: u64) -> u32 {
    round_up_pow2(count).trailing_zeros()
}

// ============================================================================
// Tests
// ============================================================================
