// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! ARM GIC (Generic Interrupt Controller)
//!
//! The harness tests GICv3 with an ITS. A GICv2 is recognised so the
//! run can report it as unsupported rather than crash on it.

pub mod v3;

use crate::reg::PAddr;

/// GIC architecture revision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GicVersion {
    V2 = 2,
    V3 = 3,
}

/// Physical register frames of the interrupt controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GicBases {
    pub version: GicVersion,
    /// Distributor
    pub dist: PAddr,
    /// First redistributor frame; frames for every CPU follow contiguously
    pub redist: PAddr,
    /// ITS control frame, if the platform has one
    pub its: Option<PAddr>,
}
