// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! GICv3 Register Definitions
//!
//! Offsets, bit fields and memory attributes for the distributor,
//! redistributor and ITS frames. Layouts of the frames that matter to
//! the ITS tests are checked at compile time.

use crate::reg::PAddr;
use bitflags::bitflags;
use memoffset::offset_of;

// ============================================================================
// Distributor
// ============================================================================

pub const GICD_CTLR: PAddr = 0x0000;
pub const GICD_TYPER: PAddr = 0x0004;
pub const GICD_IIDR: PAddr = 0x0008;
pub const GICD_PIDR2: PAddr = 0xFFE8;

/// GICD_TYPER.LPIS
pub const GICD_TYPER_LPIS: u32 = 1 << 17;

bitflags! {
    /// GICD_CTLR, non-secure view
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GicdCtlr: u32 {
        const ENABLE_G1 = 1 << 0;
        const ENABLE_G1A = 1 << 1;
        const ARE_NS = 1 << 4;
        const RWP = 1 << 31;
    }
}

// ============================================================================
// Redistributor
// ============================================================================

/// RD_base frame plus SGI_base frame
pub const GICR_FRAME_STRIDE: PAddr = 0x2_0000;

/// Frame stride when VLPI frames are present as well
pub const GICR_FRAME_STRIDE_VLPI: PAddr = 0x4_0000;

/// Offset of the SGI_base frame within a redistributor
pub const GICR_SGI_BASE: PAddr = 0x1_0000;

pub const GICR_CTLR: PAddr = 0x0000;
pub const GICR_IIDR: PAddr = 0x0004;
pub const GICR_TYPER: PAddr = 0x0008;
pub const GICR_WAKER: PAddr = 0x0014;
pub const GICR_PROPBASER: PAddr = 0x0070;
pub const GICR_PENDBASER: PAddr = 0x0078;

/// SGI_base frame registers
pub const GICR_IGROUPR0: PAddr = 0x0080;
pub const GICR_ISENABLER0: PAddr = 0x0100;
pub const GICR_ICENABLER0: PAddr = 0x0180;

/// GICR_TYPER bits
pub const GICR_TYPER_PLPIS: u64 = 1 << 0;
pub const GICR_TYPER_VLPIS: u64 = 1 << 1;
pub const GICR_TYPER_LAST: u64 = 1 << 4;

/// GICR_PROPBASER.IDbits
pub const GICR_PROPBASER_IDBITS_MASK: u64 = 0x1f;

/// LPI INTIDs are 14 bits wide: IDbits field value is width - 1
pub const LPI_ID_BITS: u64 = 13;

/// GICR_PENDBASER.PTZ
pub const GICR_PENDBASER_PTZ: u64 = 1 << 62;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GicrCtlr: u32 {
        const ENABLE_LPIS = 1 << 0;
        const RWP = 1 << 3;
        const UWP = 1 << 31;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GicrWaker: u32 {
        const PROCESSOR_SLEEP = 1 << 1;
        const CHILDREN_ASLEEP = 1 << 2;
    }
}

bitflags! {
    /// One byte of the LPI configuration table
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LpiProp: u8 {
        const ENABLED = 1 << 0;
        const GROUP1 = 1 << 1;
        const PRIORITY_DEFAULT = 0xa0;
    }
}

/// Configuration byte used for every LPI under test
pub const LPI_PROP_DEFAULT: LpiProp = LpiProp::PRIORITY_DEFAULT
    .union(LpiProp::GROUP1)
    .union(LpiProp::ENABLED);

// ============================================================================
// ITS
// ============================================================================

pub const GITS_CTLR: PAddr = 0x0000;
pub const GITS_IIDR: PAddr = 0x0004;
pub const GITS_TYPER: PAddr = 0x0008;
pub const GITS_CBASER: PAddr = 0x0080;
pub const GITS_CWRITER: PAddr = 0x0088;
pub const GITS_CREADR: PAddr = 0x0090;
pub const GITS_BASER: PAddr = 0x0100;

/// Number of GITS_BASER<n> registers
pub const GITS_BASER_NR_REGS: usize = 8;

/// Address of GITS_BASER<n>
#[inline]
pub const fn gits_baser(n: usize) -> PAddr {
    GITS_BASER + 8 * n as PAddr
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GitsCtlr: u32 {
        const ENABLED = 1 << 0;
        const QUIESCENT = 1 << 31;
    }
}

/// GITS_CBASER fields
pub const GITS_CBASER_VALID: u64 = 1 << 63;
pub const GITS_CBASER_INNER_CACHE_SHIFT: u32 = 59;
pub const GITS_CBASER_OUTER_CACHE_SHIFT: u32 = 53;
pub const GITS_CBASER_SHAREABILITY_SHIFT: u32 = 10;
pub const GITS_CBASER_SIZE_MASK: u64 = 0xff;

/// Offset field shared by GITS_CWRITER and GITS_CREADR, bits [19:5]
pub const GITS_CMD_OFFSET_MASK: u64 = 0xf_ffe0;

/// GITS_CREADR.Stalled
pub const GITS_CREADR_STALLED: u64 = 1 << 0;

/// Physical address bits [47:12] of table and queue base registers
pub const GITS_PA_MASK: u64 = 0x0000_ffff_ffff_f000;

/// Cacheability encoding shared by GITS_BASER, GITS_CBASER and the
/// redistributor table registers
#[repr(u64)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cacheability {
    DeviceNgnRnE = 0,
    NonCacheable = 1,
    RaWt = 2,
    RaWb = 3,
    WaWt = 4,
    WaWb = 5,
    RaWaWt = 6,
    RaWaWb = 7,
}

impl Cacheability {
    pub const fn from_bits(bits: u64) -> Self {
        match bits & 0x7 {
            0 => Cacheability::DeviceNgnRnE,
            1 => Cacheability::NonCacheable,
            2 => Cacheability::RaWt,
            3 => Cacheability::RaWb,
            4 => Cacheability::WaWt,
            5 => Cacheability::WaWb,
            6 => Cacheability::RaWaWt,
            _ => Cacheability::RaWaWb,
        }
    }
}

/// Shareability encoding
#[repr(u64)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shareability {
    NonShareable = 0,
    InnerShareable = 1,
    OuterShareable = 2,
}

impl Shareability {
    pub const fn from_bits(bits: u64) -> Self {
        match bits & 0x3 {
            0 => Shareability::NonShareable,
            1 => Shareability::InnerShareable,
            _ => Shareability::OuterShareable,
        }
    }

    /// Shareability that goes with a cacheability: uncached tables are
    /// not coherent with anyone
    pub const fn for_cache(cache: Cacheability) -> Self {
        match cache {
            Cacheability::DeviceNgnRnE | Cacheability::NonCacheable => Shareability::NonShareable,
            _ => Shareability::InnerShareable,
        }
    }
}

// ============================================================================
// Frame Layouts
// ============================================================================

/// Start of the ITS control frame
#[repr(C)]
pub struct GitsFrame {
    pub ctlr: u32,
    pub iidr: u32,
    pub typer: u64,
    _reserved0: [u64; 14],
    pub cbaser: u64,
    pub cwriter: u64,
    pub creadr: u64,
    _reserved1: [u64; 13],
    pub baser: [u64; GITS_BASER_NR_REGS],
}

/// Start of a redistributor RD_base frame
#[repr(C)]
pub struct GicrRdFrame {
    pub ctlr: u32,
    pub iidr: u32,
    pub typer: u64,
    pub statusr: u32,
    pub waker: u32,
    _reserved0: [u32; 22],
    pub propbaser: u64,
    pub pendbaser: u64,
}

const _: () = assert!(offset_of!(GitsFrame, typer) == GITS_TYPER as usize);
const _: () = assert!(offset_of!(GitsFrame, cbaser) == GITS_CBASER as usize);
const _: () = assert!(offset_of!(GitsFrame, cwriter) == GITS_CWRITER as usize);
const _: () = assert!(offset_of!(GitsFrame, creadr) == GITS_CREADR as usize);
const _: () = assert!(offset_of!(GitsFrame, baser) == GITS_BASER as usize);
const _: () = assert!(offset_of!(GicrRdFrame, waker) == GICR_WAKER as usize);
const _: () = assert!(offset_of!(GicrRdFrame, propbaser) == GICR_PROPBASER as usize);
const _: () = assert!(offset_of!(GicrRdFrame, pendbaser) == GICR_PENDBASER as usize);

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lpi_prop_default() {
        assert_eq!(LPI_PROP_DEFAULT.bits(), 0xa3);
        let disabled = LPI_PROP_DEFAULT.difference(LpiProp::ENABLED);
        assert_eq!(disabled.bits(), 0xa2);
        assert!(!disabled.contains(LpiProp::ENABLED));
    }

    #[test]
    fn test_baser_addresses() {
        assert_eq!(gits_baser(0), 0x100);
        assert_eq!(gits_baser(7), 0x138);
    }

    #[test]
    fn test_attribute_decode() {
        assert_eq!(Cacheability::from_bits(7), Cacheability::RaWaWb);
        assert_eq!(Shareability::from_bits(1), Shareability::InnerShareable);
        assert_eq!(
            Shareability::for_cache(Cacheability::NonCacheable),
            Shareability::NonShareable
        );
    }
}
