// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! ITS Capability and Table Descriptors
//!
//! Decoders for GITS_TYPER and GITS_BASER<n>, the encoder that turns a
//! table descriptor back into a register value, and the fixed pools
//! that hold devices and collections.

use crate::bits::{bits_shift, is_bit_set};
use crate::err::{GicError, Result};
use crate::kernel::dev::interrupt::arm_gic::v3::regs::{Cacheability, Shareability, GITS_PA_MASK};
use crate::reg::PAddr;

/// Decoded GITS_TYPER
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ItsTyper {
    /// Bytes per ITT entry
    pub ite_size: u32,
    pub eventid_bits: u32,
    pub deviceid_bits: u32,
    pub collid_bits: u32,
    /// Collections held in the ITS itself
    pub hw_collections: u32,
    /// Targets are redistributor addresses rather than PE numbers
    pub pta: bool,
    pub cil: bool,
    pub cct: bool,
    pub phys_lpi: bool,
    pub virt_lpi: bool,
}

impl ItsTyper {
    pub fn parse(typer: u64) -> Self {
        let cil = is_bit_set(typer, 36);
        Self {
            ite_size: bits_shift(typer, 7, 4) as u32 + 1,
            eventid_bits: bits_shift(typer, 12, 8) as u32 + 1,
            deviceid_bits: bits_shift(typer, 17, 13) as u32 + 1,
            collid_bits: if cil {
                bits_shift(typer, 35, 32) as u32 + 1
            } else {
                16
            },
            hw_collections: bits_shift(typer, 31, 24) as u32,
            pta: is_bit_set(typer, 19),
            cil,
            cct: is_bit_set(typer, 20),
            phys_lpi: is_bit_set(typer, 0),
            virt_lpi: is_bit_set(typer, 1),
        }
    }
}

/// GITS_BASER<n>.Type
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaserType {
    None = 0,
    Device = 1,
    Vcpu = 2,
    Cpu = 3,
    Collection = 4,
    Reserved = 5,
}

impl BaserType {
    pub const fn from_bits(bits: u64) -> Self {
        match bits {
            0 => BaserType::None,
            1 => BaserType::Device,
            2 => BaserType::Vcpu,
            3 => BaserType::Cpu,
            4 => BaserType::Collection,
            _ => BaserType::Reserved,
        }
    }
}

/// Page size encodings of GITS_BASER<n>.Page_Size
pub const ITS_PAGE_4K: usize = 4 * 1024;
pub const ITS_PAGE_16K: usize = 16 * 1024;
pub const ITS_PAGE_64K: usize = 64 * 1024;

/// Decoded GITS_BASER<n>
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItsBaser {
    pub index: usize,
    pub table_type: BaserType,
    /// Bytes per table entry
    pub esz: u32,
    /// Page size in bytes
    pub psz: usize,
    pub nr_pages: usize,
    pub table_addr: PAddr,
    pub valid: bool,
    pub indirect: bool,
    pub cache: Cacheability,
    pub outer_cache: Cacheability,
    pub shr: Shareability,
}

impl ItsBaser {
    /// Decode the value of GITS_BASER<`index`>
    ///
    /// An all-zero register is unimplemented and decodes to `None`.
    pub fn parse(index: usize, raw: u64) -> Option<Self> {
        if raw == 0 {
            return None;
        }

        let psz = match bits_shift(raw, 9, 8) {
            0 => ITS_PAGE_4K,
            1 => ITS_PAGE_16K,
            _ => ITS_PAGE_64K,
        };

        Some(Self {
            index,
            table_type: BaserType::from_bits(bits_shift(raw, 58, 56)),
            esz: bits_shift(raw, 52, 48) as u32 + 1,
            psz,
            nr_pages: bits_shift(raw, 7, 0) as usize + 1,
            table_addr: raw & GITS_PA_MASK,
            valid: is_bit_set(raw, 63),
            indirect: is_bit_set(raw, 62),
            cache: Cacheability::from_bits(bits_shift(raw, 61, 59)),
            outer_cache: Cacheability::from_bits(bits_shift(raw, 55, 53)),
            shr: Shareability::from_bits(bits_shift(raw, 11, 10)),
        })
    }

    /// Bytes covered by the table
    pub fn table_bytes(&self) -> usize {
        self.nr_pages * self.psz
    }

    /// Register value for this descriptor
    pub fn encode(&self) -> u64 {
        let psz = match self.psz {
            ITS_PAGE_4K => 0,
            ITS_PAGE_16K => 1,
            _ => 2,
        };
        ((self.valid as u64) << 63)
            | ((self.indirect as u64) << 62)
            | ((self.cache as u64) << 59)
            | ((self.table_type as u64 & 0x7) << 56)
            | ((self.outer_cache as u64) << 53)
            | (((self.esz as u64).saturating_sub(1) & 0x1f) << 48)
            | (self.table_addr & GITS_PA_MASK)
            | ((self.shr as u64) << 10)
            | (psz << 8)
            | ((self.nr_pages as u64).saturating_sub(1) & 0xff)
    }
}

/// A device known to the ITS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItsDevice {
    pub device_id: u32,
    /// Interrupt translation entries requested by the caller
    pub nr_ites: u32,
    /// EventID width the ITT is sized for
    pub eventid_bits: u8,
    pub itt: PAddr,
}

/// A collection and the redistributor it targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItsCollection {
    pub col_id: u16,
    /// Redistributor base (PTA=1) or processor number << 16 (PTA=0)
    pub target_address: u64,
}

/// Fixed-capacity, append-only descriptor pool
#[derive(Debug)]
pub struct DescPool<T: Copy, const N: usize> {
    name: &'static str,
    slots: [Option<T>; N],
    len: usize,
}

impl<T: Copy, const N: usize> DescPool<T, N> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            slots: [None; N],
            len: 0,
        }
    }

    /// Take the next slot
    pub fn push(&mut self, item: T) -> Result<&T> {
        if self.len == N {
            log::error!("ITS: {} pool exhausted ({} entries)", self.name, N);
            return Err(GicError::PoolExhausted {
                pool: self.name,
                capacity: N,
            });
        }
        let slot = &mut self.slots[self.len];
        self.len += 1;
        Ok(slot.insert(item))
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.slots[..self.len].iter().flatten()
    }

    pub fn find(&self, pred: impl Fn(&T) -> bool) -> Option<&T> {
        self.iter().find(|item| pred(item))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typer_decode() {
        // ITT entry 8 bytes, 16 EventID bits, 16 DeviceID bits, PTA, PLPIS
        let raw: u64 = (7 << 4) | (15 << 8) | (15 << 13) | (1 << 19) | 1;
        let t = ItsTyper::parse(raw);
        assert_eq!(t.ite_size, 8);
        assert_eq!(t.eventid_bits, 16);
        assert_eq!(t.deviceid_bits, 16);
        assert!(t.pta);
        assert!(t.phys_lpi);
        assert!(!t.virt_lpi);
        assert!(!t.cil);
        assert_eq!(t.collid_bits, 16);
    }

    #[test]
    fn test_typer_cil() {
        let t = ItsTyper::parse((1 << 36) | (7 << 32) | (4 << 24) | 2);
        assert!(t.cil);
        assert_eq!(t.collid_bits, 8);
        assert_eq!(t.hw_collections, 4);
        assert!(t.virt_lpi);
        assert!(!t.pta);
    }

    #[test]
    fn test_baser_decode() {
        // Collection table, esz 8, 64K pages, 2 pages, RaWaWb inner-shareable
        let raw: u64 = (1 << 63)
            | (7 << 59)
            | (4 << 56)
            | (7 << 48)
            | 0x4020_0000
            | (1 << 10)
            | (2 << 8)
            | 1;
        let b = ItsBaser::parse(3, raw).unwrap();
        assert_eq!(b.index, 3);
        assert_eq!(b.table_type, BaserType::Collection);
        assert_eq!(b.esz, 8);
        assert_eq!(b.psz, ITS_PAGE_64K);
        assert_eq!(b.nr_pages, 2);
        assert_eq!(b.table_bytes(), 128 * 1024);
        assert_eq!(b.table_addr, 0x4020_0000);
        assert!(b.valid);
        assert!(!b.indirect);
        assert_eq!(b.cache, Cacheability::RaWaWb);
        assert_eq!(b.shr, Shareability::InnerShareable);
        assert_eq!(b.encode(), raw);
    }

    #[test]
    fn test_baser_unimplemented() {
        assert!(ItsBaser::parse(5, 0).is_none());
        let psz3 = ItsBaser::parse(0, (1 << 56) | (3 << 8)).unwrap();
        assert_eq!(psz3.psz, ITS_PAGE_64K);
        assert_eq!(psz3.table_type, BaserType::Device);
        assert_eq!(psz3.nr_pages, 1);
    }

    #[test]
    fn test_pool_exhaustion() {
        let mut pool: DescPool<ItsCollection, 2> = DescPool::new("collection");
        assert!(pool.is_empty());
        pool.push(ItsCollection { col_id: 3, target_address: 3 << 16 }).unwrap();
        pool.push(ItsCollection { col_id: 2, target_address: 2 << 16 }).unwrap();
        assert_eq!(
            pool.push(ItsCollection { col_id: 1, target_address: 0 }),
            Err(GicError::PoolExhausted { pool: "collection", capacity: 2 })
        );
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.find(|c| c.col_id == 2).map(|c| c.target_address), Some(2 << 16));
        assert!(pool.find(|c| c.col_id == 1).is_none());
    }
}
