// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! ITS Command Encoding
//!
//! Every ITS command is four little-endian 64-bit words. A command is
//! described by an [`ItsCmdDesc`] and turned into an [`ItsCmdBlock`] by
//! [`ItsCmdDesc::build`], which only sets the architected fields of the
//! opcode and leaves everything else zero.
//!
//! # Field Layout
//!
//! | Field      | Word | Bits    |
//! |------------|------|---------|
//! | opcode     | 0    | [7:0]   |
//! | DeviceID   | 0    | [63:32] |
//! | EventID    | 1    | [31:0]  |
//! | pINTID     | 1    | [63:32] |
//! | Size       | 1    | [4:0]   |
//! | ITT_addr   | 2    | [47:8]  |
//! | Valid      | 2    | [63]    |
//! | RDbase     | 2    | [47:16] |
//! | ICID       | 2    | [15:0]  |

use crate::bits::{bits_shift, genmask, set_field};
use crate::reg::PAddr;
use core::fmt;

/// ITS command opcodes
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItsOpcode {
    Movi = 0x01,
    Int = 0x03,
    Clear = 0x04,
    Sync = 0x05,
    Mapd = 0x08,
    Mapc = 0x09,
    Mapti = 0x0a,
    Mapi = 0x0b,
    Inv = 0x0c,
    Invall = 0x0d,
    Movall = 0x0e,
    Discard = 0x0f,
}

impl ItsOpcode {
    pub const fn from_u8(op: u8) -> Option<Self> {
        Some(match op {
            0x01 => ItsOpcode::Movi,
            0x03 => ItsOpcode::Int,
            0x04 => ItsOpcode::Clear,
            0x05 => ItsOpcode::Sync,
            0x08 => ItsOpcode::Mapd,
            0x09 => ItsOpcode::Mapc,
            0x0a => ItsOpcode::Mapti,
            0x0b => ItsOpcode::Mapi,
            0x0c => ItsOpcode::Inv,
            0x0d => ItsOpcode::Invall,
            0x0e => ItsOpcode::Movall,
            0x0f => ItsOpcode::Discard,
            _ => return None,
        })
    }

    pub const fn name(self) -> &'static str {
        match self {
            ItsOpcode::Movi => "MOVI",
            ItsOpcode::Int => "INT",
            ItsOpcode::Clear => "CLEAR",
            ItsOpcode::Sync => "SYNC",
            ItsOpcode::Mapd => "MAPD",
            ItsOpcode::Mapc => "MAPC",
            ItsOpcode::Mapti => "MAPTI",
            ItsOpcode::Mapi => "MAPI",
            ItsOpcode::Inv => "INV",
            ItsOpcode::Invall => "INVALL",
            ItsOpcode::Movall => "MOVALL",
            ItsOpcode::Discard => "DISCARD",
        }
    }
}

/// Name of a raw opcode byte, "Unexpected" when it is not a command
pub fn opcode_name(op: u8) -> &'static str {
    ItsOpcode::from_u8(op).map_or("Unexpected", ItsOpcode::name)
}

/// ITT addresses must be 256-byte aligned
pub const ITS_ITT_ALIGN: u64 = 256;

/// One encoded command, as stored in the command queue
#[repr(C, align(32))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ItsCmdBlock {
    pub raw: [u64; 4],
}

impl ItsCmdBlock {
    /// Size of a command in the queue
    pub const SIZE: usize = 32;

    /// Wrap four words read back from the queue
    pub const fn from_raw(raw: [u64; 4]) -> Self {
        Self { raw }
    }

    fn word(&self, n: usize) -> u64 {
        u64::from_le(self.raw[n])
    }

    fn encode_cmd(&mut self, op: ItsOpcode) {
        self.raw[0] = set_field(self.raw[0], 7, 0, op as u64);
    }

    fn encode_devid(&mut self, devid: u32) {
        self.raw[0] = set_field(self.raw[0], 63, 32, devid as u64);
    }

    fn encode_event_id(&mut self, id: u32) {
        self.raw[1] = set_field(self.raw[1], 31, 0, id as u64);
    }

    fn encode_phys_id(&mut self, phys_id: u32) {
        self.raw[1] = set_field(self.raw[1], 63, 32, phys_id as u64);
    }

    fn encode_size(&mut self, size: u8) {
        self.raw[1] = set_field(self.raw[1], 4, 0, size as u64);
    }

    fn encode_itt(&mut self, itt: PAddr) {
        let mask = genmask(47, 8);
        self.raw[2] = (self.raw[2] & !mask) | (itt & mask);
    }

    fn encode_valid(&mut self, valid: bool) {
        self.raw[2] = set_field(self.raw[2], 63, 63, valid as u64);
    }

    fn encode_target(&mut self, target: u64) {
        let mask = genmask(47, 16);
        self.raw[2] = (self.raw[2] & !mask) | (target & mask);
    }

    fn encode_collection(&mut self, col: u16) {
        self.raw[2] = set_field(self.raw[2], 15, 0, col as u64);
    }

    fn fixup(&mut self) {
        for w in self.raw.iter_mut() {
            *w = w.to_le();
        }
    }

    pub fn opcode(&self) -> u8 {
        bits_shift(self.word(0), 7, 0) as u8
    }

    pub fn device_id(&self) -> u32 {
        bits_shift(self.word(0), 63, 32) as u32
    }

    pub fn event_id(&self) -> u32 {
        bits_shift(self.word(1), 31, 0) as u32
    }

    pub fn phys_id(&self) -> u32 {
        bits_shift(self.word(1), 63, 32) as u32
    }

    /// Size field: number of EventID bits minus one
    pub fn size(&self) -> u8 {
        bits_shift(self.word(1), 4, 0) as u8
    }

    pub fn itt(&self) -> PAddr {
        self.word(2) & genmask(47, 8)
    }

    pub fn valid(&self) -> bool {
        self.word(2) & (1 << 63) != 0
    }

    /// Target address, in place (bits [47:16])
    pub fn target(&self) -> u64 {
        self.word(2) & genmask(47, 16)
    }

    pub fn collection(&self) -> u16 {
        bits_shift(self.word(2), 15, 0) as u16
    }
}

/// A command and its operands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItsCmdDesc {
    /// Map a device to its ITT; `eventid_bits` is the EventID width
    Mapd {
        device_id: u32,
        eventid_bits: u8,
        itt: PAddr,
        valid: bool,
    },
    /// Map a collection to a redistributor
    Mapc { col_id: u16, target: u64, valid: bool },
    /// Map an event to an explicit LPI
    Mapti {
        device_id: u32,
        event_id: u32,
        phys_id: u32,
        col_id: u16,
    },
    /// Map an event to the LPI with the same number
    Mapi {
        device_id: u32,
        event_id: u32,
        col_id: u16,
    },
    /// Retarget an event to another collection
    Movi {
        device_id: u32,
        event_id: u32,
        col_id: u16,
    },
    Int { device_id: u32, event_id: u32 },
    Inv { device_id: u32, event_id: u32 },
    Discard { device_id: u32, event_id: u32 },
    Clear { device_id: u32, event_id: u32 },
    Invall { col_id: u16 },
    Sync { target: u64 },
}

impl ItsCmdDesc {
    pub fn opcode(&self) -> ItsOpcode {
        match self {
            ItsCmdDesc::Mapd { .. } => ItsOpcode::Mapd,
            ItsCmdDesc::Mapc { .. } => ItsOpcode::Mapc,
            ItsCmdDesc::Mapti { .. } => ItsOpcode::Mapti,
            ItsCmdDesc::Mapi { .. } => ItsOpcode::Mapi,
            ItsCmdDesc::Movi { .. } => ItsOpcode::Movi,
            ItsCmdDesc::Int { .. } => ItsOpcode::Int,
            ItsCmdDesc::Inv { .. } => ItsOpcode::Inv,
            ItsCmdDesc::Discard { .. } => ItsOpcode::Discard,
            ItsCmdDesc::Clear { .. } => ItsOpcode::Clear,
            ItsCmdDesc::Invall { .. } => ItsOpcode::Invall,
            ItsCmdDesc::Sync { .. } => ItsOpcode::Sync,
        }
    }

    /// Encode the command
    pub fn build(&self) -> ItsCmdBlock {
        let mut cmd = ItsCmdBlock::default();
        cmd.encode_cmd(self.opcode());

        match *self {
            ItsCmdDesc::Mapd {
                device_id,
                eventid_bits,
                itt,
                valid,
            } => {
                cmd.encode_devid(device_id);
                cmd.encode_size(eventid_bits.saturating_sub(1));
                cmd.encode_itt(itt);
                cmd.encode_valid(valid);
            }
            ItsCmdDesc::Mapc {
                col_id,
                target,
                valid,
            } => {
                cmd.encode_collection(col_id);
                cmd.encode_target(target);
                cmd.encode_valid(valid);
            }
            ItsCmdDesc::Mapti {
                device_id,
                event_id,
                phys_id,
                col_id,
            } => {
                cmd.encode_devid(device_id);
                cmd.encode_event_id(event_id);
                cmd.encode_phys_id(phys_id);
                cmd.encode_collection(col_id);
            }
            ItsCmdDesc::Mapi {
                device_id,
                event_id,
                col_id,
            }
            | ItsCmdDesc::Movi {
                device_id,
                event_id,
                col_id,
            } => {
                cmd.encode_devid(device_id);
                cmd.encode_event_id(event_id);
                cmd.encode_collection(col_id);
            }
            ItsCmdDesc::Int { device_id, event_id }
            | ItsCmdDesc::Inv { device_id, event_id }
            | ItsCmdDesc::Discard { device_id, event_id }
            | ItsCmdDesc::Clear { device_id, event_id } => {
                cmd.encode_devid(device_id);
                cmd.encode_event_id(event_id);
            }
            ItsCmdDesc::Invall { col_id } => cmd.encode_collection(col_id),
            ItsCmdDesc::Sync { target } => cmd.encode_target(target),
        }

        cmd.fixup();
        cmd
    }
}

impl fmt::Display for ItsCmdDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ItsCmdDesc::Mapd {
                device_id,
                eventid_bits,
                itt,
                valid,
            } => write!(
                f,
                "MAPD devid={} size = {:#x} itt={:#x} valid={}",
                device_id, eventid_bits, itt, valid as u8
            ),
            ItsCmdDesc::Mapc {
                col_id,
                target,
                valid,
            } => write!(
                f,
                "MAPC col_id={} target_addr = {:#x} valid={}",
                col_id, target, valid as u8
            ),
            ItsCmdDesc::Mapti {
                device_id,
                event_id,
                phys_id,
                col_id,
            } => write!(
                f,
                "MAPTI dev_id={} event_id={} -> phys_id={}, col_id={}",
                device_id, event_id, phys_id, col_id
            ),
            ItsCmdDesc::Mapi {
                device_id,
                event_id,
                col_id,
            } => write!(
                f,
                "MAPI dev_id={} event_id={} col_id={}",
                device_id, event_id, col_id
            ),
            ItsCmdDesc::Movi {
                device_id,
                event_id,
                col_id,
            } => write!(
                f,
                "MOVI dev_id={} event_id = {} col_id={}",
                device_id, event_id, col_id
            ),
            ItsCmdDesc::Int { device_id, event_id } => {
                write!(f, "INT dev_id={} event_id={}", device_id, event_id)
            }
            ItsCmdDesc::Inv { device_id, event_id } => {
                write!(f, "INV dev_id={} event_id={}", device_id, event_id)
            }
            ItsCmdDesc::Discard { device_id, event_id } => {
                write!(f, "DISCARD dev_id={} event_id={}", device_id, event_id)
            }
            ItsCmdDesc::Clear { device_id, event_id } => {
                write!(f, "CLEAR dev_id={} event_id={}", device_id, event_id)
            }
            ItsCmdDesc::Invall { col_id } => write!(f, "INVALL col_id={}", col_id),
            ItsCmdDesc::Sync { target } => write!(f, "SYNC target_addr = {:#x}", target),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
