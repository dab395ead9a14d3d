//! 64-bit command register shared with the device
//!
//! Layout (bit 63 is the most significant):
//!
//! ```text
//! ┌──────────┬──────────┬──────────────┬──────────────┬──────────────┐
//! │ 63..56   │ 55..48   │ 47..32       │ 31..16       │ 15..0        │
//! │ opcode   │ key1     │ cartridge id │ frame id     │ reserved     │
//! └──────────┴──────────┴──────────────┴──────────────┴──────────────┘
//! ```
//!
//! Requests leave the reserved bits zero. In responses bit 0 carries the
//! device return code (0 = success).

use crate::error::{CartError, Result};
use serde::{Deserialize, Serialize};

const OPCODE_SHIFT: u32 = 56;
const KEY1_SHIFT: u32 = 48;
const CARTRIDGE_SHIFT: u32 = 32;
const FRAME_SHIFT: u32 = 16;
const RETURN_CODE_BIT: u64 = 1;
const RESERVED_MASK: u64 = 0xFFFF;

/// Device operations
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    /// Initialize the media (first command of a session)
    InitMedia = 0,
    /// Zero every frame of the loaded cartridge
    ZeroCartridge = 1,
    /// Make a cartridge the target of frame operations
    LoadCartridge = 2,
    /// Read one frame of the loaded cartridge
    ReadFrame = 3,
    /// Write one frame of the loaded cartridge
    WriteFrame = 4,
    /// Shut the device down
    PowerOff = 5,
}

impl Opcode {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Opcode::InitMedia),
            1 => Ok(Opcode::ZeroCartridge),
            2 => Ok(Opcode::LoadCartridge),
            3 => Ok(Opcode::ReadFrame),
            4 => Ok(Opcode::WriteFrame),
            5 => Ok(Opcode::PowerOff),
            other => Err(CartError::InvalidRegister(format!("unknown opcode {}", other))),
        }
    }

    /// Whether the request carries a frame payload to the device
    pub fn sends_payload(self) -> bool {
        self == Opcode::WriteFrame
    }

    /// Whether the response carries a frame payload back
    pub fn receives_payload(self) -> bool {
        self == Opcode::ReadFrame
    }
}

/// Decoded command register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Register {
    pub opcode: Opcode,
    pub key1: u8,
    pub cartridge: u16,
    pub frame: u16,
    /// Device return code (responses only)
    pub failed: bool,
}

impl Register {
    /// Build a request with zero keys
    pub fn request(opcode: Opcode, cartridge: u16, frame: u16) -> Self {
        Register {
            opcode,
            key1: 0,
            cartridge,
            frame,
            failed: false,
        }
    }

    /// Build a request from the full command tuple
    ///
    /// `key2` has no field in the register layout and must be zero.
    pub fn command(opcode: Opcode, key1: u8, key2: u8, cartridge: u16, frame: u16) -> Result<Self> {
        if key2 != 0 {
            return Err(CartError::InvalidRegister(format!(
                "key2 must be zero, got {}",
                key2
            )));
        }
        Ok(Register {
            key1,
            ..Register::request(opcode, cartridge, frame)
        })
    }

    /// Successful response echoing this request
    pub fn success(self) -> Self {
        Register {
            failed: false,
            ..self
        }
    }

    /// Failed response echoing this request
    pub fn failure(self) -> Self {
        Register {
            failed: true,
            ..self
        }
    }

    pub fn encode(&self) -> u64 {
        ((self.opcode as u64) << OPCODE_SHIFT)
            | ((self.key1 as u64) << KEY1_SHIFT)
            | ((self.cartridge as u64) << CARTRIDGE_SHIFT)
            | ((self.frame as u64) << FRAME_SHIFT)
            | if self.failed { RETURN_CODE_BIT } else { 0 }
    }

    pub fn decode(raw: u64) -> Result<Self> {
        if raw & RESERVED_MASK & !RETURN_CODE_BIT != 0 {
            return Err(CartError::InvalidRegister(format!(
                "reserved bits set in {:#018x}",
                raw
            )));
        }
        Ok(Register {
            opcode: Opcode::from_u8((raw >> OPCODE_SHIFT) as u8)?,
            key1: (raw >> KEY1_SHIFT) as u8,
            cartridge: (raw >> CARTRIDGE_SHIFT) as u16,
            frame: (raw >> FRAME_SHIFT) as u16,
            failed: raw & RETURN_CODE_BIT != 0,
        })
    }

    /// Network byte order representation
    pub fn to_bytes(&self) -> [u8; 8] {
        self.encode().to_be_bytes()
    }

    pub fn from_bytes(bytes: [u8; 8]) -> Result<Self> {
        Register::decode(u64::from_be_bytes(bytes))
    }
}
