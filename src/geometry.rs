//! Device geometry and frame addressing
//!
//! The device is a grid of cartridges, each holding a fixed number of
//! 1024-byte frames. Slots are ordered cartridge-major; that order is the
//! scan order used to discover a file's frame chain.

use crate::error::{CartError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Size of one frame in bytes (the device's transfer granularity)
pub const FRAME_SIZE: usize = 1024;

/// Default number of cartridges on the device
pub const DEFAULT_CARTRIDGES: usize = 64;

/// Default number of frames in each cartridge
pub const DEFAULT_FRAMES_PER_CARTRIDGE: usize = 1024;

/// Largest count addressable through a 16-bit register field
const MAX_FIELD_COUNT: usize = 1 << 16;

/// One frame payload
pub type Frame = [u8; FRAME_SIZE];

/// Allocate a zeroed frame on the heap
pub fn zeroed_frame() -> Box<Frame> {
    Box::new([0u8; FRAME_SIZE])
}

/// Address of a frame on the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FrameSlot {
    pub cartridge: u16,
    pub frame: u16,
}

impl FrameSlot {
    pub const fn new(cartridge: u16, frame: u16) -> Self {
        FrameSlot { cartridge, frame }
    }
}

impl fmt::Display for FrameSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.cartridge, self.frame)
    }
}

/// Shape of the device: cartridges × frames per cartridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    cartridges: usize,
    frames_per_cartridge: usize,
}

impl Geometry {
    /// Create a geometry, rejecting shapes the register cannot address
    pub fn new(cartridges: usize, frames_per_cartridge: usize) -> Result<Self> {
        if cartridges == 0 || cartridges > MAX_FIELD_COUNT {
            return Err(CartError::Config(format!(
                "cartridge count must be in 1..={}, got {}",
                MAX_FIELD_COUNT, cartridges
            )));
        }
        if frames_per_cartridge == 0 || frames_per_cartridge > MAX_FIELD_COUNT {
            return Err(CartError::Config(format!(
                "frames per cartridge must be in 1..={}, got {}",
                MAX_FIELD_COUNT, frames_per_cartridge
            )));
        }
        Ok(Geometry {
            cartridges,
            frames_per_cartridge,
        })
    }

    pub fn cartridges(&self) -> usize {
        self.cartridges
    }

    pub fn frames_per_cartridge(&self) -> usize {
        self.frames_per_cartridge
    }

    /// Total number of frame slots on the device
    pub fn total_frames(&self) -> usize {
        self.cartridges * self.frames_per_cartridge
    }

    pub fn contains(&self, slot: FrameSlot) -> bool {
        (slot.cartridge as usize) < self.cartridges
            && (slot.frame as usize) < self.frames_per_cartridge
    }

    /// Position of a slot in scan order
    pub fn index_of(&self, slot: FrameSlot) -> usize {
        slot.cartridge as usize * self.frames_per_cartridge + slot.frame as usize
    }

    /// Slot at a scan-order position
    ///
    /// Callers must pass an index below `total_frames()`.
    pub fn slot_at(&self, index: usize) -> FrameSlot {
        FrameSlot {
            cartridge: (index / self.frames_per_cartridge) as u16,
            frame: (index % self.frames_per_cartridge) as u16,
        }
    }

    /// The slot following `slot` in scan order, rolling over to frame 0 of
    /// the next cartridge
    pub fn next(&self, slot: FrameSlot) -> Option<FrameSlot> {
        let next = self.index_of(slot) + 1;
        (next < self.total_frames()).then(|| self.slot_at(next))
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Geometry {
            cartridges: DEFAULT_CARTRIDGES,
            frames_per_cartridge: DEFAULT_FRAMES_PER_CARTRIDGE,
        }
    }
}
