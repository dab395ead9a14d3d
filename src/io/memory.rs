//! In-process cartridge device
//!
//! Implements the bus protocol strictly: frame access is only accepted on
//! the loaded cartridge, and nothing but `INIT_MEDIA` is accepted before the
//! media is initialized. Frames that were never written read back as zeros.

use super::{DeviceTransport, Response};
use crate::error::{CartError, Result};
use crate::geometry::{zeroed_frame, Frame, FrameSlot, Geometry};
use crate::register::{Opcode, Register};
use std::collections::HashMap;

/// Simulated device backed by memory
#[derive(Debug)]
pub struct MemoryDevice {
    geometry: Geometry,
    /// Written frames (absent = zero)
    frames: HashMap<FrameSlot, Box<Frame>>,
    initialized: bool,
    loaded: Option<u16>,
    /// Commands received, per opcode
    counts: HashMap<Opcode, u64>,
    /// Remaining successful exchanges before the link drops
    fail_after: Option<u64>,
}

impl MemoryDevice {
    pub fn new(geometry: Geometry) -> Self {
        MemoryDevice {
            geometry,
            frames: HashMap::new(),
            initialized: false,
            loaded: None,
            counts: HashMap::new(),
            fail_after: None,
        }
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Number of commands received with `opcode`
    pub fn count(&self, opcode: Opcode) -> u64 {
        self.counts.get(&opcode).copied().unwrap_or(0)
    }

    pub fn reset_counts(&mut self) {
        self.counts.clear();
    }

    /// Drop the link after `exchanges` more successful requests
    pub fn fail_after(&mut self, exchanges: u64) {
        self.fail_after = Some(exchanges);
    }

    /// Current contents of a frame, bypassing the protocol
    pub fn peek(&self, slot: FrameSlot) -> Box<Frame> {
        self.frames.get(&slot).cloned().unwrap_or_else(zeroed_frame)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn frame_access_ok(&self, register: &Register) -> bool {
        self.initialized
            && self.loaded == Some(register.cartridge)
            && (register.frame as usize) < self.geometry.frames_per_cartridge()
    }

    fn execute(&mut self, register: Register, payload: Option<&Frame>) -> Response {
        let rejected = Response {
            register: register.failure(),
            payload: None,
        };
        let ok = Response {
            register: register.success(),
            payload: None,
        };

        match register.opcode {
            Opcode::InitMedia => {
                self.initialized = true;
                self.loaded = None;
                ok
            }
            _ if !self.initialized => rejected,
            Opcode::LoadCartridge => {
                if (register.cartridge as usize) >= self.geometry.cartridges() {
                    return rejected;
                }
                self.loaded = Some(register.cartridge);
                ok
            }
            Opcode::ZeroCartridge => {
                if self.loaded != Some(register.cartridge) {
                    return rejected;
                }
                self.frames
                    .retain(|slot, _| slot.cartridge != register.cartridge);
                ok
            }
            Opcode::ReadFrame => {
                if !self.frame_access_ok(&register) {
                    return rejected;
                }
                let slot = FrameSlot::new(register.cartridge, register.frame);
                Response {
                    register: register.success(),
                    payload: Some(self.peek(slot)),
                }
            }
            Opcode::WriteFrame => {
                let Some(data) = payload else {
                    return rejected;
                };
                if !self.frame_access_ok(&register) {
                    return rejected;
                }
                let slot = FrameSlot::new(register.cartridge, register.frame);
                self.frames.insert(slot, Box::new(*data));
                ok
            }
            Opcode::PowerOff => {
                self.initialized = false;
                self.loaded = None;
                ok
            }
        }
    }
}

impl DeviceTransport for MemoryDevice {
    fn request(&mut self, register: Register, payload: Option<&Frame>) -> Result<Response> {
        if let Some(remaining) = self.fail_after.as_mut() {
            if *remaining == 0 {
                return Err(CartError::Transport(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "device link dropped",
                )));
            }
            *remaining -= 1;
        }

        *self.counts.entry(register.opcode).or_insert(0) += 1;
        Ok(self.execute(register, payload))
    }
}
