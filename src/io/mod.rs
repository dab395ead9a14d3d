//! Device I/O for the cartridge bus
//!
//! A [`DeviceTransport`] moves one command register (and at most one frame
//! payload) to the device and returns its response. [`CartBus`] layers the
//! protocol rules on top: it remembers which cartridge is loaded and issues
//! `LOAD_CARTRIDGE` before any frame access that targets another one.

pub mod memory;
pub mod tcp;

use crate::error::{CartError, Result};
use crate::geometry::{Frame, FrameSlot};
use crate::register::{Opcode, Register};
use tracing::trace;

/// Response to a single device command
#[derive(Debug)]
pub struct Response {
    pub register: Register,
    /// Frame payload (`READ_FRAME` only)
    pub payload: Option<Box<Frame>>,
}

/// One synchronous request/response exchange with the device
pub trait DeviceTransport {
    fn request(&mut self, register: Register, payload: Option<&Frame>) -> Result<Response>;
}

impl<T: DeviceTransport + ?Sized> DeviceTransport for Box<T> {
    fn request(&mut self, register: Register, payload: Option<&Frame>) -> Result<Response> {
        (**self).request(register, payload)
    }
}

/// Protocol layer over a transport
pub struct CartBus<T> {
    transport: T,
    /// Cartridge targeted by frame operations, if any
    loaded: Option<u16>,
}

impl<T: DeviceTransport> CartBus<T> {
    pub fn new(transport: T) -> Self {
        CartBus {
            transport,
            loaded: None,
        }
    }

    /// Send a command and fail on a device-reported error
    pub fn send(&mut self, register: Register, payload: Option<&Frame>) -> Result<Response> {
        trace!(
            opcode = ?register.opcode,
            cartridge = register.cartridge,
            frame = register.frame,
            "bus request"
        );
        let response = match self.transport.request(register, payload) {
            Ok(response) => response,
            Err(err) => {
                // The link may come back as a fresh device session.
                self.loaded = None;
                return Err(err);
            }
        };
        if response.register.failed {
            return Err(CartError::DeviceRejected {
                opcode: register.opcode,
                cartridge: register.cartridge,
                frame: register.frame,
            });
        }
        Ok(response)
    }

    pub fn init_media(&mut self) -> Result<()> {
        self.loaded = None;
        self.send(Register::request(Opcode::InitMedia, 0, 0), None)?;
        Ok(())
    }

    /// Load `cartridge` unless it is already the loaded one
    pub fn load(&mut self, cartridge: u16) -> Result<()> {
        if self.loaded == Some(cartridge) {
            return Ok(());
        }
        self.send(Register::request(Opcode::LoadCartridge, cartridge, 0), None)?;
        self.loaded = Some(cartridge);
        Ok(())
    }

    pub fn zero_cartridge(&mut self, cartridge: u16) -> Result<()> {
        self.load(cartridge)?;
        self.send(Register::request(Opcode::ZeroCartridge, cartridge, 0), None)?;
        Ok(())
    }

    pub fn read_frame(&mut self, slot: FrameSlot) -> Result<Box<Frame>> {
        self.load(slot.cartridge)?;
        let response = self.send(
            Register::request(Opcode::ReadFrame, slot.cartridge, slot.frame),
            None,
        )?;
        response.payload.ok_or_else(|| {
            CartError::InvalidRegister(format!("READ_FRAME response for {} has no payload", slot))
        })
    }

    pub fn write_frame(&mut self, slot: FrameSlot, payload: &Frame) -> Result<()> {
        self.load(slot.cartridge)?;
        self.send(
            Register::request(Opcode::WriteFrame, slot.cartridge, slot.frame),
            Some(payload),
        )?;
        Ok(())
    }

    pub fn power_off(&mut self) -> Result<()> {
        self.loaded = None;
        self.send(Register::request(Opcode::PowerOff, 0, 0), None)?;
        Ok(())
    }

    /// Forget the loaded cartridge so the next frame access reloads
    pub fn reset_loaded(&mut self) {
        self.loaded = None;
    }

    pub fn loaded_cartridge(&self) -> Option<u16> {
        self.loaded
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}
