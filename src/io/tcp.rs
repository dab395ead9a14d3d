//! TCP transport to a remote cartridge bus
//!
//! Wire format per exchange:
//! - request: 8-byte big-endian register, then the 1024-byte frame for `WRITE_FRAME`
//! - response: 8-byte big-endian register, then the 1024-byte frame for `READ_FRAME`
//!
//! The connection is opened on the first request and closed after `POWER_OFF`.

use super::{DeviceTransport, Response};
use crate::error::Result;
use crate::geometry::{zeroed_frame, Frame};
use crate::register::{Opcode, Register};
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, info};

/// Default address of the bus server
pub const DEFAULT_SERVER_ADDRESS: &str = "127.0.0.1:19876";

/// Bus client over a single TCP stream
#[derive(Debug)]
pub struct TcpTransport {
    address: String,
    timeout: Option<Duration>,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    pub fn new(address: impl Into<String>) -> Self {
        TcpTransport {
            address: address.into(),
            timeout: None,
            stream: None,
        }
    }

    /// Apply a read/write timeout to the socket; zero means no timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout).filter(|timeout| !timeout.is_zero());
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn connect(&self) -> Result<TcpStream> {
        let socket_addr = self
            .address
            .as_str()
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::AddrNotAvailable,
                    format!("no address resolved for {}", self.address),
                )
            })?;
        let stream = TcpStream::connect(socket_addr)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(self.timeout)?;
        stream.set_write_timeout(self.timeout)?;
        info!("Connected to cartridge bus at {}", socket_addr);
        Ok(stream)
    }

    fn exchange(
        stream: &mut TcpStream,
        register: Register,
        payload: Option<&Frame>,
    ) -> Result<Response> {
        stream.write_all(&register.to_bytes())?;
        if register.opcode.sends_payload() {
            let frame = payload.ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "WRITE_FRAME requires a payload",
                )
            })?;
            stream.write_all(frame)?;
        }
        stream.flush()?;

        let mut raw = [0u8; 8];
        stream.read_exact(&mut raw)?;
        let response = Register::from_bytes(raw)?;

        let payload = if register.opcode.receives_payload() {
            let mut frame = zeroed_frame();
            stream.read_exact(&mut frame[..])?;
            Some(frame)
        } else {
            None
        };

        Ok(Response {
            register: response,
            payload,
        })
    }
}

impl DeviceTransport for TcpTransport {
    fn request(&mut self, register: Register, payload: Option<&Frame>) -> Result<Response> {
        let mut stream = match self.stream.take() {
            Some(stream) => stream,
            None => self.connect()?,
        };

        let result = Self::exchange(&mut stream, register, payload);
        if result.is_err() || register.opcode == Opcode::PowerOff {
            let _ = stream.shutdown(std::net::Shutdown::Both);
            debug!("Disconnected from cartridge bus at {}", self.address);
        } else {
            self.stream = Some(stream);
        }
        result
    }
}
