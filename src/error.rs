use crate::geometry::FrameSlot;
use crate::register::Opcode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CartError {
    #[error("Invalid file handle: {0}")]
    InvalidHandle(u16),

    #[error("Out of space: no free frames available")]
    Exhausted,

    #[error("Frame {slot} is not resident in the cache")]
    NotResident { slot: FrameSlot },

    #[error("Frame chain of handle {handle} is corrupt after {after}")]
    ChainCorruption { handle: u16, after: FrameSlot },

    #[error("Transport failure: {0}")]
    Transport(#[from] std::io::Error),

    #[error("Device rejected {opcode:?} (cartridge {cartridge}, frame {frame})")]
    DeviceRejected {
        opcode: Opcode,
        cartridge: u16,
        frame: u16,
    },

    #[error("Invalid command register: {0}")]
    InvalidRegister(String),

    #[error("Frame cache is already initialized")]
    CacheAlreadyInitialized,

    #[error("Frame cache is not initialized")]
    CacheNotInitialized,

    #[error("Invalid cache capacity: {0}")]
    InvalidCapacity(usize),

    #[error("Seek to {offset} is beyond the end of the file ({length} bytes)")]
    SeekOutOfRange { offset: u64, length: u64 },

    #[error("File table is full")]
    TableFull,

    #[error("Invalid file name: {0:?}")]
    InvalidName(String),

    #[error("File is already open: {0}")]
    AlreadyOpen(String),

    #[error("Device is not powered on")]
    NotPoweredOn,

    #[error("Device is already powered on")]
    AlreadyPoweredOn,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Workload error at line {line}: {message}")]
    Workload { line: usize, message: String },
}

pub type Result<T> = std::result::Result<T, CartError>;

impl From<toml::de::Error> for CartError {
    fn from(err: toml::de::Error) -> Self {
        CartError::Config(err.to_string())
    }
}
