//! # Cartframe - Byte-Addressable Files on Cartridge Storage
//!
//! `cartframe` layers named, seekable files over a slow device that only
//! moves whole 1024-byte frames addressed by `(cartridge, frame)`:
//!
//! - **Frame allocation**: an ownership grid assigns free frames to files;
//!   a file's chain is the set of frames it owns, in grid scan order
//! - **Byte-range engine**: arbitrary reads and writes are split into
//!   per-frame copies with read-before-write for partial frames
//! - **Frame cache**: fixed-capacity, strict LRU, write-through
//! - **Transports**: a TCP bus client and an in-memory device
//!
//! ## Quick Start
//!
//! ```rust
//! use cartframe::{FrameStore, MemoryDevice, Result, StoreConfig};
//!
//! # fn main() -> Result<()> {
//! let config = StoreConfig {
//!     cartridges: 2,
//!     frames_per_cartridge: 64,
//!     cache_frames: 16,
//!     ..StoreConfig::default()
//! };
//! let device = MemoryDevice::new(config.geometry()?);
//! let mut store = FrameStore::new(config, device)?;
//! store.power_on()?;
//!
//! let handle = store.open("notes.txt")?;
//! store.write(handle, b"Hello, cartridge!")?;
//! store.seek(handle, 7)?;
//! assert_eq!(store.read_to_vec(handle, 64)?, b"cartridge!");
//!
//! store.close(handle)?;
//! store.power_off()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ FrameStore: open / close / read / write /    │
//! │             seek                             │
//! ├──────────────┬───────────────┬───────────────┤
//! │ FileTable    │ FrameMap      │ FrameCache    │
//! │ cursor + end │ owner grid    │ LRU, stamps   │
//! ├──────────────┴───────────────┴───────────────┤
//! │ CartBus: LOAD_CARTRIDGE bookkeeping          │
//! ├──────────────────────────────────────────────┤
//! │ DeviceTransport: TcpTransport | MemoryDevice │
//! └──────────────────────────────────────────────┘
//! ```

pub mod allocator;
pub mod config;
pub mod error;
pub mod file_table;
pub mod frame_cache;
pub mod geometry;
pub mod io;
pub mod register;
pub mod shared;
pub mod store;
pub mod workload;

// Re-export commonly used types
pub use allocator::FrameMap;
pub use config::StoreConfig;
pub use error::{CartError, Result};
pub use file_table::{FileEntry, FileHandle, FileTable};
pub use frame_cache::{CacheStats, FrameCache, DEFAULT_CACHE_FRAMES};
pub use geometry::{Frame, FrameSlot, Geometry, FRAME_SIZE};
pub use io::memory::MemoryDevice;
pub use io::tcp::TcpTransport;
pub use io::{CartBus, DeviceTransport, Response};
pub use register::{Opcode, Register};
pub use shared::SharedStore;
pub use store::FrameStore;
pub use workload::{Report, Workload};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
