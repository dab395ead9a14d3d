//! Byte-addressable file store over the cartridge device
//!
//! [`FrameStore`] owns every piece of engine state: the bus connection, the
//! ownership grid, the open-file table and the frame cache. Reads and writes
//! walk a file's frame chain one frame at a time, copying the overlapping
//! byte range through cache-resident payloads. Writes go to the device first
//! and then refresh the cached copy, so the cache never holds dirty data.

use crate::allocator::FrameMap;
use crate::config::StoreConfig;
use crate::error::{CartError, Result};
use crate::file_table::{FileHandle, FileTable};
use crate::frame_cache::{CacheStats, FrameCache};
use crate::geometry::{Frame, FrameSlot, Geometry, FRAME_SIZE};
use crate::io::{CartBus, DeviceTransport};
use tracing::{debug, error, info, warn};

/// File store engine
pub struct FrameStore<T> {
    config: StoreConfig,
    geometry: Geometry,
    bus: CartBus<T>,
    map: FrameMap,
    files: FileTable,
    cache: FrameCache,
    powered: bool,
}

impl<T: DeviceTransport> FrameStore<T> {
    /// Create a powered-off store
    pub fn new(config: StoreConfig, transport: T) -> Result<Self> {
        config.validate()?;
        let geometry = config.geometry()?;

        let mut cache = FrameCache::new();
        cache.configure_capacity(config.cache_frames)?;

        Ok(FrameStore {
            geometry,
            bus: CartBus::new(transport),
            map: FrameMap::new(geometry),
            files: FileTable::new(config.max_files, config.max_name_len),
            cache,
            powered: false,
            config,
        })
    }

    /// Change the cache capacity; only allowed while powered off
    pub fn set_cache_capacity(&mut self, frames: usize) -> Result<()> {
        if self.powered {
            return Err(CartError::CacheAlreadyInitialized);
        }
        self.cache.configure_capacity(frames)?;
        self.config.cache_frames = frames;
        Ok(())
    }

    /// Initialize the media, zero every cartridge and reset all state
    pub fn power_on(&mut self) -> Result<()> {
        if self.powered {
            return Err(CartError::AlreadyPoweredOn);
        }

        self.bus.init_media()?;
        for cartridge in 0..self.geometry.cartridges() {
            self.bus.zero_cartridge(cartridge as u16)?;
        }

        self.files.clear();
        self.map.clear();
        self.cache.init()?;
        self.powered = true;

        info!(
            cartridges = self.geometry.cartridges(),
            frames_per_cartridge = self.geometry.frames_per_cartridge(),
            cache_frames = self.cache.capacity(),
            "cartridge store powered on"
        );
        Ok(())
    }

    /// Drop the cache and all files, then power the device off
    pub fn power_off(&mut self) -> Result<()> {
        self.ensure_powered()?;

        let stats = self.cache.stats();
        self.cache.close();
        self.files.clear();
        self.map.clear();
        self.powered = false;
        self.bus.power_off()?;

        info!(
            hits = stats.hits,
            misses = stats.misses,
            "cartridge store powered off"
        );
        Ok(())
    }

    /// Open a new, empty file and give it its first frame
    pub fn open(&mut self, name: &str) -> Result<FileHandle> {
        self.ensure_powered()?;

        let handle = self.files.open(name)?;
        match self.map.allocate_first(handle) {
            Ok(first) => {
                self.files.get_mut(handle)?.start_chain(first);
                info!(%handle, name, %first, "opened file");
                Ok(handle)
            }
            Err(err) => {
                self.files.close(handle)?;
                Err(err)
            }
        }
    }

    /// Close a file and release its frames
    pub fn close(&mut self, handle: FileHandle) -> Result<()> {
        self.ensure_powered()?;

        self.files.get(handle)?;
        let released = self.map.release(handle);
        self.files.close(handle)?;
        info!(%handle, released, "closed file");
        Ok(())
    }

    /// Read up to `buf.len()` bytes from the cursor
    ///
    /// Returns fewer bytes than requested when the end of the file is
    /// reached first.
    pub fn read(&mut self, handle: FileHandle, buf: &mut [u8]) -> Result<usize> {
        self.ensure_powered()?;

        let FrameStore {
            bus,
            map,
            files,
            cache,
            ..
        } = self;
        let entry = files.get_mut(handle)?;

        let mut done = 0;
        while done < buf.len() {
            let limit = if entry.cursor_at_end_frame() {
                entry.end_offset
            } else {
                FRAME_SIZE
            };
            let offset = entry.cursor_offset;
            let count = limit.saturating_sub(offset).min(buf.len() - done);

            if count > 0 {
                let payload = cache.get(entry.cursor, |slot| bus.read_frame(slot))?;
                buf[done..done + count].copy_from_slice(&payload[offset..offset + count]);
                entry.cursor_offset += count;
                done += count;
                continue;
            }

            match map.next_owned(handle, entry.cursor, entry.end)? {
                Some(next) => entry.advance_cursor(next),
                None => break,
            }
        }

        debug!(%handle, requested = buf.len(), read = done, "read");
        Ok(done)
    }

    /// Read up to `len` bytes into a new buffer
    pub fn read_to_vec(&mut self, handle: FileHandle, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        let read = self.read(handle, &mut buf)?;
        buf.truncate(read);
        Ok(buf)
    }

    /// Write `data` at the cursor, growing the file as needed
    ///
    /// Running out of frames part-way returns the bytes written so far; if
    /// nothing could be written the call fails with `Exhausted`.
    pub fn write(&mut self, handle: FileHandle, data: &[u8]) -> Result<usize> {
        self.ensure_powered()?;

        let FrameStore {
            bus,
            map,
            files,
            cache,
            ..
        } = self;
        let entry = files.get_mut(handle)?;

        let mut done = 0;
        while done < data.len() {
            if entry.cursor_offset == FRAME_SIZE {
                if entry.cursor_at_end_frame() {
                    match map.allocate_next(handle, entry.end) {
                        Ok(next) => {
                            entry.extend_chain(next);
                            entry.advance_cursor(next);
                        }
                        Err(CartError::Exhausted) if done > 0 => {
                            warn!(
                                %handle,
                                requested = data.len(),
                                written = done,
                                "short write: out of frames"
                            );
                            break;
                        }
                        Err(err) => return Err(err),
                    }
                } else {
                    let next = map
                        .next_owned(handle, entry.cursor, entry.end)?
                        .ok_or(CartError::ChainCorruption {
                            handle: handle.0,
                            after: entry.cursor,
                        })?;
                    entry.advance_cursor(next);
                }
                continue;
            }

            let offset = entry.cursor_offset;
            let count = (FRAME_SIZE - offset).min(data.len() - done);

            // Read-before-write keeps the bytes of the frame we do not touch.
            let mut frame: Box<Frame> =
                Box::new(*cache.get(entry.cursor, |slot| bus.read_frame(slot))?);
            frame[offset..offset + count].copy_from_slice(&data[done..done + count]);
            bus.write_frame(entry.cursor, &frame)?;
            cache.put(entry.cursor, &frame)?;

            entry.cursor_offset += count;
            done += count;
            if entry.cursor_at_end_frame() && entry.cursor_offset > entry.end_offset {
                entry.end_offset = entry.cursor_offset;
            }
        }

        debug!(%handle, requested = data.len(), written = done, "write");
        Ok(done)
    }

    /// Move the cursor to `offset` bytes from the start of the file
    ///
    /// Offsets past the end of the file are rejected; seeking exactly to
    /// the end is allowed and positions the cursor for appending.
    pub fn seek(&mut self, handle: FileHandle, offset: u64) -> Result<()> {
        self.ensure_powered()?;

        let FrameStore { map, files, .. } = self;
        let entry = files.get_mut(handle)?;
        let length = entry.length();

        if offset > length {
            return Err(CartError::SeekOutOfRange { offset, length });
        }

        if offset == length {
            entry.cursor = entry.end;
            entry.cursor_offset = entry.end_offset;
            entry.cursor_index = entry.frame_count - 1;
        } else {
            let index = (offset / FRAME_SIZE as u64) as usize;
            let slot = map.nth_owned(handle, index).ok_or_else(|| {
                error!(%handle, index, "frame chain shorter than file length");
                CartError::ChainCorruption {
                    handle: handle.0,
                    after: entry.end,
                }
            })?;
            entry.cursor = slot;
            entry.cursor_offset = (offset % FRAME_SIZE as u64) as usize;
            entry.cursor_index = index;
        }

        debug!(%handle, offset, "seek");
        Ok(())
    }

    /// Check the cached chain bookkeeping against the ownership grid
    pub fn verify_chain(&self, handle: FileHandle) -> Result<()> {
        self.ensure_powered()?;

        let entry = self.files.get(handle)?;
        let chain = self.map.chain(handle);
        let consistent = chain.len() == entry.frame_count
            && chain.last() == Some(&entry.end)
            && chain.get(entry.cursor_index) == Some(&entry.cursor);

        if consistent {
            Ok(())
        } else {
            error!(
                %handle,
                frames = chain.len(),
                expected = entry.frame_count,
                "frame chain does not match file entry"
            );
            Err(CartError::ChainCorruption {
                handle: handle.0,
                after: chain.last().copied().unwrap_or(entry.end),
            })
        }
    }

    /// File size in bytes
    pub fn size(&self, handle: FileHandle) -> Result<u64> {
        Ok(self.files.get(handle)?.length())
    }

    /// Cursor position in bytes
    pub fn tell(&self, handle: FileHandle) -> Result<u64> {
        Ok(self.files.get(handle)?.position())
    }

    pub fn name(&self, handle: FileHandle) -> Result<&str> {
        Ok(self.files.get(handle)?.name.as_str())
    }

    /// Handle of the open file called `name`
    pub fn lookup(&self, name: &str) -> Option<FileHandle> {
        self.files.find(name)
    }

    pub fn open_files(&self) -> Vec<FileHandle> {
        self.files.open_handles()
    }

    /// Frames of a file's chain, in chain order
    pub fn frames(&self, handle: FileHandle) -> Result<Vec<FrameSlot>> {
        self.files.get(handle)?;
        Ok(self.map.chain(handle))
    }

    pub fn free_frames(&self) -> usize {
        self.map.free_frames()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn cache(&self) -> &FrameCache {
        &self.cache
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn is_powered_on(&self) -> bool {
        self.powered
    }

    pub fn transport(&self) -> &T {
        self.bus.transport()
    }

    pub fn transport_mut(&mut self) -> &mut T {
        self.bus.transport_mut()
    }

    fn ensure_powered(&self) -> Result<()> {
        if self.powered {
            Ok(())
        } else {
            Err(CartError::NotPoweredOn)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::memory::MemoryDevice;
    use crate::register::Opcode;

    fn store(cartridges: usize, frames: usize, cache_frames: usize) -> FrameStore<MemoryDevice> {
        let config = StoreConfig {
            cartridges,
            frames_per_cartridge: frames,
            cache_frames,
            ..StoreConfig::default()
        };
        let device = MemoryDevice::new(config.geometry().unwrap());
        let mut store = FrameStore::new(config, device).unwrap();
        store.power_on().unwrap();
        store
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_power_on_zeroes_every_cartridge() {
        let store = store(3, 4, 4);
        assert_eq!(store.transport().count(Opcode::InitMedia), 1);
        assert_eq!(store.transport().count(Opcode::ZeroCartridge), 3);
        assert_eq!(store.transport().count(Opcode::LoadCartridge), 3);
        assert_eq!(store.free_frames(), 12);
    }

    #[test]
    fn test_operations_require_power() {
        let config = StoreConfig {
            cartridges: 1,
            frames_per_cartridge: 4,
            ..StoreConfig::default()
        };
        let device = MemoryDevice::new(config.geometry().unwrap());
        let mut store = FrameStore::new(config, device).unwrap();
        assert!(matches!(store.open("a"), Err(CartError::NotPoweredOn)));

        store.power_on().unwrap();
        assert!(matches!(store.power_on(), Err(CartError::AlreadyPoweredOn)));
    }

    #[test]
    fn test_open_claims_first_frame() {
        let mut store = store(1, 8, 4);
        let handle = store.open("a").unwrap();
        assert_eq!(store.frames(handle).unwrap(), vec![FrameSlot::new(0, 0)]);
        assert_eq!(store.size(handle).unwrap(), 0);
        assert_eq!(store.free_frames(), 7);
    }

    #[test]
    fn test_partial_frame_write_preserves_neighbours() {
        let mut store = store(1, 8, 4);
        let handle = store.open("a").unwrap();
        store.write(handle, &[b'x'; 100]).unwrap();

        store.seek(handle, 10).unwrap();
        store.write(handle, b"hello").unwrap();

        store.seek(handle, 0).unwrap();
        let data = store.read_to_vec(handle, 100).unwrap();
        assert_eq!(&data[..10], &[b'x'; 10]);
        assert_eq!(&data[10..15], b"hello");
        assert_eq!(&data[15..], &[b'x'; 85]);
        assert_eq!(store.size(handle).unwrap(), 100);
    }

    #[test]
    fn test_exact_frame_write_does_not_allocate_ahead() {
        let mut store = store(1, 8, 4);
        let handle = store.open("a").unwrap();
        assert_eq!(store.write(handle, &pattern(FRAME_SIZE)).unwrap(), FRAME_SIZE);
        assert_eq!(store.frames(handle).unwrap().len(), 1);
        assert_eq!(store.size(handle).unwrap(), FRAME_SIZE as u64);

        store.write(handle, b"!").unwrap();
        assert_eq!(store.frames(handle).unwrap().len(), 2);
        assert_eq!(store.size(handle).unwrap(), FRAME_SIZE as u64 + 1);
    }

    #[test]
    fn test_write_goes_through_to_device() {
        let mut store = store(1, 8, 4);
        let handle = store.open("a").unwrap();
        store.write(handle, b"persisted").unwrap();
        let frame = store.transport().peek(FrameSlot::new(0, 0));
        assert_eq!(&frame[..9], b"persisted");
    }

    #[test]
    fn test_read_at_end_returns_zero() {
        let mut store = store(1, 8, 4);
        let handle = store.open("a").unwrap();
        store.write(handle, b"abc").unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(store.read(handle, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_seek_beyond_end_rejected() {
        let mut store = store(1, 8, 4);
        let handle = store.open("a").unwrap();
        store.write(handle, &pattern(1500)).unwrap();
        assert!(matches!(
            store.seek(handle, 1501),
            Err(CartError::SeekOutOfRange {
                offset: 1501,
                length: 1500
            })
        ));
        store.seek(handle, 1500).unwrap();
        assert_eq!(store.tell(handle).unwrap(), 1500);
    }

    #[test]
    fn test_seek_to_end_of_full_frame_then_append() {
        let mut store = store(1, 8, 4);
        let handle = store.open("a").unwrap();
        store.write(handle, &pattern(2 * FRAME_SIZE)).unwrap();
        store.seek(handle, 0).unwrap();
        store.seek(handle, 2 * FRAME_SIZE as u64).unwrap();
        store.write(handle, b"tail").unwrap();

        store.seek(handle, 2 * FRAME_SIZE as u64).unwrap();
        assert_eq!(store.read_to_vec(handle, 10).unwrap(), b"tail");
        store.verify_chain(handle).unwrap();
    }

    #[test]
    fn test_verify_chain_detects_tampering() {
        let mut store = store(1, 8, 4);
        let handle = store.open("a").unwrap();
        store.write(handle, &pattern(3000)).unwrap();
        store.verify_chain(handle).unwrap();

        store.map.release(handle);
        assert!(matches!(
            store.verify_chain(handle),
            Err(CartError::ChainCorruption { .. })
        ));
    }

    #[test]
    fn test_read_detects_broken_chain() {
        let mut store = store(1, 8, 4);
        let handle = store.open("a").unwrap();
        store.write(handle, &pattern(3000)).unwrap();
        store.seek(handle, 0).unwrap();

        // Lose everything but the first frame.
        store.map.release(handle);
        store.map.allocate_first(handle).unwrap();

        let mut buf = vec![0u8; 3000];
        assert!(matches!(
            store.read(handle, &mut buf),
            Err(CartError::ChainCorruption { .. })
        ));
    }

    #[test]
    fn test_capacity_change_only_while_off() {
        let mut store = store(1, 4, 4);
        assert!(matches!(
            store.set_cache_capacity(2),
            Err(CartError::CacheAlreadyInitialized)
        ));
        store.power_off().unwrap();
        store.set_cache_capacity(2).unwrap();
        store.power_on().unwrap();
        assert_eq!(store.cache_stats().capacity, 2);
    }

    #[test]
    fn test_transport_failure_aborts_call() {
        let mut store = store(1, 8, 4);
        let handle = store.open("a").unwrap();
        store.transport_mut().fail_after(0);
        let result = store.write(handle, b"data");
        assert!(matches!(result, Err(CartError::Transport(_))));
    }

    #[test]
    fn test_power_off_clears_files() {
        let mut store = store(1, 4, 4);
        let handle = store.open("a").unwrap();
        store.power_off().unwrap();
        assert_eq!(store.transport().count(Opcode::PowerOff), 1);
        assert!(!store.transport().is_initialized());

        store.power_on().unwrap();
        assert!(matches!(store.size(handle), Err(CartError::InvalidHandle(0))));
        assert_eq!(store.free_frames(), 4);
    }
}
