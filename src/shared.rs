//! Thread-safe handle to a single store
//!
//! The grid, table and cache are scanned in unpredictable patterns, so the
//! whole engine sits behind one lock and every call holds it from start to
//! finish.

use crate::error::Result;
use crate::file_table::FileHandle;
use crate::frame_cache::CacheStats;
use crate::io::DeviceTransport;
use crate::store::FrameStore;
use parking_lot::Mutex;
use std::sync::Arc;

/// Cloneable, lock-protected [`FrameStore`]
pub struct SharedStore<T> {
    inner: Arc<Mutex<FrameStore<T>>>,
}

impl<T> Clone for SharedStore<T> {
    fn clone(&self) -> Self {
        SharedStore {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: DeviceTransport> SharedStore<T> {
    pub fn new(store: FrameStore<T>) -> Self {
        SharedStore {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    /// Run several operations under one lock acquisition
    pub fn with<R>(&self, f: impl FnOnce(&mut FrameStore<T>) -> R) -> R {
        let mut store = self.inner.lock();
        f(&mut store)
    }

    pub fn power_on(&self) -> Result<()> {
        self.inner.lock().power_on()
    }

    pub fn power_off(&self) -> Result<()> {
        self.inner.lock().power_off()
    }

    pub fn open(&self, name: &str) -> Result<FileHandle> {
        self.inner.lock().open(name)
    }

    pub fn close(&self, handle: FileHandle) -> Result<()> {
        self.inner.lock().close(handle)
    }

    pub fn read(&self, handle: FileHandle, buf: &mut [u8]) -> Result<usize> {
        self.inner.lock().read(handle, buf)
    }

    pub fn write(&self, handle: FileHandle, data: &[u8]) -> Result<usize> {
        self.inner.lock().write(handle, data)
    }

    pub fn seek(&self, handle: FileHandle, offset: u64) -> Result<()> {
        self.inner.lock().seek(handle, offset)
    }

    pub fn size(&self, handle: FileHandle) -> Result<u64> {
        self.inner.lock().size(handle)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.lock().cache_stats()
    }
}
