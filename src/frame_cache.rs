//! Least-recently-used frame cache
//!
//! Sits between the byte-range engine and the device. Every hit, insertion
//! and explicit write stamps the entry with a monotonic use counter; the
//! entry holding the smallest stamp is evicted when a miss finds the cache
//! full. Entries are indexed twice:
//! - by slot, for membership and payload lookup
//! - by stamp, so the eviction victim is the first key of an ordered map
//!
//! The use counter is compacted whenever it exceeds `capacity * 100`:
//! resident stamps are renumbered to `1..=resident` in their existing order
//! and the counter restarts just above them.
//!
//! The cache never writes back. Writers push frames to the device first and
//! then refresh the cached copy with [`FrameCache::put`].

use crate::error::{CartError, Result};
use crate::geometry::{Frame, FrameSlot};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Default number of resident frames
pub const DEFAULT_CACHE_FRAMES: usize = 1024;

/// Use-counter ceiling, as a multiple of the capacity
const RENUMBER_FACTOR: u64 = 100;

#[derive(Debug)]
struct CacheEntry {
    payload: Box<Frame>,
    stamp: u64,
}

/// Frame cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    /// Lookups served from the cache
    pub hits: u64,
    /// Lookups that fetched from the device
    pub misses: u64,
    /// Entries dropped to make room
    pub evictions: u64,
    /// Use-counter compactions
    pub renumbers: u64,
    /// Frames currently cached
    pub resident: usize,
    /// Maximum resident frames
    pub capacity: usize,
}

impl CacheStats {
    /// Calculate hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// Fixed-capacity frame cache with strict LRU eviction
#[derive(Debug)]
pub struct FrameCache {
    capacity: usize,
    initialized: bool,
    entries: HashMap<FrameSlot, CacheEntry>,
    /// Stamp -> slot, oldest first
    by_recency: BTreeMap<u64, FrameSlot>,
    use_counter: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
    renumbers: u64,
}

impl FrameCache {
    /// Create an uninitialized cache with the default capacity
    pub fn new() -> Self {
        FrameCache {
            capacity: DEFAULT_CACHE_FRAMES,
            initialized: false,
            entries: HashMap::new(),
            by_recency: BTreeMap::new(),
            use_counter: 1,
            hits: 0,
            misses: 0,
            evictions: 0,
            renumbers: 0,
        }
    }

    /// Set the maximum number of resident frames
    ///
    /// Only allowed before [`FrameCache::init`].
    pub fn configure_capacity(&mut self, capacity: usize) -> Result<()> {
        if self.initialized {
            return Err(CartError::CacheAlreadyInitialized);
        }
        if capacity == 0 {
            return Err(CartError::InvalidCapacity(capacity));
        }
        self.capacity = capacity;
        Ok(())
    }

    pub fn init(&mut self) -> Result<()> {
        if self.initialized {
            return Err(CartError::CacheAlreadyInitialized);
        }
        self.entries = HashMap::with_capacity(self.capacity);
        self.by_recency.clear();
        self.use_counter = 1;
        self.hits = 0;
        self.misses = 0;
        self.evictions = 0;
        self.renumbers = 0;
        self.initialized = true;
        debug!(capacity = self.capacity, "frame cache initialized");
        Ok(())
    }

    /// Drop every cached frame; the capacity may be reconfigured afterwards
    pub fn close(&mut self) {
        self.entries = HashMap::new();
        self.by_recency.clear();
        self.initialized = false;
        debug!("frame cache closed");
    }

    /// Return the cached payload for `slot`, fetching it on a miss
    ///
    /// On a miss with a full cache the least recently used entry is evicted
    /// before `fetch` runs.
    pub fn get<F>(&mut self, slot: FrameSlot, fetch: F) -> Result<&Frame>
    where
        F: FnOnce(FrameSlot) -> Result<Box<Frame>>,
    {
        self.ensure_initialized()?;

        if self.entries.contains_key(&slot) {
            self.hits += 1;
            self.touch(slot);
        } else {
            self.misses += 1;
            if self.entries.len() >= self.capacity {
                self.evict_lru();
            }
            let payload = fetch(slot)?;
            let stamp = self.use_counter;
            self.entries.insert(slot, CacheEntry { payload, stamp });
            self.by_recency.insert(stamp, slot);
            self.advance();
        }

        self.entries
            .get(&slot)
            .map(|entry| &*entry.payload)
            .ok_or(CartError::NotResident { slot })
    }

    /// Overwrite the payload of a resident frame
    pub fn put(&mut self, slot: FrameSlot, payload: &Frame) -> Result<()> {
        self.ensure_initialized()?;

        let entry = self
            .entries
            .get_mut(&slot)
            .ok_or(CartError::NotResident { slot })?;
        entry.payload.copy_from_slice(payload);
        self.touch(slot);
        Ok(())
    }

    pub fn contains(&self, slot: FrameSlot) -> bool {
        self.entries.contains_key(&slot)
    }

    /// Recency stamp of a resident frame
    pub fn recency(&self, slot: FrameSlot) -> Option<u64> {
        self.entries.get(&slot).map(|entry| entry.stamp)
    }

    /// Resident slots from least to most recently used
    pub fn resident_slots(&self) -> Vec<FrameSlot> {
        self.by_recency.values().copied().collect()
    }

    pub fn use_counter(&self) -> u64 {
        self.use_counter
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            renumbers: self.renumbers,
            resident: self.entries.len(),
            capacity: self.capacity,
        }
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(CartError::CacheNotInitialized)
        }
    }

    /// Restamp a resident entry as most recently used
    fn touch(&mut self, slot: FrameSlot) {
        let stamp = self.use_counter;
        if let Some(entry) = self.entries.get_mut(&slot) {
            self.by_recency.remove(&entry.stamp);
            entry.stamp = stamp;
            self.by_recency.insert(stamp, slot);
            self.advance();
        }
    }

    fn evict_lru(&mut self) {
        if let Some((stamp, victim)) = self.by_recency.pop_first() {
            self.entries.remove(&victim);
            self.evictions += 1;
            debug!(slot = %victim, stamp, "evicted frame");
        }
    }

    fn advance(&mut self) {
        self.use_counter += 1;
        if self.use_counter > self.capacity as u64 * RENUMBER_FACTOR {
            self.renumber();
        }
    }

    /// Compact resident stamps to `1..=resident`, preserving their order
    fn renumber(&mut self) {
        let ordered = std::mem::take(&mut self.by_recency);
        for (position, slot) in ordered.into_values().enumerate() {
            let stamp = position as u64 + 1;
            if let Some(entry) = self.entries.get_mut(&slot) {
                entry.stamp = stamp;
            }
            self.by_recency.insert(stamp, slot);
        }
        self.use_counter = self.entries.len() as u64 + 1;
        self.renumbers += 1;
        debug!(resident = self.entries.len(), "renumbered recency stamps");
    }
}

impl Default for FrameCache {
    fn default() -> Self {
        Self::new()
    }
}
