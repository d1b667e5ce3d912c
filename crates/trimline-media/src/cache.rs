//! LRU frame cache for smooth playback and scrubbing.
//!
//! A bounded store of decoded frames keyed by frame index. Recency is
//! updated on both hits and inserts, so the entries that survive are the
//! ones playback actually touched last. Lookups hand out deep copies:
//! callers are free to mutate what they get back without corrupting the
//! cached original.
//!
//! The cache never talks to the decoder; keeping the decode cursor in
//! step with cache hits is the playback coordinator's job.

use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use tracing::debug;
use trimline_core::Frame;

/// Default number of frames kept resident.
pub const DEFAULT_CACHE_CAPACITY: usize = 150;

/// Runtime cache configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of frames held (> 0)
    pub capacity: usize,
    /// Whether caching is active
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CACHE_CAPACITY,
            enabled: true,
        }
    }
}

/// Cache occupancy and effectiveness counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheInfo {
    /// Frames currently resident
    pub size: usize,
    /// Maximum resident frames
    pub capacity: usize,
    /// Whether caching is active
    pub enabled: bool,
    /// Lookups served from the cache
    pub hits: u64,
    /// Lookups that fell through to the decoder
    pub misses: u64,
}

/// Bounded LRU store of decoded frames, keyed by frame index.
pub struct FrameCache {
    entries: LruCache<u64, Frame>,
    enabled: bool,
    hits: u64,
    misses: u64,
}

impl FrameCache {
    /// Create a cache with the given configuration. A zero capacity is
    /// treated as the default.
    pub fn new(config: CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.capacity).unwrap_or(
            NonZeroUsize::new(DEFAULT_CACHE_CAPACITY).expect("default capacity is non-zero"),
        );
        Self {
            entries: LruCache::new(capacity),
            enabled: config.enabled,
            hits: 0,
            misses: 0,
        }
    }

    /// Create a cache with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(CacheConfig::default())
    }

    /// Whether caching is active.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enable or disable caching at runtime.
    ///
    /// Disabling leaves resident entries inert: they are neither served
    /// nor added to until caching is re-enabled or the cache is cleared.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Return a copy of the cached frame and mark it most recently used.
    pub fn get(&mut self, index: u64) -> Option<Frame> {
        if !self.enabled {
            return None;
        }
        match self.entries.get(&index) {
            Some(frame) => {
                self.hits += 1;
                Some(frame.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Check for an index without touching recency or the counters.
    pub fn contains(&self, index: u64) -> bool {
        self.enabled && self.entries.contains(&index)
    }

    /// Insert or overwrite a frame, evicting the least recently used
    /// entry when a new index would exceed capacity. No-op while
    /// disabled.
    pub fn put(&mut self, frame: Frame) {
        if !self.enabled {
            return;
        }
        let index = frame.index;
        if let Some((evicted, _)) = self.entries.push(index, frame) {
            if evicted != index {
                debug!(frame = evicted, "evicted least recently used frame");
            }
        }
    }

    /// Drop all entries. Used on video (re)load and explicit reset.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Update the capacity bound, evicting oldest entries immediately if
    /// the current size exceeds it. A zero capacity is clamped to one.
    pub fn set_capacity(&mut self, capacity: usize) {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        self.entries.resize(capacity);
    }

    /// Number of resident frames.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no frames.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Occupancy and hit/miss counters.
    pub fn info(&self) -> CacheInfo {
        CacheInfo {
            size: self.entries.len(),
            capacity: self.entries.cap().get(),
            enabled: self.enabled,
            hits: self.hits,
            misses: self.misses,
        }
    }
}

impl std::fmt::Debug for FrameCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameCache")
            .field("size", &self.entries.len())
            .field("capacity", &self.entries.cap().get())
            .field("enabled", &self.enabled)
            .field("hits", &self.hits)
            .field("misses", &self.misses)
            .finish()
    }
}
