//! Playback/seek coordination over a decoder and the frame cache.
//!
//! The player owns both exclusively; nothing else touches the decoder or
//! the cache, which keeps one invariant easy to hold: after any
//! frame-serving call returns, the decoder position equals the last
//! served frame index + 1 (and equals the target after a bare seek),
//! whether the frame came from the cache or from a fresh decode.
//!
//! That invariant has one non-obvious consequence: serving a *cached*
//! frame during sequential playback still issues one decoder read whose
//! output is discarded. The decoder's own cursor must advance in
//! lockstep with the cache's bookkeeping or the next sequential read
//! would produce the wrong frame. This is deliberate, not an
//! optimization opportunity.

use std::ops::Range;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};
use trimline_core::{Frame, FrameRate, RationalTime, Result};

use crate::cache::{CacheConfig, CacheInfo, FrameCache};
use crate::decoder::{FfmpegDecoder, FrameSource};
use crate::prefetch;

/// Metadata for the currently loaded video.
#[derive(Debug, Clone, Serialize)]
pub struct VideoSession {
    pub path: PathBuf,
    pub frame_count: u64,
    pub fps: FrameRate,
    pub duration: RationalTime,
    pub width: u32,
    pub height: u32,
}

/// Owns a decoder and the frame cache; serves frames to the shell above.
///
/// Generic over [`FrameSource`] so tests can drive it with scripted
/// sources; production code uses [`VideoPlayer::load`] which opens an
/// [`FfmpegDecoder`].
pub struct VideoPlayer<S: FrameSource = FfmpegDecoder> {
    source: Option<S>,
    session: Option<VideoSession>,
    cache: FrameCache,
}

impl<S: FrameSource> VideoPlayer<S> {
    /// Create an unloaded player with the given cache configuration
    /// (normally the persisted settings, applied at construction time).
    pub fn new(config: CacheConfig) -> Self {
        Self {
            source: None,
            session: None,
            cache: FrameCache::new(config),
        }
    }

    /// Create an unloaded player with default cache configuration.
    pub fn with_defaults() -> Self {
        Self::new(CacheConfig::default())
    }

    /// Make an already-open source the current video.
    ///
    /// Hard reset: the previous source is released and the cache is
    /// cleared, because frame indices mean nothing across videos. The
    /// source is rewound and the cache warmed for instant first-frame
    /// display.
    pub fn attach(&mut self, source: S, path: impl Into<PathBuf>) -> VideoSession {
        self.release();

        let mut source = source;
        source.seek(0);

        let (width, height) = source.dimensions();
        let fps = source.frame_rate();
        let frame_count = source.frame_count();
        let session = VideoSession {
            path: path.into(),
            frame_count,
            fps,
            duration: RationalTime::from_frames(frame_count as i64, fps),
            width,
            height,
        };

        self.source = Some(source);
        self.session = Some(session.clone());
        self.prefetch_window(prefetch::warm_window(frame_count));
        session
    }

    /// Metadata for the loaded video, if any.
    pub fn session(&self) -> Option<&VideoSession> {
        self.session.as_ref()
    }

    /// Whether a video is loaded.
    pub fn is_loaded(&self) -> bool {
        self.source.is_some()
    }

    /// Serve the frame at the decoder cursor and advance past it.
    ///
    /// `None` when nothing is loaded, at end-of-stream, or on a
    /// transient decode failure.
    pub fn get_current_frame(&mut self) -> Option<Frame> {
        let source = self.source.as_mut()?;
        let index = source.position();

        if let Some(cached) = self.cache.get(index) {
            // Lockstep advance; the decoded output is discarded because
            // the cached copy is authoritative (see module docs).
            let _ = source.read_next();
            return Some(cached);
        }

        let frame = source.read_next()?;
        self.cache.put(frame.clone());
        let frame_count = self.frame_count();
        self.prefetch_window(prefetch::playback_window(index, frame_count));
        Some(frame)
    }

    /// Serve the frame at a specific index, leaving the cursor just past
    /// it.
    ///
    /// Out-of-range indices return `None` and leave the cursor where it
    /// was. A cache hit repositions the cursor without any decode, which
    /// is what makes scrubbing over warm regions cheap.
    pub fn get_frame_at_position(&mut self, index: u64) -> Option<Frame> {
        if self.source.is_none() {
            return None;
        }
        let frame_count = self.frame_count();
        if index >= frame_count {
            debug!(index, frame_count, "positioned read out of range");
            return None;
        }

        let served = match self.cache.get(index) {
            Some(cached) => {
                // index < frame_count, so index + 1 is at worst the
                // ordinary end-of-stream cursor position.
                if let Some(source) = self.source.as_mut() {
                    source.seek(index + 1);
                }
                Some(cached)
            }
            None => {
                if let Some(source) = self.source.as_mut() {
                    source.seek(index);
                }
                self.get_current_frame()
            }
        };

        self.prefetch_window(prefetch::positioned_window(index, frame_count));
        served
    }

    /// Position the cursor without serving a frame. Targets past the end
    /// clamp to the end-of-stream position.
    pub fn seek(&mut self, index: u64) {
        let frame_count = self.frame_count();
        let Some(source) = self.source.as_mut() else {
            return;
        };
        source.seek(index);
        debug!(index, "seek");
        self.prefetch_window(prefetch::seek_window(index.min(frame_count), frame_count));
    }

    /// Decoder-reported cursor position; 0 when nothing is loaded.
    pub fn position(&self) -> u64 {
        self.source.as_ref().map(|s| s.position()).unwrap_or(0)
    }

    /// Drop all cached frames.
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Cache occupancy and hit/miss counters.
    pub fn cache_info(&self) -> CacheInfo {
        self.cache.info()
    }

    /// Change the cache bound; shrinking evicts immediately.
    pub fn set_cache_capacity(&mut self, capacity: usize) {
        self.cache.set_capacity(capacity);
    }

    /// Enable or disable caching without dropping resident entries.
    pub fn set_cache_enabled(&mut self, enabled: bool) {
        self.cache.set_enabled(enabled);
    }

    /// Release the decoder and drop all cached frames. Idempotent.
    pub fn release(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.release();
        }
        self.session = None;
        self.cache.clear();
    }

    fn frame_count(&self) -> u64 {
        self.source.as_ref().map(|s| s.frame_count()).unwrap_or(0)
    }

    /// Decode a window of frames into the cache.
    ///
    /// Cursor-neutral: the position observed on entry is restored before
    /// returning, so callers never see the cursor moved by warming.
    /// Indices already cached are skipped, and a frame that fails to
    /// decode is skipped rather than aborting the window.
    fn prefetch_window(&mut self, window: Range<u64>) {
        if window.is_empty() || !self.cache.is_enabled() {
            return;
        }
        let Some(source) = self.source.as_mut() else {
            return;
        };

        let origin = source.position();
        debug!(start = window.start, end = window.end, "prefetch window");
        for index in window {
            if self.cache.contains(index) {
                continue;
            }
            if source.position() != index && !source.seek(index) {
                continue;
            }
            match source.read_next() {
                Some(frame) => self.cache.put(frame),
                None => continue,
            }
        }
        source.seek(origin);
    }
}

impl VideoPlayer<FfmpegDecoder> {
    /// Open `path` (trying ranked decode backends) and make it the
    /// current video.
    ///
    /// The one hard failure in playback: when every backend refuses the
    /// file this returns [`trimline_core::TrimlineError::Open`]. The
    /// previous video is released either way.
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<VideoSession> {
        let path = path.as_ref();
        self.release();
        let decoder = FfmpegDecoder::open_ranked(path)?;
        info!(
            path = %path.display(),
            frames = decoder.frame_count(),
            fps = %decoder.frame_rate(),
            "loaded video"
        );
        Ok(self.attach(decoder, path))
    }
}
