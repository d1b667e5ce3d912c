//! Trimline Media - video handling for the trimmer
//!
//! This crate handles:
//! - Decoding through an FFmpeg child process with ranked backends
//! - The LRU frame cache and prefetch policy behind playback
//! - Playback/seek coordination
//! - Segment export through the external encoder
//! - Media probing and persistent settings

pub mod cache;
pub mod decoder;
pub mod export;
pub mod player;
pub mod prefetch;
pub mod probe;
pub mod settings;

pub use cache::{CacheConfig, CacheInfo, FrameCache};
pub use decoder::{DecodeBackend, FfmpegDecoder, FrameSource};
pub use export::{
    ExportCancel, ExportEvent, ExportJob, ExportProgress, OutputFormat, OutputMode, Segment,
};
pub use player::{VideoPlayer, VideoSession};
pub use probe::MediaProbe;
pub use settings::Settings;

/// Initialize the media layer (call once at startup).
pub fn init() {
    tracing::info!("Trimline Media initialized");
}
