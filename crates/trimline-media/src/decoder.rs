//! Video decoding through an FFmpeg child process.
//!
//! The child emits raw RGB24 frames over a pipe, which makes sequential
//! reads cheap (the next frame is already in flight) and seeks
//! comparatively expensive (the child is respawned at the target time).
//! Seeks are therefore applied lazily: `seek` only records the new
//! cursor, and the respawn happens when a read actually needs it. A
//! cursor repositioned after a cache hit never pays for a decode.

use std::path::{Path, PathBuf};

use ffmpeg_sidecar::child::FfmpegChild;
use ffmpeg_sidecar::command::FfmpegCommand;
use ffmpeg_sidecar::event::OutputVideoFrame;
use tracing::{debug, info, warn};
use trimline_core::{
    Frame, FrameBuffer, FrameRate, PixelFormat, RationalTime, Result, TrimlineError,
};

use crate::probe::MediaProbe;

/// Narrow interface between the playback coordinator and a decoder.
///
/// Reads and seeks fail softly: end-of-stream and transient decode
/// errors are both "no frame here", never hard errors. Opening a source
/// is the only operation allowed to fail loudly.
pub trait FrameSource {
    /// Total number of frames in the source.
    fn frame_count(&self) -> u64;
    /// Source frame rate.
    fn frame_rate(&self) -> FrameRate;
    /// Width and height in pixels.
    fn dimensions(&self) -> (u32, u32);
    /// Index the next sequential read will produce.
    fn position(&self) -> u64;
    /// Decode the frame at the current position and advance past it.
    /// `None` at end-of-stream or on a transient decode failure.
    fn read_next(&mut self) -> Option<Frame>;
    /// Reposition the cursor. Returns false if the source refused.
    fn seek(&mut self, index: u64) -> bool;
    /// Release underlying resources. Further reads return `None`.
    fn release(&mut self);
}

/// Decode backends, ranked hardware-first.
///
/// Backend choice affects latency only, never correctness, so an open
/// failure on one entry falls through silently to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeBackend {
    /// Let FFmpeg pick whatever hardware decoder the platform offers.
    HardwareAuto,
    /// Plain software decoding.
    Software,
}

impl DecodeBackend {
    /// Backends in the order they are tried.
    pub const RANKED: [DecodeBackend; 2] = [Self::HardwareAuto, Self::Software];

    fn describe(self) -> &'static str {
        match self {
            Self::HardwareAuto => "hwaccel auto",
            Self::Software => "software",
        }
    }
}

/// The live child process and its frame pipe.
struct FrameStream {
    child: FfmpegChild,
    frames: Box<dyn Iterator<Item = OutputVideoFrame>>,
    /// Index of the next frame the pipe will deliver.
    next_index: u64,
}

/// A video source decoded by an `ffmpeg` child process.
pub struct FfmpegDecoder {
    path: PathBuf,
    backend: DecodeBackend,
    width: u32,
    height: u32,
    frame_rate: FrameRate,
    frame_count: u64,
    /// Logical cursor: index the next `read_next` must produce.
    position: u64,
    stream: Option<FrameStream>,
    released: bool,
}

impl FfmpegDecoder {
    /// Open a video with a specific backend.
    ///
    /// Metadata comes from an `ffprobe` pass; the decode stream is
    /// spawned immediately so a broken setup fails here rather than in
    /// the middle of playback.
    pub fn open<P: AsRef<Path>>(path: P, backend: DecodeBackend) -> Result<Self> {
        let path = path.as_ref();
        let probe = MediaProbe::probe(path)?;
        let video = probe.primary_video().ok_or_else(|| {
            TrimlineError::Open(format!("{} has no video stream", path.display()))
        })?;

        let mut decoder = Self {
            path: path.to_path_buf(),
            backend,
            width: video.width,
            height: video.height,
            frame_rate: video.frame_rate,
            frame_count: probe.frame_count,
            position: 0,
            stream: None,
            released: false,
        };
        let stream = decoder.spawn_stream(0)?;
        decoder.stream = Some(stream);
        Ok(decoder)
    }

    /// Try each backend in ranked order; the first that opens wins.
    pub fn open_ranked<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        for backend in DecodeBackend::RANKED {
            match Self::open(path, backend) {
                Ok(decoder) => {
                    info!(
                        path = %path.display(),
                        backend = backend.describe(),
                        "opened video"
                    );
                    return Ok(decoder);
                }
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        backend = backend.describe(),
                        error = %e,
                        "decode backend failed to open"
                    );
                }
            }
        }
        Err(TrimlineError::Open(path.display().to_string()))
    }

    /// Source file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Backend this decoder opened with.
    pub fn backend(&self) -> DecodeBackend {
        self.backend
    }

    fn spawn_stream(&self, start: u64) -> Result<FrameStream> {
        let mut cmd = FfmpegCommand::new();
        cmd.hide_banner();
        if self.backend == DecodeBackend::HardwareAuto {
            cmd.hwaccel("auto");
        }
        if start > 0 {
            let secs =
                RationalTime::from_frames(start as i64, self.frame_rate).to_seconds_f64();
            cmd.seek(format!("{secs:.6}"));
        }
        cmd.input(self.path.to_string_lossy()).rawvideo();

        let mut child = cmd
            .spawn()
            .map_err(|e| TrimlineError::Open(format!("failed to start decoder: {e}")))?;
        let frames = child
            .iter()
            .map_err(|e| TrimlineError::Open(format!("decoder event stream: {e}")))?
            .filter_frames();

        debug!(path = %self.path.display(), start, "spawned decode stream");
        Ok(FrameStream {
            child,
            frames: Box::new(frames),
            next_index: start,
        })
    }

    fn stop_stream(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.child.kill();
            let _ = stream.child.wait();
        }
    }

    /// Make the pipe deliver the frame at the logical cursor next,
    /// respawning the child when a pending seek left them misaligned.
    fn align_stream(&mut self) -> bool {
        let aligned = self
            .stream
            .as_ref()
            .is_some_and(|s| s.next_index == self.position);
        if aligned {
            return true;
        }
        self.stop_stream();
        match self.spawn_stream(self.position) {
            Ok(stream) => {
                self.stream = Some(stream);
                true
            }
            Err(e) => {
                warn!(error = %e, "failed to reposition decode stream");
                false
            }
        }
    }
}

impl FrameSource for FfmpegDecoder {
    fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn frame_rate(&self) -> FrameRate {
        self.frame_rate
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn read_next(&mut self) -> Option<Frame> {
        if self.released || self.position >= self.frame_count {
            return None;
        }
        if !self.align_stream() {
            return None;
        }
        let stream = self.stream.as_mut()?;
        match stream.frames.next() {
            Some(raw) => {
                stream.next_index += 1;
                let index = self.position;
                self.position += 1;
                Some(Frame::new(
                    index,
                    FrameBuffer::from_packed(raw.width, raw.height, PixelFormat::Rgb24, raw.data),
                ))
            }
            None => {
                // The pipe ended before the reported frame count; treat
                // it as end-of-stream and let the next read respawn.
                warn!(position = self.position, "decode stream ended early");
                self.stop_stream();
                None
            }
        }
    }

    fn seek(&mut self, index: u64) -> bool {
        if self.released {
            return false;
        }
        let clamped = index.min(self.frame_count);
        if clamped != index {
            debug!(index, clamped, "seek target clamped to end of stream");
        }
        // Applied lazily: the respawn happens on the next read.
        self.position = clamped;
        true
    }

    fn release(&mut self) {
        self.stop_stream();
        self.released = true;
    }
}

impl Drop for FfmpegDecoder {
    fn drop(&mut self) {
        self.stop_stream();
    }
}
