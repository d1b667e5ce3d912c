//! Segment export through an external FFmpeg encoder.
//!
//! Each marked segment becomes one encoder invocation seeking into the
//! source; "single file" mode encodes per-segment MPEG-TS intermediates
//! and stitches them with the concat demuxer. Cancellation is a
//! cooperative flag checked between encode steps plus a kill of the
//! in-flight encoder process; intermediates are removed best-effort on
//! every exit path.
//!
//! Exports never share the playback decoder: the encoder opens its own
//! read of the source file, so a running export cannot disturb the
//! playback cursor.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{unbounded, Receiver};
use ffmpeg_sidecar::child::FfmpegChild;
use ffmpeg_sidecar::command::FfmpegCommand;
use ffmpeg_sidecar::event::{FfmpegEvent, LogLevel};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use trimline_core::{FrameRate, RationalTime, Result, TrimlineError};

/// Lines of encoder stderr kept for diagnostics.
const DIAG_LINES: usize = 8;
/// Cap on the diagnostic text attached to an export error.
const DIAG_MAX_CHARS: usize = 600;

// ── Segments and formats ────────────────────────────────────────

/// A contiguous `[start_frame, end_frame)` range marked for export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// First frame included
    pub start_frame: u64,
    /// First frame excluded
    pub end_frame: u64,
}

impl Segment {
    /// Create a new segment.
    pub fn new(start_frame: u64, end_frame: u64) -> Self {
        Self {
            start_frame,
            end_frame,
        }
    }

    /// Encoder start time for this segment.
    pub fn start_time(&self, rate: FrameRate) -> RationalTime {
        RationalTime::from_frames(self.start_frame as i64, rate)
    }

    /// Encoded duration of this segment.
    pub fn duration(&self, rate: FrameRate) -> RationalTime {
        RationalTime::from_frames(self.frame_len() as i64, rate)
    }

    /// Number of frames covered.
    pub fn frame_len(&self) -> u64 {
        self.end_frame.saturating_sub(self.start_frame)
    }
}

/// Output container formats offered by the export dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    Mp4,
    Mov,
    Avi,
    Wmv,
    /// MPEG-TS, used as the concat-friendly intermediate.
    Ts,
}

impl OutputFormat {
    /// File extension for this container.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Mov => "mov",
            Self::Avi => "avi",
            Self::Wmv => "wmv",
            Self::Ts => "ts",
        }
    }

    /// Encoder argument set for this container.
    fn codec_args(self) -> &'static [&'static str] {
        match self {
            Self::Mp4 => &[
                "-c:v",
                "libx264",
                "-preset",
                "medium",
                "-crf",
                "23",
                "-c:a",
                "aac",
                "-b:a",
                "192k",
                "-movflags",
                "+faststart",
            ],
            Self::Mov => &[
                "-c:v", "libx264", "-preset", "medium", "-crf", "23", "-c:a", "aac", "-b:a",
                "192k",
            ],
            Self::Avi => &[
                "-c:v", "mpeg4", "-q:v", "5", "-c:a", "libmp3lame", "-b:a", "192k",
            ],
            Self::Wmv => &[
                "-c:v", "wmv2", "-b:v", "5000k", "-c:a", "wmav2", "-b:a", "192k",
            ],
            Self::Ts => &[
                "-c:v", "libx264", "-preset", "veryfast", "-crf", "23", "-c:a", "aac", "-b:a",
                "192k", "-f", "mpegts",
            ],
        }
    }
}

/// Where multiple segments land.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputMode {
    /// One file per segment.
    SeparateClips,
    /// All segments concatenated into a single file.
    SingleFile,
}

// ── Progress and cancellation ───────────────────────────────────

/// Progress for one encoder invocation.
#[derive(Debug, Clone)]
pub struct ExportProgress {
    /// Zero-based segment being encoded
    pub segment: usize,
    /// Total segments in the job
    pub segment_count: usize,
    /// Frames encoded so far in this segment
    pub frame: u64,
    /// Frames this segment covers
    pub total_frames: u64,
    /// Encoding speed in frames per second
    pub fps: f32,
}

impl ExportProgress {
    /// Completion fraction of the current segment (0.0 to 1.0).
    pub fn fraction(&self) -> f64 {
        if self.total_frames == 0 {
            return 0.0;
        }
        (self.frame as f64 / self.total_frames as f64).min(1.0)
    }
}

/// Lifecycle events emitted by a spawned export.
#[derive(Debug, Clone)]
pub enum ExportEvent {
    Progress(ExportProgress),
    Finished { outputs: Vec<PathBuf> },
    Failed(String),
    Cancelled,
}

/// Handle for cancelling an in-progress export.
///
/// Cloneable; hand one clone to the job and keep another to cancel from
/// the UI side. Cancelling sets the cooperative flag and kills whatever
/// encoder process is currently attached.
#[derive(Clone)]
pub struct ExportCancel {
    cancelled: Arc<AtomicBool>,
    child: Arc<Mutex<Option<FfmpegChild>>>,
}

impl ExportCancel {
    /// Create a new cancel handle.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            child: Arc::new(Mutex::new(None)),
        }
    }

    /// Signal cancellation and kill the in-flight encoder, if any.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
        if let Some(child) = self.child.lock().as_mut() {
            let _ = child.kill();
        }
    }

    /// Check if cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    fn attach(&self, child: FfmpegChild) {
        *self.child.lock() = Some(child);
    }

    fn detach(&self) -> Option<FfmpegChild> {
        self.child.lock().take()
    }
}

impl Default for ExportCancel {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExportCancel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportCancel")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

// ── Export job ──────────────────────────────────────────────────

/// A configured export of one or more segments from a source video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportJob {
    /// Source video path
    pub source: PathBuf,
    /// Base output path; segment suffixes and collision counters derive
    /// from it
    pub output: PathBuf,
    /// Segments to export, in order
    pub segments: Vec<Segment>,
    /// Source frame rate (segment frames convert to times with this)
    pub frame_rate: FrameRate,
    /// Output container
    pub format: OutputFormat,
    /// Separate clips or one concatenated file
    pub mode: OutputMode,
}

impl ExportJob {
    /// Create a job with no segments, MP4 output, separate clips.
    pub fn new(
        source: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        frame_rate: FrameRate,
    ) -> Self {
        Self {
            source: source.into(),
            output: output.into(),
            segments: Vec::new(),
            frame_rate,
            format: OutputFormat::Mp4,
            mode: OutputMode::SeparateClips,
        }
    }

    /// Set the segments to export.
    pub fn with_segments(mut self, segments: Vec<Segment>) -> Self {
        self.segments = segments;
        self
    }

    /// Set the output container.
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the output mode.
    pub fn with_mode(mut self, mode: OutputMode) -> Self {
        self.mode = mode;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.segments.is_empty() {
            return Err(TrimlineError::InvalidParameter(
                "no segments to export".into(),
            ));
        }
        if let Some(bad) = self.segments.iter().find(|s| s.frame_len() == 0) {
            return Err(TrimlineError::InvalidParameter(format!(
                "empty segment [{}, {})",
                bad.start_frame, bad.end_frame
            )));
        }
        if !self.source.exists() {
            return Err(TrimlineError::NotFound(format!(
                "Source video not found: {}",
                self.source.display()
            )));
        }
        Ok(())
    }

    /// Run the export synchronously. Returns the files written.
    ///
    /// `on_progress` is called per encoder progress report; `cancel` is
    /// checked between encode steps. Cancellation yields
    /// [`TrimlineError::ExportCancelled`], which callers treat as an
    /// outcome, not a failure.
    pub fn run(
        &self,
        on_progress: impl Fn(ExportProgress),
        cancel: &ExportCancel,
    ) -> Result<Vec<PathBuf>> {
        self.validate()?;
        if let Some(dir) = self.output.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        info!(
            source = %self.source.display(),
            segments = self.segments.len(),
            mode = ?self.mode,
            "starting export"
        );
        let outputs = match self.mode {
            OutputMode::SeparateClips => self.run_separate(&on_progress, cancel),
            OutputMode::SingleFile => self.run_combined(&on_progress, cancel),
        }?;
        info!(files = outputs.len(), "export finished");
        Ok(outputs)
    }

    /// Run the export on its own thread, reporting over a channel.
    ///
    /// The returned receiver yields `Progress` events followed by exactly
    /// one terminal event (`Finished`, `Failed` or `Cancelled`). Playback
    /// is never blocked: the job holds no decoder state.
    pub fn spawn(self, cancel: ExportCancel) -> Receiver<ExportEvent> {
        let (tx, rx) = unbounded();
        thread::spawn(move || {
            let progress_tx = tx.clone();
            let result = self.run(
                move |progress| {
                    let _ = progress_tx.send(ExportEvent::Progress(progress));
                },
                &cancel,
            );
            let terminal = match result {
                Ok(outputs) => ExportEvent::Finished { outputs },
                Err(TrimlineError::ExportCancelled) => ExportEvent::Cancelled,
                Err(e) => ExportEvent::Failed(e.to_string()),
            };
            let _ = tx.send(terminal);
        });
        rx
    }

    fn run_separate(
        &self,
        on_progress: &dyn Fn(ExportProgress),
        cancel: &ExportCancel,
    ) -> Result<Vec<PathBuf>> {
        let mut outputs = Vec::new();
        for (index, segment) in self.segments.iter().enumerate() {
            let path = unique_path(&self.segment_path(index));
            debug!(segment = index, path = %path.display(), "exporting segment");
            if let Err(e) = self.encode_segment(*segment, &path, self.format, index, on_progress, cancel)
            {
                // Partial clip is worthless either way
                let _ = fs::remove_file(&path);
                return Err(e);
            }
            outputs.push(path);
        }
        Ok(outputs)
    }

    fn run_combined(
        &self,
        on_progress: &dyn Fn(ExportProgress),
        cancel: &ExportCancel,
    ) -> Result<Vec<PathBuf>> {
        let output = unique_path(&self.output.with_extension(self.format.extension()));
        let mut intermediates: Vec<PathBuf> = Vec::new();
        let result = self.combine_into(&output, &mut intermediates, on_progress, cancel);

        for temp in &intermediates {
            let _ = fs::remove_file(temp);
        }
        if result.is_err() {
            let _ = fs::remove_file(&output);
        }
        result.map(|()| vec![output])
    }

    fn combine_into(
        &self,
        output: &Path,
        intermediates: &mut Vec<PathBuf>,
        on_progress: &dyn Fn(ExportProgress),
        cancel: &ExportCancel,
    ) -> Result<()> {
        for (index, segment) in self.segments.iter().enumerate() {
            let temp = output.with_extension(format!("tmp{:03}.ts", index + 1));
            intermediates.push(temp.clone());
            self.encode_segment(*segment, &temp, OutputFormat::Ts, index, on_progress, cancel)?;
        }

        // Concat list for the demuxer
        let list_path = output.with_extension("concat.txt");
        let mut list = String::new();
        for temp in intermediates.iter() {
            list.push_str(&format!("file '{}'\n", temp.display()));
        }
        fs::write(&list_path, list)?;
        intermediates.push(list_path.clone());

        debug!(output = %output.display(), "combining segments");
        let mut cmd = FfmpegCommand::new();
        cmd.hide_banner()
            .overwrite()
            .args(["-f", "concat", "-safe", "0"])
            .input(list_path.to_string_lossy())
            .args(["-c", "copy"])
            .output(output.to_string_lossy());
        drive_encoder(cmd, cancel, |_, _| {})
    }

    fn encode_segment(
        &self,
        segment: Segment,
        output: &Path,
        format: OutputFormat,
        index: usize,
        on_progress: &dyn Fn(ExportProgress),
        cancel: &ExportCancel,
    ) -> Result<()> {
        let start = segment.start_time(self.frame_rate).to_seconds_f64();
        let duration = segment.duration(self.frame_rate).to_seconds_f64();
        let total_frames = segment.frame_len();
        let segment_count = self.segments.len();

        let mut cmd = FfmpegCommand::new();
        cmd.hide_banner()
            .overwrite()
            // Fast seek before the input, frame-accurate with re-encode
            .seek(format!("{start:.6}"))
            .input(self.source.to_string_lossy())
            .duration(format!("{duration:.6}"))
            .args(["-map_metadata", "-1"])
            .args(format.codec_args())
            .output(output.to_string_lossy());

        drive_encoder(cmd, cancel, |frame, fps| {
            on_progress(ExportProgress {
                segment: index,
                segment_count,
                frame,
                total_frames,
                fps,
            });
        })
    }

    fn segment_path(&self, index: usize) -> PathBuf {
        let stem = self
            .output
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "export".into());
        let name = format!(
            "{stem}_segment{:03}.{}",
            index + 1,
            self.format.extension()
        );
        self.output.with_file_name(name)
    }
}

/// Spawn the encoder, pump its event stream, and wait for its verdict.
fn drive_encoder(
    mut cmd: FfmpegCommand,
    cancel: &ExportCancel,
    mut on_progress: impl FnMut(u64, f32),
) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(TrimlineError::ExportCancelled);
    }

    let mut child = cmd
        .spawn()
        .map_err(|e| TrimlineError::Export(format!("failed to start encoder: {e}")))?;
    let events = child
        .iter()
        .map_err(|e| TrimlineError::Export(format!("encoder event stream: {e}")))?;
    // Attach so a concurrent cancel() can kill the process; the event
    // iterator owns its own pipes and keeps running until they close.
    cancel.attach(child);

    let mut diagnostics: VecDeque<String> = VecDeque::new();
    for event in events {
        match event {
            FfmpegEvent::Progress(p) => on_progress(p.frame as u64, p.fps),
            FfmpegEvent::Error(line)
            | FfmpegEvent::Log(LogLevel::Error, line)
            | FfmpegEvent::Log(LogLevel::Fatal, line) => {
                if diagnostics.len() == DIAG_LINES {
                    diagnostics.pop_front();
                }
                diagnostics.push_back(line);
            }
            _ => {}
        }
    }

    let status = cancel.detach().map(|mut child| child.wait());
    if cancel.is_cancelled() {
        return Err(TrimlineError::ExportCancelled);
    }
    match status {
        Some(Ok(status)) if status.success() => Ok(()),
        Some(Ok(status)) => {
            warn!(%status, "encoder exited abnormally");
            Err(TrimlineError::Export(format!(
                "encoder exited with {status}: {}",
                diag_message(&diagnostics)
            )))
        }
        Some(Err(e)) => Err(TrimlineError::Export(format!("waiting for encoder: {e}"))),
        None => Err(TrimlineError::Export("encoder handle lost".into())),
    }
}

fn diag_message(diagnostics: &VecDeque<String>) -> String {
    let joined = diagnostics
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("; ");
    if joined.chars().count() > DIAG_MAX_CHARS {
        let truncated: String = joined.chars().take(DIAG_MAX_CHARS).collect();
        format!("{truncated}…")
    } else {
        joined
    }
}

/// Append `_N` before the extension until the path no longer exists.
fn unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "export".into());
    let extension = path.extension().map(|e| e.to_string_lossy().into_owned());
    let mut counter = 1;
    loop {
        let name = match &extension {
            Some(ext) => format!("{stem}_{counter}.{ext}"),
            None => format!("{stem}_{counter}"),
        };
        let candidate = path.with_file_name(name);
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(dir: &Path) -> ExportJob {
        let source = dir.join("source.mp4");
        fs::write(&source, b"stub").unwrap();
        ExportJob::new(source, dir.join("out.mp4"), FrameRate::FPS_30)
    }

    #[test]
    fn test_segment_timing() {
        let segment = Segment::new(30, 90);
        assert_eq!(segment.frame_len(), 60);
        assert_eq!(segment.start_time(FrameRate::FPS_30).to_seconds_f64(), 1.0);
        assert_eq!(segment.duration(FrameRate::FPS_30).to_seconds_f64(), 2.0);
    }

    #[test]
    fn test_segment_timing_ntsc() {
        let segment = Segment::new(0, 30000);
        // 30000 frames at 29.97 fps is exactly 1001 seconds
        assert_eq!(
            segment.duration(FrameRate::FPS_29_97),
            RationalTime::new(1001, 1)
        );
    }

    #[test]
    fn test_validate_rejects_empty_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = ExportCancel::new();

        let empty = job(dir.path());
        assert!(matches!(
            empty.run(|_| {}, &cancel),
            Err(TrimlineError::InvalidParameter(_))
        ));

        let degenerate = job(dir.path()).with_segments(vec![Segment::new(10, 10)]);
        assert!(matches!(
            degenerate.run(|_| {}, &cancel),
            Err(TrimlineError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_validate_rejects_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let job = ExportJob::new(
            dir.path().join("nope.mp4"),
            dir.path().join("out.mp4"),
            FrameRate::FPS_30,
        )
        .with_segments(vec![Segment::new(0, 10)]);

        assert!(matches!(
            job.run(|_| {}, &ExportCancel::new()),
            Err(TrimlineError::NotFound(_))
        ));
    }

    #[test]
    fn test_cancelled_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = ExportCancel::new();
        cancel.cancel();

        let job = job(dir.path()).with_segments(vec![Segment::new(0, 10)]);
        assert!(matches!(
            job.run(|_| {}, &cancel),
            Err(TrimlineError::ExportCancelled)
        ));
        // Nothing was written
        assert!(!dir.path().join("out_segment001.mp4").exists());
    }

    #[test]
    fn test_cancel_handle() {
        let cancel = ExportCancel::new();
        assert!(!cancel.is_cancelled());
        cancel.cancel();
        assert!(cancel.is_cancelled());

        // Clones observe the same flag
        let clone = cancel.clone();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_segment_path_naming() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(dir.path());
        let path = job.segment_path(0);
        assert_eq!(
            path.file_name().unwrap().to_string_lossy(),
            "out_segment001.mp4"
        );
        assert_eq!(
            job.segment_path(11).file_name().unwrap().to_string_lossy(),
            "out_segment012.mp4"
        );
    }

    #[test]
    fn test_unique_path_appends_counter() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("clip.mp4");

        assert_eq!(unique_path(&target), target);

        fs::write(&target, b"x").unwrap();
        let second = unique_path(&target);
        assert_eq!(second.file_name().unwrap().to_string_lossy(), "clip_1.mp4");

        fs::write(&second, b"x").unwrap();
        let third = unique_path(&target);
        assert_eq!(third.file_name().unwrap().to_string_lossy(), "clip_2.mp4");
    }

    #[test]
    fn test_format_codec_args() {
        assert!(OutputFormat::Mp4.codec_args().contains(&"libx264"));
        assert!(OutputFormat::Mp4.codec_args().contains(&"+faststart"));
        assert!(OutputFormat::Avi.codec_args().contains(&"mpeg4"));
        assert!(OutputFormat::Wmv.codec_args().contains(&"wmv2"));
        assert_eq!(OutputFormat::Ts.extension(), "ts");
    }

    #[test]
    fn test_progress_fraction() {
        let progress = ExportProgress {
            segment: 0,
            segment_count: 2,
            frame: 50,
            total_frames: 200,
            fps: 30.0,
        };
        assert!((progress.fraction() - 0.25).abs() < 0.001);

        let empty = ExportProgress {
            segment: 0,
            segment_count: 1,
            frame: 0,
            total_frames: 0,
            fps: 0.0,
        };
        assert_eq!(empty.fraction(), 0.0);
    }

    #[test]
    fn test_spawn_reports_terminal_event() {
        let dir = tempfile::tempdir().unwrap();
        // Invalid job: the channel must still deliver a terminal event
        let bad = ExportJob::new(
            dir.path().join("missing.mp4"),
            dir.path().join("out.mp4"),
            FrameRate::FPS_30,
        )
        .with_segments(vec![Segment::new(0, 10)]);

        let rx = bad.spawn(ExportCancel::new());
        match rx.recv().unwrap() {
            ExportEvent::Failed(message) => assert!(message.contains("not found")),
            other => panic!("expected Failed, got {other:?}"),
        }
    }
}
