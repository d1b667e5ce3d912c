//! Media file probing to get metadata without a full decode.
//!
//! Shells out to `ffprobe` with JSON output and parses the result into
//! typed stream info. The decoder open path relies on this for frame
//! count, frame rate and dimensions.

use ffmpeg_sidecar::ffprobe::ffprobe_path;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;
use tracing::debug;
use trimline_core::{FrameRate, RationalTime, Result, TrimlineError};

/// Information about a media file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaProbe {
    /// File path
    pub path: String,
    /// Container format
    pub format: String,
    /// Duration
    pub duration: RationalTime,
    /// Total video frames (reported, or derived from duration and rate)
    pub frame_count: u64,
    /// Video streams
    pub video_streams: Vec<VideoStreamInfo>,
    /// Audio streams
    pub audio_streams: Vec<AudioStreamInfo>,
}

/// Information about a video stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoStreamInfo {
    pub index: usize,
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
    pub pixel_format: String,
}

/// Information about an audio stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioStreamInfo {
    pub index: usize,
    pub codec: String,
    pub sample_rate: u32,
    pub channels: u16,
}

// Raw ffprobe JSON shapes; everything optional because ffprobe omits
// fields freely depending on container and codec.

#[derive(Debug, Deserialize)]
struct RawProbe {
    #[serde(default)]
    streams: Vec<RawStream>,
    format: Option<RawFormat>,
}

#[derive(Debug, Deserialize)]
struct RawStream {
    index: usize,
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    pix_fmt: Option<String>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct RawFormat {
    format_name: Option<String>,
    duration: Option<String>,
}

impl MediaProbe {
    /// Probe a media file.
    pub fn probe<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(TrimlineError::NotFound(format!(
                "File not found: {}",
                path.display()
            )));
        }

        let output = Command::new(ffprobe_path())
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TrimlineError::Probe(format!(
                "ffprobe exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let raw: RawProbe = serde_json::from_slice(&output.stdout)
            .map_err(|e| TrimlineError::Probe(format!("unreadable ffprobe output: {e}")))?;

        let probe = Self::from_raw(path.to_string_lossy().into_owned(), raw);
        debug!(
            path = %path.display(),
            frames = probe.frame_count,
            streams = probe.video_streams.len() + probe.audio_streams.len(),
            "probed media file"
        );
        Ok(probe)
    }

    fn from_raw(path: String, raw: RawProbe) -> Self {
        let mut video_streams = Vec::new();
        let mut audio_streams = Vec::new();
        let mut reported_frames: Option<u64> = None;

        for stream in raw.streams {
            match stream.codec_type.as_deref() {
                Some("video") => {
                    // avg_frame_rate reflects actual content; r_frame_rate
                    // is the container's base rate. Prefer the former,
                    // ffprobe reports "0/0" for either when unknown.
                    let frame_rate = [&stream.avg_frame_rate, &stream.r_frame_rate]
                        .into_iter()
                        .flatten()
                        .find_map(|s| s.parse::<FrameRate>().ok())
                        .unwrap_or_default();
                    if reported_frames.is_none() {
                        reported_frames =
                            stream.nb_frames.as_deref().and_then(|n| n.parse().ok());
                    }
                    video_streams.push(VideoStreamInfo {
                        index: stream.index,
                        codec: stream.codec_name.unwrap_or_default(),
                        width: stream.width.unwrap_or(0),
                        height: stream.height.unwrap_or(0),
                        frame_rate,
                        pixel_format: stream.pix_fmt.unwrap_or_default(),
                    });
                }
                Some("audio") => {
                    audio_streams.push(AudioStreamInfo {
                        index: stream.index,
                        codec: stream.codec_name.unwrap_or_default(),
                        sample_rate: stream
                            .sample_rate
                            .as_deref()
                            .and_then(|s| s.parse().ok())
                            .unwrap_or(0),
                        channels: stream.channels.unwrap_or(0),
                    });
                }
                _ => {}
            }
        }

        let format = raw
            .format
            .as_ref()
            .and_then(|f| f.format_name.clone())
            .unwrap_or_default();
        let duration = raw
            .format
            .as_ref()
            .and_then(|f| f.duration.as_deref())
            .and_then(|d| d.parse::<f64>().ok())
            .map(RationalTime::from_seconds_f64)
            .unwrap_or(RationalTime::ZERO);

        // Some containers do not carry nb_frames; fall back to rate * duration.
        let frame_count = reported_frames.unwrap_or_else(|| {
            video_streams
                .first()
                .map(|v| (duration.to_seconds_f64() * v.frame_rate.to_fps_f64()).round() as u64)
                .unwrap_or(0)
        });

        Self {
            path,
            format,
            duration,
            frame_count,
            video_streams,
            audio_streams,
        }
    }

    /// Check if the file has video.
    pub fn has_video(&self) -> bool {
        !self.video_streams.is_empty()
    }

    /// Check if the file has audio.
    pub fn has_audio(&self) -> bool {
        !self.audio_streams.is_empty()
    }

    /// Get the primary video stream info.
    pub fn primary_video(&self) -> Option<&VideoStreamInfo> {
        self.video_streams.first()
    }

    /// Get the primary audio stream info.
    pub fn primary_audio(&self) -> Option<&AudioStreamInfo> {
        self.audio_streams.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> MediaProbe {
        let raw: RawProbe = serde_json::from_str(json).unwrap();
        MediaProbe::from_raw("test.mp4".into(), raw)
    }

    #[test]
    fn test_parse_typical_mp4() {
        let probe = parse(
            r#"{
                "streams": [
                    {
                        "index": 0,
                        "codec_type": "video",
                        "codec_name": "h264",
                        "width": 1920,
                        "height": 1080,
                        "pix_fmt": "yuv420p",
                        "avg_frame_rate": "30000/1001",
                        "r_frame_rate": "30000/1001",
                        "nb_frames": "300"
                    },
                    {
                        "index": 1,
                        "codec_type": "audio",
                        "codec_name": "aac",
                        "sample_rate": "48000",
                        "channels": 2
                    }
                ],
                "format": { "format_name": "mov,mp4,m4a,3gp,3g2,mj2", "duration": "10.010000" }
            }"#,
        );

        assert!(probe.has_video());
        assert!(probe.has_audio());
        assert_eq!(probe.frame_count, 300);

        let video = probe.primary_video().unwrap();
        assert_eq!(video.width, 1920);
        assert_eq!(video.frame_rate, FrameRate::FPS_29_97);

        let audio = probe.primary_audio().unwrap();
        assert_eq!(audio.sample_rate, 48000);
    }

    #[test]
    fn test_frame_count_falls_back_to_duration() {
        let probe = parse(
            r#"{
                "streams": [
                    {
                        "index": 0,
                        "codec_type": "video",
                        "codec_name": "vp9",
                        "width": 1280,
                        "height": 720,
                        "avg_frame_rate": "0/0",
                        "r_frame_rate": "25/1"
                    }
                ],
                "format": { "format_name": "matroska,webm", "duration": "4.0" }
            }"#,
        );

        // avg is unknown, r_frame_rate carries 25 fps: 4s * 25 = 100
        assert_eq!(probe.primary_video().unwrap().frame_rate, FrameRate::FPS_25);
        assert_eq!(probe.frame_count, 100);
    }

    #[test]
    fn test_no_video_stream() {
        let probe = parse(
            r#"{
                "streams": [
                    { "index": 0, "codec_type": "audio", "codec_name": "mp3", "sample_rate": "44100", "channels": 2 }
                ],
                "format": { "format_name": "mp3", "duration": "180.0" }
            }"#,
        );
        assert!(!probe.has_video());
        assert_eq!(probe.frame_count, 0);
    }
}
