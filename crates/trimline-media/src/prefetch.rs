//! Prefetch window policy — which frames to decode ahead of need.
//!
//! The playback coordinator decodes these windows eagerly, inside the
//! call that triggered them; there is no background decode thread. The
//! policy itself is pure arithmetic over frame indices, so it stays
//! trivially testable.
//!
//! Seek-shaped windows are biased forward (more frames ahead of the
//! target than behind) to match the dominant forward-playback access
//! pattern while still covering small backward scrubs.

use std::ops::Range;

/// Frames decoded when a video is first loaded.
pub const WARM_AHEAD: u64 = 30;
/// Look-ahead bound during sequential playback.
pub const PLAYBACK_AHEAD: u64 = 10;
/// Frames kept behind the target of a seek or positioned read.
pub const SCRUB_BEHIND: u64 = 5;
/// Look-ahead past the target of a positioned read.
pub const READ_AHEAD: u64 = 15;
/// Look-ahead past the target of a bare seek.
pub const SEEK_AHEAD: u64 = 20;

/// Window warming the cache right after a load, for instant first-frame
/// display and early playback.
pub fn warm_window(frame_count: u64) -> Range<u64> {
    0..WARM_AHEAD.min(frame_count)
}

/// Window after sequential playback consumed frame `consumed`.
pub fn playback_window(consumed: u64, frame_count: u64) -> Range<u64> {
    let start = consumed + 1;
    let end = (consumed + PLAYBACK_AHEAD).min(frame_count);
    start..end.max(start)
}

/// Window around the target of a positioned read.
pub fn positioned_window(target: u64, frame_count: u64) -> Range<u64> {
    let start = target.saturating_sub(SCRUB_BEHIND);
    let end = (target + READ_AHEAD).min(frame_count);
    start..end.max(start)
}

/// Window around the target of a bare seek.
pub fn seek_window(target: u64, frame_count: u64) -> Range<u64> {
    let start = target.saturating_sub(SCRUB_BEHIND);
    let end = (target + SEEK_AHEAD).min(frame_count);
    start..end.max(start)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warm_covers_start_of_video() {
        assert_eq!(warm_window(100), 0..30);
        assert_eq!(warm_window(12), 0..12);
        assert_eq!(warm_window(0), 0..0);
    }

    #[test]
    fn playback_looks_ahead_of_consumed_frame() {
        assert_eq!(playback_window(40, 100), 41..50);
        // Clamped at the end of the video
        assert_eq!(playback_window(95, 100), 96..100);
        // Nothing left after the last frame
        assert!(playback_window(99, 100).is_empty());
    }

    #[test]
    fn positioned_read_biases_forward() {
        assert_eq!(positioned_window(50, 100), 45..65);
        assert_eq!(positioned_window(2, 100), 0..17);
        assert_eq!(positioned_window(95, 100), 90..100);
    }

    #[test]
    fn bare_seek_reaches_further_ahead() {
        assert_eq!(seek_window(50, 100), 45..70);
        assert_eq!(seek_window(0, 100), 0..20);
        // Cursor parked at end-of-stream still backfills behind it
        assert_eq!(seek_window(100, 100), 95..100);
    }
}
