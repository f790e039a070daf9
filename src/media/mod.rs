pub mod classify;
pub mod extract;
pub mod merge;
pub mod remux;
pub mod segment;

pub use classify::{classify, MediaKind, VIDEO_EXTENSIONS};
pub use extract::{
    check_ffmpeg, check_ffprobe, encode_for_upload, extract_audio, ffmpeg_available,
    get_audio_duration, read_wav_metadata, UploadPayload,
};
pub use merge::{merge_segments, verify_complete};
pub use remux::replace_audio;
pub use segment::{concat_wavs, plan_segments, split_wav, SegmentSpan};

use std::path::PathBuf;
use std::time::Duration;

/// Metadata about a decoded WAV buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioMetadata {
    pub duration_ms: u64,
    pub sample_rate: u32,
    pub channels: u16,
    /// Frames per channel.
    pub frames: u64,
}

impl AudioMetadata {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

/// An input file owned by one pipeline run.
#[derive(Debug, Clone)]
pub struct MediaAsset {
    pub path: PathBuf,
    pub kind: MediaKind,
    pub duration_ms: u64,
}

/// One bounded slice of the decoded audio track, written to its own WAV file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub index: usize,
    pub start_frame: u64,
    pub frame_count: u64,
    pub duration_ms: u64,
    pub path: PathBuf,
}

impl Segment {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

/// Convert a frame count to whole milliseconds, rounding down.
pub fn frames_to_ms(frames: u64, sample_rate: u32) -> u64 {
    if sample_rate == 0 {
        return 0;
    }
    (frames as u128 * 1000 / sample_rate as u128) as u64
}

/// Convert milliseconds to a frame count, rounding down.
pub fn ms_to_frames(ms: u64, sample_rate: u32) -> u64 {
    (ms as u128 * sample_rate as u128 / 1000) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_conversions() {
        assert_eq!(ms_to_frames(1000, 44100), 44100);
        assert_eq!(ms_to_frames(240_000, 16000), 3_840_000);
        assert_eq!(frames_to_ms(22050, 44100), 500);
        assert_eq!(frames_to_ms(10, 0), 0);
    }
}
