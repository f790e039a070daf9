use std::path::{Path, PathBuf};

use hound::{WavReader, WavWriter};
use tracing::{debug, info};

use crate::error::{Result, RevoiceError};

use super::{frames_to_ms, ms_to_frames, read_wav_metadata, AudioMetadata, Segment};

/// A planned slice of the source, in frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentSpan {
    pub index: usize,
    pub start_frame: u64,
    pub frame_count: u64,
    pub duration_ms: u64,
}

impl SegmentSpan {
    pub fn end_frame(&self) -> u64 {
        self.start_frame + self.frame_count
    }
}

/// Plan fixed-maximum spans covering `total_frames` with no gaps.
///
/// Every span is `max_segment_ms` long except possibly the last. Durations are
/// taken as differences of cumulative millisecond offsets so they add up to the
/// total duration exactly.
pub fn plan_segments(
    total_frames: u64,
    sample_rate: u32,
    max_segment_ms: u64,
) -> Result<Vec<SegmentSpan>> {
    let max_frames = ms_to_frames(max_segment_ms, sample_rate);
    if max_frames == 0 {
        return Err(RevoiceError::Config(format!(
            "Segment duration {max_segment_ms}ms is shorter than one frame at {sample_rate} Hz"
        )));
    }

    let mut spans = Vec::new();
    let mut start = 0u64;

    while start < total_frames {
        let end = (start + max_frames).min(total_frames);
        spans.push(SegmentSpan {
            index: spans.len(),
            start_frame: start,
            frame_count: end - start,
            duration_ms: frames_to_ms(end, sample_rate) - frames_to_ms(start, sample_rate),
        });
        start = end;
    }

    Ok(spans)
}

/// Split a 16-bit PCM WAV into segment files under `output_dir`.
///
/// Boundaries are sample-exact: no resampling, no cross-fade.
pub fn split_wav(source: &Path, max_segment_ms: u64, output_dir: &Path) -> Result<Vec<Segment>> {
    let metadata = read_wav_metadata(source)?;
    let spans = plan_segments(metadata.frames, metadata.sample_rate, max_segment_ms)?;

    std::fs::create_dir_all(output_dir)?;

    let mut reader = WavReader::open(source)
        .map_err(|e| RevoiceError::Decode(format!("Failed to open WAV file: {e}")))?;
    let spec = reader.spec();
    let mut samples = reader.samples::<i16>();

    info!(
        "Splitting {:.1}s of audio into {} segments of at most {}ms",
        metadata.duration().as_secs_f64(),
        spans.len(),
        max_segment_ms
    );

    let mut segments = Vec::with_capacity(spans.len());

    for span in spans {
        let path = segment_path(output_dir, span.index);
        let mut writer = WavWriter::create(&path, spec)
            .map_err(|e| RevoiceError::Decode(format!("Failed to create {}: {e}", path.display())))?;

        let sample_count = span.frame_count * spec.channels as u64;
        for _ in 0..sample_count {
            let sample = samples
                .next()
                .ok_or_else(|| {
                    RevoiceError::Decode(format!(
                        "{} ended early while writing segment {}",
                        source.display(),
                        span.index
                    ))
                })?
                .map_err(|e| RevoiceError::Decode(format!("Failed to read sample: {e}")))?;
            writer
                .write_sample(sample)
                .map_err(|e| RevoiceError::Decode(format!("Failed to write sample: {e}")))?;
        }
        writer
            .finalize()
            .map_err(|e| RevoiceError::Decode(format!("Failed to finalize segment: {e}")))?;

        debug!(
            "Segment {}: frames {}..{} ({}ms)",
            span.index,
            span.start_frame,
            span.end_frame(),
            span.duration_ms
        );

        segments.push(Segment {
            index: span.index,
            start_frame: span.start_frame,
            frame_count: span.frame_count,
            duration_ms: span.duration_ms,
            path,
        });
    }

    Ok(segments)
}

/// Concatenate WAV files with identical specs into `output`, in the given order.
pub fn concat_wavs(inputs: &[PathBuf], output: &Path) -> Result<AudioMetadata> {
    let first = inputs
        .first()
        .ok_or_else(|| RevoiceError::Integrity("No audio to concatenate".to_string()))?;
    let spec = WavReader::open(first)
        .map_err(|e| RevoiceError::Decode(format!("Failed to open {}: {e}", first.display())))?
        .spec();

    let mut writer = WavWriter::create(output, spec)
        .map_err(|e| RevoiceError::Decode(format!("Failed to create {}: {e}", output.display())))?;

    for input in inputs {
        let mut reader = WavReader::open(input)
            .map_err(|e| RevoiceError::Decode(format!("Failed to open {}: {e}", input.display())))?;
        if reader.spec() != spec {
            return Err(RevoiceError::Decode(format!(
                "{} has a different format than {}",
                input.display(),
                first.display()
            )));
        }
        for sample in reader.samples::<i16>() {
            let sample =
                sample.map_err(|e| RevoiceError::Decode(format!("Failed to read sample: {e}")))?;
            writer
                .write_sample(sample)
                .map_err(|e| RevoiceError::Decode(format!("Failed to write sample: {e}")))?;
        }
    }

    writer
        .finalize()
        .map_err(|e| RevoiceError::Decode(format!("Failed to finalize {}: {e}", output.display())))?;

    read_wav_metadata(output)
}

fn segment_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("segment_{:04}.wav", index))
}
