use std::path::{Path, PathBuf};
use std::process::Stdio;

use hound::{SampleFormat, WavSpec, WavWriter};
use tracing::{debug, info, warn};

use crate::config::OutputFormat;
use crate::convert::ConvertedSegment;
use crate::error::{Result, RevoiceError};

use super::{concat_wavs, read_wav_metadata, AudioMetadata};

/// Check that `converted` holds exactly the indices `0..expected`, and sort it.
pub fn verify_complete(converted: &mut [ConvertedSegment], expected: usize) -> Result<()> {
    converted.sort_by_key(|c| c.index);

    if converted.len() != expected {
        return Err(RevoiceError::Integrity(format!(
            "Expected {expected} converted segments, got {}",
            converted.len()
        )));
    }

    for (position, segment) in converted.iter().enumerate() {
        if segment.index != position {
            let problem = if position > 0 && converted[position - 1].index == segment.index {
                "duplicate"
            } else {
                "missing"
            };
            return Err(RevoiceError::Integrity(format!(
                "Segment index {problem} at position {position} (found {})",
                segment.index
            )));
        }
    }

    Ok(())
}

/// Concatenate converted segments in index order into one WAV file.
///
/// Scratch files created in `work_dir` are removed whether or not the merge
/// succeeds.
pub async fn merge_segments(
    mut converted: Vec<ConvertedSegment>,
    expected: usize,
    format: OutputFormat,
    work_dir: &Path,
    output: &Path,
) -> Result<AudioMetadata> {
    verify_complete(&mut converted, expected)?;
    if converted.is_empty() {
        return Err(RevoiceError::Integrity(
            "No converted segments to merge".to_string(),
        ));
    }

    info!("Merging {} converted segments", converted.len());

    let metadata = match format {
        OutputFormat::Pcm { sample_rate } => merge_pcm(converted, sample_rate, output)?,
        OutputFormat::Mp3 { sample_rate, .. } => {
            let mut scratch = Vec::new();
            let result = merge_mp3(converted, sample_rate, work_dir, output, &mut scratch).await;
            remove_files(&scratch);
            result?
        }
    };

    info!(
        "Merged audio written to {} ({:.1}s)",
        output.display(),
        metadata.duration().as_secs_f64()
    );
    Ok(metadata)
}

fn merge_pcm(
    converted: Vec<ConvertedSegment>,
    sample_rate: u32,
    output: &Path,
) -> Result<AudioMetadata> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(output, spec)
        .map_err(|e| RevoiceError::Decode(format!("Failed to create {}: {e}", output.display())))?;

    for segment in converted {
        if segment.audio.len() % 2 != 0 {
            return Err(RevoiceError::Decode(format!(
                "Segment {} returned {} bytes, not whole 16-bit samples",
                segment.index,
                segment.audio.len()
            )));
        }
        for pair in segment.audio.chunks_exact(2) {
            writer
                .write_sample(i16::from_le_bytes([pair[0], pair[1]]))
                .map_err(|e| RevoiceError::Decode(format!("Failed to write sample: {e}")))?;
        }
        debug!("Appended segment {} ({} bytes)", segment.index, segment.audio.len());
    }

    writer
        .finalize()
        .map_err(|e| RevoiceError::Decode(format!("Failed to finalize {}: {e}", output.display())))?;

    read_wav_metadata(output)
}

async fn merge_mp3(
    converted: Vec<ConvertedSegment>,
    sample_rate: u32,
    work_dir: &Path,
    output: &Path,
    scratch: &mut Vec<PathBuf>,
) -> Result<AudioMetadata> {
    let mut decoded = Vec::with_capacity(converted.len());

    for segment in converted {
        let mp3_path = work_dir.join(format!("converted_{:04}.mp3", segment.index));
        let wav_path = work_dir.join(format!("converted_{:04}.wav", segment.index));
        scratch.push(mp3_path.clone());
        scratch.push(wav_path.clone());

        tokio::fs::write(&mp3_path, &segment.audio).await?;

        let result = tokio::process::Command::new("ffmpeg")
            .args(["-y", "-loglevel", "error", "-i"])
            .arg(&mp3_path)
            .args(["-acodec", "pcm_s16le", "-ac", "1", "-ar"])
            .arg(sample_rate.to_string())
            .arg(&wav_path)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| RevoiceError::Decode(format!("Failed to run FFmpeg: {e}")))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(RevoiceError::Decode(format!(
                "Failed to decode converted segment {}: {}",
                segment.index,
                stderr.trim()
            )));
        }

        decoded.push(wav_path);
    }

    concat_wavs(&decoded, output)
}

fn remove_files(paths: &[PathBuf]) {
    for path in paths {
        if path.exists() {
            if let Err(e) = std::fs::remove_file(path) {
                warn!("Failed to remove {}: {e}", path.display());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::WavReader;
    use tempfile::TempDir;

    fn converted(index: usize, samples: &[i16]) -> ConvertedSegment {
        ConvertedSegment {
            index,
            audio: samples.iter().flat_map(|s| s.to_le_bytes()).collect(),
            voice_id: "voice".to_string(),
            duration_ms: 0,
        }
    }

    #[test]
    fn test_verify_complete_sorts() {
        let mut segments = vec![converted(2, &[]), converted(0, &[]), converted(1, &[])];
        verify_complete(&mut segments, 3).unwrap();
        let order: Vec<usize> = segments.iter().map(|s| s.index).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_verify_complete_detects_gap() {
        let mut segments = vec![converted(0, &[]), converted(2, &[])];
        let err = verify_complete(&mut segments, 2).unwrap_err();
        assert!(matches!(err, RevoiceError::Integrity(ref m) if m.contains("missing")));
    }

    #[test]
    fn test_verify_complete_detects_duplicate() {
        let mut segments = vec![converted(0, &[]), converted(1, &[]), converted(1, &[])];
        assert!(verify_complete(&mut segments, 3).is_err());

        let mut segments = vec![converted(0, &[]), converted(0, &[])];
        let err = verify_complete(&mut segments, 2).unwrap_err();
        assert!(matches!(err, RevoiceError::Integrity(ref m) if m.contains("duplicate")));
    }

    #[test]
    fn test_verify_complete_detects_count_mismatch() {
        let mut segments = vec![converted(0, &[])];
        assert!(verify_complete(&mut segments, 2).is_err());
    }

    #[tokio::test]
    async fn test_merge_pcm_in_index_order() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("merged.wav");
        let segments = vec![converted(1, &[4, 5]), converted(0, &[1, 2, 3])];

        let metadata = merge_segments(
            segments,
            2,
            OutputFormat::Pcm { sample_rate: 1000 },
            dir.path(),
            &output,
        )
        .await
        .unwrap();

        assert_eq!(metadata.frames, 5);
        assert_eq!(metadata.duration_ms, 5);
        let samples: Vec<i16> = WavReader::open(&output)
            .unwrap()
            .samples::<i16>()
            .map(|s| s.unwrap())
            .collect();
        assert_eq!(samples, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_merge_rejects_odd_pcm() {
        let dir = TempDir::new().unwrap();
        let mut segment = converted(0, &[1]);
        segment.audio.push(0);

        let result = merge_segments(
            vec![segment],
            1,
            OutputFormat::Pcm { sample_rate: 1000 },
            dir.path(),
            &dir.path().join("merged.wav"),
        )
        .await;
        assert!(matches!(result, Err(RevoiceError::Decode(_))));
    }

    #[tokio::test]
    async fn test_merge_incomplete_is_integrity_error() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("merged.wav");

        let result = merge_segments(
            vec![converted(0, &[1]), converted(2, &[2])],
            3,
            OutputFormat::default(),
            dir.path(),
            &output,
        )
        .await;

        assert!(matches!(result, Err(RevoiceError::Integrity(_))));
        assert!(!output.exists());
    }

    fn encode_mp3(source: &str, path: &Path) -> bool {
        std::process::Command::new("ffmpeg")
            .args(["-y", "-loglevel", "error", "-f", "lavfi", "-i", source])
            .args(["-t", "1", "-ac", "1", "-codec:a", "libmp3lame", "-b:a", "64k"])
            .arg(path)
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn mean_abs(samples: &[i16]) -> f64 {
        samples.iter().map(|s| (*s as f64).abs()).sum::<f64>() / samples.len() as f64
    }

    #[tokio::test]
    async fn test_merge_mp3_in_index_order() {
        if !crate::media::ffmpeg_available() {
            eprintln!("Skipping test: FFmpeg not available");
            return;
        }

        let fixtures = TempDir::new().unwrap();
        let silence = fixtures.path().join("silence.mp3");
        let tone = fixtures.path().join("tone.mp3");
        if !encode_mp3("anullsrc=r=16000:cl=mono", &silence)
            || !encode_mp3("sine=frequency=440:sample_rate=16000", &tone)
        {
            eprintln!("Skipping test: FFmpeg cannot encode MP3");
            return;
        }

        let segment = |index: usize, path: &Path| ConvertedSegment {
            index,
            audio: std::fs::read(path).unwrap(),
            voice_id: "voice".to_string(),
            duration_ms: 1000,
        };
        let segments = vec![segment(1, &tone), segment(0, &silence)];

        let dir = TempDir::new().unwrap();
        let output = dir.path().join("merged.wav");
        let metadata = merge_segments(
            segments,
            2,
            OutputFormat::Mp3 {
                sample_rate: 16000,
                bitrate_kbps: 64,
            },
            dir.path(),
            &output,
        )
        .await
        .unwrap();

        assert_eq!(metadata.sample_rate, 16000);
        assert!(
            (30_000..=36_000).contains(&metadata.frames),
            "unexpected length: {} frames",
            metadata.frames
        );

        let samples: Vec<i16> = WavReader::open(&output)
            .unwrap()
            .samples::<i16>()
            .map(|s| s.unwrap())
            .collect();
        assert!(mean_abs(&samples[..8000]) < 50.0);
        assert!(mean_abs(&samples[samples.len() - 8000..]) > 1000.0);

        let leftovers: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .filter(|name| name.starts_with("converted_"))
            .collect();
        assert!(leftovers.is_empty(), "scratch files left: {leftovers:?}");
    }
}
