use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

use tracing::{debug, info};

use crate::config::UploadFormat;
use crate::error::{Result, RevoiceError};

use super::{frames_to_ms, AudioMetadata};

/// Check if FFmpeg is installed and accessible.
pub fn check_ffmpeg() -> Result<()> {
    let output = Command::new("ffmpeg")
        .arg("-version")
        .output()
        .map_err(|e| {
            RevoiceError::Decode(format!(
                "FFmpeg not found. Please install FFmpeg and ensure it's in your PATH. Error: {e}"
            ))
        })?;

    if !output.status.success() {
        return Err(RevoiceError::Decode("FFmpeg check failed".to_string()));
    }

    debug!("FFmpeg is available");
    Ok(())
}

/// Check if FFprobe is installed and accessible.
pub fn check_ffprobe() -> Result<()> {
    let output = Command::new("ffprobe")
        .arg("-version")
        .output()
        .map_err(|e| {
            RevoiceError::Decode(format!(
                "FFprobe not found. Please install FFmpeg (includes FFprobe). Error: {e}"
            ))
        })?;

    if !output.status.success() {
        return Err(RevoiceError::Decode("FFprobe check failed".to_string()));
    }

    debug!("FFprobe is available");
    Ok(())
}

pub fn ffmpeg_available() -> bool {
    check_ffmpeg().is_ok()
}

/// Get container duration using FFprobe.
pub fn get_audio_duration(input: &Path) -> Result<Duration> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(input)
        .output()
        .map_err(|e| RevoiceError::Decode(format!("Failed to run FFprobe: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(RevoiceError::Decode(format!("FFprobe failed: {stderr}")));
    }

    let duration_str = String::from_utf8_lossy(&output.stdout);
    let duration_secs: f64 = duration_str.trim().parse().map_err(|e| {
        RevoiceError::Decode(format!(
            "Failed to parse duration '{}': {e}",
            duration_str.trim()
        ))
    })?;

    Ok(Duration::from_secs_f64(duration_secs))
}

/// Read the format and length of a 16-bit PCM WAV file.
pub fn read_wav_metadata(path: &Path) -> Result<AudioMetadata> {
    let reader = hound::WavReader::open(path).map_err(|e| {
        RevoiceError::Decode(format!("Failed to open WAV file {}: {e}", path.display()))
    })?;

    let spec = reader.spec();
    if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
        return Err(RevoiceError::Decode(format!(
            "Expected 16-bit PCM WAV, got {} bits {:?}",
            spec.bits_per_sample, spec.sample_format
        )));
    }

    let frames = reader.duration() as u64;
    Ok(AudioMetadata {
        duration_ms: frames_to_ms(frames, spec.sample_rate),
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        frames,
    })
}

/// Decode the audio track of any audio or video container into a 16-bit PCM WAV.
///
/// Sample rate and channel layout of the source are kept so segment boundaries
/// stay sample-exact. The output file belongs to the caller.
pub async fn extract_audio(input: &Path, output: &Path) -> Result<AudioMetadata> {
    check_ffmpeg()?;

    if !input.exists() {
        return Err(RevoiceError::FileNotFound(input.display().to_string()));
    }

    info!("Extracting audio from {}", input.display());

    let result = tokio::process::Command::new("ffmpeg")
        .args(["-y", "-loglevel", "error", "-i"])
        .arg(input)
        .args(["-vn", "-map", "0:a:0", "-acodec", "pcm_s16le"])
        .arg(output)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| RevoiceError::Decode(format!("Failed to run FFmpeg: {e}")))?;

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        let message = if stderr.contains("matches no streams") {
            format!("{} has no audio track", input.display())
        } else {
            format!("FFmpeg audio extraction failed: {}", stderr.trim())
        };
        return Err(RevoiceError::Decode(message));
    }

    if !output.exists() {
        return Err(RevoiceError::Decode(
            "Output file was not created".to_string(),
        ));
    }

    let metadata = read_wav_metadata(output)?;
    info!(
        "Audio extracted to {} ({:.1}s, {} Hz, {} ch)",
        output.display(),
        metadata.duration().as_secs_f64(),
        metadata.sample_rate,
        metadata.channels
    );

    Ok(metadata)
}

/// Bytes of one segment in the format sent to the service.
#[derive(Debug, Clone)]
pub struct UploadPayload {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub mime_type: &'static str,
}

/// Re-encode a segment WAV into the upload wire format.
pub async fn encode_for_upload(segment: &Path, format: UploadFormat) -> Result<UploadPayload> {
    let stem = segment
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("segment");
    let file_name = format!("{stem}.{}", format.extension());

    let bytes = match format {
        UploadFormat::Wav => tokio::fs::read(segment).await?,
        UploadFormat::Mp3 => {
            let result = tokio::process::Command::new("ffmpeg")
                .args(["-loglevel", "error", "-i"])
                .arg(segment)
                .args(["-codec:a", "libmp3lame", "-b:a", "128k", "-f", "mp3", "pipe:1"])
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output()
                .await
                .map_err(|e| RevoiceError::Decode(format!("Failed to run FFmpeg: {e}")))?;

            if !result.status.success() {
                let stderr = String::from_utf8_lossy(&result.stderr);
                return Err(RevoiceError::Decode(format!(
                    "MP3 encoding of {} failed: {}",
                    segment.display(),
                    stderr.trim()
                )));
            }
            result.stdout
        }
    };

    debug!("Encoded {} as {} ({} bytes)", segment.display(), format, bytes.len());

    Ok(UploadPayload {
        bytes,
        file_name,
        mime_type: format.mime_type(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_wav(path: &Path, sample_rate: u32, samples: &[i16]) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_check_ffmpeg() {
        let result = check_ffmpeg();
        if !ffmpeg_available() {
            eprintln!("Skipping test: FFmpeg not available or broken");
            return;
        }
        assert!(result.is_ok(), "FFmpeg check failed: {:?}", result.err());
    }

    #[test]
    fn test_read_wav_metadata() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tone.wav");
        write_wav(&path, 8000, &vec![100; 12000]);

        let metadata = read_wav_metadata(&path).unwrap();
        assert_eq!(metadata.sample_rate, 8000);
        assert_eq!(metadata.channels, 1);
        assert_eq!(metadata.frames, 12000);
        assert_eq!(metadata.duration_ms, 1500);
    }

    #[test]
    fn test_read_wav_metadata_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.wav");
        std::fs::write(&path, b"not a wav file").unwrap();

        let result = read_wav_metadata(&path);
        assert!(matches!(result, Err(RevoiceError::Decode(_))));
    }

    #[tokio::test]
    async fn test_encode_wav_passthrough() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("segment_0000.wav");
        write_wav(&path, 8000, &[1, 2, 3]);

        let payload = encode_for_upload(&path, UploadFormat::Wav).await.unwrap();
        assert_eq!(payload.file_name, "segment_0000.wav");
        assert_eq!(payload.mime_type, "audio/wav");
        assert_eq!(payload.bytes, std::fs::read(&path).unwrap());
    }

    #[tokio::test]
    async fn test_extract_audio_file_not_found() {
        if !ffmpeg_available() {
            eprintln!("Skipping test: FFmpeg not available");
            return;
        }

        let result =
            extract_audio(Path::new("/nonexistent/file.mp4"), Path::new("/tmp/out.wav")).await;
        match &result {
            Err(RevoiceError::FileNotFound(path)) => {
                assert!(path.contains("nonexistent"));
            }
            Err(other) => {
                panic!("Expected FileNotFound error, got: {other}");
            }
            Ok(_) => {
                panic!("Expected error but got Ok");
            }
        }
    }

    #[tokio::test]
    async fn test_extract_audio_from_wav_keeps_spec() {
        if !ffmpeg_available() {
            eprintln!("Skipping test: FFmpeg not available");
            return;
        }

        let dir = TempDir::new().unwrap();
        let input = dir.path().join("input.wav");
        let output = dir.path().join("decoded.wav");
        write_wav(&input, 16000, &vec![500; 16000]);

        let metadata = extract_audio(&input, &output).await.unwrap();
        assert_eq!(metadata.sample_rate, 16000);
        assert_eq!(metadata.frames, 16000);
        assert_eq!(metadata.duration_ms, 1000);
    }

    #[tokio::test]
    async fn test_extract_audio_video_without_audio_track() {
        if !ffmpeg_available() {
            eprintln!("Skipping test: FFmpeg not available");
            return;
        }

        let dir = TempDir::new().unwrap();
        let video = dir.path().join("silent.mp4");
        let status = Command::new("ffmpeg")
            .args([
                "-y", "-loglevel", "error",
                "-f", "lavfi", "-i", "color=c=black:s=32x32:r=5",
                "-t", "1", "-c:v", "mpeg4",
            ])
            .arg(&video)
            .status()
            .unwrap();
        if !status.success() {
            eprintln!("Skipping test: could not create test video");
            return;
        }

        let result = extract_audio(&video, &dir.path().join("decoded.wav")).await;
        match result {
            Err(RevoiceError::Decode(message)) => {
                assert!(message.contains("has no audio track"), "{message}");
            }
            Err(other) => panic!("Expected Decode error, got: {other}"),
            Ok(_) => panic!("Expected error but got Ok"),
        }
    }

    #[tokio::test]
    async fn test_extract_audio_unreadable_container() {
        if !ffmpeg_available() {
            eprintln!("Skipping test: FFmpeg not available");
            return;
        }

        let dir = TempDir::new().unwrap();
        let input = dir.path().join("broken.mp3");
        std::fs::write(&input, b"this is not an audio file at all").unwrap();
        let output = dir.path().join("decoded.wav");

        let result = extract_audio(&input, &output).await;
        assert!(
            matches!(result, Err(RevoiceError::Decode(_))),
            "Expected Decode error, got: {result:?}"
        );
    }
}
