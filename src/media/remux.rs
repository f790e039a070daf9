use std::path::Path;
use std::process::Stdio;

use tracing::info;

use crate::error::{Result, RevoiceError};

use super::check_ffmpeg;

/// Write `output` with the video streams of `video` and the audio of `audio`.
///
/// Video is copied without re-encoding; the new audio is encoded to AAC. The
/// result is cut to the shorter of the two streams.
pub async fn replace_audio(video: &Path, audio: &Path, output: &Path) -> Result<()> {
    check_ffmpeg().map_err(|e| RevoiceError::Mux(e.to_string()))?;

    info!(
        "Replacing audio of {} with {}",
        video.display(),
        audio.display()
    );

    let result = tokio::process::Command::new("ffmpeg")
        .args(["-y", "-loglevel", "error", "-i"])
        .arg(video)
        .arg("-i")
        .arg(audio)
        .args([
            "-map", "0:v", "-map", "1:a", "-c:v", "copy", "-c:a", "aac", "-shortest",
        ])
        .arg(output)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| RevoiceError::Mux(format!("Failed to run FFmpeg: {e}")))?;

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        if output.exists() {
            let _ = std::fs::remove_file(output);
        }
        return Err(RevoiceError::Mux(format!(
            "FFmpeg could not write {}: {}",
            output.display(),
            stderr.trim()
        )));
    }

    info!("Video written to {}", output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::ffmpeg_available;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_replace_audio_missing_inputs_is_mux_error() {
        if !ffmpeg_available() {
            eprintln!("Skipping test: FFmpeg not available");
            return;
        }

        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.mp4");
        let result = replace_audio(
            &dir.path().join("missing.mp4"),
            &dir.path().join("missing.wav"),
            &output,
        )
        .await;

        assert!(matches!(result, Err(RevoiceError::Mux(_))));
        assert!(!output.exists());
    }
}
