//! End-to-end check of the API key, account, catalog and conversion path.

use crate::config::{Config, OutputFormat};
use crate::convert::{ConversionRequest, ConvertedSegment, ElevenLabsClient, VoiceConverter};
use crate::error::{ErrorCategory, Result};
use crate::media::{check_ffmpeg, check_ffprobe, merge_segments, UploadPayload};
use console::style;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Short public clip used for the test conversion.
pub const SAMPLE_CLIP_URL: &str =
    "https://storage.googleapis.com/eleven-public-cdn/audio/marketing/nicole.mp3";

#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Passed(String),
    Warning(String),
    Failed(String),
    Skipped,
}

#[derive(Debug, Clone)]
pub struct DiagnosticStep {
    pub name: &'static str,
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, Default)]
pub struct DiagnosticReport {
    pub steps: Vec<DiagnosticStep>,
    /// Converted sample, when the conversion step succeeded.
    pub output_path: Option<PathBuf>,
}

impl DiagnosticReport {
    /// True when no step failed.
    pub fn passed(&self) -> bool {
        !self
            .steps
            .iter()
            .any(|s| matches!(s.outcome, StepOutcome::Failed(_)))
    }

    pub fn step(&self, name: &str) -> Option<&StepOutcome> {
        self.steps.iter().find(|s| s.name == name).map(|s| &s.outcome)
    }

    fn record(&mut self, name: &'static str, outcome: StepOutcome) {
        print_step(name, &outcome);
        self.steps.push(DiagnosticStep { name, outcome });
    }
}

/// Run every check against the configured account.
pub async fn run_diagnostic(config: &Config) -> DiagnosticReport {
    run_diagnostic_with(config, SAMPLE_CLIP_URL, &std::env::temp_dir()).await
}

/// Run the checks with an explicit sample clip and output directory.
pub async fn run_diagnostic_with(
    config: &Config,
    sample_url: &str,
    output_dir: &Path,
) -> DiagnosticReport {
    println!();
    println!("{}", style("═══ Voice Changer Diagnostic ═══").bold().cyan());
    println!();

    let mut report = DiagnosticReport::default();

    let key = match config.api_key() {
        Ok(key) => key,
        Err(_) => {
            report.record(
                "api_key",
                StepOutcome::Failed(
                    "API key not found. Set it with: export ELEVENLABS_API_KEY=...".to_string(),
                ),
            );
            for name in ["ffmpeg", "subscription", "voices", "conversion"] {
                report.record(name, StepOutcome::Skipped);
            }
            return report;
        }
    };
    report.record(
        "api_key",
        StepOutcome::Passed(format!("API key found ({})", mask_key(key))),
    );

    report.record("ffmpeg", check_tools());

    let client = match ElevenLabsClient::from_config(config) {
        Ok(client) => client,
        Err(e) => {
            report.record("subscription", StepOutcome::Failed(e.to_string()));
            for name in ["voices", "conversion"] {
                report.record(name, StepOutcome::Skipped);
            }
            return report;
        }
    };

    report.record("subscription", check_subscription(&client).await);
    report.record("voices", check_voices(&client).await);

    let (outcome, output_path) =
        check_conversion(&client, config, sample_url, output_dir).await;
    report.record("conversion", outcome);
    report.output_path = output_path;

    println!();
    if report.passed() {
        println!("{}", style("All checks passed").green().bold());
    } else {
        println!("{}", style("Some checks failed").red().bold());
    }

    report
}

fn check_tools() -> StepOutcome {
    match check_ffmpeg().and_then(|_| check_ffprobe()) {
        Ok(()) => StepOutcome::Passed("FFmpeg and FFprobe available".to_string()),
        Err(e) => StepOutcome::Warning(format!("{e} (only 16-bit WAV input will work)")),
    }
}

async fn check_subscription(client: &ElevenLabsClient) -> StepOutcome {
    match client.fetch_subscription().await {
        Ok(info) => {
            let usage = format!(
                "{} tier, {}/{} characters used",
                info.tier, info.character_count, info.character_limit
            );
            match (info.can_convert(), info.voice_conversion_remaining) {
                (Some(true), Some(remaining)) => StepOutcome::Passed(format!(
                    "Account verified: {usage}, {remaining} voice conversions remaining"
                )),
                (Some(false), _) => StepOutcome::Failed(format!(
                    "Account verified: {usage}, but no voice conversions remain"
                )),
                _ => StepOutcome::Warning(format!(
                    "Account verified: {usage}; voice conversion quota not reported"
                )),
            }
        }
        Err(e) => StepOutcome::Failed(format!("Could not verify account: {e}")),
    }
}

async fn check_voices(client: &ElevenLabsClient) -> StepOutcome {
    match client.fetch_voices().await {
        Ok(voices) => match voices.first() {
            Some(first) => StepOutcome::Passed(format!(
                "Retrieved {} voices (first: {} [{}])",
                voices.len(),
                first.name,
                first.voice_id
            )),
            None => StepOutcome::Warning("Account has no voices".to_string()),
        },
        Err(e) => StepOutcome::Failed(format!("Error fetching voices: {e}")),
    }
}

async fn check_conversion(
    client: &ElevenLabsClient,
    config: &Config,
    sample_url: &str,
    output_dir: &Path,
) -> (StepOutcome, Option<PathBuf>) {
    let sample = match client.download(sample_url).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return (
                StepOutcome::Failed(format!("Error downloading test audio: {e}")),
                None,
            )
        }
    };
    debug!("Downloaded {} byte sample clip", sample.len());

    let request = ConversionRequest {
        index: 0,
        voice_id: config.default_voice_id.clone(),
        audio: UploadPayload {
            bytes: sample,
            file_name: "sample.mp3".to_string(),
            mime_type: "audio/mpeg",
        },
    };

    let audio = match client.convert(&request).await {
        Ok(audio) => audio,
        Err(e) => {
            let mut message = format!("Speech-to-speech conversion failed: {e}");
            if e.category() == ErrorCategory::Capability {
                message.push_str(&format!(". {}", ErrorCategory::Capability.hint()));
            }
            return (StepOutcome::Failed(message), None);
        }
    };

    match save_sample(audio, client.output_format(), &request.voice_id, output_dir).await {
        Ok(path) => (
            StepOutcome::Passed(format!(
                "Voice conversion successful, output saved to {}",
                path.display()
            )),
            Some(path),
        ),
        Err(e) => (
            StepOutcome::Failed(format!("Converted audio could not be saved: {e}")),
            None,
        ),
    }
}

async fn save_sample(
    audio: Vec<u8>,
    format: OutputFormat,
    voice_id: &str,
    output_dir: &Path,
) -> Result<PathBuf> {
    match format {
        OutputFormat::Pcm { .. } => {
            let path = output_dir.join("revoice_diagnostic.wav");
            let converted = ConvertedSegment {
                index: 0,
                audio,
                voice_id: voice_id.to_string(),
                duration_ms: 0,
            };
            merge_segments(vec![converted], 1, format, output_dir, &path).await?;
            Ok(path)
        }
        OutputFormat::Mp3 { .. } => {
            let path = output_dir.join("revoice_diagnostic.mp3");
            tokio::fs::write(&path, audio).await?;
            Ok(path)
        }
    }
}

/// First five characters of the key, then an ellipsis.
fn mask_key(key: &str) -> String {
    let prefix: String = key.chars().take(5).collect();
    format!("{prefix}...")
}

fn print_step(name: &str, outcome: &StepOutcome) {
    match outcome {
        StepOutcome::Passed(msg) => println!("{} {}", style("✓").green(), msg),
        StepOutcome::Warning(msg) => println!("{} {}", style("!").yellow(), msg),
        StepOutcome::Failed(msg) => println!("{} {}", style("✗").red(), msg),
        StepOutcome::Skipped => println!("{} {} skipped", style("-").dim(), name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key("sk_1234567890"), "sk_12...");
        assert_eq!(mask_key("abc"), "abc...");
    }

    #[tokio::test]
    async fn test_missing_key_skips_remaining_steps() {
        let config = Config::default();
        let dir = tempfile::TempDir::new().unwrap();

        let report = run_diagnostic_with(&config, "http://127.0.0.1:1/none", dir.path()).await;

        assert!(!report.passed());
        assert!(matches!(report.step("api_key"), Some(StepOutcome::Failed(_))));
        assert_eq!(report.step("conversion"), Some(&StepOutcome::Skipped));
        assert_eq!(report.steps.len(), 5);
        assert!(report.output_path.is_none());
    }

    #[test]
    fn test_report_passes_with_warnings() {
        let report = DiagnosticReport {
            steps: vec![
                DiagnosticStep {
                    name: "api_key",
                    outcome: StepOutcome::Passed("ok".to_string()),
                },
                DiagnosticStep {
                    name: "ffmpeg",
                    outcome: StepOutcome::Warning("missing".to_string()),
                },
            ],
            output_path: None,
        };
        assert!(report.passed());
    }
}
