use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use revoice::catalog::{CatalogSource, VoiceCatalog, VoiceProfile};
use revoice::diagnostic::run_diagnostic;
use revoice::interactive::run_interactive_wizard;
use revoice::media::classify;
use revoice::{
    change_voice, check_output_path, derive_output_path, print_summary, Config, ElevenLabsClient,
    RevoiceError,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "revoice")]
#[command(version, about = "Change the voice in audio and video files")]
#[command(long_about = "Convert the speech in an audio or video file to another voice using the ElevenLabs speech-to-speech API. Long recordings are split into segments, converted in order and stitched back together.")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Convert a media file to another voice
    Convert {
        /// Input audio or video file
        input: PathBuf,

        /// Output file (defaults to <input>_changed_<voice>.<ext>)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Target voice name or id
        #[arg(short, long)]
        voice: Option<String>,

        /// Maximum segment length in minutes
        #[arg(long)]
        segment_minutes: Option<f64>,
    },
    /// List the voices available to your account
    Voices,
    /// Check API key, account, voices and a sample conversion
    Diagnose,
    /// Guided setup and conversion
    Interactive,
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

/// Flag set by Ctrl+C. A second Ctrl+C exits immediately.
fn install_cancel_handler() -> Arc<AtomicBool> {
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = cancelled.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        if flag.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
        eprintln!("\nCancelling... press Ctrl+C again to force quit");
    }) {
        warn!("Failed to install Ctrl+C handler: {e}");
    }

    cancelled
}

async fn resolve_voice(config: &Config, name_or_id: Option<&str>) -> Result<VoiceProfile> {
    let wanted = name_or_id.unwrap_or(&config.default_voice_id);
    let client = ElevenLabsClient::from_config(config)?;
    let catalog = VoiceCatalog::fetch(&client).await;

    Ok(catalog
        .find(wanted)
        .cloned()
        .unwrap_or_else(|| VoiceProfile::from_id(wanted, config.default_price_per_min)))
}

async fn convert(
    config: &Config,
    input: &Path,
    output: Option<PathBuf>,
    voice: &VoiceProfile,
) -> Result<()> {
    if !input.exists() {
        anyhow::bail!("Input file not found: {}", input.display());
    }

    let output =
        output.unwrap_or_else(|| derive_output_path(input, classify(input), &voice.id));

    info!("Input:  {}", input.display());
    info!("Output: {}", output.display());
    info!("Voice:  {} [{}]", voice.name, voice.id);

    let cancelled = install_cancel_handler();
    let result = change_voice(input, &output, config, voice, cancelled)
        .await
        .map_err(report_failure)?;

    print_summary(&result);
    Ok(())
}

/// Print the category hint for a failed run and hand the error to anyhow.
fn report_failure(e: RevoiceError) -> anyhow::Error {
    if !matches!(e, RevoiceError::Cancelled) {
        eprintln!("{} {}", style("✗").red(), e.category().hint());
    }
    anyhow::Error::new(e).context("Voice change failed")
}

async fn list_voices(config: &Config) -> Result<()> {
    let client = ElevenLabsClient::from_config(config)?;
    let catalog = VoiceCatalog::fetch(&client).await;

    if catalog.source() == CatalogSource::Fallback {
        println!(
            "{} Could not load your voices, showing the built-in list",
            style("!").yellow()
        );
    }

    for voice in catalog.voices() {
        println!(
            "  {:<24} {:<22} ${:.2}/min  {}",
            voice.id,
            voice.name,
            voice.price_per_min,
            voice.labels.summary()
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    match cli.command {
        Command::Convert {
            input,
            output,
            voice,
            segment_minutes,
        } => {
            let mut config = Config::load().context("Failed to load configuration")?;
            if let Some(minutes) = segment_minutes {
                config.max_segment_ms = (minutes * 60_000.0).round() as u64;
            }
            config
                .validate()
                .context("Configuration validation failed")?;

            if let Some(ref output) = output {
                check_output_path(classify(&input), output)?;
            }

            let voice = resolve_voice(&config, voice.as_deref()).await?;
            convert(&config, &input, output, &voice).await
        }
        Command::Voices => {
            let config = Config::load().context("Failed to load configuration")?;
            list_voices(&config).await
        }
        Command::Diagnose => {
            let config = Config::load().context("Failed to load configuration")?;
            let report = run_diagnostic(&config).await;
            if !report.passed() {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Interactive => {
            let wizard = run_interactive_wizard().await?;
            wizard
                .config
                .validate()
                .context("Configuration validation failed")?;
            convert(&wizard.config, &wizard.input, Some(wizard.output), &wizard.voice).await
        }
    }
}
