use crate::catalog::{CatalogSource, VoiceCatalog, VoiceProfile};
use crate::config::Config;
use crate::convert::ElevenLabsClient;
use crate::cost::{billable_minutes, estimate_cost};
use crate::media::{classify, get_audio_duration, read_wav_metadata, MediaKind, VIDEO_EXTENSIONS};
use crate::pipeline::derive_output_path;
use anyhow::Context;
use console::style;
use dialoguer::{Confirm, Input, Select};
use std::fs;
use std::path::{Path, PathBuf};

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "m4a", "ogg", "aac"];

pub struct InteractiveResult {
    pub input: PathBuf,
    pub output: PathBuf,
    pub config: Config,
    pub voice: VoiceProfile,
}

pub async fn run_interactive_wizard() -> anyhow::Result<InteractiveResult> {
    print_header();

    // Step 1: Check/Setup API Key
    let config = setup_api_key()?;

    // Step 2: Select source file
    let input = select_source_file()?;
    let kind = classify(&input);

    // Step 3: Select voice
    let client = ElevenLabsClient::from_config(&config)?;
    let catalog = VoiceCatalog::fetch(&client).await;
    let voice = select_voice(&catalog)?;

    let output = derive_output_path(&input, kind, &voice.id);

    // Step 4: Confirm
    let duration_ms = probe_duration_ms(&input);
    print_summary(&input, &output, kind, &voice, duration_ms, config.max_segment_ms);

    if !Confirm::new()
        .with_prompt("Proceed with the voice change?")
        .default(true)
        .interact()?
    {
        anyhow::bail!("Cancelled by user");
    }

    println!();

    Ok(InteractiveResult {
        input,
        output,
        config,
        voice,
    })
}

fn print_header() {
    println!();
    println!(
        "{}",
        style("╔═══════════════════════════════════════════════════╗").cyan()
    );
    println!(
        "{}",
        style("║          revoice - AI Voice Changer               ║").cyan()
    );
    println!(
        "{}",
        style("╚═══════════════════════════════════════════════════╝").cyan()
    );
    println!();
}

fn setup_api_key() -> anyhow::Result<Config> {
    // A config file that fails to parse must not be replaced by the save below.
    let mut config = Config::load().context("Failed to load configuration")?;

    if config.api_key().is_ok() {
        println!("{} API key configured", style("✓").green());
        return Ok(config);
    }

    println!("{} ElevenLabs API key not found", style("!").yellow());
    println!("  Get one at: https://elevenlabs.io/app/settings/api-keys\n");

    let api_key: String = Input::new()
        .with_prompt("Enter your ElevenLabs API key")
        .interact_text()?;

    if api_key.trim().is_empty() {
        anyhow::bail!("API key is required");
    }

    config.api_key = Some(api_key.trim().to_string());

    if Confirm::new()
        .with_prompt("Save API key to config file?")
        .default(true)
        .interact()?
    {
        save_config(&config)?;
        println!("{} API key saved to config\n", style("✓").green());
    }

    Ok(config)
}

fn save_config(config: &Config) -> anyhow::Result<()> {
    if let Some(config_path) = Config::config_file_path() {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let toml_content = toml::to_string_pretty(config)?;
        fs::write(config_path, toml_content)?;
    }
    Ok(())
}

fn select_source_file() -> anyhow::Result<PathBuf> {
    println!("\n{}", style("Select source file:").bold());

    let files = scan_media_files(Path::new("."))?;

    if files.is_empty() {
        println!("  No media files found in current directory.\n");
        return prompt_path();
    }

    let mut items: Vec<String> = files
        .iter()
        .map(|f| {
            let size = fs::metadata(f)
                .map(|m| format_size(m.len()))
                .unwrap_or_else(|_| "?".to_string());
            format!("{} ({})", f.display(), size)
        })
        .collect();
    items.push("Enter custom path...".to_string());

    let selection = Select::new()
        .with_prompt("Choose a file")
        .items(&items)
        .default(0)
        .interact()?;

    if selection == files.len() {
        prompt_path()
    } else {
        Ok(files[selection].clone())
    }
}

fn prompt_path() -> anyhow::Result<PathBuf> {
    let path: String = Input::new()
        .with_prompt("Enter file path")
        .interact_text()?;
    let path = PathBuf::from(path.trim());
    if !path.exists() {
        anyhow::bail!("File not found: {}", path.display());
    }
    Ok(path)
}

fn is_media_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            let ext = ext.to_lowercase();
            VIDEO_EXTENSIONS.contains(&ext.as_str()) || AUDIO_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

fn scan_media_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_media_file(&path) {
            files.push(path);
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

fn select_voice(catalog: &VoiceCatalog) -> anyhow::Result<VoiceProfile> {
    println!("\n{}", style("Select target voice:").bold());
    if catalog.source() == CatalogSource::Fallback {
        println!(
            "  {} Could not load your voices, showing the built-in list",
            style("!").yellow()
        );
    }

    let voices = catalog.voices();
    if voices.is_empty() {
        anyhow::bail!("No voices available");
    }

    let items: Vec<String> = voices
        .iter()
        .map(|v| format!("{} - ${:.2}/min", v.display_name(), v.price_per_min))
        .collect();

    let selection = Select::new()
        .with_prompt("Choose a voice")
        .items(&items)
        .default(0)
        .interact()?;

    Ok(voices[selection].clone())
}

/// Duration of the input, if it can be read without decoding.
fn probe_duration_ms(input: &Path) -> Option<u64> {
    if let Ok(metadata) = read_wav_metadata(input) {
        return Some(metadata.duration_ms);
    }
    get_audio_duration(input)
        .ok()
        .map(|d| d.as_millis() as u64)
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

fn format_duration(ms: u64) -> String {
    let secs = ms / 1000;
    format!("{}:{:02}", secs / 60, secs % 60)
}

fn print_summary(
    input: &Path,
    output: &Path,
    kind: MediaKind,
    voice: &VoiceProfile,
    duration_ms: Option<u64>,
    max_segment_ms: u64,
) {
    println!("\n{}", style("═══ Summary ═══").bold());
    println!("  Input:     {} ({})", style(input.display()).cyan(), kind);
    println!("  Output:    {}", style(output.display()).cyan());
    println!("  Voice:     {} [{}]", voice.name, voice.id);
    match duration_ms {
        Some(ms) => {
            println!(
                "  Duration:  {} ({} segments)",
                format_duration(ms),
                ms.div_ceil(max_segment_ms.max(1))
            );
            println!(
                "  Est. cost: ${:.2} ({} min at ${:.2}/min)",
                estimate_cost(ms, voice.price_per_min),
                billable_minutes(ms),
                voice.price_per_min
            );
        }
        None => println!("  Duration:  unknown"),
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(500), "500 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1024 * 1024), "1.0 MB");
        assert_eq!(format_size(1024 * 1024 * 1024), "1.0 GB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0:00");
        assert_eq!(format_duration(7 * 60_000 + 5_500), "7:05");
    }

    #[test]
    fn test_is_media_file() {
        assert!(is_media_file(Path::new("talk.MP3")));
        assert!(is_media_file(Path::new("clip.mkv")));
        assert!(!is_media_file(Path::new("notes.txt")));
        assert!(!is_media_file(Path::new("README")));
    }

    #[test]
    fn test_scan_media_files_sorted() {
        let dir = tempfile::TempDir::new().unwrap();
        for name in ["b.wav", "a.mp4", "c.txt"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }

        let files = scan_media_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|f| f.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.mp4", "b.wav"]);
    }
}
