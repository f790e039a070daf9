use crate::error::{Result, RevoiceError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// ElevenLabs REST endpoint.
pub const DEFAULT_API_URL: &str = "https://api.elevenlabs.io/v1";

/// Hard per-call ceiling enforced by the speech-to-speech API.
pub const MAX_API_DURATION_MS: u64 = 5 * 60 * 1000;

/// Default segment ceiling, kept below the API ceiling for encoding overhead.
pub const DEFAULT_SEGMENT_MS: u64 = 4 * 60 * 1000;

pub const DEFAULT_MODEL_ID: &str = "eleven_multilingual_sts_v2";

/// "Nicole", present in the built-in catalog.
pub const DEFAULT_VOICE_ID: &str = "JBFqnCBsd6RMkjVDRZzb";

pub const DEFAULT_PRICE_PER_MIN: f64 = 0.20;

/// Audio encoding the service returns, in its `output_format` notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum OutputFormat {
    /// Raw signed 16-bit little-endian mono PCM.
    Pcm { sample_rate: u32 },
    Mp3 { sample_rate: u32, bitrate_kbps: u32 },
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Pcm { sample_rate: 44100 }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Pcm { sample_rate } => write!(f, "pcm_{sample_rate}"),
            OutputFormat::Mp3 {
                sample_rate,
                bitrate_kbps,
            } => write!(f, "mp3_{sample_rate}_{bitrate_kbps}"),
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        let parts: Vec<&str> = lower.split('_').collect();
        let number = |p: &str| {
            p.parse::<u32>()
                .map_err(|_| format!("Unknown output format: {s}. Use e.g. 'pcm_44100' or 'mp3_44100_128'"))
        };

        match parts.as_slice() {
            ["pcm", rate] => Ok(OutputFormat::Pcm {
                sample_rate: number(*rate)?,
            }),
            ["mp3", rate, kbps] => Ok(OutputFormat::Mp3 {
                sample_rate: number(*rate)?,
                bitrate_kbps: number(*kbps)?,
            }),
            _ => Err(format!(
                "Unknown output format: {s}. Use e.g. 'pcm_44100' or 'mp3_44100_128'"
            )),
        }
    }
}

impl TryFrom<String> for OutputFormat {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<OutputFormat> for String {
    fn from(value: OutputFormat) -> Self {
        value.to_string()
    }
}

/// Encoding used when uploading a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadFormat {
    #[default]
    Mp3,
    Wav,
}

impl std::fmt::Display for UploadFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadFormat::Mp3 => write!(f, "mp3"),
            UploadFormat::Wav => write!(f, "wav"),
        }
    }
}

impl std::str::FromStr for UploadFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mp3" => Ok(UploadFormat::Mp3),
            "wav" => Ok(UploadFormat::Wav),
            _ => Err(format!("Unknown upload format: {s}. Use 'mp3' or 'wav'")),
        }
    }
}

impl UploadFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            UploadFormat::Mp3 => "mp3",
            UploadFormat::Wav => "wav",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            UploadFormat::Mp3 => "audio/mpeg",
            UploadFormat::Wav => "audio/wav",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_key: Option<String>,
    pub api_base_url: String,
    pub model_id: String,
    pub output_format: OutputFormat,
    pub upload_format: UploadFormat,
    /// Longest segment sent in one call, in milliseconds.
    pub max_segment_ms: u64,
    pub max_api_duration_ms: u64,
    pub default_voice_id: String,
    pub default_price_per_min: f64,
    /// Segments converted at once. 1 keeps strict one-at-a-time submission.
    pub concurrency: usize,
    /// Extra attempts for transport failures only.
    pub retries: u32,
    pub request_timeout_secs: u64,
    pub max_response_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base_url: DEFAULT_API_URL.to_string(),
            model_id: DEFAULT_MODEL_ID.to_string(),
            output_format: OutputFormat::default(),
            upload_format: UploadFormat::default(),
            max_segment_ms: DEFAULT_SEGMENT_MS,
            max_api_duration_ms: MAX_API_DURATION_MS,
            default_voice_id: DEFAULT_VOICE_ID.to_string(),
            default_price_per_min: DEFAULT_PRICE_PER_MIN,
            concurrency: 1,
            retries: 0,
            request_timeout_secs: 300,
            max_response_bytes: 64 * 1024 * 1024,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = match Self::config_file_path() {
            Some(config_path) => Self::load_from(&config_path)?,
            None => Self::default(),
        };

        config.apply_env();
        Ok(config)
    }

    /// Read a config file, falling back to defaults when it does not exist.
    /// A file that exists but does not parse is an error.
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(config_path)?;
        toml::from_str::<Config>(&contents).map_err(|e| {
            RevoiceError::Config(format!("Failed to parse {}: {e}", config_path.display()))
        })
    }

    /// Override fields from environment variables.
    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("ELEVENLABS_API_KEY") {
            if !key.trim().is_empty() {
                self.api_key = Some(key.trim().to_string());
            }
        }
        if let Ok(url) = std::env::var("REVOICE_API_URL") {
            self.api_base_url = url;
        }
        if let Ok(model) = std::env::var("REVOICE_MODEL_ID") {
            self.model_id = model;
        }
        if let Ok(format) = std::env::var("REVOICE_OUTPUT_FORMAT") {
            if let Ok(f) = format.parse() {
                self.output_format = f;
            }
        }
        if let Ok(segment) = std::env::var("REVOICE_SEGMENT_MS") {
            if let Ok(ms) = segment.parse() {
                self.max_segment_ms = ms;
            }
        }
        if let Ok(concurrency) = std::env::var("REVOICE_CONCURRENCY") {
            if let Ok(c) = concurrency.parse() {
                self.concurrency = c;
            }
        }
        if let Ok(retries) = std::env::var("REVOICE_RETRIES") {
            if let Ok(r) = retries.parse() {
                self.retries = r;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.api_key()?;
        self.validate_segmentation()?;

        if self.concurrency == 0 {
            return Err(RevoiceError::Config(
                "Concurrency must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Check the segment ceiling against the API ceiling.
    pub fn validate_segmentation(&self) -> Result<()> {
        if self.max_segment_ms == 0 {
            return Err(RevoiceError::Config(
                "Segment duration must be greater than 0".to_string(),
            ));
        }
        if self.max_segment_ms >= self.max_api_duration_ms {
            return Err(RevoiceError::Config(format!(
                "Segment duration {}ms must stay below the API limit of {}ms",
                self.max_segment_ms, self.max_api_duration_ms
            )));
        }
        Ok(())
    }

    pub fn api_key(&self) -> Result<&str> {
        match self.api_key.as_deref() {
            Some(key) if !key.is_empty() => Ok(key),
            _ => Err(RevoiceError::Config(
                "ELEVENLABS_API_KEY not set. Export it with: export ELEVENLABS_API_KEY=...".to_string(),
            )),
        }
    }

    pub fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("revoice").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_parsing() {
        assert_eq!(
            "pcm_44100".parse::<OutputFormat>().unwrap(),
            OutputFormat::Pcm { sample_rate: 44100 }
        );
        assert_eq!(
            "MP3_44100_128".parse::<OutputFormat>().unwrap(),
            OutputFormat::Mp3 {
                sample_rate: 44100,
                bitrate_kbps: 128
            }
        );
        assert!("ogg_48000".parse::<OutputFormat>().is_err());
        assert!("pcm_fast".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_output_format_display() {
        assert_eq!(OutputFormat::default().to_string(), "pcm_44100");
        let mp3 = OutputFormat::Mp3 {
            sample_rate: 22050,
            bitrate_kbps: 32,
        };
        assert_eq!(mp3.to_string(), "mp3_22050_32");
    }

    #[test]
    fn test_upload_format() {
        assert_eq!("WAV".parse::<UploadFormat>().unwrap(), UploadFormat::Wav);
        assert_eq!(UploadFormat::Mp3.mime_type(), "audio/mpeg");
        assert!("flac".parse::<UploadFormat>().is_err());
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.max_segment_ms, 240_000);
        assert_eq!(config.max_api_duration_ms, 300_000);
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.retries, 0);
        assert_eq!(config.model_id, "eleven_multilingual_sts_v2");
    }

    #[test]
    fn test_validate_missing_api_key() {
        let config = Config::default();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, RevoiceError::Config(_)));
    }

    #[test]
    fn test_validate_with_api_key() {
        let config = Config {
            api_key: Some("xi-test".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_segment_must_stay_below_api_limit() {
        let mut config = Config {
            api_key: Some("xi-test".to_string()),
            ..Default::default()
        };
        config.max_segment_ms = MAX_API_DURATION_MS;
        assert!(config.validate().is_err());

        config.max_segment_ms = 0;
        assert!(config.validate().is_err());

        config.max_segment_ms = 60_000;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_missing_file_uses_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config.max_segment_ms, 240_000);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_load_from_malformed_file_is_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "api_key = \"unterminated\nmax_segment_ms = [").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, RevoiceError::Config(_)));
        assert!(err.to_string().contains("Failed to parse"));
        assert!(std::fs::read_to_string(&path).unwrap().contains("unterminated"));
    }

    #[test]
    fn test_config_from_toml() {
        let config: Config = toml::from_str(
            r#"
            api_key = "xi-file"
            output_format = "mp3_44100_128"
            upload_format = "wav"
            max_segment_ms = 60000
            "#,
        )
        .unwrap();

        assert_eq!(config.api_key.as_deref(), Some("xi-file"));
        assert_eq!(
            config.output_format,
            OutputFormat::Mp3 {
                sample_rate: 44100,
                bitrate_kbps: 128
            }
        );
        assert_eq!(config.upload_format, UploadFormat::Wav);
        assert_eq!(config.max_segment_ms, 60_000);
        assert_eq!(config.api_base_url, DEFAULT_API_URL);
    }
}
