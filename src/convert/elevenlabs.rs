use crate::config::{Config, OutputFormat, DEFAULT_API_URL, DEFAULT_MODEL_ID};
use crate::convert::{ConversionRequest, VoiceConverter};
use crate::error::{Result, RevoiceError};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Base delay for exponential backoff (milliseconds).
const BASE_DELAY_MS: u64 = 1000;

/// Error text fragments that mean the account cannot use speech-to-speech.
const SUBSCRIPTION_MARKERS: &[&str] = &["subscription", "upgrade", "quota_exceeded"];

/// ElevenLabs API client.
pub struct ElevenLabsClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model_id: String,
    output_format: OutputFormat,
    max_response_bytes: usize,
    retries: u32,
}

impl ElevenLabsClient {
    /// Create a new client with the given API key and default settings.
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: DEFAULT_API_URL.to_string(),
            model_id: DEFAULT_MODEL_ID.to_string(),
            output_format: OutputFormat::default(),
            max_response_bytes: 64 * 1024 * 1024,
            retries: 0,
        }
    }

    /// Build a client from configuration. Fails if no API key is set.
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key: config.api_key()?.to_string(),
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            model_id: config.model_id.clone(),
            output_format: config.output_format,
            max_response_bytes: config.max_response_bytes,
            retries: config.retries,
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    /// Cap on the size of one converted segment.
    pub fn with_max_response_bytes(mut self, max: usize) -> Self {
        self.max_response_bytes = max;
        self
    }

    /// Extra attempts for transport failures.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn output_format(&self) -> OutputFormat {
        self.output_format
    }

    fn build_form(&self, request: &ConversionRequest) -> Result<Form> {
        let part = Part::bytes(request.audio.bytes.clone())
            .file_name(request.audio.file_name.clone())
            .mime_str(request.audio.mime_type)?;

        Ok(Form::new()
            .part("audio", part)
            .text("model_id", self.model_id.clone()))
    }

    /// Make one speech-to-speech call and drain the streamed body.
    async fn convert_once(&self, request: &ConversionRequest) -> Result<Vec<u8>> {
        let url = format!(
            "{}/speech-to-speech/{}/stream",
            self.base_url, request.voice_id
        );
        let form = self.build_form(request)?;

        let response = self
            .client
            .post(&url)
            .query(&[("output_format", self.output_format.to_string())])
            .header("xi-api-key", &self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        debug!("Speech-to-speech response status: {}", status);

        if !status.is_success() {
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    warn!("Failed to read error body for segment {}: {e}", request.index);
                    String::new()
                }
            };
            return Err(classify_failure(Some(status.as_u16()), &body));
        }

        let mut audio = Vec::new();
        let mut chunk_count = 0usize;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(transport_error)?;
            if audio.len() + chunk.len() > self.max_response_bytes {
                return Err(RevoiceError::Api(format!(
                    "Converted segment {} exceeds {} bytes",
                    request.index, self.max_response_bytes
                )));
            }
            audio.extend_from_slice(&chunk);
            chunk_count += 1;
        }

        debug!(
            "Segment {}: received {} bytes in {} chunks",
            request.index,
            audio.len(),
            chunk_count
        );

        if audio.is_empty() {
            return Err(RevoiceError::Api(format!(
                "Service returned no audio for segment {}",
                request.index
            )));
        }

        Ok(audio)
    }

    /// Convert with bounded retry for transport failures only.
    async fn convert_with_retry(&self, request: &ConversionRequest) -> Result<Vec<u8>> {
        let mut attempt = 0;

        loop {
            match self.convert_once(request).await {
                Ok(audio) => return Ok(audio),
                Err(e) if e.is_retryable() && attempt < self.retries => {
                    let delay = backoff_delay_ms(attempt);
                    warn!(
                        "Segment {} attempt {} failed: {}. Retrying in {}ms",
                        request.index,
                        attempt + 1,
                        e,
                        delay
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Look up the account's subscription and remaining quota.
    pub async fn fetch_subscription(&self) -> Result<SubscriptionInfo> {
        let url = format!("{}/user/subscription", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("xi-api-key", &self.api_key)
            .send()
            .await
            .map_err(transport_error)?;

        let body = read_success_body(response).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// List the voices available to the account.
    pub async fn fetch_voices(&self) -> Result<Vec<RemoteVoice>> {
        let url = format!("{}/voices", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("xi-api-key", &self.api_key)
            .send()
            .await
            .map_err(transport_error)?;

        let body = read_success_body(response).await?;
        let parsed: VoicesResponse = serde_json::from_str(&body)?;
        Ok(parsed.voices)
    }

    /// Download a file over plain HTTP.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await.map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(RevoiceError::Transport {
                status: Some(status.as_u16()),
                message: format!("Failed to download {url}"),
            });
        }
        let bytes = response.bytes().await.map_err(transport_error)?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl VoiceConverter for ElevenLabsClient {
    async fn convert(&self, request: &ConversionRequest) -> Result<Vec<u8>> {
        debug!(
            "Converting segment {} ({} bytes) to voice {}",
            request.index,
            request.audio.bytes.len(),
            request.voice_id
        );
        self.convert_with_retry(request).await
    }

    fn name(&self) -> &'static str {
        "ElevenLabs"
    }
}

/// Exponential backoff, saturating instead of overflowing for large attempt counts.
fn backoff_delay_ms(attempt: u32) -> u64 {
    BASE_DELAY_MS.saturating_mul(2u64.saturating_pow(attempt))
}

async fn read_success_body(response: reqwest::Response) -> Result<String> {
    let status = response.status();
    let body = response.text().await.map_err(transport_error)?;
    if status.is_success() {
        Ok(body)
    } else {
        Err(classify_failure(Some(status.as_u16()), &body))
    }
}

fn transport_error(e: reqwest::Error) -> RevoiceError {
    RevoiceError::Transport {
        status: e.status().map(|s| s.as_u16()),
        message: e.to_string(),
    }
}

/// Map a failed response to an error kind.
///
/// The service has no dedicated code for plan restrictions, so those are
/// recognized from the error text.
pub fn classify_failure(status: Option<u16>, body: &str) -> RevoiceError {
    let message = extract_detail(body).unwrap_or_else(|| body.trim().to_string());
    let lower = body.to_lowercase();

    if SUBSCRIPTION_MARKERS.iter().any(|m| lower.contains(m)) {
        return RevoiceError::Subscription(message);
    }

    // Overload and server faults are transient even with a structured body.
    let transient_status = matches!(status, Some(code) if code == 429 || code >= 500);
    if transient_status || lower.contains("server disconnected") {
        return RevoiceError::Transport {
            status,
            message: if message.is_empty() {
                "Empty response body".to_string()
            } else {
                message
            },
        };
    }

    match extract_detail(body) {
        Some(detail) => RevoiceError::Api(detail),
        None => RevoiceError::Transport {
            status,
            message: if message.is_empty() {
                "Empty response body".to_string()
            } else {
                message
            },
        },
    }
}

/// Pull a human-readable message out of a `{"detail": ...}` error body.
fn extract_detail(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => obj
            .get("message")
            .and_then(|m| m.as_str())
            .map(|m| m.to_string())
            .or_else(|| Some(Value::Object(obj.clone()).to_string())),
        Value::Array(items) => {
            let messages: Vec<String> = items
                .iter()
                .map(|item| {
                    item.get("msg")
                        .and_then(|m| m.as_str())
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| item.to_string())
                })
                .collect();
            Some(messages.join("; "))
        }
        other => Some(other.to_string()),
    }
}

// API response types

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionInfo {
    #[serde(default)]
    pub tier: String,
    #[serde(default)]
    pub character_count: u64,
    #[serde(default)]
    pub character_limit: u64,
    #[serde(default)]
    pub voice_conversion_remaining: Option<u64>,
}

impl SubscriptionInfo {
    /// Whether the account can still convert voices. `None` when unreported.
    pub fn can_convert(&self) -> Option<bool> {
        self.voice_conversion_remaining.map(|remaining| remaining > 0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteVoice {
    pub voice_id: String,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub preview_url: Option<String>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct VoicesResponse {
    voices: Vec<RemoteVoice>,
}
