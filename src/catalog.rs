//! Voice catalog: remote voices normalized to one record shape, with a
//! built-in fallback so the pipeline stays usable when the catalog is down.

use crate::config::DEFAULT_PRICE_PER_MIN;
use crate::convert::{ElevenLabsClient, RemoteVoice};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Price applied to voices from the built-in catalog.
const FALLBACK_PRICE_PER_MIN: f64 = 0.30;

const FALLBACK_VOICES: &[(&str, &str)] = &[
    ("21m00Tcm4TlvDq8ikWAM", "Rachel"),
    ("AZnzlk1XvdvUeBnXmlld", "Domi"),
    ("EXAVITQu4vr4xnSDxMaL", "Bella"),
    ("MF3mGyEYCl7XYWbV9V6O", "Antoni"),
    ("TxGEqnHWrfWFTfGW9XjX", "Josh"),
    ("JBFqnCBsd6RMkjVDRZzb", "Nicole"),
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoiceLabels {
    pub accent: String,
    pub description: String,
    pub age: String,
    pub gender: String,
    pub use_case: String,
}

impl VoiceLabels {
    /// Non-empty labels joined for display.
    pub fn summary(&self) -> String {
        [
            &self.accent,
            &self.description,
            &self.age,
            &self.gender,
            &self.use_case,
        ]
        .iter()
        .filter(|s| !s.is_empty())
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(" - ")
    }
}

/// A target voice with its pricing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceProfile {
    pub id: String,
    pub name: String,
    pub category: String,
    pub preview_url: Option<String>,
    pub labels: VoiceLabels,
    pub price_per_min: f64,
}

impl VoiceProfile {
    /// Profile for a raw voice id not present in any catalog.
    pub fn from_id(id: &str, price_per_min: f64) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            category: "unknown".to_string(),
            preview_url: None,
            labels: VoiceLabels::default(),
            price_per_min,
        }
    }

    pub fn display_name(&self) -> String {
        let summary = self.labels.summary();
        if summary.is_empty() {
            self.name.clone()
        } else {
            format!("{} ({})", self.name, summary)
        }
    }
}

impl From<RemoteVoice> for VoiceProfile {
    fn from(voice: RemoteVoice) -> Self {
        let label = |key: &str| voice.labels.get(key).cloned().unwrap_or_default();
        let labels = VoiceLabels {
            accent: label("accent"),
            description: label("description"),
            age: label("age"),
            gender: label("gender"),
            use_case: label("use_case"),
        };
        let category = voice.category.unwrap_or_else(|| "premium".to_string());

        Self {
            price_per_min: price_for_category(&category),
            id: voice.voice_id,
            name: voice.name,
            category,
            preview_url: voice.preview_url.filter(|u| !u.is_empty()),
            labels,
        }
    }
}

/// Price per minute for a voice category.
pub fn price_for_category(category: &str) -> f64 {
    match category.to_lowercase().as_str() {
        "premium" | "standard" | "professional" => 0.20,
        _ => DEFAULT_PRICE_PER_MIN,
    }
}

/// Where a catalog came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogSource {
    Remote,
    Fallback,
}

#[derive(Debug, Clone)]
pub struct VoiceCatalog {
    voices: Vec<VoiceProfile>,
    source: CatalogSource,
}

impl VoiceCatalog {
    /// Fetch the account's voices, falling back to the built-in list on failure.
    pub async fn fetch(client: &ElevenLabsClient) -> Self {
        match Self::try_fetch(client).await {
            Ok(catalog) => catalog,
            Err(e) => {
                warn!("Error fetching voices: {e}. Using built-in voice list");
                Self::fallback()
            }
        }
    }

    async fn try_fetch(client: &ElevenLabsClient) -> Result<Self> {
        let voices: Vec<VoiceProfile> = client
            .fetch_voices()
            .await?
            .into_iter()
            .map(VoiceProfile::from)
            .collect();

        if voices.is_empty() {
            warn!("Voice catalog is empty. Using built-in voice list");
            return Ok(Self::fallback());
        }

        info!("Loaded {} voices", voices.len());
        Ok(Self::new(voices, CatalogSource::Remote))
    }

    /// Built-in catalog of well-known voices.
    pub fn fallback() -> Self {
        let voices = FALLBACK_VOICES
            .iter()
            .map(|(id, name)| VoiceProfile {
                id: id.to_string(),
                name: name.to_string(),
                category: "premade".to_string(),
                preview_url: None,
                labels: VoiceLabels::default(),
                price_per_min: FALLBACK_PRICE_PER_MIN,
            })
            .collect();
        Self::new(voices, CatalogSource::Fallback)
    }

    fn new(mut voices: Vec<VoiceProfile>, source: CatalogSource) -> Self {
        voices.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Self { voices, source }
    }

    pub fn voices(&self) -> &[VoiceProfile] {
        &self.voices
    }

    pub fn source(&self) -> CatalogSource {
        self.source
    }

    /// Find a voice by display name or id, ignoring case.
    pub fn find(&self, name_or_id: &str) -> Option<&VoiceProfile> {
        let needle = name_or_id.trim();
        self.voices
            .iter()
            .find(|v| v.id == needle)
            .or_else(|| self.voices.iter().find(|v| v.name.eq_ignore_ascii_case(needle)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_fallback_catalog() {
        let catalog = VoiceCatalog::fallback();
        assert_eq!(catalog.source(), CatalogSource::Fallback);
        assert_eq!(catalog.voices().len(), 6);
        assert_eq!(catalog.voices()[0].name, "Antoni");

        let nicole = catalog.find("nicole").unwrap();
        assert_eq!(nicole.id, "JBFqnCBsd6RMkjVDRZzb");
        assert_eq!(nicole.price_per_min, 0.30);
    }

    #[test]
    fn test_find_by_id() {
        let catalog = VoiceCatalog::fallback();
        assert_eq!(catalog.find("21m00Tcm4TlvDq8ikWAM").unwrap().name, "Rachel");
        assert!(catalog.find("nobody").is_none());
    }

    #[test]
    fn test_remote_voice_normalization() {
        let mut labels = HashMap::new();
        labels.insert("accent".to_string(), "british".to_string());
        labels.insert("gender".to_string(), "female".to_string());

        let profile = VoiceProfile::from(RemoteVoice {
            voice_id: "abc".to_string(),
            name: "Alice".to_string(),
            category: Some("professional".to_string()),
            preview_url: Some(String::new()),
            labels,
        });

        assert_eq!(profile.id, "abc");
        assert_eq!(profile.labels.accent, "british");
        assert_eq!(profile.labels.age, "");
        assert_eq!(profile.preview_url, None);
        assert_eq!(profile.price_per_min, 0.20);
        assert_eq!(profile.display_name(), "Alice (british - female)");
    }

    #[test]
    fn test_price_for_category() {
        assert_eq!(price_for_category("PREMIUM"), 0.20);
        assert_eq!(price_for_category("cloned"), 0.20);
    }

    #[test]
    fn test_from_id() {
        let profile = VoiceProfile::from_id("xyz", 0.25);
        assert_eq!(profile.display_name(), "xyz");
        assert_eq!(profile.price_per_min, 0.25);
    }
}
