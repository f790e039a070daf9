pub mod elevenlabs;

pub use elevenlabs::{classify_failure, ElevenLabsClient, RemoteVoice, SubscriptionInfo};

use crate::error::Result;
use crate::media::UploadPayload;
use async_trait::async_trait;

/// One segment ready to send, already in the upload wire format.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub index: usize,
    pub voice_id: String,
    pub audio: UploadPayload,
}

/// Converted audio for one segment.
#[derive(Debug, Clone)]
pub struct ConvertedSegment {
    pub index: usize,
    pub audio: Vec<u8>,
    pub voice_id: String,
    /// Duration of the source segment.
    pub duration_ms: u64,
}

#[async_trait]
pub trait VoiceConverter: Send + Sync {
    /// Convert one segment and return the complete encoded output.
    async fn convert(&self, request: &ConversionRequest) -> Result<Vec<u8>>;
    fn name(&self) -> &'static str;
}
