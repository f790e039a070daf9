pub mod catalog;
pub mod config;
pub mod convert;
pub mod cost;
pub mod diagnostic;
pub mod error;
pub mod interactive;
pub mod media;
pub mod pipeline;

pub use catalog::{VoiceCatalog, VoiceProfile};
pub use config::Config;
pub use convert::{ElevenLabsClient, VoiceConverter};
pub use error::{ErrorCategory, Result, RevoiceError};
pub use pipeline::{
    change_voice, check_output_path, derive_output_path, print_summary, PipelineConfig,
    PipelineResult, PipelineStage, PipelineStats, VoiceChangePipeline,
};
