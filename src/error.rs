use thiserror::Error;

#[derive(Error, Debug)]
pub enum RevoiceError {
    #[error("Could not decode media: {0}")]
    Decode(String),

    #[error("{}", format_transport(.status, .message))]
    Transport {
        status: Option<u16>,
        message: String,
    },

    #[error("Subscription does not allow voice conversion: {0}")]
    Subscription(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Segment bookkeeping violated: {0}")]
    Integrity(String),

    #[error("Video reassembly failed: {0}")]
    Mux(String),

    #[error("Segment {index} failed: {source}")]
    Segment {
        index: usize,
        #[source]
        source: Box<RevoiceError>,
    },

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Pipeline cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn format_transport(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("Transport error (HTTP {code}): {message}"),
        None => format!("Transport error: {message}"),
    }
}

/// Coarse grouping used to tell the user what kind of problem they hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Missing key or invalid settings.
    Configuration,
    /// Account tier or quota.
    Capability,
    /// Network or server trouble; retrying may help.
    Transient,
    /// Anything else.
    Failure,
}

impl RevoiceError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            RevoiceError::Config(_) => ErrorCategory::Configuration,
            RevoiceError::Subscription(_) => ErrorCategory::Capability,
            RevoiceError::Transport { .. } | RevoiceError::Http(_) => ErrorCategory::Transient,
            RevoiceError::Segment { source, .. } => source.category(),
            _ => ErrorCategory::Failure,
        }
    }

    /// The innermost error, looking through segment wrappers.
    pub fn root(&self) -> &RevoiceError {
        match self {
            RevoiceError::Segment { source, .. } => source.root(),
            other => other,
        }
    }

    /// Index of the segment that failed, if the error came from one.
    pub fn segment_index(&self) -> Option<usize> {
        match self {
            RevoiceError::Segment { index, .. } => Some(*index),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.root(), RevoiceError::Transport { .. })
    }
}

impl ErrorCategory {
    pub fn hint(&self) -> &'static str {
        match self {
            ErrorCategory::Configuration => {
                "Configuration problem: check ELEVENLABS_API_KEY and your config file."
            }
            ErrorCategory::Capability => {
                "Capability problem: your ElevenLabs plan does not include voice changing or has no quota left. Upgrade your plan."
            }
            ErrorCategory::Transient => {
                "Transient problem: the network or the server failed. Try again later."
            }
            ErrorCategory::Failure => "Processing failed.",
        }
    }
}

pub type Result<T> = std::result::Result<T, RevoiceError>;
