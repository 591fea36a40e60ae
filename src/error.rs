use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DubError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Provider call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Synthesis failed for segment {index}: {message}")]
    Synthesis { index: usize, message: String },

    #[error("Audio decoding failed: {0}")]
    AudioDecode(String),

    #[error("Media processing failed: {0}")]
    Media(String),

    #[error("Required tool unavailable: {0}")]
    ToolUnavailable(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{stage}: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: Box<DubError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
}

impl DubError {
    /// Whether retrying the same call may succeed.
    ///
    /// Transport failures, timeouts, rate limiting and server errors are
    /// transient. A body that fails to decode will fail the same way again,
    /// so it fails fast like everything else.
    pub fn is_transient(&self) -> bool {
        match self {
            DubError::Api { status, .. } => *status == 429 || *status >= 500,
            DubError::Http(e) => !e.is_decode(),
            DubError::Timeout(_) => true,
            DubError::Stage { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    /// Whether this error (or the error it wraps) is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            DubError::Cancelled => true,
            DubError::Stage { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Wrap this error with the name of the stage it surfaced from.
    pub fn in_stage(self, stage: &'static str) -> Self {
        DubError::Stage {
            stage,
            source: Box::new(self),
        }
    }
}

/// Attach stage context to any result that converts into [`DubError`].
pub trait StageContext<T> {
    fn stage(self, stage: &'static str) -> Result<T>;
}

impl<T, E: Into<DubError>> StageContext<T> for std::result::Result<T, E> {
    fn stage(self, stage: &'static str) -> Result<T> {
        self.map_err(|e| e.into().in_stage(stage))
    }
}

pub type Result<T> = std::result::Result<T, DubError>;
