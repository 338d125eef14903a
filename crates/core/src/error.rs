//! Error types for the agent service

use thiserror::Error;

/// Result type alias using [`AgentError`].
pub type Result<T> = std::result::Result<T, AgentError>;

/// Top-level error type shared across the dialog pipeline.
///
/// Infrastructure crates keep their own error enums and convert into this at
/// the dialog boundary, so the state machine can apply one uniform policy
/// (announce, count the failure, or terminate).
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("state store error: {0}")]
    StateStore(String),

    #[error("template store error: {0}")]
    Template(String),

    #[error("media engine error: {0}")]
    Media(String),

    #[error("transcription error: {0}")]
    Transcription(String),

    #[error("synthesis error: {0}")]
    Synthesis(String),

    #[error("llm error: {0}")]
    Llm(String),

    #[error("knowledge base error: {0}")]
    Knowledge(String),

    #[error("user directory error: {0}")]
    UserDirectory(String),

    #[error("publish error: {0}")]
    Publish(String),

    #[error("invalid call event: {0}")]
    InvalidEvent(String),

    #[error("speaker url rejected: {0}")]
    SpeakerUrlRejected(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl AgentError {
    /// True when the error is (or wraps) a cancellation, which the dialog
    /// loop treats as a normal shutdown rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AgentError::Cancelled)
    }

    pub fn other<S: Into<String>>(msg: S) -> Self {
        AgentError::Other(msg.into())
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(e: serde_json::Error) -> Self {
        AgentError::Other(e.to_string())
    }
}
