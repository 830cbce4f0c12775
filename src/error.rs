//! Error types shared by the generation pipeline and the HTTP surface.

use thiserror::Error;

/// Failure of a single call to the completion service.
///
/// `Transport` and `Status` are both transport-level failures (the request never
/// produced a usable HTTP 2xx). `ContentShape` means the service answered but the
/// body did not carry the expected text field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("request to completion service failed: {message}")]
    Transport { message: String },

    #[error("completion service returned HTTP {status}")]
    Status { status: u16, preview: String },

    #[error("unexpected completion response: {message}")]
    ContentShape { message: String, preview: String },
}

impl GenerationError {
    /// Truncated body text obtained before the failure, if any.
    pub fn preview(&self) -> &str {
        match self {
            GenerationError::Transport { .. } => "",
            GenerationError::Status { preview, .. } => preview,
            GenerationError::ContentShape { preview, .. } => preview,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            GenerationError::Transport { .. } | GenerationError::Status { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no outline has been generated for this session")]
    OutlineMissing,

    #[error("outline generation failed: {0}")]
    Outline(#[source] GenerationError),
}

/// Rejected form input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("chapter count must be between {min} and {max}, got {value}")]
    ChapterCount { value: u32, min: u32, max: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {var}")]
    Invalid { var: &'static str, value: String },
}

/// A session could not be written back to the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("unknown session")]
    NotFound,

    #[error("the outline changed while this request was running")]
    Stale,
}
