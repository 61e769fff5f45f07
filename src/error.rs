//! Error types for chatstitch
//!
//! Every fallible operation in the crate returns [`AppResult`].

use thiserror::Error;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read config file {path}: {source}")]
    ConfigFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ConfigParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration in {path}: {reason}")]
    ConfigValidationFailed { path: String, reason: String },

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Chat endpoint returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Malformed stream frame #{frame_index}: {reason} (data: {preview})")]
    StreamParse {
        frame_index: usize,
        reason: String,
        preview: String,
    },

    #[error(
        "Stream interrupted after receiving {bytes_received} bytes ({frames_received} frames): {reason}"
    )]
    StreamInterrupted {
        bytes_received: usize,
        frames_received: usize,
        reason: String,
    },

    #[error("Kill request for {request_id} failed with HTTP {status}")]
    KillRequestFailed { request_id: String, status: u16 },

    #[error("Failed to persist conversation {conversation_id}: {reason}")]
    Persistence {
        conversation_id: String,
        reason: String,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether the caller should surface this error directly to the user
    /// (as an alert) rather than only logging it.
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            Self::HttpStatus { .. } | Self::Transport(_) | Self::KillRequestFailed { .. }
        )
    }
}

/// Convenience type alias for Results
pub type AppResult<T> = Result<T, AppError>;
