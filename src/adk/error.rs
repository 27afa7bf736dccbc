// SPDX-License-Identifier: MIT

//! Typed error handling for adk-bedrock
//!
//! One error enum covers the whole crate: remote API failures, local
//! configuration problems, stream decoding faults, and the serde/transport
//! errors they wrap.

use thiserror::Error;

/// Top-level error type for adk-bedrock
#[derive(Debug, Error)]
pub enum AdkError {
    /// API errors from the remote invocation service
    #[error("API error from {provider}: {message}")]
    Api { provider: String, message: String },

    /// Operation the backend cannot provide (e.g. embeddings on Bedrock)
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Configuration errors (missing env vars, invalid config)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed transport frame on the streaming path
    #[error("Stream error: {0}")]
    Stream(String),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Generic error wrapper for compatibility
    #[error("{0}")]
    Other(String),
}

impl AdkError {
    /// Create an API error
    pub fn api(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a stream error
    pub fn stream(message: impl Into<String>) -> Self {
        Self::Stream(message.into())
    }

    /// Create from a generic error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

// Allow conversion from &str for backward compatibility
impl From<&str> for AdkError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

impl From<String> for AdkError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}
