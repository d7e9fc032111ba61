//! Error types for the Split wrapper.

use thiserror::Error;

/// Errors that can occur in the Split wrapper.
///
/// Only configuration errors reach callers of the public API; the others are
/// raised inside the SDK's background work and logged there.
#[derive(Debug, Error)]
pub enum Error {
    /// No API key was supplied.
    #[error("missing Split SDK API key")]
    MissingApiKey,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Failed to fetch flag definitions.
    #[error("failed to fetch flag definitions: {0}")]
    DefinitionsFetch(String),

    /// Failed to parse flag definitions.
    #[error("failed to parse flag definitions: {0}")]
    DefinitionsParse(String),

    /// The events endpoint rejected a batch.
    #[error("failed to deliver {kind}: {reason}")]
    Delivery { kind: &'static str, reason: String },

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// HTTP request failed inside the middleware stack.
    #[error("HTTP error: {0}")]
    Middleware(#[from] reqwest_middleware::Error),
}

/// Result type alias for the wrapper.
pub type Result<T> = std::result::Result<T, Error>;
