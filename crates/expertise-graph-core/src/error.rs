//! Error taxonomy for the retrieval core.
//!
//! Every fallible core operation returns [`Error`]. The chunker and the
//! heuristic topic extractor are total functions and never produce one.
//!
//! Callers that surface failures to end users should use
//! [`Error::category`], which yields an opaque machine-readable code and
//! never includes provider bodies or store details.

use thiserror::Error;

/// Convenience alias used throughout the core crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or missing request parameters. Raised before any I/O.
    #[error("invalid input: {0}")]
    Input(String),

    /// A network provider answered with a non-success status.
    ///
    /// `body` is already truncated to [`PROVIDER_BODY_LIMIT`] characters.
    #[error("{provider} returned HTTP {status}: {body}")]
    ProviderStatus {
        provider: String,
        status: u16,
        body: String,
    },

    /// The request never produced a response (connect error, timeout).
    #[error("{provider} request failed: {message}")]
    ProviderTransport { provider: String, message: String },

    /// The provider answered 2xx but the payload could not be used.
    #[error("{provider} returned an unusable response: {message}")]
    ProviderResponse { provider: String, message: String },

    /// Vector width disagrees with the declared chunk table width.
    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("not found: {0}")]
    NotFound(String),

    /// Underlying persistence failure.
    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

/// Maximum number of characters of a provider error body kept in [`Error::ProviderStatus`].
pub const PROVIDER_BODY_LIMIT: usize = 200;

impl Error {
    /// Build a [`Error::ProviderStatus`], truncating the body.
    pub fn provider_status(provider: impl Into<String>, status: u16, body: &str) -> Self {
        Error::ProviderStatus {
            provider: provider.into(),
            status,
            body: body.chars().take(PROVIDER_BODY_LIMIT).collect(),
        }
    }

    pub fn input(message: impl Into<String>) -> Self {
        Error::Input(message.into())
    }

    /// Opaque error category safe to expose to callers.
    pub fn category(&self) -> &'static str {
        match self {
            Error::Input(_) => "input_error",
            Error::ProviderStatus { .. }
            | Error::ProviderTransport { .. }
            | Error::ProviderResponse { .. } => "provider_error",
            Error::DimensionMismatch { .. } => "dimension_mismatch",
            Error::NotFound(_) => "not_found",
            Error::Store(_) => "store_error",
        }
    }

    /// True for errors raised by an embedding or text-generation backend.
    pub fn is_provider(&self) -> bool {
        self.category() == "provider_error"
    }
}
