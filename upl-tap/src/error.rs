//! Error types for agent signing and the agent registry.

use http::StatusCode;
use upl::UplError;

/// Errors raised while signing or talking to the agent registry.
#[derive(Debug, thiserror::Error)]
pub enum TapError {
    /// Key material is malformed or cannot sign.
    #[error("invalid key: {0}")]
    Key(String),

    /// Signature headers or parameters are malformed.
    #[error("signature error: {0}")]
    Signature(String),

    /// A signature did not verify.
    #[error("signature verification failed")]
    Verification,

    /// The client is not configured for the requested call.
    #[error("{0}")]
    Config(String),

    /// URL parse error.
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        /// Human-readable context.
        context: &'static str,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },

    /// HTTP transport error.
    #[error("HTTP error: {context}: {source}")]
    Http {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    /// Unexpected HTTP status code.
    #[error("Unexpected HTTP status {status}: {context}: {body}")]
    HttpStatus {
        /// Human-readable context.
        context: &'static str,
        /// The HTTP status code.
        status: StatusCode,
        /// The response body.
        body: String,
    },

    /// Response body does not have the expected shape.
    #[error("Failed to deserialize JSON: {context}: {source}")]
    JsonDeserialization {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    /// The caller's token fired.
    #[error("cancelled")]
    Cancelled,
}

impl From<TapError> for UplError {
    fn from(err: TapError) -> Self {
        match err {
            TapError::HttpStatus { status, body, .. } => Self::http_status(status.as_u16(), body),
            TapError::Http { .. } => Self::transport(err),
            TapError::JsonDeserialization { .. } => Self::invalid_response(err),
            TapError::Cancelled => Self::Cancelled,
            TapError::Key(_)
            | TapError::Signature(_)
            | TapError::Verification
            | TapError::Config(_)
            | TapError::UrlParse { .. } => Self::Validation(err.to_string()),
        }
    }
}
