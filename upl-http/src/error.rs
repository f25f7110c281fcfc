//! Error types for the service registry client.

use http::StatusCode;
use upl::UplError;

/// Errors raised while talking to the service registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The call needs a service id and none is held.
    #[error("service not registered")]
    NotRegistered,

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

impl From<RegistryError> for UplError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::HttpStatus { status, body, .. } => Self::http_status(status.as_u16(), body),
            RegistryError::Http { .. } => Self::transport(err),
            RegistryError::JsonDeserialization { .. } => Self::invalid_response(err),
            RegistryError::Cancelled => Self::Cancelled,
            RegistryError::NotRegistered | RegistryError::UrlParse { .. } => {
                Self::Validation(err.to_string())
            }
        }
    }
}
