//! Service error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use upl::proto::ProofDecodeError;

/// Errors raised while configuring or running the service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The configuration file exists but cannot be read.
    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        /// File path.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The configuration file is not valid TOML for [`ServiceConfig`](crate::config::ServiceConfig).
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),
    /// The configuration parsed but is unusable.
    #[error("invalid config: {0}")]
    Config(String),
    /// An `X-Payment` header could not be decoded.
    #[error("malformed payment proof: {0}")]
    MalformedProof(#[from] ProofDecodeError),
    /// Binding or serving failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ServiceError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::MalformedProof(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}
