//! Error taxonomy for payment client operations.
//!
//! Every public operation of the client surfaces one [`UplError`]. Chain,
//! transport and signing crates convert their own errors into it at the
//! client boundary.

use rust_decimal::Decimal;

use crate::amount::AmountError;

/// Errors surfaced by the payment client.
#[derive(Debug, thiserror::Error)]
pub enum UplError {
    /// Bad caller input, unsupported scheme or network, malformed address or amount.
    #[error("validation error: {0}")]
    Validation(String),

    /// Paying would exceed the hourly spending budget. Nothing was submitted.
    #[error("hourly budget exceeded: requested {requested}, remaining {remaining}")]
    BudgetExceeded {
        /// Amount the challenge asked for.
        requested: Decimal,
        /// Budget left in the current hour.
        remaining: Decimal,
    },

    /// Transport failure, or an HTTP status of 400 or above.
    #[error("{}", fmt_network(.status, .message))]
    Network {
        /// HTTP status, absent for transport failures.
        status: Option<u16>,
        /// Response body or transport error text.
        message: String,
    },

    /// A response body could not be decoded into the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// On-chain balance is below the amount required. Checked before submission.
    #[error("insufficient {asset} balance: required {required}, available {available}")]
    InsufficientBalance {
        /// Asset symbol or mint.
        asset: String,
        /// Amount required.
        required: Decimal,
        /// Amount held.
        available: Decimal,
    },

    /// Signing, submission or confirmation failed.
    ///
    /// When `signature` is set the transaction was submitted and funds may
    /// already have moved.
    #[error("payment failed: {reason}")]
    PaymentFailed {
        /// Transaction signature, when the transaction reached the network.
        signature: Option<String>,
        /// Underlying cause.
        reason: String,
        /// Chain error behind the failure, when there is one.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The request paid for was answered with another 402.
    ///
    /// The transfer behind `signature` is confirmed; retrying would pay twice.
    #[error("payment {signature} was not accepted: server answered the paid request with 402")]
    PaymentNotAccepted {
        /// Signature of the confirmed transfer.
        signature: String,
    },

    /// The caller cancelled before any funds moved.
    #[error("operation cancelled")]
    Cancelled,
}

#[allow(clippy::ref_option)]
fn fmt_network(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(status) => format!("network error: HTTP {status}: {message}"),
        None => format!("network error: {message}"),
    }
}

impl UplError {
    /// Creates a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a network error for an HTTP status of 400 or above.
    #[must_use]
    pub fn http_status(status: u16, body: impl Into<String>) -> Self {
        Self::Network {
            status: Some(status),
            message: body.into(),
        }
    }

    /// Creates a network error for a transport failure.
    #[must_use]
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Network {
            status: None,
            message: err.to_string(),
        }
    }

    /// Creates a decode error.
    #[must_use]
    pub fn invalid_response(err: impl std::fmt::Display) -> Self {
        Self::InvalidResponse(err.to_string())
    }

    /// Returns the signature of a submitted transaction, if this error carries one.
    #[must_use]
    pub fn signature(&self) -> Option<&str> {
        match self {
            Self::PaymentFailed { signature, .. } => signature.as_deref(),
            Self::PaymentNotAccepted { signature } => Some(signature),
            _ => None,
        }
    }
}

impl From<AmountError> for UplError {
    fn from(err: AmountError) -> Self {
        Self::Validation(err.to_string())
    }
}
