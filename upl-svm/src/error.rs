//! Error types for Solana payments.

use rust_decimal::Decimal;
use solana_client::client_error::ClientError;
use upl::UplError;

/// Errors raised while building, submitting or confirming a transfer.
#[derive(Debug, thiserror::Error)]
pub enum SvmError {
    /// Malformed address, mint or amount. No chain call was made.
    #[error("{0}")]
    Validation(String),

    /// An RPC call failed before the transaction was submitted.
    #[error("Solana RPC {step} failed: {source}")]
    Rpc {
        /// Which step failed.
        step: &'static str,
        /// Underlying client error.
        #[source]
        source: Box<ClientError>,
    },

    /// The transaction could not be compiled or signed.
    #[error("Can not sign transaction: {0}")]
    Sign(String),

    /// Balance is below the amount being paid.
    #[error("insufficient {asset} balance: required {required}, available {available}")]
    InsufficientBalance {
        /// Asset symbol or mint.
        asset: String,
        /// Amount required.
        required: Decimal,
        /// Amount held.
        available: Decimal,
    },

    /// The caller cancelled before submission.
    #[error("cancelled before submission")]
    Cancelled,

    /// The transaction was submitted but finality was not observed.
    ///
    /// The on-chain outcome is unknown to the caller.
    #[error("transaction {signature} outcome unknown: {reason}")]
    Unconfirmed {
        /// Base58 signature of the submitted transaction.
        signature: String,
        /// Why the wait ended.
        reason: String,
    },
}

impl SvmError {
    pub(crate) fn rpc(step: &'static str, source: ClientError) -> Self {
        Self::Rpc {
            step,
            source: Box::new(source),
        }
    }
}

impl From<SvmError> for UplError {
    fn from(err: SvmError) -> Self {
        match err {
            SvmError::Validation(message) => Self::Validation(message),
            SvmError::InsufficientBalance {
                asset,
                required,
                available,
            } => Self::InsufficientBalance {
                asset,
                required,
                available,
            },
            SvmError::Cancelled => Self::Cancelled,
            err @ (SvmError::Rpc { .. } | SvmError::Sign(_) | SvmError::Unconfirmed { .. }) => {
                let signature = match &err {
                    SvmError::Unconfirmed { signature, .. } => Some(signature.clone()),
                    _ => None,
                };
                Self::PaymentFailed {
                    signature,
                    reason: err.to_string(),
                    source: Some(Box::new(err)),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use solana_client::client_error::ClientErrorKind;

    use super::*;

    #[test]
    fn test_rpc_failure_keeps_source_chain() {
        let err = SvmError::rpc(
            "get_latest_blockhash",
            ClientErrorKind::Custom("node is behind".to_string()).into(),
        );
        let err = UplError::from(err);
        assert!(matches!(err, UplError::PaymentFailed { signature: None, .. }));

        let svm = err.source().unwrap();
        assert!(svm.to_string().contains("get_latest_blockhash"));
        let client = svm.source().unwrap();
        assert!(client.to_string().contains("node is behind"));
    }

    #[test]
    fn test_unconfirmed_keeps_signature_and_source() {
        let err = UplError::from(SvmError::Unconfirmed {
            signature: "5sig".to_string(),
            reason: "not finalized within 60s".to_string(),
        });
        assert_eq!(err.signature(), Some("5sig"));
        assert!(err.source().unwrap().to_string().contains("not finalized"));
    }
}
