//! Wire types for the 402 challenge and the payment proof.
//!
//! A server answers an unpaid request with status 402 and a JSON
//! [`PaymentRequirement`] body. After paying, the client retries with
//! `X-Payment: base64(JSON PaymentProof)`.
//!
//! Bodies of unknown shape stay as [`serde_json::Value`]; the two protocol
//! messages are typed.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as b64;
use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::timestamp::UnixTimestamp;

/// The only payment scheme this client pays.
pub const SOLANA_SCHEME: &str = "solana";

/// Asset identifier of the native Solana coin.
pub const NATIVE_ASSET: &str = "SOL";

/// Server-issued payment challenge carried in a 402 response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirement {
    /// Payment scheme, `"solana"` for this client.
    pub scheme: String,
    /// Cluster name (`"devnet"`, `"mainnet-beta"`, ...).
    pub network: String,
    /// `"SOL"`, a token alias, or a base58 mint address.
    pub asset: String,
    /// Payee wallet address.
    pub pay_to: String,
    /// Amount in whole units of `asset`.
    pub amount: Amount,
    /// Validity window in milliseconds.
    #[serde(default)]
    pub timeout: u64,
    /// Server nonce, when the server binds challenges to a nonce.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// Free-form server metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl PaymentRequirement {
    /// Returns `true` when the requirement uses the Solana scheme.
    #[must_use]
    pub fn is_solana(&self) -> bool {
        self.scheme == SOLANA_SCHEME
    }

    /// Returns `true` when the requirement asks for the native coin.
    #[must_use]
    pub fn is_native(&self) -> bool {
        self.asset == NATIVE_ASSET
    }
}

/// Client-built evidence of a confirmed on-chain transfer.
///
/// `amount` and `to` always mirror the requirement that was paid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentProof {
    /// Base58 transaction signature.
    pub signature: String,
    /// Amount paid, in whole units of `asset`.
    pub amount: Amount,
    /// Payer wallet address.
    pub from: String,
    /// Payee wallet address.
    pub to: String,
    /// Asset paid.
    pub asset: String,
    /// Cluster the transfer landed on.
    pub network: String,
    /// When the proof was built.
    pub timestamp: UnixTimestamp,
}

/// Error decoding an `X-Payment` header value.
#[derive(Debug, thiserror::Error)]
pub enum ProofDecodeError {
    /// Header is not valid base64.
    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
    /// Decoded bytes are not a payment proof.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PaymentProof {
    /// Builds the proof for a paid requirement.
    #[must_use]
    pub fn for_requirement(
        requirement: &PaymentRequirement,
        signature: impl Into<String>,
        payer: impl Into<String>,
        timestamp: UnixTimestamp,
    ) -> Self {
        Self {
            signature: signature.into(),
            amount: requirement.amount,
            from: payer.into(),
            to: requirement.pay_to.clone(),
            asset: requirement.asset.clone(),
            network: requirement.network.clone(),
            timestamp,
        }
    }

    /// Encodes the proof as `base64(JSON)` for the `X-Payment` header.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] if serialization fails.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_vec(self)?;
        Ok(b64.encode(json))
    }

    /// Decodes an `X-Payment` header value.
    ///
    /// # Errors
    ///
    /// Returns [`ProofDecodeError`] on base64 or JSON failure.
    pub fn decode(header_value: &str) -> Result<Self, ProofDecodeError> {
        let bytes = b64.decode(header_value.trim())?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requirement() -> PaymentRequirement {
        serde_json::from_value(serde_json::json!({
            "scheme": "solana",
            "network": "devnet",
            "asset": "SOL",
            "payTo": "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM",
            "amount": "0.01",
            "timeout": 120_000,
            "nonce": "abc123"
        }))
        .unwrap()
    }

    #[test]
    fn test_requirement_decodes_challenge_body() {
        let req = requirement();
        assert!(req.is_solana());
        assert!(req.is_native());
        assert_eq!(req.amount.to_string(), "0.01");
        assert_eq!(req.timeout, 120_000);
        assert_eq!(req.nonce.as_deref(), Some("abc123"));
        assert!(req.metadata.is_none());
    }

    #[test]
    fn test_proof_mirrors_requirement() {
        let req = requirement();
        let proof = PaymentProof::for_requirement(
            &req,
            "5sig",
            "payer111",
            UnixTimestamp::from_secs(1_700_000_000),
        );
        assert_eq!(proof.amount, req.amount);
        assert_eq!(proof.to, req.pay_to);
        assert_eq!(proof.network, "devnet");
    }

    #[test]
    fn test_proof_header_round_trip() {
        let proof = PaymentProof::for_requirement(
            &requirement(),
            "5sig",
            "payer111",
            UnixTimestamp::from_secs(1_700_000_000),
        );
        let header = proof.encode().unwrap();
        assert_eq!(PaymentProof::decode(&header).unwrap(), proof);
    }

    #[test]
    fn test_proof_json_field_names() {
        let proof = PaymentProof::for_requirement(
            &requirement(),
            "5sig",
            "payer111",
            UnixTimestamp::from_secs(42),
        );
        let value = serde_json::to_value(&proof).unwrap();
        assert_eq!(value["amount"], "0.01");
        assert_eq!(value["from"], "payer111");
        assert_eq!(value["timestamp"], 42);
    }

    #[test]
    fn test_proof_decode_rejects_garbage() {
        assert!(matches!(
            PaymentProof::decode("%%%"),
            Err(ProofDecodeError::Base64(_))
        ));
        assert!(matches!(
            PaymentProof::decode(&b64.encode(b"{}")),
            Err(ProofDecodeError::Json(_))
        ));
    }
}
