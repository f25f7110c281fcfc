//! Solana chain access.
//!
//! # Key Types
//!
//! - [`Address`] - A validated base58 account address
//! - [`RpcClientLike`](rpc::RpcClientLike) - The RPC surface used by the payer
//! - [`load_keypair`] - Parses wallet secrets in the common encodings

/// Core Solana chain types.
pub mod types;
pub use types::*;

/// RPC client abstraction for Solana.
pub mod rpc;

use solana_keypair::Keypair;

use crate::error::SvmError;

/// Parses a wallet secret.
///
/// Accepts a base58 64-byte keypair (Phantom/Solflare export), a base58
/// 32-byte seed, or a JSON byte array as written by `solana-keygen`.
///
/// # Errors
///
/// Returns [`SvmError::Validation`] if the secret is in none of those forms.
pub fn load_keypair(secret: &str) -> Result<Keypair, SvmError> {
    let secret = secret.trim();
    let bytes = if secret.starts_with('[') {
        serde_json::from_str::<Vec<u8>>(secret)
            .map_err(|e| SvmError::Validation(format!("invalid keypair JSON: {e}")))?
    } else {
        bs58::decode(secret)
            .into_vec()
            .map_err(|e| SvmError::Validation(format!("invalid keypair base58: {e}")))?
    };
    match bytes.len() {
        32 => {
            let mut seed = [0u8; 32];
            seed.copy_from_slice(&bytes);
            Ok(Keypair::new_from_array(seed))
        }
        64 => Keypair::try_from(bytes.as_slice())
            .map_err(|e| SvmError::Validation(format!("invalid keypair bytes: {e}"))),
        n => Err(SvmError::Validation(format!(
            "keypair must be 32 or 64 bytes, got {n}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_signer::Signer;

    #[test]
    fn test_load_keypair_base58_and_json_agree() {
        let keypair = Keypair::new();
        let bytes = keypair.to_bytes();
        let from_b58 = load_keypair(&bs58::encode(bytes).into_string()).unwrap();
        let from_json = load_keypair(&serde_json::to_string(&bytes.to_vec()).unwrap()).unwrap();
        assert_eq!(from_b58.pubkey(), keypair.pubkey());
        assert_eq!(from_json.pubkey(), keypair.pubkey());
    }

    #[test]
    fn test_load_keypair_from_seed() {
        let seed = [7u8; 32];
        let keypair = load_keypair(&bs58::encode(seed).into_string()).unwrap();
        assert_eq!(keypair.pubkey(), Keypair::new_from_array(seed).pubkey());
    }

    #[test]
    fn test_load_keypair_rejects_wrong_length() {
        let err = load_keypair(&bs58::encode([1u8; 16]).into_string()).unwrap_err();
        assert!(matches!(err, SvmError::Validation(_)));
    }
}
