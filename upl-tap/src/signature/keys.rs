//! Key material for the two supported signature algorithms.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as b64;
use ed25519_dalek::{Signer as _, Verifier as _};
use rand::RngExt;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey};
use rsa::signature::{RandomizedSigner, SignatureEncoding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use super::SignatureAlgorithm;
use crate::error::TapError;

/// PSS salt length in bytes.
pub const PSS_SALT_LEN: usize = 32;

/// A private key able to produce signatures.
#[derive(Clone)]
pub enum SigningKeyMaterial {
    /// Ed25519 key.
    Ed25519(ed25519_dalek::SigningKey),
    /// RSA key used with RSASSA-PSS / SHA-256.
    RsaPss(Box<RsaPrivateKey>),
}

impl std::fmt::Debug for SigningKeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeyMaterial")
            .field("algorithm", &self.algorithm())
            .finish_non_exhaustive()
    }
}

impl SigningKeyMaterial {
    /// Generates an Ed25519 key from 32 random bytes.
    #[must_use]
    pub fn generate_ed25519() -> Self {
        let seed: [u8; 32] = rand::rng().random();
        Self::ed25519_from_seed(&seed)
    }

    /// Ed25519 key from a 32-byte seed.
    #[must_use]
    pub fn ed25519_from_seed(seed: &[u8; 32]) -> Self {
        Self::Ed25519(ed25519_dalek::SigningKey::from_bytes(seed))
    }

    /// Ed25519 key from a base64 32-byte seed.
    ///
    /// # Errors
    ///
    /// Returns [`TapError::Key`] if the input is not base64 or not 32 bytes.
    pub fn ed25519_from_base64(seed: &str) -> Result<Self, TapError> {
        let bytes = b64
            .decode(seed.trim())
            .map_err(|e| TapError::Key(format!("seed is not base64: {e}")))?;
        let seed: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| TapError::Key(format!("Ed25519 seed must be 32 bytes, got {}", bytes.len())))?;
        Ok(Self::ed25519_from_seed(&seed))
    }

    /// Generates an RSA key of `bits` bits.
    ///
    /// # Errors
    ///
    /// Returns [`TapError::Key`] if generation fails.
    pub fn generate_rsa(bits: usize) -> Result<Self, TapError> {
        let key = RsaPrivateKey::new(&mut rsa::rand_core::OsRng, bits)
            .map_err(|e| TapError::Key(format!("RSA key generation failed: {e}")))?;
        Ok(Self::RsaPss(Box::new(key)))
    }

    /// RSA key from a PKCS#8 PEM document.
    ///
    /// # Errors
    ///
    /// Returns [`TapError::Key`] if the PEM cannot be parsed.
    pub fn rsa_from_pkcs8_pem(pem: &str) -> Result<Self, TapError> {
        let key = RsaPrivateKey::from_pkcs8_pem(pem)
            .map_err(|e| TapError::Key(format!("invalid RSA private key: {e}")))?;
        Ok(Self::RsaPss(Box::new(key)))
    }

    /// Algorithm this key signs with.
    #[must_use]
    pub const fn algorithm(&self) -> SignatureAlgorithm {
        match self {
            Self::Ed25519(_) => SignatureAlgorithm::Ed25519,
            Self::RsaPss(_) => SignatureAlgorithm::RsaPssSha256,
        }
    }

    /// Base64 of the Ed25519 seed; `None` for RSA keys.
    #[must_use]
    pub fn seed_base64(&self) -> Option<String> {
        match self {
            Self::Ed25519(key) => Some(b64.encode(key.to_bytes())),
            Self::RsaPss(_) => None,
        }
    }

    /// Matching public key.
    #[must_use]
    pub fn verifying_key(&self) -> VerifyingKeyMaterial {
        match self {
            Self::Ed25519(key) => VerifyingKeyMaterial::Ed25519(key.verifying_key()),
            Self::RsaPss(key) => VerifyingKeyMaterial::RsaPss(Box::new(key.to_public_key())),
        }
    }

    /// Signs raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`TapError::Key`] if the RSA key is too small for the PSS encoding.
    pub fn sign_bytes(&self, message: &[u8]) -> Result<Vec<u8>, TapError> {
        match self {
            Self::Ed25519(key) => Ok(key.sign(message).to_bytes().to_vec()),
            Self::RsaPss(key) => {
                let signer = rsa::pss::BlindedSigningKey::<Sha256>::new_with_salt_len(
                    (**key).clone(),
                    PSS_SALT_LEN,
                );
                let signature = signer
                    .try_sign_with_rng(&mut rsa::rand_core::OsRng, message)
                    .map_err(|e| TapError::Key(format!("RSA-PSS signing failed: {e}")))?;
                Ok(signature.to_vec())
            }
        }
    }
}

/// A public key able to check signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyingKeyMaterial {
    /// Ed25519 key.
    Ed25519(ed25519_dalek::VerifyingKey),
    /// RSA key.
    RsaPss(Box<RsaPublicKey>),
}

impl VerifyingKeyMaterial {
    /// Algorithm this key verifies.
    #[must_use]
    pub const fn algorithm(&self) -> SignatureAlgorithm {
        match self {
            Self::Ed25519(_) => SignatureAlgorithm::Ed25519,
            Self::RsaPss(_) => SignatureAlgorithm::RsaPssSha256,
        }
    }

    /// Base64 public key: raw 32 bytes for Ed25519, SPKI DER for RSA.
    ///
    /// # Errors
    ///
    /// Returns [`TapError::Key`] if the RSA key cannot be DER-encoded.
    pub fn to_base64(&self) -> Result<String, TapError> {
        match self {
            Self::Ed25519(key) => Ok(b64.encode(key.as_bytes())),
            Self::RsaPss(key) => {
                let der = key
                    .to_public_key_der()
                    .map_err(|e| TapError::Key(format!("{e}")))?;
                Ok(b64.encode(der.as_bytes()))
            }
        }
    }

    /// Parses a key in the [`to_base64`](Self::to_base64) encoding.
    ///
    /// # Errors
    ///
    /// Returns [`TapError::Key`] if the bytes are not a key of `alg`.
    pub fn from_base64(alg: SignatureAlgorithm, encoded: &str) -> Result<Self, TapError> {
        let bytes = b64
            .decode(encoded.trim())
            .map_err(|e| TapError::Key(format!("public key is not base64: {e}")))?;
        match alg {
            SignatureAlgorithm::Ed25519 => {
                let raw: [u8; 32] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| TapError::Key("Ed25519 public key must be 32 bytes".to_string()))?;
                ed25519_dalek::VerifyingKey::from_bytes(&raw)
                    .map(Self::Ed25519)
                    .map_err(|e| TapError::Key(format!("{e}")))
            }
            SignatureAlgorithm::RsaPssSha256 => RsaPublicKey::from_public_key_der(&bytes)
                .map(|k| Self::RsaPss(Box::new(k)))
                .map_err(|e| TapError::Key(format!("{e}"))),
        }
    }

    /// Checks `signature` over `message`.
    ///
    /// # Errors
    ///
    /// Returns [`TapError::Verification`] if the signature does not match.
    pub fn verify_bytes(&self, message: &[u8], signature: &[u8]) -> Result<(), TapError> {
        match self {
            Self::Ed25519(key) => {
                let signature = ed25519_dalek::Signature::from_slice(signature)
                    .map_err(|_| TapError::Verification)?;
                key.verify(message, &signature)
                    .map_err(|_| TapError::Verification)
            }
            Self::RsaPss(key) => {
                let verifier = rsa::pss::VerifyingKey::<Sha256>::new_with_salt_len(
                    (**key).clone(),
                    PSS_SALT_LEN,
                );
                let signature = rsa::pss::Signature::try_from(signature)
                    .map_err(|_| TapError::Verification)?;
                rsa::signature::Verifier::verify(&verifier, message, &signature)
                    .map_err(|_| TapError::Verification)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ed25519_seed_base64_round_trip() {
        let key = SigningKeyMaterial::generate_ed25519();
        let seed = key.seed_base64().unwrap();
        let restored = SigningKeyMaterial::ed25519_from_base64(&seed).unwrap();
        assert_eq!(key.verifying_key(), restored.verifying_key());
    }

    #[test]
    fn test_ed25519_seed_wrong_length() {
        assert!(matches!(
            SigningKeyMaterial::ed25519_from_base64(&b64.encode([0u8; 31])),
            Err(TapError::Key(_))
        ));
    }

    #[test]
    fn test_public_key_base64_round_trip() {
        let ed = SigningKeyMaterial::ed25519_from_seed(&[9u8; 32]).verifying_key();
        let encoded = ed.to_base64().unwrap();
        assert_eq!(b64.decode(&encoded).unwrap().len(), 32);
        assert_eq!(
            VerifyingKeyMaterial::from_base64(SignatureAlgorithm::Ed25519, &encoded).unwrap(),
            ed
        );

        let rsa = SigningKeyMaterial::generate_rsa(1024).unwrap().verifying_key();
        let encoded = rsa.to_base64().unwrap();
        assert_eq!(
            VerifyingKeyMaterial::from_base64(SignatureAlgorithm::RsaPssSha256, &encoded).unwrap(),
            rsa
        );
    }

    #[test]
    fn test_rsa_from_pem() {
        use rsa::pkcs8::{EncodePrivateKey, LineEnding};

        let SigningKeyMaterial::RsaPss(key) = SigningKeyMaterial::generate_rsa(1024).unwrap() else {
            panic!("expected RSA key");
        };
        let pem = key.to_pkcs8_pem(LineEnding::LF).unwrap();
        let loaded = SigningKeyMaterial::rsa_from_pkcs8_pem(&pem).unwrap();
        assert_eq!(loaded.algorithm(), SignatureAlgorithm::RsaPssSha256);
        let sig = loaded.sign_bytes(b"hello").unwrap();
        let public = VerifyingKeyMaterial::RsaPss(Box::new(key.to_public_key()));
        public.verify_bytes(b"hello", &sig).unwrap();
    }

    #[test]
    fn test_debug_hides_secret() {
        let key = SigningKeyMaterial::ed25519_from_seed(&[5u8; 32]);
        let debug = format!("{key:?}");
        assert!(debug.contains("Ed25519"));
        assert!(!debug.contains("5, 5"));
    }
}
