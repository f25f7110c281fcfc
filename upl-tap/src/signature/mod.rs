//! RFC 9421 HTTP message signatures over `@authority` and `@path`.
//!
//! The signature base is one line per covered component followed by the
//! `@signature-params` line, joined with `\n`:
//!
//! ```text
//! "@authority": registry.x402.network
//! "@path": /agents/discover?category=ai
//! "@signature-params": ("@authority" "@path"); created=1700000000; expires=1700000300; keyid="agent-1"; alg="ed25519"; nonce="9f0c..."; tag="agent-payer-auth"
//! ```
//!
//! Signing emits a `Signature-Input` value labelled `sig2` and a `Signature`
//! value wrapping the base64 signature bytes. [`verify`] rebuilds the same
//! base from the headers and checks it against a public key.

pub mod keys;

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as b64;
use http::{HeaderMap, HeaderName, HeaderValue};
use rand::RngExt;
use serde::{Deserialize, Serialize};
use upl::timestamp::UnixTimestamp;
use url::Url;

pub use keys::{SigningKeyMaterial, VerifyingKeyMaterial};

use crate::error::TapError;

/// Label under which the signature is emitted.
pub const SIGNATURE_LABEL: &str = "sig2";

/// Default validity window of a signature, in seconds.
pub const DEFAULT_VALIDITY_SECS: u64 = 300;

/// Header carrying the signature parameters.
pub const SIGNATURE_INPUT_HEADER: &str = "signature-input";

/// Header carrying the signature bytes.
pub const SIGNATURE_HEADER: &str = "signature";

const COVERED_COMPONENTS: &str = r#"("@authority" "@path")"#;

/// Signature algorithm identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    /// Ed25519.
    #[serde(rename = "ed25519")]
    Ed25519,
    /// RSASSA-PSS with SHA-256 and a 32-byte salt.
    #[serde(rename = "rsa-pss-sha256")]
    RsaPssSha256,
}

impl SignatureAlgorithm {
    /// Wire identifier used in the `alg` parameter.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ed25519 => "ed25519",
            Self::RsaPssSha256 => "rsa-pss-sha256",
        }
    }
}

impl Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = TapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ed25519" => Ok(Self::Ed25519),
            "rsa-pss-sha256" => Ok(Self::RsaPssSha256),
            other => Err(TapError::Signature(format!(
                "unsupported signature algorithm {other:?}"
            ))),
        }
    }
}

/// Purpose tag of a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignatureTag {
    /// Agent browsing on behalf of a user.
    AgentBrowserAuth,
    /// Agent paying on behalf of a user.
    AgentPayerAuth,
}

impl SignatureTag {
    /// Wire identifier used in the `tag` parameter.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AgentBrowserAuth => "agent-browser-auth",
            Self::AgentPayerAuth => "agent-payer-auth",
        }
    }
}

impl FromStr for SignatureTag {
    type Err = TapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "agent-browser-auth" => Ok(Self::AgentBrowserAuth),
            "agent-payer-auth" => Ok(Self::AgentPayerAuth),
            other => Err(TapError::Signature(format!("unknown signature tag {other:?}"))),
        }
    }
}

/// The request components covered by a signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureComponents {
    /// Host, plus `:port` when the URL carries one.
    pub authority: String,
    /// Path, plus `?query` when the URL carries one.
    pub path: String,
}

impl SignatureComponents {
    /// Derives the covered components from a request URL.
    #[must_use]
    pub fn from_url(url: &Url) -> Self {
        let host = url.host_str().unwrap_or_default();
        let authority = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_owned(),
        };
        let path = match url.query() {
            Some(query) => format!("{}?{query}", url.path()),
            None => url.path().to_owned(),
        };
        Self { authority, path }
    }
}

/// Parameters bound into one signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureParams {
    /// Creation time.
    pub created: UnixTimestamp,
    /// Expiry time.
    pub expires: UnixTimestamp,
    /// Identifier of the signing key.
    pub key_id: String,
    /// Signing algorithm.
    pub alg: SignatureAlgorithm,
    /// Single-use nonce.
    pub nonce: String,
    /// Purpose tag.
    pub tag: SignatureTag,
}

impl SignatureParams {
    /// Fresh parameters created at `created`, valid for [`DEFAULT_VALIDITY_SECS`].
    #[must_use]
    pub fn new(
        key_id: impl Into<String>,
        alg: SignatureAlgorithm,
        tag: SignatureTag,
        created: UnixTimestamp,
    ) -> Self {
        Self {
            created,
            expires: created + DEFAULT_VALIDITY_SECS,
            key_id: key_id.into(),
            alg,
            nonce: generate_nonce(),
            tag,
        }
    }

    /// Overrides the expiry time.
    #[must_use]
    pub const fn with_expires(mut self, expires: UnixTimestamp) -> Self {
        self.expires = expires;
        self
    }

    /// Overrides the nonce.
    #[must_use]
    pub fn with_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = nonce.into();
        self
    }

    /// Returns `true` if `now` is past the expiry time.
    #[must_use]
    pub fn is_expired(&self, now: UnixTimestamp) -> bool {
        now > self.expires
    }

    /// Parses the value following `sig2=` in a `Signature-Input` header.
    fn parse(value: &str) -> Result<Self, TapError> {
        let malformed = || TapError::Signature(format!("malformed signature parameters: {value}"));
        let rest = value.strip_prefix(COVERED_COMPONENTS).ok_or_else(malformed)?;

        let mut created = None;
        let mut expires = None;
        let mut key_id = None;
        let mut alg = None;
        let mut nonce = None;
        let mut tag = None;
        for item in rest.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let (name, raw) = item.split_once('=').ok_or_else(malformed)?;
            let unquoted = raw.trim_matches('"');
            match name {
                "created" => {
                    created = Some(UnixTimestamp::from_secs(
                        unquoted.parse().map_err(|_| malformed())?,
                    ));
                }
                "expires" => {
                    expires = Some(UnixTimestamp::from_secs(
                        unquoted.parse().map_err(|_| malformed())?,
                    ));
                }
                "keyid" => key_id = Some(unquoted.to_owned()),
                "alg" => alg = Some(unquoted.parse()?),
                "nonce" => nonce = Some(unquoted.to_owned()),
                "tag" => tag = Some(unquoted.parse()?),
                _ => return Err(malformed()),
            }
        }
        Ok(Self {
            created: created.ok_or_else(malformed)?,
            expires: expires.ok_or_else(malformed)?,
            key_id: key_id.ok_or_else(malformed)?,
            alg: alg.ok_or_else(malformed)?,
            nonce: nonce.ok_or_else(malformed)?,
            tag: tag.ok_or_else(malformed)?,
        })
    }
}

impl Display for SignatureParams {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            r#"{COVERED_COMPONENTS}; created={}; expires={}; keyid="{}"; alg="{}"; nonce="{}"; tag="{}""#,
            self.created.as_secs(),
            self.expires.as_secs(),
            self.key_id,
            self.alg,
            self.nonce,
            self.tag.as_str(),
        )
    }
}

/// The two header values produced by signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    /// `Signature-Input` header value.
    pub signature_input: String,
    /// `Signature` header value.
    pub signature: String,
}

impl SignedHeaders {
    /// Inserts both headers into `headers`.
    ///
    /// # Errors
    ///
    /// Returns [`TapError::Signature`] if a value is not a valid header value.
    pub fn insert_into(&self, headers: &mut HeaderMap) -> Result<(), TapError> {
        let to_value = |v: &str| {
            HeaderValue::from_str(v).map_err(|e| TapError::Signature(format!("{e}")))
        };
        headers.insert(
            HeaderName::from_static(SIGNATURE_INPUT_HEADER),
            to_value(&self.signature_input)?,
        );
        headers.insert(HeaderName::from_static(SIGNATURE_HEADER), to_value(&self.signature)?);
        Ok(())
    }

    /// Reads both headers from `headers`.
    ///
    /// # Errors
    ///
    /// Returns [`TapError::Signature`] if either header is missing or not ASCII.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, TapError> {
        let read = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
                .ok_or_else(|| TapError::Signature(format!("missing {name} header")))
        };
        Ok(Self {
            signature_input: read(SIGNATURE_INPUT_HEADER)?,
            signature: read(SIGNATURE_HEADER)?,
        })
    }
}

/// Builds the canonical signature base.
#[must_use]
pub fn signature_base(components: &SignatureComponents, params: &SignatureParams) -> String {
    [
        format!(r#""@authority": {}"#, components.authority),
        format!(r#""@path": {}"#, components.path),
        format!(r#""@signature-params": {params}"#),
    ]
    .join("\n")
}

/// 16 random bytes, hex-encoded.
#[must_use]
pub fn generate_nonce() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    hex::encode(bytes)
}

/// Signs `components` under `params`.
///
/// # Errors
///
/// Returns [`TapError::Signature`] if `params.alg` does not match the key,
/// or [`TapError::Key`] if the key fails to sign.
pub fn sign(
    components: &SignatureComponents,
    params: &SignatureParams,
    key: &SigningKeyMaterial,
) -> Result<SignedHeaders, TapError> {
    if params.alg != key.algorithm() {
        return Err(TapError::Signature(format!(
            "parameters name {} but the key is {}",
            params.alg,
            key.algorithm()
        )));
    }
    let base = signature_base(components, params);
    let signature = key.sign_bytes(base.as_bytes())?;
    Ok(SignedHeaders {
        signature_input: format!("{SIGNATURE_LABEL}={params}"),
        signature: format!("{SIGNATURE_LABEL}=:{}:", b64.encode(signature)),
    })
}

/// Verifies signed headers against `components` and returns the parameters.
///
/// Expiry is not checked here; see [`SignatureParams::is_expired`].
///
/// # Errors
///
/// Returns [`TapError::Signature`] for malformed headers or an algorithm
/// mismatch, and [`TapError::Verification`] if the signature does not verify.
pub fn verify(
    components: &SignatureComponents,
    headers: &SignedHeaders,
    key: &VerifyingKeyMaterial,
) -> Result<SignatureParams, TapError> {
    let label_prefix = format!("{SIGNATURE_LABEL}=");
    let params_value = headers
        .signature_input
        .strip_prefix(&label_prefix)
        .ok_or_else(|| TapError::Signature(format!("missing {SIGNATURE_LABEL} label")))?;
    let params = SignatureParams::parse(params_value)?;
    if params.alg != key.algorithm() {
        return Err(TapError::Signature(format!(
            "signature uses {} but the key is {}",
            params.alg,
            key.algorithm()
        )));
    }
    let encoded = headers
        .signature
        .strip_prefix(&label_prefix)
        .and_then(|v| v.strip_prefix(':'))
        .and_then(|v| v.strip_suffix(':'))
        .ok_or_else(|| TapError::Signature("malformed Signature header".to_string()))?;
    let signature = b64
        .decode(encoded)
        .map_err(|e| TapError::Signature(format!("signature is not base64: {e}")))?;
    let base = signature_base(components, &params);
    key.verify_bytes(base.as_bytes(), &signature)?;
    Ok(params)
}
