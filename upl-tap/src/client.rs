//! Registry client that signs every request as a Trusted Agent.
//!
//! Each request carries RFC 9421 `Signature-Input` / `Signature` headers
//! computed over the target URL, and the agent identity headers once the
//! agent is registered.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use http::{HeaderMap, HeaderName, HeaderValue, Method};
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
#[cfg(feature = "telemetry")]
use tracing::instrument;
use upl::amount::Amount;
use upl::timestamp::UnixTimestamp;
use url::Url;

use crate::error::TapError;
use crate::signature::{
    self, SignatureAlgorithm, SignatureComponents, SignatureParams, SignatureTag, SignedHeaders,
    SigningKeyMaterial,
};
use crate::types::{
    AgentFilters, AgentIdentity, AgentRegistration, DiscoverAgentsResponse, RegisterAgentResponse,
};

/// Header carrying the agent DID.
pub const AGENT_DID_HEADER: &str = "x-agent-did";
/// Header carrying the agent TAP certificate.
pub const AGENT_CERT_HEADER: &str = "x-agent-cert";
/// Header carrying the agent wallet address.
pub const AGENT_WALLET_HEADER: &str = "x-agent-wallet";

/// Signing identity and registry location of an agent.
#[derive(Debug, Clone)]
pub struct TapConfig {
    /// Identifier of the signing key.
    pub key_id: String,
    /// Private key.
    pub key: SigningKeyMaterial,
    /// Registry base URL; required for registration and discovery.
    pub registry_url: Option<Url>,
    /// Agent DID; defaults to `did:x402:<key_id>`.
    pub did: Option<String>,
    /// TAP certificate reference; defaults to the key id.
    pub visa_tap_cert: Option<String>,
}

impl TapConfig {
    /// Creates a config with no registry.
    #[must_use]
    pub fn new(key_id: impl Into<String>, key: SigningKeyMaterial) -> Self {
        Self {
            key_id: key_id.into(),
            key,
            registry_url: None,
            did: None,
            visa_tap_cert: None,
        }
    }

    /// Sets the registry base URL.
    #[must_use]
    pub fn with_registry_url(mut self, url: Url) -> Self {
        self.registry_url = Some(url);
        self
    }

    /// Sets the agent DID.
    #[must_use]
    pub fn with_did(mut self, did: impl Into<String>) -> Self {
        self.did = Some(did.into());
        self
    }

    /// Sets the TAP certificate reference.
    #[must_use]
    pub fn with_visa_tap_cert(mut self, cert: impl Into<String>) -> Self {
        self.visa_tap_cert = Some(cert.into());
        self
    }

    /// Signing algorithm of the configured key.
    #[must_use]
    pub const fn algorithm(&self) -> SignatureAlgorithm {
        self.key.algorithm()
    }

    /// Effective DID.
    #[must_use]
    pub fn did(&self) -> String {
        self.did
            .clone()
            .unwrap_or_else(|| format!("did:x402:{}", self.key_id))
    }

    /// Effective TAP certificate reference.
    #[must_use]
    pub fn visa_tap_cert(&self) -> String {
        self.visa_tap_cert
            .clone()
            .unwrap_or_else(|| self.key_id.clone())
    }
}

/// Trusted Agent Protocol client.
#[derive(Debug)]
pub struct TapClient {
    config: TapConfig,
    client: Client,
    identity: Mutex<Option<AgentIdentity>>,
    timeout: Option<Duration>,
}

impl TapClient {
    /// Creates a client without a held identity.
    #[must_use]
    pub fn new(config: TapConfig) -> Self {
        Self {
            config,
            client: Client::new(),
            identity: Mutex::new(None),
            timeout: None,
        }
    }

    /// Starts with an identity obtained elsewhere.
    #[must_use]
    pub fn with_identity(self, identity: AgentIdentity) -> Self {
        self.set_identity(identity);
        self
    }

    /// Sets a timeout for all future requests.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns the signing configuration.
    #[must_use]
    pub const fn config(&self) -> &TapConfig {
        &self.config
    }

    /// Returns the held identity.
    #[must_use]
    pub fn identity(&self) -> Option<AgentIdentity> {
        self.identity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_identity(&self, identity: AgentIdentity) {
        *self.identity.lock().unwrap_or_else(PoisonError::into_inner) = Some(identity);
    }

    /// Signs a request to `url` with a fresh nonce, valid for five minutes.
    ///
    /// # Errors
    ///
    /// Returns [`TapError::Key`] if the key fails to sign.
    pub fn sign_request(&self, url: &Url) -> Result<SignedHeaders, TapError> {
        let params = SignatureParams::new(
            self.config.key_id.clone(),
            self.config.algorithm(),
            SignatureTag::AgentPayerAuth,
            UnixTimestamp::now(),
        );
        signature::sign(&SignatureComponents::from_url(url), &params, &self.config.key)
    }

    /// Signature headers plus the agent identity headers when one is held.
    ///
    /// # Errors
    ///
    /// Returns [`TapError`] if signing fails or a value is not a valid header.
    pub fn request_headers(&self, url: &Url) -> Result<HeaderMap, TapError> {
        let mut headers = HeaderMap::new();
        self.sign_request(url)?.insert_into(&mut headers)?;
        if let Some(identity) = self.identity() {
            for (name, value) in [
                (AGENT_DID_HEADER, identity.did),
                (AGENT_CERT_HEADER, identity.visa_tap_cert),
                (AGENT_WALLET_HEADER, identity.wallet_address),
            ] {
                let value = HeaderValue::from_str(&value)
                    .map_err(|e| TapError::Signature(format!("{name}: {e}")))?;
                headers.insert(HeaderName::from_static(name), value);
            }
        }
        Ok(headers)
    }

    /// Registers this agent and holds the identity the registry returns.
    ///
    /// # Errors
    ///
    /// Returns [`TapError::Config`] without a registry URL, and the HTTP
    /// variants of [`TapError`] when the call fails.
    #[cfg_attr(feature = "telemetry", instrument(name = "upl.tap.register_agent", skip_all, err))]
    pub async fn register_agent(
        &self,
        wallet_address: &str,
        stake: Option<Amount>,
        cancel: &CancellationToken,
    ) -> Result<AgentIdentity, TapError> {
        let url = self.registry_endpoint("agents/register", "registration")?;
        let registration = AgentRegistration {
            did: self.config.did(),
            wallet_address: wallet_address.to_owned(),
            visa_tap_cert: self.config.visa_tap_cert(),
            public_key: self.config.key.verifying_key().to_base64()?,
            algorithm: self.config.algorithm(),
            stake: stake.unwrap_or(Amount::ZERO),
        };
        let response: RegisterAgentResponse = self
            .send(Method::POST, url, Some(&registration), "POST /agents/register", cancel)
            .await?;

        #[cfg(feature = "telemetry")]
        tracing::info!(did = %response.agent.did, "agent registered");

        self.set_identity(response.agent.clone());
        Ok(response.agent)
    }

    /// Lists registered agents matching `filters`.
    ///
    /// # Errors
    ///
    /// Same as [`register_agent`](Self::register_agent).
    #[cfg_attr(feature = "telemetry", instrument(name = "upl.tap.discover_agents", skip_all, err))]
    pub async fn discover_agents(
        &self,
        filters: &AgentFilters,
        cancel: &CancellationToken,
    ) -> Result<Vec<AgentIdentity>, TapError> {
        let mut url = self.registry_endpoint("agents/discover", "discovery")?;
        let pairs = filters.query_pairs();
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }
        let response: DiscoverAgentsResponse = self
            .send::<(), _>(Method::GET, url, None, "GET /agents/discover", cancel)
            .await?;
        Ok(response.agents)
    }

    fn registry_endpoint(&self, path: &str, purpose: &str) -> Result<Url, TapError> {
        let base = self
            .config
            .registry_url
            .as_ref()
            .ok_or_else(|| TapError::Config(format!("registry URL required for agent {purpose}")))?;
        let mut normalized = base.as_str().trim_end_matches('/').to_owned();
        normalized.push('/');
        Url::parse(&normalized)
            .and_then(|b| b.join(path))
            .map_err(|source| TapError::UrlParse {
                context: "Failed to construct registry URL",
                source,
            })
    }

    async fn send<T, R>(
        &self,
        method: Method,
        url: Url,
        body: Option<&T>,
        context: &'static str,
        cancel: &CancellationToken,
    ) -> Result<R, TapError>
    where
        T: Serialize + Sync + ?Sized,
        R: DeserializeOwned,
    {
        let headers = self.request_headers(&url)?;
        let mut req = self.client.request(method, url).headers(headers);
        if let Some(body) = body {
            req = req.json(body);
        }
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let exchange = async {
            let response = req
                .send()
                .await
                .map_err(|source| TapError::Http { context, source })?;
            let status = response.status();
            if status.is_success() {
                response
                    .json::<R>()
                    .await
                    .map_err(|source| TapError::JsonDeserialization { context, source })
            } else {
                let body = response
                    .text()
                    .await
                    .map_err(|source| TapError::Http { context, source })?;
                Err(TapError::HttpStatus {
                    context,
                    status,
                    body,
                })
            }
        };
        cancel
            .run_until_cancelled(exchange)
            .await
            .unwrap_or(Err(TapError::Cancelled))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use http::StatusCode;

    use super::*;
    use crate::signature::{VerifyingKeyMaterial, verify};

    fn client(server: &MockServer) -> TapClient {
        let key = SigningKeyMaterial::ed25519_from_seed(&[42u8; 32]);
        let config = TapConfig::new("agent-key-1", key)
            .with_registry_url(Url::parse(&server.uri()).unwrap());
        TapClient::new(config)
    }

    fn agent() -> serde_json::Value {
        json!({
            "did": "did:x402:agent-key-1",
            "visaTapCert": "agent-key-1",
            "walletAddress": "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM",
            "reputationScore": 50.0
        })
    }

    #[tokio::test]
    async fn test_register_agent_sends_signed_registration() {
        let server = MockServer::start().await;
        let client = client(&server);
        let public_key = client.config().key.verifying_key().to_base64().unwrap();

        Mock::given(method("POST"))
            .and(path("/agents/register"))
            .and(header_exists("signature-input"))
            .and(header_exists("signature"))
            .and(body_partial_json(json!({
                "did": "did:x402:agent-key-1",
                "visaTapCert": "agent-key-1",
                "walletAddress": "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM",
                "publicKey": public_key,
                "algorithm": "ed25519",
                "stake": "0"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "agent": agent() })))
            .expect(1)
            .mount(&server)
            .await;

        assert!(client.identity().is_none());
        let identity = client
            .register_agent(
                "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM",
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(identity.did, "did:x402:agent-key-1");
        assert_eq!(client.identity(), Some(identity));
    }

    #[tokio::test]
    async fn test_discover_agents_signs_query_and_sends_identity() {
        let server = MockServer::start().await;
        let client = client(&server).with_identity(serde_json::from_value(agent()).unwrap());

        Mock::given(method("GET"))
            .and(path("/agents/discover"))
            .and(query_param("category", "ai"))
            .and(query_param("minReputation", "4.00"))
            .and(header("x-agent-did", "did:x402:agent-key-1"))
            .and(header("x-agent-wallet", "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "agents": [agent(), agent()] })),
            )
            .mount(&server)
            .await;

        let filters = AgentFilters {
            category: Some("ai".to_string()),
            min_reputation: Some(4.0),
            verified: None,
        };
        let agents = client
            .discover_agents(&filters, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(agents.len(), 2);

        let requests = server.received_requests().await.unwrap();
        let request = &requests[0];
        let signed = SignedHeaders::from_headers(&request.headers).unwrap();
        let key = VerifyingKeyMaterial::from_base64(
            SignatureAlgorithm::Ed25519,
            &client.config().key.verifying_key().to_base64().unwrap(),
        )
        .unwrap();
        let params = verify(&SignatureComponents::from_url(&request.url), &signed, &key).unwrap();
        assert_eq!(params.tag, SignatureTag::AgentPayerAuth);
        assert_eq!(params.expires.as_secs() - params.created.as_secs(), 300);
    }

    #[tokio::test]
    async fn test_malformed_registry_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/agents/discover"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "agents": [{ "did": 1 }] })))
            .mount(&server)
            .await;

        let err = client(&server)
            .discover_agents(&AgentFilters::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TapError::JsonDeserialization { .. }));
    }

    #[tokio::test]
    async fn test_registry_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/agents/register"))
            .respond_with(ResponseTemplate::new(409).set_body_string("already registered"))
            .mount(&server)
            .await;

        let err = client(&server)
            .register_agent("wallet", None, &CancellationToken::new())
            .await
            .unwrap_err();
        let TapError::HttpStatus { status, body, .. } = err else {
            panic!("expected HttpStatus, got {err:?}");
        };
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body, "already registered");
    }

    #[tokio::test]
    async fn test_registry_url_required() {
        let key = SigningKeyMaterial::generate_ed25519();
        let client = TapClient::new(TapConfig::new("k", key));
        let err = client
            .discover_agents(&AgentFilters::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TapError::Config(_)));
    }

    #[tokio::test]
    async fn test_cancelled_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/agents/discover"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "agents": [] }))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = client(&server)
            .discover_agents(&AgentFilters::default(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, TapError::Cancelled));
    }

    #[test]
    fn test_config_defaults() {
        let config = TapConfig::new("key-9", SigningKeyMaterial::generate_ed25519());
        assert_eq!(config.did(), "did:x402:key-9");
        assert_eq!(config.visa_tap_cert(), "key-9");
        let config = config.with_did("did:web:agent").with_visa_tap_cert("cert-1");
        assert_eq!(config.did(), "did:web:agent");
        assert_eq!(config.visa_tap_cert(), "cert-1");
    }
}
