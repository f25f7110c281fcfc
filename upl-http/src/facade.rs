//! One-stop client: payments, service discovery and optional agent identity.

use serde::Serialize;
use serde_json::Value;
use solana_keypair::Keypair;
use tokio_util::sync::CancellationToken;
use upl::UplError;
use upl::amount::Amount;
use upl::networks::SolanaNetwork;
use upl_svm::{ChainPayer, TransactionBuilder};
use upl_tap::{AgentFilters, AgentIdentity, TapClient};

use crate::client::PaymentClient;
use crate::config::ClientConfig;
use crate::registry::{DiscoverQuery, RegistryClient, ServiceInfo, ServiceRegistration};

/// Combines a [`PaymentClient`], a [`RegistryClient`] and, when agent
/// identity is enabled, a [`TapClient`].
pub struct X402Client<P: ChainPayer = TransactionBuilder> {
    config: ClientConfig,
    payments: PaymentClient<P>,
    registry: RegistryClient,
    tap: Option<TapClient>,
}

impl<P: ChainPayer> std::fmt::Debug for X402Client<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("X402Client")
            .field("config", &self.config)
            .field("payments", &self.payments)
            .field("registry", &self.registry)
            .field("tap", &self.tap)
            .finish()
    }
}

impl X402Client<TransactionBuilder> {
    /// Creates a client paying from `keypair`, without agent identity.
    #[must_use]
    pub fn new(config: ClientConfig, keypair: Keypair) -> Self {
        let payments = PaymentClient::from_config(&config, keypair);
        Self::from_parts(config, payments)
    }
}

impl<P: ChainPayer> X402Client<P> {
    /// Assembles a client around an existing payment client.
    #[must_use]
    pub fn from_parts(config: ClientConfig, payments: PaymentClient<P>) -> Self {
        let registry = RegistryClient::new(config.registry_url.clone()).with_timeout(config.timeout);
        Self {
            config,
            payments,
            registry,
            tap: None,
        }
    }

    /// Enables agent identity.
    #[must_use]
    pub fn with_tap(mut self, tap: TapClient) -> Self {
        self.tap = Some(tap);
        self
    }

    /// Configuration in effect.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Cluster payments are made on.
    #[must_use]
    pub const fn network(&self) -> SolanaNetwork {
        self.config.network
    }

    /// The payment client.
    #[must_use]
    pub const fn payments(&self) -> &PaymentClient<P> {
        &self.payments
    }

    /// The registry client.
    #[must_use]
    pub const fn registry(&self) -> &RegistryClient {
        &self.registry
    }

    /// The agent identity client, when enabled.
    #[must_use]
    pub const fn tap(&self) -> Option<&TapClient> {
        self.tap.as_ref()
    }

    /// See [`PaymentClient::get`].
    ///
    /// # Errors
    ///
    /// Same as [`PaymentClient::post`].
    pub async fn get(
        &self,
        url: &str,
        params: &[(&str, &str)],
        cancel: &CancellationToken,
    ) -> Result<Value, UplError> {
        self.payments.get(url, params, cancel).await
    }

    /// See [`PaymentClient::post`].
    ///
    /// # Errors
    ///
    /// Same as [`PaymentClient::post`].
    pub async fn post<B>(
        &self,
        url: &str,
        body: &B,
        params: &[(&str, &str)],
        cancel: &CancellationToken,
    ) -> Result<Value, UplError>
    where
        B: Serialize + Sync + ?Sized,
    {
        self.payments.post(url, body, params, cancel).await
    }

    /// Posts `input` to a paid service endpoint.
    ///
    /// # Errors
    ///
    /// Same as [`PaymentClient::post`].
    pub async fn pay_and_fetch<B>(
        &self,
        service_url: &str,
        input: &B,
        cancel: &CancellationToken,
    ) -> Result<Value, UplError>
    where
        B: Serialize + Sync + ?Sized,
    {
        self.payments.post(service_url, input, &[], cancel).await
    }

    /// Lists registry services matching `query`.
    ///
    /// # Errors
    ///
    /// Returns [`UplError::Network`] or [`UplError::InvalidResponse`] when the registry call fails.
    pub async fn discover(
        &self,
        query: &DiscoverQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<ServiceInfo>, UplError> {
        Ok(self.registry.discover(query, cancel).await?)
    }

    /// Fetches one registry service.
    ///
    /// # Errors
    ///
    /// Same as [`discover`](Self::discover).
    pub async fn get_service(
        &self,
        service_id: &str,
        cancel: &CancellationToken,
    ) -> Result<ServiceInfo, UplError> {
        Ok(self.registry.get_service(service_id, cancel).await?)
    }

    /// Lists registry categories.
    ///
    /// # Errors
    ///
    /// Same as [`discover`](Self::discover).
    pub async fn categories(&self, cancel: &CancellationToken) -> Result<Vec<String>, UplError> {
        Ok(self.registry.categories(cancel).await?)
    }

    /// Registers a service and returns its registry id.
    ///
    /// # Errors
    ///
    /// Same as [`discover`](Self::discover).
    pub async fn register_service(
        &self,
        registration: &ServiceRegistration,
        cancel: &CancellationToken,
    ) -> Result<String, UplError> {
        Ok(self.registry.register_service(registration, cancel).await?)
    }

    /// First configured preferred token that `service` accepts.
    #[must_use]
    pub fn preferred_token<'a>(&'a self, service: &'a ServiceInfo) -> Option<&'a str> {
        self.config
            .preferred_tokens
            .iter()
            .find(|token| service.accepted_tokens.iter().any(|a| a == *token))
            .map(String::as_str)
    }

    /// Registers the paying wallet as a trusted agent.
    ///
    /// # Errors
    ///
    /// Returns [`UplError::Validation`] when agent identity is not enabled,
    /// otherwise whatever [`TapClient::register_agent`] fails with.
    pub async fn register_agent(
        &self,
        stake: Option<Amount>,
        cancel: &CancellationToken,
    ) -> Result<AgentIdentity, UplError> {
        let tap = self.require_tap("register as an agent")?;
        let wallet = self.payments.wallet_address();
        Ok(tap.register_agent(&wallet, stake, cancel).await?)
    }

    /// Lists registered agents.
    ///
    /// # Errors
    ///
    /// Same as [`register_agent`](Self::register_agent).
    pub async fn discover_agents(
        &self,
        filters: &AgentFilters,
        cancel: &CancellationToken,
    ) -> Result<Vec<AgentIdentity>, UplError> {
        let tap = self.require_tap("discover agents")?;
        Ok(tap.discover_agents(filters, cancel).await?)
    }

    /// Identity held by the agent client.
    #[must_use]
    pub fn agent_identity(&self) -> Option<AgentIdentity> {
        self.tap.as_ref().and_then(TapClient::identity)
    }

    fn require_tap(&self, action: &str) -> Result<&TapClient, UplError> {
        self.tap
            .as_ref()
            .ok_or_else(|| UplError::validation(format!("TAP must be enabled to {action}")))
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;

    use rust_decimal::Decimal;
    use serde_json::json;
    use upl::proto::PaymentRequirement;
    use upl_svm::SvmError;
    use upl_tap::TapConfig;
    use upl_tap::signature::SigningKeyMaterial;
    use url::Url;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const WALLET: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";

    struct NoopPayer;

    impl ChainPayer for NoopPayer {
        fn wallet_address(&self) -> String {
            WALLET.to_owned()
        }

        fn preflight(&self, _requirement: &PaymentRequirement) -> Result<(), SvmError> {
            Ok(())
        }

        fn pay(
            &self,
            _requirement: &PaymentRequirement,
            _cancel: &CancellationToken,
        ) -> impl Future<Output = Result<String, SvmError>> + Send {
            async { Err(SvmError::Validation("no funds in tests".to_owned())) }
        }

        fn balance(&self, _asset: &str) -> impl Future<Output = Result<Decimal, SvmError>> + Send {
            async { Ok(Decimal::ZERO) }
        }
    }

    fn facade(server: &MockServer) -> X402Client<NoopPayer> {
        let config =
            ClientConfig::default().with_registry_url(Url::parse(&server.uri()).unwrap());
        X402Client::from_parts(config, PaymentClient::new(NoopPayer))
    }

    #[tokio::test]
    async fn test_agent_calls_require_tap() {
        let server = MockServer::start().await;
        let client = facade(&server);
        let cancel = CancellationToken::new();

        let err = client.register_agent(None, &cancel).await.unwrap_err();
        assert!(matches!(err, UplError::Validation(ref m) if m.contains("TAP must be enabled")));
        let err = client
            .discover_agents(&AgentFilters::default(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, UplError::Validation(_)));
        assert!(client.agent_identity().is_none());
    }

    #[tokio::test]
    async fn test_register_agent_uses_payer_wallet() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/agents/register"))
            .and(body_partial_json(json!({ "walletAddress": WALLET, "stake": "2.5" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "agent": {
                    "did": "did:x402:k1",
                    "visaTapCert": "k1",
                    "walletAddress": WALLET
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tap = TapClient::new(
            TapConfig::new("k1", SigningKeyMaterial::ed25519_from_seed(&[9u8; 32]))
                .with_registry_url(Url::parse(&server.uri()).unwrap()),
        );
        let client = facade(&server).with_tap(tap);
        let identity = client
            .register_agent(Some(Amount::parse("2.5").unwrap()), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(identity.wallet_address, WALLET);
        assert_eq!(client.agent_identity(), Some(identity));
    }

    #[tokio::test]
    async fn test_discover_and_preferred_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/services/discover"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "services": [{
                    "id": "svc",
                    "name": "Vision",
                    "url": "https://vision.example",
                    "acceptedTokens": ["SOL", "USDC"]
                }]
            })))
            .mount(&server)
            .await;

        let client = facade(&server);
        let services = client
            .discover(&DiscoverQuery::search("vision"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(services.len(), 1);
        assert_eq!(client.preferred_token(&services[0]), Some("USDC"));
        assert_eq!(client.network(), SolanaNetwork::Devnet);
    }
}
