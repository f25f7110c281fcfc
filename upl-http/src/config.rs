//! Payment client configuration.

use std::time::Duration;

use rust_decimal::Decimal;
use upl::UplError;
use upl::networks::SolanaNetwork;
use url::Url;

use crate::constants::{DEFAULT_PREFERRED_TOKENS, DEFAULT_REGISTRY_URL, DEFAULT_TIMEOUT};

/// Settings shared by [`PaymentClient`](crate::PaymentClient) and
/// [`X402Client`](crate::X402Client).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Cluster to pay on.
    pub network: SolanaNetwork,
    /// RPC endpoint; the cluster's public endpoint when unset.
    pub rpc_url: Option<String>,
    /// Service registry base URL.
    pub registry_url: Url,
    /// Per-request HTTP timeout.
    pub timeout: Duration,
    /// Hourly spending limit; unlimited when unset or negative.
    pub spending_limit_per_hour: Option<Decimal>,
    /// Assets preferred when a service accepts several, most preferred first.
    pub preferred_tokens: Vec<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            network: SolanaNetwork::Devnet,
            rpc_url: None,
            #[allow(clippy::expect_used)]
            registry_url: Url::parse(DEFAULT_REGISTRY_URL).expect("valid default registry URL"),
            timeout: DEFAULT_TIMEOUT,
            spending_limit_per_hour: None,
            preferred_tokens: DEFAULT_PREFERRED_TOKENS
                .iter()
                .map(|t| (*t).to_owned())
                .collect(),
        }
    }
}

impl ClientConfig {
    /// Default configuration for the named cluster.
    ///
    /// # Errors
    ///
    /// Returns [`UplError::Validation`] for names other than `mainnet-beta`,
    /// `devnet` and `testnet`.
    pub fn for_network(name: &str) -> Result<Self, UplError> {
        Ok(Self {
            network: name.parse()?,
            ..Self::default()
        })
    }

    /// Sets a custom RPC endpoint.
    #[must_use]
    pub fn with_rpc_url(mut self, rpc_url: impl Into<String>) -> Self {
        self.rpc_url = Some(rpc_url.into());
        self
    }

    /// Sets the registry base URL.
    #[must_use]
    pub fn with_registry_url(mut self, registry_url: Url) -> Self {
        self.registry_url = registry_url;
        self
    }

    /// Sets the per-request HTTP timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the hourly spending limit.
    #[must_use]
    pub const fn with_spending_limit(mut self, limit_per_hour: Decimal) -> Self {
        self.spending_limit_per_hour = Some(limit_per_hour);
        self
    }

    /// Sets the preferred tokens.
    #[must_use]
    pub fn with_preferred_tokens<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preferred_tokens = tokens.into_iter().map(Into::into).collect();
        self
    }

    /// RPC endpoint actually used.
    #[must_use]
    pub fn effective_rpc_url(&self) -> &str {
        self.rpc_url
            .as_deref()
            .unwrap_or_else(|| self.network.rpc_url())
    }

    /// Hourly limit as understood by the spending guard; negative means unlimited.
    #[must_use]
    pub fn spending_limit(&self) -> Decimal {
        self.spending_limit_per_hour
            .unwrap_or(Decimal::NEGATIVE_ONE)
    }
}
