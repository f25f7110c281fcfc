//! Service configuration.
//!
//! Loaded from a TOML file whose string values may reference environment
//! variables as `$VAR` or `${VAR}`.
//!
//! # Example Configuration
//!
//! ```toml
//! port = 3000
//! network = "devnet"
//! treasury_wallet = "$TREASURY_WALLET"
//! price = "0.01"
//! asset = "CASH"
//!
//! [registration]
//! service_url = "${SERVICE_URL}"
//! category = "API"
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` - Path to the configuration file (default: `config.toml`)
//! - `HOST` - Override the bind address
//! - `PORT` - Override the port

use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use regex::{Captures, Regex};
use rust_decimal::Decimal;
use serde::Deserialize;
use upl::amount::Amount;
use upl::networks::SolanaNetwork;
use upl_http::ServiceRegistration;
use upl_http::constants::{DEFAULT_PREFERRED_TOKENS, DEFAULT_REGISTRY_URL};
use upl_svm::chain::Address;
use upl_svm::transfer::mint::Asset;
use url::Url;

use crate::error::ServiceError;

static ENV_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
        .expect("valid env var pattern")
});

/// Top-level service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Bind address (default: `0.0.0.0`).
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port (default: `3000`).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Name reported by `/health` and used for registration.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Cluster payments are expected on.
    #[serde(default)]
    pub network: SolanaNetwork,

    /// Wallet that receives payments.
    #[serde(default)]
    pub treasury_wallet: String,

    /// Price of one paid call (default: `0.01`).
    #[serde(default = "default_price")]
    pub price: Amount,

    /// Asset the price is quoted in (default: `CASH`).
    #[serde(default = "default_asset")]
    pub asset: String,

    /// Service registry base URL.
    #[serde(default = "default_registry_url")]
    pub registry_url: Url,

    /// Seconds between registry heartbeats (default: `60`).
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,

    /// Seconds to wait for in-flight requests on shutdown (default: `10`).
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,

    /// Registry auto-registration; skipped when absent.
    #[serde(default)]
    pub registration: Option<RegistrationConfig>,
}

/// How the service describes itself to the registry.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationConfig {
    /// Public base URL of the service.
    pub service_url: Url,

    /// Short description.
    #[serde(default = "default_description")]
    pub description: String,

    /// Registry category (default: `API`).
    #[serde(default = "default_category")]
    pub category: String,

    /// Assets accepted (default: `CASH`, `USDC`, `SOL`).
    #[serde(default = "default_accepted_tokens")]
    pub accepted_tokens: Vec<String>,

    /// Capability names.
    #[serde(default)]
    pub capabilities: Vec<String>,

    /// Tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

const fn default_port() -> u16 {
    3000
}

fn default_service_name() -> String {
    "x402 Service".to_owned()
}

fn default_price() -> Amount {
    Amount::new(Decimal::new(1, 2)).unwrap_or(Amount::ZERO)
}

fn default_asset() -> String {
    "CASH".to_owned()
}

fn default_registry_url() -> Url {
    Url::parse(DEFAULT_REGISTRY_URL).expect("valid default registry URL")
}

const fn default_heartbeat_interval_secs() -> u64 {
    60
}

const fn default_shutdown_timeout_secs() -> u64 {
    10
}

fn default_description() -> String {
    "x402-enabled service".to_owned()
}

fn default_category() -> String {
    "API".to_owned()
}

fn default_accepted_tokens() -> Vec<String> {
    DEFAULT_PREFERRED_TOKENS
        .iter()
        .map(|t| (*t).to_owned())
        .collect()
}

impl ServiceConfig {
    /// Loads the file named by `CONFIG`, or `config.toml`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] if the file cannot be read, parsed or validated.
    pub fn load() -> Result<Self, ServiceError> {
        let path = std::env::var("CONFIG").unwrap_or_else(|_| "config.toml".to_owned());
        Self::load_from(&path)
    }

    /// Loads a specific file, then applies `HOST` and `PORT` overrides.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] if the file cannot be read, parsed or validated.
    pub fn load_from(path: &str) -> Result<Self, ServiceError> {
        let content = if Path::new(path).exists() {
            std::fs::read_to_string(path).map_err(|source| ServiceError::ConfigRead {
                path: path.to_owned(),
                source,
            })?
        } else {
            String::new()
        };
        let mut config = Self::from_toml(&expand_env_vars(&content, |name| {
            std::env::var(name).ok()
        }))?;

        if let Some(host) = std::env::var("HOST").ok().and_then(|h| h.parse().ok()) {
            config.host = host;
        }
        if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse().ok()) {
            config.port = port;
        }
        config.validate()?;
        Ok(config)
    }

    /// Parses already-expanded TOML without validating it.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::ConfigParse`] on malformed TOML.
    pub fn from_toml(content: &str) -> Result<Self, ServiceError> {
        Ok(toml::from_str(content)?)
    }

    /// Checks the treasury wallet, the price and the asset.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.treasury_wallet.is_empty() || self.treasury_wallet.starts_with('$') {
            return Err(ServiceError::Config(
                "treasury_wallet is not set (missing env var?)".to_owned(),
            ));
        }
        self.treasury_wallet
            .parse::<Address>()
            .map_err(|e| ServiceError::Config(format!("treasury_wallet: {e}")))?;
        if self.price.is_zero() {
            return Err(ServiceError::Config("price must be positive".to_owned()));
        }
        Asset::resolve(&self.asset, self.network)
            .map_err(|e| ServiceError::Config(format!("asset: {e}")))?;
        Ok(())
    }

    /// Heartbeat period.
    #[must_use]
    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Bound on the in-flight request drain at shutdown.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Registry body for auto-registration, when configured.
    #[must_use]
    pub fn service_registration(&self) -> Option<ServiceRegistration> {
        let registration = self.registration.as_ref()?;
        Some(ServiceRegistration {
            url: registration.service_url.to_string(),
            name: self.service_name.clone(),
            description: registration.description.clone(),
            category: registration.category.clone(),
            owner_wallet_address: self.treasury_wallet.clone(),
            price_per_call: self.price.as_decimal(),
            accepted_tokens: registration.accepted_tokens.clone(),
            capabilities: registration.capabilities.clone(),
            tags: registration.tags.clone(),
        })
    }
}

/// Replaces `$VAR` and `${VAR}` with values from `lookup`.
///
/// Unresolved references are left as written.
pub fn expand_env_vars(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    ENV_VAR
        .replace_all(input, |caps: &Captures<'_>| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map_or("", |m| m.as_str());
            lookup(name).unwrap_or_else(|| caps[0].to_owned())
        })
        .into_owned()
}
