//! Known Solana clusters.
//!
//! Challenges name their network by cluster (`"devnet"`, `"mainnet-beta"`,
//! `"testnet"`). [`SolanaNetwork`] maps those names to default RPC endpoints.
//! The prefixed forms some servers send (`"solana-devnet"`, `"solana-mainnet"`)
//! are accepted as aliases when parsing.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::UplError;

/// A Solana cluster the client can pay on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SolanaNetwork {
    /// Production cluster.
    #[serde(alias = "solana-mainnet", alias = "solana-mainnet-beta")]
    MainnetBeta,
    /// Developer cluster (default).
    #[default]
    #[serde(alias = "solana-devnet")]
    Devnet,
    /// Validator test cluster.
    #[serde(alias = "solana-testnet")]
    Testnet,
}

/// All known clusters.
pub const SOLANA_NETWORKS: &[SolanaNetwork] = &[
    SolanaNetwork::MainnetBeta,
    SolanaNetwork::Devnet,
    SolanaNetwork::Testnet,
];

impl SolanaNetwork {
    /// Cluster name as used on the wire.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::MainnetBeta => "mainnet-beta",
            Self::Devnet => "devnet",
            Self::Testnet => "testnet",
        }
    }

    /// Public RPC endpoint for the cluster.
    #[must_use]
    pub const fn rpc_url(&self) -> &'static str {
        match self {
            Self::MainnetBeta => "https://api.mainnet-beta.solana.com",
            Self::Devnet => "https://api.devnet.solana.com",
            Self::Testnet => "https://api.testnet.solana.com",
        }
    }
}

impl Display for SolanaNetwork {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SolanaNetwork {
    type Err = UplError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cluster = match s {
            "solana-mainnet" => "mainnet-beta",
            other => other.strip_prefix("solana-").unwrap_or(other),
        };
        SOLANA_NETWORKS
            .iter()
            .find(|n| n.name() == cluster)
            .copied()
            .ok_or_else(|| UplError::validation(format!("unsupported network: {s}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_names_round_trip() {
        for network in SOLANA_NETWORKS {
            assert_eq!(network.name().parse::<SolanaNetwork>().unwrap(), *network);
        }
    }

    #[test]
    fn test_prefixed_aliases_map_to_clusters() {
        let cases = [
            ("solana-devnet", SolanaNetwork::Devnet),
            ("solana-testnet", SolanaNetwork::Testnet),
            ("solana-mainnet", SolanaNetwork::MainnetBeta),
            ("solana-mainnet-beta", SolanaNetwork::MainnetBeta),
        ];
        for (name, expected) in cases {
            assert_eq!(name.parse::<SolanaNetwork>().unwrap(), expected, "{name}");
            let json = format!("\"{name}\"");
            assert_eq!(serde_json::from_str::<SolanaNetwork>(&json).unwrap(), expected);
        }
        assert_eq!(
            "solana-devnet".parse::<SolanaNetwork>().unwrap().to_string(),
            "devnet"
        );
    }

    #[test]
    fn test_unknown_network_is_validation_error() {
        for name in ["base-sepolia", "solana-", "solana-localnet"] {
            let err = name.parse::<SolanaNetwork>().unwrap_err();
            assert!(matches!(err, UplError::Validation(_)));
        }
    }

    #[test]
    fn test_serde_uses_cluster_names() {
        let json = serde_json::to_string(&SolanaNetwork::MainnetBeta).unwrap();
        assert_eq!(json, "\"mainnet-beta\"");
        assert_eq!(SolanaNetwork::default().rpc_url(), "https://api.devnet.solana.com");
    }
}
