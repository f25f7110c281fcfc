//! Agent identity, registration filters and TAP client configuration.

use serde::{Deserialize, Serialize};
use upl::amount::Amount;

use crate::signature::SignatureAlgorithm;

/// A registered agent as known to the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentIdentity {
    /// Decentralised identifier of the agent.
    pub did: String,
    /// Visa Trusted Agent Protocol certificate reference.
    pub visa_tap_cert: String,
    /// Wallet the agent pays from.
    pub wallet_address: String,
    /// Registry reputation, when the registry reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reputation_score: Option<f64>,
}

/// Body of `POST /agents/register`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRegistration {
    /// Agent DID.
    pub did: String,
    /// Agent wallet address.
    pub wallet_address: String,
    /// TAP certificate reference.
    pub visa_tap_cert: String,
    /// Base64 public key matching the signing key.
    pub public_key: String,
    /// Signing algorithm.
    pub algorithm: SignatureAlgorithm,
    /// Stake pledged with the registration.
    pub stake: Amount,
}

/// Filters for `GET /agents/discover`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentFilters {
    /// Agent category.
    pub category: Option<String>,
    /// Minimum reputation score.
    pub min_reputation: Option<f64>,
    /// Only verified agents.
    pub verified: Option<bool>,
}

impl AgentFilters {
    /// Query pairs in registry order, skipping unset filters.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(category) = &self.category {
            pairs.push(("category", category.clone()));
        }
        if let Some(min) = self.min_reputation {
            pairs.push(("minReputation", format!("{min:.2}")));
        }
        if let Some(verified) = self.verified {
            pairs.push(("verified", verified.to_string()));
        }
        pairs
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RegisterAgentResponse {
    pub agent: AgentIdentity,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DiscoverAgentsResponse {
    pub agents: Vec<AgentIdentity>,
}
