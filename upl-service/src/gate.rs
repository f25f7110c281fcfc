//! Tower middleware that puts a price on the routes it wraps.
//!
//! A request without an `X-Payment` header is answered with `402 Payment
//! Required` and a JSON [`PaymentRequirement`]. A request carrying a proof is
//! checked against the configured price, treasury, asset and network, then
//! forwarded with the decoded [`PaymentProof`] in its extensions.
//!
//! Proofs are matched against the requirement and de-duplicated by signature.
//! A proof is only honored within [`CHALLENGE_TIMEOUT_MS`] of its timestamp,
//! so signatures are remembered for that long and then forgotten. The
//! transfer itself is not looked up on chain.

use std::collections::{BTreeMap, HashSet};
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use axum::Json;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rand::RngExt;
use serde_json::json;
use tower::{Layer, Service};
use upl::amount::Amount;
use upl::networks::SolanaNetwork;
use upl::proto::{PaymentProof, PaymentRequirement, SOLANA_SCHEME};
use upl::timestamp::UnixTimestamp;
use upl_http::constants::X_PAYMENT_HEADER;

use crate::error::ServiceError;

/// Validity window advertised in challenges, in milliseconds.
pub const CHALLENGE_TIMEOUT_MS: u64 = 120_000;

/// How far in the future a proof timestamp may lie, in seconds.
pub const PROOF_CLOCK_SKEW_SECS: u64 = 30;

/// Price and payee of a gated route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceTag {
    /// Cluster payments must land on.
    pub network: SolanaNetwork,
    /// Asset identifier clients must pay in.
    pub asset: String,
    /// Treasury wallet.
    pub pay_to: String,
    /// Minimum amount per call.
    pub amount: Amount,
    /// Human-readable description included in challenges.
    pub description: String,
}

impl PriceTag {
    /// A fresh challenge for `resource`.
    #[must_use]
    pub fn challenge(&self, resource: &str) -> PaymentRequirement {
        PaymentRequirement {
            scheme: SOLANA_SCHEME.to_owned(),
            network: self.network.name().to_owned(),
            asset: self.asset.clone(),
            pay_to: self.pay_to.clone(),
            amount: self.amount,
            timeout: CHALLENGE_TIMEOUT_MS,
            nonce: Some(hex::encode(rand::rng().random::<[u8; 12]>())),
            metadata: Some(json!({
                "description": self.description,
                "resource": resource,
            })),
        }
    }

    /// Checks that `proof` pays this price.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when it does not.
    pub fn check(&self, proof: &PaymentProof) -> Result<(), String> {
        if proof.signature.is_empty() {
            return Err("proof has no signature".to_owned());
        }
        if proof.network.parse::<SolanaNetwork>().ok() != Some(self.network) {
            return Err(format!("expected network {}, got {}", self.network, proof.network));
        }
        if proof.asset != self.asset {
            return Err(format!("expected asset {}, got {}", self.asset, proof.asset));
        }
        if proof.to != self.pay_to {
            return Err(format!("payment sent to {}, not the treasury", proof.to));
        }
        if proof.amount < self.amount {
            return Err(format!("paid {}, price is {}", proof.amount, self.amount));
        }
        Ok(())
    }
}

/// Signatures of accepted proofs, kept until the proofs go stale.
#[derive(Debug, Default)]
struct ReplayGuard {
    seen: HashSet<String>,
    by_expiry: BTreeMap<u64, Vec<String>>,
}

impl ReplayGuard {
    const WINDOW_SECS: u64 = CHALLENGE_TIMEOUT_MS / 1000;

    /// Accepts `proof` once, provided its timestamp is recent at `now`.
    fn admit(&mut self, proof: &PaymentProof, now: UnixTimestamp) -> Result<(), &'static str> {
        let now = now.as_secs();
        let issued = proof.timestamp.as_secs();
        if issued > now.saturating_add(PROOF_CLOCK_SKEW_SECS) {
            return Err("payment proof timestamp is in the future");
        }
        let expires = issued.saturating_add(Self::WINDOW_SECS);
        if expires < now {
            return Err("payment proof expired");
        }
        self.forget_before(now);
        if !self.seen.insert(proof.signature.clone()) {
            return Err("payment proof already used");
        }
        self.by_expiry
            .entry(expires)
            .or_default()
            .push(proof.signature.clone());
        Ok(())
    }

    fn forget_before(&mut self, now: u64) {
        let live = self.by_expiry.split_off(&now);
        for signature in std::mem::replace(&mut self.by_expiry, live)
            .into_values()
            .flatten()
        {
            self.seen.remove(&signature);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.seen.len()
    }
}

/// Layer producing [`PaymentGateService`].
#[derive(Debug, Clone)]
pub struct PaymentGateLayer {
    price: Arc<PriceTag>,
    seen: Arc<Mutex<ReplayGuard>>,
}

impl PaymentGateLayer {
    /// Gates routes behind `price`.
    #[must_use]
    pub fn new(price: PriceTag) -> Self {
        Self {
            price: Arc::new(price),
            seen: Arc::default(),
        }
    }
}

impl<S> Layer<S> for PaymentGateLayer {
    type Service = PaymentGateService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        PaymentGateService {
            price: Arc::clone(&self.price),
            seen: Arc::clone(&self.seen),
            inner,
        }
    }
}

/// Service answering unpaid requests with 402.
#[derive(Debug, Clone)]
pub struct PaymentGateService<S> {
    price: Arc<PriceTag>,
    seen: Arc<Mutex<ReplayGuard>>,
    inner: S,
}

impl<S> Service<Request> for PaymentGateService<S>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        // The readied service handles this request; the clone waits for the next one.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let price = Arc::clone(&self.price);
        let seen = Arc::clone(&self.seen);

        Box::pin(async move {
            let Some(header) = req.headers().get(X_PAYMENT_HEADER) else {
                let challenge = price.challenge(req.uri().path());
                tracing::debug!(resource = %req.uri().path(), "issuing payment challenge");
                return Ok(payment_required(&challenge));
            };

            let decoded = match header.to_str() {
                Ok(value) => PaymentProof::decode(value).map_err(ServiceError::from),
                Err(_) => return Ok(bad_request("X-Payment is not ASCII")),
            };
            let proof = match decoded {
                Ok(proof) => proof,
                Err(err) => return Ok(err.into_response()),
            };

            if let Err(reason) = price.check(&proof) {
                return Ok(rejected(&price, req.uri().path(), &reason));
            }
            let admitted = seen
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .admit(&proof, UnixTimestamp::now());
            if let Err(reason) = admitted {
                return Ok(rejected(&price, req.uri().path(), reason));
            }

            tracing::info!(
                signature = %proof.signature,
                from = %proof.from,
                amount = %proof.amount,
                "payment accepted"
            );
            req.extensions_mut().insert(proof);
            inner.call(req).await
        })
    }
}

fn payment_required(requirement: &PaymentRequirement) -> Response {
    (StatusCode::PAYMENT_REQUIRED, Json(requirement)).into_response()
}

fn rejected(price: &PriceTag, resource: &str, reason: &str) -> Response {
    let mut challenge = price.challenge(resource);
    if let Some(serde_json::Value::Object(metadata)) = challenge.metadata.as_mut() {
        metadata.insert("error".to_owned(), json!(reason));
    }
    tracing::warn!(reason, "payment proof rejected");
    payment_required(&challenge)
}

fn bad_request(reason: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": format!("malformed payment proof: {reason}") })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TREASURY: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";

    fn price() -> PriceTag {
        PriceTag {
            network: SolanaNetwork::Devnet,
            asset: "CASH".to_owned(),
            pay_to: TREASURY.to_owned(),
            amount: Amount::parse("0.01").unwrap(),
            description: "echo".to_owned(),
        }
    }

    fn proof() -> PaymentProof {
        PaymentProof::for_requirement(
            &price().challenge("/api/echo"),
            "5sig",
            "payer",
            UnixTimestamp::from_secs(1_700_000_000),
        )
    }

    #[test]
    fn test_challenge_shape() {
        let challenge = price().challenge("/api/echo");
        assert_eq!(challenge.scheme, "solana");
        assert_eq!(challenge.network, "devnet");
        assert_eq!(challenge.pay_to, TREASURY);
        assert_eq!(challenge.timeout, 120_000);
        let nonce = challenge.nonce.unwrap();
        assert_eq!(nonce.len(), 24);
        assert!(nonce.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(challenge.metadata.unwrap()["resource"], "/api/echo");
    }

    #[test]
    fn test_nonces_differ() {
        let a = price().challenge("/x").nonce;
        let b = price().challenge("/x").nonce;
        assert_ne!(a, b);
    }

    #[test]
    fn test_check_accepts_matching_proof() {
        assert!(price().check(&proof()).is_ok());
        let mut overpaid = proof();
        overpaid.amount = Amount::parse("1").unwrap();
        assert!(price().check(&overpaid).is_ok());
    }

    #[test]
    fn test_check_rejects_mismatches() {
        let price = price();

        let mut underpaid = proof();
        underpaid.amount = Amount::parse("0.001").unwrap();
        assert!(price.check(&underpaid).unwrap_err().contains("price is 0.01"));

        let mut elsewhere = proof();
        elsewhere.to = "someone-else".to_owned();
        assert!(price.check(&elsewhere).is_err());

        let mut other_asset = proof();
        other_asset.asset = "SOL".to_owned();
        assert!(price.check(&other_asset).is_err());

        let mut other_network = proof();
        other_network.network = "mainnet-beta".to_owned();
        assert!(price.check(&other_network).is_err());
    }

    #[test]
    fn test_check_accepts_prefixed_network() {
        let mut prefixed = proof();
        prefixed.network = "solana-devnet".to_owned();
        assert!(price().check(&prefixed).is_ok());
    }

    fn signed(signature: &str, at: u64) -> PaymentProof {
        let mut proof = proof();
        proof.signature = signature.to_owned();
        proof.timestamp = UnixTimestamp::from_secs(at);
        proof
    }

    #[test]
    fn test_replay_guard_rejects_reuse_within_window() {
        let mut guard = ReplayGuard::default();
        let now = UnixTimestamp::from_secs(1_000_000);
        assert_eq!(guard.admit(&signed("a", 1_000_000), now), Ok(()));
        assert_eq!(
            guard.admit(&signed("a", 1_000_000), now + 60),
            Err("payment proof already used")
        );
        assert_eq!(guard.admit(&signed("b", 1_000_000), now + 60), Ok(()));
    }

    #[test]
    fn test_replay_guard_forgets_stale_signatures() {
        let mut guard = ReplayGuard::default();
        let start = 1_000_000;
        for n in 0..100 {
            let proof = signed(&format!("sig-{n}"), start + n);
            guard.admit(&proof, UnixTimestamp::from_secs(start + n)).unwrap();
        }
        assert_eq!(guard.len(), 100);

        let later = UnixTimestamp::from_secs(start + 1_000);
        assert_eq!(guard.admit(&signed("fresh", start + 1_000), later), Ok(()));
        assert_eq!(guard.len(), 1);
        assert_eq!(
            guard.admit(&signed("sig-0", start), later),
            Err("payment proof expired")
        );
        assert_eq!(guard.len(), 1);
    }

    #[test]
    fn test_replay_guard_rejects_future_proofs() {
        let mut guard = ReplayGuard::default();
        let now = UnixTimestamp::from_secs(1_000_000);
        assert_eq!(
            guard.admit(&signed("x", 1_000_000 + PROOF_CLOCK_SKEW_SECS + 1), now),
            Err("payment proof timestamp is in the future")
        );
        assert_eq!(guard.admit(&signed("y", 1_000_000 + PROOF_CLOCK_SKEW_SECS), now), Ok(()));
        assert_eq!(guard.len(), 1);
    }
}
