//! HTTP client that settles `402 Payment Required` challenges on Solana.
//!
//! [`PaymentClient`] sends the caller's request. When the server answers
//! with 402 it decodes the [`PaymentRequirement`], checks the hourly budget,
//! pays through its [`ChainPayer`], and reissues the request exactly once
//! with the proof in the `X-Payment` header.

use std::time::Duration;

use http::{HeaderName, HeaderValue, Method, StatusCode};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use solana_keypair::Keypair;
use tokio_util::sync::CancellationToken;
#[cfg(feature = "telemetry")]
use tracing::instrument;
use upl::amount::Amount;
use upl::budget::Budget;
use upl::ledger::{Direction, NewPayment, PaymentMetrics, PaymentRecord};
use upl::proto::{NATIVE_ASSET, PaymentProof, PaymentRequirement};
use upl::state::{PaymentState, SharedPaymentState};
use upl::timestamp::UnixTimestamp;
use upl::UplError;
use upl_svm::chain::Address;
use upl_svm::chain::rpc::RpcClientLike;
use upl_svm::{ChainPayer, TransactionBuilder};
use url::Url;

use crate::config::ClientConfig;
use crate::constants::{HTTP_STATUS_PAYMENT_REQUIRED, X_PAYMENT_HEADER};
use crate::headers::{decode_payment_requirement, encode_x_payment};

/// Pays for HTTP resources guarded by x402 challenges.
///
/// # Concurrency
///
/// The budget check and the spend it admits are taken under one lock, but
/// the lock is released before the transfer is submitted. Callers that share
/// a client (or a [`SharedPaymentState`]) between tasks and need an exact
/// hourly cap must serialize their `get`/`post` calls themselves.
pub struct PaymentClient<P = TransactionBuilder> {
    http: Client,
    payer: P,
    state: SharedPaymentState,
    timeout: Option<Duration>,
}

impl<P: ChainPayer> std::fmt::Debug for PaymentClient<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentClient")
            .field("wallet", &self.payer.wallet_address())
            .field("state", &self.state)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl PaymentClient<TransactionBuilder> {
    /// Creates a client paying from `keypair` on the configured cluster.
    #[must_use]
    pub fn from_config(config: &ClientConfig, keypair: Keypair) -> Self {
        let payer =
            TransactionBuilder::with_rpc_url(config.network, config.effective_rpc_url(), keypair);
        Self::new(payer)
            .with_state(PaymentState::new(config.spending_limit()).shared())
            .with_timeout(config.timeout)
    }
}

impl<R: RpcClientLike> PaymentClient<TransactionBuilder<R>> {
    /// SOL payments of the paying wallet as recorded on chain, newest first.
    ///
    /// Unlike [`history`](Self::history) this reads the chain, so it also
    /// covers payments made by other clients of the same wallet. `0` returns
    /// every record found.
    ///
    /// # Errors
    ///
    /// Returns [`UplError::PaymentFailed`] if the signature listing fails and
    /// [`UplError::Cancelled`] if `cancel` fires first.
    pub async fn fetch_payment_history(
        &self,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<PaymentRecord>, UplError> {
        Ok(self.payer.fetch_payment_history(limit, cancel).await?)
    }
}

/// Response read in full, before interpretation.
struct Exchange {
    status: StatusCode,
    body: Vec<u8>,
}

impl<P: ChainPayer> PaymentClient<P> {
    /// Creates a client with an unlimited budget and an empty ledger.
    #[must_use]
    pub fn new(payer: P) -> Self {
        Self {
            http: Client::new(),
            payer,
            state: SharedPaymentState::default(),
            timeout: None,
        }
    }

    /// Uses `state` for budget and ledger, possibly shared with other clients.
    #[must_use]
    pub fn with_state(mut self, state: SharedPaymentState) -> Self {
        self.state = state;
        self
    }

    /// Sets a timeout for every HTTP request.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Replaces the underlying HTTP client.
    #[must_use]
    pub fn with_http_client(mut self, http: Client) -> Self {
        self.http = http;
        self
    }

    /// The chain payer.
    #[must_use]
    pub const fn payer(&self) -> &P {
        &self.payer
    }

    /// Handle to the budget and ledger state.
    #[must_use]
    pub const fn state(&self) -> &SharedPaymentState {
        &self.state
    }

    /// Sends `GET url?params`, paying once if challenged.
    ///
    /// # Errors
    ///
    /// See [`post`](Self::post).
    #[cfg_attr(feature = "telemetry", instrument(name = "upl.http.get", skip_all, fields(url = %url), err))]
    pub async fn get(
        &self,
        url: &str,
        params: &[(&str, &str)],
        cancel: &CancellationToken,
    ) -> Result<Value, UplError> {
        self.request::<()>(Method::GET, url, None, params, cancel)
            .await
    }

    /// Sends `POST url?params` with `body` as JSON, paying once if challenged.
    ///
    /// The body is serialized again for the paid retry.
    ///
    /// # Errors
    ///
    /// - [`UplError::Network`] for transport failures and statuses of 400 or above
    /// - [`UplError::InvalidResponse`] when a body cannot be decoded
    /// - [`UplError::Validation`] for a non-Solana challenge or a bad payee or amount
    /// - [`UplError::BudgetExceeded`] when the hourly budget cannot cover the challenge
    /// - [`UplError::InsufficientBalance`] and [`UplError::PaymentFailed`] from the transfer
    /// - [`UplError::PaymentNotAccepted`] when the paid request is answered with 402 again
    /// - [`UplError::Cancelled`] when `cancel` fires before funds move
    #[cfg_attr(feature = "telemetry", instrument(name = "upl.http.post", skip_all, fields(url = %url), err))]
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
        self.request(Method::POST, url, Some(body), params, cancel)
            .await
    }

    /// Base58 address of the paying wallet.
    #[must_use]
    pub fn wallet_address(&self) -> String {
        self.payer.wallet_address()
    }

    /// Ledger aggregates.
    #[must_use]
    pub fn metrics(&self) -> PaymentMetrics {
        self.state.lock().tracker.metrics()
    }

    /// Ledger records newest-first; `0` returns all of them.
    #[must_use]
    pub fn history(&self, limit: usize) -> Vec<PaymentRecord> {
        self.state.lock().tracker.history(limit)
    }

    /// Budget left in the current hour.
    #[must_use]
    pub fn remaining_budget(&self) -> Budget {
        self.state.lock().guard.remaining_budget()
    }

    /// Amount spent in the current hour.
    #[must_use]
    pub fn spent_this_hour(&self) -> Decimal {
        self.state.lock().guard.spent_this_hour()
    }

    /// Records SOL received from `from`. The budget is not affected.
    pub fn record_earnings(&self, amount: Amount, from: &str) {
        self.state.lock().tracker.track(NewPayment {
            signature: String::new(),
            amount: amount.as_decimal(),
            asset: NATIVE_ASSET.to_owned(),
            direction: Direction::Received,
            counterpart: from.to_owned(),
        });
    }

    /// Balance of `asset` held by the paying wallet.
    ///
    /// # Errors
    ///
    /// Returns [`UplError::Validation`] for an unknown asset,
    /// [`UplError::PaymentFailed`] if the RPC call fails and
    /// [`UplError::Cancelled`] if `cancel` fires first.
    pub async fn balance(
        &self,
        asset: &str,
        cancel: &CancellationToken,
    ) -> Result<Decimal, UplError> {
        cancel
            .run_until_cancelled(self.payer.balance(asset))
            .await
            .ok_or(UplError::Cancelled)?
            .map_err(UplError::from)
    }

    async fn request<B>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
        params: &[(&str, &str)],
        cancel: &CancellationToken,
    ) -> Result<Value, UplError>
    where
        B: Serialize + Sync + ?Sized,
    {
        let url = Url::parse(url)
            .map_err(|e| UplError::validation(format!("invalid URL {url:?}: {e}")))?;

        let first = self
            .exchange(&method, &url, body, params, None, cancel)
            .await?;
        if first.status.as_u16() != HTTP_STATUS_PAYMENT_REQUIRED {
            return decode_body(first);
        }

        let requirement = decode_payment_requirement(&first.body)?;
        let proof = self.settle(&requirement, cancel).await?;
        let header = encode_x_payment(&proof)?;

        let retried = self
            .exchange(&method, &url, body, params, Some(header), cancel)
            .await
            .map_err(|err| after_payment(err, &proof.signature))?;
        if retried.status.as_u16() == HTTP_STATUS_PAYMENT_REQUIRED {
            #[cfg(feature = "telemetry")]
            tracing::warn!(signature = %proof.signature, "Paid request answered with 402");
            return Err(UplError::PaymentNotAccepted {
                signature: proof.signature,
            });
        }
        decode_body(retried)
    }

    /// Checks the challenge and the budget, pays, and builds the proof.
    ///
    /// Budget is only reserved for challenges the payer accepts in preflight.
    async fn settle(
        &self,
        requirement: &PaymentRequirement,
        cancel: &CancellationToken,
    ) -> Result<PaymentProof, UplError> {
        if !requirement.is_solana() {
            return Err(UplError::validation(format!(
                "unsupported payment scheme: {}",
                requirement.scheme
            )));
        }
        requirement.pay_to.parse::<Address>()?;
        if requirement.amount.is_zero() {
            return Err(UplError::validation("payment amount must be positive"));
        }
        self.payer.preflight(requirement)?;
        let amount = requirement.amount.as_decimal();

        {
            let mut state = self.state.lock();
            if let Budget::Remaining(remaining) = state.guard.remaining_budget() {
                if amount > remaining {
                    return Err(UplError::BudgetExceeded {
                        requested: amount,
                        remaining,
                    });
                }
            }
            state.guard.track(amount);
        }

        #[cfg(feature = "telemetry")]
        tracing::info!(
            amount = %requirement.amount,
            asset = %requirement.asset,
            pay_to = %requirement.pay_to,
            "Paying x402 challenge"
        );

        let signature = self.payer.pay(requirement, cancel).await?;

        self.state.lock().tracker.track(NewPayment {
            signature: signature.clone(),
            amount,
            asset: requirement.asset.clone(),
            direction: Direction::Sent,
            counterpart: requirement.pay_to.clone(),
        });

        #[cfg(feature = "telemetry")]
        tracing::info!(signature = %signature, "Payment confirmed");

        Ok(PaymentProof::for_requirement(
            requirement,
            signature,
            self.payer.wallet_address(),
            UnixTimestamp::now(),
        ))
    }

    async fn exchange<B>(
        &self,
        method: &Method,
        url: &Url,
        body: Option<&B>,
        params: &[(&str, &str)],
        payment: Option<HeaderValue>,
        cancel: &CancellationToken,
    ) -> Result<Exchange, UplError>
    where
        B: Serialize + Sync + ?Sized,
    {
        let mut url = url.clone();
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }
        let mut req = self.http.request(method.clone(), url);
        if let Some(body) = body {
            req = req.json(body);
        }
        if let Some(payment) = payment {
            req = req.header(HeaderName::from_static(X_PAYMENT_HEADER), payment);
        }
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let exchange = async {
            let response = req.send().await.map_err(UplError::transport)?;
            let status = response.status();
            let body = response.bytes().await.map_err(UplError::transport)?;
            Ok(Exchange {
                status,
                body: body.to_vec(),
            })
        };
        cancel
            .run_until_cancelled(exchange)
            .await
            .unwrap_or(Err(UplError::Cancelled))
    }
}

/// Interprets a response that is not a 402 challenge.
fn decode_body(exchange: Exchange) -> Result<Value, UplError> {
    if exchange.status.as_u16() >= 400 {
        return Err(UplError::http_status(
            exchange.status.as_u16(),
            String::from_utf8_lossy(&exchange.body),
        ));
    }
    if exchange.body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&exchange.body).map_err(UplError::invalid_response)
}

/// Funds have moved; a cancellation now must not read as "nothing happened".
fn after_payment(err: UplError, signature: &str) -> UplError {
    match err {
        UplError::Cancelled => UplError::PaymentFailed {
            signature: Some(signature.to_owned()),
            reason: "cancelled after payment; the paid request was not completed".to_owned(),
            source: None,
        },
        other => other,
    }
}
