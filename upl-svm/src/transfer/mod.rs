//! Building, signing, submitting and confirming payment transfers.
//!
//! [`TransactionBuilder`] turns a [`PaymentRequirement`] into a finalized
//! on-chain transfer and returns its base58 signature. Native SOL goes
//! through a System `Transfer`; tokens go through `TransferChecked` on the
//! mint's own token program, creating the payee's associated token account
//! first when it does not exist.
//!
//! Every transaction is submitted with preflight simulation enabled and then
//! polled until it is finalized. A submitted transaction is never resent.

pub mod instructions;
pub mod mint;
pub mod transaction;

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_commitment_config::{CommitmentConfig, CommitmentLevel};
use solana_instruction::Instruction;
use solana_keypair::Keypair;
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use solana_signer::Signer;
use tokio_util::sync::CancellationToken;
#[cfg(feature = "telemetry")]
use tracing::instrument;
use upl::amount::Amount;
use upl::ledger::{Direction, PaymentRecord};
use upl::networks::SolanaNetwork;
use upl::proto::{NATIVE_ASSET, PaymentRequirement};
use upl::timestamp::UnixTimestamp;

use crate::chain::Address;
use crate::chain::rpc::RpcClientLike;
use crate::error::SvmError;
use instructions::{create_associated_token_account_idempotent, system_transfer};
use mint::{Asset, Mint, NATIVE_DECIMALS, associated_token_address, token_account_amount};
use transaction::TransactionInt;

/// Default time to wait for a submitted transaction to finalize.
pub const DEFAULT_CONFIRM_TIMEOUT: Duration = Duration::from_secs(60);

/// Interval between confirmation polls.
pub const CONFIRM_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Signatures scanned by [`TransactionBuilder::fetch_payment_history`], the RPC maximum.
pub const HISTORY_SCAN_LIMIT: usize = 1000;

/// Something that can settle a payment requirement on chain.
///
/// [`TransactionBuilder`] is the production implementation; tests of the
/// HTTP layer substitute an in-memory payer.
pub trait ChainPayer: Send + Sync {
    /// Base58 address of the paying wallet.
    fn wallet_address(&self) -> String;

    /// Rejects a requirement this payer could never settle, without any chain call.
    ///
    /// Callers run this before reserving budget for the payment.
    ///
    /// # Errors
    ///
    /// Returns [`SvmError::Validation`] describing the first problem found.
    fn preflight(&self, requirement: &PaymentRequirement) -> Result<(), SvmError>;

    /// Pays `requirement` and returns the base58 transaction signature once finalized.
    fn pay(
        &self,
        requirement: &PaymentRequirement,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<String, SvmError>> + Send;

    /// Balance of `asset` held by the paying wallet, in whole units.
    fn balance(&self, asset: &str) -> impl Future<Output = Result<Decimal, SvmError>> + Send;
}

/// Builds and submits Solana payment transactions for one wallet.
pub struct TransactionBuilder<R = RpcClient> {
    rpc: R,
    keypair: Arc<Keypair>,
    network: SolanaNetwork,
    confirm_timeout: Duration,
}

impl<R> std::fmt::Debug for TransactionBuilder<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionBuilder")
            .field("wallet", &self.keypair.pubkey())
            .field("network", &self.network)
            .field("confirm_timeout", &self.confirm_timeout)
            .finish_non_exhaustive()
    }
}

impl TransactionBuilder<RpcClient> {
    /// Creates a builder talking to the public RPC endpoint of `network`.
    #[must_use]
    pub fn for_network(network: SolanaNetwork, keypair: Keypair) -> Self {
        Self::with_rpc_url(network, network.rpc_url(), keypair)
    }

    /// Creates a builder talking to a custom RPC endpoint.
    #[must_use]
    pub fn with_rpc_url(network: SolanaNetwork, rpc_url: &str, keypair: Keypair) -> Self {
        let rpc = RpcClient::new_with_commitment(rpc_url.to_owned(), CommitmentConfig::confirmed());
        Self::new(rpc, keypair, network)
    }
}

impl<R: RpcClientLike> TransactionBuilder<R> {
    /// Creates a builder over an RPC client.
    #[must_use]
    pub fn new(rpc: R, keypair: Keypair, network: SolanaNetwork) -> Self {
        Self {
            rpc,
            keypair: Arc::new(keypair),
            network,
            confirm_timeout: DEFAULT_CONFIRM_TIMEOUT,
        }
    }

    /// Sets how long to wait for finalization after submission.
    #[must_use]
    pub const fn with_confirm_timeout(mut self, timeout: Duration) -> Self {
        self.confirm_timeout = timeout;
        self
    }

    /// Public key of the paying wallet.
    #[must_use]
    pub fn wallet_pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    /// Cluster this builder pays on.
    #[must_use]
    pub const fn network(&self) -> SolanaNetwork {
        self.network
    }

    /// Transfers `amount` SOL to `payee`.
    ///
    /// # Errors
    ///
    /// Returns [`SvmError::Validation`] for a bad payee or amount (before any
    /// RPC call), [`SvmError::Rpc`] if a pre-submission call fails,
    /// [`SvmError::Cancelled`] if `cancel` fires before submission and
    /// [`SvmError::Unconfirmed`] if finality is not observed.
    #[cfg_attr(feature = "telemetry", instrument(name = "upl.svm.native", skip_all, fields(payee = %payee, amount = %amount)))]
    pub async fn send_native_payment(
        &self,
        payee: &str,
        amount: Amount,
        cancel: &CancellationToken,
    ) -> Result<String, SvmError> {
        let payee: Address = payee.parse()?;
        let lamports = positive_base_units(amount, NATIVE_DECIMALS)?;
        let payer = self.keypair.pubkey();
        let ix = system_transfer(&payer, payee.pubkey(), lamports);
        self.sign_and_submit(vec![ix], cancel).await
    }

    /// Transfers `amount` of the token `mint` to `payee`.
    ///
    /// `mint` is a base58 mint address or a known symbol such as `CASH`.
    ///
    /// # Errors
    ///
    /// Same as [`send_native_payment`](Self::send_native_payment).
    #[cfg_attr(feature = "telemetry", instrument(name = "upl.svm.token", skip_all, fields(payee = %payee, mint = %mint, amount = %amount)))]
    pub async fn send_token_payment(
        &self,
        payee: &str,
        mint: &str,
        amount: Amount,
        cancel: &CancellationToken,
    ) -> Result<String, SvmError> {
        let payee: Address = payee.parse()?;
        let (mint_address, fallback) = self.resolve_token(mint)?;
        if amount.is_zero() {
            return Err(SvmError::Validation("amount must be positive".to_string()));
        }
        let mint_info = until_cancelled(cancel, self.fetch_mint(&mint_address, fallback)).await??;
        let units = positive_base_units(amount, mint_info.decimals())?;

        let payer = self.keypair.pubkey();
        let token_program = *mint_info.token_program();
        let source_ata = associated_token_address(&payer, mint_address.pubkey(), &token_program);
        let destination_ata =
            associated_token_address(payee.pubkey(), mint_address.pubkey(), &token_program);

        let destination = until_cancelled(
            cancel,
            self.rpc
                .get_account(&destination_ata, CommitmentConfig::confirmed()),
        )
        .await?
        .map_err(|e| SvmError::rpc("get_account", e))?;

        let mut ixs = Vec::with_capacity(2);
        if destination.is_none() {
            ixs.push(create_associated_token_account_idempotent(
                &payer,
                &destination_ata,
                payee.pubkey(),
                mint_address.pubkey(),
                &token_program,
            ));
        }
        ixs.push(transfer_checked(
            &mint_info,
            &source_ata,
            mint_address.pubkey(),
            &destination_ata,
            &payer,
            units,
        )?);
        self.sign_and_submit(ixs, cancel).await
    }

    /// Balance of `asset` held by the paying wallet.
    ///
    /// A missing token account reads as zero.
    ///
    /// # Errors
    ///
    /// Returns [`SvmError::Validation`] for an unknown asset and
    /// [`SvmError::Rpc`] if the account cannot be read.
    pub async fn get_balance(&self, asset: &str) -> Result<Decimal, SvmError> {
        let owner = self.keypair.pubkey();
        match Asset::resolve(asset, self.network)? {
            Asset::Native => {
                let lamports = self
                    .rpc
                    .get_balance(&owner, CommitmentConfig::confirmed())
                    .await
                    .map_err(|e| SvmError::rpc("get_balance", e))?;
                Ok(Amount::from_base_units(lamports, NATIVE_DECIMALS).as_decimal())
            }
            Asset::Token { mint, fallback } => {
                let mint_info = self.fetch_mint(&mint, fallback).await?;
                let ata = associated_token_address(&owner, mint.pubkey(), mint_info.token_program());
                let units = self
                    .rpc
                    .get_account(&ata, CommitmentConfig::confirmed())
                    .await
                    .map_err(|e| SvmError::rpc("get_account", e))?
                    .map_or(0, |account| token_account_amount(&account.data));
                Ok(Amount::from_base_units(units, mint_info.decimals()).as_decimal())
            }
        }
    }

    /// Checks a requirement against this wallet without touching the chain.
    ///
    /// The network must name this builder's cluster, the payee must be a
    /// valid address, the asset must resolve and the amount must be positive.
    /// SOL amounts must also fit in whole lamports; token precision is
    /// checked once the mint account has been read.
    ///
    /// # Errors
    ///
    /// Returns [`SvmError::Validation`] describing the first problem found.
    pub fn preflight(&self, requirement: &PaymentRequirement) -> Result<(), SvmError> {
        let network: SolanaNetwork = requirement
            .network
            .parse()
            .map_err(|e: upl::UplError| SvmError::Validation(e.to_string()))?;
        if network != self.network {
            return Err(SvmError::Validation(format!(
                "requirement is for {network}, wallet is on {}",
                self.network
            )));
        }
        requirement.pay_to.parse::<Address>()?;
        match Asset::resolve(&requirement.asset, self.network)? {
            Asset::Native => {
                positive_base_units(requirement.amount, NATIVE_DECIMALS)?;
            }
            Asset::Token { .. } if requirement.amount.is_zero() => {
                return Err(SvmError::Validation("amount must be positive".to_string()));
            }
            Asset::Token { .. } => {}
        }
        Ok(())
    }

    /// Pays a requirement after checking the wallet can cover it.
    ///
    /// # Errors
    ///
    /// Returns [`SvmError::InsufficientBalance`] when the wallet holds less
    /// than the requirement, plus everything the send methods return.
    #[cfg_attr(feature = "telemetry", instrument(name = "upl.svm.pay", skip_all, fields(asset = %requirement.asset, amount = %requirement.amount)))]
    pub async fn pay(
        &self,
        requirement: &PaymentRequirement,
        cancel: &CancellationToken,
    ) -> Result<String, SvmError> {
        self.preflight(requirement)?;
        let available = until_cancelled(cancel, self.get_balance(&requirement.asset)).await??;
        let required = requirement.amount.as_decimal();
        if available < required {
            return Err(SvmError::InsufficientBalance {
                asset: requirement.asset.clone(),
                required,
                available,
            });
        }
        if requirement.is_native() {
            self.send_native_payment(&requirement.pay_to, requirement.amount, cancel)
                .await
        } else {
            self.send_token_payment(
                &requirement.pay_to,
                &requirement.asset,
                requirement.amount,
                cancel,
            )
            .await
        }
    }

    /// Rebuilds SOL payment history from the chain, newest first.
    ///
    /// Scans the wallet's most recent [`HISTORY_SCAN_LIMIT`] signatures and
    /// turns each change in the wallet's lamport balance into a record: a
    /// decrease is [`Direction::Sent`], an increase [`Direction::Received`].
    /// Amounts include fees paid by the wallet. Transactions that cannot be
    /// fetched or carry no status metadata are skipped, as are those that
    /// left the balance unchanged. `limit` caps the number of records; `0`
    /// returns every record found. Records carry an empty `counterpart`.
    ///
    /// # Errors
    ///
    /// Returns [`SvmError::Rpc`] if the signature listing fails and
    /// [`SvmError::Cancelled`] if `cancel` fires first.
    #[cfg_attr(feature = "telemetry", instrument(name = "upl.svm.history", skip_all, fields(limit = limit)))]
    pub async fn fetch_payment_history(
        &self,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<PaymentRecord>, SvmError> {
        let wallet = self.keypair.pubkey();
        let entries = until_cancelled(
            cancel,
            self.rpc.get_signatures_for_address(
                &wallet,
                HISTORY_SCAN_LIMIT,
                CommitmentConfig::confirmed(),
            ),
        )
        .await?
        .map_err(|e| SvmError::rpc("get_signatures_for_address", e))?;

        let mut records = Vec::new();
        for entry in entries {
            if limit > 0 && records.len() >= limit {
                break;
            }
            let Ok(signature) = entry.signature.parse::<Signature>() else {
                continue;
            };
            let delta = match until_cancelled(
                cancel,
                self.rpc
                    .get_transaction_balances(&signature, CommitmentConfig::confirmed()),
            )
            .await?
            {
                Ok(Some(delta)) => delta,
                Ok(None) => continue,
                Err(_e) => {
                    #[cfg(feature = "telemetry")]
                    tracing::debug!(signature = %signature, error = %_e, "skipping unreadable transaction");
                    continue;
                }
            };
            let (direction, lamports) = match delta.post.cmp(&delta.pre) {
                std::cmp::Ordering::Equal => continue,
                std::cmp::Ordering::Less => (Direction::Sent, delta.pre - delta.post),
                std::cmp::Ordering::Greater => (Direction::Received, delta.post - delta.pre),
            };
            let timestamp = entry
                .block_time
                .and_then(|secs| u64::try_from(secs).ok())
                .map_or_else(UnixTimestamp::now, UnixTimestamp::from_secs);
            records.push(PaymentRecord {
                signature: entry.signature,
                timestamp,
                amount: Amount::from_base_units(lamports, NATIVE_DECIMALS).as_decimal(),
                asset: NATIVE_ASSET.to_owned(),
                direction,
                counterpart: String::new(),
            });
        }
        Ok(records)
    }

    fn resolve_token(&self, mint: &str) -> Result<(Address, Mint), SvmError> {
        match Asset::resolve(mint, self.network)? {
            Asset::Token { mint, fallback } => Ok((mint, fallback)),
            Asset::Native => Err(SvmError::Validation(
                "SOL is not a token mint".to_string(),
            )),
        }
    }

    /// Reads the mint account, falling back to `fallback` when it is unavailable.
    async fn fetch_mint(&self, mint: &Address, fallback: Mint) -> Result<Mint, SvmError> {
        match self
            .rpc
            .get_account(mint.pubkey(), CommitmentConfig::confirmed())
            .await
        {
            Ok(Some(account)) => Mint::from_account(&account, fallback.decimals()),
            Ok(None) => Ok(fallback),
            Err(_e) => {
                #[cfg(feature = "telemetry")]
                tracing::warn!(mint = %mint, error = %_e, "mint unavailable, using defaults");
                Ok(fallback)
            }
        }
    }

    async fn sign_and_submit(
        &self,
        instructions: Vec<Instruction>,
        cancel: &CancellationToken,
    ) -> Result<String, SvmError> {
        let payer = self.keypair.pubkey();
        let blockhash = until_cancelled(
            cancel,
            self.rpc
                .get_latest_blockhash(CommitmentConfig::finalized()),
        )
        .await?
        .map_err(|e| SvmError::rpc("get_latest_blockhash", e))?;

        let tx = TransactionInt::compile(&payer, &instructions, blockhash)?
            .sign_with_keypair(self.keypair.as_ref())?;

        if cancel.is_cancelled() {
            return Err(SvmError::Cancelled);
        }
        let config = RpcSendTransactionConfig {
            skip_preflight: false,
            preflight_commitment: Some(CommitmentLevel::Finalized),
            ..RpcSendTransactionConfig::default()
        };
        let signature = self
            .rpc
            .send_transaction(tx.inner(), config)
            .await
            .map_err(|e| SvmError::rpc("send_transaction", e))?;

        #[cfg(feature = "telemetry")]
        tracing::info!(signature = %signature, "transaction submitted");

        self.wait_finalized(&signature, cancel).await?;

        #[cfg(feature = "telemetry")]
        tracing::info!(signature = %signature, "transaction finalized");

        Ok(signature.to_string())
    }

    /// Polls until `signature` is finalized, the timeout passes or `cancel` fires.
    async fn wait_finalized(
        &self,
        signature: &Signature,
        cancel: &CancellationToken,
    ) -> Result<(), SvmError> {
        let unconfirmed = |reason: String| SvmError::Unconfirmed {
            signature: signature.to_string(),
            reason,
        };
        let poll = async {
            loop {
                match self
                    .rpc
                    .confirm_transaction(signature, CommitmentConfig::finalized())
                    .await
                {
                    Ok(true) => return Ok(()),
                    Ok(false) => {}
                    Err(e) => return Err(unconfirmed(format!("confirmation failed: {e}"))),
                }
                tokio::time::sleep(CONFIRM_POLL_INTERVAL).await;
            }
        };
        tokio::select! {
            result = tokio::time::timeout(self.confirm_timeout, poll) => {
                result.map_err(|_| unconfirmed(format!(
                    "not finalized within {}s",
                    self.confirm_timeout.as_secs()
                )))?
            }
            () = cancel.cancelled() => Err(unconfirmed("cancelled while awaiting confirmation".to_string())),
        }
    }
}

impl<R: RpcClientLike> ChainPayer for TransactionBuilder<R> {
    fn wallet_address(&self) -> String {
        self.keypair.pubkey().to_string()
    }

    fn preflight(&self, requirement: &PaymentRequirement) -> Result<(), SvmError> {
        Self::preflight(self, requirement)
    }

    fn pay(
        &self,
        requirement: &PaymentRequirement,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<String, SvmError>> + Send {
        Self::pay(self, requirement, cancel)
    }

    fn balance(&self, asset: &str) -> impl Future<Output = Result<Decimal, SvmError>> + Send {
        self.get_balance(asset)
    }
}

/// Runs `fut` unless `cancel` fires first.
async fn until_cancelled<F: Future>(
    cancel: &CancellationToken,
    fut: F,
) -> Result<F::Output, SvmError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(SvmError::Cancelled),
        out = fut => Ok(out),
    }
}

fn positive_base_units(amount: Amount, decimals: u8) -> Result<u64, SvmError> {
    let units = amount
        .to_base_units(decimals)
        .map_err(|e| SvmError::Validation(e.to_string()))?;
    if units == 0 {
        return Err(SvmError::Validation("amount must be positive".to_string()));
    }
    Ok(units)
}

fn transfer_checked(
    mint: &Mint,
    source: &Pubkey,
    mint_address: &Pubkey,
    destination: &Pubkey,
    authority: &Pubkey,
    amount: u64,
) -> Result<Instruction, SvmError> {
    match *mint {
        Mint::Token {
            decimals,
            token_program,
        } => spl_token::instruction::transfer_checked(
            &token_program,
            source,
            mint_address,
            destination,
            authority,
            &[],
            amount,
            decimals,
        )
        .map_err(|e| SvmError::Sign(format!("{e}"))),
        Mint::Token2022 {
            decimals,
            token_program,
        } => spl_token_2022::instruction::transfer_checked(
            &token_program,
            source,
            mint_address,
            destination,
            authority,
            &[],
            amount,
            decimals,
        )
        .map_err(|e| SvmError::Sign(format!("{e}"))),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use solana_account::Account;

    use super::*;
    use crate::testing::FakeRpc;
    use crate::transfer::mint::{ATA_PROGRAM_PUBKEY, MINT_DECIMALS_OFFSET};

    fn mint_account(owner: Pubkey, decimals: u8) -> Account {
        let mut data = vec![0u8; 82];
        data[MINT_DECIMALS_OFFSET] = decimals;
        Account {
            lamports: 1,
            data,
            owner,
            executable: false,
            rent_epoch: 0,
        }
    }

    fn token_account(owner: Pubkey, amount: u64) -> Account {
        let mut data = vec![0u8; 165];
        data[64..72].copy_from_slice(&amount.to_le_bytes());
        Account {
            lamports: 1,
            data,
            owner,
            executable: false,
            rent_epoch: 0,
        }
    }

    fn builder(rpc: Arc<FakeRpc>) -> TransactionBuilder<Arc<FakeRpc>> {
        TransactionBuilder::new(rpc, Keypair::new(), SolanaNetwork::Devnet)
    }

    fn requirement(asset: &str, amount: &str) -> PaymentRequirement {
        serde_json::from_value(serde_json::json!({
            "scheme": "solana",
            "network": "devnet",
            "asset": asset,
            "payTo": Pubkey::new_unique().to_string(),
            "amount": amount,
            "timeout": 120_000
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_native_payment_transfers_exact_lamports() {
        let rpc = Arc::new(FakeRpc::with_lamports(2_000_000_000));
        let builder = builder(Arc::clone(&rpc));
        let payee = Pubkey::new_unique();

        let signature = builder
            .send_native_payment(
                &payee.to_string(),
                Amount::parse("0.5").unwrap(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let sent = rpc.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(signature, sent[0].signatures[0].to_string());
        let message = &sent[0].message;
        let ix = &message.instructions()[0];
        assert_eq!(&ix.data[..4], &[2, 0, 0, 0]);
        assert_eq!(&ix.data[4..], &500_000_000u64.to_le_bytes());
        assert!(message.static_account_keys().contains(&payee));
    }

    #[tokio::test]
    async fn test_invalid_payee_makes_no_rpc_call() {
        let rpc = Arc::new(FakeRpc::with_lamports(1));
        let err = builder(Arc::clone(&rpc))
            .send_native_payment("nope", Amount::parse("1").unwrap(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SvmError::Validation(_)));
        assert!(rpc.sent().is_empty());
    }

    #[tokio::test]
    async fn test_sub_lamport_amount_is_rejected() {
        let rpc = Arc::new(FakeRpc::with_lamports(1));
        let err = builder(rpc)
            .send_native_payment(
                &Pubkey::new_unique().to_string(),
                Amount::parse("0.0000000001").unwrap(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SvmError::Validation(_)));
    }

    #[tokio::test]
    async fn test_token_payment_creates_missing_payee_ata() {
        let rpc = Arc::new(FakeRpc::default());
        let mint = Pubkey::new_unique();
        rpc.insert(mint, mint_account(spl_token::id(), 6));
        let builder = builder(Arc::clone(&rpc));

        builder
            .send_token_payment(
                &Pubkey::new_unique().to_string(),
                &mint.to_string(),
                Amount::parse("1.25").unwrap(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let sent = rpc.sent();
        let message = &sent[0].message;
        let keys = message.static_account_keys();
        let ixs = message.instructions();
        assert_eq!(ixs.len(), 2);
        assert_eq!(keys[ixs[0].program_id_index as usize], ATA_PROGRAM_PUBKEY);
        assert_eq!(keys[ixs[1].program_id_index as usize], spl_token::id());
        // TransferChecked: tag 12, amount, decimals
        assert_eq!(ixs[1].data[0], 12);
        assert_eq!(&ixs[1].data[1..9], &1_250_000u64.to_le_bytes());
        assert_eq!(ixs[1].data[9], 6);
    }

    #[tokio::test]
    async fn test_token_payment_skips_existing_ata_and_uses_token_2022() {
        let rpc = Arc::new(FakeRpc::default());
        let mint = Pubkey::new_unique();
        let payee = Pubkey::new_unique();
        rpc.insert(mint, mint_account(spl_token_2022::id(), 2));
        let ata = associated_token_address(&payee, &mint, &spl_token_2022::id());
        rpc.insert(ata, token_account(spl_token_2022::id(), 0));

        builder(Arc::clone(&rpc))
            .send_token_payment(
                &payee.to_string(),
                &mint.to_string(),
                Amount::parse("3").unwrap(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let sent = rpc.sent();
        let message = &sent[0].message;
        let ixs = message.instructions();
        assert_eq!(ixs.len(), 1);
        assert_eq!(
            message.static_account_keys()[ixs[0].program_id_index as usize],
            spl_token_2022::id()
        );
        assert_eq!(&ixs[0].data[1..9], &300u64.to_le_bytes());
    }

    #[tokio::test]
    async fn test_cash_alias_defaults_to_token_2022_when_mint_missing() {
        let rpc = Arc::new(FakeRpc::default());
        builder(Arc::clone(&rpc))
            .send_token_payment(
                &Pubkey::new_unique().to_string(),
                "CASH",
                Amount::parse("1").unwrap(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        let sent = rpc.sent();
        let message = &sent[0].message;
        let transfer = message.instructions().last().unwrap();
        assert_eq!(
            message.static_account_keys()[transfer.program_id_index as usize],
            spl_token_2022::id()
        );
    }

    #[tokio::test]
    async fn test_balances() {
        let rpc = Arc::new(FakeRpc::with_lamports(1_500_000_000));
        let mint = Pubkey::new_unique();
        rpc.insert(mint, mint_account(spl_token::id(), 6));
        let builder = builder(Arc::clone(&rpc));
        let ata = associated_token_address(&builder.wallet_pubkey(), &mint, &spl_token::id());

        assert_eq!(builder.get_balance("SOL").await.unwrap(), Decimal::new(15, 1));
        assert_eq!(builder.get_balance(&mint.to_string()).await.unwrap(), Decimal::ZERO);

        rpc.insert(ata, token_account(spl_token::id(), 2_500_000));
        assert_eq!(
            builder.get_balance(&mint.to_string()).await.unwrap(),
            Decimal::new(25, 1)
        );
    }

    #[tokio::test]
    async fn test_pay_checks_balance_first() {
        let rpc = Arc::new(FakeRpc::with_lamports(1_000));
        let err = builder(Arc::clone(&rpc))
            .pay(&requirement("SOL", "0.01"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SvmError::InsufficientBalance { .. }));
        assert!(rpc.sent().is_empty());
    }

    #[tokio::test]
    async fn test_pay_rejects_other_cluster() {
        let rpc = Arc::new(FakeRpc::with_lamports(u64::MAX));
        let mut req = requirement("SOL", "0.01");
        req.network = "mainnet-beta".to_string();
        let err = builder(rpc)
            .pay(&req, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SvmError::Validation(_)));
    }

    #[tokio::test]
    async fn test_rpc_failure_before_submission() {
        let rpc = Arc::new(FakeRpc {
            lamports: u64::MAX,
            fail_blockhash: true,
            ..FakeRpc::default()
        });
        let err = builder(Arc::clone(&rpc))
            .pay(&requirement("SOL", "0.01"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SvmError::Rpc {
                step: "get_latest_blockhash",
                ..
            }
        ));
        assert!(rpc.sent().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_before_submission() {
        let rpc = Arc::new(FakeRpc::with_lamports(u64::MAX));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = builder(Arc::clone(&rpc))
            .pay(&requirement("SOL", "0.01"), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, SvmError::Cancelled));
        assert!(rpc.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmation_polls_until_finalized() {
        let rpc = Arc::new(FakeRpc {
            lamports: u64::MAX,
            pending_polls: AtomicUsize::new(3),
            ..FakeRpc::default()
        });
        builder(Arc::clone(&rpc))
            .pay(&requirement("SOL", "0.01"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(rpc.pending_polls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmation_timeout_reports_signature() {
        let rpc = Arc::new(FakeRpc {
            lamports: u64::MAX,
            pending_polls: AtomicUsize::new(usize::MAX),
            ..FakeRpc::default()
        });
        let err = builder(Arc::clone(&rpc))
            .with_confirm_timeout(Duration::from_secs(2))
            .pay(&requirement("SOL", "0.01"), &CancellationToken::new())
            .await
            .unwrap_err();
        let SvmError::Unconfirmed { signature, .. } = err else {
            panic!("expected Unconfirmed, got {err:?}");
        };
        assert_eq!(signature, rpc.sent()[0].signatures[0].to_string());
    }

    #[test]
    fn test_preflight_rejects_unpayable_requirements_offline() {
        let rpc = Arc::new(FakeRpc::with_lamports(u64::MAX));
        let builder = builder(Arc::clone(&rpc));
        assert!(builder.preflight(&requirement("SOL", "0.01")).is_ok());
        assert!(builder.preflight(&requirement("CASH", "1.5")).is_ok());

        let mut other_cluster = requirement("SOL", "0.01");
        other_cluster.network = "solana-mainnet".to_string();
        let mut bad_payee = requirement("SOL", "0.01");
        bad_payee.pay_to = "not-an-address".to_string();
        let cases = [
            other_cluster,
            bad_payee,
            requirement("SOL", "0.0000000001"),
            requirement("SOL", "0"),
            requirement("CASH", "0"),
            requirement("DOGE", "1"),
        ];
        for req in &cases {
            let err = builder.preflight(req).unwrap_err();
            assert!(matches!(err, SvmError::Validation(_)), "{req:?}: {err:?}");
        }
        assert!(rpc.sent().is_empty());
    }

    #[tokio::test]
    async fn test_pay_accepts_prefixed_network_name() {
        let rpc = Arc::new(FakeRpc::with_lamports(1_000_000_000));
        let mut req = requirement("SOL", "0.01");
        req.network = "solana-devnet".to_string();
        builder(Arc::clone(&rpc))
            .pay(&req, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(rpc.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_history_classifies_balance_changes() {
        let rpc = Arc::new(FakeRpc::default());
        let sent = Signature::from([1; 64]);
        let received = Signature::from([4; 64]);
        rpc.push_history(sent, Some(1_700_000_100), Some((2_000_000_000, 1_989_995_000)));
        rpc.push_history(Signature::from([2; 64]), Some(1_700_000_050), Some((5, 5)));
        rpc.push_history(Signature::from([3; 64]), None, None);
        rpc.push_history(received, Some(1_700_000_000), Some((1_000_000_000, 1_250_000_000)));

        let records = builder(Arc::clone(&rpc))
            .fetch_payment_history(0, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].signature, sent.to_string());
        assert_eq!(records[0].direction, Direction::Sent);
        assert_eq!(records[0].amount, Decimal::new(10_005, 6));
        assert_eq!(records[0].asset, "SOL");
        assert_eq!(records[0].timestamp, UnixTimestamp::from_secs(1_700_000_100));
        assert_eq!(records[1].signature, received.to_string());
        assert_eq!(records[1].direction, Direction::Received);
        assert_eq!(records[1].amount, Decimal::new(25, 2));
    }

    #[tokio::test]
    async fn test_history_limit_counts_records_not_signatures() {
        let rpc = Arc::new(FakeRpc::default());
        rpc.push_history(Signature::from([0; 64]), None, Some((7, 7)));
        for n in 1..=3 {
            rpc.push_history(Signature::from([n; 64]), None, Some((10, 4)));
        }
        let records = builder(Arc::clone(&rpc))
            .fetch_payment_history(2, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.direction == Direction::Sent));
    }

    #[tokio::test]
    async fn test_history_listing_failure_is_rpc_error() {
        let rpc = Arc::new(FakeRpc {
            fail_signatures: true,
            ..FakeRpc::default()
        });
        let err = builder(rpc)
            .fetch_payment_history(0, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SvmError::Rpc {
                step: "get_signatures_for_address",
                ..
            }
        ));
    }
}
