use std::sync::Arc;

use solana_account::Account;
use solana_client::client_error::ClientError;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_client::GetConfirmedSignaturesForAddress2Config;
use solana_client::rpc_config::{RpcSendTransactionConfig, RpcTransactionConfig};
use solana_commitment_config::CommitmentConfig;
use solana_message::Hash;
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use solana_transaction::versioned::VersionedTransaction;

/// A transaction signature that touched an address, newest first in listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureEntry {
    /// Base58 transaction signature.
    pub signature: String,
    /// Block time in Unix seconds, when the node knows it.
    pub block_time: Option<i64>,
}

/// Lamports held by a transaction's fee payer before and after it ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LamportDelta {
    /// Balance before execution.
    pub pre: u64,
    /// Balance after execution.
    pub post: u64,
}

/// The RPC calls a payer needs.
///
/// Implemented for the nonblocking [`RpcClient`]; tests substitute an
/// in-memory ledger.
pub trait RpcClientLike: Send + Sync {
    /// Fetches an account, `None` if it does not exist.
    fn get_account(
        &self,
        pubkey: &Pubkey,
        commitment: CommitmentConfig,
    ) -> impl Future<Output = Result<Option<Account>, ClientError>> + Send;

    /// Fetches an account's lamport balance.
    fn get_balance(
        &self,
        pubkey: &Pubkey,
        commitment: CommitmentConfig,
    ) -> impl Future<Output = Result<u64, ClientError>> + Send;

    /// Fetches a recent blockhash.
    fn get_latest_blockhash(
        &self,
        commitment: CommitmentConfig,
    ) -> impl Future<Output = Result<Hash, ClientError>> + Send;

    /// Submits a signed transaction.
    fn send_transaction(
        &self,
        transaction: &VersionedTransaction,
        config: RpcSendTransactionConfig,
    ) -> impl Future<Output = Result<Signature, ClientError>> + Send;

    /// Returns `true` once the transaction has reached `commitment`.
    fn confirm_transaction(
        &self,
        signature: &Signature,
        commitment: CommitmentConfig,
    ) -> impl Future<Output = Result<bool, ClientError>> + Send;

    /// Lists up to `limit` signatures involving `address`, newest first.
    fn get_signatures_for_address(
        &self,
        address: &Pubkey,
        limit: usize,
        commitment: CommitmentConfig,
    ) -> impl Future<Output = Result<Vec<SignatureEntry>, ClientError>> + Send;

    /// Fee payer balances around a confirmed transaction, `None` without status metadata.
    fn get_transaction_balances(
        &self,
        signature: &Signature,
        commitment: CommitmentConfig,
    ) -> impl Future<Output = Result<Option<LamportDelta>, ClientError>> + Send;
}

impl RpcClientLike for RpcClient {
    async fn get_account(
        &self,
        pubkey: &Pubkey,
        commitment: CommitmentConfig,
    ) -> Result<Option<Account>, ClientError> {
        let response = Self::get_account_with_commitment(self, pubkey, commitment).await?;
        Ok(response.value)
    }

    async fn get_balance(
        &self,
        pubkey: &Pubkey,
        commitment: CommitmentConfig,
    ) -> Result<u64, ClientError> {
        let response = Self::get_balance_with_commitment(self, pubkey, commitment).await?;
        Ok(response.value)
    }

    async fn get_latest_blockhash(&self, commitment: CommitmentConfig) -> Result<Hash, ClientError> {
        let (hash, _last_valid_height) =
            Self::get_latest_blockhash_with_commitment(self, commitment).await?;
        Ok(hash)
    }

    async fn send_transaction(
        &self,
        transaction: &VersionedTransaction,
        config: RpcSendTransactionConfig,
    ) -> Result<Signature, ClientError> {
        Self::send_transaction_with_config(self, transaction, config).await
    }

    async fn confirm_transaction(
        &self,
        signature: &Signature,
        commitment: CommitmentConfig,
    ) -> Result<bool, ClientError> {
        let response = Self::confirm_transaction_with_commitment(self, signature, commitment).await?;
        Ok(response.value)
    }

    async fn get_signatures_for_address(
        &self,
        address: &Pubkey,
        limit: usize,
        commitment: CommitmentConfig,
    ) -> Result<Vec<SignatureEntry>, ClientError> {
        let config = GetConfirmedSignaturesForAddress2Config {
            limit: Some(limit),
            commitment: Some(commitment),
            ..GetConfirmedSignaturesForAddress2Config::default()
        };
        let statuses = Self::get_signatures_for_address_with_config(self, address, config).await?;
        Ok(statuses
            .into_iter()
            .map(|status| SignatureEntry {
                signature: status.signature,
                block_time: status.block_time,
            })
            .collect())
    }

    async fn get_transaction_balances(
        &self,
        signature: &Signature,
        commitment: CommitmentConfig,
    ) -> Result<Option<LamportDelta>, ClientError> {
        let config = RpcTransactionConfig {
            commitment: Some(commitment),
            max_supported_transaction_version: Some(0),
            ..RpcTransactionConfig::default()
        };
        let tx = Self::get_transaction_with_config(self, signature, config).await?;
        Ok(tx.transaction.meta.and_then(|meta| {
            Some(LamportDelta {
                pre: *meta.pre_balances.first()?,
                post: *meta.post_balances.first()?,
            })
        }))
    }
}

impl<T: RpcClientLike> RpcClientLike for Arc<T> {
    fn get_account(
        &self,
        pubkey: &Pubkey,
        commitment: CommitmentConfig,
    ) -> impl Future<Output = Result<Option<Account>, ClientError>> + Send {
        (**self).get_account(pubkey, commitment)
    }

    fn get_balance(
        &self,
        pubkey: &Pubkey,
        commitment: CommitmentConfig,
    ) -> impl Future<Output = Result<u64, ClientError>> + Send {
        (**self).get_balance(pubkey, commitment)
    }

    fn get_latest_blockhash(
        &self,
        commitment: CommitmentConfig,
    ) -> impl Future<Output = Result<Hash, ClientError>> + Send {
        (**self).get_latest_blockhash(commitment)
    }

    fn send_transaction(
        &self,
        transaction: &VersionedTransaction,
        config: RpcSendTransactionConfig,
    ) -> impl Future<Output = Result<Signature, ClientError>> + Send {
        (**self).send_transaction(transaction, config)
    }

    fn confirm_transaction(
        &self,
        signature: &Signature,
        commitment: CommitmentConfig,
    ) -> impl Future<Output = Result<bool, ClientError>> + Send {
        (**self).confirm_transaction(signature, commitment)
    }

    fn get_signatures_for_address(
        &self,
        address: &Pubkey,
        limit: usize,
        commitment: CommitmentConfig,
    ) -> impl Future<Output = Result<Vec<SignatureEntry>, ClientError>> + Send {
        (**self).get_signatures_for_address(address, limit, commitment)
    }

    fn get_transaction_balances(
        &self,
        signature: &Signature,
        commitment: CommitmentConfig,
    ) -> impl Future<Output = Result<Option<LamportDelta>, ClientError>> + Send {
        (**self).get_transaction_balances(signature, commitment)
    }
}
