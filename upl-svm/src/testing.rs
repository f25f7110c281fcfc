//! In-memory RPC for tests.
//!
//! [`FakeRpc`] answers the [`RpcClientLike`] calls from fields set by the
//! test and records every submitted transaction. Enabled by the
//! `test-utils` feature.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use solana_account::Account;
use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_commitment_config::CommitmentConfig;
use solana_message::Hash;
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use solana_transaction::versioned::VersionedTransaction;

use crate::chain::rpc::{LamportDelta, RpcClientLike, SignatureEntry};

/// A scripted RPC node.
///
/// Submitted transactions are finalized after `pending_polls` confirmation
/// polls have answered "not yet".
#[derive(Debug, Default)]
pub struct FakeRpc {
    /// Lamports reported for every balance query.
    pub lamports: u64,
    /// Accounts returned by `get_account`.
    pub accounts: Mutex<Vec<(Pubkey, Account)>>,
    /// Transactions received by `send_transaction`.
    pub sent: Mutex<Vec<VersionedTransaction>>,
    /// Confirmation polls left before reporting finality.
    pub pending_polls: AtomicUsize,
    /// Makes `get_latest_blockhash` fail.
    pub fail_blockhash: bool,
    /// Signature listing returned for any address, with each transaction's balances.
    pub history: Mutex<Vec<(SignatureEntry, Option<LamportDelta>)>>,
    /// Makes `get_signatures_for_address` fail.
    pub fail_signatures: bool,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn custom(message: &str) -> ClientError {
    ClientErrorKind::Custom(message.to_string()).into()
}

impl FakeRpc {
    /// A node reporting `lamports` for the wallet.
    #[must_use]
    pub fn with_lamports(lamports: u64) -> Self {
        Self {
            lamports,
            ..Self::default()
        }
    }

    /// Adds an account.
    pub fn insert(&self, key: Pubkey, account: Account) {
        locked(&self.accounts).push((key, account));
    }

    /// Appends a transaction to the signature listing.
    ///
    /// `balances` is `None` for a transaction without status metadata.
    pub fn push_history(
        &self,
        signature: Signature,
        block_time: Option<i64>,
        balances: Option<(u64, u64)>,
    ) {
        locked(&self.history).push((
            SignatureEntry {
                signature: signature.to_string(),
                block_time,
            },
            balances.map(|(pre, post)| LamportDelta { pre, post }),
        ));
    }

    /// Transactions submitted so far.
    #[must_use]
    pub fn sent(&self) -> Vec<VersionedTransaction> {
        locked(&self.sent).clone()
    }
}

impl RpcClientLike for FakeRpc {
    async fn get_account(
        &self,
        pubkey: &Pubkey,
        _commitment: CommitmentConfig,
    ) -> Result<Option<Account>, ClientError> {
        Ok(locked(&self.accounts)
            .iter()
            .find(|(k, _)| k == pubkey)
            .map(|(_, a)| a.clone()))
    }

    async fn get_balance(
        &self,
        _pubkey: &Pubkey,
        _commitment: CommitmentConfig,
    ) -> Result<u64, ClientError> {
        Ok(self.lamports)
    }

    async fn get_latest_blockhash(&self, _commitment: CommitmentConfig) -> Result<Hash, ClientError> {
        if self.fail_blockhash {
            return Err(custom("node is behind"));
        }
        Ok(Hash::default())
    }

    async fn send_transaction(
        &self,
        transaction: &VersionedTransaction,
        config: RpcSendTransactionConfig,
    ) -> Result<Signature, ClientError> {
        if config.skip_preflight {
            return Err(custom("preflight must not be skipped"));
        }
        locked(&self.sent).push(transaction.clone());
        Ok(transaction.signatures[0])
    }

    async fn confirm_transaction(
        &self,
        _signature: &Signature,
        _commitment: CommitmentConfig,
    ) -> Result<bool, ClientError> {
        let left = self.pending_polls.load(Ordering::SeqCst);
        if left == 0 {
            return Ok(true);
        }
        self.pending_polls.store(left - 1, Ordering::SeqCst);
        Ok(false)
    }

    async fn get_signatures_for_address(
        &self,
        _address: &Pubkey,
        limit: usize,
        _commitment: CommitmentConfig,
    ) -> Result<Vec<SignatureEntry>, ClientError> {
        if self.fail_signatures {
            return Err(custom("signature listing unavailable"));
        }
        Ok(locked(&self.history)
            .iter()
            .take(limit)
            .map(|(entry, _)| entry.clone())
            .collect())
    }

    async fn get_transaction_balances(
        &self,
        signature: &Signature,
        _commitment: CommitmentConfig,
    ) -> Result<Option<LamportDelta>, ClientError> {
        let wanted = signature.to_string();
        locked(&self.history)
            .iter()
            .find(|(entry, _)| entry.signature == wanted)
            .map(|(_, delta)| *delta)
            .ok_or_else(|| custom("transaction not found"))
    }
}
