use solana_instruction::Instruction;
use solana_message::v0::Message as MessageV0;
use solana_message::{Hash, VersionedMessage};
use solana_signature::Signature;
use solana_signer::Signer;
use solana_transaction::versioned::VersionedTransaction;

use crate::error::SvmError;

/// A versioned transaction being assembled by the payer.
#[derive(Debug, Clone)]
pub struct TransactionInt {
    inner: VersionedTransaction,
}

impl TransactionInt {
    /// Compiles `instructions` into an unsigned v0 transaction paid by `payer`.
    ///
    /// # Errors
    ///
    /// Returns [`SvmError::Sign`] if the message cannot be compiled.
    pub fn compile(
        payer: &solana_pubkey::Pubkey,
        instructions: &[Instruction],
        recent_blockhash: Hash,
    ) -> Result<Self, SvmError> {
        let message = MessageV0::try_compile(payer, instructions, &[], recent_blockhash)
            .map_err(|e| SvmError::Sign(format!("{e}")))?;
        Ok(Self {
            inner: VersionedTransaction {
                signatures: vec![],
                message: VersionedMessage::V0(message),
            },
        })
    }

    /// Signs the transaction with any Signer.
    ///
    /// # Errors
    ///
    /// Returns [`SvmError::Sign`] if the signer is not in the required signers list.
    pub fn sign_with_keypair<S: Signer>(self, signer: &S) -> Result<Self, SvmError> {
        let mut tx = self.inner;
        let msg_bytes = tx.message.serialize();
        let signature = signer
            .try_sign_message(msg_bytes.as_slice())
            .map_err(|e| SvmError::Sign(format!("{e}")))?;

        let num_required = tx.message.header().num_required_signatures as usize;
        let static_keys = tx.message.static_account_keys();

        let pos = static_keys
            .iter()
            .take(num_required)
            .position(|k| *k == signer.pubkey())
            .ok_or_else(|| SvmError::Sign("Signer not found in required signers".to_string()))?;

        if tx.signatures.len() < num_required {
            tx.signatures.resize(num_required, Signature::default());
        }
        tx.signatures[pos] = signature;
        Ok(Self { inner: tx })
    }

    /// Returns the underlying transaction.
    #[must_use]
    pub const fn inner(&self) -> &VersionedTransaction {
        &self.inner
    }
}
