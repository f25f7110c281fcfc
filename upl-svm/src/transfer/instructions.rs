//! Instruction encoders for the two non-token programs a payment touches.

use solana_instruction::{AccountMeta, Instruction};
use solana_pubkey::Pubkey;

use super::mint::ATA_PROGRAM_PUBKEY;

/// System program public key.
pub const SYSTEM_PROGRAM_PUBKEY: Pubkey = Pubkey::new_from_array([0; 32]);

const SYSTEM_TRANSFER_TAG: u32 = 2;
const ATA_CREATE_IDEMPOTENT_TAG: u8 = 1;

/// System `Transfer` of `lamports` from `from` to `to`.
#[must_use]
pub fn system_transfer(from: &Pubkey, to: &Pubkey, lamports: u64) -> Instruction {
    let mut data = Vec::with_capacity(12);
    data.extend_from_slice(&SYSTEM_TRANSFER_TAG.to_le_bytes());
    data.extend_from_slice(&lamports.to_le_bytes());
    Instruction::new_with_bytes(
        SYSTEM_PROGRAM_PUBKEY,
        &data,
        vec![AccountMeta::new(*from, true), AccountMeta::new(*to, false)],
    )
}

/// Associated Token Account `CreateIdempotent`, funded by `funder`.
///
/// Succeeds without effect when the account already exists.
#[must_use]
pub fn create_associated_token_account_idempotent(
    funder: &Pubkey,
    ata: &Pubkey,
    wallet: &Pubkey,
    mint: &Pubkey,
    token_program: &Pubkey,
) -> Instruction {
    Instruction::new_with_bytes(
        ATA_PROGRAM_PUBKEY,
        &[ATA_CREATE_IDEMPOTENT_TAG],
        vec![
            AccountMeta::new(*funder, true),
            AccountMeta::new(*ata, false),
            AccountMeta::new_readonly(*wallet, false),
            AccountMeta::new_readonly(*mint, false),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_PUBKEY, false),
            AccountMeta::new_readonly(*token_program, false),
        ],
    )
}
