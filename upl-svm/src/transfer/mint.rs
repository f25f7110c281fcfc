//! Token mints, known assets and associated token accounts.

use solana_account::Account;
use solana_pubkey::{Pubkey, pubkey};

use crate::chain::Address;
use crate::error::SvmError;
use upl::networks::SolanaNetwork;
use upl::proto::NATIVE_ASSET;

/// Associated Token Account program public key.
pub const ATA_PROGRAM_PUBKEY: Pubkey = pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");

/// Decimal exponent of the native coin (lamports per SOL = 10^9).
pub const NATIVE_DECIMALS: u8 = 9;

/// Decimal exponent assumed when a mint cannot be read.
pub const DEFAULT_TOKEN_DECIMALS: u8 = 6;

/// Byte offset of the `decimals` field in SPL and Token-2022 mint accounts.
pub const MINT_DECIMALS_OFFSET: usize = 44;

/// Byte range of the little-endian `amount` field in a token account.
pub const TOKEN_AMOUNT_RANGE: std::ops::Range<usize> = 64..72;

/// Mint information for SPL tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mint {
    /// Standard SPL Token mint.
    Token {
        /// Number of decimal places.
        decimals: u8,
        /// SPL Token program ID.
        token_program: Pubkey,
    },
    /// SPL Token-2022 mint.
    Token2022 {
        /// Number of decimal places.
        decimals: u8,
        /// SPL Token-2022 program ID.
        token_program: Pubkey,
    },
}

impl Mint {
    /// Standard SPL Token mint with the given decimals.
    #[must_use]
    pub fn token(decimals: u8) -> Self {
        Self::Token {
            decimals,
            token_program: spl_token::id(),
        }
    }

    /// Token-2022 mint with the given decimals.
    #[must_use]
    pub fn token_2022(decimals: u8) -> Self {
        Self::Token2022 {
            decimals,
            token_program: spl_token_2022::id(),
        }
    }

    /// Returns the SPL Token program ID for this mint.
    #[must_use]
    pub const fn token_program(&self) -> &Pubkey {
        match self {
            Self::Token { token_program, .. } | Self::Token2022 { token_program, .. } => {
                token_program
            }
        }
    }

    /// Returns the decimal exponent of this mint.
    #[must_use]
    pub const fn decimals(&self) -> u8 {
        match self {
            Self::Token { decimals, .. } | Self::Token2022 { decimals, .. } => *decimals,
        }
    }

    /// Reads a mint from its raw account.
    ///
    /// The owner picks the token program. Decimals come from byte 44 of the
    /// mint data, or `fallback_decimals` when the data is too short.
    ///
    /// # Errors
    ///
    /// Returns [`SvmError::Validation`] if the account is not owned by a token program.
    pub fn from_account(account: &Account, fallback_decimals: u8) -> Result<Self, SvmError> {
        let decimals = account
            .data
            .get(MINT_DECIMALS_OFFSET)
            .copied()
            .unwrap_or(fallback_decimals);
        if account.owner == spl_token::id() {
            Ok(Self::token(decimals))
        } else if account.owner == spl_token_2022::id() {
            Ok(Self::token_2022(decimals))
        } else {
            Err(SvmError::Validation(format!(
                "account owned by {} is not a token mint",
                account.owner
            )))
        }
    }
}

/// A token the client knows by symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownToken {
    /// Symbol accepted in place of the mint address.
    pub symbol: &'static str,
    /// Cluster the mint lives on; `None` when the same mint is used everywhere.
    pub network: Option<SolanaNetwork>,
    /// Mint address.
    pub mint: Pubkey,
    /// Mint layout assumed when the chain cannot be read.
    pub mint_info: KnownMint,
}

/// Program and decimals of a known token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownMint {
    /// SPL Token.
    Token(u8),
    /// Token-2022.
    Token2022(u8),
}

impl KnownMint {
    fn to_mint(self) -> Mint {
        match self {
            Self::Token(decimals) => Mint::token(decimals),
            Self::Token2022(decimals) => Mint::token_2022(decimals),
        }
    }
}

/// Tokens resolvable by symbol.
pub const KNOWN_TOKENS: &[KnownToken] = &[
    KnownToken {
        symbol: "CASH",
        network: None,
        mint: pubkey!("CASHx9KJUStyftLFWGvEVf59SGeG9sh5FfcnZMVPCASH"),
        mint_info: KnownMint::Token2022(6),
    },
    KnownToken {
        symbol: "USDC",
        network: Some(SolanaNetwork::MainnetBeta),
        mint: pubkey!("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"),
        mint_info: KnownMint::Token(6),
    },
    KnownToken {
        symbol: "USDC",
        network: Some(SolanaNetwork::Devnet),
        mint: pubkey!("4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU"),
        mint_info: KnownMint::Token(6),
    },
];

/// An asset named in a requirement, resolved for a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Asset {
    /// Native SOL.
    Native,
    /// An SPL or Token-2022 token.
    Token {
        /// Mint address.
        mint: Address,
        /// Layout to assume if the mint account cannot be read.
        fallback: Mint,
    },
}

impl Asset {
    /// Resolves `"SOL"`, a known symbol, or a base58 mint address.
    ///
    /// # Errors
    ///
    /// Returns [`SvmError::Validation`] for anything else.
    pub fn resolve(asset: &str, network: SolanaNetwork) -> Result<Self, SvmError> {
        if asset == NATIVE_ASSET {
            return Ok(Self::Native);
        }
        if let Some(token) = KNOWN_TOKENS
            .iter()
            .find(|t| t.symbol == asset && t.network.is_none_or(|n| n == network))
        {
            return Ok(Self::Token {
                mint: Address::new(token.mint),
                fallback: token.mint_info.to_mint(),
            });
        }
        let mint: Address = asset
            .parse()
            .map_err(|_| SvmError::Validation(format!("unknown asset {asset} on {network}")))?;
        let fallback = KNOWN_TOKENS
            .iter()
            .find(|t| t.mint == *mint.pubkey())
            .map_or(Mint::token(DEFAULT_TOKEN_DECIMALS), |t| t.mint_info.to_mint());
        Ok(Self::Token { mint, fallback })
    }
}

/// Derives the associated token account of `owner` for `mint`.
#[must_use]
pub fn associated_token_address(owner: &Pubkey, mint: &Pubkey, token_program: &Pubkey) -> Pubkey {
    let (ata, _) = Pubkey::find_program_address(
        &[owner.as_ref(), token_program.as_ref(), mint.as_ref()],
        &ATA_PROGRAM_PUBKEY,
    );
    ata
}

/// Reads the raw token amount of a token account.
///
/// Data too short to hold an amount reads as zero.
#[must_use]
pub fn token_account_amount(data: &[u8]) -> u64 {
    data.get(TOKEN_AMOUNT_RANGE)
        .and_then(|bytes| <[u8; 8]>::try_from(bytes).ok())
        .map_or(0, u64::from_le_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(owner: Pubkey, data: Vec<u8>) -> Account {
        Account {
            lamports: 1,
            data,
            owner,
            executable: false,
            rent_epoch: 0,
        }
    }

    #[test]
    fn test_mint_decimals_read_from_offset() {
        let mut data = vec![0u8; 82];
        data[MINT_DECIMALS_OFFSET] = 9;
        let mint = Mint::from_account(&account(spl_token::id(), data), 6).unwrap();
        assert_eq!(mint, Mint::token(9));
    }

    #[test]
    fn test_mint_short_data_uses_fallback_decimals() {
        let mint = Mint::from_account(&account(spl_token_2022::id(), vec![0; 10]), 6).unwrap();
        assert_eq!(mint.decimals(), 6);
        assert_eq!(*mint.token_program(), spl_token_2022::id());
    }

    #[test]
    fn test_mint_rejects_foreign_owner() {
        let owner = Pubkey::new_unique();
        assert!(Mint::from_account(&account(owner, vec![0; 82]), 6).is_err());
    }

    #[test]
    fn test_token_account_amount_is_little_endian_at_64() {
        let mut data = vec![0u8; 165];
        data[64..72].copy_from_slice(&1_250_000u64.to_le_bytes());
        assert_eq!(token_account_amount(&data), 1_250_000);
        assert_eq!(token_account_amount(&data[..70]), 0);
    }

    #[test]
    fn test_resolve_assets() {
        assert_eq!(Asset::resolve("SOL", SolanaNetwork::Devnet).unwrap(), Asset::Native);

        let Asset::Token { mint, fallback } = Asset::resolve("CASH", SolanaNetwork::MainnetBeta).unwrap()
        else {
            panic!("CASH is a token");
        };
        assert_eq!(mint.to_string(), "CASHx9KJUStyftLFWGvEVf59SGeG9sh5FfcnZMVPCASH");
        assert_eq!(*fallback.token_program(), spl_token_2022::id());

        let Asset::Token { mint, .. } = Asset::resolve("USDC", SolanaNetwork::Devnet).unwrap() else {
            panic!("USDC is a token");
        };
        assert_eq!(mint.to_string(), "4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU");

        assert!(Asset::resolve("USDC", SolanaNetwork::Testnet).is_err());
        assert!(Asset::resolve("DOGE", SolanaNetwork::Devnet).is_err());
    }

    #[test]
    fn test_ata_depends_on_owner_and_mint() {
        let owner = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let a = associated_token_address(&owner, &mint, &spl_token::id());
        let b = associated_token_address(&owner, &mint, &spl_token_2022::id());
        assert_ne!(a, b);
        assert_eq!(a, associated_token_address(&owner, &mint, &spl_token::id()));
    }
}
