#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Solana settlement for the x402 Universal Payment Layer.
//!
//! This crate pays [`PaymentRequirement`](upl::proto::PaymentRequirement)s
//! on Solana: native SOL through the System program, SPL and Token-2022
//! tokens through `TransferChecked`.
//!
//! # Architecture
//!
//! - [`chain`] - Addresses, keypair loading and the [`RpcClientLike`](chain::rpc::RpcClientLike) seam
//! - [`transfer`] - [`TransactionBuilder`] and the [`ChainPayer`] trait
//! - [`error`] - [`SvmError`] and its mapping into [`upl::UplError`]
//!
//! # Feature Flags
//!
//! - `telemetry` - `tracing` spans and events for submission and confirmation
//! - `test-utils` - An in-memory RPC node for tests of dependent crates
//!
//! # Example
//!
//! ```ignore
//! use upl::networks::SolanaNetwork;
//! use upl_svm::{TransactionBuilder, chain::load_keypair};
//!
//! let keypair = load_keypair(&std::env::var("WALLET_SECRET")?)?;
//! let builder = TransactionBuilder::for_network(SolanaNetwork::Devnet, keypair);
//! let signature = builder.pay(&requirement, &cancel).await?;
//! ```

pub mod chain;
pub mod error;
pub mod transfer;

#[cfg(any(test, feature = "test-utils"))]
#[doc(hidden)]
pub mod testing;

pub use error::SvmError;
pub use transfer::{ChainPayer, TransactionBuilder};
