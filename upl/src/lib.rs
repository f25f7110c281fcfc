#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for the x402 Universal Payment Layer.
//!
//! This crate holds the chain-agnostic pieces of the payment client: exact
//! decimal amounts, the 402 challenge and proof wire types, the hourly
//! spending guard and the payment ledger. Chain and transport specifics live
//! in sibling crates (`upl-svm`, `upl-http`, `upl-tap`).
//!
//! # Overview
//!
//! A server answers a request with `402 Payment Required` and a JSON
//! [`PaymentRequirement`](proto::PaymentRequirement). The client checks its
//! [`SpendingGuard`](budget::SpendingGuard), pays on-chain, and retries with
//! a base64 [`PaymentProof`](proto::PaymentProof) in the `X-Payment` header.
//! Every confirmed transfer lands in the [`MetricsTracker`](ledger::MetricsTracker).
//!
//! # Modules
//!
//! - [`amount`] - Exact decimal amounts and base-unit scaling
//! - [`budget`] - Hourly spending budget buckets
//! - [`error`] - Client error taxonomy
//! - [`ledger`] - Append-only payment ledger and aggregate metrics
//! - [`networks`] - Known Solana clusters and their RPC endpoints
//! - [`proto`] - Challenge and proof wire types
//! - [`state`] - Shared, lockable budget and ledger state
//! - [`timestamp`] - Unix timestamps and injectable clocks
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation for debugging and monitoring

pub mod amount;
pub mod budget;
pub mod error;
pub mod ledger;
pub mod networks;
pub mod proto;
pub mod state;
pub mod timestamp;

pub use amount::Amount;
pub use error::UplError;
