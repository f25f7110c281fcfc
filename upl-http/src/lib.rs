#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! HTTP surface of the x402 Universal Payment Layer.
//!
//! - [`client`] - [`PaymentClient`], which answers 402 challenges by paying on Solana and retrying once
//! - [`registry`] - [`RegistryClient`] for service registration, heartbeat and discovery
//! - [`facade`] - [`X402Client`], combining payments, discovery and agent identity
//! - [`config`] - [`ClientConfig`] and its defaults
//! - [`headers`] - `X-Payment` and challenge body codecs
//! - [`constants`] - Header names, status codes, default URLs
//!
//! ```ignore
//! use upl_http::{ClientConfig, PaymentClient};
//!
//! let client = PaymentClient::from_config(&ClientConfig::default(), keypair);
//! let answer = client.get("https://svc.example/api/echo", &[], &cancel).await?;
//! ```
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation for debugging and monitoring

pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod facade;
pub mod headers;
pub mod registry;

pub use client::PaymentClient;
pub use config::ClientConfig;
pub use error::RegistryError;
pub use facade::X402Client;
pub use registry::{DiscoverQuery, RegistryClient, ServiceInfo, ServiceRegistration, ServiceStatus};
