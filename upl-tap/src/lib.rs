#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Agent identity for the x402 Universal Payment Layer.
//!
//! - [`signature`] - RFC 9421 signature base, Ed25519 and RSA-PSS signing and verification
//! - [`client`] - [`TapClient`], which signs registry calls and registers or discovers agents
//! - [`types`] - Registry wire types
//!
//! ```ignore
//! use upl_tap::{TapClient, TapConfig, signature::SigningKeyMaterial};
//!
//! let key = SigningKeyMaterial::generate_ed25519();
//! let tap = TapClient::new(TapConfig::new("agent-1", key).with_registry_url(registry));
//! let identity = tap.register_agent(&wallet, None, &cancel).await?;
//! ```

pub mod client;
pub mod error;
pub mod signature;
pub mod types;

pub use client::{TapClient, TapConfig};
pub use error::TapError;
pub use types::{AgentFilters, AgentIdentity};
