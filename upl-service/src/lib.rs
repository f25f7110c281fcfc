//! Template x402 paid HTTP service.
//!
//! Answers unpaid requests with a Solana payment challenge, serves paid ones,
//! and keeps itself listed in the service registry.
//!
//! # Modules
//!
//! - [`config`] - TOML configuration with environment variable expansion
//! - [`error`] - Service error types
//! - [`gate`] - Payment gate middleware
//! - [`handlers`] - Axum route handlers and router builder
//! - [`heartbeat`] - Periodic registry heartbeat
//! - [`signal`] - OS shutdown signals

pub mod config;
pub mod error;
pub mod gate;
pub mod handlers;
pub mod heartbeat;
pub mod signal;

pub use config::ServiceConfig;
pub use error::ServiceError;
pub use gate::{PaymentGateLayer, PriceTag};
pub use handlers::{AppState, router};
