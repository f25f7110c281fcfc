//! HTTP-level constants of the payment protocol.

use std::time::Duration;

/// Header carrying the base64 payment proof on the retried request.
pub const X_PAYMENT_HEADER: &str = "x-payment";

/// HTTP 402 Payment Required status code.
pub const HTTP_STATUS_PAYMENT_REQUIRED: u16 = 402;

/// Public service registry.
pub const DEFAULT_REGISTRY_URL: &str = "https://registry.x402.network";

/// Default per-request HTTP timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Tokens a client prefers when a service accepts several.
pub const DEFAULT_PREFERRED_TOKENS: &[&str] = &["CASH", "USDC", "SOL"];
