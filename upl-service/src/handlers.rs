//! Axum route handlers for the paid service.
//!
//! - `GET /health` is never challenged
//! - `POST /api/echo` sits behind the [`PaymentGateLayer`]

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde_json::{Value, json};
use tower_http::cors;
use tower_http::trace::TraceLayer;
use upl::networks::SolanaNetwork;
use upl::proto::PaymentProof;

use crate::gate::{PaymentGateLayer, PriceTag};

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Service name reported by `/health`.
    pub service_name: String,
    /// Cluster payments are accepted on.
    pub network: SolanaNetwork,
}

/// `GET /health`: liveness check.
pub async fn get_health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": state.service_name,
        "network": state.network,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `POST /api/echo` — returns the request body along with who paid for it.
pub async fn post_echo(
    Extension(proof): Extension<PaymentProof>,
    Json(body): Json<Value>,
) -> Json<Value> {
    Json(json!({
        "echo": body,
        "paidBy": proof.from,
        "signature": proof.signature,
    }))
}

/// Builds the service router.
///
/// Routes added before the gate layer are paid; `/health` is added after it.
pub fn router(state: AppState, price: PriceTag) -> Router {
    Router::new()
        .route("/api/echo", post(post_echo))
        .layer(PaymentGateLayer::new(price))
        .route("/health", get(get_health))
        .layer(TraceLayer::new_for_http())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods(cors::Any)
                .allow_headers(cors::Any),
        )
        .with_state(Arc::new(state))
}
