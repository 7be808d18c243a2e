//! Liveness and service-summary endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::error::{ok, Envelope};
use crate::state::{unix_now, SharedState};

/// Simple health-check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub chain_valid: bool,
}

/// `GET /health`
///
/// Returns liveness plus the current chain-integrity flag.
pub async fn health(State(state): State<SharedState>) -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            chain_valid: state.machine.verify_chain(),
        }),
    )
}

/// Service summary returned from the root route.
#[derive(Serialize)]
pub struct SummaryResponse {
    pub service: &'static str,
    pub version: &'static str,
    pub chain_length: u64,
    pub total_voters: u64,
    pub total_polls: u64,
    pub active_polls: u64,
}

/// `GET /`
pub async fn summary(State(state): State<SharedState>) -> Json<Envelope<SummaryResponse>> {
    let stats = state.machine.stats(unix_now());
    ok(SummaryResponse {
        service: "voting-blockchain-api",
        version: env!("CARGO_PKG_VERSION"),
        chain_length: stats.chain_length,
        total_voters: stats.total_voters,
        total_polls: stats.total_polls,
        active_polls: stats.active_polls,
    })
}
