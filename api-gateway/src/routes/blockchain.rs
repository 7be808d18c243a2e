//! Public ledger inspection.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use ledger::{Block, ChainStats};

use crate::error::{ok, Envelope};
use crate::state::{unix_now, SharedState};

/// Response body for `GET /blockchain/verify`.
#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub valid: bool,
    pub chain_length: usize,
}

/// `GET /blockchain/verify`
pub async fn verify(State(state): State<SharedState>) -> Json<Envelope<VerifyResponse>> {
    ok(VerifyResponse {
        valid: state.machine.verify_chain(),
        chain_length: state.machine.chain_length(),
    })
}

/// Query string for `GET /blockchain/blocks`.
#[derive(Debug, Deserialize)]
pub struct BlocksQuery {
    /// How many trailing blocks to return.
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    10
}

/// Response body for `GET /blockchain/blocks`.
#[derive(Debug, Serialize)]
pub struct BlocksResponse {
    pub blocks: Vec<Block>,
    pub count: usize,
}

/// `GET /blockchain/blocks[?limit=N]`: the last N blocks, default 10.
pub async fn blocks(
    State(state): State<SharedState>,
    Query(query): Query<BlocksQuery>,
) -> Json<Envelope<BlocksResponse>> {
    let blocks = state.machine.recent_blocks(query.limit);
    let count = blocks.len();
    ok(BlocksResponse { blocks, count })
}

/// `GET /blockchain/stats`
pub async fn stats(State(state): State<SharedState>) -> Json<Envelope<ChainStats>> {
    ok(state.machine.stats(unix_now()))
}
