//! Public poll listing and results.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use ledger::validation::validate_poll_id;
use ledger::{Poll, TallyReport};

use crate::error::{ok, ApiError, Envelope};
use crate::state::{unix_now, SharedState};

/// Query string for `GET /polls`.
#[derive(Debug, Default, Deserialize)]
pub struct PollsQuery {
    #[serde(default)]
    pub active_only: bool,
}

/// `GET /polls[?active_only=true]`
pub async fn list(
    State(state): State<SharedState>,
    Query(query): Query<PollsQuery>,
) -> Json<Envelope<Vec<Poll>>> {
    ok(state.machine.polls(query.active_only, unix_now()))
}

/// `GET /polls/{id}`
pub async fn get_poll(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<Poll>>, ApiError> {
    let poll_id = validate_poll_id(&id)?;
    let poll = state
        .machine
        .poll(poll_id)
        .ok_or_else(|| ApiError::not_found(format!("poll `{poll_id}` not found")))?;
    Ok(ok(poll))
}

/// `GET /results/{id}`
pub async fn results(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<TallyReport>>, ApiError> {
    let poll_id = validate_poll_id(&id)?;
    if state.machine.poll(poll_id).is_none() {
        return Err(ApiError::not_found(format!("poll `{poll_id}` not found")));
    }
    let tally = state.machine.tally(poll_id, unix_now())?;
    Ok(ok(tally))
}
