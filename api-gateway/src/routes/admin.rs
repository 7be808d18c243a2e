//! Admin-only operations: poll creation and manual mining.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use ledger::validation::{
    sanitize, validate_duration_hours, validate_poll_description, validate_poll_options,
    validate_poll_title, validate_voter_id,
};
use ledger::{FlushOutcome, NewPoll, Poll};

use crate::error::{ok, ok_with_message, ApiError, Envelope};
use crate::middleware::AdminClaims;
use crate::state::{unix_now, SharedState};

/// Request body for `POST /admin/polls`.
#[derive(Debug, Deserialize)]
pub struct CreatePollRequest {
    pub title: String,
    pub description: String,
    pub options: Vec<String>,
    pub duration_hours: i64,
    /// Empty or missing means "all currently registered voters".
    #[serde(default)]
    pub eligible_voters: Vec<String>,
    #[serde(default)]
    pub allow_multiple_votes: bool,
    #[serde(default)]
    pub is_anonymous: bool,
}

/// `POST /admin/polls`
pub async fn create_poll(
    State(state): State<SharedState>,
    AdminClaims(claims): AdminClaims,
    body: Result<Json<CreatePollRequest>, axum::extract::rejection::JsonRejection>,
) -> Result<Json<Envelope<Poll>>, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let title = sanitize(&body.title);
    let description = sanitize(&body.description);
    let options: Vec<String> = body.options.iter().map(|o| sanitize(o)).collect();

    validate_poll_title(&title)?;
    validate_poll_description(&description)?;
    validate_poll_options(&options)?;
    validate_duration_hours(body.duration_hours)?;
    for voter_id in &body.eligible_voters {
        validate_voter_id(voter_id)?;
    }

    let poll = state.machine.create_poll(
        NewPoll {
            title,
            description,
            options,
            creator: claims.email,
            duration_hours: body.duration_hours,
            eligible_voters: body.eligible_voters,
            allow_multiple_votes: body.allow_multiple_votes,
            is_anonymous: body.is_anonymous,
        },
        unix_now(),
    )?;

    tracing::info!(poll_id = %poll.poll_id, title = %poll.title, "poll created");
    Ok(ok(poll))
}

/// `POST /admin/blockchain/mine` manually seals the pending buffer.
pub async fn mine(
    State(state): State<SharedState>,
    AdminClaims(_claims): AdminClaims,
) -> Json<Envelope<FlushOutcome>> {
    let outcome = state.machine.flush_pending(unix_now());
    let message = match outcome.block_index {
        Some(index) => format!("sealed {} vote(s) into block {index}", outcome.votes_mined),
        None => "no pending votes to seal".to_string(),
    };
    ok_with_message(outcome, message)
}
