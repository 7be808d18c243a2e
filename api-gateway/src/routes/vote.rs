//! Ballot casting.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use ledger::validation::{sanitize, validate_poll_id, validate_voter_id};
use ledger::{CastOutcome, CastVote, Role};

use crate::error::{ok_with_message, ApiError, Envelope};
use crate::middleware::AuthClaims;
use crate::state::{unix_now, SharedState};

/// Request body for `POST /vote`.
#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub poll_id: String,
    pub voter_id: String,
    pub choice: String,
    /// Base64 PSS signature over `poll_id|voter_id|choice`.
    #[serde(default)]
    pub signature: Option<String>,
}

/// `POST /vote`
///
/// Requires a voter token whose `voter_id` claim matches the ballot's
/// voter id; the subject check precedes field validation, so a voter
/// cannot probe another voter's state.
pub async fn cast(
    State(state): State<SharedState>,
    AuthClaims(claims): AuthClaims,
    body: Result<Json<VoteRequest>, axum::extract::rejection::JsonRejection>,
) -> Result<Json<Envelope<CastOutcome>>, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;

    if claims.role != Role::Voter {
        return Err(ApiError::forbidden("only voters may cast ballots"));
    }
    if claims.voter_id.as_deref() != Some(body.voter_id.as_str()) {
        return Err(ApiError::forbidden("token does not belong to this voter"));
    }

    let voter_id = sanitize(&body.voter_id);
    validate_voter_id(&voter_id)?;
    let poll_id = validate_poll_id(&sanitize(&body.poll_id))?;
    let choice = sanitize(&body.choice);
    if choice.is_empty() {
        return Err(ApiError::bad_request("choice: must not be empty"));
    }

    let outcome = state.machine.cast_vote(
        CastVote {
            poll_id,
            voter_id,
            choice,
            signature: body.signature,
        },
        unix_now(),
    )?;

    let message = match outcome.mined_block {
        Some(index) => format!("vote recorded and sealed in block {index}"),
        None => "vote recorded; awaiting the next mined block".to_string(),
    };
    Ok(ok_with_message(outcome, message))
}
