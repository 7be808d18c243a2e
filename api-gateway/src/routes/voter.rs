//! Voter history.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use ledger::validation::validate_voter_id;
use ledger::{HistoryEntry, Role, VoteError};

use crate::error::{ok, ApiError, Envelope};
use crate::middleware::AuthClaims;
use crate::state::SharedState;

/// Response body for `GET /voter/{id}/history`.
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub voter_id: String,
    pub votes: Vec<HistoryEntry>,
    pub total: usize,
}

/// `GET /voter/{id}/history`
///
/// A voter may read their own history; admins may read anyone's.
/// Ballots cast on anonymous polls never appear here.
pub async fn history(
    State(state): State<SharedState>,
    AuthClaims(claims): AuthClaims,
    Path(id): Path<String>,
) -> Result<Json<Envelope<HistoryResponse>>, ApiError> {
    validate_voter_id(&id)?;

    let is_subject = claims.voter_id.as_deref() == Some(id.as_str());
    if claims.role != Role::Admin && !is_subject {
        return Err(ApiError::forbidden("history belongs to another voter"));
    }

    let votes = state.machine.voter_history(&id).map_err(|e| match e {
        VoteError::VoterNotRegistered(_) => {
            ApiError::not_found(format!("voter `{id}` not found"))
        }
        other => other.into(),
    })?;

    let total = votes.len();
    Ok(ok(HistoryResponse {
        voter_id: id,
        votes,
        total,
    }))
}
