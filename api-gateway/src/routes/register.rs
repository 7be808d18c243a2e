//! Voter registration.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use ledger::validation::{sanitize, validate_email, validate_name};
use ledger::{crypto, NewVoter};

use crate::error::{ok_with_message, ApiError, Envelope};
use crate::state::{unix_now, SharedState};

/// Request body for `POST /register`.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub department: Option<String>,
}

/// Response body for `POST /register`.
///
/// The private key is generated server-side, returned exactly once, and
/// never stored; losing it means losing the ability to log in.
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub voter_id: String,
    pub private_key: String,
    pub public_key: String,
}

/// `POST /register`
pub async fn register(
    State(state): State<SharedState>,
    body: Result<Json<RegisterRequest>, axum::extract::rejection::JsonRejection>,
) -> Result<Json<Envelope<RegisterResponse>>, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let name = sanitize(&body.name);
    let email = sanitize(&body.email).to_lowercase();
    let department = body
        .department
        .as_deref()
        .map(sanitize)
        .filter(|d| !d.is_empty());

    validate_name("name", &name)?;
    validate_email(&email)?;
    if let Some(dep) = &department {
        validate_name("department", dep)?;
    }

    let voter_id = crypto::voter_id_for_email(&email);
    let keys = crypto::generate_keypair().map_err(|e| {
        tracing::error!(error = %e, "keypair generation failed");
        ApiError::internal()
    })?;

    let voter = state.machine.register_voter(
        NewVoter {
            name,
            email,
            department,
            voter_id,
            public_key: keys.public_pem.clone(),
        },
        unix_now(),
    )?;

    tracing::info!(voter_id = %voter.voter_id, "voter registered");

    Ok(ok_with_message(
        RegisterResponse {
            voter_id: voter.voter_id,
            private_key: keys.private_pem,
            public_key: keys.public_pem,
        },
        "registration recorded; store the private key now, it cannot be recovered",
    ))
}
