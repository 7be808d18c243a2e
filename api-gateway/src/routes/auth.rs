//! Login, token refresh, and caller introspection.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use ledger::validation::{sanitize, validate_voter_id};
use ledger::{crypto, Role};

use crate::error::{ok, ApiError, Envelope};
use crate::middleware::AuthClaims;
use crate::state::SharedState;

/// Request body for `POST /auth/login`.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Request body for `POST /auth/voter-login`.
#[derive(Debug, Deserialize)]
pub struct VoterLoginRequest {
    pub voter_id: String,
    /// PKCS#8 PEM private key issued at registration.
    pub private_key: String,
}

/// Request body for `POST /auth/refresh`.
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub token: String,
}

/// Token response shared by all login flows.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub role: Role,
}

/// `POST /auth/login` with admin credentials.
pub async fn login(
    State(state): State<SharedState>,
    body: Result<Json<LoginRequest>, axum::extract::rejection::JsonRejection>,
) -> Result<Json<Envelope<TokenResponse>>, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let username = sanitize(&body.username);

    let admin = state.admins.validate_credentials(&username, &body.password)?;
    let token = state
        .tokens
        .issue(&admin.id, &admin.email, Role::Admin, None)?;

    Ok(ok(TokenResponse {
        token,
        token_type: "Bearer",
        expires_in: state.tokens.lifetime_secs(),
        role: Role::Admin,
    }))
}

/// `POST /auth/voter-login` via proof of private-key ownership.
pub async fn voter_login(
    State(state): State<SharedState>,
    body: Result<Json<VoterLoginRequest>, axum::extract::rejection::JsonRejection>,
) -> Result<Json<Envelope<TokenResponse>>, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let voter_id = sanitize(&body.voter_id);
    validate_voter_id(&voter_id)?;

    // Unknown voter and wrong key produce the same response, so login
    // attempts cannot probe the registry.
    let voter = state
        .machine
        .voter(&voter_id)
        .ok_or_else(|| ApiError::unauthorized("voter login failed"))?;

    crypto::verify_private_key_ownership(&body.private_key, &voter.public_key, &voter.voter_id)
        .map_err(|_| ApiError::unauthorized("voter login failed"))?;

    let token = state.tokens.issue(
        &voter.voter_id,
        &voter.email,
        Role::Voter,
        Some(&voter.voter_id),
    )?;

    Ok(ok(TokenResponse {
        token,
        token_type: "Bearer",
        expires_in: state.tokens.lifetime_secs(),
        role: Role::Voter,
    }))
}

/// `POST /auth/refresh`: validate, then re-issue with a fresh expiry.
pub async fn refresh(
    State(state): State<SharedState>,
    body: Result<Json<RefreshRequest>, axum::extract::rejection::JsonRejection>,
) -> Result<Json<Envelope<TokenResponse>>, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let claims = state.tokens.validate(&body.token)?;
    let token = state.tokens.refresh(&body.token)?;

    Ok(ok(TokenResponse {
        token,
        token_type: "Bearer",
        expires_in: state.tokens.lifetime_secs(),
        role: claims.role,
    }))
}

/// Claims echoed back by `GET /auth/me`.
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user_id: String,
    pub email: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voter_id: Option<String>,
    pub expires_at: i64,
}

/// `GET /auth/me`
pub async fn me(AuthClaims(claims): AuthClaims) -> Json<Envelope<MeResponse>> {
    ok(MeResponse {
        user_id: claims.user_id,
        email: claims.email,
        role: claims.role,
        voter_id: claims.voter_id,
        expires_at: claims.exp,
    })
}
