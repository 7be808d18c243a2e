//! Request middleware and auth extractors.
//!
//! Mutating endpoints run the stages in order: rate limit → auth → role →
//! validate → state machine. The rate-limit middleware sits on the router
//! layer, auth and role live in extractors, and validation happens at the
//! top of each handler; any rejection short-circuits the later stages.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts, Request, State};
use axum::http::header::{self, HeaderValue};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use ledger::{Claims, Role, SlidingWindowLimiter};

use crate::error::ApiError;
use crate::state::SharedState;

/// Server-generated id attached to every request and echoed in the
/// `X-Request-ID` response header.
#[derive(Clone, Debug)]
pub struct RequestId(pub String);

/// Tags the request with a fresh id and echoes it on the response.
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = uuid::Uuid::new_v4().to_string();
    req.extensions_mut().insert(RequestId(id.clone()));

    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

/// Client key for rate limiting: the peer address by default.
fn client_key(req: &Request) -> String {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

async fn rate_limit(limiter: &SlidingWindowLimiter, req: Request, next: Next) -> Response {
    let key = client_key(&req);
    if limiter.try_acquire(&key) {
        next.run(req).await
    } else {
        tracing::debug!(client = %key, "request rate limited");
        ApiError::too_many_requests().into_response()
    }
}

/// Strict tier: authentication and registration endpoints.
pub async fn strict_rate_limit(
    State(state): State<SharedState>,
    req: Request,
    next: Next,
) -> Response {
    rate_limit(&state.tiers.strict, req, next).await
}

/// Moderate tier: authenticated mutations and admin operations.
pub async fn moderate_rate_limit(
    State(state): State<SharedState>,
    req: Request,
    next: Next,
) -> Response {
    rate_limit(&state.tiers.moderate, req, next).await
}

/// Generous tier: anonymous read-only endpoints.
pub async fn generous_rate_limit(
    State(state): State<SharedState>,
    req: Request,
    next: Next,
) -> Response {
    rate_limit(&state.tiers.generous, req, next).await
}

/// Extractor for any authenticated caller: validates the bearer token and
/// exposes its claims.
pub struct AuthClaims(pub Claims);

impl FromRequestParts<SharedState> for AuthClaims {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("missing bearer token"))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::unauthorized("authorization header is not a bearer token"))?;

        let claims = state.tokens.validate(token)?;
        Ok(AuthClaims(claims))
    }
}

/// Extractor that additionally requires the admin role.
pub struct AdminClaims(pub Claims);

impl FromRequestParts<SharedState> for AdminClaims {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let AuthClaims(claims) = AuthClaims::from_request_parts(parts, state).await?;
        if claims.role != Role::Admin {
            return Err(ApiError::forbidden("admin role required"));
        }
        Ok(AdminClaims(claims))
    }
}
