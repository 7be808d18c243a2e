//! Uniform response envelopes and error-to-status mapping.
//!
//! Every success body is `{success: true, data?, message?}`; every error
//! body is `{success: false, error, error_code}` with a stable code. The
//! request id travels in the `X-Request-ID` response header set by the
//! request-id middleware. No stack traces or internal paths ever reach a
//! response body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use ledger::{IdentityError, VoteError};
use ledger::validation::FieldError;

/// Success envelope.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Wraps `data` in the success envelope.
pub fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        data: Some(data),
        message: None,
    })
}

/// Wraps `data` in the success envelope with a human message.
pub fn ok_with_message<T: Serialize>(data: T, message: impl Into<String>) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        data: Some(data),
        message: Some(message.into()),
    })
}

/// Error envelope body.
#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    error_code: &'static str,
}

/// A failed request: status, stable code, and a human-readable message.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "BAD_REQUEST",
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code: "UNAUTHORIZED",
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            code: "FORBIDDEN",
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "NOT_FOUND",
            message: message.into(),
        }
    }

    pub fn method_not_allowed() -> Self {
        Self {
            status: StatusCode::METHOD_NOT_ALLOWED,
            code: "METHOD_NOT_ALLOWED",
            message: "method not allowed for this route".to_string(),
        }
    }

    pub fn too_many_requests() -> Self {
        Self {
            status: StatusCode::TOO_MANY_REQUESTS,
            code: "TOO_MANY_REQUESTS",
            message: "rate limit exceeded; slow down".to_string(),
        }
    }

    pub fn internal() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL_ERROR",
            message: "unexpected internal error".to_string(),
        }
    }
}

/// State-machine rejections surface as 400 with their specific code.
impl From<VoteError> for ApiError {
    fn from(e: VoteError) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: e.code(),
            message: e.to_string(),
        }
    }
}

impl From<FieldError> for ApiError {
    fn from(e: FieldError) -> Self {
        ApiError::bad_request(e.to_string())
    }
}

impl From<IdentityError> for ApiError {
    fn from(e: IdentityError) -> Self {
        match e {
            IdentityError::InvalidCredentials
            | IdentityError::TokenExpired
            | IdentityError::TokenInvalid(_) => ApiError::unauthorized(e.to_string()),
            IdentityError::DuplicateUsername(_) => ApiError::bad_request(e.to_string()),
            IdentityError::Hashing(_) => {
                tracing::error!(error = %e, "identity failure");
                ApiError::internal()
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            error: self.message,
            error_code: self.code,
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn vote_errors_map_to_bad_request_with_their_code() {
        let err: ApiError = VoteError::DoubleVote("abc".to_string()).into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, "DOUBLE_VOTE");

        let err: ApiError = VoteError::PollNotFound(Uuid::nil()).into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, "POLL_NOT_FOUND");
    }

    #[test]
    fn identity_errors_map_to_unauthorized() {
        let err: ApiError = IdentityError::InvalidCredentials.into();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
        assert_eq!(err.code, "UNAUTHORIZED");

        let err: ApiError = IdentityError::TokenExpired.into();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn status_constructors_carry_stable_codes() {
        assert_eq!(ApiError::too_many_requests().status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ApiError::too_many_requests().code, "TOO_MANY_REQUESTS");
        assert_eq!(ApiError::method_not_allowed().status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(ApiError::internal().code, "INTERNAL_ERROR");
    }
}
