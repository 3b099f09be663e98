// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Authentication error type.
///
/// Every verification failure, including an unreachable peer key, maps to
/// 401. Only local storage failures while checking the subject are 500.
#[derive(Debug)]
pub enum AuthError {
    /// No session cookie present
    MissingSession,
    /// No authorization header present
    MissingAuthHeader,
    /// Invalid authorization header format
    InvalidAuthHeader,
    /// Token is malformed or a required claim is missing
    MalformedToken,
    /// Token signature is invalid
    InvalidSignature,
    /// Token has expired
    TokenExpired,
    /// Token issuer is invalid
    InvalidIssuer,
    /// Token audience is invalid
    InvalidAudience,
    /// Token is not yet valid
    TokenNotYetValid,
    /// The verification key for the token subject could not be obtained
    KeyResolution(String),
    /// Scope not accepted by this endpoint
    ScopeNotAllowed,
    /// Issued too long ago for an irreversible action
    StaleToken,
    /// A `user` session without its credential claim
    MissingCredentialClaim,
    /// The credential the session was created with no longer exists
    CredentialRevoked,
    /// Subject is not the account served by this enclave
    SubjectMismatch,
    /// No account has been registered yet
    UnknownAccount,
    /// Internal error
    InternalError(String),
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingSession => "missing_session",
            AuthError::MissingAuthHeader => "missing_auth_header",
            AuthError::InvalidAuthHeader => "invalid_auth_header",
            AuthError::MalformedToken => "malformed_token",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::TokenExpired => "token_expired",
            AuthError::InvalidIssuer => "invalid_issuer",
            AuthError::InvalidAudience => "invalid_audience",
            AuthError::TokenNotYetValid => "token_not_yet_valid",
            AuthError::KeyResolution(_) => "key_resolution_failed",
            AuthError::ScopeNotAllowed => "scope_not_allowed",
            AuthError::StaleToken => "stale_token",
            AuthError::MissingCredentialClaim => "missing_credential_claim",
            AuthError::CredentialRevoked => "credential_revoked",
            AuthError::SubjectMismatch => "subject_mismatch",
            AuthError::UnknownAccount => "unknown_account",
            AuthError::InternalError(_) => "internal_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingSession => write!(f, "A session cookie is required"),
            AuthError::MissingAuthHeader => write!(f, "Authorization header is required"),
            AuthError::InvalidAuthHeader => {
                write!(f, "Invalid authorization header format (expected 'Bearer <token>')")
            }
            AuthError::MalformedToken => write!(f, "Token is malformed"),
            AuthError::InvalidSignature => write!(f, "Token signature is invalid"),
            AuthError::TokenExpired => write!(f, "Token has expired"),
            AuthError::InvalidIssuer => write!(f, "Token issuer is invalid"),
            AuthError::InvalidAudience => write!(f, "Token audience is invalid"),
            AuthError::TokenNotYetValid => write!(f, "Token is not yet valid"),
            AuthError::KeyResolution(msg) => {
                write!(f, "Failed to resolve token verification key: {msg}")
            }
            AuthError::ScopeNotAllowed => write!(f, "Token scope is not allowed for this operation"),
            AuthError::StaleToken => {
                write!(f, "This operation requires a session created in the last 15 minutes")
            }
            AuthError::MissingCredentialClaim => write!(f, "Session is not bound to a credential"),
            AuthError::CredentialRevoked => {
                write!(f, "The credential this session was created with was removed")
            }
            AuthError::SubjectMismatch => write!(f, "Token subject does not match this account"),
            AuthError::UnknownAccount => write!(f, "No account is registered on this enclave"),
            AuthError::InternalError(msg) => write!(f, "Internal authentication error: {msg}"),
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}

impl From<AuthError> for crate::error::ApiError {
    fn from(e: AuthError) -> Self {
        crate::error::ApiError::new(e.status_code(), e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn missing_session_returns_401() {
        let response = AuthError::MissingSession.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();
        assert_eq!(body["error_code"], "missing_session");
    }

    #[test]
    fn resolution_and_scope_failures_are_authentication_failures() {
        assert_eq!(
            AuthError::KeyResolution("peer down".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(AuthError::ScopeNotAllowed.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::StaleToken.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn internal_error_returns_500() {
        assert_eq!(
            AuthError::InternalError("disk".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
