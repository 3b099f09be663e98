// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for authenticated callers.
//!
//! Frontend callers present the `session` cookie, peer enclaves present
//! `Authorization: Bearer <token>`:
//!
//! ```rust,ignore
//! async fn list_wallets(
//!     UserSession(session): UserSession,
//!     State(state): State<AppState>,
//! ) -> Result<Json<Vec<WalletResponse>>, ApiError> {
//!     // session.email is the account owner
//! }
//! ```
//!
//! Extraction never takes the user lock. Peer key resolution is a network
//! round trip and must finish before a handler locks the aggregate.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use super::claims::{Audience, Scope};
use super::cookie::read_session_cookie;
use super::tokens::TokenRequirements;
use super::AuthError;
use crate::models::normalize_email;
use crate::state::AppState;
use crate::storage::StorageError;

/// The owner behind a verified frontend session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub email: String,
    pub scope: Scope,
    /// Credential the session was created with, for `user` sessions.
    pub credential: Option<String>,
}

/// Full frontend session.
pub struct UserSession(pub SessionIdentity);

/// Full frontend session issued within the last 15 minutes.
pub struct StrictUserSession(pub SessionIdentity);

/// Session allowed to run the add-credential ceremony: a fresh full session
/// or the narrow session obtained with a one-time code.
pub struct CredentialSession(pub SessionIdentity);

/// Another enclave, identified by its owner's email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSession {
    pub subject: String,
}

async fn frontend_identity(
    parts: &Parts,
    state: &AppState,
    scopes: &[Scope],
    strict: bool,
) -> Result<SessionIdentity, AuthError> {
    let token = read_session_cookie(&parts.headers).ok_or(AuthError::MissingSession)?;

    let requirements = TokenRequirements {
        audience: Audience::Frontend,
        scopes,
        strict,
    };
    let verified = state
        .tokens
        .verify(&token, &requirements, &state.tokens.local_resolver())
        .await?;

    let user = state.repository.get_user().map_err(|e| match e {
        StorageError::NotFound(_) => AuthError::UnknownAccount,
        other => AuthError::InternalError(other.to_string()),
    })?;

    let email = normalize_email(&verified.subject);
    if email != user.email {
        return Err(AuthError::SubjectMismatch);
    }

    if verified.scope == Scope::User {
        let credential = verified.credential.as_deref().unwrap_or_default();
        if !user.credentials.contains_key(credential) {
            return Err(AuthError::CredentialRevoked);
        }
    }

    Ok(SessionIdentity {
        email,
        scope: verified.scope,
        credential: verified.credential,
    })
}

impl FromRequestParts<AppState> for UserSession {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        frontend_identity(parts, state, &[Scope::User], false)
            .await
            .map(UserSession)
    }
}

impl FromRequestParts<AppState> for StrictUserSession {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        frontend_identity(parts, state, &[Scope::User], true)
            .await
            .map(StrictUserSession)
    }
}

impl FromRequestParts<AppState> for CredentialSession {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        frontend_identity(parts, state, &[Scope::User, Scope::CreateCredential], true)
            .await
            .map(CredentialSession)
    }
}

impl FromRequestParts<AppState> for PeerSession {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        // Extract Authorization header
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingAuthHeader)?
            .to_str()
            .map_err(|_| AuthError::InvalidAuthHeader)?;

        // Extract Bearer token
        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::InvalidAuthHeader)?;

        let requirements = TokenRequirements {
            audience: Audience::Peer,
            scopes: &[Scope::Enclave],
            strict: false,
        };
        let verified = state
            .tokens
            .verify(token, &requirements, state.peer_keys.as_ref())
            .await?;

        Ok(PeerSession {
            subject: normalize_email(&verified.subject),
        })
    }
}
