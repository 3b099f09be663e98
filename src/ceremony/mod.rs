// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Ceremony Engine
//!
//! Binds each WebAuthn challenge to exactly one [`CeremonyPurpose`].
//!
//! ## Lifecycle
//!
//! - **begin**: a fresh challenge replaces any pending ceremony of the same
//!   purpose. The operation bound to the replaced challenge is discarded and
//!   the new payload, if any, is bound to the new challenge.
//! - **finalize**: the session and its operation are removed before the
//!   response is verified, so a challenge is consumed by its first attempt
//!   whether that attempt succeeds or not.
//!
//! The engine only mutates the [`User`] it is given. Persisting the
//! aggregate, including after a failed attempt, is the caller's job.

pub mod otp;
pub mod webauthn;

use std::sync::Arc;

use ring::rand::{SecureRandom, SystemRandom};

use crate::clock::Clock;
use crate::error::ApiError;
use crate::models::{
    CeremonyKind, CeremonyPurpose, CeremonySession, OperationPayload, StoredCredential, User,
};
use webauthn::{
    canonical_credential_id, encode_b64url, AssertionResponse, CreationOptions,
    RegistrationResponse, RelyingParty, RequestOptions, WebAuthnError,
};

/// How long a ceremony may stay pending.
pub const CEREMONY_TTL_SECS: i64 = 5 * 60;

pub const MAX_CREDENTIAL_NAME_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum CeremonyError {
    #[error("{0} ceremony was not initialized")]
    NotInitialized(CeremonyPurpose),

    #[error("{0} ceremony expired")]
    Expired(CeremonyPurpose),

    #[error("{0} is not a {1:?} ceremony")]
    WrongKind(CeremonyPurpose, CeremonyKind),

    #[error("credential name must be 1 to 32 ASCII letters or digits")]
    InvalidName,

    #[error("credential name {0} is already in use")]
    DuplicateName(String),

    #[error("authenticator is already registered")]
    DuplicateCredential,

    #[error("unknown credential")]
    UnknownCredential,

    #[error("no operation is bound to this ceremony")]
    MissingOperation,

    #[error("ceremony verification failed: {0}")]
    Verification(#[from] WebAuthnError),

    #[error("system randomness unavailable")]
    Random,
}

impl From<CeremonyError> for ApiError {
    fn from(e: CeremonyError) -> Self {
        match e {
            CeremonyError::NotInitialized(_)
            | CeremonyError::Expired(_)
            | CeremonyError::WrongKind(..)
            | CeremonyError::InvalidName
            | CeremonyError::MissingOperation => ApiError::bad_request(e.to_string()),
            CeremonyError::DuplicateName(_) | CeremonyError::DuplicateCredential => {
                ApiError::conflict(e.to_string())
            }
            CeremonyError::UnknownCredential | CeremonyError::Verification(_) => {
                tracing::warn!(error = %e, "ceremony verification failed");
                ApiError::unauthorized(e.to_string())
            }
            CeremonyError::Random => ApiError::internal(e.to_string()),
        }
    }
}

/// Outcome of a successful authentication ceremony.
#[derive(Debug, Clone, PartialEq)]
pub struct Authenticated {
    /// Name of the credential that signed the assertion.
    pub credential_name: String,
    /// Operation released by the ceremony, for payload-carrying purposes.
    pub operation: Option<OperationPayload>,
}

pub fn validate_credential_name(name: &str) -> Result<(), CeremonyError> {
    if name.is_empty()
        || name.len() > MAX_CREDENTIAL_NAME_LEN
        || !name.bytes().all(|b| b.is_ascii_alphanumeric())
    {
        return Err(CeremonyError::InvalidName);
    }
    Ok(())
}

fn random_challenge() -> Result<String, CeremonyError> {
    let mut bytes = [0u8; 32];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| CeremonyError::Random)?;
    Ok(encode_b64url(&bytes))
}

pub struct CeremonyEngine {
    rp: RelyingParty,
    clock: Arc<dyn Clock>,
}

impl CeremonyEngine {
    pub fn new(rp: RelyingParty, clock: Arc<dyn Clock>) -> Self {
        Self { rp, clock }
    }

    pub fn relying_party(&self) -> &RelyingParty {
        &self.rp
    }

    fn begin(
        &self,
        user: &mut User,
        purpose: CeremonyPurpose,
        payload: Option<OperationPayload>,
    ) -> Result<String, CeremonyError> {
        let challenge = random_challenge()?;
        let session = CeremonySession {
            challenge: challenge.clone(),
            kind: purpose.kind(),
            created_at: self.clock.unix(),
        };

        if let Some(previous) = user.pending_ceremonies.insert(purpose, session) {
            user.pending_operations.remove(&previous.challenge);
        }
        if let Some(payload) = payload {
            user.pending_operations.insert(challenge.clone(), payload);
        }
        Ok(challenge)
    }

    pub fn begin_registration(
        &self,
        user: &mut User,
        purpose: CeremonyPurpose,
    ) -> Result<CreationOptions, CeremonyError> {
        if purpose.kind() != CeremonyKind::Registration {
            return Err(CeremonyError::WrongKind(purpose, CeremonyKind::Registration));
        }
        let challenge = self.begin(user, purpose, None)?;
        Ok(self.rp.creation_options(user, &challenge))
    }

    pub fn begin_authentication(
        &self,
        user: &mut User,
        purpose: CeremonyPurpose,
        payload: Option<OperationPayload>,
    ) -> Result<RequestOptions, CeremonyError> {
        if purpose.kind() != CeremonyKind::Authentication {
            return Err(CeremonyError::WrongKind(purpose, CeremonyKind::Authentication));
        }
        let challenge = self.begin(user, purpose, payload)?;
        Ok(self.rp.request_options(user, &challenge))
    }

    /// Remove the pending session for `purpose` and the operation bound to it.
    fn consume(
        &self,
        user: &mut User,
        purpose: CeremonyPurpose,
    ) -> Result<(CeremonySession, Option<OperationPayload>), CeremonyError> {
        let session = user
            .pending_ceremonies
            .remove(&purpose)
            .ok_or(CeremonyError::NotInitialized(purpose))?;
        let operation = user.pending_operations.remove(&session.challenge);

        if session.kind != purpose.kind() {
            return Err(CeremonyError::WrongKind(purpose, purpose.kind()));
        }
        if self.clock.unix() - session.created_at > CEREMONY_TTL_SECS {
            return Err(CeremonyError::Expired(purpose));
        }
        Ok((session, operation))
    }

    /// Verify a registration and store the credential under `name`.
    pub fn finalize_registration(
        &self,
        user: &mut User,
        purpose: CeremonyPurpose,
        name: &str,
        response: &RegistrationResponse,
    ) -> Result<(), CeremonyError> {
        validate_credential_name(name)?;
        if user.credentials.contains_key(name) {
            return Err(CeremonyError::DuplicateName(name.to_string()));
        }

        let (session, _) = self.consume(user, purpose)?;
        let registered = self.rp.verify_registration(&session.challenge, response)?;

        if user.credential_name_for_id(&registered.id).is_some() {
            return Err(CeremonyError::DuplicateCredential);
        }

        user.credentials.insert(
            name.to_string(),
            StoredCredential {
                id: registered.id,
                public_key: registered.public_key,
                sign_count: registered.sign_count,
                created_at: self.clock.now(),
            },
        );
        Ok(())
    }

    /// Verify an assertion, identifying the credential that produced it.
    pub fn finalize_authentication(
        &self,
        user: &mut User,
        purpose: CeremonyPurpose,
        response: &AssertionResponse,
    ) -> Result<Authenticated, CeremonyError> {
        let (session, operation) = self.consume(user, purpose)?;

        let credential_id = canonical_credential_id(&response.raw_id)?;
        let credential_name = user
            .credential_name_for_id(&credential_id)
            .ok_or(CeremonyError::UnknownCredential)?
            .to_string();

        if let Some(handle) = &response.response.user_handle {
            if handle.trim_end_matches('=') != user.webauthn_id {
                return Err(WebAuthnError::UserHandleMismatch.into());
            }
        }

        let credential = user
            .credentials
            .get_mut(&credential_name)
            .ok_or(CeremonyError::UnknownCredential)?;
        let sign_count = self
            .rp
            .verify_assertion(&session.challenge, response, credential)?;
        credential.sign_count = sign_count;

        if purpose.carries_payload() && operation.is_none() {
            return Err(CeremonyError::MissingOperation);
        }

        Ok(Authenticated {
            credential_name,
            operation,
        })
    }
}
