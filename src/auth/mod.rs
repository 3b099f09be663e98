// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Capability tokens for frontend sessions, enclave-to-enclave calls and
//! Directory calls.
//!
//! ## Auth Flow
//!
//! 1. A WebAuthn login (or one-time code) succeeds on this enclave
//! 2. The enclave mints an EdDSA token and sets it as the `session` cookie
//! 3. Every request:
//!    - verifies signature, issuer, audience, expiry and not-before
//!    - checks the scope against the endpoint's allow-list
//!    - optionally rejects tokens older than 15 minutes (strict)
//!    - checks the subject against the stored account
//!
//! Peer enclaves send `Authorization: Bearer <token>` minted with their own
//! key. The key is resolved live through the Directory and the peer's
//! `/jwt-verification-key` endpoint.
//!
//! ## Security
//!
//! - The scope claim is required: tokens without one fail to parse
//! - Clock skew tolerance is 60 seconds

pub mod claims;
pub mod cookie;
pub mod error;
pub mod extractor;
pub mod resolver;
pub mod tokens;

pub use claims::{Audience, CapabilityClaims, Scope, VerifiedToken, ISSUER};
pub use error::AuthError;
pub use extractor::{CredentialSession, PeerSession, SessionIdentity, StrictUserSession, UserSession};
pub use resolver::{KeyResolver, LocalKeyResolver, PeerKeyResolver, StaticKeyResolver};
pub use tokens::{EnclaveSigningKey, TokenError, TokenRequirements, TokenService};

impl From<TokenError> for crate::error::ApiError {
    fn from(e: TokenError) -> Self {
        tracing::error!(error = %e, "token service failure");
        crate::error::ApiError::internal(e.to_string())
    }
}
