// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Typed capability-token claims.
//!
//! Every claim is required at parse time except `credential`, so a token
//! without a scope never deserializes and fails closed.

use serde::{Deserialize, Serialize};

/// `iss` of every token minted by an enclave.
pub const ISSUER: &str = "wallet-enclave";

/// Closed set of capabilities a token can carry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Scope {
    /// Full frontend session.
    User,
    /// Enclave-to-enclave call.
    Enclave,
    /// Narrow session that may only run the add-credential ceremony.
    CreateCredential,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::User => "user",
            Scope::Enclave => "enclave",
            Scope::CreateCredential => "create-credential",
        }
    }
}

/// Who a token is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// The browser session of this enclave's owner.
    Frontend,
    /// Another enclave.
    Peer,
    /// The Directory service.
    Backend,
}

impl Audience {
    pub fn as_str(&self) -> &'static str {
        match self {
            Audience::Frontend => "wallet-enclave",
            Audience::Peer => "wallet-enclave-peer",
            Audience::Backend => "wallet-backend",
        }
    }
}

/// JWT payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CapabilityClaims {
    /// Owner email of the issuing enclave.
    pub sub: String,
    pub scope: Scope,
    pub aud: String,
    pub iss: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    /// Name of the WebAuthn credential a `user` session was created with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

/// Result of a successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    pub subject: String,
    pub scope: Scope,
    pub issued_at: i64,
    pub credential: Option<String>,
}

impl From<CapabilityClaims> for VerifiedToken {
    fn from(claims: CapabilityClaims) -> Self {
        Self {
            subject: claims.sub,
            scope: claims.scope,
            issued_at: claims.iat,
            credential: claims.credential,
        }
    }
}

/// Subject peeked from an unverified token to drive key resolution.
#[derive(Debug, Deserialize)]
pub(crate) struct UnverifiedSubject {
    pub sub: String,
}
