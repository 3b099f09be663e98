// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Verification key resolution.
//!
//! A resolver maps a token subject to the key its signature must verify
//! against. Any failure to obtain a key is an authentication failure.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use jsonwebtoken::DecodingKey;

use super::tokens::decoding_key_from_bytes;
use super::AuthError;
use crate::clients::{Directory, EnclaveClient};
use crate::models::normalize_email;

#[async_trait]
pub trait KeyResolver: Send + Sync {
    async fn resolve(&self, subject: &str) -> Result<DecodingKey, AuthError>;
}

/// Accepts only this enclave's own key, whatever the subject.
#[derive(Clone)]
pub struct LocalKeyResolver {
    key: DecodingKey,
}

impl LocalKeyResolver {
    pub fn new(key: DecodingKey) -> Self {
        Self { key }
    }
}

#[async_trait]
impl KeyResolver for LocalKeyResolver {
    async fn resolve(&self, _subject: &str) -> Result<DecodingKey, AuthError> {
        Ok(self.key.clone())
    }
}

/// Resolves a peer's key live: Directory lookup of the subject's enclave,
/// then that enclave's published verification key.
pub struct PeerKeyResolver {
    directory: Arc<dyn Directory>,
    enclaves: Arc<dyn EnclaveClient>,
}

impl PeerKeyResolver {
    pub fn new(directory: Arc<dyn Directory>, enclaves: Arc<dyn EnclaveClient>) -> Self {
        Self {
            directory,
            enclaves,
        }
    }
}

#[async_trait]
impl KeyResolver for PeerKeyResolver {
    async fn resolve(&self, subject: &str) -> Result<DecodingKey, AuthError> {
        let subject = normalize_email(subject);
        let enclave_url = self
            .directory
            .resolve_enclave_address(&subject)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, peer = %subject, "failed to resolve peer enclave");
                AuthError::KeyResolution(e.to_string())
            })?;

        let key = self
            .enclaves
            .verification_key(&enclave_url)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, peer = %subject, enclave_url = %enclave_url, "failed to fetch peer verification key");
                AuthError::KeyResolution(e.to_string())
            })?;

        decoding_key_from_bytes(&key).map_err(|e| AuthError::KeyResolution(e.to_string()))
    }
}

/// Fixed subject to key table.
#[derive(Clone, Default)]
pub struct StaticKeyResolver {
    keys: HashMap<String, DecodingKey>,
}

impl StaticKeyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, subject: &str, key: DecodingKey) -> Self {
        self.keys.insert(normalize_email(subject), key);
        self
    }
}

#[async_trait]
impl KeyResolver for StaticKeyResolver {
    async fn resolve(&self, subject: &str) -> Result<DecodingKey, AuthError> {
        self.keys
            .get(&normalize_email(subject))
            .cloned()
            .ok_or_else(|| AuthError::KeyResolution(format!("no key known for {subject}")))
    }
}
