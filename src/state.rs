// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::auth::{KeyResolver, PeerKeyResolver, TokenService};
use crate::ceremony::{webauthn::RelyingParty, CeremonyEngine};
use crate::chain::ChainClient;
use crate::auth::tokens::EnclaveSigningKey;
use crate::clients::{Directory, EnclaveClient};
use crate::clock::Clock;
use crate::config::EnclaveConfig;
use crate::error::ApiError;
use crate::models::{normalize_email, User};
use crate::storage::{
    AuditEvent, AuditLog, EncryptedStorage, JsonFileRepository, Repository, StorageError,
};

/// External collaborators of an enclave.
#[derive(Clone)]
pub struct Collaborators {
    pub directory: Arc<dyn Directory>,
    pub enclaves: Arc<dyn EnclaveClient>,
    pub chain: Arc<dyn ChainClient>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<EnclaveConfig>,
    pub repository: Arc<dyn Repository>,
    pub tokens: Arc<TokenService>,
    pub ceremonies: Arc<CeremonyEngine>,
    pub directory: Arc<dyn Directory>,
    pub enclaves: Arc<dyn EnclaveClient>,
    /// Resolves verification keys of peer-minted tokens.
    pub peer_keys: Arc<dyn KeyResolver>,
    pub chain: Arc<dyn ChainClient>,
    pub clock: Arc<dyn Clock>,
    pub audit: AuditLog,
    /// Serializes every read-modify-write of the user aggregate.
    user_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(
        config: EnclaveConfig,
        storage: EncryptedStorage,
        signing_key: EnclaveSigningKey,
        collaborators: Collaborators,
    ) -> Self {
        let Collaborators {
            directory,
            enclaves,
            chain,
            clock,
        } = collaborators;

        let relying_party = RelyingParty::new(&config.frontend_host, &config.frontend_url);
        let peer_keys = Arc::new(PeerKeyResolver::new(directory.clone(), enclaves.clone()));

        Self {
            config: Arc::new(config),
            repository: Arc::new(JsonFileRepository::new(storage.clone())),
            tokens: Arc::new(TokenService::new(signing_key, clock.clone())),
            ceremonies: Arc::new(CeremonyEngine::new(relying_party, clock.clone())),
            directory,
            enclaves,
            peer_keys,
            chain,
            clock,
            audit: AuditLog::new(storage),
            user_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Replace the peer key resolver.
    pub fn with_peer_keys(mut self, resolver: Arc<dyn KeyResolver>) -> Self {
        self.peer_keys = resolver;
        self
    }

    /// Lock and load the registered user. 404 before the first registration.
    pub async fn begin(&self) -> Result<UserTransaction, ApiError> {
        let guard = self.user_lock.clone().lock_owned().await;
        let user = self.repository.get_user().map_err(|e| match e {
            StorageError::NotFound(_) => ApiError::not_found("no account is registered"),
            other => ApiError::from(other),
        })?;
        Ok(UserTransaction::new(guard, self.repository.clone(), user))
    }

    /// Lock and load the user, or start a fresh aggregate for `email`.
    pub async fn begin_or_create(&self, email: &str) -> Result<UserTransaction, ApiError> {
        let guard = self.user_lock.clone().lock_owned().await;
        let user = match self.repository.get_user() {
            Ok(user) => user,
            Err(StorageError::NotFound(_)) => User::new(email),
            Err(e) => return Err(e.into()),
        };
        Ok(UserTransaction::new(guard, self.repository.clone(), user))
    }

    /// Read the user without taking the lock.
    pub fn load_user(&self) -> Result<User, ApiError> {
        self.repository.get_user().map_err(|e| match e {
            StorageError::NotFound(_) => ApiError::not_found("no account is registered"),
            other => ApiError::from(other),
        })
    }

    pub fn peer_token(&self, subject: &str) -> Result<String, ApiError> {
        Ok(self.tokens.peer_token(&normalize_email(subject))?)
    }

    pub fn backend_token(&self, subject: &str) -> Result<String, ApiError> {
        Ok(self.tokens.backend_token(&normalize_email(subject))?)
    }

    pub fn record(&self, event: AuditEvent) {
        self.audit.record(event.with_timestamp(self.clock.now()));
    }
}

/// Exclusive access to the user aggregate for one request.
///
/// Changes are persisted by [`commit`](Self::commit). Dropping the
/// transaction discards them and releases the lock.
pub struct UserTransaction {
    _guard: OwnedMutexGuard<()>,
    repository: Arc<dyn Repository>,
    pub user: User,
}

impl UserTransaction {
    fn new(guard: OwnedMutexGuard<()>, repository: Arc<dyn Repository>, user: User) -> Self {
        Self {
            _guard: guard,
            repository,
            user,
        }
    }

    /// Persist the aggregate and release the lock.
    pub fn commit(self) -> Result<(), ApiError> {
        self.repository.upsert_user(&self.user)?;
        Ok(())
    }
}

impl Deref for UserTransaction {
    type Target = User;

    fn deref(&self) -> &User {
        &self.user
    }
}

impl DerefMut for UserTransaction {
    fn deref_mut(&mut self) -> &mut User {
        &mut self.user
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        tracing::error!(error = %e, "storage failure");
        ApiError::internal(format!("storage failure: {e}"))
    }
}
