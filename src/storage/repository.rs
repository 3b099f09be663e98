// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Persistence of the single user aggregate and the token signing key.

use serde::{Deserialize, Serialize};

use super::{EncryptedStorage, StorageError, StorageResult};
use crate::models::User;

/// Persisted form of the enclave's Ed25519 token signing key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSigningKey {
    /// Standard base64 of the 32-byte secret seed.
    pub private_key: String,
    /// Standard base64 of the 32-byte public key.
    pub public_key: String,
}

/// Storage collaborator for the enclave.
///
/// `get_user` reports [`StorageError::NotFound`] until the first registration.
pub trait Repository: Send + Sync {
    fn get_user(&self) -> StorageResult<User>;
    fn upsert_user(&self, user: &User) -> StorageResult<()>;
    fn get_signing_key(&self) -> StorageResult<StoredSigningKey>;
    fn save_signing_key(&self, key: &StoredSigningKey) -> StorageResult<()>;
    /// Verify the backing store is writable.
    fn health_check(&self) -> StorageResult<()>;
}

/// JSON documents on the encrypted data directory.
pub struct JsonFileRepository {
    storage: EncryptedStorage,
}

impl JsonFileRepository {
    pub fn new(storage: EncryptedStorage) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &EncryptedStorage {
        &self.storage
    }
}

impl Repository for JsonFileRepository {
    fn get_user(&self) -> StorageResult<User> {
        let path = self.storage.paths().user_data();
        if !self.storage.exists(&path) {
            return Err(StorageError::NotFound("user".to_string()));
        }
        self.storage.read_json(path)
    }

    fn upsert_user(&self, user: &User) -> StorageResult<()> {
        self.storage.write_json(self.storage.paths().user_data(), user)
    }

    fn get_signing_key(&self) -> StorageResult<StoredSigningKey> {
        let path = self.storage.paths().signing_key();
        if !self.storage.exists(&path) {
            return Err(StorageError::NotFound("signing key".to_string()));
        }
        self.storage.read_json(path)
    }

    fn save_signing_key(&self, key: &StoredSigningKey) -> StorageResult<()> {
        self.storage.write_json(self.storage.paths().signing_key(), key)
    }

    fn health_check(&self) -> StorageResult<()> {
        self.storage.health_check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoragePaths;
    use tempfile::TempDir;

    fn setup() -> (TempDir, JsonFileRepository) {
        let temp = TempDir::new().unwrap();
        let mut storage = EncryptedStorage::new(StoragePaths::new(temp.path()));
        storage.initialize().unwrap();
        (temp, JsonFileRepository::new(storage))
    }

    #[test]
    fn missing_user_is_not_found() {
        let (_temp, repo) = setup();
        assert!(matches!(repo.get_user(), Err(StorageError::NotFound(_))));
    }

    #[test]
    fn upsert_then_get_returns_same_user() {
        let (_temp, repo) = setup();
        let mut user = User::new("owner@example.com");
        repo.upsert_user(&user).unwrap();

        user.otp = None;
        user.wallets.clear();
        repo.upsert_user(&user).unwrap();

        assert_eq!(repo.get_user().unwrap(), user);
    }

    #[test]
    fn signing_key_persists() {
        let (_temp, repo) = setup();
        assert!(matches!(
            repo.get_signing_key(),
            Err(StorageError::NotFound(_))
        ));

        repo.save_signing_key(&StoredSigningKey {
            private_key: "cHJpdmF0ZQ==".to_string(),
            public_key: "cHVibGlj".to_string(),
        })
        .unwrap();

        assert_eq!(repo.get_signing_key().unwrap().public_key, "cHVibGlj");
    }
}
