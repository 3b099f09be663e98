// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Encrypted Storage Module
//!
//! Persistent storage for the enclave's single account. Everything lives
//! under the data directory, which is mounted encrypted by the enclave
//! runtime.
//!
//! ## Storage Layout
//!
//! ```text
//! /data/
//!   user_data.json        # The user aggregate
//!   signing_key.json      # Ed25519 capability-token signing key
//!   audit/
//!     {date}/events.jsonl # Daily audit logs
//! ```
//!
//! ## Important Notes
//!
//! - This module uses **normal filesystem I/O**
//! - The aggregate is always rewritten whole, via temp file and rename

pub mod audit;
pub mod encrypted_fs;
pub mod paths;
pub mod repository;

pub use audit::{AuditEvent, AuditEventType, AuditLog};
pub use encrypted_fs::{EncryptedStorage, StorageError, StorageResult};
pub use paths::StoragePaths;
pub use repository::{JsonFileRepository, Repository, StoredSigningKey};
