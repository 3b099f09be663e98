// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Enclave Data Models
//!
//! This module defines the single [`User`] aggregate owned by the enclave and
//! every value stored inside it. The aggregate is persisted as one JSON
//! document and is only ever mutated through a
//! [`UserTransaction`](crate::state::UserTransaction).
//!
//! ## Model Categories
//!
//! - **Ceremonies**: pending WebAuthn sessions keyed by purpose and the
//!   operations bound to their challenges
//! - **Credentials**: registered authenticators keyed by a unique name
//! - **Wallets**: secp256k1 keys with a derived address
//! - **Emergency Access**: mirrored contact/grant relationships
//! - **Transactions**: parameters awaiting authorization

use std::collections::BTreeMap;

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;
use utoipa::ToSchema;

/// Name of the wallet provisioned on registration.
pub const DEFAULT_WALLET_NAME: &str = "Default";

/// Canonical form of an email address used as token subject and map key.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().nfkc().collect::<String>().to_lowercase()
}

// =============================================================================
// Ceremonies
// =============================================================================

/// What a WebAuthn ceremony authorizes. A challenge issued for one purpose
/// can never finalize another.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "kebab-case")]
pub enum CeremonyPurpose {
    Register,
    Login,
    AddCredential,
    SignTransaction,
    SendTransaction,
}

impl CeremonyPurpose {
    pub fn kind(self) -> CeremonyKind {
        match self {
            CeremonyPurpose::Register | CeremonyPurpose::AddCredential => {
                CeremonyKind::Registration
            }
            CeremonyPurpose::Login
            | CeremonyPurpose::SignTransaction
            | CeremonyPurpose::SendTransaction => CeremonyKind::Authentication,
        }
    }

    /// Whether a finalize of this purpose releases a pending operation.
    pub fn carries_payload(self) -> bool {
        matches!(
            self,
            CeremonyPurpose::SignTransaction | CeremonyPurpose::SendTransaction
        )
    }
}

impl std::fmt::Display for CeremonyPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CeremonyPurpose::Register => "register",
            CeremonyPurpose::Login => "login",
            CeremonyPurpose::AddCredential => "add-credential",
            CeremonyPurpose::SignTransaction => "sign-transaction",
            CeremonyPurpose::SendTransaction => "send-transaction",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CeremonyKind {
    Registration,
    Authentication,
}

/// An in-flight ceremony. Removed on the first finalize attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CeremonySession {
    /// Base64url challenge, also the key into `pending_operations`.
    pub challenge: String,
    pub kind: CeremonyKind,
    /// Unix seconds.
    pub created_at: i64,
}

/// Side effect released by a successful authentication ceremony.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "params", rename_all = "snake_case")]
pub enum OperationPayload {
    Transaction(TransactionParams),
}

// =============================================================================
// Credentials
// =============================================================================

/// Public key of a registered authenticator, coordinates base64url encoded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "alg", rename_all = "snake_case")]
pub enum CredentialPublicKey {
    /// COSE alg -7, P-256 affine coordinates.
    Es256 { x: String, y: String },
    /// COSE alg -8, Ed25519 public key.
    EdDsa { x: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredCredential {
    /// Base64url credential id as reported by the authenticator.
    pub id: String,
    pub public_key: CredentialPublicKey,
    pub sign_count: u32,
    pub created_at: DateTime<Utc>,
}

/// A credential as listed to the frontend.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct CredentialSummary {
    pub name: String,
    /// True for the credential the current session was created with.
    pub currently_used: bool,
}

// =============================================================================
// Wallets
// =============================================================================

/// A custodied secp256k1 wallet. The private key never leaves the enclave
/// except to the emergency contact during a takeover.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Wallet {
    pub name: String,
    /// 0x-prefixed EIP-55 address.
    pub address: String,
    /// PKCS#8 PEM.
    pub private_key_pem: String,
    /// Public wallets are published to the Directory.
    pub public: bool,
}

/// Wallet without key material.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct WalletResponse {
    pub name: String,
    pub address: String,
    pub public: bool,
}

impl From<&Wallet> for WalletResponse {
    fn from(wallet: &Wallet) -> Self {
        Self {
            name: wallet.name.clone(),
            address: wallet.address.clone(),
            public: wallet.public,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateWalletRequest {
    pub name: String,
    #[serde(default)]
    pub public: bool,
}

// =============================================================================
// One-Time Code
// =============================================================================

/// Fallback credential allowing a new device to register an authenticator.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct OneTimeCode {
    #[serde(rename = "otp")]
    pub secret: String,
    /// Unix seconds.
    pub valid_until: i64,
    pub times_tried: u32,
    pub active: bool,
}

impl OneTimeCode {
    pub fn is_expired(&self, now: i64) -> bool {
        now > self.valid_until
    }
}

// =============================================================================
// Emergency Access
// =============================================================================

/// One half of an emergency-access relationship.
///
/// The owner stores it as a [`ContactState`] keyed by the contact's email, the
/// contact stores the mirror as a [`GrantState`] keyed by the owner's email.
/// `has_requested_takeover` is always paired with a non-zero
/// `takeover_allowed_after`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct EmergencyRelationship {
    /// Email of the other side.
    pub email: String,
    pub enclave_url: String,
    pub has_accepted: bool,
    pub has_requested_takeover: bool,
    pub waiting_period_in_days: u32,
    /// Unix seconds, 0 when no takeover was requested.
    pub takeover_allowed_after: i64,
    /// Directory notification series, owner side only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_series_id: Option<String>,
}

pub type ContactState = EmergencyRelationship;
pub type GrantState = EmergencyRelationship;

impl EmergencyRelationship {
    pub fn invited(
        email: impl Into<String>,
        enclave_url: impl Into<String>,
        waiting_period_in_days: u32,
    ) -> Self {
        Self {
            email: email.into(),
            enclave_url: enclave_url.into(),
            has_accepted: false,
            has_requested_takeover: false,
            waiting_period_in_days,
            takeover_allowed_after: 0,
            notification_series_id: None,
        }
    }

    pub fn mark_takeover_requested(&mut self, allowed_after: i64, series_id: Option<String>) {
        self.has_requested_takeover = true;
        self.takeover_allowed_after = allowed_after;
        self.notification_series_id = series_id;
    }

    pub fn clear_takeover_request(&mut self) {
        self.has_requested_takeover = false;
        self.takeover_allowed_after = 0;
        self.notification_series_id = None;
    }

    pub fn is_takeover_eligible(&self, now: i64) -> bool {
        self.has_requested_takeover
            && self.takeover_allowed_after != 0
            && now >= self.takeover_allowed_after
    }
}

/// One item of a Directory notification series.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct ScheduledNotification {
    /// Unix seconds.
    pub send_after: i64,
    pub title: String,
    pub body: String,
}

// =============================================================================
// Transactions
// =============================================================================

/// EVM transaction parameters as received from the frontend.
///
/// Numeric fields are 0x-hex. Missing optional fields are filled by the
/// chain client when the transaction is built.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionParams {
    /// `0x1` legacy (access-list when `accessList` is set) or `0x2` EIP-1559.
    #[serde(rename = "type")]
    pub tx_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    pub to: String,
    pub from: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_priority_fee_per_gas: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fee_per_gas: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Vec<Object>>)]
    pub access_list: Option<alloy::eips::eip2930::AccessList>,
    pub chain_id: String,
}

// =============================================================================
// User Aggregate
// =============================================================================

/// The one account this enclave serves.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub email: String,
    /// Opaque WebAuthn user handle, base64url.
    pub webauthn_id: String,
    #[serde(default)]
    pub credentials: BTreeMap<String, StoredCredential>,
    #[serde(default)]
    pub pending_ceremonies: BTreeMap<CeremonyPurpose, CeremonySession>,
    /// Keyed by the challenge of the ceremony that must complete first.
    #[serde(default)]
    pub pending_operations: BTreeMap<String, OperationPayload>,
    #[serde(default)]
    pub wallets: Vec<Wallet>,
    #[serde(default)]
    pub otp: Option<OneTimeCode>,
    #[serde(default)]
    pub emergency_contacts: BTreeMap<String, ContactState>,
    #[serde(default)]
    pub emergency_grants: BTreeMap<String, GrantState>,
}

impl User {
    pub fn new(email: &str) -> Self {
        let handle = uuid::Uuid::new_v4();
        Self {
            email: normalize_email(email),
            webauthn_id: Base64UrlUnpadded::encode_string(handle.as_bytes()),
            credentials: BTreeMap::new(),
            pending_ceremonies: BTreeMap::new(),
            pending_operations: BTreeMap::new(),
            wallets: Vec::new(),
            otp: None,
            emergency_contacts: BTreeMap::new(),
            emergency_grants: BTreeMap::new(),
        }
    }

    pub fn is_registered(&self) -> bool {
        !self.credentials.is_empty()
    }

    /// Name of the credential with the given base64url id.
    pub fn credential_name_for_id(&self, credential_id: &str) -> Option<&str> {
        self.credentials
            .iter()
            .find(|(_, credential)| credential.id == credential_id)
            .map(|(name, _)| name.as_str())
    }

    pub fn wallet_by_address(&self, address: &str) -> Option<&Wallet> {
        self.wallets
            .iter()
            .find(|wallet| wallet.address.eq_ignore_ascii_case(address))
    }

    pub fn has_wallet_named(&self, name: &str) -> bool {
        self.wallets.iter().any(|wallet| wallet.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails_are_normalized() {
        assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
        // Fullwidth characters fold under NFKC.
        assert_eq!(normalize_email("ｂｏｂ@example.com"), "bob@example.com");
    }

    #[test]
    fn takeover_eligibility_requires_request_and_elapsed_period() {
        let mut contact = ContactState::invited("c@example.com", "https://c.example.com", 7);
        assert!(!contact.is_takeover_eligible(i64::MAX));

        contact.mark_takeover_requested(1_000, Some("series-1".to_string()));
        assert!(!contact.is_takeover_eligible(999));
        assert!(contact.is_takeover_eligible(1_000));

        contact.clear_takeover_request();
        assert_eq!(contact.takeover_allowed_after, 0);
        assert!(contact.notification_series_id.is_none());
        assert!(!contact.has_requested_takeover);
    }

    #[test]
    fn ceremony_purposes_map_to_kinds() {
        assert_eq!(CeremonyPurpose::Register.kind(), CeremonyKind::Registration);
        assert_eq!(CeremonyPurpose::AddCredential.kind(), CeremonyKind::Registration);
        assert_eq!(CeremonyPurpose::Login.kind(), CeremonyKind::Authentication);
        assert!(CeremonyPurpose::SendTransaction.carries_payload());
        assert!(!CeremonyPurpose::Login.carries_payload());
    }

    #[test]
    fn user_aggregate_round_trips_with_enum_keys() {
        let mut user = User::new("Owner@Example.com");
        user.pending_ceremonies.insert(
            CeremonyPurpose::Login,
            CeremonySession {
                challenge: "abc".to_string(),
                kind: CeremonyKind::Authentication,
                created_at: 1,
            },
        );
        let json = serde_json::to_string(&user).unwrap();
        assert!(json.contains("\"login\""));
        let back: User = serde_json::from_str(&json).unwrap();
        assert_eq!(back, user);
        assert_eq!(back.email, "owner@example.com");
    }
}
