// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory collaborators and enclave fixtures for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use crate::auth::EnclaveSigningKey;
use crate::ceremony::webauthn::soft::SoftAuthenticator;
use crate::chain::{signing::generate_wallet, ChainClient, ChainError, Fees, Network, SignedTransaction};
use crate::clients::{
    Directory, DirectoryError, EnclaveClient, PeerCall, PeerError, TakeoverResponse,
};
use crate::clock::ManualClock;
use crate::config::EnclaveConfig;
use crate::models::{CeremonyPurpose, ScheduledNotification, TransactionParams, User, DEFAULT_WALLET_NAME};
use crate::state::{AppState, Collaborators};
use crate::storage::{EncryptedStorage, StoragePaths};

pub const OWNER: &str = "owner@example.com";
pub const OWNER_CREDENTIAL: &str = "laptop";

// =============================================================================
// Directory
// =============================================================================

#[derive(Default)]
struct DirectoryRecord {
    addresses: HashMap<String, String>,
    series: HashMap<String, Vec<ScheduledNotification>>,
    cancelled: HashSet<String>,
    sent: Vec<(String, String)>,
    deleted_accounts: Vec<String>,
    published: Vec<(String, String, String)>,
    next_series: u32,
    unavailable: bool,
}

/// Directory fake. Cancellation is not idempotent, like the real service.
#[derive(Default)]
pub struct FakeDirectory {
    record: Mutex<DirectoryRecord>,
}

impl FakeDirectory {
    pub fn register_enclave(&self, email: &str, enclave_url: &str) {
        self.record
            .lock()
            .unwrap()
            .addresses
            .insert(email.to_string(), enclave_url.to_string());
    }

    /// Make every subsequent call fail with a request error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.record.lock().unwrap().unavailable = unavailable;
    }

    pub fn active_series(&self) -> Vec<String> {
        let record = self.record.lock().unwrap();
        record
            .series
            .keys()
            .filter(|id| !record.cancelled.contains(*id))
            .cloned()
            .collect()
    }

    pub fn series(&self, id: &str) -> Option<Vec<ScheduledNotification>> {
        self.record.lock().unwrap().series.get(id).cloned()
    }

    pub fn is_cancelled(&self, id: &str) -> bool {
        self.record.lock().unwrap().cancelled.contains(id)
    }

    pub fn sent_titles(&self) -> Vec<String> {
        let record = self.record.lock().unwrap();
        record.sent.iter().map(|(title, _)| title.clone()).collect()
    }

    pub fn deleted_accounts(&self) -> Vec<String> {
        self.record.lock().unwrap().deleted_accounts.clone()
    }

    pub fn published_addresses(&self) -> Vec<String> {
        let record = self.record.lock().unwrap();
        record.published.iter().map(|(_, address, _)| address.clone()).collect()
    }

    fn check_available(&self) -> Result<(), DirectoryError> {
        if self.record.lock().unwrap().unavailable {
            return Err(DirectoryError::Request("directory unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Directory for FakeDirectory {
    async fn resolve_enclave_address(&self, email: &str) -> Result<String, DirectoryError> {
        self.check_available()?;
        self.record
            .lock()
            .unwrap()
            .addresses
            .get(email)
            .cloned()
            .ok_or_else(|| DirectoryError::UnknownUser(email.to_string()))
    }

    async fn schedule_notification_series(
        &self,
        _token: &str,
        notifications: &[ScheduledNotification],
    ) -> Result<String, DirectoryError> {
        self.check_available()?;
        let mut record = self.record.lock().unwrap();
        record.next_series += 1;
        let id = format!("series-{}", record.next_series);
        record.series.insert(id.clone(), notifications.to_vec());
        Ok(id)
    }

    async fn cancel_notification_series(
        &self,
        _token: &str,
        series_id: &str,
    ) -> Result<(), DirectoryError> {
        self.check_available()?;
        let mut record = self.record.lock().unwrap();
        if !record.series.contains_key(series_id) || !record.cancelled.insert(series_id.to_string())
        {
            return Err(DirectoryError::Rejected {
                status: 404,
                message: format!("unknown notification series {series_id}"),
            });
        }
        Ok(())
    }

    async fn send_notification(
        &self,
        _token: &str,
        title: &str,
        body: &str,
    ) -> Result<(), DirectoryError> {
        self.check_available()?;
        self.record
            .lock()
            .unwrap()
            .sent
            .push((title.to_string(), body.to_string()));
        Ok(())
    }

    async fn delete_account(&self, token: &str) -> Result<(), DirectoryError> {
        self.check_available()?;
        self.record
            .lock()
            .unwrap()
            .deleted_accounts
            .push(token.to_string());
        Ok(())
    }

    async fn publish_wallet_initialize(
        &self,
        _token: &str,
        address: &str,
    ) -> Result<String, DirectoryError> {
        self.check_available()?;
        Ok(format!("publish {address}"))
    }

    async fn publish_wallet_finalize(
        &self,
        _token: &str,
        name: &str,
        address: &str,
        signature: &str,
    ) -> Result<(), DirectoryError> {
        self.check_available()?;
        self.record.lock().unwrap().published.push((
            name.to_string(),
            address.to_string(),
            signature.to_string(),
        ));
        Ok(())
    }
}

// =============================================================================
// Peer enclaves
// =============================================================================

/// How [`RecordingEnclaves`] answers.
#[derive(Debug, Clone)]
pub enum PeerBehavior {
    Succeed,
    Unreachable,
    Reject { status: u16, message: String },
}

/// Records peer calls and answers each according to its [`PeerBehavior`].
pub struct RecordingEnclaves {
    calls: Mutex<Vec<(String, String)>>,
    behavior: Mutex<PeerBehavior>,
    takeover: Mutex<TakeoverResponse>,
    allowed_after: Mutex<i64>,
}

impl Default for RecordingEnclaves {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            behavior: Mutex::new(PeerBehavior::Succeed),
            takeover: Mutex::new(TakeoverResponse {
                jwt: "owner-backend-token".to_string(),
                wallets: Vec::new(),
            }),
            allowed_after: Mutex::new(0),
        }
    }
}

impl RecordingEnclaves {
    /// `(operation, enclave_url)` pairs in call order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn operations(&self) -> Vec<String> {
        self.calls().into_iter().map(|(operation, _)| operation).collect()
    }

    pub fn behave(&self, behavior: PeerBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn allow_takeover_after(&self, unix: i64) {
        *self.allowed_after.lock().unwrap() = unix;
    }

    pub fn hand_over(&self, response: TakeoverResponse) {
        *self.takeover.lock().unwrap() = response;
    }

    fn record(&self, operation: &str, enclave_url: &str) -> Result<(), PeerError> {
        self.calls
            .lock()
            .unwrap()
            .push((operation.to_string(), enclave_url.to_string()));
        match self.behavior.lock().unwrap().clone() {
            PeerBehavior::Succeed => Ok(()),
            PeerBehavior::Unreachable => Err(PeerError::Request("peer unreachable".to_string())),
            PeerBehavior::Reject { status, message } => Err(PeerError::Rejected { status, message }),
        }
    }
}

#[async_trait]
impl EnclaveClient for RecordingEnclaves {
    async fn verification_key(&self, enclave_url: &str) -> Result<Vec<u8>, PeerError> {
        self.record("verification_key", enclave_url)?;
        Err(PeerError::InvalidResponse("no keys in recording fake".to_string()))
    }

    async fn invite(&self, call: PeerCall<'_>, _days: u32) -> Result<(), PeerError> {
        self.record("invite", call.enclave_url)
    }

    async fn respond_invitation(&self, call: PeerCall<'_>, _accept: bool) -> Result<(), PeerError> {
        self.record("respond_invitation", call.enclave_url)
    }

    async fn request_access(&self, call: PeerCall<'_>) -> Result<i64, PeerError> {
        self.record("request_access", call.enclave_url)?;
        Ok(*self.allowed_after.lock().unwrap())
    }

    async fn request_takeover(&self, call: PeerCall<'_>) -> Result<TakeoverResponse, PeerError> {
        self.record("request_takeover", call.enclave_url)?;
        Ok(self.takeover.lock().unwrap().clone())
    }

    async fn remove_grant(&self, call: PeerCall<'_>) -> Result<(), PeerError> {
        self.record("remove_grant", call.enclave_url)
    }

    async fn deny_access_request(&self, call: PeerCall<'_>) -> Result<(), PeerError> {
        self.record("deny_access_request", call.enclave_url)
    }
}

// =============================================================================
// Chain
// =============================================================================

/// Signs nothing; echoes the sender so tests can see which wallet was used.
#[derive(Default)]
pub struct FakeChain {
    sent: Mutex<Vec<TransactionParams>>,
}

impl FakeChain {
    pub fn sent(&self) -> Vec<TransactionParams> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainClient for FakeChain {
    async fn sign_transaction(
        &self,
        params: &TransactionParams,
        private_key_pem: &str,
    ) -> Result<SignedTransaction, ChainError> {
        crate::chain::signing::signer_from_pem(private_key_pem)?;
        Ok(SignedTransaction {
            signed_transaction: format!("0x02signed-by-{}", params.from),
            transaction_hash: "0xabc".to_string(),
        })
    }

    async fn send_transaction(
        &self,
        params: &TransactionParams,
        private_key_pem: &str,
    ) -> Result<String, ChainError> {
        crate::chain::signing::signer_from_pem(private_key_pem)?;
        self.sent.lock().unwrap().push(params.clone());
        Ok("0xdef".to_string())
    }

    async fn estimate_fees(&self, _network: &Network) -> Result<Fees, ChainError> {
        Ok(Fees::for_transfer(10, 2))
    }
}

// =============================================================================
// Enclave fixtures
// =============================================================================

pub struct TestEnclave {
    pub state: AppState,
    pub clock: Arc<ManualClock>,
    pub directory: Arc<FakeDirectory>,
    pub enclaves: Arc<RecordingEnclaves>,
    pub chain: Arc<FakeChain>,
    /// Registered as [`OWNER_CREDENTIAL`] by [`registered_state`].
    pub authenticator: SoftAuthenticator,
    _temp: TempDir,
}

/// An enclave with no account yet.
pub fn test_enclave() -> TestEnclave {
    let temp = TempDir::new().unwrap();
    let mut storage = EncryptedStorage::new(StoragePaths::new(temp.path()));
    storage.initialize().unwrap();

    let clock = Arc::new(ManualClock::starting_now());
    let directory = Arc::new(FakeDirectory::default());
    let enclaves = Arc::new(RecordingEnclaves::default());
    let chain = Arc::new(FakeChain::default());

    let state = AppState::new(
        EnclaveConfig::for_data_dir(temp.path()),
        storage,
        EnclaveSigningKey::from_seed([7u8; 32]).unwrap(),
        Collaborators {
            directory: directory.clone(),
            enclaves: enclaves.clone(),
            chain: chain.clone(),
            clock: clock.clone(),
        },
    );
    let authenticator = SoftAuthenticator::new(3, state.ceremonies.relying_party());

    TestEnclave {
        state,
        clock,
        directory,
        enclaves,
        chain,
        authenticator,
        _temp: temp,
    }
}

/// An enclave whose owner registered [`OWNER_CREDENTIAL`] and has the
/// default wallet.
pub fn registered_state() -> TestEnclave {
    let mut enclave = test_enclave();
    let mut user = User::new(OWNER);

    let ceremonies = enclave.state.ceremonies.clone();
    let options = ceremonies
        .begin_registration(&mut user, CeremonyPurpose::Register)
        .unwrap();
    let response = enclave.authenticator.register(&options.public_key.challenge);
    ceremonies
        .finalize_registration(&mut user, CeremonyPurpose::Register, OWNER_CREDENTIAL, &response)
        .unwrap();

    user.wallets
        .push(generate_wallet(DEFAULT_WALLET_NAME, true).unwrap());
    enclave.state.repository.upsert_user(&user).unwrap();
    enclave
}

/// Cookie header carrying a full session for [`OWNER`].
pub fn session_cookie(state: &AppState) -> String {
    let token = state
        .tokens
        .frontend_session(OWNER, OWNER_CREDENTIAL)
        .unwrap();
    format!("{}={token}", crate::auth::cookie::SESSION_COOKIE)
}
