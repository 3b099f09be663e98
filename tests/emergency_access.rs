// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Emergency access across several enclaves.
//!
//! Each enclave is a full router with its own storage and signing key. Peer
//! calls are dispatched in-process to the target enclave's router, and a
//! shared in-memory Directory maps emails to enclave URLs.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use wallet_enclave::{
    api::router,
    auth::EnclaveSigningKey,
    chain::{client::AlloyChainClient, signing::generate_wallet},
    clients::{
        enclave::error_message, Directory, DirectoryError, EnclaveClient, PeerCall, PeerError,
        TakeoverResponse,
    },
    clock::ManualClock,
    config::EnclaveConfig,
    models::{CredentialPublicKey, ScheduledNotification, StoredCredential, User},
    state::{AppState, Collaborators},
    storage::{EncryptedStorage, StoragePaths},
};

const OWNER: &str = "owner@example.com";
const CONTACT: &str = "contact@example.com";
const OTHER: &str = "other@example.com";
const CREDENTIAL: &str = "laptop";

// =============================================================================
// Directory
// =============================================================================

#[derive(Default)]
struct DirectoryRecord {
    addresses: HashMap<String, String>,
    series: HashSet<String>,
    cancelled: HashSet<String>,
    next_series: u32,
    titles: Vec<String>,
    deleted_accounts: usize,
}

#[derive(Default)]
struct SharedDirectory {
    record: Mutex<DirectoryRecord>,
}

impl SharedDirectory {
    fn register(&self, email: &str, url: &str) {
        self.record
            .lock()
            .unwrap()
            .addresses
            .insert(email.to_string(), url.to_string());
    }

    fn active_series(&self) -> usize {
        let record = self.record.lock().unwrap();
        record.series.difference(&record.cancelled).count()
    }

    fn titles(&self) -> Vec<String> {
        self.record.lock().unwrap().titles.clone()
    }

    fn deleted_accounts(&self) -> usize {
        self.record.lock().unwrap().deleted_accounts
    }
}

#[async_trait]
impl Directory for SharedDirectory {
    async fn resolve_enclave_address(&self, email: &str) -> Result<String, DirectoryError> {
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
        _notifications: &[ScheduledNotification],
    ) -> Result<String, DirectoryError> {
        let mut record = self.record.lock().unwrap();
        record.next_series += 1;
        let id = format!("series-{}", record.next_series);
        record.series.insert(id.clone());
        Ok(id)
    }

    async fn cancel_notification_series(
        &self,
        _token: &str,
        series_id: &str,
    ) -> Result<(), DirectoryError> {
        let mut record = self.record.lock().unwrap();
        if !record.series.contains(series_id) || !record.cancelled.insert(series_id.to_string()) {
            return Err(DirectoryError::Rejected {
                status: 404,
                message: "unknown notification series".to_string(),
            });
        }
        Ok(())
    }

    async fn send_notification(
        &self,
        _token: &str,
        title: &str,
        _body: &str,
    ) -> Result<(), DirectoryError> {
        self.record.lock().unwrap().titles.push(title.to_string());
        Ok(())
    }

    async fn delete_account(&self, _token: &str) -> Result<(), DirectoryError> {
        self.record.lock().unwrap().deleted_accounts += 1;
        Ok(())
    }

    async fn publish_wallet_initialize(
        &self,
        _token: &str,
        address: &str,
    ) -> Result<String, DirectoryError> {
        Ok(format!("publish {address}"))
    }

    async fn publish_wallet_finalize(
        &self,
        _token: &str,
        _name: &str,
        _address: &str,
        _signature: &str,
    ) -> Result<(), DirectoryError> {
        Ok(())
    }
}

// =============================================================================
// Loopback peer client
// =============================================================================

/// Dispatches peer calls to the router registered for the target URL.
#[derive(Default)]
struct Loopback {
    routers: Mutex<HashMap<String, Router>>,
}

impl Loopback {
    fn attach(&self, url: &str, router: Router) {
        self.routers.lock().unwrap().insert(url.to_string(), router);
    }

    /// Take an enclave offline. Calls to it fail as unreachable.
    fn detach(&self, url: &str) -> Option<Router> {
        self.routers.lock().unwrap().remove(url)
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<Value, PeerError> {
        let router = self
            .routers
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| PeerError::Request(format!("{url} is unreachable")))?;

        let mut request = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8_lossy(&bytes).to_string();
        if !status.is_success() {
            return Err(PeerError::Rejected {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }
        Ok(serde_json::from_str(&text).unwrap_or(Value::Null))
    }
}

#[async_trait]
impl EnclaveClient for Loopback {
    async fn verification_key(&self, enclave_url: &str) -> Result<Vec<u8>, PeerError> {
        let body = self
            .send(Method::GET, enclave_url, "/jwt-verification-key", None, None)
            .await?;
        let encoded = body["verification_key"].as_str().unwrap_or_default();
        wallet_enclave::clients::enclave::decode_verification_key(encoded)
    }

    async fn invite(&self, call: PeerCall<'_>, waiting_period_in_days: u32) -> Result<(), PeerError> {
        self.send(
            Method::POST,
            call.enclave_url,
            "/emergency-access/grants",
            Some(call.token),
            Some(json!({ "waiting_period_in_days": waiting_period_in_days })),
        )
        .await
        .map(drop)
    }

    async fn respond_invitation(&self, call: PeerCall<'_>, accept: bool) -> Result<(), PeerError> {
        self.send(
            Method::POST,
            call.enclave_url,
            "/emergency-access/contacts/grant-response",
            Some(call.token),
            Some(json!({ "accept": accept })),
        )
        .await
        .map(drop)
    }

    async fn request_access(&self, call: PeerCall<'_>) -> Result<i64, PeerError> {
        let body = self
            .send(
                Method::POST,
                call.enclave_url,
                "/emergency-access/contacts/request-access",
                Some(call.token),
                None,
            )
            .await?;
        body["takeover_allowed_after"]
            .as_i64()
            .ok_or_else(|| PeerError::InvalidResponse("missing takeover_allowed_after".into()))
    }

    async fn request_takeover(&self, call: PeerCall<'_>) -> Result<TakeoverResponse, PeerError> {
        let body = self
            .send(
                Method::POST,
                call.enclave_url,
                "/emergency-access/contacts/request-takeover",
                Some(call.token),
                None,
            )
            .await?;
        serde_json::from_value(body).map_err(|e| PeerError::InvalidResponse(e.to_string()))
    }

    async fn remove_grant(&self, call: PeerCall<'_>) -> Result<(), PeerError> {
        self.send(
            Method::DELETE,
            call.enclave_url,
            "/emergency-access/grants",
            Some(call.token),
            None,
        )
        .await
        .map(drop)
    }

    async fn deny_access_request(&self, call: PeerCall<'_>) -> Result<(), PeerError> {
        self.send(
            Method::POST,
            call.enclave_url,
            "/emergency-access/grants/deny-access-request",
            Some(call.token),
            None,
        )
        .await
        .map(drop)
    }
}

// =============================================================================
// Network of enclaves
// =============================================================================

struct Node {
    email: &'static str,
    url: String,
    state: AppState,
    _temp: TempDir,
}

struct Network {
    clock: Arc<ManualClock>,
    directory: Arc<SharedDirectory>,
    peers: Arc<Loopback>,
}

impl Network {
    fn new() -> Self {
        Self {
            clock: Arc::new(ManualClock::starting_now()),
            directory: Arc::new(SharedDirectory::default()),
            peers: Arc::new(Loopback::default()),
        }
    }

    /// A registered enclave for `email` with one wallet named `Default`.
    fn enclave(&self, email: &'static str) -> Node {
        let temp = TempDir::new().unwrap();
        let mut storage = EncryptedStorage::new(StoragePaths::new(temp.path()));
        storage.initialize().unwrap();

        let state = AppState::new(
            EnclaveConfig::for_data_dir(temp.path()),
            storage,
            EnclaveSigningKey::generate().unwrap(),
            Collaborators {
                directory: self.directory.clone(),
                enclaves: self.peers.clone(),
                chain: Arc::new(AlloyChainClient::new()),
                clock: self.clock.clone(),
            },
        );

        let mut user = User::new(email);
        user.credentials.insert(
            CREDENTIAL.to_string(),
            StoredCredential {
                id: format!("{CREDENTIAL}-id"),
                public_key: CredentialPublicKey::EdDsa {
                    x: "11qYAYKxCrfVS_7TyWQHOg7hcvPapiMlrwIaaPcHURo".to_string(),
                },
                sign_count: 0,
                created_at: Utc::now(),
            },
        );
        user.wallets.push(generate_wallet("Default", true).unwrap());
        state.repository.upsert_user(&user).unwrap();

        let url = format!("https://{}.enclave.test", email.split('@').next().unwrap());
        self.directory.register(email, &url);
        self.peers.attach(&url, router(state.clone()));

        Node {
            email,
            url,
            state,
            _temp: temp,
        }
    }

    fn advance_days(&self, days: i64) {
        self.clock.advance(Duration::days(days) + Duration::seconds(1));
    }
}

impl Node {
    fn cookie(&self) -> String {
        let token = self
            .state
            .tokens
            .frontend_session(self.email, CREDENTIAL)
            .unwrap();
        format!("session={token}")
    }

    async fn call(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::COOKIE, self.cookie());
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = router(self.state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn invite(&self, contact: &Node) -> StatusCode {
        self.call(
            Method::POST,
            "/emergency-access/contacts",
            Some(json!({ "contact_email": contact.email, "waiting_period_in_days": 7 })),
        )
        .await
        .0
    }

    async fn respond(&self, owner: &Node, accept: bool) -> StatusCode {
        self.call(
            Method::POST,
            "/emergency-access/grants/respond-invitation",
            Some(json!({ "grantor_email": owner.email, "accept": accept })),
        )
        .await
        .0
    }

    async fn request_access(&self, owner: &Node) -> (StatusCode, Value) {
        self.call(
            Method::POST,
            "/emergency-access/grants/request-access",
            Some(json!({ "grantor_email": owner.email })),
        )
        .await
    }

    async fn request_takeover(&self, owner: &Node) -> (StatusCode, Value) {
        self.call(
            Method::POST,
            "/emergency-access/grants/request-takeover",
            Some(json!({ "grantor_email": owner.email })),
        )
        .await
    }

    async fn deny(&self, contact: &Node) -> StatusCode {
        self.call(
            Method::POST,
            &format!("/emergency-access/contacts/{}/deny-access", contact.email),
            None,
        )
        .await
        .0
    }

    fn user(&self) -> User {
        self.state.load_user().unwrap()
    }
}

/// Owner with `contact` invited and accepted.
async fn accepted_pair(network: &Network) -> (Node, Node) {
    let owner = network.enclave(OWNER);
    let contact = network.enclave(CONTACT);
    assert_eq!(owner.invite(&contact).await, StatusCode::CREATED);
    assert_eq!(contact.respond(&owner, true).await, StatusCode::OK);
    (owner, contact)
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn invitation_is_mirrored_on_both_enclaves() {
    let network = Network::new();
    let owner = network.enclave(OWNER);
    let contact = network.enclave(CONTACT);

    assert_eq!(owner.invite(&contact).await, StatusCode::CREATED);
    assert_eq!(owner.invite(&contact).await, StatusCode::CONFLICT);

    let (status, grants) = contact.call(Method::GET, "/emergency-access/grants", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(grants[0]["email"], OWNER);
    assert_eq!(grants[0]["enclave_url"], owner.url.as_str());
    assert_eq!(grants[0]["has_accepted"], false);

    assert_eq!(contact.respond(&owner, true).await, StatusCode::OK);
    let (_, contacts) = owner.call(Method::GET, "/emergency-access/contacts", None).await;
    assert_eq!(contacts[0]["email"], CONTACT);
    assert_eq!(contacts[0]["has_accepted"], true);
}

#[tokio::test]
async fn access_cannot_be_requested_before_acceptance() {
    let network = Network::new();
    let owner = network.enclave(OWNER);
    let contact = network.enclave(CONTACT);
    owner.invite(&contact).await;

    let (status, _) = contact.request_access(&owner).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(network.directory.active_series(), 0);
}

#[tokio::test]
async fn access_can_only_be_requested_once() {
    let network = Network::new();
    let (owner, contact) = accepted_pair(&network).await;

    let (status, body) = contact.request_access(&owner).await;
    assert_eq!(status, StatusCode::OK);
    let allowed_after = body["takeover_allowed_after"].as_i64().unwrap();
    assert_eq!(
        owner.user().emergency_contacts[CONTACT].takeover_allowed_after,
        allowed_after
    );
    assert_eq!(
        contact.user().emergency_grants[OWNER].takeover_allowed_after,
        allowed_after
    );

    let (status, _) = contact.request_access(&owner).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(network.directory.active_series(), 1);
}

#[tokio::test]
async fn takeover_waits_for_the_waiting_period() {
    let network = Network::new();
    let (owner, contact) = accepted_pair(&network).await;
    contact.request_access(&owner).await;

    network.clock.advance(Duration::days(6));
    let (status, _) = contact.request_takeover(&owner).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(owner.user().emergency_contacts.len(), 1);
    assert_eq!(contact.user().wallets.len(), 1);
}

#[tokio::test]
async fn takeover_transfers_wallets_and_revokes_other_contacts() {
    let network = Network::new();
    let (owner, contact) = accepted_pair(&network).await;
    let other = network.enclave(OTHER);
    assert_eq!(owner.invite(&other).await, StatusCode::CREATED);
    assert_eq!(other.user().emergency_grants.len(), 1);

    contact.request_access(&owner).await;
    network.advance_days(7);

    let (status, imported) = contact.request_takeover(&owner).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(imported.as_array().unwrap().len(), 1);
    assert_eq!(imported[0]["name"], format!("Default ({OWNER})"));
    assert_eq!(imported[0]["address"], owner.user().wallets[0].address.as_str());

    let contact_user = contact.user();
    assert_eq!(contact_user.wallets.len(), 2);
    assert!(contact_user.emergency_grants.is_empty());

    assert!(owner.user().emergency_contacts.is_empty());
    assert!(other.user().emergency_grants.is_empty());
    assert_eq!(network.directory.active_series(), 0);
    assert_eq!(network.directory.deleted_accounts(), 1);
}

#[tokio::test]
async fn denied_request_is_cleared_on_both_enclaves() {
    let network = Network::new();
    let (owner, contact) = accepted_pair(&network).await;
    contact.request_access(&owner).await;

    assert_eq!(owner.deny(&contact).await, StatusCode::OK);
    assert!(!owner.user().emergency_contacts[CONTACT].has_requested_takeover);
    let contact_user = contact.user();
    let grant = &contact_user.emergency_grants[OWNER];
    assert!(!grant.has_requested_takeover);
    assert_eq!(grant.takeover_allowed_after, 0);
    assert_eq!(network.directory.active_series(), 0);
    assert!(network
        .directory
        .titles()
        .iter()
        .any(|title| title == "Emergency Access Request was denied"));

    network.advance_days(7);
    let (status, _) = contact.request_takeover(&owner).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // The waiting period starts over.
    let (status, _) = contact.request_access(&owner).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn denial_missed_by_the_contact_is_reconciled_on_takeover() {
    let network = Network::new();
    let (owner, contact) = accepted_pair(&network).await;
    contact.request_access(&owner).await;

    let router = network.peers.detach(&contact.url).unwrap();
    assert_eq!(owner.deny(&contact).await, StatusCode::BAD_GATEWAY);
    assert!(!owner.user().emergency_contacts[CONTACT].has_requested_takeover);
    network.peers.attach(&contact.url, router);
    assert!(contact.user().emergency_grants[OWNER].has_requested_takeover);

    network.advance_days(7);
    let (status, _) = contact.request_takeover(&owner).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!contact.user().emergency_grants[OWNER].has_requested_takeover);
    assert_eq!(contact.user().wallets.len(), 1);
}

#[tokio::test]
async fn access_can_be_requested_again_after_a_missed_denial() {
    let network = Network::new();
    let (owner, contact) = accepted_pair(&network).await;
    contact.request_access(&owner).await;

    let router = network.peers.detach(&contact.url).unwrap();
    assert_eq!(owner.deny(&contact).await, StatusCode::BAD_GATEWAY);
    network.peers.attach(&contact.url, router);
    network.advance_days(1);

    let (status, body) = contact.request_access(&owner).await;
    assert_eq!(status, StatusCode::OK);
    let allowed_after = body["takeover_allowed_after"].as_i64().unwrap();
    let contact_user = contact.user();
    let grant = &contact_user.emergency_grants[OWNER];
    assert!(grant.has_requested_takeover);
    assert_eq!(grant.takeover_allowed_after, allowed_after);
    assert_eq!(
        owner.user().emergency_contacts[CONTACT].takeover_allowed_after,
        allowed_after
    );
    assert_eq!(network.directory.active_series(), 1);
}

#[tokio::test]
async fn revoked_contact_loses_the_grant() {
    let network = Network::new();
    let (owner, contact) = accepted_pair(&network).await;
    contact.request_access(&owner).await;

    let (status, _) = owner
        .call(
            Method::DELETE,
            &format!("/emergency-access/contacts/{CONTACT}"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(owner.user().emergency_contacts.is_empty());
    assert!(contact.user().emergency_grants.is_empty());
    assert_eq!(network.directory.active_series(), 0);

    network.advance_days(7);
    let (status, _) = contact.request_takeover(&owner).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn declined_invitation_is_removed_on_both_enclaves() {
    let network = Network::new();
    let owner = network.enclave(OWNER);
    let contact = network.enclave(CONTACT);
    owner.invite(&contact).await;

    assert_eq!(contact.respond(&owner, false).await, StatusCode::OK);
    assert!(owner.user().emergency_contacts.is_empty());
    assert!(contact.user().emergency_grants.is_empty());

    // A fresh invitation is possible afterwards.
    assert_eq!(owner.invite(&contact).await, StatusCode::CREATED);
}
