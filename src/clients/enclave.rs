// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Client for calls to other enclaves.
//!
//! Every call except the verification-key fetch carries a peer token minted
//! by this enclave, whose subject is this enclave's owner.

use std::time::Duration;

use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use reqwest::{Client, Method};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use utoipa::ToSchema;

use crate::models::Wallet;

#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    #[error("peer enclave request failed: {0}")]
    Request(String),

    #[error("peer enclave returned {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("peer enclave response invalid: {0}")]
    InvalidResponse(String),
}

impl PeerError {
    /// Message of a rejection, as rendered in the peer's error body.
    pub fn rejection_message(&self) -> Option<&str> {
        match self {
            PeerError::Rejected { message, .. } => Some(message),
            _ => None,
        }
    }
}

/// Target of an authenticated peer call.
#[derive(Debug, Clone, Copy)]
pub struct PeerCall<'a> {
    pub enclave_url: &'a str,
    pub token: &'a str,
}

/// What the owner's enclave hands over on a completed takeover.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct TakeoverResponse {
    /// Backend-audience token for the owner's account.
    pub jwt: String,
    pub wallets: Vec<Wallet>,
}

#[derive(Deserialize)]
struct VerificationKeyResponse {
    verification_key: String,
}

#[derive(Deserialize)]
struct AccessRequestedResponse {
    takeover_allowed_after: i64,
}

#[async_trait]
pub trait EnclaveClient: Send + Sync {
    /// Raw Ed25519 verification key published by the enclave at `enclave_url`.
    async fn verification_key(&self, enclave_url: &str) -> Result<Vec<u8>, PeerError>;

    /// Ask a contact's enclave to record a grant from this owner.
    async fn invite(&self, call: PeerCall<'_>, waiting_period_in_days: u32)
        -> Result<(), PeerError>;

    /// Tell an owner's enclave whether the invitation is accepted.
    async fn respond_invitation(&self, call: PeerCall<'_>, accept: bool) -> Result<(), PeerError>;

    /// Start the waiting period; returns the eligibility timestamp.
    async fn request_access(&self, call: PeerCall<'_>) -> Result<i64, PeerError>;

    async fn request_takeover(&self, call: PeerCall<'_>) -> Result<TakeoverResponse, PeerError>;

    /// Tell a contact's enclave to drop its grant from this owner.
    async fn remove_grant(&self, call: PeerCall<'_>) -> Result<(), PeerError>;

    /// Tell a contact's enclave its access request was denied.
    async fn deny_access_request(&self, call: PeerCall<'_>) -> Result<(), PeerError>;
}

pub struct HttpEnclaveClient {
    http: Client,
}

impl HttpEnclaveClient {
    pub fn new() -> Result<Self, PeerError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| PeerError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }

    async fn send(
        &self,
        method: Method,
        url: String,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<reqwest::Response, PeerError> {
        let mut request = self.http.request(method.clone(), &url);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PeerError::Request(format!("{method} {url} failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(PeerError::Rejected {
                status,
                message: error_message(&text),
            });
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        url: String,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<T, PeerError> {
        self.send(method, url.clone(), token, body)
            .await?
            .json()
            .await
            .map_err(|e| PeerError::InvalidResponse(format!("{url}: {e}")))
    }
}

/// Extract `error` from an `{"error": ...}` body, falling back to the raw text.
pub fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

/// Decode the `verification_key` field published by a peer.
pub fn decode_verification_key(encoded: &str) -> Result<Vec<u8>, PeerError> {
    Base64::decode_vec(encoded)
        .map_err(|e| PeerError::InvalidResponse(format!("verification key is not base64: {e}")))
}

fn endpoint(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

#[async_trait]
impl EnclaveClient for HttpEnclaveClient {
    async fn verification_key(&self, enclave_url: &str) -> Result<Vec<u8>, PeerError> {
        let response: VerificationKeyResponse = self
            .send_json(
                Method::GET,
                endpoint(enclave_url, "/jwt-verification-key"),
                None,
                None,
            )
            .await?;
        decode_verification_key(&response.verification_key)
    }

    async fn invite(
        &self,
        call: PeerCall<'_>,
        waiting_period_in_days: u32,
    ) -> Result<(), PeerError> {
        self.send(
            Method::POST,
            endpoint(call.enclave_url, "/emergency-access/grants"),
            Some(call.token),
            Some(json!({ "waiting_period_in_days": waiting_period_in_days })),
        )
        .await?;
        Ok(())
    }

    async fn respond_invitation(&self, call: PeerCall<'_>, accept: bool) -> Result<(), PeerError> {
        self.send(
            Method::POST,
            endpoint(call.enclave_url, "/emergency-access/contacts/grant-response"),
            Some(call.token),
            Some(json!({ "accept": accept })),
        )
        .await?;
        Ok(())
    }

    async fn request_access(&self, call: PeerCall<'_>) -> Result<i64, PeerError> {
        let response: AccessRequestedResponse = self
            .send_json(
                Method::POST,
                endpoint(call.enclave_url, "/emergency-access/contacts/request-access"),
                Some(call.token),
                None,
            )
            .await?;
        Ok(response.takeover_allowed_after)
    }

    async fn request_takeover(&self, call: PeerCall<'_>) -> Result<TakeoverResponse, PeerError> {
        self.send_json(
            Method::POST,
            endpoint(call.enclave_url, "/emergency-access/contacts/request-takeover"),
            Some(call.token),
            None,
        )
        .await
    }

    async fn remove_grant(&self, call: PeerCall<'_>) -> Result<(), PeerError> {
        self.send(
            Method::DELETE,
            endpoint(call.enclave_url, "/emergency-access/grants"),
            Some(call.token),
            None,
        )
        .await?;
        Ok(())
    }

    async fn deny_access_request(&self, call: PeerCall<'_>) -> Result<(), PeerError> {
        self.send(
            Method::POST,
            endpoint(call.enclave_url, "/emergency-access/grants/deny-access-request"),
            Some(call.token),
            None,
        )
        .await?;
        Ok(())
    }
}
