// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Directory service client.
//!
//! The Directory maps emails to enclave URLs, schedules notification series
//! and owns account records. Authenticated calls carry a backend-audience
//! token minted by this enclave for its own user.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};

use crate::models::ScheduledNotification;

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("directory request failed: {0}")]
    Request(String),

    #[error("directory returned {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("directory response invalid: {0}")]
    InvalidResponse(String),

    #[error("no enclave registered for {0}")]
    UnknownUser(String),
}

/// Outbound calls to the Directory.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Base URL of the enclave serving `email`.
    async fn resolve_enclave_address(&self, email: &str) -> Result<String, DirectoryError>;

    /// Schedule a series and return its id for later cancellation.
    async fn schedule_notification_series(
        &self,
        token: &str,
        notifications: &[ScheduledNotification],
    ) -> Result<String, DirectoryError>;

    /// Cancel a series. Cancelling an unknown or already cancelled id fails.
    async fn cancel_notification_series(
        &self,
        token: &str,
        series_id: &str,
    ) -> Result<(), DirectoryError>;

    async fn send_notification(
        &self,
        token: &str,
        title: &str,
        body: &str,
    ) -> Result<(), DirectoryError>;

    /// Delete the account the token was minted for.
    async fn delete_account(&self, token: &str) -> Result<(), DirectoryError>;

    /// Start publishing a wallet; returns the challenge to sign.
    async fn publish_wallet_initialize(
        &self,
        token: &str,
        address: &str,
    ) -> Result<String, DirectoryError>;

    async fn publish_wallet_finalize(
        &self,
        token: &str,
        name: &str,
        address: &str,
        signature: &str,
    ) -> Result<(), DirectoryError>;
}

#[derive(Deserialize)]
struct EnclaveUrlResponse {
    enclave_url: String,
}

#[derive(Deserialize)]
struct SeriesResponse {
    series_id: String,
}

#[derive(Deserialize)]
struct ChallengeResponse {
    challenge: String,
}

/// reqwest implementation against `BACKEND_URL`.
pub struct HttpDirectory {
    base_url: String,
    http: Client,
}

impl HttpDirectory {
    pub fn new(base_url: impl Into<String>) -> Result<Self, DirectoryError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| DirectoryError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<reqwest::Response, DirectoryError> {
        let mut request = self
            .http
            .request(method.clone(), format!("{}{}", self.base_url, path));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DirectoryError::Request(format!("{method} {path} failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let message = response.text().await.unwrap_or_default();
            return Err(DirectoryError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }

    async fn call_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<T, DirectoryError> {
        self.call(method.clone(), path, token, body)
            .await?
            .json()
            .await
            .map_err(|e| DirectoryError::InvalidResponse(format!("{method} {path}: {e}")))
    }
}

#[async_trait]
impl Directory for HttpDirectory {
    async fn resolve_enclave_address(&self, email: &str) -> Result<String, DirectoryError> {
        let path = format!("/users/{email}/enclave-url");
        match self
            .call_json::<EnclaveUrlResponse>(Method::GET, &path, None, None)
            .await
        {
            Ok(response) => Ok(response.enclave_url.trim_end_matches('/').to_string()),
            Err(DirectoryError::Rejected { status, .. })
                if status == StatusCode::NOT_FOUND.as_u16() =>
            {
                Err(DirectoryError::UnknownUser(email.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    async fn schedule_notification_series(
        &self,
        token: &str,
        notifications: &[ScheduledNotification],
    ) -> Result<String, DirectoryError> {
        let response: SeriesResponse = self
            .call_json(
                Method::POST,
                "/notifications/series",
                Some(token),
                Some(json!({ "notifications": notifications })),
            )
            .await?;
        if response.series_id.is_empty() {
            return Err(DirectoryError::InvalidResponse(
                "empty notification series id".to_string(),
            ));
        }
        Ok(response.series_id)
    }

    async fn cancel_notification_series(
        &self,
        token: &str,
        series_id: &str,
    ) -> Result<(), DirectoryError> {
        let path = format!("/notifications/series/{series_id}");
        self.call(Method::DELETE, &path, Some(token), None).await?;
        Ok(())
    }

    async fn send_notification(
        &self,
        token: &str,
        title: &str,
        body: &str,
    ) -> Result<(), DirectoryError> {
        self.call(
            Method::POST,
            "/notifications",
            Some(token),
            Some(json!({ "title": title, "body": body })),
        )
        .await?;
        Ok(())
    }

    async fn delete_account(&self, token: &str) -> Result<(), DirectoryError> {
        self.call(Method::DELETE, "/users/my", Some(token), None).await?;
        Ok(())
    }

    async fn publish_wallet_initialize(
        &self,
        token: &str,
        address: &str,
    ) -> Result<String, DirectoryError> {
        let response: ChallengeResponse = self
            .call_json(
                Method::POST,
                "/users/my/wallets/initialize",
                Some(token),
                Some(json!({ "address": address })),
            )
            .await?;
        Ok(response.challenge)
    }

    async fn publish_wallet_finalize(
        &self,
        token: &str,
        name: &str,
        address: &str,
        signature: &str,
    ) -> Result<(), DirectoryError> {
        self.call(
            Method::POST,
            "/users/my/wallets/finalize",
            Some(token),
            Some(json!({ "name": name, "address": address, "signature": signature })),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let directory = HttpDirectory::new("http://directory.local/").unwrap();
        assert_eq!(directory.base_url, "http://directory.local");
    }

    #[tokio::test]
    async fn unreachable_directory_is_a_request_error() {
        let directory = HttpDirectory::new("http://127.0.0.1:9").unwrap();
        let result = directory.resolve_enclave_address("owner@example.com").await;
        assert!(matches!(result, Err(DirectoryError::Request(_))));
    }
}
