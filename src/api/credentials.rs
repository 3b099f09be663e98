// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Credential management and one-time codes.
//!
//! A new device either logs in with an existing credential or redeems a
//! one-time code created on a logged-in device. Both sessions may run the
//! add-credential ceremony.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    auth::{CredentialSession, UserSession},
    ceremony::{
        otp,
        webauthn::{CreationOptions, RegistrationResponse},
    },
    error::ApiError,
    models::{CeremonyPurpose, CredentialSummary, OneTimeCode},
    state::AppState,
    storage::{AuditEvent, AuditEventType},
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddCredentialRequest {
    /// 1 to 32 ASCII letters or digits, unique per account.
    pub name: String,
    pub response: RegistrationResponse,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreatedOtp {
    pub otp: String,
    /// Unix seconds.
    pub valid_until: i64,
}

/// List credentials, marking the one this session was created with.
#[utoipa::path(
    get,
    path = "/credentials",
    tag = "Credentials",
    responses(
        (status = 200, description = "Registered credentials", body = [CredentialSummary]),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn list_credentials(
    UserSession(session): UserSession,
    State(state): State<AppState>,
) -> Result<Json<Vec<CredentialSummary>>, ApiError> {
    let user = state.load_user()?;
    let current = session.credential.as_deref();
    let credentials = user
        .credentials
        .keys()
        .map(|name| CredentialSummary {
            currently_used: Some(name.as_str()) == current,
            name: name.clone(),
        })
        .collect();
    Ok(Json(credentials))
}

/// Start the add-credential ceremony.
#[utoipa::path(
    get,
    path = "/credentials/initialize",
    tag = "Credentials",
    responses(
        (status = 200, description = "WebAuthn creation options", body = CreationOptions),
        (status = 401, description = "Unauthorized or session too old")
    )
)]
pub async fn credential_initialize(
    CredentialSession(_session): CredentialSession,
    State(state): State<AppState>,
) -> Result<Json<CreationOptions>, ApiError> {
    let mut tx = state.begin().await?;
    let options = state
        .ceremonies
        .begin_registration(&mut tx, CeremonyPurpose::AddCredential)?;
    tx.commit()?;
    Ok(Json(options))
}

/// Verify the new authenticator and store it under `name`.
#[utoipa::path(
    post,
    path = "/credentials/finalize",
    tag = "Credentials",
    request_body = AddCredentialRequest,
    responses(
        (status = 200, description = "Credential added"),
        (status = 400, description = "Ceremony not initialized, expired or name invalid"),
        (status = 401, description = "Unauthorized or response did not verify"),
        (status = 409, description = "Name or authenticator already registered")
    )
)]
pub async fn credential_finalize(
    CredentialSession(session): CredentialSession,
    State(state): State<AppState>,
    Json(request): Json<AddCredentialRequest>,
) -> Result<StatusCode, ApiError> {
    let mut tx = state.begin().await?;
    let outcome = state.ceremonies.finalize_registration(
        &mut tx,
        CeremonyPurpose::AddCredential,
        &request.name,
        &request.response,
    );
    tx.commit()?;
    outcome?;

    state.record(
        AuditEvent::new(AuditEventType::CredentialAdded)
            .with_actor(&session.email)
            .with_resource(&request.name),
    );
    tracing::info!(credential = %request.name, scope = session.scope.as_str(), "credential added");
    Ok(StatusCode::OK)
}

/// Remove a credential other than the one in use.
#[utoipa::path(
    delete,
    path = "/credentials/{name}",
    tag = "Credentials",
    params(("name" = String, Path, description = "Credential name")),
    responses(
        (status = 200, description = "Credential removed"),
        (status = 400, description = "Credential is the one in use"),
        (status = 404, description = "Unknown credential")
    )
)]
pub async fn remove_credential(
    UserSession(session): UserSession,
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    let mut tx = state.begin().await?;
    if !tx.credentials.contains_key(&name) {
        return Err(ApiError::not_found(format!("credential {name} does not exist")));
    }
    if session.credential.as_deref() == Some(name.as_str()) {
        return Err(ApiError::bad_request(
            "the credential you are logged in with cannot be removed",
        ));
    }
    tx.credentials.remove(&name);
    tx.commit()?;

    state.record(
        AuditEvent::new(AuditEventType::CredentialRemoved)
            .with_actor(&session.email)
            .with_resource(&name),
    );
    tracing::info!(credential = %name, "credential removed");
    Ok(StatusCode::OK)
}

/// Create a one-time code, replacing any previous one.
#[utoipa::path(
    post,
    path = "/otp",
    tag = "Credentials",
    responses(
        (status = 201, description = "Code created", body = CreatedOtp),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn create_otp(
    UserSession(_session): UserSession,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<CreatedOtp>), ApiError> {
    let mut tx = state.begin().await?;
    let code = otp::issue(&mut tx, state.clock.unix())?;
    tx.commit()?;

    Ok((
        StatusCode::CREATED,
        Json(CreatedOtp {
            otp: code.secret,
            valid_until: code.valid_until,
        }),
    ))
}

/// Current one-time code. An expired code is reported inactive.
#[utoipa::path(
    get,
    path = "/otp",
    tag = "Credentials",
    responses(
        (status = 200, description = "Current code", body = OneTimeCode),
        (status = 404, description = "No code was created")
    )
)]
pub async fn get_otp(
    UserSession(_session): UserSession,
    State(state): State<AppState>,
) -> Result<Json<OneTimeCode>, ApiError> {
    let mut tx = state.begin().await?;
    let code = otp::current(&mut tx, state.clock.unix()).cloned();
    tx.commit()?;
    code.map(Json)
        .ok_or_else(|| ApiError::not_found("no one-time code was created"))
}
