// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Account registration.
//!
//! The first WebAuthn credential creates the account together with its
//! `Default` public wallet. An enclave serves exactly one account, so
//! registration is only possible while no credential exists.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::wallets::publish_wallet,
    ceremony::webauthn::{CreationOptions, RegistrationResponse},
    chain::signing::generate_wallet,
    error::ApiError,
    models::{normalize_email, CeremonyPurpose, User, DEFAULT_WALLET_NAME},
    state::AppState,
    storage::{AuditEvent, AuditEventType},
};

#[derive(Debug, Deserialize, IntoParams)]
pub struct RegisterQuery {
    /// Email of the account served by this enclave.
    pub email: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterFinalizeRequest {
    /// Name for the first credential, 1 to 32 ASCII letters or digits.
    pub credential_name: String,
    pub response: RegistrationResponse,
}

/// Start the registration ceremony for `email`.
#[utoipa::path(
    get,
    path = "/register/initialize",
    tag = "Registration",
    params(RegisterQuery),
    responses(
        (status = 200, description = "WebAuthn creation options", body = CreationOptions),
        (status = 400, description = "Invalid email"),
        (status = 409, description = "An account is already registered")
    )
)]
pub async fn register_initialize(
    State(state): State<AppState>,
    Query(query): Query<RegisterQuery>,
) -> Result<Json<CreationOptions>, ApiError> {
    let email = normalize_email(&query.email);
    if !is_plausible_email(&email) {
        return Err(ApiError::bad_request("a valid email is required"));
    }

    let mut tx = state.begin_or_create(&email).await?;
    if tx.is_registered() {
        return Err(ApiError::conflict("user is already registered"));
    }
    if tx.email != email {
        tx.user = User::new(&email);
    }

    let options = state
        .ceremonies
        .begin_registration(&mut tx, CeremonyPurpose::Register)?;
    tx.commit()?;
    Ok(Json(options))
}

/// Finish registration and create the `Default` wallet.
///
/// The wallet is published to the Directory before anything is stored. If
/// publishing fails the ceremony is spent and registration starts over.
#[utoipa::path(
    post,
    path = "/register/finalize",
    tag = "Registration",
    request_body = RegisterFinalizeRequest,
    responses(
        (status = 200, description = "Account registered"),
        (status = 400, description = "Ceremony not initialized, expired or name invalid"),
        (status = 401, description = "Registration response did not verify"),
        (status = 409, description = "An account is already registered"),
        (status = 502, description = "Wallet could not be published")
    )
)]
pub async fn register_finalize(
    State(state): State<AppState>,
    Json(request): Json<RegisterFinalizeRequest>,
) -> Result<StatusCode, ApiError> {
    let mut tx = state.begin().await.map_err(|e| match e.status {
        StatusCode::NOT_FOUND => ApiError::bad_request("register ceremony was not initialized"),
        _ => e,
    })?;
    if tx.is_registered() {
        return Err(ApiError::conflict("user is already registered"));
    }

    let outcome = state.ceremonies.finalize_registration(
        &mut tx,
        CeremonyPurpose::Register,
        &request.credential_name,
        &request.response,
    );
    if let Err(e) = outcome {
        tx.commit()?;
        return Err(e.into());
    }

    let wallet = generate_wallet(DEFAULT_WALLET_NAME, true)?;
    if let Err(e) = publish_wallet(&state, &tx.email, &wallet).await {
        tx.credentials.remove(&request.credential_name);
        tx.commit()?;
        return Err(e);
    }
    tx.wallets.push(wallet.clone());
    let email = tx.email.clone();
    tx.commit()?;

    state.record(
        AuditEvent::new(AuditEventType::Registered)
            .with_actor(&email)
            .with_details(serde_json::json!({ "credential": request.credential_name })),
    );
    state.record(
        AuditEvent::new(AuditEventType::WalletCreated)
            .with_actor(&email)
            .with_resource(&wallet.address),
    );
    tracing::info!(credential = %request.credential_name, wallet = %wallet.address, "account registered");

    Ok(StatusCode::OK)
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.ends_with('.'),
        None => false,
    }
}
