// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallet, network and fee endpoints.
//!
//! Wallet keys never leave the enclave: responses carry name, address and
//! visibility only.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::UserSession,
    chain::{
        find_network,
        signing::{generate_wallet, personal_sign},
        Fees, NetworkInfo, NETWORKS,
    },
    error::ApiError,
    models::{CreateWalletRequest, Wallet, WalletResponse},
    state::AppState,
    storage::{AuditEvent, AuditEventType},
};

pub const MAX_WALLET_NAME_LEN: usize = 64;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct NetworksResponse {
    pub networks: Vec<NetworkInfo>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct FeesQuery {
    /// Hex chain id, e.g. `0x1`.
    pub chain: String,
}

/// Publish a wallet's address to the Directory, proving key ownership with
/// a personal signature over the Directory's challenge.
pub(crate) async fn publish_wallet(
    state: &AppState,
    email: &str,
    wallet: &Wallet,
) -> Result<(), ApiError> {
    let token = state.backend_token(email)?;
    let challenge = state
        .directory
        .publish_wallet_initialize(&token, &wallet.address)
        .await?;
    let signature = personal_sign(&wallet.private_key_pem, challenge.as_bytes())?;
    state
        .directory
        .publish_wallet_finalize(&token, &wallet.name, &wallet.address, &signature)
        .await?;

    tracing::debug!(wallet = %wallet.address, "wallet published");
    Ok(())
}

/// List the account's wallets.
#[utoipa::path(
    get,
    path = "/wallets",
    tag = "Wallets",
    responses(
        (status = 200, description = "Wallets without key material", body = [WalletResponse]),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn list_wallets(
    UserSession(_session): UserSession,
    State(state): State<AppState>,
) -> Result<Json<Vec<WalletResponse>>, ApiError> {
    let user = state.load_user()?;
    Ok(Json(user.wallets.iter().map(WalletResponse::from).collect()))
}

/// Create a wallet. Public wallets are published to the Directory first.
#[utoipa::path(
    post,
    path = "/wallets",
    tag = "Wallets",
    request_body = CreateWalletRequest,
    responses(
        (status = 201, description = "Wallet created", body = WalletResponse),
        (status = 400, description = "Invalid wallet name"),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "A wallet with this name exists"),
        (status = 502, description = "Wallet could not be published")
    )
)]
pub async fn create_wallet(
    UserSession(session): UserSession,
    State(state): State<AppState>,
    Json(request): Json<CreateWalletRequest>,
) -> Result<(StatusCode, Json<WalletResponse>), ApiError> {
    let name = request.name.trim();
    if name.is_empty() || name.len() > MAX_WALLET_NAME_LEN {
        return Err(ApiError::bad_request(format!(
            "wallet name must be 1 to {MAX_WALLET_NAME_LEN} characters"
        )));
    }

    let mut tx = state.begin().await?;
    if tx.has_wallet_named(name) {
        return Err(ApiError::conflict(format!("a wallet named {name} already exists")));
    }

    let wallet = generate_wallet(name, request.public)?;
    if wallet.public {
        publish_wallet(&state, &tx.email, &wallet).await?;
    }
    tx.wallets.push(wallet.clone());
    tx.commit()?;

    state.record(
        AuditEvent::new(AuditEventType::WalletCreated)
            .with_actor(&session.email)
            .with_resource(&wallet.address)
            .with_details(serde_json::json!({ "name": wallet.name, "public": wallet.public })),
    );
    tracing::info!(wallet = %wallet.address, public = wallet.public, "wallet created");

    Ok((StatusCode::CREATED, Json(WalletResponse::from(&wallet))))
}

/// Supported networks, addressed by hex chain id.
#[utoipa::path(
    get,
    path = "/networks",
    tag = "Wallets",
    responses(
        (status = 200, description = "Supported networks", body = NetworksResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn list_networks(UserSession(_session): UserSession) -> Json<NetworksResponse> {
    Json(NetworksResponse {
        networks: NETWORKS.iter().map(NetworkInfo::from).collect(),
    })
}

/// Fee estimate for a plain transfer on `chain`.
#[utoipa::path(
    get,
    path = "/fees",
    tag = "Wallets",
    params(FeesQuery),
    responses(
        (status = 200, description = "Fee estimate in wei", body = Fees),
        (status = 400, description = "Unknown chain"),
        (status = 502, description = "RPC failure")
    )
)]
pub async fn estimate_fees(
    State(state): State<AppState>,
    Query(query): Query<FeesQuery>,
) -> Result<Json<Fees>, ApiError> {
    let network = find_network(&query.chain)?;
    Ok(Json(state.chain.estimate_fees(network).await?))
}
