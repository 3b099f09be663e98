// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Transaction ceremonies.
//!
//! Initialize binds the transaction to a fresh WebAuthn challenge. Finalize
//! releases exactly that transaction once the assertion verifies, so a
//! frontend cannot swap parameters between approval and signing.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    auth::UserSession,
    ceremony::{
        webauthn::{AssertionResponse, RequestOptions},
        Authenticated,
    },
    chain::{client::transaction_request, find_network, SignedTransaction},
    error::ApiError,
    models::{CeremonyPurpose, OperationPayload, TransactionParams, Wallet},
    state::AppState,
    storage::{AuditEvent, AuditEventType},
};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SentTransaction {
    pub transaction_hash: String,
}

/// Reject parameters that could never be signed before a ceremony starts.
fn validate(state: &AppState, params: &TransactionParams) -> Result<(), ApiError> {
    let network = find_network(&params.chain_id)?;
    transaction_request(params, network)?;
    let user = state.load_user()?;
    if user.wallet_by_address(&params.from).is_none() {
        return Err(ApiError::bad_request("sending wallet does not exist"));
    }
    Ok(())
}

async fn initialize(
    state: &AppState,
    purpose: CeremonyPurpose,
    params: TransactionParams,
) -> Result<RequestOptions, ApiError> {
    validate(state, &params)?;

    let mut tx = state.begin().await?;
    let options = state.ceremonies.begin_authentication(
        &mut tx,
        purpose,
        Some(OperationPayload::Transaction(params)),
    )?;
    tx.commit()?;
    Ok(options)
}

/// Verify the assertion and return the released transaction with its wallet.
///
/// The ceremony is persisted as consumed whether or not it verified.
async fn finalize(
    state: &AppState,
    purpose: CeremonyPurpose,
    response: &AssertionResponse,
) -> Result<(TransactionParams, Wallet), ApiError> {
    let mut tx = state.begin().await?;
    let outcome = state
        .ceremonies
        .finalize_authentication(&mut tx, purpose, response);
    let wallets = tx.wallets.clone();
    tx.commit()?;

    let params = match outcome? {
        Authenticated {
            operation: Some(OperationPayload::Transaction(params)),
            ..
        } => params,
        Authenticated { operation: None, .. } => {
            return Err(ApiError::bad_request("no transaction is bound to this ceremony"))
        }
    };
    let wallet = wallets
        .into_iter()
        .find(|wallet| wallet.address.eq_ignore_ascii_case(&params.from))
        .ok_or_else(|| ApiError::bad_request("sending wallet does not exist"))?;
    Ok((params, wallet))
}

/// Start a ceremony approving a transaction to be signed.
#[utoipa::path(
    post,
    path = "/transaction/sign/initialize",
    tag = "Transactions",
    request_body = TransactionParams,
    responses(
        (status = 200, description = "WebAuthn request options", body = RequestOptions),
        (status = 400, description = "Unknown chain, unknown wallet or malformed parameters"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn sign_initialize(
    UserSession(_session): UserSession,
    State(state): State<AppState>,
    Json(params): Json<TransactionParams>,
) -> Result<Json<RequestOptions>, ApiError> {
    Ok(Json(
        initialize(&state, CeremonyPurpose::SignTransaction, params).await?,
    ))
}

/// Sign the approved transaction without broadcasting it.
#[utoipa::path(
    post,
    path = "/transaction/sign/finalize",
    tag = "Transactions",
    request_body = AssertionResponse,
    responses(
        (status = 200, description = "Signed transaction", body = SignedTransaction),
        (status = 400, description = "Ceremony not initialized or expired"),
        (status = 401, description = "Assertion did not verify"),
        (status = 502, description = "RPC failure while filling the transaction")
    )
)]
pub async fn sign_finalize(
    UserSession(session): UserSession,
    State(state): State<AppState>,
    Json(response): Json<AssertionResponse>,
) -> Result<Json<SignedTransaction>, ApiError> {
    let (params, wallet) = finalize(&state, CeremonyPurpose::SignTransaction, &response).await?;
    let signed = state
        .chain
        .sign_transaction(&params, &wallet.private_key_pem)
        .await?;

    state.record(
        AuditEvent::new(AuditEventType::TransactionSigned)
            .with_actor(&session.email)
            .with_resource(&wallet.address)
            .with_details(serde_json::json!({
                "chain_id": params.chain_id,
                "transaction_hash": signed.transaction_hash,
            })),
    );
    tracing::info!(wallet = %wallet.address, hash = %signed.transaction_hash, "transaction signed");
    Ok(Json(signed))
}

/// Start a ceremony approving a transaction to be broadcast.
#[utoipa::path(
    post,
    path = "/transaction/send/initialize",
    tag = "Transactions",
    request_body = TransactionParams,
    responses(
        (status = 200, description = "WebAuthn request options", body = RequestOptions),
        (status = 400, description = "Unknown chain, unknown wallet or malformed parameters"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn send_initialize(
    UserSession(_session): UserSession,
    State(state): State<AppState>,
    Json(params): Json<TransactionParams>,
) -> Result<Json<RequestOptions>, ApiError> {
    Ok(Json(
        initialize(&state, CeremonyPurpose::SendTransaction, params).await?,
    ))
}

/// Sign and broadcast the approved transaction.
#[utoipa::path(
    post,
    path = "/transaction/send/finalize",
    tag = "Transactions",
    request_body = AssertionResponse,
    responses(
        (status = 200, description = "Transaction broadcast", body = SentTransaction),
        (status = 400, description = "Ceremony not initialized, expired or insufficient funds"),
        (status = 401, description = "Assertion did not verify"),
        (status = 502, description = "RPC failure")
    )
)]
pub async fn send_finalize(
    UserSession(session): UserSession,
    State(state): State<AppState>,
    Json(response): Json<AssertionResponse>,
) -> Result<Json<SentTransaction>, ApiError> {
    let (params, wallet) = finalize(&state, CeremonyPurpose::SendTransaction, &response).await?;
    let transaction_hash = state
        .chain
        .send_transaction(&params, &wallet.private_key_pem)
        .await?;

    state.record(
        AuditEvent::new(AuditEventType::TransactionBroadcast)
            .with_actor(&session.email)
            .with_resource(&wallet.address)
            .with_details(serde_json::json!({
                "chain_id": params.chain_id,
                "transaction_hash": transaction_hash,
            })),
    );
    tracing::info!(wallet = %wallet.address, hash = %transaction_hash, "transaction sent");
    Ok(Json(SentTransaction { transaction_hash }))
}
