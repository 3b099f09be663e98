// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Off-chain signatures with a wallet key: EIP-191 messages and EIP-712
//! typed data.

use alloy::dyn_abi::TypedData;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    auth::UserSession,
    chain::signing::{personal_sign, sign_typed_data},
    error::ApiError,
    models::{User, Wallet},
    state::AppState,
    storage::{AuditEvent, AuditEventType},
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct SignMessageRequest {
    /// UTF-8 text, or 0x-prefixed hex for raw bytes.
    pub message: String,
    /// Address of the signing wallet.
    pub from: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SignTypedDataRequest {
    /// EIP-712 typed data as passed to `eth_signTypedData_v4`.
    #[schema(value_type = Object)]
    pub typed_data: TypedData,
    pub from: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SignatureResponse {
    /// 0x-hex `r || s || v`.
    pub signature: String,
}

fn signing_wallet<'a>(user: &'a User, from: &str) -> Result<&'a Wallet, ApiError> {
    user.wallet_by_address(from)
        .ok_or_else(|| ApiError::bad_request("signing wallet does not exist"))
}

/// Raw bytes of a message: hex when 0x-prefixed and well formed, text otherwise.
fn message_bytes(message: &str) -> Vec<u8> {
    match message.strip_prefix("0x") {
        Some(hex) if !hex.is_empty() => {
            alloy::hex::decode(hex).unwrap_or_else(|_| message.as_bytes().to_vec())
        }
        _ => message.as_bytes().to_vec(),
    }
}

/// Sign a message with EIP-191 `personal_sign`.
#[utoipa::path(
    post,
    path = "/message/sign",
    tag = "Signing",
    request_body = SignMessageRequest,
    responses(
        (status = 200, description = "Signature", body = SignatureResponse),
        (status = 400, description = "Unknown signing wallet"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn sign_message(
    UserSession(session): UserSession,
    State(state): State<AppState>,
    Json(request): Json<SignMessageRequest>,
) -> Result<Json<SignatureResponse>, ApiError> {
    let user = state.load_user()?;
    let wallet = signing_wallet(&user, &request.from)?;
    let signature = personal_sign(&wallet.private_key_pem, &message_bytes(&request.message))?;

    state.record(
        AuditEvent::new(AuditEventType::MessageSigned)
            .with_actor(&session.email)
            .with_resource(&wallet.address),
    );
    Ok(Json(SignatureResponse { signature }))
}

/// Sign EIP-712 typed data.
#[utoipa::path(
    post,
    path = "/typed-data/sign",
    tag = "Signing",
    request_body = SignTypedDataRequest,
    responses(
        (status = 200, description = "Signature", body = SignatureResponse),
        (status = 400, description = "Unknown signing wallet or invalid typed data"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn sign_typed_data_handler(
    UserSession(session): UserSession,
    State(state): State<AppState>,
    Json(request): Json<SignTypedDataRequest>,
) -> Result<Json<SignatureResponse>, ApiError> {
    let user = state.load_user()?;
    let wallet = signing_wallet(&user, &request.from)?;
    let signature = sign_typed_data(&wallet.private_key_pem, &request.typed_data)?;

    state.record(
        AuditEvent::new(AuditEventType::MessageSigned)
            .with_actor(&session.email)
            .with_resource(&wallet.address)
            .with_details(serde_json::json!({ "typed_data": true })),
    );
    Ok(Json(SignatureResponse { signature }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_messages_are_signed_as_bytes() {
        assert_eq!(message_bytes("0x68656c6c6f"), b"hello".to_vec());
        assert_eq!(message_bytes("hello"), b"hello".to_vec());
        assert_eq!(message_bytes("0xnot-hex"), b"0xnot-hex".to_vec());
        assert_eq!(message_bytes("0x"), b"0x".to_vec());
    }
}
