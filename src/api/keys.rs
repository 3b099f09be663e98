// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VerificationKeyResponse {
    /// Raw 32-byte Ed25519 public key, standard base64.
    pub verification_key: String,
}

/// Key that verifies every token this enclave mints.
///
/// Unauthenticated: peers fetch it before they can check our tokens.
#[utoipa::path(
    get,
    path = "/jwt-verification-key",
    tag = "Keys",
    responses((status = 200, description = "Token verification key", body = VerificationKeyResponse))
)]
pub async fn verification_key(State(state): State<AppState>) -> Json<VerificationKeyResponse> {
    Json(VerificationKeyResponse {
        verification_key: state.tokens.signing_key().verification_key_base64(),
    })
}
