// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session endpoints: WebAuthn login, one-time code login and logout.

use axum::{
    extract::State,
    http::{header::SET_COOKIE, HeaderValue, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    auth::{
        cookie::{expired_session_cookie, session_cookie},
        tokens::{CREATE_CREDENTIAL_LIFETIME_SECS, SESSION_LIFETIME_SECS},
    },
    ceremony::{
        otp,
        webauthn::{AssertionResponse, RequestOptions},
    },
    error::ApiError,
    models::CeremonyPurpose,
    state::AppState,
    storage::{AuditEvent, AuditEventType},
};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    /// Token for calls to the Directory on behalf of the user.
    pub backend_jwt: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct OtpLoginRequest {
    pub otp: String,
}

type WithCookie<T> = ([(axum::http::HeaderName, HeaderValue); 1], T);

fn cookie_header(token: &str, lifetime_secs: i64) -> Result<HeaderValue, ApiError> {
    session_cookie(token, lifetime_secs)
        .ok_or_else(|| ApiError::internal("session token is not a valid cookie value"))
}

/// Start a login ceremony.
#[utoipa::path(
    get,
    path = "/login/initialize",
    tag = "Session",
    responses(
        (status = 200, description = "WebAuthn request options", body = RequestOptions),
        (status = 400, description = "No credential registered"),
        (status = 404, description = "No account registered")
    )
)]
pub async fn login_initialize(
    State(state): State<AppState>,
) -> Result<Json<RequestOptions>, ApiError> {
    let mut tx = state.begin().await?;
    if !tx.is_registered() {
        return Err(ApiError::bad_request("no credential is registered"));
    }
    let options = state
        .ceremonies
        .begin_authentication(&mut tx, CeremonyPurpose::Login, None)?;
    tx.commit()?;
    Ok(Json(options))
}

/// Verify the login assertion and set the session cookie.
#[utoipa::path(
    post,
    path = "/login/finalize",
    tag = "Session",
    request_body = AssertionResponse,
    responses(
        (status = 200, description = "Logged in, session cookie set", body = LoginResponse),
        (status = 400, description = "Ceremony not initialized or expired"),
        (status = 401, description = "Assertion did not verify")
    )
)]
pub async fn login_finalize(
    State(state): State<AppState>,
    Json(response): Json<AssertionResponse>,
) -> Result<WithCookie<Json<LoginResponse>>, ApiError> {
    let mut tx = state.begin().await?;
    let outcome = state
        .ceremonies
        .finalize_authentication(&mut tx, CeremonyPurpose::Login, &response);
    let email = tx.email.clone();
    tx.commit()?;
    let authenticated = outcome?;

    let session = state
        .tokens
        .frontend_session(&email, &authenticated.credential_name)?;
    let backend_jwt = state.backend_token(&email)?;

    state.record(
        AuditEvent::new(AuditEventType::LoggedIn)
            .with_actor(&email)
            .with_details(serde_json::json!({ "credential": authenticated.credential_name })),
    );
    tracing::info!(credential = %authenticated.credential_name, "user logged in");

    Ok((
        [(SET_COOKIE, cookie_header(&session, SESSION_LIFETIME_SECS)?)],
        Json(LoginResponse { backend_jwt }),
    ))
}

/// Redeem a one-time code for a short session that may only add a credential.
#[utoipa::path(
    post,
    path = "/otp/login",
    tag = "Session",
    request_body = OtpLoginRequest,
    responses(
        (status = 200, description = "Credential session cookie set"),
        (status = 401, description = "Code invalid, expired or used up")
    )
)]
pub async fn otp_login(
    State(state): State<AppState>,
    Json(request): Json<OtpLoginRequest>,
) -> Result<WithCookie<StatusCode>, ApiError> {
    let mut tx = state.begin().await?;
    let outcome = otp::redeem(&mut tx, &request.otp, state.clock.unix());
    let email = tx.email.clone();
    tx.commit()?;
    outcome?;

    let session = state.tokens.credential_session(&email)?;
    state.record(AuditEvent::new(AuditEventType::OtpLogin).with_actor(&email));
    tracing::info!("one-time code redeemed");

    Ok((
        [(SET_COOKIE, cookie_header(&session, CREATE_CREDENTIAL_LIFETIME_SECS)?)],
        StatusCode::OK,
    ))
}

/// Clear the session cookie.
#[utoipa::path(
    post,
    path = "/logout",
    tag = "Session",
    responses((status = 200, description = "Session cookie cleared"))
)]
pub async fn logout() -> WithCookie<StatusCode> {
    ([(SET_COOKIE, expired_session_cookie())], StatusCode::OK)
}
