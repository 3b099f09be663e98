// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Emergency-access endpoints.
//!
//! `/emergency-access/contacts` belongs to the owner side and
//! `/emergency-access/grants` to the contact side. Each side has routes for
//! its own frontend (session cookie) and routes for the other enclave
//! (peer bearer token, whose subject identifies the calling enclave's owner).

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    auth::{PeerSession, StrictUserSession, UserSession},
    clients::TakeoverResponse,
    emergency::coordinator,
    error::ApiError,
    models::{ContactState, GrantState, WalletResponse},
    state::AppState,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct InviteContactRequest {
    pub contact_email: String,
    /// At least 7 and below 100.
    pub waiting_period_in_days: u32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GrantInvitationRequest {
    pub waiting_period_in_days: u32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GrantResponseRequest {
    pub accept: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RespondInvitationRequest {
    pub grantor_email: String,
    pub accept: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GrantorRequest {
    pub grantor_email: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AccessRequestedResponse {
    /// Unix seconds from which a takeover is allowed.
    pub takeover_allowed_after: i64,
}

// =============================================================================
// Owner: own frontend
// =============================================================================

#[utoipa::path(
    post,
    path = "/emergency-access/contacts",
    tag = "Emergency Access",
    request_body = InviteContactRequest,
    responses(
        (status = 201, description = "Contact invited", body = ContactState),
        (status = 400, description = "Invalid waiting period or own email"),
        (status = 404, description = "Contact has no enclave"),
        (status = 409, description = "Contact already exists"),
        (status = 502, description = "Contact's enclave or the Directory failed")
    )
)]
pub async fn invite_contact(
    UserSession(_session): UserSession,
    State(state): State<AppState>,
    Json(request): Json<InviteContactRequest>,
) -> Result<(StatusCode, Json<ContactState>), ApiError> {
    let contact = coordinator::invite_contact(
        &state,
        &request.contact_email,
        request.waiting_period_in_days,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(contact)))
}

#[utoipa::path(
    get,
    path = "/emergency-access/contacts",
    tag = "Emergency Access",
    responses((status = 200, description = "Emergency contacts", body = [ContactState]))
)]
pub async fn list_contacts(
    UserSession(_session): UserSession,
    State(state): State<AppState>,
) -> Result<Json<Vec<ContactState>>, ApiError> {
    Ok(Json(coordinator::list_contacts(&state)?))
}

#[utoipa::path(
    delete,
    path = "/emergency-access/contacts/{email}",
    tag = "Emergency Access",
    params(("email" = String, Path, description = "Contact email")),
    responses(
        (status = 200, description = "Contact revoked"),
        (status = 404, description = "Unknown contact"),
        (status = 502, description = "Contact's enclave or the Directory failed")
    )
)]
pub async fn revoke_contact(
    UserSession(_session): UserSession,
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<StatusCode, ApiError> {
    coordinator::revoke_contact(&state, &email).await?;
    Ok(StatusCode::OK)
}

/// Deny a pending access request. Requires a fresh login.
#[utoipa::path(
    post,
    path = "/emergency-access/contacts/{email}/deny-access",
    tag = "Emergency Access",
    params(("email" = String, Path, description = "Contact email")),
    responses(
        (status = 200, description = "Access request denied"),
        (status = 400, description = "No access request pending"),
        (status = 404, description = "Unknown contact"),
        (status = 502, description = "Denied locally, contact not informed")
    )
)]
pub async fn deny_access(
    StrictUserSession(_session): StrictUserSession,
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<StatusCode, ApiError> {
    coordinator::deny_access(&state, &email).await?;
    Ok(StatusCode::OK)
}

// =============================================================================
// Owner: called by the contact's enclave
// =============================================================================

#[utoipa::path(
    post,
    path = "/emergency-access/contacts/grant-response",
    tag = "Emergency Access Peers",
    request_body = GrantResponseRequest,
    responses(
        (status = 200, description = "Invitation answered"),
        (status = 400, description = "Invitation already accepted"),
        (status = 404, description = "Caller is not a contact")
    )
)]
pub async fn receive_grant_response(
    peer: PeerSession,
    State(state): State<AppState>,
    Json(request): Json<GrantResponseRequest>,
) -> Result<StatusCode, ApiError> {
    coordinator::receive_invitation_response(&state, &peer.subject, request.accept).await?;
    Ok(StatusCode::OK)
}

#[utoipa::path(
    post,
    path = "/emergency-access/contacts/request-access",
    tag = "Emergency Access Peers",
    responses(
        (status = 200, description = "Waiting period started", body = AccessRequestedResponse),
        (status = 400, description = "Not accepted or already requested"),
        (status = 404, description = "Caller is not a contact"),
        (status = 502, description = "Notifications could not be scheduled")
    )
)]
pub async fn receive_access_request(
    peer: PeerSession,
    State(state): State<AppState>,
) -> Result<Json<AccessRequestedResponse>, ApiError> {
    let takeover_allowed_after = coordinator::receive_access_request(&state, &peer.subject).await?;
    Ok(Json(AccessRequestedResponse {
        takeover_allowed_after,
    }))
}

#[utoipa::path(
    post,
    path = "/emergency-access/contacts/request-takeover",
    tag = "Emergency Access Peers",
    responses(
        (status = 200, description = "Wallets and backend token of this account", body = TakeoverResponse),
        (status = 400, description = "Not accepted, not requested or waiting period running"),
        (status = 404, description = "Caller is not a contact"),
        (status = 502, description = "Notification series could not be cancelled")
    )
)]
pub async fn receive_takeover_request(
    peer: PeerSession,
    State(state): State<AppState>,
) -> Result<Json<TakeoverResponse>, ApiError> {
    Ok(Json(
        coordinator::complete_takeover(&state, &peer.subject).await?,
    ))
}

// =============================================================================
// Contact: called by the owner's enclave
// =============================================================================

#[utoipa::path(
    post,
    path = "/emergency-access/grants",
    tag = "Emergency Access Peers",
    request_body = GrantInvitationRequest,
    responses(
        (status = 201, description = "Grant recorded"),
        (status = 400, description = "Invalid waiting period"),
        (status = 409, description = "Grant already exists")
    )
)]
pub async fn receive_invitation(
    peer: PeerSession,
    State(state): State<AppState>,
    Json(request): Json<GrantInvitationRequest>,
) -> Result<StatusCode, ApiError> {
    coordinator::receive_invitation(&state, &peer.subject, request.waiting_period_in_days).await?;
    Ok(StatusCode::CREATED)
}

#[utoipa::path(
    delete,
    path = "/emergency-access/grants",
    tag = "Emergency Access Peers",
    responses(
        (status = 200, description = "Grant removed"),
        (status = 404, description = "No grant from the caller")
    )
)]
pub async fn receive_revocation(
    peer: PeerSession,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    coordinator::receive_revocation(&state, &peer.subject).await?;
    Ok(StatusCode::OK)
}

/// Clear a pending request. Succeeds whether or not one was pending.
#[utoipa::path(
    post,
    path = "/emergency-access/grants/deny-access-request",
    tag = "Emergency Access Peers",
    responses(
        (status = 200, description = "Request cleared"),
        (status = 404, description = "No grant from the caller")
    )
)]
pub async fn receive_denial(
    peer: PeerSession,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    coordinator::receive_denial(&state, &peer.subject).await?;
    Ok(StatusCode::OK)
}

// =============================================================================
// Contact: own frontend
// =============================================================================

#[utoipa::path(
    get,
    path = "/emergency-access/grants",
    tag = "Emergency Access",
    responses((status = 200, description = "Grants received", body = [GrantState]))
)]
pub async fn list_grants(
    UserSession(_session): UserSession,
    State(state): State<AppState>,
) -> Result<Json<Vec<GrantState>>, ApiError> {
    Ok(Json(coordinator::list_grants(&state)?))
}

/// Accept or decline an invitation. Requires a fresh login.
#[utoipa::path(
    post,
    path = "/emergency-access/grants/respond-invitation",
    tag = "Emergency Access",
    request_body = RespondInvitationRequest,
    responses(
        (status = 200, description = "Invitation answered"),
        (status = 400, description = "Invitation already accepted"),
        (status = 404, description = "Unknown grant"),
        (status = 502, description = "Owner's enclave failed")
    )
)]
pub async fn respond_invitation(
    StrictUserSession(_session): StrictUserSession,
    State(state): State<AppState>,
    Json(request): Json<RespondInvitationRequest>,
) -> Result<StatusCode, ApiError> {
    coordinator::respond_invitation(&state, &request.grantor_email, request.accept).await?;
    Ok(StatusCode::OK)
}

#[utoipa::path(
    post,
    path = "/emergency-access/grants/request-access",
    tag = "Emergency Access",
    request_body = GrantorRequest,
    responses(
        (status = 200, description = "Waiting period started", body = AccessRequestedResponse),
        (status = 400, description = "Not accepted or already requested"),
        (status = 404, description = "Unknown grant"),
        (status = 502, description = "Owner's enclave failed")
    )
)]
pub async fn request_access(
    UserSession(_session): UserSession,
    State(state): State<AppState>,
    Json(request): Json<GrantorRequest>,
) -> Result<Json<AccessRequestedResponse>, ApiError> {
    let takeover_allowed_after = coordinator::request_access(&state, &request.grantor_email).await?;
    Ok(Json(AccessRequestedResponse {
        takeover_allowed_after,
    }))
}

/// Take over the grantor's wallets once the waiting period is over.
#[utoipa::path(
    post,
    path = "/emergency-access/grants/request-takeover",
    tag = "Emergency Access",
    request_body = GrantorRequest,
    responses(
        (status = 200, description = "Imported wallets", body = [WalletResponse]),
        (status = 400, description = "Not requested or waiting period running"),
        (status = 404, description = "Unknown grant"),
        (status = 502, description = "Owner's enclave or the Directory failed")
    )
)]
pub async fn request_takeover(
    UserSession(_session): UserSession,
    State(state): State<AppState>,
    Json(request): Json<GrantorRequest>,
) -> Result<Json<Vec<WalletResponse>>, ApiError> {
    Ok(Json(
        coordinator::request_takeover(&state, &request.grantor_email).await?,
    ))
}
