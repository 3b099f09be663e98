// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Emergency-access flows across the owner's and the contact's enclaves.
//!
//! Each relationship is mirrored: the owner keeps a `ContactState`, the
//! contact keeps a `GrantState`. Calls that a transition does not depend on
//! (address lookups, peer round trips on the caller side, follow-up
//! notifications) run outside the user lock. Calls whose result is stored
//! or that must succeed before local state changes run inside it.

use crate::clients::{PeerCall, PeerError, TakeoverResponse};
use crate::error::ApiError;
use crate::models::{normalize_email, ContactState, EmergencyRelationship, GrantState, WalletResponse};
use crate::state::AppState;
use crate::storage::{AuditEvent, AuditEventType};

use super::rules::{self, TransitionError, ACCESS_NOT_REQUESTED};

fn peer_call<'a>(relationship: &'a EmergencyRelationship, token: &'a str) -> PeerCall<'a> {
    PeerCall {
        enclave_url: &relationship.enclave_url,
        token,
    }
}

/// Notify this enclave's own user through the Directory. Failures are logged.
async fn notify_user(state: &AppState, email: &str, title: &str, body: &str) {
    let token = match state.backend_token(email) {
        Ok(token) => token,
        Err(e) => {
            tracing::warn!(error = %e, title, "notification not sent, no backend token");
            return;
        }
    };
    if let Err(e) = state.directory.send_notification(&token, title, body).await {
        tracing::warn!(error = %e, title, "failed to send notification");
    }
}

// =============================================================================
// Owner side
// =============================================================================

/// Invite `contact_email` with the given waiting period.
///
/// Nothing is stored unless the contact's enclave recorded the grant.
pub async fn invite_contact(
    state: &AppState,
    contact_email: &str,
    waiting_period_in_days: u32,
) -> Result<ContactState, ApiError> {
    let contact_email = normalize_email(contact_email);
    let owner = state.load_user()?;
    rules::check_invite(&owner, &contact_email, waiting_period_in_days)?;

    let enclave_url = state
        .directory
        .resolve_enclave_address(&contact_email)
        .await?;
    let token = state.peer_token(&owner.email)?;
    state
        .enclaves
        .invite(
            PeerCall {
                enclave_url: &enclave_url,
                token: &token,
            },
            waiting_period_in_days,
        )
        .await?;

    let mut tx = state.begin().await?;
    rules::check_invite(&tx, &contact_email, waiting_period_in_days)?;
    let contact = ContactState::invited(&contact_email, enclave_url, waiting_period_in_days);
    tx.emergency_contacts
        .insert(contact_email.clone(), contact.clone());
    tx.commit()?;

    state.record(
        AuditEvent::new(AuditEventType::ContactInvited)
            .with_actor(&owner.email)
            .with_resource(&contact_email)
            .with_details(serde_json::json!({ "waiting_period_in_days": waiting_period_in_days })),
    );
    tracing::info!(contact = %contact_email, waiting_period_in_days, "emergency contact invited");
    Ok(contact)
}

pub fn list_contacts(state: &AppState) -> Result<Vec<ContactState>, ApiError> {
    Ok(state.load_user()?.emergency_contacts.into_values().collect())
}

/// Remove a contact: its grant first, then any pending series, then the
/// local record.
pub async fn revoke_contact(state: &AppState, contact_email: &str) -> Result<(), ApiError> {
    let contact_email = normalize_email(contact_email);
    let owner = state.load_user()?;
    let contact = owner
        .emergency_contacts
        .get(&contact_email)
        .ok_or(TransitionError::UnknownContact)?;

    let token = state.peer_token(&owner.email)?;
    match state.enclaves.remove_grant(peer_call(contact, &token)).await {
        Ok(()) => {}
        // Already gone on the contact's side, e.g. after an earlier attempt.
        Err(PeerError::Rejected { status: 404, .. }) => {
            tracing::debug!(contact = %contact_email, "grant already removed by contact");
        }
        Err(e) => return Err(e.into()),
    }

    let mut tx = state.begin().await?;
    let Some(contact) = tx.emergency_contacts.get(&contact_email).cloned() else {
        return Ok(());
    };
    if let Some(series_id) = &contact.notification_series_id {
        let backend = state.backend_token(&tx.email)?;
        state
            .directory
            .cancel_notification_series(&backend, series_id)
            .await?;
    }
    tx.emergency_contacts.remove(&contact_email);
    tx.commit()?;

    state.record(
        AuditEvent::new(AuditEventType::ContactRevoked)
            .with_actor(&owner.email)
            .with_resource(&contact_email),
    );
    tracing::info!(contact = %contact_email, "emergency contact revoked");
    Ok(())
}

/// Deny a pending access request.
///
/// Local state is cleared even when the contact cannot be told. The
/// contact's mirror is reconciled on its next takeover attempt.
pub async fn deny_access(state: &AppState, contact_email: &str) -> Result<(), ApiError> {
    let contact_email = normalize_email(contact_email);

    let (owner_email, contact) = {
        let mut tx = state.begin().await?;
        let contact = tx
            .emergency_contacts
            .get(&contact_email)
            .cloned()
            .ok_or(TransitionError::UnknownContact)?;
        rules::check_deny(&contact)?;

        if let Some(series_id) = &contact.notification_series_id {
            let backend = state.backend_token(&tx.email)?;
            state
                .directory
                .cancel_notification_series(&backend, series_id)
                .await?;
        }
        if let Some(stored) = tx.emergency_contacts.get_mut(&contact_email) {
            stored.clear_takeover_request();
        }
        let owner_email = tx.email.clone();
        tx.commit()?;
        (owner_email, contact)
    };

    state.record(
        AuditEvent::new(AuditEventType::AccessDenied)
            .with_actor(&owner_email)
            .with_resource(&contact_email),
    );

    let token = state.peer_token(&owner_email)?;
    if let Err(e) = state
        .enclaves
        .deny_access_request(peer_call(&contact, &token))
        .await
    {
        tracing::warn!(error = %e, contact = %contact_email, "contact not informed of denied access request");
        return Err(ApiError::bad_gateway(
            "access denied locally but the emergency contact could not be informed",
        ));
    }
    Ok(())
}

/// The contact answered the invitation.
pub async fn receive_invitation_response(
    state: &AppState,
    contact_email: &str,
    accept: bool,
) -> Result<(), ApiError> {
    let mut tx = state.begin().await?;
    let contact = tx
        .emergency_contacts
        .get_mut(contact_email)
        .ok_or(TransitionError::UnknownContact)?;
    rules::check_respond(contact)?;

    if accept {
        contact.has_accepted = true;
    } else if let Some(declined) = tx.emergency_contacts.remove(contact_email) {
        if let Some(series_id) = &declined.notification_series_id {
            let backend = state.backend_token(&tx.email)?;
            state
                .directory
                .cancel_notification_series(&backend, series_id)
                .await?;
        }
    }
    tx.commit()?;

    tracing::info!(contact = %contact_email, accept, "emergency access invitation answered");
    Ok(())
}

/// Start the waiting period for `contact_email`. Returns the unix time from
/// which a takeover is allowed.
pub async fn receive_access_request(state: &AppState, contact_email: &str) -> Result<i64, ApiError> {
    let mut tx = state.begin().await?;
    let now = state.clock.unix();

    let contact = tx
        .emergency_contacts
        .get(contact_email)
        .ok_or(TransitionError::UnknownContact)?;
    rules::check_request_access(contact)?;

    let days = contact.waiting_period_in_days;
    let allowed_after = rules::takeover_allowed_after(now, days);
    let schedule = rules::notification_schedule(contact_email, days, now, allowed_after);

    let backend = state.backend_token(&tx.email)?;
    let series_id = state
        .directory
        .schedule_notification_series(&backend, &schedule)
        .await?;

    if let Some(contact) = tx.emergency_contacts.get_mut(contact_email) {
        contact.mark_takeover_requested(allowed_after, Some(series_id));
    }
    let owner_email = tx.email.clone();
    tx.commit()?;

    state.record(
        AuditEvent::new(AuditEventType::AccessRequested)
            .with_actor(contact_email)
            .with_resource(&owner_email)
            .with_details(serde_json::json!({ "takeover_allowed_after": allowed_after })),
    );
    tracing::info!(contact = %contact_email, allowed_after, "emergency access requested");
    Ok(allowed_after)
}

/// Hand the account over to `contact_email` once the waiting period is over.
///
/// Pending series of every other contact are cancelled under the lock. Their
/// grants are revoked after it is released, from a snapshot taken while it
/// was held.
pub async fn complete_takeover(
    state: &AppState,
    contact_email: &str,
) -> Result<TakeoverResponse, ApiError> {
    let (owner_email, response, others) = {
        let mut tx = state.begin().await?;
        let contact = tx
            .emergency_contacts
            .get(contact_email)
            .ok_or(TransitionError::UnknownContact)?;
        rules::check_takeover(contact, state.clock.unix())?;

        let series_id = contact.notification_series_id.clone();
        let backend = state.backend_token(&tx.email)?;
        if let Some(series_id) = series_id {
            state
                .directory
                .cancel_notification_series(&backend, &series_id)
                .await?;
        }

        let others: Vec<ContactState> = tx
            .emergency_contacts
            .values()
            .filter(|other| other.email != contact_email)
            .cloned()
            .collect();
        for other in &others {
            let Some(series_id) = &other.notification_series_id else {
                continue;
            };
            if let Err(e) = state
                .directory
                .cancel_notification_series(&backend, series_id)
                .await
            {
                tracing::warn!(error = %e, contact = %other.email, series_id = %series_id, "failed to cancel notification series after takeover");
            }
        }
        tx.emergency_contacts.clear();

        let response = TakeoverResponse {
            jwt: backend,
            wallets: tx.wallets.clone(),
        };
        let owner_email = tx.email.clone();
        tx.commit()?;
        (owner_email, response, others)
    };

    state.record(
        AuditEvent::new(AuditEventType::TakeoverCompleted)
            .with_actor(contact_email)
            .with_resource(&owner_email)
            .with_details(serde_json::json!({ "wallets": response.wallets.len() })),
    );
    tracing::info!(contact = %contact_email, wallets = response.wallets.len(), "account taken over");

    if let Err(e) = state
        .directory
        .send_notification(
            &response.jwt,
            rules::TAKEN_OVER_TITLE,
            &rules::taken_over_body(contact_email),
        )
        .await
    {
        tracing::warn!(error = %e, "failed to send takeover notification");
    }

    match state.peer_token(&owner_email) {
        Ok(token) => {
            for other in &others {
                if let Err(e) = state.enclaves.remove_grant(peer_call(other, &token)).await {
                    tracing::warn!(error = %e, contact = %other.email, "failed to revoke emergency contact after takeover");
                }
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, remaining = others.len(), "other emergency contacts not revoked after takeover");
        }
    }

    Ok(response)
}

// =============================================================================
// Contact side
// =============================================================================

/// Record an invitation from `owner_email`.
pub async fn receive_invitation(
    state: &AppState,
    owner_email: &str,
    waiting_period_in_days: u32,
) -> Result<(), ApiError> {
    let user = state.load_user()?;
    rules::check_grant(&user, owner_email, waiting_period_in_days)?;

    let enclave_url = state.directory.resolve_enclave_address(owner_email).await?;

    let mut tx = state.begin().await?;
    rules::check_grant(&tx, owner_email, waiting_period_in_days)?;
    tx.emergency_grants.insert(
        owner_email.to_string(),
        GrantState::invited(owner_email, enclave_url, waiting_period_in_days),
    );
    let email = tx.email.clone();
    tx.commit()?;

    tracing::info!(owner = %owner_email, "emergency access invitation received");
    notify_user(
        state,
        &email,
        rules::INVITATION_RECEIVED_TITLE,
        &format!("{owner_email} invited you to be their emergency contact. Review the invitation in your wallet."),
    )
    .await;
    Ok(())
}

/// The owner revoked this user as their contact.
pub async fn receive_revocation(state: &AppState, owner_email: &str) -> Result<(), ApiError> {
    let mut tx = state.begin().await?;
    tx.emergency_grants
        .remove(owner_email)
        .ok_or(TransitionError::UnknownGrant)?;
    let email = tx.email.clone();
    tx.commit()?;

    state.record(
        AuditEvent::new(AuditEventType::ContactRevoked)
            .with_actor(owner_email)
            .with_resource(&email),
    );
    notify_user(
        state,
        &email,
        rules::GRANT_REVOKED_TITLE,
        &format!("You are no longer registered as an emergency contact for {owner_email}."),
    )
    .await;
    Ok(())
}

/// The owner denied this user's access request. Succeeds whether or not a
/// request was pending.
pub async fn receive_denial(state: &AppState, owner_email: &str) -> Result<(), ApiError> {
    let mut tx = state.begin().await?;
    let grant = tx
        .emergency_grants
        .get_mut(owner_email)
        .ok_or(TransitionError::UnknownGrant)?;
    let was_requested = grant.has_requested_takeover;
    grant.clear_takeover_request();
    let email = tx.email.clone();
    tx.commit()?;

    if was_requested {
        state.record(
            AuditEvent::new(AuditEventType::AccessDenied)
                .with_actor(owner_email)
                .with_resource(&email),
        );
        notify_user(
            state,
            &email,
            rules::REQUEST_DENIED_TITLE,
            &format!("Your pending request to take over the wallets of {owner_email} has been denied by the owner."),
        )
        .await;
    }
    Ok(())
}

pub fn list_grants(state: &AppState) -> Result<Vec<GrantState>, ApiError> {
    Ok(state.load_user()?.emergency_grants.into_values().collect())
}

/// Answer an invitation. The grant changes only after the owner acknowledged.
pub async fn respond_invitation(
    state: &AppState,
    owner_email: &str,
    accept: bool,
) -> Result<(), ApiError> {
    let owner_email = normalize_email(owner_email);
    let user = state.load_user()?;
    let grant = user
        .emergency_grants
        .get(&owner_email)
        .ok_or(TransitionError::UnknownGrant)?;
    rules::check_respond(grant)?;

    let token = state.peer_token(&user.email)?;
    state
        .enclaves
        .respond_invitation(peer_call(grant, &token), accept)
        .await?;

    let mut tx = state.begin().await?;
    if accept {
        if let Some(grant) = tx.emergency_grants.get_mut(&owner_email) {
            grant.has_accepted = true;
        }
    } else {
        tx.emergency_grants.remove(&owner_email);
    }
    tx.commit()?;
    Ok(())
}

/// Ask the owner's enclave to start the waiting period.
///
/// Whether a request is already pending is decided by the owner. The local
/// mirror may still show a request the owner denied without reaching us.
pub async fn request_access(state: &AppState, owner_email: &str) -> Result<i64, ApiError> {
    let owner_email = normalize_email(owner_email);
    let user = state.load_user()?;
    let grant = user
        .emergency_grants
        .get(&owner_email)
        .ok_or(TransitionError::UnknownGrant)?;
    rules::check_accepted(grant)?;

    let token = state.peer_token(&user.email)?;
    let allowed_after = match state.enclaves.request_access(peer_call(grant, &token)).await {
        Ok(allowed_after) => allowed_after,
        Err(PeerError::Rejected { status: 400, message }) => {
            return Err(ApiError::bad_request(message))
        }
        Err(e) => return Err(e.into()),
    };
    if allowed_after <= state.clock.unix() {
        return Err(PeerError::InvalidResponse(format!(
            "takeover_allowed_after {allowed_after} is not in the future"
        ))
        .into());
    }

    let mut tx = state.begin().await?;
    let grant = tx
        .emergency_grants
        .get_mut(&owner_email)
        .ok_or(TransitionError::UnknownGrant)?;
    grant.mark_takeover_requested(allowed_after, None);
    tx.commit()?;

    Ok(allowed_after)
}

/// Take over the owner's account and import its wallets.
///
/// The import is committed before the owner's account deletion is
/// requested, so a failed deletion never loses the imported keys.
pub async fn request_takeover(
    state: &AppState,
    owner_email: &str,
) -> Result<Vec<WalletResponse>, ApiError> {
    let owner_email = normalize_email(owner_email);
    let user = state.load_user()?;
    let grant = user
        .emergency_grants
        .get(&owner_email)
        .ok_or(TransitionError::UnknownGrant)?;
    rules::check_takeover(grant, state.clock.unix())?;

    let token = state.peer_token(&user.email)?;
    let response = match state.enclaves.request_takeover(peer_call(grant, &token)).await {
        Ok(response) => response,
        Err(e) if e.rejection_message() == Some(ACCESS_NOT_REQUESTED) => {
            // The owner denied the request but the denial never arrived.
            let mut tx = state.begin().await?;
            if let Some(grant) = tx.emergency_grants.get_mut(&owner_email) {
                grant.clear_takeover_request();
            }
            tx.commit()?;
            tracing::info!(owner = %owner_email, "cleared stale access request");
            return Err(TransitionError::NotRequested.into());
        }
        Err(e) => return Err(e.into()),
    };

    let TakeoverResponse { jwt, wallets } = response;
    let imported = {
        let mut tx = state.begin().await?;
        let imported = rules::import_wallets(&mut tx, &owner_email, wallets);
        tx.emergency_grants.remove(&owner_email);
        tx.commit()?;
        imported
    };

    state.record(
        AuditEvent::new(AuditEventType::WalletsImported)
            .with_actor(&user.email)
            .with_resource(&owner_email)
            .with_details(serde_json::json!({ "wallets": imported.len() })),
    );
    tracing::info!(owner = %owner_email, wallets = imported.len(), "wallets imported from taken over account");

    if let Err(e) = state.directory.delete_account(&jwt).await {
        tracing::warn!(error = %e, owner = %owner_email, "taken over account could not be deleted");
        return Err(ApiError::bad_gateway(format!(
            "wallets imported but the account of {owner_email} could not be deleted"
        )));
    }

    Ok(imported.iter().map(WalletResponse::from).collect())
}
