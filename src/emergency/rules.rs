// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Transition rules for emergency-access relationships.
//!
//! A relationship moves `invited -> accepted -> takeover-requested ->
//! takeover-completed`. Decline and revoke delete it. Every check here is a
//! pure function of the stored relationship and the current time, so the
//! waiting period needs no timer.

use chrono::DateTime;

use crate::error::ApiError;
use crate::models::{EmergencyRelationship, ScheduledNotification, User, Wallet};

pub const MIN_WAITING_PERIOD_DAYS: u32 = 7;
/// Exclusive upper bound.
pub const MAX_WAITING_PERIOD_DAYS: u32 = 100;
pub const SECONDS_PER_DAY: i64 = 86_400;

pub const REQUESTED_TITLE: &str = "Emergency Access has been requested";
pub const PENDING_TITLE: &str = "Emergency Access is pending";
pub const TAKEN_OVER_TITLE: &str = "Your Account was taken over";
pub const INVITATION_RECEIVED_TITLE: &str = "Emergency Access Invitation received";
pub const GRANT_REVOKED_TITLE: &str = "Emergency Access Grant was revoked";
pub const REQUEST_DENIED_TITLE: &str = "Emergency Access Request was denied";

/// Rejection sent when a takeover is attempted on a relationship without a
/// pending request. The contact clears its mirror when it receives it.
pub const ACCESS_NOT_REQUESTED: &str = "access not requested";

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("waiting period must be at least 7 and less than 100 days, got {0}")]
    InvalidWaitingPeriod(u32),

    #[error("you cannot add yourself as an emergency contact")]
    SelfContact,

    #[error("emergency contact already exists")]
    ContactExists,

    #[error("emergency access grant already exists")]
    GrantExists,

    #[error("emergency contact not found")]
    UnknownContact,

    #[error("emergency access grant not found")]
    UnknownGrant,

    #[error("invitation has already been accepted")]
    AlreadyAccepted,

    #[error("the invitation must be accepted first")]
    NotAccepted,

    #[error("takeover has already been requested")]
    AlreadyRequested,

    #[error("access not requested")]
    NotRequested,

    #[error("waiting period is not over before {0}")]
    WaitingPeriodRunning(i64),
}

impl From<TransitionError> for ApiError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::ContactExists | TransitionError::GrantExists => {
                ApiError::conflict(e.to_string())
            }
            TransitionError::UnknownContact | TransitionError::UnknownGrant => {
                ApiError::not_found(e.to_string())
            }
            _ => ApiError::bad_request(e.to_string()),
        }
    }
}

pub fn validate_waiting_period(days: u32) -> Result<(), TransitionError> {
    if !(MIN_WAITING_PERIOD_DAYS..MAX_WAITING_PERIOD_DAYS).contains(&days) {
        return Err(TransitionError::InvalidWaitingPeriod(days));
    }
    Ok(())
}

/// Owner side: may `contact_email` be invited?
pub fn check_invite(user: &User, contact_email: &str, days: u32) -> Result<(), TransitionError> {
    validate_waiting_period(days)?;
    if contact_email == user.email {
        return Err(TransitionError::SelfContact);
    }
    if user.emergency_contacts.contains_key(contact_email) {
        return Err(TransitionError::ContactExists);
    }
    Ok(())
}

/// Contact side: may the grant from `owner_email` be recorded?
pub fn check_grant(user: &User, owner_email: &str, days: u32) -> Result<(), TransitionError> {
    validate_waiting_period(days)?;
    if owner_email == user.email {
        return Err(TransitionError::SelfContact);
    }
    if user.emergency_grants.contains_key(owner_email) {
        return Err(TransitionError::GrantExists);
    }
    Ok(())
}

pub fn check_respond(relationship: &EmergencyRelationship) -> Result<(), TransitionError> {
    if relationship.has_accepted {
        return Err(TransitionError::AlreadyAccepted);
    }
    Ok(())
}

pub fn check_accepted(relationship: &EmergencyRelationship) -> Result<(), TransitionError> {
    if !relationship.has_accepted {
        return Err(TransitionError::NotAccepted);
    }
    Ok(())
}

/// Owner side: may a waiting period start?
pub fn check_request_access(relationship: &EmergencyRelationship) -> Result<(), TransitionError> {
    check_accepted(relationship)?;
    if relationship.has_requested_takeover {
        return Err(TransitionError::AlreadyRequested);
    }
    Ok(())
}

pub fn check_takeover(relationship: &EmergencyRelationship, now: i64) -> Result<(), TransitionError> {
    if !relationship.has_accepted {
        return Err(TransitionError::NotAccepted);
    }
    if !relationship.has_requested_takeover || relationship.takeover_allowed_after == 0 {
        return Err(TransitionError::NotRequested);
    }
    if !relationship.is_takeover_eligible(now) {
        return Err(TransitionError::WaitingPeriodRunning(
            relationship.takeover_allowed_after,
        ));
    }
    Ok(())
}

pub fn check_deny(relationship: &EmergencyRelationship) -> Result<(), TransitionError> {
    if !relationship.has_requested_takeover {
        return Err(TransitionError::NotRequested);
    }
    Ok(())
}

pub fn takeover_allowed_after(now: i64, waiting_period_in_days: u32) -> i64 {
    now + i64::from(waiting_period_in_days) * SECONDS_PER_DAY
}

fn format_date(unix: i64) -> String {
    DateTime::from_timestamp(unix, 0)
        .map(|date| date.to_rfc2822())
        .unwrap_or_else(|| unix.to_string())
}

/// Notifications warning the owner during the waiting period: one now, then
/// one per day until the day before eligibility.
pub fn notification_schedule(
    contact_email: &str,
    waiting_period_in_days: u32,
    now: i64,
    allowed_after: i64,
) -> Vec<ScheduledNotification> {
    let deadline = format_date(allowed_after);

    (0..i64::from(waiting_period_in_days.max(1)))
        .map(|day| {
            let send_after = now + day * SECONDS_PER_DAY;
            if day == 0 {
                ScheduledNotification {
                    send_after,
                    title: REQUESTED_TITLE.to_string(),
                    body: format!(
                        "{contact_email} has requested emergency access to your account. \
                         If you don't deny this request before {deadline}, your account may be taken over."
                    ),
                }
            } else {
                ScheduledNotification {
                    send_after,
                    title: PENDING_TITLE.to_string(),
                    body: format!(
                        "Your account may be taken over by {contact_email} on {deadline}. \
                         Deny this request before it is too late."
                    ),
                }
            }
        })
        .collect()
}

pub fn taken_over_body(contact_email: &str) -> String {
    format!(
        "Your account has been taken over by your emergency contact {contact_email}. \
         Your remaining data will be deleted soon."
    )
}

/// Add an owner's wallets to the contact's aggregate.
///
/// Imported wallets are renamed `"{name} ({owner})"` and never public.
/// Wallets whose address is already present are skipped. Returns the
/// imported wallets.
pub fn import_wallets(user: &mut User, owner_email: &str, wallets: Vec<Wallet>) -> Vec<Wallet> {
    let mut imported = Vec::new();
    for wallet in wallets {
        if user.wallet_by_address(&wallet.address).is_some() {
            continue;
        }
        let wallet = Wallet {
            name: format!("{} ({owner_email})", wallet.name),
            public: false,
            ..wallet
        };
        user.wallets.push(wallet.clone());
        imported.push(wallet);
    }
    imported
}
