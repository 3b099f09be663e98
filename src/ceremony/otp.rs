// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! One-time fallback codes.
//!
//! A code lets a new device obtain a short `create-credential` session.
//! Two mismatches or one successful redemption deactivate it.

use ring::rand::{SecureRandom, SystemRandom};

use crate::error::ApiError;
use crate::models::{OneTimeCode, User};

pub const OTP_VALIDITY_SECS: i64 = 30 * 60;
pub const MAX_OTP_MISMATCHES: u32 = 2;

const ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const GROUPS: usize = 3;
const GROUP_LEN: usize = 5;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum OtpError {
    #[error("no one-time code was issued")]
    NotIssued,

    #[error("one-time code is no longer active")]
    Inactive,

    #[error("one-time code expired")]
    Expired,

    #[error("one-time code does not match")]
    Mismatch,

    #[error("system randomness unavailable")]
    Random,
}

const INVALID_CODE: &str = "The one-time code is invalid or expired. Try creating a new one.";

impl From<OtpError> for ApiError {
    fn from(e: OtpError) -> Self {
        match e {
            OtpError::Random => ApiError::internal(e.to_string()),
            other => {
                tracing::warn!(reason = %other, "one-time code rejected");
                ApiError::unauthorized(INVALID_CODE)
            }
        }
    }
}

/// Random `XXXXX-XXXXX-XXXXX` code over `A-Z0-9`.
pub fn generate_code() -> Result<String, OtpError> {
    let rng = SystemRandom::new();
    let mut symbols = Vec::with_capacity(GROUPS * GROUP_LEN);
    let mut byte = [0u8; 1];

    while symbols.len() < GROUPS * GROUP_LEN {
        rng.fill(&mut byte).map_err(|_| OtpError::Random)?;
        // 252 is the largest multiple of 36 below 256.
        if byte[0] < 252 {
            symbols.push(ALPHABET[(byte[0] % 36) as usize] as char);
        }
    }

    Ok(symbols
        .chunks(GROUP_LEN)
        .map(|group| group.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join("-"))
}

/// Replace any previous code with a fresh one.
pub fn issue(user: &mut User, now: i64) -> Result<OneTimeCode, OtpError> {
    let code = OneTimeCode {
        secret: generate_code()?,
        valid_until: now + OTP_VALIDITY_SECS,
        times_tried: 0,
        active: true,
    };
    user.otp = Some(code.clone());
    Ok(code)
}

/// Current code, deactivated first if it has expired.
pub fn current(user: &mut User, now: i64) -> Option<&OneTimeCode> {
    let code = user.otp.as_mut()?;
    if code.active && code.is_expired(now) {
        code.active = false;
    }
    Some(code)
}

/// Check a presented code. Attempt counting mutates `user` even on failure,
/// so callers persist the aggregate before reporting the error.
pub fn redeem(user: &mut User, presented: &str, now: i64) -> Result<(), OtpError> {
    let code = user.otp.as_mut().ok_or(OtpError::NotIssued)?;
    if !code.active {
        return Err(OtpError::Inactive);
    }
    if code.is_expired(now) {
        code.active = false;
        return Err(OtpError::Expired);
    }

    let presented = presented.trim().to_ascii_uppercase();
    if !constant_time_eq(presented.as_bytes(), code.secret.as_bytes()) {
        code.times_tried += 1;
        if code.times_tried >= MAX_OTP_MISMATCHES {
            code.active = false;
        }
        return Err(OtpError::Mismatch);
    }

    code.active = false;
    Ok(())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
