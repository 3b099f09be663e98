// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Emergency Access
//!
//! A designated contact can take over an owner's wallets after a waiting
//! period the owner did not interrupt.
//!
//! ## Protocol
//!
//! 1. Owner invites contact: the contact's enclave records a grant
//! 2. Contact accepts or declines on the owner's enclave
//! 3. Contact requests access: the owner's enclave schedules a daily
//!    notification series until the takeover becomes possible
//! 4. Owner may deny, which cancels the series and clears both mirrors
//! 5. After the waiting period the contact takes over: the owner's enclave
//!    hands out its wallets and a backend token, revokes every other
//!    contact, and the contact requests the owner's account deletion

pub mod coordinator;
pub mod rules;

pub use rules::TransitionError;
