// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallet Enclave - Per-User Custodial Wallet Service
//!
//! One enclave instance custodies the wallet keys of exactly one user. Every
//! key operation is approved with a WebAuthn ceremony, and an emergency
//! contact on another enclave can take the wallets over after a waiting
//! period the owner did not interrupt.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Ed25519 capability tokens and request extractors
//! - `ceremony` - WebAuthn ceremonies and one-time codes
//! - `chain` - EVM networks, signing and RPC (alloy)
//! - `clients` - Directory service and peer enclave clients
//! - `emergency` - Emergency-access state machine
//! - `storage` - JSON-file repository and audit log on the data directory

pub mod api;
pub mod auth;
pub mod ceremony;
pub mod chain;
pub mod clients;
pub mod clock;
pub mod config;
pub mod emergency;
pub mod error;
pub mod models;
pub mod state;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;
