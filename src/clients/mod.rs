// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Outbound HTTP collaborators: the Directory service and peer enclaves.

pub mod directory;
pub mod enclave;

pub use directory::{Directory, DirectoryError, HttpDirectory};
pub use enclave::{EnclaveClient, HttpEnclaveClient, PeerCall, PeerError, TakeoverResponse};

use crate::error::ApiError;

impl From<DirectoryError> for ApiError {
    fn from(e: DirectoryError) -> Self {
        tracing::warn!(error = %e, "directory call failed");
        match e {
            DirectoryError::UnknownUser(email) => {
                ApiError::not_found(format!("no enclave registered for {email}"))
            }
            other => ApiError::bad_gateway(other.to_string()),
        }
    }
}

impl From<PeerError> for ApiError {
    fn from(e: PeerError) -> Self {
        tracing::warn!(error = %e, "peer enclave call failed");
        ApiError::bad_gateway(e.to_string())
    }
}
