// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! EVM chain integration.
//!
//! This module provides:
//! - The supported network table, addressed by hex chain id
//! - Wallet key generation, EIP-191 and EIP-712 signing
//! - Transaction filling, signing and broadcasting behind [`ChainClient`]

pub mod client;
pub mod networks;
pub mod signing;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub use client::AlloyChainClient;
pub use networks::{find_network, Network, NetworkInfo, NETWORKS};

use crate::error::ApiError;
use crate::models::TransactionParams;

/// Errors from chain operations.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("unknown chain: {0}")]
    UnknownChain(String),

    #[error("invalid hex value for {field}: {value}")]
    InvalidHex { field: &'static str, value: String },

    #[error("{0}")]
    InvalidAddress(String),

    #[error("unsupported transaction type: {0}")]
    UnsupportedTransactionType(String),

    #[error("invalid typed data: {0}")]
    InvalidTypedData(String),

    #[error("insufficient funds for transaction")]
    InsufficientFunds,

    #[error("invalid wallet key: {0}")]
    InvalidKey(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("RPC error: {0}")]
    Rpc(String),
}

impl From<ChainError> for ApiError {
    fn from(e: ChainError) -> Self {
        match e {
            ChainError::UnknownChain(_)
            | ChainError::InvalidHex { .. }
            | ChainError::InvalidAddress(_)
            | ChainError::UnsupportedTransactionType(_)
            | ChainError::InvalidTypedData(_)
            | ChainError::InsufficientFunds => ApiError::bad_request(e.to_string()),
            ChainError::Rpc(_) => {
                tracing::warn!(error = %e, "chain RPC failure");
                ApiError::bad_gateway(e.to_string())
            }
            ChainError::InvalidKey(_) | ChainError::Signing(_) => {
                tracing::error!(error = %e, "wallet signing failure");
                ApiError::internal(e.to_string())
            }
        }
    }
}

/// Fee estimate for a plain transfer, decimal wei strings.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Fees {
    pub estimated_fees: String,
    pub base_fee: String,
    pub tip: String,
}

impl Fees {
    /// Total = gas price x transfer gas, split into tip and the remainder.
    pub fn for_transfer(gas_price: u128, tip_per_gas: u128) -> Self {
        let estimated = gas_price.saturating_mul(client::TRANSFER_GAS);
        let tip = tip_per_gas.saturating_mul(client::TRANSFER_GAS);
        Self {
            estimated_fees: estimated.to_string(),
            base_fee: estimated.saturating_sub(tip).to_string(),
            tip: tip.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct SignedTransaction {
    /// 0x-hex EIP-2718 encoding.
    pub signed_transaction: String,
    pub transaction_hash: String,
}

/// Chain I/O used by the transaction ceremonies and the fee endpoint.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn sign_transaction(
        &self,
        params: &TransactionParams,
        private_key_pem: &str,
    ) -> Result<SignedTransaction, ChainError>;

    /// Sign and broadcast, returning the transaction hash.
    async fn send_transaction(
        &self,
        params: &TransactionParams,
        private_key_pem: &str,
    ) -> Result<String, ChainError>;

    async fn estimate_fees(&self, network: &Network) -> Result<Fees, ChainError>;
}
