// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Alloy-backed chain client.
//!
//! Transactions are assembled from the frontend's [`TransactionParams`],
//! completed by the provider's fillers (nonce, gas, fees) and signed with the
//! wallet's key inside this process. Only the raw signed bytes leave.

use alloy::{
    eips::eip2718::Encodable2718,
    network::EthereumWallet,
    primitives::{Address, Bytes, U256},
    providers::{Provider, ProviderBuilder, SendableTx},
    rpc::types::TransactionRequest,
    transports::TransportError,
};
use async_trait::async_trait;

use super::networks::{find_network, Network};
use super::signing::signer_from_pem;
use super::{ChainClient, ChainError, Fees, SignedTransaction};
use crate::models::TransactionParams;

/// Gas used by a plain value transfer, the basis of fee estimates.
pub const TRANSFER_GAS: u128 = 21_000;

/// Build an unsigned request for `network` from client parameters.
///
/// `0x1` selects a legacy transaction, or an access-list transaction when an
/// access list is present. `0x2` selects EIP-1559.
pub fn transaction_request(
    params: &TransactionParams,
    network: &Network,
) -> Result<TransactionRequest, ChainError> {
    let from = parse_address("from", &params.from)?;
    let to = parse_address("to", &params.to)?;

    let mut request = TransactionRequest::default().from(from).to(to);
    request.chain_id = Some(network.chain_id);

    if let Some(nonce) = &params.nonce {
        request.nonce = Some(parse_u64("nonce", nonce)?);
    }
    if let Some(gas) = &params.gas {
        request.gas = Some(parse_u64("gas", gas)?);
    }
    if let Some(value) = &params.value {
        request.value = Some(parse_u256("value", value)?);
    }
    if let Some(input) = params.input.as_deref().filter(|input| !input.is_empty()) {
        let data = alloy::hex::decode(input).map_err(|_| ChainError::InvalidHex {
            field: "input",
            value: input.to_string(),
        })?;
        request.input = Bytes::from(data).into();
    }

    match params.tx_type.as_str() {
        "0x1" => {
            if let Some(gas_price) = &params.gas_price {
                request.gas_price = Some(parse_u128("gasPrice", gas_price)?);
            }
            match &params.access_list {
                Some(access_list) => {
                    request.transaction_type = Some(1);
                    request.access_list = Some(access_list.clone());
                }
                None => request.transaction_type = Some(0),
            }
        }
        "0x2" => {
            request.transaction_type = Some(2);
            if let Some(max_fee) = &params.max_fee_per_gas {
                request.max_fee_per_gas = Some(parse_u128("maxFeePerGas", max_fee)?);
            }
            if let Some(tip) = &params.max_priority_fee_per_gas {
                request.max_priority_fee_per_gas = Some(parse_u128("maxPriorityFeePerGas", tip)?);
            }
            request.access_list = params.access_list.clone();
        }
        other => return Err(ChainError::UnsupportedTransactionType(other.to_string())),
    }

    Ok(request)
}

fn hex_digits<'a>(field: &'static str, value: &'a str) -> Result<&'a str, ChainError> {
    value
        .strip_prefix("0x")
        .filter(|digits| !digits.is_empty())
        .ok_or_else(|| ChainError::InvalidHex {
            field,
            value: value.to_string(),
        })
}

fn parse_u64(field: &'static str, value: &str) -> Result<u64, ChainError> {
    u64::from_str_radix(hex_digits(field, value)?, 16).map_err(|_| ChainError::InvalidHex {
        field,
        value: value.to_string(),
    })
}

fn parse_u128(field: &'static str, value: &str) -> Result<u128, ChainError> {
    u128::from_str_radix(hex_digits(field, value)?, 16).map_err(|_| ChainError::InvalidHex {
        field,
        value: value.to_string(),
    })
}

fn parse_u256(field: &'static str, value: &str) -> Result<U256, ChainError> {
    U256::from_str_radix(hex_digits(field, value)?, 16).map_err(|_| ChainError::InvalidHex {
        field,
        value: value.to_string(),
    })
}

fn parse_address(field: &'static str, value: &str) -> Result<Address, ChainError> {
    value
        .parse()
        .map_err(|_| ChainError::InvalidAddress(format!("invalid {field} address: {value}")))
}

fn rpc_error(e: TransportError) -> ChainError {
    let message = e.to_string();
    if message.to_ascii_lowercase().contains("insufficient funds") {
        ChainError::InsufficientFunds
    } else {
        ChainError::Rpc(message)
    }
}

/// Chain client talking to the networks' public RPC endpoints.
#[derive(Debug, Clone, Default)]
pub struct AlloyChainClient;

impl AlloyChainClient {
    pub fn new() -> Self {
        Self
    }

    async fn sign(
        &self,
        params: &TransactionParams,
        private_key_pem: &str,
    ) -> Result<(&'static Network, SignedTransaction), ChainError> {
        let network = find_network(&params.chain_id)?;
        let signer = signer_from_pem(private_key_pem)?;
        let request = transaction_request(params, network)?;

        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(network.rpc()?);

        let envelope = match provider.fill(request).await.map_err(rpc_error)? {
            SendableTx::Envelope(envelope) => envelope,
            SendableTx::Builder(_) => {
                return Err(ChainError::Signing(
                    "transaction could not be completed for signing".to_string(),
                ))
            }
        };

        let signed = SignedTransaction {
            signed_transaction: alloy::hex::encode_prefixed(envelope.encoded_2718()),
            transaction_hash: format!("{:?}", envelope.tx_hash()),
        };
        Ok((network, signed))
    }
}

#[async_trait]
impl ChainClient for AlloyChainClient {
    async fn sign_transaction(
        &self,
        params: &TransactionParams,
        private_key_pem: &str,
    ) -> Result<SignedTransaction, ChainError> {
        let (_, signed) = self.sign(params, private_key_pem).await?;
        Ok(signed)
    }

    async fn send_transaction(
        &self,
        params: &TransactionParams,
        private_key_pem: &str,
    ) -> Result<String, ChainError> {
        let (network, signed) = self.sign(params, private_key_pem).await?;
        let raw = alloy::hex::decode(&signed.signed_transaction)
            .map_err(|e| ChainError::Signing(e.to_string()))?;

        let provider = ProviderBuilder::new().connect_http(network.rpc()?);
        let pending = provider
            .send_raw_transaction(&raw)
            .await
            .map_err(rpc_error)?;

        let hash = format!("{:?}", pending.tx_hash());
        tracing::info!(chain = network.chain_id, tx_hash = %hash, "transaction broadcast");
        Ok(hash)
    }

    async fn estimate_fees(&self, network: &Network) -> Result<Fees, ChainError> {
        let provider = ProviderBuilder::new().connect_http(network.rpc()?);

        let gas_price = provider.get_gas_price().await.map_err(rpc_error)?;
        let tip = provider
            .get_max_priority_fee_per_gas()
            .await
            .map_err(rpc_error)?;

        Ok(Fees::for_transfer(gas_price, tip))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::networks::SEPOLIA_TESTNET;

    fn params(tx_type: &str) -> TransactionParams {
        TransactionParams {
            tx_type: tx_type.to_string(),
            nonce: Some("0x07".to_string()),
            to: "0x70997970C51812dc3A010C7d01b50e0d17dc79C8".to_string(),
            from: "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".to_string(),
            gas: Some("0x5208".to_string()),
            value: Some("0xde0b6b3a7640000".to_string()),
            input: None,
            gas_price: Some("0x3b9aca00".to_string()),
            max_priority_fee_per_gas: Some("0x59682f00".to_string()),
            max_fee_per_gas: Some("0x77359400".to_string()),
            access_list: None,
            chain_id: "0xaa36a7".to_string(),
        }
    }

    #[test]
    fn legacy_request_uses_gas_price() {
        let request = transaction_request(&params("0x1"), &SEPOLIA_TESTNET).unwrap();

        assert_eq!(request.transaction_type, Some(0));
        assert_eq!(request.chain_id, Some(11_155_111));
        assert_eq!(request.nonce, Some(7));
        assert_eq!(request.gas, Some(21_000));
        assert_eq!(request.gas_price, Some(1_000_000_000));
        assert_eq!(request.max_fee_per_gas, None);
        assert_eq!(
            request.value,
            Some(U256::from(1_000_000_000_000_000_000u128))
        );
    }

    #[test]
    fn access_list_turns_legacy_into_eip2930() {
        let mut with_list = params("0x1");
        with_list.access_list = Some(Default::default());

        let request = transaction_request(&with_list, &SEPOLIA_TESTNET).unwrap();
        assert_eq!(request.transaction_type, Some(1));
        assert!(request.access_list.is_some());
    }

    #[test]
    fn dynamic_fee_request_uses_fee_caps() {
        let request = transaction_request(&params("0x2"), &SEPOLIA_TESTNET).unwrap();

        assert_eq!(request.transaction_type, Some(2));
        assert_eq!(request.max_fee_per_gas, Some(2_000_000_000));
        assert_eq!(request.max_priority_fee_per_gas, Some(1_500_000_000));
        assert_eq!(request.gas_price, None);
    }

    #[test]
    fn missing_numeric_fields_are_left_for_fillers() {
        let mut sparse = params("0x2");
        sparse.nonce = None;
        sparse.gas = None;
        sparse.max_fee_per_gas = None;
        sparse.max_priority_fee_per_gas = None;

        let request = transaction_request(&sparse, &SEPOLIA_TESTNET).unwrap();
        assert_eq!(request.nonce, None);
        assert_eq!(request.gas, None);
        assert_eq!(request.max_fee_per_gas, None);
    }

    #[test]
    fn malformed_input_is_rejected() {
        let mut bad = params("0x2");
        bad.value = Some("12".to_string());
        assert!(matches!(
            transaction_request(&bad, &SEPOLIA_TESTNET),
            Err(ChainError::InvalidHex { field: "value", .. })
        ));

        let mut bad = params("0x2");
        bad.to = "0x1234".to_string();
        assert!(matches!(
            transaction_request(&bad, &SEPOLIA_TESTNET),
            Err(ChainError::InvalidAddress(_))
        ));

        let mut bad = params("0x3");
        bad.tx_type = "0x3".to_string();
        assert!(matches!(
            transaction_request(&bad, &SEPOLIA_TESTNET),
            Err(ChainError::UnsupportedTransactionType(_))
        ));
    }

    #[test]
    fn input_data_is_decoded() {
        let mut call = params("0x2");
        call.input = Some("0xa9059cbb".to_string());

        let request = transaction_request(&call, &SEPOLIA_TESTNET).unwrap();
        assert_eq!(
            request.input.input().map(|bytes| bytes.to_vec()),
            Some(vec![0xa9, 0x05, 0x9c, 0xbb])
        );
    }
}
