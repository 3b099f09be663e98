// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Supported EVM networks.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ChainError;

/// EVM network configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Network {
    /// Network name for display
    pub name: &'static str,
    /// Chain ID
    pub chain_id: u64,
    /// RPC endpoint URL
    pub rpc_url: &'static str,
    /// Block explorer transaction URL prefix
    pub block_explorer: &'static str,
    /// Native currency symbol
    pub currency: &'static str,
    pub decimals: u8,
}

impl Network {
    /// Chain id as addressed by clients, e.g. `0x1`.
    pub fn chain_hex(&self) -> String {
        format!("0x{:x}", self.chain_id)
    }

    pub fn rpc(&self) -> Result<url::Url, ChainError> {
        self.rpc_url
            .parse()
            .map_err(|e: url::ParseError| ChainError::Rpc(format!("invalid RPC URL: {e}")))
    }
}

pub const ETHEREUM_MAINNET: Network = Network {
    name: "Ethereum Mainnet",
    chain_id: 1,
    rpc_url: "https://ethereum-rpc.publicnode.com",
    block_explorer: "https://etherscan.io/tx/",
    currency: "ETH",
    decimals: 18,
};

pub const GOERLI_TESTNET: Network = Network {
    name: "Goerli Testnet",
    chain_id: 5,
    rpc_url: "https://ethereum-goerli-rpc.publicnode.com",
    block_explorer: "https://goerli.etherscan.io/tx/",
    currency: "ETH",
    decimals: 18,
};

pub const SEPOLIA_TESTNET: Network = Network {
    name: "Sepolia Testnet",
    chain_id: 11_155_111,
    rpc_url: "https://ethereum-sepolia-rpc.publicnode.com",
    block_explorer: "https://sepolia.etherscan.io/tx/",
    currency: "ETH",
    decimals: 18,
};

pub const POLYGON_MAINNET: Network = Network {
    name: "Polygon Mainnet",
    chain_id: 137,
    rpc_url: "https://polygon-rpc.com/",
    block_explorer: "https://polygonscan.com/tx/",
    currency: "MATIC",
    decimals: 18,
};

pub const MUMBAI_TESTNET: Network = Network {
    name: "Mumbai Testnet",
    chain_id: 80_001,
    rpc_url: "https://rpc-mumbai.maticvigil.com/",
    block_explorer: "https://mumbai.polygonscan.com/tx/",
    currency: "MATIC",
    decimals: 18,
};

pub const NETWORKS: [Network; 5] = [
    ETHEREUM_MAINNET,
    GOERLI_TESTNET,
    SEPOLIA_TESTNET,
    POLYGON_MAINNET,
    MUMBAI_TESTNET,
];

/// Look up a network by its hex chain id. Leading zeros and case are ignored.
pub fn find_network(chain: &str) -> Result<&'static Network, ChainError> {
    let digits = chain
        .strip_prefix("0x")
        .or_else(|| chain.strip_prefix("0X"))
        .ok_or_else(|| ChainError::UnknownChain(chain.to_string()))?;
    let chain_id = u64::from_str_radix(digits, 16)
        .map_err(|_| ChainError::UnknownChain(chain.to_string()))?;

    NETWORKS
        .iter()
        .find(|network| network.chain_id == chain_id)
        .ok_or_else(|| ChainError::UnknownChain(chain.to_string()))
}

/// Network as listed by `GET /networks`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct NetworkInfo {
    pub name: String,
    /// Hex chain id
    pub chain: String,
    pub block_explorer: String,
    pub currency: String,
    pub decimals: u8,
}

impl From<&Network> for NetworkInfo {
    fn from(network: &Network) -> Self {
        Self {
            name: network.name.to_string(),
            chain: network.chain_hex(),
            block_explorer: network.block_explorer.to_string(),
            currency: network.currency.to_string(),
            decimals: network.decimals,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn networks_are_addressed_by_hex_chain_id() {
        assert_eq!(find_network("0x1").unwrap().name, "Ethereum Mainnet");
        assert_eq!(find_network("0xaa36a7").unwrap().chain_id, 11_155_111);
        assert_eq!(find_network("0x89").unwrap(), &POLYGON_MAINNET);
        assert_eq!(find_network("0x013881").unwrap(), &MUMBAI_TESTNET);
    }

    #[test]
    fn unknown_or_malformed_chains_are_rejected() {
        assert!(matches!(find_network("0xa86a"), Err(ChainError::UnknownChain(_))));
        assert!(matches!(find_network("1"), Err(ChainError::UnknownChain(_))));
        assert!(matches!(find_network("0xzz"), Err(ChainError::UnknownChain(_))));
    }

    #[test]
    fn network_info_uses_hex_chain() {
        let info = NetworkInfo::from(&GOERLI_TESTNET);
        assert_eq!(info.chain, "0x5");
        assert_eq!(info.currency, "ETH");
    }
}
