// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallet key generation and message signing.
//!
//! Wallets store their keys in PKCS#8 PEM format. Signatures are returned as
//! 0x-prefixed hex, `r || s || v` with `v` in {27, 28}.

use alloy::{
    dyn_abi::TypedData,
    primitives::{Address, Signature},
    signers::{local::PrivateKeySigner, SignerSync},
};
use k256::ecdsa::SigningKey;
use k256::elliptic_curve::rand_core::OsRng;
use k256::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};

use super::ChainError;
use crate::models::Wallet;

/// Generate a fresh secp256k1 wallet.
pub fn generate_wallet(name: &str, public: bool) -> Result<Wallet, ChainError> {
    let signing_key = SigningKey::random(&mut OsRng);

    let private_key_pem = signing_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| ChainError::InvalidKey(format!("failed to encode private key: {e}")))?;

    Ok(Wallet {
        name: name.to_string(),
        address: address_of(&signing_key),
        private_key_pem: private_key_pem.to_string(),
        public,
    })
}

/// EIP-55 address of a secp256k1 key.
pub fn address_of(signing_key: &SigningKey) -> String {
    // Uncompressed point is 0x04 || x || y; the address hashes x || y.
    let point = signing_key.verifying_key().to_encoded_point(false);
    Address::from_raw_public_key(&point.as_bytes()[1..]).to_checksum(None)
}

/// Parse a wallet's PEM key into a signer.
pub fn signer_from_pem(private_key_pem: &str) -> Result<PrivateKeySigner, ChainError> {
    let pem = pem::parse(private_key_pem)
        .map_err(|e| ChainError::InvalidKey(format!("invalid PEM: {e}")))?;

    let signing_key = SigningKey::from_pkcs8_der(pem.contents())
        .map_err(|e| ChainError::InvalidKey(format!("invalid key format: {e}")))?;

    Ok(PrivateKeySigner::from_signing_key(signing_key))
}

/// EIP-191 `personal_sign` over the raw message bytes.
pub fn personal_sign(private_key_pem: &str, message: &[u8]) -> Result<String, ChainError> {
    let signer = signer_from_pem(private_key_pem)?;
    let signature = signer
        .sign_message_sync(message)
        .map_err(|e| ChainError::Signing(e.to_string()))?;
    Ok(encode_signature(&signature))
}

/// EIP-712 `eth_signTypedData_v4`.
pub fn sign_typed_data(private_key_pem: &str, typed_data: &TypedData) -> Result<String, ChainError> {
    let hash = typed_data
        .eip712_signing_hash()
        .map_err(|e| ChainError::InvalidTypedData(e.to_string()))?;

    let signer = signer_from_pem(private_key_pem)?;
    let signature = signer
        .sign_hash_sync(&hash)
        .map_err(|e| ChainError::Signing(e.to_string()))?;
    Ok(encode_signature(&signature))
}

fn encode_signature(signature: &Signature) -> String {
    let mut bytes = Vec::with_capacity(65);
    bytes.extend_from_slice(&signature.r().to_be_bytes::<32>());
    bytes.extend_from_slice(&signature.s().to_be_bytes::<32>());
    bytes.push(27 + u8::from(signature.v()));
    alloy::hex::encode_prefixed(bytes)
}
