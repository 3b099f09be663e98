// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! WebAuthn relying party.
//!
//! Verifies registration and assertion responses by:
//! 1. Parsing `clientDataJSON` and checking type, challenge and origin
//! 2. Parsing authenticator data and checking the RP id hash and UP/UV flags
//! 3. For registrations, extracting the COSE public key of the attested credential
//! 4. For assertions, verifying the signature over
//!    `authenticatorData || SHA-256(clientDataJSON)`
//!
//! Attestation statements are not verified (attestation preference `none`).

use std::collections::BTreeMap;

use base64ct::{Base64UrlUnpadded, Encoding};
use serde::{Deserialize, Serialize};
use serde_cbor::Value;
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use crate::models::{CredentialPublicKey, StoredCredential, User};

pub const RP_NAME: &str = "Wallet Enclave";

/// Client-side ceremony timeout advertised in the options.
pub const CEREMONY_TIMEOUT_MS: u64 = 60_000;

const COSE_ALG_EDDSA: i128 = -8;
const COSE_ALG_ES256: i128 = -7;

const FLAG_USER_PRESENT: u8 = 0x01;
const FLAG_USER_VERIFIED: u8 = 0x04;
const FLAG_ATTESTED_CREDENTIAL: u8 = 0x40;

const CLIENT_DATA_CREATE: &str = "webauthn.create";
const CLIENT_DATA_GET: &str = "webauthn.get";

#[derive(Debug, Clone, thiserror::Error)]
pub enum WebAuthnError {
    #[error("invalid clientDataJSON: {0}")]
    InvalidClientData(String),

    #[error("unexpected client data type {0}")]
    WrongType(String),

    #[error("challenge mismatch")]
    ChallengeMismatch,

    #[error("origin {0} is not allowed")]
    OriginMismatch(String),

    #[error("relying party id hash mismatch")]
    RpIdMismatch,

    #[error("user presence flag not set")]
    UserNotPresent,

    #[error("user verification flag not set")]
    UserNotVerified,

    #[error("invalid authenticator data: {0}")]
    InvalidAuthenticatorData(String),

    #[error("invalid attestation object: {0}")]
    InvalidAttestation(String),

    #[error("unsupported credential public key: {0}")]
    UnsupportedKey(String),

    #[error("credential id mismatch")]
    CredentialIdMismatch,

    #[error("user handle does not match this account")]
    UserHandleMismatch,

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("invalid base64url: {0}")]
    Encoding(String),
}

// =============================================================================
// Options
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct RelyingPartyEntity {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserEntity {
    /// Opaque user handle, base64url.
    pub id: String,
    pub name: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct CredentialParameter {
    #[serde(rename = "type")]
    pub kind: String,
    pub alg: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct CredentialDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorSelection {
    pub user_verification: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyCredentialCreationOptions {
    pub rp: RelyingPartyEntity,
    pub user: UserEntity,
    pub challenge: String,
    pub pub_key_cred_params: Vec<CredentialParameter>,
    pub timeout: u64,
    pub exclude_credentials: Vec<CredentialDescriptor>,
    pub authenticator_selection: AuthenticatorSelection,
    pub attestation: String,
}

/// Argument for `navigator.credentials.create`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreationOptions {
    pub public_key: PublicKeyCredentialCreationOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyCredentialRequestOptions {
    pub challenge: String,
    pub timeout: u64,
    pub rp_id: String,
    pub allow_credentials: Vec<CredentialDescriptor>,
    pub user_verification: String,
}

/// Argument for `navigator.credentials.get`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptions {
    pub public_key: PublicKeyCredentialRequestOptions,
}

// =============================================================================
// Responses
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AttestationResponse {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    pub attestation_object: String,
}

/// `PublicKeyCredential` returned by `navigator.credentials.create`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponse {
    pub id: String,
    pub raw_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub response: AttestationResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AssertionData {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    pub authenticator_data: String,
    pub signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_handle: Option<String>,
}

/// `PublicKeyCredential` returned by `navigator.credentials.get`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AssertionResponse {
    pub id: String,
    pub raw_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub response: AssertionData,
}

/// A credential whose registration was verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredCredential {
    /// Canonical base64url credential id.
    pub id: String,
    pub public_key: CredentialPublicKey,
    pub sign_count: u32,
}

// =============================================================================
// Encoding helpers
// =============================================================================

/// Decode base64url, tolerating trailing padding.
pub fn decode_b64url(value: &str) -> Result<Vec<u8>, WebAuthnError> {
    Base64UrlUnpadded::decode_vec(value.trim_end_matches('='))
        .map_err(|e| WebAuthnError::Encoding(e.to_string()))
}

pub fn encode_b64url(bytes: &[u8]) -> String {
    Base64UrlUnpadded::encode_string(bytes)
}

/// Canonical form of a credential id as sent by a browser.
pub fn canonical_credential_id(raw_id: &str) -> Result<String, WebAuthnError> {
    Ok(encode_b64url(&decode_b64url(raw_id)?))
}

// =============================================================================
// Authenticator data
// =============================================================================

#[derive(Debug)]
struct AuthenticatorData {
    rp_id_hash: [u8; 32],
    flags: u8,
    sign_count: u32,
    attested: Option<AttestedCredential>,
}

#[derive(Debug)]
struct AttestedCredential {
    id: Vec<u8>,
    public_key: CredentialPublicKey,
}

impl AuthenticatorData {
    fn parse(bytes: &[u8]) -> Result<Self, WebAuthnError> {
        if bytes.len() < 37 {
            return Err(WebAuthnError::InvalidAuthenticatorData(format!(
                "expected at least 37 bytes, got {}",
                bytes.len()
            )));
        }

        let mut rp_id_hash = [0u8; 32];
        rp_id_hash.copy_from_slice(&bytes[..32]);
        let flags = bytes[32];
        let sign_count = u32::from_be_bytes([bytes[33], bytes[34], bytes[35], bytes[36]]);

        let attested = if flags & FLAG_ATTESTED_CREDENTIAL != 0 {
            Some(parse_attested_credential(&bytes[37..])?)
        } else {
            None
        };

        Ok(Self {
            rp_id_hash,
            flags,
            sign_count,
            attested,
        })
    }
}

fn parse_attested_credential(bytes: &[u8]) -> Result<AttestedCredential, WebAuthnError> {
    // aaguid(16) || credentialIdLength(2) || credentialId || COSE key
    if bytes.len() < 18 {
        return Err(WebAuthnError::InvalidAuthenticatorData(
            "attested credential data truncated".to_string(),
        ));
    }
    let id_len = u16::from_be_bytes([bytes[16], bytes[17]]) as usize;
    let key_start = 18 + id_len;
    if bytes.len() < key_start {
        return Err(WebAuthnError::InvalidAuthenticatorData(
            "credential id truncated".to_string(),
        ));
    }
    let id = bytes[18..key_start].to_vec();

    // Extensions may follow the key, so read exactly one CBOR item.
    let mut deserializer = serde_cbor::Deserializer::from_slice(&bytes[key_start..]);
    let cose = Value::deserialize(&mut deserializer)
        .map_err(|e| WebAuthnError::UnsupportedKey(format!("invalid COSE key: {e}")))?;

    Ok(AttestedCredential {
        id,
        public_key: parse_cose_key(&cose)?,
    })
}

fn cose_int(map: &BTreeMap<Value, Value>, label: i128) -> Option<i128> {
    match map.get(&Value::Integer(label)) {
        Some(Value::Integer(v)) => Some(*v),
        _ => None,
    }
}

fn cose_bytes(map: &BTreeMap<Value, Value>, label: i128) -> Result<Vec<u8>, WebAuthnError> {
    match map.get(&Value::Integer(label)) {
        Some(Value::Bytes(bytes)) if bytes.len() == 32 => Ok(bytes.clone()),
        _ => Err(WebAuthnError::UnsupportedKey(format!(
            "COSE label {label} must be a 32-byte string"
        ))),
    }
}

fn parse_cose_key(value: &Value) -> Result<CredentialPublicKey, WebAuthnError> {
    let Value::Map(map) = value else {
        return Err(WebAuthnError::UnsupportedKey(
            "COSE key is not a map".to_string(),
        ));
    };

    // kty(1), alg(3), crv(-1), x(-2), y(-3)
    match (cose_int(map, 1), cose_int(map, 3), cose_int(map, -1)) {
        (Some(2), Some(COSE_ALG_ES256), Some(1)) => Ok(CredentialPublicKey::Es256 {
            x: encode_b64url(&cose_bytes(map, -2)?),
            y: encode_b64url(&cose_bytes(map, -3)?),
        }),
        (Some(1), Some(COSE_ALG_EDDSA), Some(6)) => Ok(CredentialPublicKey::EdDsa {
            x: encode_b64url(&cose_bytes(map, -2)?),
        }),
        (kty, alg, crv) => Err(WebAuthnError::UnsupportedKey(format!(
            "kty={kty:?} alg={alg:?} crv={crv:?}"
        ))),
    }
}

fn attestation_auth_data(attestation_object: &[u8]) -> Result<Vec<u8>, WebAuthnError> {
    let value: Value = serde_cbor::from_slice(attestation_object)
        .map_err(|e| WebAuthnError::InvalidAttestation(e.to_string()))?;
    let Value::Map(map) = value else {
        return Err(WebAuthnError::InvalidAttestation(
            "attestation object is not a map".to_string(),
        ));
    };
    match map.get(&Value::Text("authData".to_string())) {
        Some(Value::Bytes(bytes)) => Ok(bytes.clone()),
        _ => Err(WebAuthnError::InvalidAttestation(
            "missing authData".to_string(),
        )),
    }
}

// =============================================================================
// Signature verification
// =============================================================================

fn verify_signature(
    public_key: &CredentialPublicKey,
    message: &[u8],
    signature: &[u8],
) -> Result<(), WebAuthnError> {
    match public_key {
        CredentialPublicKey::Es256 { x, y } => {
            use p256::ecdsa::signature::Verifier as _;

            let mut sec1 = Vec::with_capacity(65);
            sec1.push(0x04);
            sec1.extend_from_slice(&decode_b64url(x)?);
            sec1.extend_from_slice(&decode_b64url(y)?);
            let key = p256::ecdsa::VerifyingKey::from_sec1_bytes(&sec1)
                .map_err(|e| WebAuthnError::UnsupportedKey(e.to_string()))?;
            let signature = p256::ecdsa::DerSignature::from_bytes(signature)
                .map_err(|e| WebAuthnError::InvalidSignature(e.to_string()))?;
            key.verify(message, &signature)
                .map_err(|e| WebAuthnError::InvalidSignature(e.to_string()))
        }
        CredentialPublicKey::EdDsa { x } => {
            use ed25519_dalek::Verifier as _;

            let bytes: [u8; 32] = decode_b64url(x)?
                .try_into()
                .map_err(|_| WebAuthnError::UnsupportedKey("Ed25519 key must be 32 bytes".into()))?;
            let key = ed25519_dalek::VerifyingKey::from_bytes(&bytes)
                .map_err(|e| WebAuthnError::UnsupportedKey(e.to_string()))?;
            let signature = ed25519_dalek::Signature::from_slice(signature)
                .map_err(|e| WebAuthnError::InvalidSignature(e.to_string()))?;
            key.verify(message, &signature)
                .map_err(|e| WebAuthnError::InvalidSignature(e.to_string()))
        }
    }
}

// =============================================================================
// Relying party
// =============================================================================

#[derive(Deserialize)]
struct ClientData {
    #[serde(rename = "type")]
    kind: String,
    challenge: String,
    origin: String,
}

#[derive(Debug, Clone)]
pub struct RelyingParty {
    /// RP id, the frontend host.
    id: String,
    /// Exact origin the browser must report.
    origin: String,
}

impl RelyingParty {
    pub fn new(id: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            origin: origin.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    fn descriptors(user: &User) -> Vec<CredentialDescriptor> {
        user.credentials
            .values()
            .map(|credential| CredentialDescriptor {
                kind: "public-key".to_string(),
                id: credential.id.clone(),
            })
            .collect()
    }

    pub fn creation_options(&self, user: &User, challenge: &str) -> CreationOptions {
        CreationOptions {
            public_key: PublicKeyCredentialCreationOptions {
                rp: RelyingPartyEntity {
                    id: self.id.clone(),
                    name: RP_NAME.to_string(),
                },
                user: UserEntity {
                    id: user.webauthn_id.clone(),
                    name: user.email.clone(),
                    display_name: user.email.clone(),
                },
                challenge: challenge.to_string(),
                pub_key_cred_params: [COSE_ALG_EDDSA, COSE_ALG_ES256]
                    .into_iter()
                    .map(|alg| CredentialParameter {
                        kind: "public-key".to_string(),
                        alg: alg as i64,
                    })
                    .collect(),
                timeout: CEREMONY_TIMEOUT_MS,
                exclude_credentials: Self::descriptors(user),
                authenticator_selection: AuthenticatorSelection {
                    user_verification: "required".to_string(),
                },
                attestation: "none".to_string(),
            },
        }
    }

    pub fn request_options(&self, user: &User, challenge: &str) -> RequestOptions {
        RequestOptions {
            public_key: PublicKeyCredentialRequestOptions {
                challenge: challenge.to_string(),
                timeout: CEREMONY_TIMEOUT_MS,
                rp_id: self.id.clone(),
                allow_credentials: Self::descriptors(user),
                user_verification: "required".to_string(),
            },
        }
    }

    fn check_client_data(
        &self,
        client_data_json: &[u8],
        expected_type: &str,
        challenge: &str,
    ) -> Result<(), WebAuthnError> {
        let client_data: ClientData = serde_json::from_slice(client_data_json)
            .map_err(|e| WebAuthnError::InvalidClientData(e.to_string()))?;

        if client_data.kind != expected_type {
            return Err(WebAuthnError::WrongType(client_data.kind));
        }
        if client_data.challenge.trim_end_matches('=') != challenge {
            return Err(WebAuthnError::ChallengeMismatch);
        }
        if client_data.origin.trim_end_matches('/') != self.origin {
            return Err(WebAuthnError::OriginMismatch(client_data.origin));
        }
        Ok(())
    }

    fn check_authenticator_data(&self, data: &AuthenticatorData) -> Result<(), WebAuthnError> {
        let expected: [u8; 32] = Sha256::digest(self.id.as_bytes()).into();
        if data.rp_id_hash != expected {
            return Err(WebAuthnError::RpIdMismatch);
        }
        if data.flags & FLAG_USER_PRESENT == 0 {
            return Err(WebAuthnError::UserNotPresent);
        }
        if data.flags & FLAG_USER_VERIFIED == 0 {
            return Err(WebAuthnError::UserNotVerified);
        }
        Ok(())
    }

    /// Verify a registration response against the challenge it was issued for.
    pub fn verify_registration(
        &self,
        challenge: &str,
        response: &RegistrationResponse,
    ) -> Result<RegisteredCredential, WebAuthnError> {
        let client_data_json = decode_b64url(&response.response.client_data_json)?;
        self.check_client_data(&client_data_json, CLIENT_DATA_CREATE, challenge)?;

        let attestation_object = decode_b64url(&response.response.attestation_object)?;
        let auth_data = AuthenticatorData::parse(&attestation_auth_data(&attestation_object)?)?;
        self.check_authenticator_data(&auth_data)?;

        let attested = auth_data.attested.ok_or_else(|| {
            WebAuthnError::InvalidAuthenticatorData("no attested credential data".to_string())
        })?;

        let raw_id = decode_b64url(&response.raw_id)?;
        if attested.id != raw_id {
            return Err(WebAuthnError::CredentialIdMismatch);
        }

        Ok(RegisteredCredential {
            id: encode_b64url(&raw_id),
            public_key: attested.public_key,
            sign_count: auth_data.sign_count,
        })
    }

    /// Verify an assertion made with `credential`. Returns the new signature counter.
    pub fn verify_assertion(
        &self,
        challenge: &str,
        response: &AssertionResponse,
        credential: &StoredCredential,
    ) -> Result<u32, WebAuthnError> {
        if canonical_credential_id(&response.raw_id)? != credential.id {
            return Err(WebAuthnError::CredentialIdMismatch);
        }

        let client_data_json = decode_b64url(&response.response.client_data_json)?;
        self.check_client_data(&client_data_json, CLIENT_DATA_GET, challenge)?;

        let authenticator_data = decode_b64url(&response.response.authenticator_data)?;
        let auth_data = AuthenticatorData::parse(&authenticator_data)?;
        self.check_authenticator_data(&auth_data)?;

        let client_data_hash = Sha256::digest(&client_data_json);
        let mut signed_data = Vec::with_capacity(authenticator_data.len() + 32);
        signed_data.extend_from_slice(&authenticator_data);
        signed_data.extend_from_slice(&client_data_hash);

        let signature = decode_b64url(&response.response.signature)?;
        verify_signature(&credential.public_key, &signed_data, &signature)?;

        if (auth_data.sign_count != 0 || credential.sign_count != 0)
            && auth_data.sign_count <= credential.sign_count
        {
            tracing::warn!(
                credential_id = %credential.id,
                stored = credential.sign_count,
                presented = auth_data.sign_count,
                "signature counter did not increase, authenticator may be cloned"
            );
        }

        Ok(auth_data.sign_count)
    }
}

// =============================================================================
// Software authenticator
// =============================================================================

/// ES256 authenticator producing real responses, for tests.
#[cfg(test)]
pub(crate) mod soft {
    use super::*;
    use p256::ecdsa::{signature::Signer as _, Signature, SigningKey};

    pub struct SoftAuthenticator {
        key: SigningKey,
        pub credential_id: Vec<u8>,
        rp_id: String,
        origin: String,
        counter: u32,
    }

    impl SoftAuthenticator {
        pub fn new(seed: u8, rp: &RelyingParty) -> Self {
            let mut secret = [seed; 32];
            secret[0] = 1;
            Self {
                key: SigningKey::from_slice(&secret).unwrap(),
                credential_id: vec![seed; 16],
                rp_id: rp.id().to_string(),
                origin: rp.origin().to_string(),
                counter: 0,
            }
        }

        pub fn raw_id(&self) -> String {
            encode_b64url(&self.credential_id)
        }

        fn client_data(&self, kind: &str, challenge: &str) -> Vec<u8> {
            serde_json::to_vec(&serde_json::json!({
                "type": kind,
                "challenge": challenge,
                "origin": self.origin,
            }))
            .unwrap()
        }

        fn auth_data(&mut self, flags: u8, attested: Option<Vec<u8>>) -> Vec<u8> {
            self.counter += 1;
            let mut data = Sha256::digest(self.rp_id.as_bytes()).to_vec();
            data.push(flags);
            data.extend_from_slice(&self.counter.to_be_bytes());
            if let Some(attested) = attested {
                data.extend_from_slice(&attested);
            }
            data
        }

        fn cose_key(&self) -> Vec<u8> {
            let point = self.key.verifying_key().to_encoded_point(false);
            let mut map = BTreeMap::new();
            map.insert(Value::Integer(1), Value::Integer(2));
            map.insert(Value::Integer(3), Value::Integer(COSE_ALG_ES256));
            map.insert(Value::Integer(-1), Value::Integer(1));
            map.insert(Value::Integer(-2), Value::Bytes(point.x().unwrap().to_vec()));
            map.insert(Value::Integer(-3), Value::Bytes(point.y().unwrap().to_vec()));
            serde_cbor::to_vec(&Value::Map(map)).unwrap()
        }

        pub fn register(&mut self, challenge: &str) -> RegistrationResponse {
            let mut attested = vec![0u8; 16];
            attested.extend_from_slice(&(self.credential_id.len() as u16).to_be_bytes());
            attested.extend_from_slice(&self.credential_id);
            attested.extend_from_slice(&self.cose_key());

            let auth_data = self.auth_data(
                FLAG_USER_PRESENT | FLAG_USER_VERIFIED | FLAG_ATTESTED_CREDENTIAL,
                Some(attested),
            );
            let mut object = BTreeMap::new();
            object.insert(Value::Text("fmt".into()), Value::Text("none".into()));
            object.insert(Value::Text("attStmt".into()), Value::Map(BTreeMap::new()));
            object.insert(Value::Text("authData".into()), Value::Bytes(auth_data));

            RegistrationResponse {
                id: self.raw_id(),
                raw_id: self.raw_id(),
                kind: "public-key".to_string(),
                response: AttestationResponse {
                    client_data_json: encode_b64url(
                        &self.client_data(CLIENT_DATA_CREATE, challenge),
                    ),
                    attestation_object: encode_b64url(
                        &serde_cbor::to_vec(&Value::Map(object)).unwrap(),
                    ),
                },
            }
        }

        pub fn assert(&mut self, challenge: &str) -> AssertionResponse {
            self.assert_with_flags(challenge, FLAG_USER_PRESENT | FLAG_USER_VERIFIED)
        }

        pub fn assert_with_flags(&mut self, challenge: &str, flags: u8) -> AssertionResponse {
            let client_data = self.client_data(CLIENT_DATA_GET, challenge);
            let auth_data = self.auth_data(flags, None);

            let mut signed = auth_data.clone();
            signed.extend_from_slice(&Sha256::digest(&client_data));
            let signature: Signature = self.key.sign(&signed);

            AssertionResponse {
                id: self.raw_id(),
                raw_id: self.raw_id(),
                kind: "public-key".to_string(),
                response: AssertionData {
                    client_data_json: encode_b64url(&client_data),
                    authenticator_data: encode_b64url(&auth_data),
                    signature: encode_b64url(signature.to_der().as_bytes()),
                    user_handle: None,
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::soft::SoftAuthenticator;
    use super::*;
    use chrono::Utc;

    fn rp() -> RelyingParty {
        RelyingParty::new("localhost", "http://localhost:3000")
    }

    fn stored(registered: RegisteredCredential) -> StoredCredential {
        StoredCredential {
            id: registered.id,
            public_key: registered.public_key,
            sign_count: registered.sign_count,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn registration_then_assertion_verifies() {
        let rp = rp();
        let mut authenticator = SoftAuthenticator::new(3, &rp);

        let registered = rp
            .verify_registration("reg-challenge", &authenticator.register("reg-challenge"))
            .unwrap();
        assert!(matches!(registered.public_key, CredentialPublicKey::Es256 { .. }));
        assert_eq!(registered.id, authenticator.raw_id());

        let credential = stored(registered);
        let count = rp
            .verify_assertion("login-challenge", &authenticator.assert("login-challenge"), &credential)
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn assertion_for_other_challenge_fails() {
        let rp = rp();
        let mut authenticator = SoftAuthenticator::new(4, &rp);
        let credential = stored(rp.verify_registration("c1", &authenticator.register("c1")).unwrap());

        let result = rp.verify_assertion("c2", &authenticator.assert("c3"), &credential);
        assert!(matches!(result, Err(WebAuthnError::ChallengeMismatch)));
    }

    #[test]
    fn registration_response_is_not_an_assertion() {
        let rp = rp();
        let mut authenticator = SoftAuthenticator::new(5, &rp);
        let response = authenticator.register("c1");

        let mut swapped = authenticator.assert("c1");
        swapped.response.client_data_json = response.response.client_data_json.clone();
        let credential = stored(rp.verify_registration("c1", &response).unwrap());

        assert!(matches!(
            rp.verify_assertion("c1", &swapped, &credential),
            Err(WebAuthnError::WrongType(_))
        ));
    }

    #[test]
    fn user_verification_is_required() {
        let rp = rp();
        let mut authenticator = SoftAuthenticator::new(6, &rp);
        let credential = stored(rp.verify_registration("c1", &authenticator.register("c1")).unwrap());

        let response = authenticator.assert_with_flags("c2", FLAG_USER_PRESENT);
        assert!(matches!(
            rp.verify_assertion("c2", &response, &credential),
            Err(WebAuthnError::UserNotVerified)
        ));
    }

    #[test]
    fn foreign_origin_is_rejected() {
        let rp = rp();
        let mut authenticator =
            SoftAuthenticator::new(7, &RelyingParty::new("localhost", "https://evil.example"));
        let result = rp.verify_registration("c1", &authenticator.register("c1"));
        assert!(matches!(result, Err(WebAuthnError::OriginMismatch(_))));
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let rp = rp();
        let mut authenticator = SoftAuthenticator::new(8, &rp);
        let credential = stored(rp.verify_registration("c1", &authenticator.register("c1")).unwrap());

        let mut response = authenticator.assert("c2");
        let mut auth_data = decode_b64url(&response.response.authenticator_data).unwrap();
        auth_data[36] ^= 0xff;
        response.response.authenticator_data = encode_b64url(&auth_data);

        assert!(matches!(
            rp.verify_assertion("c2", &response, &credential),
            Err(WebAuthnError::InvalidSignature(_))
        ));
    }

    #[test]
    fn creation_options_offer_eddsa_and_es256() {
        let rp = rp();
        let user = User::new("owner@example.com");
        let options = serde_json::to_value(rp.creation_options(&user, "abc")).unwrap();

        let params = &options["publicKey"]["pubKeyCredParams"];
        assert_eq!(params[0]["alg"], -8);
        assert_eq!(params[1]["alg"], -7);
        assert_eq!(options["publicKey"]["attestation"], "none");
        assert_eq!(
            options["publicKey"]["authenticatorSelection"]["userVerification"],
            "required"
        );
        assert_eq!(options["publicKey"]["rp"]["name"], RP_NAME);
    }
}
