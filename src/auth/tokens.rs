// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Capability token minting and verification.
//!
//! Tokens are EdDSA JWTs signed with the enclave's own Ed25519 key. The
//! verification key for a token is resolved from its subject, so a token
//! minted by a peer enclave is checked against that peer's published key.
//!
//! Expiry and not-before are checked against the injected [`Clock`] rather
//! than the system time read inside `jsonwebtoken`.

use std::sync::Arc;

use base64ct::{Base64, Base64UrlUnpadded, Encoding};
use ed25519_dalek::{pkcs8::EncodePrivateKey, SigningKey};
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use ring::rand::{SecureRandom, SystemRandom};

use super::claims::{Audience, CapabilityClaims, Scope, UnverifiedSubject, VerifiedToken, ISSUER};
use super::resolver::{KeyResolver, LocalKeyResolver};
use super::AuthError;
use crate::clock::Clock;
use crate::storage::{Repository, StorageError, StoredSigningKey};

/// Clock skew tolerance (60 seconds).
pub const CLOCK_SKEW_LEEWAY: i64 = 60;

/// Maximum age of a token accepted by strict endpoints.
pub const STRICT_MAX_AGE_SECS: i64 = 15 * 60;

pub const SESSION_LIFETIME_SECS: i64 = 24 * 60 * 60;
pub const CREATE_CREDENTIAL_LIFETIME_SECS: i64 = 15 * 60;
pub const PEER_TOKEN_LIFETIME_SECS: i64 = 5 * 60;
pub const BACKEND_TOKEN_LIFETIME_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("system randomness unavailable")]
    Random,

    #[error("invalid signing key: {0}")]
    Key(String),

    #[error("failed to sign token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// The enclave's Ed25519 token key pair.
pub struct EnclaveSigningKey {
    signing: SigningKey,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl EnclaveSigningKey {
    pub fn generate() -> Result<Self, TokenError> {
        let mut seed = [0u8; 32];
        SystemRandom::new()
            .fill(&mut seed)
            .map_err(|_| TokenError::Random)?;
        Self::from_seed(seed)
    }

    pub fn from_seed(seed: [u8; 32]) -> Result<Self, TokenError> {
        let signing = SigningKey::from_bytes(&seed);
        let der = signing
            .to_pkcs8_der()
            .map_err(|e| TokenError::Key(e.to_string()))?;
        let encoding = EncodingKey::from_ed_der(der.as_bytes());
        let decoding = decoding_key_from_bytes(signing.verifying_key().as_bytes())?;

        Ok(Self {
            signing,
            encoding,
            decoding,
        })
    }

    /// Load the persisted key, generating and saving one on first start.
    pub fn load_or_create(repository: &dyn Repository) -> Result<Self, TokenError> {
        match repository.get_signing_key() {
            Ok(stored) => Self::from_stored(&stored),
            Err(StorageError::NotFound(_)) => {
                let key = Self::generate()?;
                repository.save_signing_key(&key.to_stored())?;
                tracing::info!("generated new token signing key");
                Ok(key)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn from_stored(stored: &StoredSigningKey) -> Result<Self, TokenError> {
        let bytes = Base64::decode_vec(&stored.private_key)
            .map_err(|e| TokenError::Key(e.to_string()))?;
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| TokenError::Key("signing key seed must be 32 bytes".to_string()))?;
        Self::from_seed(seed)
    }

    pub fn to_stored(&self) -> StoredSigningKey {
        StoredSigningKey {
            private_key: Base64::encode_string(&self.signing.to_bytes()),
            public_key: self.verification_key_base64(),
        }
    }

    /// Raw 32-byte public key.
    pub fn verification_key(&self) -> [u8; 32] {
        self.signing.verifying_key().to_bytes()
    }

    /// Standard base64 of the public key, as published to peers.
    pub fn verification_key_base64(&self) -> String {
        Base64::encode_string(&self.verification_key())
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }
}

/// Build a verification key from a raw 32-byte Ed25519 public key.
pub fn decoding_key_from_bytes(bytes: &[u8]) -> Result<DecodingKey, TokenError> {
    if bytes.len() != 32 {
        return Err(TokenError::Key(format!(
            "verification key must be 32 bytes, got {}",
            bytes.len()
        )));
    }
    DecodingKey::from_ed_components(&Base64UrlUnpadded::encode_string(bytes))
        .map_err(|e| TokenError::Key(e.to_string()))
}

/// What an endpoint accepts.
#[derive(Debug, Clone, Copy)]
pub struct TokenRequirements<'a> {
    pub audience: Audience,
    pub scopes: &'a [Scope],
    /// Reject tokens issued more than [`STRICT_MAX_AGE_SECS`] ago.
    pub strict: bool,
}

pub struct TokenService {
    key: Arc<EnclaveSigningKey>,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    pub fn new(key: EnclaveSigningKey, clock: Arc<dyn Clock>) -> Self {
        Self {
            key: Arc::new(key),
            clock,
        }
    }

    pub fn signing_key(&self) -> &EnclaveSigningKey {
        &self.key
    }

    /// Resolver that accepts only tokens signed by this enclave.
    pub fn local_resolver(&self) -> LocalKeyResolver {
        LocalKeyResolver::new(self.key.decoding_key().clone())
    }

    pub fn issue(
        &self,
        subject: &str,
        scope: Scope,
        audience: Audience,
        lifetime_secs: i64,
        credential: Option<&str>,
    ) -> Result<String, TokenError> {
        let now = self.clock.unix();
        let claims = CapabilityClaims {
            sub: subject.to_string(),
            scope,
            aud: audience.as_str().to_string(),
            iss: ISSUER.to_string(),
            iat: now,
            nbf: now,
            exp: now + lifetime_secs,
            credential: credential.map(str::to_string),
        };
        Ok(encode(
            &Header::new(Algorithm::EdDSA),
            &claims,
            &self.key.encoding,
        )?)
    }

    /// 24h frontend session bound to the credential used to log in.
    pub fn frontend_session(&self, subject: &str, credential: &str) -> Result<String, TokenError> {
        self.issue(
            subject,
            Scope::User,
            Audience::Frontend,
            SESSION_LIFETIME_SECS,
            Some(credential),
        )
    }

    /// 15 minute session that may only add a credential.
    pub fn credential_session(&self, subject: &str) -> Result<String, TokenError> {
        self.issue(
            subject,
            Scope::CreateCredential,
            Audience::Frontend,
            CREATE_CREDENTIAL_LIFETIME_SECS,
            None,
        )
    }

    pub fn peer_token(&self, subject: &str) -> Result<String, TokenError> {
        self.issue(
            subject,
            Scope::Enclave,
            Audience::Peer,
            PEER_TOKEN_LIFETIME_SECS,
            None,
        )
    }

    pub fn backend_token(&self, subject: &str) -> Result<String, TokenError> {
        self.issue(
            subject,
            Scope::User,
            Audience::Backend,
            BACKEND_TOKEN_LIFETIME_SECS,
            None,
        )
    }

    /// Verify a token against `requirements`, resolving the key by subject.
    pub async fn verify(
        &self,
        token: &str,
        requirements: &TokenRequirements<'_>,
        resolver: &dyn KeyResolver,
    ) -> Result<VerifiedToken, AuthError> {
        let header = decode_header(token).map_err(|_| AuthError::MalformedToken)?;
        if header.alg != Algorithm::EdDSA {
            return Err(AuthError::MalformedToken);
        }

        // The subject picks the key; it is re-read from the verified claims below.
        let peeked = jsonwebtoken::dangerous::insecure_decode::<UnverifiedSubject>(token)
            .map_err(|_| AuthError::MalformedToken)?;
        let decoding_key = resolver.resolve(&peeked.claims.sub).await?;

        let mut validation = Validation::new(Algorithm::EdDSA);
        validation.leeway = CLOCK_SKEW_LEEWAY as u64;
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.set_issuer(&[ISSUER]);
        validation.set_audience(&[requirements.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "nbf", "sub", "aud", "iss"]);

        let claims = decode::<CapabilityClaims>(token, &decoding_key, &validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                jsonwebtoken::errors::ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
                jsonwebtoken::errors::ErrorKind::InvalidAudience => AuthError::InvalidAudience,
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                jsonwebtoken::errors::ErrorKind::ImmatureSignature => AuthError::TokenNotYetValid,
                _ => AuthError::MalformedToken,
            })?
            .claims;

        let now = self.clock.unix();
        if claims.exp + CLOCK_SKEW_LEEWAY < now {
            return Err(AuthError::TokenExpired);
        }
        if claims.nbf - CLOCK_SKEW_LEEWAY > now {
            return Err(AuthError::TokenNotYetValid);
        }

        if !requirements.scopes.contains(&claims.scope) {
            return Err(AuthError::ScopeNotAllowed);
        }

        if requirements.strict && now - claims.iat > STRICT_MAX_AGE_SECS {
            return Err(AuthError::StaleToken);
        }

        if requirements.audience == Audience::Frontend
            && claims.scope == Scope::User
            && claims.credential.as_deref().map_or(true, str::is_empty)
        {
            return Err(AuthError::MissingCredentialClaim);
        }

        Ok(claims.into())
    }
}
