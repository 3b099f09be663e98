// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and default values used
//! throughout the enclave. Configuration is loaded from the environment
//! once at startup into [`EnclaveConfig`].
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Root directory for encrypted storage | `/data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `FRONTEND_URL` | WebAuthn origin, also the only CORS origin | `http://localhost:3000` |
//! | `FRONTEND_HOST` | WebAuthn relying party id | host of `FRONTEND_URL` |
//! | `BACKEND_URL` | Directory service base URL | `http://localhost:8081` |
//! | `TLS_CERT_PATH` | PEM certificate chain, enables HTTPS with `TLS_KEY_PATH` | unset |
//! | `TLS_KEY_PATH` | PEM private key | unset |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::env;
use std::path::PathBuf;

use url::Url;

/// Environment variable name for the encrypted data directory path.
///
/// The user aggregate, the token signing key and the audit log live here.
///
/// # Default
/// `/data`
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const FRONTEND_URL_ENV: &str = "FRONTEND_URL";
pub const FRONTEND_HOST_ENV: &str = "FRONTEND_HOST";
pub const BACKEND_URL_ENV: &str = "BACKEND_URL";
pub const TLS_CERT_PATH_ENV: &str = "TLS_CERT_PATH";
pub const TLS_KEY_PATH_ENV: &str = "TLS_KEY_PATH";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_DATA_DIR: &str = "/data";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_FRONTEND_URL: &str = "http://localhost:3000";
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8081";
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} is not a valid URL: {reason}")]
    InvalidUrl { name: &'static str, reason: String },

    #[error("{0} has no host component")]
    MissingHost(&'static str),

    #[error("PORT is not a valid port number: {0}")]
    InvalidPort(String),
}

/// Paths to the PEM files used for HTTPS.
#[derive(Debug, Clone)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

#[derive(Debug, Clone)]
pub struct EnclaveConfig {
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
    /// Origin the browser reports in WebAuthn client data.
    pub frontend_url: String,
    /// WebAuthn relying party id.
    pub frontend_host: String,
    pub backend_url: String,
    pub tls: Option<TlsPaths>,
}

impl EnclaveConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let frontend_url = env_or(FRONTEND_URL_ENV, DEFAULT_FRONTEND_URL);
        let frontend_host = match env::var(FRONTEND_HOST_ENV) {
            Ok(host) => host,
            Err(_) => host_of(FRONTEND_URL_ENV, &frontend_url)?,
        };

        let backend_url = env_or(BACKEND_URL_ENV, DEFAULT_BACKEND_URL);
        Url::parse(&backend_url).map_err(|e| ConfigError::InvalidUrl {
            name: BACKEND_URL_ENV,
            reason: e.to_string(),
        })?;

        let port = match env::var(PORT_ENV) {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidPort(raw))?,
            Err(_) => DEFAULT_PORT,
        };

        let tls = match (env::var(TLS_CERT_PATH_ENV), env::var(TLS_KEY_PATH_ENV)) {
            (Ok(cert), Ok(key)) => Some(TlsPaths {
                cert: cert.into(),
                key: key.into(),
            }),
            _ => None,
        };

        Ok(Self {
            data_dir: env_or(DATA_DIR_ENV, DEFAULT_DATA_DIR).into(),
            host: env_or(HOST_ENV, DEFAULT_HOST),
            port,
            frontend_url: frontend_url.trim_end_matches('/').to_string(),
            frontend_host,
            backend_url: backend_url.trim_end_matches('/').to_string(),
            tls,
        })
    }

    /// Configuration for tests: local URLs and the given data directory.
    pub fn for_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            frontend_url: DEFAULT_FRONTEND_URL.to_string(),
            frontend_host: "localhost".to_string(),
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            tls: None,
        }
    }
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn host_of(name: &'static str, raw: &str) -> Result<String, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
        name,
        reason: e.to_string(),
    })?;
    url.host_str()
        .map(str::to_string)
        .ok_or(ConfigError::MissingHost(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relying_party_id_defaults_to_frontend_host() {
        assert_eq!(
            host_of(FRONTEND_URL_ENV, "https://wallet.example.com:8443/app").unwrap(),
            "wallet.example.com"
        );
    }

    #[test]
    fn invalid_frontend_url_is_rejected() {
        assert!(matches!(
            host_of(FRONTEND_URL_ENV, "not a url"),
            Err(ConfigError::InvalidUrl { .. })
        ));
    }
}
