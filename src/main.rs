// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{env, net::SocketAddr, sync::Arc};

use axum_server::tls_rustls::RustlsConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wallet_enclave::{
    api::router,
    auth::EnclaveSigningKey,
    chain::client::AlloyChainClient,
    clients::{HttpDirectory, HttpEnclaveClient},
    clock::SystemClock,
    config::{EnclaveConfig, DEFAULT_LOG_FILTER, LOG_FORMAT_ENV},
    state::{AppState, Collaborators},
    storage::{EncryptedStorage, JsonFileRepository, StoragePaths},
};

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = env::var(LOG_FORMAT_ENV).is_ok_and(|format| format == "json");

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = EnclaveConfig::from_env()?;

    let mut storage = EncryptedStorage::new(StoragePaths::new(&config.data_dir));
    storage.initialize()?;
    let signing_key = EnclaveSigningKey::load_or_create(&JsonFileRepository::new(storage.clone()))?;
    tracing::info!(data_dir = %config.data_dir.display(), "encrypted storage ready");

    let collaborators = Collaborators {
        directory: Arc::new(HttpDirectory::new(config.backend_url.clone())?),
        enclaves: Arc::new(HttpEnclaveClient::new()?),
        chain: Arc::new(AlloyChainClient::new()),
        clock: Arc::new(SystemClock),
    };

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let tls = config.tls.clone();
    let app = router(AppState::new(config, storage, signing_key, collaborators));

    match tls {
        Some(paths) => {
            // Install the ring crypto provider for rustls (must be done before any TLS operations)
            rustls::crypto::ring::default_provider()
                .install_default()
                .map_err(|_| "failed to install rustls crypto provider")?;
            let tls_config = RustlsConfig::from_pem_file(&paths.cert, &paths.key).await?;

            tracing::info!(%addr, "wallet enclave listening on https (docs at /docs)");
            axum_server::bind_rustls(addr, tls_config)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            let listener = tokio::net::TcpListener::bind(addr).await?;
            tracing::info!(%addr, "wallet enclave listening on http (docs at /docs)");
            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}
