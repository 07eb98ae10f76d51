//! Location telemetry ingestion gateway.
//!
//! Accepts newline-framed requests over TCP, decodes location payloads and
//! records them in an append log and a Postgres table before replying.

pub mod append_log;
pub mod config;
pub mod outcome;
pub mod persister;
pub mod record;
pub mod server;
pub mod session;
pub mod store;

use crate::append_log::AppendLog;
use crate::config::GatewayConfig;
use crate::persister::Persister;
use crate::server::Gateway;
use crate::store::{PgLocationStore, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("store: {0}")]
    Store(#[from] StoreError),
    #[error("bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Connect the store, bind the listener and serve until Ctrl-C.
///
/// Failing to reach the store is fatal: the gateway never serves without it.
pub async fn run(config: GatewayConfig) -> Result<(), GatewayError> {
    info!("connecting to store");
    let store = PgLocationStore::connect(&config.store).await?;
    info!("store ready");

    let persister = Arc::new(Persister::new(
        AppendLog::new(&config.append_log.path),
        store,
        config.limits.sink_timeout,
    ));
    let gateway = Gateway::bind(
        &config.server.bind,
        persister,
        config.limits.max_message_bytes,
    )
    .await
    .map_err(|source| GatewayError::Bind {
        addr: config.server.bind.clone(),
        source,
    })?;

    gateway.serve(shutdown_signal()).await;
    info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
