// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! netvigil-server: operator REST/WebSocket control plane coordinating a
//! fleet of remote netvigil agents (SPEC_FULL.md §2).

pub mod backup_engine;
pub mod config;
pub mod db;
pub mod error;
pub mod hub;
pub mod ingest;
pub mod jobs_engine;
pub mod registry;
pub mod scheduler;
pub mod session;
pub mod state;
pub mod transport;

use std::sync::Arc;

use netvigil_crypto::{CredentialCipher, MasterKey};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::db::Db;
use crate::state::AppState;
use crate::transport::build_router;

/// Run the netvigil server until shutdown.
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);

    if config.api_key.is_none() {
        tracing::warn!("NETVIGIL_API_KEY is unset; operator REST auth is disabled (development only)");
    }

    let master_key = MasterKey::from_base64(&config.encryption_key)?;
    let cipher = CredentialCipher::new(&master_key);

    let db = Db::connect(&config.database_url).await?;
    cleanup_partial_artifacts(&config.backup_root).await;

    let shutdown = CancellationToken::new();
    let state = AppState::new(db, cipher, config.clone(), shutdown.clone());

    registry::spawn_rotation_grace_watchdog(
        Arc::new(state.db.clone()),
        Arc::clone(&state.hub),
        state.config.rotation_grace(),
        shutdown.clone(),
    );
    tokio::spawn(scheduler::run(Arc::clone(&state)));
    tokio::spawn(scheduler::run_retention_sweeper(Arc::clone(&state)));
    spawn_shutdown_signal(shutdown.clone());

    tracing::info!("netvigil-server listening on {addr}");
    let router = build_router(Arc::clone(&state));
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    Ok(())
}

/// Remove `.partial` artifacts left behind by a crash mid-write (SPEC_FULL.md
/// §4.12, §9: the source's behavior here is unspecified, so this spec
/// mandates cleanup on startup rather than guessing at recovery).
async fn cleanup_partial_artifacts(backup_root: &std::path::Path) {
    let mut stack = vec![backup_root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(mut entries) = tokio::fs::read_dir(&dir).await else { continue };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.extension().and_then(|e| e.to_str()).is_some_and(|e| e.ends_with("partial")) {
                if tokio::fs::remove_file(&path).await.is_ok() {
                    tracing::info!(path = %path.display(), "removed stale partial backup artifact");
                }
            }
        }
    }
}

fn spawn_shutdown_signal(shutdown: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received shutdown signal");
            shutdown.cancel();
        }
    });
}
