// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared process state, dependency-injected at startup (SPEC_FULL.md §9:
//! no hidden module-level singletons). Grounded on the teacher's `MuxState`
//! (`sessions` map + `config` + `shutdown`), generalized to also carry the
//! Db handle, the Hub, and the credential cipher.

use std::sync::Arc;

use netvigil_crypto::CredentialCipher;
use tokio_util::sync::CancellationToken;

use crate::backup_engine::BackupEngine;
use crate::config::ServerConfig;
use crate::db::Db;
use crate::hub::Hub;
use crate::jobs_engine::JobsEngine;

/// Everything a REST handler, RPC dispatcher, or background task needs.
/// Handed out as `Arc<AppState>` to axum and to every spawned task.
pub struct AppState {
    pub db: Db,
    /// Wrapped separately from the rest of `AppState` so background tasks
    /// (the rotation-grace watchdog) can hold their own `Arc<Hub>` without
    /// needing the whole state.
    pub hub: Arc<Hub>,
    pub cipher: CredentialCipher,
    pub config: ServerConfig,
    pub shutdown: CancellationToken,
    pub jobs: JobsEngine,
    pub backups: BackupEngine,
}

impl AppState {
    pub fn new(
        db: Db,
        cipher: CredentialCipher,
        config: ServerConfig,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            db,
            hub: Arc::new(Hub::new()),
            cipher,
            config,
            shutdown,
            jobs: JobsEngine::new(),
            backups: BackupEngine::new(),
        })
    }
}
