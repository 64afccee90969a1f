// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-device credential memory.
//!
//! `agent.backup` carries a `credentials_ref` resolved and decrypted by the
//! server (§4.7); `agent.command` does not (§4.5's job payload is just
//! `{device_ip, commands, backup_before}`) even though command execution
//! needs to authenticate to the same device. In practice a command job with
//! `backup_before: true` runs `agent.backup` first, which hands this agent
//! the device's credentials shortly before; a command job with
//! `backup_before: false` relies on the device having been backed up at
//! least once already in this process's lifetime. This cache is what makes
//! that sequencing actually work rather than failing command execution with
//! "no credentials" every time.
//!
//! Entries never expire: an agent process only runs as long as its
//! container, and a device's operational credentials don't rotate within
//! that lifetime under normal operation.

use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct StoredCredential {
    pub username: String,
    pub secret: String,
}

#[derive(Default)]
pub struct CredentialCache {
    entries: Mutex<HashMap<String, StoredCredential>>,
}

impl CredentialCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remember(&self, device_ip: &str, username: String, secret: String) {
        self.lock().insert(device_ip.to_owned(), StoredCredential { username, secret });
    }

    pub fn get(&self, device_ip: &str) -> Option<StoredCredential> {
        self.lock().get(device_ip).cloned()
    }

    /// A poisoned lock still holds a perfectly usable map; a panicking
    /// reader elsewhere in the process is not a reason to also fail every
    /// later credential lookup.
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, StoredCredential>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remembers_and_returns_the_latest_credential_for_a_device() {
        let cache = CredentialCache::new();
        assert!(cache.get("10.0.0.1").is_none());
        cache.remember("10.0.0.1", "admin".to_owned(), "first".to_owned());
        cache.remember("10.0.0.1", "admin".to_owned(), "second".to_owned());
        let stored = cache.get("10.0.0.1").unwrap();
        assert_eq!(stored.secret, "second");
    }
}
