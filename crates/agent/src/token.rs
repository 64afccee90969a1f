// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The agent's view of its own enrollment token: read at startup, rewritten
//! in place whenever the server pushes a `token_rotation` config event
//! (SPEC_FULL.md §4.4). A freshly enrolling agent with no token file yet
//! generates its own first token, trusted on first connect by the server's
//! `registry::authenticate`.

use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;

use crate::error::AgentError;

pub async fn load_or_create(path: &Path) -> Result<String, AgentError> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(contents.trim().to_owned()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let token = generate();
            persist(path, &token).await?;
            Ok(token)
        }
        Err(e) => Err(AgentError::internal(format!("failed to read token file: {e}"))),
    }
}

pub async fn persist(path: &Path, token: &str) -> Result<(), AgentError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| AgentError::internal(format!("failed to create token directory: {e}")))?;
    }
    tokio::fs::write(path, token).await.map_err(|e| AgentError::internal(format!("failed to write token file: {e}")))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await;
    }
    Ok(())
}

/// Same shape as the server's `netvigil_` token, generated independently on
/// the agent side for its own first enrollment (§9: "token format ... not
/// fixed by the source; the spec requires only cryptographically generated").
fn generate() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    format!("netvigil_{}", BASE64.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_and_reuses_token_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");
        let first = load_or_create(&path).await.unwrap();
        let second = load_or_create(&path).await.unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with("netvigil_"));
    }

    #[tokio::test]
    async fn persist_overwrites_existing_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");
        persist(&path, "netvigil_one").await.unwrap();
        persist(&path, "netvigil_two").await.unwrap();
        let loaded = load_or_create(&path).await.unwrap();
        assert_eq!(loaded, "netvigil_two");
    }
}
