//! Persisted balance snapshot
//!
//! A single JSON file holding the last snapshot and the session it belongs
//! to. Every save overwrites it; logout deletes it. Writes go through a
//! temporary file and a rename so a crash never leaves half a snapshot.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::BalanceSnapshot;

#[derive(Debug, Serialize, Deserialize)]
struct StoredSnapshot {
    session: String,
    snapshot: BalanceSnapshot,
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cached snapshot for `session`, if one exists and is readable
    ///
    /// A snapshot written for another session is ignored, as is a corrupt
    /// file; both are treated as "nothing cached".
    pub async fn load(&self, session: &str) -> Option<BalanceSnapshot> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read balance snapshot");
                return None;
            }
        };

        match serde_json::from_slice::<StoredSnapshot>(&bytes) {
            Ok(stored) if stored.session == session => Some(stored.snapshot),
            Ok(stored) => {
                debug!(cached_session = %stored.session, "Ignoring snapshot from another session");
                None
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Discarding corrupt balance snapshot");
                None
            }
        }
    }

    /// Overwrite the cached snapshot; the session key is the snapshot address
    pub async fn save(&self, snapshot: &BalanceSnapshot) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        let stored = StoredSnapshot {
            session: snapshot.address.clone(),
            snapshot: snapshot.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&stored)?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }

    pub async fn clear(&self) -> anyhow::Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("removing {}", self.path.display())),
        }
    }
}
