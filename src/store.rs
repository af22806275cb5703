//! # store — JSON Snapshot Persistence
//!
//! เก็บ state ทั้งหมด (vaults, positions, balances, activity) เป็น JSON ไฟล์เดียว
//!
//! Writes go to `<path>.tmp` first and are then renamed over the real file, so
//! a crash mid-write leaves the previous snapshot intact.  There is no
//! indexing or partial update: every save rewrites the whole blob.
//!
//! Concurrent writers must hold [`JsonStore::write_lock`] across both taking
//! the snapshot and saving it; otherwise an older snapshot can land last.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::models::{ActivityLog, Position, Vault};

// ─── Snapshot ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub vaults:    Vec<Vault>,
    pub positions: Vec<Position>,
    pub balances:  HashMap<String, f64>,
    #[serde(default)]
    pub activity:  ActivityLog,
    pub saved_at:  Option<DateTime<Utc>>,
}

// ─── JsonStore ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct JsonStore {
    path: PathBuf,
    /// Shared by every clone of this store.
    writer: Arc<Mutex<()>>,
}

impl JsonStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serializes snapshot-then-save sequences against this file.
    pub async fn write_lock(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().await
    }

    /// Load the last snapshot.  `Ok(None)` when nothing has been saved yet.
    pub async fn load(&self) -> anyhow::Result<Option<Snapshot>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No snapshot yet — starting fresh");
                return Ok(None);
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("Failed to read {}", self.path.display()));
            }
        };

        let snapshot: Snapshot = serde_json::from_slice(&raw)
            .with_context(|| format!("Corrupt snapshot at {}", self.path.display()))?;

        info!(
            path      = %self.path.display(),
            vaults    = snapshot.vaults.len(),
            positions = snapshot.positions.len(),
            "📊 Snapshot loaded"
        );
        Ok(Some(snapshot))
    }

    pub async fn save(&self, snapshot: &Snapshot) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let body = serde_json::to_vec_pretty(snapshot).context("Failed to serialize snapshot")?;
        let tmp = self.path.with_extension("json.tmp");

        tokio::fs::write(&tmp, &body)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        debug!(path = %self.path.display(), bytes = body.len(), "Snapshot saved");
        Ok(())
    }
}
