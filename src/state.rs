//! # state
//!
//! The **shared application state** — registry, ledger, balances and the
//! activity log, each behind its own `tokio::sync::RwLock`, plus the broadcast
//! channel and the snapshot store.
//!
//! ## Locking rules
//!
//! * Buy / sell run under a per-(user, vault) mutex from [`KeyedLocks`], so
//!   two requests against the same position never interleave their
//!   read-modify-write of the ledger totals.
//! * Inside that critical section each `RwLock` is taken, used and released
//!   on its own; no code path holds two write guards at once.
//! * Readers only ever get clones, never a reference into the ledger.
//! * [`AppState::persist`] holds the store's write lock while it snapshots and
//!   saves; it is only called once every `RwLock` guard has been dropped.

use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context;
use chrono::Utc;
use tokio::sync::{broadcast, OwnedMutexGuard, RwLock};
use tracing::{error, info};

use crate::config::AppConfig;
use crate::events::WsEvent;
use crate::ledger::PositionLedger;
use crate::models::{ActivityLog, VaultId};
use crate::registry::{VaultDefaults, VaultRegistry};
use crate::store::{JsonStore, Snapshot};
use crate::wallet::BalanceBook;

/// Idle lock entries are pruned once the map grows past this.
const LOCK_PRUNE_THRESHOLD: usize = 1024;

// ─── KeyedLocks ───────────────────────────────────────────────────────────────

/// One async mutex per (user, vault), created on demand.
#[derive(Clone, Default)]
pub struct KeyedLocks {
    inner: Arc<Mutex<HashMap<(String, VaultId), Arc<tokio::sync::Mutex<()>>>>>,
}

impl KeyedLocks {
    pub async fn lock(&self, user: &str, vault_id: VaultId) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            if map.len() > LOCK_PRUNE_THRESHOLD {
                // ไม่มีใครถืออยู่ = strong_count == 1 (เฉพาะใน map)
                map.retain(|_, m| Arc::strong_count(m) > 1);
            }
            map.entry((user.to_string(), vault_id))
                .or_default()
                .clone()
        };
        mutex.lock_owned().await
    }
}

// ─── AppState ─────────────────────────────────────────────────────────────────

/// Top-level shared state injected into every Axum handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,

    // ── Reference data ────────────────────────────────────────────────────────
    pub registry: Arc<RwLock<VaultRegistry>>,

    // ── Holdings ──────────────────────────────────────────────────────────────
    pub ledger:   Arc<RwLock<PositionLedger>>,
    pub balances: Arc<RwLock<BalanceBook>>,
    pub activity: Arc<RwLock<ActivityLog>>,
    pub locks:    KeyedLocks,

    // ── Monitor / WebSocket ───────────────────────────────────────────────────
    /// Pre-serialized JSON events for `/ws/activity` subscribers.
    pub broadcast_tx: broadcast::Sender<String>,

    // ── Persistence ───────────────────────────────────────────────────────────
    /// None = in-memory only
    pub store: Option<JsonStore>,

    // ── Metrics ───────────────────────────────────────────────────────────────
    pub buy_count:  Arc<AtomicU64>,
    pub sell_count: Arc<AtomicU64>,
}

impl AppState {
    /// Fresh state: demo vaults, no positions, every wallet at the starting
    /// balance.
    pub fn new(config: AppConfig) -> Self {
        let registry = VaultRegistry::with_demo_vaults(VaultDefaults::from(&config), Utc::now());
        let balances = BalanceBook::new(config.starting_balance);
        Self::assemble(config, registry, PositionLedger::new(), balances, ActivityLog::default())
    }

    /// Rebuild state from a persisted snapshot.  An empty vault list falls
    /// back to the demo seed.
    pub fn from_snapshot(config: AppConfig, snapshot: Snapshot) -> Self {
        let defaults = VaultDefaults::from(&config);
        let mut registry = if snapshot.vaults.is_empty() {
            VaultRegistry::with_demo_vaults(defaults, Utc::now())
        } else {
            VaultRegistry::new(defaults)
        };
        for vault in snapshot.vaults {
            registry.insert(vault);
        }

        let ledger   = PositionLedger::from_positions(snapshot.positions);
        let balances = BalanceBook::from_balances(config.starting_balance, snapshot.balances);
        Self::assemble(config, registry, ledger, balances, snapshot.activity)
    }

    fn assemble(
        config:   AppConfig,
        registry: VaultRegistry,
        ledger:   PositionLedger,
        balances: BalanceBook,
        activity: ActivityLog,
    ) -> Self {
        let (broadcast_tx, _) = broadcast::channel(config.broadcast_capacity.max(1));
        let store = config.store_path.clone().map(JsonStore::new);

        Self {
            config:       Arc::new(config),
            registry:     Arc::new(RwLock::new(registry)),
            ledger:       Arc::new(RwLock::new(ledger)),
            balances:     Arc::new(RwLock::new(balances)),
            activity:     Arc::new(RwLock::new(activity)),
            locks:        KeyedLocks::default(),
            broadcast_tx,
            store,
            buy_count:    Arc::new(AtomicU64::new(0)),
            sell_count:   Arc::new(AtomicU64::new(0)),
        }
    }

    // ── Helper Methods ────────────────────────────────────────────────────────

    /// Broadcast WsEvent ไปยัง WebSocket clients ทั้งหมด
    /// ไม่ panic ถ้าไม่มี listener
    pub fn broadcast(&self, event: &WsEvent) {
        // Err เกิดขึ้นเมื่อไม่มี receiver — ไม่ใช่ error จริงๆ
        let _ = self.broadcast_tx.send(event.to_json());
    }

    /// Clone everything persistable into a [`Snapshot`].
    pub async fn snapshot(&self) -> Snapshot {
        let vaults = self.registry.read().await.list().into_iter().cloned().collect();
        let positions = self
            .ledger
            .read()
            .await
            .all_positions()
            .into_iter()
            .cloned()
            .collect();
        let balances = self.balances.read().await.balances().clone();
        let activity = self.activity.read().await.clone();

        Snapshot {
            vaults,
            positions,
            balances,
            activity,
            saved_at: Some(Utc::now()),
        }
    }

    /// Write the current state to the store (no-op when persistence is off).
    ///
    /// The snapshot is taken while holding the store's write lock, so the
    /// last snapshot taken is the last one written.
    pub async fn persist(&self) -> anyhow::Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let _writing = store.write_lock().await;
        let snapshot = self.snapshot().await;
        store.save(&snapshot).await
    }

    /// Persist after a committed mutation.  The in-memory change stands even
    /// if the write fails; the failure is logged.
    pub async fn persist_or_log(&self) {
        if let Err(err) = self.persist().await {
            let path = self.store.as_ref().map(|s| s.path().display().to_string());
            error!(?path, error = %format!("{err:#}"), "💾 Failed to persist snapshot");
        }
    }
}

/// Convenience type alias
pub type SharedState = Arc<AppState>;

/// Build the shared state, restoring the last snapshot when a store is
/// configured.
pub async fn build_state(config: AppConfig) -> anyhow::Result<SharedState> {
    let snapshot = match &config.store_path {
        Some(path) => JsonStore::new(path.clone())
            .load()
            .await
            .context("Failed to restore state")?,
        None => None,
    };

    let state = match snapshot {
        Some(snapshot) => AppState::from_snapshot(config, snapshot),
        None => AppState::new(config),
    };

    let vaults    = state.registry.read().await.list().len();
    let positions = state.ledger.read().await.len();
    info!(vaults, positions, persisted = state.store.is_some(), "State ready");
    Ok(Arc::new(state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_keyed_lock_serializes_same_key() {
        let locks = KeyedLocks::default();
        let guard = locks.lock("alice", 1).await;

        let contender = locks.clone();
        let blocked = tokio::time::timeout(Duration::from_millis(50), async move {
            let _guard = contender.lock("alice", 1).await;
        })
        .await;
        assert!(blocked.is_err());

        // Different vault, different lock.
        let other = tokio::time::timeout(Duration::from_millis(50), locks.lock("alice", 2)).await;
        assert!(other.is_ok());

        drop(guard);
        let again = tokio::time::timeout(Duration::from_millis(50), locks.lock("alice", 1)).await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn test_snapshot_round_trips_into_state() {
        let state = AppState::new(AppConfig::default());
        state
            .ledger
            .write()
            .await
            .deposit("alice", 2, 50.0, 1.0156, 7, Utc::now())
            .unwrap();
        state.balances.write().await.try_debit("alice", 50.0).unwrap();

        let snapshot = state.snapshot().await;
        let restored = AppState::from_snapshot(AppConfig::default(), snapshot);

        assert_eq!(restored.registry.read().await.list().len(), 4);
        assert!(restored.ledger.read().await.position("alice", 2).is_some());
        assert_eq!(restored.balances.read().await.balance("alice"), 190.0);
    }
}
