//! # models::activity
//!
//! Append-only buy/sell log shown on the Activity tab.  The ledger never reads
//! it back; the service writes one record per successful buy or sell.
//!
//! History is kept per user, so one user's trading never evicts another's.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::vault::VaultId;

/// Records kept per user (that user's oldest dropped first).
pub const ACTIVITY_PER_USER_CAPACITY: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Buy,
    Sell,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub activity_id: Uuid,
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub user: String,
    pub vault_id: VaultId,
    pub vault_name: String,
    /// USDC deposited (buys only).
    pub amount: Option<f64>,
    pub shares: f64,
    /// USDC paid out after the exit fee (sells only).
    pub net_value: Option<f64>,
    pub fee: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl ActivityRecord {
    pub fn buy(
        user: &str,
        vault_id: VaultId,
        vault_name: &str,
        amount: f64,
        shares: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            activity_id: Uuid::new_v4(),
            kind: ActivityKind::Buy,
            user: user.to_string(),
            vault_id,
            vault_name: vault_name.to_string(),
            amount: Some(amount),
            shares,
            net_value: None,
            fee: None,
            timestamp,
        }
    }

    pub fn sell(
        user: &str,
        vault_id: VaultId,
        vault_name: &str,
        shares: f64,
        net_value: f64,
        fee: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            activity_id: Uuid::new_v4(),
            kind: ActivityKind::Sell,
            user: user.to_string(),
            vault_id,
            vault_name: vault_name.to_string(),
            amount: None,
            shares,
            net_value: Some(net_value),
            fee: Some(fee),
            timestamp,
        }
    }
}

// ─── ActivityLog ──────────────────────────────────────────────────────────────

/// Per-user history, newest record first, each bounded at
/// [`ACTIVITY_PER_USER_CAPACITY`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivityLog {
    by_user: BTreeMap<String, VecDeque<ActivityRecord>>,
}

impl ActivityLog {
    pub fn push(&mut self, record: ActivityRecord) {
        let records = self.by_user.entry(record.user.clone()).or_default();
        records.push_front(record);
        records.truncate(ACTIVITY_PER_USER_CAPACITY);
    }

    /// Records across all users.
    pub fn len(&self) -> usize {
        self.by_user.values().map(VecDeque::len).sum()
    }

    pub fn for_user(&self, user: &str) -> Vec<ActivityRecord> {
        self.by_user
            .get(user)
            .map(|records| records.iter().cloned().collect())
            .unwrap_or_default()
    }
}
