//! # models::vault
//!
//! Defines [`Vault`] — the reference data a position is valued against.
//!
//! The ledger only ever reads `nav`, `exit_fee_percent` and `lockup_days`, and
//! it reads them as point-in-time inputs: callers fetch the vault fresh and pass
//! the current values on every Deposit / Withdraw.  Everything else here exists
//! for the Discover page (manager, TVL, NAV history, performance) and for the
//! manager's [`SafetyDeposit`].

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Vault identifier.  Seed vaults use 1..=4, manager-created vaults start at
/// [`FIRST_MANAGED_VAULT_ID`].
pub type VaultId = u64;

pub const FIRST_MANAGED_VAULT_ID: VaultId = 1000;

/// How many NAV points are kept for the sparkline / performance numbers.
pub const NAV_HISTORY_LEN: usize = 30;

// ─── TokenAllocation ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenAllocation {
    pub token: String,
    pub percentage: f64,
}

// ─── SafetyDeposit ────────────────────────────────────────────────────────────

/// USDC a manager puts up when opening a vault.  Refundable once
/// `lock_until` has passed, exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyDeposit {
    pub amount: f64,
    pub lock_until: DateTime<Utc>,
    pub withdrawn: bool,
}

impl SafetyDeposit {
    pub fn new(amount: f64, locked_at: DateTime<Utc>, lock_days: u32) -> Self {
        Self {
            amount,
            lock_until: locked_at + Duration::days(i64::from(lock_days)),
            withdrawn: false,
        }
    }

    /// Still held and still inside its lock.
    #[inline]
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        !self.withdrawn && now < self.lock_until
    }

    #[inline]
    pub fn can_withdraw(&self, now: DateTime<Utc>) -> bool {
        !self.withdrawn && self.lock_until <= now
    }

    /// Whole days left on the lock, rounded up; 0 once it has passed.
    pub fn days_until_unlock(&self, now: DateTime<Utc>) -> i64 {
        let secs = (self.lock_until - now).num_seconds();
        if secs <= 0 {
            0
        } else {
            (secs + 86_399) / 86_400
        }
    }
}

// ─── Vault ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vault {
    pub id: VaultId,
    pub name: String,
    /// Ticker, 2-10 chars of A-Z / 0-9.
    pub symbol: String,
    /// Display name of the manager (ENS name or "FID 1234").
    pub manager: String,
    pub manager_address: String,
    pub strategy: String,
    /// Net asset value per share.  Always > 0.
    pub nav: f64,
    /// Oldest first, current NAV last.
    pub nav_history: Vec<f64>,
    /// Percentage (0-100) withheld from gross value on redemption.
    pub exit_fee_percent: f64,
    /// Days a deposit stays locked before its shares can be withdrawn.
    pub lockup_days: u32,
    /// Total value locked, in USDC.
    pub tvl: f64,
    pub allocation: Vec<TokenAllocation>,
    pub safety_deposit: SafetyDeposit,
    pub created_at: DateTime<Utc>,
}

impl Vault {
    /// Percentage change of NAV over the last `days` history points.
    ///
    /// Uses the oldest point available when the history is shorter than
    /// `days`; returns 0 when there is nothing to compare against.
    pub fn performance(&self, days: usize) -> f64 {
        let len = self.nav_history.len();
        if len < 2 || days == 0 {
            return 0.0;
        }
        let base_idx = len.saturating_sub(days + 1);
        let base = self.nav_history[base_idx];
        let last = self.nav_history[len - 1];
        if base <= 0.0 {
            return 0.0;
        }
        (last / base - 1.0) * 100.0
    }

    /// Install a new NAV and append it to the history, dropping the oldest
    /// point once the history is full.
    pub fn record_nav(&mut self, nav: f64) {
        self.nav = nav;
        self.nav_history.push(nav);
        if self.nav_history.len() > NAV_HISTORY_LEN {
            let excess = self.nav_history.len() - NAV_HISTORY_LEN;
            self.nav_history.drain(..excess);
        }
    }
}

// ─── VaultView ────────────────────────────────────────────────────────────────

/// Vault as served to the Discover page: the stored record plus the derived
/// performance figures.
#[derive(Debug, Clone, Serialize)]
pub struct VaultView {
    #[serde(flatten)]
    pub vault: Vault,
    pub performance_7d: f64,
    pub performance_30d: f64,
}

impl From<&Vault> for VaultView {
    fn from(vault: &Vault) -> Self {
        Self {
            performance_7d: vault.performance(7),
            performance_30d: vault.performance(30),
            vault: vault.clone(),
        }
    }
}
