//! # models::position
//!
//! A [`Position`] is one user's holding in one vault: an ordered list of
//! deposit tranches plus the running totals derived from them.
//!
//! ## Lifecycle
//! `Empty` → `Funded` on the first deposit, `Funded` → removed once a
//! withdrawal brings `total_shares` down to [`POSITION_EPSILON`].  Mutation
//! goes through [`crate::ledger::PositionLedger`] only; everything public on
//! this type is a read-only query.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::tranche::Tranche;
use crate::models::vault::{Vault, VaultId};

/// Below this many shares a position is treated as closed (float residue).
pub const POSITION_EPSILON: f64 = 0.0001;

// ─── Position ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub user: String,
    pub vault_id: VaultId,
    /// Always equal to the sum of `tranches[..].shares`.
    pub total_shares: f64,
    /// Sum of original deposit amounts.  Cost basis for P&L.
    pub total_invested: f64,
    /// Sum of net USDC paid out by withdrawals.
    pub total_withdrawn: f64,
    /// Oldest first.  Withdrawals consume from the front.
    pub tranches: Vec<Tranche>,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    pub(crate) fn new(user: &str, vault_id: VaultId, now: DateTime<Utc>) -> Self {
        Self {
            user: user.to_string(),
            vault_id,
            total_shares: 0.0,
            total_invested: 0.0,
            total_withdrawn: 0.0,
            tranches: Vec::new(),
            opened_at: now,
        }
    }

    /// Shares in tranches whose lockup has elapsed at `now`.
    pub fn unlocked_shares(&self, now: DateTime<Utc>) -> f64 {
        self.tranches
            .iter()
            .filter(|t| t.is_unlocked(now))
            .map(|t| t.shares)
            .sum()
    }

    pub fn locked_shares(&self, now: DateTime<Utc>) -> f64 {
        (self.total_shares - self.unlocked_shares(now)).max(0.0)
    }

    /// Current value of the whole position at `nav`.
    #[inline]
    pub fn value(&self, nav: f64) -> f64 {
        self.total_shares * nav
    }

    #[inline]
    pub fn unrealized_pnl(&self, nav: f64) -> f64 {
        self.value(nav) - self.total_invested
    }

    /// P&L as a percentage of `total_invested`; `None` while nothing has been
    /// invested.
    pub fn pnl_percent(&self, nav: f64) -> Option<f64> {
        if self.total_invested <= 0.0 {
            return None;
        }
        Some(self.unrealized_pnl(nav) / self.total_invested * 100.0)
    }

    /// The still-locked tranche that unlocks soonest.
    pub fn next_unlock(&self, now: DateTime<Utc>) -> Option<&Tranche> {
        self.tranches
            .iter()
            .filter(|t| !t.is_unlocked(now))
            .min_by_key(|t| t.unlock_date)
    }

    /// Cost basis still attributed to the remaining tranches.
    pub fn remaining_cost_basis(&self) -> f64 {
        self.tranches.iter().map(|t| t.amount).sum()
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.total_shares <= POSITION_EPSILON
    }

    /// Re-derive `total_shares` from the tranches.
    pub(crate) fn recompute_total_shares(&mut self) {
        self.total_shares = self.tranches.iter().map(|t| t.shares).sum();
    }

    /// Everything the My Vaults card shows, computed against `vault`'s
    /// current NAV.
    pub fn summary(&self, vault: &Vault, now: DateTime<Utc>) -> PositionSummary {
        let unlocked_shares = self.unlocked_shares(now);
        let unlock_status = if unlocked_shares > 0.0 {
            "Unlocked".to_string()
        } else {
            match self.next_unlock(now) {
                Some(t) => format!("Unlocks {}", t.time_to_unlock(now)),
                None => "No unlocks".to_string(),
            }
        };

        PositionSummary {
            vault_id:        self.vault_id,
            vault_name:      vault.name.clone(),
            nav:             vault.nav,
            total_shares:    self.total_shares,
            unlocked_shares,
            locked_shares:   self.locked_shares(now),
            unlocked_value:  unlocked_shares * vault.nav,
            value:           self.value(vault.nav),
            total_invested:  self.total_invested,
            cost_basis:      self.remaining_cost_basis(),
            pnl:             self.unrealized_pnl(vault.nav),
            pnl_percent:     self.pnl_percent(vault.nav),
            next_unlock:     self.next_unlock(now).map(|t| t.unlock_date),
            unlock_status,
            tranche_count:   self.tranches.len(),
        }
    }
}

// ─── PositionSummary ──────────────────────────────────────────────────────────

/// Read-only snapshot of a position's derived figures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionSummary {
    pub vault_id: VaultId,
    pub vault_name: String,
    pub nav: f64,
    pub total_shares: f64,
    pub unlocked_shares: f64,
    pub locked_shares: f64,
    pub unlocked_value: f64,
    pub value: f64,
    pub total_invested: f64,
    /// Cost basis of the shares still held.
    pub cost_basis: f64,
    pub pnl: f64,
    pub pnl_percent: Option<f64>,
    pub next_unlock: Option<DateTime<Utc>>,
    /// "Unlocked", "Unlocks in 2d 3h" or "No unlocks".
    pub unlock_status: String,
    pub tranche_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn funded(tranches: &[(f64, f64, i64)]) -> Position {
        // (amount, shares, unlock offset in days from t0)
        let mut position = Position::new("alice", 1, t0());
        for &(amount, shares, offset) in tranches {
            let mut tranche = Tranche::new(amount, shares, t0(), 0).unwrap();
            tranche.unlock_date = t0() + Duration::days(offset);
            position.total_invested += amount;
            position.tranches.push(tranche);
        }
        position.recompute_total_shares();
        position
    }

    #[test]
    fn test_unlocked_and_locked_shares() {
        let position = funded(&[(10.0, 10.0, 5), (4.0, 4.0, -1)]);
        assert_eq!(position.total_shares, 14.0);
        assert_eq!(position.unlocked_shares(t0()), 4.0);
        assert_eq!(position.locked_shares(t0()), 10.0);
        assert_eq!(position.unlocked_shares(t0() + Duration::days(5)), 14.0);
    }

    #[test]
    fn test_unlocked_shares_is_idempotent() {
        let position = funded(&[(5.0, 5.0, -2), (3.0, 3.0, 2)]);
        let first = position.unlocked_shares(t0());
        let second = position.unlocked_shares(t0());
        assert_eq!(first, second);
    }

    #[test]
    fn test_next_unlock_picks_earliest_future() {
        let position = funded(&[(1.0, 1.0, 9), (1.0, 1.0, -3), (1.0, 1.0, 4)]);
        let next = position.next_unlock(t0()).unwrap();
        assert_eq!(next.unlock_date, t0() + Duration::days(4));

        let all_unlocked = funded(&[(1.0, 1.0, -1)]);
        assert!(all_unlocked.next_unlock(t0()).is_none());
    }

    #[test]
    fn test_pnl_sign_and_percent() {
        let position = funded(&[(100.0, 100.0, 0)]);
        assert!(position.unrealized_pnl(0.99) < 0.0);
        assert!((position.pnl_percent(1.05).unwrap() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_pnl_percent_guarded_without_investment() {
        let position = Position::new("bob", 2, t0());
        assert_eq!(position.pnl_percent(1.0), None);
        assert!(position.is_closed());
    }
}
