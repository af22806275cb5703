//! # models::tranche
//!
//! A [`Tranche`] is one deposit event's shares, tracked separately so each
//! deposit can carry its own lockup expiry.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LedgerError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tranche {
    pub tranche_id: Uuid,
    /// Cost basis in USDC still attributed to this tranche.
    pub amount: f64,
    /// Shares remaining.  Always > 0 while the tranche exists.
    pub shares: f64,
    pub deposited_at: DateTime<Utc>,
    pub unlock_date: DateTime<Utc>,
}

impl Tranche {
    /// Build the tranche for a deposit of `amount` USDC that bought `shares`
    /// at `deposited_at`, locked for `lockup_days`.
    pub fn new(
        amount: f64,
        shares: f64,
        deposited_at: DateTime<Utc>,
        lockup_days: u32,
    ) -> Result<Self, LedgerError> {
        if !(amount.is_finite() && amount >= 0.0) {
            return Err(LedgerError::InvalidAmount(amount));
        }
        if !(shares.is_finite() && shares > 0.0) {
            return Err(LedgerError::InvalidAmount(shares));
        }

        Ok(Self {
            tranche_id: Uuid::new_v4(),
            amount,
            shares,
            deposited_at,
            unlock_date: deposited_at + Duration::days(i64::from(lockup_days)),
        })
    }

    /// A tranche unlocks at exactly `unlock_date`, not after it.
    #[inline]
    pub fn is_unlocked(&self, now: DateTime<Utc>) -> bool {
        self.unlock_date <= now
    }

    /// Take `shares` out of this tranche, keeping the remaining cost basis
    /// proportional to the shares left.
    ///
    /// Caller guarantees `0 < shares < self.shares`.
    pub(crate) fn reduce(&mut self, shares: f64) {
        let remaining = self.shares - shares;
        self.amount *= remaining / self.shares;
        self.shares = remaining;
    }

    /// "now", "in 3d 4h" or "in 5h" — the countdown shown next to a locked
    /// tranche.
    pub fn time_to_unlock(&self, now: DateTime<Utc>) -> String {
        let diff = self.unlock_date - now;
        if diff <= Duration::zero() {
            return "now".to_string();
        }

        let days = diff.num_days();
        let hours = (diff - Duration::days(days)).num_hours();
        if days > 0 {
            format!("in {days}d {hours}h")
        } else {
            format!("in {hours}h")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_new_sets_unlock_date() {
        let tranche = Tranche::new(100.0, 98.0, t0(), 7).unwrap();
        assert_eq!(tranche.unlock_date, t0() + Duration::days(7));
        assert!(!tranche.is_unlocked(t0()));
        assert!(tranche.is_unlocked(t0() + Duration::days(7)));
    }

    #[test]
    fn test_new_rejects_non_positive_shares() {
        assert_eq!(
            Tranche::new(100.0, 0.0, t0(), 7),
            Err(LedgerError::InvalidAmount(0.0))
        );
        assert!(Tranche::new(-1.0, 1.0, t0(), 7).is_err());
        assert!(Tranche::new(1.0, f64::NAN, t0(), 7).is_err());
    }

    #[test]
    fn test_reduce_keeps_cost_basis_proportional() {
        let mut tranche = Tranche::new(100.0, 80.0, t0(), 0).unwrap();
        tranche.reduce(20.0);
        assert!((tranche.shares - 60.0).abs() < 1e-12);
        assert!((tranche.amount - 75.0).abs() < 1e-12);
    }

    #[test]
    fn test_time_to_unlock_label() {
        let tranche = Tranche::new(10.0, 10.0, t0(), 7).unwrap();
        assert_eq!(tranche.time_to_unlock(t0()), "in 7d 0h");
        assert_eq!(
            tranche.time_to_unlock(t0() + Duration::days(6) + Duration::hours(19)),
            "in 5h"
        );
        assert_eq!(tranche.time_to_unlock(t0() + Duration::days(8)), "now");
    }
}
