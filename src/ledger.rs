//! # ledger — Position Ledger
//!
//! Authoritative in-memory bookkeeping of every user's per-vault holdings.
//!
//! ```text
//! Deposit(amount, nav, lockup, now)
//!     shares = amount / nav
//!     └─ append Tranche { amount, shares, unlock = now + lockup }
//!
//! Withdraw(shares, nav, exit_fee, now)
//!     [1] shares ≤ unlocked_shares(now)   else InsufficientUnlockedShares
//!     [2] gross = shares × nav, fee = gross × exit_fee / 100, net = gross − fee
//!     [3] consume unlocked tranches oldest-first (locked ones are skipped)
//!     [4] total_shares ≤ ε  →  position closed and removed
//! ```
//!
//! The ledger never reads the clock, the wallet balance or the vault registry:
//! `now`, NAV, exit fee and lockup are all passed in by the caller.  Every
//! operation validates completely before it touches state, so a rejected call
//! leaves the ledger exactly as it was.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::debug;

use crate::error::LedgerError;
use crate::models::{Position, Tranche, VaultId, POSITION_EPSILON};

/// A tranche left with fewer shares than this after a withdrawal is treated as
/// fully consumed, so `tranche.shares > 0` holds for every surviving tranche.
const TRANCHE_DUST: f64 = 1e-9;

// ─── Receipts & Quotes ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepositReceipt {
    pub tranche: Tranche,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WithdrawReceipt {
    pub vault_id: VaultId,
    pub shares: f64,
    pub gross_value: f64,
    pub fee: f64,
    /// USDC owed to the user.  Crediting it is the caller's job.
    pub net_value: f64,
    /// `true` when the position fell to ~0 shares and was removed.
    pub closed: bool,
    /// The position after the withdrawal; `None` once closed.
    pub position: Option<Position>,
}

/// What a withdrawal of `shares` would pay out, without touching any state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WithdrawQuote {
    pub shares: f64,
    pub gross_value: f64,
    pub fee: f64,
    pub net_value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DepositQuote {
    pub amount: f64,
    pub shares: f64,
    pub unlock_date: DateTime<Utc>,
}

#[inline]
fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn check_nav(nav: f64) -> Result<(), LedgerError> {
    if is_positive(nav) {
        Ok(())
    } else {
        Err(LedgerError::InvalidNav(nav))
    }
}

/// Preview of a deposit: shares bought and when they unlock.
///
/// A deposit must buy more than [`POSITION_EPSILON`] shares, otherwise the
/// new position would count as closed the moment it opened.
pub fn quote_deposit(
    amount: f64,
    nav: f64,
    lockup_days: u32,
    now: DateTime<Utc>,
) -> Result<DepositQuote, LedgerError> {
    if !is_positive(amount) {
        return Err(LedgerError::InvalidAmount(amount));
    }
    check_nav(nav)?;

    let shares = amount / nav;
    if shares <= POSITION_EPSILON {
        return Err(LedgerError::DepositTooSmall {
            amount,
            shares,
            minimum: POSITION_EPSILON,
        });
    }

    Ok(DepositQuote {
        amount,
        shares,
        unlock_date: now + Duration::days(i64::from(lockup_days)),
    })
}

/// Preview of a withdrawal: gross value, exit fee and net payout.
pub fn quote_withdrawal(
    shares: f64,
    nav: f64,
    exit_fee_percent: f64,
) -> Result<WithdrawQuote, LedgerError> {
    if !is_positive(shares) {
        return Err(LedgerError::InvalidAmount(shares));
    }
    check_nav(nav)?;
    if !(exit_fee_percent.is_finite() && (0.0..=100.0).contains(&exit_fee_percent)) {
        return Err(LedgerError::InvalidExitFee(exit_fee_percent));
    }

    let gross_value = shares * nav;
    let fee = gross_value * (exit_fee_percent / 100.0);
    Ok(WithdrawQuote {
        shares,
        gross_value,
        fee,
        net_value: gross_value - fee,
    })
}

// ─── PositionLedger ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PositionKey {
    user: String,
    vault_id: VaultId,
}

impl PositionKey {
    fn new(user: &str, vault_id: VaultId) -> Self {
        Self { user: user.to_string(), vault_id }
    }
}

/// All open positions, keyed by (user, vault).
#[derive(Debug, Clone, Default)]
pub struct PositionLedger {
    positions: HashMap<PositionKey, Position>,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from persisted positions.  Closed positions and
    /// duplicate (user, vault) entries are dropped; totals are re-derived
    /// from the tranches.
    pub fn from_positions(positions: impl IntoIterator<Item = Position>) -> Self {
        let mut ledger = Self::new();
        for mut position in positions {
            position.tranches.retain(|t| t.shares > TRANCHE_DUST);
            position.recompute_total_shares();
            if position.is_closed() {
                continue;
            }
            let key = PositionKey::new(&position.user, position.vault_id);
            ledger.positions.entry(key).or_insert(position);
        }
        ledger
    }

    // ─── Deposit ──────────────────────────────────────────────────────────────

    pub fn deposit(
        &mut self,
        user: &str,
        vault_id: VaultId,
        amount: f64,
        vault_nav: f64,
        lockup_days: u32,
        now: DateTime<Utc>,
    ) -> Result<DepositReceipt, LedgerError> {
        let quote = quote_deposit(amount, vault_nav, lockup_days, now)?;
        let tranche = Tranche::new(amount, quote.shares, now, lockup_days)?;

        let position = self
            .positions
            .entry(PositionKey::new(user, vault_id))
            .or_insert_with(|| Position::new(user, vault_id, now));

        position.tranches.push(tranche.clone());
        position.total_invested += amount;
        position.recompute_total_shares();

        debug!(
            user,
            vault_id,
            amount,
            shares       = quote.shares,
            total_shares = position.total_shares,
            unlock_date  = %tranche.unlock_date,
            "Deposit applied"
        );

        Ok(DepositReceipt {
            tranche,
            position: position.clone(),
        })
    }

    // ─── Withdraw ─────────────────────────────────────────────────────────────

    pub fn withdraw(
        &mut self,
        user: &str,
        vault_id: VaultId,
        shares: f64,
        vault_nav: f64,
        exit_fee_percent: f64,
        now: DateTime<Utc>,
    ) -> Result<WithdrawReceipt, LedgerError> {
        let quote = quote_withdrawal(shares, vault_nav, exit_fee_percent)?;

        let key = PositionKey::new(user, vault_id);
        let position = self
            .positions
            .get_mut(&key)
            .ok_or(LedgerError::PositionNotFound { vault_id })?;

        let available = position.unlocked_shares(now);
        if shares > available {
            return Err(LedgerError::InsufficientUnlockedShares {
                requested: shares,
                available,
            });
        }

        // ── FIFO over unlocked tranches (locked ones are kept as-is) ─────────
        let mut remaining = shares;
        position.tranches.retain_mut(|tranche| {
            if remaining <= 0.0 || !tranche.is_unlocked(now) {
                return true;
            }
            if tranche.shares <= remaining + TRANCHE_DUST {
                remaining = (remaining - tranche.shares).max(0.0);
                false
            } else {
                tranche.reduce(remaining);
                remaining = 0.0;
                true
            }
        });

        position.recompute_total_shares();
        position.total_withdrawn += quote.net_value;

        let closed = position.is_closed();
        let position = if closed {
            self.positions.remove(&key);
            None
        } else {
            Some(position.clone())
        };

        debug!(
            user,
            vault_id,
            shares,
            net_value = quote.net_value,
            fee       = quote.fee,
            closed,
            "Withdrawal applied"
        );

        Ok(WithdrawReceipt {
            vault_id,
            shares,
            gross_value: quote.gross_value,
            fee: quote.fee,
            net_value: quote.net_value,
            closed,
            position,
        })
    }

    // ─── Queries ──────────────────────────────────────────────────────────────

    pub fn position(&self, user: &str, vault_id: VaultId) -> Option<&Position> {
        self.positions.get(&PositionKey::new(user, vault_id))
    }

    /// `user`'s open positions ordered by vault id.
    pub fn positions_for(&self, user: &str) -> Vec<&Position> {
        let mut positions: Vec<&Position> = self
            .positions
            .values()
            .filter(|p| p.user == user)
            .collect();
        positions.sort_by_key(|p| p.vault_id);
        positions
    }

    /// Every open position, ordered by (user, vault) so snapshots are stable.
    pub fn all_positions(&self) -> Vec<&Position> {
        let mut positions: Vec<&Position> = self.positions.values().collect();
        positions.sort_by(|a, b| a.user.cmp(&b.user).then(a.vault_id.cmp(&b.vault_id)));
        positions
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const USER: &str = "0xb8cEDA3103Ed470b9a3A8A64323F4BCd36C61739";

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-6,
            "expected {expected}, got {actual}"
        );
    }

    fn assert_totals_consistent(ledger: &PositionLedger) {
        for position in ledger.all_positions() {
            let sum: f64 = position.tranches.iter().map(|t| t.shares).sum();
            assert_close(position.total_shares, sum);
            assert!(position.tranches.iter().all(|t| t.shares > 0.0));
        }
    }

    #[test]
    fn test_deposit_creates_position_and_tranche() {
        let mut ledger = PositionLedger::new();
        let receipt = ledger.deposit(USER, 1, 100.0, 1.02, 7, t0()).unwrap();

        assert_close(receipt.tranche.shares, 98.039_215_7);
        assert_eq!(receipt.tranche.unlock_date, t0() + Duration::days(7));
        assert_close(receipt.position.total_shares, receipt.tranche.shares);
        assert_close(receipt.position.total_invested, 100.0);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_deposits_keep_total_shares_equal_to_tranche_sum() {
        let mut ledger = PositionLedger::new();
        ledger.deposit(USER, 1, 100.0, 1.0234, 7, t0()).unwrap();
        ledger.deposit(USER, 1, 37.5, 1.03, 7, t0() + Duration::days(1)).unwrap();
        ledger.deposit(USER, 2, 12.0, 0.9912, 7, t0()).unwrap();

        let position = ledger.position(USER, 1).unwrap();
        assert_eq!(position.tranches.len(), 2);
        assert_close(position.total_invested, 137.5);
        assert_totals_consistent(&ledger);
    }

    #[test]
    fn test_deposit_rejects_invalid_input_without_mutation() {
        let mut ledger = PositionLedger::new();
        assert_eq!(
            ledger.deposit(USER, 1, 0.0, 1.0, 7, t0()),
            Err(LedgerError::InvalidAmount(0.0))
        );
        assert_eq!(
            ledger.deposit(USER, 1, -5.0, 1.0, 7, t0()),
            Err(LedgerError::InvalidAmount(-5.0))
        );
        assert_eq!(
            ledger.deposit(USER, 1, 10.0, 0.0, 7, t0()),
            Err(LedgerError::InvalidNav(0.0))
        );
        assert_eq!(ledger.len(), 0);
    }

    #[test]
    fn test_deposit_below_closing_threshold_is_rejected() {
        let mut ledger = PositionLedger::new();
        let err = ledger.deposit(USER, 1, 0.00005, 1.0, 7, t0()).unwrap_err();
        assert!(matches!(err, LedgerError::DepositTooSmall { .. }));
        assert_eq!(ledger.len(), 0);

        // A locked position can therefore never sit at or below the threshold.
        ledger.deposit(USER, 1, 0.0002, 1.0, 7, t0()).unwrap();
        let position = ledger.position(USER, 1).unwrap();
        assert!(!position.is_closed());
        assert_eq!(position.unlocked_shares(t0()), 0.0);
    }

    #[test]
    fn test_fifo_consumes_oldest_unlocked_first() {
        let mut ledger = PositionLedger::new();
        ledger.deposit(USER, 1, 5.0, 1.0, 0, t0()).unwrap();
        ledger.deposit(USER, 1, 3.0, 1.0, 0, t0()).unwrap();

        let receipt = ledger.withdraw(USER, 1, 6.0, 1.0, 0.0, t0()).unwrap();
        assert!(!receipt.closed);

        let position = ledger.position(USER, 1).unwrap();
        assert_eq!(position.tranches.len(), 1);
        assert_close(position.tranches[0].shares, 2.0);
        assert_close(position.total_shares, 2.0);
    }

    #[test]
    fn test_locked_tranches_are_never_consumed() {
        let mut ledger = PositionLedger::new();
        // T1 locked for 30 days, T2 already unlocked.
        ledger.deposit(USER, 1, 10.0, 1.0, 30, t0()).unwrap();
        ledger.deposit(USER, 1, 4.0, 1.0, 0, t0()).unwrap();

        let before = ledger.position(USER, 1).unwrap().clone();
        assert_close(before.total_shares, 14.0);

        let err = ledger.withdraw(USER, 1, 5.0, 1.0, 1.0, t0()).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientUnlockedShares { requested: 5.0, available: 4.0 }
        );
        assert_eq!(ledger.position(USER, 1).unwrap(), &before);

        // Withdrawing the unlocked 4 skips the older locked tranche.
        ledger.withdraw(USER, 1, 4.0, 1.0, 1.0, t0()).unwrap();
        let position = ledger.position(USER, 1).unwrap();
        assert_eq!(position.tranches.len(), 1);
        assert_close(position.tranches[0].shares, 10.0);
        assert!(!position.tranches[0].is_unlocked(t0()));
    }

    #[test]
    fn test_withdraw_valuation_with_exit_fee() {
        let mut ledger = PositionLedger::new();
        let deposit = ledger.deposit(USER, 1, 100.0, 1.02, 7, t0()).unwrap();
        let later = t0() + Duration::days(7);

        let receipt = ledger
            .withdraw(USER, 1, deposit.tranche.shares, 1.02, 1.0, later)
            .unwrap();
        assert_close(receipt.gross_value, 100.0);
        assert_close(receipt.fee, 1.0);
        assert_close(receipt.net_value, 99.0);
        assert!(receipt.closed);
        assert!(receipt.position.is_none());
        assert!(ledger.position(USER, 1).is_none());
    }

    #[test]
    fn test_full_unlocked_withdrawal_closes_position() {
        let mut ledger = PositionLedger::new();
        ledger.deposit(USER, 3, 33.33, 1.0087, 7, t0()).unwrap();
        ledger.deposit(USER, 3, 66.67, 1.0091, 7, t0() + Duration::hours(5)).unwrap();
        ledger.deposit(USER, 3, 10.1, 1.0102, 7, t0() + Duration::hours(9)).unwrap();

        let later = t0() + Duration::days(8);
        let unlocked = ledger.position(USER, 3).unwrap().unlocked_shares(later);
        let receipt = ledger.withdraw(USER, 3, unlocked, 1.01, 1.0, later).unwrap();

        assert!(receipt.closed);
        assert_eq!(ledger.len(), 0);
    }

    #[test]
    fn test_partial_withdrawal_keeps_proportional_cost_basis() {
        let mut ledger = PositionLedger::new();
        ledger.deposit(USER, 1, 100.0, 1.0, 0, t0()).unwrap();

        ledger.withdraw(USER, 1, 25.0, 1.2, 0.0, t0()).unwrap();
        let position = ledger.position(USER, 1).unwrap();
        assert_close(position.tranches[0].amount, 75.0);
        assert_close(position.remaining_cost_basis(), 75.0);
        assert_close(position.total_withdrawn, 30.0);
        // Lifetime cost basis is untouched.
        assert_close(position.total_invested, 100.0);
    }

    #[test]
    fn test_withdraw_without_position() {
        let mut ledger = PositionLedger::new();
        let err = ledger.withdraw(USER, 4, 1.0, 0.9912, 1.0, t0()).unwrap_err();
        assert_eq!(err, LedgerError::PositionNotFound { vault_id: 4 });
        assert_eq!(err.available_shares(), Some(0.0));
    }

    #[test]
    fn test_withdraw_rejects_bad_inputs() {
        let mut ledger = PositionLedger::new();
        ledger.deposit(USER, 1, 10.0, 1.0, 0, t0()).unwrap();

        assert_eq!(
            ledger.withdraw(USER, 1, 0.0, 1.0, 1.0, t0()),
            Err(LedgerError::InvalidAmount(0.0))
        );
        assert_eq!(
            ledger.withdraw(USER, 1, 1.0, 1.0, 101.0, t0()),
            Err(LedgerError::InvalidExitFee(101.0))
        );
        assert_close(ledger.position(USER, 1).unwrap().total_shares, 10.0);
    }

    #[test]
    fn test_nav_drop_gives_negative_pnl() {
        let mut ledger = PositionLedger::new();
        ledger.deposit(USER, 1, 100.0, 1.0, 7, t0()).unwrap();
        let position = ledger.position(USER, 1).unwrap();
        assert!(position.value(0.99) - position.total_invested < 0.0);
    }

    #[test]
    fn test_positions_are_isolated_per_user() {
        let mut ledger = PositionLedger::new();
        ledger.deposit("alice", 1, 10.0, 1.0, 0, t0()).unwrap();
        ledger.deposit("bob", 1, 20.0, 1.0, 0, t0()).unwrap();

        assert!(ledger.withdraw("alice", 1, 15.0, 1.0, 0.0, t0()).is_err());
        assert_eq!(ledger.positions_for("bob").len(), 1);
        assert_close(ledger.position("bob", 1).unwrap().unlocked_shares(t0()), 20.0);
    }

    #[test]
    fn test_from_positions_rederives_totals() {
        let mut ledger = PositionLedger::new();
        ledger.deposit(USER, 1, 10.0, 1.0, 0, t0()).unwrap();
        let mut stored: Vec<Position> = ledger.all_positions().into_iter().cloned().collect();
        stored[0].total_shares = 999.0;

        let rebuilt = PositionLedger::from_positions(stored);
        assert_close(rebuilt.position(USER, 1).unwrap().total_shares, 10.0);
    }

    #[test]
    fn test_quote_withdrawal_matches_withdraw() {
        let quote = quote_withdrawal(50.0, 1.0156, 1.0).unwrap();
        assert_close(quote.gross_value, 50.78);
        assert_close(quote.fee, 0.5078);
        assert_close(quote.net_value, 50.2722);
    }
}
