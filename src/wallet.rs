//! # wallet — Demo Balance Book
//!
//! Spendable USDC per user.  The ledger has no idea balances exist; the
//! service checks affordability and moves money here around each buy / sell.
//!
//! Users the book has never seen start with `starting_balance` (the demo
//! wallet).

use std::collections::HashMap;

use tracing::debug;

use crate::error::WalletError;

#[derive(Debug, Clone)]
pub struct BalanceBook {
    balances: HashMap<String, f64>,
    starting_balance: f64,
}

impl BalanceBook {
    pub fn new(starting_balance: f64) -> Self {
        Self {
            balances: HashMap::new(),
            starting_balance,
        }
    }

    pub fn from_balances(starting_balance: f64, balances: HashMap<String, f64>) -> Self {
        Self { balances, starting_balance }
    }

    pub fn balance(&self, user: &str) -> f64 {
        self.balances
            .get(user)
            .copied()
            .unwrap_or(self.starting_balance)
    }

    /// Check-and-debit in one step.  Leaves the balance untouched on error.
    pub fn try_debit(&mut self, user: &str, amount: f64) -> Result<f64, WalletError> {
        if !(amount.is_finite() && amount > 0.0) {
            return Err(WalletError::InvalidAmount(amount));
        }
        let available = self.balance(user);
        if amount > available {
            return Err(WalletError::InsufficientBalance { requested: amount, available });
        }

        let remaining = available - amount;
        self.balances.insert(user.to_string(), remaining);
        debug!(user, amount, remaining, "Balance debited");
        Ok(remaining)
    }

    pub fn credit(&mut self, user: &str, amount: f64) -> Result<f64, WalletError> {
        if !(amount.is_finite() && amount >= 0.0) {
            return Err(WalletError::InvalidAmount(amount));
        }
        let balance = self.balance(user) + amount;
        self.balances.insert(user.to_string(), balance);
        debug!(user, amount, balance, "Balance credited");
        Ok(balance)
    }

    pub fn balances(&self) -> &HashMap<String, f64> {
        &self.balances
    }
}
