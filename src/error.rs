//! # error
//!
//! Centralised error types.
//!
//! The domain layers (`ledger`, `registry`, `wallet`) each return their own
//! small `thiserror` enum so callers can match on the exact rejection.  Every
//! HTTP handler returns `Result<_, AppError>`; the `From` impls below fold the
//! domain errors into it and Axum's `IntoResponse` impl turns the result into a
//! structured JSON error body, so the Mini App always gets a machine-readable
//! response even on failure.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// ─── LedgerError ──────────────────────────────────────────────────────────────

/// Local validation failures of the position ledger.
///
/// None of these are retryable: replaying the same call with the same inputs
/// fails identically.  A rejected call never mutates the ledger.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    /// Deposit amount or withdrawal shares is zero, negative or not finite.
    #[error("invalid amount: {0} (must be a positive number)")]
    InvalidAmount(f64),

    /// Deposit too small to buy more than the closing threshold of shares.
    #[error("deposit of {amount} buys only {shares:.8} shares (minimum {minimum})")]
    DepositTooSmall { amount: f64, shares: f64, minimum: f64 },

    /// NAV supplied by the caller is zero, negative or not finite.
    #[error("invalid NAV: {0} (must be a positive number)")]
    InvalidNav(f64),

    #[error("invalid exit fee: {0}% (must be within 0-100)")]
    InvalidExitFee(f64),

    /// Withdrawal asks for more than the currently unlocked shares.
    #[error("insufficient unlocked shares: requested {requested:.4}, available {available:.4}")]
    InsufficientUnlockedShares { requested: f64, available: f64 },

    /// Withdrawal against a vault the user holds nothing in.
    /// Equivalent to `InsufficientUnlockedShares` with zero available.
    #[error("no position in vault {vault_id}")]
    PositionNotFound { vault_id: u64 },
}

impl LedgerError {
    /// Shares the caller could have withdrawn instead, when the rejection is
    /// an unlocked-shares shortfall.
    pub fn available_shares(&self) -> Option<f64> {
        match self {
            LedgerError::InsufficientUnlockedShares { available, .. } => Some(*available),
            LedgerError::PositionNotFound { .. } => Some(0.0),
            _ => None,
        }
    }
}

// ─── RegistryError ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error("vault {0} not found")]
    VaultNotFound(u64),

    /// A manager-supplied vault field failed validation.
    #[error("{field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("manager not eligible: at least {required:.2} USDC required, balance is {balance:.2} USDC")]
    ManagerNotEligible { required: f64, balance: f64 },

    #[error("vault {vault_id} is not managed by {manager_address}")]
    NotVaultManager { vault_id: u64, manager_address: String },

    #[error("safety deposit of vault {vault_id} is locked until {lock_until}")]
    SafetyDepositLocked {
        vault_id: u64,
        lock_until: chrono::DateTime<chrono::Utc>,
    },

    /// Nothing left to withdraw: already withdrawn, or the vault never had one.
    #[error("safety deposit of vault {0} is not available")]
    SafetyDepositUnavailable(u64),
}

// ─── WalletError ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WalletError {
    #[error("insufficient balance: requested {requested:.2} USDC, available {available:.2} USDC")]
    InsufficientBalance { requested: f64, available: f64 },

    #[error("invalid amount: {0}")]
    InvalidAmount(f64),
}

// ─── AppError ─────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum AppError {
    /// The request payload was syntactically correct but semantically invalid.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The requested resource (vault or position) does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The request is valid but the user's holdings cannot cover it
    /// (locked shares, empty wallet).
    #[error("Rejected: {0}")]
    Rejected(String),

    /// Catch-all for unexpected failures.
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InvalidAmount(_)
            | LedgerError::DepositTooSmall { .. }
            | LedgerError::InvalidNav(_)
            | LedgerError::InvalidExitFee(_) => AppError::BadRequest(err.to_string()),
            LedgerError::InsufficientUnlockedShares { .. }
            | LedgerError::PositionNotFound { .. } => AppError::Rejected(err.to_string()),
        }
    }
}

impl From<RegistryError> for AppError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::VaultNotFound(_) => AppError::NotFound(err.to_string()),
            RegistryError::Validation { .. } => AppError::BadRequest(err.to_string()),
            RegistryError::ManagerNotEligible { .. }
            | RegistryError::NotVaultManager { .. }
            | RegistryError::SafetyDepositLocked { .. }
            | RegistryError::SafetyDepositUnavailable(_) => AppError::Rejected(err.to_string()),
        }
    }
}

impl From<WalletError> for AppError {
    fn from(err: WalletError) -> Self {
        match err {
            WalletError::InsufficientBalance { .. } => AppError::Rejected(err.to_string()),
            WalletError::InvalidAmount(_) => AppError::BadRequest(err.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Rejected(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            AppError::Internal(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Internal error: {err}"),
            ),
        };

        let body = Json(json!({
            "ok":    false,
            "error": message,
        }));

        (status, body).into_response()
    }
}
