//! # service — Buy / Sell Orchestration
//!
//! Wires the ledger to its collaborators.  The ledger only does bookkeeping;
//! everything around it happens here:
//!
//! ```text
//! buy(user, vault, amount)                 sell(user, vault, shares)
//!   ├─ lock (user, vault)                    ├─ lock (user, vault)
//!   ├─ registry: NAV, lockup                 ├─ registry: NAV, exit fee
//!   ├─ wallet:  try_debit(amount)            ├─ ledger:  withdraw (FIFO)
//!   ├─ ledger:  deposit  (refund on error)   ├─ wallet:  credit(net_value)
//!   ├─ activity + TVL                        ├─ activity + TVL
//!   └─ broadcast + persist                   └─ broadcast + persist
//! ```
//!
//! Opening a vault is gated on the manager's wallet: at least
//! `manager_min_balance` USDC, and the safety deposit is debited from it.
//!
//! Every function takes `now` from the caller so the whole path stays
//! deterministic under test.

use std::sync::atomic::Ordering;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{AppError, RegistryError};
use crate::events::WsEvent;
use crate::ledger::{self, DepositReceipt, WithdrawQuote, WithdrawReceipt};
use crate::models::{ActivityRecord, PositionSummary, Tranche, Vault, VaultId, VaultView};
use crate::registry::{CreateVault, ManagerStats};
use crate::state::AppState;

// ─── Outcomes ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct BuyOutcome {
    #[serde(flatten)]
    pub receipt:  DepositReceipt,
    /// Wallet balance after the debit.
    pub balance:  f64,
    pub activity: ActivityRecord,
}

#[derive(Debug, Clone, Serialize)]
pub struct SellOutcome {
    #[serde(flatten)]
    pub receipt:  WithdrawReceipt,
    /// Wallet balance after the credit.
    pub balance:  f64,
    pub activity: ActivityRecord,
}

#[derive(Debug, Clone, Serialize)]
pub struct Portfolio {
    pub user:           String,
    pub balance:        f64,
    pub positions:      Vec<PositionSummary>,
    pub total_value:    f64,
    pub total_invested: f64,
    pub total_pnl:      f64,
    pub vault_count:    usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrancheView {
    #[serde(flatten)]
    pub tranche:        Tranche,
    pub unlocked:       bool,
    pub time_to_unlock: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PositionDetail {
    pub summary:  PositionSummary,
    pub tranches: Vec<TrancheView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManagerEligibility {
    pub manager_address: String,
    pub eligible:        bool,
    pub balance:         f64,
    pub min_balance:     f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManagedVaultView {
    #[serde(flatten)]
    pub vault:                VaultView,
    pub can_withdraw_deposit: bool,
    pub days_until_unlock:    i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManagerOverview {
    pub manager_address: String,
    pub vaults:          Vec<ManagedVaultView>,
    pub stats:           ManagerStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct SafetyDepositRelease {
    pub vault_id: VaultId,
    pub amount:   f64,
    /// Manager's wallet balance after the credit.
    pub balance:  f64,
}

async fn vault_snapshot(state: &AppState, vault_id: VaultId) -> Result<Vault, AppError> {
    let registry = state.registry.read().await;
    Ok(registry.get(vault_id)?.clone())
}

// ─── Buy ──────────────────────────────────────────────────────────────────────

pub async fn buy(
    state:    &AppState,
    user:     &str,
    vault_id: VaultId,
    amount:   f64,
    now:      DateTime<Utc>,
) -> Result<BuyOutcome, AppError> {
    let _guard = state.locks.lock(user, vault_id).await;

    let vault = vault_snapshot(state, vault_id).await?;
    // Validate before touching the wallet.
    ledger::quote_deposit(amount, vault.nav, vault.lockup_days, now)?;

    let balance = state.balances.write().await.try_debit(user, amount)?;

    let deposited = state.ledger.write().await.deposit(
        user,
        vault_id,
        amount,
        vault.nav,
        vault.lockup_days,
        now,
    );
    let receipt = match deposited {
        Ok(receipt) => receipt,
        Err(err) => {
            // คืนเงินถ้า ledger ปฏิเสธ — all-or-nothing
            state.balances.write().await.credit(user, amount)?;
            return Err(err.into());
        }
    };

    if let Err(err) = state.registry.write().await.adjust_tvl(vault_id, amount) {
        warn!(vault_id, error = %err, "TVL not updated");
    }

    let activity = ActivityRecord::buy(user, vault_id, &vault.name, amount, receipt.tranche.shares, now);
    state.activity.write().await.push(activity.clone());
    state.buy_count.fetch_add(1, Ordering::Relaxed);

    info!(
        user,
        vault_id,
        amount,
        shares      = receipt.tranche.shares,
        unlock_date = %receipt.tranche.unlock_date,
        "🟢 [BUY] Bought {amount:.2} USDC of {}",
        vault.name
    );

    state.broadcast(&WsEvent::Deposited {
        activity: Box::new(activity.clone()),
        unlock_date: receipt.tranche.unlock_date,
    });
    state.persist_or_log().await;

    Ok(BuyOutcome { receipt, balance, activity })
}

// ─── Sell ─────────────────────────────────────────────────────────────────────

pub async fn sell(
    state:    &AppState,
    user:     &str,
    vault_id: VaultId,
    shares:   f64,
    now:      DateTime<Utc>,
) -> Result<SellOutcome, AppError> {
    let _guard = state.locks.lock(user, vault_id).await;

    let vault = vault_snapshot(state, vault_id).await?;
    let withdrawn = state.ledger.write().await.withdraw(
        user,
        vault_id,
        shares,
        vault.nav,
        vault.exit_fee_percent,
        now,
    );
    let receipt = withdrawn.map_err(|err| {
        if let Some(available) = err.available_shares() {
            warn!(user, vault_id, shares, available, "⛔ [SELL] Not enough unlocked shares");
        }
        err
    })?;

    let balance = state.balances.write().await.credit(user, receipt.net_value)?;

    if let Err(err) = state.registry.write().await.adjust_tvl(vault_id, -receipt.gross_value) {
        warn!(vault_id, error = %err, "TVL not updated");
    }

    let activity = ActivityRecord::sell(
        user,
        vault_id,
        &vault.name,
        shares,
        receipt.net_value,
        receipt.fee,
        now,
    );
    state.activity.write().await.push(activity.clone());
    state.sell_count.fetch_add(1, Ordering::Relaxed);

    info!(
        user,
        vault_id,
        shares,
        net_value = receipt.net_value,
        fee       = receipt.fee,
        closed    = receipt.closed,
        "🔴 [SELL] Sold {shares:.4} shares → {:.2} USDC net ({}% exit fee)",
        receipt.net_value,
        vault.exit_fee_percent
    );

    state.broadcast(&WsEvent::Withdrawn {
        activity: Box::new(activity.clone()),
        position_closed: receipt.closed,
    });
    state.persist_or_log().await;

    Ok(SellOutcome { receipt, balance, activity })
}

// ─── Read Side ────────────────────────────────────────────────────────────────

/// Sell preview for the current NAV and exit fee of `vault_id`.
pub async fn quote_sell(
    state:    &AppState,
    vault_id: VaultId,
    shares:   f64,
) -> Result<WithdrawQuote, AppError> {
    let vault = vault_snapshot(state, vault_id).await?;
    Ok(ledger::quote_withdrawal(shares, vault.nav, vault.exit_fee_percent)?)
}

pub async fn portfolio(state: &AppState, user: &str, now: DateTime<Utc>) -> Portfolio {
    let registry = state.registry.read().await;
    let ledger   = state.ledger.read().await;

    let positions: Vec<PositionSummary> = ledger
        .positions_for(user)
        .into_iter()
        .filter_map(|position| match registry.get(position.vault_id) {
            Ok(vault) => Some(position.summary(vault, now)),
            Err(_) => {
                warn!(user, vault_id = position.vault_id, "Position references unknown vault");
                None
            }
        })
        .collect();
    drop(ledger);
    drop(registry);

    let balance = state.balances.read().await.balance(user);
    let total_value: f64    = positions.iter().map(|p| p.value).sum();
    let total_invested: f64 = positions.iter().map(|p| p.total_invested).sum();

    Portfolio {
        user: user.to_string(),
        balance,
        vault_count: positions.len(),
        total_pnl: total_value - total_invested,
        total_value,
        total_invested,
        positions,
    }
}

pub async fn position_detail(
    state:    &AppState,
    user:     &str,
    vault_id: VaultId,
    now:      DateTime<Utc>,
) -> Result<PositionDetail, AppError> {
    let vault = vault_snapshot(state, vault_id).await?;
    let ledger = state.ledger.read().await;
    let position = ledger
        .position(user, vault_id)
        .ok_or_else(|| AppError::NotFound(format!("no position in vault {vault_id}")))?;

    let tranches = position
        .tranches
        .iter()
        .map(|t| TrancheView {
            tranche:        t.clone(),
            unlocked:       t.is_unlocked(now),
            time_to_unlock: t.time_to_unlock(now),
        })
        .collect();

    Ok(PositionDetail {
        summary: position.summary(&vault, now),
        tranches,
    })
}

pub async fn activity(state: &AppState, user: &str) -> Vec<ActivityRecord> {
    state.activity.read().await.for_user(user)
}

// ─── Manager Side ─────────────────────────────────────────────────────────────

pub async fn manager_eligibility(state: &AppState, manager_address: &str) -> ManagerEligibility {
    let balance = state.balances.read().await.balance(manager_address);
    let min_balance = state.config.manager_min_balance;
    ManagerEligibility {
        manager_address: manager_address.to_string(),
        eligible: balance >= min_balance,
        balance,
        min_balance,
    }
}

/// Open a new vault.  Validation, the eligibility gate and the safety deposit
/// debit all happen before the registry is touched; if the registry still
/// rejects, the deposit is refunded.
pub async fn create_vault(
    state: &AppState,
    req:   CreateVault,
    now:   DateTime<Utc>,
) -> Result<Vault, AppError> {
    state.registry.read().await.validate(&req)?;

    let manager_address = req.manager_address().to_string();
    let deposit = req.safety_deposit;
    {
        // Check and debit under one guard.
        let mut balances = state.balances.write().await;
        let balance = balances.balance(&manager_address);
        let required = state.config.manager_min_balance;
        if balance < required {
            warn!(manager = %manager_address, balance, required, "⛔ [VAULT] Manager not eligible");
            return Err(RegistryError::ManagerNotEligible { required, balance }.into());
        }
        balances.try_debit(&manager_address, deposit)?;
    }

    let created = state.registry.write().await.create(req, now);
    let vault = match created {
        Ok(vault) => vault,
        Err(err) => {
            state.balances.write().await.credit(&manager_address, deposit)?;
            return Err(err.into());
        }
    };

    state.broadcast(&WsEvent::VaultCreated { vault: Box::new(vault.clone()) });
    state.persist_or_log().await;
    Ok(vault)
}

/// Return a vault's safety deposit to its manager once the lock has passed.
pub async fn withdraw_safety_deposit(
    state:           &AppState,
    vault_id:        VaultId,
    manager_address: &str,
    now:             DateTime<Utc>,
) -> Result<SafetyDepositRelease, AppError> {
    let vault = state
        .registry
        .write()
        .await
        .withdraw_safety_deposit(vault_id, manager_address, now)?;

    let amount = vault.safety_deposit.amount;
    let balance = state
        .balances
        .write()
        .await
        .credit(&vault.manager_address, amount)?;

    state.broadcast(&WsEvent::SafetyDepositReleased { vault_id, amount });
    state.persist_or_log().await;
    Ok(SafetyDepositRelease { vault_id, amount, balance })
}

/// A manager's vaults with their safety-deposit status, plus totals.
pub async fn manager_overview(
    state:           &AppState,
    manager_address: &str,
    now:             DateTime<Utc>,
) -> ManagerOverview {
    let registry = state.registry.read().await;
    let vaults = registry
        .vaults_by_manager(manager_address)
        .into_iter()
        .map(|vault| ManagedVaultView {
            can_withdraw_deposit: vault.safety_deposit.can_withdraw(now),
            days_until_unlock:    vault.safety_deposit.days_until_unlock(now),
            vault:                VaultView::from(vault),
        })
        .collect();

    ManagerOverview {
        manager_address: manager_address.to_string(),
        vaults,
        stats: registry.manager_stats(manager_address, now),
    }
}

pub async fn update_nav(state: &AppState, vault_id: VaultId, nav: f64) -> Result<Vault, AppError> {
    let vault = state.registry.write().await.update_nav(vault_id, nav)?;
    state.broadcast(&WsEvent::NavUpdated { vault_id, nav: vault.nav });
    state.persist_or_log().await;
    Ok(vault)
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;

    use crate::config::AppConfig;
    use crate::registry::DEFAULT_MANAGER_ADDRESS;
    use crate::store::JsonStore;
    use chrono::{Duration, TimeZone};

    fn state() -> AppState {
        AppState::new(AppConfig::default())
    }

    fn temp_snapshot_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("covault-service-{}", uuid::Uuid::new_v4()))
            .join("covault.json")
    }

    fn persisted_config(path: &PathBuf) -> AppConfig {
        AppConfig {
            store_path: Some(path.clone()),
            ..AppConfig::default()
        }
    }

    async fn cleanup(path: &PathBuf) {
        if let Some(dir) = path.parent() {
            let _ = tokio::fs::remove_dir_all(dir).await;
        }
    }

    fn vault_request(name: &str, safety_deposit: f64) -> CreateVault {
        CreateVault {
            name: name.into(),
            strategy: "ETH basis".into(),
            safety_deposit,
            ..Default::default()
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!((actual - expected).abs() < 1e-6, "expected {expected}, got {actual}");
    }

    #[tokio::test]
    async fn test_buy_debits_wallet_and_records_activity() {
        let state = state();
        let mut rx = state.broadcast_tx.subscribe();

        let outcome = buy(&state, "alice", 1, 100.0, t0()).await.unwrap();
        assert_close(outcome.balance, 140.0);
        assert_close(outcome.receipt.tranche.shares, 100.0 / 1.0234);
        assert_eq!(outcome.receipt.tranche.unlock_date, t0() + Duration::days(7));

        assert_eq!(activity(&state, "alice").await.len(), 1);
        assert_close(state.registry.read().await.get(1).unwrap().tvl, 9300.0);

        let event: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(event["event"], "DEPOSITED");
    }

    #[tokio::test]
    async fn test_buy_over_balance_is_rejected_untouched() {
        let state = state();
        let err = buy(&state, "alice", 1, 240.01, t0()).await.unwrap_err();
        assert!(matches!(err, AppError::Rejected(_)));

        assert_eq!(state.balances.read().await.balance("alice"), 240.0);
        assert!(state.ledger.read().await.position("alice", 1).is_none());
        assert!(activity(&state, "alice").await.is_empty());
    }

    #[tokio::test]
    async fn test_buy_invalid_amount_and_unknown_vault() {
        let state = state();
        assert!(matches!(
            buy(&state, "alice", 1, 0.0, t0()).await,
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            buy(&state, "alice", 42, 10.0, t0()).await,
            Err(AppError::NotFound(_))
        ));
        assert_eq!(state.balances.read().await.balance("alice"), 240.0);
    }

    #[tokio::test]
    async fn test_sell_before_unlock_is_rejected() {
        let state = state();
        let bought = buy(&state, "alice", 2, 50.0, t0()).await.unwrap();

        let err = sell(&state, "alice", 2, bought.receipt.tranche.shares, t0() + Duration::days(1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Rejected(_)));
        assert_close(state.balances.read().await.balance("alice"), 190.0);
    }

    #[tokio::test]
    async fn test_sell_after_unlock_credits_net_value() {
        let state = state();
        let bought = buy(&state, "alice", 3, 100.0, t0()).await.unwrap();
        let later = t0() + Duration::days(7);

        let sold = sell(&state, "alice", 3, bought.receipt.tranche.shares, later).await.unwrap();
        assert_close(sold.receipt.gross_value, 100.0);
        assert_close(sold.receipt.fee, 1.0);
        assert_close(sold.balance, 239.0);
        assert!(sold.receipt.closed);

        let records = activity(&state, "alice").await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind, crate::models::activity::ActivityKind::Sell);
        assert!(portfolio(&state, "alice", later).await.positions.is_empty());
    }

    #[tokio::test]
    async fn test_portfolio_values_positions_at_current_nav() {
        let state = state();
        buy(&state, "alice", 4, 99.12, t0()).await.unwrap();
        update_nav(&state, 4, 0.9).await.unwrap();

        let portfolio = portfolio(&state, "alice", t0()).await;
        assert_eq!(portfolio.vault_count, 1);
        assert_close(portfolio.total_value, 90.0);
        assert!(portfolio.total_pnl < 0.0);
        assert_eq!(portfolio.positions[0].unlocked_shares, 0.0);
        assert_eq!(portfolio.positions[0].unlock_status, "Unlocks in 7d 0h");
    }

    #[tokio::test]
    async fn test_position_detail_lists_tranches() {
        let state = state();
        buy(&state, "alice", 1, 10.0, t0()).await.unwrap();
        buy(&state, "alice", 1, 20.0, t0() + Duration::days(3)).await.unwrap();

        let detail = position_detail(&state, "alice", 1, t0() + Duration::days(8)).await.unwrap();
        assert_eq!(detail.tranches.len(), 2);
        assert!(detail.tranches[0].unlocked);
        assert!(!detail.tranches[1].unlocked);
        assert_eq!(detail.tranches[1].time_to_unlock, "in 2d 0h");

        assert!(matches!(
            position_detail(&state, "bob", 1, t0()).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_buys_do_not_lose_updates() {
        let state = std::sync::Arc::new(state());
        let mut handles = Vec::new();
        for _ in 0..20 {
            let state = state.clone();
            handles.push(tokio::spawn(async move {
                buy(&state, "alice", 1, 10.0, t0()).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let ledger = state.ledger.read().await;
        let position = ledger.position("alice", 1).unwrap();
        assert_eq!(position.tranches.len(), 20);
        assert_close(position.total_invested, 200.0);
        assert_close(state.balances.read().await.balance("alice"), 40.0);
    }

    #[tokio::test]
    async fn test_quote_sell_uses_vault_fee() {
        let state = state();
        let quote = quote_sell(&state, 2, 10.0).await.unwrap();
        assert_close(quote.gross_value, 10.156);
        assert_close(quote.net_value, 10.156 * 0.99);
    }

    #[tokio::test]
    async fn test_rejected_sell_leaves_state_untouched() {
        let state = state();
        let bought = buy(&state, "alice", 1, 40.0, t0()).await.unwrap();
        let later = t0() + Duration::days(7);

        let err = sell(&state, "alice", 1, bought.receipt.tranche.shares * 2.0, later)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Rejected(_)));

        assert_close(state.balances.read().await.balance("alice"), 200.0);
        assert_eq!(activity(&state, "alice").await.len(), 1);
        assert_eq!(state.sell_count.load(Ordering::Relaxed), 0);
        let ledger = state.ledger.read().await;
        assert_eq!(ledger.position("alice", 1).unwrap(), &bought.receipt.position);
    }

    #[tokio::test]
    async fn test_buy_and_sell_survive_reload() {
        let path = temp_snapshot_path();
        let state = AppState::new(persisted_config(&path));

        let bought = buy(&state, "alice", 2, 100.0, t0()).await.unwrap();
        let later = t0() + Duration::days(7);
        let half = bought.receipt.tranche.shares / 2.0;
        let sold = sell(&state, "alice", 2, half, later).await.unwrap();
        assert!(!sold.receipt.closed);

        let snapshot = JsonStore::new(path.clone()).load().await.unwrap().unwrap();
        let restored = AppState::from_snapshot(persisted_config(&path), snapshot);

        let ledger = restored.ledger.read().await;
        let position = ledger.position("alice", 2).unwrap();
        assert_close(position.total_shares, half);
        assert_close(position.remaining_cost_basis(), 50.0);
        assert_close(position.total_withdrawn, sold.receipt.net_value);
        drop(ledger);

        assert_close(restored.balances.read().await.balance("alice"), sold.balance);
        let records = activity(&restored, "alice").await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind, crate::models::activity::ActivityKind::Sell);

        cleanup(&path).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_buys_are_all_persisted() {
        let path = temp_snapshot_path();
        let state = Arc::new(AppState::new(persisted_config(&path)));

        let mut handles = Vec::new();
        for i in 0..32 {
            let state = state.clone();
            handles.push(tokio::spawn(async move {
                let user = format!("user-{i}");
                buy(&state, &user, 1 + (i % 4), 10.0, t0()).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let snapshot = JsonStore::new(path.clone()).load().await.unwrap().unwrap();
        assert_eq!(snapshot.positions.len(), state.ledger.read().await.len());
        assert_eq!(snapshot.positions.len(), 32);
        assert_eq!(snapshot.balances.len(), 32);
        assert_eq!(snapshot.activity.len(), 32);

        cleanup(&path).await;
    }

    #[tokio::test]
    async fn test_create_vault_requires_eligible_manager() {
        let state = state();
        let eligibility = manager_eligibility(&state, DEFAULT_MANAGER_ADDRESS).await;
        assert!(!eligibility.eligible);
        assert_eq!(eligibility.min_balance, 500.0);

        let err = create_vault(&state, vault_request("Basis Trade", 200.0), t0())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Rejected(_)));
        assert_eq!(state.registry.read().await.list().len(), 4);
        assert_eq!(state.balances.read().await.balance(DEFAULT_MANAGER_ADDRESS), 240.0);
    }

    #[tokio::test]
    async fn test_safety_deposit_is_debited_and_released_after_lock() {
        let state = AppState::new(AppConfig {
            starting_balance: 1_000.0,
            ..AppConfig::default()
        });

        let invalid = create_vault(&state, vault_request("Basis Trade", 50.0), t0()).await;
        assert!(matches!(invalid, Err(AppError::BadRequest(_))));
        assert_eq!(state.balances.read().await.balance(DEFAULT_MANAGER_ADDRESS), 1_000.0);

        let vault = create_vault(&state, vault_request("Basis Trade", 250.0), t0()).await.unwrap();
        assert_eq!(vault.symbol, "BASI");
        assert_close(state.balances.read().await.balance(DEFAULT_MANAGER_ADDRESS), 750.0);

        let overview = manager_overview(&state, DEFAULT_MANAGER_ADDRESS, t0()).await;
        assert_eq!(overview.vaults.len(), 1);
        assert!(!overview.vaults[0].can_withdraw_deposit);
        assert_eq!(overview.vaults[0].days_until_unlock, 90);
        assert_eq!(overview.stats.locked_deposits, 1);

        let early = withdraw_safety_deposit(&state, vault.id, DEFAULT_MANAGER_ADDRESS, t0() + Duration::days(30)).await;
        assert!(matches!(early, Err(AppError::Rejected(_))));

        let later = t0() + Duration::days(90);
        let release = withdraw_safety_deposit(&state, vault.id, DEFAULT_MANAGER_ADDRESS, later)
            .await
            .unwrap();
        assert_close(release.amount, 250.0);
        assert_close(release.balance, 1_000.0);

        let again = withdraw_safety_deposit(&state, vault.id, DEFAULT_MANAGER_ADDRESS, later).await;
        assert!(matches!(again, Err(AppError::Rejected(_))));
        assert_eq!(manager_overview(&state, DEFAULT_MANAGER_ADDRESS, later).await.stats.active_vaults, 0);
    }
}
