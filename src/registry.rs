//! # registry — Vault Registry
//!
//! Read-mostly reference data for every vault: NAV, exit fee, lockup and the
//! Discover-page metadata.  The ledger gets these values from here, one
//! snapshot per operation.
//!
//! Seeded with the four demo vaults; managers add more through
//! [`VaultRegistry::create`].  Manager-created ids start at
//! [`FIRST_MANAGED_VAULT_ID`] so they never collide with the seed set.
//!
//! Every managed vault carries the manager's [`SafetyDeposit`], locked for
//! `safety_lock_days` and refundable once through
//! [`VaultRegistry::withdraw_safety_deposit`].  The eligibility gate (minimum
//! wallet balance) and the wallet debit live in the service; the registry
//! only records the deposit.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::AppConfig;
use crate::error::RegistryError;
use crate::models::vault::{SafetyDeposit, TokenAllocation, Vault, VaultId, FIRST_MANAGED_VAULT_ID};

/// Manager address every demo vault is attributed to.
pub const DEFAULT_MANAGER_ADDRESS: &str = "0xb8cEDA3103Ed470b9a3A8A64323F4BCd36C61739";

const MIN_NAME_LEN: usize = 3;
const MAX_NAME_LEN: usize = 50;
const MIN_SYMBOL_LEN: usize = 2;
const MAX_SYMBOL_LEN: usize = 10;
const MAX_LOCKUP_DAYS: u32 = 365;
const MAX_SAFETY_DEPOSIT: f64 = 1_000_000.0;

// ─── VaultDefaults ────────────────────────────────────────────────────────────

/// Values applied to manager-created vaults when the request leaves them out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VaultDefaults {
    pub exit_fee_percent:   f64,
    pub lockup_days:        u32,
    pub min_safety_deposit: f64,
    pub safety_lock_days:   u32,
}

impl Default for VaultDefaults {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for VaultDefaults {
    fn from(config: &AppConfig) -> Self {
        Self {
            exit_fee_percent:   config.default_exit_fee,
            lockup_days:        config.default_lockup_days,
            min_safety_deposit: config.min_safety_deposit,
            safety_lock_days:   config.safety_lock_days,
        }
    }
}

// ─── CreateVault ──────────────────────────────────────────────────────────────

/// Manager request for a new vault.  Unset fields fall back to
/// [`VaultDefaults`] (NAV 1.0, symbol derived from the name).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateVault {
    pub name: String,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub manager: Option<String>,
    #[serde(default)]
    pub manager_address: Option<String>,
    #[serde(default)]
    pub strategy: String,
    #[serde(default)]
    pub exit_fee_percent: Option<f64>,
    #[serde(default)]
    pub lockup_days: Option<u32>,
    #[serde(default)]
    pub initial_nav: Option<f64>,
    /// USDC the manager locks; debited from the manager's wallet.
    #[serde(default)]
    pub safety_deposit: f64,
}

impl CreateVault {
    /// The manager's address, falling back to the demo manager.
    pub fn manager_address(&self) -> &str {
        self.manager_address
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .unwrap_or(DEFAULT_MANAGER_ADDRESS)
    }

    fn symbol(&self) -> String {
        match self.symbol.as_deref().map(str::trim) {
            Some(symbol) if !symbol.is_empty() => symbol.to_string(),
            _ => derive_symbol(&self.name),
        }
    }
}

// ─── ManagerStats ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ManagerStats {
    pub total_vaults:          usize,
    /// Vaults whose safety deposit has not been withdrawn.
    pub active_vaults:         usize,
    pub total_safety_deposits: f64,
    pub locked_deposits:       usize,
    pub available_withdrawals: usize,
}

// ─── VaultRegistry ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct VaultRegistry {
    vaults: BTreeMap<VaultId, Vault>,
    next_id: VaultId,
    defaults: VaultDefaults,
}

impl VaultRegistry {
    /// Empty registry.  Use [`VaultRegistry::with_demo_vaults`] for the seeded
    /// Discover page.
    pub fn new(defaults: VaultDefaults) -> Self {
        Self {
            vaults: BTreeMap::new(),
            next_id: FIRST_MANAGED_VAULT_ID,
            defaults,
        }
    }

    pub fn with_demo_vaults(defaults: VaultDefaults, now: DateTime<Utc>) -> Self {
        let mut registry = Self::new(defaults);
        for vault in demo_vaults(now, defaults.safety_lock_days) {
            registry.insert(vault);
        }
        registry
    }

    /// Insert (or replace) a vault, keeping the id counter ahead of any
    /// manager-created id.
    pub fn insert(&mut self, vault: Vault) {
        if vault.id >= self.next_id {
            self.next_id = vault.id + 1;
        }
        self.vaults.insert(vault.id, vault);
    }

    pub fn get(&self, id: VaultId) -> Result<&Vault, RegistryError> {
        self.vaults.get(&id).ok_or(RegistryError::VaultNotFound(id))
    }

    pub fn list(&self) -> Vec<&Vault> {
        self.vaults.values().collect()
    }

    pub fn vaults_by_manager(&self, manager_address: &str) -> Vec<&Vault> {
        self.vaults
            .values()
            .filter(|v| v.manager_address.eq_ignore_ascii_case(manager_address))
            .collect()
    }

    pub fn manager_stats(&self, manager_address: &str, now: DateTime<Utc>) -> ManagerStats {
        let vaults = self.vaults_by_manager(manager_address);
        ManagerStats {
            total_vaults:          vaults.len(),
            active_vaults:         vaults.iter().filter(|v| !v.safety_deposit.withdrawn).count(),
            total_safety_deposits: vaults.iter().map(|v| v.safety_deposit.amount).sum(),
            locked_deposits:       vaults.iter().filter(|v| v.safety_deposit.is_locked(now)).count(),
            available_withdrawals: vaults.iter().filter(|v| v.safety_deposit.can_withdraw(now)).count(),
        }
    }

    // ─── Manager Operations ───────────────────────────────────────────────────

    /// Check every field of `req` without touching the registry.
    pub fn validate(&self, req: &CreateVault) -> Result<(), RegistryError> {
        validate_name(req.name.trim())?;
        validate_symbol(&req.symbol())?;
        validate_exit_fee(req.exit_fee_percent.unwrap_or(self.defaults.exit_fee_percent))?;

        let lockup_days = req.lockup_days.unwrap_or(self.defaults.lockup_days);
        if lockup_days > MAX_LOCKUP_DAYS {
            return Err(RegistryError::Validation {
                field: "lockup_days",
                message: format!("Lockup must be at most {MAX_LOCKUP_DAYS} days"),
            });
        }

        validate_nav(req.initial_nav.unwrap_or(1.0))?;
        validate_safety_deposit(req.safety_deposit, self.defaults.min_safety_deposit)
    }

    pub fn create(&mut self, req: CreateVault, now: DateTime<Utc>) -> Result<Vault, RegistryError> {
        self.validate(&req)?;

        let nav = req.initial_nav.unwrap_or(1.0);
        let symbol = req.symbol();
        let manager_address = req.manager_address().to_string();
        let manager = req
            .manager
            .unwrap_or_else(|| short_address(&manager_address));

        let vault = Vault {
            id: self.next_id,
            name: req.name.trim().to_string(),
            symbol,
            manager,
            manager_address,
            strategy: req.strategy,
            nav,
            nav_history: vec![nav],
            exit_fee_percent: req.exit_fee_percent.unwrap_or(self.defaults.exit_fee_percent),
            lockup_days: req.lockup_days.unwrap_or(self.defaults.lockup_days),
            tvl: 0.0,
            allocation: vec![TokenAllocation { token: "USDC".into(), percentage: 100.0 }],
            safety_deposit: SafetyDeposit::new(req.safety_deposit, now, self.defaults.safety_lock_days),
            created_at: now,
        };
        self.insert(vault.clone());

        info!(
            vault_id       = vault.id,
            name           = %vault.name,
            symbol         = %vault.symbol,
            safety_deposit = vault.safety_deposit.amount,
            "🏦 Vault created"
        );
        Ok(vault)
    }

    /// Release the safety deposit of `id` to its manager.  The deposit is
    /// marked withdrawn so it pays out once; crediting
    /// `safety_deposit.amount` to `manager_address` is the caller's job.
    pub fn withdraw_safety_deposit(
        &mut self,
        id: VaultId,
        manager_address: &str,
        now: DateTime<Utc>,
    ) -> Result<Vault, RegistryError> {
        let vault = self
            .vaults
            .get_mut(&id)
            .ok_or(RegistryError::VaultNotFound(id))?;

        if !vault.manager_address.eq_ignore_ascii_case(manager_address) {
            return Err(RegistryError::NotVaultManager {
                vault_id: id,
                manager_address: manager_address.to_string(),
            });
        }
        let deposit = &mut vault.safety_deposit;
        if deposit.withdrawn || deposit.amount <= 0.0 {
            return Err(RegistryError::SafetyDepositUnavailable(id));
        }
        if deposit.is_locked(now) {
            return Err(RegistryError::SafetyDepositLocked {
                vault_id: id,
                lock_until: deposit.lock_until,
            });
        }

        deposit.withdrawn = true;
        info!(vault_id = id, amount = deposit.amount, "🔓 Safety deposit released");
        Ok(vault.clone())
    }

    /// Publish a new NAV for `id`.
    pub fn update_nav(&mut self, id: VaultId, nav: f64) -> Result<Vault, RegistryError> {
        validate_nav(nav)?;
        let vault = self
            .vaults
            .get_mut(&id)
            .ok_or(RegistryError::VaultNotFound(id))?;
        vault.record_nav(nav);

        info!(vault_id = id, nav, "📈 NAV updated");
        Ok(vault.clone())
    }

    /// Move `delta` USDC in or out of the vault's TVL (never below zero).
    pub fn adjust_tvl(&mut self, id: VaultId, delta: f64) -> Result<(), RegistryError> {
        let vault = self
            .vaults
            .get_mut(&id)
            .ok_or(RegistryError::VaultNotFound(id))?;
        vault.tvl = (vault.tvl + delta).max(0.0);
        Ok(())
    }
}

// ─── Validation ───────────────────────────────────────────────────────────────

fn validate_name(name: &str) -> Result<(), RegistryError> {
    let message = if name.is_empty() {
        "Vault name is required".to_string()
    } else if name.chars().count() < MIN_NAME_LEN {
        format!("Vault name must be at least {MIN_NAME_LEN} characters")
    } else if name.chars().count() > MAX_NAME_LEN {
        format!("Vault name must be less than {MAX_NAME_LEN} characters")
    } else {
        return Ok(());
    };
    Err(RegistryError::Validation { field: "name", message })
}

fn validate_symbol(symbol: &str) -> Result<(), RegistryError> {
    let message = if symbol.is_empty() {
        "Vault symbol is required".to_string()
    } else if symbol.len() < MIN_SYMBOL_LEN {
        format!("Vault symbol must be at least {MIN_SYMBOL_LEN} characters")
    } else if symbol.len() > MAX_SYMBOL_LEN {
        format!("Vault symbol must be at most {MAX_SYMBOL_LEN} characters")
    } else if !symbol.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()) {
        "Vault symbol must contain only uppercase letters and numbers".to_string()
    } else {
        return Ok(());
    };
    Err(RegistryError::Validation { field: "symbol", message })
}

fn validate_exit_fee(fee: f64) -> Result<(), RegistryError> {
    if fee.is_finite() && (0.0..=100.0).contains(&fee) {
        Ok(())
    } else {
        Err(RegistryError::Validation {
            field: "exit_fee_percent",
            message: format!("Exit fee must be within 0-100, got {fee}"),
        })
    }
}

fn validate_nav(nav: f64) -> Result<(), RegistryError> {
    if nav.is_finite() && nav > 0.0 {
        Ok(())
    } else {
        Err(RegistryError::Validation {
            field: "nav",
            message: format!("NAV must be a positive number, got {nav}"),
        })
    }
}

fn validate_safety_deposit(amount: f64, minimum: f64) -> Result<(), RegistryError> {
    let message = if !(amount.is_finite() && amount > 0.0) {
        "Safety deposit amount is required".to_string()
    } else if amount < minimum {
        format!("Minimum safety deposit is {minimum} USDC")
    } else if amount > MAX_SAFETY_DEPOSIT {
        "Safety deposit amount is too large".to_string()
    } else {
        return Ok(());
    };
    Err(RegistryError::Validation { field: "safety_deposit", message })
}

/// First four letters / digits of the name, upper-cased: "Basis Trade" → "BASI".
fn derive_symbol(name: &str) -> String {
    name.chars()
        .filter(char::is_ascii_alphanumeric)
        .take(4)
        .collect::<String>()
        .to_ascii_uppercase()
}

/// `0xb8cE...1739`
fn short_address(address: &str) -> String {
    if address.len() <= 10 || !address.is_ascii() {
        return address.to_string();
    }
    format!("{}...{}", &address[..6], &address[address.len() - 4..])
}

// ─── Demo Seed ────────────────────────────────────────────────────────────────

fn alloc(pairs: &[(&str, f64)]) -> Vec<TokenAllocation> {
    pairs
        .iter()
        .map(|&(token, percentage)| TokenAllocation { token: token.to_string(), percentage })
        .collect()
}

/// Demo vaults carry no safety deposit.
fn demo_vaults(now: DateTime<Utc>, safety_lock_days: u32) -> Vec<Vault> {
    let seed = |id: VaultId,
                name: &str,
                manager: &str,
                manager_address: &str,
                tvl: f64,
                allocation: Vec<TokenAllocation>,
                nav_history: &[f64]| Vault {
        id,
        name: name.to_string(),
        symbol: derive_symbol(name),
        manager: manager.to_string(),
        manager_address: manager_address.to_string(),
        strategy: String::new(),
        nav: nav_history[nav_history.len() - 1],
        nav_history: nav_history.to_vec(),
        exit_fee_percent: 1.0,
        lockup_days: 7,
        tvl,
        allocation,
        safety_deposit: SafetyDeposit::new(0.0, now, safety_lock_days),
        created_at: now,
    };

    vec![
        seed(1, "Start Fund", "whale.eth", "0x1234...5678", 9200.0,
             alloc(&[("USDC", 62.0), ("wstETH", 38.0)]),
             &[1.00, 1.01, 1.005, 1.015, 1.02, 1.018, 1.0234]),
        seed(2, "Blue Chip DeFi Vault", "defi.pro", "0xabcd...efgh", 15400.0,
             alloc(&[("WETH", 45.0), ("USDC", 35.0), ("wstETH", 20.0)]),
             &[1.00, 1.005, 1.008, 1.012, 1.014, 1.015, 1.0156]),
        seed(3, "Stable Yields Max", "yield.master", "0x9876...5432", 28600.0,
             alloc(&[("USDC", 70.0), ("DAI", 30.0)]),
             &[1.00, 1.002, 1.004, 1.006, 1.007, 1.008, 1.0087]),
        seed(4, "ETH Supremacy Fund", "eth.bull", "0x5555...6666", 6800.0,
             alloc(&[("WETH", 80.0), ("USDC", 20.0)]),
             &[1.00, 0.998, 0.995, 0.993, 0.990, 0.992, 0.9912]),
    ]
}
