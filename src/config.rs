//! # config — อ่าน Config จาก Environment Variables
//!
//! | Variable              | Default               | Meaning                                  |
//! |-----------------------|-----------------------|------------------------------------------|
//! | `BIND_ADDR`           | `0.0.0.0:3000`        | HTTP listen address                      |
//! | `STORE_PATH`          | `data/covault.json`   | JSON snapshot file (empty = in-memory)   |
//! | `STARTING_BALANCE`    | `240`                 | Demo wallet USDC for first-time users    |
//! | `DEFAULT_EXIT_FEE`    | `1.0`                 | Exit fee % for manager-created vaults    |
//! | `DEFAULT_LOCKUP_DAYS` | `7`                   | Lockup for manager-created vaults        |
//! | `BROADCAST_CAPACITY`  | `256`                 | WebSocket event buffer                   |
//! | `MANAGER_MIN_BALANCE` | `500`                 | Wallet USDC a manager needs to open a vault |
//! | `MIN_SAFETY_DEPOSIT`  | `200`                 | Smallest safety deposit per vault        |
//! | `SAFETY_LOCK_DAYS`    | `90`                  | Lock on a manager's safety deposit       |
//!
//! `API_KEY` is read per request by [`crate::auth`].

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{bail, Context};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr:           SocketAddr,
    /// None = ไม่ persist (state หายเมื่อ restart)
    pub store_path:          Option<PathBuf>,
    pub starting_balance:    f64,
    pub default_exit_fee:    f64,
    pub default_lockup_days: u32,
    pub broadcast_capacity:  usize,
    pub manager_min_balance: f64,
    pub min_safety_deposit:  f64,
    pub safety_lock_days:    u32,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let bind_addr: SocketAddr = std::env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
            .parse()
            .context("BIND_ADDR must be a socket address like 0.0.0.0:3000")?;

        let store_path = match std::env::var("STORE_PATH") {
            Ok(path) if path.trim().is_empty() => None,
            Ok(path) => Some(PathBuf::from(path)),
            Err(_) => Some(PathBuf::from("data/covault.json")),
        };

        let starting_balance = env_f64("STARTING_BALANCE", 240.0)?;
        if starting_balance < 0.0 {
            bail!("STARTING_BALANCE must not be negative, got {starting_balance}");
        }

        let default_exit_fee = env_f64("DEFAULT_EXIT_FEE", 1.0)?;
        if !(0.0..=100.0).contains(&default_exit_fee) {
            bail!("DEFAULT_EXIT_FEE must be within 0-100, got {default_exit_fee}");
        }

        let manager_min_balance = env_f64("MANAGER_MIN_BALANCE", 500.0)?;
        let min_safety_deposit = env_f64("MIN_SAFETY_DEPOSIT", 200.0)?;
        if manager_min_balance < 0.0 || min_safety_deposit <= 0.0 {
            bail!("MANAGER_MIN_BALANCE must not be negative and MIN_SAFETY_DEPOSIT must be positive");
        }

        Ok(Self {
            bind_addr,
            store_path,
            starting_balance,
            default_exit_fee,
            default_lockup_days: env_parse("DEFAULT_LOCKUP_DAYS", 7)?,
            broadcast_capacity:  env_parse("BROADCAST_CAPACITY", 256)?,
            manager_min_balance,
            min_safety_deposit,
            safety_lock_days:    env_parse("SAFETY_LOCK_DAYS", 90)?,
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr:           SocketAddr::from(([0, 0, 0, 0], 3000)),
            store_path:          None,
            starting_balance:    240.0,
            default_exit_fee:    1.0,
            default_lockup_days: 7,
            broadcast_capacity:  256,
            manager_min_balance: 500.0,
            min_safety_deposit:  200.0,
            safety_lock_days:    90,
        }
    }
}

fn env_parse<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: '{raw}'")),
        Err(_) => Ok(default),
    }
}

fn env_f64(key: &str, default: f64) -> anyhow::Result<f64> {
    let value: f64 = env_parse(key, default)?;
    if !value.is_finite() {
        bail!("{key} must be a finite number");
    }
    Ok(value)
}
