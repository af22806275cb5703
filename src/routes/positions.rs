//! # routes::positions
//!
//! Per-user wallet, positions and buy / sell actions.  Each handler reads the
//! clock exactly once and hands `now` down to the service.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::{
    error::AppError,
    models::VaultId,
    service,
    state::SharedState,
};

#[derive(Debug, Deserialize)]
pub struct BuyBody {
    pub vault_id: VaultId,
    /// USDC to deposit.
    pub amount: f64,
}

#[derive(Debug, Deserialize)]
pub struct SellBody {
    pub vault_id: VaultId,
    pub shares: f64,
}

fn check_user(user: &str) -> Result<(), AppError> {
    if user.trim().is_empty() {
        return Err(AppError::BadRequest("user is required".into()));
    }
    Ok(())
}

// ─── GET /api/users/:user/balance ─────────────────────────────────────────────

pub async fn get_balance(
    State(state): State<SharedState>,
    Path(user): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    check_user(&user)?;
    let balance = state.balances.read().await.balance(&user);
    Ok(Json(json!({ "ok": true, "user": user, "balance": balance })))
}

// ─── GET /api/users/:user/positions ───────────────────────────────────────────

pub async fn get_positions(
    State(state): State<SharedState>,
    Path(user): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    check_user(&user)?;
    let now = Utc::now();
    let portfolio = service::portfolio(&state, &user, now).await;
    Ok(Json(json!({
        "ok":        true,
        "portfolio": portfolio,
        "timestamp": now,
    })))
}

// ─── GET /api/users/:user/positions/:vault_id ─────────────────────────────────

pub async fn get_position(
    State(state): State<SharedState>,
    Path((user, vault_id)): Path<(String, VaultId)>,
) -> Result<impl IntoResponse, AppError> {
    check_user(&user)?;
    let detail = service::position_detail(&state, &user, vault_id, Utc::now()).await?;
    Ok(Json(json!({ "ok": true, "position": detail })))
}

// ─── POST /api/users/:user/buy ────────────────────────────────────────────────

pub async fn buy(
    State(state): State<SharedState>,
    Path(user): Path<String>,
    Json(body): Json<BuyBody>,
) -> Result<impl IntoResponse, AppError> {
    check_user(&user)?;
    let outcome = service::buy(&state, &user, body.vault_id, body.amount, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(json!({ "ok": true, "buy": outcome }))))
}

// ─── POST /api/users/:user/sell ───────────────────────────────────────────────

pub async fn sell(
    State(state): State<SharedState>,
    Path(user): Path<String>,
    Json(body): Json<SellBody>,
) -> Result<impl IntoResponse, AppError> {
    check_user(&user)?;
    let outcome = service::sell(&state, &user, body.vault_id, body.shares, Utc::now()).await?;
    Ok(Json(json!({ "ok": true, "sell": outcome })))
}

// ─── POST /api/quote/sell ─────────────────────────────────────────────────────

/// Sell preview (gross / fee / net) — ไม่แก้ state
pub async fn quote_sell(
    State(state): State<SharedState>,
    Json(body): Json<SellBody>,
) -> Result<impl IntoResponse, AppError> {
    let quote = service::quote_sell(&state, body.vault_id, body.shares).await?;
    Ok(Json(json!({ "ok": true, "quote": quote })))
}
