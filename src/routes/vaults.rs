//! # routes::vaults
//!
//! Discover page and manager endpoints
//!
//! | Method | Path                     | Description                  |
//! |--------|--------------------------|------------------------------|
//! | GET    | `/api/vaults`            | ทุก Vault + performance      |
//! | POST   | `/api/vaults`            | Manager สร้าง Vault ใหม่      |
//! | GET    | `/api/vaults/:id`        | Vault เดียว                   |
//! | POST   | `/api/vaults/:id/nav`    | อัปเดต NAV                    |
//! | POST   | `/api/vaults/:id/safety-deposit/withdraw` | ถอน safety deposit หลังครบ lock |
//! | GET    | `/api/managers/:address/vaults` | Vault ของ Manager + stats |
//! | GET    | `/api/managers/:address/eligibility` | ยอด USDC ถึงเกณฑ์สร้าง Vault ไหม |

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
    models::{VaultId, VaultView},
    registry::CreateVault,
    service,
    state::SharedState,
};

#[derive(Debug, Deserialize)]
pub struct NavBody {
    pub nav: f64,
}

#[derive(Debug, Deserialize)]
pub struct SafetyDepositBody {
    pub manager_address: String,
}

/// GET /api/vaults
pub async fn list_vaults(State(state): State<SharedState>) -> impl IntoResponse {
    let registry = state.registry.read().await;
    let vaults: Vec<VaultView> = registry.list().into_iter().map(VaultView::from).collect();

    Json(json!({
        "ok":     true,
        "count":  vaults.len(),
        "vaults": vaults,
    }))
}

/// GET /api/vaults/:id
pub async fn get_vault(
    State(state): State<SharedState>,
    Path(id): Path<VaultId>,
) -> Result<impl IntoResponse, AppError> {
    let registry = state.registry.read().await;
    let vault = VaultView::from(registry.get(id)?);
    Ok(Json(json!({ "ok": true, "vault": vault })))
}

/// POST /api/vaults — Manager สร้าง Vault
pub async fn create_vault(
    State(state): State<SharedState>,
    Json(req): Json<CreateVault>,
) -> Result<impl IntoResponse, AppError> {
    let vault = service::create_vault(&state, req, Utc::now()).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "ok": true, "vault": VaultView::from(&vault) })),
    ))
}

/// POST /api/vaults/:id/nav
pub async fn update_nav(
    State(state): State<SharedState>,
    Path(id): Path<VaultId>,
    Json(body): Json<NavBody>,
) -> Result<impl IntoResponse, AppError> {
    let vault = service::update_nav(&state, id, body.nav).await?;
    Ok(Json(json!({ "ok": true, "vault": VaultView::from(&vault) })))
}

/// POST /api/vaults/:id/safety-deposit/withdraw
pub async fn withdraw_safety_deposit(
    State(state): State<SharedState>,
    Path(id): Path<VaultId>,
    Json(body): Json<SafetyDepositBody>,
) -> Result<impl IntoResponse, AppError> {
    let release = service::withdraw_safety_deposit(&state, id, body.manager_address.trim(), Utc::now()).await?;
    Ok(Json(json!({ "ok": true, "release": release })))
}

/// GET /api/managers/:address/vaults
pub async fn manager_vaults(
    State(state): State<SharedState>,
    Path(address): Path<String>,
) -> impl IntoResponse {
    let overview = service::manager_overview(&state, &address, Utc::now()).await;
    Json(json!({
        "ok":      true,
        "count":   overview.vaults.len(),
        "manager": overview,
    }))
}

/// GET /api/managers/:address/eligibility
pub async fn manager_eligibility(
    State(state): State<SharedState>,
    Path(address): Path<String>,
) -> impl IntoResponse {
    let eligibility = service::manager_eligibility(&state, &address).await;
    Json(json!({ "ok": true, "eligibility": eligibility }))
}
