//! HTTP surface of the vault service.

pub mod activity;
pub mod positions;
pub mod vaults;

use axum::{
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use crate::{auth::require_api_key, state::SharedState};

/// GET /health
pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "ok": true, "service": "covault" }))
}

/// All routes plus the API-key middleware.  Tracing and CORS layers are added
/// by `main`.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/health",                                 get(health_check))
        // ── Discover / Manager ────────────────────────────────────────────────
        .route("/api/vaults",                             get(vaults::list_vaults).post(vaults::create_vault))
        .route("/api/vaults/:id",                         get(vaults::get_vault))
        .route("/api/vaults/:id/nav",                     post(vaults::update_nav))
        .route("/api/vaults/:id/safety-deposit/withdraw",  post(vaults::withdraw_safety_deposit))
        .route("/api/managers/:address/vaults",           get(vaults::manager_vaults))
        .route("/api/managers/:address/eligibility",      get(vaults::manager_eligibility))
        // ── Wallet & Positions ────────────────────────────────────────────────
        .route("/api/users/:user/balance",                get(positions::get_balance))
        .route("/api/users/:user/positions",              get(positions::get_positions))
        .route("/api/users/:user/positions/:vault_id",    get(positions::get_position))
        .route("/api/users/:user/buy",                    post(positions::buy))
        .route("/api/users/:user/sell",                   post(positions::sell))
        .route("/api/quote/sell",                         post(positions::quote_sell))
        // ── Activity / Monitor ────────────────────────────────────────────────
        .route("/api/users/:user/activity",               get(activity::get_activity))
        .route("/api/stats",                              get(activity::get_stats))
        .route("/ws/activity",                            get(activity::ws_activity))
        .layer(axum::middleware::from_fn(require_api_key))
        .with_state(state)
}
