//! # Covault — Co-Investment Vault Backend
//!
//! ```text
//!  ┌─────────────┐  GET  /api/vaults           ┌──────────────────────────────┐
//!  │  Mini App   │  POST /api/users/:u/buy     │ AppState                     │
//!  │  (Discover, │ ──────────────────────────▶ │ ├─ registry   (NAV, fee, lock)│
//!  │  My Vaults) │  POST /api/users/:u/sell    │ ├─ ledger     (tranches) 📒   │
//!  └─────────────┘                             │ ├─ balances   (demo USDC)     │
//!                                              │ ├─ activity                   │
//!  ┌─────────────┐  POST /api/vaults           │ ├─ store ──▶ data/*.json 💾   │
//!  │  Manager    │ ──────────────────────────▶ │ └─ broadcast_tx ────────────┐ │
//!  └─────────────┘  POST /api/vaults/:id/nav   └─────────────────────────────┘ │
//!                                                                              │
//!  ┌─────────────┐  ws://host/ws/activity  ◀───────────────────────────────────┘
//!  │  Dashboard  │
//!  └─────────────┘
//! ```

use axum::Router;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod auth;
mod config;
mod error;
mod events;
mod ledger;
mod models;
mod registry;
mod routes;
mod service;
mod state;
mod store;
mod wallet;

use config::AppConfig;
use state::build_state;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Load .env ──────────────────────────────────────────────────────────
    dotenvy::dotenv().ok();

    // ── 2. Structured logging ─────────────────────────────────────────────────
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive("covault=debug".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();

    info!(r#"

  ╔═══════════════════════════════════════════════════════╗
  ║           COVAULT — Co-Investment Vaults              ║
  ║  Registry · Ledger · Lockups · NAV · Activity         ║
  ╚═══════════════════════════════════════════════════════╝"#);

    // ── 3. Config & shared state ──────────────────────────────────────────────
    let config = AppConfig::from_env()?;
    let addr = config.bind_addr;
    let state = build_state(config).await?;

    // ── 4. CORS ───────────────────────────────────────────────────────────────
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // ── 5. Router ─────────────────────────────────────────────────────────────
    let app: Router = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // ── 6. Bind & Serve ───────────────────────────────────────────────────────
    info!(?addr, "🚀 Covault server starting");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
