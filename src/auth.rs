//! # auth — API Key Middleware
//!
//! ป้องกัน Endpoint ด้วย `X-API-Key` header
//!
//! ## Mode
//! - `API_KEY` ไม่ได้ตั้ง (หรือ empty) → **Allow All** (Dev Mode)
//! - `API_KEY` ตั้งค่า → ต้องส่ง `X-API-Key: <key>` ทุก Request
//!
//! ## ยกเว้น
//! `/health`, `GET /api/vaults*` และ `GET /api/managers/*` (Discover page เป็น public)

use axum::{
    body::Body,
    extract::Request,
    http::{Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tracing::warn;

fn is_public(method: &Method, path: &str) -> bool {
    path == "/health"
        || (method == Method::GET
            && (path.starts_with("/api/vaults") || path.starts_with("/api/managers/")))
}

/// Axum middleware — ตรวจสอบ X-API-Key header
pub async fn require_api_key(request: Request<Body>, next: Next) -> Response {
    let api_key_env = std::env::var("API_KEY").unwrap_or_default();

    // ── Dev Mode: ไม่มี API_KEY → ยอมให้ผ่านหมด ─────────────────────────────
    if api_key_env.is_empty() || is_public(request.method(), request.uri().path()) {
        return next.run(request).await;
    }

    let provided = request
        .headers()
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if provided == api_key_env {
        next.run(request).await
    } else {
        let path = request.uri().path().to_string();
        warn!(path = %path, "❌ Unauthorized request — invalid or missing X-API-Key");
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "ok":    false,
                "error": "Unauthorized: invalid or missing X-API-Key header",
            })),
        )
            .into_response()
    }
}
