use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::api::ApiResponse;
use crate::state::AppState;

/// Backend status / 后端状态
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub backend: String,
    pub ready: bool,
    pub index: String,
    pub version: String,
    pub build_time: String,
}

/// GET /api/health - 健康检查
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<ApiResponse<HealthStatus>> {
    let ready = match state.backend.ping().await {
        Ok(ready) => ready,
        Err(e) => {
            tracing::warn!("Health ping failed: {}", e);
            false
        }
    };

    Json(ApiResponse::success(HealthStatus {
        backend: state.backend.name().to_string(),
        ready,
        index: state.config.catalog.index_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        build_time: env!("BUILD_TIME").to_string(),
    }))
}
