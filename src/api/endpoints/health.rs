//! Health check endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::core_state::AppContext;
use crate::hardware::InferenceDevice;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub device: InferenceDevice,
    pub top_k: usize,
}

/// `GET /api/health`: liveness plus the static inference setup.
pub async fn check(State(ctx): State<Arc<AppContext>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: crate::config::APP_VERSION,
        device: ctx.device(),
        top_k: ctx.pipeline().reducer().top_k(),
    })
}
