use axum::Json;
use serde::Serialize;

/// Payload served at the root route.
#[derive(Serialize)]
pub struct RootResponse {
    /// Human-readable confirmation that the request was admitted.
    pub message: &'static str,
    /// Fixed status marker.
    pub status: &'static str,
}

/// Health probe payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Fixed status marker.
    pub status: &'static str,
}

/// Demo endpoint; exists to give the admission gate something to protect.
pub async fn root_handler() -> Json<RootResponse> {
    Json(RootResponse {
        message: "rategate is running",
        status: "ok",
    })
}

/// Liveness probe.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}
