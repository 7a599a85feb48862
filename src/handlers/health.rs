use axum::{Json, response::IntoResponse};

// liveness
pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "message": "audit gateway is running",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}
