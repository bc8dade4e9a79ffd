use axum::{extract::State, routing::get, Json, Router};
use tracing::warn;

use crate::models::{AppState, HealthResponse};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/health", get(health_check))
        .with_state(state)
}

/// Always 200; a failing database shows up in the `database` field.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = match state.registry.ping().await {
        Ok(()) => "connected",
        Err(e) => {
            warn!(error = %e, "Health check could not reach the database");
            "unavailable"
        }
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        database: database.to_string(),
    })
}
