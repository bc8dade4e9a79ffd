//! API Routes
//!
//! - `/api/documents` - Upload, list, fetch and reprocess documents
//! - `/api/question` - Ask a question about one document
//! - `/health` - Liveness and database connectivity

pub mod documents;
pub mod health;
pub mod question;

use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::middleware::cors_layer;
use crate::models::AppState;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    info!("Creating application router");

    let cors = cors_layer(&state.config.server.cors_allowed_origins);

    Router::new()
        .merge(documents::router(state.clone()))
        .merge(question::router(state.clone()))
        .merge(health::router(state))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
