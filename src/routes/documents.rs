use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    routing::{get, post},
    Json, Router,
};
use tracing::{info, warn};

use crate::models::{AppState, Document, NewDocument};
use crate::storage::{client_file_name, Storage};
use crate::types::{AppError, AppResult};

const FILE_FIELD: &str = "file";

pub fn router(state: AppState) -> Router {
    Router::new()
        // the size ceiling is enforced while streaming the field instead
        .route(
            "/api/documents/upload",
            post(upload_document).layer(DefaultBodyLimit::disable()),
        )
        .route("/api/documents", get(list_documents))
        .route("/api/documents/{id}", get(get_document))
        .route("/api/documents/{id}/process", post(process_document))
        .with_state(state)
}

/// Stores the `file` field, registers it and starts indexing in the background.
async fn upload_document(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Json<Document>> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidRequest(format!("malformed multipart body: {}", e)))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field
            .file_name()
            .map(|name| client_file_name(name).to_string())
            .ok_or_else(|| AppError::InvalidRequest("file field has no filename".to_string()))?;
        Storage::validate_filename(&filename)?;

        let limit = state.storage.max_file_size();
        let mut content = Vec::new();
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| AppError::InvalidRequest(format!("failed to read upload: {}", e)))?
        {
            if (content.len() + chunk.len()) as u64 > limit {
                warn!(filename = %filename, limit, "Upload exceeds size limit");
                return Err(AppError::FileTooLarge { limit });
            }
            content.extend_from_slice(&chunk);
        }

        let path = state.storage.save_upload(&filename, &content).await?;
        let document = match state
            .registry
            .create(NewDocument {
                filename,
                file_path: path.to_string_lossy().into_owned(),
            })
            .await
        {
            Ok(document) => document,
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(&path).await {
                    warn!(path = %path.display(), error = %cleanup, "Could not remove unregistered upload");
                }
                return Err(e);
            }
        };

        info!(document_id = document.id, filename = %document.filename, "Upload accepted, indexing");
        state.pipeline.spawn_processing(document.id);
        return Ok(Json(document));
    }

    Err(AppError::InvalidRequest(format!(
        "missing multipart field '{}'",
        FILE_FIELD
    )))
}

async fn list_documents(State(state): State<AppState>) -> AppResult<Json<Vec<Document>>> {
    Ok(Json(state.registry.list().await?))
}

async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Document>> {
    state
        .registry
        .get(id)
        .await?
        .map(Json)
        .ok_or(AppError::DocumentNotFound(id))
}

/// Synchronously rebuilds the document's index.
async fn process_document(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Document>> {
    info!(document_id = id, "Reprocessing requested");
    Ok(Json(state.pipeline.process_document(id).await?))
}
