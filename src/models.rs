use std::sync::Arc;

use crate::config::Config;
use crate::llm::ProviderClients;
use crate::pipeline::{PipelineSettings, QaPipeline};
use crate::registry::DocumentRegistry;
use crate::storage::Storage;
use crate::types::AppResult;

/// Collaborators built once at startup and shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<dyn DocumentRegistry>,
    pub storage: Arc<Storage>,
    pub pipeline: Arc<QaPipeline>,
}

impl AppState {
    pub fn new(
        config: Config,
        registry: Arc<dyn DocumentRegistry>,
        clients: ProviderClients,
    ) -> AppResult<Self> {
        let settings = PipelineSettings::from_config(&config)?;
        let storage = Arc::new(Storage::new(
            config.storage.upload_dir.clone(),
            config.storage.max_file_size,
        ));
        let pipeline = Arc::new(QaPipeline::new(
            settings,
            registry.clone(),
            clients.embedder,
            clients.llm,
        ));

        Ok(Self {
            config: Arc::new(config),
            registry,
            storage,
            pipeline,
        })
    }
}

/// Whether a document's vector index snapshot is usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexStatus {
    Pending,
    Indexed,
    Failed,
}

impl IndexStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexStatus::Pending => "pending",
            IndexStatus::Indexed => "indexed",
            IndexStatus::Failed => "failed",
        }
    }
}

impl TryFrom<String> for IndexStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "pending" => Ok(IndexStatus::Pending),
            "indexed" => Ok(IndexStatus::Indexed),
            "failed" => Ok(IndexStatus::Failed),
            other => Err(format!("unknown index status: {}", other)),
        }
    }
}

// Note: FromRow is needed for runtime query_as (without DATABASE_URL at compile time)

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize, sqlx::FromRow)]
pub struct Document {
    pub id: i64,
    pub filename: String,
    pub file_path: String,
    #[sqlx(try_from = "String")]
    pub index_status: IndexStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDocument {
    pub filename: String,
    pub file_path: String,
}

// API Request/Response types

#[derive(Debug, serde::Deserialize)]
pub struct QuestionRequest {
    pub document_id: i64,
    pub question: String,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct QuestionResponse {
    pub question: String,
    pub answer: String,
    pub document_id: i64,
}

#[derive(Debug, serde::Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub database: String,
}
