// Type definitions, LLM wire types and the crate error type

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LLMProvider {
    Google,
    OpenAI,
}

impl LLMProvider {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "google" | "gemini" => Some(LLMProvider::Google),
            "openai" => Some(LLMProvider::OpenAI),
            _ => None,
        }
    }
}

impl std::fmt::Display for LLMProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LLMProvider::Google => write!(f, "google"),
            LLMProvider::OpenAI => write!(f, "openai"),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LLMRequest {
    pub model: String,
    pub messages: Vec<LLMMessage>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub system_instruction: Option<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LLMMessage {
    pub role: String, // "user", "assistant", "system"
    pub content: String,
}

impl LLMMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LLMResponse {
    pub content: String,
    pub finish_reason: String,
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Only PDF files are allowed (got {0:?})")]
    InvalidFileType(String),

    #[error("File size exceeded maximum limit of {limit} bytes")]
    FileTooLarge { limit: u64 },

    #[error("Could not save file: {0}")]
    StorageWriteFailed(String),

    #[error("Error extracting text from PDF: {0}")]
    ExtractionFailed(String),

    #[error("Document not found: {0}")]
    DocumentNotFound(i64),

    #[error("Error generating answer: {0}")]
    AnswerGenerationFailed(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("LLM API error: {0}")]
    LLMApi(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidFileType(_)
            | AppError::FileTooLarge { .. }
            | AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::DocumentNotFound(_) => StatusCode::NOT_FOUND,
            AppError::StorageWriteFailed(_)
            | AppError::ExtractionFailed(_)
            | AppError::AnswerGenerationFailed(_)
            | AppError::Embedding(_)
            | AppError::LLMApi(_)
            | AppError::Database(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable code carried in the JSON error body.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidFileType(_) => "invalid_file_type",
            AppError::FileTooLarge { .. } => "file_too_large",
            AppError::StorageWriteFailed(_) => "storage_write_failed",
            AppError::ExtractionFailed(_) => "extraction_failed",
            AppError::DocumentNotFound(_) => "document_not_found",
            AppError::AnswerGenerationFailed(_) => "answer_generation_failed",
            AppError::InvalidRequest(_) => "invalid_request",
            AppError::Embedding(_) => "embedding_failed",
            AppError::LLMApi(_) => "llm_error",
            AppError::Database(_) => "database_error",
            AppError::Internal(_) => "internal",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "Request failed");
        } else {
            tracing::debug!(code = self.code(), error = %self, "Request rejected");
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code(),
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = std::result::Result<T, AppError>;
