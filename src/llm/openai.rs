// OpenAI adapter
// Chat: POST {base}/chat/completions
// Embeddings: POST {base}/embeddings

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::embeddings::Embedder;
use crate::llm::provider::LLMAdapter;
use crate::types::{AppError, AppResult, LLMRequest, LLMResponse, TokenUsage};

pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

const MAX_EMBED_BATCH: usize = 512;

pub struct OpenAIAdapter {
    client: Client,
    api_key: String,
    base_url: String,
    embedding_model: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct OpenAIErrorResponse {
    error: OpenAIError,
}

#[derive(Deserialize)]
struct OpenAIError {
    message: String,
    #[serde(rename = "type", default)]
    error_type: Option<String>,
}

impl OpenAIAdapter {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            base_url: OPENAI_API_BASE.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> AppResult<Self> {
        self.client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(self)
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_embedding_model(mut self, model: &str) -> Self {
        self.embedding_model = model.to_string();
        self
    }

    async fn post_json<B: Serialize>(&self, path: &str, body: &B) -> Result<String, String> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| format!("OpenAI request failed: {}", e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| format!("Failed to read OpenAI response: {}", e))?;

        if !status.is_success() {
            if let Ok(error_response) = serde_json::from_str::<OpenAIErrorResponse>(&text) {
                return Err(format!(
                    "OpenAI API error ({}): {} (type: {:?})",
                    status, error_response.error.message, error_response.error.error_type
                ));
            }
            return Err(format!("OpenAI API error ({}): {}", status, text));
        }

        Ok(text)
    }

    async fn embed(&self, texts: &[&str]) -> AppResult<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(MAX_EMBED_BATCH) {
            let body = EmbeddingRequest {
                model: &self.embedding_model,
                input: batch.to_vec(),
            };
            let text = self
                .post_json("embeddings", &body)
                .await
                .map_err(AppError::Embedding)?;
            let mut parsed: EmbeddingResponse = serde_json::from_str(&text).map_err(|e| {
                AppError::Embedding(format!("Failed to parse OpenAI embedding response: {}", e))
            })?;

            if parsed.data.len() != batch.len() {
                return Err(AppError::Embedding(format!(
                    "OpenAI returned {} embeddings for {} inputs",
                    parsed.data.len(),
                    batch.len()
                )));
            }
            parsed.data.sort_by_key(|d| d.index);
            vectors.extend(parsed.data.into_iter().map(|d| d.embedding));
        }

        debug!(count = vectors.len(), "Embedded texts with OpenAI");
        Ok(vectors)
    }
}

#[async_trait]
impl LLMAdapter for OpenAIAdapter {
    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system_instruction {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: Some(system.clone()),
            });
        }
        messages.extend(request.messages.iter().map(|m| ChatMessage {
            role: m.role.clone(),
            content: Some(m.content.clone()),
        }));

        let body = ChatRequest {
            model: request.model.trim_start_matches("models/").to_string(),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let text = self
            .post_json("chat/completions", &body)
            .await
            .map_err(AppError::LLMApi)?;
        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| AppError::LLMApi(format!("Failed to parse OpenAI response: {}", e)))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AppError::LLMApi("OpenAI returned no choices".to_string()))?;

        let usage = parsed
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        Ok(LLMResponse {
            content: choice.message.content.unwrap_or_default(),
            finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
            usage,
        })
    }
}

#[async_trait]
impl Embedder for OpenAIAdapter {
    fn model_name(&self) -> &str {
        &self.embedding_model
    }

    async fn embed_documents(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        self.embed(&refs).await
    }

    async fn embed_query(&self, text: &str) -> AppResult<Vec<f32>> {
        self.embed(&[text])
            .await?
            .pop()
            .ok_or_else(|| AppError::Embedding("OpenAI returned no embedding".to_string()))
    }
}
