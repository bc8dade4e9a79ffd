// Google Gemini adapter
// Chat: POST {base}/models/{model}:generateContent
// Embeddings: POST {base}/models/{model}:batchEmbedContents
// API Reference: https://ai.google.dev/api

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::embeddings::Embedder;
use crate::llm::provider::LLMAdapter;
use crate::types::{AppError, AppResult, LLMRequest, LLMResponse, TokenUsage};

pub const GOOGLE_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_EMBEDDING_MODEL: &str = "embedding-001";

// batchEmbedContents accepts at most 100 requests per call
const MAX_EMBED_BATCH: usize = 100;

pub struct GoogleAdapter {
    client: Client,
    api_key: String,
    base_url: String,
    embedding_model: String,
}

// Request types for the Gemini API
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: String,
    content: EmbedContent<'a>,
    task_type: &'static str,
}

#[derive(Serialize)]
struct EmbedContent<'a> {
    parts: Vec<EmbedPart<'a>>,
}

#[derive(Serialize)]
struct EmbedPart<'a> {
    text: &'a str,
}

// Response types
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<GeminiContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[derive(Deserialize)]
struct GoogleErrorResponse {
    error: GoogleError,
}

#[derive(Deserialize)]
struct GoogleError {
    message: String,
    #[serde(default)]
    status: Option<String>,
}

impl GoogleAdapter {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            base_url: GOOGLE_API_BASE.to_string(),
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

    /// Point the adapter at a different endpoint, e.g. a proxy or a test server.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_embedding_model(mut self, model: &str) -> Self {
        self.embedding_model = bare_model_name(model).to_string();
        self
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!("{}/models/{}:{}", self.base_url, bare_model_name(model), method)
    }

    async fn post_json<B: Serialize>(&self, url: &str, body: &B) -> Result<String, String> {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| format!("Google request failed: {}", e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| format!("Failed to read Google response: {}", e))?;

        if !status.is_success() {
            if let Ok(error_response) = serde_json::from_str::<GoogleErrorResponse>(&text) {
                return Err(format!(
                    "Google API error ({}): {} (status: {:?})",
                    status, error_response.error.message, error_response.error.status
                ));
            }
            return Err(format!("Google API error ({}): {}", status, text));
        }

        Ok(text)
    }

    async fn batch_embed(
        &self,
        texts: &[&str],
        task_type: &'static str,
    ) -> AppResult<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(MAX_EMBED_BATCH) {
            let body = BatchEmbedRequest {
                requests: batch
                    .iter()
                    .map(|&text| EmbedContentRequest {
                        model: format!("models/{}", self.embedding_model),
                        content: EmbedContent {
                            parts: vec![EmbedPart { text }],
                        },
                        task_type,
                    })
                    .collect(),
            };

            let url = self.model_url(&self.embedding_model, "batchEmbedContents");
            let text = self.post_json(&url, &body).await.map_err(AppError::Embedding)?;
            let parsed: BatchEmbedResponse = serde_json::from_str(&text).map_err(|e| {
                AppError::Embedding(format!("Failed to parse Google embedding response: {}", e))
            })?;

            if parsed.embeddings.len() != batch.len() {
                return Err(AppError::Embedding(format!(
                    "Google returned {} embeddings for {} inputs",
                    parsed.embeddings.len(),
                    batch.len()
                )));
            }
            vectors.extend(parsed.embeddings.into_iter().map(|e| e.values));
        }

        debug!(count = vectors.len(), task_type, "Embedded texts with Google");
        Ok(vectors)
    }
}

/// Gemini model names may arrive as `models/<name>`; URLs want the bare name.
fn bare_model_name(model: &str) -> &str {
    model.strip_prefix("models/").unwrap_or(model)
}

#[async_trait]
impl LLMAdapter for GoogleAdapter {
    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        let mut system_parts: Vec<GeminiPart> = request
            .system_instruction
            .iter()
            .map(|text| GeminiPart { text: text.clone() })
            .collect();
        let mut contents = Vec::new();

        for message in &request.messages {
            let role = match message.role.as_str() {
                "system" => {
                    system_parts.push(GeminiPart {
                        text: message.content.clone(),
                    });
                    continue;
                }
                "assistant" | "model" => "model",
                _ => "user",
            };
            contents.push(GeminiContent {
                role: Some(role.to_string()),
                parts: vec![GeminiPart {
                    text: message.content.clone(),
                }],
            });
        }

        let body = GenerateContentRequest {
            contents,
            system_instruction: if system_parts.is_empty() {
                None
            } else {
                Some(GeminiContent {
                    role: None,
                    parts: system_parts,
                })
            },
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            },
        };

        let url = self.model_url(&request.model, "generateContent");
        let text = self.post_json(&url, &body).await.map_err(AppError::LLMApi)?;
        let parsed: GenerateContentResponse = serde_json::from_str(&text)
            .map_err(|e| AppError::LLMApi(format!("Failed to parse Google response: {}", e)))?;

        let candidate = parsed
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| AppError::LLMApi("Google returned no candidates".to_string()))?;

        let content: String = candidate
            .content
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        let usage = parsed
            .usage_metadata
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_token_count,
                completion_tokens: u.candidates_token_count,
                total_tokens: u.total_token_count,
            })
            .unwrap_or_default();

        Ok(LLMResponse {
            content,
            finish_reason: candidate.finish_reason.unwrap_or_else(|| "STOP".to_string()),
            usage,
        })
    }
}

#[async_trait]
impl Embedder for GoogleAdapter {
    fn model_name(&self) -> &str {
        &self.embedding_model
    }

    async fn embed_documents(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        self.batch_embed(&refs, "RETRIEVAL_DOCUMENT").await
    }

    async fn embed_query(&self, text: &str) -> AppResult<Vec<f32>> {
        self.batch_embed(&[text], "RETRIEVAL_QUERY")
            .await?
            .pop()
            .ok_or_else(|| AppError::Embedding("Google returned no embedding".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LLMMessage;
    use mockito::Matcher;
    use serde_json::json;

    fn adapter(server: &mockito::Server) -> GoogleAdapter {
        GoogleAdapter::new("test-key")
            .with_base_url(&server.url())
            .with_embedding_model("models/embedding-001")
    }

    #[test]
    fn test_bare_model_name() {
        assert_eq!(bare_model_name("models/embedding-001"), "embedding-001");
        assert_eq!(bare_model_name("gemini-2.0-flash"), "gemini-2.0-flash");
    }

    #[tokio::test]
    async fn test_generate_content() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/models/gemini-2.0-flash:generateContent")
            .match_header("x-goog-api-key", "test-key")
            .match_body(Matcher::PartialJson(json!({
                "contents": [{"role": "user", "parts": [{"text": "What is 2+2?"}]}],
                "systemInstruction": {"parts": [{"text": "Be brief."}]},
                "generationConfig": {"temperature": 0.1}
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "candidates": [{
                        "content": {"role": "model", "parts": [{"text": "4"}]},
                        "finishReason": "STOP"
                    }],
                    "usageMetadata": {
                        "promptTokenCount": 7,
                        "candidatesTokenCount": 1,
                        "totalTokenCount": 8
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let request = LLMRequest {
            model: "gemini-2.0-flash".to_string(),
            messages: vec![LLMMessage::user("What is 2+2?")],
            max_tokens: None,
            temperature: Some(0.1),
            system_instruction: Some("Be brief.".to_string()),
        };
        let response = adapter(&server).create_chat_completion(&request).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.content, "4");
        assert_eq!(response.finish_reason, "STOP");
        assert_eq!(response.usage.total_tokens, 8);
    }

    #[tokio::test]
    async fn test_generate_content_api_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/models/gemini-2.0-flash:generateContent")
            .with_status(403)
            .with_body(
                json!({"error": {"code": 403, "message": "API key not valid", "status": "PERMISSION_DENIED"}})
                    .to_string(),
            )
            .create_async()
            .await;

        let request = LLMRequest {
            model: "gemini-2.0-flash".to_string(),
            messages: vec![LLMMessage::user("hi")],
            max_tokens: None,
            temperature: None,
            system_instruction: None,
        };
        let err = adapter(&server).create_chat_completion(&request).await.unwrap_err();
        match err {
            AppError::LLMApi(msg) => assert!(msg.contains("API key not valid")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_embed_documents_and_query() {
        let mut server = mockito::Server::new_async().await;
        let docs = server
            .mock("POST", "/models/embedding-001:batchEmbedContents")
            .match_header("x-goog-api-key", "test-key")
            .match_body(Matcher::PartialJson(json!({
                "requests": [
                    {"model": "models/embedding-001", "taskType": "RETRIEVAL_DOCUMENT",
                     "content": {"parts": [{"text": "alpha"}]}},
                    {"model": "models/embedding-001", "taskType": "RETRIEVAL_DOCUMENT",
                     "content": {"parts": [{"text": "beta"}]}}
                ]
            })))
            .with_status(200)
            .with_body(
                json!({"embeddings": [{"values": [1.0, 0.0]}, {"values": [0.0, 1.0]}]}).to_string(),
            )
            .create_async()
            .await;

        let adapter = adapter(&server);
        assert_eq!(adapter.model_name(), "embedding-001");

        let vectors = adapter
            .embed_documents(&["alpha".to_string(), "beta".to_string()])
            .await
            .unwrap();
        docs.assert_async().await;
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);

        let query = server
            .mock("POST", "/models/embedding-001:batchEmbedContents")
            .match_body(Matcher::PartialJson(json!({
                "requests": [{"taskType": "RETRIEVAL_QUERY"}]
            })))
            .with_status(200)
            .with_body(json!({"embeddings": [{"values": [0.5, 0.5]}]}).to_string())
            .create_async()
            .await;

        let vector = adapter.embed_query("gamma").await.unwrap();
        query.assert_async().await;
        assert_eq!(vector, vec![0.5, 0.5]);
    }

    #[tokio::test]
    async fn test_embed_count_mismatch_is_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/models/embedding-001:batchEmbedContents")
            .with_status(200)
            .with_body(json!({"embeddings": []}).to_string())
            .create_async()
            .await;

        let err = adapter(&server)
            .embed_documents(&["alpha".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Embedding(_)));
    }
}
