use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::config::LLMConfig;
use crate::embeddings::Embedder;
use crate::llm::google::GoogleAdapter;
use crate::llm::openai::OpenAIAdapter;
use crate::types::{AppResult, LLMProvider, LLMRequest, LLMResponse};

#[async_trait]
pub trait LLMAdapter: Send + Sync {
    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse>;
}

/// Chat and embedding clients for the configured provider.
///
/// Both handles usually point at the same adapter; they are kept separate so
/// callers and tests can swap either one independently.
#[derive(Clone)]
pub struct ProviderClients {
    pub llm: Arc<dyn LLMAdapter>,
    pub embedder: Arc<dyn Embedder>,
}

pub fn create_provider_clients(config: &LLMConfig) -> AppResult<ProviderClients> {
    let api_key = config.active_api_key().unwrap_or_default();
    let timeout = Duration::from_secs(config.timeout_secs);

    let clients = match config.provider {
        LLMProvider::Google => {
            let mut adapter = GoogleAdapter::new(&api_key)
                .with_timeout(timeout)?
                .with_embedding_model(&config.embedding_model);
            if let Some(base_url) = &config.base_url {
                adapter = adapter.with_base_url(base_url);
            }
            let adapter = Arc::new(adapter);
            ProviderClients {
                llm: adapter.clone(),
                embedder: adapter,
            }
        }
        LLMProvider::OpenAI => {
            let mut adapter = OpenAIAdapter::new(&api_key)
                .with_timeout(timeout)?
                .with_embedding_model(&config.embedding_model);
            if let Some(base_url) = &config.base_url {
                adapter = adapter.with_base_url(base_url);
            }
            let adapter = Arc::new(adapter);
            ProviderClients {
                llm: adapter.clone(),
                embedder: adapter,
            }
        }
    };

    info!(
        provider = %config.provider,
        chat_model = %config.chat_model,
        embedding_model = %config.embedding_model,
        "LLM provider configured"
    );
    Ok(clients)
}
