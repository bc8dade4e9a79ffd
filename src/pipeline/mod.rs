//! Pipeline Orchestrator
//!
//! Build path: extract text, chunk, embed every chunk, persist a vector index
//! snapshot next to the upload. Query path: make sure a current snapshot
//! exists, retrieve the closest chunks for the question and ask the LLM to
//! answer from them.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::embeddings::{DocumentProcessor, Embedder, IndexParams, TextChunker, VectorIndex};
use crate::llm::LLMAdapter;
use crate::models::{Document, IndexStatus};
use crate::registry::DocumentRegistry;
use crate::storage::Storage;
use crate::types::{AppError, AppResult, LLMMessage, LLMRequest};

pub mod locks;

pub use locks::DocumentLocks;

/// Tunables the pipeline reads from the configuration.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub chunker: TextChunker,
    pub top_k: usize,
    pub chat_model: String,
    pub temperature: f32,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> AppResult<Self> {
        let chunker = TextChunker::from_config(&config.retrieval).ok_or_else(|| {
            AppError::Internal(format!(
                "invalid chunking parameters: size {}, overlap {}",
                config.retrieval.chunk_size, config.retrieval.chunk_overlap
            ))
        })?;
        Ok(Self {
            chunker,
            top_k: config.retrieval.top_k,
            chat_model: config.llm.chat_model.clone(),
            temperature: config.llm.temperature,
        })
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            chunker: TextChunker::default(),
            top_k: 4,
            chat_model: "gemini-2.0-flash".to_string(),
            temperature: 0.1,
        }
    }
}

pub struct QaPipeline {
    settings: PipelineSettings,
    registry: Arc<dyn DocumentRegistry>,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn LLMAdapter>,
    locks: DocumentLocks,
}

impl QaPipeline {
    pub fn new(
        settings: PipelineSettings,
        registry: Arc<dyn DocumentRegistry>,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LLMAdapter>,
    ) -> Self {
        Self {
            settings,
            registry,
            embedder,
            llm,
            locks: DocumentLocks::new(),
        }
    }

    /// Parameters a snapshot must match to be reused.
    pub fn index_params(&self) -> IndexParams {
        IndexParams {
            chunk_size: self.settings.chunker.chunk_size(),
            chunk_overlap: self.settings.chunker.overlap(),
            embedding_model: self.embedder.model_name().to_string(),
        }
    }

    /// Rebuilds the index for `document_id` from scratch and records the outcome.
    pub async fn process_document(&self, document_id: i64) -> AppResult<Document> {
        let document = self.find_document(document_id).await?;
        let _guard = self.locks.acquire(document_id).await;
        self.build_and_record(&document).await?;

        let mut document = document;
        document.index_status = IndexStatus::Indexed;
        Ok(document)
    }

    /// Runs [`process_document`](Self::process_document) in the background.
    /// Failures end up in the log and in the document's `index_status`.
    pub fn spawn_processing(self: &Arc<Self>, document_id: i64) {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = pipeline.process_document(document_id).await {
                error!(document_id, error = %e, "Background indexing failed");
            }
        });
    }

    /// Answers `question` from the content of `document_id`.
    pub async fn answer_question(&self, document_id: i64, question: &str) -> AppResult<String> {
        if question.trim().is_empty() {
            return Err(AppError::InvalidRequest("question must not be empty".to_string()));
        }

        let document = self.find_document(document_id).await?;

        self.retrieve_and_generate(&document, question)
            .await
            .map_err(|e| match e {
                AppError::AnswerGenerationFailed(_) => e,
                other => AppError::AnswerGenerationFailed(other.to_string()),
            })
    }

    async fn retrieve_and_generate(&self, document: &Document, question: &str) -> AppResult<String> {
        let index = self.ensure_index(document).await?;

        let query = self.embedder.embed_query(question).await?;
        let hits = index.search(&query, self.settings.top_k)?;
        debug!(
            document_id = document.id,
            hits = hits.len(),
            best_score = hits.first().map(|h| h.score),
            "Retrieved context"
        );

        let context: Vec<&str> = hits.iter().map(|hit| hit.text.as_str()).collect();
        let request = LLMRequest {
            model: self.settings.chat_model.clone(),
            messages: vec![LLMMessage::user(build_prompt(&context, question))],
            max_tokens: None,
            temperature: Some(self.settings.temperature),
            system_instruction: None,
        };

        let response = self.llm.create_chat_completion(&request).await?;
        info!(
            document_id = document.id,
            total_tokens = response.usage.total_tokens,
            "Answer generated"
        );
        Ok(response.content)
    }

    /// Loads the document's snapshot, rebuilding it when missing, unreadable or stale.
    pub async fn ensure_index(&self, document: &Document) -> AppResult<VectorIndex> {
        let _guard = self.locks.acquire(document.id).await;
        let snapshot_dir = Storage::snapshot_dir_for(Path::new(&document.file_path));
        let params = self.index_params();

        match VectorIndex::load(&snapshot_dir).await {
            Ok(Some(index)) if index.is_compatible(&params) => return Ok(index),
            Ok(Some(_)) => {
                info!(document_id = document.id, "Index snapshot is stale, rebuilding");
            }
            Ok(None) => {
                info!(document_id = document.id, "No index snapshot, building");
            }
            Err(e) => {
                warn!(document_id = document.id, error = %e, "Unreadable index snapshot, rebuilding");
            }
        }

        self.build_and_record(document).await
    }

    async fn find_document(&self, document_id: i64) -> AppResult<Document> {
        self.registry
            .get(document_id)
            .await?
            .ok_or(AppError::DocumentNotFound(document_id))
    }

    /// Caller must hold the document's lock.
    async fn build_and_record(&self, document: &Document) -> AppResult<VectorIndex> {
        match self.build_index(document).await {
            Ok(index) => {
                self.registry
                    .set_index_status(document.id, IndexStatus::Indexed)
                    .await?;
                Ok(index)
            }
            Err(e) => {
                if let Err(status_err) = self
                    .registry
                    .set_index_status(document.id, IndexStatus::Failed)
                    .await
                {
                    warn!(document_id = document.id, error = %status_err, "Could not record failed status");
                }
                Err(e)
            }
        }
    }

    async fn build_index(&self, document: &Document) -> AppResult<VectorIndex> {
        let file_path = Path::new(&document.file_path);
        let text = DocumentProcessor::extract_text(file_path).await?;

        let chunks: Vec<String> = self
            .settings
            .chunker
            .chunks(&text)
            .map(str::to_string)
            .collect();
        if chunks.is_empty() {
            return Err(AppError::ExtractionFailed(format!(
                "no extractable text in {}",
                document.filename
            )));
        }

        let vectors = self.embedder.embed_documents(&chunks).await?;
        if vectors.len() != chunks.len() {
            return Err(AppError::Embedding(format!(
                "expected {} embeddings, got {}",
                chunks.len(),
                vectors.len()
            )));
        }

        let mut index = VectorIndex::new(self.index_params());
        for (chunk, vector) in chunks.into_iter().zip(vectors) {
            index.add(chunk, vector)?;
        }

        let snapshot_dir = Storage::snapshot_dir_for(file_path);
        index.save(&snapshot_dir).await?;

        info!(
            document_id = document.id,
            chunks = index.len(),
            dims = index.dims(),
            snapshot = %snapshot_dir.display(),
            "Document indexed"
        );
        Ok(index)
    }
}

/// The fixed instruction sent to the LLM; chunks are separated by a blank line.
pub fn build_prompt(context: &[&str], question: &str) -> String {
    format!(
        "Answer the question based only on the following context:\n\n{}\n\nQuestion: {}",
        context.join("\n\n"),
        question
    )
}
