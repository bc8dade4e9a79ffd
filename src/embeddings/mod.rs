// Text extraction, chunking, embedding and vector search

use async_trait::async_trait;

use crate::types::AppResult;

pub mod document_processor;
pub mod text_chunker;
pub mod vector_search;

pub use document_processor::DocumentProcessor;
pub use text_chunker::{Chunks, TextChunker};
pub use vector_search::{cosine_similarity, IndexParams, SearchResult, VectorIndex};

/// Maps text to fixed-length vectors. Document and query embeddings may use
/// different task hints but must share a vector space.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier recorded in index snapshots.
    fn model_name(&self) -> &str;

    /// One vector per input, in input order.
    async fn embed_documents(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;

    async fn embed_query(&self, text: &str) -> AppResult<Vec<f32>>;
}
