//! Flat vector index with on-disk snapshots.
//!
//! Brute-force cosine search over every stored segment. A snapshot is a
//! directory holding `index.json`; it records the parameters it was built
//! with so a configuration change can be detected on load.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

use crate::types::{AppError, AppResult};

const SNAPSHOT_FILE: &str = "index.json";
const SNAPSHOT_VERSION: u32 = 1;

/// Everything a snapshot must agree on with the running configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexParams {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub embedding_model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedSegment {
    pub text: String,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub index: usize,
    pub text: String,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndex {
    version: u32,
    params: IndexParams,
    dims: usize,
    segments: Vec<IndexedSegment>,
}

impl VectorIndex {
    pub fn new(params: IndexParams) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            params,
            dims: 0,
            segments: Vec::new(),
        }
    }

    pub fn params(&self) -> &IndexParams {
        &self.params
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Add a segment. All vectors in one index must share a dimension.
    pub fn add(&mut self, text: impl Into<String>, vector: Vec<f32>) -> AppResult<()> {
        if vector.is_empty() {
            return Err(AppError::Embedding("received an empty embedding vector".to_string()));
        }
        if self.segments.is_empty() {
            self.dims = vector.len();
        } else if vector.len() != self.dims {
            return Err(AppError::Embedding(format!(
                "embedding dimension mismatch: expected {}, got {}",
                self.dims,
                vector.len()
            )));
        }
        self.segments.push(IndexedSegment {
            text: text.into(),
            vector,
        });
        Ok(())
    }

    /// Top `k` segments by cosine similarity, best first. Ties keep insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> AppResult<Vec<SearchResult>> {
        if !self.segments.is_empty() && query.len() != self.dims {
            return Err(AppError::Embedding(format!(
                "query dimension {} does not match index dimension {}",
                query.len(),
                self.dims
            )));
        }

        let mut scored: Vec<SearchResult> = self
            .segments
            .iter()
            .enumerate()
            .map(|(index, segment)| SearchResult {
                index,
                text: segment.text.clone(),
                score: cosine_similarity(query, &segment.vector),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        Ok(scored)
    }

    /// Write the snapshot into `dir`, replacing any previous one.
    pub async fn save(&self, dir: &Path) -> AppResult<()> {
        let data = serde_json::to_vec(self)
            .map_err(|e| AppError::Internal(format!("failed to serialize index: {}", e)))?;

        let write = async {
            fs::create_dir_all(dir).await?;
            let tmp = dir.join(format!("{}.tmp", SNAPSHOT_FILE));
            fs::write(&tmp, &data).await?;
            fs::rename(&tmp, dir.join(SNAPSHOT_FILE)).await
        };
        write.await.map_err(|e| {
            AppError::StorageWriteFailed(format!(
                "failed to write index snapshot {}: {}",
                dir.display(),
                e
            ))
        })?;

        debug!(dir = %dir.display(), segments = self.len(), "Saved index snapshot");
        Ok(())
    }

    /// Load the snapshot in `dir`. `Ok(None)` when no snapshot exists.
    pub async fn load(dir: &Path) -> AppResult<Option<Self>> {
        let path = dir.join(SNAPSHOT_FILE);
        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AppError::Internal(format!(
                    "failed to read index snapshot {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let index: Self = serde_json::from_slice(&data).map_err(|e| {
            AppError::Internal(format!("corrupt index snapshot {}: {}", path.display(), e))
        })?;
        Ok(Some(index))
    }

    /// Whether this snapshot was built with `params` and the current format.
    pub fn is_compatible(&self, params: &IndexParams) -> bool {
        self.version == SNAPSHOT_VERSION && &self.params == params && !self.segments.is_empty()
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn params() -> IndexParams {
        IndexParams {
            chunk_size: 1000,
            chunk_overlap: 200,
            embedding_model: "test-model".to_string(),
        }
    }

    fn sample_index() -> VectorIndex {
        let mut index = VectorIndex::new(params());
        index.add("north", vec![0.0, 1.0]).unwrap();
        index.add("east", vec![1.0, 0.0]).unwrap();
        index.add("north-east", vec![1.0, 1.0]).unwrap();
        index.add("south", vec![0.0, -1.0]).unwrap();
        index
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_search_orders_by_similarity() {
        let index = sample_index();
        let results = index.search(&[0.1, 1.0], 2).unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].text, "north");
        assert_eq!(results[1].text, "north-east");
        assert!(results[0].score >= results[1].score);
    }

    #[test]
    fn test_search_k_larger_than_index() {
        let index = sample_index();
        let results = index.search(&[1.0, 0.0], 10).unwrap();
        assert_eq!(results.len(), 4);
        assert_eq!(results.last().unwrap().text, "south");
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let mut index = sample_index();
        assert!(matches!(
            index.add("bad", vec![1.0, 2.0, 3.0]),
            Err(AppError::Embedding(_))
        ));
        assert!(matches!(index.search(&[1.0], 1), Err(AppError::Embedding(_))));
        assert!(matches!(index.add("empty", vec![]), Err(AppError::Embedding(_))));
    }

    #[tokio::test]
    async fn test_snapshot_roundtrip_preserves_results() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("doc_vector_store");

        let index = sample_index();
        index.save(&dir).await.unwrap();
        let loaded = VectorIndex::load(&dir).await.unwrap().unwrap();

        assert_eq!(loaded.len(), 4);
        assert_eq!(loaded.dims(), 2);
        assert!(loaded.is_compatible(&params()));
        assert_eq!(
            loaded.search(&[0.7, 0.7], 1).unwrap()[0].text,
            index.search(&[0.7, 0.7], 1).unwrap()[0].text
        );
    }

    #[tokio::test]
    async fn test_save_overwrites_previous_snapshot() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("doc_vector_store");

        sample_index().save(&dir).await.unwrap();
        let mut smaller = VectorIndex::new(params());
        smaller.add("only", vec![1.0, 0.0]).unwrap();
        smaller.save(&dir).await.unwrap();

        let loaded = VectorIndex::load(&dir).await.unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
    }

    #[tokio::test]
    async fn test_load_missing_and_corrupt() {
        let tmp = TempDir::new().unwrap();
        assert!(VectorIndex::load(&tmp.path().join("absent"))
            .await
            .unwrap()
            .is_none());

        let dir = tmp.path().join("broken_vector_store");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(SNAPSHOT_FILE), b"{not json").unwrap();
        assert!(matches!(
            VectorIndex::load(&dir).await,
            Err(AppError::Internal(_))
        ));
    }

    #[test]
    fn test_compatibility_tracks_parameters() {
        let index = sample_index();
        let mut other = params();
        other.chunk_size = 500;
        assert!(!index.is_compatible(&other));

        let mut other_model = params();
        other_model.embedding_model = "different".to_string();
        assert!(!index.is_compatible(&other_model));

        assert!(!VectorIndex::new(params()).is_compatible(&params()));
    }
}
