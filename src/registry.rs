//! Document Registry
//!
//! Maps an uploaded document to its storage path, upload timestamp and index
//! status. [`PgDocumentRegistry`](crate::db::PgDocumentRegistry) is the
//! production backend; [`InMemoryRegistry`] backs tests and local runs.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::models::{Document, IndexStatus, NewDocument};
use crate::types::AppResult;

#[async_trait]
pub trait DocumentRegistry: Send + Sync {
    /// Inserts a new record with status `pending` and returns it.
    async fn create(&self, document: NewDocument) -> AppResult<Document>;

    async fn get(&self, id: i64) -> AppResult<Option<Document>>;

    /// All records in ascending id order.
    async fn list(&self) -> AppResult<Vec<Document>>;

    async fn set_index_status(&self, id: i64, status: IndexStatus) -> AppResult<()>;

    /// Cheap connectivity probe used by the health endpoint.
    async fn ping(&self) -> AppResult<()>;
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    documents: BTreeMap<i64, Document>,
}

#[derive(Clone, Default)]
pub struct InMemoryRegistry {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentRegistry for InMemoryRegistry {
    async fn create(&self, document: NewDocument) -> AppResult<Document> {
        let mut guard = self.inner.write().await;
        guard.next_id += 1;
        let record = Document {
            id: guard.next_id,
            filename: document.filename,
            file_path: document.file_path,
            index_status: IndexStatus::Pending,
            created_at: chrono::Utc::now(),
        };
        guard.documents.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get(&self, id: i64) -> AppResult<Option<Document>> {
        let guard = self.inner.read().await;
        Ok(guard.documents.get(&id).cloned())
    }

    async fn list(&self) -> AppResult<Vec<Document>> {
        let guard = self.inner.read().await;
        Ok(guard.documents.values().cloned().collect())
    }

    async fn set_index_status(&self, id: i64, status: IndexStatus) -> AppResult<()> {
        let mut guard = self.inner.write().await;
        if let Some(doc) = guard.documents.get_mut(&id) {
            doc.index_status = status;
        }
        Ok(())
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}
