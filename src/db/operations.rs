use async_trait::async_trait;
use sqlx::PgPool;

use crate::models::{Document, IndexStatus, NewDocument};
use crate::registry::DocumentRegistry;
use crate::types::AppResult;

const DOCUMENT_COLUMNS: &str = "id, filename, file_path, index_status, created_at";

/// PostgreSQL-backed document registry.
#[derive(Clone)]
pub struct PgDocumentRegistry {
    pool: PgPool,
}

impl PgDocumentRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentRegistry for PgDocumentRegistry {
    async fn create(&self, document: NewDocument) -> AppResult<Document> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, Document>(&format!(
            r#"
            INSERT INTO documents (filename, file_path, index_status)
            VALUES ($1, $2, $3)
            RETURNING {}
            "#,
            DOCUMENT_COLUMNS
        ))
        .bind(&document.filename)
        .bind(&document.file_path)
        .bind(IndexStatus::Pending.as_str())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(document_id = row.id, filename = %row.filename, "Document registered");
        Ok(row)
    }

    async fn get(&self, id: i64) -> AppResult<Option<Document>> {
        let doc = sqlx::query_as::<_, Document>(&format!(
            "SELECT {} FROM documents WHERE id = $1",
            DOCUMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(doc)
    }

    async fn list(&self) -> AppResult<Vec<Document>> {
        let docs = sqlx::query_as::<_, Document>(&format!(
            "SELECT {} FROM documents ORDER BY id ASC",
            DOCUMENT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(docs)
    }

    async fn set_index_status(&self, id: i64, status: IndexStatus) -> AppResult<()> {
        sqlx::query("UPDATE documents SET index_status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;

    // Needs a reachable PostgreSQL: DATABASE_URL=postgres://... cargo test -- --ignored
    #[tokio::test]
    #[ignore]
    async fn test_postgres_registry_roundtrip() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = crate::db::create_pool(&DatabaseConfig {
            url,
            max_connections: 2,
            min_connections: 1,
        })
        .await
        .unwrap();
        crate::db::run_migrations(&pool).await.unwrap();

        let registry = PgDocumentRegistry::new(pool);
        let path = format!("uploads/{}.pdf", uuid::Uuid::new_v4());
        let created = registry
            .create(NewDocument {
                filename: "paper.pdf".to_string(),
                file_path: path.clone(),
            })
            .await
            .unwrap();
        assert_eq!(created.index_status, IndexStatus::Pending);

        registry
            .set_index_status(created.id, IndexStatus::Indexed)
            .await
            .unwrap();
        let loaded = registry.get(created.id).await.unwrap().unwrap();
        assert_eq!(loaded.file_path, path);
        assert_eq!(loaded.index_status, IndexStatus::Indexed);

        let all = registry.list().await.unwrap();
        assert!(all.iter().any(|d| d.id == created.id));
        registry.ping().await.unwrap();
    }
}
