//! Storage Gateway
//!
//! Persists uploaded PDFs under generated names inside the upload directory
//! and derives the location of each document's vector index snapshot.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::types::{AppError, AppResult};

const SNAPSHOT_SUFFIX: &str = "_vector_store";

pub struct Storage {
    upload_dir: PathBuf,
    max_file_size: u64,
}

impl Storage {
    pub fn new(upload_dir: impl Into<PathBuf>, max_file_size: u64) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            max_file_size,
        }
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Create the upload directory if it does not exist yet.
    pub async fn ensure_dir(&self) -> AppResult<()> {
        fs::create_dir_all(&self.upload_dir)
            .await
            .map_err(|e| AppError::StorageWriteFailed(e.to_string()))
    }

    /// Rejects names without a `.pdf` extension. Returns the extension as given.
    pub fn validate_filename(filename: &str) -> AppResult<String> {
        let name = client_file_name(filename);
        match Path::new(name).extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("pdf") && name.len() > ext.len() + 1 => {
                Ok(ext.to_string())
            }
            _ => Err(AppError::InvalidFileType(filename.to_string())),
        }
    }

    pub fn check_size(&self, size: u64) -> AppResult<()> {
        if size > self.max_file_size {
            return Err(AppError::FileTooLarge {
                limit: self.max_file_size,
            });
        }
        Ok(())
    }

    /// Writes the payload under `<uuid>.<ext>` and returns the final path.
    ///
    /// The bytes land in a `.part` file first and are renamed into place, so
    /// a failed write never leaves a file at the returned path.
    pub async fn save_upload(&self, filename: &str, content: &[u8]) -> AppResult<PathBuf> {
        let extension = Self::validate_filename(filename)?;
        self.check_size(content.len() as u64)?;

        let unique_name = format!("{}.{}", Uuid::new_v4(), extension);
        let target = self.upload_dir.join(&unique_name);
        let partial = self.upload_dir.join(format!("{}.part", unique_name));

        if let Err(e) = write_then_rename(&partial, &target, content).await {
            if let Err(cleanup) = fs::remove_file(&partial).await {
                debug!(path = %partial.display(), error = %cleanup, "No partial upload to clean up");
            }
            warn!(filename, error = %e, "Failed to store upload");
            return Err(AppError::StorageWriteFailed(e.to_string()));
        }

        info!(
            filename,
            path = %target.display(),
            size = content.len(),
            "Stored upload"
        );
        Ok(target)
    }

    /// Snapshot directory for a stored file: same directory, file stem plus `_vector_store`.
    pub fn snapshot_dir_for(file_path: &Path) -> PathBuf {
        let stem = file_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        file_path.with_file_name(format!("{}{}", stem, SNAPSHOT_SUFFIX))
    }
}

/// Strips any directory components a client may have sent along with the name.
pub fn client_file_name(filename: &str) -> &str {
    filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
}

async fn write_then_rename(partial: &Path, target: &Path, content: &[u8]) -> std::io::Result<()> {
    fs::write(partial, content).await?;
    fs::rename(partial, target).await
}
