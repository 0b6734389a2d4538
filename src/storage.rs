//! Durable storage for uploaded files.

use crate::error::{GranskaError, Result};
use chrono::Utc;
use std::path::PathBuf;
use tracing::{debug, instrument};

/// Persists uploaded bytes under a shared directory with
/// collision-resistant, timestamp-prefixed names.
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    /// Create the store, ensuring the directory exists.
    pub fn new(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)
            .map_err(|e| GranskaError::StorageError(format!("Cannot create uploads dir: {}", e)))?;
        Ok(Self { dir })
    }

    /// Write uploaded bytes to disk and return the stored path.
    ///
    /// Concurrent submissions may write simultaneously, so the name is
    /// prefixed with a millisecond timestamp.
    #[instrument(skip(self, bytes), fields(filename = %filename, size = bytes.len()))]
    pub async fn persist(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
        let name = format!("{}-{}", Utc::now().timestamp_millis(), sanitize(filename));
        let path = self.dir.join(name);

        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| GranskaError::StorageError(format!("Failed to persist upload: {}", e)))?;

        debug!("Stored upload at {:?}", path);
        Ok(path)
    }
}

/// Keep filenames shell- and path-safe.
fn sanitize(filename: &str) -> String {
    let cleaned: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn persists_with_timestamp_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path().to_path_buf()).unwrap();

        let path = store.persist("voice memo.mp3", b"abc").await.unwrap();
        let name = path.file_name().unwrap().to_str().unwrap();

        assert!(name.ends_with("-voice_memo.mp3"));
        assert_eq!(std::fs::read(&path).unwrap(), b"abc");
    }

    #[tokio::test]
    async fn hostile_filenames_are_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path().to_path_buf()).unwrap();

        let path = store.persist("../../etc/passwd", b"x").await.unwrap();
        assert!(path.starts_with(dir.path()));
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(!name.contains('/'));
    }
}
