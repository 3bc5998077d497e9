//! Disk storage for pattern files and thumbnails
//!
//! Files are stored under the upload directory with generated names; the
//! database keeps the relative path and the original file name.

use std::path::{Component, Path, PathBuf};

use uuid::Uuid;

use crate::config::StorageConfig;
use crate::error::{AppError, AppResult};

/// Pattern files accepted in one upload request
pub const MAX_FILES_PER_REQUEST: usize = 5;

/// Local file storage
#[derive(Clone, Debug)]
pub struct FileStorage {
    root: PathBuf,
    max_upload_bytes: usize,
}

impl FileStorage {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            root: PathBuf::from(&config.upload_dir),
            max_upload_bytes: config.max_upload_bytes,
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    /// Create the upload directory tree if missing
    pub async fn ensure_root(&self) -> AppResult<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| AppError::StorageError(format!("Cannot create upload dir: {}", e)))
    }

    /// Whether the upload directory exists and is a directory
    pub async fn is_available(&self) -> bool {
        tokio::fs::metadata(&self.root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Reject uploads over the configured size
    pub fn check_size(&self, len: usize) -> AppResult<()> {
        if len > self.max_upload_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "File exceeds the {} byte limit",
                self.max_upload_bytes
            )));
        }
        Ok(())
    }

    /// Store bytes under `<folder>/<uuid>.<ext>` and return the relative path
    pub async fn save(&self, folder: &str, original_name: &str, bytes: &[u8]) -> AppResult<String> {
        self.check_size(bytes.len())?;

        let extension = Path::new(original_name)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| e.len() <= 10 && e.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(|e| format!(".{}", e.to_ascii_lowercase()))
            .unwrap_or_default();

        let relative = format!("{}/{}{}", folder, Uuid::new_v4(), extension);
        let full_path = self.resolve(&relative)?;

        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::StorageError(format!("Cannot create directory: {}", e)))?;
        }

        tokio::fs::write(&full_path, bytes)
            .await
            .map_err(|e| AppError::StorageError(format!("Cannot write file: {}", e)))?;

        tracing::debug!(path = %relative, size = bytes.len(), "Stored file");
        Ok(relative)
    }

    /// Read a stored file
    pub async fn read(&self, relative: &str) -> AppResult<Vec<u8>> {
        let full_path = self.resolve(relative)?;
        tokio::fs::read(&full_path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => AppError::NotFound("File".to_string()),
            _ => AppError::StorageError(format!("Cannot read file: {}", e)),
        })
    }

    /// Open a stored file for streaming, with its length
    pub async fn open(&self, relative: &str) -> AppResult<(tokio::fs::File, u64)> {
        let full_path = self.resolve(relative)?;
        let file = tokio::fs::File::open(&full_path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => AppError::NotFound("File".to_string()),
            _ => AppError::StorageError(format!("Cannot open file: {}", e)),
        })?;
        let len = file
            .metadata()
            .await
            .map_err(|e| AppError::StorageError(format!("Cannot stat file: {}", e)))?
            .len();
        Ok((file, len))
    }

    /// Delete a stored file; missing files are ignored
    pub async fn delete(&self, relative: &str) -> AppResult<()> {
        let full_path = self.resolve(relative)?;
        match tokio::fs::remove_file(&full_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::StorageError(format!("Cannot delete file: {}", e))),
        }
    }

    /// Map a stored relative path to a path inside the root, refusing traversal
    fn resolve(&self, relative: &str) -> AppResult<PathBuf> {
        let path = Path::new(relative);
        let safe = path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !safe || relative.is_empty() {
            return Err(AppError::StorageError(format!("Invalid storage path: {}", relative)));
        }
        Ok(self.root.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage(max: usize) -> FileStorage {
        let dir = std::env::temp_dir().join(format!("patronaje-storage-{}", Uuid::new_v4()));
        FileStorage::new(&StorageConfig {
            upload_dir: dir.to_string_lossy().into_owned(),
            max_upload_bytes: max,
        })
    }

    #[tokio::test]
    async fn test_save_read_delete() {
        let storage = storage(1024);
        assert!(!storage.is_available().await);
        storage.ensure_root().await.unwrap();
        assert!(storage.is_available().await);

        let path = storage
            .save("products/abc", "Vestido Talla M.PDF", b"%PDF-1.4")
            .await
            .unwrap();
        assert!(path.starts_with("products/abc/"));
        assert!(path.ends_with(".pdf"));

        assert_eq!(storage.read(&path).await.unwrap(), b"%PDF-1.4");
        let (_, len) = storage.open(&path).await.unwrap();
        assert_eq!(len, 8);

        storage.delete(&path).await.unwrap();
        assert!(matches!(storage.read(&path).await, Err(AppError::NotFound(_))));
        assert!(matches!(storage.open(&path).await, Err(AppError::NotFound(_))));
        // Deleting twice is fine
        storage.delete(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_oversized_upload() {
        let storage = storage(4);
        assert!(matches!(
            storage.save("products", "a.pdf", b"12345").await,
            Err(AppError::PayloadTooLarge(_))
        ));
    }

    #[test]
    fn test_resolve_refuses_traversal() {
        let storage = storage(1024);
        assert!(storage.resolve("../etc/passwd").is_err());
        assert!(storage.resolve("/etc/passwd").is_err());
        assert!(storage.resolve("").is_err());
        assert!(storage.resolve("products/a.pdf").is_ok());
    }
}
