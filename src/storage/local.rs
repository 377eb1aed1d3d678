//! Local filesystem storage backend implementation

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::io::Write;
use std::time::{Duration, SystemTime};
use tokio::fs;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{StorageBackend, StorageError, StorageKey};
use crate::models::{AttachmentPointer, EmployeeId, PointerKind};
use crate::utils::security::{validate_path_within_base, validate_storage_filename};

/// Route the upload root is served under
pub const LOCAL_PHOTO_ROUTE: &str = "/fotos";

const TEMP_PREFIX: &str = ".";
const TEMP_SUFFIX: &str = ".tmp";

/// Local filesystem storage backend
pub struct LocalStorageBackend {
    upload_path: PathBuf,
    public_base_url: String,
}

impl LocalStorageBackend {
    /// Create a new local storage backend
    pub fn new(upload_path: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            upload_path: upload_path.into(),
            public_base_url: public_base_url.into(),
        }
    }

    /// Get the base upload path
    pub fn get_upload_path(&self) -> &Path {
        &self.upload_path
    }

    /// Resolve a stored filename to a path inside the upload root
    fn resolve_file_path(&self, filename: &str) -> Result<PathBuf, StorageError> {
        validate_storage_filename(filename)
            .map_err(|e| StorageError::InvalidLocator(e.to_string()))?;

        let path = self.upload_path.join(filename);
        validate_path_within_base(&path, &self.upload_path)
            .map_err(|e| StorageError::InvalidLocator(e.to_string()))?;

        Ok(path)
    }

    fn filename_of<'a>(&self, pointer: &'a AttachmentPointer) -> Result<&'a str, StorageError> {
        match pointer {
            AttachmentPointer::LocalFile { filename } => Ok(filename),
            other => Err(StorageError::unsupported(self.storage_type(), other)),
        }
    }

    /// Write to a hidden temp file then rename it into place.
    ///
    /// Runs as one blocking task: a caller that stops waiting (timeout, dropped request)
    /// does not interrupt it, so the temp file is always renamed or removed.
    async fn write_atomically(&self, path: &Path, data: &[u8]) -> Result<(), StorageError> {
        let temp_path = self.upload_path.join(format!("{}{}{}", TEMP_PREFIX, Uuid::new_v4(), TEMP_SUFFIX));
        let final_path = path.to_path_buf();
        let data = data.to_vec();

        let result = tokio::task::spawn_blocking(move || {
            let written = write_then_rename(&temp_path, &final_path, &data);
            if written.is_err() {
                if let Err(cleanup) = std::fs::remove_file(&temp_path) {
                    if cleanup.kind() != std::io::ErrorKind::NotFound {
                        warn!("Failed to remove temp file {}: {}", temp_path.display(), cleanup);
                    }
                }
            }
            written
        })
        .await
        .map_err(|e| StorageError::Unavailable(format!("photo write task failed: {}", e)))?;

        if let Err(e) = result {
            error!("Failed to write photo {}: {}", path.display(), e);
            // A missing directory is an outage here, not a missing object
            return Err(StorageError::Unavailable(format!(
                "failed to write {}: {}",
                path.display(),
                e
            )));
        }

        Ok(())
    }
}

fn write_then_rename(temp_path: &Path, final_path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = std::fs::File::create(temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);
    std::fs::rename(temp_path, final_path)
}

fn is_temp_file(name: &str) -> bool {
    name.starts_with(TEMP_PREFIX) && name.ends_with(TEMP_SUFFIX)
}

#[async_trait]
impl StorageBackend for LocalStorageBackend {
    fn kind(&self) -> PointerKind {
        PointerKind::LocalFile
    }

    fn storage_type(&self) -> &'static str {
        "local"
    }

    async fn initialize(&self) -> Result<(), StorageError> {
        if let Err(e) = fs::create_dir_all(&self.upload_path).await {
            error!("Failed to create upload directory {:?}: {}", self.upload_path, e);
            return Err(StorageError::Unavailable(format!(
                "failed to create upload directory: {}",
                e
            )));
        }
        info!("Ensured photo directory exists: {:?}", self.upload_path);
        Ok(())
    }

    async fn put(&self, key: &StorageKey, data: &[u8]) -> Result<AttachmentPointer, StorageError> {
        let path = self.resolve_file_path(key.as_str())?;
        self.write_atomically(&path, data).await?;

        info!("Stored photo locally: {}", path.display());
        Ok(AttachmentPointer::LocalFile { filename: key.as_str().to_string() })
    }

    async fn get(&self, pointer: &AttachmentPointer) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve_file_path(self.filename_of(pointer)?)?;
        Ok(fs::read(&path).await?)
    }

    async fn exists(&self, pointer: &AttachmentPointer) -> Result<bool, StorageError> {
        let path = self.resolve_file_path(self.filename_of(pointer)?)?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Unavailable(format!(
                "failed to stat {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn delete(&self, pointer: &AttachmentPointer) -> Result<(), StorageError> {
        let path = self.resolve_file_path(self.filename_of(pointer)?)?;
        match fs::remove_file(&path).await {
            Ok(_) => {
                info!("Deleted file: {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("File already deleted: {}", path.display());
                Ok(())
            }
            Err(e) => Err(StorageError::Unavailable(format!(
                "failed to delete {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut entries = fs::read_dir(&self.upload_path)
            .await
            .map_err(|e| StorageError::Unavailable(format!("failed to list upload directory: {}", e)))?;

        let mut keys = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::Unavailable(format!("failed to list upload directory: {}", e)))?
        {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            // In-flight temp files are hidden
            if name.starts_with('.') || !name.starts_with(prefix) {
                continue;
            }
            keys.push(name);
        }

        keys.sort();
        debug!("Found {} local photos under prefix {}", keys.len(), prefix);
        Ok(keys)
    }

    async fn purge_incomplete(&self, older_than: Duration) -> Result<usize, StorageError> {
        let mut entries = fs::read_dir(&self.upload_path)
            .await
            .map_err(|e| StorageError::Unavailable(format!("failed to list upload directory: {}", e)))?;

        let cutoff = SystemTime::now().checked_sub(older_than).unwrap_or(SystemTime::UNIX_EPOCH);
        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::Unavailable(format!("failed to list upload directory: {}", e)))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            if !is_temp_file(&name) {
                continue;
            }
            let modified = match entry.metadata().await.and_then(|meta| meta.modified()) {
                Ok(modified) => modified,
                Err(e) => {
                    warn!("Cannot read age of temp file {}: {}", name, e);
                    continue;
                }
            };
            if modified > cutoff {
                continue;
            }

            match fs::remove_file(entry.path()).await {
                Ok(()) => {
                    info!("Removed stale temp file {}", name);
                    removed += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove stale temp file {}: {}", name, e),
            }
        }

        Ok(removed)
    }

    fn pointer_for_key(&self, key: &str) -> Option<AttachmentPointer> {
        Some(AttachmentPointer::LocalFile { filename: key.to_string() })
    }

    fn address(&self, _employee_id: &EmployeeId, pointer: &AttachmentPointer) -> String {
        let filename = pointer.storage_key().unwrap_or_default();
        format!(
            "{}{}/{}",
            self.public_base_url.trim_end_matches('/'),
            LOCAL_PHOTO_ROUTE,
            filename
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn backend() -> (tempfile::TempDir, LocalStorageBackend) {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalStorageBackend::new(dir.path().join("fotos"), "");
        (dir, backend)
    }

    #[tokio::test]
    async fn put_get_exists_delete() {
        let (_dir, backend) = backend();
        backend.initialize().await.unwrap();

        let id = EmployeeId::parse("12345678").unwrap();
        let key = StorageKey::derive(&id, Utc::now());
        let pointer = backend.put(&key, b"jpeg bytes").await.unwrap();

        assert_eq!(pointer, AttachmentPointer::LocalFile { filename: key.as_str().to_string() });
        assert!(backend.exists(&pointer).await.unwrap());
        assert_eq!(backend.get(&pointer).await.unwrap(), b"jpeg bytes");

        backend.delete(&pointer).await.unwrap();
        assert!(!backend.exists(&pointer).await.unwrap());
        assert!(matches!(backend.get(&pointer).await, Err(StorageError::NotFound(_))));

        // Idempotent
        backend.delete(&pointer).await.unwrap();
    }

    #[tokio::test]
    async fn put_leaves_no_temp_files() {
        let (_dir, backend) = backend();
        backend.initialize().await.unwrap();

        let id = EmployeeId::parse("77").unwrap();
        backend.put(&StorageKey::derive(&id, Utc::now()), &[0u8; 4096]).await.unwrap();

        let names: Vec<String> = std::fs::read_dir(backend.get_upload_path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(!names[0].ends_with(".tmp"));
    }

    #[tokio::test]
    async fn list_keys_filters_by_prefix() {
        let (_dir, backend) = backend();
        backend.initialize().await.unwrap();

        let a = EmployeeId::parse("123").unwrap();
        let b = EmployeeId::parse("1234").unwrap();
        let now = Utc::now();
        backend.put(&StorageKey::derive(&a, now), b"a").await.unwrap();
        backend.put(&StorageKey::derive(&b, now), b"b").await.unwrap();
        std::fs::write(backend.get_upload_path().join(".pending.tmp"), b"x").unwrap();

        let keys = backend.list_keys(&a.key_prefix()).await.unwrap();
        assert_eq!(keys.len(), 1);
        assert!(keys[0].starts_with("123_"));
    }

    #[tokio::test]
    async fn rejects_traversal_and_foreign_pointers() {
        let (_dir, backend) = backend();
        backend.initialize().await.unwrap();

        let evil = AttachmentPointer::LocalFile { filename: "../../etc/passwd".to_string() };
        assert!(matches!(backend.exists(&evil).await, Err(StorageError::InvalidLocator(_))));

        let blob = AttachmentPointer::Blob { inline: vec![1] };
        assert!(matches!(backend.get(&blob).await, Err(StorageError::UnsupportedPointer { .. })));
    }

    #[tokio::test]
    async fn put_without_directory_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalStorageBackend::new(dir.path().join("missing"), "");

        let id = EmployeeId::parse("5").unwrap();
        let result = backend.put(&StorageKey::derive(&id, Utc::now()), b"x").await;
        assert!(matches!(result, Err(StorageError::Unavailable(_))));
    }

    #[test]
    fn address_uses_public_route() {
        let backend = LocalStorageBackend::new("/srv/fotos", "https://intranet.example.com/");
        let id = EmployeeId::parse("5").unwrap();
        let pointer = AttachmentPointer::LocalFile { filename: "5_1.jpg".to_string() };
        assert_eq!(backend.address(&id, &pointer), "https://intranet.example.com/fotos/5_1.jpg");
    }

    #[tokio::test]
    async fn abandoned_put_still_completes() {
        use futures::FutureExt;

        let (_dir, backend) = backend();
        backend.initialize().await.unwrap();

        let id = EmployeeId::parse("78").unwrap();
        let key = StorageKey::derive(&id, Utc::now());
        // Poll once, then drop the future mid-write
        let _ = backend.put(&key, &[7u8; 64 * 1024]).now_or_never();

        let path = backend.get_upload_path().join(key.as_str());
        for _ in 0..100 {
            if path.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(std::fs::read(&path).unwrap().len(), 64 * 1024);
        assert_eq!(backend.purge_incomplete(Duration::ZERO).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn purge_removes_only_old_temp_files() {
        let (_dir, backend) = backend();
        backend.initialize().await.unwrap();

        let id = EmployeeId::parse("79").unwrap();
        let pointer = backend.put(&StorageKey::derive(&id, Utc::now()), b"jpeg").await.unwrap();
        std::fs::write(backend.get_upload_path().join(".leftover.tmp"), b"partial").unwrap();
        std::fs::write(backend.get_upload_path().join(".hidden"), b"not ours").unwrap();

        assert_eq!(backend.purge_incomplete(Duration::from_secs(3600)).await.unwrap(), 0);
        assert_eq!(backend.purge_incomplete(Duration::ZERO).await.unwrap(), 1);

        assert!(!backend.get_upload_path().join(".leftover.tmp").exists());
        assert!(backend.get_upload_path().join(".hidden").exists());
        assert!(backend.exists(&pointer).await.unwrap());
    }
}
