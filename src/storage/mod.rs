//! Storage backend abstraction for employee photos
//!
//! This module provides one interface over the places a photo can live
//! (local filesystem, the record's BLOB column, an S3 bucket). Exactly one
//! backend is active at a time; the others stay reachable so pointers written
//! by a previously active backend can still be checked, read and deleted.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

use crate::models::{AttachmentPointer, CanonicalImage, EmployeeId, PointerKind};

pub mod local;
pub mod blob;
pub mod factory;

/// Errors raised by storage backends
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    /// Network, filesystem, auth or quota failure
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("invalid storage locator: {0}")]
    InvalidLocator(String),

    /// Pointer belongs to a different backend variant
    #[error("{backend} backend cannot handle {kind} pointers")]
    UnsupportedPointer { backend: &'static str, kind: String },
}

impl StorageError {
    pub(crate) fn unsupported(backend: &'static str, pointer: &AttachmentPointer) -> Self {
        Self::UnsupportedPointer {
            backend,
            kind: pointer.kind().map(|k| k.to_string()).unwrap_or_else(|| "absent".to_string()),
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(e.to_string()),
            _ => Self::Unavailable(e.to_string()),
        }
    }
}

/// Backend key of one upload, derived from the employee and the upload time.
///
/// Format: `<employee_id>_<%Y%m%d%H%M%S%6f>.jpg`. Every key of an employee shares
/// the `<employee_id>_` prefix, which is what orphan sweeps enumerate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey(String);

impl StorageKey {
    pub fn derive(employee_id: &EmployeeId, uploaded_at: DateTime<Utc>) -> Self {
        Self(format!(
            "{}{}.{}",
            employee_id.key_prefix(),
            uploaded_at.format("%Y%m%d%H%M%S%6f"),
            CanonicalImage::EXTENSION
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StorageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Core storage backend trait that all photo stores implement
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Pointer variant this backend produces and understands
    fn kind(&self) -> PointerKind;

    /// Get a human-readable identifier for this storage backend type
    fn storage_type(&self) -> &'static str;

    /// Initialize the storage backend (create directories, validate access, etc.)
    async fn initialize(&self) -> Result<(), StorageError>;

    /// Store canonical photo bytes under `key` and return the pointer naming them
    async fn put(&self, key: &StorageKey, data: &[u8]) -> Result<AttachmentPointer, StorageError>;

    /// Retrieve photo bytes; `NotFound` if the object is gone
    async fn get(&self, pointer: &AttachmentPointer) -> Result<Vec<u8>, StorageError>;

    /// Whether the object named by `pointer` exists. A missing object is `Ok(false)`
    async fn exists(&self, pointer: &AttachmentPointer) -> Result<bool, StorageError>;

    /// Delete the object named by `pointer`. Deleting a missing object succeeds
    async fn delete(&self, pointer: &AttachmentPointer) -> Result<(), StorageError>;

    /// Keys currently stored under `prefix`
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Remove leftovers of writes that never completed and are older than `older_than`.
    /// Returns how many were removed
    async fn purge_incomplete(&self, _older_than: Duration) -> Result<usize, StorageError> {
        Ok(0)
    }

    /// Pointer naming a key returned by `list_keys`; `None` for backends without keyed objects
    fn pointer_for_key(&self, key: &str) -> Option<AttachmentPointer>;

    /// Externally resolvable address (URL or path) of a stored photo
    fn address(&self, employee_id: &EmployeeId, pointer: &AttachmentPointer) -> String;
}

/// Storage configuration enum for different backend types
#[derive(Debug, Clone)]
pub enum StorageConfig {
    /// Local filesystem storage
    Local {
        upload_path: String,
        public_base_url: String,
    },
    /// Photo bytes kept in the employee record
    Blob {
        public_base_url: String,
    },
    /// S3-compatible storage
    #[cfg(feature = "s3")]
    S3 {
        s3_config: crate::models::S3StorageConfig,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn keys_are_prefixed_by_employee() {
        let id = EmployeeId::parse("12345678").unwrap();
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
            + chrono::Duration::microseconds(42);

        let key = StorageKey::derive(&id, at);
        assert_eq!(key.as_str(), "12345678_20240309140507000042.jpg");
        assert!(key.as_str().starts_with(&id.key_prefix()));
    }

    #[test]
    fn keys_differ_per_upload_instant() {
        let id = EmployeeId::parse("1").unwrap();
        let first = Utc::now();
        let second = first + chrono::Duration::microseconds(1);
        assert_ne!(StorageKey::derive(&id, first), StorageKey::derive(&id, second));
    }

    #[test]
    fn io_not_found_maps_to_not_found() {
        let err: StorageError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, StorageError::NotFound(_)));

        let err: StorageError = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "no").into();
        assert!(matches!(err, StorageError::Unavailable(_)));
    }
}
