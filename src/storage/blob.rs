//! Relational BLOB storage backend.
//!
//! The photo bytes live in the employee record itself, so the pointer *is* the
//! content: `put` only wraps the bytes, and persisting them happens when the
//! coordinator writes the pointer to the registry.

use async_trait::async_trait;
use tracing::debug;

use super::{StorageBackend, StorageError, StorageKey};
use crate::models::{AttachmentPointer, EmployeeId, PointerKind};

pub struct BlobStorageBackend {
    public_base_url: String,
}

impl BlobStorageBackend {
    pub fn new(public_base_url: impl Into<String>) -> Self {
        Self { public_base_url: public_base_url.into() }
    }

    fn inline_of<'a>(&self, pointer: &'a AttachmentPointer) -> Result<&'a [u8], StorageError> {
        match pointer {
            AttachmentPointer::Blob { inline } => Ok(inline),
            other => Err(StorageError::unsupported(self.storage_type(), other)),
        }
    }
}

#[async_trait]
impl StorageBackend for BlobStorageBackend {
    fn kind(&self) -> PointerKind {
        PointerKind::Blob
    }

    fn storage_type(&self) -> &'static str {
        "blob"
    }

    async fn initialize(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn put(&self, key: &StorageKey, data: &[u8]) -> Result<AttachmentPointer, StorageError> {
        debug!("Photo {} will be stored inline ({} bytes)", key, data.len());
        Ok(AttachmentPointer::Blob { inline: data.to_vec() })
    }

    async fn get(&self, pointer: &AttachmentPointer) -> Result<Vec<u8>, StorageError> {
        let inline = self.inline_of(pointer)?;
        if inline.is_empty() {
            return Err(StorageError::NotFound("empty photo column".to_string()));
        }
        Ok(inline.to_vec())
    }

    async fn exists(&self, pointer: &AttachmentPointer) -> Result<bool, StorageError> {
        Ok(!self.inline_of(pointer)?.is_empty())
    }

    async fn delete(&self, pointer: &AttachmentPointer) -> Result<(), StorageError> {
        // Overwriting the pointer drops the bytes
        self.inline_of(pointer)?;
        Ok(())
    }

    async fn list_keys(&self, _prefix: &str) -> Result<Vec<String>, StorageError> {
        Ok(Vec::new())
    }

    fn pointer_for_key(&self, _key: &str) -> Option<AttachmentPointer> {
        None
    }

    fn address(&self, employee_id: &EmployeeId, _pointer: &AttachmentPointer) -> String {
        format!(
            "{}/api/photos/{}/content",
            self.public_base_url.trim_end_matches('/'),
            employee_id
        )
    }
}
