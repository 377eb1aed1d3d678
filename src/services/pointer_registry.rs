use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::db::{RecordStore, RecordStoreError};
use crate::models::{AttachmentPointer, EmployeeId};

/// Reads and writes the attachment pointer of employee records.
///
/// Never touches photo storage. Every call is bounded by the configured backend timeout;
/// an elapsed timeout is reported as `RecordStoreError::Unavailable`.
#[derive(Clone)]
pub struct PointerRegistry {
    store: Arc<dyn RecordStore>,
    timeout: Duration,
}

impl PointerRegistry {
    pub fn new(store: Arc<dyn RecordStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    async fn bounded<T, F>(&self, operation: &str, fut: F) -> Result<T, RecordStoreError>
    where
        F: std::future::Future<Output = Result<T, RecordStoreError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                debug!("Record store {} exceeded {:?}", operation, self.timeout);
                Err(RecordStoreError::Unavailable(format!(
                    "record store {} timed out after {}s",
                    operation,
                    self.timeout.as_secs()
                )))
            }
        }
    }

    /// Current pointer; `RecordNotFound` if the employee does not exist
    pub async fn read(&self, id: &EmployeeId) -> Result<AttachmentPointer, RecordStoreError> {
        self.find(id)
            .await?
            .ok_or_else(|| RecordStoreError::RecordNotFound(id.clone()))
    }

    /// Current pointer, or `None` for an unknown employee
    pub async fn find(&self, id: &EmployeeId) -> Result<Option<AttachmentPointer>, RecordStoreError> {
        self.bounded("read", self.store.get_pointer(id)).await
    }

    pub async fn write(&self, id: &EmployeeId, pointer: &AttachmentPointer) -> Result<(), RecordStoreError> {
        self.bounded("write", self.store.set_pointer(id, pointer)).await
    }

    pub async fn rename(&self, old_id: &EmployeeId, new_id: &EmployeeId) -> Result<(), RecordStoreError> {
        self.bounded("rename", self.store.rename(old_id, new_id)).await
    }

    /// Whether any record still points at the storage key `key`
    pub async fn is_referenced(&self, key: &str) -> Result<bool, RecordStoreError> {
        self.bounded("reference check", self.store.references_key(key)).await
    }

    pub async fn employee_ids(&self) -> Result<Vec<EmployeeId>, RecordStoreError> {
        self.bounded("listing", self.store.list_employee_ids()).await
    }
}
