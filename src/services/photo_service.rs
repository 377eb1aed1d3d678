//! Photo attachment lifecycle: replace, delete, resolve, fetch and rename.
//!
//! The pointer stored in the employee record is the source of truth. A new blob is
//! always stored and referenced before the previous one is deleted, so an employee
//! never goes through a window without a retrievable photo. Mutations of one
//! employee are serialized through [`IdLocks`]; resolve reads without locking and
//! only takes the lock when it has to repair a dangling pointer.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::db::{RecordStore, RecordStoreError};
use crate::models::{AttachmentPointer, EmployeeId, ErrorResponse, PointerKind};
use crate::services::id_locks::IdLocks;
use crate::services::image_normalizer::{normalize_image_blocking, NormalizeError};
use crate::services::pointer_registry::PointerRegistry;
use crate::storage::factory::StorageBackends;
use crate::storage::{StorageBackend, StorageError, StorageKey};

#[derive(Debug, Error)]
pub enum PhotoError {
    #[error("invalid employee identifier: {0}")]
    InvalidIdentifier(String),

    #[error("missing employee identifier")]
    MissingIdentifier,

    #[error("missing photo file")]
    MissingFile,

    #[error("photo file is empty")]
    EmptyFile,

    #[error("malformed upload: {0}")]
    MalformedUpload(String),

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("photo exceeds the {max_bytes} byte limit")]
    TooLarge { max_bytes: usize },

    #[error("file type not allowed{}", .0.as_deref().map(|d| format!(": {}", d)).unwrap_or_default())]
    UnsupportedFormat(Option<String>),

    #[error("corrupt image: {0}")]
    CorruptImage(String),

    #[error("photo storage unavailable: {0}")]
    StoreUnavailable(String),

    #[error("employee {0} not found")]
    RecordNotFound(EmployeeId),

    #[error("employee {0} already exists")]
    TargetExists(EmployeeId),

    #[error("employee {0} has no photo")]
    NoAttachment(EmployeeId),
}

impl PhotoError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidIdentifier(_)
            | Self::MissingIdentifier
            | Self::MissingFile
            | Self::EmptyFile
            | Self::MalformedUpload(_)
            | Self::MalformedRequest(_)
            | Self::CorruptImage(_) => StatusCode::BAD_REQUEST,
            Self::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::RecordNotFound(_) | Self::NoAttachment(_) => StatusCode::NOT_FOUND,
            Self::TargetExists(_) => StatusCode::CONFLICT,
        }
    }
}

impl IntoResponse for PhotoError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Photo operation failed: {}", self);
        }
        (status, Json(ErrorResponse { error: self.to_string() })).into_response()
    }
}

impl From<NormalizeError> for PhotoError {
    fn from(e: NormalizeError) -> Self {
        match e {
            NormalizeError::UnsupportedFormat(detected) => Self::UnsupportedFormat(detected),
            NormalizeError::CorruptImage(reason) => Self::CorruptImage(reason),
        }
    }
}

impl From<RecordStoreError> for PhotoError {
    fn from(e: RecordStoreError) -> Self {
        match e {
            RecordStoreError::RecordNotFound(id) => Self::RecordNotFound(id),
            RecordStoreError::TargetExists(id) => Self::TargetExists(id),
            RecordStoreError::Unavailable(reason) => Self::StoreUnavailable(reason),
        }
    }
}

impl From<StorageError> for PhotoError {
    fn from(e: StorageError) -> Self {
        Self::StoreUnavailable(e.to_string())
    }
}

/// Result of an orphan sweep
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub deleted: usize,
    pub failed: usize,
    /// Leftovers of interrupted writes
    pub purged: usize,
}

impl SweepReport {
    fn absorb(&mut self, other: SweepReport) {
        self.scanned += other.scanned;
        self.deleted += other.deleted;
        self.failed += other.failed;
        self.purged += other.purged;
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MigrationOptions {
    /// Report what would move without touching anything
    pub dry_run: bool,
    /// Leave the blob in its old backend after the pointer moves
    pub keep_source: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    NoPhoto,
    AlreadyActive,
    WouldMigrate { from: PointerKind },
    Migrated { from: PointerKind },
    /// The old blob was gone; the pointer was cleared instead
    Repaired { from: PointerKind },
}

pub struct PhotoService {
    registry: PointerRegistry,
    backends: StorageBackends,
    locks: IdLocks,
    timeout: Duration,
    max_upload_bytes: usize,
}

impl PhotoService {
    pub fn new(store: Arc<dyn RecordStore>, backends: StorageBackends, config: &Config) -> Self {
        Self::with_limits(store, backends, config.backend_timeout(), config.max_file_size_bytes())
    }

    pub fn with_limits(
        store: Arc<dyn RecordStore>,
        backends: StorageBackends,
        timeout: Duration,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            registry: PointerRegistry::new(store, timeout),
            backends,
            locks: IdLocks::new(),
            timeout,
            max_upload_bytes,
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    /// Bound a storage call by the backend timeout
    async fn bounded<T, F>(&self, operation: &str, fut: F) -> Result<T, StorageError>
    where
        F: std::future::Future<Output = Result<T, StorageError>>,
    {
        tokio::time::timeout(self.timeout, fut).await.unwrap_or_else(|_| {
            Err(StorageError::Unavailable(format!(
                "{} timed out after {}s",
                operation,
                self.timeout.as_secs()
            )))
        })
    }

    fn backend_for(&self, pointer: &AttachmentPointer) -> Result<&Arc<dyn StorageBackend>, PhotoError> {
        Ok(self.backends.for_pointer(pointer)?)
    }

    /// Store a new photo for `id` and return its address.
    ///
    /// The previous photo is deleted only after the new pointer is persisted.
    pub async fn replace(&self, id: &EmployeeId, raw: Vec<u8>) -> Result<String, PhotoError> {
        if raw.is_empty() {
            return Err(PhotoError::EmptyFile);
        }
        if raw.len() > self.max_upload_bytes {
            return Err(PhotoError::TooLarge { max_bytes: self.max_upload_bytes });
        }

        let canonical = normalize_image_blocking(raw).await?;
        debug!(
            "Normalized photo for {}: {}x{}, {} bytes",
            id,
            canonical.width,
            canonical.height,
            canonical.bytes.len()
        );

        let _guard = self.locks.lock(id).await;

        let previous = self.registry.read(id).await?;

        let mut uploaded_at = Utc::now();
        let mut key = StorageKey::derive(id, uploaded_at);
        while names_key(&previous, &key) {
            uploaded_at += chrono::Duration::microseconds(1);
            key = StorageKey::derive(id, uploaded_at);
        }

        let backend = self.backends.active();
        let pointer = self
            .bounded("put", backend.put(&key, &canonical.bytes))
            .await
            .map_err(|e| {
                error!("Failed to store photo {} for {}: {}", key, id, e);
                PhotoError::from(e)
            })?;

        if let Err(e) = self.registry.write(id, &pointer).await {
            // The new blob is unreferenced now; the previous pointer stays authoritative
            error!(
                "Failed to record photo {} for {}; stored blob is orphaned: {}",
                key, id, e
            );
            return Err(e.into());
        }

        if !previous.is_absent() {
            if let Err(e) = self.discard(&previous).await {
                warn!("Failed to delete previous photo of {} ({:?}): {}", id, previous, e);
            }
        }

        info!("Stored photo {} for employee {} in {}", key, id, backend.storage_type());
        Ok(backend.address(id, &pointer))
    }

    /// Delete the photo of `id`. Deleting when there is no photo succeeds without backend I/O.
    pub async fn delete(&self, id: &EmployeeId) -> Result<bool, PhotoError> {
        let _guard = self.locks.lock(id).await;

        let pointer = self.registry.read(id).await?;
        if pointer.is_absent() {
            debug!("Employee {} has no photo to delete", id);
            return Ok(true);
        }

        if let Err(e) = self.discard(&pointer).await {
            warn!("Failed to delete photo blob of {} ({:?}): {}", id, pointer, e);
        }

        self.registry.write(id, &AttachmentPointer::Absent).await?;
        info!("Deleted photo of employee {}", id);
        Ok(true)
    }

    /// Address of the current photo, or `None` when there is none.
    ///
    /// A pointer whose blob has disappeared is cleared before returning `None`.
    pub async fn resolve(&self, id: &EmployeeId) -> Result<Option<String>, PhotoError> {
        let Some(pointer) = self.registry.find(id).await? else {
            return Ok(None);
        };
        if pointer.is_absent() {
            return Ok(None);
        }

        let backend = self.backend_for(&pointer)?;
        if self.blob_present(id, backend, &pointer).await? {
            return Ok(Some(backend.address(id, &pointer)));
        }

        let current = self.repair(id, &pointer).await?;
        match current {
            Some(pointer) => Ok(Some(self.backend_for(&pointer)?.address(id, &pointer))),
            None => Ok(None),
        }
    }

    /// Canonical JPEG bytes of the current photo
    pub async fn fetch(&self, id: &EmployeeId) -> Result<Vec<u8>, PhotoError> {
        let pointer = self.registry.read(id).await?;
        if pointer.is_absent() {
            return Err(PhotoError::NoAttachment(id.clone()));
        }

        let backend = self.backend_for(&pointer)?;
        match self.bounded("get", backend.get(&pointer)).await {
            Ok(bytes) => return Ok(bytes),
            Err(StorageError::NotFound(_)) => {}
            Err(StorageError::InvalidLocator(reason)) => {
                warn!("Photo pointer of employee {} names no object ({:?}): {}", id, pointer, reason);
            }
            Err(e) => return Err(e.into()),
        }

        match self.repair(id, &pointer).await? {
            Some(current) => {
                let backend = self.backend_for(&current)?;
                match self.bounded("get", backend.get(&current)).await {
                    Ok(bytes) => Ok(bytes),
                    Err(StorageError::NotFound(_) | StorageError::InvalidLocator(_)) => {
                        Err(PhotoError::NoAttachment(id.clone()))
                    }
                    Err(e) => Err(e.into()),
                }
            }
            None => Err(PhotoError::NoAttachment(id.clone())),
        }
    }

    /// Move the record `old_id` to `new_id`. The blob is not touched; the pointer follows the record.
    pub async fn rename(&self, old_id: &EmployeeId, new_id: &EmployeeId) -> Result<(), PhotoError> {
        let _guards = self.locks.lock_pair(old_id, new_id).await;
        self.registry.rename(old_id, new_id).await?;
        info!("Employee {} renamed to {}; photo pointer moved with the record", old_id, new_id);
        Ok(())
    }

    /// Re-check a pointer found dangling and clear it if it still is.
    ///
    /// Returns the pointer that is current afterwards, `None` if there is no photo.
    async fn repair(
        &self,
        id: &EmployeeId,
        stale: &AttachmentPointer,
    ) -> Result<Option<AttachmentPointer>, PhotoError> {
        let _guard = self.locks.lock(id).await;

        let Some(current) = self.registry.find(id).await? else {
            return Ok(None);
        };
        if current.is_absent() {
            return Ok(None);
        }

        if current != *stale {
            // Replaced while we were checking; the new pointer gets its own check
            let backend = self.backend_for(&current)?;
            if self.blob_present(id, backend, &current).await? {
                return Ok(Some(current));
            }
        }

        warn!("Photo of employee {} is missing from storage ({:?}); clearing pointer", id, current);
        match self.registry.write(id, &AttachmentPointer::Absent).await {
            Ok(()) | Err(RecordStoreError::RecordNotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether the blob named by `pointer` is in storage.
    ///
    /// A pointer that names no usable object (empty or malformed locator) counts as
    /// missing, so read-repair clears it like any other dangling pointer.
    async fn blob_present(
        &self,
        id: &EmployeeId,
        backend: &Arc<dyn StorageBackend>,
        pointer: &AttachmentPointer,
    ) -> Result<bool, StorageError> {
        match self.bounded("exists", backend.exists(pointer)).await {
            Err(StorageError::InvalidLocator(reason)) => {
                warn!("Photo pointer of employee {} names no object ({:?}): {}", id, pointer, reason);
                Ok(false)
            }
            other => other,
        }
    }

    /// Delete the blob a pointer names through the backend of its kind
    async fn discard(&self, pointer: &AttachmentPointer) -> Result<(), StorageError> {
        let backend = self.backends.for_pointer(pointer)?;
        self.bounded("delete", backend.delete(pointer)).await
    }

    /// Remove blobs stored under `id`'s key prefix that no record references.
    ///
    /// Keys of renamed employees keep their old prefix, so any key still named by some
    /// record is kept. Running it again finds nothing more to delete.
    pub async fn sweep_orphans(&self, id: &EmployeeId) -> Result<SweepReport, PhotoError> {
        let _guard = self.locks.lock(id).await;

        let current = self.registry.find(id).await?.unwrap_or_default();
        let prefix = id.key_prefix();
        let mut report = SweepReport::default();

        for backend in self.backends.all() {
            let keys = self.bounded("list", backend.list_keys(&prefix)).await?;

            for key in keys {
                let Some(pointer) = backend.pointer_for_key(&key) else {
                    continue;
                };
                report.scanned += 1;

                if current.kind() == pointer.kind() && current.storage_key() == Some(key.as_str()) {
                    continue;
                }
                if self.registry.is_referenced(&key).await? {
                    debug!("Keeping {} under {}: still referenced by a record", key, prefix);
                    continue;
                }

                match self.bounded("delete", backend.delete(&pointer)).await {
                    Ok(()) => {
                        info!("Deleted orphaned photo {} from {}", key, backend.storage_type());
                        report.deleted += 1;
                    }
                    Err(e) => {
                        warn!("Failed to delete orphaned photo {}: {}", key, e);
                        report.failed += 1;
                    }
                }
            }
        }

        Ok(report)
    }

    /// Sweep every employee. Failures on one employee do not stop the sweep
    pub async fn sweep_all_orphans(&self) -> Result<SweepReport, PhotoError> {
        let mut total = SweepReport::default();

        // A write younger than the timeout may still be in flight
        for backend in self.backends.all() {
            match self.bounded("purge", backend.purge_incomplete(self.timeout)).await {
                Ok(purged) => total.purged += purged,
                Err(e) => {
                    warn!("Failed to purge incomplete writes in {}: {}", backend.storage_type(), e);
                    total.failed += 1;
                }
            }
        }

        for id in self.registry.employee_ids().await? {
            match self.sweep_orphans(&id).await {
                Ok(report) => total.absorb(report),
                Err(e) => {
                    warn!("Orphan sweep failed for employee {}: {}", id, e);
                    total.failed += 1;
                }
            }
        }
        Ok(total)
    }

    /// Ids of every employee record
    pub async fn employee_ids(&self) -> Result<Vec<EmployeeId>, PhotoError> {
        Ok(self.registry.employee_ids().await?)
    }

    /// Move `id`'s photo into the active backend if it lives elsewhere
    pub async fn migrate_pointer(
        &self,
        id: &EmployeeId,
        options: MigrationOptions,
    ) -> Result<MigrationOutcome, PhotoError> {
        let _guard = self.locks.lock(id).await;

        let pointer = self.registry.read(id).await?;
        let Some(from) = pointer.kind() else {
            return Ok(MigrationOutcome::NoPhoto);
        };
        let active = self.backends.active();
        if from == active.kind() {
            return Ok(MigrationOutcome::AlreadyActive);
        }
        if options.dry_run {
            return Ok(MigrationOutcome::WouldMigrate { from });
        }

        let source = self.backend_for(&pointer)?;
        let bytes = match self.bounded("get", source.get(&pointer)).await {
            Ok(bytes) => bytes,
            Err(StorageError::NotFound(_) | StorageError::InvalidLocator(_)) => {
                warn!("Photo of employee {} is missing from {}; clearing pointer", id, from);
                self.registry.write(id, &AttachmentPointer::Absent).await?;
                return Ok(MigrationOutcome::Repaired { from });
            }
            Err(e) => return Err(e.into()),
        };

        let key = StorageKey::derive(id, Utc::now());
        let migrated = self.bounded("put", active.put(&key, &bytes)).await?;

        if let Err(e) = self.registry.write(id, &migrated).await {
            error!("Failed to record migrated photo {} for {}; stored blob is orphaned: {}", key, id, e);
            return Err(e.into());
        }

        if !options.keep_source {
            if let Err(e) = self.bounded("delete", source.delete(&pointer)).await {
                warn!("Migrated photo of {} but failed to delete the {} copy: {}", id, from, e);
            }
        }

        info!("Migrated photo of employee {} from {} to {}", id, from, active.kind());
        Ok(MigrationOutcome::Migrated { from })
    }
}

/// Whether `pointer` already names `key` (bare or under an object folder)
fn names_key(pointer: &AttachmentPointer, key: &StorageKey) -> bool {
    pointer.storage_key().is_some_and(|existing| {
        existing == key.as_str()
            || existing
                .strip_suffix(key.as_str())
                .is_some_and(|folder| folder.ends_with('/'))
    })
}
