//! Factory for creating storage backends based on configuration

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::blob::BlobStorageBackend;
use super::local::LocalStorageBackend;
use super::{StorageBackend, StorageConfig, StorageError};
use crate::config::Config;
use crate::models::{AttachmentPointer, PointerKind};

#[cfg(feature = "s3")]
use crate::services::s3_service::S3Service;

/// The active backend plus every other backend that pointers may still name.
///
/// New photos always go to the active backend. Existing pointers are dispatched by
/// their kind, so photos written before a backend switch stay readable and deletable.
#[derive(Clone)]
pub struct StorageBackends {
    active: Arc<dyn StorageBackend>,
    by_kind: HashMap<PointerKind, Arc<dyn StorageBackend>>,
}

impl StorageBackends {
    pub fn new(active: Arc<dyn StorageBackend>) -> Self {
        let mut by_kind = HashMap::new();
        by_kind.insert(active.kind(), active.clone());
        Self { active, by_kind }
    }

    /// Register a backend for legacy pointers; never replaces the active one
    pub fn with_fallback(mut self, backend: Arc<dyn StorageBackend>) -> Self {
        self.by_kind.entry(backend.kind()).or_insert(backend);
        self
    }

    pub fn active(&self) -> &Arc<dyn StorageBackend> {
        &self.active
    }

    pub fn for_kind(&self, kind: PointerKind) -> Option<&Arc<dyn StorageBackend>> {
        self.by_kind.get(&kind)
    }

    /// Backend that owns the object a pointer names
    pub fn for_pointer(&self, pointer: &AttachmentPointer) -> Result<&Arc<dyn StorageBackend>, StorageError> {
        let kind = pointer
            .kind()
            .ok_or_else(|| StorageError::InvalidLocator("absent pointer has no backend".to_string()))?;

        self.for_kind(kind).ok_or_else(|| {
            StorageError::Unavailable(format!("no {} storage backend is configured", kind))
        })
    }

    /// Every registered backend, active one included
    pub fn all(&self) -> impl Iterator<Item = &Arc<dyn StorageBackend>> {
        self.by_kind.values()
    }
}

/// Create a storage backend based on the provided configuration
pub async fn create_storage_backend(config: StorageConfig) -> Result<Arc<dyn StorageBackend>> {
    match config {
        StorageConfig::Local { upload_path, public_base_url } => {
            let backend = LocalStorageBackend::new(upload_path, public_base_url);
            backend.initialize().await?;
            Ok(Arc::new(backend))
        }
        StorageConfig::Blob { public_base_url } => Ok(Arc::new(BlobStorageBackend::new(public_base_url))),
        #[cfg(feature = "s3")]
        StorageConfig::S3 { s3_config } => {
            let backend = S3Service::new(s3_config).await?;
            backend.initialize().await?;
            Ok(Arc::new(backend))
        }
    }
}

/// Create the active storage configuration from the loaded config
pub fn storage_config_from_env(config: &Config) -> Result<StorageConfig> {
    match config.photo_backend {
        PointerKind::LocalFile => Ok(StorageConfig::Local {
            upload_path: config.upload_path.clone(),
            public_base_url: config.public_base_url.clone(),
        }),
        PointerKind::Blob => Ok(StorageConfig::Blob {
            public_base_url: config.public_base_url.clone(),
        }),
        PointerKind::RemoteObject => {
            #[cfg(feature = "s3")]
            {
                let s3_config = config
                    .s3_config
                    .clone()
                    .context("PHOTO_BACKEND=s3 requires S3_BUCKET_NAME and credentials")?;
                Ok(StorageConfig::S3 { s3_config })
            }
            #[cfg(not(feature = "s3"))]
            {
                Err(anyhow::anyhow!("S3 storage requested but the s3 feature is not compiled in"))
            }
        }
    }
}

/// Build the active backend and register the others for pointers left by earlier deployments
pub async fn create_storage_backends(config: &Config) -> Result<StorageBackends> {
    let active = create_storage_backend(storage_config_from_env(config)?)
        .await
        .context("Failed to initialize the active photo storage backend")?;
    info!("Active photo storage backend: {}", active.storage_type());

    let mut backends = StorageBackends::new(active)
        .with_fallback(Arc::new(BlobStorageBackend::new(config.public_base_url.clone())));

    if config.photo_backend != PointerKind::LocalFile {
        let local = LocalStorageBackend::new(config.upload_path.clone(), config.public_base_url.clone());
        if let Err(e) = local.initialize().await {
            warn!("Local photo directory unavailable for legacy pointers: {}", e);
        }
        backends = backends.with_fallback(Arc::new(local));
    }

    #[cfg(feature = "s3")]
    {
        if config.photo_backend != PointerKind::RemoteObject {
            if let Some(s3_config) = config.s3_config.clone() {
                match S3Service::new(s3_config).await {
                    Ok(service) => backends = backends.with_fallback(Arc::new(service)),
                    Err(e) => warn!("S3 configured but unusable for legacy pointers: {}", e),
                }
            }
        }
    }

    Ok(backends)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dispatches_by_pointer_kind() {
        let dir = tempfile::tempdir().unwrap();
        let local: Arc<dyn StorageBackend> = Arc::new(LocalStorageBackend::new(dir.path(), ""));
        let backends = StorageBackends::new(Arc::new(BlobStorageBackend::new(""))).with_fallback(local);

        assert_eq!(backends.active().kind(), PointerKind::Blob);

        let legacy = AttachmentPointer::LocalFile { filename: "1_2.jpg".to_string() };
        assert_eq!(backends.for_pointer(&legacy).unwrap().storage_type(), "local");

        let remote = AttachmentPointer::RemoteObject { url: String::new(), object_key: "k".to_string() };
        assert!(matches!(backends.for_pointer(&remote), Err(StorageError::Unavailable(_))));
        assert!(matches!(
            backends.for_pointer(&AttachmentPointer::Absent),
            Err(StorageError::InvalidLocator(_))
        ));
    }

    #[tokio::test]
    async fn fallback_never_replaces_active() {
        let dir = tempfile::tempdir().unwrap();
        let active: Arc<dyn StorageBackend> = Arc::new(LocalStorageBackend::new(dir.path().join("a"), ""));
        let other: Arc<dyn StorageBackend> = Arc::new(LocalStorageBackend::new(dir.path().join("b"), ""));

        let backends = StorageBackends::new(active.clone()).with_fallback(other);
        assert!(Arc::ptr_eq(backends.for_kind(PointerKind::LocalFile).unwrap(), &active));
        assert_eq!(backends.all().count(), 1);
    }

    #[tokio::test]
    async fn s3_backend_requires_bucket_settings() {
        let mut config = crate::test_helpers::create_test_config();
        config.photo_backend = PointerKind::RemoteObject;
        config.s3_config = None;

        assert!(storage_config_from_env(&config).is_err());
    }
}
