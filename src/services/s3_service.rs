use anyhow::anyhow;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use aws_credential_types::Credentials;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use aws_types::region::Region as AwsRegion;

use crate::models::{AttachmentPointer, CanonicalImage, EmployeeId, PointerKind, S3StorageConfig};
use crate::storage::{StorageBackend, StorageError, StorageKey};

const MAX_RETRIES: u32 = 3;
const BASE_DELAY_MS: u64 = 100;

#[derive(Debug, Clone)]
pub struct S3Service {
    client: Client,
    config: S3StorageConfig,
}

impl S3Service {
    pub async fn new(config: S3StorageConfig) -> anyhow::Result<Self> {
        // Validate required fields
        if config.bucket_name.is_empty() {
            return Err(anyhow!("Bucket name is required"));
        }
        if config.access_key_id.is_empty() {
            return Err(anyhow!("Access key ID is required"));
        }
        if config.secret_access_key.is_empty() {
            return Err(anyhow!("Secret access key is required"));
        }

        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None, // session token
            None, // expiry
            "personnel-photo-store",
        );

        let region = if config.region.is_empty() {
            "us-east-1".to_string()
        } else {
            config.region.clone()
        };

        let mut s3_config_builder = aws_sdk_s3::config::Builder::new()
            .region(AwsRegion::new(region))
            .credentials_provider(credentials)
            .behavior_version_latest();

        // Set custom endpoint if provided (for S3-compatible services)
        if let Some(endpoint_url) = &config.endpoint_url {
            if !endpoint_url.is_empty() {
                s3_config_builder = s3_config_builder
                    .endpoint_url(endpoint_url)
                    .force_path_style(true);
                info!("Using custom S3 endpoint: {}", endpoint_url);
            }
        }

        let client = Client::from_conf(s3_config_builder.build());

        Ok(Self { client, config })
    }

    pub fn get_config(&self) -> &S3StorageConfig {
        &self.config
    }

    /// Test S3 connection and access to bucket
    pub async fn test_connection(&self) -> Result<String, StorageError> {
        info!("Testing S3 connection to bucket: {}", self.config.bucket_name);

        self.client
            .head_bucket()
            .bucket(&self.config.bucket_name)
            .send()
            .await
            .map_err(|e| {
                StorageError::Unavailable(format!("Cannot access bucket {}: {}", self.config.bucket_name, e))
            })?;

        Ok(format!("Successfully connected to S3 bucket '{}'", self.config.bucket_name))
    }

    fn object_key_of<'a>(&self, pointer: &'a AttachmentPointer) -> Result<&'a str, StorageError> {
        match pointer {
            AttachmentPointer::RemoteObject { object_key, .. } if !object_key.is_empty() => Ok(object_key),
            AttachmentPointer::RemoteObject { url, .. } => {
                Err(StorageError::InvalidLocator(format!("remote pointer without object key: {}", url)))
            }
            other => Err(StorageError::unsupported(self.storage_type(), other)),
        }
    }

    /// Metadata attached to every stored photo
    fn get_image_metadata(&self) -> HashMap<String, String> {
        let mut metadata = HashMap::new();
        metadata.insert("generated-by".to_string(), "personnel".to_string());
        metadata.insert("created-at".to_string(), chrono::Utc::now().to_rfc3339());
        metadata
    }

    /// Generic file storage method
    async fn store_file(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        info!("Storing file to S3: {}/{}", self.config.bucket_name, key);

        let metadata = self.get_image_metadata();

        self.retry_operation(&format!("store_file: {}", key), || {
            let mut put_request = self
                .client
                .put_object()
                .bucket(&self.config.bucket_name)
                .key(key)
                .content_type(CanonicalImage::CONTENT_TYPE)
                .body(ByteStream::from(data.to_vec()));

            for (k, v) in &metadata {
                put_request = put_request.metadata(k, v);
            }

            async move {
                put_request
                    .send()
                    .await
                    .map_err(|e| StorageError::Unavailable(format!("Failed to store file {}: {}", key, e)))?;
                Ok(())
            }
        })
        .await?;

        info!("Successfully stored file: {}", key);
        Ok(())
    }

    /// Retrieve a file from S3
    pub async fn retrieve_file(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        info!("Retrieving file from S3: {}/{}", self.config.bucket_name, key);

        let bytes = self
            .retry_operation(&format!("retrieve_file: {}", key), || async move {
                let response = self
                    .client
                    .get_object()
                    .bucket(&self.config.bucket_name)
                    .key(key)
                    .send()
                    .await
                    .map_err(|e| {
                        if e.as_service_error().map(|se| se.is_no_such_key()).unwrap_or(false) {
                            StorageError::NotFound(key.to_string())
                        } else {
                            StorageError::Unavailable(format!("Failed to retrieve file {}: {}", key, e))
                        }
                    })?;

                let body = response
                    .body
                    .collect()
                    .await
                    .map_err(|e| StorageError::Unavailable(format!("Failed to read file body: {}", e)))?;

                Ok(body.into_bytes().to_vec())
            })
            .await?;

        info!("Successfully retrieved file: {} ({} bytes)", key, bytes.len());
        Ok(bytes)
    }

    /// Delete a file from S3 (S3 deletes are idempotent)
    pub async fn delete_file(&self, key: &str) -> Result<(), StorageError> {
        info!("Deleting file from S3: {}/{}", self.config.bucket_name, key);

        self.client
            .delete_object()
            .bucket(&self.config.bucket_name)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::Unavailable(format!("Failed to delete file {}: {}", key, e)))?;

        info!("Successfully deleted file: {}", key);
        Ok(())
    }

    /// Check if a file exists in S3
    pub async fn file_exists(&self, key: &str) -> Result<bool, StorageError> {
        match self
            .client
            .head_object()
            .bucket(&self.config.bucket_name)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let not_found = e.as_service_error().map(|se| se.is_not_found()).unwrap_or(false);
                let error_msg = e.to_string();
                if not_found || error_msg.contains("NotFound") || error_msg.contains("404") {
                    Ok(false)
                } else {
                    Err(StorageError::Unavailable(format!(
                        "Failed to check file existence {}: {}",
                        key, e
                    )))
                }
            }
        }
    }

    /// List object keys under a prefix, following continuation tokens
    pub async fn list_objects(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut list_request = self
                .client
                .list_objects_v2()
                .bucket(&self.config.bucket_name)
                .prefix(prefix);

            if let Some(token) = &continuation_token {
                list_request = list_request.continuation_token(token);
            }

            let response = list_request
                .send()
                .await
                .map_err(|e| StorageError::Unavailable(format!("Failed to list S3 objects: {}", e)))?;

            for object in response.contents() {
                if let Some(key) = object.key() {
                    // Skip "directories" (keys ending with /)
                    if !key.ends_with('/') {
                        keys.push(key.to_string());
                    }
                }
            }

            if response.is_truncated() == Some(true) {
                continuation_token = response.next_continuation_token().map(str::to_string);
            } else {
                break;
            }
        }

        debug!("Found {} objects in S3 bucket {} prefix {}", keys.len(), self.config.bucket_name, prefix);
        Ok(keys)
    }

    /// Retry wrapper for S3 operations with exponential backoff.
    ///
    /// `NotFound` is an answer, not a failure, and is never retried.
    async fn retry_operation<T, F, Fut>(&self, operation_name: &str, operation: F) -> Result<T, StorageError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, StorageError>>,
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        info!("S3 operation '{}' succeeded after {} retries", operation_name, attempt);
                    }
                    return Ok(result);
                }
                Err(e @ StorageError::NotFound(_)) => return Err(e),
                Err(e) if attempt < MAX_RETRIES => {
                    let delay_ms = BASE_DELAY_MS * 2u64.pow(attempt);
                    warn!(
                        "S3 operation '{}' failed (attempt {}/{}), retrying in {}ms: {}",
                        operation_name,
                        attempt + 1,
                        MAX_RETRIES + 1,
                        delay_ms,
                        e
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(
                        "S3 operation '{}' failed after {} attempts: {}",
                        operation_name,
                        MAX_RETRIES + 1,
                        e
                    );
                    return Err(e);
                }
            }
        }
    }
}

// Implement StorageBackend trait for S3Service
#[async_trait]
impl StorageBackend for S3Service {
    fn kind(&self) -> PointerKind {
        PointerKind::RemoteObject
    }

    fn storage_type(&self) -> &'static str {
        "s3"
    }

    async fn initialize(&self) -> Result<(), StorageError> {
        self.test_connection().await?;
        info!("S3 storage backend initialized successfully");
        Ok(())
    }

    async fn put(&self, key: &StorageKey, data: &[u8]) -> Result<AttachmentPointer, StorageError> {
        let object_key = self.config.object_key(key.as_str());
        self.store_file(&object_key, data).await?;

        Ok(AttachmentPointer::RemoteObject {
            url: self.config.public_url_for(&object_key),
            object_key,
        })
    }

    async fn get(&self, pointer: &AttachmentPointer) -> Result<Vec<u8>, StorageError> {
        self.retrieve_file(self.object_key_of(pointer)?).await
    }

    async fn exists(&self, pointer: &AttachmentPointer) -> Result<bool, StorageError> {
        self.file_exists(self.object_key_of(pointer)?).await
    }

    async fn delete(&self, pointer: &AttachmentPointer) -> Result<(), StorageError> {
        self.delete_file(self.object_key_of(pointer)?).await
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        self.list_objects(&self.config.object_key(prefix)).await
    }

    fn pointer_for_key(&self, key: &str) -> Option<AttachmentPointer> {
        Some(AttachmentPointer::RemoteObject {
            url: self.config.public_url_for(key),
            object_key: key.to_string(),
        })
    }

    fn address(&self, _employee_id: &EmployeeId, pointer: &AttachmentPointer) -> String {
        match pointer {
            AttachmentPointer::RemoteObject { url, .. } if !url.is_empty() => url.clone(),
            AttachmentPointer::RemoteObject { object_key, .. } => self.config.public_url_for(object_key),
            _ => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> S3StorageConfig {
        S3StorageConfig {
            bucket_name: "test-bucket".to_string(),
            region: "us-east-1".to_string(),
            access_key_id: "test-key".to_string(),
            secret_access_key: "test-secret".to_string(),
            endpoint_url: Some("http://localhost:9000".to_string()),
            prefix: "fotos".to_string(),
            public_url: None,
        }
    }

    #[tokio::test]
    async fn test_s3_config_creation() {
        // This will create the client but won't test actual S3 access
        let service = S3Service::new(config()).await;
        assert!(service.is_ok());
    }

    #[tokio::test]
    async fn test_s3_service_requires_credentials() {
        let mut cfg = config();
        cfg.secret_access_key = String::new();
        let err = S3Service::new(cfg).await.unwrap_err();
        assert!(err.to_string().contains("Secret access key is required"));
    }

    #[tokio::test]
    async fn test_address_falls_back_to_object_key() {
        let service = S3Service::new(config()).await.unwrap();
        let id = EmployeeId::parse("1").unwrap();

        let pointer = AttachmentPointer::RemoteObject {
            url: String::new(),
            object_key: "fotos/1_2.jpg".to_string(),
        };
        assert_eq!(service.address(&id, &pointer), "http://localhost:9000/test-bucket/fotos/1_2.jpg");
    }

    #[tokio::test]
    async fn test_foreign_pointers_are_rejected_without_io() {
        let service = S3Service::new(config()).await.unwrap();
        let local = AttachmentPointer::LocalFile { filename: "1_2.jpg".to_string() };
        assert!(matches!(service.exists(&local).await, Err(StorageError::UnsupportedPointer { .. })));

        let keyless = AttachmentPointer::RemoteObject { url: "https://x/y".to_string(), object_key: String::new() };
        assert!(matches!(service.delete(&keyless).await, Err(StorageError::InvalidLocator(_))));

        let host_only = AttachmentPointer::from_columns(Some("https://bucket.example.com/".to_string()), None);
        assert!(matches!(service.exists(&host_only).await, Err(StorageError::InvalidLocator(_))));
    }
}
