use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::models::{AttachmentPointer, EmployeeId};

pub mod employees;

/// Errors raised by the employee record store
#[derive(Debug, Error)]
pub enum RecordStoreError {
    #[error("employee {0} not found")]
    RecordNotFound(EmployeeId),

    #[error("employee {0} already exists")]
    TargetExists(EmployeeId),

    #[error("record store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for RecordStoreError {
    fn from(e: sqlx::Error) -> Self {
        Self::Unavailable(format!("Database query failed: {}", e))
    }
}

/// Contract the photo lifecycle consumes from the employee table.
///
/// `get_pointer` distinguishes "no such employee" (`None`) from "employee without
/// a photo" (`Some(AttachmentPointer::Absent)`).
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn exists(&self, id: &EmployeeId) -> Result<bool, RecordStoreError>;

    async fn get_pointer(&self, id: &EmployeeId) -> Result<Option<AttachmentPointer>, RecordStoreError>;

    /// Persist a pointer; `RecordNotFound` if the employee does not exist
    async fn set_pointer(&self, id: &EmployeeId, pointer: &AttachmentPointer) -> Result<(), RecordStoreError>;

    /// Move a record to a new identifier, refusing to overwrite an existing one
    async fn rename(&self, old_id: &EmployeeId, new_id: &EmployeeId) -> Result<(), RecordStoreError>;

    /// Whether any record's pointer names the storage key `key`
    async fn references_key(&self, key: &str) -> Result<bool, RecordStoreError>;

    async fn list_employee_ids(&self) -> Result<Vec<EmployeeId>, RecordStoreError>;
}

#[derive(Clone)]
pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        Self::new_with_pool_config(database_url, 20, 2).await
    }

    pub async fn new_with_pool_config(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Some(Duration::from_secs(600)))
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Apply the embedded schema migrations
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Retry transient database failures with a short linear backoff.
    ///
    /// Identity errors (`RecordNotFound`, `TargetExists`) are answers and return immediately.
    pub async fn with_retry<T, F, Fut>(&self, operation: F) -> Result<T, RecordStoreError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, RecordStoreError>>,
    {
        const MAX_ATTEMPTS: u32 = 3;

        let mut attempt = 1;
        loop {
            match operation().await {
                Err(RecordStoreError::Unavailable(msg)) if attempt < MAX_ATTEMPTS => {
                    warn!("Database operation failed (attempt {}/{}): {}", attempt, MAX_ATTEMPTS, msg);
                    tokio::time::sleep(Duration::from_millis(100 * attempt as u64)).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}
