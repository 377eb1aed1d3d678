pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
pub mod storage;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_helpers;

#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use config::Config;
use db::Database;
use services::photo_service::PhotoService;
use storage::factory::create_storage_backends;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub photo_service: Arc<PhotoService>,
}

/// Connect to the record store, apply migrations and wire the photo lifecycle
pub async fn build_photo_service(config: &Config) -> Result<Arc<PhotoService>> {
    let db = Database::new(&config.database_url)
        .await
        .context("Failed to connect to the employee database")?;
    db.migrate().await.context("Failed to run database migrations")?;
    info!("Database ready");

    let backends = create_storage_backends(config).await?;

    Ok(Arc::new(PhotoService::new(Arc::new(db), backends, config)))
}
