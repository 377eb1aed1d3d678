use anyhow::{Context, Result};
use std::env;
use std::time::Duration;
use tracing::{info, warn};

use crate::models::{PointerKind, S3StorageConfig};

const DEFAULT_UPLOAD_PATH: &str = "./uploads/fotos";
const DEFAULT_S3_PREFIX: &str = "fotos";

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub server_address: String,
    pub upload_path: String,
    /// Prefix for photo addresses handed to callers; empty means relative paths
    pub public_base_url: String,

    // Photo storage
    pub photo_backend: PointerKind,
    pub max_file_size_mb: u64,
    pub backend_timeout_seconds: u64,
    pub orphan_sweep_interval_minutes: Option<u64>,

    // S3 Configuration
    pub s3_config: Option<S3StorageConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let database_url = match env::var("DATABASE_URL") {
            Ok(url) => url,
            Err(_) => {
                let host = env::var("POSTGRES_HOST").unwrap_or_else(|_| "localhost".to_string());
                let port = env::var("POSTGRES_PORT").unwrap_or_else(|_| "5432".to_string());
                let db = env::var("POSTGRES_DB").unwrap_or_else(|_| "personnel".to_string());
                let user = env::var("POSTGRES_USER").unwrap_or_else(|_| "personnel".to_string());
                let password = env::var("POSTGRES_PASSWORD").unwrap_or_else(|_| "personnel".to_string());
                format!("postgresql://{}:{}@{}:{}/{}", user, password, host, port, db)
            }
        };

        let photo_backend = match env::var("PHOTO_BACKEND") {
            Ok(value) if !value.trim().is_empty() => {
                PointerKind::try_from(value.trim().to_string()).map_err(anyhow::Error::msg)?
            }
            _ => PointerKind::LocalFile,
        };

        let config = Config {
            database_url,
            server_address: env::var("SERVER_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8000".to_string()),
            upload_path: env::var("UPLOAD_PATH").unwrap_or_else(|_| DEFAULT_UPLOAD_PATH.to_string()),
            public_base_url: env::var("PUBLIC_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_default(),
            photo_backend,
            max_file_size_mb: parse_env("MAX_FILE_SIZE_MB")?.unwrap_or(10),
            backend_timeout_seconds: parse_env("BACKEND_TIMEOUT_SECONDS")?.unwrap_or(10),
            orphan_sweep_interval_minutes: parse_env("ORPHAN_SWEEP_INTERVAL_MINUTES")?.filter(|m| *m > 0),
            s3_config: s3_config_from_env(),
        };

        if config.backend_timeout_seconds == 0 {
            anyhow::bail!("BACKEND_TIMEOUT_SECONDS must be greater than zero");
        }

        if config.photo_backend == PointerKind::RemoteObject && config.s3_config.is_none() {
            anyhow::bail!("PHOTO_BACKEND=s3 requires S3_BUCKET_NAME, S3_ACCESS_KEY_ID and S3_SECRET_ACCESS_KEY");
        }

        info!(
            "Loaded configuration: server={}, backend={}, upload_path={}, timeout={}s",
            config.server_address, config.photo_backend, config.upload_path, config.backend_timeout_seconds
        );

        Ok(config)
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_seconds)
    }

    pub fn max_file_size_bytes(&self) -> usize {
        (self.max_file_size_mb as usize).saturating_mul(1024 * 1024)
    }
}

fn parse_env(name: &str) -> Result<Option<u64>> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .with_context(|| format!("{} must be a non-negative integer, got {:?}", name, value)),
        _ => Ok(None),
    }
}

fn s3_config_from_env() -> Option<S3StorageConfig> {
    let bucket_name = env::var("S3_BUCKET_NAME").ok().filter(|v| !v.is_empty())?;

    let access_key_id = env::var("S3_ACCESS_KEY_ID").unwrap_or_default();
    let secret_access_key = env::var("S3_SECRET_ACCESS_KEY").unwrap_or_default();
    if access_key_id.is_empty() || secret_access_key.is_empty() {
        warn!("S3_BUCKET_NAME is set but S3 credentials are missing; ignoring S3 settings");
        return None;
    }

    Some(S3StorageConfig {
        bucket_name,
        region: env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
        access_key_id,
        secret_access_key,
        endpoint_url: env::var("S3_ENDPOINT_URL").ok().filter(|v| !v.is_empty()),
        prefix: env::var("S3_PREFIX").unwrap_or_else(|_| DEFAULT_S3_PREFIX.to_string()),
        public_url: env::var("S3_PUBLIC_URL").ok().filter(|v| !v.is_empty()),
    })
}
