use crate::config::{ServerConfig, StorageConfig};
use crate::middleware::TrustedSubnet;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use vigil_storage::{DbStorage, FileStorage, FileStorageConfig, MemStorage, Storage};

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub hash_key: Arc<String>,
    pub trusted_subnet: Option<TrustedSubnet>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(config: ServerConfig, storage: Arc<dyn Storage>) -> Result<Self> {
        let trusted_subnet = config
            .trusted_subnet
            .as_deref()
            .filter(|cidr| !cidr.trim().is_empty())
            .map(|cidr| {
                cidr.parse::<TrustedSubnet>()
                    .with_context(|| format!("invalid trusted_subnet {cidr:?}"))
            })
            .transpose()?;

        Ok(Self {
            storage,
            hash_key: Arc::new(config.hash_key.clone()),
            trusted_subnet,
            config: Arc::new(config),
        })
    }
}

/// 按配置打开存储后端。
pub async fn open_storage(config: &StorageConfig, hash_key: &str) -> Result<Arc<dyn Storage>> {
    if let Some(url) = config.database_url.as_deref().filter(|u| !u.is_empty()) {
        let storage = DbStorage::connect(url, hash_key)
            .await
            .context("failed to open database storage")?;
        return Ok(Arc::new(storage));
    }

    if let Some(path) = config.store_file.as_deref().filter(|p| !p.is_empty()) {
        let file_config = FileStorageConfig {
            path: PathBuf::from(path),
            interval: Duration::from_secs(config.store_interval_secs),
            restore: config.restore,
        };
        let storage = FileStorage::open(file_config, hash_key)
            .await
            .with_context(|| format!("failed to open file storage at {path}"))?;
        tracing::info!(
            path = %path,
            interval_secs = config.store_interval_secs,
            restore = config.restore,
            "Using file storage"
        );
        return Ok(Arc::new(storage));
    }

    tracing::info!("Using in-memory storage");
    Ok(Arc::new(MemStorage::new(hash_key)))
}
