use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_grpc_port")]
    pub grpc_port: u16,
    /// 指标完整性签名的共享密钥，为空时不校验。
    #[serde(default)]
    pub hash_key: String,
    /// 可信子网 CIDR，如 `192.168.1.0/24`。设置后 HTTP 请求的 `X-Real-IP`
    /// 必须落在该子网内。
    #[serde(default)]
    pub trusted_subnet: Option<String>,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// 存储后端选择：`database_url` 优先于 `store_file`，两者都未配置时仅保存在内存中。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite 或 PostgreSQL 连接 URL，如 `sqlite://data/vigil.db?mode=rwc`。
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default)]
    pub store_file: Option<String>,
    /// 快照周期（秒），0 表示每次更新后立即写快照。
    #[serde(default = "default_store_interval_secs")]
    pub store_interval_secs: u64,
    #[serde(default = "default_restore")]
    pub restore: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            store_file: None,
            store_interval_secs: default_store_interval_secs(),
            restore: default_restore(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            http_port: default_http_port(),
            grpc_port: default_grpc_port(),
            hash_key: String::new(),
            trusted_subnet: None,
            storage: StorageConfig::default(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_grpc_port() -> u16 {
    9090
}

fn default_store_interval_secs() -> u64 {
    300
}

fn default_restore() -> bool {
    true
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }
}
