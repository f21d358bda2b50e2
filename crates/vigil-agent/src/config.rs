use serde::Deserialize;

/// Wire protocol used to deliver batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Http,
    Grpc,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// `host:port` or a full URL of the server.
    #[serde(default = "default_server_address")]
    pub server_address: String,
    /// Use https when `server_address` carries no scheme
    #[serde(default)]
    pub tls: bool,
    #[serde(default)]
    pub transport: Transport,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,
    /// Maximum number of batches in flight at once.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: usize,
    /// Shared secret for metric integrity tags. Empty disables signing.
    #[serde(default)]
    pub hash_key: String,
}

fn default_server_address() -> String {
    "localhost:8080".to_string()
}

fn default_poll_interval() -> u64 {
    2
}

fn default_report_interval() -> u64 {
    10
}

fn default_rate_limit() -> usize {
    1
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server_address: default_server_address(),
            tls: false,
            transport: Transport::default(),
            poll_interval_secs: default_poll_interval(),
            report_interval_secs: default_report_interval(),
            rate_limit: default_rate_limit(),
            hash_key: String::new(),
        }
    }
}

impl AgentConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Build the server base URL from server_address and tls config.
    pub fn server_url(&self) -> String {
        let addr = self.server_address.trim().trim_end_matches('/');
        if addr.contains("://") {
            return addr.to_string();
        }
        let scheme = if self.tls { "https" } else { "http" };
        format!("{scheme}://{addr}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config: AgentConfig = toml::from_str("").unwrap();
        assert_eq!(config.transport, Transport::Http);
        assert_eq!(config.poll_interval_secs, 2);
        assert_eq!(config.report_interval_secs, 10);
        assert_eq!(config.rate_limit, 1);
        assert_eq!(config.server_url(), "http://localhost:8080");
    }

    #[test]
    fn explicit_scheme_is_kept() {
        let config: AgentConfig = toml::from_str(
            r#"
            server_address = "https://metrics.example.com/"
            transport = "grpc"
            rate_limit = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.server_url(), "https://metrics.example.com");
        assert_eq!(config.transport, Transport::Grpc);
        assert_eq!(config.rate_limit, 4);
    }
}
