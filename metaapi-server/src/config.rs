//! Server and storage configuration

use std::net::SocketAddr;
use std::time::Duration;

use metaapi_db::ConfigError;

pub const DEFAULT_BUCKET: &str = "mgr.users.data";
pub const DEFAULT_PRESIGN_EXPIRY_SECS: u64 = 3600;

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to (default: 127.0.0.1:5000)
    pub bind_addr: SocketAddr,

    /// Allow any origin (default: true). `false` restricts CORS to localhost.
    pub cors_permissive: bool,

    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 5000)),
            cors_permissive: true,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Where user data lives and how long upload URLs stay valid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub bucket: String,
    pub presign_expiry: Duration,
    pub region: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: DEFAULT_BUCKET.to_string(),
            presign_expiry: Duration::from_secs(DEFAULT_PRESIGN_EXPIRY_SECS),
            region: None,
        }
    }
}

impl StorageConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bucket = lookup("USER_DATA_BUCKET").unwrap_or_else(|| DEFAULT_BUCKET.to_string());

        let presign_expiry = match lookup("PRESIGN_EXPIRY_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| ConfigError::Invalid {
                    var: "PRESIGN_EXPIRY_SECS",
                    value: raw.clone(),
                })?,
            None => Duration::from_secs(DEFAULT_PRESIGN_EXPIRY_SECS),
        };

        Ok(Self {
            bucket,
            presign_expiry,
            region: lookup("PRIMARY_REGION"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn default_server_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 5000);
        assert!(config.cors_permissive);
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn storage_defaults() {
        let config = StorageConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, StorageConfig::default());
    }

    #[test]
    fn storage_overrides() {
        let config = StorageConfig::from_lookup(lookup(&[
            ("USER_DATA_BUCKET", "other.bucket"),
            ("PRESIGN_EXPIRY_SECS", "60"),
            ("PRIMARY_REGION", "eu-west-1"),
        ]))
        .unwrap();
        assert_eq!(config.bucket, "other.bucket");
        assert_eq!(config.presign_expiry, Duration::from_secs(60));
        assert_eq!(config.region.as_deref(), Some("eu-west-1"));
    }

    #[test]
    fn invalid_expiry_is_rejected() {
        let err = StorageConfig::from_lookup(lookup(&[("PRESIGN_EXPIRY_SECS", "soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "PRESIGN_EXPIRY_SECS", .. }));
    }
}
