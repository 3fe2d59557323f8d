//! Database configuration - loaded from environment variables
//!
//! - `DB_HOST`, `DB_USERNAME`, `DB_PASSWORD`: required
//! - `DB_PORT`: default 3306
//! - `DB_NAME`: optional default schema
//! - `PRIMARY_REGION`: region for IAM tokens (default: us-east-1)
//! - `DB_SSL_CA`: CA bundle for IAM connections
//! - `QUERY_FILE`: query definition file (default: ./sql/metaApi.yml)
//!
//! A password of exactly `IAM` switches to RDS IAM token authentication.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

pub const DEFAULT_PORT: u16 = 3306;
pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_SSL_CA: &str = "./certs/rds-combined-ca-bundle.pem";
pub const DEFAULT_QUERY_FILE: &str = "./sql/metaApi.yml";

/// Sentinel password value that requests IAM authentication
pub const IAM_SENTINEL: &str = "IAM";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {var}: '{value}'")]
    Invalid { var: &'static str, value: String },
}

/// How the connection authenticates
#[derive(Clone, PartialEq, Eq)]
pub enum Password {
    Static(String),
    /// Short-lived RDS token generated per connect attempt
    Iam,
}

impl Password {
    pub fn parse(raw: &str) -> Self {
        if raw == IAM_SENTINEL {
            Self::Iam
        } else {
            Self::Static(raw.to_string())
        }
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(_) => write!(f, "Static(***)"),
            Self::Iam => write!(f, "Iam"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Password,
    pub database: Option<String>,
    pub region: String,
    pub ssl_ca: PathBuf,
    pub query_file: PathBuf,
}

impl DbConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through an arbitrary variable lookup (for testing)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let port = match lookup("DB_PORT").filter(|v| !v.is_empty()) {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                var: "DB_PORT",
                value: raw,
            })?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            host: required("DB_HOST")?,
            port,
            username: required("DB_USERNAME")?,
            password: Password::parse(&required("DB_PASSWORD")?),
            database: lookup("DB_NAME").filter(|v| !v.is_empty()),
            region: lookup("PRIMARY_REGION")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            ssl_ca: lookup("DB_SSL_CA")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SSL_CA)),
            query_file: lookup("QUERY_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_QUERY_FILE)),
        })
    }

    pub fn uses_iam(&self) -> bool {
        self.password == Password::Iam
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
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_apply() {
        let config = DbConfig::from_lookup(lookup(&[
            ("DB_HOST", "db.local"),
            ("DB_USERNAME", "app"),
            ("DB_PASSWORD", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.port, 3306);
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.database, None);
        assert_eq!(config.query_file, PathBuf::from("./sql/metaApi.yml"));
        assert!(!config.uses_iam());
    }

    #[test]
    fn iam_sentinel_is_recognised() {
        let config = DbConfig::from_lookup(lookup(&[
            ("DB_HOST", "db.rds.amazonaws.com"),
            ("DB_PORT", "3307"),
            ("DB_USERNAME", "app"),
            ("DB_PASSWORD", "IAM"),
            ("DB_NAME", "meta"),
            ("PRIMARY_REGION", "eu-west-1"),
        ]))
        .unwrap();

        assert!(config.uses_iam());
        assert_eq!(config.port, 3307);
        assert_eq!(config.database.as_deref(), Some("meta"));
        assert_eq!(config.region, "eu-west-1");
    }

    #[test]
    fn missing_and_invalid_values() {
        let err = DbConfig::from_lookup(lookup(&[("DB_USERNAME", "app")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("DB_HOST"));

        let err = DbConfig::from_lookup(lookup(&[
            ("DB_HOST", "h"),
            ("DB_PORT", "not-a-port"),
            ("DB_USERNAME", "u"),
            ("DB_PASSWORD", "p"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "DB_PORT", .. }));
    }

    #[test]
    fn password_is_not_logged() {
        let rendered = format!("{:?}", Password::parse("hunter2"));
        assert!(!rendered.contains("hunter2"));
    }
}
