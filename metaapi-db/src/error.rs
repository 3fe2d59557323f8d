//! Error types for metaapi-db
//!
//! Startup failures (query file, configuration) are fatal to the caller.
//! Connection failures surface only after the backoff policy is exhausted.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::template::TemplateError;

/// Main error type for database operations
#[derive(Error, Debug)]
pub enum DbError {
    /// Query definition file could not be read
    #[error("could not read query definitions from {path:?}: {source}")]
    QueryFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Query definition file is not a name -> template mapping
    #[error("malformed query definitions in {path:?}: {source}")]
    QueryParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A registered template failed to compile
    #[error("query '{name}' has an invalid template: {source}")]
    QueryTemplate {
        name: String,
        #[source]
        source: TemplateError,
    },

    /// Called with an empty query name or template
    #[error("no query specified")]
    NoQuery,

    /// Literal template failed to compile or render
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// Backoff ceiling reached without a usable connection
    #[error("could not establish MySQL connection after {attempts} attempts")]
    ConnectExhausted { attempts: u32 },

    /// No session available after reconnecting
    #[error("problem connecting to database")]
    NoConnection,

    /// RDS IAM token generation failed
    #[error("could not generate IAM auth token: {reason}")]
    AuthToken { reason: String },

    /// Driver-level failure
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Result type alias for database operations
pub type Result<T> = std::result::Result<T, DbError>;

impl DbError {
    pub fn auth_token(reason: impl Into<String>) -> Self {
        Self::AuthToken {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        assert_eq!(DbError::NoQuery.to_string(), "no query specified");
        assert_eq!(
            DbError::ConnectExhausted { attempts: 6 }.to_string(),
            "could not establish MySQL connection after 6 attempts"
        );
        assert_eq!(
            DbError::NoConnection.to_string(),
            "problem connecting to database"
        );
    }

    #[test]
    fn template_error_is_transparent() {
        let err: DbError = TemplateError::UnclosedSection {
            name: "rows".into(),
        }
        .into();
        assert_eq!(err.to_string(), "section 'rows' is never closed");
    }
}
