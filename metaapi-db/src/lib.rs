//! metaapi-db: templated MySQL access layer
//!
//! Loads symbolic query templates from a YAML file, keeps a single MySQL
//! session alive with exponential backoff, and exposes typed verbs
//! (insert/update/delete/select/boolean/execute/get_id/get_ids) over
//! moustache-style templates rendered into parameterized statements.

pub mod backoff;
pub mod config;
pub mod connection;
pub mod database;
pub mod error;
pub mod mysql;
pub mod store;
pub mod template;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use backoff::BackoffPolicy;
pub use config::{ConfigError, DbConfig, Password};
pub use connection::{ConnectionManager, Connector, Endpoint, ExecOutcome, Row, Session};
pub use database::{Database, SYSTEM_SCHEMAS};
pub use error::{DbError, Result};
pub use mysql::{MysqlConnector, MysqlSession};
pub use store::QueryStore;
pub use template::{context_from, Context, Statement, Template, TemplateError};
