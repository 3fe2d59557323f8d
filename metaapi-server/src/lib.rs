//! metaapi-server: HTTP API for user registration and per-user file storage
//!
//! Users live in MySQL behind the templated query layer in `metaapi-db`;
//! their files live in S3 under a per-user prefix.

pub mod config;
pub mod error;
pub mod extractors;
pub mod routes;
pub mod server;
pub mod state;
pub mod storage;
pub mod validation;

pub use config::{ServerConfig, StorageConfig};
pub use error::ApiError;
pub use server::{build_router, run_server, ServerError};
pub use state::AppState;
