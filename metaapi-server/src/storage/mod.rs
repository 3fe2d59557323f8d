//! Per-user object storage
//!
//! Every user owns a `<user_id>/` prefix in a shared bucket. Uploads go
//! straight to the bucket through presigned URLs; the API only hands out
//! URLs and lists what is already there.

mod keys;
#[cfg(test)]
pub(crate) mod memory;
mod s3;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

pub use keys::{display_name, upload_key, user_prefix};
pub use s3::S3Store;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("{operation} failed: {message}")]
    Sdk {
        operation: &'static str,
        message: String,
    },

    #[error("invalid presign expiry: {0}")]
    Presign(String),
}

/// A presigned upload request handed to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresignedUpload {
    pub url: String,
    pub method: String,
    pub key: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    pub expires_in: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: i64,
    /// RFC 3339 timestamp, when the backend reports one
    pub last_modified: Option<String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Create a bucket. Client errors are logged and reported as `false`.
    async fn create_bucket(&self, bucket: &str, region: Option<&str>) -> bool;

    /// Put the empty `<user_id>/` marker object. `false` on failure.
    async fn add_user_key(&self, bucket: &str, user_id: &str) -> bool;

    async fn presign_upload(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> Result<PresignedUpload, StorageError>;

    /// All objects under `prefix`, following continuation tokens
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<ObjectSummary>, StorageError>;
}
