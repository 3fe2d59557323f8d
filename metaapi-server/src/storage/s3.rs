//! S3 backend on aws-sdk-s3

use std::time::Duration;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::{ByteStream, DateTimeFormat};
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::Client;

use super::{ObjectStore, ObjectSummary, PresignedUpload, StorageError};

/// Buckets in this region must be created without a location constraint
const DEFAULT_REGION: &str = "us-east-1";

pub struct S3Store {
    sdk_config: SdkConfig,
    client: Client,
}

impl S3Store {
    /// Load credentials and region from the standard AWS provider chain
    pub async fn from_env(region: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region.to_string()));
        }
        Self::new(loader.load().await)
    }

    pub fn new(sdk_config: SdkConfig) -> Self {
        let client = Client::new(&sdk_config);
        Self { sdk_config, client }
    }

    fn client_for(&self, region: &str) -> Client {
        let conf = aws_sdk_s3::config::Builder::from(&self.sdk_config)
            .region(Region::new(region.to_string()))
            .build();
        Client::from_conf(conf)
    }
}

fn sdk_error<E>(operation: &'static str, err: E) -> StorageError
where
    E: std::error::Error + Send + Sync + 'static,
{
    StorageError::Sdk {
        operation,
        message: DisplayErrorContext(err).to_string(),
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn create_bucket(&self, bucket: &str, region: Option<&str>) -> bool {
        let request = match region {
            Some(region) if region != DEFAULT_REGION => {
                let location = CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build();
                self.client_for(region)
                    .create_bucket()
                    .bucket(bucket)
                    .create_bucket_configuration(location)
            }
            _ => self.client.create_bucket().bucket(bucket),
        };

        match request.send().await {
            Ok(_) => {
                tracing::info!(bucket, region = ?region, "Created bucket");
                true
            }
            Err(e) => {
                tracing::error!(bucket, error = %DisplayErrorContext(e), "create_bucket failed");
                false
            }
        }
    }

    async fn add_user_key(&self, bucket: &str, user_id: &str) -> bool {
        let key = super::user_prefix(user_id);
        let result = self
            .client
            .put_object()
            .bucket(bucket)
            .key(&key)
            .body(ByteStream::from_static(b""))
            .send()
            .await;

        match result {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(bucket, key = %key, error = %DisplayErrorContext(e), "add_user_key failed");
                false
            }
        }
    }

    async fn presign_upload(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> Result<PresignedUpload, StorageError> {
        let presigning = PresigningConfig::expires_in(expires_in)
            .map_err(|e| StorageError::Presign(e.to_string()))?;

        let request = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| sdk_error("presign_upload", e))?;

        Ok(PresignedUpload {
            url: request.uri().to_string(),
            method: request.method().to_string(),
            key: key.to_string(),
            headers: request
                .headers()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            expires_in: expires_in.as_secs(),
        })
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<ObjectSummary>, StorageError> {
        let mut objects = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let page = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .set_continuation_token(token.take())
                .send()
                .await
                .map_err(|e| sdk_error("list_objects", e))?;

            for object in page.contents() {
                let Some(key) = object.key() else { continue };
                objects.push(ObjectSummary {
                    key: key.to_string(),
                    size: object.size().unwrap_or_default(),
                    last_modified: object
                        .last_modified()
                        .and_then(|t| t.fmt(DateTimeFormat::DateTime).ok()),
                });
            }

            match page.next_continuation_token() {
                Some(next) if page.is_truncated().unwrap_or(false) => {
                    token = Some(next.to_string());
                }
                _ => break,
            }
        }

        tracing::debug!(bucket, prefix, count = objects.len(), "Listed objects");
        Ok(objects)
    }
}
