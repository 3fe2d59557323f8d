//! In-memory object store for router tests

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{ObjectStore, ObjectSummary, PresignedUpload, StorageError};

#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<(String, String), i64>>,
    pub fail: bool,
}

impl MemoryStore {
    pub fn with_objects(bucket: &str, objects: &[(&str, i64)]) -> Self {
        let store = Self::default();
        {
            let mut map = store.objects.lock().unwrap();
            for (key, size) in objects {
                map.insert((bucket.to_string(), key.to_string()), *size);
            }
        }
        store
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.objects
            .lock()
            .unwrap()
            .contains_key(&(bucket.to_string(), key.to_string()))
    }

    fn check(&self, operation: &'static str) -> Result<(), StorageError> {
        if self.fail {
            return Err(StorageError::Sdk {
                operation,
                message: "AccessDenied".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn create_bucket(&self, _bucket: &str, _region: Option<&str>) -> bool {
        !self.fail
    }

    async fn add_user_key(&self, bucket: &str, user_id: &str) -> bool {
        if self.fail {
            return false;
        }
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), super::user_prefix(user_id)), 0);
        true
    }

    async fn presign_upload(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> Result<PresignedUpload, StorageError> {
        self.check("presign_upload")?;
        Ok(PresignedUpload {
            url: format!("https://{bucket}.s3.local/{key}?X-Amz-Expires={}", expires_in.as_secs()),
            method: "PUT".into(),
            key: key.to_string(),
            headers: BTreeMap::new(),
            expires_in: expires_in.as_secs(),
        })
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<ObjectSummary>, StorageError> {
        self.check("list_objects")?;
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|((b, k), _)| b == bucket && k.starts_with(prefix))
            .map(|((_, key), size)| ObjectSummary {
                key: key.clone(),
                size: *size,
                last_modified: Some("2024-03-05T10:11:12Z".into()),
            })
            .collect())
    }
}
