//! Application state shared across handlers

use std::sync::Arc;

use metaapi_db::{Connector, Database, MysqlConnector};

use crate::config::StorageConfig;
use crate::storage::ObjectStore;

/// Shared application state, handed to handlers as `State<Arc<AppState<C>>>`
pub struct AppState<C: Connector = MysqlConnector> {
    pub db: Arc<Database<C>>,
    pub storage: Arc<dyn ObjectStore>,
    pub storage_config: StorageConfig,
}

impl<C: Connector> AppState<C> {
    pub fn new(
        db: Arc<Database<C>>,
        storage: Arc<dyn ObjectStore>,
        storage_config: StorageConfig,
    ) -> Self {
        Self {
            db,
            storage,
            storage_config,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.storage_config.bucket
    }
}
