pub mod memory;
pub mod mongo;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::config::{StoreBackend, StoreConfig};
use crate::models::PredictionRecord;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("mongodb error: {0}")]
    Mongo(#[from] mongodb::error::Error),
}

/// Append-only sink for prediction records.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn insert(&self, record: &PredictionRecord) -> Result<(), StoreError>;
}

pub async fn connect(config: &StoreConfig) -> Result<Arc<dyn ResultStore>, StoreError> {
    match config.backend {
        StoreBackend::Mongodb => {
            info!(
                uri = %config.uri,
                database = %config.database,
                collection = %config.collection,
                "using mongodb result store"
            );
            Ok(Arc::new(MongoStore::connect(config).await?))
        }
        StoreBackend::Memory => {
            info!("using in-memory result store, records are lost on exit");
            Ok(Arc::new(MemoryStore::default()))
        }
    }
}
