use async_trait::async_trait;
use mongodb::{Client, Collection};

use super::{ResultStore, StoreError};
use crate::config::StoreConfig;
use crate::models::PredictionRecord;

pub struct MongoStore {
    collection: Collection<PredictionRecord>,
}

impl MongoStore {
    /// Parses the URI and builds a client. The server is first contacted on insert.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(&config.uri).await?;
        let collection = client
            .database(&config.database)
            .collection::<PredictionRecord>(&config.collection);
        Ok(Self { collection })
    }
}

#[async_trait]
impl ResultStore for MongoStore {
    async fn insert(&self, record: &PredictionRecord) -> Result<(), StoreError> {
        self.collection.insert_one(record, None).await?;
        Ok(())
    }
}
