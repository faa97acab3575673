use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use super::{ResultStore, StoreError};
use crate::models::PredictionRecord;

/// Keeps records in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Vec<PredictionRecord>>,
}

impl MemoryStore {
    pub fn records(&self) -> Vec<PredictionRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn insert(&self, record: &PredictionRecord) -> Result<(), StoreError> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Label;

    #[actix_web::test]
    async fn inserts_are_appended_in_order() {
        let store = MemoryStore::default();
        let first = PredictionRecord::now("a.png".to_string(), Label::Cat, 40.0);
        let second = PredictionRecord::now("a.png".to_string(), Label::Car, 60.0);

        store.insert(&first).await.unwrap();
        store.insert(&second).await.unwrap();

        assert_eq!(store.records(), vec![first, second]);
    }
}
