use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Fields, IndexReceipt, PartialUpdate, SearchError, SearchIndex, SearchRecord};

/// In-process search index used for local development and tests.
#[derive(Debug, Default)]
pub struct InMemorySearchIndex {
    indexes: RwLock<HashMap<String, BTreeMap<String, Fields>>>,
}

impl InMemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, index: &str, object_id: &str) -> Option<SearchRecord> {
        let indexes = self.indexes.read().await;
        indexes
            .get(index)
            .and_then(|records| records.get(object_id))
            .map(|fields| SearchRecord::new(object_id, fields.clone()))
    }

    pub async fn len(&self, index: &str) -> usize {
        self.indexes
            .read()
            .await
            .get(index)
            .map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl SearchIndex for InMemorySearchIndex {
    async fn upsert_record(
        &self,
        index: &str,
        record: SearchRecord,
    ) -> Result<IndexReceipt, SearchError> {
        let mut indexes = self.indexes.write().await;
        let object_id = record.object_id.clone();
        indexes
            .entry(index.to_string())
            .or_default()
            .insert(record.object_id, record.fields);

        Ok(IndexReceipt {
            index: index.to_string(),
            object_ids: vec![object_id],
            task_id: None,
        })
    }

    async fn delete_records(&self, index: &str, ids: &[String]) -> Result<(), SearchError> {
        let mut indexes = self.indexes.write().await;
        if let Some(records) = indexes.get_mut(index) {
            for id in ids {
                records.remove(id);
            }
        }
        Ok(())
    }

    async fn fetch_records(
        &self,
        index: &str,
        ids: &[String],
    ) -> Result<Vec<SearchRecord>, SearchError> {
        let indexes = self.indexes.read().await;
        let Some(records) = indexes.get(index) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| {
                records
                    .get(id)
                    .map(|fields| SearchRecord::new(id.clone(), fields.clone()))
            })
            .collect())
    }

    async fn batch_update(
        &self,
        index: &str,
        updates: Vec<PartialUpdate>,
    ) -> Result<(), SearchError> {
        let mut indexes = self.indexes.write().await;
        let records = indexes.entry(index.to_string()).or_default();
        for update in updates {
            let existing = records.entry(update.object_id).or_default();
            for (key, value) in update.fields {
                existing.insert(key, value);
            }
        }
        Ok(())
    }
}
