//! Search index writes that register their own reversal.

use std::sync::Arc;

use common::search::{IndexReceipt, PartialUpdate, SearchError, SearchIndex, SearchRecord};
use futures::future::join_all;

use crate::error::MutationError;
use crate::rollback::RollbackRegistry;

#[derive(Debug, thiserror::Error)]
#[error("{failed} of {total} search restores failed, first: {first}")]
struct RestoreError {
    failed: usize,
    total: usize,
    first: SearchError,
}

/// Put `snapshots` back and delete `created`, attempting every write.
async fn restore(
    index: Arc<dyn SearchIndex>,
    index_name: String,
    snapshots: Vec<SearchRecord>,
    created: Vec<String>,
) -> Result<(), RestoreError> {
    let mut total = snapshots.len();
    let mut errors: Vec<SearchError> = join_all(
        snapshots
            .into_iter()
            .map(|snapshot| index.upsert_record(&index_name, snapshot)),
    )
    .await
    .into_iter()
    .filter_map(Result::err)
    .collect();

    if !created.is_empty() {
        total += 1;
        if let Err(e) = index.delete_records(&index_name, &created).await {
            errors.push(e);
        }
    }

    let failed = errors.len();
    match errors.into_iter().next() {
        None => Ok(()),
        Some(first) => {
            tracing::warn!(index = %index_name, failed, total, error = %first, "Failed to restore search records");
            Err(RestoreError { failed, total, first })
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchSync {
    index: Arc<dyn SearchIndex>,
}

impl SearchSync {
    pub fn new(index: Arc<dyn SearchIndex>) -> Self {
        Self { index }
    }

    pub fn index(&self) -> &Arc<dyn SearchIndex> {
        &self.index
    }

    /// Upsert a new record; reversed by deleting it.
    pub async fn create(
        &self,
        step: &str,
        index_name: &str,
        record: SearchRecord,
        rollback: &mut RollbackRegistry,
    ) -> Result<IndexReceipt, MutationError> {
        let object_id = record.object_id.clone();
        let receipt = self.index.upsert_record(index_name, record).await?;

        let index = self.index.clone();
        let index_name = index_name.to_string();
        rollback.register(step, move || async move {
            index.delete_records(&index_name, &[object_id]).await
        })?;
        Ok(receipt)
    }

    /// Merge partial updates; reversed by restoring the records as they were.
    ///
    /// Records that did not exist before are deleted on reversal.
    pub async fn update(
        &self,
        step: &str,
        index_name: &str,
        updates: Vec<PartialUpdate>,
        rollback: &mut RollbackRegistry,
    ) -> Result<(), MutationError> {
        if updates.is_empty() {
            return Ok(());
        }

        let ids: Vec<String> = updates.iter().map(|u| u.object_id.clone()).collect();
        let snapshots = self.index.fetch_records(index_name, &ids).await?;
        self.index.batch_update(index_name, updates).await?;

        let created: Vec<String> = ids
            .into_iter()
            .filter(|id| !snapshots.iter().any(|s| &s.object_id == id))
            .collect();
        let index = self.index.clone();
        let index_name = index_name.to_string();
        // upsert replaces the whole record, dropping fields the update added
        rollback.register(step, move || restore(index, index_name, snapshots, created))?;
        Ok(())
    }

    /// Delete records; reversed by re-upserting their snapshots.
    pub async fn delete(
        &self,
        step: &str,
        index_name: &str,
        ids: Vec<String>,
        rollback: &mut RollbackRegistry,
    ) -> Result<(), MutationError> {
        if ids.is_empty() {
            return Ok(());
        }

        let snapshots = self.index.fetch_records(index_name, &ids).await?;
        self.index.delete_records(index_name, &ids).await?;

        let index = self.index.clone();
        let index_name = index_name.to_string();
        rollback.register(step, move || restore(index, index_name, snapshots, Vec::new()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::search::{Fields, InMemorySearchIndex};
    use serde_json::json;

    fn fields(value: serde_json::Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    fn setup() -> (Arc<InMemorySearchIndex>, SearchSync) {
        let index = Arc::new(InMemorySearchIndex::new());
        let sync = SearchSync::new(index.clone());
        (index, sync)
    }

    #[tokio::test]
    async fn test_create_is_reversed_by_delete() {
        let (index, sync) = setup();
        let mut rollback = RollbackRegistry::new();

        sync.create(
            "index-post",
            "posts",
            SearchRecord::new("p1", fields(json!({"title": "Hello"}))),
            &mut rollback,
        )
        .await
        .unwrap();
        assert!(index.get("posts", "p1").await.is_some());

        assert!(rollback.settle().await.is_clean());
        assert!(index.get("posts", "p1").await.is_none());
    }

    #[tokio::test]
    async fn test_update_restores_snapshot() {
        let (index, sync) = setup();
        let original = SearchRecord::new("p1", fields(json!({"title": "Hello", "published": false})));
        index.upsert_record("posts", original.clone()).await.unwrap();

        let mut rollback = RollbackRegistry::new();
        sync.update(
            "update-search",
            "posts",
            vec![
                PartialUpdate::new("p1", fields(json!({"title": "Changed", "views": 3}))),
                PartialUpdate::new("p2", fields(json!({"title": "New"}))),
            ],
            &mut rollback,
        )
        .await
        .unwrap();
        assert_eq!(index.get("posts", "p1").await.unwrap().fields["title"], "Changed");

        assert!(rollback.settle().await.is_clean());
        assert_eq!(index.get("posts", "p1").await, Some(original));
        assert!(index.get("posts", "p2").await.is_none());
    }

    /// Index whose upserts of one record always fail.
    #[derive(Debug)]
    struct RejectingIndex {
        inner: InMemorySearchIndex,
        rejected: &'static str,
    }

    #[async_trait::async_trait]
    impl SearchIndex for RejectingIndex {
        async fn upsert_record(
            &self,
            index: &str,
            record: SearchRecord,
        ) -> Result<IndexReceipt, SearchError> {
            if record.object_id == self.rejected {
                return Err(SearchError::Request("connection reset".into()));
            }
            self.inner.upsert_record(index, record).await
        }

        async fn delete_records(&self, index: &str, ids: &[String]) -> Result<(), SearchError> {
            self.inner.delete_records(index, ids).await
        }

        async fn fetch_records(
            &self,
            index: &str,
            ids: &[String],
        ) -> Result<Vec<SearchRecord>, SearchError> {
            self.inner.fetch_records(index, ids).await
        }

        async fn batch_update(
            &self,
            index: &str,
            updates: Vec<PartialUpdate>,
        ) -> Result<(), SearchError> {
            self.inner.batch_update(index, updates).await
        }
    }

    #[tokio::test]
    async fn test_failed_restore_does_not_abandon_other_records() {
        let inner = InMemorySearchIndex::new();
        for id in ["p1", "p2", "p3"] {
            inner
                .upsert_record("posts", SearchRecord::new(id, fields(json!({"categoryId": "c1"}))))
                .await
                .unwrap();
        }
        let index = Arc::new(RejectingIndex {
            inner,
            rejected: "p1",
        });
        let sync = SearchSync::new(index.clone());

        let mut rollback = RollbackRegistry::new();
        sync.update(
            "detach-posts",
            "posts",
            ["p1", "p2", "p3"]
                .into_iter()
                .map(|id| PartialUpdate::new(id, fields(json!({"categoryId": null}))))
                .collect(),
            &mut rollback,
        )
        .await
        .unwrap();

        let report = rollback.settle().await;
        assert_eq!(report.failed_steps(), vec!["detach-posts"]);
        for id in ["p2", "p3"] {
            let record = index.inner.get("posts", id).await.unwrap();
            assert_eq!(record.fields["categoryId"], "c1", "{id}");
        }
        let record = index.inner.get("posts", "p1").await.unwrap();
        assert!(record.fields["categoryId"].is_null());
    }

    #[tokio::test]
    async fn test_delete_is_reversed_by_reupsert() {
        let (index, sync) = setup();
        let record = SearchRecord::new("u1", fields(json!({"username": "ada"})));
        index.upsert_record("users", record.clone()).await.unwrap();

        let mut rollback = RollbackRegistry::new();
        sync.delete("unindex-user", "users", vec!["u1".to_string()], &mut rollback)
            .await
            .unwrap();
        assert_eq!(index.len("users").await, 0);

        rollback.settle().await;
        assert_eq!(index.get("users", "u1").await, Some(record));
    }
}
