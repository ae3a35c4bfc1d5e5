use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use super::{IndexReceipt, PartialUpdate, SearchError, SearchIndex, SearchRecord};

/// Search index client speaking the Meilisearch REST API.
///
/// Writes are queued by Meilisearch; the receipt carries the task uid.
#[derive(Debug, Clone)]
pub struct MeilisearchIndex {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskInfo {
    task_uid: Option<u64>,
}

impl From<reqwest::Error> for SearchError {
    fn from(err: reqwest::Error) -> Self {
        SearchError::Request(err.to_string())
    }
}

impl MeilisearchIndex {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, SearchError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: (!api_key.is_empty()).then(|| api_key.to_string()),
        })
    }

    fn documents_url(&self, index: &str) -> String {
        format!("{}/indexes/{index}/documents", self.base_url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn check(response: Response) -> Result<Response, SearchError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(SearchError::Rejected {
            status: status.as_u16(),
            message,
        })
    }

    async fn fetch_one(&self, index: &str, id: &str) -> Result<Option<SearchRecord>, SearchError> {
        let url = format!("{}/{id}", self.documents_url(index));
        let response = self.authorized(self.client.get(url)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let document: Value = Self::check(response).await?.json().await?;
        Ok(SearchRecord::from_document(document))
    }
}

#[async_trait]
impl SearchIndex for MeilisearchIndex {
    async fn upsert_record(
        &self,
        index: &str,
        record: SearchRecord,
    ) -> Result<IndexReceipt, SearchError> {
        let object_id = record.object_id.clone();
        let request = self
            .client
            .post(self.documents_url(index))
            .query(&[("primaryKey", "objectId")])
            .json(&[record.to_document()]);
        let response = Self::check(self.authorized(request).send().await?).await?;
        let task: TaskInfo = response.json().await?;

        tracing::debug!(index, object_id = %object_id, task_uid = ?task.task_uid, "Queued search upsert");
        Ok(IndexReceipt {
            index: index.to_string(),
            object_ids: vec![object_id],
            task_id: task.task_uid,
        })
    }

    async fn delete_records(&self, index: &str, ids: &[String]) -> Result<(), SearchError> {
        if ids.is_empty() {
            return Ok(());
        }
        let url = format!("{}/delete-batch", self.documents_url(index));
        let request = self.client.post(url).json(ids);
        Self::check(self.authorized(request).send().await?).await?;
        Ok(())
    }

    async fn fetch_records(
        &self,
        index: &str,
        ids: &[String],
    ) -> Result<Vec<SearchRecord>, SearchError> {
        let results = join_all(ids.iter().map(|id| self.fetch_one(index, id))).await;
        let mut records = Vec::with_capacity(results.len());
        for result in results {
            if let Some(record) = result? {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn batch_update(
        &self,
        index: &str,
        updates: Vec<PartialUpdate>,
    ) -> Result<(), SearchError> {
        if updates.is_empty() {
            return Ok(());
        }
        // PUT is Meilisearch's "add or update": fields not sent are kept.
        let documents: Vec<Value> = updates
            .into_iter()
            .map(|update| SearchRecord::new(update.object_id, update.fields).to_document())
            .collect();
        let request = self
            .client
            .put(self.documents_url(index))
            .query(&[("primaryKey", "objectId")])
            .json(&documents);
        Self::check(self.authorized(request).send().await?).await?;
        Ok(())
    }
}
