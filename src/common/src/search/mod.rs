//! Search index client interface.
//!
//! The publishing backend mirrors posts, categories and users into an external
//! search index. Writes to the index happen outside the relational
//! transaction, so every operation here exposes enough to undo it:
//! [`SearchIndex::fetch_records`] returns the snapshots a caller needs before
//! overwriting or deleting records.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::{SearchBackend, SearchConfig};

pub mod meilisearch;
pub mod memory;

pub use meilisearch::MeilisearchIndex;
pub use memory::InMemorySearchIndex;

/// Field map of a search document.
pub type Fields = Map<String, Value>;

/// A complete search document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRecord {
    pub object_id: String,
    pub fields: Fields,
}

impl SearchRecord {
    pub fn new(object_id: impl Into<String>, fields: Fields) -> Self {
        Self {
            object_id: object_id.into(),
            fields,
        }
    }

    /// Flatten into the wire document, `objectId` included.
    pub fn to_document(&self) -> Value {
        let mut document = self.fields.clone();
        document.insert("objectId".to_string(), Value::String(self.object_id.clone()));
        Value::Object(document)
    }

    /// Parse a wire document; `None` when it carries no `objectId`.
    pub fn from_document(document: Value) -> Option<Self> {
        let Value::Object(mut fields) = document else {
            return None;
        };
        let object_id = match fields.remove("objectId") {
            Some(Value::String(id)) => id,
            _ => return None,
        };
        Some(Self { object_id, fields })
    }
}

/// A partial update merged into an existing document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialUpdate {
    pub object_id: String,
    pub fields: Fields,
}

impl PartialUpdate {
    pub fn new(object_id: impl Into<String>, fields: Fields) -> Self {
        Self {
            object_id: object_id.into(),
            fields,
        }
    }

    /// A partial update that puts every field of `record` back.
    pub fn restoring(record: &SearchRecord) -> Self {
        Self::new(record.object_id.clone(), record.fields.clone())
    }
}

/// Acknowledgement of an index write.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexReceipt {
    pub index: String,
    pub object_ids: Vec<String>,
    /// Asynchronous task handle, when the backend queues writes
    pub task_id: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("search request failed: {0}")]
    Request(String),
    #[error("search service rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("invalid search payload: {0}")]
    Payload(#[from] serde_json::Error),
}

#[async_trait]
pub trait SearchIndex: Debug + Send + Sync {
    /// Create or replace a record.
    async fn upsert_record(
        &self,
        index: &str,
        record: SearchRecord,
    ) -> Result<IndexReceipt, SearchError>;

    /// Delete records by id. Unknown ids are ignored.
    async fn delete_records(&self, index: &str, ids: &[String]) -> Result<(), SearchError>;

    /// Current snapshots of the given ids; missing ids are left out.
    async fn fetch_records(
        &self,
        index: &str,
        ids: &[String],
    ) -> Result<Vec<SearchRecord>, SearchError>;

    /// Merge partial updates into existing records.
    async fn batch_update(
        &self,
        index: &str,
        updates: Vec<PartialUpdate>,
    ) -> Result<(), SearchError>;
}

/// Create the configured search index client.
pub fn create_search_index(config: &SearchConfig) -> Result<Arc<dyn SearchIndex>, SearchError> {
    match config.backend {
        SearchBackend::Memory => Ok(Arc::new(InMemorySearchIndex::new())),
        SearchBackend::Meilisearch => Ok(Arc::new(MeilisearchIndex::new(
            &config.url,
            &config.api_key,
            config.request_timeout,
        )?)),
    }
}
