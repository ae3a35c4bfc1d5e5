//! Document store holding the user and post metadata mirror.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use object_store::{ObjectStore, PutPayload, path::Path as ObjectPath};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("document storage failed: {0}")]
    Storage(#[from] object_store::Error),
    #[error("document is not valid JSON: {0}")]
    Encoding(#[from] serde_json::Error),
}

#[async_trait]
pub trait DocumentStore: Debug + Send + Sync {
    /// Write a document, replacing any existing one at `path`.
    async fn create_document(&self, path: &str, data: &Value) -> Result<(), DocumentError>;

    /// Remove a document. Removing a missing document succeeds.
    async fn delete_document(&self, path: &str) -> Result<(), DocumentError>;

    async fn get_snapshot(&self, path: &str) -> Result<Option<Value>, DocumentError>;
}

/// Documents persisted as JSON objects in the object store, under `documents/`.
#[derive(Debug, Clone)]
pub struct ObjectStoreDocuments {
    store: Arc<dyn ObjectStore>,
    root: String,
}

impl ObjectStoreDocuments {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self::with_root(store, "documents")
    }

    pub fn with_root(store: Arc<dyn ObjectStore>, root: impl Into<String>) -> Self {
        Self {
            store,
            root: root.into(),
        }
    }

    fn location(&self, path: &str) -> ObjectPath {
        ObjectPath::from(format!("{}/{}.json", self.root, path.trim_matches('/')))
    }
}

#[async_trait]
impl DocumentStore for ObjectStoreDocuments {
    async fn create_document(&self, path: &str, data: &Value) -> Result<(), DocumentError> {
        let bytes = serde_json::to_vec(data)?;
        self.store
            .put(&self.location(path), PutPayload::from(bytes))
            .await?;
        Ok(())
    }

    async fn delete_document(&self, path: &str) -> Result<(), DocumentError> {
        match self.store.delete(&self.location(path)).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_snapshot(&self, path: &str) -> Result<Option<Value>, DocumentError> {
        let result = match self.store.get(&self.location(path)).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let bytes = result.bytes().await?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }
}
