//! Document store writes that register their own reversal.

use std::sync::Arc;

use common::documents::DocumentStore;
use serde_json::Value;

use crate::error::MutationError;
use crate::rollback::RollbackRegistry;

#[derive(Debug, Clone)]
pub struct DocumentSync {
    store: Arc<dyn DocumentStore>,
}

impl DocumentSync {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Write `data` at `path`; reversed by restoring the previous document,
    /// or by deleting it when there was none.
    pub async fn write(
        &self,
        step: &str,
        path: &str,
        data: &Value,
        rollback: &mut RollbackRegistry,
    ) -> Result<(), MutationError> {
        let snapshot = self.store.get_snapshot(path).await?;
        self.store.create_document(path, data).await?;

        let store = self.store.clone();
        let path = path.to_string();
        rollback.register(step, move || async move {
            match snapshot {
                Some(previous) => store.create_document(&path, &previous).await,
                None => store.delete_document(&path).await,
            }
        })?;
        Ok(())
    }

    /// Delete the document at `path`; reversed by recreating it.
    pub async fn remove(
        &self,
        step: &str,
        path: &str,
        rollback: &mut RollbackRegistry,
    ) -> Result<(), MutationError> {
        let Some(snapshot) = self.store.get_snapshot(path).await? else {
            return Ok(());
        };
        self.store.delete_document(path).await?;

        let store = self.store.clone();
        let path = path.to_string();
        rollback.register(step, move || async move {
            store.create_document(&path, &snapshot).await
        })?;
        Ok(())
    }
}
