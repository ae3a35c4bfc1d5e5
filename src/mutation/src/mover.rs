use std::sync::Arc;

use futures::TryStreamExt;
use futures::future::join_all;
use object_store::ObjectStore;
use object_store::path::Path as ObjectPath;

use crate::error::MutationError;
use crate::layout;
use crate::rollback::RollbackRegistry;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object store request failed: {0}")]
    ObjectStore(#[from] object_store::Error),
    #[error("{failed} of {total} objects could not be moved to '{destination}'")]
    PartialMove {
        failed: usize,
        total: usize,
        destination: String,
    },
    #[error("{failed} of {total} objects could not be moved back")]
    PartialRevert { failed: usize, total: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovedObject {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedMove {
    pub from: String,
    pub to: String,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct MoveOutcome {
    pub moved: Vec<MovedObject>,
    pub failed: Vec<FailedMove>,
}

impl MoveOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Moves objects between prefixes of the object store.
#[derive(Debug, Clone)]
pub struct ObjectMover {
    store: Arc<dyn ObjectStore>,
}

impl ObjectMover {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    async fn move_one(&self, from: &str, to: &str) -> Result<(), object_store::Error> {
        if from == to {
            return Ok(());
        }
        self.store
            .rename(&ObjectPath::from(from), &ObjectPath::from(to))
            .await
    }

    /// Move every source into `destination` concurrently, keeping file names.
    pub async fn move_batch(&self, sources: &[String], destination: &str) -> MoveOutcome {
        self.move_pairs(
            sources
                .iter()
                .map(|from| (from.clone(), layout::destination(from, destination)))
                .collect(),
        )
        .await
    }

    async fn move_pairs(&self, pairs: Vec<(String, String)>) -> MoveOutcome {
        let moves = pairs.into_iter().map(|(from, to)| async move {
            let result = self.move_one(&from, &to).await;
            (from, to, result)
        });

        let mut outcome = MoveOutcome::default();
        for (from, to, result) in join_all(moves).await {
            match result {
                Ok(()) => outcome.moved.push(MovedObject { from, to }),
                Err(e) => {
                    tracing::warn!(from = %from, to = %to, error = %e, "Failed to move object");
                    outcome.failed.push(FailedMove {
                        from,
                        to,
                        error: e.to_string(),
                    });
                }
            }
        }
        outcome
    }

    /// New names of the objects that were moved; failures are logged and dropped.
    pub async fn move_objects(&self, sources: &[String], destination: &str) -> Vec<String> {
        self.move_batch(sources, destination)
            .await
            .moved
            .into_iter()
            .map(|m| m.to)
            .collect()
    }

    /// Move each object back to where it came from.
    pub async fn revert(&self, moved: &[MovedObject]) -> Result<(), StorageError> {
        let reverts = moved.iter().map(|m| async move {
            let result = self.move_one(&m.to, &m.from).await;
            if let Err(e) = &result {
                tracing::warn!(from = %m.to, to = %m.from, error = %e, "Failed to move object back");
            }
            result
        });
        let failed = join_all(reverts)
            .await
            .into_iter()
            .filter(Result::is_err)
            .count();
        if failed > 0 {
            return Err(StorageError::PartialRevert {
                failed,
                total: moved.len(),
            });
        }
        Ok(())
    }

    pub async fn list_objects(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let prefix = ObjectPath::from(prefix);
        let objects: Vec<_> = self.store.list(Some(&prefix)).try_collect().await?;
        let mut paths: Vec<String> = objects.into_iter().map(|o| o.location.to_string()).collect();
        paths.sort();
        Ok(paths)
    }

    /// Move `sources` into `destination` as one mutation step.
    ///
    /// An empty batch registers nothing.
    pub async fn relocate(
        &self,
        step: &str,
        sources: &[String],
        destination: &str,
        rollback: &mut RollbackRegistry,
    ) -> Result<Vec<MovedObject>, MutationError> {
        if sources.is_empty() {
            return Ok(Vec::new());
        }
        let outcome = self.move_batch(sources, destination).await;
        self.register_outcome(step, destination, outcome, rollback)
    }

    /// Move everything under `root` to the same relative paths under
    /// `destination` as one mutation step.
    pub async fn relocate_tree(
        &self,
        step: &str,
        root: &str,
        destination: &str,
        rollback: &mut RollbackRegistry,
    ) -> Result<Vec<MovedObject>, MutationError> {
        let sources = self.list_objects(root).await?;
        if sources.is_empty() {
            return Ok(Vec::new());
        }
        let pairs = sources
            .into_iter()
            .map(|from| {
                let to = layout::rebase(&from, root, destination);
                (from, to)
            })
            .collect();
        let outcome = self.move_pairs(pairs).await;
        self.register_outcome(step, destination, outcome, rollback)
    }

    /// Register the revert of whatever `outcome` moved, then fail if anything
    /// did not move.
    ///
    /// Used directly when several batches run concurrently.
    pub fn register_outcome(
        &self,
        step: &str,
        destination: &str,
        outcome: MoveOutcome,
        rollback: &mut RollbackRegistry,
    ) -> Result<Vec<MovedObject>, MutationError> {
        if !outcome.moved.is_empty() {
            let mover = self.clone();
            let moved = outcome.moved.clone();
            rollback.register(step, move || async move { mover.revert(&moved).await })?;
        }

        if !outcome.is_complete() {
            return Err(StorageError::PartialMove {
                failed: outcome.failed.len(),
                total: outcome.moved.len() + outcome.failed.len(),
                destination: destination.to_string(),
            }
            .into());
        }
        Ok(outcome.moved)
    }
}
