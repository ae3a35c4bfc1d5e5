use std::time::Duration;

use common::StoreError;
use common::documents::DocumentError;
use common::identity::IdentityError;
use common::search::SearchError;

use crate::mover::StorageError;
use crate::references::ReferenceError;

/// Anything that can fail a mutation attempt.
///
/// Collaborator errors are kept intact so [`crate::classify`] can decide
/// between retrying and surfacing them.
#[derive(Debug, thiserror::Error)]
pub enum MutationError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("storage operation failed: {0}")]
    Storage(#[from] StorageError),

    #[error("search index operation failed: {0}")]
    SearchIndex(#[from] SearchError),

    #[error("document store operation failed: {0}")]
    DocumentStore(#[from] DocumentError),

    #[error("identity provider operation failed: {0}")]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    References(#[from] ReferenceError),

    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("attempt exceeded its deadline of {0:?}")]
    DeadlineExceeded(Duration),

    #[error("compensation for step '{0}' is already registered")]
    DuplicateStep(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl MutationError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}
