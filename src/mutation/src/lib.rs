//! Multi-step mutations across the relational store, object storage, the
//! search index, the document store and the identity provider.
//!
//! Every create/update/delete runs as a [`UnitOfWork`] under the
//! [`Orchestrator`]: a relational transaction plus a [`RollbackRegistry`] of
//! compensations for the side effects that already happened. A failed attempt
//! rolls the transaction back, settles the registry, and is retried or
//! surfaced according to [`classifier::classify`].

pub mod classifier;
pub mod document_sync;
pub mod error;
pub mod layout;
pub mod mover;
pub mod orchestrator;
pub mod references;
pub mod rollback;
pub mod search_sync;

pub use classifier::{Classification, ClassifiedError, DuplicateField, ErrorKind, classify};
pub use document_sync::DocumentSync;
pub use error::MutationError;
pub use mover::{MoveOutcome, MovedObject, ObjectMover, StorageError};
pub use orchestrator::{Orchestrator, RetryPolicy, TransactionalStore, UnitOfWork};
pub use references::{ImageReference, ReferenceError, ReferenceKind};
pub use rollback::{CompensationJournal, CompensationReport, RollbackRegistry, TracingJournal};
pub use search_sync::SearchSync;
