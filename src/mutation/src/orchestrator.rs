//! Retrying transaction loop with compensating rollback.
//!
//! One mutation runs as a sequence of attempts. Each attempt opens a
//! relational transaction and a fresh [`RollbackRegistry`], runs the unit of
//! work under a deadline and commits. A failed attempt aborts the
//! transaction, settles the registry, and then either retries or surfaces a
//! [`ClassifiedError`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::config::MutationConfig;
use common::{Database, DbTx, StoreError};

use crate::classifier::{Classification, ClassifiedError, ErrorKind, classify, decide};
use crate::error::MutationError;
use crate::rollback::{CompensationJournal, RollbackRegistry, TracingJournal};

/// Relational store with explicit transactions.
#[async_trait]
pub trait TransactionalStore: Send + Sync {
    type Tx: Send;

    async fn begin(&self) -> Result<Self::Tx, StoreError>;

    async fn commit(&self, tx: Self::Tx) -> Result<(), StoreError>;

    async fn rollback(&self, tx: Self::Tx) -> Result<(), StoreError>;
}

#[async_trait]
impl TransactionalStore for Database {
    type Tx = DbTx;

    async fn begin(&self) -> Result<DbTx, StoreError> {
        Database::begin(self).await.map_err(StoreError::from)
    }

    async fn commit(&self, tx: DbTx) -> Result<(), StoreError> {
        tx.commit().await.map_err(StoreError::from)
    }

    async fn rollback(&self, tx: DbTx) -> Result<(), StoreError> {
        tx.rollback().await.map_err(StoreError::from)
    }
}

/// The steps of one mutation.
///
/// `run` may be called several times, once per attempt; every side effect
/// outside the transaction registers its compensation on `rollback` right
/// after it succeeds.
#[async_trait]
pub trait UnitOfWork<Tx: Send>: Send + Sync {
    type Output: Send;

    async fn run(
        &self,
        tx: &mut Tx,
        rollback: &mut RollbackRegistry,
    ) -> Result<Self::Output, MutationError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts
    pub max_retries: u32,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&MutationConfig::default())
    }
}

impl From<&MutationConfig> for RetryPolicy {
    fn from(config: &MutationConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            attempt_timeout: config.attempt_timeout,
        }
    }
}

enum State<T> {
    Attempting {
        attempt: u32,
    },
    Compensating {
        attempt: u32,
        registry: RollbackRegistry,
        error: MutationError,
    },
    Retrying {
        attempt: u32,
    },
    Committed {
        attempt: u32,
        output: T,
    },
    Failed {
        attempt: u32,
        error: ClassifiedError,
    },
}

/// Runs units of work against a [`TransactionalStore`].
#[derive(Debug, Clone)]
pub struct Orchestrator<S> {
    store: S,
    policy: RetryPolicy,
    journal: Arc<dyn CompensationJournal>,
}

impl<S: TransactionalStore> Orchestrator<S> {
    pub fn new(store: S, policy: RetryPolicy) -> Self {
        Self {
            store,
            policy,
            journal: Arc::new(TracingJournal),
        }
    }

    pub fn with_journal(mut self, journal: Arc<dyn CompensationJournal>) -> Self {
        self.journal = journal;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub async fn execute<W>(&self, work: &W) -> Result<W::Output, ClassifiedError>
    where
        W: UnitOfWork<S::Tx>,
    {
        let mut state = State::Attempting { attempt: 0 };
        loop {
            state = match state {
                State::Attempting { attempt } => {
                    let mut registry = RollbackRegistry::with_journal(self.journal.clone());
                    match self.attempt(work, &mut registry).await {
                        Ok(output) => State::Committed { attempt, output },
                        Err(error) => State::Compensating {
                            attempt,
                            registry,
                            error,
                        },
                    }
                }
                State::Compensating {
                    attempt,
                    registry,
                    error,
                } => {
                    tracing::warn!(
                        attempt,
                        error = %error,
                        compensations = registry.len(),
                        "Mutation attempt failed"
                    );
                    registry.settle().await;

                    match decide(attempt, self.policy.max_retries, classify(&error)) {
                        Classification::Retry => State::Retrying { attempt },
                        Classification::Surface(classified) => {
                            if matches!(
                                classified.kind,
                                ErrorKind::Fatal | ErrorKind::RetryExhausted
                            ) {
                                tracing::error!(attempt, error = %error, "Mutation failed");
                            }
                            State::Failed {
                                attempt,
                                error: classified,
                            }
                        }
                    }
                }
                State::Retrying { attempt } => {
                    tracing::debug!(attempt, "Retrying mutation");
                    State::Attempting {
                        attempt: attempt + 1,
                    }
                }
                State::Committed { attempt, output } => {
                    tracing::debug!(attempts = attempt + 1, "Mutation committed");
                    return Ok(output);
                }
                State::Failed { attempt, error } => {
                    tracing::debug!(attempts = attempt + 1, status = error.status, "Mutation gave up");
                    return Err(error);
                }
            };
        }
    }

    async fn attempt<W>(
        &self,
        work: &W,
        registry: &mut RollbackRegistry,
    ) -> Result<W::Output, MutationError>
    where
        W: UnitOfWork<S::Tx>,
    {
        let mut tx = self.store.begin().await?;

        let result =
            match tokio::time::timeout(self.policy.attempt_timeout, work.run(&mut tx, registry))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(MutationError::DeadlineExceeded(self.policy.attempt_timeout)),
            };

        match result {
            Ok(output) => {
                self.store.commit(tx).await?;
                Ok(output)
            }
            Err(error) => {
                if let Err(e) = self.store.rollback(tx).await {
                    tracing::warn!(error = %e, "Failed to roll back transaction");
                }
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use common::model::{Category, new_id, now_rfc3339};
    use common::repository::categories;

    /// Store that counts transaction outcomes and can fail commits on demand.
    #[derive(Debug, Default)]
    struct MockStore {
        begun: AtomicU32,
        committed: AtomicU32,
        rolled_back: AtomicU32,
        commit_failures: Mutex<VecDeque<StoreError>>,
    }

    impl MockStore {
        fn failing_commits(errors: Vec<StoreError>) -> Self {
            Self {
                commit_failures: Mutex::new(errors.into()),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl TransactionalStore for MockStore {
        type Tx = u32;

        async fn begin(&self) -> Result<u32, StoreError> {
            Ok(self.begun.fetch_add(1, Ordering::SeqCst))
        }

        async fn commit(&self, _tx: u32) -> Result<(), StoreError> {
            if let Some(error) = self.commit_failures.lock().unwrap().pop_front() {
                return Err(error);
            }
            self.committed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn rollback(&self, _tx: u32) -> Result<(), StoreError> {
            self.rolled_back.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Registers one compensation per listed step, then fails with the next
    /// scripted error (or succeeds once the script runs out).
    struct ScriptedWork {
        steps: Vec<&'static str>,
        failing_step: Option<&'static str>,
        errors: Mutex<VecDeque<MutationError>>,
        runs: AtomicU32,
        compensated: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedWork {
        fn new(steps: Vec<&'static str>, errors: Vec<MutationError>) -> Self {
            Self {
                steps,
                failing_step: None,
                errors: Mutex::new(errors.into()),
                runs: AtomicU32::new(0),
                compensated: Arc::default(),
            }
        }
    }

    #[async_trait]
    impl UnitOfWork<u32> for ScriptedWork {
        type Output = &'static str;

        async fn run(
            &self,
            _tx: &mut u32,
            rollback: &mut RollbackRegistry,
        ) -> Result<&'static str, MutationError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            for &step in &self.steps {
                let compensated = self.compensated.clone();
                let fails = self.failing_step == Some(step);
                rollback.register(step, move || async move {
                    compensated.lock().unwrap().push(step.to_string());
                    if fails {
                        anyhow::bail!("compensation refused");
                    }
                    Ok(())
                })?;
            }
            match self.errors.lock().unwrap().pop_front() {
                Some(error) => Err(error),
                None => Ok("done"),
            }
        }
    }

    fn conflict() -> MutationError {
        MutationError::Store(StoreError::Conflict("could not serialize access".into()))
    }

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            attempt_timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn test_success_commits_once_without_compensation() {
        let orchestrator = Orchestrator::new(MockStore::default(), policy(3));
        let work = ScriptedWork::new(vec!["a", "b"], vec![]);

        assert_eq!(orchestrator.execute(&work).await.unwrap(), "done");
        assert_eq!(orchestrator.store().committed.load(Ordering::SeqCst), 1);
        assert_eq!(orchestrator.store().rolled_back.load(Ordering::SeqCst), 0);
        assert!(work.compensated.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried_and_committed_once() {
        let orchestrator = Orchestrator::new(MockStore::default(), policy(3));
        let work = ScriptedWork::new(vec!["a"], vec![conflict()]);

        assert_eq!(orchestrator.execute(&work).await.unwrap(), "done");
        assert_eq!(work.runs.load(Ordering::SeqCst), 2);
        assert_eq!(orchestrator.store().committed.load(Ordering::SeqCst), 1);
        assert_eq!(orchestrator.store().rolled_back.load(Ordering::SeqCst), 1);
        // only the failed attempt was compensated
        assert_eq!(*work.compensated.lock().unwrap(), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_retry_bound_surfaces_try_again_later() {
        let orchestrator = Orchestrator::new(MockStore::default(), policy(3));
        let work = ScriptedWork::new(vec!["a"], (0..5).map(|_| conflict()).collect());

        let err = orchestrator.execute(&work).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::RetryExhausted);
        assert_eq!(err.status, 500);
        assert_eq!(work.runs.load(Ordering::SeqCst), 3);
        assert_eq!(orchestrator.store().committed.load(Ordering::SeqCst), 0);
        assert_eq!(work.compensated.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_failure_short_circuits() {
        let orchestrator = Orchestrator::new(MockStore::default(), policy(3));
        let work = ScriptedWork::new(
            vec!["a", "b"],
            vec![MutationError::Store(StoreError::UniqueViolation {
                constraint: Some("posts_name_unique".into()),
                message: "duplicate key".into(),
            })],
        );

        let err = orchestrator.execute(&work).await.unwrap_err();
        assert_eq!(err.status, 400);
        assert_eq!(work.runs.load(Ordering::SeqCst), 1);
        let mut compensated = work.compensated.lock().unwrap().clone();
        compensated.sort();
        assert_eq!(compensated, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_failing_compensation_does_not_change_the_outcome() {
        let orchestrator = Orchestrator::new(MockStore::default(), policy(3));
        let mut work = ScriptedWork::new(
            vec!["one", "two", "three"],
            vec![MutationError::validation("title is required")],
        );
        work.failing_step = Some("two");

        let err = orchestrator.execute(&work).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ValidationRejected);
        assert_eq!(work.compensated.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_commit_failure_is_an_attempt_failure() {
        let store = MockStore::failing_commits(vec![StoreError::Conflict("40001".into())]);
        let orchestrator = Orchestrator::new(store, policy(3));
        let work = ScriptedWork::new(vec!["a"], vec![]);

        assert_eq!(orchestrator.execute(&work).await.unwrap(), "done");
        assert_eq!(work.runs.load(Ordering::SeqCst), 2);
        assert_eq!(orchestrator.store().committed.load(Ordering::SeqCst), 1);
        assert_eq!(*work.compensated.lock().unwrap(), vec!["a".to_string()]);
    }

    struct SlowWork;

    #[async_trait]
    impl UnitOfWork<u32> for SlowWork {
        type Output = ();

        async fn run(
            &self,
            _tx: &mut u32,
            _rollback: &mut RollbackRegistry,
        ) -> Result<(), MutationError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_deadline_is_retryable_timeout() {
        let orchestrator = Orchestrator::new(
            MockStore::default(),
            RetryPolicy {
                max_retries: 2,
                attempt_timeout: Duration::from_millis(100),
            },
        );

        let err = orchestrator.execute(&SlowWork).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::RetryExhausted);
        assert_eq!(orchestrator.store().begun.load(Ordering::SeqCst), 2);
        assert_eq!(orchestrator.store().rolled_back.load(Ordering::SeqCst), 2);
    }

    struct CreateCategory {
        name: &'static str,
    }

    #[async_trait]
    impl UnitOfWork<DbTx> for CreateCategory {
        type Output = String;

        async fn run(
            &self,
            tx: &mut DbTx,
            _rollback: &mut RollbackRegistry,
        ) -> Result<String, MutationError> {
            let category = Category {
                id: new_id(),
                tenant_id: "t1".into(),
                owner_id: "u1".into(),
                name: self.name.into(),
                description: None,
                cover_image: None,
                created_at: now_rfc3339(),
                updated_at: now_rfc3339(),
            };
            categories::insert(tx, &category).await?;
            Ok(category.id)
        }
    }

    #[tokio::test]
    async fn test_database_store() {
        let db = Database::in_memory().await.unwrap();
        let orchestrator = Orchestrator::new(db.clone(), policy(3));

        let id = orchestrator
            .execute(&CreateCategory { name: "news" })
            .await
            .unwrap();
        assert!(categories::get(&db, "t1", &id).await.unwrap().is_some());

        let err = orchestrator
            .execute(&CreateCategory { name: "news" })
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::DuplicateConflict(crate::DuplicateField::CategoryName));
    }
}
