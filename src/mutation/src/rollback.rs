//! Compensations for the side effects of one mutation attempt.

use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};

use crate::error::MutationError;

type Compensation = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>;

/// Target of reconciliation alerts for compensations that could not be applied.
pub const RECONCILIATION_TARGET: &str = "pressroom::reconciliation";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedCompensation {
    pub step: String,
    pub error: String,
}

/// What happened when a registry was settled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompensationReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<FailedCompensation>,
}

impl CompensationReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_steps(&self) -> Vec<&str> {
        self.failed.iter().map(|f| f.step.as_str()).collect()
    }
}

/// Observer of registry activity.
///
/// The registry itself lives in memory for one attempt; a journal is where a
/// durable record of pending compensations would be kept.
pub trait CompensationJournal: Debug + Send + Sync {
    fn registered(&self, step: &str);

    fn settled(&self, report: &CompensationReport);
}

/// Journal that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingJournal;

impl CompensationJournal for TracingJournal {
    fn registered(&self, step: &str) {
        tracing::debug!(step, "Registered compensation");
    }

    fn settled(&self, report: &CompensationReport) {
        if report.is_clean() {
            tracing::debug!(
                compensated = report.succeeded.len(),
                "Compensations applied"
            );
            return;
        }

        for failure in &report.failed {
            tracing::error!(
                target: RECONCILIATION_TARGET,
                step = %failure.step,
                error = %failure.error,
                "Compensation failed"
            );
        }
        tracing::error!(
            target: RECONCILIATION_TARGET,
            failed_steps = ?report.failed_steps(),
            succeeded_steps = ?report.succeeded,
            "Manual reconciliation required"
        );
    }
}

/// Step name to compensating action, for the steps of an attempt that completed.
pub struct RollbackRegistry {
    steps: Vec<(String, Compensation)>,
    journal: Arc<dyn CompensationJournal>,
}

impl Debug for RollbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RollbackRegistry")
            .field("steps", &self.steps())
            .field("journal", &self.journal)
            .finish()
    }
}

impl Default for RollbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RollbackRegistry {
    pub fn new() -> Self {
        Self::with_journal(Arc::new(TracingJournal))
    }

    pub fn with_journal(journal: Arc<dyn CompensationJournal>) -> Self {
        Self {
            steps: Vec::new(),
            journal,
        }
    }

    /// Register the compensation of a step that just succeeded.
    ///
    /// Step names are unique within an attempt.
    pub fn register<F, Fut, E>(
        &mut self,
        step: impl Into<String>,
        action: F,
    ) -> Result<(), MutationError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<anyhow::Error>,
    {
        let step = step.into();
        if self.steps.iter().any(|(name, _)| *name == step) {
            return Err(MutationError::DuplicateStep(step));
        }

        self.journal.registered(&step);
        let compensation: Compensation = Box::new(move || {
            action()
                .map(|result| result.map_err(Into::<anyhow::Error>::into))
                .boxed()
        });
        self.steps.push((step, compensation));
        Ok(())
    }

    pub fn steps(&self) -> Vec<&str> {
        self.steps.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every compensation concurrently and wait for all of them.
    ///
    /// Failures never stop the other compensations and are not returned as
    /// errors; they end up in the report and in the reconciliation log.
    pub async fn settle(self) -> CompensationReport {
        let RollbackRegistry { steps, journal } = self;
        if steps.is_empty() {
            return CompensationReport::default();
        }

        let runs = steps.into_iter().map(|(step, action)| async move {
            let result = action().await;
            (step, result)
        });

        let mut report = CompensationReport::default();
        for (step, result) in join_all(runs).await {
            match result {
                Ok(()) => report.succeeded.push(step),
                Err(e) => report.failed.push(FailedCompensation {
                    step,
                    error: format!("{e:#}"),
                }),
            }
        }

        journal.settled(&report);
        report
    }
}
