//! The workflow state machine.
//!
//! A workflow run advances through a fixed phase graph:
//!
//! ```text
//! DISPATCH -> PROCESS -> VALIDATE -> COMPLETE
//!     \          \           \
//!      +----------+-----------+---> ABORT
//! ```
//!
//! `COMPLETE` and `ABORT` are terminal. Transitions are checked against the
//! graph before touching storage and applied with compare-and-swap on the
//! current phase, so two racing advances resolve to exactly one winner.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use scribe_core::RunId;

use crate::error::{Error, Result};
use crate::metrics::DispatchMetrics;
use crate::payload::Payload;
use crate::queue::QueueStore;
use crate::queue::ReplayQueueEntry;
use crate::testimony::{Testimony, TestimonyLog};

/// A phase in the workflow graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Work has been recorded and awaits processing.
    Dispatch,
    /// Work is being processed.
    Process,
    /// Output is being validated.
    Validate,
    /// The run finished successfully. Terminal.
    Complete,
    /// The run was abandoned. Terminal.
    Abort,
}

impl Phase {
    /// Returns true if `target` is a legal next phase from `self`.
    #[must_use]
    pub const fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Dispatch, Self::Process | Self::Abort)
                | (Self::Process, Self::Validate | Self::Abort)
                | (Self::Validate, Self::Complete | Self::Abort)
        )
    }

    /// Returns the legal next phases from `self`.
    #[must_use]
    pub const fn valid_transitions(&self) -> &'static [Self] {
        match self {
            Self::Dispatch => &[Self::Process, Self::Abort],
            Self::Process => &[Self::Validate, Self::Abort],
            Self::Validate => &[Self::Complete, Self::Abort],
            Self::Complete | Self::Abort => &[],
        }
    }

    /// Returns true if no further transitions are legal.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Abort)
    }

    /// Stable uppercase label.
    #[must_use]
    pub const fn as_label(&self) -> &'static str {
        match self {
            Self::Dispatch => "DISPATCH",
            Self::Process => "PROCESS",
            Self::Validate => "VALIDATE",
            Self::Complete => "COMPLETE",
            Self::Abort => "ABORT",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}

/// One recorded step in a run's phase history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseTransition {
    /// The phase entered.
    pub phase: Phase,
    /// Operator or engine note attached to the transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// When the transition happened.
    pub at: DateTime<Utc>,
}

/// One workflow run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRun {
    /// Unique run ID.
    pub id: RunId,
    /// Human-readable workflow name.
    pub name: String,
    /// The capsule this run operates on.
    pub capsule: String,
    /// Current phase.
    pub phase: Phase,
    /// Every phase entered, in order, starting with `DISPATCH`.
    pub history: Vec<PhaseTransition>,
    /// When the run started.
    pub created_at: DateTime<Utc>,
}

impl WorkflowRun {
    /// Creates a new run in the `DISPATCH` phase.
    #[must_use]
    pub fn new(name: impl Into<String>, capsule: impl Into<String>) -> Self {
        let created_at = Utc::now();
        Self {
            id: RunId::generate(),
            name: name.into(),
            capsule: capsule.into(),
            phase: Phase::Dispatch,
            history: vec![PhaseTransition {
                phase: Phase::Dispatch,
                note: None,
                at: created_at,
            }],
            created_at,
        }
    }

    /// Applies a transition to this run, recording it in history.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalTransition`] if `target` is not a legal next
    /// phase. Self-transitions are illegal like any other off-graph edge.
    pub fn advance_to(&mut self, target: Phase, note: Option<String>) -> Result<()> {
        if !self.phase.can_transition_to(target) {
            return Err(Error::IllegalTransition {
                from: self.phase.to_string(),
                to: target.to_string(),
            });
        }
        self.phase = target;
        self.history.push(PhaseTransition {
            phase: target,
            note,
            at: Utc::now(),
        });
        Ok(())
    }
}

/// Result of a compare-and-swap phase advance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseCasResult {
    /// The transition was applied; carries the updated run.
    Success(WorkflowRun),
    /// No run exists with the given ID.
    NotFound,
    /// The run was not in the expected phase.
    PhaseMismatch {
        /// The phase the run was actually in.
        actual: Phase,
    },
}

/// Storage abstraction for workflow runs.
#[async_trait::async_trait]
pub trait RunStore: Send + Sync {
    /// Persists a new run.
    async fn insert(&self, run: WorkflowRun) -> Result<()>;

    /// Returns a run by ID.
    async fn get(&self, id: &RunId) -> Result<Option<WorkflowRun>>;

    /// Advances a run to `target` if it is currently in `expected`.
    ///
    /// The legality of the edge is the caller's responsibility; the store
    /// only enforces atomicity.
    async fn cas_phase(
        &self,
        id: &RunId,
        expected: Phase,
        target: Phase,
        note: Option<String>,
    ) -> Result<PhaseCasResult>;
}

mod memory {
    use std::collections::HashMap;
    use std::sync::{PoisonError, RwLock};

    use super::{Phase, PhaseCasResult, RunStore, WorkflowRun};
    use crate::error::{Error, Result};
    use scribe_core::RunId;

    fn poison_err<T>(_: PoisonError<T>) -> Error {
        Error::storage("run lock poisoned")
    }

    /// In-memory implementation of [`RunStore`].
    #[derive(Debug, Default)]
    pub struct InMemoryRunStore {
        runs: RwLock<HashMap<RunId, WorkflowRun>>,
    }

    impl InMemoryRunStore {
        /// Creates an empty store.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait::async_trait]
    impl RunStore for InMemoryRunStore {
        async fn insert(&self, run: WorkflowRun) -> Result<()> {
            self.runs.write().map_err(poison_err)?.insert(run.id, run);
            Ok(())
        }

        async fn get(&self, id: &RunId) -> Result<Option<WorkflowRun>> {
            Ok(self.runs.read().map_err(poison_err)?.get(id).cloned())
        }

        async fn cas_phase(
            &self,
            id: &RunId,
            expected: Phase,
            target: Phase,
            note: Option<String>,
        ) -> Result<PhaseCasResult> {
            let mut runs = self.runs.write().map_err(poison_err)?;
            let Some(run) = runs.get_mut(id) else {
                return Ok(PhaseCasResult::NotFound);
            };
            if run.phase != expected {
                return Ok(PhaseCasResult::PhaseMismatch { actual: run.phase });
            }
            run.advance_to(target, note)?;
            Ok(PhaseCasResult::Success(run.clone()))
        }
    }
}

pub use memory::InMemoryRunStore;

/// Coordinates workflow runs over a store, a queue, and a testimony log.
pub struct Workflows {
    store: Arc<dyn RunStore>,
    queue: Arc<dyn QueueStore>,
    testimony: Arc<dyn TestimonyLog>,
    metrics: DispatchMetrics,
}

impl Workflows {
    /// Creates a workflow coordinator.
    #[must_use]
    pub fn new(
        store: Arc<dyn RunStore>,
        queue: Arc<dyn QueueStore>,
        testimony: Arc<dyn TestimonyLog>,
    ) -> Self {
        Self {
            store,
            queue,
            testimony,
            metrics: DispatchMetrics::new(),
        }
    }

    /// Starts a new run in the `DISPATCH` phase.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty name or capsule, or a
    /// storage error.
    #[tracing::instrument(skip(self))]
    pub async fn start(
        &self,
        name: impl Into<String> + std::fmt::Debug,
        capsule: impl Into<String> + std::fmt::Debug,
    ) -> Result<WorkflowRun> {
        let run = WorkflowRun::new(name, capsule);
        if run.name.trim().is_empty() {
            return Err(Error::validation("workflow name must be non-empty"));
        }
        if run.capsule.trim().is_empty() {
            return Err(Error::validation("workflow capsule must be non-empty"));
        }
        self.store.insert(run.clone()).await?;
        tracing::info!(run_id = %run.id, name = %run.name, "workflow started");
        Ok(run)
    }

    /// Returns a run by ID.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown run.
    pub async fn get(&self, id: &RunId) -> Result<WorkflowRun> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| Error::not_found("workflow run", id))
    }

    /// Advances a run to the target phase.
    ///
    /// The edge is validated against the phase graph before the CAS, so an
    /// off-graph request never reaches storage. Entering a terminal phase
    /// enqueues an observer notification; entering `ABORT` also records a
    /// warn testimony.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] for an unknown run
    /// - [`Error::IllegalTransition`] for an off-graph edge
    /// - [`Error::Conflict`] if the run moved under the caller
    #[tracing::instrument(skip(self, note), fields(run_id = %id, target = %target))]
    pub async fn advance(
        &self,
        id: &RunId,
        target: Phase,
        note: Option<String>,
    ) -> Result<WorkflowRun> {
        let current = self.get(id).await?;
        if !current.phase.can_transition_to(target) {
            return Err(Error::IllegalTransition {
                from: current.phase.to_string(),
                to: target.to_string(),
            });
        }

        let run = match self
            .store
            .cas_phase(id, current.phase, target, note)
            .await?
        {
            PhaseCasResult::Success(run) => run,
            PhaseCasResult::NotFound => return Err(Error::not_found("workflow run", id)),
            PhaseCasResult::PhaseMismatch { actual } => {
                return Err(Error::Conflict {
                    resource_type: "workflow run",
                    id: id.to_string(),
                    expected: current.phase.to_string(),
                    actual: actual.to_string(),
                });
            }
        };

        tracing::info!(from = %current.phase, to = %target, "workflow advanced");
        self.metrics
            .record_workflow_transition(current.phase.as_label(), target.as_label());

        if target.is_terminal() {
            self.notify_terminal(&run).await?;
        }
        Ok(run)
    }

    /// Aborts a run from any non-terminal phase.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Self::advance`]; aborting a terminal run is
    /// an illegal transition.
    pub async fn abort(&self, id: &RunId, note: Option<String>) -> Result<WorkflowRun> {
        self.advance(id, Phase::Abort, note).await
    }

    async fn notify_terminal(&self, run: &WorkflowRun) -> Result<()> {
        let message = format!("workflow '{}' reached {}", run.name, run.phase);
        let entry = ReplayQueueEntry::new(Payload::broadcast("workflow", message.clone()))
            .with_run_id(run.id)
            .with_flow_id(run.name.clone());
        self.queue.enqueue(entry).await?;

        if run.phase == Phase::Abort {
            self.testimony
                .append(
                    Testimony::warn(message)
                        .with_run_id(run.id)
                        .with_capsule_id(run.capsule.clone()),
                )
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::memory::InMemoryQueue;
    use crate::queue::EntryStatus;
    use crate::testimony::{InMemoryTestimonyLog, TestimonyLevel};

    fn workflows() -> (Workflows, Arc<InMemoryQueue>, Arc<InMemoryTestimonyLog>) {
        let queue = Arc::new(InMemoryQueue::new());
        let testimony = Arc::new(InMemoryTestimonyLog::new());
        let workflows = Workflows::new(
            Arc::new(InMemoryRunStore::new()),
            Arc::clone(&queue) as Arc<dyn QueueStore>,
            Arc::clone(&testimony) as Arc<dyn TestimonyLog>,
        );
        (workflows, queue, testimony)
    }

    #[test]
    fn phase_graph_edges() {
        use Phase::{Abort, Complete, Dispatch, Process, Validate};
        assert!(Dispatch.can_transition_to(Process));
        assert!(Dispatch.can_transition_to(Abort));
        assert!(Process.can_transition_to(Validate));
        assert!(Validate.can_transition_to(Complete));

        assert!(!Dispatch.can_transition_to(Validate), "no phase skipping");
        assert!(!Process.can_transition_to(Dispatch), "no going back");
        assert!(!Complete.can_transition_to(Abort), "terminal is terminal");
        assert!(!Abort.can_transition_to(Dispatch));
        assert!(!Process.can_transition_to(Process), "no self loops");
    }

    #[test]
    fn terminal_phases_have_no_successors() {
        assert!(Phase::Complete.valid_transitions().is_empty());
        assert!(Phase::Abort.valid_transitions().is_empty());
        assert_eq!(
            Phase::Dispatch.valid_transitions(),
            &[Phase::Process, Phase::Abort]
        );
    }

    #[test]
    fn phase_serializes_screaming_snake_case() {
        let json = serde_json::to_value(Phase::Dispatch).expect("serializes");
        assert_eq!(json, serde_json::json!("DISPATCH"));
    }

    #[tokio::test]
    async fn full_run_to_complete() -> Result<()> {
        let (workflows, queue, _) = workflows();
        let run = workflows.start("crown-review", "Sovereign Crown").await?;
        assert_eq!(run.phase, Phase::Dispatch);
        assert_eq!(run.history.len(), 1);

        workflows.advance(&run.id, Phase::Process, None).await?;
        workflows.advance(&run.id, Phase::Validate, None).await?;
        let finished = workflows
            .advance(&run.id, Phase::Complete, Some("all checks green".into()))
            .await?;

        assert_eq!(finished.phase, Phase::Complete);
        assert_eq!(
            finished
                .history
                .iter()
                .map(|t| t.phase)
                .collect::<Vec<_>>(),
            vec![
                Phase::Dispatch,
                Phase::Process,
                Phase::Validate,
                Phase::Complete
            ]
        );

        // Completion enqueued an observer notification.
        let due = queue.due_entries(Utc::now()).await?;
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].status, EntryStatus::Pending);
        assert_eq!(due[0].run_id, Some(run.id));
        Ok(())
    }

    #[tokio::test]
    async fn phase_skipping_is_rejected() -> Result<()> {
        let (workflows, _, _) = workflows();
        let run = workflows.start("crown-review", "Sovereign Crown").await?;

        let err = workflows
            .advance(&run.id, Phase::Validate, None)
            .await
            .expect_err("DISPATCH cannot jump to VALIDATE");
        assert!(matches!(err, Error::IllegalTransition { .. }));

        // The failed advance left no trace on the run.
        let unchanged = workflows.get(&run.id).await?;
        assert_eq!(unchanged.phase, Phase::Dispatch);
        assert_eq!(unchanged.history.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn abort_works_from_any_non_terminal_phase() -> Result<()> {
        let (workflows, _, testimony) = workflows();

        for advance_first in [0usize, 1, 2] {
            let run = workflows.start("crown-review", "Sovereign Crown").await?;
            let path = [Phase::Process, Phase::Validate];
            for phase in path.iter().take(advance_first) {
                workflows.advance(&run.id, *phase, None).await?;
            }
            let aborted = workflows.abort(&run.id, Some("operator stop".into())).await?;
            assert_eq!(aborted.phase, Phase::Abort);
        }

        let warnings: Vec<_> = testimony
            .all()
            .await?
            .into_iter()
            .filter(|t| t.level == TestimonyLevel::Warn)
            .collect();
        assert_eq!(warnings.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn terminal_run_cannot_move() -> Result<()> {
        let (workflows, _, _) = workflows();
        let run = workflows.start("crown-review", "Sovereign Crown").await?;
        workflows.abort(&run.id, None).await?;

        let err = workflows
            .advance(&run.id, Phase::Process, None)
            .await
            .expect_err("aborted run is frozen");
        assert!(matches!(err, Error::IllegalTransition { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn stale_phase_advance_conflicts() -> Result<()> {
        let (workflows, _, _) = workflows();
        let run = workflows.start("crown-review", "Sovereign Crown").await?;

        // Another actor moves the run while we hold a stale view.
        workflows.advance(&run.id, Phase::Process, None).await?;
        let result = workflows
            .store
            .cas_phase(&run.id, Phase::Dispatch, Phase::Process, None)
            .await?;
        assert_eq!(
            result,
            PhaseCasResult::PhaseMismatch {
                actual: Phase::Process
            }
        );
        Ok(())
    }

    #[tokio::test]
    async fn start_rejects_blank_names() {
        let (workflows, _, _) = workflows();
        let err = workflows
            .start("  ", "Sovereign Crown")
            .await
            .expect_err("blank name must be rejected");
        assert!(matches!(err, Error::Validation { .. }));
    }
}
