//! Reconciliation engine.
//!
//! Given discovered changesets and the persisted history, decides per
//! changeset whether to execute, skip, or touch up metadata, runs the
//! executor, and records the outcome.
//!
//! # Decision table
//!
//! | Stored record | Condition | Decision |
//! |---------------|-----------|----------|
//! | none / `FAILED` | version <= watermark | persist `SKIPPED` |
//! | none / `FAILED` | version > watermark | execute, persist `EXECUTED` or `FAILED` |
//! | `EXECUTED` | same checksum | update description/script if they changed |
//! | `EXECUTED` | other checksum | abort with an integrity error |
//! | `SKIPPED` | same checksum | update description/script if they changed |
//! | `SKIPPED` | other checksum | refresh checksum and metadata, stay `SKIPPED` |
//!
//! The watermark is the highest version among `EXECUTED` records when the run
//! starts. Changesets run strictly one after another; the first failure ends
//! the run.
//!
//! Concurrent runs against the same store are not coordinated: the watermark
//! read and the record writes of two runs may interleave.

use std::fmt;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use crate::changelog::{duration_millis, ChangeLog, Status};
use crate::changeset::{ChangeSet, ChangeSetKind, Version};
use crate::error::{ExecutionError, MigrationError};
use crate::executor::ScriptExecutor;
use crate::store::ChangeLogStore;

/// What the engine decided for a changeset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Run the changeset. `retry` is set when a previous run recorded a failure.
    Execute { retry: bool },
    /// Record as skipped; the version predates the watermark.
    Skip,
    /// Rewrite description and script id of the stored record.
    UpdateMetadata,
    /// Replace checksum and metadata of a skipped record.
    RefreshSkipped,
    /// Nothing to do.
    Unchanged,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Execute { retry: false } => write!(f, "execute"),
            Decision::Execute { retry: true } => write!(f, "retry"),
            Decision::Skip => write!(f, "skip"),
            Decision::UpdateMetadata => write!(f, "update metadata"),
            Decision::RefreshSkipped => write!(f, "refresh skipped"),
            Decision::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// A decision taken without executing anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedAction {
    pub version: Version,
    pub script_id: String,
    pub decision: Decision,
}

/// Result of processing one changeset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Executed,
    Failed,
    Skipped,
    MetadataUpdated,
    Unchanged,
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeKind::Executed => write!(f, "executed"),
            OutcomeKind::Failed => write!(f, "failed"),
            OutcomeKind::Skipped => write!(f, "skipped"),
            OutcomeKind::MetadataUpdated => write!(f, "metadata updated"),
            OutcomeKind::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// Outcome of one changeset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub version: Version,
    pub script_id: String,
    pub kind: OutcomeKind,
    /// Execution time, for executed and failed changesets.
    pub duration: Option<Duration>,
}

impl Outcome {
    fn new(changeset: &ChangeSet, kind: OutcomeKind, duration: Option<Duration>) -> Self {
        Self {
            version: changeset.version.clone(),
            script_id: changeset.script_id.clone(),
            kind,
            duration,
        }
    }
}

/// Outcomes of a run, plus the error that ended it early, if any.
#[derive(Debug)]
pub struct Reconciliation {
    /// Outcomes of every changeset processed, in order.
    pub outcomes: Vec<Outcome>,
    /// Error that aborted the run.
    pub abort: Option<MigrationError>,
}

impl Reconciliation {
    /// Whether every changeset was processed.
    pub fn is_complete(&self) -> bool {
        self.abort.is_none()
    }

    /// Number of changesets executed in this run.
    pub fn executed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.kind == OutcomeKind::Executed)
            .count()
    }

    /// The outcomes, or the aborting error.
    pub fn into_result(self) -> Result<Vec<Outcome>, MigrationError> {
        match self.abort {
            Some(err) => Err(err),
            None => Ok(self.outcomes),
        }
    }
}

/// History-derived values fixed for the duration of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RunState {
    /// Highest executed version.
    watermark: Option<Version>,
    /// Order assigned to the next executed changeset.
    next_order: u32,
}

impl RunState {
    fn load(store: &impl ChangeLogStore) -> Result<Self, MigrationError> {
        let logs = store.list_all()?;
        let watermark = logs
            .iter()
            .filter(|log| log.status == Status::Executed)
            .map(|log| &log.version)
            .max()
            .cloned();
        let next_order = logs.iter().filter_map(|log| log.order).max().unwrap_or(0) + 1;

        Ok(Self {
            watermark,
            next_order,
        })
    }

    fn predates_watermark(&self, version: &Version) -> bool {
        self.watermark.as_ref().is_some_and(|w| version <= w)
    }
}

/// Reconciles discovered changesets against the changelog store.
pub struct Reconciler<S, E> {
    store: S,
    executor: E,
    runner: String,
}

impl<S: ChangeLogStore, E: ScriptExecutor> Reconciler<S, E> {
    /// Create a reconciler recording `runner` as the executing identity.
    pub fn new(store: S, executor: E, runner: impl Into<String>) -> Self {
        Self {
            store,
            executor,
            runner: runner.into(),
        }
    }

    /// The changelog store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Process changesets in order, stopping at the first failure.
    ///
    /// `changesets` must be strictly ascending by version; otherwise nothing is
    /// executed or persisted.
    #[instrument(skip_all, fields(changesets = changesets.len()))]
    pub fn reconcile(&self, changesets: &[ChangeSet]) -> Reconciliation {
        let mut outcomes = Vec::with_capacity(changesets.len());

        let abort = match self.run(changesets, &mut outcomes) {
            Ok(()) => None,
            Err(err) => {
                error!(error = %err, "migration aborted");
                Some(err)
            }
        };

        Reconciliation { outcomes, abort }
    }

    /// Decide what `reconcile` would do, without executing or persisting.
    #[instrument(skip_all, fields(changesets = changesets.len()))]
    pub fn plan(&self, changesets: &[ChangeSet]) -> Result<Vec<PlannedAction>, MigrationError> {
        check_ascending(changesets)?;
        let state = RunState::load(&self.store)?;

        changesets
            .iter()
            .map(|changeset| {
                let existing = self.store.get(&changeset.version)?;
                Ok(PlannedAction {
                    version: changeset.version.clone(),
                    script_id: changeset.script_id.clone(),
                    decision: decide(changeset, existing.as_ref(), &state)?,
                })
            })
            .collect()
    }

    fn run(&self, changesets: &[ChangeSet], outcomes: &mut Vec<Outcome>) -> Result<(), MigrationError> {
        check_ascending(changesets)?;
        let mut state = RunState::load(&self.store)?;
        debug!(
            watermark = ?state.watermark.as_ref().map(ToString::to_string),
            next_order = state.next_order,
            "history loaded"
        );

        for changeset in changesets {
            let existing = self.store.get(&changeset.version)?;
            let decision = decide(changeset, existing.as_ref(), &state)?;

            let outcome = match (decision, existing) {
                (Decision::Execute { .. }, _) => {
                    self.execute(changeset, state.next_order, outcomes)?;
                    state.next_order += 1;
                    continue;
                }
                (Decision::Skip, _) => {
                    warn!(
                        version = %changeset.version,
                        script = %changeset.script_id,
                        "changeset predates executed history, skipping"
                    );
                    self.store.save(&ChangeLog::skipped(changeset))?;
                    Outcome::new(changeset, OutcomeKind::Skipped, None)
                }
                (Decision::UpdateMetadata, Some(mut log)) => {
                    info!(
                        version = %changeset.version,
                        description = %changeset.description,
                        script = %changeset.script_id,
                        "updating changelog metadata"
                    );
                    log.apply_metadata(changeset);
                    self.store.save(&log)?;
                    Outcome::new(changeset, OutcomeKind::MetadataUpdated, None)
                }
                (Decision::RefreshSkipped, Some(mut log)) => {
                    warn!(
                        version = %changeset.version,
                        stored = %log.checksum,
                        discovered = %changeset.checksum,
                        "skipped changeset was modified, refreshing its record"
                    );
                    log.apply_metadata(changeset);
                    log.checksum = changeset.checksum.clone();
                    self.store.save(&log)?;
                    Outcome::new(changeset, OutcomeKind::MetadataUpdated, None)
                }
                _ => {
                    debug!(version = %changeset.version, "changeset already applied");
                    Outcome::new(changeset, OutcomeKind::Unchanged, None)
                }
            };
            outcomes.push(outcome);
        }

        Ok(())
    }

    /// Run one changeset and persist its `EXECUTED` or `FAILED` record.
    ///
    /// The outcome is pushed in both cases; a failure is returned as an
    /// execution error after its record is saved.
    fn execute(
        &self,
        changeset: &ChangeSet,
        order: u32,
        outcomes: &mut Vec<Outcome>,
    ) -> Result<(), MigrationError> {
        info!(
            version = %changeset.version,
            kind = %changeset.kind,
            script = %changeset.script_id,
            "executing changeset"
        );

        let timestamp = Utc::now();
        let start = Instant::now();
        let result = self.dispatch(changeset);
        let elapsed = start.elapsed();

        match result {
            Ok(()) => {
                self.store.save(&ChangeLog::executed(
                    changeset,
                    order,
                    &self.runner,
                    timestamp,
                    elapsed,
                ))?;
                info!(
                    version = %changeset.version,
                    duration_ms = duration_millis(elapsed),
                    "changeset executed"
                );
                outcomes.push(Outcome::new(changeset, OutcomeKind::Executed, Some(elapsed)));
                Ok(())
            }
            Err(source) => {
                let failed = ChangeLog::failed(changeset, &self.runner, timestamp, elapsed);
                if let Err(store_err) = self.store.save(&failed) {
                    error!(
                        version = %changeset.version,
                        error = %store_err,
                        "could not record failed changeset"
                    );
                }
                outcomes.push(Outcome::new(changeset, OutcomeKind::Failed, Some(elapsed)));
                Err(MigrationError::Execution {
                    version: changeset.version.clone(),
                    source,
                })
            }
        }
    }

    fn dispatch(&self, changeset: &ChangeSet) -> Result<(), ExecutionError> {
        match changeset.kind {
            ChangeSetKind::QueryScript => self.executor.run_query(changeset),
            ChangeSetKind::BulkDocuments => self.executor.load_documents(changeset),
            ChangeSetKind::IndexDefinition => self.executor.deploy_index(changeset),
        }
    }
}

/// Fail unless versions are strictly ascending.
fn check_ascending(changesets: &[ChangeSet]) -> Result<(), MigrationError> {
    for pair in changesets.windows(2) {
        if pair[1].version <= pair[0].version {
            return Err(MigrationError::Ordering {
                previous: pair[0].version.clone(),
                next: pair[1].version.clone(),
            });
        }
    }
    Ok(())
}

/// Decide the action for one changeset given its stored record.
fn decide(
    changeset: &ChangeSet,
    existing: Option<&ChangeLog>,
    state: &RunState,
) -> Result<Decision, MigrationError> {
    let Some(log) = existing else {
        return Ok(decide_new(changeset, state, false));
    };

    let same_checksum = log.checksum == changeset.checksum;
    match log.status {
        Status::Failed => Ok(decide_new(changeset, state, true)),
        Status::Executed if !same_checksum => Err(MigrationError::Integrity {
            version: changeset.version.clone(),
            stored: log.checksum.clone(),
            discovered: changeset.checksum.clone(),
        }),
        Status::Skipped if !same_checksum => Ok(Decision::RefreshSkipped),
        Status::Executed | Status::Skipped => {
            if log.metadata_differs(changeset) {
                Ok(Decision::UpdateMetadata)
            } else {
                Ok(Decision::Unchanged)
            }
        }
    }
}

fn decide_new(changeset: &ChangeSet, state: &RunState, retry: bool) -> Decision {
    if state.predates_watermark(&changeset.version) {
        Decision::Skip
    } else {
        Decision::Execute { retry }
    }
}
