//! Top-level migration driver.

use std::path::Path;

use tracing::info;

use crate::changelog::ChangeLog;
use crate::config::MigratorConfig;
use crate::discovery::discover;
use crate::engine::{Outcome, PlannedAction, Reconciler, Reconciliation};
use crate::error::MigrationError;
use crate::executor::{ScriptExecutor, SledTarget};
use crate::store::{ChangeLogStore, SledChangeLogStore};

/// Discovers changesets in a folder and reconciles them against history.
pub struct Migrator<S, E> {
    reconciler: Reconciler<S, E>,
}

impl Migrator<SledChangeLogStore, SledTarget> {
    /// Open the sled database at `config.data_path`, using it both as the
    /// changelog store and as the migration target.
    pub fn open(config: &MigratorConfig) -> Result<Self, MigrationError> {
        let db = sled::open(&config.data_path).map_err(crate::error::StoreError::from)?;
        Self::with_db(db, config)
    }

    /// Use an already open sled database.
    pub fn with_db(db: sled::Db, config: &MigratorConfig) -> Result<Self, MigrationError> {
        let store = SledChangeLogStore::open(&db)?;
        let target = SledTarget::new(db, config.target.clone());
        Ok(Self::new(store, target, config.runner.clone()))
    }
}

impl<S: ChangeLogStore, E: ScriptExecutor> Migrator<S, E> {
    /// Create a migrator from a store and an executor.
    pub fn new(store: S, executor: E, runner: impl Into<String>) -> Self {
        Self {
            reconciler: Reconciler::new(store, executor, runner),
        }
    }

    /// Run every pending changeset in `folder`.
    ///
    /// On abort the error names the failing version and its cause.
    pub fn migrate(&self, folder: &Path) -> Result<Vec<Outcome>, MigrationError> {
        self.run(folder)?.into_result()
    }

    /// Like [`migrate`](Self::migrate), but keeps the outcomes of an aborted run.
    ///
    /// Discovery and checksum errors are returned directly; nothing has been
    /// executed or persisted in that case.
    pub fn run(&self, folder: &Path) -> Result<Reconciliation, MigrationError> {
        info!(folder = %folder.display(), "starting migration");
        let changesets = discover(folder)?;
        let reconciliation = self.reconciler.reconcile(&changesets);

        if reconciliation.is_complete() {
            info!(
                processed = reconciliation.outcomes.len(),
                executed = reconciliation.executed_count(),
                "migration complete"
            );
        }
        Ok(reconciliation)
    }

    /// Decide what a run over `folder` would do, without changing anything.
    pub fn plan(&self, folder: &Path) -> Result<Vec<PlannedAction>, MigrationError> {
        let changesets = discover(folder)?;
        self.reconciler.plan(&changesets)
    }

    /// Persisted history, in execution order.
    pub fn history(&self) -> Result<Vec<ChangeLog>, MigrationError> {
        Ok(self.reconciler.store().list_all()?)
    }
}
