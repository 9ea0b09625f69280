//! shiftdb Core - Versioned changeset migrations.
//!
//! This crate applies an ordered set of versioned changesets to a target store
//! exactly once, recording every outcome in a changelog so repeated runs are
//! idempotent.
//!
//! # Example
//!
//! ```ignore
//! use shiftdb_core::{Migrator, MigratorConfig};
//!
//! let migrator = Migrator::open(&MigratorConfig::new("./data"))?;
//! for outcome in migrator.migrate(Path::new("db/migration"))? {
//!     println!("{} {}", outcome.version, outcome.kind);
//! }
//! ```

pub mod changelog;
pub mod changeset;
pub mod checksum;
pub mod config;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod executor;
pub mod migrator;
pub mod store;

pub use changelog::{ChangeLog, Status};
pub use changeset::{ChangeSet, ChangeSetKind, Version};
pub use config::MigratorConfig;
pub use engine::{Decision, Outcome, OutcomeKind, PlannedAction, Reconciler, Reconciliation};
pub use error::{ExecutionError, MigrationError, StoreError};
pub use executor::{ScriptExecutor, SledTarget, TargetConfig};
pub use migrator::Migrator;
pub use store::{ChangeLogStore, MemoryChangeLogStore, SledChangeLogStore};
