//! Changeset execution against a target store.
//!
//! The engine stays agnostic of payload contents: it selects one capability
//! of [`ScriptExecutor`] per [`ChangeSetKind`](crate::changeset::ChangeSetKind)
//! and treats the call as all-or-nothing.

pub mod statement;
mod target;

pub use statement::{parse_script, Statement};
pub use target::{
    IndexDefinition, SledTarget, TargetConfig, DEFAULT_DOCUMENT_COLLECTION, INDEX_COLLECTION,
};

use crate::changeset::ChangeSet;
use crate::error::ExecutionError;

/// Applies changesets to a target store, one capability per changeset kind.
pub trait ScriptExecutor {
    /// Run a script of query statements.
    fn run_query(&self, changeset: &ChangeSet) -> Result<(), ExecutionError>;

    /// Load a directory of documents.
    fn load_documents(&self, changeset: &ChangeSet) -> Result<(), ExecutionError>;

    /// Deploy an index definition.
    fn deploy_index(&self, changeset: &ChangeSet) -> Result<(), ExecutionError>;
}

impl<E: ScriptExecutor + ?Sized> ScriptExecutor for &E {
    fn run_query(&self, changeset: &ChangeSet) -> Result<(), ExecutionError> {
        (**self).run_query(changeset)
    }

    fn load_documents(&self, changeset: &ChangeSet) -> Result<(), ExecutionError> {
        (**self).load_documents(changeset)
    }

    fn deploy_index(&self, changeset: &ChangeSet) -> Result<(), ExecutionError> {
        (**self).deploy_index(changeset)
    }
}
