//! CLI error type.

use shiftdb_core::MigrationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error("failed to render output: {0}")]
    Output(#[from] serde_json::Error),
}
