//! Migrator configuration.

use std::path::PathBuf;

use crate::executor::TargetConfig;

/// Default directory of the sled database.
pub const DEFAULT_DATA_PATH: &str = "./data";

/// Runner recorded when no identity can be determined.
pub const UNKNOWN_RUNNER: &str = "unknown";

/// Identity of the current user, from `USER` or `USERNAME`.
pub fn default_runner() -> String {
    ["USER", "USERNAME"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| UNKNOWN_RUNNER.to_string())
}

/// Configuration of a [`Migrator`](crate::migrator::Migrator).
#[derive(Debug, Clone)]
pub struct MigratorConfig {
    /// Directory of the sled database holding history and target collections.
    pub data_path: PathBuf,

    /// Identity recorded on executed and failed changelogs.
    pub runner: String,

    /// Target store settings.
    pub target: TargetConfig,
}

impl MigratorConfig {
    /// Create a configuration for the database at `data_path`.
    pub fn new(data_path: impl Into<PathBuf>) -> Self {
        Self {
            data_path: data_path.into(),
            runner: default_runner(),
            target: TargetConfig::default(),
        }
    }

    /// Set the runner identity.
    pub fn with_runner(mut self, runner: impl Into<String>) -> Self {
        self.runner = runner.into();
        self
    }

    /// Set the target configuration.
    pub fn with_target(mut self, target: TargetConfig) -> Self {
        self.target = target;
        self
    }
}

impl Default for MigratorConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DATA_PATH)
    }
}
