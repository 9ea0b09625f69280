//! Command-line configuration.

use std::path::PathBuf;

use clap::Args;
use shiftdb_core::config::{default_runner, DEFAULT_DATA_PATH};
use shiftdb_core::{MigratorConfig, TargetConfig};

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Directory of the sled database holding history and collections
    #[arg(long, global = true, default_value = DEFAULT_DATA_PATH)]
    pub data_path: PathBuf,

    /// Identity recorded on executed changelogs (defaults to the current user)
    #[arg(long, global = true)]
    pub runner: Option<String>,

    /// Collection receiving bulk-loaded documents
    #[arg(long, global = true)]
    pub collection: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl GlobalArgs {
    /// Convert command-line arguments to migrator configuration.
    pub fn into_config(self) -> MigratorConfig {
        let mut target = TargetConfig::new();
        if let Some(collection) = self.collection {
            target = target.with_document_collection(collection);
        }

        MigratorConfig::new(self.data_path)
            .with_runner(self.runner.unwrap_or_else(default_runner))
            .with_target(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use shiftdb_core::executor::DEFAULT_DOCUMENT_COLLECTION;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        global: GlobalArgs,
    }

    fn parse(args: &[&str]) -> MigratorConfig {
        let mut argv = vec!["shiftdb"];
        argv.extend_from_slice(args);
        TestCli::parse_from(argv).global.into_config()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]);
        assert_eq!(config.data_path, PathBuf::from(DEFAULT_DATA_PATH));
        assert!(!config.runner.is_empty());
        assert_eq!(config.target.document_collection, DEFAULT_DOCUMENT_COLLECTION);
    }

    #[test]
    fn test_overrides() {
        let config = parse(&[
            "--data-path",
            "/srv/shiftdb",
            "--runner",
            "ci",
            "--collection",
            "users",
        ]);
        assert_eq!(config.data_path, PathBuf::from("/srv/shiftdb"));
        assert_eq!(config.runner, "ci");
        assert_eq!(config.target.document_collection, "users");
    }
}
