//! Output formatters for migration reports.

use clap::ValueEnum;
use comfy_table::Table;
use serde_json::{json, Value};
use shiftdb_core::changelog::duration_millis;
use shiftdb_core::{ChangeLog, Outcome, PlannedAction};

/// Output format for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Trait for formatting output.
pub trait Formatter {
    /// Format the outcomes of a migration run.
    fn format_outcomes(&self, outcomes: &[Outcome]) -> Result<String, serde_json::Error>;

    /// Format the actions of a dry run.
    fn format_plan(&self, plan: &[PlannedAction]) -> Result<String, serde_json::Error>;

    /// Format persisted changelogs.
    fn format_history(&self, history: &[ChangeLog]) -> Result<String, serde_json::Error>;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_outcomes(&self, outcomes: &[Outcome]) -> Result<String, serde_json::Error> {
        if outcomes.is_empty() {
            return Ok("No changesets found".to_string());
        }

        let mut table = Table::new();
        table.set_header(vec!["Version", "Script", "Outcome", "Duration (ms)"]);
        for outcome in outcomes {
            table.add_row(vec![
                outcome.version.to_string(),
                outcome.script_id.clone(),
                outcome.kind.to_string(),
                optional(outcome.duration.map(duration_millis)),
            ]);
        }
        Ok(table.to_string())
    }

    fn format_plan(&self, plan: &[PlannedAction]) -> Result<String, serde_json::Error> {
        if plan.is_empty() {
            return Ok("No changesets found".to_string());
        }

        let mut table = Table::new();
        table.set_header(vec!["Version", "Script", "Action"]);
        for action in plan {
            table.add_row(vec![
                action.version.to_string(),
                action.script_id.clone(),
                action.decision.to_string(),
            ]);
        }
        Ok(table.to_string())
    }

    fn format_history(&self, history: &[ChangeLog]) -> Result<String, serde_json::Error> {
        if history.is_empty() {
            return Ok("No changelogs recorded".to_string());
        }

        let mut table = Table::new();
        table.set_header(vec![
            "Version",
            "Order",
            "Description",
            "Type",
            "Script",
            "Status",
            "Runner",
            "Timestamp",
            "Duration (ms)",
        ]);
        for log in history {
            table.add_row(vec![
                log.version.to_string(),
                optional(log.order),
                log.description.clone(),
                log.kind.to_string(),
                log.script_id.clone(),
                log.status.to_string(),
                log.runner.clone().unwrap_or_default(),
                optional(log.timestamp.map(|t| t.to_rfc3339())),
                optional(log.duration),
            ]);
        }
        Ok(table.to_string())
    }
}

/// JSON formatter.
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format_outcomes(&self, outcomes: &[Outcome]) -> Result<String, serde_json::Error> {
        let rows: Vec<Value> = outcomes
            .iter()
            .map(|outcome| {
                json!({
                    "version": outcome.version.to_string(),
                    "script": outcome.script_id,
                    "outcome": outcome.kind.to_string(),
                    "duration": outcome.duration.map(duration_millis),
                })
            })
            .collect();
        serde_json::to_string_pretty(&rows)
    }

    fn format_plan(&self, plan: &[PlannedAction]) -> Result<String, serde_json::Error> {
        let rows: Vec<Value> = plan
            .iter()
            .map(|action| {
                json!({
                    "version": action.version.to_string(),
                    "script": action.script_id,
                    "action": action.decision.to_string(),
                })
            })
            .collect();
        serde_json::to_string_pretty(&rows)
    }

    fn format_history(&self, history: &[ChangeLog]) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(history)
    }
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use shiftdb_core::{ChangeSet, ChangeSetKind, Decision, OutcomeKind, Version};
    use std::time::Duration;

    fn changeset() -> ChangeSet {
        ChangeSet::new(
            Version::parse("1.1").unwrap(),
            1,
            "insert users",
            ChangeSetKind::BulkDocuments,
            "V1.1__insert_users",
            "abc123",
        )
    }

    #[test]
    fn test_history_table() {
        let log = ChangeLog::skipped(&changeset());
        let output = TableFormatter.format_history(&[log]).unwrap();

        assert!(output.contains("1.1"));
        assert!(output.contains("insert users"));
        assert!(output.contains("BULK_DOCUMENTS"));
        assert!(output.contains("SKIPPED"));
    }

    #[test]
    fn test_history_json_uses_document_fields() {
        let log = ChangeLog::skipped(&changeset());
        let output = JsonFormatter.format_history(&[log]).unwrap();
        let parsed: Value = serde_json::from_str(&output).unwrap();

        assert_eq!(parsed[0]["version"], "1.1");
        assert_eq!(parsed[0]["type"], "BULK_DOCUMENTS");
        assert_eq!(parsed[0]["script"], "V1.1__insert_users");
        assert_eq!(parsed[0]["status"], "SKIPPED");
    }

    #[test]
    fn test_plan_json() {
        let plan = vec![PlannedAction {
            version: Version::parse("2").unwrap(),
            script_id: "V2__user.json".to_string(),
            decision: Decision::Execute { retry: false },
        }];
        let output = JsonFormatter.format_plan(&plan).unwrap();
        let parsed: Value = serde_json::from_str(&output).unwrap();

        assert_eq!(parsed[0]["version"], "2");
        assert_eq!(parsed[0]["action"], "execute");
    }

    #[test]
    fn test_outcome_json_duration_saturates() {
        let outcome = Outcome {
            version: Version::parse("1").unwrap(),
            script_id: "V1__create_index.query".to_string(),
            kind: OutcomeKind::Executed,
            duration: Some(Duration::MAX),
        };
        let output = JsonFormatter.format_outcomes(&[outcome]).unwrap();
        let parsed: Value = serde_json::from_str(&output).unwrap();

        assert_eq!(parsed[0]["outcome"], "executed");
        assert_eq!(parsed[0]["duration"], u64::MAX);
    }

    #[test]
    fn test_empty_outcomes() {
        assert_eq!(
            TableFormatter.format_outcomes(&[]).unwrap(),
            "No changesets found"
        );
        assert_eq!(JsonFormatter.format_outcomes(&[]).unwrap(), "[]");
    }

    #[test]
    fn test_format_display() {
        assert_eq!(OutputFormat::Table.to_string(), "table");
        assert_eq!(OutputFormat::Json.to_string(), "json");
    }
}
