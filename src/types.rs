//! Core types for batch-export

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One extracted row or transaction.
///
/// The pipeline never looks inside a record: it is an ordered JSON object that is
/// serialized verbatim into batches, NDJSON lines or CSV rows.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(pub serde_json::Map<String, serde_json::Value>);

impl Record {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, handy for sources and tests
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Look up a field
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// Field names in source order
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for Record {
    fn from(map: serde_json::Map<String, serde_json::Value>) -> Self {
        Self(map)
    }
}

/// An ordered group of records flushed to a sink together.
///
/// Every batch of a run except the last holds exactly `batch_size` records; the last
/// holds between one and `batch_size`. Empty batches are never built.
#[derive(Clone, Debug, PartialEq)]
pub struct Batch {
    /// 1-based sequence number, increasing within one run
    pub number: u64,
    /// Records in source-yield order
    pub records: Vec<Record>,
    /// Whether this is the terminal batch of the run
    pub is_final: bool,
}

impl Batch {
    /// Number of records in the batch
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Always false for batches produced by the [`Batcher`](crate::batcher::Batcher)
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Where a run's output goes. Fixed for the whole run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExportTarget {
    /// Remote object store bucket plus key prefix
    ObjectStore {
        /// Bucket name (informational, the store handle is already bound to it)
        bucket: String,
        /// Key prefix, e.g. `reconcile`
        prefix: String,
    },
    /// Directory on the local filesystem
    LocalPath(PathBuf),
}

/// How far a source has been read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePosition {
    /// Last page requested (paginated sources only)
    pub page: Option<u32>,
    /// Records yielded so far
    pub records: u64,
}

impl std::fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.page {
            Some(page) => write!(f, "page {} ({} records)", page, self.records),
            None => write!(f, "{} records", self.records),
        }
    }
}

/// Terminal report of one table run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    /// Table or report name
    pub table: String,
    /// Records pulled from the source and handed to the sink
    pub records_processed: u64,
    /// Objects or files actually written
    pub objects_written: u64,
}

impl RunSummary {
    /// Summary of a run that found nothing to export
    pub fn empty(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            records_processed: 0,
            objects_written: 0,
        }
    }
}

/// State of a run's [`FlowController`](crate::pipeline::FlowController)
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PipelineState {
    /// Pulling from the source
    Running,
    /// Waiting for an in-flight batch upload to be acknowledged
    Paused,
    /// Source exhausted, flushing the last partial batch
    Draining,
    /// All output persisted
    Done,
    /// Aborted
    Failed(String),
}

impl PipelineState {
    /// Whether the source may be asked for more records
    pub fn can_pull(&self) -> bool {
        matches!(self, PipelineState::Running)
    }

    /// Whether the run has reached `Done` or `Failed`
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed(_))
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineState::Running => write!(f, "running"),
            PipelineState::Paused => write!(f, "paused"),
            PipelineState::Draining => write!(f, "draining"),
            PipelineState::Done => write!(f, "done"),
            PipelineState::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// A table run that ended in an error
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableFailure {
    /// Table or report name
    pub table: String,
    /// Machine-readable code from [`Error::error_code`](crate::error::Error::error_code)
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Batch being written when the run failed, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch: Option<u64>,
}

/// Aggregated outcome of a multi-table export
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportReport {
    /// Tables that completed, including those with nothing to export
    pub succeeded: Vec<RunSummary>,
    /// Tables whose run failed
    pub failed: Vec<TableFailure>,
    /// Disabled tables that were not run
    pub skipped: Vec<String>,
}

impl ExportReport {
    /// Whether every enabled table completed
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Records exported across all successful tables
    pub fn records_processed(&self) -> u64 {
        self.succeeded.iter().map(|s| s.records_processed).sum()
    }

    /// Objects or files written across all successful tables
    pub fn objects_written(&self) -> u64 {
        self.succeeded.iter().map(|s| s.objects_written).sum()
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_serializes_as_plain_object_in_insertion_order() {
        let record = Record::new()
            .with("transaction_id", "9X")
            .with("amount", 12.5)
            .with("currency", "EUR");

        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(
            json,
            r#"{"transaction_id":"9X","amount":12.5,"currency":"EUR"}"#
        );
    }

    #[test]
    fn record_rejects_non_object_json() {
        let result: Result<Record, _> = serde_json::from_value(json!([1, 2, 3]));
        assert!(result.is_err(), "arrays are not records");
    }

    #[test]
    fn run_summary_uses_camel_case_fields() {
        let summary = RunSummary {
            table: "orders".into(),
            records_processed: 1250,
            objects_written: 3,
        };
        assert_eq!(
            serde_json::to_value(&summary).unwrap(),
            json!({"table": "orders", "recordsProcessed": 1250, "objectsWritten": 3})
        );
    }

    #[test]
    fn only_running_state_allows_pulls() {
        assert!(PipelineState::Running.can_pull());
        assert!(!PipelineState::Paused.can_pull());
        assert!(!PipelineState::Draining.can_pull());
        assert!(!PipelineState::Done.can_pull());
        assert!(!PipelineState::Failed("x".into()).can_pull());
        assert!(PipelineState::Failed("x".into()).is_terminal());
        assert!(!PipelineState::Paused.is_terminal());
    }

    #[test]
    fn source_position_display() {
        let paged = SourcePosition {
            page: Some(2),
            records: 500,
        };
        assert_eq!(paged.to_string(), "page 2 (500 records)");
        let cursor = SourcePosition {
            page: None,
            records: 42,
        };
        assert_eq!(cursor.to_string(), "42 records");
    }

    #[test]
    fn export_report_totals_and_failure_shape() {
        let report = ExportReport {
            succeeded: vec![
                RunSummary {
                    table: "orders".into(),
                    records_processed: 1250,
                    objects_written: 3,
                },
                RunSummary::empty("refunds"),
            ],
            failed: vec![TableFailure {
                table: "payouts".into(),
                code: "upload_failed".into(),
                message: "boom".into(),
                batch: Some(2),
            }],
            skipped: vec!["legacy".into()],
        };
        assert!(!report.is_success());
        assert_eq!(report.records_processed(), 1250);
        assert_eq!(report.objects_written(), 3);
        assert_eq!(
            serde_json::to_value(&report.failed[0]).unwrap(),
            json!({"table": "payouts", "code": "upload_failed", "message": "boom", "batch": 2})
        );
    }
}
