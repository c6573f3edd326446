//! Test configuration helpers

use batch_export::{ExportConfig, OutputMode, RunConfig, TableConfig};
use chrono::{DateTime, TimeZone, Utc};
use std::path::Path;

/// Fixed invocation start: 2024-06-01 13:07 UTC
pub fn started_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 13, 7, 0).unwrap()
}

/// Key prefix all tests write under
pub const PREFIX: &str = "reconcile";

/// SQL-backed table reading every row of `name` in id order
pub fn sql_table(name: &str, output: OutputMode) -> TableConfig {
    TableConfig {
        name: name.to_string(),
        source_query: Some(format!("SELECT * FROM {name} ORDER BY id")),
        size_query: Some(format!(
            "SELECT COUNT(*) AS cnt, datetime('now') AS ts FROM {name}"
        )),
        output,
        ..Default::default()
    }
}

/// Export configuration with a bucket and local output under `local_dir`
pub fn export_config(tables: Vec<TableConfig>, batch_size: usize, local_dir: &Path) -> ExportConfig {
    ExportConfig {
        tables,
        batch_size,
        bucket: "reports".to_string(),
        key_prefix: PREFIX.to_string(),
        local_dir: local_dir.to_path_buf(),
        ..Default::default()
    }
}

/// Run values pinned to [`started_at`]
pub fn run_config(config: &ExportConfig) -> RunConfig {
    RunConfig::new(config, started_at())
}
