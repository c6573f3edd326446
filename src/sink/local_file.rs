//! Pass-through CSV writer on local disk.
//!
//! The whole run lands in one file, `<local dir>/<object key>.csv`. The header comes
//! from the first record's field names; later records are written in that column order,
//! with missing fields left empty.

use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use super::SinkStrategy;
use crate::config::OutputMode;
use crate::error::SinkError;
use crate::keys::KeyLayout;
use crate::types::{Batch, Record};

/// Writes every record of the run into one CSV file
pub struct LocalFileSink {
    path: PathBuf,
    file: Option<BufWriter<File>>,
    columns: Vec<String>,
    rows: u64,
}

impl LocalFileSink {
    /// Create a sink writing under `dir`
    pub fn new(dir: PathBuf, layout: KeyLayout) -> Self {
        let path = dir.join(format!("{}.csv", layout.object_key()));
        Self {
            path,
            file: None,
            columns: Vec::new(),
            rows: 0,
        }
    }

    /// Destination file
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn write_error(&self, reason: impl ToString) -> SinkError {
        SinkError::LocalWrite {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }

    async fn open(&mut self, first: &Record) -> Result<(), SinkError> {
        if let Some(parent) = self.path.parent() {
            let created = tokio::fs::create_dir_all(parent).await;
            created.map_err(|e| self.write_error(e))?;
        }
        let file = File::create(&self.path).await;
        let file = file.map_err(|e| self.write_error(e))?;
        self.columns = first.keys().cloned().collect();
        self.file = Some(BufWriter::new(file));
        tracing::debug!(path = %self.path.display(), columns = self.columns.len(), "created CSV output");

        let header = encode_rows(std::iter::once(self.columns.clone()))
            .map_err(|e| self.write_error(e))?;
        self.write(&header).await
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        let Some(file) = self.file.as_mut() else {
            return Err(self.write_error("output file is not open"));
        };
        let written = file.write_all(bytes).await;
        written.map_err(|e| self.write_error(e))
    }
}

#[async_trait]
impl SinkStrategy for LocalFileSink {
    fn mode(&self) -> OutputMode {
        OutputMode::Local
    }

    async fn accept(&mut self, batch: Batch) -> Result<(), SinkError> {
        let Some(first) = batch.records.first() else {
            return Ok(());
        };
        if self.file.is_none() {
            self.open(first).await?;
        }

        let columns = &self.columns;
        let rows = batch
            .records
            .iter()
            .map(|record| columns.iter().map(|c| field(record.get(c))).collect::<Vec<_>>());
        let encoded = encode_rows(rows).map_err(|e| SinkError::Encode {
            batch: batch.number,
            reason: e,
        })?;

        self.write(&encoded).await?;
        self.rows += batch.len() as u64;
        Ok(())
    }

    async fn finish(&mut self) -> Result<u64, SinkError> {
        let Some(mut file) = self.file.take() else {
            return Ok(0);
        };
        let flushed = file.flush().await;
        flushed.map_err(|e| self.write_error(e))?;
        tracing::info!(path = %self.path.display(), rows = self.rows, "saved data locally");
        Ok(1)
    }

    async fn abort(&mut self) {
        if let Some(mut file) = self.file.take() {
            if let Err(e) = file.flush().await {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "failed to flush aborted output"
                );
            }
            tracing::warn!(
                path = %self.path.display(),
                rows = self.rows,
                "run aborted, local output is incomplete"
            );
        }
    }
}

/// CSV cell for a JSON value: strings verbatim, null empty, anything else as JSON text
fn field(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn encode_rows<I>(rows: I) -> Result<Vec<u8>, String>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    for row in rows {
        writer.write_record(&row).map_err(|e| e.to_string())?;
    }
    writer.into_inner().map_err(|e| e.to_string())
}
