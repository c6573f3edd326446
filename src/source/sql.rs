//! SQL cursor source.
//!
//! Rows are read by a cursor task and handed over a capacity-1 channel, so the cursor
//! is suspended whenever the pipeline stops pulling. Each row becomes a [`Record`]
//! keyed by column name.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{Map, Value};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{Chunk, RecordSource, SourceSize};
use crate::error::SourceError;
use crate::types::{Record, SourcePosition};

/// Rows handed over per [`next`](RecordSource::next) call at most
const DEFAULT_CHUNK_ROWS: usize = 500;

/// [`RecordSource`] streaming the result set of one statement
pub struct SqlCursorSource {
    pool: SqlitePool,
    sql: String,
    size_query: Option<String>,
    chunk_rows: usize,
    rows: Option<mpsc::Receiver<Result<Record, String>>>,
    cursor_task: Option<JoinHandle<()>>,
    records: u64,
}

impl SqlCursorSource {
    /// Stream the rows of `sql` from `pool`
    pub fn new(pool: SqlitePool, sql: impl Into<String>) -> Self {
        Self {
            pool,
            sql: sql.into(),
            size_query: None,
            chunk_rows: DEFAULT_CHUNK_ROWS,
            rows: None,
            cursor_task: None,
            records: 0,
        }
    }

    /// Run `size_query` first; a zero `cnt` means nothing to export
    pub fn with_size_query(mut self, size_query: Option<String>) -> Self {
        self.size_query = size_query;
        self
    }

    /// Cap the rows returned by one pull
    pub fn with_chunk_rows(mut self, chunk_rows: usize) -> Self {
        self.chunk_rows = chunk_rows.max(1);
        self
    }

    async fn query_size(&self, size_query: &str) -> Result<u64, SourceError> {
        let row = sqlx::query(size_query)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SourceError::SizeQuery {
                reason: e.to_string(),
            })?;
        let Some(row) = row else {
            return Ok(0);
        };
        let record = row_to_record(&row).map_err(|reason| SourceError::SizeQuery { reason })?;

        // `cnt` by convention, otherwise the first column
        let count = record
            .get("cnt")
            .or_else(|| record.0.values().next())
            .and_then(Value::as_u64)
            .ok_or_else(|| SourceError::SizeQuery {
                reason: "size query did not return a non-negative count".to_string(),
            })?;

        if let Some(ts) = record.get("ts") {
            tracing::debug!(count, db_now = %ts, "size query");
        } else {
            tracing::debug!(count, "size query");
        }
        Ok(count)
    }

    fn spawn_cursor(&mut self) {
        let (tx, rx) = mpsc::channel::<Result<Record, String>>(1);
        let pool = self.pool.clone();
        let sql = self.sql.clone();

        let task = tokio::spawn(async move {
            let mut rows = sqlx::query(&sql).fetch(&pool);
            while let Some(row) = rows.next().await {
                let item = row
                    .map_err(|e| e.to_string())
                    .and_then(|row| row_to_record(&row));
                let failed = item.is_err();
                if tx.send(item).await.is_err() || failed {
                    break;
                }
            }
        });

        self.rows = Some(rx);
        self.cursor_task = Some(task);
    }

    fn fetch_error(&self, reason: String) -> SourceError {
        SourceError::Fetch {
            position: self.position(),
            reason,
        }
    }
}

#[async_trait]
impl RecordSource for SqlCursorSource {
    async fn open(&mut self) -> Result<SourceSize, SourceError> {
        let size = match self.size_query.clone() {
            Some(size_query) => SourceSize::Records(self.query_size(&size_query).await?),
            None => SourceSize::Unknown,
        };
        if !size.is_empty() {
            self.spawn_cursor();
        }
        Ok(size)
    }

    async fn next(&mut self) -> Result<Chunk, SourceError> {
        let Some(rows) = self.rows.as_mut() else {
            return Ok(Chunk {
                records: Vec::new(),
                is_final: true,
            });
        };

        let mut records = Vec::new();
        let mut is_final = false;

        // wait for at least one row, then take whatever is already buffered
        match rows.recv().await {
            Some(Ok(record)) => records.push(record),
            Some(Err(reason)) => return Err(self.fetch_error(reason)),
            None => is_final = true,
        }
        while !is_final && records.len() < self.chunk_rows {
            match rows.try_recv() {
                Ok(Ok(record)) => records.push(record),
                Ok(Err(reason)) => {
                    self.records += records.len() as u64;
                    return Err(self.fetch_error(reason));
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => is_final = true,
            }
        }

        self.records += records.len() as u64;
        Ok(Chunk { records, is_final })
    }

    fn position(&self) -> SourcePosition {
        SourcePosition {
            page: None,
            records: self.records,
        }
    }

    async fn close(&mut self) {
        self.rows = None;
        if let Some(task) = self.cursor_task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

/// Convert one result row into a record.
///
/// Integers and reals keep their numeric type, text stays text, NULL becomes `null`,
/// and blobs are rendered as lowercase hex.
pub fn row_to_record(row: &SqliteRow) -> Result<Record, String> {
    let mut map = Map::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(idx).map_err(|e| e.to_string())?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            let kind = raw.type_info().name().to_ascii_uppercase();
            match kind.as_str() {
                "INTEGER" | "INT" | "INT8" | "BIGINT" | "BOOLEAN" => {
                    Value::from(row.try_get::<i64, _>(idx).map_err(|e| e.to_string())?)
                }
                "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => {
                    Value::from(row.try_get::<f64, _>(idx).map_err(|e| e.to_string())?)
                }
                "BLOB" => {
                    let bytes = row.try_get::<Vec<u8>, _>(idx).map_err(|e| e.to_string())?;
                    Value::String(bytes.iter().map(|b| format!("{b:02x}")).collect())
                }
                _ => Value::String(row.try_get::<String, _>(idx).map_err(|e| e.to_string())?),
            }
        };
        map.insert(column.name().to_string(), value);
    }
    Ok(Record(map))
}
