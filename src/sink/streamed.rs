//! A single newline-delimited JSON object, streamed through a multipart upload.
//!
//! Flow control is left to the upload writer's own buffering: writes complete once the
//! data is buffered or a part has been handed off, and the object only becomes visible
//! when [`finish`](SinkStrategy::finish) completes the upload.

use async_trait::async_trait;
use object_store::ObjectStore;
use object_store::buffered::BufWriter;
use object_store::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

use super::SinkStrategy;
use crate::config::OutputMode;
use crate::error::SinkError;
use crate::keys::KeyLayout;
use crate::types::Batch;

/// Streams every record as one NDJSON line into `<key>`
pub struct StreamedObjectSink {
    store: Arc<dyn ObjectStore>,
    key: String,
    dry_run: bool,
    writer: Option<BufWriter>,
    lines: u64,
}

impl StreamedObjectSink {
    /// Create a streamed sink
    pub fn new(store: Arc<dyn ObjectStore>, layout: KeyLayout, dry_run: bool) -> Self {
        Self {
            store,
            key: layout.object_key(),
            dry_run,
            writer: None,
            lines: 0,
        }
    }

    fn stream_error(&self, reason: impl ToString) -> SinkError {
        SinkError::Stream {
            key: self.key.clone(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl SinkStrategy for StreamedObjectSink {
    fn mode(&self) -> OutputMode {
        OutputMode::S3Stream
    }

    async fn accept(&mut self, batch: Batch) -> Result<(), SinkError> {
        let mut buf = Vec::new();
        for record in &batch.records {
            serde_json::to_writer(&mut buf, record).map_err(|e| SinkError::Encode {
                batch: batch.number,
                reason: e.to_string(),
            })?;
            buf.push(b'\n');
        }
        self.lines += batch.len() as u64;

        if self.dry_run {
            return Ok(());
        }

        if self.writer.is_none() {
            tracing::debug!(key = %self.key, "starting streamed upload");
        }
        let writer = self.writer.get_or_insert_with(|| {
            BufWriter::new(Arc::clone(&self.store), Path::from(self.key.as_str()))
        });
        let written = writer.write_all(&buf).await;
        written.map_err(|e| self.stream_error(e))
    }

    async fn finish(&mut self) -> Result<u64, SinkError> {
        if self.dry_run {
            tracing::info!(
                key = %self.key,
                lines = self.lines,
                "dry run, skipping streamed upload"
            );
            return Ok(0);
        }
        let Some(mut writer) = self.writer.take() else {
            return Ok(0);
        };
        let completed = writer.shutdown().await;
        completed.map_err(|e| self.stream_error(e))?;
        tracing::info!(key = %self.key, lines = self.lines, "upload finished");
        Ok(1)
    }

    async fn abort(&mut self) {
        if let Some(mut writer) = self.writer.take()
            && let Err(e) = writer.abort().await
        {
            tracing::warn!(key = %self.key, error = %e, "failed to abort streamed upload");
        }
    }
}
