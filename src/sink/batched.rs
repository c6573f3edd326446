//! One JSON-array object per batch.

use async_trait::async_trait;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use std::sync::Arc;

use super::SinkStrategy;
use crate::config::OutputMode;
use crate::error::SinkError;
use crate::keys::KeyLayout;
use crate::types::Batch;

/// Writes each batch with a discrete put at `<key><batch number>`
pub struct BatchedObjectSink {
    store: Arc<dyn ObjectStore>,
    layout: KeyLayout,
    dry_run: bool,
    written: u64,
}

impl BatchedObjectSink {
    /// Create a batched sink
    pub fn new(store: Arc<dyn ObjectStore>, layout: KeyLayout, dry_run: bool) -> Self {
        Self {
            store,
            layout,
            dry_run,
            written: 0,
        }
    }
}

#[async_trait]
impl SinkStrategy for BatchedObjectSink {
    fn mode(&self) -> OutputMode {
        OutputMode::S3
    }

    fn requires_backpressure(&self) -> bool {
        true
    }

    async fn accept(&mut self, batch: Batch) -> Result<(), SinkError> {
        let key = self.layout.batch_key(batch.number);
        let body = serde_json::to_vec(&batch.records).map_err(|e| SinkError::Encode {
            batch: batch.number,
            reason: e.to_string(),
        })?;

        if self.dry_run {
            tracing::info!(
                table = self.layout.table(),
                batch = batch.number,
                records = batch.len(),
                key = %key,
                "dry run, skipping upload"
            );
            return Ok(());
        }

        self.store
            .put(&Path::from(key.as_str()), PutPayload::from(body))
            .await
            .map_err(|e| SinkError::Upload {
                batch: batch.number,
                key: key.clone(),
                reason: e.to_string(),
            })?;

        self.written += 1;
        tracing::debug!(
            table = self.layout.table(),
            batch = batch.number,
            records = batch.len(),
            key = %key,
            "batch uploaded"
        );
        Ok(())
    }

    async fn finish(&mut self) -> Result<u64, SinkError> {
        Ok(self.written)
    }
}
