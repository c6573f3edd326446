//! Sink strategies
//!
//! A [`SinkStrategy`] turns batches into persisted output. The variant is chosen once
//! per table from its [`OutputMode`]:
//!
//! | mode       | strategy                | output                                   | backpressure |
//! |------------|-------------------------|------------------------------------------|--------------|
//! | `local`    | [`LocalFileSink`]       | one CSV file under the local directory   | no           |
//! | `s3`       | [`BatchedObjectSink`]   | one JSON-array object per batch          | yes          |
//! | `s3Stream` | [`StreamedObjectSink`]  | one NDJSON object, multipart-streamed    | no           |
//!
//! Sinks create nothing until the first batch arrives, so a run with no records leaves
//! no trace in the store or on disk.

use async_trait::async_trait;
use object_store::ObjectStore;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::OutputMode;
use crate::error::{ConfigError, SinkError};
use crate::keys::KeyLayout;
use crate::types::Batch;

pub mod batched;
pub mod local_file;
pub mod streamed;

pub use batched::BatchedObjectSink;
pub use local_file::LocalFileSink;
pub use streamed::StreamedObjectSink;

/// Trait for batch/stream persistence
#[async_trait]
pub trait SinkStrategy: Send {
    /// Output mode this sink implements
    fn mode(&self) -> OutputMode;

    /// Whether the source must stay paused until each batch is acknowledged
    fn requires_backpressure(&self) -> bool {
        false
    }

    /// Persist one batch. Batches arrive in increasing number order.
    ///
    /// # Errors
    ///
    /// Returns a [`SinkError`] if the batch could not be written. The run is aborted;
    /// the batch is not retried.
    async fn accept(&mut self, batch: Batch) -> Result<(), SinkError>;

    /// Complete the output and return how many objects/files were written
    ///
    /// # Errors
    ///
    /// Returns a [`SinkError`] if the output could not be completed.
    async fn finish(&mut self) -> Result<u64, SinkError>;

    /// Abandon the output after a failure. Already-committed objects stay in place.
    async fn abort(&mut self) {}
}

/// Everything needed to build the sink for one table
#[derive(Clone)]
pub struct SinkContext {
    /// Object store handle, required for remote modes
    pub store: Option<Arc<dyn ObjectStore>>,
    /// Key builder for the table
    pub layout: KeyLayout,
    /// Directory for local output
    pub local_dir: PathBuf,
    /// Skip object store writes
    pub dry_run: bool,
}

/// Build the sink for `mode`
pub fn build_sink(mode: OutputMode, ctx: SinkContext) -> Result<Box<dyn SinkStrategy>, ConfigError> {
    let SinkContext {
        store,
        layout,
        local_dir,
        dry_run,
    } = ctx;

    let table = layout.table().to_string();
    let remote_store = |store: Option<Arc<dyn ObjectStore>>| {
        store.ok_or_else(|| {
            ConfigError::new(
                "output",
                format!("table '{table}' writes to the object store but no store was configured"),
            )
        })
    };

    let sink: Box<dyn SinkStrategy> = match mode {
        OutputMode::Local => Box::new(LocalFileSink::new(local_dir, layout)),
        OutputMode::S3 => Box::new(BatchedObjectSink::new(remote_store(store)?, layout, dry_run)),
        OutputMode::S3Stream => {
            Box::new(StreamedObjectSink::new(remote_store(store)?, layout, dry_run))
        }
    };
    Ok(sink)
}
