//! One export run for one table or report.
//!
//! [`ExportPipeline::run`] opens the source, pulls chunks while the
//! [`FlowController`] allows it, cuts them into batches and hands every batch to the
//! sink task. The source is closed on every exit path, and a failing run never leaves
//! the controller parked in `Paused`.

mod flow;


pub use flow::FlowController;

use tokio_util::sync::CancellationToken;

use crate::batcher::Batcher;
use crate::config::RunConfig;
use crate::error::{Error, Result};
use crate::sink::SinkStrategy;
use crate::source::RecordSource;
use crate::types::RunSummary;

/// Orchestrates one table run
#[derive(Clone, Debug)]
pub struct ExportPipeline {
    table: String,
    batch_size: usize,
    cancel: CancellationToken,
}

impl ExportPipeline {
    /// Create a pipeline for `table` using the invocation's run values
    pub fn new(table: impl Into<String>, run: &RunConfig) -> Self {
        Self {
            table: table.into(),
            batch_size: run.batch_size,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop the run early when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Table or report name
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Export everything `source` yields into `sink`.
    ///
    /// A source that reports zero records or pages completes immediately with an
    /// empty summary and never touches the sink.
    ///
    /// # Errors
    ///
    /// Returns the first source or sink error, or [`Error::Cancelled`]. Batches that
    /// were already written stay written.
    pub async fn run(
        &self,
        source: &mut dyn RecordSource,
        sink: Box<dyn SinkStrategy>,
    ) -> Result<RunSummary> {
        let mode = sink.mode();
        let result = self.drive(source, sink).await;
        source.close().await;

        match &result {
            Ok(summary) => tracing::info!(
                table = %self.table,
                output = %mode,
                records = summary.records_processed,
                objects = summary.objects_written,
                "export finished"
            ),
            Err(e) => tracing::error!(
                table = %self.table,
                output = %mode,
                code = e.error_code(),
                batch = e.batch_number(),
                error = %e,
                "export failed"
            ),
        }
        result
    }

    async fn drive(
        &self,
        source: &mut dyn RecordSource,
        sink: Box<dyn SinkStrategy>,
    ) -> Result<RunSummary> {
        let size = source.open().await?;
        if size.is_empty() {
            tracing::info!(table = %self.table, "no changes, nothing to export");
            return Ok(RunSummary::empty(&self.table));
        }
        tracing::debug!(table = %self.table, ?size, batch_size = self.batch_size, "source opened");

        let mut batcher = Batcher::new(self.batch_size, size.expected_records());
        let mut flow = FlowController::start(&self.table, sink);

        loop {
            let pulled = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                chunk = source.next() => Some(chunk),
            };
            let chunk = match pulled {
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => {
                    flow.abort(e.to_string()).await;
                    return Err(e.into());
                }
                None => {
                    let position = source.position();
                    flow.abort(format!("cancelled at {position}")).await;
                    return Err(Error::Cancelled { position });
                }
            };

            for record in chunk.records {
                if let Some(batch) = batcher.offer(record) {
                    flow.dispatch(batch).await?;
                }
            }
            if chunk.is_final {
                break;
            }
        }

        flow.begin_drain();
        if let Some(batch) = batcher.finish() {
            flow.dispatch(batch).await?;
        }
        let objects_written = flow.finish().await?;

        Ok(RunSummary {
            table: self.table.clone(),
            records_processed: batcher.processed(),
            objects_written,
        })
    }
}
