//! # batch-export
//!
//! Streaming batch-export pipeline: pull records from a paginated reporting API or a
//! database cursor, group them into fixed-size batches, and persist them to an object
//! store or the local filesystem without letting the producer outrun the uploads.
//!
//! ## Design Philosophy
//!
//! - **Library-first** - scheduling, credentials and client construction stay with the caller
//! - **Bounded memory** - at most one batch is in flight between source and sink
//! - **Failure isolation** - one failing table never stops the others
//! - **Single attempt** - nothing is retried inside the pipeline; already-written batches stay
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use batch_export::{ExportConfig, Exporter, RunConfig, SqlSourceFactory};
//! use object_store::memory::InMemory;
//! use sqlx::SqlitePool;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExportConfig::from_json(
//!         r#"{
//!             "bucket": "reports",
//!             "batchSize": 500,
//!             "tables": [
//!                 {"name": "orders", "sourceQuery": "SELECT * FROM orders",
//!                  "sizeQuery": "SELECT COUNT(*) AS cnt FROM orders", "output": "s3"}
//!             ]
//!         }"#,
//!     )?;
//!
//!     let pool = SqlitePool::connect("sqlite://reporting.db").await?;
//!     let exporter = Exporter::new(config, SqlSourceFactory::new(pool))?
//!         .with_object_store(Arc::new(InMemory::new()));
//!
//!     let run = RunConfig::now(exporter.config());
//!     let report = exporter.run(&run).await;
//!     println!("{}", serde_json::to_string_pretty(&report)?);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Fixed-size batch accumulation
pub mod batcher;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Multi-table orchestration
pub mod exporter;
/// Object key layout
pub mod keys;
/// Single-table export runs and flow control
pub mod pipeline;
/// Batch and stream persistence
pub mod sink;
/// Record producers
pub mod source;
/// Core types
pub mod types;
/// Reporting window
pub mod window;

// Re-export commonly used types
pub use batcher::Batcher;
pub use config::{ApiConfig, Environment, ExportConfig, OutputMode, RunConfig, TableConfig};
pub use error::{ConfigError, Error, Result, SinkError, SourceError};
pub use exporter::{ApiSourceFactory, Exporter, SourceFactory, SqlSourceFactory};
pub use keys::{KeyLayout, ParsedKey, parse_key};
pub use pipeline::{ExportPipeline, FlowController};
pub use sink::{
    BatchedObjectSink, LocalFileSink, SinkContext, SinkStrategy, StreamedObjectSink, build_sink,
};
pub use source::{
    Chunk, PageFetcher, PageQuery, PagedSource, RecordSource, ReportingApiClient, SourceSize,
    SqlCursorSource,
};
pub use types::{
    Batch, ExportReport, ExportTarget, PipelineState, Record, RunSummary, SourcePosition,
    TableFailure,
};
pub use window::ReportingWindow;

/// Run an export, cancelling it cleanly on a termination signal.
///
/// On SIGTERM/SIGINT (Ctrl+C elsewhere) the exporter's cancellation token is fired: running
/// tables release their sources, abort open streamed uploads and show up as `cancelled`
/// failures in the returned report.
///
/// # Example
///
/// ```no_run
/// use batch_export::{ExportConfig, Exporter, RunConfig, SqlSourceFactory, run_with_shutdown};
/// use sqlx::SqlitePool;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = ExportConfig::from_json(r#"{"tables": []}"#)?;
///     let pool = SqlitePool::connect("sqlite://reporting.db").await?;
///     let exporter = Exporter::new(config, SqlSourceFactory::new(pool))?;
///
///     let report = run_with_shutdown(&exporter, &RunConfig::now(exporter.config())).await;
///     assert!(report.is_success());
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(exporter: &exporter::Exporter, run: &RunConfig) -> ExportReport {
    let export = exporter.run(run);
    tokio::pin!(export);

    tokio::select! {
        report = &mut export => report,
        _ = wait_for_signal() => {
            exporter.cancellation_token().cancel();
            export.await
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // registration can fail in restricted environments (containers, tests)
    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("received SIGTERM, cancelling export"),
                _ = sigint.recv() => tracing::info!("received SIGINT, cancelling export"),
            }
        }
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(error = %e, "could not register signal handlers, using ctrl_c");
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("received Ctrl+C, cancelling export");
            } else {
                // never resolve: without a signal source the export just runs to completion
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("received Ctrl+C, cancelling export"),
        Err(e) => {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}
