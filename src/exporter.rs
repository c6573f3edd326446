//! Multi-table export
//!
//! [`Exporter`] runs every enabled table of an [`ExportConfig`], each in its own
//! [`ExportPipeline`], up to `maxConcurrentTables` at a time. A failing table is
//! recorded in the [`ExportReport`] and does not stop the others.

use futures::StreamExt;
use object_store::ObjectStore;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::{ApiConfig, ExportConfig, RunConfig, TableConfig};
use crate::error::{ConfigError, Result};
use crate::keys::KeyLayout;
use crate::pipeline::ExportPipeline;
use crate::sink::{SinkContext, build_sink};
use crate::source::{PageQuery, PagedSource, RecordSource, ReportingApiClient, SqlCursorSource};
use crate::types::{ExportReport, ExportTarget, RunSummary, TableFailure};

/// Builds the record source for a table
pub trait SourceFactory: Send + Sync {
    /// Check that `table` can be served, before any run starts
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the missing or invalid setting.
    fn validate_table(&self, _table: &TableConfig) -> std::result::Result<(), ConfigError> {
        Ok(())
    }

    /// Create a fresh, unopened source for `table`
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the table cannot be served by this factory.
    fn source_for(
        &self,
        table: &TableConfig,
        run: &RunConfig,
    ) -> std::result::Result<Box<dyn RecordSource>, ConfigError>;
}

/// Streams each table's `sourceQuery` from a database pool
#[derive(Clone, Debug)]
pub struct SqlSourceFactory {
    pool: SqlitePool,
}

impl SqlSourceFactory {
    /// Serve tables from `pool`
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl SourceFactory for SqlSourceFactory {
    fn validate_table(&self, table: &TableConfig) -> std::result::Result<(), ConfigError> {
        match &table.source_query {
            Some(_) => Ok(()),
            None => Err(missing_query(table)),
        }
    }

    fn source_for(
        &self,
        table: &TableConfig,
        _run: &RunConfig,
    ) -> std::result::Result<Box<dyn RecordSource>, ConfigError> {
        let Some(sql) = &table.source_query else {
            return Err(missing_query(table));
        };
        let source = SqlCursorSource::new(self.pool.clone(), sql.clone())
            .with_size_query(table.size_query.clone());
        Ok(Box::new(source))
    }
}

fn missing_query(table: &TableConfig) -> ConfigError {
    ConfigError::new(
        "sourceQuery",
        format!("table '{}' has no source query", table.name),
    )
}

/// Walks the reporting API for every table over the run's window
#[derive(Clone, Debug)]
pub struct ApiSourceFactory {
    client: ReportingApiClient,
    page_size: u32,
    fields: String,
}

impl ApiSourceFactory {
    /// Serve tables through `client`
    pub fn new(client: ReportingApiClient, page_size: u32, fields: impl Into<String>) -> Self {
        Self {
            client,
            page_size,
            fields: fields.into(),
        }
    }

    /// Serve tables from the API endpoint of the run's environment
    ///
    /// Page size and field selector come from `api`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the endpoint URL or HTTP client cannot be built.
    pub fn from_config(
        api: &ApiConfig,
        run: &RunConfig,
        bearer_token: Option<String>,
    ) -> std::result::Result<Self, ConfigError> {
        let client = ReportingApiClient::new(api, run.environment, bearer_token)?;
        tracing::debug!(
            endpoint = %client.endpoint(),
            environment = ?run.environment,
            page_size = api.page_size,
            "reporting API source configured"
        );
        Ok(Self::new(client, api.page_size, api.fields.clone()))
    }
}

impl SourceFactory for ApiSourceFactory {
    fn source_for(
        &self,
        _table: &TableConfig,
        run: &RunConfig,
    ) -> std::result::Result<Box<dyn RecordSource>, ConfigError> {
        let query = PageQuery {
            window: run.window,
            page_size: self.page_size,
            fields: self.fields.clone(),
        };
        Ok(Box::new(PagedSource::new(self.client.clone(), query)))
    }
}

/// Runs all tables of one invocation
pub struct Exporter {
    config: ExportConfig,
    sources: Arc<dyn SourceFactory>,
    store: Option<Arc<dyn ObjectStore>>,
    cancel: CancellationToken,
}

impl Exporter {
    /// Create an exporter, validating `config` first
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the configuration is malformed.
    pub fn new(
        config: ExportConfig,
        sources: impl SourceFactory + 'static,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        for table in config.enabled_tables() {
            sources.validate_table(table)?;
        }
        Ok(Self {
            config,
            sources: Arc::new(sources),
            store: None,
            cancel: CancellationToken::new(),
        })
    }

    /// Object store handle for `s3`/`s3Stream` tables, already bound to the bucket
    pub fn with_object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Cancel all running tables when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that cancels every table run of this exporter
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Configuration in use
    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Where `table`'s output goes in `run`'s environment
    pub fn target(&self, table: &TableConfig, run: &RunConfig) -> ExportTarget {
        if table.output.is_remote() {
            ExportTarget::ObjectStore {
                bucket: self.config.bucket_for(run.environment).to_string(),
                prefix: self.config.key_prefix.clone(),
            }
        } else {
            ExportTarget::LocalPath(self.config.local_dir.clone())
        }
    }

    /// Export every enabled table and aggregate the outcomes
    pub async fn run(&self, run: &RunConfig) -> ExportReport {
        let mut report = ExportReport::default();
        for table in self.config.tables.iter().filter(|t| t.disabled) {
            tracing::info!(table = %table.name, "table disabled, skipping");
            report.skipped.push(table.name.clone());
        }

        let concurrency = self.config.max_concurrent_tables.max(1);
        let mut outcomes: Vec<(usize, &TableConfig, Result<RunSummary>)> =
            futures::stream::iter(self.config.enabled_tables().enumerate())
                .map(|(idx, table)| async move { (idx, table, self.run_table(table, run).await) })
                .buffer_unordered(concurrency)
                .collect()
                .await;
        outcomes.sort_by_key(|(idx, _, _)| *idx);

        for (_, table, outcome) in outcomes {
            match outcome {
                Ok(summary) => report.succeeded.push(summary),
                Err(e) => report.failed.push(TableFailure {
                    table: table.name.clone(),
                    code: e.error_code().to_string(),
                    message: e.to_string(),
                    batch: e.batch_number(),
                }),
            }
        }

        tracing::info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            records = report.records_processed(),
            "export complete"
        );
        report
    }

    /// Export a single table
    ///
    /// # Errors
    ///
    /// Returns the error that aborted the table's run.
    pub async fn run_table(&self, table: &TableConfig, run: &RunConfig) -> Result<RunSummary> {
        let target = self.target(table, run);
        tracing::info!(
            table = %table.name,
            output = %table.output,
            target = ?target,
            dry_run = table.dry_run,
            "starting export"
        );

        let mut source = self.sources.source_for(table, run)?;
        let sink = build_sink(
            table.output,
            SinkContext {
                store: self.store.clone(),
                layout: KeyLayout::new(&self.config.key_prefix, &table.name, run.started_at),
                local_dir: self.config.local_dir.clone(),
                dry_run: table.dry_run,
            },
        )?;

        ExportPipeline::new(&table.name, run)
            .with_cancellation(self.cancel.child_token())
            .run(source.as_mut(), sink)
            .await
    }
}
