//! Configuration types for batch-export
//!
//! The configuration is consumed, not owned: loading it from disk or a secrets store is
//! the caller's job. [`ExportConfig::validate`] must pass before any table runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::window::ReportingWindow;

/// Which credentials/targets a process invocation talks to
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Sandbox API, staging bucket
    #[default]
    Staging,
    /// Live API, production bucket
    Production,
}

/// How a table's rows are persisted
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputMode {
    /// One CSV file on local disk
    #[default]
    #[serde(rename = "local")]
    Local,
    /// One JSON-array object per batch
    #[serde(rename = "s3")]
    S3,
    /// A single newline-delimited JSON object, streamed
    #[serde(rename = "s3Stream")]
    S3Stream,
}

impl OutputMode {
    /// Whether output goes to the object store
    pub fn is_remote(&self) -> bool {
        !matches!(self, OutputMode::Local)
    }
}

impl std::fmt::Display for OutputMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputMode::Local => write!(f, "local"),
            OutputMode::S3 => write!(f, "s3"),
            OutputMode::S3Stream => write!(f, "s3Stream"),
        }
    }
}

/// One table or report to export
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableConfig {
    /// Table/report name, used in object keys
    pub name: String,

    /// Statement streamed by the SQL cursor source
    #[serde(default, alias = "sql")]
    pub source_query: Option<String>,

    /// Statement returning the expected row count as `cnt`
    #[serde(default, alias = "querySize")]
    pub size_query: Option<String>,

    /// Output strategy (default: local)
    #[serde(default)]
    pub output: OutputMode,

    /// Skip this table entirely
    #[serde(default)]
    pub disabled: bool,

    /// Read everything but write nothing to the object store
    #[serde(default)]
    pub dry_run: bool,
}

/// Paginated reporting API settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfig {
    /// Base URL used in the staging environment
    #[serde(default = "default_sandbox_base_url")]
    pub sandbox_base_url: String,

    /// Base URL used in the production environment
    #[serde(default = "default_live_base_url")]
    pub live_base_url: String,

    /// Report endpoint path
    #[serde(default = "default_api_path")]
    pub path: String,

    /// Records per page requested from the API (default: 500)
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Value of the `fields` query parameter
    #[serde(default = "default_fields")]
    pub fields: String,

    /// Name of the array holding the records in each page response
    #[serde(default = "default_records_field")]
    pub records_field: String,

    /// Per-request timeout (default: 30s)
    #[serde(
        default = "default_api_timeout",
        with = "duration_serde",
        rename = "timeoutSecs"
    )]
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            sandbox_base_url: default_sandbox_base_url(),
            live_base_url: default_live_base_url(),
            path: default_api_path(),
            page_size: default_page_size(),
            fields: default_fields(),
            records_field: default_records_field(),
            timeout: default_api_timeout(),
        }
    }
}

impl ApiConfig {
    /// Base URL for the given environment
    pub fn base_url(&self, environment: Environment) -> &str {
        match environment {
            Environment::Staging => &self.sandbox_base_url,
            Environment::Production => &self.live_base_url,
        }
    }
}

/// Main configuration for an export invocation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportConfig {
    /// Tables/reports to export, processed in order
    #[serde(default)]
    pub tables: Vec<TableConfig>,

    /// Records per batch (default: 3000)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Production bucket
    #[serde(default)]
    pub bucket: String,

    /// Bucket used in the staging environment (falls back to `bucket`)
    #[serde(default)]
    pub staging_bucket: Option<String>,

    /// Key prefix every object is written under (default: "reconcile")
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Target environment (default: staging)
    #[serde(default)]
    pub environment: Environment,

    /// Directory for local CSV output (default: "./tmp")
    #[serde(default = "default_local_dir")]
    pub local_dir: PathBuf,

    /// How many tables may run at the same time (default: 1)
    #[serde(default = "default_max_concurrent_tables")]
    pub max_concurrent_tables: usize,

    /// Reporting API settings, for API-backed tables
    #[serde(default)]
    pub api: Option<ApiConfig>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            tables: Vec::new(),
            batch_size: default_batch_size(),
            bucket: String::new(),
            staging_bucket: None,
            key_prefix: default_key_prefix(),
            environment: Environment::default(),
            local_dir: default_local_dir(),
            max_concurrent_tables: default_max_concurrent_tables(),
            api: None,
        }
    }
}

impl ExportConfig {
    /// Parse a JSON configuration document and validate it
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ConfigError {
            message: format!("invalid configuration JSON: {e}"),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Bucket for the configured environment
    pub fn active_bucket(&self) -> &str {
        self.bucket_for(self.environment)
    }

    /// Bucket used when running against `environment`
    pub fn bucket_for(&self, environment: Environment) -> &str {
        match (environment, &self.staging_bucket) {
            (Environment::Staging, Some(staging)) => staging,
            _ => &self.bucket,
        }
    }

    /// Tables that will actually run
    pub fn enabled_tables(&self) -> impl Iterator<Item = &TableConfig> {
        self.tables.iter().filter(|t| !t.disabled)
    }

    /// Reject malformed table definitions before any run starts
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::new("batchSize", "must be greater than zero"));
        }
        if self.max_concurrent_tables == 0 {
            return Err(ConfigError::new(
                "maxConcurrentTables",
                "must be greater than zero",
            ));
        }

        let mut seen = HashSet::new();
        for (idx, table) in self.tables.iter().enumerate() {
            let key = format!("tables[{idx}].name");
            if table.name.trim().is_empty() {
                return Err(ConfigError::new(key, "table name must not be empty"));
            }
            if table.name.contains('/') {
                return Err(ConfigError::new(
                    key,
                    format!("table name '{}' must not contain '/'", table.name),
                ));
            }
            if !seen.insert(table.name.as_str()) {
                return Err(ConfigError::new(
                    key,
                    format!("duplicate table name '{}'", table.name),
                ));
            }
            if let Some(query) = &table.source_query
                && query.trim().is_empty()
            {
                return Err(ConfigError::new(
                    format!("tables[{idx}].sourceQuery"),
                    "source query must not be empty",
                ));
            }
        }

        let needs_bucket = self.enabled_tables().any(|t| t.output.is_remote());
        if needs_bucket && self.active_bucket().trim().is_empty() {
            return Err(ConfigError::new(
                "bucket",
                "a bucket is required when a table writes to the object store",
            ));
        }

        if let Some(api) = &self.api {
            if api.page_size == 0 {
                return Err(ConfigError::new("api.pageSize", "must be greater than zero"));
            }
            let base = api.base_url(self.environment);
            if let Err(e) = url::Url::parse(base) {
                return Err(ConfigError::new(
                    "api.baseUrl",
                    format!("invalid base URL '{base}': {e}"),
                ));
            }
        }

        Ok(())
    }
}

/// Values fixed for one process invocation and shared by every table run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunConfig {
    /// When the invocation started; drives the key's date prefix and minute
    pub started_at: DateTime<Utc>,
    /// Reporting window handed to sources
    pub window: ReportingWindow,
    /// Records per batch
    pub batch_size: usize,
    /// Target environment; selects the bucket and the API base URL
    pub environment: Environment,
}

impl RunConfig {
    /// Build the run values for an invocation starting at `started_at`
    pub fn new(config: &ExportConfig, started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            window: ReportingWindow::trailing_day(started_at),
            batch_size: config.batch_size,
            environment: config.environment,
        }
    }

    /// Build the run values for an invocation starting now
    pub fn now(config: &ExportConfig) -> Self {
        Self::new(config, Utc::now())
    }

    /// Override the default reporting window
    pub fn with_window(mut self, window: ReportingWindow) -> Self {
        self.window = window;
        self
    }
}

fn default_batch_size() -> usize {
    3000
}

fn default_key_prefix() -> String {
    "reconcile".to_string()
}

fn default_local_dir() -> PathBuf {
    PathBuf::from("./tmp")
}

fn default_max_concurrent_tables() -> usize {
    1
}

fn default_sandbox_base_url() -> String {
    "https://api-m.sandbox.paypal.com".to_string()
}

fn default_live_base_url() -> String {
    "https://api-m.paypal.com".to_string()
}

fn default_api_path() -> String {
    "/v1/reporting/transactions".to_string()
}

fn default_page_size() -> u32 {
    500
}

fn default_fields() -> String {
    "all".to_string()
}

fn default_records_field() -> String {
    "transaction_details".to_string()
}

fn default_api_timeout() -> Duration {
    Duration::from_secs(30)
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
