//! HTTP client for the paginated transaction reporting API.
//!
//! Every request is a GET on `<base><path>` carrying the reporting window, `fields`,
//! `page_size` and (for page fetches) `page`. The response body is a JSON object with
//! `total_pages` and an array of records under the configured records field.
//! Token acquisition is the caller's business; the client only attaches it.

use async_trait::async_trait;
use serde_json::Value;

use super::paged::{PageFetcher, PageQuery};
use crate::config::{ApiConfig, Environment};
use crate::error::{ConfigError, SourceError};
use crate::types::{Record, SourcePosition};

/// Reporting API client, cheap to clone
#[derive(Clone, Debug)]
pub struct ReportingApiClient {
    http: reqwest::Client,
    endpoint: url::Url,
    records_field: String,
    bearer_token: Option<String>,
}

impl ReportingApiClient {
    /// Build a client for the endpoint selected by `environment`
    pub fn new(
        api: &ApiConfig,
        environment: Environment,
        bearer_token: Option<String>,
    ) -> Result<Self, ConfigError> {
        Self::with_base_url(api, api.base_url(environment), bearer_token)
    }

    /// Build a client against an explicit base URL
    pub fn with_base_url(
        api: &ApiConfig,
        base_url: &str,
        bearer_token: Option<String>,
    ) -> Result<Self, ConfigError> {
        let endpoint = url::Url::parse(base_url)
            .and_then(|base| base.join(&api.path))
            .map_err(|e| ConfigError::new("api.baseUrl", format!("invalid endpoint: {e}")))?;

        let http = reqwest::Client::builder()
            .timeout(api.timeout)
            .build()
            .map_err(|e| ConfigError::new("api", format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint,
            records_field: api.records_field.clone(),
            bearer_token,
        })
    }

    /// The resolved report endpoint
    pub fn endpoint(&self) -> &url::Url {
        &self.endpoint
    }

    async fn get(&self, query: &PageQuery, page: Option<u32>) -> Result<Value, String> {
        let mut params = vec![
            ("start_date", query.window.start_param()),
            ("end_date", query.window.end_param()),
            ("fields", query.fields.clone()),
            ("page_size", query.page_size.to_string()),
        ];
        if let Some(page) = page {
            params.push(("page", page.to_string()));
        }

        let mut request = self.http.get(self.endpoint.clone()).query(&params);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| e.to_string())?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("API returned status {status}: {body}"));
        }
        response.json::<Value>().await.map_err(|e| e.to_string())
    }
}

#[async_trait]
impl PageFetcher for ReportingApiClient {
    async fn page_count(&self, query: &PageQuery) -> Result<u32, SourceError> {
        let body = self
            .get(query, None)
            .await
            .map_err(|reason| SourceError::SizeQuery { reason })?;

        let pages = body
            .get("total_pages")
            .and_then(Value::as_u64)
            .ok_or_else(|| SourceError::SizeQuery {
                reason: "response has no numeric total_pages".to_string(),
            })?;
        u32::try_from(pages).map_err(|_| SourceError::SizeQuery {
            reason: format!("total_pages out of range: {pages}"),
        })
    }

    async fn fetch_page(&self, query: &PageQuery, page: u32) -> Result<Vec<Record>, SourceError> {
        let position = SourcePosition {
            page: Some(page),
            records: 0,
        };
        let body = self
            .get(query, Some(page))
            .await
            .map_err(|reason| SourceError::Fetch { position, reason })?;

        let Some(rows) = body.get(&self.records_field) else {
            return Err(SourceError::Malformed {
                position,
                reason: format!("response has no '{}' field", self.records_field),
            });
        };
        serde_json::from_value::<Vec<Record>>(rows.clone()).map_err(|e| SourceError::Malformed {
            position,
            reason: format!("'{}' is not an array of objects: {e}", self.records_field),
        })
    }
}
