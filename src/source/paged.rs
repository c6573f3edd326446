//! Paginated sources: count pages once, then fetch `1..=total` in order.
//!
//! The page count is taken before the first page is fetched. If the underlying data
//! changes in between, later pages may be inconsistent with the count; the source does
//! not try to detect or correct that.

use async_trait::async_trait;

use super::{Chunk, RecordSource, SourceSize};
use crate::error::SourceError;
use crate::types::{Record, SourcePosition};
use crate::window::ReportingWindow;

/// Parameters shared by the count query and every page fetch
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageQuery {
    /// Reporting window
    pub window: ReportingWindow,
    /// Records per page
    pub page_size: u32,
    /// Field selector understood by the API
    pub fields: String,
}

/// Capability to count and fetch pages of a report
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Total number of pages for `query`
    async fn page_count(&self, query: &PageQuery) -> Result<u32, SourceError>;

    /// Records on page `page` (1-based)
    async fn fetch_page(&self, query: &PageQuery, page: u32) -> Result<Vec<Record>, SourceError>;
}

/// [`RecordSource`] that walks the pages of a [`PageFetcher`]
pub struct PagedSource<F> {
    fetcher: F,
    query: PageQuery,
    total_pages: Option<u32>,
    last_page: u32,
    records: u64,
}

impl<F: PageFetcher> PagedSource<F> {
    /// Create a source for `query`
    pub fn new(fetcher: F, query: PageQuery) -> Self {
        Self {
            fetcher,
            query,
            total_pages: None,
            last_page: 0,
            records: 0,
        }
    }

    /// Page total reported by [`open`](RecordSource::open)
    pub fn total_pages(&self) -> Option<u32> {
        self.total_pages
    }
}

#[async_trait]
impl<F: PageFetcher> RecordSource for PagedSource<F> {
    async fn open(&mut self) -> Result<SourceSize, SourceError> {
        let pages = self.fetcher.page_count(&self.query).await?;
        tracing::debug!(total_pages = pages, "page count");
        self.total_pages = Some(pages);
        Ok(SourceSize::Pages(pages))
    }

    async fn next(&mut self) -> Result<Chunk, SourceError> {
        let Some(total) = self.total_pages else {
            return Err(SourceError::Malformed {
                position: self.position(),
                reason: "source was not opened".to_string(),
            });
        };
        if self.last_page >= total {
            return Ok(Chunk {
                records: Vec::new(),
                is_final: true,
            });
        }

        let page = self.last_page + 1;
        let reached = SourcePosition {
            page: Some(page),
            records: self.records,
        };
        let records = self
            .fetcher
            .fetch_page(&self.query, page)
            .await
            .map_err(|e| with_position(e, reached))?;

        self.last_page = page;
        self.records += records.len() as u64;
        tracing::debug!(page, rows = records.len(), "fetched page");

        Ok(Chunk {
            records,
            is_final: page >= total,
        })
    }

    fn position(&self) -> SourcePosition {
        SourcePosition {
            page: (self.last_page > 0).then_some(self.last_page),
            records: self.records,
        }
    }
}

fn with_position(err: SourceError, position: SourcePosition) -> SourceError {
    match err {
        SourceError::Fetch { reason, .. } => SourceError::Fetch { position, reason },
        SourceError::Malformed { reason, .. } => SourceError::Malformed { position, reason },
        SourceError::SizeQuery { reason } => SourceError::Fetch { position, reason },
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;

    struct FakePages {
        pages: Vec<usize>,
        fail_on: Option<u32>,
        requested: Mutex<Vec<u32>>,
    }

    #[async_trait]
    impl PageFetcher for FakePages {
        async fn page_count(&self, _query: &PageQuery) -> Result<u32, SourceError> {
            Ok(self.pages.len() as u32)
        }

        async fn fetch_page(&self, _query: &PageQuery, page: u32) -> Result<Vec<Record>, SourceError> {
            self.requested.lock().unwrap().push(page);
            if self.fail_on == Some(page) {
                return Err(SourceError::Fetch {
                    position: SourcePosition::default(),
                    reason: "HTTP 500".into(),
                });
            }
            let rows = self.pages[(page - 1) as usize];
            Ok((0..rows).map(|i| Record::new().with("page", page).with("row", i as u64)).collect())
        }
    }

    fn query() -> PageQuery {
        PageQuery {
            window: ReportingWindow::trailing_day(Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap()),
            page_size: 500,
            fields: "all".into(),
        }
    }

    fn source(pages: Vec<usize>, fail_on: Option<u32>) -> PagedSource<FakePages> {
        PagedSource::new(
            FakePages {
                pages,
                fail_on,
                requested: Mutex::new(Vec::new()),
            },
            query(),
        )
    }

    #[tokio::test]
    async fn walks_pages_in_order_and_marks_last_final() {
        let mut src = source(vec![2, 2, 1], None);
        assert_eq!(src.open().await.unwrap(), SourceSize::Pages(3));

        let first = src.next().await.unwrap();
        assert_eq!(first.records.len(), 2);
        assert!(!first.is_final);
        let second = src.next().await.unwrap();
        assert!(!second.is_final);
        let third = src.next().await.unwrap();
        assert_eq!(third.records.len(), 1);
        assert!(third.is_final);

        assert_eq!(*src.fetcher.requested.lock().unwrap(), vec![1, 2, 3]);
        assert_eq!(
            src.position(),
            SourcePosition {
                page: Some(3),
                records: 5
            }
        );
    }

    #[tokio::test]
    async fn zero_pages_reports_empty_and_never_fetches() {
        let mut src = source(vec![], None);
        let size = src.open().await.unwrap();
        assert!(size.is_empty());

        let chunk = src.next().await.unwrap();
        assert!(chunk.is_final);
        assert!(chunk.records.is_empty());
        assert!(src.fetcher.requested.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn fetch_failure_reports_page_and_records_reached() {
        let mut src = source(vec![3, 3, 3], Some(2));
        src.open().await.unwrap();
        src.next().await.unwrap();

        let err = src.next().await.unwrap_err();
        assert_eq!(
            err.position(),
            SourcePosition {
                page: Some(2),
                records: 3
            }
        );
    }

    #[tokio::test]
    async fn next_before_open_is_an_error() {
        let mut src = source(vec![1], None);
        assert!(matches!(
            src.next().await,
            Err(SourceError::Malformed { .. })
        ));
    }
}
