//! Record sources
//!
//! A [`RecordSource`] yields records in chunks until it reports the final chunk.
//! Two families exist:
//! - paginated sources ([`PagedSource`] over a [`PageFetcher`]), which learn the total
//!   page count once in [`open`](RecordSource::open) and then walk pages `1..=total`
//! - cursor sources ([`SqlCursorSource`]), which stream result rows
//!
//! Sources own nothing the caller did not hand them; [`close`](RecordSource::close)
//! releases the cursor or request state and is called on every exit path.

use async_trait::async_trait;

use crate::error::SourceError;
use crate::types::{Record, SourcePosition};

pub mod paged;
pub mod reporting_api;
pub mod sql;

pub use paged::{PageFetcher, PageQuery, PagedSource};
pub use reporting_api::ReportingApiClient;
pub use sql::SqlCursorSource;

/// What a source knows about its size before streaming starts
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceSize {
    /// Exact number of records announced by a size query
    Records(u64),
    /// Number of pages announced by a paginated API
    Pages(u32),
    /// The source streams until exhausted without announcing a size
    Unknown,
}

impl SourceSize {
    /// Whether there is nothing to export
    pub fn is_empty(&self) -> bool {
        matches!(self, SourceSize::Records(0) | SourceSize::Pages(0))
    }

    /// Expected record total, when known
    pub fn expected_records(&self) -> Option<u64> {
        match self {
            SourceSize::Records(n) => Some(*n),
            _ => None,
        }
    }
}

/// Records returned by one pull
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Chunk {
    /// Records in source order, possibly empty
    pub records: Vec<Record>,
    /// No more records will follow
    pub is_final: bool,
}

/// Trait for producers of records
///
/// The pipeline calls [`open`](Self::open) once, then [`next`](Self::next) until a chunk
/// with `is_final` set comes back, then [`close`](Self::close). `next` is never called
/// while a batch upload that requires backpressure is in flight.
#[async_trait]
pub trait RecordSource: Send {
    /// Prepare the source and report its size
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::SizeQuery`] if the size/page-count query fails.
    async fn open(&mut self) -> Result<SourceSize, SourceError>;

    /// Pull the next chunk of records
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Fetch`] or [`SourceError::Malformed`] carrying the position
    /// reached so far.
    async fn next(&mut self) -> Result<Chunk, SourceError>;

    /// How far the source has been read
    fn position(&self) -> SourcePosition;

    /// Release the cursor or connection. Safe to call more than once.
    async fn close(&mut self) {}
}
