//! Object key layout
//!
//! Keys look like `<prefix>/<table>/<YYYY>/<MM>/<DD>/<HH>/<table><mm>[<batch>]`, where
//! the date parts and `<mm>` come from the run's start time. Batched output appends the
//! 1-based batch number; streamed and local output do not. Downstream loaders depend on
//! this exact layout.

use chrono::{DateTime, NaiveDate, TimeZone, Timelike, Utc};

/// Key builder for one table within one run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyLayout {
    prefix: String,
    table: String,
    started_at: DateTime<Utc>,
}

impl KeyLayout {
    /// Create a layout. A trailing `/` on the prefix is ignored.
    pub fn new(
        prefix: impl Into<String>,
        table: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let prefix = prefix.into().trim_end_matches('/').to_string();
        Self {
            prefix,
            table: table.into(),
            started_at,
        }
    }

    /// Table name the keys are built for
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Key without a batch suffix (streamed object, local file)
    pub fn object_key(&self) -> String {
        let date = self.started_at.format("%Y/%m/%d/%H");
        let minute = self.started_at.format("%M");
        if self.prefix.is_empty() {
            format!("{}/{}/{}{}", self.table, date, self.table, minute)
        } else {
            format!(
                "{}/{}/{}/{}{}",
                self.prefix, self.table, date, self.table, minute
            )
        }
    }

    /// Key of the `batch`-th object of a batched run
    pub fn batch_key(&self, batch: u64) -> String {
        format!("{}{}", self.object_key(), batch)
    }
}

/// Components recovered from a key
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedKey {
    /// Table name
    pub table: String,
    /// Run start, truncated to the minute
    pub started_at: DateTime<Utc>,
    /// Batch number, absent for unbatched output
    pub batch: Option<u64>,
}

/// Parse a key built by [`KeyLayout`] back into its components.
///
/// Returns `None` if the key does not follow the layout.
pub fn parse_key(key: &str) -> Option<ParsedKey> {
    let mut parts = key.rsplit('/');
    let file = parts.next()?;
    let hour: u32 = parse_fixed(parts.next()?, 2)?;
    let day: u32 = parse_fixed(parts.next()?, 2)?;
    let month: u32 = parse_fixed(parts.next()?, 2)?;
    let year: i32 = parse_fixed(parts.next()?, 4)?;
    let table = parts.next()?;

    let rest = file.strip_prefix(table)?;
    if rest.len() < 2 || !rest.is_char_boundary(2) {
        return None;
    }
    let (minute, batch) = rest.split_at(2);
    let minute: u32 = parse_fixed(minute, 2)?;
    let batch = if batch.is_empty() {
        None
    } else {
        if !batch.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some(batch.parse().ok()?)
    };

    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let naive = date.and_hms_opt(hour, minute, 0)?;
    let started_at = Utc.from_utc_datetime(&naive);

    Some(ParsedKey {
        table: table.to_string(),
        started_at,
        batch,
    })
}

fn parse_fixed<T: std::str::FromStr>(part: &str, width: usize) -> Option<T> {
    if part.len() != width || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

/// Truncate a timestamp to the minute, the precision keys carry
pub fn truncate_to_minute(at: DateTime<Utc>) -> DateTime<Utc> {
    at.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(at)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, 7, 9, 41).unwrap()
    }

    #[test]
    fn batch_keys_follow_the_layout() {
        let layout = KeyLayout::new("reconcile", "orders", start());
        assert_eq!(layout.batch_key(1), "reconcile/orders/2024/03/05/07/orders091");
        assert_eq!(layout.batch_key(12), "reconcile/orders/2024/03/05/07/orders0912");
        assert_eq!(layout.object_key(), "reconcile/orders/2024/03/05/07/orders09");
    }

    #[test]
    fn trailing_slash_on_prefix_is_normalised() {
        let with_slash = KeyLayout::new("reconcile/", "orders", start());
        let without = KeyLayout::new("reconcile", "orders", start());
        assert_eq!(with_slash.batch_key(3), without.batch_key(3));
    }

    #[test]
    fn empty_prefix_produces_no_leading_slash() {
        let layout = KeyLayout::new("", "orders", start());
        assert_eq!(layout.object_key(), "orders/2024/03/05/07/orders09");
    }

    #[test]
    fn key_parses_back_to_start_minute_and_batch() {
        let layout = KeyLayout::new("reconcile", "payments_v2", start());

        let parsed = parse_key(&layout.batch_key(7)).unwrap();
        assert_eq!(parsed.table, "payments_v2");
        assert_eq!(parsed.started_at, truncate_to_minute(start()));
        assert_eq!(parsed.batch, Some(7));

        let streamed = parse_key(&layout.object_key()).unwrap();
        assert_eq!(streamed.started_at, truncate_to_minute(start()));
        assert_eq!(streamed.batch, None);
    }

    #[test]
    fn table_names_ending_in_digits_still_round_trip() {
        let layout = KeyLayout::new("reconcile", "ledger2024", start());
        let parsed = parse_key(&layout.batch_key(3)).unwrap();
        assert_eq!(parsed.table, "ledger2024");
        assert_eq!(parsed.batch, Some(3));
    }

    #[test]
    fn concurrent_tables_in_the_same_minute_get_distinct_keys() {
        let a = KeyLayout::new("reconcile", "orders", start());
        let b = KeyLayout::new("reconcile", "refunds", start());
        for n in 1..=50 {
            assert_ne!(a.batch_key(n), b.batch_key(n));
        }
    }

    #[test]
    fn malformed_keys_are_rejected() {
        assert!(parse_key("reconcile/orders/2024/03/05/orders09").is_none());
        assert!(parse_key("reconcile/orders/2024/13/05/07/orders09").is_none());
        assert!(parse_key("reconcile/orders/2024/03/05/07/refunds09").is_none());
        assert!(parse_key("reconcile/orders/2024/03/05/07/orders9").is_none());
        assert!(parse_key("reconcile/orders/2024/03/05/07/orders09x").is_none());
    }
}
