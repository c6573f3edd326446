//! Reporting time window passed to record sources

use chrono::{DateTime, Duration, NaiveTime, Utc};

/// Format of the window bounds expected by the reporting API
const WINDOW_FORMAT: &str = "%Y-%m-%dT00:00:00-0000";

/// Half-open `[start, end)` interval, both bounds at midnight UTC
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReportingWindow {
    /// Inclusive lower bound
    pub start: DateTime<Utc>,
    /// Exclusive upper bound
    pub end: DateTime<Utc>,
}

impl ReportingWindow {
    /// The default window: `[now - 48h, now - 24h)`, each bound truncated to midnight UTC
    pub fn trailing_day(now: DateTime<Utc>) -> Self {
        Self {
            start: midnight(now - Duration::hours(48)),
            end: midnight(now - Duration::hours(24)),
        }
    }

    /// `start_date` query value
    pub fn start_param(&self) -> String {
        self.start.format(WINDOW_FORMAT).to_string()
    }

    /// `end_date` query value
    pub fn end_param(&self) -> String {
        self.end.format(WINDOW_FORMAT).to_string()
    }
}

fn midnight(at: DateTime<Utc>) -> DateTime<Utc> {
    at.date_naive().and_time(NaiveTime::MIN).and_utc()
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn trailing_day_truncates_both_bounds_to_midnight() {
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 23, 59, 59).unwrap();
        let window = ReportingWindow::trailing_day(now);

        assert_eq!(window.start, Utc.with_ymd_and_hms(2024, 3, 13, 0, 0, 0).unwrap());
        assert_eq!(window.end, Utc.with_ymd_and_hms(2024, 3, 14, 0, 0, 0).unwrap());
    }

    #[test]
    fn window_spans_month_boundaries() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 0, 30, 0).unwrap();
        let window = ReportingWindow::trailing_day(now);

        assert_eq!(window.start_param(), "2024-02-28T00:00:00-0000");
        assert_eq!(window.end_param(), "2024-02-29T00:00:00-0000");
    }

    #[test]
    fn bounds_format_with_zero_offset_suffix() {
        let now = Utc.with_ymd_and_hms(2023, 12, 31, 12, 0, 0).unwrap();
        let window = ReportingWindow::trailing_day(now);
        assert_eq!(window.start_param(), "2023-12-29T00:00:00-0000");
        assert_eq!(window.end_param(), "2023-12-30T00:00:00-0000");
    }
}
