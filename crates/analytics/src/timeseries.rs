//! Time-bucketed series with labels for charting.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveTime, Timelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Upper bound on buckets produced for one series.
const MAX_POINTS: usize = 10_000;

/// Width of one bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Hourly,
    #[default]
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl Granularity {
    /// Picks a bucket width that keeps a chart readable for the span.
    pub fn for_range(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        let span = to - from;
        if span <= Duration::hours(48) {
            Granularity::Hourly
        } else if span <= Duration::days(45) {
            Granularity::Daily
        } else if span <= Duration::days(120) {
            Granularity::Weekly
        } else if span <= Duration::days(24 * 30) {
            Granularity::Monthly
        } else if span <= Duration::days(60 * 30) {
            Granularity::Quarterly
        } else {
            Granularity::Yearly
        }
    }

    /// Start of the bucket containing `at`. Weeks start on Monday.
    pub fn truncate(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let date = at.date_naive();
        let day = match self {
            Granularity::Hourly => {
                let hour = NaiveTime::from_hms_opt(at.hour(), 0, 0).unwrap_or(NaiveTime::MIN);
                return date.and_time(hour).and_utc();
            }
            Granularity::Daily => date,
            Granularity::Weekly => {
                date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
            }
            Granularity::Monthly => first_of(date, date.month()),
            Granularity::Quarterly => first_of(date, (date.month() - 1) / 3 * 3 + 1),
            Granularity::Yearly => first_of(date, 1),
        };
        day.and_time(NaiveTime::MIN).and_utc()
    }

    /// Start of the bucket after the one starting at `start`.
    fn next(&self, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Granularity::Hourly => start.checked_add_signed(Duration::hours(1)),
            Granularity::Daily => start.checked_add_signed(Duration::days(1)),
            Granularity::Weekly => start.checked_add_signed(Duration::weeks(1)),
            Granularity::Monthly => start.checked_add_months(Months::new(1)),
            Granularity::Quarterly => start.checked_add_months(Months::new(3)),
            Granularity::Yearly => start.checked_add_months(Months::new(12)),
        }
    }

    /// Human label for a bucket start.
    pub fn label(&self, start: DateTime<Utc>, include_year: bool) -> String {
        match self {
            Granularity::Hourly => start.format("%H:%M %-d %b").to_string(),
            Granularity::Daily if include_year => start.format("%a %-d %b %Y").to_string(),
            Granularity::Daily => start.format("%a %-d %b").to_string(),
            Granularity::Weekly => {
                let week = week_of_month(start.date_naive());
                if include_year {
                    format!("Wk{week} {}", start.format("%b %Y"))
                } else {
                    format!("Wk{week} {}", start.format("%b"))
                }
            }
            Granularity::Monthly if include_year => start.format("%b %Y").to_string(),
            Granularity::Monthly => start.format("%b").to_string(),
            Granularity::Quarterly => {
                format!("Q{} {}", (start.month() - 1) / 3 + 1, start.year())
            }
            Granularity::Yearly => start.format("%Y").to_string(),
        }
    }
}

fn first_of(date: NaiveDate, month: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), month, 1).unwrap_or(date)
}

/// Week index within the month, counting Monday-started weeks from 1.
fn week_of_month(date: NaiveDate) -> u32 {
    let first = first_of(date, date.month());
    let shift = first.weekday().num_days_from_monday();
    (date.day() - 1 + shift) / 7 + 1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub label: String,
    pub value: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub granularity: Granularity,
    pub series: Vec<TimeSeriesPoint>,
}

impl TimeSeries {
    /// Buckets `(timestamp, value)` samples, summing values per bucket.
    ///
    /// Every bucket between `from` and `to` is present; buckets without
    /// samples hold zero. Without bounds the range spans the samples.
    pub fn bucket(
        samples: impl IntoIterator<Item = (DateTime<Utc>, Decimal)>,
        granularity: Granularity,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        let mut sums: BTreeMap<DateTime<Utc>, Decimal> = BTreeMap::new();
        for (at, value) in samples {
            let sum = sums.entry(granularity.truncate(at)).or_default();
            *sum = sum.saturating_add(value);
        }

        let first = from
            .map(|f| granularity.truncate(f))
            .or_else(|| sums.keys().next().copied());
        let last = to.or_else(|| {
            sums.keys()
                .next_back()
                .and_then(|start| granularity.next(*start))
        });

        let mut starts = Vec::new();
        if let (Some(first), Some(last)) = (first, last) {
            let mut cursor = first;
            while cursor < last && starts.len() < MAX_POINTS {
                starts.push(cursor);
                match granularity.next(cursor) {
                    Some(next) => cursor = next,
                    None => break,
                }
            }
        }

        let include_year = match (starts.first(), starts.last()) {
            (Some(a), Some(b)) => a.year() != b.year(),
            _ => false,
        };

        let series = starts
            .into_iter()
            .map(|start| TimeSeriesPoint {
                timestamp: start,
                label: granularity.label(start, include_year),
                value: sums.get(&start).copied().unwrap_or_default(),
            })
            .collect();

        Self {
            granularity,
            series,
        }
    }

    /// Sum of all bucket values.
    pub fn total(&self) -> Decimal {
        self.series.iter().map(|p| p.value).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 30, 0).unwrap()
    }

    #[test]
    fn test_granularity_follows_span() {
        let start = at(2025, 1, 1, 0);
        assert_eq!(
            Granularity::for_range(start, start + Duration::hours(24)),
            Granularity::Hourly
        );
        assert_eq!(
            Granularity::for_range(start, start + Duration::days(30)),
            Granularity::Daily
        );
        assert_eq!(
            Granularity::for_range(start, start + Duration::days(90)),
            Granularity::Weekly
        );
        assert_eq!(
            Granularity::for_range(start, start + Duration::days(365)),
            Granularity::Monthly
        );
        assert_eq!(
            Granularity::for_range(start, start + Duration::days(1000)),
            Granularity::Quarterly
        );
        assert_eq!(
            Granularity::for_range(start, start + Duration::days(4000)),
            Granularity::Yearly
        );
    }

    #[test]
    fn test_truncate() {
        let hms = |y, m, d, h| Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap();
        // Wednesday 2025-05-14 13:30
        let ts = at(2025, 5, 14, 13);
        assert_eq!(Granularity::Hourly.truncate(ts), hms(2025, 5, 14, 13));
        assert_eq!(Granularity::Daily.truncate(ts), hms(2025, 5, 14, 0));
        assert_eq!(Granularity::Weekly.truncate(ts), hms(2025, 5, 12, 0));
        assert_eq!(Granularity::Monthly.truncate(ts), hms(2025, 5, 1, 0));
        assert_eq!(Granularity::Quarterly.truncate(ts), hms(2025, 4, 1, 0));
        assert_eq!(Granularity::Yearly.truncate(ts), hms(2025, 1, 1, 0));
    }

    #[test]
    fn test_labels() {
        let ts = Utc.with_ymd_and_hms(2025, 1, 2, 15, 0, 0).unwrap();
        assert_eq!(Granularity::Hourly.label(ts, false), "15:00 2 Jan");
        assert_eq!(Granularity::Daily.label(ts, false), "Thu 2 Jan");
        assert_eq!(Granularity::Daily.label(ts, true), "Thu 2 Jan 2025");
        assert_eq!(Granularity::Monthly.label(ts, true), "Jan 2025");
        assert_eq!(Granularity::Quarterly.label(ts, false), "Q1 2025");
        assert_eq!(Granularity::Yearly.label(ts, false), "2025");
        // 2025-01-06 is the first Monday; the 2nd falls in week 1.
        assert_eq!(Granularity::Weekly.label(ts, false), "Wk1 Jan");
    }

    #[test]
    fn test_bucket_fills_gaps_with_zero() {
        let from = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2025, 3, 5, 0, 0, 0).unwrap();
        let samples = vec![
            (at(2025, 3, 1, 9), dec!(10.00)),
            (at(2025, 3, 1, 18), dec!(5.50)),
            (at(2025, 3, 3, 12), dec!(2.00)),
        ];

        let series = TimeSeries::bucket(samples, Granularity::Daily, Some(from), Some(to));

        let values: Vec<_> = series.series.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![dec!(15.50), dec!(0), dec!(2.00), dec!(0)]);
        assert_eq!(series.total(), dec!(17.50));
    }

    #[test]
    fn test_bucket_without_bounds_spans_samples() {
        let samples = vec![(at(2025, 1, 15, 1), dec!(1)), (at(2025, 3, 2, 1), dec!(2))];
        let series = TimeSeries::bucket(samples, Granularity::Monthly, None, None);
        assert_eq!(series.series.len(), 3);
        assert_eq!(series.series[1].value, dec!(0));
    }

    #[test]
    fn test_empty_bucket_is_empty() {
        let series = TimeSeries::bucket(Vec::new(), Granularity::Daily, None, None);
        assert!(series.series.is_empty());
        assert_eq!(series.total(), Decimal::ZERO);
    }
}
