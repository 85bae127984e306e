//! Timestamp samplers
//!
//! A sampler maps a timestamp to the start of the bucket containing it and
//! reports where the following bucket starts. Buckets are half-open
//! `[start, next_boundary(start))` and aligned to the epoch (fixed intervals)
//! or to calendar months (month and year intervals).
//!
//! The engine never computes boundaries itself; it always asks the sampler,
//! so calendar intervals of uneven length work the same as fixed ones.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use std::fmt;
use std::str::FromStr;

use crate::query::error::QueryError;
use crate::types::{
    Timestamp, MICROS_PER_DAY, MICROS_PER_HOUR, MICROS_PER_MILLI, MICROS_PER_MINUTE,
    MICROS_PER_SECOND,
};

/// Maps timestamps onto bucket boundaries
pub trait TimestampSampler: fmt::Debug + Send + Sync {
    /// Start of the bucket containing `ts`
    fn bucket_start(&self, ts: Timestamp) -> Timestamp;

    /// Start of the bucket following the one starting at `bucket`
    fn next_boundary(&self, bucket: Timestamp) -> Timestamp;

    /// Length of the bucket starting at `bucket`
    fn bucket_duration(&self, bucket: Timestamp) -> i64 {
        self.next_boundary(bucket).saturating_sub(bucket)
    }
}

/// Fixed-length buckets aligned to the epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedIntervalSampler {
    interval: i64,
}

impl FixedIntervalSampler {
    /// Create a sampler with `interval` microseconds per bucket
    ///
    /// Returns `None` for non-positive intervals.
    pub fn new(interval: i64) -> Option<Self> {
        (interval > 0).then_some(Self { interval })
    }

    /// Bucket length in microseconds
    pub fn interval(&self) -> i64 {
        self.interval
    }
}

impl TimestampSampler for FixedIntervalSampler {
    fn bucket_start(&self, ts: Timestamp) -> Timestamp {
        ts - ts.rem_euclid(self.interval)
    }

    fn next_boundary(&self, bucket: Timestamp) -> Timestamp {
        bucket.saturating_add(self.interval)
    }
}

/// Calendar buckets of a whole number of months, aligned to January 1970
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthSampler {
    months: u32,
}

impl MonthSampler {
    /// Create a sampler with `months` calendar months per bucket
    ///
    /// Returns `None` when `months` is zero.
    pub fn new(months: u32) -> Option<Self> {
        (months > 0).then_some(Self { months })
    }

    /// Bucket length in months
    pub fn months(&self) -> u32 {
        self.months
    }

    fn month_start(month_index: i64) -> Option<Timestamp> {
        let year = i32::try_from(1970 + month_index.div_euclid(12)).ok()?;
        let month = u32::try_from(month_index.rem_euclid(12) + 1).ok()?;
        let date = NaiveDate::from_ymd_opt(year, month, 1)?;
        Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp_micros())
    }

    fn month_index(ts: Timestamp) -> Option<i64> {
        let dt = DateTime::<Utc>::from_timestamp_micros(ts)?;
        Some((dt.year() as i64 - 1970) * 12 + dt.month0() as i64)
    }
}

impl TimestampSampler for MonthSampler {
    fn bucket_start(&self, ts: Timestamp) -> Timestamp {
        Self::month_index(ts)
            .and_then(|index| {
                let aligned = index - index.rem_euclid(self.months as i64);
                Self::month_start(aligned)
            })
            .unwrap_or(ts)
    }

    fn next_boundary(&self, bucket: Timestamp) -> Timestamp {
        Self::month_index(bucket)
            .and_then(|index| Self::month_start(index + self.months as i64))
            .unwrap_or(i64::MAX)
    }
}

/// Unit of a sampling interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalUnit {
    /// `U`
    Micros,
    /// `T`
    Millis,
    /// `s`
    Seconds,
    /// `m`
    Minutes,
    /// `h`
    Hours,
    /// `d`
    Days,
    /// `M`
    Months,
    /// `y`
    Years,
}

impl IntervalUnit {
    fn from_char(c: char) -> Option<Self> {
        match c {
            'U' => Some(Self::Micros),
            'T' => Some(Self::Millis),
            's' => Some(Self::Seconds),
            'm' => Some(Self::Minutes),
            'h' => Some(Self::Hours),
            'd' => Some(Self::Days),
            'M' => Some(Self::Months),
            'y' => Some(Self::Years),
            _ => None,
        }
    }

    fn as_char(self) -> char {
        match self {
            Self::Micros => 'U',
            Self::Millis => 'T',
            Self::Seconds => 's',
            Self::Minutes => 'm',
            Self::Hours => 'h',
            Self::Days => 'd',
            Self::Months => 'M',
            Self::Years => 'y',
        }
    }

    fn micros(self) -> Option<i64> {
        match self {
            Self::Micros => Some(1),
            Self::Millis => Some(MICROS_PER_MILLI),
            Self::Seconds => Some(MICROS_PER_SECOND),
            Self::Minutes => Some(MICROS_PER_MINUTE),
            Self::Hours => Some(MICROS_PER_HOUR),
            Self::Days => Some(MICROS_PER_DAY),
            Self::Months | Self::Years => None,
        }
    }
}

/// A parsed `SAMPLE BY` interval such as `1h` or `3M`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingInterval {
    /// Number of units per bucket
    pub count: u32,
    /// Unit
    pub unit: IntervalUnit,
}

impl SamplingInterval {
    /// Create an interval
    pub fn new(count: u32, unit: IntervalUnit) -> Self {
        Self { count, unit }
    }

    /// Parse `<count><unit>`; a missing count means 1
    pub fn parse(input: &str) -> Result<Self, QueryError> {
        let input = input.trim();
        let mut chars = input.chars();
        let unit_char = chars
            .next_back()
            .ok_or_else(|| QueryError::parse("empty sampling interval"))?;
        let unit = IntervalUnit::from_char(unit_char).ok_or_else(|| {
            QueryError::parse(format!(
                "unknown sampling unit '{}' in '{}'",
                unit_char, input
            ))
        })?;

        let digits = chars.as_str();
        let count = if digits.is_empty() {
            1
        } else {
            digits.parse::<u32>().map_err(|e| {
                QueryError::parse(format!("invalid sampling interval '{}'", input)).with_source(e)
            })?
        };

        if count == 0 {
            return Err(QueryError::parse(format!(
                "sampling interval must be positive: '{}'",
                input
            )));
        }

        Ok(Self { count, unit })
    }

    /// Fixed bucket length in microseconds, `None` for calendar units
    pub fn fixed_micros(&self) -> Option<i64> {
        self.unit
            .micros()
            .and_then(|unit| unit.checked_mul(self.count as i64))
    }

    /// Build the sampler for this interval
    pub fn sampler(&self) -> Result<Box<dyn TimestampSampler>, QueryError> {
        match self.unit {
            IntervalUnit::Months => MonthSampler::new(self.count)
                .map(|s| Box::new(s) as Box<dyn TimestampSampler>)
                .ok_or_else(|| QueryError::planning("month interval must be positive")),
            IntervalUnit::Years => self
                .count
                .checked_mul(12)
                .and_then(MonthSampler::new)
                .map(|s| Box::new(s) as Box<dyn TimestampSampler>)
                .ok_or_else(|| QueryError::planning(format!("year interval out of range: {}", self))),
            _ => self
                .fixed_micros()
                .and_then(FixedIntervalSampler::new)
                .map(|s| Box::new(s) as Box<dyn TimestampSampler>)
                .ok_or_else(|| QueryError::planning(format!("interval out of range: {}", self))),
        }
    }
}

impl fmt::Display for SamplingInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.count, self.unit.as_char())
    }
}

impl FromStr for SamplingInterval {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn micros(y: i32, m: u32, d: u32, h: u32) -> Timestamp {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0)
            .unwrap()
            .timestamp_micros()
    }

    #[test]
    fn test_fixed_alignment() {
        let sampler = FixedIntervalSampler::new(MICROS_PER_HOUR).unwrap();
        assert_eq!(sampler.bucket_start(0), 0);
        assert_eq!(sampler.bucket_start(MICROS_PER_SECOND), 0);
        assert_eq!(sampler.bucket_start(MICROS_PER_HOUR), MICROS_PER_HOUR);
        assert_eq!(sampler.bucket_start(MICROS_PER_HOUR - 1), 0);
        assert_eq!(sampler.next_boundary(0), MICROS_PER_HOUR);
        assert_eq!(sampler.bucket_duration(0), MICROS_PER_HOUR);
    }

    #[test]
    fn test_fixed_negative_timestamps() {
        let sampler = FixedIntervalSampler::new(10).unwrap();
        assert_eq!(sampler.bucket_start(-1), -10);
        assert_eq!(sampler.bucket_start(-10), -10);
        assert_eq!(sampler.bucket_start(-11), -20);
    }

    #[test]
    fn test_fixed_rejects_non_positive() {
        assert!(FixedIntervalSampler::new(0).is_none());
        assert!(FixedIntervalSampler::new(-5).is_none());
    }

    #[test]
    fn test_fixed_monotonic() {
        let sampler = FixedIntervalSampler::new(7).unwrap();
        let mut previous = i64::MIN;
        for ts in -50..50 {
            let start = sampler.bucket_start(ts);
            assert!(start <= ts);
            assert!(ts < sampler.next_boundary(start));
            assert!(start >= previous);
            previous = start;
        }
    }

    #[test]
    fn test_month_alignment() {
        let sampler = MonthSampler::new(1).unwrap();
        let mid_feb = micros(2024, 2, 14, 13);
        assert_eq!(sampler.bucket_start(mid_feb), micros(2024, 2, 1, 0));
        assert_eq!(
            sampler.next_boundary(micros(2024, 2, 1, 0)),
            micros(2024, 3, 1, 0)
        );
        // leap year February
        assert_eq!(
            sampler.bucket_duration(micros(2024, 2, 1, 0)),
            29 * MICROS_PER_DAY
        );
    }

    #[test]
    fn test_multi_month_alignment() {
        let sampler = MonthSampler::new(3).unwrap();
        assert_eq!(sampler.bucket_start(micros(2023, 5, 20, 0)), micros(2023, 4, 1, 0));
        assert_eq!(sampler.next_boundary(micros(2023, 4, 1, 0)), micros(2023, 7, 1, 0));
        assert_eq!(sampler.bucket_start(micros(1969, 12, 31, 0)), micros(1969, 10, 1, 0));
    }

    #[test]
    fn test_year_sampler() {
        let sampler = SamplingInterval::parse("1y").unwrap().sampler().unwrap();
        assert_eq!(sampler.bucket_start(micros(1970, 6, 1, 0)), 0);
        assert_eq!(sampler.next_boundary(0), micros(1971, 1, 1, 0));
    }

    #[test]
    fn test_parse_interval() {
        assert_eq!(
            SamplingInterval::parse("1h").unwrap(),
            SamplingInterval::new(1, IntervalUnit::Hours)
        );
        assert_eq!(
            SamplingInterval::parse("15m").unwrap().fixed_micros(),
            Some(15 * MICROS_PER_MINUTE)
        );
        assert_eq!(SamplingInterval::parse("d").unwrap().count, 1);
        assert_eq!(SamplingInterval::parse("2M").unwrap().fixed_micros(), None);
        assert_eq!("30s".parse::<SamplingInterval>().unwrap().to_string(), "30s");
    }

    #[test]
    fn test_parse_interval_errors() {
        use crate::query::error::QueryErrorKind;

        for bad in ["", "1x", "0h", "-1h", "abch"] {
            let err = SamplingInterval::parse(bad).unwrap_err();
            assert_eq!(err.kind, QueryErrorKind::ParseError, "input {:?}", bad);
        }
    }
}
