//! Derived history analytics
//!
//! Pure functions over records read from the log. Nothing here is stored;
//! every figure can be recomputed from a scan of the log.

use crate::history::PredictionRecord;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use feature_codec::StressLevel;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// Record count per stress level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Distribution {
    pub low: usize,
    pub moderate: usize,
    pub high: usize,
}

impl Distribution {
    /// Count for one level
    pub fn count(&self, level: StressLevel) -> usize {
        match level {
            StressLevel::Low => self.low,
            StressLevel::Moderate => self.moderate,
            StressLevel::High => self.high,
        }
    }

    /// Total records counted
    pub fn total(&self) -> usize {
        self.low + self.moderate + self.high
    }

    fn add(&mut self, level: StressLevel) {
        match level {
            StressLevel::Low => self.low += 1,
            StressLevel::Moderate => self.moderate += 1,
            StressLevel::High => self.high += 1,
        }
    }
}

/// Mean stress class over one time bucket
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub bucket_start: DateTime<Utc>,
    /// Mean of the 0..=2 class values
    pub mean_stress: f64,
    pub count: usize,
}

/// Headline figures for the history view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub unique_users: usize,
    pub recent_count: usize,
    pub recent_days: i64,
    pub distribution: Distribution,
    pub trend: Vec<TrendPoint>,
}

/// Count records per stress level
pub fn distribution<'a>(records: impl IntoIterator<Item = &'a PredictionRecord>) -> Distribution {
    let mut dist = Distribution::default();
    for record in records {
        dist.add(record.stress_level);
    }
    dist
}

/// Mean stress per consecutive `window_days` bucket.
///
/// Buckets start at midnight of the earliest record's day; empty buckets are
/// omitted. Points come back in time order regardless of append order.
pub fn rolling_mean(records: &[PredictionRecord], window_days: i64) -> Vec<TrendPoint> {
    let window_days = window_days.max(1);
    let Some(first) = records.iter().map(|r| r.created_at).min() else {
        return Vec::new();
    };
    let origin = first.date_naive().and_time(NaiveTime::MIN).and_utc();
    let window = Duration::days(window_days);

    let mut buckets: BTreeMap<i64, (u64, usize)> = BTreeMap::new();
    for record in records {
        let idx = (record.created_at - origin).num_seconds() / window.num_seconds();
        let entry = buckets.entry(idx).or_insert((0, 0));
        entry.0 += u64::from(record.stress_level.class());
        entry.1 += 1;
    }

    buckets
        .into_iter()
        .map(|(idx, (sum, count))| TrendPoint {
            bucket_start: origin + window * idx as i32,
            mean_stress: sum as f64 / count as f64,
            count,
        })
        .collect()
}

/// Records created within the trailing `days` before `now`
pub fn count_since<'a>(
    records: impl IntoIterator<Item = &'a PredictionRecord>,
    now: DateTime<Utc>,
    days: i64,
) -> usize {
    let cutoff = now - Duration::days(days);
    records.into_iter().filter(|r| r.created_at >= cutoff).count()
}

/// Number of distinct usernames
pub fn unique_users<'a>(records: impl IntoIterator<Item = &'a PredictionRecord>) -> usize {
    records
        .into_iter()
        .map(|r| r.username.as_str())
        .collect::<HashSet<_>>()
        .len()
}

/// Compute every headline figure in one call
pub fn summarize(records: &[PredictionRecord], now: DateTime<Utc>, window_days: i64) -> Summary {
    Summary {
        total: records.len(),
        unique_users: unique_users(records),
        recent_count: count_since(records, now, window_days),
        recent_days: window_days,
        distribution: distribution(records),
        trend: rolling_mean(records, window_days),
    }
}
