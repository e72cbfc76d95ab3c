//! History log column layout
//!
//! Rows are located by header name, never by position, so a file with extra
//! columns still reads correctly and a file missing columns is rejected.

use crate::history::PredictionRecord;
use crate::StorageError;
use chrono::{DateTime, SecondsFormat, Utc};
use csv::StringRecord;
use feature_codec::{check_value, FeatureVector, StressLevel, FEATURES, FEATURE_DIMENSION, FEATURE_NAMES};

pub(crate) const USERNAME: &str = "username";
pub(crate) const TIMESTAMP: &str = "timestamp";
pub(crate) const DT_ISO: &str = "dt_iso";
pub(crate) const STRESS_LEVEL: &str = "stress_level";

/// Column names of a freshly created log
pub fn canonical_header() -> Vec<&'static str> {
    let mut header = vec![USERNAME, TIMESTAMP, DT_ISO, STRESS_LEVEL];
    header.extend_from_slice(&FEATURE_NAMES);
    header
}

/// Positions of the canonical columns within a concrete file header
#[derive(Debug, Clone)]
pub(crate) struct ColumnMap {
    /// The file's own header, used to lay out appended rows
    columns: Vec<String>,
    username: usize,
    timestamp: usize,
    dt_iso: usize,
    stress_level: usize,
    features: [usize; FEATURE_DIMENSION],
}

impl ColumnMap {
    /// Resolve every canonical column, reporting the ones that are absent
    pub(crate) fn resolve(header: &StringRecord) -> Result<Self, StorageError> {
        let columns: Vec<String> = header.iter().map(|c| c.trim().to_string()).collect();
        let mut missing = Vec::new();
        let mut find = |name: &str| match columns.iter().position(|c| c == name) {
            Some(i) => i,
            None => {
                missing.push(name.to_string());
                usize::MAX
            }
        };

        let username = find(USERNAME);
        let timestamp = find(TIMESTAMP);
        let dt_iso = find(DT_ISO);
        let stress_level = find(STRESS_LEVEL);
        let mut features = [0usize; FEATURE_DIMENSION];
        for (slot, name) in features.iter_mut().zip(FEATURE_NAMES.iter()) {
            *slot = find(name);
        }

        if !missing.is_empty() {
            return Err(StorageError::SchemaMismatch { missing });
        }

        Ok(Self {
            columns,
            username,
            timestamp,
            dt_iso,
            stress_level,
            features,
        })
    }

    pub(crate) fn canonical() -> Self {
        let header = StringRecord::from(canonical_header());
        // canonical header always resolves
        match Self::resolve(&header) {
            Ok(map) => map,
            Err(_) => unreachable!("canonical header is complete"),
        }
    }

    pub(crate) fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Decode one row into a record
    pub(crate) fn parse(&self, row: &StringRecord, line: u64) -> Result<PredictionRecord, StorageError> {
        let corrupt = |reason: String| StorageError::CorruptRow { line, reason };
        let field = |idx: usize| row.get(idx).map(str::trim).unwrap_or("");

        let username = field(self.username);
        if username.is_empty() {
            return Err(corrupt("empty username".to_string()));
        }

        let created_at = parse_created_at(field(self.dt_iso), field(self.timestamp))
            .ok_or_else(|| corrupt("unreadable timestamp".to_string()))?;

        let level_raw = field(self.stress_level);
        let stress_level = parse_integral(level_raw)
            .and_then(|v| usize::try_from(v).ok())
            .and_then(StressLevel::from_class)
            .ok_or_else(|| corrupt(format!("invalid stress_level {:?}", level_raw)))?;

        let mut values = [0i64; FEATURE_DIMENSION];
        for (i, spec) in FEATURES.iter().enumerate() {
            let raw = field(self.features[i]);
            let value: f64 = raw
                .parse()
                .map_err(|_| corrupt(format!("{} is not numeric: {:?}", spec.name, raw)))?;
            values[i] = check_value(spec, value).map_err(|e| corrupt(e.to_string()))? as i64;
        }
        let features = FeatureVector::from_values(&values).map_err(|e| corrupt(e.to_string()))?;

        Ok(PredictionRecord {
            username: username.to_string(),
            created_at,
            stress_level,
            features,
        })
    }

    /// Lay a record out in this file's column order; unknown columns stay empty
    pub(crate) fn row(&self, record: &PredictionRecord) -> Vec<String> {
        let mut row = vec![String::new(); self.columns.len()];
        row[self.username] = record.username.clone();
        row[self.timestamp] = format_timestamp(&record.created_at);
        row[self.dt_iso] = record.created_at.to_rfc3339_opts(SecondsFormat::Millis, true);
        row[self.stress_level] = record.stress_level.class().to_string();
        for (i, value) in record.features.values().iter().enumerate() {
            row[self.features[i]] = value.to_string();
        }
        row
    }
}

fn format_timestamp(at: &DateTime<Utc>) -> String {
    format!("{:.3}", at.timestamp_millis() as f64 / 1000.0)
}

fn parse_integral(raw: &str) -> Option<i64> {
    let value: f64 = raw.parse().ok()?;
    (value.is_finite() && value.fract() == 0.0).then_some(value as i64)
}

/// Prefer the ISO column; fall back to the unix timestamp (older rows carry a
/// naive local ISO string that cannot be placed on the UTC axis).
fn parse_created_at(dt_iso: &str, timestamp: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(dt_iso) {
        return Some(at.with_timezone(&Utc));
    }
    let secs: f64 = timestamp.parse().ok()?;
    if !secs.is_finite() {
        return None;
    }
    DateTime::from_timestamp_millis((secs * 1000.0).round() as i64)
}
