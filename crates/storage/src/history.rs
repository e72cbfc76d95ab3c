//! Append-only prediction history log

use crate::atomic::write_atomic;
use crate::schema::{canonical_header, ColumnMap};
use crate::StorageError;
use chrono::{DateTime, SubsecRound, Utc};
use csv::{ReaderBuilder, StringRecordsIntoIter, WriterBuilder};
use feature_codec::{FeatureVector, StressLevel};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// One completed analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub stress_level: StressLevel,
    pub features: FeatureVector,
}

impl PredictionRecord {
    /// Create a record; the timestamp is kept at millisecond precision, which
    /// is what the log stores.
    pub fn new(
        username: impl Into<String>,
        stress_level: StressLevel,
        features: FeatureVector,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            username: username.into(),
            created_at: created_at.trunc_subsecs(3),
            stress_level,
            features,
        }
    }
}

/// Outcome of rewriting a log into the canonical layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    /// Rows carried over unchanged in meaning
    pub kept: usize,
    /// Rows moved to the rejected file
    pub rejected: usize,
    /// Where rejected rows were written, if any
    pub rejected_path: Option<PathBuf>,
}

/// File-backed history log
pub struct HistoryLog {
    path: PathBuf,
    /// Column layout of the file; appends follow it
    layout: ColumnMap,
    /// Serializes appends from this process
    write_lock: Mutex<()>,
}

impl HistoryLog {
    /// Open the log, creating it with the canonical header if absent.
    ///
    /// A header missing any canonical column is rejected rather than read
    /// with shifted columns; run [`HistoryLog::migrate`] on such files.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let is_empty = match std::fs::metadata(&path) {
            Ok(meta) => meta.len() == 0,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => return Err(StorageError::io(&path, e)),
        };

        let layout = if is_empty {
            info!("Creating history log at {}", path.display());
            write_atomic(&path, &header_bytes()?).map_err(|e| StorageError::io(&path, e))?;
            ColumnMap::canonical()
        } else {
            let mut reader = open_reader(&path)?;
            let header = reader.headers()?.clone();
            ColumnMap::resolve(&header)?
        };

        debug!("History log {} has {} columns", path.display(), layout.columns().len());
        Ok(Self {
            path,
            layout,
            write_lock: Mutex::new(()),
        })
    }

    /// Append one record at the end of the log and sync it to disk
    pub fn append(&self, record: &PredictionRecord) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().map_err(|e| {
            StorageError::io(&self.path, std::io::Error::other(format!("Lock error: {}", e)))
        })?;

        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| StorageError::io(&self.path, e))?;

        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
        writer.write_record(self.layout.row(record))?;
        let file = writer
            .into_inner()
            .map_err(|e| StorageError::io(&self.path, e.into_error()))?;
        file.sync_data().map_err(|e| StorageError::io(&self.path, e))?;

        debug!("Appended {} prediction for {}", record.stress_level, record.username);
        Ok(())
    }

    /// Lazily iterate every record in append order.
    ///
    /// Each call reopens the file, so iteration can be restarted at will.
    pub fn read_all(&self) -> Result<HistoryIter, StorageError> {
        let mut reader = open_reader(&self.path)?;
        let header = reader.headers()?.clone();
        let layout = ColumnMap::resolve(&header)?;
        Ok(HistoryIter {
            rows: reader.into_records(),
            layout,
            line: 1,
        })
    }

    /// Records of one user, in append order
    pub fn read_by_user(&self, username: &str) -> Result<Vec<PredictionRecord>, StorageError> {
        self.read_all()?
            .filter(|r| r.as_ref().map_or(true, |rec| rec.username == username))
            .collect()
    }

    /// Number of records in the log
    pub fn count(&self) -> Result<usize, StorageError> {
        let mut reader = open_reader(&self.path)?;
        let mut n = 0;
        for row in reader.records() {
            row?;
            n += 1;
        }
        Ok(n)
    }

    /// Rewrite a log file into the canonical layout.
    ///
    /// Rows that carry every canonical column with valid values are kept in
    /// order. Everything else is copied verbatim, under the file's own header,
    /// to `<stem>.rejected.csv` next to the log.
    pub fn migrate(path: impl AsRef<Path>) -> Result<MigrationReport, StorageError> {
        let path = path.as_ref();
        let mut reader = open_reader(path)?;
        let header = reader.headers()?.clone();
        let layout = match ColumnMap::resolve(&header) {
            Ok(layout) => Some(layout),
            Err(StorageError::SchemaMismatch { missing }) => {
                warn!("History log lacks columns {:?}; every row will be rejected", missing);
                None
            }
            Err(e) => return Err(e),
        };

        let canonical = ColumnMap::canonical();
        let mut kept = csv_writer();
        kept.write_record(canonical_header())?;
        let mut rejected = csv_writer();
        rejected.write_record(&header)?;
        let mut report = MigrationReport {
            kept: 0,
            rejected: 0,
            rejected_path: None,
        };

        for (i, row) in reader.records().enumerate() {
            let row = row?;
            let line = i as u64 + 2;
            match layout.as_ref().map(|l| l.parse(&row, line)) {
                Some(Ok(record)) => {
                    kept.write_record(canonical.row(&record))?;
                    report.kept += 1;
                }
                Some(Err(e)) => {
                    warn!("Rejecting history row: {}", e);
                    rejected.write_record(&row)?;
                    report.rejected += 1;
                }
                None => {
                    rejected.write_record(&row)?;
                    report.rejected += 1;
                }
            }
        }
        drop(reader);

        if report.rejected > 0 {
            let rejected_path = rejected_path_for(path);
            write_atomic(&rejected_path, &finish(rejected)?)
                .map_err(|e| StorageError::io(&rejected_path, e))?;
            report.rejected_path = Some(rejected_path);
        }
        write_atomic(path, &finish(kept)?).map_err(|e| StorageError::io(path, e))?;

        info!(
            "Migrated history log {}: kept={}, rejected={}",
            path.display(),
            report.kept,
            report.rejected
        );
        Ok(report)
    }
}

/// Lazy, ordered iterator over the log's records
pub struct HistoryIter {
    rows: StringRecordsIntoIter<File>,
    layout: ColumnMap,
    line: u64,
}

impl Iterator for HistoryIter {
    type Item = Result<PredictionRecord, StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.rows.next()?;
        self.line += 1;
        Some(
            row.map_err(StorageError::from)
                .and_then(|row| self.layout.parse(&row, self.line)),
        )
    }
}

/// Render records as CSV with the canonical header
pub fn export_csv<'a>(
    records: impl IntoIterator<Item = &'a PredictionRecord>,
) -> Result<String, StorageError> {
    let layout = ColumnMap::canonical();
    let mut writer = csv_writer();
    writer.write_record(canonical_header())?;
    for record in records {
        writer.write_record(layout.row(record))?;
    }
    String::from_utf8(finish(writer)?).map_err(|e| StorageError::Export(e.to_string()))
}

fn open_reader(path: &Path) -> Result<csv::Reader<File>, StorageError> {
    let file = File::open(path).map_err(|e| StorageError::io(path, e))?;
    Ok(ReaderBuilder::new().flexible(true).from_reader(file))
}

fn csv_writer() -> csv::Writer<Vec<u8>> {
    WriterBuilder::new().flexible(true).from_writer(Vec::new())
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>, StorageError> {
    writer
        .into_inner()
        .map_err(|e| StorageError::Export(e.error().to_string()))
}

fn header_bytes() -> Result<Vec<u8>, StorageError> {
    let mut writer = csv_writer();
    writer.write_record(canonical_header())?;
    finish(writer)
}

fn rejected_path_for(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "history".to_string());
    path.with_file_name(format!("{}.rejected.csv", stem))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use feature_codec::FEATURE_NAMES;
    use std::fs;

    fn sample_vector() -> FeatureVector {
        FeatureVector::from_values(&[5, 5, 0, 0, 0, 5, 5, 0, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 0])
            .unwrap()
    }

    fn record(user: &str, level: StressLevel, minutes: i64) -> PredictionRecord {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::minutes(minutes);
        PredictionRecord::new(user, level, sample_vector(), at)
    }

    #[test]
    fn test_open_creates_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");
        let log = HistoryLog::open(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("username,timestamp,dt_iso,stress_level,anxiety_level"));
        assert_eq!(log.count().unwrap(), 0);
        assert_eq!(log.read_all().unwrap().count(), 0);
    }

    #[test]
    fn test_append_and_read_by_user_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let log = HistoryLog::open(dir.path().join("history.csv")).unwrap();

        let alice = PredictionRecord::new("Alice", StressLevel::Moderate, sample_vector(), Utc::now());
        log.append(&alice).unwrap();
        log.append(&record("bob", StressLevel::High, 1)).unwrap();

        let mine = log.read_by_user("Alice").unwrap();
        assert_eq!(mine, vec![alice]);
        assert_eq!(log.read_by_user("carol").unwrap().len(), 0);
    }

    #[test]
    fn test_read_all_preserves_append_order_and_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let log = HistoryLog::open(dir.path().join("history.csv")).unwrap();

        // Appended out of time order on purpose
        log.append(&record("a", StressLevel::Low, 10)).unwrap();
        log.append(&record("b", StressLevel::High, 0)).unwrap();
        log.append(&record("c", StressLevel::Moderate, 5)).unwrap();

        let first: Vec<_> = log.read_all().unwrap().map(|r| r.unwrap().username).collect();
        let second: Vec<_> = log.read_all().unwrap().map(|r| r.unwrap().username).collect();
        assert_eq!(first, vec!["a", "b", "c"]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_reopen_keeps_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");
        {
            let log = HistoryLog::open(&path).unwrap();
            log.append(&record("a", StressLevel::Low, 0)).unwrap();
        }
        let log = HistoryLog::open(&path).unwrap();
        log.append(&record("a", StressLevel::High, 1)).unwrap();
        assert_eq!(log.read_by_user("a").unwrap().len(), 2);
    }

    #[test]
    fn test_legacy_email_column_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");
        let mut header = vec!["username", "timestamp", "dt_iso", "email", "stress_level"];
        header.extend_from_slice(&FEATURE_NAMES);
        let row = "dave,1714557600.0,2024-05-01T10:00:00.000000,,1,5,5,0,0,0,5,5,0,5,5,5,5,5,5,5,5,5,5,5,0";
        fs::write(&path, format!("{}\n{}\n", header.join(","), row)).unwrap();

        let log = HistoryLog::open(&path).unwrap();
        log.append(&record("erin", StressLevel::Low, 0)).unwrap();

        let all: Vec<_> = log.read_all().unwrap().collect::<Result<_, _>>().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].username, "dave");
        assert_eq!(all[0].stress_level, StressLevel::Moderate);
        assert_eq!(all[1].username, "erin");
        assert_eq!(all[1].features, sample_vector());
    }

    #[test]
    fn test_legacy_short_schema_rejected_then_migrated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");
        let header: Vec<&str> = canonical_header()
            .into_iter()
            .filter(|c| *c != "screen_time" && *c != "health_issues")
            .collect();
        let row = "old,1714557600.0,,2,5,5,0,0,0,5,5,0,5,5,5,5,5,5,5,5,5,5";
        fs::write(&path, format!("{}\n{}\n", header.join(","), row)).unwrap();

        assert!(matches!(
            HistoryLog::open(&path),
            Err(StorageError::SchemaMismatch { .. })
        ));

        let report = HistoryLog::migrate(&path).unwrap();
        assert_eq!(report.kept, 0);
        assert_eq!(report.rejected, 1);
        let rejected_path = report.rejected_path.unwrap();
        assert!(fs::read_to_string(&rejected_path).unwrap().contains("old,1714557600.0"));

        let log = HistoryLog::open(&path).unwrap();
        assert_eq!(log.count().unwrap(), 0);
    }

    #[test]
    fn test_migrate_splits_valid_and_corrupt_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");
        let mut header = vec!["username", "timestamp", "dt_iso", "email", "stress_level"];
        header.extend_from_slice(&FEATURE_NAMES);
        let good = "amy,1714557600.0,,,0,5,5,0,0,0,5,5,0,5,5,5,5,5,5,5,5,5,5,5,0";
        let bad = "ben,1714557601.0,,,7,5,5,0,0,0,5,5,0,5,5,5,5,5,5,5,5,5,5,5,0";
        fs::write(&path, format!("{}\n{}\n{}\n", header.join(","), good, bad)).unwrap();

        let report = HistoryLog::migrate(&path).unwrap();
        assert_eq!((report.kept, report.rejected), (1, 1));

        let content = fs::read_to_string(&path).unwrap();
        assert!(!content.contains("email"));
        let log = HistoryLog::open(&path).unwrap();
        let all: Vec<_> = log.read_all().unwrap().collect::<Result<_, _>>().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].username, "amy");
    }

    #[test]
    fn test_corrupt_row_surfaces_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");
        let log = HistoryLog::open(&path).unwrap();
        log.append(&record("a", StressLevel::Low, 0)).unwrap();

        let mut content = fs::read_to_string(&path).unwrap();
        content.push_str("b,1714557600.0,,9,5,5,0,0,0,5,5,0,5,5,5,5,5,5,5,5,5,5,5,0\n");
        fs::write(&path, content).unwrap();

        let results: Vec<_> = log.read_all().unwrap().collect();
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(StorageError::CorruptRow { line: 3, .. })));
    }

    #[test]
    fn test_export_csv() {
        let records = vec![record("a", StressLevel::Low, 0), record("a", StressLevel::High, 1)];
        let csv = export_csv(&records).unwrap();
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("username,timestamp"));
        assert!(lines[2].starts_with("a,1714564860.000,2024-05-01T12:01:00.000Z,2,"));
    }
}
