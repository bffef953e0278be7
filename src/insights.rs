//! Insights aggregator
//!
//! Reads the processed dataset fresh on every call. No caching here;
//! the dataset may be regenerated between reads.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use thiserror::Error;
use tracing::debug;

use crate::models::{DeviceBreakdown, DeviceFraud, InsightsSnapshot};

pub const FRAUD_COLUMN: &str = "class";
pub const TIMESTAMP_COLUMN: &str = "purchase_time";
pub const DEVICE_COLUMN: &str = "device_id";

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DatasetError {
    #[error("dataset unavailable: {0}")]
    Unavailable(String),
    #[error("dataset schema error: {0}")]
    Schema(String),
}

impl From<csv::Error> for DatasetError {
    fn from(err: csv::Error) -> Self {
        match err.kind() {
            csv::ErrorKind::Io(_) => DatasetError::Unavailable(err.to_string()),
            _ => DatasetError::Schema(err.to_string()),
        }
    }
}

pub struct InsightsAggregator {
    path: PathBuf,
    timeout: Duration,
}

impl InsightsAggregator {
    pub fn new(path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            timeout,
        }
    }

    /// Totals, fraud percentage and per-day fraud counts
    pub async fn snapshot(&self) -> Result<InsightsSnapshot, DatasetError> {
        self.read_with(summarize).await
    }

    /// Fraud cases per device, highest first
    pub async fn device_breakdown(&self) -> Result<DeviceBreakdown, DatasetError> {
        self.read_with(group_by_device).await
    }

    /// Single attempt on the blocking pool, bounded by the configured timeout
    async fn read_with<T, F>(&self, aggregate: F) -> Result<T, DatasetError>
    where
        T: Send + 'static,
        F: FnOnce(BufReader<File>) -> Result<T, DatasetError> + Send + 'static,
    {
        let path = self.path.clone();
        let task = tokio::task::spawn_blocking(move || {
            let file = File::open(&path)
                .map_err(|e| DatasetError::Unavailable(format!("{}: {}", path.display(), e)))?;
            aggregate(BufReader::new(file))
        });

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(DatasetError::Unavailable(format!("dataset read failed: {}", e))),
            Err(_) => Err(DatasetError::Unavailable(format!(
                "dataset read timed out after {:?}",
                self.timeout
            ))),
        }
    }
}

/// Aggregate a processed dataset read from `reader`
pub fn summarize<R: Read>(reader: R) -> Result<InsightsSnapshot, DatasetError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = rdr.headers()?.clone();
    let fraud_idx = column_index(&headers, FRAUD_COLUMN)?;
    let time_idx = column_index(&headers, TIMESTAMP_COLUMN)?;

    let mut total: u64 = 0;
    let mut fraud: u64 = 0;
    let mut trends: BTreeMap<NaiveDate, u64> = BTreeMap::new();

    for (row, record) in rdr.records().enumerate() {
        let record = record?;
        let line = row + 2;

        let is_fraud = parse_indicator(field(&record, fraud_idx), line)?;
        let date = parse_date(field(&record, time_idx)).ok_or_else(|| {
            DatasetError::Schema(format!(
                "line {}: unparseable {} '{}'",
                line,
                TIMESTAMP_COLUMN,
                field(&record, time_idx)
            ))
        })?;

        total += 1;
        fraud += is_fraud;
        *trends.entry(date).or_insert(0) += is_fraud;
    }

    debug!(total, fraud, days = trends.len(), "Dataset summarized");

    Ok(InsightsSnapshot {
        total_transactions: total,
        fraud_cases: fraud,
        fraud_percentage: fraud_percentage(fraud, total),
        fraud_trends: trends
            .into_iter()
            .map(|(date, count)| (date.format("%Y-%m-%d").to_string(), count))
            .collect(),
    })
}

/// Fraud cases per device, ordered by count descending then device id
pub fn group_by_device<R: Read>(reader: R) -> Result<DeviceBreakdown, DatasetError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = rdr.headers()?.clone();
    let fraud_idx = column_index(&headers, FRAUD_COLUMN)?;
    let device_idx = column_index(&headers, DEVICE_COLUMN)?;

    let mut per_device: HashMap<String, u64> = HashMap::new();
    for (row, record) in rdr.records().enumerate() {
        let record = record?;
        let is_fraud = parse_indicator(field(&record, fraud_idx), row + 2)?;
        *per_device.entry(field(&record, device_idx).to_string()).or_insert(0) += is_fraud;
    }

    let mut devices: Vec<DeviceFraud> = per_device
        .into_iter()
        .map(|(device_id, fraud_cases)| DeviceFraud { device_id, fraud_cases })
        .collect();
    devices.sort_by(|a, b| {
        b.fraud_cases
            .cmp(&a.fraud_cases)
            .then_with(|| a.device_id.cmp(&b.device_id))
    });

    Ok(DeviceBreakdown { devices })
}

/// `100 * fraud / total` rounded to two decimals; 0 for an empty dataset
pub fn fraud_percentage(fraud: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let pct = fraud as f64 / total as f64 * 100.0;
    (pct * 100.0).round() / 100.0
}

fn column_index(headers: &csv::StringRecord, name: &str) -> Result<usize, DatasetError> {
    headers
        .iter()
        .position(|h| h.trim_start_matches('\u{feff}') == name)
        .ok_or_else(|| DatasetError::Schema(format!("missing column '{}'", name)))
}

fn field(record: &csv::StringRecord, idx: usize) -> &str {
    record.get(idx).unwrap_or("")
}

fn parse_indicator(raw: &str, line: usize) -> Result<u64, DatasetError> {
    match raw.parse::<f64>() {
        Ok(v) if v == 0.0 => Ok(0),
        Ok(v) if v == 1.0 => Ok(1),
        _ => Err(DatasetError::Schema(format!(
            "line {}: {} must be 0 or 1, got '{}'",
            line, FRAUD_COLUMN, raw
        ))),
    }
}

/// Calendar date of a purchase timestamp
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt.date());
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = "\
user_id,purchase_time,purchase_value,device_id,class
1,2015-02-24 22:55:49,34,QVPSPJUOCKZAR,0
2,2015-02-24 08:10:00,16,EOGFQPIZPYXFZ,1
3,2015-03-01 14:00:00,15,YSSKYOSJHPPLJ,1
4,2015-01-05 00:00:01,44,QVPSPJUOCKZAR,1
5,2015-03-01 09:30:00,39,EOGFQPIZPYXFZ,0
6,2015-03-01 23:59:59,42,QVPSPJUOCKZAR,0
";

    #[test]
    fn test_summarize_counts_and_trends() {
        let snapshot = summarize(SAMPLE.as_bytes()).unwrap();

        assert_eq!(snapshot.total_transactions, 6);
        assert_eq!(snapshot.fraud_cases, 3);
        assert_eq!(snapshot.fraud_percentage, 50.0);

        let trends: Vec<(&str, u64)> = snapshot
            .fraud_trends
            .iter()
            .map(|(d, c)| (d.as_str(), *c))
            .collect();
        assert_eq!(
            trends,
            vec![("2015-01-05", 1), ("2015-02-24", 1), ("2015-03-01", 1)]
        );
    }

    #[test]
    fn test_percentage_rounding() {
        assert_eq!(fraud_percentage(1, 3), 33.33);
        assert_eq!(fraud_percentage(2, 3), 66.67);
        assert_eq!(fraud_percentage(0, 0), 0.0);
        assert_eq!(fraud_percentage(7, 7), 100.0);
    }

    #[test]
    fn test_missing_column_is_schema_error() {
        let err = summarize("user_id,purchase_time\n1,2015-02-24 22:55:49\n".as_bytes()).unwrap_err();
        assert_eq!(err, DatasetError::Schema("missing column 'class'".into()));
    }

    #[test]
    fn test_bad_indicator_is_schema_error() {
        let err = summarize("purchase_time,class\n2015-02-24 22:55:49,maybe\n".as_bytes()).unwrap_err();
        assert!(matches!(err, DatasetError::Schema(msg) if msg.contains("line 2")));
    }

    #[test]
    fn test_float_indicator_accepted() {
        let snapshot = summarize("purchase_time,class\n2015-02-24,1.0\n2015-02-24,0.0\n".as_bytes()).unwrap();
        assert_eq!(snapshot.fraud_cases, 1);
        assert_eq!(snapshot.fraud_trends.get("2015-02-24"), Some(&1));
    }

    #[test]
    fn test_empty_dataset() {
        let snapshot = summarize("purchase_time,class\n".as_bytes()).unwrap();
        assert_eq!(snapshot.total_transactions, 0);
        assert_eq!(snapshot.fraud_percentage, 0.0);
        assert!(snapshot.fraud_trends.is_empty());
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2015, 2, 24);
        assert_eq!(parse_date("2015-02-24 22:55:49"), expected);
        assert_eq!(parse_date("2015-02-24 22:55:49.123"), expected);
        assert_eq!(parse_date("2015-02-24T22:55:49"), expected);
        assert_eq!(parse_date("2015-02-24T22:55:49+00:00"), expected);
        assert_eq!(parse_date("2015-02-24"), expected);
        assert_eq!(parse_date("yesterday"), None);
    }

    #[test]
    fn test_group_by_device() {
        let breakdown = group_by_device(SAMPLE.as_bytes()).unwrap();
        assert_eq!(
            breakdown.devices,
            vec![
                DeviceFraud { device_id: "EOGFQPIZPYXFZ".into(), fraud_cases: 1 },
                DeviceFraud { device_id: "QVPSPJUOCKZAR".into(), fraud_cases: 1 },
                DeviceFraud { device_id: "YSSKYOSJHPPLJ".into(), fraud_cases: 1 },
            ]
        );
    }

    #[test]
    fn test_group_by_device_requires_column() {
        let err = group_by_device("purchase_time,class\n2015-02-24,1\n".as_bytes()).unwrap_err();
        assert_eq!(err, DatasetError::Schema("missing column 'device_id'".into()));
    }

    #[tokio::test]
    async fn test_snapshot_reads_file_fresh() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        file.flush().unwrap();

        let aggregator = InsightsAggregator::new(file.path(), Duration::from_secs(5));
        assert_eq!(aggregator.snapshot().await.unwrap().total_transactions, 6);

        file.write_all(b"7,2015-03-02 10:00:00,10,AAAA,1\n").unwrap();
        file.flush().unwrap();

        let snapshot = aggregator.snapshot().await.unwrap();
        assert_eq!(snapshot.total_transactions, 7);
        assert_eq!(snapshot.fraud_cases, 4);
    }

    #[tokio::test]
    async fn test_missing_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let aggregator = InsightsAggregator::new(dir.path().join("nope.csv"), Duration::from_secs(5));
        assert!(matches!(
            aggregator.snapshot().await,
            Err(DatasetError::Unavailable(_))
        ));
    }
}
