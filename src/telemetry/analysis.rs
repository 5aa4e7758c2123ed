//! Trend analysis over stored readings
//!
//! Produces summary statistics, smoothed series, a linear fit with a short
//! forecast and the pairwise correlation of the available metrics.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::store::{CsvSnapshot, CsvStore};
use crate::config::AnalysisConfig;

/// Metric columns understood by the analysis
pub const METRICS: [&str; 3] = ["temperature", "humidity", "pressure"];

/// Reasons an analysis cannot be produced; messages are shown to the user
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("Wait for data... CSV file not found.")]
    CsvNotFound,

    #[error("Read CSV failed: {0}")]
    ReadFailed(String),

    #[error("Need more data points for analysis.")]
    NotEnoughData,

    #[error("No valid sensor data found.")]
    NoValidData,

    #[error("All sensor data is invalid after cleaning.")]
    InvalidAfterCleaning,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricStats {
    pub max: f64,
    pub min: f64,
    pub avg: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stats {
    #[serde(flatten)]
    pub metrics: BTreeMap<String, MetricStats>,
    pub current_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSeries {
    pub raw: Vec<f64>,
    pub smooth: Vec<f64>,
    pub fitted: Vec<f64>,
    pub predict: Vec<f64>,
}

/// Chart axis label: formatted time, or row index when no timestamps exist
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Label {
    Time(String),
    Index(usize),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub stats: Stats,
    pub data: BTreeMap<String, MetricSeries>,
    pub labels: Vec<Option<Label>>,
    pub correlation: BTreeMap<String, BTreeMap<String, Option<f64>>>,
    pub available_metrics: Vec<String>,
}

/// Rows that carry a value for every available metric
struct CleanedData {
    metrics: Vec<&'static str>,
    /// `columns[m][row]`
    columns: Vec<Vec<f64>>,
    timestamps: Option<Vec<String>>,
}

impl CleanedData {
    fn len(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }
}

pub struct DataProcessor {
    store: Arc<CsvStore>,
    config: AnalysisConfig,
}

impl DataProcessor {
    pub const fn new(store: Arc<CsvStore>, config: AnalysisConfig) -> Self {
        Self { store, config }
    }

    /// Analyse the current contents of the store
    pub fn process(&self) -> Result<AnalysisReport, AnalysisError> {
        if !self.store.exists() {
            return Err(AnalysisError::CsvNotFound);
        }
        let snapshot = self
            .store
            .snapshot()
            .map_err(|e| AnalysisError::ReadFailed(e.to_string()))?;
        analyze(&snapshot, &self.config)
    }
}

/// Analyse a snapshot of the store
pub fn analyze(
    snapshot: &CsvSnapshot,
    config: &AnalysisConfig,
) -> Result<AnalysisReport, AnalysisError> {
    if snapshot.rows.len() < 2 {
        return Err(AnalysisError::NotEnoughData);
    }

    let cleaned = clean(snapshot)?;
    let count = cleaned.len();

    let mut stats = BTreeMap::new();
    for (metric, values) in cleaned.metrics.iter().zip(&cleaned.columns) {
        stats.insert((*metric).to_string(), metric_stats(values));
    }

    let start = count.saturating_sub(config.window.max(1));
    let mut data = BTreeMap::new();
    for (metric, values) in cleaned.metrics.iter().zip(&cleaned.columns) {
        let window = &values[start..];
        let (fitted, predict) = predict_series(window, config.forecast);
        data.insert(
            (*metric).to_string(),
            MetricSeries {
                raw: window.to_vec(),
                smooth: rolling_mean(window, config.smoothing.max(1)),
                fitted,
                predict,
            },
        );
    }

    let mut correlation = BTreeMap::new();
    if cleaned.metrics.len() >= 2 {
        for (a, xs) in cleaned.metrics.iter().zip(&cleaned.columns) {
            let row = cleaned
                .metrics
                .iter()
                .zip(&cleaned.columns)
                .map(|(b, ys)| ((*b).to_string(), pearson(xs, ys).map(round2)))
                .collect();
            correlation.insert((*a).to_string(), row);
        }
    }

    let labels = match &cleaned.timestamps {
        Some(timestamps) => timestamps[start..]
            .iter()
            .map(|ts| format_label(ts).map(Label::Time))
            .collect(),
        None => (0..count - start).map(|i| Some(Label::Index(i))).collect(),
    };

    Ok(AnalysisReport {
        stats: Stats {
            metrics: stats,
            current_count: count,
        },
        data,
        labels,
        correlation,
        available_metrics: cleaned.metrics.iter().map(ToString::to_string).collect(),
    })
}

fn clean(snapshot: &CsvSnapshot) -> Result<CleanedData, AnalysisError> {
    let parse = |row: &csv::StringRecord, idx: usize| {
        row.get(idx)
            .and_then(|cell| cell.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite())
    };

    // A metric counts when its column exists and holds at least one number.
    // An all-empty column is left out of available_metrics instead of
    // failing the whole clean with InvalidAfterCleaning.
    let available: Vec<(&'static str, usize)> = METRICS
        .iter()
        .filter_map(|m| snapshot.column(m).map(|idx| (*m, idx)))
        .filter(|(_, idx)| snapshot.rows.iter().any(|row| parse(row, *idx).is_some()))
        .collect();
    if available.is_empty() {
        return Err(AnalysisError::NoValidData);
    }

    let ts_idx = snapshot.column("timestamp");
    let mut columns = vec![Vec::new(); available.len()];
    let mut timestamps = Vec::new();
    for row in &snapshot.rows {
        let values: Option<Vec<f64>> = available.iter().map(|(_, idx)| parse(row, *idx)).collect();
        let Some(values) = values else {
            continue;
        };
        for (column, value) in columns.iter_mut().zip(values) {
            column.push(value);
        }
        if let Some(idx) = ts_idx {
            timestamps.push(row.get(idx).unwrap_or_default().to_string());
        }
    }

    if columns[0].is_empty() {
        return Err(AnalysisError::InvalidAfterCleaning);
    }

    Ok(CleanedData {
        metrics: available.iter().map(|(m, _)| *m).collect(),
        columns,
        timestamps: ts_idx.map(|_| timestamps),
    })
}

fn metric_stats(values: &[f64]) -> MetricStats {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    MetricStats {
        max,
        min,
        avg: round2(mean(values)),
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Trailing rolling mean; the first points average what is available
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| mean(&values[(i + 1).saturating_sub(window)..=i]))
        .collect()
}

/// Least-squares line over the point index, evaluated on the series and
/// on `points` indices past its end
#[allow(clippy::cast_precision_loss)]
pub fn predict_series(values: &[f64], points: usize) -> (Vec<f64>, Vec<f64>) {
    let n = values.len();
    if n < 2 {
        return (Vec::new(), Vec::new());
    }

    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = mean(values);
    let (mut sxy, mut sxx) = (0.0, 0.0);
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        sxy += dx * (y - y_mean);
        sxx += dx * dx;
    }
    let slope = sxy / sxx;
    let intercept = y_mean - slope * x_mean;

    let line = |x: usize| intercept + slope * x as f64;
    ((0..n).map(line).collect(), (n..n + points).map(line).collect())
}

/// Pearson correlation; undefined for constant or too short series
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let (x_mean, y_mean) = (mean(xs), mean(ys));
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys) {
        let (dx, dy) = (x - x_mean, y - y_mean);
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        return None;
    }
    Some(sxy / (sxx * syy).sqrt())
}

/// Short chart label (`%m-%d %H:%M`) for a stored timestamp
pub fn format_label(timestamp: &str) -> Option<String> {
    parse_timestamp(timestamp).map(|t| t.format("%m-%d %H:%M").to_string())
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    const FORMATS: [&str; 5] = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y/%m/%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y/%m/%d %H:%M",
    ];

    let raw = raw.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.naive_local());
    }
    FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::SensorReading;

    fn snapshot(headers: &[&str], rows: &[&[&str]]) -> CsvSnapshot {
        CsvSnapshot {
            headers: headers.iter().map(ToString::to_string).collect(),
            rows: rows.iter().map(|r| csv::StringRecord::from(r.to_vec())).collect(),
        }
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_process_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(CsvStore::new(dir.path().join("sensor_data.csv")));
        let processor = DataProcessor::new(store, AnalysisConfig::default());
        let err = processor.process().unwrap_err();
        assert_eq!(err, AnalysisError::CsvNotFound);
        assert_eq!(err.to_string(), "Wait for data... CSV file not found.");
    }

    #[test]
    fn test_process_needs_two_rows() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(CsvStore::new(dir.path().join("sensor_data.csv")));
        store
            .append(&SensorReading::from_payload(br#"{"temperature":20}"#).unwrap())
            .unwrap();
        let processor = DataProcessor::new(store, AnalysisConfig::default());
        assert_eq!(processor.process().unwrap_err(), AnalysisError::NotEnoughData);
    }

    #[test]
    fn test_process_from_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(CsvStore::new(dir.path().join("sensor_data.csv")));
        for (i, (t, h, p)) in [(20.0, 40.0, 1000.0), (22.0, 42.0, 1001.0), (24.0, 44.0, 1003.0)]
            .iter()
            .enumerate()
        {
            let payload = format!(
                r#"{{"timestamp":"2024-05-01 10:0{i}:00","temperature":{t},"humidity":{h},"pressure":{p}}}"#
            );
            store
                .append(&SensorReading::from_payload(payload.as_bytes()).unwrap())
                .unwrap();
        }

        let report = DataProcessor::new(store, AnalysisConfig::default())
            .process()
            .unwrap();
        assert_eq!(report.available_metrics, vec!["temperature", "humidity", "pressure"]);
        assert_eq!(report.stats.current_count, 3);
        assert_eq!(report.stats.metrics["temperature"].avg, 22.0);
        assert_eq!(report.stats.metrics["pressure"].max, 1003.0);
        assert_eq!(report.correlation["temperature"]["humidity"], Some(1.0));
        assert_eq!(
            report.labels,
            vec![
                Some(Label::Time("05-01 10:00".to_string())),
                Some(Label::Time("05-01 10:01".to_string())),
                Some(Label::Time("05-01 10:02".to_string())),
            ]
        );

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["stats"]["current_count"], 3);
        assert_eq!(json["stats"]["humidity"]["min"], 40.0);
        assert_eq!(json["data"]["temperature"]["predict"].as_array().unwrap().len(), 5);
    }

    #[test]
    fn test_unavailable_metric_is_skipped() {
        let snap = snapshot(
            &["timestamp", "temperature", "humidity", "pressure", "raw"],
            &[
                &["x", "20", "", "", "{}"],
                &["y", "21", "", "", "{}"],
                &["z", "bad", "", "", "{}"],
            ],
        );
        let report = analyze(&snap, &AnalysisConfig::default()).unwrap();
        assert_eq!(report.available_metrics, vec!["temperature"]);
        assert_eq!(report.stats.current_count, 2);
        assert!(report.correlation.is_empty());
        assert_eq!(report.labels, vec![None, None]);
    }

    #[test]
    fn test_no_valid_data() {
        let snap = snapshot(&["timestamp", "temperature"], &[&["a", "x"], &["b", ""]]);
        assert_eq!(
            analyze(&snap, &AnalysisConfig::default()).unwrap_err(),
            AnalysisError::NoValidData
        );
    }

    #[test]
    fn test_invalid_after_cleaning() {
        // Each metric has a value, but never on the same row
        let snap = snapshot(
            &["temperature", "humidity"],
            &[&["20", ""], &["", "40"]],
        );
        assert_eq!(
            analyze(&snap, &AnalysisConfig::default()).unwrap_err(),
            AnalysisError::InvalidAfterCleaning
        );
    }

    #[test]
    fn test_window_and_index_labels() {
        let rows: Vec<Vec<String>> = (0..40).map(|i| vec![i.to_string()]).collect();
        let snap = CsvSnapshot {
            headers: vec!["temperature".to_string()],
            rows: rows.iter().map(|r| csv::StringRecord::from(r.clone())).collect(),
        };
        let report = analyze(&snap, &AnalysisConfig::default()).unwrap();
        let series = &report.data["temperature"];
        assert_eq!(series.raw.len(), 30);
        assert_eq!(series.raw[0], 10.0);
        assert_eq!(report.labels.len(), 30);
        assert_eq!(report.labels[0], Some(Label::Index(0)));
        assert_eq!(report.stats.current_count, 40);
        assert_eq!(report.stats.metrics["temperature"].avg, 19.5);
    }

    #[test]
    fn test_rolling_mean_min_periods() {
        let smooth = rolling_mean(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 5);
        assert_eq!(smooth, vec![1.0, 1.5, 2.0, 2.5, 3.0, 4.0]);
    }

    #[test]
    fn test_predict_series_linear() {
        let (fitted, predict) = predict_series(&[1.0, 3.0, 5.0], 2);
        assert!(fitted.iter().zip([1.0, 3.0, 5.0]).all(|(a, b)| approx(*a, b)));
        assert!(approx(predict[0], 7.0));
        assert!(approx(predict[1], 9.0));

        let (fitted, predict) = predict_series(&[1.0], 5);
        assert!(fitted.is_empty() && predict.is_empty());
    }

    #[test]
    fn test_pearson() {
        assert!(approx(pearson(&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]).unwrap(), -1.0));
        assert_eq!(pearson(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]), None);
    }

    #[test]
    fn test_format_label() {
        assert_eq!(format_label("2024-03-09T08:05:00Z").as_deref(), Some("03-09 08:05"));
        assert_eq!(format_label("2024/03/09 08:05:10").as_deref(), Some("03-09 08:05"));
        assert_eq!(format_label("2024-03-09").as_deref(), Some("03-09 00:00"));
        assert_eq!(format_label("t1"), None);
    }
}
