//! Conversion of range query responses into time series

use super::RawQueryResult;
use crate::models::{SeriesPoint, TimeSeries};
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

/// Reasons a query response cannot be turned into a series
#[derive(Debug, Error, PartialEq)]
pub enum SeriesError {
    #[error("no data returned")]
    NoData,
    #[error("no results in response")]
    NoResults,
    #[error("missing field '{0}'")]
    MissingField(&'static str),
    #[error("sample {index} is not a [timestamp, value] pair")]
    InvalidSample { index: usize },
    #[error("sample {index} has invalid timestamp '{raw}'")]
    InvalidTimestamp { index: usize, raw: String },
    #[error("sample {index} has invalid value '{raw}'")]
    InvalidValue { index: usize, raw: String },
}

/// Build a series from the first result of a `query_range` response
///
/// Any malformed sample rejects the whole series.
pub fn build_series(raw: &RawQueryResult, metric_name: &str) -> Result<TimeSeries, SeriesError> {
    let body = raw.body().ok_or(SeriesError::NoData)?;

    let results = body
        .get("data")
        .and_then(|data| data.get("result"))
        .and_then(Value::as_array)
        .ok_or(SeriesError::NoResults)?;

    // Only the first series is analyzed; others are ignored
    let first = results.first().ok_or(SeriesError::NoResults)?;

    let samples = first
        .get("values")
        .and_then(Value::as_array)
        .ok_or(SeriesError::MissingField("values"))?;

    if samples.is_empty() {
        return Err(SeriesError::NoResults);
    }

    let points = samples
        .iter()
        .enumerate()
        .map(|(index, sample)| parse_sample(index, sample))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(TimeSeries {
        metric_name: metric_name.to_string(),
        points,
    })
}

fn parse_sample(index: usize, sample: &Value) -> Result<SeriesPoint, SeriesError> {
    let pair = match sample.as_array() {
        Some(pair) if pair.len() >= 2 => pair,
        _ => return Err(SeriesError::InvalidSample { index }),
    };

    let epoch_secs = parse_number(&pair[0]).ok_or_else(|| SeriesError::InvalidTimestamp {
        index,
        raw: pair[0].to_string(),
    })?;
    let timestamp = epoch_to_utc(epoch_secs).ok_or_else(|| SeriesError::InvalidTimestamp {
        index,
        raw: pair[0].to_string(),
    })?;

    let value = parse_number(&pair[1]).ok_or_else(|| SeriesError::InvalidValue {
        index,
        raw: pair[1].to_string(),
    })?;

    Ok(SeriesPoint { timestamp, value })
}

/// Prometheus encodes timestamps as numbers and values as strings; accept either
fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn epoch_to_utc(epoch_secs: f64) -> Option<DateTime<Utc>> {
    if !epoch_secs.is_finite() {
        return None;
    }
    let secs = epoch_secs.floor();
    let nanos = ((epoch_secs - secs) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(secs as i64, nanos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn matrix(result: Value) -> RawQueryResult {
        RawQueryResult::from_body(json!({
            "status": "success",
            "data": { "resultType": "matrix", "result": result }
        }))
    }

    #[test]
    fn test_build_series_from_matrix() {
        let raw = matrix(json!([{
            "metric": {},
            "values": [[1700000000, "0.10"], [1700000015, "0.12"], [1700000030.5, "0.11"]]
        }]));

        let series = build_series(&raw, "latency").unwrap();

        assert_eq!(series.metric_name, "latency");
        assert_eq!(series.values(), vec![0.10, 0.12, 0.11]);
        assert_eq!(series.points[0].timestamp.timestamp(), 1_700_000_000);
        assert_eq!(series.points[2].timestamp.timestamp_subsec_millis(), 500);
    }

    #[test]
    fn test_build_series_uses_first_result_only() {
        let raw = matrix(json!([
            { "metric": {"pod": "a"}, "values": [[1700000000, "1"]] },
            { "metric": {"pod": "b"}, "values": [[1700000000, "2"], [1700000015, "3"]] }
        ]));

        let series = build_series(&raw, "heap_usage").unwrap();
        assert_eq!(series.values(), vec![1.0]);
    }

    #[test]
    fn test_build_series_accepts_string_timestamps_and_special_values() {
        let raw = matrix(json!([{ "values": [["1700000000", "NaN"], ["1700000015", "+Inf"]] }]));

        let series = build_series(&raw, "gc_pauses").unwrap();
        assert!(series.points[0].value.is_nan());
        assert!(series.points[1].value.is_infinite());
    }

    #[test]
    fn test_build_series_empty_raw() {
        assert_eq!(
            build_series(&RawQueryResult::empty(), "latency"),
            Err(SeriesError::NoData)
        );
    }

    #[test]
    fn test_build_series_no_results() {
        assert_eq!(
            build_series(&matrix(json!([])), "latency"),
            Err(SeriesError::NoResults)
        );

        let raw = RawQueryResult::from_body(json!({ "data": {} }));
        assert_eq!(build_series(&raw, "latency"), Err(SeriesError::NoResults));
    }

    #[test]
    fn test_build_series_missing_values() {
        let raw = matrix(json!([{ "metric": {} }]));
        assert_eq!(
            build_series(&raw, "latency"),
            Err(SeriesError::MissingField("values"))
        );
    }

    #[test]
    fn test_build_series_empty_values() {
        let raw = matrix(json!([{ "metric": {}, "values": [] }]));
        assert_eq!(build_series(&raw, "latency"), Err(SeriesError::NoResults));
    }

    #[test]
    fn test_build_series_rejects_whole_series_on_bad_value() {
        let raw = matrix(json!([{
            "values": [[1700000000, "0.1"], [1700000015, "fast"], [1700000030, "0.2"]]
        }]));

        assert!(matches!(
            build_series(&raw, "latency"),
            Err(SeriesError::InvalidValue { index: 1, .. })
        ));
    }

    #[test]
    fn test_build_series_rejects_bad_timestamp() {
        let raw = matrix(json!([{ "values": [["yesterday", "0.1"]] }]));
        assert!(matches!(
            build_series(&raw, "latency"),
            Err(SeriesError::InvalidTimestamp { index: 0, .. })
        ));
    }

    #[test]
    fn test_build_series_rejects_short_sample() {
        let raw = matrix(json!([{ "values": [[1700000000]] }]));
        assert_eq!(
            build_series(&raw, "latency"),
            Err(SeriesError::InvalidSample { index: 0 })
        );
    }
}
