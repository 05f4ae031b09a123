//! Result marshalling
//!
//! Reshapes raw query tool rows into the canonical
//! `{ "_id": {..}, <metric>: f64, "count": .. }` records, one variant per
//! view, and reinterprets raw samples into integer/string buckets.

use crate::{Error, Result};

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Raw field carrying a group's row count.
pub const COUNT_FIELD: &str = "Count";
/// Key added to `_id` by the time view.
pub const TIME_BUCKET_KEY: &str = "time_bucket";

/// Output keys a metric column may not shadow. A column with one of these
/// names is left out of `metrics`; `count` keeps the raw row count.
const RESERVED_KEYS: [&str; 2] = ["_id", "count"];

/// One grouped result row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalRow {
    #[serde(rename = "_id")]
    pub id: Map<String, Value>,
    /// Aggregated columns. Unparseable values are NaN (serialized as null).
    /// Never contains `_id` or `count`.
    #[serde(flatten)]
    pub metrics: BTreeMap<String, f64>,
    pub count: Value,
}

/// A raw record split by value type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Sample {
    pub integer: BTreeMap<String, i64>,
    pub string: BTreeMap<String, String>,
}

/// Flat table view: one output row per raw row.
pub fn marshal_table_rows(rows: &Value, cols: &[String], dims: &[String]) -> Result<Vec<CanonicalRow>> {
    row_objects(rows, "table")?
        .into_iter()
        .map(|r| Ok(canonical_row(r, cols, dims)))
        .collect()
}

/// Time view: `rows` maps bucket keys to the rows of that bucket.
///
/// Buckets are emitted in ascending numeric order; keys that are not integers
/// follow with a null `time_bucket`.
pub fn marshal_time_rows(buckets: &Value, cols: &[String], dims: &[String]) -> Result<Vec<CanonicalRow>> {
    let buckets = match buckets {
        Value::Null => return Ok(Vec::new()),
        Value::Object(map) => map,
        other => {
            return Err(Error::Protocol(format!(
                "time query returned {} instead of an object of buckets",
                kind(other)
            )))
        }
    };

    let mut ordered: Vec<(Option<i64>, &Value)> = buckets
        .iter()
        .map(|(key, rows)| (parse_int(key), rows))
        .collect();
    ordered.sort_by_key(|(bucket, _)| (bucket.is_none(), *bucket));

    let mut out = Vec::new();
    for (bucket, rows) in ordered {
        for r in row_objects(rows, "time")? {
            let mut row = canonical_row(r, cols, dims);
            row.id.insert(
                TIME_BUCKET_KEY.to_string(),
                bucket.map(Value::from).unwrap_or(Value::Null),
            );
            out.push(row);
        }
    }
    Ok(out)
}

/// Distribution view.
///
/// The first requested column holds, per group, an array of category labels.
/// Each label becomes its own row and the group's count is split evenly
/// across the labels.
pub fn marshal_dist_rows(rows: &Value, cols: &[String], dims: &[String]) -> Result<Vec<CanonicalRow>> {
    let rows = row_objects(rows, "hist")?;
    let Some(col) = cols.first() else {
        return Ok(Vec::new());
    };

    let mut out = Vec::new();
    for r in rows {
        let Some(Value::Array(labels)) = r.get(col) else {
            continue;
        };
        let share = parse_float(r.get(COUNT_FIELD)) / labels.len() as f64;
        let id = project_dims(r, dims);

        for label in labels {
            let mut id = id.clone();
            id.insert(col.clone(), label.clone());
            out.push(CanonicalRow {
                id,
                metrics: BTreeMap::new(),
                count: Value::from(share),
            });
        }
    }
    Ok(out)
}

/// Samples view.
///
/// Every field is classified on its own value: a base-10 integer goes to the
/// `integer` bucket, anything else to `string`. The same field may land in
/// different buckets on different rows. Null fields are dropped.
///
/// Numbers are truncated toward zero, so `3.5` lands in `integer` as 3.
/// Strings must be a whole base-10 integer: `"42a"` and `"3.5"` stay strings.
/// Integers outside the `i64` range (as strings or numbers) have no integer
/// representation here and are kept in `string` with their text unchanged.
pub fn marshal_samples(rows: &Value) -> Result<Vec<Sample>> {
    Ok(row_objects(rows, "samples")?
        .into_iter()
        .map(|r| {
            let mut sample = Sample::default();
            for (field, value) in r {
                match value {
                    Value::Null => {}
                    Value::String(s) => match s.trim().parse::<i64>() {
                        Ok(n) => {
                            sample.integer.insert(field.clone(), n);
                        }
                        Err(_) => {
                            sample.string.insert(field.clone(), s.clone());
                        }
                    },
                    Value::Number(n) => match number_as_int(n) {
                        Some(i) => {
                            sample.integer.insert(field.clone(), i);
                        }
                        None => {
                            sample.string.insert(field.clone(), n.to_string());
                        }
                    },
                    other => {
                        sample.string.insert(field.clone(), other.to_string());
                    }
                }
            }
            sample
        })
        .collect())
}

/// Integer value of a JSON number, truncating fractions.
fn number_as_int(n: &serde_json::Number) -> Option<i64> {
    if let Some(i) = n.as_i64() {
        return Some(i);
    }
    let f = n.as_f64()?.trunc();
    // i64::MAX is not exactly representable; 2^63 itself is already out of range.
    if f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

fn canonical_row(r: &Map<String, Value>, cols: &[String], dims: &[String]) -> CanonicalRow {
    CanonicalRow {
        id: project_dims(r, dims),
        metrics: cols
            .iter()
            .filter(|c| !RESERVED_KEYS.contains(&c.as_str()))
            .map(|c| (c.clone(), parse_float(r.get(c))))
            .collect(),
        count: r.get(COUNT_FIELD).cloned().unwrap_or(Value::Null),
    }
}

/// Dims missing from the raw row are left out of `_id`.
fn project_dims(r: &Map<String, Value>, dims: &[String]) -> Map<String, Value> {
    dims.iter()
        .filter_map(|d| r.get(d).map(|v| (d.clone(), v.clone())))
        .collect()
}

fn row_objects<'a>(rows: &'a Value, view: &str) -> Result<Vec<&'a Map<String, Value>>> {
    match rows {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Object(map) => Ok(map),
                other => Err(Error::Protocol(format!(
                    "{view} query returned a {} row",
                    kind(other)
                ))),
            })
            .collect(),
        other => Err(Error::Protocol(format!(
            "{view} query returned {} instead of an array of rows",
            kind(other)
        ))),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Best-effort float coercion: numbers pass through, strings parse their
/// longest numeric prefix, everything else is NaN.
pub fn parse_float(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) => parse_float_prefix(s),
        _ => f64::NAN,
    }
}

fn parse_float_prefix(raw: &str) -> f64 {
    let s = raw.trim_start();
    let b = s.as_bytes();
    let digits_from = |mut i: usize| {
        while i < b.len() && b[i].is_ascii_digit() {
            i += 1;
        }
        i
    };

    let mut i = 0;
    if i < b.len() && (b[i] == b'+' || b[i] == b'-') {
        i += 1;
    }
    if s[i..].starts_with("Infinity") {
        return if b.first() == Some(&b'-') {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        };
    }

    let int_end = digits_from(i);
    let mut digits = int_end - i;
    i = int_end;
    if i < b.len() && b[i] == b'.' {
        let frac_end = digits_from(i + 1);
        if digits > 0 || frac_end > i + 1 {
            digits += frac_end - (i + 1);
            i = frac_end;
        }
    }
    if digits == 0 {
        return f64::NAN;
    }

    if i < b.len() && (b[i] == b'e' || b[i] == b'E') {
        let mut k = i + 1;
        if k < b.len() && (b[k] == b'+' || b[k] == b'-') {
            k += 1;
        }
        let exp_end = digits_from(k);
        if exp_end > k {
            i = exp_end;
        }
    }

    s[..i].parse::<f64>().unwrap_or(f64::NAN)
}

/// Leading base-10 integer of `raw`, if any.
fn parse_int(raw: &str) -> Option<i64> {
    let s = raw.trim_start();
    let b = s.as_bytes();
    let start = usize::from(b.first().is_some_and(|c| *c == b'+' || *c == b'-'));
    let end = start + b[start..].iter().take_while(|c| c.is_ascii_digit()).count();
    if end == start {
        return None;
    }
    s[..end].parse::<i64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_table_rows() {
        let raw = json!([
            {"host": "a", "region": "us", "latency": "12.5", "Count": 4},
            {"host": "b", "latency": "n/a", "Count": 1}
        ]);

        let rows = marshal_table_rows(&raw, &strings(&["latency"]), &strings(&["host", "region"])).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, json!({"host": "a", "region": "us"}).as_object().unwrap().clone());
        assert_eq!(rows[0].metrics["latency"], 12.5);
        assert_eq!(rows[0].count, json!(4));
        assert_eq!(rows[1].id.get("region"), None);
        assert!(rows[1].metrics["latency"].is_nan());
    }

    #[test]
    fn test_table_row_serialization_shape() {
        let raw = json!([{"host": "a", "latency": 3, "Count": 2}]);
        let rows = marshal_table_rows(&raw, &strings(&["latency"]), &strings(&["host"])).unwrap();
        assert_eq!(
            serde_json::to_value(&rows).unwrap(),
            json!([{"_id": {"host": "a"}, "latency": 3.0, "count": 2}])
        );
    }

    #[test]
    fn test_metric_named_like_output_keys_is_skipped() {
        let raw = json!([{"host": "a", "count": "9", "_id": "7", "latency": 1, "Count": 2}]);
        let rows = marshal_table_rows(
            &raw,
            &strings(&["count", "_id", "latency"]),
            &strings(&["host"]),
        )
        .unwrap();

        assert_eq!(rows[0].metrics.keys().collect::<Vec<_>>(), vec!["latency"]);
        let text = serde_json::to_string(&rows).unwrap();
        assert_eq!(text.matches("\"count\"").count(), 1, "{text}");
        assert_eq!(text.matches("\"_id\"").count(), 1, "{text}");
        assert_eq!(
            serde_json::to_value(&rows).unwrap(),
            json!([{"_id": {"host": "a"}, "latency": 1.0, "count": 2}])
        );
    }

    #[test]
    fn test_nan_metric_serializes_as_null() {
        let raw = json!([{"latency": "oops", "Count": 1}]);
        let rows = marshal_table_rows(&raw, &strings(&["latency"]), &[]).unwrap();
        let text = serde_json::to_string(&rows).unwrap();
        assert!(text.contains("\"latency\":null"), "{text}");
    }

    #[test]
    fn test_time_rows_ordered_numerically() {
        let raw = json!({
            "7200": [{"host": "a", "Count": 2}],
            "600": [{"host": "a", "Count": 1}, {"host": "b", "Count": 5}]
        });

        let rows = marshal_time_rows(&raw, &[], &strings(&["host"])).unwrap();

        let buckets: Vec<_> = rows.iter().map(|r| r.id[TIME_BUCKET_KEY].clone()).collect();
        assert_eq!(buckets, vec![json!(600), json!(600), json!(7200)]);
        assert_eq!(rows[1].id["host"], json!("b"));
        assert_eq!(rows[1].count, json!(5));
    }

    #[test]
    fn test_time_rows_reject_array_output() {
        let err = marshal_time_rows(&json!([1, 2]), &[], &[]).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn test_dist_rows_split_count_across_labels() {
        let raw = json!([
            {"host": "a", "browser": ["chrome", "firefox", "safari", "edge"], "Count": 10}
        ]);

        let rows = marshal_dist_rows(&raw, &strings(&["browser"]), &strings(&["host"])).unwrap();

        assert_eq!(rows.len(), 4);
        for (row, label) in rows.iter().zip(["chrome", "firefox", "safari", "edge"]) {
            assert_eq!(row.count.as_f64(), Some(2.5));
            assert_eq!(row.id["browser"], json!(label));
            assert_eq!(row.id["host"], json!("a"));
            assert!(row.metrics.is_empty());
        }
    }

    #[test]
    fn test_dist_rows_without_labels() {
        let raw = json!([{"browser": "chrome", "Count": 3}, {"Count": 1}]);
        assert!(marshal_dist_rows(&raw, &strings(&["browser"]), &[]).unwrap().is_empty());
        assert!(marshal_dist_rows(&raw, &[], &[]).unwrap().is_empty());
    }

    #[test]
    fn test_samples_classified_per_value() {
        let raw = json!([
            {"status": "42", "path": "/a", "size": 7},
            {"status": "42a", "path": "/b", "gone": null}
        ]);

        let samples = marshal_samples(&raw).unwrap();

        assert_eq!(samples[0].integer["status"], 42);
        assert_eq!(samples[0].integer["size"], 7);
        assert_eq!(samples[0].string["path"], "/a");
        assert_eq!(samples[1].string["status"], "42a");
        assert!(!samples[1].integer.contains_key("status"));
        assert!(!samples[1].string.contains_key("gone"));
    }

    #[test]
    fn test_samples_fractional_and_out_of_range_numbers() {
        let raw = json!([{
            "ratio": 3.5,
            "neg": -2.9,
            "huge": 18446744073709551615u64,
            "far": 1e300,
            "big_text": "99999999999999999999",
            "frac_text": "3.5"
        }]);

        let samples = marshal_samples(&raw).unwrap();

        assert_eq!(samples[0].integer["ratio"], 3);
        assert_eq!(samples[0].integer["neg"], -2);
        assert_eq!(samples[0].string["huge"], "18446744073709551615");
        assert!(samples[0].string.contains_key("far"));
        assert_eq!(samples[0].string["big_text"], "99999999999999999999");
        assert_eq!(samples[0].string["frac_text"], "3.5");
        assert_eq!(samples[0].integer.len(), 2);
    }

    #[test]
    fn test_null_output_is_empty() {
        assert!(marshal_table_rows(&Value::Null, &[], &[]).unwrap().is_empty());
        assert!(marshal_samples(&Value::Null).unwrap().is_empty());
    }

    #[test]
    fn test_non_object_row_is_protocol_error() {
        let err = marshal_table_rows(&json!([1]), &[], &[]).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn test_parse_float_prefix() {
        assert_eq!(parse_float(Some(&json!("12.5ms"))), 12.5);
        assert_eq!(parse_float(Some(&json!("  -3e2x"))), -300.0);
        assert_eq!(parse_float(Some(&json!(".5"))), 0.5);
        assert_eq!(parse_float(Some(&json!("7."))), 7.0);
        assert_eq!(parse_float(Some(&json!("Infinity"))), f64::INFINITY);
        assert!(parse_float(Some(&json!("abc"))).is_nan());
        assert!(parse_float(Some(&json!("."))).is_nan());
        assert!(parse_float(Some(&json!(true))).is_nan());
        assert!(parse_float(None).is_nan());
    }

    #[test]
    fn test_parse_int_prefix() {
        assert_eq!(parse_int("3600"), Some(3600));
        assert_eq!(parse_int("-5s"), Some(-5));
        assert_eq!(parse_int("x"), None);
        assert_eq!(parse_int(""), None);
    }
}
