//! Abstract query descriptions as clients submit them

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Time column used when the table metadata doesn't name one.
pub const DEFAULT_TIME_COLUMN: &str = "time";

/// Requested result shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    /// Flat grouped table
    #[default]
    Table,
    /// Time-bucketed series
    Time,
    /// Categorical distribution
    Hist,
    /// Raw typed samples
    Samples,
}

impl View {
    pub fn as_str(&self) -> &'static str {
        match self {
            View::Table => "table",
            View::Time => "time",
            View::Hist => "hist",
            View::Samples => "samples",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    #[serde(default)]
    pub view: View,
    #[serde(default)]
    pub opts: Option<QueryOpts>,
    #[serde(default)]
    pub meta: Option<QueryMeta>,
}

impl QuerySpec {
    pub fn new(view: View, opts: QueryOpts) -> Self {
        Self {
            view,
            opts: Some(opts),
            meta: None,
        }
    }

    pub fn with_time_col(mut self, time_col: impl Into<String>) -> Self {
        self.meta = Some(QueryMeta {
            metadata: Some(TableMetadata {
                time_col: Some(time_col.into()),
            }),
        });
        self
    }

    /// The table's time column, `"time"` when absent or empty.
    pub fn time_col(&self) -> &str {
        self.meta
            .as_ref()
            .and_then(|m| m.metadata.as_ref())
            .and_then(|m| m.time_col.as_deref())
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_TIME_COLUMN)
    }

    /// Grouping dimensions, empty when absent.
    pub fn dims(&self) -> &[String] {
        self.opts
            .as_ref()
            .and_then(|o| o.dims.as_deref())
            .unwrap_or(&[])
    }

    /// Aggregated columns, empty when absent.
    pub fn cols(&self) -> &[String] {
        self.opts.as_ref().map(|o| o.cols.as_slice()).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryOpts {
    #[serde(default)]
    pub dims: Option<Vec<String>>,
    #[serde(default)]
    pub cols: Vec<String>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub start_ms: Option<i64>,
    #[serde(default)]
    pub end_ms: Option<i64>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub time_bucket: Option<String>,
    #[serde(default)]
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryMeta {
    #[serde(default)]
    pub metadata: Option<TableMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableMetadata {
    #[serde(default)]
    pub time_col: Option<String>,
}

/// A filter on one column. Only the first condition is ever used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// `integer.<name>` or `string.<name>`
    pub column: String,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl Filter {
    pub fn new(column: impl Into<String>, op: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            conditions: vec![Condition {
                op: op.into(),
                value: value.into(),
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub op: String,
    #[serde(default)]
    pub value: Value,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected a string or number, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_client_spec() {
        let spec: QuerySpec = serde_json::from_value(json!({
            "view": "time",
            "opts": {
                "dims": ["host"],
                "cols": ["latency"],
                "filters": [
                    {"column": "string.host", "conditions": [{"op": "$regex", "value": "web"}]}
                ],
                "start_ms": 5000,
                "time_bucket": 3600,
                "limit": 10
            },
            "meta": {"metadata": {"time_col": "ts"}}
        }))
        .unwrap();

        assert_eq!(spec.view, View::Time);
        assert_eq!(spec.dims(), ["host".to_string()]);
        assert_eq!(spec.time_col(), "ts");
        let opts = spec.opts.unwrap();
        assert_eq!(opts.time_bucket.as_deref(), Some("3600"));
        assert_eq!(opts.filters[0].conditions[0].value, json!("web"));
    }

    #[test]
    fn test_missing_pieces_default() {
        let spec: QuerySpec = serde_json::from_value(json!({"view": "table"})).unwrap();
        assert!(spec.opts.is_none());
        assert!(spec.dims().is_empty());
        assert!(spec.cols().is_empty());
        assert_eq!(spec.time_col(), DEFAULT_TIME_COLUMN);
    }

    #[test]
    fn test_empty_time_col_falls_back() {
        let spec = QuerySpec::new(View::Table, QueryOpts::default()).with_time_col("");
        assert_eq!(spec.time_col(), "time");
    }

    #[test]
    fn test_unknown_view_rejected() {
        let err = serde_json::from_value::<QuerySpec>(json!({"view": "scatter"}));
        assert!(err.is_err());
    }
}
