//! Table and column metadata
//!
//! Column lists come from the query tool's `-info` output and are served
//! through a TTL cache that coalesces concurrent lookups per table.

mod cache;

pub use cache::{CacheStats, ColumnCache, Columns};

use crate::{Error, Result};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Column value type as reported by the query tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    pub type_str: ColumnType,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, type_str: ColumnType) -> Self {
        Self {
            name: name.into(),
            type_str,
        }
    }
}

/// A table identifier: a bare name or an object carrying `table_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TableRef {
    Name(String),
    Object { table_name: String },
}

impl TableRef {
    pub fn name(&self) -> &str {
        match self {
            TableRef::Name(name) => name,
            TableRef::Object { table_name } => table_name,
        }
    }

    /// The table name, or `MissingTable` when it is empty.
    pub fn require(&self) -> Result<&str> {
        let name = self.name();
        if name.is_empty() {
            Err(Error::MissingTable)
        } else {
            Ok(name)
        }
    }
}

impl From<&str> for TableRef {
    fn from(name: &str) -> Self {
        TableRef::Name(name.to_string())
    }
}

impl From<String> for TableRef {
    fn from(name: String) -> Self {
        TableRef::Name(name)
    }
}

/// Entry of the table listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    pub table_name: String,
}

/// Columns from `-info` output: integer columns first, then string columns.
pub fn parse_columns(info: &Value) -> Result<Vec<ColumnMeta>> {
    let columns = info
        .get("columns")
        .and_then(Value::as_object)
        .ok_or_else(|| Error::Protocol("info output has no columns object".to_string()))?;

    let named = |key: &str, type_str: ColumnType| {
        columns
            .get(key)
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .map(move |name| ColumnMeta::new(name, type_str))
    };

    Ok(named("ints", ColumnType::Integer)
        .chain(named("strs", ColumnType::String))
        .collect())
}

/// Table names from `-tables` output.
pub fn parse_tables(listing: &Value) -> Result<Vec<TableInfo>> {
    match listing {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => Ok(items
            .iter()
            .filter_map(Value::as_str)
            .map(|name| TableInfo {
                table_name: name.to_string(),
            })
            .collect()),
        _ => Err(Error::Protocol(
            "table listing is not an array".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_columns_ints_then_strs() {
        let info = json!({
            "columns": {"strs": ["host", "path"], "ints": ["time", "status"]},
            "count": 3253
        });
        let columns = parse_columns(&info).unwrap();
        assert_eq!(
            columns,
            vec![
                ColumnMeta::new("time", ColumnType::Integer),
                ColumnMeta::new("status", ColumnType::Integer),
                ColumnMeta::new("host", ColumnType::String),
                ColumnMeta::new("path", ColumnType::String),
            ]
        );
    }

    #[test]
    fn test_parse_columns_missing_group_is_empty() {
        let columns = parse_columns(&json!({"columns": {"ints": ["time"]}})).unwrap();
        assert_eq!(columns.len(), 1);
    }

    #[test]
    fn test_parse_columns_requires_columns() {
        let err = parse_columns(&json!({"count": 1})).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn test_column_meta_serialization() {
        let meta = ColumnMeta::new("host", ColumnType::String);
        assert_eq!(
            serde_json::to_value(&meta).unwrap(),
            json!({"name": "host", "type_str": "string"})
        );
    }

    #[test]
    fn test_table_ref_forms() {
        let bare: TableRef = serde_json::from_value(json!("events")).unwrap();
        let object: TableRef = serde_json::from_value(json!({"table_name": "events"})).unwrap();
        assert_eq!(bare.name(), "events");
        assert_eq!(object.name(), "events");
        assert!(matches!(TableRef::from("").require(), Err(Error::MissingTable)));
    }

    #[test]
    fn test_parse_tables() {
        let tables = parse_tables(&json!(["a", "b.c"])).unwrap();
        assert_eq!(tables[1].table_name, "b.c");
        assert!(parse_tables(&json!({"a": 1})).is_err());
    }
}
