//! Transient write payload produced just before a record is committed

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Table holding dependent records
pub const SUBSCRIPTIONS_TABLE: &str = "subscriptions";

/// Parent reference column
pub const PARENT_FIELD: &str = "parent_order_id";

/// Owner reference column
pub const CUSTOMER_FIELD: &str = "customer_id";

/// Storage format of a column value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldFormat {
    Integer,
    Float,
    Text,
}

/// One table row about to be written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowDescriptor {
    pub table: String,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub formats: BTreeMap<String, FieldFormat>,
}

impl RowDescriptor {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            data: Map::new(),
            formats: BTreeMap::new(),
        }
    }

    /// Builder-style column setter
    pub fn with(mut self, field: &str, value: Value, format: FieldFormat) -> Self {
        self.data.insert(field.to_string(), value);
        self.formats.insert(field.to_string(), format);
        self
    }

    /// Field present and holding the empty sentinel (null, 0, "" or "0")
    ///
    /// An absent field is not considered empty; it is not part of this write.
    pub fn is_empty_ref(&self, field: &str) -> bool {
        match self.data.get(field) {
            None => false,
            Some(value) => is_sentinel(value),
        }
    }

    /// Positive integer id held by a field, if any
    pub fn ref_value(&self, field: &str) -> Option<i64> {
        self.data.get(field).and_then(parse_ref)
    }

    /// Overwrite a reference column with an integer id
    pub fn set_ref(&mut self, field: &str, id: i64) {
        self.data.insert(field.to_string(), Value::from(id));
        self.formats.insert(field.to_string(), FieldFormat::Integer);
    }
}

/// Ordered per-table rows for a single record write
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WritePayload {
    pub rows: Vec<RowDescriptor>,
}

impl WritePayload {
    pub fn new(rows: Vec<RowDescriptor>) -> Self {
        Self { rows }
    }

    /// Position of the first row for `table`
    pub fn position(&self, table: &str) -> Option<usize> {
        self.rows.iter().position(|row| row.table == table)
    }

    pub fn row(&self, table: &str) -> Option<&RowDescriptor> {
        self.rows.iter().find(|row| row.table == table)
    }
}

/// Why the record is being saved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveContext {
    Create,
    Update,
    /// Any other host save context; left untouched
    #[serde(other)]
    Other,
}

/// Kind of record behind a write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Subscription,
    Order,
    #[serde(other)]
    Other,
}

/// In-memory object being saved, as seen by write interceptors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub id: i64,
    pub kind: RecordKind,
    #[serde(default)]
    pub parent_id: Option<i64>,
    #[serde(default)]
    pub customer_id: Option<i64>,
}

fn is_sentinel(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Number(n) => n.as_i64() == Some(0) || n.as_f64() == Some(0.0),
        Value::String(s) => {
            let s = s.trim();
            s.is_empty() || s == "0"
        }
        _ => false,
    }
}

fn parse_ref(value: &Value) -> Option<i64> {
    let id = match value {
        Value::Number(n) => n.as_i64()?,
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    crate::model::non_empty(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sentinel_values() {
        let row = RowDescriptor::new(SUBSCRIPTIONS_TABLE)
            .with("a", json!(0), FieldFormat::Integer)
            .with("b", json!("0"), FieldFormat::Text)
            .with("c", json!(""), FieldFormat::Text)
            .with("d", Value::Null, FieldFormat::Integer)
            .with("e", json!(500), FieldFormat::Integer)
            .with("f", json!("500"), FieldFormat::Text);

        for field in ["a", "b", "c", "d"] {
            assert!(row.is_empty_ref(field), "{} should be empty", field);
        }
        assert!(!row.is_empty_ref("e"));
        assert!(!row.is_empty_ref("f"));
        assert!(!row.is_empty_ref("missing"));
    }

    #[test]
    fn test_unknown_tags_fall_back_to_other() {
        let context: SaveContext = serde_json::from_value(json!("delete")).unwrap();
        assert_eq!(context, SaveContext::Other);

        let candidate: CandidateRecord =
            serde_json::from_value(json!({ "id": 7, "kind": "product" })).unwrap();
        assert_eq!(candidate.kind, RecordKind::Other);
    }

    #[test]
    fn test_ref_value_parses_numbers_and_strings() {
        let row = RowDescriptor::new(SUBSCRIPTIONS_TABLE)
            .with(PARENT_FIELD, json!("500"), FieldFormat::Text)
            .with(CUSTOMER_FIELD, json!(0), FieldFormat::Integer);

        assert_eq!(row.ref_value(PARENT_FIELD), Some(500));
        assert_eq!(row.ref_value(CUSTOMER_FIELD), None);
    }

    #[test]
    fn test_set_ref_marks_integer_format() {
        let mut row = RowDescriptor::new(SUBSCRIPTIONS_TABLE)
            .with(PARENT_FIELD, json!("0"), FieldFormat::Text);
        row.set_ref(PARENT_FIELD, 500);

        assert_eq!(row.data[PARENT_FIELD], json!(500));
        assert_eq!(row.formats[PARENT_FIELD], FieldFormat::Integer);
    }

    #[test]
    fn test_payload_deserializes_from_row_array() {
        let payload: WritePayload = serde_json::from_value(json!([
            {"table": "meta", "data": {"k": "v"}, "formats": {"k": "text"}},
            {
                "table": "subscriptions",
                "data": {"parent_order_id": 0},
                "formats": {"parent_order_id": "integer"}
            }
        ]))
        .unwrap();

        assert_eq!(payload.rows.len(), 2);
        assert_eq!(payload.position(SUBSCRIPTIONS_TABLE), Some(1));
        assert!(payload.row("orders").is_none());
    }
}
