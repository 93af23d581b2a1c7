//! Rows: column name to value

use std::collections::BTreeMap;

use serde_json::{Map, Value as Json};

use crate::error::{OvsdbError, Result};
use crate::notation::value::Value;

/// A database row. Decoding needs no schema.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    columns: BTreeMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style column setter
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.columns.insert(column.into(), value.into());
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.columns.insert(column.into(), value.into())
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn to_wire(&self) -> Json {
        let members: Map<String, Json> = self
            .columns
            .iter()
            .map(|(name, value)| (name.clone(), value.to_wire()))
            .collect();
        Json::Object(members)
    }

    /// Decode a row object. A malformed value fails the row with an error
    /// naming the offending column.
    pub fn from_wire(json: &Json) -> Result<Self> {
        let members = json
            .as_object()
            .ok_or_else(|| OvsdbError::malformed(format!("row is not an object: {}", json)))?;

        let mut columns = BTreeMap::new();
        for (name, raw) in members {
            let value = Value::from_wire(raw).map_err(|e| e.in_column(name))?;
            columns.insert(name.clone(), value);
        }
        Ok(Self { columns })
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_row_round_trip() {
        let row = Row::new()
            .with("name", "br0")
            .with("ports", Value::set([Value::named_uuid("p0")]))
            .with("external_ids", Value::empty_map());

        let wire = row.to_wire();
        assert_eq!(wire["name"], json!("br0"));
        assert_eq!(Row::from_wire(&wire).unwrap(), row);
    }

    #[test]
    fn test_malformed_column_is_attributed() {
        let wire = json!({"name": "br0", "ports": ["bogus", 1, 2]});
        let err = Row::from_wire(&wire).unwrap_err();
        assert!(err.to_string().contains("column 'ports'"), "{}", err);
    }

    #[test]
    fn test_row_must_be_object() {
        assert!(Row::from_wire(&json!(["name", "br0"])).is_err());
    }
}
