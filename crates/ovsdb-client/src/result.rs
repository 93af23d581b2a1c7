//! Decoding of `transact` replies

use serde_json::Value as Json;
use uuid::Uuid;

use crate::error::{OvsdbError, Result};
use crate::notation::{Row, Value};

/// Outcome of one operation in a transaction
#[derive(Debug, Clone, PartialEq)]
pub enum OperationResult {
    /// `insert`: the UUID of the new row
    Insert { uuid: Uuid },
    /// `select`: the matching rows
    Select { rows: Vec<Row> },
    /// `update`, `mutate`, `delete`: rows touched
    Count(u64),
    /// `wait`, `commit`, `abort`, `comment`, `assert`
    Empty,
    Error {
        error: String,
        details: Option<String>,
    },
    /// The server stopped before reaching this operation
    NotExecuted,
}

impl OperationResult {
    /// Decode one element of the result array
    pub fn from_wire(json: &Json) -> Result<Self> {
        let members = match json {
            Json::Null => return Ok(OperationResult::NotExecuted),
            Json::Object(members) => members,
            other => {
                return Err(OvsdbError::unexpected(format!(
                    "operation result is not an object: {}",
                    other
                )))
            }
        };

        if let Some(error) = members.get("error") {
            let error = error
                .as_str()
                .ok_or_else(|| OvsdbError::unexpected(format!("error is not a string: {}", error)))?;
            let details = members
                .get("details")
                .and_then(Json::as_str)
                .map(str::to_string);
            return Ok(OperationResult::Error {
                error: error.to_string(),
                details,
            });
        }

        if let Some(uuid) = members.get("uuid") {
            return match Value::from_wire(uuid)? {
                Value::Atom(atom) => atom
                    .as_uuid()
                    .map(|uuid| OperationResult::Insert { uuid })
                    .ok_or_else(|| OvsdbError::malformed(format!("insert result uuid: {}", atom))),
                other => Err(OvsdbError::malformed(format!(
                    "insert result uuid is a {}",
                    other.kind()
                ))),
            };
        }

        if let Some(rows) = members.get("rows") {
            let rows = rows
                .as_array()
                .ok_or_else(|| OvsdbError::unexpected("select rows is not an array"))?
                .iter()
                .map(Row::from_wire)
                .collect::<Result<Vec<_>>>()?;
            return Ok(OperationResult::Select { rows });
        }

        if let Some(count) = members.get("count") {
            let count = count
                .as_u64()
                .ok_or_else(|| OvsdbError::unexpected(format!("bad row count: {}", count)))?;
            return Ok(OperationResult::Count(count));
        }

        Ok(OperationResult::Empty)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, OperationResult::Error { .. })
    }

    /// Rows of a `select` result
    pub fn rows(&self) -> Option<&[Row]> {
        match self {
            OperationResult::Select { rows } => Some(rows),
            _ => None,
        }
    }
}

/// Decode the whole result array of a `transact` of `operations` operations.
///
/// The server may append one element beyond the operation count to report a
/// failure at commit time; it is decoded like any other element.
pub fn decode_transact_result(json: &Json, operations: usize) -> Result<Vec<OperationResult>> {
    let elements = json
        .as_array()
        .ok_or_else(|| OvsdbError::unexpected(format!("transact result is not an array: {}", json)))?;

    if elements.len() < operations || elements.len() > operations + 1 {
        return Err(OvsdbError::unexpected(format!(
            "{} result(s) for {} operation(s)",
            elements.len(),
            operations
        )));
    }

    elements.iter().map(OperationResult::from_wire).collect()
}
