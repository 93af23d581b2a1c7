//! Transact operations
//!
//! Operations are plain data. `encode` turns one into the JSON object the
//! server's dispatcher expects, `"op"` first. Validation is opt-in: pass a
//! schema to have tables, columns and row values checked before anything
//! goes on the wire.

use serde_json::{json, Map, Value as Json};

use crate::error::{Result, SchemaError};
use crate::notation::{Condition, Mutation, Row};
use crate::schema::{DatabaseSchema, TableSchema};

/// `until` of a `wait` operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitUntil {
    Equal,
    NotEqual,
}

impl WaitUntil {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitUntil::Equal => "==",
            WaitUntil::NotEqual => "!=",
        }
    }
}

/// One operation of a `transact` request
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Insert {
        table: String,
        row: Row,
        uuid_name: Option<String>,
    },
    Select {
        table: String,
        conditions: Vec<Condition>,
        columns: Option<Vec<String>>,
    },
    Update {
        table: String,
        conditions: Vec<Condition>,
        row: Row,
    },
    Mutate {
        table: String,
        conditions: Vec<Condition>,
        mutations: Vec<Mutation>,
    },
    Delete {
        table: String,
        conditions: Vec<Condition>,
    },
    Wait {
        table: String,
        /// Milliseconds; `None` retries indefinitely
        timeout: Option<u64>,
        conditions: Vec<Condition>,
        columns: Vec<String>,
        until: WaitUntil,
        rows: Vec<Row>,
    },
    Commit {
        durable: bool,
    },
    Abort,
    Comment {
        comment: String,
    },
    Assert {
        lock: String,
    },
}

impl Operation {
    pub fn insert(table: impl Into<String>, row: Row) -> Self {
        Operation::Insert {
            table: table.into(),
            row,
            uuid_name: None,
        }
    }

    /// Insert a row that later operations refer to as `["named-uuid", name]`
    pub fn insert_named(table: impl Into<String>, row: Row, uuid_name: impl Into<String>) -> Self {
        Operation::Insert {
            table: table.into(),
            row,
            uuid_name: Some(uuid_name.into()),
        }
    }

    pub fn select(table: impl Into<String>, conditions: Vec<Condition>) -> Self {
        Operation::Select {
            table: table.into(),
            conditions,
            columns: None,
        }
    }

    pub fn update(table: impl Into<String>, conditions: Vec<Condition>, row: Row) -> Self {
        Operation::Update {
            table: table.into(),
            conditions,
            row,
        }
    }

    pub fn mutate(
        table: impl Into<String>,
        conditions: Vec<Condition>,
        mutations: Vec<Mutation>,
    ) -> Self {
        Operation::Mutate {
            table: table.into(),
            conditions,
            mutations,
        }
    }

    pub fn delete(table: impl Into<String>, conditions: Vec<Condition>) -> Self {
        Operation::Delete {
            table: table.into(),
            conditions,
        }
    }

    pub fn comment(comment: impl Into<String>) -> Self {
        Operation::Comment {
            comment: comment.into(),
        }
    }

    /// The literal `"op"` tag
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Insert { .. } => "insert",
            Operation::Select { .. } => "select",
            Operation::Update { .. } => "update",
            Operation::Mutate { .. } => "mutate",
            Operation::Delete { .. } => "delete",
            Operation::Wait { .. } => "wait",
            Operation::Commit { .. } => "commit",
            Operation::Abort => "abort",
            Operation::Comment { .. } => "comment",
            Operation::Assert { .. } => "assert",
        }
    }

    /// Table this operation targets, if any
    pub fn table(&self) -> Option<&str> {
        match self {
            Operation::Insert { table, .. }
            | Operation::Select { table, .. }
            | Operation::Update { table, .. }
            | Operation::Mutate { table, .. }
            | Operation::Delete { table, .. }
            | Operation::Wait { table, .. } => Some(table),
            _ => None,
        }
    }

    /// Encode to the wire object, validating against `schema` when given
    pub fn encode(&self, schema: Option<&DatabaseSchema>) -> Result<Json> {
        if let Some(schema) = schema {
            self.validate(schema)?;
        }

        let mut op = Map::new();
        op.insert("op".to_string(), json!(self.name()));

        match self {
            Operation::Insert {
                table,
                row,
                uuid_name,
            } => {
                op.insert("table".to_string(), json!(table));
                op.insert("row".to_string(), row.to_wire());
                if let Some(name) = uuid_name {
                    op.insert("uuid-name".to_string(), json!(name));
                }
            }
            Operation::Select {
                table,
                conditions,
                columns,
            } => {
                op.insert("table".to_string(), json!(table));
                op.insert("where".to_string(), encode_conditions(conditions));
                if let Some(columns) = columns {
                    op.insert("columns".to_string(), json!(columns));
                }
            }
            Operation::Update {
                table,
                conditions,
                row,
            } => {
                op.insert("table".to_string(), json!(table));
                op.insert("where".to_string(), encode_conditions(conditions));
                op.insert("row".to_string(), row.to_wire());
            }
            Operation::Mutate {
                table,
                conditions,
                mutations,
            } => {
                op.insert("table".to_string(), json!(table));
                op.insert("where".to_string(), encode_conditions(conditions));
                let mutations: Vec<Json> = mutations.iter().map(Mutation::to_wire).collect();
                op.insert("mutations".to_string(), Json::Array(mutations));
            }
            Operation::Delete { table, conditions } => {
                op.insert("table".to_string(), json!(table));
                op.insert("where".to_string(), encode_conditions(conditions));
            }
            Operation::Wait {
                table,
                timeout,
                conditions,
                columns,
                until,
                rows,
            } => {
                if let Some(timeout) = timeout {
                    op.insert("timeout".to_string(), json!(timeout));
                }
                op.insert("table".to_string(), json!(table));
                op.insert("where".to_string(), encode_conditions(conditions));
                op.insert("columns".to_string(), json!(columns));
                op.insert("until".to_string(), json!(until.as_str()));
                let rows: Vec<Json> = rows.iter().map(Row::to_wire).collect();
                op.insert("rows".to_string(), Json::Array(rows));
            }
            Operation::Commit { durable } => {
                op.insert("durable".to_string(), json!(durable));
            }
            Operation::Abort => {}
            Operation::Comment { comment } => {
                op.insert("comment".to_string(), json!(comment));
            }
            Operation::Assert { lock } => {
                op.insert("lock".to_string(), json!(lock));
            }
        }

        Ok(Json::Object(op))
    }

    fn validate(&self, schema: &DatabaseSchema) -> Result<()> {
        let Some(table) = self.table() else {
            return Ok(());
        };
        let table = schema.table(table)?;

        match self {
            Operation::Insert { row, .. } | Operation::Update { row, .. } => {
                table.validate_row(row)?;
            }
            Operation::Select {
                conditions,
                columns,
                ..
            } => {
                check_conditions(table, conditions)?;
                if let Some(columns) = columns {
                    check_columns(table, columns)?;
                }
            }
            Operation::Mutate {
                conditions,
                mutations,
                ..
            } => {
                check_conditions(table, conditions)?;
                for mutation in mutations {
                    table.column(&mutation.column)?;
                }
            }
            Operation::Delete { conditions, .. } => check_conditions(table, conditions)?,
            Operation::Wait {
                conditions,
                columns,
                rows,
                ..
            } => {
                check_conditions(table, conditions)?;
                check_columns(table, columns)?;
                for row in rows {
                    table.validate_row(row)?;
                }
            }
            _ => {}
        }

        if let Operation::Update { row, .. } = self {
            for (column, _) in row.columns() {
                if !table.column(column)?.mutable {
                    return Err(SchemaError::InvalidType(format!(
                        "column {}.{} is immutable",
                        table.name, column
                    ))
                    .into());
                }
            }
        }

        Ok(())
    }
}

fn encode_conditions(conditions: &[Condition]) -> Json {
    Json::Array(conditions.iter().map(Condition::to_wire).collect())
}

fn check_conditions(table: &TableSchema, conditions: &[Condition]) -> Result<()> {
    for condition in conditions {
        table.column_type(&condition.column)?;
    }
    Ok(())
}

fn check_columns(table: &TableSchema, columns: &[String]) -> Result<()> {
    for column in columns {
        table.column_type(column)?;
    }
    Ok(())
}

/// Encode a whole transaction: `[<db-name>, <operation>*]`
pub fn transact_params(
    database: &str,
    operations: &[Operation],
    schema: Option<&DatabaseSchema>,
) -> Result<Json> {
    let mut params = Vec::with_capacity(operations.len() + 1);
    params.push(json!(database));
    for operation in operations {
        params.push(operation.encode(schema)?);
    }
    Ok(Json::Array(params))
}
