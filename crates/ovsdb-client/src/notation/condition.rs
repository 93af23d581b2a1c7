//! `where` clauses: `[<column>, <function>, <value>]`

use std::fmt;

use serde_json::{json, Value as Json};

use crate::notation::value::Value;

/// Comparison function of a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    LessThan,
    LessThanOrEquals,
    Equals,
    NotEquals,
    GreaterThanOrEquals,
    GreaterThan,
    Includes,
    Excludes,
}

impl Function {
    pub fn as_str(&self) -> &'static str {
        match self {
            Function::LessThan => "<",
            Function::LessThanOrEquals => "<=",
            Function::Equals => "==",
            Function::NotEquals => "!=",
            Function::GreaterThanOrEquals => ">=",
            Function::GreaterThan => ">",
            Function::Includes => "includes",
            Function::Excludes => "excludes",
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One condition of a `where` clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub column: String,
    pub function: Function,
    pub value: Value,
}

impl Condition {
    pub fn new(column: impl Into<String>, function: Function, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            function,
            value: value.into(),
        }
    }

    /// `column == value`
    pub fn equals(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, Function::Equals, value)
    }

    /// `column != value`
    pub fn not_equals(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, Function::NotEquals, value)
    }

    /// `column includes value`
    pub fn includes(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, Function::Includes, value)
    }

    pub fn to_wire(&self) -> Json {
        json!([self.column, self.function.as_str(), self.value.to_wire()])
    }
}
