//! Mutations: `[<column>, <mutator>, <value>]`

use std::fmt;

use serde_json::{json, Value as Json};

use crate::notation::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mutator {
    Sum,
    Difference,
    Product,
    Quotient,
    Remainder,
    Insert,
    Delete,
}

impl Mutator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mutator::Sum => "+=",
            Mutator::Difference => "-=",
            Mutator::Product => "*=",
            Mutator::Quotient => "/=",
            Mutator::Remainder => "%=",
            Mutator::Insert => "insert",
            Mutator::Delete => "delete",
        }
    }
}

impl fmt::Display for Mutator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One mutation of a `mutate` operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub column: String,
    pub mutator: Mutator,
    pub value: Value,
}

impl Mutation {
    pub fn new(column: impl Into<String>, mutator: Mutator, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            mutator,
            value: value.into(),
        }
    }

    /// Add elements to a set or map column
    pub fn insert(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, Mutator::Insert, value)
    }

    /// Remove elements (or map keys) from a set or map column
    pub fn delete(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, Mutator::Delete, value)
    }

    pub fn to_wire(&self) -> Json {
        json!([self.column, self.mutator.as_str(), self.value.to_wire()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mutation_wire_form() {
        let m = Mutation::insert("bridges", Value::set([Value::named_uuid("br")]));
        assert_eq!(
            m.to_wire(),
            json!(["bridges", "insert", ["set", [["named-uuid", "br"]]]])
        );
        assert_eq!(
            Mutation::new("n", Mutator::Sum, 1i64).to_wire(),
            json!(["n", "+=", 1])
        );
    }
}
