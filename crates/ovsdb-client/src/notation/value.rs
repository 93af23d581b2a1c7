//! Atoms, sets and maps in RFC 7047 value notation
//!
//! Wire shapes:
//!
//! | value            | JSON                              |
//! |------------------|-----------------------------------|
//! | string/int/real/bool atom | bare JSON scalar         |
//! | uuid atom        | `["uuid", "<uuid>"]`              |
//! | named-uuid atom  | `["named-uuid", "<name>"]`        |
//! | set              | `["set", [<value>*]]`             |
//! | map              | `["map", [[<value>, <value>]*]]`  |
//!
//! Nothing else is accepted. In particular a bare `[]` is not an empty set.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value as Json};
use uuid::Uuid;

use crate::error::{OvsdbError, Result};

pub const UUID: &str = "uuid";
pub const NAMED_UUID: &str = "named-uuid";
pub const SET: &str = "set";
pub const MAP: &str = "map";

/// Placeholder for a row inserted earlier in the same transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NamedUuid(pub String);

impl NamedUuid {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NamedUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single scalar database value
#[derive(Debug, Clone)]
pub enum Atom {
    String(String),
    Integer(i64),
    Real(f64),
    Boolean(bool),
    Uuid(Uuid),
    NamedUuid(NamedUuid),
}

impl Atom {
    /// Encode to wire JSON.
    ///
    /// Non-finite reals have no JSON form and encode as `null`.
    pub fn to_wire(&self) -> Json {
        match self {
            Atom::String(s) => Json::String(s.clone()),
            Atom::Integer(i) => json!(i),
            Atom::Real(r) => serde_json::Number::from_f64(*r).map_or(Json::Null, Json::Number),
            Atom::Boolean(b) => Json::Bool(*b),
            Atom::Uuid(uuid) => json!([UUID, uuid.to_string()]),
            Atom::NamedUuid(name) => json!([NAMED_UUID, name.as_str()]),
        }
    }

    /// Name of the atomic type this atom carries
    pub fn type_name(&self) -> &'static str {
        match self {
            Atom::String(_) => "string",
            Atom::Integer(_) => "integer",
            Atom::Real(_) => "real",
            Atom::Boolean(_) => "boolean",
            Atom::Uuid(_) => "uuid",
            Atom::NamedUuid(_) => "named-uuid",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Atom::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Atom::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            Atom::Uuid(uuid) => Some(*uuid),
            _ => None,
        }
    }
}

// Reals compare by bit pattern so atoms can be hashed and used as keys.
impl PartialEq for Atom {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Atom::String(a), Atom::String(b)) => a == b,
            (Atom::Integer(a), Atom::Integer(b)) => a == b,
            (Atom::Real(a), Atom::Real(b)) => a.to_bits() == b.to_bits(),
            (Atom::Boolean(a), Atom::Boolean(b)) => a == b,
            (Atom::Uuid(a), Atom::Uuid(b)) => a == b,
            (Atom::NamedUuid(a), Atom::NamedUuid(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Atom {}

impl Hash for Atom {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Atom::String(s) => s.hash(state),
            Atom::Integer(i) => i.hash(state),
            Atom::Real(r) => r.to_bits().hash(state),
            Atom::Boolean(b) => b.hash(state),
            Atom::Uuid(uuid) => uuid.hash(state),
            Atom::NamedUuid(name) => name.hash(state),
        }
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Atom::String(s) => write!(f, "{:?}", s),
            Atom::Integer(i) => write!(f, "{}", i),
            Atom::Real(r) => write!(f, "{}", r),
            Atom::Boolean(b) => write!(f, "{}", b),
            Atom::Uuid(uuid) => write!(f, "{}", uuid),
            Atom::NamedUuid(name) => write!(f, "@{}", name),
        }
    }
}

/// A database value: an atom, a set, or a map
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Atom(Atom),
    Set(Vec<Value>),
    Map(Vec<(Value, Value)>),
}

impl Value {
    /// Build a set from anything convertible to values
    pub fn set<I, V>(elements: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Value::Set(elements.into_iter().map(Into::into).collect())
    }

    /// Build a map from key/value pairs
    pub fn map<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Value>,
        V: Into<Value>,
    {
        Value::Map(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// An empty set
    pub fn empty_set() -> Self {
        Value::Set(Vec::new())
    }

    /// An empty map
    pub fn empty_map() -> Self {
        Value::Map(Vec::new())
    }

    pub fn uuid(uuid: Uuid) -> Self {
        Value::Atom(Atom::Uuid(uuid))
    }

    pub fn named_uuid(name: impl Into<String>) -> Self {
        Value::Atom(Atom::NamedUuid(NamedUuid::new(name)))
    }

    pub fn as_atom(&self) -> Option<&Atom> {
        match self {
            Value::Atom(atom) => Some(atom),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&[Value]> {
        match self {
            Value::Set(elements) => Some(elements),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Map(pairs) => Some(pairs),
            _ => None,
        }
    }

    /// Short description of the value's shape, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Atom(atom) => atom.type_name(),
            Value::Set(_) => "set",
            Value::Map(_) => "map",
        }
    }

    /// Encode to wire JSON
    pub fn to_wire(&self) -> Json {
        match self {
            Value::Atom(atom) => atom.to_wire(),
            Value::Set(elements) => {
                let elements: Vec<Json> = elements.iter().map(Value::to_wire).collect();
                json!([SET, elements])
            }
            Value::Map(pairs) => {
                let pairs: Vec<Json> = pairs
                    .iter()
                    .map(|(k, v)| json!([k.to_wire(), v.to_wire()]))
                    .collect();
                json!([MAP, pairs])
            }
        }
    }

    /// Decode from wire JSON without schema information
    pub fn from_wire(json: &Json) -> Result<Self> {
        match json {
            Json::String(s) => Ok(Value::Atom(Atom::String(s.clone()))),
            Json::Bool(b) => Ok(Value::Atom(Atom::Boolean(*b))),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Value::Atom(Atom::Integer(i)))
                } else if let Some(r) = n.as_f64() {
                    Ok(Value::Atom(Atom::Real(r)))
                } else {
                    Err(OvsdbError::malformed(format!("number out of range: {}", n)))
                }
            }
            Json::Array(items) => decode_tagged(items),
            Json::Null => Err(OvsdbError::malformed("null is not a value")),
            Json::Object(_) => Err(OvsdbError::malformed(format!(
                "object is not a value: {}",
                json
            ))),
        }
    }
}

fn decode_tagged(items: &[Json]) -> Result<Value> {
    let [Json::String(tag), body] = items else {
        return Err(OvsdbError::malformed(format!(
            "expected a 2-element tagged array, got {}",
            Json::Array(items.to_vec())
        )));
    };

    match tag.as_str() {
        UUID => {
            let text = body
                .as_str()
                .ok_or_else(|| OvsdbError::malformed(format!("uuid body is not a string: {}", body)))?;
            let uuid = Uuid::parse_str(text)
                .map_err(|e| OvsdbError::malformed(format!("invalid uuid {:?}: {}", text, e)))?;
            Ok(Value::Atom(Atom::Uuid(uuid)))
        }
        NAMED_UUID => {
            let name = body.as_str().ok_or_else(|| {
                OvsdbError::malformed(format!("named-uuid body is not a string: {}", body))
            })?;
            Ok(Value::named_uuid(name))
        }
        SET => {
            let elements = body
                .as_array()
                .ok_or_else(|| OvsdbError::malformed(format!("set body is not an array: {}", body)))?;
            let elements = elements
                .iter()
                .map(Value::from_wire)
                .collect::<Result<Vec<_>>>()?;
            Ok(Value::Set(elements))
        }
        MAP => {
            let pairs = body
                .as_array()
                .ok_or_else(|| OvsdbError::malformed(format!("map body is not an array: {}", body)))?;
            let pairs = pairs.iter().map(decode_pair).collect::<Result<Vec<_>>>()?;
            Ok(Value::Map(pairs))
        }
        other => Err(OvsdbError::malformed(format!("unknown value tag: {:?}", other))),
    }
}

fn decode_pair(pair: &Json) -> Result<(Value, Value)> {
    match pair.as_array().map(Vec::as_slice) {
        Some([key, value]) => Ok((Value::from_wire(key)?, Value::from_wire(value)?)),
        _ => Err(OvsdbError::malformed(format!(
            "map pair is not a 2-element array: {}",
            pair
        ))),
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_wire().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let json = Json::deserialize(deserializer)?;
        Value::from_wire(&json).map_err(D::Error::custom)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_wire())
    }
}

impl From<Atom> for Value {
    fn from(atom: Atom) -> Self {
        Value::Atom(atom)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Atom(Atom::String(s.to_string()))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Atom(Atom::String(s))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Atom(Atom::Integer(i))
    }
}

impl From<f64> for Value {
    fn from(r: f64) -> Self {
        Value::Atom(Atom::Real(r))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Atom(Atom::Boolean(b))
    }
}

impl From<Uuid> for Value {
    fn from(uuid: Uuid) -> Self {
        Value::uuid(uuid)
    }
}

impl From<NamedUuid> for Value {
    fn from(name: NamedUuid) -> Self {
        Value::Atom(Atom::NamedUuid(name))
    }
}
