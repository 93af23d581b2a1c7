//! Column types: `<base-type>` and `<type>`
//!
//! A `<type>` is either a bare atomic-type string or an object:
//!
//! ```text
//! "key": <base-type>                 required
//! "value": <base-type>               optional
//! "min": <integer>                   optional
//! "max": <integer> or "unlimited"    optional
//! ```
//!
//! `min` and `max` default to 1. Without `value` the type is a scalar when
//! both are 1 and a set otherwise; with `value` it is a map.

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value as Json};

use crate::error::SchemaError;
use crate::notation::{Atom, Value};

/// The five atomic types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtomicType {
    String,
    Integer,
    Real,
    Boolean,
    Uuid,
}

impl AtomicType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AtomicType::String => "string",
            AtomicType::Integer => "integer",
            AtomicType::Real => "real",
            AtomicType::Boolean => "boolean",
            AtomicType::Uuid => "uuid",
        }
    }

    /// Whether `atom` is acceptable for a column of this type.
    ///
    /// Integers are accepted for reals (JSON does not distinguish `1` from
    /// `1.0`) and named UUIDs for UUIDs.
    pub fn accepts(&self, atom: &Atom) -> bool {
        matches!(
            (self, atom),
            (AtomicType::String, Atom::String(_))
                | (AtomicType::Integer, Atom::Integer(_))
                | (AtomicType::Real, Atom::Real(_) | Atom::Integer(_))
                | (AtomicType::Boolean, Atom::Boolean(_))
                | (AtomicType::Uuid, Atom::Uuid(_) | Atom::NamedUuid(_))
        )
    }
}

impl FromStr for AtomicType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(AtomicType::String),
            "integer" => Ok(AtomicType::Integer),
            "real" => Ok(AtomicType::Real),
            "boolean" => Ok(AtomicType::Boolean),
            "uuid" => Ok(AtomicType::Uuid),
            other => Err(SchemaError::UnknownBaseType(other.to_string())),
        }
    }
}

impl fmt::Display for AtomicType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strength of a UUID reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefType {
    Strong,
    Weak,
}

/// Optional per-type refinements. Carried as metadata; they do not affect
/// how values are encoded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BaseConstraints {
    pub enumeration: Option<Value>,
    pub min_integer: Option<i64>,
    pub max_integer: Option<i64>,
    pub min_real: Option<f64>,
    pub max_real: Option<f64>,
    pub min_length: Option<u64>,
    pub max_length: Option<u64>,
    pub ref_table: Option<String>,
    pub ref_type: Option<RefType>,
}

/// An atomic type plus its refinements
#[derive(Debug, Clone, PartialEq)]
pub struct BaseType {
    pub atomic: AtomicType,
    pub constraints: BaseConstraints,
}

impl BaseType {
    pub fn new(atomic: AtomicType) -> Self {
        Self {
            atomic,
            constraints: BaseConstraints::default(),
        }
    }

    /// A UUID reference into `table`
    pub fn reference(table: impl Into<String>) -> Self {
        Self {
            atomic: AtomicType::Uuid,
            constraints: BaseConstraints {
                ref_table: Some(table.into()),
                ..BaseConstraints::default()
            },
        }
    }

    /// Parse a `<base-type>`: an atomic-type string or an object with `type`
    pub fn from_json(json: &Json) -> Result<Self, SchemaError> {
        match json {
            Json::String(name) => Ok(Self::new(name.parse()?)),
            Json::Object(members) => {
                let atomic = members
                    .get("type")
                    .and_then(Json::as_str)
                    .ok_or_else(|| {
                        SchemaError::InvalidType(format!("base type without \"type\": {}", json))
                    })?
                    .parse()?;
                Ok(Self {
                    atomic,
                    constraints: parse_constraints(members)?,
                })
            }
            other => Err(SchemaError::InvalidType(format!(
                "base type must be a string or object: {}",
                other
            ))),
        }
    }

    fn check_atom(&self, value: &Value) -> Result<(), SchemaError> {
        match value.as_atom() {
            Some(atom) if self.atomic.accepts(atom) => Ok(()),
            _ => Err(SchemaError::mismatch(self.atomic.as_str(), value.kind())),
        }
    }
}

fn parse_constraints(members: &Map<String, Json>) -> Result<BaseConstraints, SchemaError> {
    let int = |key: &str| -> Result<Option<i64>, SchemaError> {
        members
            .get(key)
            .map(|v| {
                v.as_i64()
                    .ok_or_else(|| SchemaError::InvalidType(format!("{} must be an integer", key)))
            })
            .transpose()
    };
    let real = |key: &str| -> Result<Option<f64>, SchemaError> {
        members
            .get(key)
            .map(|v| {
                v.as_f64()
                    .ok_or_else(|| SchemaError::InvalidType(format!("{} must be a number", key)))
            })
            .transpose()
    };
    let length = |key: &str| -> Result<Option<u64>, SchemaError> {
        members
            .get(key)
            .map(|v| {
                v.as_u64().ok_or_else(|| {
                    SchemaError::InvalidType(format!("{} must be a non-negative integer", key))
                })
            })
            .transpose()
    };

    let enumeration = members
        .get("enum")
        .map(|v| {
            Value::from_wire(v)
                .map_err(|e| SchemaError::InvalidType(format!("enum: {}", e)))
        })
        .transpose()?;

    let ref_type = match members.get("refType").and_then(Json::as_str) {
        None => None,
        Some("strong") => Some(RefType::Strong),
        Some("weak") => Some(RefType::Weak),
        Some(other) => {
            return Err(SchemaError::InvalidType(format!("unknown refType: {}", other)));
        }
    };

    Ok(BaseConstraints {
        enumeration,
        min_integer: int("minInteger")?,
        max_integer: int("maxInteger")?,
        min_real: real("minReal")?,
        max_real: real("maxReal")?,
        min_length: length("minLength")?,
        max_length: length("maxLength")?,
        ref_table: members
            .get("refTable")
            .and_then(Json::as_str)
            .map(str::to_string),
        ref_type,
    })
}

/// Upper cardinality bound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Max {
    Limited(u64),
    Unlimited,
}

impl Max {
    fn admits(&self, count: usize) -> bool {
        match self {
            Max::Limited(max) => u64::try_from(count).is_ok_and(|count| count <= *max),
            Max::Unlimited => true,
        }
    }
}

impl fmt::Display for Max {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Max::Limited(max) => write!(f, "{}", max),
            Max::Unlimited => f.write_str("unlimited"),
        }
    }
}

/// What `min` defaults to for a map type that omits it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MapMinDefault {
    /// RFC 7047 reading: every omitted `min` is 1
    #[default]
    One,
    /// Lenient reading used by some servers: omitted map `min` is 0
    Zero,
}

impl MapMinDefault {
    fn value(self) -> u64 {
        match self {
            MapMinDefault::One => 1,
            MapMinDefault::Zero => 0,
        }
    }
}

impl FromStr for MapMinDefault {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "one" => Ok(MapMinDefault::One),
            "0" | "zero" => Ok(MapMinDefault::Zero),
            other => Err(format!("expected 0 or 1, got {:?}", other)),
        }
    }
}

/// Knobs for parsing schema documents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseOptions {
    pub map_min_default: MapMinDefault,
}

/// Shape of a column type after defaulting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Scalar,
    Set,
    Map,
}

/// A column type with `min`/`max` already defaulted and checked
#[derive(Debug, Clone, PartialEq)]
pub struct Type {
    key: BaseType,
    value: Option<BaseType>,
    min: u64,
    max: Max,
}

impl Type {
    /// Build a type, enforcing min ∈ {0, 1}, max ≥ 1 and max ≥ min
    pub fn new(key: BaseType, value: Option<BaseType>, min: u64, max: Max) -> Result<Self, SchemaError> {
        if min > 1 {
            return Err(SchemaError::InvalidType(format!(
                "min must be 0 or 1, got {}",
                min
            )));
        }
        if let Max::Limited(limit) = max {
            if limit < 1 {
                return Err(SchemaError::InvalidType(
                    "max must be at least 1 or \"unlimited\"".to_string(),
                ));
            }
            if limit < min {
                return Err(SchemaError::InvalidType(format!(
                    "max ({}) is less than min ({})",
                    limit, min
                )));
            }
        }
        Ok(Self { key, value, min, max })
    }

    /// Scalar of the given base type
    pub fn scalar(key: BaseType) -> Self {
        Self {
            key,
            value: None,
            min: 1,
            max: Max::Limited(1),
        }
    }

    /// Parse a `<type>`, applying defaults
    pub fn from_json(json: &Json, options: &ParseOptions) -> Result<Self, SchemaError> {
        let members = match json {
            Json::String(_) => return Ok(Self::scalar(BaseType::from_json(json)?)),
            Json::Object(members) => members,
            other => {
                return Err(SchemaError::InvalidType(format!(
                    "type must be a string or object: {}",
                    other
                )))
            }
        };

        let key = members
            .get("key")
            .ok_or_else(|| SchemaError::InvalidType(format!("type without \"key\": {}", json)))
            .and_then(BaseType::from_json)?;
        let value = members.get("value").map(BaseType::from_json).transpose()?;

        let min = match members.get("min") {
            None if value.is_some() => options.map_min_default.value(),
            None => 1,
            Some(raw) => raw.as_u64().ok_or_else(|| {
                SchemaError::InvalidType(format!("min must be a non-negative integer: {}", raw))
            })?,
        };

        let max = match members.get("max") {
            None => Max::Limited(1),
            Some(Json::String(s)) if s == "unlimited" => Max::Unlimited,
            Some(raw) => Max::Limited(raw.as_u64().ok_or_else(|| {
                SchemaError::InvalidType(format!(
                    "max must be a positive integer or \"unlimited\": {}",
                    raw
                ))
            })?),
        };

        Self::new(key, value, min, max)
    }

    pub fn key(&self) -> &BaseType {
        &self.key
    }

    pub fn value(&self) -> Option<&BaseType> {
        self.value.as_ref()
    }

    pub fn min(&self) -> u64 {
        self.min
    }

    pub fn max(&self) -> Max {
        self.max
    }

    pub fn kind(&self) -> TypeKind {
        match (&self.value, self.min, self.max) {
            (Some(_), _, _) => TypeKind::Map,
            (None, 1, Max::Limited(1)) => TypeKind::Scalar,
            (None, _, _) => TypeKind::Set,
        }
    }

    /// Check a decoded value against this type.
    ///
    /// A set column also accepts a bare atom, the 1-element shorthand.
    pub fn validate(&self, value: &Value) -> Result<(), SchemaError> {
        match self.kind() {
            TypeKind::Scalar => self.key.check_atom(value),
            TypeKind::Set => {
                let elements = match value {
                    Value::Set(elements) => elements.as_slice(),
                    Value::Atom(_) => std::slice::from_ref(value),
                    Value::Map(_) => {
                        return Err(SchemaError::mismatch(
                            format!("set of {}", self.key.atomic),
                            "map",
                        ))
                    }
                };
                self.check_count(elements.len())?;
                elements.iter().try_for_each(|e| self.key.check_atom(e))
            }
            TypeKind::Map => {
                let Value::Map(pairs) = value else {
                    return Err(SchemaError::mismatch("map", value.kind()));
                };
                self.check_count(pairs.len())?;
                let value_type = self.value.as_ref().unwrap_or(&self.key);
                pairs.iter().try_for_each(|(k, v)| {
                    self.key.check_atom(k)?;
                    value_type.check_atom(v)
                })
            }
        }
    }

    fn check_count(&self, count: usize) -> Result<(), SchemaError> {
        let above_min = u64::try_from(count).is_ok_and(|count| count >= self.min);
        if above_min && self.max.admits(count) {
            Ok(())
        } else {
            Err(SchemaError::Cardinality {
                count,
                min: self.min,
                max: self.max.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(json: Json) -> Result<Type, SchemaError> {
        Type::from_json(&json, &ParseOptions::default())
    }

    #[test]
    fn test_scalar_defaulting() {
        let ty = parse(json!({"key": "integer"})).unwrap();
        assert_eq!(ty.min(), 1);
        assert_eq!(ty.max(), Max::Limited(1));
        assert!(ty.value().is_none());
        assert_eq!(ty.kind(), TypeKind::Scalar);

        let bare = parse(json!("string")).unwrap();
        assert_eq!(bare.kind(), TypeKind::Scalar);
        assert_eq!(bare.key().atomic, AtomicType::String);
    }

    #[test]
    fn test_unbounded_set() {
        let ty = parse(json!({"key": "integer", "min": 0, "max": "unlimited"})).unwrap();
        assert_eq!(ty.kind(), TypeKind::Set);
        assert_eq!(ty.min(), 0);
        assert_eq!(ty.max(), Max::Unlimited);
    }

    #[test]
    fn test_optional_reference() {
        let ty = parse(json!({"key": {"type": "uuid", "refTable": "Port", "refType": "weak"}, "min": 0}))
            .unwrap();
        assert_eq!(ty.kind(), TypeKind::Set);
        assert_eq!(ty.key().constraints.ref_table.as_deref(), Some("Port"));
        assert_eq!(ty.key().constraints.ref_type, Some(RefType::Weak));
        assert_eq!(ty.key(), &{
            let mut base = BaseType::reference("Port");
            base.constraints.ref_type = Some(RefType::Weak);
            base
        });
    }

    #[test]
    fn test_invalid_cardinality_is_rejected() {
        for bad in [
            json!({"key": "string", "min": 2, "max": 3}),
            json!({"key": "string", "min": 0, "max": 0}),
            json!({"key": "string", "min": 1, "max": "lots"}),
            json!({"key": "string", "min": -1}),
        ] {
            assert!(
                matches!(parse(bad.clone()), Err(SchemaError::InvalidType(_))),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_unknown_base_type() {
        assert!(matches!(
            parse(json!({"key": "decimal"})),
            Err(SchemaError::UnknownBaseType(_))
        ));
        assert!(matches!(
            parse(json!({"key": {"type": "blob"}})),
            Err(SchemaError::UnknownBaseType(_))
        ));
    }

    #[test]
    fn test_map_min_default_is_explicit() {
        let raw = json!({"key": "string", "value": "string", "max": "unlimited"});

        let rfc = Type::from_json(&raw, &ParseOptions::default()).unwrap();
        assert_eq!(rfc.kind(), TypeKind::Map);
        assert_eq!(rfc.min(), 1);
        assert!(rfc.validate(&Value::empty_map()).is_err());

        let lenient = Type::from_json(
            &raw,
            &ParseOptions {
                map_min_default: MapMinDefault::Zero,
            },
        )
        .unwrap();
        assert_eq!(lenient.min(), 0);
        assert!(lenient.validate(&Value::empty_map()).is_ok());

        // An explicit min wins under either reading.
        let explicit = json!({"key": "string", "value": "string", "min": 0, "max": "unlimited"});
        assert_eq!(Type::from_json(&explicit, &ParseOptions::default()).unwrap().min(), 0);
    }

    #[test]
    fn test_map_cardinality_validation() {
        let three = Value::map([("a", 1i64), ("b", 2i64), ("c", 3i64)]);

        let bounded = parse(json!({"key": "string", "value": "integer", "min": 1, "max": 2})).unwrap();
        assert!(matches!(
            bounded.validate(&three),
            Err(SchemaError::Cardinality { count: 3, .. })
        ));

        let unbounded =
            parse(json!({"key": "string", "value": "integer", "min": 1, "max": "unlimited"})).unwrap();
        assert!(unbounded.validate(&three).is_ok());
    }

    #[test]
    fn test_map_pair_types_are_checked() {
        let ty = parse(json!({"key": "string", "value": "integer", "min": 0, "max": "unlimited"})).unwrap();
        let bad = Value::map([("a", "not-a-number")]);
        assert!(matches!(ty.validate(&bad), Err(SchemaError::TypeMismatch { .. })));
    }

    #[test]
    fn test_set_accepts_single_atom() {
        let ty = parse(json!({"key": "uuid", "min": 0, "max": "unlimited"})).unwrap();
        assert!(ty.validate(&Value::named_uuid("p")).is_ok());
        assert!(ty.validate(&Value::set([Value::named_uuid("p")])).is_ok());
        assert!(ty.validate(&Value::from("p")).is_err());

        let pair = parse(json!({"key": "integer", "min": 2, "max": 2}));
        assert!(pair.is_err());
    }

    #[test]
    fn test_scalar_validation() {
        let real = parse(json!("real")).unwrap();
        assert!(real.validate(&Value::from(1i64)).is_ok());
        assert!(real.validate(&Value::from(1.5)).is_ok());
        assert!(real.validate(&Value::set([1.5])).is_err());

        let boolean = parse(json!("boolean")).unwrap();
        assert!(boolean.validate(&Value::from("true")).is_err());
    }

    #[test]
    fn test_enum_constraint_is_kept() {
        let ty = parse(json!({"key": {"type": "string", "enum": ["set", ["secure", "standalone"]]}, "min": 0}))
            .unwrap();
        assert_eq!(
            ty.key().constraints.enumeration,
            Some(Value::set(["secure", "standalone"]))
        );
    }
}
