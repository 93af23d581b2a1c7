//! Table and database schemas as returned by `get_schema`

use std::collections::{BTreeMap, HashMap};

use serde_json::{Map, Value as Json};

use crate::error::SchemaError;
use crate::notation::{Row, Value};
use crate::schema::column_type::{AtomicType, BaseType, ParseOptions, Type};

/// Columns every table has without declaring them
pub const IMPLICIT_COLUMNS: [&str; 2] = ["_uuid", "_version"];

/// A column declaration
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSchema {
    pub column_type: Type,
    pub ephemeral: bool,
    pub mutable: bool,
}

impl ColumnSchema {
    pub fn new(column_type: Type) -> Self {
        Self {
            column_type,
            ephemeral: false,
            mutable: true,
        }
    }

    pub fn from_json(json: &Json, options: &ParseOptions) -> Result<Self, SchemaError> {
        let members = object(json, "column")?;
        let raw_type = members
            .get("type")
            .ok_or_else(|| SchemaError::InvalidSchema("column without \"type\"".to_string()))?;

        Ok(Self {
            column_type: Type::from_json(raw_type, options)?,
            ephemeral: flag(members, "ephemeral", false)?,
            mutable: flag(members, "mutable", true)?,
        })
    }
}

/// A table declaration
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub name: String,
    pub columns: BTreeMap<String, ColumnSchema>,
    pub max_rows: Option<u64>,
    pub is_root: bool,
    pub indexes: Vec<Vec<String>>,
}

impl TableSchema {
    pub fn from_json(name: &str, json: &Json, options: &ParseOptions) -> Result<Self, SchemaError> {
        let members = object(json, "table")?;

        let raw_columns = members
            .get("columns")
            .and_then(Json::as_object)
            .ok_or_else(|| {
                SchemaError::InvalidSchema(format!("table {} has no \"columns\" object", name))
            })?;
        let mut columns = BTreeMap::new();
        for (column, raw) in raw_columns {
            let schema = ColumnSchema::from_json(raw, options)
                .map_err(|e| e.in_column(format!("{}.{}", name, column)))?;
            columns.insert(column.clone(), schema);
        }

        let max_rows = members
            .get("maxRows")
            .map(|v| {
                v.as_u64().ok_or_else(|| {
                    SchemaError::InvalidSchema(format!("{}.maxRows must be a positive integer", name))
                })
            })
            .transpose()?;

        let indexes = match members.get("indexes") {
            None => Vec::new(),
            Some(raw) => serde_json::from_value(raw.clone()).map_err(|e| {
                SchemaError::InvalidSchema(format!("{}.indexes: {}", name, e))
            })?,
        };

        Ok(Self {
            name: name.to_string(),
            columns,
            max_rows,
            is_root: flag(members, "isRoot", false)?,
            indexes,
        })
    }

    /// Look up a declared column
    pub fn column(&self, column: &str) -> Result<&ColumnSchema, SchemaError> {
        self.columns
            .get(column)
            .ok_or_else(|| SchemaError::UnknownColumn {
                table: self.name.clone(),
                column: column.to_string(),
            })
    }

    /// Type of a declared or implicit column
    pub fn column_type(&self, column: &str) -> Result<Type, SchemaError> {
        if IMPLICIT_COLUMNS.contains(&column) {
            return Ok(Type::scalar(BaseType::new(AtomicType::Uuid)));
        }
        Ok(self.column(column)?.column_type.clone())
    }

    /// Whether the column exists, counting `_uuid` and `_version`
    pub fn has_column(&self, column: &str) -> bool {
        IMPLICIT_COLUMNS.contains(&column) || self.columns.contains_key(column)
    }

    /// Check one value against its column
    pub fn validate_value(&self, column: &str, value: &Value) -> Result<(), SchemaError> {
        self.column_type(column)?
            .validate(value)
            .map_err(|e| e.in_column(column))
    }

    /// Check every column of a row
    pub fn validate_row(&self, row: &Row) -> Result<(), SchemaError> {
        row.columns()
            .try_for_each(|(column, value)| self.validate_value(column, value))
    }
}

/// A database schema
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseSchema {
    pub name: String,
    pub version: String,
    pub cksum: Option<String>,
    pub tables: BTreeMap<String, TableSchema>,
}

impl DatabaseSchema {
    /// Parse the result of `get_schema`
    pub fn from_json(json: &Json, options: &ParseOptions) -> Result<Self, SchemaError> {
        let members = object(json, "database schema")?;

        let text = |key: &str| members.get(key).and_then(Json::as_str).map(str::to_string);
        let name = text("name")
            .ok_or_else(|| SchemaError::InvalidSchema("schema without \"name\"".to_string()))?;

        let raw_tables = members
            .get("tables")
            .and_then(Json::as_object)
            .ok_or_else(|| SchemaError::InvalidSchema(format!("schema {} has no tables", name)))?;
        let tables = raw_tables
            .iter()
            .map(|(table, raw)| Ok((table.clone(), TableSchema::from_json(table, raw, options)?)))
            .collect::<Result<BTreeMap<_, _>, SchemaError>>()?;

        Ok(Self {
            // Pre-versioning schemas omit "version".
            version: text("version").unwrap_or_default(),
            cksum: text("cksum"),
            name,
            tables,
        })
    }

    /// Look up a table
    pub fn table(&self, table: &str) -> Result<&TableSchema, SchemaError> {
        self.tables
            .get(table)
            .ok_or_else(|| SchemaError::UnknownTable(table.to_string()))
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }
}

/// Schemas known to a client, by database name
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    databases: HashMap<String, DatabaseSchema>,
}

impl SchemaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a schema, replacing any previous version of the same database
    pub fn insert(&mut self, schema: DatabaseSchema) -> Option<DatabaseSchema> {
        self.databases.insert(schema.name.clone(), schema)
    }

    pub fn get(&self, database: &str) -> Option<&DatabaseSchema> {
        self.databases.get(database)
    }

    /// Look up a database, failing for unknown names
    pub fn database(&self, database: &str) -> Result<&DatabaseSchema, SchemaError> {
        self.get(database)
            .ok_or_else(|| SchemaError::UnknownDatabase(database.to_string()))
    }

    pub fn remove(&mut self, database: &str) -> Option<DatabaseSchema> {
        self.databases.remove(database)
    }

    pub fn len(&self) -> usize {
        self.databases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.databases.is_empty()
    }
}

fn object<'a>(json: &'a Json, what: &str) -> Result<&'a Map<String, Json>, SchemaError> {
    json.as_object()
        .ok_or_else(|| SchemaError::InvalidSchema(format!("{} must be an object", what)))
}

fn flag(members: &Map<String, Json>, key: &str, default: bool) -> Result<bool, SchemaError> {
    match members.get(key) {
        None => Ok(default),
        Some(Json::Bool(b)) => Ok(*b),
        Some(other) => Err(SchemaError::InvalidSchema(format!(
            "{} must be a boolean, got {}",
            key, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::column_type::{Max, TypeKind};
    use serde_json::json;

    fn bridge_schema() -> Json {
        json!({
            "name": "Open_vSwitch",
            "version": "8.3.0",
            "cksum": "3781850481 26690",
            "tables": {
                "Bridge": {
                    "columns": {
                        "name": {"type": "string", "mutable": false},
                        "ports": {"type": {"key": {"type": "uuid", "refTable": "Port"}, "min": 0, "max": "unlimited"}},
                        "external_ids": {"type": {"key": "string", "value": "string", "min": 0, "max": "unlimited"}},
                        "stp_enable": {"type": "boolean"}
                    },
                    "indexes": [["name"]],
                    "isRoot": true
                },
                "Port": {
                    "columns": {
                        "name": {"type": "string"},
                        "tag": {"type": {"key": {"type": "integer", "minInteger": 0, "maxInteger": 4095}, "min": 0, "max": 1}}
                    },
                    "maxRows": 100
                }
            }
        })
    }

    #[test]
    fn test_parse_database_schema() {
        let schema = DatabaseSchema::from_json(&bridge_schema(), &ParseOptions::default()).unwrap();
        assert_eq!(schema.name, "Open_vSwitch");
        assert_eq!(schema.version, "8.3.0");
        assert_eq!(schema.table_names().collect::<Vec<_>>(), vec!["Bridge", "Port"]);

        let bridge = schema.table("Bridge").unwrap();
        assert!(bridge.is_root);
        assert_eq!(bridge.indexes, vec![vec!["name".to_string()]]);
        assert!(!bridge.column("name").unwrap().mutable);
        assert_eq!(
            bridge.column("ports").unwrap().column_type.max(),
            Max::Unlimited
        );
        assert_eq!(
            bridge.column("external_ids").unwrap().column_type.kind(),
            TypeKind::Map
        );

        let port = schema.table("Port").unwrap();
        assert_eq!(port.max_rows, Some(100));
        assert_eq!(
            port.column("tag").unwrap().column_type.key().constraints.max_integer,
            Some(4095)
        );
    }

    #[test]
    fn test_unknown_names_are_errors() {
        let schema = DatabaseSchema::from_json(&bridge_schema(), &ParseOptions::default()).unwrap();
        assert!(matches!(
            schema.table("Mirror"),
            Err(SchemaError::UnknownTable(_))
        ));
        assert!(matches!(
            schema.table("Bridge").unwrap().column("mtu"),
            Err(SchemaError::UnknownColumn { .. })
        ));

        let mut catalog = SchemaCatalog::new();
        assert!(matches!(
            catalog.database("Open_vSwitch"),
            Err(SchemaError::UnknownDatabase(_))
        ));
        catalog.insert(schema);
        assert!(catalog.database("Open_vSwitch").is_ok());
    }

    #[test]
    fn test_validate_row() {
        let schema = DatabaseSchema::from_json(&bridge_schema(), &ParseOptions::default()).unwrap();
        let bridge = schema.table("Bridge").unwrap();

        let good = Row::new()
            .with("name", "br0")
            .with("ports", Value::empty_set())
            .with("external_ids", Value::map([("owner", "ops")]))
            .with("_uuid", Value::uuid(uuid::Uuid::nil()));
        assert!(bridge.validate_row(&good).is_ok());

        let wrong_type = Row::new().with("stp_enable", "yes");
        let err = bridge.validate_row(&wrong_type).unwrap_err();
        assert!(matches!(err, SchemaError::Column { ref column, .. } if column == "stp_enable"));

        let unknown = Row::new().with("mtu", 1500i64);
        assert!(matches!(
            bridge.validate_row(&unknown),
            Err(SchemaError::UnknownColumn { .. })
        ));
    }

    #[test]
    fn test_bad_column_type_names_the_column() {
        let raw = json!({
            "name": "db",
            "tables": {"T": {"columns": {"c": {"type": {"key": "string", "min": 3}}}}}
        });
        let err = DatabaseSchema::from_json(&raw, &ParseOptions::default()).unwrap_err();
        assert!(err.to_string().contains("T.c"), "{}", err);
    }
}
