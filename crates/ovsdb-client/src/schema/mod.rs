//! Schema model
//!
//! Column types with cardinality defaulting and validation, plus the table,
//! database and catalog aggregations built from `get_schema` replies. All of
//! it is immutable once parsed.

pub mod column_type;
pub mod database;

pub use column_type::{
    AtomicType, BaseConstraints, BaseType, MapMinDefault, Max, ParseOptions, RefType, Type,
    TypeKind,
};
pub use database::{ColumnSchema, DatabaseSchema, SchemaCatalog, TableSchema, IMPLICIT_COLUMNS};
