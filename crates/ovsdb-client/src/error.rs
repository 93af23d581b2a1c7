//! OVSDB error types
//!
//! Value and schema errors are local to the call that produced them; only
//! `Rpc` errors that report a closed connection affect other work.

use ovsdb_jsonrpc::JsonRpcError;
use thiserror::Error;

/// Schema-level failures: bad type declarations, unknown names, and values
/// that do not fit their declared column type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Invalid type: {0}")]
    InvalidType(String),

    #[error("Invalid schema document: {0}")]
    InvalidSchema(String),

    #[error("Unrecognized base type: {0}")]
    UnknownBaseType(String),

    #[error("Cardinality violation: {count} element(s) outside [{min}, {max}]")]
    Cardinality { count: usize, min: u64, max: String },

    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("Unknown database: {0}")]
    UnknownDatabase(String),

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Unknown column '{column}' in table '{table}'")]
    UnknownColumn { table: String, column: String },

    #[error("Column '{column}': {source}")]
    Column {
        column: String,
        #[source]
        source: Box<SchemaError>,
    },
}

impl SchemaError {
    /// Create a type mismatch error
    pub fn mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        SchemaError::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Attribute an error to a column
    pub fn in_column(self, column: impl Into<String>) -> Self {
        SchemaError::Column {
            column: column.into(),
            source: Box::new(self),
        }
    }
}

/// Main error type for OVSDB client operations
#[derive(Error, Debug)]
pub enum OvsdbError {
    #[error("Malformed value: {0}")]
    MalformedValue(String),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("JSON-RPC error: {0}")]
    Rpc(#[from] JsonRpcError),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Monitor '{0}' is already registered")]
    DuplicateMonitor(String),

    #[error("OVSDB socket not found at {0}")]
    SocketNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, OvsdbError>;

impl OvsdbError {
    /// Create a malformed value error
    pub fn malformed(msg: impl Into<String>) -> Self {
        OvsdbError::MalformedValue(msg.into())
    }

    /// Create an unexpected response error
    pub fn unexpected(msg: impl Into<String>) -> Self {
        OvsdbError::UnexpectedResponse(msg.into())
    }

    /// Attribute a malformed value to the column that carried it
    pub fn in_column(self, column: &str) -> Self {
        match self {
            OvsdbError::MalformedValue(msg) => {
                OvsdbError::MalformedValue(format!("column '{}': {}", column, msg))
            }
            OvsdbError::Schema(err) => OvsdbError::Schema(err.in_column(column)),
            other => other,
        }
    }

    /// Returns true if the underlying connection is gone
    pub fn is_connection_closed(&self) -> bool {
        matches!(self, OvsdbError::Rpc(err) if err.is_connection_closed())
    }

    /// Returns true for errors produced by schema validation or lookup
    pub fn is_schema_error(&self) -> bool {
        matches!(self, OvsdbError::Schema(_))
    }

    /// Get a helpful suggestion for resolving this error
    pub fn suggestion(&self) -> &'static str {
        match self {
            OvsdbError::MalformedValue(_) => "Check the server speaks RFC 7047 value notation",
            OvsdbError::Schema(_) => "Refresh the schema with get_schema and check table/column names",
            OvsdbError::Rpc(err) if err.is_connection_closed() => {
                "Open a new connection; closed connections are never reused"
            }
            OvsdbError::Rpc(JsonRpcError::Timeout(_)) => "Increase the call timeout or check server load",
            OvsdbError::SocketNotFound(_) => {
                "Check if OVS is installed: apt install openvswitch-switch"
            }
            OvsdbError::DuplicateMonitor(_) => "Pick a monitor id that is not already in use",
            _ => "Check server logs for more details",
        }
    }
}
