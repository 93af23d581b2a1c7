//! ovsdb-client: OVSDB (RFC 7047) client for Open vSwitch databases
//!
//! This crate provides:
//! - Value notation codec (atoms, sets, maps, UUIDs, rows)
//! - Schema model with column-type defaulting and validation
//! - Transact operations and result decoding
//! - Table monitors with in-order, per-subscription delivery
//! - `OvsdbClient`, a long-lived client over one multiplexed connection

pub mod client;
pub mod config;
pub mod error;
pub mod monitor;
pub mod notation;
pub mod operation;
pub mod result;
pub mod schema;

pub use client::OvsdbClient;
pub use config::OvsdbClientConfig;
pub use error::{OvsdbError, Result, SchemaError};
pub use monitor::{
    MonitorCallback, MonitorDispatcher, MonitorEvent, MonitorId, MonitorRequest, MonitorRequests,
    MonitorSelect, RowChange, RowUpdate, TableUpdate, TableUpdates,
};
pub use notation::{Atom, Condition, Function, Mutation, Mutator, NamedUuid, Row, Value};
pub use operation::{Operation, WaitUntil};
pub use result::OperationResult;
pub use schema::{DatabaseSchema, ParseOptions, SchemaCatalog, TableSchema, Type};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::client::OvsdbClient;
    pub use super::config::OvsdbClientConfig;
    pub use super::error::OvsdbError;
    pub use super::monitor::{MonitorEvent, MonitorRequest, RowChange};
    pub use super::notation::{Condition, Mutation, Row, Value};
    pub use super::operation::Operation;
    pub use super::result::OperationResult;
}
