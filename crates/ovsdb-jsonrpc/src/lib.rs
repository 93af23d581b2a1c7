//! ovsdb-jsonrpc: JSON-RPC 1.0 transport for OVSDB
//!
//! This crate provides:
//! - JSON-RPC 1.0 request/response/notification types
//! - A newline-agnostic frame decoder for concatenated JSON objects
//! - `JsonRpcClient`, which multiplexes many in-flight calls over one byte
//!   stream, answers peer `echo` requests and hands notifications to a
//!   `NotificationHandler`

pub mod client;
pub mod config;
pub mod error;
pub mod framing;
pub mod protocol;

pub use client::{
    ConnectionState, IgnoreNotifications, JsonRpcClient, NotificationHandler, PendingCallInfo,
    ResponseFuture,
};
pub use config::TransportConfig;
pub use error::{JsonRpcError, Result};
pub use protocol::RequestId;

/// Prelude for convenient imports
pub mod prelude {
    pub use super::client::{ConnectionState, JsonRpcClient, NotificationHandler};
    pub use super::config::TransportConfig;
    pub use super::error::JsonRpcError;
    pub use super::protocol::{JsonRpcRequest, JsonRpcResponse};
}
