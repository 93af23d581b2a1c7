//! JSON-RPC 1.0 protocol types
//!
//! OVSDB speaks JSON-RPC 1.0: there is no `"jsonrpc"` member, requests and
//! notifications differ only by a null `id`, and responses always carry both
//! `result` and `error` (one of them null).

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{JsonRpcError, Result};

/// Connection-scoped request identifier
pub type RequestId = u64;

/// JSON-RPC 1.0 request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub method: String,
    #[serde(default)]
    pub params: Value,
    pub id: Value,
}

impl JsonRpcRequest {
    /// Create a request with a numeric id
    pub fn new(method: impl Into<String>, params: Value, id: RequestId) -> Self {
        Self {
            method: method.into(),
            params,
            id: json!(id),
        }
    }
}

/// JSON-RPC 1.0 notification (a request whose id is null)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub method: String,
    #[serde(default)]
    pub params: Value,
    pub id: Value,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
            id: Value::Null,
        }
    }
}

/// JSON-RPC 1.0 response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub error: Value,
    pub id: Value,
}

impl JsonRpcResponse {
    /// Create a success response
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            result,
            error: Value::Null,
            id,
        }
    }

    /// Create an error response
    pub fn error(id: Value, error: impl Into<String>) -> Self {
        Self {
            result: Value::Null,
            error: Value::String(error.into()),
            id,
        }
    }

    /// The numeric request id, if the peer echoed one back
    pub fn request_id(&self) -> Option<RequestId> {
        self.id.as_u64()
    }

    /// Convert into the caller-facing outcome: a non-null `error` wins
    pub fn into_result(self) -> Result<Value> {
        if self.error.is_null() {
            Ok(self.result)
        } else {
            Err(JsonRpcError::Remote(self.error))
        }
    }
}

/// A classified inbound frame
#[derive(Debug, Clone)]
pub enum Incoming {
    /// Reply to one of our calls
    Response(JsonRpcResponse),
    /// Request from the peer that expects a reply (e.g. `echo`)
    Request(JsonRpcRequest),
    /// Unsolicited notification (e.g. `update`)
    Notification(JsonRpcNotification),
}

/// Classify a decoded frame.
///
/// Anything that is not an object carrying either `method` or a non-null
/// `id` with `result`/`error` is a protocol violation.
pub fn classify(frame: Value) -> Result<Incoming> {
    let Value::Object(ref members) = frame else {
        return Err(JsonRpcError::ProtocolViolation(format!(
            "frame is not a JSON object: {}",
            frame
        )));
    };

    let id_is_null = members.get("id").is_none_or(Value::is_null);
    let has_method = members.get("method").is_some_and(Value::is_string);
    let has_outcome = members.contains_key("result") || members.contains_key("error");

    let incoming = if has_method && id_is_null {
        Incoming::Notification(serde_json::from_value(frame)?)
    } else if has_method {
        Incoming::Request(serde_json::from_value(frame)?)
    } else if has_outcome && !id_is_null {
        Incoming::Response(serde_json::from_value(frame)?)
    } else {
        return Err(JsonRpcError::ProtocolViolation(format!(
            "unrecognized JSON-RPC frame: {}",
            frame
        )));
    };

    Ok(incoming)
}
