//! JSON-RPC 2.0 envelope representations
//!
//! Provides the wire-level message union carried across the bridge, and the request
//! identifier used to correlate a reply with the caller waiting for it.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

// Request identifiers are echoed back verbatim and are never generated or validated for
// uniqueness here: callers must not reuse an identifier while a request carrying it is
// still in flight on the same transport.
pub use rust_mcp_sdk::schema::{RequestId, RpcError};

pub const JSONRPC_VERSION: &str = "2.0";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

pub fn rpc_error(code: i64, message: &str, data: Option<Value>) -> RpcError {
    RpcError {
        code,
        data,
        message: message.to_string(),
    }
}

/// Renders an id the way it appears on the wire: integers bare, strings quoted.
pub fn id_label(id: &RequestId) -> String {
    match id {
        RequestId::Integer(value) => value.to_string(),
        RequestId::String(value) => format!("{value:?}"),
    }
}

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("unsupported jsonrpc version {0:?}")]
    UnsupportedVersion(String),
    #[error("method must not be empty")]
    EmptyMethod,
    #[error("id must be an integer or a string")]
    InvalidId,
    #[error("error member is not a valid error object")]
    InvalidError,
    #[error("envelope is neither a request, a notification nor a reply")]
    Ambiguous,
}

/// A single JSON-RPC message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawMessage", into = "RawMessage")]
pub enum Message {
    Request {
        id: RequestId,
        method: String,
        params: Option<Value>,
    },
    Notification {
        method: String,
        params: Option<Value>,
    },
    Response {
        id: RequestId,
        result: Value,
    },
    /// `id` is `None` only when the failing request's identifier could not be read.
    Error {
        id: Option<RequestId>,
        error: RpcError,
    },
}

impl Message {
    pub fn request(id: RequestId, method: impl Into<String>, params: Value) -> Self {
        Self::Request {
            id,
            method: method.into(),
            params: Some(params),
        }
    }

    pub fn notification(method: impl Into<String>) -> Self {
        Self::Notification {
            method: method.into(),
            params: None,
        }
    }

    pub fn response(id: RequestId, result: Value) -> Self {
        Self::Response { id, result }
    }

    pub fn error(id: Option<RequestId>, code: i64, message: &str) -> Self {
        Self::Error {
            id,
            error: rpc_error(code, message, None),
        }
    }

    pub fn error_with_data(id: Option<RequestId>, code: i64, message: &str, data: Value) -> Self {
        Self::Error {
            id,
            error: rpc_error(code, message, Some(data)),
        }
    }

    pub fn id(&self) -> Option<&RequestId> {
        match self {
            Self::Request { id, .. } | Self::Response { id, .. } => Some(id),
            Self::Error { id, .. } => id.as_ref(),
            Self::Notification { .. } => None,
        }
    }

    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request { method, .. } | Self::Notification { method, .. } => Some(method),
            Self::Response { .. } | Self::Error { .. } => None,
        }
    }

    pub fn is_reply(&self) -> bool {
        matches!(self, Self::Response { .. } | Self::Error { .. })
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::Request { id, method, params },
                Self::Request {
                    id: other_id,
                    method: other_method,
                    params: other_params,
                },
            ) => id == other_id && method == other_method && params == other_params,
            (
                Self::Notification { method, params },
                Self::Notification {
                    method: other_method,
                    params: other_params,
                },
            ) => method == other_method && params == other_params,
            (
                Self::Response { id, result },
                Self::Response {
                    id: other_id,
                    result: other_result,
                },
            ) => id == other_id && result == other_result,
            (
                Self::Error { id, error },
                Self::Error {
                    id: other_id,
                    error: other_error,
                },
            ) => {
                id == other_id
                    && error.code == other_error.code
                    && error.message == other_error.message
                    && error.data == other_error.data
            }
            _ => false,
        }
    }
}

/// Flat wire shape. `id`, `params` and `result` distinguish an explicit `null` from an
/// absent member, which is what separates a notification from a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawMessage {
    jsonrpc: String,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    method: Option<String>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    params: Option<Value>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<Value>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

fn value_to_request_id(value: Value) -> Result<RequestId, EnvelopeError> {
    match value {
        Value::String(id) => Ok(RequestId::String(id)),
        Value::Number(number) => number
            .as_i64()
            .map(RequestId::Integer)
            .ok_or(EnvelopeError::InvalidId),
        _ => Err(EnvelopeError::InvalidId),
    }
}

fn request_id_to_value(id: RequestId) -> Value {
    match id {
        RequestId::Integer(value) => Value::Number(value.into()),
        RequestId::String(value) => Value::String(value),
    }
}

fn value_to_rpc_error(value: Value) -> Result<RpcError, EnvelopeError> {
    serde_json::from_value(value).map_err(|_| EnvelopeError::InvalidError)
}

fn rpc_error_to_value(error: RpcError) -> Value {
    let mut object = Map::new();
    object.insert("code".to_string(), Value::Number(error.code.into()));
    object.insert("message".to_string(), Value::String(error.message));
    if let Some(data) = error.data {
        object.insert("data".to_string(), data);
    }
    Value::Object(object)
}

impl TryFrom<RawMessage> for Message {
    type Error = EnvelopeError;

    fn try_from(raw: RawMessage) -> Result<Self, EnvelopeError> {
        if raw.jsonrpc != JSONRPC_VERSION {
            return Err(EnvelopeError::UnsupportedVersion(raw.jsonrpc));
        }

        match (raw.method, raw.result, raw.error) {
            (Some(method), None, None) => {
                if method.trim().is_empty() {
                    return Err(EnvelopeError::EmptyMethod);
                }
                match raw.id {
                    None => Ok(Self::Notification {
                        method,
                        params: raw.params,
                    }),
                    Some(id) => Ok(Self::Request {
                        id: value_to_request_id(id)?,
                        method,
                        params: raw.params,
                    }),
                }
            }
            (None, Some(result), None) => {
                let id = raw.id.ok_or(EnvelopeError::InvalidId)?;
                Ok(Self::Response {
                    id: value_to_request_id(id)?,
                    result,
                })
            }
            (None, None, Some(error)) => {
                let id = match raw.id {
                    None | Some(Value::Null) => None,
                    Some(id) => Some(value_to_request_id(id)?),
                };
                Ok(Self::Error {
                    id,
                    error: value_to_rpc_error(error)?,
                })
            }
            _ => Err(EnvelopeError::Ambiguous),
        }
    }
}

impl From<Message> for RawMessage {
    fn from(message: Message) -> Self {
        let mut raw = RawMessage {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: None,
            params: None,
            result: None,
            error: None,
        };

        match message {
            Message::Request { id, method, params } => {
                raw.id = Some(request_id_to_value(id));
                raw.method = Some(method);
                raw.params = params;
            }
            Message::Notification { method, params } => {
                raw.method = Some(method);
                raw.params = params;
            }
            Message::Response { id, result } => {
                raw.id = Some(request_id_to_value(id));
                raw.result = Some(result);
            }
            Message::Error { id, error } => {
                raw.id = Some(id.map(request_id_to_value).unwrap_or(Value::Null));
                raw.error = Some(rpc_error_to_value(error));
            }
        }

        raw
    }
}

/// Decodes one envelope from an already-parsed JSON value.
pub fn decode_message(value: Value) -> Result<Message, serde_json::Error> {
    serde_json::from_value(value)
}

/// Structured `error.data` payload in the same shape the transport uses for HTTP errors.
pub fn error_data(code: &str, message: &str) -> Value {
    json!({
        "code": code,
        "message": message,
        "details": {}
    })
}
