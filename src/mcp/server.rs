//! Minimal MCP responder behind the bridge
//!
//! Answers `initialize` and `ping` and rejects everything else with `Method not found`.
//! It replies through the bridge from the message handler, the same path a full protocol
//! engine takes.

use async_trait::async_trait;
use rust_mcp_sdk::schema::{Implementation, InitializeResult, ProtocolVersion, ServerCapabilities};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::{
    bridge::Bridge,
    mcp::rpc::{
        error_data, rpc_error, Message, RequestId, RpcError, INTERNAL_ERROR, INVALID_PARAMS,
        METHOD_NOT_FOUND,
    },
    registry::MessageHandler,
};

pub const SUPPORTED_PROTOCOL_VERSION: &str = "2024-11-05";

pub struct ReferenceEngine {
    bridge: Bridge,
}

impl ReferenceEngine {
    pub fn new(bridge: Bridge) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl MessageHandler for ReferenceEngine {
    async fn handle_message(&self, message: Message) {
        let (id, method, params) = match message {
            Message::Request { id, method, params } => (id, method, params),
            other => {
                debug!(method = ?other.method(), "ignoring message that expects no reply");
                return;
            }
        };

        let reply = handle_request(id.clone(), &method, params.as_ref());
        info!(
            method = %method,
            outcome = if matches!(reply, Message::Error { .. }) { "failure" } else { "success" },
            "mcp action handled"
        );

        if let Err(err) = self.bridge.send(reply) {
            warn!(id = ?id, error = %err, "mcp reply dropped");
        }
    }
}

pub fn handle_request(id: RequestId, method: &str, params: Option<&Value>) -> Message {
    match method {
        "initialize" => match initialize_result(params) {
            Ok(result) => Message::response(id, result),
            Err(error) => Message::Error {
                id: Some(id),
                error,
            },
        },
        "ping" => Message::response(id, json!({})),
        _ => Message::error(Some(id), METHOD_NOT_FOUND, "Method not found"),
    }
}

fn initialize_result(params: Option<&Value>) -> Result<Value, RpcError> {
    let protocol_version = negotiate_protocol_version(params)?;

    let result = InitializeResult {
        server_info: Implementation {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            title: None,
            description: None,
            icons: vec![],
            website_url: None,
        },
        capabilities: ServerCapabilities::default(),
        protocol_version: protocol_version.into(),
        instructions: None,
        meta: None,
    };

    serde_json::to_value(result)
        .map_err(|_| rpc_error(INTERNAL_ERROR, "Internal error", None))
}

pub fn negotiate_protocol_version(params: Option<&Value>) -> Result<ProtocolVersion, RpcError> {
    let offered_version = params
        .and_then(Value::as_object)
        .and_then(|object| object.get("protocolVersion"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|version| !version.is_empty())
        .ok_or_else(|| {
            rpc_error(
                INVALID_PARAMS,
                "Invalid params",
                Some(error_data(
                    "invalid_protocol_version",
                    "initialize params.protocolVersion is required",
                )),
            )
        })?;

    if offered_version != SUPPORTED_PROTOCOL_VERSION {
        return Err(rpc_error(
            INVALID_PARAMS,
            "Invalid params",
            Some(error_data(
                "unsupported_protocol_version",
                "unsupported initialize protocolVersion",
            )),
        ));
    }

    Ok(ProtocolVersion::V2024_11_05)
}
