use std::{net::SocketAddr, time::Duration};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::mcp::rpc::{
    error_data, id_label, Message, RequestId, INTERNAL_ERROR, INVALID_REQUEST,
};

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("a request with id {} is already pending", id_label(.0))]
    DuplicateId(RequestId),
    #[error("no pending request for id {}", id_label(.0))]
    UnknownCorrelation(RequestId),
    #[error("a reply for id {} was already delivered", id_label(.0))]
    AlreadyDelivered(RequestId),
    #[error("only responses and errors carrying an id can be sent")]
    NotAReply,
    #[error("only POST method is supported")]
    MethodNotAllowed,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("failed to serialize response: {0}")]
    SerializationFailure(#[source] serde_json::Error),
    #[error("no message handler installed")]
    NoMessageHandler,
    #[error("message handler failed: {0}")]
    HandlerFailed(String),
    #[error("no reply for id {} within {after:?}", id_label(.id))]
    Timeout { id: RequestId, after: Duration },
    #[error("request cancelled")]
    Cancelled,
    #[error("transport closed")]
    TransportClosed,
    #[error("transport already started")]
    AlreadyStarted,
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub details: serde_json::Value,
}

impl BridgeError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::DuplicateId(_) => "duplicate_id",
            Self::UnknownCorrelation(_) => "unknown_correlation",
            Self::AlreadyDelivered(_) => "already_delivered",
            Self::NotAReply => "not_a_reply",
            Self::MethodNotAllowed => "method_not_allowed",
            Self::BadRequest(_) => "bad_request",
            Self::SerializationFailure(_) => "serialization_failure",
            Self::NoMessageHandler => "no_message_handler",
            Self::HandlerFailed(_) => "handler_failed",
            Self::Timeout { .. } => "timeout",
            Self::Cancelled => "cancelled",
            Self::TransportClosed => "transport_closed",
            Self::AlreadyStarted => "already_started",
            Self::Bind { .. } => "bind_failed",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::DuplicateId(_) => StatusCode::CONFLICT,
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::Cancelled | Self::TransportClosed => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Failures on our side of the boundary, as opposed to caller mistakes or
    /// waits that ended without a reply. These are reported to the error handler.
    pub fn is_internal(&self) -> bool {
        self.status() == StatusCode::INTERNAL_SERVER_ERROR
    }

    /// Renders the failure as a JSON-RPC error envelope for one item of a batch.
    pub fn to_rpc_error(&self, id: Option<RequestId>) -> Message {
        match self {
            Self::DuplicateId(_) | Self::BadRequest(_) => Message::error_with_data(
                id,
                INVALID_REQUEST,
                "Invalid Request",
                error_data(self.code(), &self.to_string()),
            ),
            _ if self.is_internal() => Message::error(id, INTERNAL_ERROR, "Internal error"),
            _ => Message::error_with_data(
                id,
                INTERNAL_ERROR,
                "Internal error",
                error_data(self.code(), &self.to_string()),
            ),
        }
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if self.is_internal() {
            tracing::error!(error = %self, "request failed with internal error");
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        (
            status,
            Json(ErrorResponse {
                code: self.code().to_string(),
                message,
                details: json!({}),
            }),
        )
            .into_response()
    }
}
