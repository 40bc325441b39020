//! Request/response adaptation shared by both transports
//!
//! Turns an HTTP method and body into a bridge submission, and the outcome back into a
//! status code and JSON body.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
};
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;

use crate::{
    bridge::Bridge,
    errors::BridgeError,
    mcp::rpc::{decode_message, Message},
};

/// Axum handler for a router whose state is the [`Bridge`] itself.
pub async fn bridge_endpoint(
    State(bridge): State<Bridge>,
    method: Method,
    body: Bytes,
) -> Response {
    bridge_request(&bridge, &method, &body).await
}

pub async fn bridge_request(bridge: &Bridge, method: &Method, body: &[u8]) -> Response {
    respond(bridge, dispatch(bridge, method, body).await)
}

/// What goes back to the client: one envelope, or the replies of a batch in order.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Reply {
    Single(Message),
    Batch(Vec<Message>),
}

fn respond<T: Serialize>(bridge: &Bridge, outcome: Result<Option<T>, BridgeError>) -> Response {
    let encoded = outcome.and_then(|reply| reply.map(|reply| encode(&reply)).transpose());
    match encoded {
        Ok(Some(encoded)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            encoded,
        )
            .into_response(),
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            if err.is_internal() {
                bridge.report_error(&err);
            }
            err.into_response()
        }
    }
}

async fn dispatch(
    bridge: &Bridge,
    method: &Method,
    body: &[u8],
) -> Result<Option<Reply>, BridgeError> {
    if *method != Method::POST {
        return Err(BridgeError::MethodNotAllowed);
    }
    if bridge.is_closed() {
        return Err(BridgeError::TransportClosed);
    }

    let payload: Value = serde_json::from_slice(body)
        .map_err(|err| BridgeError::BadRequest(format!("body is not valid JSON: {err}")))?;

    match payload {
        Value::Array(items) => dispatch_batch(bridge, items).await,
        single => {
            let message = decode(single)?;
            Ok(bridge.submit(message).await?.map(Reply::Single))
        }
    }
}

async fn dispatch_batch(
    bridge: &Bridge,
    items: Vec<Value>,
) -> Result<Option<Reply>, BridgeError> {
    if items.is_empty() {
        return Err(BridgeError::BadRequest("batch must not be empty".to_string()));
    }
    let messages = items
        .into_iter()
        .map(decode)
        .collect::<Result<Vec<_>, _>>()?;

    let replies = join_all(messages.into_iter().map(|message| async move {
        let id = match &message {
            Message::Request { id, .. } => Some(id.clone()),
            _ => None,
        };
        match bridge.submit(message).await {
            Ok(reply) => reply,
            Err(err) => {
                if err.is_internal() {
                    bridge.report_error(&err);
                }
                // Notifications never get an answer, not even an error.
                id.map(|id| err.to_rpc_error(Some(id)))
            }
        }
    }))
    .await;

    let replies: Vec<Message> = replies.into_iter().flatten().collect();
    if replies.is_empty() {
        return Ok(None);
    }
    Ok(Some(Reply::Batch(replies)))
}

fn decode(value: Value) -> Result<Message, BridgeError> {
    decode_message(value)
        .map_err(|err| BridgeError::BadRequest(format!("invalid JSON-RPC envelope: {err}")))
}

fn encode<T: Serialize + ?Sized>(reply: &T) -> Result<Vec<u8>, BridgeError> {
    serde_json::to_vec(reply).map_err(BridgeError::SerializationFailure)
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use http_body_util::BodyExt;
    use serde::ser::{Error as _, Serializer};
    use serde_json::json;

    use super::*;
    use crate::{bridge::BridgeConfig, mcp::rpc::RequestId};

    /// Reply payload whose serializer always fails.
    struct Unencodable;

    impl Serialize for Unencodable {
        fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(S::Error::custom("reply cannot be encoded"))
        }
    }

    fn bridge() -> Bridge {
        Bridge::new(BridgeConfig {
            reply_timeout: Duration::from_secs(5),
        })
    }

    async fn body_json(response: Response) -> Value {
        let body = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        serde_json::from_slice(&body).expect("valid json response")
    }

    #[tokio::test]
    async fn unencodable_reply_is_internal_error_and_reported() {
        let bridge = bridge();
        let reported = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = reported.clone();
        bridge.set_error_handler(Arc::new(move |err: &BridgeError| {
            sink.lock().push(err.code());
        }));

        let response = respond(&bridge, Ok(Some(Unencodable)));

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["code"], "serialization_failure");
        assert_eq!(body["message"], "internal server error");
        assert_eq!(*reported.lock(), vec!["serialization_failure"]);
    }

    #[tokio::test]
    async fn client_errors_are_not_reported() {
        let bridge = bridge();
        let reported = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = reported.clone();
        bridge.set_error_handler(Arc::new(move |err: &BridgeError| {
            sink.lock().push(err.code());
        }));

        let response = bridge_request(&bridge, &Method::POST, b"not json").await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(reported.lock().is_empty());
    }

    #[tokio::test]
    async fn single_reply_is_encoded_as_an_object() {
        let bridge = bridge();
        let reply = Reply::Single(Message::response(RequestId::Integer(1), json!({})));

        let response = respond(&bridge, Ok(Some(reply)));

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({"jsonrpc": "2.0", "id": 1, "result": {}})
        );
    }
}
