//! Bridges a JSON-RPC protocol engine, which consumes messages through a handler callback
//! and emits replies tagged with request ids, onto synchronous HTTP request/response.

pub mod bridge;
pub mod config;
pub mod errors;
pub mod http;
pub mod logging;
pub mod mcp;
pub mod registry;
pub mod transport;

pub use bridge::{Bridge, BridgeConfig};
pub use errors::BridgeError;
pub use mcp::rpc::{Message, RequestId, RpcError};
pub use registry::{CloseHandler, CorrelationRegistry, ErrorHandler, MessageHandler};
pub use transport::{EmbeddedTransport, HttpTransport, Transport};
