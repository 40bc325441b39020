//! Model Context Protocol (MCP) message shapes and a reference responder
//!
//! Provides the JSON-RPC envelope carried by the bridge and the small engine used by the
//! binary and end-to-end tests.

pub mod rpc;
pub mod server;
