//! Transport front-ends built on the shared correlation core
//!
//! Both front-ends own a [`Bridge`] by value and differ only in who owns the listener:
//! [`listener::HttpTransport`] binds its own, [`embedded::EmbeddedTransport`] is mounted
//! on a host router.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    bridge::Bridge,
    errors::BridgeError,
    mcp::rpc::Message,
    registry::{CloseHandler, ErrorHandler, MessageHandler},
};

pub mod embedded;
pub mod listener;

pub use embedded::EmbeddedTransport;
pub use listener::HttpTransport;

#[async_trait]
pub trait Transport: Send + Sync {
    fn bridge(&self) -> &Bridge;

    async fn start(&self) -> Result<(), BridgeError>;

    async fn close(&self) -> Result<(), BridgeError>;

    /// Pushes an engine reply to the request waiting on its id.
    fn send(&self, message: Message) -> Result<(), BridgeError> {
        self.bridge().send(message)
    }

    fn set_message_handler(&self, handler: Arc<dyn MessageHandler>) {
        self.bridge().set_message_handler(handler);
    }

    fn set_error_handler(&self, handler: ErrorHandler) {
        self.bridge().set_error_handler(handler);
    }

    fn set_close_handler(&self, handler: CloseHandler) {
        self.bridge().set_close_handler(handler);
    }
}
