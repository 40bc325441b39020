//! Transport mounted on a host router
//!
//! The host owns the listener and its lifecycle, so `start` does nothing. Several
//! embedded transports can live in one process, each under its own path.

use async_trait::async_trait;
use axum::{
    body::Bytes,
    http::Method,
    response::Response,
    routing::{any, MethodRouter},
    Router,
};
use tracing::info;

use crate::{
    bridge::{Bridge, BridgeConfig},
    errors::BridgeError,
    http::handlers::bridge_request,
    transport::Transport,
};

#[derive(Clone)]
pub struct EmbeddedTransport {
    bridge: Bridge,
}

impl EmbeddedTransport {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            bridge: Bridge::new(config),
        }
    }

    /// Handles one HTTP exchange. Only POST is accepted.
    pub async fn handle(&self, method: Method, body: Bytes) -> Response {
        bridge_request(&self.bridge, &method, &body).await
    }

    /// Handler for the host to mount at a single path.
    pub fn method_router<S>(&self) -> MethodRouter<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let transport = self.clone();
        any(move |method: Method, body: Bytes| {
            let transport = transport.clone();
            async move { transport.handle(method, body).await }
        })
    }

    pub fn router<S>(&self, path: &str) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        Router::new().route(path, self.method_router())
    }
}

#[async_trait]
impl Transport for EmbeddedTransport {
    fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    async fn start(&self) -> Result<(), BridgeError> {
        if self.bridge.is_closed() {
            return Err(BridgeError::TransportClosed);
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), BridgeError> {
        self.bridge.close()?;
        info!("embedded transport closed");
        Ok(())
    }
}
