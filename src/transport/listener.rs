//! Transport that owns its TCP listener
//!
//! Lifecycle is `Created -> Started -> Closed`. Starting binds the configured address and
//! serves a single POST route on a background task; closing resolves every pending
//! request, runs the close handler and shuts the server down gracefully.

use std::net::SocketAddr;

use async_trait::async_trait;
use axum::{middleware, routing::any, Router};
use parking_lot::Mutex;
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
use tracing::{error, info, warn};

use crate::{
    bridge::{Bridge, BridgeConfig},
    config::Config,
    errors::BridgeError,
    http::handlers::bridge_endpoint,
    logging,
    transport::Transport,
};

pub const DEFAULT_ADDR: ([u8; 4], u16) = ([127, 0, 0, 1], 8080);

enum Lifecycle {
    Created,
    Starting,
    Started {
        local_addr: SocketAddr,
        shutdown: oneshot::Sender<()>,
        server: JoinHandle<()>,
    },
    Closed,
}

pub struct HttpTransport {
    bridge: Bridge,
    path: String,
    addr: SocketAddr,
    lifecycle: Mutex<Lifecycle>,
}

impl HttpTransport {
    pub fn new(path: impl Into<String>, config: BridgeConfig) -> Self {
        Self {
            bridge: Bridge::new(config),
            path: path.into(),
            addr: SocketAddr::from(DEFAULT_ADDR),
            lifecycle: Mutex::new(Lifecycle::Created),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, crate::config::ConfigError> {
        Ok(Self::new(config.path.clone(), config.bridge_config()).with_addr(config.bind_socket()?))
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Address actually bound, once started. Differs from the configured one when
    /// binding port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &*self.lifecycle.lock() {
            Lifecycle::Started { local_addr, .. } => Some(*local_addr),
            _ => None,
        }
    }

    /// Router served by this transport: one path, any method, non-POST rejected by the
    /// endpoint itself so the rejection carries the transport's error body.
    pub fn router(&self) -> Router {
        Router::new()
            .route(&self.path, any(bridge_endpoint))
            .layer(middleware::from_fn_with_state(
                self.bridge.clone(),
                logging::request_logging_middleware,
            ))
            .with_state(self.bridge.clone())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    async fn start(&self) -> Result<(), BridgeError> {
        {
            let mut lifecycle = self.lifecycle.lock();
            match &*lifecycle {
                Lifecycle::Created => {}
                Lifecycle::Starting | Lifecycle::Started { .. } => {
                    return Err(BridgeError::AlreadyStarted)
                }
                Lifecycle::Closed => return Err(BridgeError::TransportClosed),
            }
            *lifecycle = Lifecycle::Starting;
        }

        let bound = TcpListener::bind(self.addr)
            .await
            .and_then(|listener| Ok((listener.local_addr()?, listener)));
        let (local_addr, listener) = match bound {
            Ok(bound) => bound,
            Err(source) => {
                let mut lifecycle = self.lifecycle.lock();
                if matches!(*lifecycle, Lifecycle::Starting) {
                    *lifecycle = Lifecycle::Created;
                }
                return Err(BridgeError::Bind {
                    addr: self.addr,
                    source,
                });
            }
        };

        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let app = self.router();
        let server = tokio::spawn(async move {
            let result = axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(err) = result {
                error!(error = %err, "http transport server failed");
            }
        });

        let mut lifecycle = self.lifecycle.lock();
        if !matches!(*lifecycle, Lifecycle::Starting) {
            // Closed while binding.
            server.abort();
            return Err(BridgeError::TransportClosed);
        }
        *lifecycle = Lifecycle::Started {
            local_addr,
            shutdown,
            server,
        };

        info!(bind_addr = %local_addr, path = %self.path, "http transport started");
        Ok(())
    }

    async fn close(&self) -> Result<(), BridgeError> {
        let previous = std::mem::replace(&mut *self.lifecycle.lock(), Lifecycle::Closed);
        if matches!(previous, Lifecycle::Closed) {
            return Err(BridgeError::TransportClosed);
        }

        // Waiters resolve first so graceful shutdown is not held up by them.
        self.bridge.close()?;

        if let Lifecycle::Started {
            shutdown, server, ..
        } = previous
        {
            let _ = shutdown.send(());
            if let Err(err) = server.await {
                warn!(error = %err, "http transport server task ended abnormally");
            }
        }

        info!(path = %self.path, "http transport closed");
        Ok(())
    }
}
