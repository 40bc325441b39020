//! Synchronous bridge over the asynchronous message handler
//!
//! [`Bridge::submit`] turns "hand a message to the engine, get a reply later by id" into
//! a single awaitable call: register a reply slot, dispatch, wait, unregister.

use std::{future::Future, sync::Arc, time::Duration};

use tracing::{debug, warn};

use crate::{
    errors::BridgeError,
    mcp::rpc::{id_label, Message, RequestId},
    registry::{CloseHandler, CorrelationRegistry, ErrorHandler, MessageHandler},
};

pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Upper bound on how long a request waits for its reply.
    pub reply_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
        }
    }
}

/// Correlation core shared by every transport front-end. Cloning is cheap and every
/// clone refers to the same registry, so a clone can be handed to the protocol engine
/// for sending replies.
#[derive(Clone)]
pub struct Bridge {
    registry: Arc<CorrelationRegistry>,
    config: BridgeConfig,
}

/// Removes the pending entry on every exit path, including the awaiting future being
/// dropped when the HTTP client goes away.
struct PendingGuard<'a> {
    registry: &'a CorrelationRegistry,
    id: RequestId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.registry.unregister(&self.id);
    }
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            registry: Arc::new(CorrelationRegistry::new()),
            config,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn registry(&self) -> &CorrelationRegistry {
        &self.registry
    }

    pub fn set_message_handler(&self, handler: Arc<dyn MessageHandler>) {
        self.registry.set_message_handler(handler);
    }

    pub fn set_error_handler(&self, handler: ErrorHandler) {
        self.registry.set_error_handler(handler);
    }

    pub fn set_close_handler(&self, handler: CloseHandler) {
        self.registry.set_close_handler(handler);
    }

    pub fn is_closed(&self) -> bool {
        self.registry.is_closed()
    }

    pub fn report_error(&self, err: &BridgeError) {
        if let Some(handler) = self.registry.error_handler() {
            handler(err);
        }
    }

    /// Delivers a reply produced by the engine to the request waiting on its id.
    ///
    /// Failures are passed to the error handler and also returned, so the engine never
    /// assumes a dropped reply reached anyone.
    pub fn send(&self, message: Message) -> Result<(), BridgeError> {
        let id = match &message {
            Message::Response { id, .. } | Message::Error { id: Some(id), .. } => id.clone(),
            _ => {
                let err = BridgeError::NotAReply;
                self.report_error(&err);
                return Err(err);
            }
        };

        self.registry.deliver(&id, message).map_err(|err| {
            warn!(id = ?id, error = %err, "reply was not delivered");
            self.report_error(&err);
            err
        })
    }

    /// Runs one message through the engine and waits for its reply.
    ///
    /// Returns `Ok(None)` for anything that is not a request; those are handed to the
    /// message handler on their own task and never waited on.
    pub async fn submit(&self, message: Message) -> Result<Option<Message>, BridgeError> {
        self.submit_until(message, std::future::pending()).await
    }

    /// Like [`Bridge::submit`], but gives up with [`BridgeError::Cancelled`] as soon as
    /// `cancel` completes.
    pub async fn submit_until<C>(
        &self,
        message: Message,
        cancel: C,
    ) -> Result<Option<Message>, BridgeError>
    where
        C: Future<Output = ()>,
    {
        if self.registry.is_closed() {
            return Err(BridgeError::TransportClosed);
        }
        let handler = self
            .registry
            .message_handler()
            .ok_or(BridgeError::NoMessageHandler)?;

        let id = match &message {
            Message::Request { id, .. } => id.clone(),
            _ => {
                self.dispatch_detached(handler, message);
                return Ok(None);
            }
        };

        let slot = self.registry.register(id.clone())?;
        let _guard = PendingGuard {
            registry: &self.registry,
            id: id.clone(),
        };
        let mut receiver = slot.receiver;

        let mut dispatch = tokio::spawn(async move { handler.handle_message(message).await });
        let mut dispatched = false;
        let deadline = tokio::time::sleep(self.config.reply_timeout);
        tokio::pin!(deadline);
        tokio::pin!(cancel);

        loop {
            tokio::select! {
                biased;

                reply = &mut receiver => {
                    return match reply {
                        Ok(reply) => Ok(Some(reply)),
                        Err(_) if self.registry.is_closed() => Err(BridgeError::TransportClosed),
                        Err(_) => Err(BridgeError::Cancelled),
                    };
                }
                joined = &mut dispatch, if !dispatched => {
                    dispatched = true;
                    if let Err(err) = joined {
                        if err.is_panic() {
                            // A reply sent just before the panic still wins.
                            if let Ok(reply) = receiver.try_recv() {
                                return Ok(Some(reply));
                            }
                            return Err(BridgeError::HandlerFailed(format!(
                                "handler panicked while processing request {}",
                                id_label(&id)
                            )));
                        }
                    }
                }
                () = &mut deadline => {
                    debug!(id = ?id, "gave up waiting for reply");
                    return Err(BridgeError::Timeout {
                        id: id.clone(),
                        after: self.config.reply_timeout,
                    });
                }
                () = &mut cancel => {
                    debug!(id = ?id, "request cancelled by caller");
                    return Err(BridgeError::Cancelled);
                }
            }
        }
    }

    /// Notifications and inbound replies run on their own task. A handler panic there
    /// has no caller to fail, so it goes to the error handler.
    fn dispatch_detached(&self, handler: Arc<dyn MessageHandler>, message: Message) {
        let method = message.method().unwrap_or("reply").to_string();
        let task = tokio::spawn(async move { handler.handle_message(message).await });
        let bridge = self.clone();
        tokio::spawn(async move {
            if let Err(err) = task.await {
                if err.is_panic() {
                    let err = BridgeError::HandlerFailed(format!(
                        "handler panicked while processing {method}"
                    ));
                    warn!(error = %err, "detached message handler failed");
                    bridge.report_error(&err);
                }
            }
        });
    }

    /// Closes the correlation core: every waiting request resolves with
    /// [`BridgeError::TransportClosed`] and the close handler runs once.
    pub fn close(&self) -> Result<(), BridgeError> {
        if let Some(handler) = self.registry.close()? {
            handler();
        }
        Ok(())
    }
}
