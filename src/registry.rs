//! Correlation of in-flight requests with their replies
//!
//! The registry owns every piece of shared mutable transport state: the pending reply
//! slots keyed by request id, the closed flag, and the three lifecycle callbacks. All of
//! it sits behind a single lock that is only ever held for map or field access, never
//! while a caller waits for a reply.

use std::{collections::HashMap, future::Future, sync::Arc};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

use crate::{
    errors::BridgeError,
    mcp::rpc::{id_label, Message, RequestId},
};

/// Receives every decoded inbound envelope.
///
/// For requests the handler is expected to eventually deliver a reply carrying the same
/// id, through whatever path the protocol engine uses. It runs on its own task, so it may
/// also reply after returning.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle_message(&self, message: Message);
}

#[async_trait]
impl<F, Fut> MessageHandler for F
where
    F: Fn(Message) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle_message(&self, message: Message) {
        (self)(message).await
    }
}

pub type ErrorHandler = Arc<dyn Fn(&BridgeError) + Send + Sync>;
pub type CloseHandler = Arc<dyn Fn() + Send + Sync>;

enum Slot {
    Waiting(oneshot::Sender<Message>),
    Delivered,
}

#[derive(Default)]
struct State {
    pending: HashMap<RequestId, Slot>,
    closed: bool,
    message_handler: Option<Arc<dyn MessageHandler>>,
    error_handler: Option<ErrorHandler>,
    close_handler: Option<CloseHandler>,
}

/// Handle returned by [`CorrelationRegistry::register`]; resolves once a reply for
/// its id is delivered, or errors when the slot is dropped without one.
#[derive(Debug)]
pub struct ReplySlot {
    pub id: RequestId,
    pub receiver: oneshot::Receiver<Message>,
}

#[derive(Default)]
pub struct CorrelationRegistry {
    state: Mutex<State>,
}

impl CorrelationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: RequestId) -> Result<ReplySlot, BridgeError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(BridgeError::TransportClosed);
        }
        if state.pending.contains_key(&id) {
            return Err(BridgeError::DuplicateId(id));
        }

        let (sender, receiver) = oneshot::channel();
        state.pending.insert(id.clone(), Slot::Waiting(sender));
        debug!(id = ?id, pending = state.pending.len(), "registered pending request");
        Ok(ReplySlot { id, receiver })
    }

    pub fn deliver(&self, id: &RequestId, message: Message) -> Result<(), BridgeError> {
        let sender = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(BridgeError::TransportClosed);
            }
            let Some(slot) = state.pending.get_mut(id) else {
                return Err(BridgeError::UnknownCorrelation(id.clone()));
            };
            match std::mem::replace(slot, Slot::Delivered) {
                Slot::Waiting(sender) => sender,
                Slot::Delivered => return Err(BridgeError::AlreadyDelivered(id.clone())),
            }
        };

        // The waiter may have given up between the lookup and now.
        sender
            .send(message)
            .map_err(|_| BridgeError::UnknownCorrelation(id.clone()))?;
        debug!(id = ?id, "delivered reply");
        Ok(())
    }

    pub fn unregister(&self, id: &RequestId) {
        if self.state.lock().pending.remove(id).is_some() {
            debug!(id = ?id, "unregistered pending request");
        }
    }

    pub fn is_pending(&self, id: &RequestId) -> bool {
        self.state.lock().pending.contains_key(id)
    }

    pub fn pending_ids(&self) -> Vec<RequestId> {
        let mut ids: Vec<RequestId> = self.state.lock().pending.keys().cloned().collect();
        ids.sort_by_key(id_label);
        ids
    }

    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Marks the registry closed and drops every pending slot, which wakes each waiter
    /// with a closed channel. Returns the close handler for the caller to invoke outside
    /// the lock; a second call fails.
    pub fn close(&self) -> Result<Option<CloseHandler>, BridgeError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(BridgeError::TransportClosed);
        }

        state.closed = true;
        let abandoned = state.pending.len();
        state.pending.clear();
        // The engine usually holds a handle back to the transport.
        state.message_handler = None;
        debug!(abandoned, "correlation registry closed");
        Ok(state.close_handler.clone())
    }

    pub fn message_handler(&self) -> Option<Arc<dyn MessageHandler>> {
        self.state.lock().message_handler.clone()
    }

    pub fn set_message_handler(&self, handler: Arc<dyn MessageHandler>) {
        self.state.lock().message_handler = Some(handler);
    }

    pub fn error_handler(&self) -> Option<ErrorHandler> {
        self.state.lock().error_handler.clone()
    }

    pub fn set_error_handler(&self, handler: ErrorHandler) {
        self.state.lock().error_handler = Some(handler);
    }

    pub fn close_handler(&self) -> Option<CloseHandler> {
        self.state.lock().close_handler.clone()
    }

    pub fn set_close_handler(&self, handler: CloseHandler) {
        self.state.lock().close_handler = Some(handler);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;

    fn id(value: i64) -> RequestId {
        RequestId::Integer(value)
    }

    #[tokio::test]
    async fn delivered_reply_reaches_registered_slot() {
        let registry = CorrelationRegistry::new();
        let slot = registry.register(id(7)).expect("register");

        registry
            .deliver(&id(7), Message::response(RequestId::Integer(7), json!("pong")))
            .expect("deliver");

        let reply = slot.receiver.await.expect("reply");
        assert_eq!(reply, Message::response(RequestId::Integer(7), json!("pong")));
    }

    #[test]
    fn duplicate_registration_fails_until_unregistered() {
        let registry = CorrelationRegistry::new();
        let _first = registry.register(id(1)).expect("first register");

        let err = registry.register(id(1)).expect_err("duplicate must fail");
        assert!(matches!(err, BridgeError::DuplicateId(RequestId::Integer(1))));

        registry.unregister(&id(1));
        registry.register(id(1)).expect("id reusable after unregister");
    }

    #[test]
    fn integer_and_string_ids_do_not_collide() {
        let registry = CorrelationRegistry::new();
        let _number = registry.register(id(1)).expect("register number");
        let _string = registry
            .register(RequestId::String("1".to_string()))
            .expect("register string");

        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn unknown_delivery_leaves_other_entries_untouched() {
        let registry = CorrelationRegistry::new();
        let _slot = registry.register(id(1)).expect("register");

        let err = registry
            .deliver(&id(2), Message::response(RequestId::Integer(2), json!({})))
            .expect_err("unknown id must fail");

        assert!(matches!(err, BridgeError::UnknownCorrelation(RequestId::Integer(2))));
        assert_eq!(registry.pending_ids(), vec![id(1)]);
    }

    #[test]
    fn second_delivery_is_rejected() {
        let registry = CorrelationRegistry::new();
        let _slot = registry.register(id(3)).expect("register");

        registry
            .deliver(&id(3), Message::response(RequestId::Integer(3), json!(1)))
            .expect("first delivery");
        let err = registry
            .deliver(&id(3), Message::response(RequestId::Integer(3), json!(2)))
            .expect_err("second delivery must fail");

        assert!(matches!(err, BridgeError::AlreadyDelivered(_)));
    }

    #[test]
    fn delivery_after_waiter_dropped_is_unknown() {
        let registry = CorrelationRegistry::new();
        let slot = registry.register(id(4)).expect("register");
        drop(slot);

        let err = registry
            .deliver(&id(4), Message::response(RequestId::Integer(4), json!(null)))
            .expect_err("no one is waiting");
        assert!(matches!(err, BridgeError::UnknownCorrelation(_)));
    }

    #[tokio::test]
    async fn close_wakes_waiters_and_returns_handler_once() {
        let registry = CorrelationRegistry::new();
        let closes = Arc::new(AtomicUsize::new(0));
        let counter = closes.clone();
        registry.set_close_handler(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        let slot = registry.register(id(5)).expect("register");

        let handler = registry.close().expect("first close").expect("handler set");
        handler();

        assert!(slot.receiver.await.is_err());
        assert!(registry.is_empty());
        assert!(matches!(
            registry.close(),
            Err(BridgeError::TransportClosed)
        ));
        assert!(matches!(
            registry.register(id(6)),
            Err(BridgeError::TransportClosed)
        ));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handlers_can_be_replaced() {
        let registry = CorrelationRegistry::new();
        assert!(registry.message_handler().is_none());
        assert!(registry.error_handler().is_none());

        registry.set_message_handler(Arc::new(|_message: Message| async {}));
        registry.set_error_handler(Arc::new(|_err: &BridgeError| {}));

        assert!(registry.message_handler().is_some());
        assert!(registry.error_handler().is_some());
        assert!(registry.close_handler().is_none());
    }
}
