//! Bidirectional typed message bus with request correlation
//!
//! Two endpoints — conventionally "host" and "panel" — exchange
//! [`Envelope`]s over in-process channels (or, in serve mode, a channel
//! bridged to stdin/stdout). Each endpoint owns a pending-request table for
//! request/response correlation and a per-tag broadcast handler registry.
//! Handler failures are contained and logged; they never take down the
//! dispatch loop.

use crate::protocol::{Command, Envelope, ProtocolError};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// A broadcast message handler. Invoked for every inbound message of its
/// registered tag; may reply to the originating id through the responder.
pub type MessageHandler = Arc<dyn Fn(&Envelope, &Responder) + Send + Sync>;

struct PendingRequest {
    expected_tag: String,
    resolver: oneshot::Sender<Result<Envelope, ProtocolError>>,
}

type PendingTable = Arc<Mutex<HashMap<String, PendingRequest>>>;
type HandlerTable = Arc<Mutex<HashMap<String, Vec<(u64, MessageHandler)>>>>;

/// Replies to the originating envelope's correlation id.
pub struct Responder {
    reply_to: String,
    outgoing: mpsc::UnboundedSender<Envelope>,
}

impl Responder {
    pub fn respond(&self, command: Command) {
        let envelope = Envelope::with_id(self.reply_to.clone(), command);
        if self.outgoing.send(envelope).is_err() {
            tracing::warn!(id = %self.reply_to, "response dropped, peer channel closed");
        }
    }
}

/// One side of the message bus.
///
/// Commands are typed, so outbound payloads are valid by construction;
/// inbound traffic is validated where it enters the channel (see
/// [`crate::protocol::decode_envelope`] for the serve-mode bridge).
#[derive(Clone)]
pub struct Endpoint {
    name: &'static str,
    outgoing: mpsc::UnboundedSender<Envelope>,
    pending: PendingTable,
    handlers: HandlerTable,
    next_handler_id: Arc<AtomicU64>,
}

impl Endpoint {
    /// Create an endpoint over an outgoing sender and an incoming receiver,
    /// spawning its dispatch loop. Must be called within a tokio runtime.
    pub fn new(
        name: &'static str,
        outgoing: mpsc::UnboundedSender<Envelope>,
        incoming: mpsc::UnboundedReceiver<Envelope>,
    ) -> Self {
        let endpoint = Self {
            name,
            outgoing: outgoing.clone(),
            pending: Arc::new(Mutex::new(HashMap::new())),
            handlers: Arc::new(Mutex::new(HashMap::new())),
            next_handler_id: Arc::new(AtomicU64::new(0)),
        };

        tokio::spawn(dispatch_loop(
            name,
            incoming,
            endpoint.pending.clone(),
            endpoint.handlers.clone(),
            outgoing,
        ));

        endpoint
    }

    /// Create a cross-wired host/panel endpoint pair for in-process use.
    pub fn pair() -> (Endpoint, Endpoint) {
        let (to_panel_tx, to_panel_rx) = mpsc::unbounded_channel();
        let (to_host_tx, to_host_rx) = mpsc::unbounded_channel();

        let host = Endpoint::new("host", to_panel_tx, to_host_rx);
        let panel = Endpoint::new("panel", to_host_tx, to_panel_rx);
        (host, panel)
    }

    /// Send a command with a fresh correlation id, expecting no response.
    /// Returns the assigned id.
    pub fn send_and_forget(&self, command: Command) -> Result<String, ProtocolError> {
        let envelope = Envelope::new(command);
        let id = envelope.id.clone();
        self.outgoing
            .send(envelope)
            .map_err(|_| ProtocolError::ChannelClosed)?;
        Ok(id)
    }

    /// Send a pre-built envelope (bridged traffic, responses, acks).
    pub fn send_envelope(&self, envelope: Envelope) -> Result<(), ProtocolError> {
        self.outgoing
            .send(envelope)
            .map_err(|_| ProtocolError::ChannelClosed)
    }

    /// Send a command and await the correlated reply.
    ///
    /// Resolves when a reply for this id arrives bearing the expected
    /// response tag; rejects on tag mismatch or when `timeout` elapses.
    /// `None` waits indefinitely. On expiry the pending entry is removed,
    /// so a late reply is ignored rather than resolved twice.
    pub async fn send_and_receive(
        &self,
        command: Command,
        expected_response_tag: &str,
        timeout: Option<Duration>,
    ) -> Result<Envelope, ProtocolError> {
        let envelope = Envelope::new(command);
        let id = envelope.id.clone();

        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(
            id.clone(),
            PendingRequest {
                expected_tag: expected_response_tag.to_string(),
                resolver: tx,
            },
        );

        if self.outgoing.send(envelope).is_err() {
            self.pending.lock().unwrap().remove(&id);
            return Err(ProtocolError::ChannelClosed);
        }

        match timeout {
            Some(duration) if !duration.is_zero() => {
                match tokio::time::timeout(duration, rx).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(_)) => Err(ProtocolError::ChannelClosed),
                    Err(_) => {
                        self.pending.lock().unwrap().remove(&id);
                        Err(ProtocolError::Timeout(expected_response_tag.to_string()))
                    }
                }
            }
            _ => rx.await.map_err(|_| ProtocolError::ChannelClosed)?,
        }
    }

    /// Register a broadcast handler for a command tag. Multiple handlers
    /// per tag are allowed; each is removable through its guard.
    pub fn register_message_handler(
        &self,
        tag: &str,
        handler: MessageHandler,
    ) -> HandlerGuard {
        let id = self.next_handler_id.fetch_add(1, Ordering::Relaxed);
        self.handlers
            .lock()
            .unwrap()
            .entry(tag.to_string())
            .or_default()
            .push((id, handler));

        HandlerGuard {
            tag: tag.to_string(),
            id,
            handlers: self.handlers.clone(),
        }
    }

    /// Send a zero-payload ack correlated to an inbound message's id.
    pub fn acknowledge(&self, id: impl Into<String>) -> Result<(), ProtocolError> {
        self.send_envelope(Envelope::with_id(id, Command::MessageAck))
    }

    #[allow(dead_code)]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Removes its handler on [`HandlerGuard::unsubscribe`]. Dropping the guard
/// without unsubscribing leaves the handler registered.
pub struct HandlerGuard {
    tag: String,
    id: u64,
    handlers: HandlerTable,
}

impl HandlerGuard {
    #[allow(dead_code)]
    pub fn unsubscribe(self) {
        let mut handlers = self.handlers.lock().unwrap();
        if let Some(list) = handlers.get_mut(&self.tag) {
            list.retain(|(id, _)| *id != self.id);
        }
    }
}

async fn dispatch_loop(
    name: &'static str,
    mut incoming: mpsc::UnboundedReceiver<Envelope>,
    pending: PendingTable,
    handlers: HandlerTable,
    outgoing: mpsc::UnboundedSender<Envelope>,
) {
    while let Some(envelope) = incoming.recv().await {
        let tag = envelope.command.tag();

        // Resolve a matching pending request first.
        let request = pending.lock().unwrap().remove(&envelope.id);
        if let Some(request) = request {
            let result = if tag == request.expected_tag {
                Ok(envelope.clone())
            } else {
                Err(ProtocolError::SchemaMismatch {
                    tag: request.expected_tag.clone(),
                    detail: format!("received {tag:?} for this correlation id"),
                })
            };
            if request.resolver.send(result).is_err() {
                tracing::debug!(endpoint = name, id = %envelope.id, "requester gone before reply");
            }
        }

        // Broadcast handlers run regardless of the pending-request match.
        let tag_handlers: Vec<MessageHandler> = handlers
            .lock()
            .unwrap()
            .get(tag)
            .map(|list| list.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default();

        for handler in tag_handlers {
            let responder = Responder {
                reply_to: envelope.id.clone(),
                outgoing: outgoing.clone(),
            };
            let invocation =
                std::panic::catch_unwind(AssertUnwindSafe(|| handler(&envelope, &responder)));
            if invocation.is_err() {
                tracing::error!(endpoint = name, tag, "message handler panicked");
            }
        }
    }

    tracing::debug!(endpoint = name, "dispatch loop ended");
}
