//! In-process message transport with single-use reply ports.
//!
//! A [`Transport`] owns one bounded queue and exactly one listener slot.
//! Senders post [`InboundMessage`]s through a [`TransportSender`]; the
//! consumer takes the listener once and owns it until it drops it.
//!
//! Every message may carry [`ReplyPort`]s created by the sender with
//! [`reply_channel`]. A port is consumed when a reply is sent on it.

use std::sync::Mutex;

use tokio::sync::{mpsc, oneshot};
use tracing::trace;

use crate::command::Reply;

/// Errors raised by the transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The listener slot is already owned by another consumer.
    #[error("transport listener is already taken")]
    ListenerTaken,
    /// No consumer will receive messages anymore.
    #[error("transport is closed")]
    Closed,
}

/// A message as delivered by the transport.
#[derive(Debug)]
pub struct InboundMessage {
    /// Sender origin as reported by the transport. Untrusted until validated.
    pub origin: String,
    /// Raw message payload.
    pub data: serde_json::Value,
    /// Reply ports transferred with the message.
    pub ports: Vec<ReplyPort>,
}

impl InboundMessage {
    /// Message with a single reply port.
    pub fn new(origin: impl Into<String>, data: serde_json::Value, port: ReplyPort) -> Self {
        Self {
            origin: origin.into(),
            data,
            ports: vec![port],
        }
    }
}

/// Sending half of a single-use reply channel.
#[derive(Debug)]
pub struct ReplyPort {
    tx: oneshot::Sender<Reply>,
}

impl ReplyPort {
    /// Send the reply, consuming the port.
    ///
    /// Returns `false` if the receiving side is gone; that case is not an
    /// error for the caller.
    pub fn send(self, reply: Reply) -> bool {
        match self.tx.send(reply) {
            Ok(()) => true,
            Err(_) => {
                trace!("reply receiver dropped, reply discarded");
                false
            }
        }
    }

    /// Returns `true` if the receiving side has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving half of a single-use reply channel, kept by the sender.
#[derive(Debug)]
pub struct ReplyReceiver {
    rx: oneshot::Receiver<Reply>,
}

impl ReplyReceiver {
    /// Wait for the reply. `None` if the port was dropped without a reply.
    pub async fn recv(self) -> Option<Reply> {
        self.rx.await.ok()
    }

    /// Non-blocking poll for the reply.
    ///
    /// `Ok(None)` means no reply yet; `Err(TransportError::Closed)` means the
    /// port was dropped without a reply.
    pub fn try_recv(&mut self) -> Result<Option<Reply>, TransportError> {
        match self.rx.try_recv() {
            Ok(reply) => Ok(Some(reply)),
            Err(oneshot::error::TryRecvError::Empty) => Ok(None),
            Err(oneshot::error::TryRecvError::Closed) => Err(TransportError::Closed),
        }
    }
}

/// Create a fresh single-use reply channel.
pub fn reply_channel() -> (ReplyPort, ReplyReceiver) {
    let (tx, rx) = oneshot::channel();
    (ReplyPort { tx }, ReplyReceiver { rx })
}

/// Receiving end handed to the single consumer.
pub type Listener = mpsc::Receiver<InboundMessage>;

/// Message queue with an exclusive listener slot.
#[derive(Debug)]
pub struct Transport {
    tx: mpsc::Sender<InboundMessage>,
    listener: Mutex<Option<Listener>>,
}

impl Transport {
    /// Create a transport buffering up to `capacity` undelivered messages.
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            listener: Mutex::new(Some(rx)),
        }
    }

    /// Handle for posting messages into this transport.
    pub fn sender(&self) -> TransportSender {
        TransportSender {
            tx: self.tx.clone(),
        }
    }

    /// Take exclusive ownership of the listener slot.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ListenerTaken`] if a consumer already owns it.
    pub fn take_listener(&self) -> Result<Listener, TransportError> {
        let mut slot = self
            .listener
            .lock()
            .map_err(|_| TransportError::ListenerTaken)?;
        slot.take().ok_or(TransportError::ListenerTaken)
    }
}

/// Cloneable posting handle for a [`Transport`].
#[derive(Debug, Clone)]
pub struct TransportSender {
    tx: mpsc::Sender<InboundMessage>,
}

impl TransportSender {
    /// Post a message, waiting for queue capacity.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] once the listener has been dropped.
    /// The message, including its reply ports, is dropped in that case.
    pub async fn post(&self, message: InboundMessage) -> Result<(), TransportError> {
        self.tx
            .send(message)
            .await
            .map_err(|_| TransportError::Closed)
    }

    /// Returns `true` once the listener has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
