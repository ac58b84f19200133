//! Editor-side client: post a command and wait for its reply.
//!
//! The bridge never replies to unauthorized or malformed messages. Locally
//! that shows up as [`RequestError::Dropped`] once the port is released, or
//! as [`RequestError::Timeout`] if nothing happens in time.

use std::time::Duration;

use crate::command::{Command, Reply};
use crate::kernel::KernelError;
use crate::transport::{reply_channel, InboundMessage, TransportError, TransportSender};

/// Why a request did not complete with an `Ack`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// The kernel operation failed.
    #[error("command failed: {0}")]
    Failed(KernelError),
    /// No reply arrived within the timeout.
    #[error("no reply within {0:?}")]
    Timeout(Duration),
    /// The reply port was dropped without a reply.
    #[error("request was dropped without a reply")]
    Dropped,
    /// The transport no longer delivers messages.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Posts commands on behalf of one origin.
#[derive(Debug, Clone)]
pub struct EditorClient {
    origin: String,
    sender: TransportSender,
}

impl EditorClient {
    /// Client posting as `origin` through `sender`.
    pub fn new(origin: impl Into<String>, sender: TransportSender) -> Self {
        Self {
            origin: origin.into(),
            sender,
        }
    }

    /// Origin attached to every message.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Send `command` and wait up to `timeout` for the reply.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Failed`] with the kernel's error on a
    /// `Failure` reply, or the reason no reply was received.
    pub async fn request(&self, command: &Command, timeout: Duration) -> Result<(), RequestError> {
        let data = serde_json::to_value(command).map_err(|e| {
            RequestError::Failed(KernelError::Other {
                message: format!("cannot encode command: {e}"),
            })
        })?;
        self.request_raw(data, timeout).await
    }

    /// Send an already-encoded payload and wait up to `timeout` for the reply.
    ///
    /// # Errors
    ///
    /// Same as [`EditorClient::request`].
    pub async fn request_raw(
        &self,
        data: serde_json::Value,
        timeout: Duration,
    ) -> Result<(), RequestError> {
        let (port, rx) = reply_channel();
        self.sender
            .post(InboundMessage::new(self.origin.clone(), data, port))
            .await?;

        match tokio::time::timeout(timeout, rx.recv()).await {
            Err(_) => Err(RequestError::Timeout(timeout)),
            Ok(None) => Err(RequestError::Dropped),
            Ok(Some(Reply::Ack)) => Ok(()),
            Ok(Some(Reply::Failure { error })) => Err(RequestError::Failed(error)),
        }
    }
}
