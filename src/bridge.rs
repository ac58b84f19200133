//! Command bridge: authenticate, decode, dispatch, reply exactly once.
//!
//! ```text
//! Listener ──▶ accept() ──▶ JoinSet<kernel op> ──▶ ReplyPort
//!               │  origin check
//!               │  reply port present
//!               │  command decodes
//!               ▼
//!             dropped (no reply)
//! ```
//!
//! [`CommandBridge::accept`] is synchronous and never suspends. Kernel
//! operations run concurrently on a [`JoinSet`]; the consumer loop keeps the
//! reply port of every in-flight operation and sends the reply when that
//! operation finishes, so replies go out in completion order and a panicking
//! or cancelled operation still produces a reply.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{Id, JoinError, JoinSet};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::command::{Command, DecodeError, Reply};
use crate::kernel::{Kernel, KernelError};
use crate::origin::OriginValidator;
use crate::transport::{InboundMessage, Listener, ReplyPort};

/// An authenticated, decoded request ready for dispatch.
#[derive(Debug)]
pub struct RequestEnvelope {
    /// Correlation id for logs. Never sent on the wire.
    pub id: Uuid,
    /// Decoded command.
    pub command: Command,
    /// Port the single reply goes to.
    pub reply: ReplyPort,
}

/// Why an inbound message was dropped without a reply.
#[derive(Debug, thiserror::Error)]
pub enum Rejection {
    /// The sender origin is not authorized.
    #[error("unauthorized origin '{0}'")]
    Unauthorized(String),
    /// The message carried no reply port.
    #[error("message has no reply port")]
    MissingReplyPort,
    /// The payload is not a known, well-formed command.
    #[error(transparent)]
    Malformed(#[from] DecodeError),
}

/// Counters reported when the consumer loop stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Messages turned into kernel operations.
    pub accepted: u64,
    /// Messages dropped before dispatch.
    pub dropped: u64,
    /// `Ack` replies produced.
    pub acked: u64,
    /// `Failure` replies produced.
    pub failed: u64,
}

/// Translates authenticated inbound messages into kernel operations.
#[derive(Clone)]
pub struct CommandBridge {
    validator: OriginValidator,
    kernel: Arc<dyn Kernel>,
}

impl std::fmt::Debug for CommandBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandBridge")
            .field("validator", &self.validator)
            .finish_non_exhaustive()
    }
}

struct Pending {
    request_id: Uuid,
    tag: &'static str,
    reply: ReplyPort,
}

impl CommandBridge {
    /// Create a bridge in front of `kernel`.
    pub fn new(validator: OriginValidator, kernel: Arc<dyn Kernel>) -> Self {
        Self { validator, kernel }
    }

    /// Kernel this bridge dispatches to.
    pub fn kernel(&self) -> Arc<dyn Kernel> {
        Arc::clone(&self.kernel)
    }

    /// Origin validator guarding this bridge.
    pub fn validator(&self) -> &OriginValidator {
        &self.validator
    }

    /// Authenticate and decode one inbound message.
    ///
    /// The origin is checked before anything else is read. Only the first
    /// reply port is used; any extra ports are dropped.
    ///
    /// # Errors
    ///
    /// Returns the [`Rejection`] explaining why the message must be dropped.
    pub fn accept(&self, message: InboundMessage) -> Result<RequestEnvelope, Rejection> {
        let InboundMessage {
            origin,
            data,
            ports,
        } = message;

        if !self.validator.is_authorized(&origin) {
            return Err(Rejection::Unauthorized(origin));
        }

        let reply = ports
            .into_iter()
            .next()
            .ok_or(Rejection::MissingReplyPort)?;

        let command = Command::decode(data)?;

        Ok(RequestEnvelope {
            id: Uuid::new_v4(),
            command,
            reply,
        })
    }

    /// Run the consumer loop until shutdown is signalled or the listener ends.
    ///
    /// On exit the listener is closed first, so queued and future messages
    /// are never handled. In-flight operations then get `drain_timeout` to
    /// finish; the rest are aborted and replied to with
    /// [`KernelError::Aborted`].
    pub async fn run(
        self,
        mut listener: Listener,
        mut shutdown_rx: watch::Receiver<bool>,
        drain_timeout: Duration,
    ) -> BridgeStats {
        let mut stats = BridgeStats::default();
        let mut ops: JoinSet<Result<(), KernelError>> = JoinSet::new();
        let mut pending: HashMap<Id, Pending> = HashMap::new();

        info!(origin_rule = %self.validator.describe(), "command bridge listening");

        loop {
            tokio::select! {
                biased;
                changed = shutdown_rx.changed() => {
                    let stop = changed.is_err() || *shutdown_rx.borrow();
                    if stop {
                        debug!("command bridge shutdown requested");
                        break;
                    }
                }
                Some(done) = ops.join_next_with_id(), if !ops.is_empty() => {
                    complete(done, &mut pending, &mut stats);
                }
                message = listener.recv() => {
                    let Some(message) = message else {
                        debug!("transport closed");
                        break;
                    };
                    self.handle(message, &mut ops, &mut pending, &mut stats);
                }
            }
        }

        listener.close();
        drop(listener);

        if !ops.is_empty() {
            info!(in_flight = ops.len(), "draining in-flight operations");
            let drained = tokio::time::timeout(drain_timeout, async {
                while let Some(done) = ops.join_next_with_id().await {
                    complete(done, &mut pending, &mut stats);
                }
            })
            .await;

            if drained.is_err() {
                warn!(remaining = ops.len(), "drain timed out, aborting operations");
                ops.abort_all();
                while let Some(done) = ops.join_next_with_id().await {
                    complete(done, &mut pending, &mut stats);
                }
            }
        }

        info!(
            accepted = stats.accepted,
            dropped = stats.dropped,
            acked = stats.acked,
            failed = stats.failed,
            "command bridge stopped"
        );
        stats
    }

    fn handle(
        &self,
        message: InboundMessage,
        ops: &mut JoinSet<Result<(), KernelError>>,
        pending: &mut HashMap<Id, Pending>,
        stats: &mut BridgeStats,
    ) {
        let envelope = match self.accept(message) {
            Ok(envelope) => envelope,
            Err(rejection) => {
                debug!(reason = %rejection, "inbound message dropped");
                stats.dropped = stats.dropped.saturating_add(1);
                return;
            }
        };
        stats.accepted = stats.accepted.saturating_add(1);

        let RequestEnvelope {
            id,
            command,
            reply,
        } = envelope;
        let tag = command.tag();
        log_start(id, &command);

        let kernel = Arc::clone(&self.kernel);
        let handle = ops.spawn(async move { execute(kernel.as_ref(), &command).await });
        pending.insert(
            handle.id(),
            Pending {
                request_id: id,
                tag,
                reply,
            },
        );
    }
}

/// Invoke the kernel operation matching `command`.
///
/// # Errors
///
/// Returns the kernel's error unchanged.
pub async fn execute(kernel: &dyn Kernel, command: &Command) -> Result<(), KernelError> {
    match command {
        Command::WriteFile { path, content } => kernel.write_file(path, content).await,
        Command::RenameFile { old_path, new_path } => kernel.rename_file(old_path, new_path).await,
        Command::Unlink { path } => kernel.unlink(path).await,
        Command::Install { requirements } => kernel.install(requirements).await,
    }
}

fn complete(
    done: Result<(Id, Result<(), KernelError>), JoinError>,
    pending: &mut HashMap<Id, Pending>,
    stats: &mut BridgeStats,
) {
    let (task_id, outcome) = match done {
        Ok((task_id, outcome)) => (task_id, outcome),
        Err(join_err) => {
            let reason = if join_err.is_panic() {
                "kernel operation panicked"
            } else {
                "kernel operation cancelled"
            };
            (
                join_err.id(),
                Err(KernelError::Aborted {
                    reason: reason.to_owned(),
                }),
            )
        }
    };

    let Some(entry) = pending.remove(&task_id) else {
        warn!(task_id = %task_id, "completed operation has no pending reply");
        return;
    };

    log_outcome(&entry, &outcome);
    match outcome {
        Ok(()) => stats.acked = stats.acked.saturating_add(1),
        Err(_) => stats.failed = stats.failed.saturating_add(1),
    }

    if !entry.reply.send(Reply::from_outcome(outcome)) {
        debug!(request_id = %entry.request_id, "reply port closed before reply");
    }
}

fn log_start(id: Uuid, command: &Command) {
    match command {
        Command::WriteFile { path, content } => {
            let bytes = content.as_bytes().len();
            debug!(request_id = %id, path = %path, bytes, "writing file");
        }
        Command::RenameFile { old_path, new_path } => {
            debug!(request_id = %id, from = %old_path, to = %new_path, "renaming file");
        }
        Command::Unlink { path } => {
            debug!(request_id = %id, path = %path, "removing file");
        }
        Command::Install { requirements } => {
            info!(request_id = %id, requirements = ?requirements, "installing");
        }
    }
}

fn log_outcome(entry: &Pending, outcome: &Result<(), KernelError>) {
    match (entry.tag, outcome) {
        ("install", Ok(())) => info!(request_id = %entry.request_id, "successfully installed"),
        (tag, Ok(())) => debug!(request_id = %entry.request_id, command = tag, "command completed"),
        (tag, Err(e)) => {
            let summary = match tag {
                "file:write" => "failed to write the file",
                "file:rename" => "failed to rename the file",
                "file:unlink" => "failed to remove the file",
                _ => "failed to install",
            };
            warn!(request_id = %entry.request_id, command = tag, error = %e, "{summary}");
        }
    }
}
