//! Binds a [`CommandBridge`] to a [`Transport`] and tears it down again.
//!
//! Binding takes the transport's only listener slot and spawns the consumer
//! loop. [`Binding::unbind`] consumes the binding, so it can run at most once:
//! it stops the loop, waits for it to release the listener, and disposes the
//! kernel. Reply ports still held by editors after that simply never fire.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::bridge::{BridgeStats, CommandBridge};
use crate::kernel::Kernel;
use crate::transport::{Transport, TransportError};

/// Default time in-flight operations get to finish during unbind.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// A bridge actively listening on a transport.
pub struct Binding {
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<BridgeStats>>,
    kernel: Arc<dyn Kernel>,
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

/// Register `bridge` as the listener of `transport`.
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
///
/// Returns [`TransportError::ListenerTaken`] if another consumer is bound.
pub fn bind(
    transport: &Transport,
    bridge: CommandBridge,
    drain_timeout: Duration,
) -> Result<Binding, TransportError> {
    let listener = transport.take_listener()?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let kernel = bridge.kernel();

    let task = tokio::spawn(bridge.run(listener, shutdown_rx, drain_timeout));
    info!("bridge bound to transport");

    Ok(Binding {
        shutdown_tx,
        task: Some(task),
        kernel,
    })
}

impl Binding {
    /// Returns `true` while the consumer loop is running.
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop listening and dispose the kernel.
    ///
    /// When this returns the listener has been dropped, so no message is
    /// handled afterwards and further posts fail with
    /// [`TransportError::Closed`].
    pub async fn unbind(mut self) -> BridgeStats {
        let _ = self.shutdown_tx.send(true);

        let stats = match self.task.take() {
            Some(task) => match task.await {
                Ok(stats) => stats,
                Err(e) => {
                    warn!(error = %e, "bridge task ended abnormally");
                    BridgeStats::default()
                }
            },
            None => BridgeStats::default(),
        };

        self.kernel.dispose();
        info!("bridge unbound, kernel disposed");
        stats
    }
}

impl Drop for Binding {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.shutdown_tx.send(true);
        }
    }
}
