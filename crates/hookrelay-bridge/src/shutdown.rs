//! Graceful shutdown: stop intake, flush the queue, then stop.
//!
//! The coordinator moves through `Running → Draining → Stopped`. Draining
//! cancels the router, appends the final meta notification, closes the queue
//! and waits for the dispatcher to drain it. The whole drain runs under a
//! deadline; if it expires the dispatcher is aborted and the state is left
//! at `Draining`.

use std::{sync::Arc, time::Duration};

use hookrelay_core::{Clock, QueuedNotification};
use hookrelay_delivery::{DeliveryQueue, DispatchStats};
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    error::{BridgeError, Result},
    router::RouterStats,
};

/// Lifecycle state of the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    /// Accepting and delivering messages.
    Running,
    /// Intake stopped, flushing the queue.
    Draining,
    /// Everything delivered.
    Stopped,
}

/// Handle to the router task.
pub type RouterTask = JoinHandle<Result<RouterStats>>;

/// Handle to the dispatcher task.
pub type DispatcherTask = JoinHandle<hookrelay_delivery::Result<DispatchStats>>;

/// Summary of a completed drain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Router counters at the moment it stopped.
    pub routed: RouterStats,
    /// Dispatcher counters after the queue was drained.
    pub dispatched: DispatchStats,
}

/// Drives the shutdown sequence.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    state: watch::Sender<ShutdownState>,
    router_cancellation: CancellationToken,
    queue: DeliveryQueue,
    meta_destination: String,
    drain_timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl ShutdownCoordinator {
    /// Creates a coordinator in the `Running` state.
    pub fn new(
        queue: DeliveryQueue,
        meta_destination: impl Into<String>,
        drain_timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (state, _) = watch::channel(ShutdownState::Running);
        Self {
            state,
            router_cancellation: CancellationToken::new(),
            queue,
            meta_destination: meta_destination.into(),
            drain_timeout,
            clock,
        }
    }

    /// Token the router watches; cancelled when draining starts.
    pub fn router_cancellation(&self) -> CancellationToken {
        self.router_cancellation.clone()
    }

    /// Subscribes to state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ShutdownState> {
        self.state.subscribe()
    }

    /// Current state.
    pub fn state(&self) -> ShutdownState {
        *self.state.borrow()
    }

    /// Runs the drain sequence to completion or until the deadline.
    ///
    /// # Errors
    ///
    /// - `DrainTimeout` if the deadline expires; the dispatcher is aborted
    /// - `Delivery` if the dispatcher hit a fatal error while draining
    /// - `TaskFailed` if a task panicked
    pub async fn drain(
        &self,
        router: RouterTask,
        dispatcher: DispatcherTask,
    ) -> Result<ShutdownReport> {
        self.state.send_replace(ShutdownState::Draining);
        info!(timeout_s = self.drain_timeout.as_secs_f64(), "draining");

        self.router_cancellation.cancel();
        let router_abort = router.abort_handle();
        let dispatcher_abort = dispatcher.abort_handle();

        let drained =
            tokio::time::timeout(self.drain_timeout, self.flush(router, dispatcher)).await;

        match drained {
            Ok(Ok(report)) => {
                self.state.send_replace(ShutdownState::Stopped);
                info!(
                    delivered = report.dispatched.delivered,
                    rate_limited = report.dispatched.rate_limited,
                    "drain complete"
                );
                Ok(report)
            },
            Ok(Err(e)) => Err(e),
            Err(_) => {
                router_abort.abort();
                dispatcher_abort.abort();
                error!(
                    timeout_s = self.drain_timeout.as_secs_f64(),
                    pending = self.queue.len(),
                    "drain deadline exceeded, aborting dispatcher"
                );
                Err(BridgeError::DrainTimeout { timeout: self.drain_timeout })
            },
        }
    }

    async fn flush(
        &self,
        router: RouterTask,
        dispatcher: DispatcherTask,
    ) -> Result<ShutdownReport> {
        let routed = match router.await {
            Ok(Ok(stats)) => stats,
            Ok(Err(e)) => {
                warn!("router stopped with error during drain: {}", e);
                RouterStats::default()
            },
            Err(e) => return Err(BridgeError::task_failed("router", e.to_string())),
        };

        let notice =
            QueuedNotification::shutdown_notice(&self.meta_destination, self.clock.now_utc());
        if self.queue.enqueue(notice).await.is_err() {
            warn!("delivery queue already closed, shutdown notice not sent");
        }
        self.queue.close();

        let dispatched = match dispatcher.await {
            Ok(Ok(stats)) => stats,
            Ok(Err(e)) => return Err(BridgeError::Delivery(e)),
            Err(e) => return Err(BridgeError::task_failed("dispatcher", e.to_string())),
        };

        Ok(ShutdownReport { routed, dispatched })
    }
}
