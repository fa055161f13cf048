//! Background reconnection supervisor.
//!
//! One task per client, spawned after the initial connect succeeds:
//!
//! ```text
//!            closure signal               connect() ok
//!   Idle ───────────────────▶ Retrying ───────────────▶ Idle
//!    │                          │  ▲
//!    │                          │  │ connect() failed,
//!    │                          └──┘ wait reconnect delay
//!    │ shutdown                 │ shutdown
//!    ▼                          ▼
//!  Stopped ◀────────────────────┘
//! ```
//!
//! Shutdown is checked at every loop boundary and raced against every wait.
//! An in-flight handshake is allowed to finish so its handles can be
//! released. On exit the task tears down whatever link is still installed,
//! which is how a client dropped without `close()` gives its connection back.

use crate::client::Shared;
use crate::error::ClientError;
use crate::metrics::RelayMetrics;
use std::ops::ControlFlow;
use std::sync::Arc;
use ticket_relay_core::ConnectionClosed;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

pub(crate) struct Supervisor {
    shared: Arc<Shared>,
    closures: mpsc::UnboundedReceiver<ConnectionClosed>,
    shutdown: watch::Receiver<bool>,
}

impl Supervisor {
    pub(crate) fn new(
        shared: Arc<Shared>,
        closures: mpsc::UnboundedReceiver<ConnectionClosed>,
    ) -> Self {
        let shutdown = shared.subscribe_shutdown();
        Self {
            shared,
            closures,
            shutdown,
        }
    }

    pub(crate) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }

    async fn run(mut self) {
        tracing::debug!("Reconnection supervisor started");

        loop {
            if self.is_shutdown() {
                break;
            }

            let closed = tokio::select! {
                biased;
                _ = self.shutdown.changed() => break,
                closed = self.closures.recv() => match closed {
                    Some(closed) => closed,
                    None => break,
                },
            };

            if !self.shared.detach_dropped(&closed).await {
                tracing::debug!(
                    generation = closed.generation,
                    "Ignoring closure signal for a connection that is no longer current"
                );
                continue;
            }

            tracing::warn!(
                generation = closed.generation,
                reason = %closed.reason,
                "Broker connection closed"
            );

            if self.reconnect().await.is_break() {
                break;
            }
        }

        // Only a dropped client leaves a link behind; close() has already
        // moved the state to Closed.
        if self.shared.shut_down().await {
            tracing::info!("Released broker connection of a dropped client");
        }

        tracing::debug!("Reconnection supervisor stopped");
    }

    /// Retry `connect()` until it succeeds or the client shuts down.
    async fn reconnect(&mut self) -> ControlFlow<()> {
        let delay = self.shared.config.reconnect.delay;
        let mut attempt: u64 = 0;

        loop {
            if self.is_shutdown() {
                return ControlFlow::Break(());
            }

            attempt += 1;
            RelayMetrics::record_reconnect_attempt();
            tracing::info!(attempt, "Attempting to reconnect to broker");

            // Not raced against shutdown: a handshake abandoned midway can
            // still complete on the broker side, and connect() releases the
            // fresh handles itself when it finds the client closed.
            match self.shared.connect().await {
                Ok(()) => {
                    tracing::info!(attempt, "Successfully reconnected to broker");
                    return ControlFlow::Continue(());
                }
                Err(ClientError::Closed) => return ControlFlow::Break(()),
                Err(e) => {
                    tracing::warn!(
                        attempt,
                        error = %e,
                        retry_in_ms = delay.as_millis(),
                        "Failed to reconnect to broker"
                    );
                }
            }

            tokio::select! {
                biased;
                _ = self.shutdown.changed() => return ControlFlow::Break(()),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}
