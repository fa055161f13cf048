//! Connection state shared between publishers and the supervisor.
//!
//! The state lives behind a `tokio::sync::RwLock` inside the client. Handles
//! only exist inside [`ConnectionState::Connected`], so "connected without a
//! channel" cannot be represented.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use ticket_relay_core::{BrokerChannel, BrokerConnection};

/// A live connection together with the channel opened over it.
pub(crate) struct Link {
    pub(crate) connection: Arc<dyn BrokerConnection>,
    pub(crate) channel: Arc<dyn BrokerChannel>,
    pub(crate) generation: u64,
    pub(crate) connected_at: DateTime<Utc>,
}

impl Link {
    pub(crate) fn new(
        connection: Box<dyn BrokerConnection>,
        channel: Box<dyn BrokerChannel>,
        generation: u64,
    ) -> Self {
        Self {
            connection: Arc::from(connection),
            channel: Arc::from(channel),
            generation,
            connected_at: Utc::now(),
        }
    }

    /// Close the channel, then the connection.
    ///
    /// Errors are expected when the link already died and are only logged.
    pub(crate) async fn release(self) {
        if let Err(e) = self.channel.close().await {
            tracing::debug!(generation = self.generation, error = %e, "Channel close failed");
        }
        if let Err(e) = self.connection.close().await {
            tracing::debug!(generation = self.generation, error = %e, "Connection close failed");
        }
    }
}

/// Mutually exclusive lifecycle states of the client's broker link.
pub(crate) enum ConnectionState {
    /// A handshake is in progress.
    Connecting,
    /// Both handles are live.
    Connected(Link),
    /// No link; the supervisor is (or will be) retrying.
    Disconnected { last_error: Option<String> },
    /// Terminal state after `close()`.
    Closed,
}

impl ConnectionState {
    pub(crate) const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// The current link, if connected.
    pub(crate) const fn link(&self) -> Option<&Link> {
        match self {
            Self::Connected(link) => Some(link),
            _ => None,
        }
    }

    /// Connected and the connection still reports itself open.
    pub(crate) fn is_live(&self) -> bool {
        self.link().is_some_and(|link| link.connection.is_open())
    }

    /// Take the link out if it belongs to `generation`, leaving `Disconnected`.
    ///
    /// Returns `None` for stale generations and non-connected states.
    pub(crate) fn detach(&mut self, generation: u64, reason: &str) -> Option<Link> {
        match self {
            Self::Connected(link) if link.generation == generation => {}
            _ => return None,
        }
        let previous = std::mem::replace(
            self,
            Self::Disconnected {
                last_error: Some(reason.to_string()),
            },
        );
        match previous {
            Self::Connected(link) => Some(link),
            _ => None,
        }
    }

    /// Read-only snapshot for diagnostics.
    pub(crate) fn phase(&self) -> ConnectionPhase {
        match self {
            Self::Connecting => ConnectionPhase::Connecting,
            Self::Connected(link) => ConnectionPhase::Connected {
                generation: link.generation,
                since: link.connected_at,
            },
            Self::Disconnected { last_error } => ConnectionPhase::Disconnected {
                last_error: last_error.clone(),
            },
            Self::Closed => ConnectionPhase::Closed,
        }
    }
}

/// Snapshot of the client's connection lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum ConnectionPhase {
    /// A handshake is in progress
    Connecting,
    /// Connected to the broker
    Connected {
        /// How many connections the client has established so far
        generation: u64,
        /// When this connection was established
        since: DateTime<Utc>,
    },
    /// Waiting for the supervisor to reconnect
    Disconnected {
        /// Why the last connection ended or the last attempt failed
        last_error: Option<String>,
    },
    /// The client was closed
    Closed,
}

impl ConnectionPhase {
    /// Whether the phase is [`ConnectionPhase::Connected`].
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }
}
