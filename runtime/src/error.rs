//! Error types for the relay client.

use thiserror::Error;
use ticket_relay_core::BrokerError;

/// Errors returned by [`RelayClient`](crate::RelayClient) operations.
///
/// Every variant carries enough of the underlying cause to tell "broker
/// unreachable" apart from "malformed payload" apart from "broker reachable
/// but queue misconfigured".
#[derive(Error, Debug)]
pub enum ClientError {
    /// The connect handshake failed.
    ///
    /// Returned by the constructor. After construction the supervisor
    /// recovers from these on its own.
    #[error("Failed to connect to broker: {0}")]
    Connection(#[source] BrokerError),

    /// The payload could not be encoded as JSON. Never retried.
    #[error("Failed to serialize payload: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No live channel was available.
    #[error("Not connected to broker")]
    NotConnected,

    /// Every publish attempt failed.
    #[error("Failed to publish message after {attempts} attempts: {source}")]
    PublishExhausted {
        /// Attempts made
        attempts: u32,
        /// Error from the final attempt
        #[source]
        source: BrokerError,
    },

    /// The socket is open but the broker did not answer a liveness probe.
    #[error("Broker unresponsive while inspecting queue '{queue}': {source}")]
    BrokerUnresponsive {
        /// Queue that was inspected
        queue: String,
        /// Underlying inspection failure
        #[source]
        source: BrokerError,
    },

    /// The client was closed.
    #[error("Client is closed")]
    Closed,
}

impl ClientError {
    /// Whether the failure may clear up on its own (reconnect, broker recovery).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connection(_)
                | Self::NotConnected
                | Self::PublishExhausted { .. }
                | Self::BrokerUnresponsive { .. }
        )
    }

    /// Short stable label, used as a metrics tag.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Serialization(_) => "serialization",
            Self::NotConnected => "not_connected",
            Self::PublishExhausted { .. } => "exhausted",
            Self::BrokerUnresponsive { .. } => "broker_unresponsive",
            Self::Closed => "closed",
        }
    }
}
