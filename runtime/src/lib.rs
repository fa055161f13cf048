//! # Ticket Relay Runtime
//!
//! The resilient publishing client at the heart of the ticket relay.
//!
//! ## Core Components
//!
//! - **Connection Manager**: Performs the connect handshake and swaps handles
//!   into the shared state under the write lock
//! - **Reconnection Supervisor**: Background task that re-establishes the link
//!   after an out-of-band closure, retrying with a fixed delay
//! - **Publish Service**: Serializes payloads to JSON and sends them with a
//!   bounded number of attempts
//! - **Health Reporter**: Non-blocking connectivity check and an active broker
//!   probe for liveness endpoints
//!
//! ## Example
//!
//! ```ignore
//! use ticket_relay_runtime::{ClientConfig, RelayClient};
//! use std::sync::Arc;
//!
//! let client = RelayClient::new(broker, ClientConfig::new("support_tickets_queue")).await?;
//!
//! client.publish("support_tickets_queue", &ticket).await?;
//!
//! if client.health_check().await.is_err() {
//!     tracing::warn!("Broker is not answering");
//! }
//!
//! client.close().await;
//! ```

#![forbid(unsafe_code)]

mod client;
mod state;
mod supervisor;

/// Error types for the relay client
pub mod error;

/// Health check records for probe endpoints
pub mod health;

/// Prometheus metrics for observability
pub mod metrics;

/// Fixed-delay publish and reconnect policies
pub mod policy;

pub use client::{ClientConfig, RelayClient};
pub use error::ClientError;
pub use health::{HealthCheck, HealthStatus};
pub use policy::{PublishPolicy, ReconnectPolicy};
pub use state::ConnectionPhase;
pub use ticket_relay_core::QueueStatus;
