//! # Ticket Relay Testing
//!
//! Testing utilities for the ticket relay.
//!
//! This crate provides:
//! - [`InMemoryBroker`]: a scriptable broker implementing the core traits
//! - Helpers for decoding what the broker accepted
//!
//! ## Example
//!
//! ```ignore
//! use ticket_relay_testing::InMemoryBroker;
//! use ticket_relay_runtime::{ClientConfig, RelayClient};
//! use std::sync::Arc;
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_publish_survives_drop() {
//!     let broker = InMemoryBroker::with_queue("tickets");
//!     let client = RelayClient::new(Arc::new(broker.clone()), ClientConfig::new("tickets"))
//!         .await
//!         .unwrap();
//!
//!     broker.drop_connection("broker restarted");
//!     client.publish("tickets", &"hello").await.unwrap();
//! }
//! ```

pub mod broker_mocks;

/// Helpers for asserting on published messages.
pub mod helpers {
    use serde::de::DeserializeOwned;
    use ticket_relay_core::Publishing;

    /// Decode the JSON body of a published message.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if the body is not valid JSON for `T`.
    pub fn decode_body<T: DeserializeOwned>(publishing: &Publishing) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&publishing.body)
    }

    /// Routing keys of the given messages, in order.
    #[must_use]
    pub fn routing_keys(published: &[Publishing]) -> Vec<&str> {
        published.iter().map(|p| p.routing_key.as_str()).collect()
    }
}

pub use broker_mocks::{InMemoryBroker, InMemoryChannel, InMemoryConnection};
pub use helpers::decode_body;
