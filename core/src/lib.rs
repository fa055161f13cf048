//! # Ticket Relay Core
//!
//! Core traits and types for the ticket relay.
//!
//! This crate defines the seam between the relay client and a message broker.
//! The client in `ticket-relay-runtime` only ever talks to the traits declared
//! here, so production code runs against RabbitMQ while tests run against an
//! in-memory broker.
//!
//! ## Core Concepts
//!
//! - **Broker**: Hands out connections
//! - **Connection**: One live link to the broker, signals out-of-band closure
//! - **Channel**: Carries publishes and passive queue inspections
//! - **Publishing**: A single message addressed to exchange + routing key
//!
//! ## Example
//!
//! ```ignore
//! use ticket_relay_core::broker::{Broker, Publishing};
//!
//! let connection = broker.connect().await?;
//! let channel = connection.open_channel().await?;
//! channel.publish(&Publishing::json("support_tickets_queue", body)).await?;
//! ```

#![forbid(unsafe_code)]

pub mod broker;

pub use broker::{
    Broker, BrokerChannel, BrokerConnection, BrokerError, BrokerFuture, ClosureNotifier,
    ConnectionClosed, JSON_CONTENT_TYPE, Publishing, QueueStatus,
};
