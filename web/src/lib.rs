//! HTTP front end of the ticket relay.
//!
//! Accepts support tickets from the web form, validates them and hands them
//! to the [`RelayClient`](ticket_relay_runtime::RelayClient), which publishes
//! them to RabbitMQ.
//!
//! # Request Flow
//!
//! 1. **HTTP Request** arrives at `POST /ticket`
//! 2. **Extract** the JSON body into a [`Ticket`]
//! 3. **Validate** required fields and the email address
//! 4. **Publish** through the relay client (bounded retries)
//! 5. **Map result** to a `{success, message, ticketId}` response
//!
//! # Example
//!
//! ```ignore
//! use ticket_relay_web::{build_router, AppState};
//!
//! let state = AppState::new(client, "support_tickets_queue");
//! let app = build_router(state);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;
pub mod ticket;

// Re-export key types for convenience
pub use config::Config;
pub use error::AppError;
pub use routes::build_router;
pub use state::AppState;
pub use ticket::{Ticket, TicketResponse};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
