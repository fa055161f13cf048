//! HTTP request handlers.
//!
//! This module contains all HTTP handlers organized by concern.

pub mod health;
pub mod metrics;
pub mod ticket;

pub use health::{health, liveness, readiness};
pub use metrics::metrics;
pub use ticket::create_ticket;
