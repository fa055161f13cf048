//! Ticket submission endpoint.

use crate::error::AppError;
use crate::state::AppState;
use crate::ticket::{Ticket, TicketResponse};
use axum::{Json, extract::State, extract::rejection::JsonRejection};

/// Validate a ticket and publish it to the configured queue.
///
/// # Endpoint
///
/// ```text
/// POST /ticket
/// ```
///
/// # Status Codes
///
/// - 200 OK: ticket published
/// - 400 Bad Request: malformed JSON or failed validation
/// - 500 Internal Server Error: the relay could not publish
///
/// # Errors
///
/// Returns [`AppError`] for the 400 and 500 cases.
pub async fn create_ticket(
    State(state): State<AppState>,
    payload: Result<Json<Ticket>, JsonRejection>,
) -> Result<Json<TicketResponse>, AppError> {
    let Json(ticket) = payload?;

    ticket
        .validate()
        .map_err(|e| AppError::bad_request(format!("Invalid request payload: {e}")))?;

    state
        .client
        .publish(&state.queue_name, &ticket)
        .await
        .map_err(|e| {
            AppError::internal(format!("Failed to process ticket: {e}")).with_source(e.into())
        })?;

    tracing::info!(ticket_id = %ticket.ticket_id, queue = %state.queue_name, "Ticket submitted");
    Ok(Json(TicketResponse::submitted(ticket.ticket_id)))
}
