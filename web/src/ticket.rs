//! Support ticket payload and response bodies.

use serde::{Deserialize, Serialize};
use thiserror::Error;

const MAX_EMAIL_LEN: usize = 254;

/// A customer support ticket as submitted by the web form.
///
/// The relay forwards this exact JSON shape to the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Client-generated ticket identifier
    pub ticket_id: String,
    /// Name of the customer
    pub customer_name: String,
    /// Contact address of the customer
    pub customer_email: String,
    /// Free-text problem description
    pub issue: String,
}

/// Why a ticket was rejected before publishing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TicketValidationError {
    /// A required field is empty or whitespace
    #[error("field '{0}' is required")]
    Missing(&'static str),

    /// The email address is malformed
    #[error("field 'customer_email' is not a valid email address")]
    InvalidEmail,
}

impl Ticket {
    /// Check required fields and the email format.
    ///
    /// # Errors
    ///
    /// Returns the first problem found, in field order.
    pub fn validate(&self) -> Result<(), TicketValidationError> {
        let fields = [
            ("ticket_id", &self.ticket_id),
            ("customer_name", &self.customer_name),
            ("customer_email", &self.customer_email),
            ("issue", &self.issue),
        ];
        if let Some((name, _)) = fields.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(TicketValidationError::Missing(*name));
        }

        if !is_valid_email(&self.customer_email) {
            return Err(TicketValidationError::InvalidEmail);
        }
        Ok(())
    }
}

/// Validate email address format.
///
/// Accepts `local@domain` where the domain has at least two non-empty
/// dot-separated labels. Not a full RFC 5322 parser.
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    if email.len() < 3 || email.len() > MAX_EMAIL_LEN {
        return false;
    }

    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }

    let local_ok = local
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '.' | '-' | '+' | '_'));
    let domain_ok = domain
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '.' | '-'));

    local_ok
        && domain_ok
        && domain.contains('.')
        && domain.split('.').all(|label| !label.is_empty())
}

/// Response body for `POST /ticket`, success or failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketResponse {
    /// Whether the ticket was accepted
    pub success: bool,
    /// Human-readable outcome
    pub message: String,
    /// Echo of the accepted ticket's id
    #[serde(rename = "ticketId", skip_serializing_if = "Option::is_none", default)]
    pub ticket_id: Option<String>,
}

impl TicketResponse {
    /// Body for an accepted ticket.
    #[must_use]
    pub fn submitted(ticket_id: impl Into<String>) -> Self {
        Self {
            success: true,
            message: "Ticket submitted successfully".to_string(),
            ticket_id: Some(ticket_id.into()),
        }
    }

    /// Body for a rejected request.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            ticket_id: None,
        }
    }
}
