//! Error types for ticket relation operations.
//!
//! Errors fall into two groups:
//!
//! - **Infrastructure**: database, I/O and configuration failures. These abort
//!   the surrounding transaction.
//! - **Input**: validation failures collected from the registered ticket
//!   manipulators. These block the edit and carry one [`FieldError`] per problem
//!   so the host can attach them to the edit form.

use crate::domain::{FieldError, TicketId};
use thiserror::Error;

/// Result type for ticket relation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for ticket relation operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// The requested ticket does not exist
    #[error("ticket not found: #{0}")]
    TicketNotFound(TicketId),

    /// Text could not be parsed as a list of ticket IDs
    #[error("invalid ticket ID '{0}'")]
    InvalidTicketId(String),

    /// One or more validators rejected a ticket edit
    #[error("ticket validation failed: {}", format_field_errors(.0))]
    Validation(Vec<FieldError>),

    /// Inserting a parent/child edge would close a cycle
    #[error("circular relation: #{parent} cannot be a parent of #{child}")]
    CircularRelation {
        /// Proposed parent ticket
        parent: TicketId,
        /// Proposed child ticket
        child: TicketId,
    },

    /// Internal invariant failure (e.g. a poisoned lock)
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns the field errors when this is a validation failure.
    #[must_use]
    pub fn field_errors(&self) -> Option<&[FieldError]> {
        match self {
            Self::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}

fn format_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
