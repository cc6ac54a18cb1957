//! Change notifications.

use crate::domain::Ticket;
use crate::host::TicketNotifier;

/// A comment written by a plugin, sent to the notifier once the
/// transaction that wrote it has committed.
#[derive(Debug, Clone)]
pub struct CommentNotice {
    /// Commented ticket, as of the end of the transaction
    pub ticket: Ticket,

    /// Author of the comment
    pub author: String,

    /// Comment text
    pub comment: String,
}

impl CommentNotice {
    /// Deliver the notice.
    pub fn send(&self, notifier: &dyn TicketNotifier) {
        notifier.ticket_commented(&self.ticket, &self.author, &self.comment);
    }
}

/// Notifier that emits a structured log event per notification.
///
/// Used when the tracker has no mail delivery configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl TicketNotifier for TracingNotifier {
    fn ticket_commented(&self, ticket: &Ticket, author: &str, comment: &str) {
        tracing::info!(
            ticket = %ticket.id,
            author,
            comment,
            modtime = %ticket.changetime,
            "Ticket updated by relation change"
        );
    }
}
