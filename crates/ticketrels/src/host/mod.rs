//! Extension points of the host tracker.
//!
//! The tracker calls into plugins only through the traits defined here.
//! Components are registered explicitly in an [`ExtensionRegistry`] when the
//! [`Environment`] is opened; there is no runtime discovery.
//!
//! Every callback receives the [`TicketStore`] of the transaction that is
//! saving the ticket, so a plugin's writes commit or roll back together with
//! the edit that triggered them.

mod environment;
mod registry;

pub use environment::{DATABASE_FILE_NAME, Environment};
pub use registry::ExtensionRegistry;

use crate::config::RelationsConfig;
use crate::db::TicketStore;
use crate::domain::{FieldError, Ticket, TicketChange, TicketDraft};
use crate::error::Result;
use crate::web::TicketPage;

/// The parts of an HTTP request that extension points look at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    /// Path below the tracker root, e.g. `/ticket/5`
    pub path: String,

    /// Authenticated user name
    pub author: String,

    /// Workflow action being performed (`resolve`, `reopen`, ...)
    pub action: Option<String>,

    /// Whether the user holds the ticket-create permission
    pub can_create_tickets: bool,
}

impl Request {
    /// A request by `author` with ticket-create permission.
    pub fn new(author: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            can_create_tickets: true,
            ..Self::default()
        }
    }

    /// Set the request path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Set the workflow action.
    #[must_use]
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Grant or revoke the ticket-create permission.
    #[must_use]
    pub fn with_create_permission(mut self, allowed: bool) -> Self {
        self.can_create_tickets = allowed;
        self
    }

    /// Workflow action, empty when none.
    #[must_use]
    pub fn action(&self) -> &str {
        self.action.as_deref().unwrap_or_default()
    }
}

/// Participates in creating and upgrading the tracker database.
pub trait SchemaParticipant: Send + Sync {
    /// Name under which the schema version is stored.
    fn name(&self) -> &'static str;

    /// Whether [`SchemaParticipant::upgrade_environment`] must run.
    fn environment_needs_upgrade(&self, store: &TicketStore<'_>, config: &RelationsConfig)
    -> Result<bool>;

    /// Create or migrate tables and register configuration.
    fn upgrade_environment(&self, store: &TicketStore<'_>, config: &mut RelationsConfig)
    -> Result<()>;
}

/// Observes ticket lifecycle events after they are written.
pub trait TicketChangeListener: Send + Sync {
    /// Called after a ticket is inserted.
    fn ticket_created(&self, store: &TicketStore<'_>, ticket: &Ticket) -> Result<()>;

    /// Called after a ticket is modified.
    fn ticket_changed(
        &self,
        store: &TicketStore<'_>,
        ticket: &Ticket,
        change: &TicketChange,
    ) -> Result<()>;

    /// Called after `author` deleted a ticket; `ticket` is its last state.
    fn ticket_deleted(&self, store: &TicketStore<'_>, ticket: &Ticket, author: &str) -> Result<()>;
}

/// Validates ticket edits before they are written.
pub trait TicketManipulator: Send + Sync {
    /// Return the problems found; an empty list accepts the edit.
    ///
    /// Implementations may rewrite `ticket.fields` to normalize values.
    fn validate_ticket(
        &self,
        store: &TicketStore<'_>,
        req: &Request,
        ticket: &mut TicketDraft,
    ) -> Result<Vec<FieldError>>;
}

/// Adjusts the data handed to page templates.
pub trait RequestFilter: Send + Sync {
    /// Called after the host has assembled the page data.
    fn post_process_request(
        &self,
        store: &TicketStore<'_>,
        req: &Request,
        page: &mut TicketPage,
    ) -> Result<()>;
}

/// Sends notifications about ticket changes made by plugins.
pub trait TicketNotifier: Send + Sync {
    /// A plugin appended `comment` to `ticket` on behalf of `author`.
    fn ticket_commented(&self, ticket: &Ticket, author: &str, comment: &str);
}
