//! Explicit registration of extension components.

use std::sync::Arc;

use super::{
    Request, RequestFilter, SchemaParticipant, TicketChangeListener, TicketManipulator,
};
use crate::config::RelationsConfig;
use crate::db::TicketStore;
use crate::domain::{FieldError, Ticket, TicketChange, TicketDraft};
use crate::error::Result;
use crate::web::TicketPage;

/// Components registered for each extension point, in registration order.
#[derive(Default, Clone)]
pub struct ExtensionRegistry {
    schema_participants: Vec<Arc<dyn SchemaParticipant>>,
    change_listeners: Vec<Arc<dyn TicketChangeListener>>,
    manipulators: Vec<Arc<dyn TicketManipulator>>,
    request_filters: Vec<Arc<dyn RequestFilter>>,
}

impl std::fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("schema_participants", &self.schema_participants.len())
            .field("change_listeners", &self.change_listeners.len())
            .field("manipulators", &self.manipulators.len())
            .field("request_filters", &self.request_filters.len())
            .finish()
    }
}

impl ExtensionRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema participant.
    pub fn add_schema_participant(&mut self, participant: Arc<dyn SchemaParticipant>) {
        self.schema_participants.push(participant);
    }

    /// Register a ticket change listener.
    pub fn add_change_listener(&mut self, listener: Arc<dyn TicketChangeListener>) {
        self.change_listeners.push(listener);
    }

    /// Register a ticket manipulator.
    pub fn add_manipulator(&mut self, manipulator: Arc<dyn TicketManipulator>) {
        self.manipulators.push(manipulator);
    }

    /// Register a request filter.
    pub fn add_request_filter(&mut self, filter: Arc<dyn RequestFilter>) {
        self.request_filters.push(filter);
    }

    /// Run every schema participant that reports it needs an upgrade.
    ///
    /// Returns `true` if at least one upgrade ran.
    pub(crate) fn upgrade(
        &self,
        store: &TicketStore<'_>,
        config: &mut RelationsConfig,
    ) -> Result<bool> {
        let mut upgraded = false;
        for participant in &self.schema_participants {
            if participant.environment_needs_upgrade(store, config)? {
                tracing::info!(participant = participant.name(), "Upgrading environment");
                participant.upgrade_environment(store, config)?;
                upgraded = true;
            }
        }
        Ok(upgraded)
    }

    /// Collect field errors from every manipulator.
    pub(crate) fn validate(
        &self,
        store: &TicketStore<'_>,
        req: &Request,
        ticket: &mut TicketDraft,
    ) -> Result<Vec<FieldError>> {
        let mut errors = Vec::new();
        for manipulator in &self.manipulators {
            errors.extend(manipulator.validate_ticket(store, req, ticket)?);
        }
        Ok(errors)
    }

    pub(crate) fn notify_created(&self, store: &TicketStore<'_>, ticket: &Ticket) -> Result<()> {
        for listener in &self.change_listeners {
            listener.ticket_created(store, ticket)?;
        }
        Ok(())
    }

    pub(crate) fn notify_changed(
        &self,
        store: &TicketStore<'_>,
        ticket: &Ticket,
        change: &TicketChange,
    ) -> Result<()> {
        for listener in &self.change_listeners {
            listener.ticket_changed(store, ticket, change)?;
        }
        Ok(())
    }

    pub(crate) fn notify_deleted(
        &self,
        store: &TicketStore<'_>,
        ticket: &Ticket,
        author: &str,
    ) -> Result<()> {
        for listener in &self.change_listeners {
            listener.ticket_deleted(store, ticket, author)?;
        }
        Ok(())
    }

    pub(crate) fn filter_page(
        &self,
        store: &TicketStore<'_>,
        req: &Request,
        page: &mut TicketPage,
    ) -> Result<()> {
        for filter in &self.request_filters {
            filter.post_process_request(store, req, page)?;
        }
        Ok(())
    }
}
