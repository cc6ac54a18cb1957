//! Tracker environment: database, configuration and registered components.
//!
//! Every ticket edit runs inside one database transaction:
//!
//! 1. the manipulators validate (and may normalize) the submitted fields,
//! 2. the ticket row is written,
//! 3. the change listeners run against the same transaction.
//!
//! Any error, including a validation failure, rolls the whole edit back.
//! Comment notices queued by the listeners go to the notifier only after
//! the commit.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use super::{ExtensionRegistry, Request, TicketNotifier};
use crate::config::{CONFIG_FILE_NAME, RelationsConfig};
use crate::db::Database;
use crate::domain::{ChangeRecord, Ticket, TicketDraft, TicketFields, TicketId, TicketUpdate};
use crate::error::{Error, Result};
use crate::notify::{CommentNotice, TracingNotifier};
use crate::web::{Href, Inline, TicketPage, render_list_cells};

/// Database file name inside an environment directory.
pub const DATABASE_FILE_NAME: &str = "trac.db";

/// A tracker instance with the relation components installed.
pub struct Environment {
    db: Database,
    config: Arc<RelationsConfig>,
    registry: ExtensionRegistry,
    notifier: Arc<dyn TicketNotifier>,
    href: Href,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("path", &self.db.path())
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl Environment {
    /// Install the relation components on `db`.
    ///
    /// Runs the schema upgrade first; when it changed the configuration and
    /// `config_path` is given, the configuration is saved there.
    ///
    /// # Errors
    ///
    /// Returns an error if the upgrade fails or the configuration cannot be
    /// saved.
    pub fn new(
        db: Database,
        mut config: RelationsConfig,
        config_path: Option<&Path>,
        notifier: Arc<dyn TicketNotifier>,
    ) -> Result<Self> {
        config.validate()?;

        let mut registry = ExtensionRegistry::new();
        crate::register_schema(&mut registry);
        let upgraded = db.transaction(|store| registry.upgrade(store, &mut config))?;
        if let Some(path) = config_path.filter(|_| upgraded) {
            config.save(path)?;
            tracing::info!(path = %path.display(), "Saved upgraded configuration");
        }

        let config = Arc::new(config);
        crate::register_components(&mut registry, &config);

        Ok(Self {
            href: Href::new(&config.base_path),
            db,
            config,
            registry,
            notifier,
        })
    }

    /// Open the environment stored in directory `dir`.
    ///
    /// Reads `ticketrels.yaml` (defaults when absent) and opens `trac.db`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the database
    /// cannot be opened or upgraded.
    pub fn open(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE_NAME);
        let config = RelationsConfig::load_or_default(&config_path)?;
        let db = Database::open(&dir.join(DATABASE_FILE_NAME))?;
        Self::new(db, config, Some(&config_path), Arc::new(TracingNotifier))
    }

    /// An environment backed by an in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the schema cannot
    /// be installed.
    pub fn in_memory(config: RelationsConfig) -> Result<Self> {
        Self::new(
            Database::open_in_memory()?,
            config,
            None,
            Arc::new(TracingNotifier),
        )
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &RelationsConfig {
        &self.config
    }

    /// Underlying database.
    #[must_use]
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Registered components.
    #[must_use]
    pub fn registry(&self) -> &ExtensionRegistry {
        &self.registry
    }

    /// Registered components, for installing further extensions.
    pub fn registry_mut(&mut self) -> &mut ExtensionRegistry {
        &mut self.registry
    }

    fn send_notices(&self, notices: &[CommentNotice]) {
        for notice in notices {
            notice.send(self.notifier.as_ref());
        }
    }

    /// Create a ticket on behalf of `req.author`.
    ///
    /// An empty reporter defaults to the requesting user.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` with every problem found when a validator
    /// rejects the ticket; nothing is written in that case.
    pub fn create_ticket(&self, req: &Request, fields: TicketFields) -> Result<Ticket> {
        let (ticket, notices) = self.db.transaction_with_notices(|store| {
            let mut draft = TicketDraft { id: None, fields };
            if draft.fields.reporter.is_empty() {
                draft.fields.reporter.clone_from(&req.author);
            }

            let errors = self.registry.validate(store, req, &mut draft)?;
            if !errors.is_empty() {
                return Err(Error::Validation(errors));
            }

            let ticket = store.insert_ticket(&draft.fields)?;
            self.registry.notify_created(store, &ticket)?;

            tracing::info!(ticket = %ticket.id, author = %req.author, "Created ticket");
            store.require_ticket(ticket.id)
        })?;
        self.send_notices(&notices);
        Ok(ticket)
    }

    /// Apply `update` to ticket `id` on behalf of `req.author`.
    ///
    /// Only the fields named in the update are written, in the form the
    /// validators normalized them to.
    ///
    /// # Errors
    ///
    /// Returns `Error::TicketNotFound` for an unknown ID and
    /// `Error::Validation` when a validator rejects the edit.
    pub fn update_ticket(&self, req: &Request, id: TicketId, update: &TicketUpdate) -> Result<Ticket> {
        let (ticket, notices) = self.db.transaction_with_notices(|store| {
            let current = store.require_ticket(id)?;
            let mut draft = TicketDraft {
                id: Some(id),
                fields: current.fields,
            };
            for (name, value) in &update.fields {
                draft.fields.set(name, value.clone());
            }

            let errors = self.registry.validate(store, req, &mut draft)?;
            if !errors.is_empty() {
                return Err(Error::Validation(errors));
            }

            let values: BTreeMap<String, String> = update
                .fields
                .keys()
                .map(|name| {
                    let value = draft.fields.get(name).unwrap_or_default();
                    (name.clone(), value.to_string())
                })
                .collect();
            let change = store.apply_update(id, &values, &req.author, &update.comment)?;
            if change.old_values.is_empty() && change.comment.is_empty() {
                tracing::debug!(ticket = %id, "Update changed nothing");
                return store.require_ticket(id);
            }

            let ticket = store.require_ticket(id)?;
            self.registry.notify_changed(store, &ticket, &change)?;

            tracing::info!(
                ticket = %id,
                author = %req.author,
                fields = ?change.old_values.keys().collect::<Vec<_>>(),
                "Updated ticket"
            );
            store.require_ticket(id)
        })?;
        self.send_notices(&notices);
        Ok(ticket)
    }

    /// Delete ticket `id` on behalf of `req.author`.
    ///
    /// # Errors
    ///
    /// Returns `Error::TicketNotFound` for an unknown ID.
    pub fn delete_ticket(&self, req: &Request, id: TicketId) -> Result<()> {
        let ((), notices) = self.db.transaction_with_notices(|store| {
            let ticket = store.require_ticket(id)?;
            store.delete_ticket(id)?;
            self.registry.notify_deleted(store, &ticket, &req.author)?;

            tracing::info!(ticket = %id, author = %req.author, "Deleted ticket");
            Ok(())
        })?;
        self.send_notices(&notices);
        Ok(())
    }

    /// Load a ticket.
    ///
    /// # Errors
    ///
    /// Returns `Error::Database` on storage failure.
    pub fn get_ticket(&self, id: TicketId) -> Result<Option<Ticket>> {
        self.db.query(|store| store.get_ticket(id))
    }

    /// Change history of a ticket, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `Error::Database` on storage failure.
    pub fn changes(&self, id: TicketId) -> Result<Vec<ChangeRecord>> {
        self.db.query(|store| store.changes(id))
    }

    /// Page data for viewing ticket `id`, after all request filters ran.
    ///
    /// # Errors
    ///
    /// Returns `Error::TicketNotFound` for an unknown ID.
    pub fn ticket_page(&self, req: &Request, id: TicketId) -> Result<TicketPage> {
        self.db.query(|store| {
            let ticket = store.require_ticket(id)?;
            let history = store.changes(id)?;
            let mut page = TicketPage::for_ticket(&ticket, &history);
            self.registry.filter_page(store, req, &mut page)?;
            Ok(page)
        })
    }

    /// Page data for the new-ticket form pre-filled with `fields`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Database` on storage failure.
    pub fn new_ticket_page(&self, req: &Request, fields: TicketFields) -> Result<TicketPage> {
        self.db.query(|store| {
            let mut page = TicketPage::for_new_ticket(fields);
            self.registry.filter_page(store, req, &mut page)?;
            Ok(page)
        })
    }

    /// Render the `parents`/`refs` columns of a query result row as links.
    ///
    /// # Errors
    ///
    /// Returns `Error::Database` on storage failure.
    pub fn render_query_row(
        &self,
        row: &BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, Vec<Inline>>> {
        self.db.query(|store| render_list_cells(store, &self.href, row))
    }
}
