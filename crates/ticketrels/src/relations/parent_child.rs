//! Parent/child relations.
//!
//! The `parents` custom field of a child is the user-facing source; the
//! `ticketrels` table mirrors it as one row per edge so that children can be
//! looked up from the parent. The validator keeps the edge set acyclic, the
//! listener keeps the rows in step with the field.

use std::collections::HashSet;
use std::sync::Arc;

use crate::config::RelationsConfig;
use crate::db::TicketStore;
use crate::domain::{
    FieldError, PARENTS_FIELD, Ticket, TicketChange, TicketDraft, TicketId, TicketIdSet,
};
use crate::error::{Error, Result};
use crate::host::{Request, TicketChangeListener, TicketManipulator};
use crate::notify::CommentNotice;

/// Message for a `parents` value that is not an ID list.
pub const INVALID_LIST_MESSAGE: &str = "Not a valid list of ticket IDs";

/// Message for a ticket listing itself as a parent.
pub const SELF_PARENT_MESSAGE: &str = "A ticket cannot be a parent to itself";

/// Validates and maintains parent/child relations.
pub struct ParentChildRelations {
    config: Arc<RelationsConfig>,
}

impl ParentChildRelations {
    /// Create the component.
    pub fn new(config: Arc<RelationsConfig>) -> Self {
        Self { config }
    }

    /// Check every candidate parent, returning the errors and the accepted IDs.
    fn check_parents(
        &self,
        store: &TicketStore<'_>,
        draft: &TicketDraft,
        candidates: &TicketIdSet,
    ) -> Result<(Vec<FieldError>, TicketIdSet)> {
        let mut errors = Vec::new();
        let mut invalid = TicketIdSet::new();

        for id in candidates {
            if Some(id) == draft.id {
                invalid.insert(id);
                errors.push(FieldError::field(PARENTS_FIELD, SELF_PARENT_MESSAGE));
            } else if !store.ticket_exists(id)? {
                invalid.insert(id);
                errors.push(FieldError::field(
                    PARENTS_FIELD,
                    format!("Ticket #{id} does not exist"),
                ));
            }
        }

        let own_restricted = self.config.is_restricted(&draft.fields.status);
        for id in &candidates.difference(&invalid) {
            let status = store.ticket_status(id)?.ok_or(Error::TicketNotFound(id))?;
            // Any restricted status reads as "closed" to the user.
            if self.config.is_restricted(&status) && !own_restricted {
                errors.push(FieldError::field(
                    PARENTS_FIELD,
                    format!("Parent ticket #{id} is closed"),
                ));
                continue;
            }

            for chain in find_cycles(store, id, draft.id)? {
                invalid.insert(id);
                errors.push(FieldError::field(
                    PARENTS_FIELD,
                    format!("Circularity error: {}", format_chain(&chain)),
                ));
            }
        }

        Ok((errors, candidates.difference(&invalid)))
    }

    /// Bring relation rows in line with a changed `parents` field.
    fn sync_parents(
        &self,
        store: &TicketStore<'_>,
        ticket: &Ticket,
        old_text: &str,
        author: &str,
    ) -> Result<()> {
        let old_parents = TicketIdSet::from_stored(old_text);
        let new_parents = ticket.fields.parents();
        if old_parents == new_parents {
            return Ok(());
        }

        for parent in &old_parents.difference(&new_parents) {
            store.remove_child_relation(parent, ticket.id)?;
            let comment = format!(
                "Remove a child ticket #{} ({}).",
                ticket.id, ticket.fields.summary
            );
            Self::comment_on_parent(store, parent, author, &comment)?;
        }

        for parent in &new_parents.difference(&old_parents) {
            if !store.ticket_exists(parent)? {
                tracing::warn!(parent = %parent, child = %ticket.id, "Skipping unknown parent");
                continue;
            }
            store.add_child_relation(parent, ticket.id)?;
            let comment = format!(
                "Add a child ticket #{} ({}).",
                ticket.id, ticket.fields.summary
            );
            Self::comment_on_parent(store, parent, author, &comment)?;
        }

        tracing::debug!(
            ticket = %ticket.id,
            old = %old_parents,
            new = %new_parents,
            "Synchronized parent relations"
        );
        Ok(())
    }

    fn comment_on_parent(
        store: &TicketStore<'_>,
        parent: TicketId,
        author: &str,
        comment: &str,
    ) -> Result<()> {
        if !store.ticket_exists(parent)? {
            tracing::warn!(parent = %parent, "Skipping comment on unknown parent");
            return Ok(());
        }
        store.add_comment(parent, author, comment)?;
        store.queue_notice(CommentNotice {
            ticket: store.require_ticket(parent)?,
            author: author.to_string(),
            comment: comment.to_string(),
        });
        Ok(())
    }
}

/// Walk the ancestors of `candidate`, returning every cycle found.
///
/// Each chain starts at `candidate` and ends with the ID that closed the
/// loop: either an ID already on the chain, or `own` (the ticket being
/// saved), in which case the chain is closed back onto `candidate` through
/// the proposed edge.
fn find_cycles(
    store: &TicketStore<'_>,
    candidate: TicketId,
    own: Option<TicketId>,
) -> Result<Vec<Vec<TicketId>>> {
    let mut chain = vec![candidate];
    let mut explored = HashSet::from([candidate]);
    let mut found = Vec::new();
    walk_ancestors(store, own, &mut chain, &mut explored, &mut found)?;
    Ok(found)
}

fn walk_ancestors(
    store: &TicketStore<'_>,
    own: Option<TicketId>,
    chain: &mut Vec<TicketId>,
    explored: &mut HashSet<TicketId>,
    found: &mut Vec<Vec<TicketId>>,
) -> Result<()> {
    let Some(&node) = chain.last() else {
        return Ok(());
    };

    for parent in store.parents_of(node)? {
        if Some(parent) == own {
            let mut cycle = chain.clone();
            cycle.push(parent);
            cycle.push(chain[0]);
            found.push(cycle);
        } else if chain.contains(&parent) {
            let mut cycle = chain.clone();
            cycle.push(parent);
            found.push(cycle);
        } else if explored.insert(parent) {
            chain.push(parent);
            walk_ancestors(store, own, chain, explored, found)?;
            chain.pop();
        }
    }
    Ok(())
}

fn format_chain(chain: &[TicketId]) -> String {
    chain
        .iter()
        .map(|id| format!("#{id}"))
        .collect::<Vec<_>>()
        .join(" > ")
}

impl TicketManipulator for ParentChildRelations {
    fn validate_ticket(
        &self,
        store: &TicketStore<'_>,
        _req: &Request,
        ticket: &mut TicketDraft,
    ) -> Result<Vec<FieldError>> {
        let text = ticket.fields.parents_text().to_string();
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let checked = TicketIdSet::parse(&text)
            .and_then(|candidates| self.check_parents(store, ticket, &candidates));

        match checked {
            Ok((errors, valid)) => {
                ticket.fields.set(PARENTS_FIELD, valid.to_field_text());
                Ok(errors)
            }
            Err(Error::InvalidTicketId(token)) => {
                tracing::debug!(token = %token, "Rejected parents field");
                Ok(vec![FieldError::field(PARENTS_FIELD, INVALID_LIST_MESSAGE)])
            }
            Err(err) => {
                tracing::error!(error = %err, ticket = ?ticket.id, "Parent validation failed");
                Ok(vec![FieldError::field(PARENTS_FIELD, INVALID_LIST_MESSAGE)])
            }
        }
    }
}

impl TicketChangeListener for ParentChildRelations {
    fn ticket_created(&self, store: &TicketStore<'_>, ticket: &Ticket) -> Result<()> {
        self.sync_parents(store, ticket, "", &ticket.fields.reporter)
    }

    fn ticket_changed(
        &self,
        store: &TicketStore<'_>,
        ticket: &Ticket,
        change: &TicketChange,
    ) -> Result<()> {
        if !change.touches(PARENTS_FIELD) {
            return Ok(());
        }
        self.sync_parents(
            store,
            ticket,
            change.old_value(PARENTS_FIELD),
            &change.author,
        )
    }

    fn ticket_deleted(&self, store: &TicketStore<'_>, ticket: &Ticket, _author: &str) -> Result<()> {
        let removed = store.delete_relations_of(ticket.id)?;
        tracing::debug!(ticket = %ticket.id, removed, "Removed relation rows of deleted ticket");
        Ok(())
    }
}
