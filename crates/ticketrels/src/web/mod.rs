//! Relations shown on ticket pages.
//!
//! The host assembles a [`TicketPage`] for `/ticket/<id>` and `/newticket`;
//! [`RelationsModule`] then fills in the relation parts: linked `parents`
//! and `refs` fields, the child tree, the reference table, the "add" links,
//! and readable renderings of `parents`/`refs` history entries. The page is
//! plain serializable data for the template layer.
//!
//! The same component validates workflow actions: a parent cannot be
//! resolved while it has open children, and a child cannot be reopened under
//! a closed parent.

pub mod links;
pub mod tree;

pub use links::{Href, Inline, TicketLink, link_ref, link_refs_line, shorten_line};
pub use tree::{ChildRow, child_rows};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::RelationsConfig;
use crate::db::TicketStore;
use crate::domain::{
    COMMENT_FIELD, ChangeRecord, FieldError, PARENTS_FIELD, REFS_FIELD, Ticket, TicketDraft,
    TicketFields, TicketId, TicketIdSet,
};
use crate::error::Result;
use crate::host::{Request, RequestFilter, TicketManipulator};
use links::{SUMMARY_WIDTH, existing_links};

/// Fields copied into the new-ticket form by the "add reference" link.
pub const COPY_TICKET_FIELDS: &[&str] = &[
    "cc",
    "component",
    "keywords",
    "milestone",
    "owner",
    "priority",
    "type",
    "version",
];

/// Fields whose values are ticket ID lists.
const LIST_FIELDS: &[&str] = &[PARENTS_FIELD, REFS_FIELD];

/// Data handed to the ticket page template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TicketPage {
    /// Ticket being shown, `None` on the new-ticket form
    pub ticket_id: Option<TicketId>,
    /// Field values
    pub fields: TicketFields,
    /// Change history, oldest first
    pub changes: Vec<ChangeGroup>,
    /// Field renderings that replace the raw value
    pub rendered_fields: BTreeMap<String, Vec<Inline>>,
    /// Relations section
    pub relations: Option<RelationsView>,
}

impl TicketPage {
    /// Page for an existing ticket.
    #[must_use]
    pub fn for_ticket(ticket: &Ticket, history: &[ChangeRecord]) -> Self {
        Self {
            ticket_id: Some(ticket.id),
            fields: ticket.fields.clone(),
            changes: ChangeGroup::group(history),
            rendered_fields: BTreeMap::new(),
            relations: None,
        }
    }

    /// Page for the new-ticket form.
    #[must_use]
    pub fn for_new_ticket(fields: TicketFields) -> Self {
        Self {
            ticket_id: None,
            fields,
            changes: Vec::new(),
            rendered_fields: BTreeMap::new(),
            relations: None,
        }
    }
}

/// Changes made together by one author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeGroup {
    /// When the change was made
    pub time: DateTime<Utc>,
    /// Who made it
    pub author: String,
    /// Comment text, empty when none
    pub comment: String,
    /// Changed fields by name
    pub fields: BTreeMap<String, FieldChange>,
}

impl ChangeGroup {
    /// Group history rows sharing a timestamp and author.
    #[must_use]
    pub fn group(history: &[ChangeRecord]) -> Vec<Self> {
        let mut groups: Vec<Self> = Vec::new();
        for record in history {
            let same_group = matches!(
                groups.last(),
                Some(last) if last.time == record.time && last.author == record.author
            );
            if !same_group {
                groups.push(Self {
                    time: record.time,
                    author: record.author.clone(),
                    comment: String::new(),
                    fields: BTreeMap::new(),
                });
            }
            let Some(group) = groups.last_mut() else {
                continue;
            };

            if record.field == COMMENT_FIELD {
                group.comment.clone_from(&record.new_value);
            } else {
                group.fields.insert(
                    record.field.clone(),
                    FieldChange {
                        old: record.old_value.clone(),
                        new: record.new_value.clone(),
                        rendered: None,
                    },
                );
            }
        }
        groups
    }
}

/// Old and new value of one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange {
    /// Previous value
    pub old: String,
    /// New value
    pub new: String,
    /// Rendering that replaces the raw values
    pub rendered: Option<ListChange>,
}

/// IDs added to or removed from a list field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListChange {
    /// Links to the tickets that changed
    pub links: Vec<Inline>,
    /// `added` or `removed`
    pub action: String,
}

/// The relations section of a ticket page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationsView {
    /// Descendants, depth first
    pub children: Vec<ChildRow>,
    /// Referenced tickets, ascending
    pub references: Vec<ReferenceRow>,
    /// "Create new child ticket" URL, when allowed
    pub add_child: Option<String>,
    /// "Create new ticket with reference" URL, when allowed
    pub add_reference: Option<String>,
}

/// One row of the reference table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ReferenceRow {
    /// Existing ticket
    Found {
        /// Link to the ticket
        link: TicketLink,
        /// Shortened summary
        summary: String,
    },
    /// Referenced ticket no longer exists
    Missing {
        /// Referenced ID
        id: TicketId,
        /// Placeholder text
        placeholder: String,
    },
}

/// Request filter and workflow validator for ticket relations.
#[derive(Debug, Clone)]
pub struct RelationsModule {
    config: Arc<RelationsConfig>,
    href: Href,
}

impl RelationsModule {
    /// Create the component.
    #[must_use]
    pub fn new(config: Arc<RelationsConfig>) -> Self {
        let href = Href::new(&config.base_path);
        Self { config, href }
    }

    /// URL builder used for generated links.
    #[must_use]
    pub fn href(&self) -> &Href {
        &self.href
    }

    fn relations_view(
        &self,
        store: &TicketStore<'_>,
        req: &Request,
        id: TicketId,
        fields: &TicketFields,
    ) -> Result<RelationsView> {
        let add_child = (req.can_create_tickets && !self.config.is_restricted(&fields.status))
            .then(|| self.href.new_ticket(&[(PARENTS_FIELD, id.to_string().as_str())]));

        let add_reference = req.can_create_tickets.then(|| {
            let own = id.to_string();
            let mut params = vec![(REFS_FIELD, own.as_str())];
            params.extend(COPY_TICKET_FIELDS.iter().filter_map(|&name| {
                fields
                    .get(name)
                    .filter(|value| !value.is_empty())
                    .map(|value| (name, value))
            }));
            self.href.new_ticket(&params)
        });

        Ok(RelationsView {
            children: child_rows(store, &self.href, id)?,
            references: self.reference_rows(store, &fields.refs())?,
            add_child,
            add_reference,
        })
    }

    fn reference_rows(&self, store: &TicketStore<'_>, refs: &TicketIdSet) -> Result<Vec<ReferenceRow>> {
        let mut rows = Vec::with_capacity(refs.len());
        for id in refs {
            let row = match store.get_ticket(id)? {
                Some(ticket) => {
                    let summary = shorten_line(&ticket.fields.summary, SUMMARY_WIDTH);
                    ReferenceRow::Found {
                        link: TicketLink {
                            id,
                            href: self.href.ticket(id),
                            status: ticket.fields.status,
                            title: summary.clone(),
                        },
                        summary,
                    }
                }
                None => {
                    tracing::warn!(ticket = %id, "Referenced ticket not found");
                    ReferenceRow::Missing {
                        id,
                        placeholder: format!("#{id} ticket not found"),
                    }
                }
            };
            rows.push(row);
        }
        Ok(rows)
    }

    /// Replace raw `parents`/`refs` history values with added/removed links.
    fn render_changes(&self, store: &TicketStore<'_>, changes: &mut [ChangeGroup]) -> Result<()> {
        for group in changes {
            for (name, change) in &mut group.fields {
                if !LIST_FIELDS.contains(&name.as_str()) {
                    continue;
                }

                let old = TicketIdSet::from_stored(&change.old);
                let new = TicketIdSet::from_stored(&change.new);
                let (action, diff) = if old.len() < new.len() {
                    ("added", new.difference(&old))
                } else {
                    ("removed", old.difference(&new))
                };
                if diff.is_empty() {
                    continue;
                }

                let links = diff
                    .iter()
                    .map(|id| link_ref(store, &self.href, id))
                    .collect::<Result<Vec<_>>>()?;
                change.rendered = Some(ListChange {
                    links,
                    action: action.to_string(),
                });
            }
        }
        Ok(())
    }

    fn check_resolve(&self, store: &TicketStore<'_>, id: TicketId) -> Result<Vec<FieldError>> {
        let mut errors = Vec::new();
        for child in store.children_of(id)? {
            let Some(status) = store.ticket_status(child)? else {
                tracing::warn!(parent = %id, child = %child, "Child ticket not found");
                continue;
            };
            if !self.config.is_restricted(&status) {
                errors.push(FieldError::form(format!(
                    "Child ticket #{child} has not been {} yet",
                    self.config.done_status()
                )));
            }
        }
        Ok(errors)
    }

    fn check_reopen(&self, store: &TicketStore<'_>, parents: &TicketIdSet) -> Result<Vec<FieldError>> {
        let mut errors = Vec::new();
        for parent in parents {
            let Some(status) = store.ticket_status(parent)? else {
                continue;
            };
            if self.config.is_restricted(&status) {
                errors.push(FieldError::form(format!("Parent ticket #{parent} is {status}")));
            }
        }
        Ok(errors)
    }
}

/// Render the `parents` and `refs` cells of a query or report row.
///
/// Other columns are left out of the result.
pub fn render_list_cells(
    store: &TicketStore<'_>,
    href: &Href,
    row: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, Vec<Inline>>> {
    let mut cells = BTreeMap::new();
    for &name in LIST_FIELDS {
        if let Some(text) = row.get(name) {
            cells.insert(name.to_string(), link_refs_line(store, href, text)?);
        }
    }
    Ok(cells)
}

impl RequestFilter for RelationsModule {
    fn post_process_request(
        &self,
        store: &TicketStore<'_>,
        req: &Request,
        page: &mut TicketPage,
    ) -> Result<()> {
        let on_ticket = req.path.starts_with("/ticket/");
        if !on_ticket && !req.path.starts_with("/newticket") {
            return Ok(());
        }

        for &name in LIST_FIELDS {
            let ids = TicketIdSet::from_stored(page.fields.get(name).unwrap_or_default());
            if !ids.is_empty() {
                let rendered = existing_links(store, &self.href, &ids)?;
                page.rendered_fields.insert(name.to_string(), rendered);
            }
        }

        if let Some(id) = page.ticket_id.filter(|_| on_ticket) {
            page.relations = Some(self.relations_view(store, req, id, &page.fields)?);
        }
        self.render_changes(store, &mut page.changes)
    }
}

impl TicketManipulator for RelationsModule {
    fn validate_ticket(
        &self,
        store: &TicketStore<'_>,
        req: &Request,
        ticket: &mut TicketDraft,
    ) -> Result<Vec<FieldError>> {
        match (req.action(), ticket.id) {
            ("resolve", Some(id)) => self.check_resolve(store, id),
            ("reopen", _) => self.check_reopen(store, &ticket.fields.parents()),
            _ => Ok(Vec::new()),
        }
    }
}
