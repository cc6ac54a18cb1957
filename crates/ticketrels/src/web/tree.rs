//! Flattened child-ticket tree.

use serde::Serialize;

use super::links::{Href, SUMMARY_WIDTH, shorten_line};
use crate::db::TicketStore;
use crate::domain::TicketId;
use crate::error::Result;

/// Horizontal indent per tree level, in pixels.
pub const INDENT_PX: usize = 15;

/// One row of the children table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChildRow {
    /// Child ticket
    pub id: TicketId,
    /// Shortened summary
    pub summary: String,
    /// Ticket type
    #[serde(rename = "type")]
    pub ticket_type: String,
    /// Workflow status
    pub status: String,
    /// Owner
    pub owner: String,
    /// Query for the owner's open tickets
    pub owner_href: String,
    /// Ticket URL
    pub href: String,
    /// Nesting level, 0 for direct children
    pub depth: usize,
    /// Left margin for this depth
    pub indent_px: usize,
}

/// All descendants of `root` in depth-first order, siblings sorted by ID.
///
/// A ticket already on the path from `root` is not expanded again, so cyclic
/// relation data still yields a finite table.
pub fn child_rows(store: &TicketStore<'_>, href: &Href, root: TicketId) -> Result<Vec<ChildRow>> {
    let mut rows = Vec::new();
    let mut path = vec![root];
    walk(store, href, &mut path, &mut rows)?;
    Ok(rows)
}

fn walk(
    store: &TicketStore<'_>,
    href: &Href,
    path: &mut Vec<TicketId>,
    rows: &mut Vec<ChildRow>,
) -> Result<()> {
    let Some(&parent) = path.last() else {
        return Ok(());
    };
    let depth = path.len() - 1;

    for child in store.children_of(parent)? {
        if path.contains(&child) {
            tracing::warn!(parent = %parent, child = %child, "Cyclic relation in child tree");
            continue;
        }
        let Some(ticket) = store.get_ticket(child)? else {
            tracing::warn!(parent = %parent, child = %child, "Child ticket not found");
            continue;
        };

        let fields = ticket.fields;
        rows.push(ChildRow {
            id: child,
            summary: shorten_line(&fields.summary, SUMMARY_WIDTH),
            owner_href: href.query(&[("status", "!closed"), ("owner", &fields.owner)]),
            href: href.ticket(child),
            ticket_type: fields.ticket_type,
            status: fields.status,
            owner: fields.owner,
            depth,
            indent_px: depth * INDENT_PX,
        });

        path.push(child);
        walk(store, href, path, rows)?;
        path.pop();
    }
    Ok(())
}
