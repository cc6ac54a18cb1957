//! Links to tickets and ticket queries.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Serialize;

use crate::db::TicketStore;
use crate::domain::{TicketId, TicketIdSet};
use crate::error::Result;

/// Summaries longer than this are shortened.
pub const SUMMARY_WIDTH: usize = 75;

/// Characters left unescaped in query values.
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'!');

/// Builds tracker URLs below a base path.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Href {
    base: String,
}

impl Href {
    /// Create a builder for URLs below `base_path` (e.g. `/trac`).
    pub fn new(base_path: &str) -> Self {
        Self {
            base: base_path.trim_end_matches('/').to_string(),
        }
    }

    /// URL of a ticket page.
    #[must_use]
    pub fn ticket(&self, id: TicketId) -> String {
        format!("{}/ticket/{id}", self.base)
    }

    /// URL of the new-ticket form, pre-filled with `params`.
    #[must_use]
    pub fn new_ticket(&self, params: &[(&str, &str)]) -> String {
        with_query(format!("{}/newticket", self.base), params)
    }

    /// URL of a ticket query.
    #[must_use]
    pub fn query(&self, params: &[(&str, &str)]) -> String {
        with_query(format!("{}/query", self.base), params)
    }
}

fn with_query(path: String, params: &[(&str, &str)]) -> String {
    if params.is_empty() {
        return path;
    }
    let query = params
        .iter()
        .map(|(key, value)| format!("{key}={}", utf8_percent_encode(value, QUERY_VALUE)))
        .collect::<Vec<_>>()
        .join("&");
    format!("{path}?{query}")
}

/// A link to an existing ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TicketLink {
    /// Linked ticket
    pub id: TicketId,
    /// Target URL
    pub href: String,
    /// Ticket status, used as CSS class
    pub status: String,
    /// Tooltip (shortened summary)
    pub title: String,
}

/// A piece of rendered field content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Inline {
    /// Link to a ticket
    Link(TicketLink),
    /// Plain text
    Text {
        /// Text content
        text: String,
    },
}

impl Inline {
    /// Plain text span.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// The linked ticket, if this is a link.
    #[must_use]
    pub fn link(&self) -> Option<&TicketLink> {
        match self {
            Self::Link(link) => Some(link),
            Self::Text { .. } => None,
        }
    }
}

/// Shorten `text` to at most `width` characters, cutting at a word boundary
/// and appending ` ...`.
#[must_use]
pub fn shorten_line(text: &str, width: usize) -> String {
    if text.chars().count() < width {
        return text.to_string();
    }

    let cut = text.char_indices().nth(width).map_or(text.len(), |(i, _)| i);
    let head = &text[..cut];
    let head = match head.rfind([' ', '\n']) {
        Some(i) if i > 0 => &head[..i],
        _ => head,
    };
    format!("{} ...", head.trim_end())
}

/// Link to ticket `id`, or `None` if it does not exist.
pub fn ticket_link(store: &TicketStore<'_>, href: &Href, id: TicketId) -> Result<Option<TicketLink>> {
    Ok(store.get_ticket(id)?.map(|ticket| TicketLink {
        id,
        href: href.ticket(id),
        status: ticket.fields.status,
        title: shorten_line(&ticket.fields.summary, SUMMARY_WIDTH),
    }))
}

/// Link to ticket `id`; a missing ticket renders as plain `#id`.
pub fn link_ref(store: &TicketStore<'_>, href: &Href, id: TicketId) -> Result<Inline> {
    match ticket_link(store, href, id)? {
        Some(link) => Ok(Inline::Link(link)),
        None => {
            tracing::warn!(ticket = %id, "Ticket not found");
            Ok(Inline::text(format!("#{id}")))
        }
    }
}

/// Render the ticket IDs found in `text` as links, in ascending order.
///
/// Tokens that are not IDs are dropped; text without any ID is returned
/// unchanged as a single span.
pub fn link_refs_line(store: &TicketStore<'_>, href: &Href, text: &str) -> Result<Vec<Inline>> {
    let ids = TicketIdSet::from_stored(text);
    if ids.is_empty() {
        return Ok(vec![Inline::text(text)]);
    }
    ids.iter().map(|id| link_ref(store, href, id)).collect()
}

/// Links to the existing tickets in `ids`; missing ones are dropped.
pub fn existing_links(
    store: &TicketStore<'_>,
    href: &Href,
    ids: &TicketIdSet,
) -> Result<Vec<Inline>> {
    let mut links = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(link) = ticket_link(store, href, id)? {
            links.push(Inline::Link(link));
        }
    }
    Ok(links)
}
