//! Domain types for ticket relations.
//!
//! Tickets themselves belong to the host tracker; this module models just
//! enough of them for the relation components to read and edit the `parents`
//! and `refs` custom fields, plus the relation rows the plugin owns.

mod ids;

pub use ids::{ID_LIST_SEPARATOR, TicketId, TicketIdSet};
pub(crate) use ids::id_tokens;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Name of the custom field listing a ticket's parents.
pub const PARENTS_FIELD: &str = "parents";

/// Name of the custom field listing a ticket's cross-references.
pub const REFS_FIELD: &str = "refs";

/// Name of the change-history field used for comments.
pub const COMMENT_FIELD: &str = "comment";

/// Standard (non-custom) ticket fields, in table column order.
pub const STANDARD_FIELDS: &[&str] = &[
    "type",
    "summary",
    "description",
    "reporter",
    "owner",
    "cc",
    "component",
    "priority",
    "milestone",
    "version",
    "keywords",
    "status",
    "resolution",
];

/// Editable values of a ticket.
///
/// Standard fields are stored in the `ticket` table, everything in `custom`
/// in `ticket_custom`. Field access by name goes through [`TicketFields::get`]
/// and [`TicketFields::set`] so that listeners can treat both kinds alike.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketFields {
    /// Ticket type (e.g. "defect", "task")
    #[serde(rename = "type")]
    pub ticket_type: String,

    /// One-line summary
    pub summary: String,

    /// Full description
    pub description: String,

    /// Reporting user
    pub reporter: String,

    /// Current owner
    pub owner: String,

    /// Carbon-copy list
    pub cc: String,

    /// Component
    pub component: String,

    /// Priority
    pub priority: String,

    /// Milestone
    pub milestone: String,

    /// Version
    pub version: String,

    /// Keywords
    pub keywords: String,

    /// Workflow status (e.g. "new", "closed")
    pub status: String,

    /// Resolution when closed
    pub resolution: String,

    /// Custom fields by name
    pub custom: BTreeMap<String, String>,
}

impl TicketFields {
    /// Create fields for a new ticket with the given summary and status `new`.
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            status: "new".to_string(),
            ..Self::default()
        }
    }

    /// Look up a field value by name.
    ///
    /// Returns `None` for a custom field that has never been set.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        let value = match name {
            "type" => &self.ticket_type,
            "summary" => &self.summary,
            "description" => &self.description,
            "reporter" => &self.reporter,
            "owner" => &self.owner,
            "cc" => &self.cc,
            "component" => &self.component,
            "priority" => &self.priority,
            "milestone" => &self.milestone,
            "version" => &self.version,
            "keywords" => &self.keywords,
            "status" => &self.status,
            "resolution" => &self.resolution,
            custom => return self.custom.get(custom).map(String::as_str),
        };
        Some(value)
    }

    /// Set a field value by name. Unknown names become custom fields.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        let slot = match name {
            "type" => &mut self.ticket_type,
            "summary" => &mut self.summary,
            "description" => &mut self.description,
            "reporter" => &mut self.reporter,
            "owner" => &mut self.owner,
            "cc" => &mut self.cc,
            "component" => &mut self.component,
            "priority" => &mut self.priority,
            "milestone" => &mut self.milestone,
            "version" => &mut self.version,
            "keywords" => &mut self.keywords,
            "status" => &mut self.status,
            "resolution" => &mut self.resolution,
            custom => {
                self.custom.insert(custom.to_string(), value);
                return;
            }
        };
        *slot = value;
    }

    /// Raw text of the `parents` field (empty when unset).
    #[must_use]
    pub fn parents_text(&self) -> &str {
        self.get(PARENTS_FIELD).unwrap_or_default()
    }

    /// Raw text of the `refs` field (empty when unset).
    #[must_use]
    pub fn refs_text(&self) -> &str {
        self.get(REFS_FIELD).unwrap_or_default()
    }

    /// Parents as stored.
    #[must_use]
    pub fn parents(&self) -> TicketIdSet {
        TicketIdSet::from_stored(self.parents_text())
    }

    /// Cross-references as stored.
    #[must_use]
    pub fn refs(&self) -> TicketIdSet {
        TicketIdSet::from_stored(self.refs_text())
    }

    /// Returns `true` when the `refs` field holds anything but whitespace.
    #[must_use]
    pub fn has_refs(&self) -> bool {
        !self.refs_text().trim().is_empty()
    }
}

/// A persisted ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Ticket number
    pub id: TicketId,

    /// Field values
    pub fields: TicketFields,

    /// Creation time
    pub time: DateTime<Utc>,

    /// Last modification time
    pub changetime: DateTime<Utc>,
}

/// A ticket as submitted for validation.
///
/// `id` is `None` while a ticket is being created. Validators may rewrite
/// `fields` (for example to normalize the `parents` list) before it is saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketDraft {
    /// Existing ticket number, if any
    pub id: Option<TicketId>,

    /// Proposed field values
    pub fields: TicketFields,
}

/// Description of a completed change, handed to change listeners.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketChange {
    /// User who made the change
    pub author: String,

    /// Comment attached to the change (may be empty)
    pub comment: String,

    /// Previous values of every field that changed
    pub old_values: BTreeMap<String, String>,
}

impl TicketChange {
    /// Returns `true` if `field` was part of this change.
    #[must_use]
    pub fn touches(&self, field: &str) -> bool {
        self.old_values.contains_key(field)
    }

    /// Previous value of `field`, or empty when it was unset.
    #[must_use]
    pub fn old_value(&self, field: &str) -> &str {
        self.old_values.get(field).map_or("", String::as_str)
    }
}

/// One row of a ticket's change history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Ticket the change belongs to
    pub ticket: TicketId,

    /// When the change was made
    pub time: DateTime<Utc>,

    /// Who made it
    pub author: String,

    /// Changed field, or `comment`
    pub field: String,

    /// Previous value (comment number for comments)
    pub old_value: String,

    /// New value (comment text for comments)
    pub new_value: String,
}

/// Requested modification of an existing ticket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketUpdate {
    /// New values by field name
    pub fields: BTreeMap<String, String>,

    /// Optional comment
    pub comment: String,
}

impl TicketUpdate {
    /// Start an empty update.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field value.
    #[must_use]
    pub fn set(mut self, field: &str, value: impl Into<String>) -> Self {
        self.fields.insert(field.to_string(), value.into());
        self
    }

    /// Attach a comment.
    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }
}

/// A validation problem reported by a ticket manipulator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Field the problem belongs to, or `None` for form-level errors
    pub field: Option<String>,

    /// Human-readable message
    pub message: String,
}

impl FieldError {
    /// Error attached to a specific field.
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            message: message.into(),
        }
    }

    /// Error attached to the whole form.
    pub fn form(message: impl Into<String>) -> Self {
        Self {
            field: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{field}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Kind of a persisted relation row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationKind {
    /// `oneself` is the parent of `ticket`
    Child,
}

impl RelationKind {
    /// Database representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Child => "child",
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directed parent→child edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationRow {
    /// Parent ticket (`oneself` column)
    pub parent: TicketId,

    /// Relation kind (`relations` column)
    pub kind: RelationKind,

    /// Child ticket (`ticket` column)
    pub child: TicketId,
}

impl RelationRow {
    /// Parent/child edge.
    #[must_use]
    pub const fn child(parent: TicketId, child: TicketId) -> Self {
        Self {
            parent,
            kind: RelationKind::Child,
            child,
        }
    }
}
