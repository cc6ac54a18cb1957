//! Relation components registered with the tracker.
//!
//! - [`ParentChildRelations`] validates the `parents` field and keeps the
//!   relation table in step with it.
//! - [`TicketReferences`] validates the `refs` field and mirrors it onto the
//!   referenced tickets.

mod mentions;
mod parent_child;
mod references;

pub use mentions::MentionParser;
pub use parent_child::{INVALID_LIST_MESSAGE, ParentChildRelations, SELF_PARENT_MESSAGE};
pub use references::TicketReferences;
