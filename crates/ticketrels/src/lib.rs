//! # ticketrels: Ticket relations for issue trackers
//!
//! Adds two kinds of relations between tickets:
//!
//! - **Parent/child**: a ticket's `parents` field lists its parents. Every
//!   edge is mirrored in the `ticketrels` table so children can be listed
//!   from the parent, and edits that would create a cycle are rejected.
//! - **Cross-references**: a ticket's `refs` field lists related tickets.
//!   References are symmetric; listing B on A rewrites B's `refs` to list A.
//!
//! The components plug into the tracker through the traits in [`host`] and
//! are registered explicitly at startup.
//!
//! ## Quick Start
//!
//! ```no_run
//! use ticketrels::config::RelationsConfig;
//! use ticketrels::domain::{PARENTS_FIELD, TicketFields, TicketUpdate};
//! use ticketrels::host::{Environment, Request};
//!
//! let env = Environment::in_memory(RelationsConfig::default())?;
//! let req = Request::new("alice");
//!
//! let parent = env.create_ticket(&req, TicketFields::new("Release 1.0"))?;
//! let child = env.create_ticket(&req, TicketFields::new("Write changelog"))?;
//!
//! let update = TicketUpdate::new().set(PARENTS_FIELD, parent.id.to_string());
//! env.update_ticket(&req, child.id, &update)?;
//! # Ok::<(), ticketrels::Error>(())
//! ```

#![forbid(unsafe_code)]

pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod graph;
pub mod host;
pub mod notify;
pub mod relations;
pub mod setup;
pub mod web;

pub use error::{Error, Result};

use std::sync::Arc;

use config::RelationsConfig;
use host::ExtensionRegistry;
use relations::{ParentChildRelations, TicketReferences};
use setup::RelationsSetup;
use web::RelationsModule;

/// Register the schema participant.
pub fn register_schema(registry: &mut ExtensionRegistry) {
    registry.add_schema_participant(Arc::new(RelationsSetup));
}

/// Register the relation validators, listeners and page filter.
///
/// Manipulators run in registration order: parent validation, reference
/// validation, then the workflow checks.
pub fn register_components(registry: &mut ExtensionRegistry, config: &Arc<RelationsConfig>) {
    let parent_child = Arc::new(ParentChildRelations::new(Arc::clone(config)));
    let references = Arc::new(TicketReferences::new(config));
    let module = Arc::new(RelationsModule::new(Arc::clone(config)));

    registry.add_manipulator(parent_child.clone());
    registry.add_change_listener(parent_child);
    registry.add_manipulator(references.clone());
    registry.add_change_listener(references);
    registry.add_manipulator(module.clone());
    registry.add_request_filter(module);
}
