//! Common test utilities shared across integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex, Once};

use tempfile::TempDir;
use ticketrels::config::RelationsConfig;
use ticketrels::db::Database;
use ticketrels::domain::{COMMENT_FIELD, Ticket, TicketFields, TicketId, TicketUpdate};
use ticketrels::host::{DATABASE_FILE_NAME, Environment, Request, TicketNotifier};
use ticketrels::notify::TracingNotifier;
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Route `tracing` output to the test harness; `RUST_LOG` overrides the level.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// In-memory environment with default configuration.
pub fn memory_env() -> Environment {
    init_tracing();
    Environment::in_memory(RelationsConfig::default()).expect("failed to create environment")
}

/// On-disk environment, for tests that need to write rows behind its back.
pub fn disk_env() -> (TempDir, Environment) {
    init_tracing();
    let dir = TempDir::new().expect("failed to create temp dir");
    let env = Environment::open(dir.path()).expect("failed to open environment");
    (dir, env)
}

/// Environment that records plugin notifications.
pub fn recording_env() -> (Environment, Arc<RecordingNotifier>) {
    init_tracing();
    let notifier = Arc::new(RecordingNotifier::default());
    let db = Database::open_in_memory().expect("failed to open database");
    let env = Environment::new(db, RelationsConfig::default(), None, notifier.clone())
        .expect("failed to create environment");
    (env, notifier)
}

/// A user with ticket-create permission.
pub fn alice() -> Request {
    Request::new("alice")
}

/// Create tickets `#1..=#count` titled "Ticket N".
pub fn create_tickets(env: &Environment, count: i64) -> Vec<TicketId> {
    (1..=count)
        .map(|n| {
            env.create_ticket(&alice(), TicketFields::new(format!("Ticket {n}")))
                .expect("failed to create ticket")
                .id
        })
        .collect()
}

/// Create a ticket with one extra field set.
pub fn create_with(env: &Environment, summary: &str, field: &str, value: &str) -> Ticket {
    let mut fields = TicketFields::new(summary);
    fields.set(field, value);
    env.create_ticket(&alice(), fields)
        .expect("failed to create ticket")
}

/// Set one field of a ticket as `alice`.
pub fn set_field(env: &Environment, id: TicketId, field: &str, value: &str) -> Ticket {
    env.update_ticket(&alice(), id, &TicketUpdate::new().set(field, value))
        .expect("failed to update ticket")
}

/// Close a ticket through the resolve action.
pub fn resolve(env: &Environment, id: TicketId) -> ticketrels::Result<Ticket> {
    let update = TicketUpdate::new()
        .set("status", "closed")
        .set("resolution", "fixed");
    env.update_ticket(&alice().with_action("resolve"), id, &update)
}

/// Comment texts of a ticket, oldest first.
pub fn comments(env: &Environment, id: TicketId) -> Vec<String> {
    env.changes(id)
        .expect("failed to load history")
        .into_iter()
        .filter(|change| change.field == COMMENT_FIELD)
        .map(|change| change.new_value)
        .collect()
}

/// Current value of a field, `None` when a custom field is unset.
pub fn field(env: &Environment, id: TicketId, name: &str) -> Option<String> {
    env.get_ticket(id)
        .expect("failed to load ticket")
        .expect("ticket should exist")
        .fields
        .get(name)
        .map(ToString::to_string)
}

/// Run SQL directly against an environment's database file.
pub fn execute_raw(dir: &Path, sql: &str) {
    let conn = rusqlite::Connection::open(dir.join(DATABASE_FILE_NAME))
        .expect("failed to open raw connection");
    conn.execute_batch(sql).expect("raw SQL failed");
}

/// Notifier that keeps every notification for later inspection.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<(TicketId, String, String)>>,
    inner: TracingNotifier,
}

impl RecordingNotifier {
    /// Recorded `(ticket, author, comment)` triples.
    pub fn events(&self) -> Vec<(TicketId, String, String)> {
        self.events.lock().expect("notifier lock poisoned").clone()
    }
}

impl TicketNotifier for RecordingNotifier {
    fn ticket_commented(&self, ticket: &Ticket, author: &str, comment: &str) {
        self.inner.ticket_commented(ticket, author, comment);
        self.events
            .lock()
            .expect("notifier lock poisoned")
            .push((ticket.id, author.to_string(), comment.to_string()));
    }
}
