//! `SQLite` storage layer.
//!
//! The tracker database holds the host tables (`ticket`, `ticket_custom`,
//! `ticket_change`, `system`) and the plugin's `ticketrels` relation table.
//! All reads and writes go through a [`TicketStore`] bound to either a plain
//! connection or an open transaction.
//!
//! ## Module Structure
//!
//! - `schema` - Database schema (DDL)
//! - `helpers` - Row conversion and parsing utilities
//! - `tickets` - Ticket, custom field and change-history operations
//! - `relations` - Parent/child relation row operations

mod helpers;
mod relations;
mod schema;
mod tickets;

pub use schema::RELATIONS_TABLE;
pub(crate) use schema::{HOST_SCHEMA, RELATIONS_SCHEMA};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::notify::CommentNotice;

/// `SQLite` database wrapper for the tracker.
///
/// The connection is wrapped in a `Mutex`; every operation holds the lock for
/// its whole duration, so transactions never interleave.
pub struct Database {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl Database {
    /// Open or create the tracker database at `path`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the parent directory cannot be created and
    /// `Error::Database` if `SQLite` fails to open or apply the schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn, Some(path.to_path_buf()))
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns `Error::Database` if the schema cannot be applied.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(HOST_SCHEMA)?;

        tracing::debug!(path = ?path, "Opened tracker database");
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Location of the database file, `None` for in-memory databases.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Acquire the connection lock.
    pub(crate) fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| {
            Error::Internal(format!(
                "database connection mutex poisoned (a thread panicked while holding the lock): {e}"
            ))
        })
    }

    /// Run `f` inside a transaction.
    ///
    /// The transaction commits when `f` returns `Ok` and rolls back on any
    /// error, so a failed listener leaves no partial relation updates behind.
    ///
    /// # Errors
    ///
    /// Propagates the error returned by `f`, or `Error::Database` if the
    /// transaction cannot be started or committed.
    pub fn transaction<T>(&self, f: impl FnOnce(&TicketStore<'_>) -> Result<T>) -> Result<T> {
        self.transaction_with_notices(f).map(|(value, _)| value)
    }

    /// Run `f` inside a transaction and return the comment notices it
    /// queued.
    ///
    /// Notices are only returned after a successful commit; a rolled back
    /// transaction discards them with its writes.
    ///
    /// # Errors
    ///
    /// Same as [`Database::transaction`].
    pub fn transaction_with_notices<T>(
        &self,
        f: impl FnOnce(&TicketStore<'_>) -> Result<T>,
    ) -> Result<(T, Vec<CommentNotice>)> {
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        let (value, notices) = {
            let store = TicketStore::new(&tx, Utc::now());
            let value = f(&store)?;
            (value, store.take_notices())
        };
        tx.commit()?;
        Ok((value, notices))
    }

    /// Run read-only work against the database.
    ///
    /// # Errors
    ///
    /// Propagates the error returned by `f`.
    pub fn query<T>(&self, f: impl FnOnce(&TicketStore<'_>) -> Result<T>) -> Result<T> {
        let conn = self.connection()?;
        f(&TicketStore::new(&conn, Utc::now()))
    }
}

/// Ticket and relation operations on a borrowed connection.
///
/// A store carries one timestamp, taken when it was created, so that every
/// row written during one transaction shares the same change time.
pub struct TicketStore<'c> {
    conn: &'c Connection,
    now: DateTime<Utc>,
    notices: RefCell<Vec<CommentNotice>>,
}

impl<'c> TicketStore<'c> {
    /// Bind a store to a connection or transaction.
    #[must_use]
    pub fn new(conn: &'c Connection, now: DateTime<Utc>) -> Self {
        Self {
            conn,
            now,
            notices: RefCell::new(Vec::new()),
        }
    }

    /// Queue a notice to be sent after the transaction commits.
    pub fn queue_notice(&self, notice: CommentNotice) {
        self.notices.borrow_mut().push(notice);
    }

    pub(crate) fn take_notices(&self) -> Vec<CommentNotice> {
        self.notices.take()
    }

    /// Timestamp used for rows written through this store.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub(crate) fn conn(&self) -> &'c Connection {
        self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn open_creates_database_and_host_schema() {
        let dir = TempDir::new().expect("should create temp directory");
        let path = dir.path().join("nested").join("trac.db");

        let db = Database::open(&path).expect("failed to open database");
        assert_eq!(db.path(), Some(path.as_path()));

        let conn = db.connection().expect("should get connection");
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        for table in ["ticket", "ticket_custom", "ticket_change", "system"] {
            assert!(tables.contains(&table.to_string()), "missing {table}");
        }
        assert!(!tables.contains(&RELATIONS_TABLE.to_string()));
    }

    #[test]
    fn failed_transaction_rolls_back() {
        let db = Database::open_in_memory().unwrap();

        let result: Result<()> = db.transaction(|store| {
            store.conn().execute(
                "INSERT INTO system (name, value) VALUES ('marker', '1')",
                [],
            )?;
            Err(Error::Internal("boom".to_string()))
        });
        assert!(result.is_err());

        let count: i64 = db
            .query(|store| {
                Ok(store
                    .conn()
                    .query_row("SELECT COUNT(*) FROM system", [], |row| row.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 0);
    }

    fn notice(comment: &str) -> CommentNotice {
        CommentNotice {
            ticket: crate::domain::Ticket {
                id: crate::domain::TicketId::new(1),
                time: Utc::now(),
                changetime: Utc::now(),
                fields: crate::domain::TicketFields::new("queued"),
            },
            author: "alice".to_string(),
            comment: comment.to_string(),
        }
    }

    #[test]
    fn notices_are_returned_after_commit() {
        let db = Database::open_in_memory().unwrap();

        let ((), notices) = db
            .transaction_with_notices(|store| {
                store.queue_notice(notice("one"));
                store.queue_notice(notice("two"));
                Ok(())
            })
            .unwrap();

        let comments: Vec<&str> = notices.iter().map(|n| n.comment.as_str()).collect();
        assert_eq!(comments, vec!["one", "two"]);
    }

}
