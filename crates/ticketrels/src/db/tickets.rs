//! Ticket, custom field and change-history operations.

use rusqlite::{OptionalExtension, params};
use std::collections::BTreeMap;

use super::TicketStore;
use super::helpers::{CHANGE_COLUMNS, TICKET_COLUMNS, row_to_change, row_to_ticket, to_micros};
use crate::domain::{
    COMMENT_FIELD, ChangeRecord, STANDARD_FIELDS, Ticket, TicketChange, TicketFields, TicketId,
};
use crate::error::{Error, Result};

impl TicketStore<'_> {
    /// Check whether a ticket exists.
    pub fn ticket_exists(&self, id: TicketId) -> Result<bool> {
        let found = self
            .conn()
            .query_row("SELECT 1 FROM ticket WHERE id = ?1", [id.as_i64()], |_| {
                Ok(())
            })
            .optional()?;
        Ok(found.is_some())
    }

    /// Load a ticket with its custom fields.
    pub fn get_ticket(&self, id: TicketId) -> Result<Option<Ticket>> {
        let ticket = self
            .conn()
            .query_row(
                &format!("SELECT {TICKET_COLUMNS} FROM ticket WHERE id = ?1"),
                [id.as_i64()],
                row_to_ticket,
            )
            .optional()?;

        let Some(mut ticket) = ticket else {
            return Ok(None);
        };

        let mut stmt = self
            .conn()
            .prepare("SELECT name, value FROM ticket_custom WHERE ticket = ?1")?;
        let custom = stmt
            .query_map([id.as_i64()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                ))
            })?
            .collect::<std::result::Result<BTreeMap<_, _>, _>>()?;
        ticket.fields.custom = custom;

        Ok(Some(ticket))
    }

    /// Load a ticket, failing when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `Error::TicketNotFound` for an unknown ID.
    pub fn require_ticket(&self, id: TicketId) -> Result<Ticket> {
        self.get_ticket(id)?.ok_or(Error::TicketNotFound(id))
    }

    /// Status of a ticket, `None` if it does not exist.
    pub fn ticket_status(&self, id: TicketId) -> Result<Option<String>> {
        self.conn()
            .query_row(
                "SELECT status FROM ticket WHERE id = ?1",
                [id.as_i64()],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    /// Insert a new ticket and its non-empty custom fields.
    pub fn insert_ticket(&self, fields: &TicketFields) -> Result<Ticket> {
        let time = to_micros(self.now());
        self.conn().execute(
            "INSERT INTO ticket (type, summary, description, reporter, owner, cc, component,
             priority, milestone, version, keywords, status, resolution, time, changetime)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)",
            params![
                fields.ticket_type,
                fields.summary,
                fields.description,
                fields.reporter,
                fields.owner,
                fields.cc,
                fields.component,
                fields.priority,
                fields.milestone,
                fields.version,
                fields.keywords,
                fields.status,
                fields.resolution,
                time,
            ],
        )?;
        let id = TicketId::from(self.conn().last_insert_rowid());

        for (name, value) in fields.custom.iter().filter(|(_, v)| !v.is_empty()) {
            self.set_custom_field(id, name, value)?;
        }

        tracing::debug!(ticket = %id, summary = %fields.summary, "Inserted ticket");
        self.require_ticket(id)
    }

    /// Write new field values, recording one history row per changed field.
    ///
    /// Values equal to the current ones are skipped. A non-empty `comment` is
    /// recorded as a comment row. Returns the previous values of every field
    /// that actually changed.
    ///
    /// # Errors
    ///
    /// Returns `Error::TicketNotFound` for an unknown ID.
    pub fn apply_update(
        &self,
        id: TicketId,
        values: &BTreeMap<String, String>,
        author: &str,
        comment: &str,
    ) -> Result<TicketChange> {
        let current = self.require_ticket(id)?;
        let mut old_values = BTreeMap::new();

        for (name, new_value) in values {
            let old_value = current.fields.get(name).unwrap_or_default();
            if old_value == new_value.as_str() {
                continue;
            }

            if STANDARD_FIELDS.contains(&name.as_str()) {
                // Column names come from the fixed STANDARD_FIELDS list
                self.conn().execute(
                    &format!("UPDATE ticket SET {name} = ?1 WHERE id = ?2"),
                    params![new_value, id.as_i64()],
                )?;
            } else {
                self.set_custom_field(id, name, new_value)?;
            }

            self.record_change(id, author, name, old_value, new_value)?;
            old_values.insert(name.clone(), old_value.to_string());
        }

        if !comment.is_empty() {
            self.insert_comment(id, author, comment)?;
        }
        if !old_values.is_empty() || !comment.is_empty() {
            self.touch(id)?;
        }

        Ok(TicketChange {
            author: author.to_string(),
            comment: comment.to_string(),
            old_values,
        })
    }

    /// Append a comment to a ticket and bump its change time.
    ///
    /// # Errors
    ///
    /// Returns `Error::TicketNotFound` for an unknown ID.
    pub fn add_comment(&self, id: TicketId, author: &str, comment: &str) -> Result<()> {
        if !self.ticket_exists(id)? {
            return Err(Error::TicketNotFound(id));
        }
        self.insert_comment(id, author, comment)?;
        self.touch(id)
    }

    fn insert_comment(&self, id: TicketId, author: &str, comment: &str) -> Result<()> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM ticket_change WHERE ticket = ?1 AND field = ?2",
            params![id.as_i64(), COMMENT_FIELD],
            |row| row.get(0),
        )?;
        let number = (count + 1).to_string();
        self.record_change(id, author, COMMENT_FIELD, &number, comment)
    }

    /// Value of a custom field, `None` when no row exists.
    pub fn custom_field(&self, id: TicketId, name: &str) -> Result<Option<String>> {
        let value = self
            .conn()
            .query_row(
                "SELECT value FROM ticket_custom WHERE ticket = ?1 AND name = ?2",
                params![id.as_i64(), name],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?;
        Ok(value.map(Option::unwrap_or_default))
    }

    /// Insert or replace a custom field value.
    pub fn set_custom_field(&self, id: TicketId, name: &str, value: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO ticket_custom (ticket, name, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(ticket, name) DO UPDATE SET value = excluded.value",
            params![id.as_i64(), name, value],
        )?;
        Ok(())
    }

    /// Remove a custom field row, returning `true` if one existed.
    pub fn delete_custom_field(&self, id: TicketId, name: &str) -> Result<bool> {
        let deleted = self.conn().execute(
            "DELETE FROM ticket_custom WHERE ticket = ?1 AND name = ?2",
            params![id.as_i64(), name],
        )?;
        Ok(deleted > 0)
    }

    /// Append a row to the change history.
    pub fn record_change(
        &self,
        id: TicketId,
        author: &str,
        field: &str,
        old_value: &str,
        new_value: &str,
    ) -> Result<()> {
        self.conn().execute(
            "INSERT INTO ticket_change (ticket, time, author, field, oldvalue, newvalue)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id.as_i64(),
                to_micros(self.now()),
                author,
                field,
                old_value,
                new_value
            ],
        )?;
        Ok(())
    }

    /// Set a ticket's change time to this store's timestamp.
    pub fn touch(&self, id: TicketId) -> Result<()> {
        self.conn().execute(
            "UPDATE ticket SET changetime = ?1 WHERE id = ?2",
            params![to_micros(self.now()), id.as_i64()],
        )?;
        Ok(())
    }

    /// Delete a ticket with its custom fields and history.
    ///
    /// # Errors
    ///
    /// Returns `Error::TicketNotFound` for an unknown ID.
    pub fn delete_ticket(&self, id: TicketId) -> Result<()> {
        let deleted = self
            .conn()
            .execute("DELETE FROM ticket WHERE id = ?1", [id.as_i64()])?;
        if deleted == 0 {
            return Err(Error::TicketNotFound(id));
        }
        self.conn()
            .execute("DELETE FROM ticket_custom WHERE ticket = ?1", [id.as_i64()])?;
        self.conn()
            .execute("DELETE FROM ticket_change WHERE ticket = ?1", [id.as_i64()])?;
        Ok(())
    }

    /// Change history of a ticket, oldest first.
    pub fn changes(&self, id: TicketId) -> Result<Vec<ChangeRecord>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {CHANGE_COLUMNS} FROM ticket_change WHERE ticket = ?1 ORDER BY rowid"
        ))?;
        let changes = stmt
            .query_map([id.as_i64()], row_to_change)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;
    use crate::domain::{COMMENT_FIELD, TicketFields, TicketId};
    use std::collections::BTreeMap;

    fn fields(summary: &str) -> TicketFields {
        let mut fields = TicketFields::new(summary);
        fields.reporter = "alice".to_string();
        fields
    }

    #[test]
    fn insert_and_get_round_trips_custom_fields() {
        let db = Database::open_in_memory().unwrap();

        let ticket = db
            .transaction(|store| {
                let mut f = fields("First");
                f.set("refs", "2");
                f.set("parents", "");
                store.insert_ticket(&f)
            })
            .unwrap();

        assert_eq!(ticket.id, TicketId::new(1));
        assert_eq!(ticket.fields.refs_text(), "2");
        // Empty custom values are not stored
        assert_eq!(ticket.fields.get("parents"), None);
        assert_eq!(ticket.time, ticket.changetime);
    }

    #[test]
    fn apply_update_records_only_real_changes() {
        let db = Database::open_in_memory().unwrap();

        let change = db
            .transaction(|store| {
                let ticket = store.insert_ticket(&fields("First"))?;
                let mut values = BTreeMap::new();
                values.insert("summary".to_string(), "First".to_string());
                values.insert("owner".to_string(), "bob".to_string());
                values.insert("parents".to_string(), "3".to_string());
                store.apply_update(ticket.id, &values, "carol", "Reassigning")
            })
            .unwrap();

        assert_eq!(change.old_values.len(), 2);
        assert_eq!(change.old_value("owner"), "");
        assert!(change.touches("parents"));
        assert!(!change.touches("summary"));

        let history = db.query(|store| store.changes(TicketId::new(1))).unwrap();
        let fields: Vec<&str> = history.iter().map(|c| c.field.as_str()).collect();
        assert_eq!(fields, vec!["owner", "parents", COMMENT_FIELD]);
        assert_eq!(history[2].old_value, "1");
        assert_eq!(history[2].new_value, "Reassigning");
        assert!(history.iter().all(|c| c.author == "carol"));
    }

    #[test]
    fn comments_are_numbered() {
        let db = Database::open_in_memory().unwrap();

        db.transaction(|store| {
            let ticket = store.insert_ticket(&fields("First"))?;
            store.add_comment(ticket.id, "a", "one")?;
            store.add_comment(ticket.id, "b", "two")
        })
        .unwrap();

        let history = db.query(|store| store.changes(TicketId::new(1))).unwrap();
        let numbers: Vec<&str> = history.iter().map(|c| c.old_value.as_str()).collect();
        assert_eq!(numbers, vec!["1", "2"]);
    }

    #[test]
    fn delete_removes_ticket_and_custom_rows() {
        let db = Database::open_in_memory().unwrap();

        db.transaction(|store| {
            let mut f = fields("Doomed");
            f.set("refs", "5");
            let ticket = store.insert_ticket(&f)?;
            store.delete_ticket(ticket.id)
        })
        .unwrap();

        db.query(|store| {
            assert!(!store.ticket_exists(TicketId::new(1))?);
            assert_eq!(store.custom_field(TicketId::new(1), "refs")?, None);
            assert!(store.delete_ticket(TicketId::new(1)).is_err());
            Ok(())
        })
        .unwrap();
    }
}
