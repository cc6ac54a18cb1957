//! Schema participant for the relation table and custom fields.

use rusqlite::{OptionalExtension, params};

use crate::config::{CustomField, RelationsConfig};
use crate::db::{RELATIONS_SCHEMA, RELATIONS_TABLE, TicketStore};
use crate::domain::{PARENTS_FIELD, REFS_FIELD};
use crate::error::Result;
use crate::host::SchemaParticipant;

/// Name of the plugin's row in the `system` table.
pub const SCHEMA_NAME: &str = "ticketrels";

/// Current schema version of the relation table.
pub const SCHEMA_VERSION: i64 = 1;

/// Label registered for the `parents` custom field.
pub const PARENTS_LABEL: &str = "Parent Tickets";

/// Label registered for the `refs` custom field.
pub const REFS_LABEL: &str = "Reference Tickets";

/// Creates the relation table and registers the custom fields.
#[derive(Debug, Default)]
pub struct RelationsSetup;

impl RelationsSetup {
    fn stored_version(store: &TicketStore<'_>) -> Result<Option<i64>> {
        let value: Option<Option<String>> = store
            .conn()
            .query_row(
                "SELECT value FROM system WHERE name = ?1",
                [SCHEMA_NAME],
                |row| row.get(0),
            )
            .optional()?;

        Ok(value.flatten().and_then(|v| v.trim().parse().ok()))
    }

    fn table_exists(store: &TicketStore<'_>) -> Result<bool> {
        let found = store
            .conn()
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [RELATIONS_TABLE],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

impl SchemaParticipant for RelationsSetup {
    fn name(&self) -> &'static str {
        SCHEMA_NAME
    }

    fn environment_needs_upgrade(
        &self,
        store: &TicketStore<'_>,
        config: &RelationsConfig,
    ) -> Result<bool> {
        match Self::stored_version(store)? {
            Some(version) if version >= SCHEMA_VERSION => {}
            _ => return Ok(true),
        }
        if !Self::table_exists(store)? {
            return Ok(true);
        }
        Ok(!config.has_custom_field(PARENTS_FIELD) || !config.has_custom_field(REFS_FIELD))
    }

    fn upgrade_environment(
        &self,
        store: &TicketStore<'_>,
        config: &mut RelationsConfig,
    ) -> Result<()> {
        let conn = store.conn();

        // Keep existing rows across the table rebuild
        let mut saved: Vec<(i64, String, i64)> = Vec::new();
        if Self::table_exists(store)? {
            let mut stmt = conn.prepare("SELECT oneself, relations, ticket FROM ticketrels")?;
            saved = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            conn.execute_batch("DROP TABLE ticketrels")?;
        }

        conn.execute_batch(RELATIONS_SCHEMA)?;
        for (parent, kind, child) in &saved {
            conn.execute(
                "INSERT OR IGNORE INTO ticketrels (oneself, relations, ticket) VALUES (?1, ?2, ?3)",
                params![parent, kind, child],
            )?;
        }

        conn.execute(
            "INSERT INTO system (name, value) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET value = excluded.value",
            params![SCHEMA_NAME, SCHEMA_VERSION.to_string()],
        )?;

        if !config.has_custom_field(PARENTS_FIELD) {
            config
                .ticket_custom
                .insert(PARENTS_FIELD.to_string(), CustomField::text(PARENTS_LABEL));
        }
        if !config.has_custom_field(REFS_FIELD) {
            config
                .ticket_custom
                .insert(REFS_FIELD.to_string(), CustomField::text(REFS_LABEL));
        }

        tracing::info!(
            version = SCHEMA_VERSION,
            preserved_rows = saved.len(),
            "Relation schema installed"
        );
        Ok(())
    }
}
