//! Parent/child relation row operations.

use rusqlite::params;

use super::TicketStore;
use super::helpers::{RELATION_COLUMNS, row_to_relation};
use crate::domain::{RelationKind, RelationRow, TicketId};
use crate::error::{Error, Result};
use crate::graph::RelationGraph;

impl TicketStore<'_> {
    /// Insert a parent→child row.
    ///
    /// Returns `false` if the row already existed.
    ///
    /// # Errors
    ///
    /// Returns `Error::CircularRelation` if the edge would close a cycle in
    /// the current edge set.
    pub fn add_child_relation(&self, parent: TicketId, child: TicketId) -> Result<bool> {
        let graph = RelationGraph::from_rows(&self.all_relations()?);
        if graph.would_create_cycle(parent, child) {
            return Err(Error::CircularRelation { parent, child });
        }

        let inserted = self.conn().execute(
            "INSERT OR IGNORE INTO ticketrels (oneself, relations, ticket) VALUES (?1, ?2, ?3)",
            params![
                parent.as_i64(),
                RelationKind::Child.as_str(),
                child.as_i64()
            ],
        )?;
        Ok(inserted > 0)
    }

    /// Delete a parent→child row, returning `true` if it existed.
    pub fn remove_child_relation(&self, parent: TicketId, child: TicketId) -> Result<bool> {
        let deleted = self.conn().execute(
            "DELETE FROM ticketrels WHERE oneself = ?1 AND relations = ?2 AND ticket = ?3",
            params![
                parent.as_i64(),
                RelationKind::Child.as_str(),
                child.as_i64()
            ],
        )?;
        Ok(deleted > 0)
    }

    /// Parents of `child` according to the relation table, ascending.
    pub fn parents_of(&self, child: TicketId) -> Result<Vec<TicketId>> {
        self.related_ids(
            "SELECT oneself FROM ticketrels WHERE ticket = ?1 AND relations = ?2 ORDER BY oneself",
            child,
        )
    }

    /// Children of `parent` according to the relation table, ascending.
    pub fn children_of(&self, parent: TicketId) -> Result<Vec<TicketId>> {
        self.related_ids(
            "SELECT ticket FROM ticketrels WHERE oneself = ?1 AND relations = ?2 ORDER BY ticket",
            parent,
        )
    }

    fn related_ids(&self, sql: &str, id: TicketId) -> Result<Vec<TicketId>> {
        let mut stmt = self.conn().prepare(sql)?;
        let ids = stmt
            .query_map(params![id.as_i64(), RelationKind::Child.as_str()], |row| {
                row.get::<_, i64>(0).map(TicketId::from)
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// Every relation row.
    pub fn all_relations(&self) -> Result<Vec<RelationRow>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {RELATION_COLUMNS} FROM ticketrels ORDER BY oneself, ticket"
        ))?;
        let rows = stmt
            .query_map([], row_to_relation)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Remove every row in which `id` is the parent or the child.
    ///
    /// Returns the number of rows removed.
    pub fn delete_relations_of(&self, id: TicketId) -> Result<usize> {
        let deleted = self.conn().execute(
            "DELETE FROM ticketrels WHERE relations = ?2 AND (oneself = ?1 OR ticket = ?1)",
            params![id.as_i64(), RelationKind::Child.as_str()],
        )?;
        Ok(deleted)
    }
}
