//! Helper functions for database row conversion and parsing.
//!
//! These utilities convert between database representations and domain types.

use chrono::{DateTime, Utc};

use crate::domain::{ChangeRecord, RelationKind, RelationRow, Ticket, TicketFields, TicketId};

/// SQL column list for the ticket table.
///
/// Use with `row_to_ticket` for consistent column ordering.
pub(crate) const TICKET_COLUMNS: &str = "id, type, summary, description, reporter, owner, cc, \
     component, priority, milestone, version, keywords, status, resolution, time, changetime";

/// SQL column list for the relation table.
///
/// Use with `row_to_relation` for consistent column ordering.
pub(crate) const RELATION_COLUMNS: &str = "oneself, relations, ticket";

/// SQL column list for the change table.
pub(crate) const CHANGE_COLUMNS: &str = "ticket, time, author, field, oldvalue, newvalue";

/// Convert a timestamp to stored microseconds.
pub(crate) fn to_micros(time: DateTime<Utc>) -> i64 {
    time.timestamp_micros()
}

/// Convert stored microseconds back to a timestamp.
///
/// Returns an error for values chrono cannot represent, indicating possible
/// database corruption.
pub(crate) fn from_micros(column: usize, micros: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            rusqlite::types::Type::Integer,
            format!("Timestamp {micros} is out of range. Database may be corrupted.").into(),
        )
    })
}

/// Parse a relation kind string from the database.
///
/// Returns an error for unrecognized values, indicating possible database corruption.
pub(crate) fn parse_relation_kind(s: &str) -> rusqlite::Result<RelationKind> {
    match s {
        "child" => Ok(RelationKind::Child),
        unknown => Err(rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            format!("Unknown relation kind '{unknown}' in database. Database may be corrupted or from a newer version.").into(),
        )),
    }
}

/// Convert a database row to a [`Ticket`] without custom fields.
///
/// Expected columns: see [`TICKET_COLUMNS`].
pub(crate) fn row_to_ticket(row: &rusqlite::Row) -> rusqlite::Result<Ticket> {
    let fields = TicketFields {
        ticket_type: row.get(1)?,
        summary: row.get(2)?,
        description: row.get(3)?,
        reporter: row.get(4)?,
        owner: row.get(5)?,
        cc: row.get(6)?,
        component: row.get(7)?,
        priority: row.get(8)?,
        milestone: row.get(9)?,
        version: row.get(10)?,
        keywords: row.get(11)?,
        status: row.get(12)?,
        resolution: row.get(13)?,
        custom: std::collections::BTreeMap::new(),
    };

    Ok(Ticket {
        id: TicketId::from(row.get::<_, i64>(0)?),
        fields,
        time: from_micros(14, row.get(14)?)?,
        changetime: from_micros(15, row.get(15)?)?,
    })
}

/// Convert a database row to a [`RelationRow`].
pub(crate) fn row_to_relation(row: &rusqlite::Row) -> rusqlite::Result<RelationRow> {
    Ok(RelationRow {
        parent: TicketId::from(row.get::<_, i64>(0)?),
        kind: parse_relation_kind(&row.get::<_, String>(1)?)?,
        child: TicketId::from(row.get::<_, i64>(2)?),
    })
}

/// Convert a database row to a [`ChangeRecord`].
pub(crate) fn row_to_change(row: &rusqlite::Row) -> rusqlite::Result<ChangeRecord> {
    Ok(ChangeRecord {
        ticket: TicketId::from(row.get::<_, i64>(0)?),
        time: from_micros(1, row.get(1)?)?,
        author: row.get(2)?,
        field: row.get(3)?,
        old_value: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        new_value: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
    })
}
