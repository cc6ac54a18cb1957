//! Database schema definitions.

/// Tables owned by the tracker itself.
pub(crate) const HOST_SCHEMA: &str = r"
-- Tickets and their standard fields
CREATE TABLE IF NOT EXISTS ticket (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    type TEXT NOT NULL DEFAULT '',
    time INTEGER NOT NULL,
    changetime INTEGER NOT NULL,
    component TEXT NOT NULL DEFAULT '',
    priority TEXT NOT NULL DEFAULT '',
    owner TEXT NOT NULL DEFAULT '',
    reporter TEXT NOT NULL DEFAULT '',
    cc TEXT NOT NULL DEFAULT '',
    version TEXT NOT NULL DEFAULT '',
    milestone TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT 'new',
    resolution TEXT NOT NULL DEFAULT '',
    summary TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT '',
    keywords TEXT NOT NULL DEFAULT ''
);

CREATE INDEX IF NOT EXISTS idx_ticket_status ON ticket(status);

-- Custom field values
CREATE TABLE IF NOT EXISTS ticket_custom (
    ticket INTEGER NOT NULL,
    name TEXT NOT NULL,
    value TEXT,
    PRIMARY KEY (ticket, name)
);

-- Change history; comments use field = 'comment'
CREATE TABLE IF NOT EXISTS ticket_change (
    ticket INTEGER NOT NULL,
    time INTEGER NOT NULL,
    author TEXT NOT NULL DEFAULT '',
    field TEXT NOT NULL,
    oldvalue TEXT,
    newvalue TEXT
);

CREATE INDEX IF NOT EXISTS idx_ticket_change_ticket ON ticket_change(ticket);

-- Schema versions of the tracker and its plugins
CREATE TABLE IF NOT EXISTS system (
    name TEXT PRIMARY KEY,
    value TEXT
);
";

/// Name of the plugin's relation table.
pub const RELATIONS_TABLE: &str = "ticketrels";

/// Relation table DDL, applied by the schema participant.
pub(crate) const RELATIONS_SCHEMA: &str = r"
-- Parent/child edges: oneself is the parent, ticket the child
CREATE TABLE IF NOT EXISTS ticketrels (
    oneself INTEGER NOT NULL,
    relations TEXT NOT NULL,
    ticket INTEGER NOT NULL,
    PRIMARY KEY (oneself, relations, ticket)
);

CREATE INDEX IF NOT EXISTS idx_ticketrels_ticket ON ticketrels(ticket);
";
