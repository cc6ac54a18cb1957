//! Symmetric cross-references kept in the `refs` field.
//!
//! When ticket A lists B, B's `refs` field is rewritten to list A as well.
//! The counterpart is edited directly (custom row, history row, change time),
//! so its own change listeners do not run.

use crate::config::RelationsConfig;
use crate::db::TicketStore;
use crate::domain::{
    FieldError, REFS_FIELD, Ticket, TicketChange, TicketDraft, TicketId, TicketIdSet, id_tokens,
};
use crate::error::Result;
use crate::host::{Request, TicketChangeListener, TicketManipulator};
use crate::relations::MentionParser;

/// Validates the `refs` field and mirrors it onto referenced tickets.
#[derive(Debug, Clone)]
pub struct TicketReferences {
    mentions: MentionParser,
}

impl TicketReferences {
    /// Create the component using the configured mention commands.
    #[must_use]
    pub fn new(config: &RelationsConfig) -> Self {
        Self {
            mentions: MentionParser::new(&config.mention_commands),
        }
    }

    /// Existing tickets other than `own` mentioned in `text`.
    fn mentioned_tickets(
        &self,
        store: &TicketStore<'_>,
        own: TicketId,
        text: &str,
    ) -> Result<TicketIdSet> {
        let mut found = TicketIdSet::new();
        for id in &self.mentions.parse(text) {
            if id == own {
                continue;
            }
            if store.ticket_exists(id)? {
                found.insert(id);
            } else {
                tracing::debug!(ticket = %own, mentioned = %id, "Ignoring mention of unknown ticket");
            }
        }
        Ok(found)
    }

    /// Add `source` to the `refs` field of `target`.
    fn add_mirror(
        store: &TicketStore<'_>,
        source: TicketId,
        target: TicketId,
        author: &str,
    ) -> Result<()> {
        if source == target {
            return Ok(());
        }
        if !store.ticket_exists(target)? {
            tracing::warn!(source = %source, target = %target, "Referenced ticket does not exist");
            return Ok(());
        }

        let old_text = store.custom_field(target, REFS_FIELD)?.unwrap_or_default();
        let mut refs = TicketIdSet::from_stored(&old_text);
        if !refs.insert(source) {
            return Ok(());
        }

        let new_text = refs.to_field_text();
        store.set_custom_field(target, REFS_FIELD, &new_text)?;
        store.record_change(target, author, REFS_FIELD, old_text.trim(), &new_text)?;
        store.touch(target)?;

        tracing::debug!(source = %source, target = %target, "Mirrored reference");
        Ok(())
    }

    /// Remove `source` from the `refs` field of `target`.
    fn remove_mirror(
        store: &TicketStore<'_>,
        source: TicketId,
        target: TicketId,
        author: &str,
    ) -> Result<()> {
        if !store.ticket_exists(target)? {
            tracing::warn!(source = %source, target = %target, "Referenced ticket does not exist");
            return Ok(());
        }

        let old_text = store.custom_field(target, REFS_FIELD)?.unwrap_or_default();
        let mut refs = TicketIdSet::from_stored(&old_text);
        if !refs.remove(source) {
            return Ok(());
        }

        let new_text = refs.to_field_text();
        if refs.is_empty() {
            store.delete_custom_field(target, REFS_FIELD)?;
        } else {
            store.set_custom_field(target, REFS_FIELD, &new_text)?;
        }
        store.record_change(target, author, REFS_FIELD, old_text.trim(), &new_text)?;
        store.touch(target)?;

        tracing::debug!(source = %source, target = %target, "Removed mirrored reference");
        Ok(())
    }
}

impl TicketManipulator for TicketReferences {
    fn validate_ticket(
        &self,
        store: &TicketStore<'_>,
        _req: &Request,
        ticket: &mut TicketDraft,
    ) -> Result<Vec<FieldError>> {
        if !ticket.fields.has_refs() {
            return Ok(Vec::new());
        }

        let mut errors = Vec::new();
        let mut refs = TicketIdSet::new();
        for token in id_tokens(ticket.fields.refs_text()) {
            let Ok(id) = token.parse::<TicketId>() else {
                errors.push(FieldError::field(
                    REFS_FIELD,
                    format!("Input only numbers for ticket ID: {token}"),
                ));
                continue;
            };

            if Some(id) == ticket.id {
                errors.push(FieldError::field(
                    REFS_FIELD,
                    format!("Ticket {id} is this ticket ID, remove it."),
                ));
            } else if !store.ticket_exists(id)? {
                errors.push(FieldError::field(
                    REFS_FIELD,
                    format!("Ticket #{id} does not exist"),
                ));
            } else {
                refs.insert(id);
            }
        }

        if errors.is_empty() {
            ticket.fields.set(REFS_FIELD, refs.to_field_text());
        }
        Ok(errors)
    }
}

impl TicketChangeListener for TicketReferences {
    fn ticket_created(&self, store: &TicketStore<'_>, ticket: &Ticket) -> Result<()> {
        let mut refs = ticket.fields.refs();
        let mentioned = self.mentioned_tickets(store, ticket.id, &ticket.fields.description)?;
        let new_mentions = mentioned.difference(&refs);
        if !new_mentions.is_empty() {
            refs.extend_from(&new_mentions);
            store.set_custom_field(ticket.id, REFS_FIELD, &refs.to_field_text())?;
            tracing::debug!(ticket = %ticket.id, mentioned = %new_mentions, "Added references from description");
        }

        for target in &refs {
            Self::add_mirror(store, ticket.id, target, &ticket.fields.reporter)?;
        }
        Ok(())
    }

    fn ticket_changed(
        &self,
        store: &TicketStore<'_>,
        ticket: &Ticket,
        change: &TicketChange,
    ) -> Result<()> {
        let refs_touched = change.touches(REFS_FIELD);
        let before = if refs_touched {
            TicketIdSet::from_stored(change.old_value(REFS_FIELD))
        } else {
            ticket.fields.refs()
        };

        let mut refs = ticket.fields.refs();
        let mentioned = self.mentioned_tickets(store, ticket.id, &change.comment)?;
        let new_mentions = mentioned.difference(&refs);
        if !new_mentions.is_empty() {
            let old_text = ticket.fields.refs_text().trim().to_string();
            refs.extend_from(&new_mentions);
            let new_text = refs.to_field_text();
            store.set_custom_field(ticket.id, REFS_FIELD, &new_text)?;
            store.record_change(ticket.id, &change.author, REFS_FIELD, &old_text, &new_text)?;
            tracing::debug!(ticket = %ticket.id, mentioned = %new_mentions, "Added references from comment");
        } else if !refs_touched {
            return Ok(());
        }

        for target in &refs.difference(&before) {
            Self::add_mirror(store, ticket.id, target, &change.author)?;
        }
        for target in &before.difference(&refs) {
            Self::remove_mirror(store, ticket.id, target, &change.author)?;
        }
        Ok(())
    }

    fn ticket_deleted(&self, store: &TicketStore<'_>, ticket: &Ticket, author: &str) -> Result<()> {
        for target in &ticket.fields.refs() {
            Self::remove_mirror(store, ticket.id, target, author)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::domain::TicketFields;

    fn id(n: i64) -> TicketId {
        TicketId::new(n)
    }

    fn component() -> TicketReferences {
        TicketReferences::new(&RelationsConfig::default())
    }

    fn seeded(count: i64) -> Database {
        let db = Database::open_in_memory().unwrap();
        db.transaction(|store| {
            for n in 1..=count {
                store.insert_ticket(&TicketFields::new(format!("Ticket {n}")))?;
            }
            Ok(())
        })
        .unwrap();
        db
    }

    fn validate(db: &Database, own: Option<i64>, refs: &str) -> (Vec<String>, String) {
        db.query(|store| {
            let mut fields = TicketFields::new("draft");
            fields.set(REFS_FIELD, refs);
            let mut draft = TicketDraft {
                id: own.map(id),
                fields,
            };
            let errors = component().validate_ticket(store, &Request::new("tester"), &mut draft)?;
            Ok((
                errors.into_iter().map(|e| e.message).collect(),
                draft.fields.refs_text().to_string(),
            ))
        })
        .unwrap()
    }

    #[test]
    fn validation_normalizes_valid_refs() {
        let db = seeded(3);
        let (errors, normalized) = validate(&db, Some(1), "3 2, 3");

        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(normalized, "2, 3");
    }

    #[test]
    fn validation_reports_each_bad_token() {
        let db = seeded(3);
        let (errors, normalized) = validate(&db, Some(1), "x, 1, 42");

        assert_eq!(
            errors,
            vec![
                "Input only numbers for ticket ID: x".to_string(),
                "Ticket 1 is this ticket ID, remove it.".to_string(),
                "Ticket #42 does not exist".to_string(),
            ]
        );
        assert_eq!(normalized, "x, 1, 42");
    }

    #[test]
    fn blank_refs_are_not_validated() {
        let db = seeded(1);
        let (errors, normalized) = validate(&db, Some(1), "   ");

        assert!(errors.is_empty());
        assert_eq!(normalized, "   ");
    }

    #[test]
    fn mirrors_are_added_and_removed() {
        let db = seeded(3);
        db.transaction(|store| {
            TicketReferences::add_mirror(store, id(1), id(2), "alice")?;
            TicketReferences::add_mirror(store, id(3), id(2), "alice")?;
            assert_eq!(store.custom_field(id(2), REFS_FIELD)?.as_deref(), Some("1, 3"));

            TicketReferences::remove_mirror(store, id(1), id(2), "bob")?;
            assert_eq!(store.custom_field(id(2), REFS_FIELD)?.as_deref(), Some("3"));

            TicketReferences::remove_mirror(store, id(3), id(2), "bob")?;
            assert_eq!(store.custom_field(id(2), REFS_FIELD)?, None);

            let history: Vec<(String, String)> = store
                .changes(id(2))?
                .into_iter()
                .map(|c| (c.old_value, c.new_value))
                .collect();
            assert_eq!(
                history,
                vec![
                    (String::new(), "1".to_string()),
                    ("1".to_string(), "1, 3".to_string()),
                    ("1, 3".to_string(), "3".to_string()),
                    ("3".to_string(), String::new()),
                ]
            );
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn mirror_to_missing_ticket_is_skipped() {
        let db = seeded(1);
        db.transaction(|store| {
            TicketReferences::add_mirror(store, id(1), id(9), "alice")?;
            TicketReferences::remove_mirror(store, id(1), id(9), "alice")?;
            assert!(store.changes(id(1))?.is_empty());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn existing_mirror_is_not_recorded_twice() {
        let db = seeded(2);
        db.transaction(|store| {
            TicketReferences::add_mirror(store, id(1), id(2), "alice")?;
            TicketReferences::add_mirror(store, id(1), id(2), "alice")?;
            assert_eq!(store.changes(id(2))?.len(), 1);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn mentions_skip_self_and_unknown_tickets() {
        let db = seeded(3);
        let found = db
            .query(|store| component().mentioned_tickets(store, id(1), "refs #1, #2 and #99"))
            .unwrap();

        assert_eq!(found, TicketIdSet::from_iter([id(2)]));
    }
}
