//! Typed ticket identifiers and ID lists.
//!
//! The `parents` and `refs` custom fields hold ticket IDs as free text. Inside
//! the crate that text is always materialized as a [`TicketIdSet`]: ordered,
//! deduplicated and validated. Strict parsing is used for user input;
//! [`TicketIdSet::from_stored`] is used for text that was already persisted and
//! may predate validation.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Separator used when serializing an ID list back into a text field.
pub const ID_LIST_SEPARATOR: &str = ", ";

/// Numeric identifier of a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(i64);

impl TicketId {
    /// Create a ticket ID from its numeric value.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the raw value for database binding.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self.0
    }
}

impl From<i64> for TicketId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TicketId {
    type Err = Error;

    /// Parse a single token such as `12` or `#12`.
    fn from_str(s: &str) -> Result<Self> {
        let digits = s.strip_prefix('#').unwrap_or(s);
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(Error::InvalidTicketId(s.to_string()));
        }
        match digits.parse::<i64>() {
            Ok(id) if id > 0 => Ok(Self(id)),
            _ => Err(Error::InvalidTicketId(s.to_string())),
        }
    }
}

/// Ordered, deduplicated set of ticket IDs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketIdSet(BTreeSet<TicketId>);

impl TicketIdSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse user-entered text strictly.
    ///
    /// Tokens are separated by commas and/or whitespace. Every token must be a
    /// positive decimal number, optionally prefixed by `#`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTicketId`] naming the first bad token.
    pub fn parse(text: &str) -> Result<Self> {
        id_tokens(text).map(str::parse::<TicketId>).collect()
    }

    /// Parse text that was read back from storage.
    ///
    /// Invalid tokens are skipped with a warning instead of failing; stored
    /// fields may have been written before validation existed.
    #[must_use]
    pub fn from_stored(text: &str) -> Self {
        id_tokens(text)
            .filter_map(|token| match token.parse::<TicketId>() {
                Ok(id) => Some(id),
                Err(_) => {
                    tracing::warn!(token, "Ignoring invalid ticket ID in stored field");
                    None
                }
            })
            .collect()
    }

    /// Returns every token of `text` that is not a valid ticket ID.
    #[must_use]
    pub fn invalid_tokens(text: &str) -> Vec<&str> {
        id_tokens(text)
            .filter(|token| token.parse::<TicketId>().is_err())
            .collect()
    }

    /// Add an ID, returning `true` if it was not already present.
    pub fn insert(&mut self, id: TicketId) -> bool {
        self.0.insert(id)
    }

    /// Remove an ID, returning `true` if it was present.
    pub fn remove(&mut self, id: TicketId) -> bool {
        self.0.remove(&id)
    }

    /// Check membership.
    #[must_use]
    pub fn contains(&self, id: TicketId) -> bool {
        self.0.contains(&id)
    }

    /// Number of IDs in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when the set holds no IDs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = TicketId> + '_ {
        self.0.iter().copied()
    }

    /// IDs present in `self` but not in `other`, ascending.
    #[must_use]
    pub fn difference(&self, other: &Self) -> Self {
        self.0.difference(&other.0).copied().collect()
    }

    /// Add every ID of `other` to `self`.
    pub fn extend_from(&mut self, other: &Self) {
        self.0.extend(other.iter());
    }

    /// Serialize to the canonical field text, e.g. `1, 3, 5`.
    #[must_use]
    pub fn to_field_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TicketIdSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, id) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(ID_LIST_SEPARATOR)?;
            }
            write!(f, "{id}")?;
        }
        Ok(())
    }
}

impl FromIterator<TicketId> for TicketIdSet {
    fn from_iter<I: IntoIterator<Item = TicketId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<TicketId> for TicketIdSet {
    fn extend<I: IntoIterator<Item = TicketId>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl<'a> IntoIterator for &'a TicketIdSet {
    type Item = TicketId;
    type IntoIter = std::iter::Copied<std::collections::btree_set::Iter<'a, TicketId>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter().copied()
    }
}

/// Split ID list text on commas and whitespace, dropping empty tokens.
pub(crate) fn id_tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
}
