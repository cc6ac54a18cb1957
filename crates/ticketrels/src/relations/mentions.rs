//! Ticket mentions in free text.
//!
//! A mention is a command keyword followed by one or more ticket references:
//!
//! ```text
//! refs #12, #14 and ticket:20
//! See: issue:7 & bug 9
//! ```
//!
//! The scanner is hand-written; keywords are matched case-insensitively and
//! only at word boundaries.

use crate::domain::{TicketId, TicketIdSet};
use std::collections::HashSet;

/// Words that may introduce a ticket number instead of `#`.
const TICKET_PREFIXES: &[&str] = &["ticket", "issue", "bug"];

/// Extracts mentioned ticket IDs from descriptions and comments.
#[derive(Debug, Clone)]
pub struct MentionParser {
    commands: HashSet<String>,
}

impl MentionParser {
    /// Create a parser recognizing the given command keywords.
    pub fn new<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            commands: commands
                .into_iter()
                .map(|c| c.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    /// All tickets mentioned in `text`.
    #[must_use]
    pub fn parse(&self, text: &str) -> TicketIdSet {
        let mut found = TicketIdSet::new();
        let mut pos = 0;
        let mut prev_alnum = false;

        while let Some(c) = text[pos..].chars().next() {
            if c.is_ascii_alphabetic() && !prev_alnum {
                let rest = &text[pos..];
                let word_len = rest.bytes().take_while(u8::is_ascii_alphabetic).count();
                let word = &rest[..word_len];
                let at_boundary = !starts_with_alnum(&rest[word_len..]);

                pos += word_len;
                if at_boundary && self.commands.contains(&word.to_ascii_lowercase()) {
                    pos += collect_refs(&text[pos..], &mut found);
                }
                prev_alnum = text[..pos].chars().next_back().is_some_and(char::is_alphanumeric);
                continue;
            }
            prev_alnum = c.is_alphanumeric();
            pos += c.len_utf8();
        }

        found
    }
}

/// Parse the reference list following a command keyword.
///
/// Returns the number of bytes consumed, zero when no reference follows.
fn collect_refs(s: &str, found: &mut TicketIdSet) -> usize {
    let mut pos = skip_whitespace(s);
    if s[pos..].starts_with([':', '.']) {
        pos += 1;
        pos += skip_whitespace(&s[pos..]);
    }

    let mut consumed = 0;
    while let Some((id, len)) = parse_ticket_ref(&s[pos..]) {
        found.insert(id);
        pos += len;
        consumed = pos;

        let sep = separator_len(&s[pos..]);
        if sep == 0 {
            break;
        }
        pos += sep;
    }
    consumed
}

/// Parse `#12`, `ticket:12`, `ticket 12` or `ticket12` at the start of `s`.
fn parse_ticket_ref(s: &str) -> Option<(TicketId, usize)> {
    let prefix_len = if s.starts_with('#') {
        1
    } else {
        let prefix = TICKET_PREFIXES
            .iter()
            .find(|p| s.get(..p.len()).is_some_and(|head| head.eq_ignore_ascii_case(p)))?;
        let mut len = prefix.len();
        if s[len..].starts_with([':', ' ']) {
            len += 1;
        }
        len
    };

    let rest = &s[prefix_len..];
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 || starts_with_alnum(&rest[digits..]) {
        return None;
    }
    let id = rest[..digits].parse::<TicketId>().ok()?;
    Some((id, prefix_len + digits))
}

/// Length of a separator between references: `,`, `&`, spaces, or `and`.
fn separator_len(s: &str) -> usize {
    let mut len = count_separators(s);
    let rest = &s[len..];
    if rest.get(..3).is_some_and(|w| w.eq_ignore_ascii_case("and")) && !starts_with_alnum(&rest[3..])
    {
        len += 3;
        len += count_separators(&s[len..]);
    }
    len
}

fn count_separators(s: &str) -> usize {
    s.bytes()
        .take_while(|b| matches!(b, b' ' | b',' | b'&'))
        .count()
}

fn skip_whitespace(s: &str) -> usize {
    s.len() - s.trim_start().len()
}

fn starts_with_alnum(s: &str) -> bool {
    s.chars().next().is_some_and(char::is_alphanumeric)
}
