//! Note frontmatter.
//!
//! A note may start with a TOML table between two `+++` lines:
//!
//! ```text
//! +++
//! title = "Dentist"
//! date = "2024-03-04"
//! allDay = true
//! +++
//! Bring the insurance card.
//! ```
//!
//! Everything after the closing delimiter is the body and is never touched
//! when the frontmatter is rewritten.

use toml::Table;

use crate::error::ValidationError;

const DELIMITER: &str = "+++";

/// Split a note into its raw frontmatter and its body.
///
/// Returns `(None, text)` when the note has no complete frontmatter block.
pub fn split(text: &str) -> (Option<&str>, &str) {
    let Some(rest) = after_opening_delimiter(text) else {
        return (None, text);
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == DELIMITER {
            return (Some(&rest[..offset]), &rest[offset + line.len()..]);
        }
        offset += line.len();
    }

    (None, text)
}

fn after_opening_delimiter(text: &str) -> Option<&str> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let (first, rest) = text.split_once('\n')?;
    (first.trim_end() == DELIMITER).then_some(rest)
}

/// Read a note's frontmatter as a key/value table.
pub fn read(text: &str) -> Result<Option<Table>, ValidationError> {
    match split(text).0 {
        Some(source) => toml::from_str(source)
            .map(Some)
            .map_err(|e: toml::de::Error| ValidationError::Malformed(e.to_string())),
        None => Ok(None),
    }
}

/// Render a note from a frontmatter table and a body.
pub fn render(table: &Table, body: &str) -> Result<String, ValidationError> {
    let source = toml::to_string(table).map_err(|e| ValidationError::Malformed(e.to_string()))?;

    let mut note = String::with_capacity(source.len() + body.len() + 8);
    note.push_str(DELIMITER);
    note.push('\n');
    note.push_str(&source);
    if !source.ends_with('\n') {
        note.push('\n');
    }
    note.push_str(DELIMITER);
    note.push('\n');
    note.push_str(body);
    Ok(note)
}

/// Replace a note's frontmatter, keeping its body. A note without frontmatter
/// keeps its whole text as the body.
pub fn replace(text: &str, table: &Table) -> Result<String, ValidationError> {
    render(table, split(text).1)
}

/// Rewrite the keys listed in `owned` from `table`, leaving every other key
/// of the note's frontmatter and its body as they were.
pub fn merge(text: &str, table: &Table, owned: &[&str]) -> Result<String, ValidationError> {
    let mut merged = read(text)?.unwrap_or_default();
    for key in owned {
        merged.remove(*key);
    }
    for (key, value) in table {
        merged.insert(key.clone(), value.clone());
    }
    replace(text, &merged)
}
