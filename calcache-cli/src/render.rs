//! Colored terminal rendering for calcache types.

use calcache_core::{CacheUpdate, Calendar, EventInput};
use owo_colors::OwoColorize;

pub trait Render {
    fn render(&self) -> String;
}

impl Render for Calendar {
    fn render(&self) -> String {
        let access = if self.is_editable() {
            "editable".green().to_string()
        } else {
            "read-only".dimmed().to_string()
        };

        format!("{} {} {}", swatch(self.color()), self.id(), access)
    }
}

impl Render for EventInput {
    fn render(&self) -> String {
        let when = self
            .start
            .as_deref()
            .or(self.start_recur.as_deref())
            .unwrap_or(if self.rrule.is_some() { "rule" } else { "weekly" });
        let cal_tag = format!("[{}]", self.extended_props.calendar_id);

        format!("{} {} {}", self.title, when.dimmed(), cal_tag.dimmed())
    }
}

impl Render for CacheUpdate {
    fn render(&self) -> String {
        let mut lines = Vec::new();

        for id in &self.ids_to_remove {
            lines.push(format!("   {} {}", "-".red(), id.red()));
        }
        for event in &self.to_add {
            lines.push(format!("   {} {}", "+".green(), event.render()));
        }

        lines.join("\n")
    }
}

/// A colored dot for a `#rrggbb` color, or a plain one for anything else.
pub fn swatch(color: &str) -> String {
    match parse_hex(color) {
        Some((r, g, b)) => "●".truecolor(r, g, b).to_string(),
        None => "●".to_string(),
    }
}

fn parse_hex(color: &str) -> Option<(u8, u8, u8)> {
    let hex = color.strip_prefix('#')?;
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }

    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some((channel(0)?, channel(2)?, channel(4)?))
}

pub fn pluralize(word: &str, count: usize) -> String {
    if count == 1 {
        word.to_string()
    } else {
        format!("{}s", word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_six_digit_hex_colors() {
        assert_eq!(parse_hex("#3b82f6"), Some((0x3b, 0x82, 0xf6)));
        assert_eq!(parse_hex("#808080"), Some((128, 128, 128)));
    }

    #[test]
    fn rejects_other_color_forms() {
        assert_eq!(parse_hex("red"), None);
        assert_eq!(parse_hex("#fff"), None);
        assert_eq!(parse_hex("#gggggg"), None);
        assert_eq!(parse_hex("#ééé"), None);
    }

    #[test]
    fn pluralizes_counts() {
        assert_eq!(pluralize("event", 1), "event");
        assert_eq!(pluralize("event", 0), "events");
        assert_eq!(pluralize("event", 3), "events");
    }
}
