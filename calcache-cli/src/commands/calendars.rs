use anyhow::Result;
use calcache_core::EventCache;
use owo_colors::OwoColorize;

use crate::render::{Render, pluralize};

pub fn run(cache: &EventCache) -> Result<()> {
    if cache.calendars().is_empty() {
        println!("{}", "No usable calendars".dimmed());
        return Ok(());
    }

    for calendar in cache.calendars() {
        let count = cache
            .records()
            .filter(|(_, record)| record.calendar_id == calendar.id())
            .count();
        let label = format!("({} {})", count, pluralize("event", count));
        println!("{} {}", calendar.render(), label.dimmed());
    }

    Ok(())
}
