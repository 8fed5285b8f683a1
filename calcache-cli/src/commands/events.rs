use anyhow::Result;
use calcache_core::EventCache;
use calcache_core::date_range::DateRange;
use calcache_core::recurrence::{Occurrence, occurrences};
use chrono::NaiveDate;
use owo_colors::OwoColorize;
use tracing::warn;

struct AgendaEntry<'a> {
    occurrence: Occurrence,
    title: &'a str,
    calendar_id: &'a str,
}

pub fn run(cache: &EventCache, calendar: Option<&str>, range: DateRange) -> Result<()> {
    let mut entries: Vec<AgendaEntry> = Vec::new();

    for (id, record) in cache.records() {
        if calendar.is_some_and(|c| c != record.calendar_id) {
            continue;
        }

        let found = match occurrences(&record.event, &range) {
            Ok(found) => found,
            Err(e) => {
                warn!(event = id, "Could not expand event: {}", e);
                continue;
            }
        };
        entries.extend(found.into_iter().map(|occurrence| AgendaEntry {
            occurrence,
            title: record.event.title(),
            calendar_id: &record.calendar_id,
        }));
    }

    // All-day entries first within a day, then by start time
    entries.sort_by(|a, b| {
        (a.occurrence.start.date(), !a.occurrence.all_day, a.occurrence.start, a.title).cmp(&(
            b.occurrence.start.date(),
            !b.occurrence.all_day,
            b.occurrence.start,
            b.title,
        ))
    });

    if entries.is_empty() {
        println!("{}", "No events found".dimmed());
        return Ok(());
    }

    let today = chrono::Local::now().date_naive();
    let mut current_date: Option<String> = None;

    for entry in &entries {
        let date_label = format_date_label(entry.occurrence.start.date(), today);

        if current_date.as_ref() != Some(&date_label) {
            if current_date.is_some() {
                println!();
            }
            println!("{}", date_label.bold());
            current_date = Some(date_label);
        }

        let cal_tag = format!("[{}]", entry.calendar_id);
        println!(
            "  {} {} {}",
            format_time(&entry.occurrence),
            entry.title,
            cal_tag.dimmed()
        );
    }

    Ok(())
}

/// Dump the display form of every event, grouped by calendar.
pub fn print_json(cache: &EventCache, calendar: Option<&str>) -> Result<()> {
    let sources: Vec<_> = cache
        .get_all_events()
        .into_iter()
        .filter(|source| calendar.is_none_or(|c| c == source.id))
        .collect();

    println!("{}", serde_json::to_string_pretty(&sources)?);
    Ok(())
}

/// Format a date as a human-readable label (e.g. "Today", "Tomorrow", "Wed Feb 25")
fn format_date_label(date: NaiveDate, today: NaiveDate) -> String {
    match (date - today).num_days() {
        0 => "Today".to_string(),
        1 => "Tomorrow".to_string(),
        _ => date.format("%a %b %-d").to_string(),
    }
}

/// Format the time portion of an occurrence (e.g. "  15:00" or "all-day")
fn format_time(occurrence: &Occurrence) -> String {
    if occurrence.all_day {
        "all-day".to_string()
    } else {
        format!("{:>7}", occurrence.start.format("%H:%M"))
    }
}
