use anyhow::{Context, Result};
use calcache_core::{Calendar, Completion, Event, EventCache, SingleEvent, Timing};
use chrono::{Duration, NaiveDate, NaiveTime};
use owo_colors::OwoColorize;

pub struct NewArgs {
    pub title: String,
    pub date: String,
    pub start: Option<String>,
    pub end: Option<String>,
    pub duration: Option<String>,
    pub task: bool,
}

pub async fn run(cache: &mut EventCache, args: NewArgs, calendar_id: Option<&str>) -> Result<()> {
    let calendar_id = resolve_calendar(calendar_id, cache.calendars())?.to_string();
    let event = build_event(args)?;
    let title = event.title().to_string();

    let id = cache.add_event(&calendar_id, event).await?;

    println!("{}", format!("  Created: {}", title).green());
    println!("  {}", format!("{} in {}", id, calendar_id).dimmed());

    Ok(())
}

fn build_event(args: NewArgs) -> Result<Event> {
    let date = parse_date(&args.date)?;

    let (end_date, timing) = match args.start.as_deref() {
        Some(start) => {
            let start = parse_time(start)?;
            let end = match (args.end.as_deref(), args.duration.as_deref()) {
                (Some(end), _) => parse_time(end)?,
                (None, Some(duration)) => start + parse_duration(duration)?,
                (None, None) => start + Duration::hours(1),
            };
            (None, Timing::Timed { start, end })
        }
        None => {
            if args.end.is_some() {
                anyhow::bail!("--end needs a --start time. Use --duration for multi-day events.");
            }
            let end_date = match args.duration.as_deref() {
                Some(duration) => Some(last_day(date, parse_duration(duration)?)),
                None => None,
            };
            (end_date, Timing::AllDay)
        }
    };

    let event = Event::Single(SingleEvent {
        id: None,
        title: args.title,
        date,
        end_date,
        timing,
        completed: args.task.then_some(Completion::Open),
    });

    Ok(event.validated()?)
}

fn parse_date(input: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}': expected YYYY-MM-DD", input))
}

fn parse_time(input: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(input, "%H:%M")
        .with_context(|| format!("Invalid time '{}': expected HH:MM", input))
}

fn parse_duration(input: &str) -> Result<Duration> {
    let std_dur = humantime::parse_duration(input)
        .map_err(|e| anyhow::anyhow!("Could not parse duration \"{}\": {}", input, e))?;
    Duration::from_std(std_dur).context("Duration too large")
}

/// Last day covered by an all-day event of `length` starting on `date`.
/// Anything up to a day stays on `date`.
fn last_day(date: NaiveDate, length: Duration) -> NaiveDate {
    let days = (length.num_seconds() + 86_399) / 86_400;
    date + Duration::days((days - 1).max(0))
}

/// Resolve which calendar to write to.
fn resolve_calendar<'a>(id: Option<&'a str>, calendars: &'a [Calendar]) -> Result<&'a str> {
    let editable: Vec<&str> = calendars
        .iter()
        .filter(|c| c.is_editable())
        .map(|c| c.id())
        .collect();

    if let Some(id) = id {
        if editable.contains(&id) {
            return Ok(id);
        }
        if calendars.iter().any(|c| c.id() == id) {
            anyhow::bail!("Calendar '{}' is read-only", id);
        }
        anyhow::bail!(
            "Calendar '{}' not found. Available: {}",
            id,
            editable.join(", ")
        );
    }

    match editable.as_slice() {
        [only] => Ok(*only),
        [] => anyhow::bail!("No editable calendars. Add a \"local\" calendar to your config."),
        _ => anyhow::bail!(
            "Multiple calendars found ({}). Use --calendar to specify one.",
            editable.join(", ")
        ),
    }
}
