//! Presentation format handed to subscribers and calendar views.
//!
//! Field names follow the usual calendar-grid input shape (camelCase JSON):
//! single events carry `start`/`end`, weekday series carry `daysOfWeek` and
//! times, rule series carry an iCalendar `rrule` string with its `DTSTART`.

use chrono::{Duration, NaiveDate, NaiveTime};
use serde::Serialize;

use crate::event::{Completion, Event, Timing};
use crate::store::StoredEvent;

/// One event ready for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventInput {
    pub id: String,
    pub title: String,
    pub all_day: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    /// Exclusive. All-day events end the day after their last day.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,

    /// 0 is Sunday
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_of_week: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_recur: Option<String>,
    /// Exclusive, like `end`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_recur: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rrule: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exdate: Vec<String>,
    /// `HH:MM` length of each instance of a timed rule series
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub extended_props: ExtendedProps,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedProps {
    pub calendar_id: String,
    pub is_task: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_completed: Option<TaskCompleted>,
}

/// `false`, `true` or the completion timestamp.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TaskCompleted {
    Flag(bool),
    At(String),
}

/// All events of one calendar, with how to show them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventSource {
    pub id: String,
    pub color: String,
    pub editable: bool,
    pub events: Vec<EventInput>,
}

/// Convert a stored record into its display form.
pub fn to_event_input(id: &str, record: &StoredEvent, color: Option<&str>) -> EventInput {
    let event = &record.event;
    let timing = event.timing();

    let mut input = EventInput {
        id: id.to_string(),
        title: event.title().to_string(),
        all_day: timing.is_all_day(),
        start: None,
        end: None,
        days_of_week: None,
        start_time: None,
        end_time: None,
        start_recur: None,
        end_recur: None,
        rrule: None,
        exdate: Vec::new(),
        duration: None,
        color: color.map(str::to_string),
        extended_props: ExtendedProps {
            calendar_id: record.calendar_id.clone(),
            is_task: event.is_task(),
            task_completed: None,
        },
    };

    match event {
        Event::Single(e) => {
            let last = e.end_date.unwrap_or(e.date);
            match timing {
                Timing::AllDay => {
                    input.start = Some(date_string(e.date));
                    input.end = e.end_date.map(|end| date_string(end + Duration::days(1)));
                }
                Timing::Timed { start, end } => {
                    let starts = e.date.and_time(start);
                    let mut ends = last.and_time(end);
                    if ends < starts {
                        ends += Duration::days(1);
                    }
                    input.start = Some(starts.format("%Y-%m-%dT%H:%M").to_string());
                    input.end = Some(ends.format("%Y-%m-%dT%H:%M").to_string());
                }
            }
            input.extended_props.task_completed = e.completed.map(|c| match c {
                Completion::Open => TaskCompleted::Flag(false),
                Completion::Done(None) => TaskCompleted::Flag(true),
                Completion::Done(Some(at)) => TaskCompleted::At(at.to_rfc3339()),
            });
        }
        Event::Recurring(e) => {
            input.days_of_week = Some(
                e.days_of_week
                    .iter()
                    .map(|day| day.num_days_from_sunday())
                    .collect(),
            );
            if let Timing::Timed { start, end } = timing {
                input.start_time = Some(time_string(start));
                input.end_time = Some(time_string(end));
            }
            input.start_recur = e.start_recur.map(date_string);
            input.end_recur = e.end_recur.map(|end| date_string(end + Duration::days(1)));
            input.exdate = e.skip_dates.iter().map(|d| date_string(*d)).collect();
        }
        Event::Rrule(e) => {
            let dtstart = match timing {
                Timing::AllDay => e.start_date.format("%Y%m%d").to_string(),
                Timing::Timed { start, .. } => e
                    .start_date
                    .and_time(start)
                    .format("%Y%m%dT%H%M%S")
                    .to_string(),
            };
            input.rrule = Some(format!("DTSTART:{}\nRRULE:{}", dtstart, e.rrule));
            input.exdate = e
                .skip_dates
                .iter()
                .map(|day| match timing {
                    Timing::AllDay => date_string(*day),
                    Timing::Timed { start, .. } => {
                        day.and_time(start).format("%Y-%m-%dT%H:%M:%S").to_string()
                    }
                })
                .collect();
            if let Timing::Timed { start, end } = timing {
                input.duration = Some(duration_string(start, end));
            }
        }
    }

    input
}

fn date_string(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn time_string(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

/// Length from `start` to `end`, wrapping past midnight.
fn duration_string(start: NaiveTime, end: NaiveTime) -> String {
    let mut length = end - start;
    if length < Duration::zero() {
        length += Duration::days(1);
    }
    format!("{:02}:{:02}", length.num_hours(), length.num_minutes() % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::Location;

    fn stored(raw: &str) -> StoredEvent {
        StoredEvent {
            calendar_id: "local::events".into(),
            location: Some(Location::new("events/x.md")),
            event: Event::validate(&toml::from_str(raw).unwrap()).unwrap(),
        }
    }

    #[test]
    fn all_day_single_end_is_exclusive() {
        let record = stored(
            r#"
            title = "Trip"
            date = "2024-03-01"
            endDate = "2024-03-03"
            allDay = true
            "#,
        );
        let input = to_event_input("1", &record, Some("red"));

        assert_eq!(input.start.as_deref(), Some("2024-03-01"));
        assert_eq!(input.end.as_deref(), Some("2024-03-04"));
        assert_eq!(input.color.as_deref(), Some("red"));
        assert_eq!(input.extended_props.calendar_id, "local::events");
    }

    #[test]
    fn task_state_is_exposed() {
        let record = stored(
            r#"
            title = "Call bank"
            date = "2024-03-01"
            allDay = false
            startTime = "22:00"
            endTime = "01:00"
            completed = false
            "#,
        );
        let input = to_event_input("1", &record, None);

        assert_eq!(input.end.as_deref(), Some("2024-03-02T01:00"));
        assert!(input.extended_props.is_task);
        assert_eq!(
            input.extended_props.task_completed,
            Some(TaskCompleted::Flag(false))
        );
    }

    #[test]
    fn weekday_series_uses_sunday_based_days() {
        let record = stored(
            r#"
            type = "recurring"
            title = "Standup"
            daysOfWeek = ["U", "M"]
            allDay = false
            startTime = "09:00"
            endTime = "09:15"
            "#,
        );
        let input = to_event_input("1", &record, None);

        assert_eq!(input.days_of_week, Some(vec![0, 1]));
        assert_eq!(input.start_time.as_deref(), Some("09:00"));
        assert_eq!(input.start, None);
    }

    #[test]
    fn rule_series_serializes_with_dtstart_and_duration() {
        let record = stored(
            r#"
            type = "rrule"
            title = "Gym"
            startDate = "2024-01-01"
            rrule = "FREQ=WEEKLY;BYDAY=MO"
            skipDates = ["2024-01-08"]
            allDay = false
            startTime = "18:00"
            endTime = "19:30"
            "#,
        );
        let input = to_event_input("7", &record, None);

        assert_eq!(
            input.rrule.as_deref(),
            Some("DTSTART:20240101T180000\nRRULE:FREQ=WEEKLY;BYDAY=MO")
        );
        assert_eq!(input.exdate, vec!["2024-01-08T18:00:00"]);
        assert_eq!(input.duration.as_deref(), Some("01:30"));

        let json = serde_json::to_value(&input).unwrap();
        assert_eq!(json["allDay"], false);
        assert_eq!(json["extendedProps"]["isTask"], false);
        assert!(json.get("daysOfWeek").is_none());
    }
}
