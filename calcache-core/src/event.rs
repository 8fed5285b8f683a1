//! Calendar event model.
//!
//! An [`Event`] is one of three shapes: a single occurrence, a series repeating
//! on fixed weekdays, or a series described by an RFC 5545 recurrence rule.
//! Events are validated from a raw key/value map (a note's frontmatter) and
//! turned back into one with [`Event::to_raw`].

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Timelike, Weekday};
use serde::Deserialize;
use toml::{Table, Value};

use crate::error::ValidationError;
use crate::recurrence;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M";

/// Whole-day event, or one with a wall-clock start and end (no offset).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timing {
    AllDay,
    Timed { start: NaiveTime, end: NaiveTime },
}

impl Timing {
    pub fn is_all_day(&self) -> bool {
        matches!(self, Timing::AllDay)
    }

    pub fn start_time(&self) -> Option<NaiveTime> {
        match self {
            Timing::AllDay => None,
            Timing::Timed { start, .. } => Some(*start),
        }
    }
}

/// Task state of a single event. An event without one is not a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// `completed = false`
    Open,
    /// `completed = true`, or the time the task was completed
    Done(Option<DateTime<FixedOffset>>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleEvent {
    pub id: Option<String>,
    pub title: String,
    pub date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub timing: Timing,
    pub completed: Option<Completion>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurringEvent {
    pub id: Option<String>,
    pub title: String,
    pub days_of_week: Vec<Weekday>,
    pub start_recur: Option<NaiveDate>,
    pub end_recur: Option<NaiveDate>,
    pub timing: Timing,
    pub skip_dates: Vec<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RruleEvent {
    pub id: Option<String>,
    pub title: String,
    pub start_date: NaiveDate,
    /// Rule body without the `RRULE:` prefix, e.g. `FREQ=WEEKLY;BYDAY=MO`
    pub rrule: String,
    pub skip_dates: Vec<NaiveDate>,
    pub timing: Timing,
}

/// A calendar event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Single(SingleEvent),
    Recurring(RecurringEvent),
    Rrule(RruleEvent),
}

impl Event {
    pub fn title(&self) -> &str {
        match self {
            Event::Single(e) => &e.title,
            Event::Recurring(e) => &e.title,
            Event::Rrule(e) => &e.title,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Event::Single(e) => e.id.as_deref(),
            Event::Recurring(e) => e.id.as_deref(),
            Event::Rrule(e) => e.id.as_deref(),
        }
    }

    pub fn set_id(&mut self, id: Option<String>) {
        match self {
            Event::Single(e) => e.id = id,
            Event::Recurring(e) => e.id = id,
            Event::Rrule(e) => e.id = id,
        }
    }

    pub fn timing(&self) -> Timing {
        match self {
            Event::Single(e) => e.timing,
            Event::Recurring(e) => e.timing,
            Event::Rrule(e) => e.timing,
        }
    }

    pub fn is_recurring(&self) -> bool {
        !matches!(self, Event::Single(_))
    }

    pub fn is_task(&self) -> bool {
        matches!(
            self,
            Event::Single(SingleEvent {
                completed: Some(_),
                ..
            })
        )
    }

    /// Turn a single event into a task or back. Recurring events are left alone.
    pub fn set_is_task(&mut self, is_task: bool) {
        if let Event::Single(single) = self {
            match (is_task, single.completed) {
                (true, None) => single.completed = Some(Completion::Open),
                (true, Some(_)) => {}
                (false, _) => single.completed = None,
            }
        }
    }

    /// Human-readable name used for note filenames. Not an identity.
    pub fn basename(&self) -> String {
        match self {
            Event::Single(e) => format!("{} {}", e.date.format(DATE_FORMAT), e.title),
            Event::Recurring(e) => {
                let days: Vec<&str> = e.days_of_week.iter().map(|d| day_code(*d)).collect();
                format!("(Every {}) {}", days.join(","), e.title)
            }
            Event::Rrule(e) => format!("(Every {}) {}", describe_rrule(&e.rrule), e.title),
        }
    }

    /// Build an event from a raw key/value map, rejecting anything malformed.
    pub fn validate(raw: &Table) -> Result<Event, ValidationError> {
        RawEvent::from_table(raw)?.into_event()?.validated()
    }

    /// Check the cross-field rules and normalize the event.
    ///
    /// Idempotent: `e.validated()?.validated()? == e.validated()?`.
    pub fn validated(self) -> Result<Event, ValidationError> {
        match self {
            Event::Single(mut e) => {
                e.timing = normalize_timing(e.timing);
                if e.end_date == Some(e.date) {
                    e.end_date = None;
                }
                if e.end_date.is_some_and(|end| end < e.date) {
                    return Err(ValidationError::EndBeforeStart {
                        start: "date",
                        end: "endDate",
                    });
                }
                Ok(Event::Single(e))
            }
            Event::Recurring(mut e) => {
                e.timing = normalize_timing(e.timing);
                e.days_of_week.sort_by_key(|d| d.num_days_from_sunday());
                e.days_of_week.dedup();
                if e.days_of_week.is_empty() {
                    return Err(ValidationError::NoDaysOfWeek);
                }
                if let (Some(start), Some(end)) = (e.start_recur, e.end_recur) {
                    if end < start {
                        return Err(ValidationError::EndBeforeStart {
                            start: "startRecur",
                            end: "endRecur",
                        });
                    }
                }
                normalize_dates(&mut e.skip_dates);
                Ok(Event::Recurring(e))
            }
            Event::Rrule(mut e) => {
                e.timing = normalize_timing(e.timing);
                e.rrule = normalize_rrule(&e.rrule);
                if e.rrule.is_empty() {
                    return Err(ValidationError::MissingField("rrule"));
                }
                recurrence::check_rrule(&e.rrule, e.start_date).map_err(|reason| {
                    ValidationError::InvalidField {
                        field: "rrule",
                        value: format!("{} ({})", e.rrule, reason),
                    }
                })?;
                normalize_dates(&mut e.skip_dates);
                Ok(Event::Rrule(e))
            }
        }
    }

    /// Every frontmatter key an event may own. Other keys in a note belong
    /// to its author.
    pub const KEYS: &'static [&'static str] = &[
        "type",
        "id",
        "title",
        "allDay",
        "startTime",
        "endTime",
        "date",
        "endDate",
        "completed",
        "daysOfWeek",
        "startRecur",
        "endRecur",
        "startDate",
        "rrule",
        "skipDates",
    ];

    /// Raw key/value form of the event, the inverse of [`Event::validate`].
    pub fn to_raw(&self) -> Table {
        let mut raw = Table::new();
        raw.insert("title".into(), text(self.title()));
        if let Some(id) = self.id() {
            raw.insert("id".into(), text(id));
        }

        match self.timing() {
            Timing::AllDay => {
                raw.insert("allDay".into(), Value::Boolean(true));
            }
            Timing::Timed { start, end } => {
                raw.insert("allDay".into(), Value::Boolean(false));
                raw.insert("startTime".into(), text(start.format(TIME_FORMAT)));
                raw.insert("endTime".into(), text(end.format(TIME_FORMAT)));
            }
        }

        match self {
            Event::Single(e) => {
                raw.insert("type".into(), text("single"));
                raw.insert("date".into(), date_value(e.date));
                if let Some(end_date) = e.end_date {
                    raw.insert("endDate".into(), date_value(end_date));
                }
                match e.completed {
                    None => {}
                    Some(Completion::Open) => {
                        raw.insert("completed".into(), Value::Boolean(false));
                    }
                    Some(Completion::Done(None)) => {
                        raw.insert("completed".into(), Value::Boolean(true));
                    }
                    Some(Completion::Done(Some(at))) => {
                        raw.insert("completed".into(), text(at.to_rfc3339()));
                    }
                }
            }
            Event::Recurring(e) => {
                raw.insert("type".into(), text("recurring"));
                let days = e.days_of_week.iter().map(|d| text(day_code(*d))).collect();
                raw.insert("daysOfWeek".into(), Value::Array(days));
                if let Some(start) = e.start_recur {
                    raw.insert("startRecur".into(), date_value(start));
                }
                if let Some(end) = e.end_recur {
                    raw.insert("endRecur".into(), date_value(end));
                }
                if !e.skip_dates.is_empty() {
                    raw.insert("skipDates".into(), date_list(&e.skip_dates));
                }
            }
            Event::Rrule(e) => {
                raw.insert("type".into(), text("rrule"));
                raw.insert("startDate".into(), date_value(e.start_date));
                raw.insert("rrule".into(), text(&e.rrule));
                raw.insert("skipDates".into(), date_list(&e.skip_dates));
            }
        }

        raw
    }
}

// =============================================================================
// Raw key/value contract
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEvent {
    #[serde(rename = "type")]
    kind: Option<String>,
    title: Option<String>,
    id: Option<String>,
    all_day: Option<bool>,
    start_time: Option<String>,
    end_time: Option<String>,
    date: Option<String>,
    end_date: Option<String>,
    completed: Option<RawCompletion>,
    days_of_week: Option<Vec<String>>,
    start_recur: Option<String>,
    end_recur: Option<String>,
    start_date: Option<String>,
    rrule: Option<String>,
    skip_dates: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawCompletion {
    Flag(bool),
    Timestamp(String),
}

impl RawEvent {
    fn from_table(raw: &Table) -> Result<Self, ValidationError> {
        // TOML date literals are accepted wherever a date string is.
        let table: Table = raw
            .iter()
            .map(|(key, value)| (key.clone(), stringify_datetimes(value)))
            .collect();

        Value::Table(table)
            .try_into()
            .map_err(|e: toml::de::Error| ValidationError::Malformed(e.to_string()))
    }

    fn into_event(self) -> Result<Event, ValidationError> {
        let title = self.title.ok_or(ValidationError::MissingField("title"))?;
        let id = non_empty(self.id);
        let timing = parse_timing(
            self.all_day,
            non_empty(self.start_time),
            non_empty(self.end_time),
        )?;

        match self.kind.as_deref().unwrap_or("single") {
            "single" => {
                let completed = match self.completed {
                    Some(raw) => parse_completion(raw)?,
                    None => None,
                };
                Ok(Event::Single(SingleEvent {
                    id,
                    title,
                    date: required_date("date", self.date)?,
                    end_date: optional_date("endDate", self.end_date)?,
                    timing,
                    completed,
                }))
            }
            "recurring" => {
                let days_of_week = self
                    .days_of_week
                    .unwrap_or_default()
                    .iter()
                    .map(|code| parse_day(code))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Event::Recurring(RecurringEvent {
                    id,
                    title,
                    days_of_week,
                    start_recur: optional_date("startRecur", self.start_recur)?,
                    end_recur: optional_date("endRecur", self.end_recur)?,
                    timing,
                    skip_dates: date_vec(self.skip_dates)?,
                }))
            }
            "rrule" => Ok(Event::Rrule(RruleEvent {
                id,
                title,
                start_date: required_date("startDate", self.start_date)?,
                rrule: self.rrule.ok_or(ValidationError::MissingField("rrule"))?,
                skip_dates: date_vec(self.skip_dates)?,
                timing,
            })),
            other => Err(ValidationError::UnknownType(other.to_string())),
        }
    }
}

fn parse_timing(
    all_day: Option<bool>,
    start: Option<String>,
    end: Option<String>,
) -> Result<Timing, ValidationError> {
    match (all_day, start, end) {
        (Some(true), None, None) => Ok(Timing::AllDay),
        (Some(true), _, _) => Err(ValidationError::TimingMismatch),
        (Some(false) | None, Some(start), Some(end)) => Ok(Timing::Timed {
            start: parse_time("startTime", &start)?,
            end: parse_time("endTime", &end)?,
        }),
        (Some(false), _, _) => Err(ValidationError::TimingMismatch),
        (None, None, None) => Err(ValidationError::MissingField("allDay")),
        (None, _, _) => Err(ValidationError::TimingMismatch),
    }
}

fn parse_completion(raw: RawCompletion) -> Result<Option<Completion>, ValidationError> {
    match raw {
        RawCompletion::Flag(false) => Ok(Some(Completion::Open)),
        RawCompletion::Flag(true) => Ok(Some(Completion::Done(None))),
        RawCompletion::Timestamp(s) if s.trim().is_empty() => Ok(None),
        RawCompletion::Timestamp(s) => DateTime::parse_from_rfc3339(s.trim())
            .map(|at| Some(Completion::Done(Some(at))))
            .map_err(|_| ValidationError::InvalidField {
                field: "completed",
                value: s,
            }),
    }
}

fn parse_time(field: &'static str, s: &str) -> Result<NaiveTime, ValidationError> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|_| ValidationError::InvalidField {
            field,
            value: s.to_string(),
        })
}

fn parse_date(field: &'static str, s: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).map_err(|_| ValidationError::InvalidField {
        field,
        value: s.to_string(),
    })
}

fn required_date(field: &'static str, s: Option<String>) -> Result<NaiveDate, ValidationError> {
    let s = non_empty(s).ok_or(ValidationError::MissingField(field))?;
    parse_date(field, &s)
}

fn optional_date(
    field: &'static str,
    s: Option<String>,
) -> Result<Option<NaiveDate>, ValidationError> {
    non_empty(s).map(|s| parse_date(field, &s)).transpose()
}

fn date_vec(dates: Option<Vec<String>>) -> Result<Vec<NaiveDate>, ValidationError> {
    dates
        .unwrap_or_default()
        .iter()
        .map(|s| parse_date("skipDates", s))
        .collect()
}

fn parse_day(code: &str) -> Result<Weekday, ValidationError> {
    match code.trim() {
        "U" => Ok(Weekday::Sun),
        "M" => Ok(Weekday::Mon),
        "T" => Ok(Weekday::Tue),
        "W" => Ok(Weekday::Wed),
        "R" => Ok(Weekday::Thu),
        "F" => Ok(Weekday::Fri),
        "S" => Ok(Weekday::Sat),
        other => Err(ValidationError::InvalidField {
            field: "daysOfWeek",
            value: other.to_string(),
        }),
    }
}

/// Single-letter weekday code used in `daysOfWeek`.
pub fn day_code(day: Weekday) -> &'static str {
    match day {
        Weekday::Sun => "U",
        Weekday::Mon => "M",
        Weekday::Tue => "T",
        Weekday::Wed => "W",
        Weekday::Thu => "R",
        Weekday::Fri => "F",
        Weekday::Sat => "S",
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.trim().is_empty())
}

fn stringify_datetimes(value: &Value) -> Value {
    match value {
        Value::Datetime(dt) => Value::String(dt.to_string()),
        Value::Array(items) => Value::Array(items.iter().map(stringify_datetimes).collect()),
        other => other.clone(),
    }
}

fn normalize_timing(timing: Timing) -> Timing {
    match timing {
        Timing::AllDay => Timing::AllDay,
        Timing::Timed { start, end } => Timing::Timed {
            start: truncate_seconds(start),
            end: truncate_seconds(end),
        },
    }
}

fn truncate_seconds(time: NaiveTime) -> NaiveTime {
    time.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(time)
}

fn normalize_dates(dates: &mut Vec<NaiveDate>) {
    dates.sort();
    dates.dedup();
}

fn normalize_rrule(rule: &str) -> String {
    let rule = rule.trim();
    rule.strip_prefix("RRULE:").unwrap_or(rule).trim().to_string()
}

/// Short description of a rule for basenames, e.g. `week on MO,WE`.
fn describe_rrule(rule: &str) -> String {
    let mut freq = "";
    let mut interval = 1u32;
    let mut by_day = None;

    for part in rule.split(';') {
        match part.split_once('=') {
            Some(("FREQ", v)) => freq = v,
            Some(("INTERVAL", v)) => interval = v.parse().unwrap_or(1),
            Some(("BYDAY", v)) => by_day = Some(v),
            _ => {}
        }
    }

    let unit = match freq {
        "DAILY" => "day",
        "WEEKLY" => "week",
        "MONTHLY" => "month",
        "YEARLY" => "year",
        _ => "rule",
    };

    let mut description = if interval > 1 {
        format!("{} {}s", interval, unit)
    } else {
        unit.to_string()
    };
    if let Some(days) = by_day {
        description.push_str(" on ");
        description.push_str(days);
    }
    description
}

fn text(s: impl ToString) -> Value {
    Value::String(s.to_string())
}

fn date_value(date: NaiveDate) -> Value {
    text(date.format(DATE_FORMAT))
}

fn date_list(dates: &[NaiveDate]) -> Value {
    Value::Array(dates.iter().map(|d| date_value(*d)).collect())
}
