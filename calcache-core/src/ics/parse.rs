//! VEVENT record extraction using the icalendar crate's parser.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use icalendar::{
    CalendarDateTime, DatePerhapsTime,
    parser::{Component, Property, read_calendar, unfold},
};
use tracing::warn;

use crate::error::{CalCacheError, CalCacheResult};

/// A point in time as written in the ICS source, zone info preserved.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum IcsTime {
    Date(NaiveDate),
    Utc(NaiveDateTime),
    Floating(NaiveDateTime),
    Zoned { datetime: NaiveDateTime, tzid: String },
}

/// One VEVENT, reduced to what ingestion needs.
#[derive(Debug, Clone)]
pub(crate) struct IcsRecord {
    pub uid: String,
    pub summary: String,
    pub start: IcsTime,
    /// Only set when DTEND is present
    pub end: Option<IcsTime>,
    pub duration: Option<Duration>,
    pub rrule: Option<String>,
    pub exdates: Vec<IcsTime>,
    pub recurrence_id: Option<IcsTime>,
}

/// Parse every VEVENT in `content`.
///
/// Records whose dates don't resolve are logged and skipped; only a buffer
/// that isn't a calendar at all is an error.
pub(crate) fn parse_records(content: &str) -> CalCacheResult<Vec<IcsRecord>> {
    let unfolded = unfold(content);
    let calendar = read_calendar(&unfolded).map_err(|e| CalCacheError::IcsParse(e.to_string()))?;

    let records = calendar
        .components
        .iter()
        .filter(|c| c.name == "VEVENT")
        .filter_map(|vevent| match parse_record(vevent) {
            Ok(record) => Some(record),
            Err(reason) => {
                warn!(
                    uid = vevent.find_prop("UID").map(|p| p.val.to_string()),
                    "Skipping VEVENT: {}", reason
                );
                None
            }
        })
        .collect();

    Ok(records)
}

fn parse_record(vevent: &Component<'_>) -> Result<IcsRecord, String> {
    let uid = vevent
        .find_prop("UID")
        .map(|p| p.val.to_string())
        .ok_or("missing UID")?;
    let summary = vevent
        .find_prop("SUMMARY")
        .map(|p| p.val.to_string())
        .unwrap_or_else(|| "(No title)".to_string());

    let start = parse_time_property(vevent.find_prop("DTSTART").ok_or("missing DTSTART")?)?;
    let end = vevent.find_prop("DTEND").map(parse_time_property).transpose()?;
    let recurrence_id = vevent
        .find_prop("RECURRENCE-ID")
        .map(parse_time_property)
        .transpose()?;

    let duration = vevent
        .find_prop("DURATION")
        .and_then(|p| parse_duration(p.val.as_ref()));

    let rrule = vevent.find_prop("RRULE").map(|p| p.val.to_string());
    let exdates = vevent
        .properties
        .iter()
        .filter(|p| p.name == "EXDATE")
        .flat_map(parse_exdate_property)
        .collect();

    Ok(IcsRecord {
        uid,
        summary,
        start,
        end,
        duration,
        rrule,
        exdates,
        recurrence_id,
    })
}

fn parse_time_property(prop: &Property) -> Result<IcsTime, String> {
    DatePerhapsTime::try_from(prop)
        .map(to_ics_time)
        .map_err(|_| format!("unparsable {} '{}'", prop.name, prop.val))
}

/// Convert icalendar's DatePerhapsTime, preserving timezone info
fn to_ics_time(dpt: DatePerhapsTime) -> IcsTime {
    match dpt {
        DatePerhapsTime::Date(d) => IcsTime::Date(d),
        DatePerhapsTime::DateTime(cal_dt) => match cal_dt {
            CalendarDateTime::Utc(dt) => IcsTime::Utc(dt.naive_utc()),
            CalendarDateTime::Floating(naive) => IcsTime::Floating(naive),
            CalendarDateTime::WithTimezone { date_time, tzid } => IcsTime::Zoned {
                datetime: date_time,
                tzid,
            },
        },
    }
}

/// Excluded instances of a series. One property may list several
/// comma-separated values sharing its `TZID` or `VALUE=DATE` parameter.
/// Unreadable values are dropped.
fn parse_exdate_property(prop: &Property) -> Vec<IcsTime> {
    let tzid = prop
        .params
        .iter()
        .find(|p| p.key == "TZID")
        .and_then(|p| p.val.as_ref().map(|v| v.to_string()));

    let is_date = prop
        .params
        .iter()
        .any(|p| p.key == "VALUE" && p.val.as_ref().map(|v| v.as_ref()) == Some("DATE"));

    prop.val
        .as_ref()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| {
            if is_date {
                NaiveDate::parse_from_str(s, "%Y%m%d").ok().map(IcsTime::Date)
            } else if let Some(ref tz) = tzid {
                NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S")
                    .ok()
                    .map(|dt| IcsTime::Zoned {
                        datetime: dt,
                        tzid: tz.clone(),
                    })
            } else if let Some(utc) = s.strip_suffix('Z') {
                NaiveDateTime::parse_from_str(utc, "%Y%m%dT%H%M%S")
                    .ok()
                    .map(IcsTime::Utc)
            } else {
                NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S")
                    .ok()
                    .map(IcsTime::Floating)
            }
        })
        .collect()
}

/// Parse a DURATION value (PT1H30M, P1D, ...). Negative durations are ignored.
fn parse_duration(value: &str) -> Option<Duration> {
    if value.starts_with('-') {
        return None;
    }

    let duration = iso8601::duration(value.trim_start_matches('+')).ok()?;
    let std_duration: std::time::Duration = duration.into();
    Duration::from_std(std_duration).ok()
}
