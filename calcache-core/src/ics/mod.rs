//! ICS ingestion.
//!
//! Turns the VEVENTs of an .ics buffer into validated events. A record with an
//! RRULE becomes a rule-based series; any other record becomes a single event.
//! Records carrying a RECURRENCE-ID replace one instance of a series: they are
//! kept as standalone single events and the replaced date is added to the
//! series' skip dates.
//!
//! Wall-clock times are resolved against a time zone. UTC and floating times
//! are converted into it; times with any other TZID are kept as written.

mod parse;

use std::collections::HashMap;

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use tracing::{debug, warn};

use crate::error::CalCacheResult;
use crate::event::{Event, RruleEvent, SingleEvent, Timing};
use parse::{IcsRecord, IcsTime, parse_records};

/// Parse an ICS buffer into events, resolving times in the local zone.
pub fn parse_ics(content: &str) -> CalCacheResult<Vec<Event>> {
    parse_ics_in(content, &Local)
}

/// Parse an ICS buffer into events, resolving times in `tz`.
pub fn parse_ics_in<Tz: TimeZone>(content: &str, tz: &Tz) -> CalCacheResult<Vec<Event>> {
    let records = parse_records(content)?;
    let (bases, overrides): (Vec<_>, Vec<_>) = records
        .into_iter()
        .partition(|record| record.recurrence_id.is_none());

    // Base events, one per UID. A repeated UID replaces the earlier record.
    let mut events: Vec<Event> = Vec::with_capacity(bases.len());
    let mut by_uid: HashMap<String, usize> = HashMap::new();
    for record in &bases {
        let event = to_event(record, tz);
        match by_uid.get(&record.uid) {
            Some(&index) => events[index] = event,
            None => {
                by_uid.insert(record.uid.clone(), events.len());
                events.push(event);
            }
        }
    }

    let mut instances = Vec::new();
    for record in &overrides {
        let Some(recurrence_id) = &record.recurrence_id else {
            continue;
        };
        let Some(&index) = by_uid.get(&record.uid) else {
            warn!(uid = %record.uid, "Dropping recurrence override without a base event");
            continue;
        };

        let instance = to_event(record, tz);
        let is_single = matches!(instance, Event::Single(_));
        match &mut events[index] {
            Event::Rrule(base) if is_single => {
                base.skip_dates.push(wall_clock(recurrence_id, tz).date());
                instances.push(instance);
            }
            _ => {
                warn!(
                    uid = %record.uid,
                    "Dropping recurrence override that doesn't pair a single instance with a rule"
                );
            }
        }
    }

    let parsed: Vec<Event> = events
        .into_iter()
        .chain(instances)
        .filter_map(|event| {
            let id = event.id().map(str::to_string);
            match event.validated() {
                Ok(event) => Some(event),
                Err(err) => {
                    warn!(id, "Skipping ICS event: {}", err);
                    None
                }
            }
        })
        .collect();

    debug!(count = parsed.len(), "Parsed ICS events");
    Ok(parsed)
}

/// A time with the zone already applied.
#[derive(Debug, Clone, Copy)]
enum WallClock {
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl WallClock {
    fn date(self) -> NaiveDate {
        match self {
            WallClock::Date(d) => d,
            WallClock::DateTime(dt) => dt.date(),
        }
    }

    fn datetime(self) -> NaiveDateTime {
        match self {
            WallClock::Date(d) => d.and_time(NaiveTime::MIN),
            WallClock::DateTime(dt) => dt,
        }
    }
}

fn wall_clock<Tz: TimeZone>(time: &IcsTime, tz: &Tz) -> WallClock {
    match time {
        IcsTime::Date(d) => WallClock::Date(*d),
        IcsTime::Utc(dt) | IcsTime::Floating(dt) => {
            WallClock::DateTime(tz.from_utc_datetime(dt).naive_local())
        }
        IcsTime::Zoned { datetime, tzid } if is_utc(tzid) => {
            WallClock::DateTime(tz.from_utc_datetime(datetime).naive_local())
        }
        IcsTime::Zoned { datetime, .. } => WallClock::DateTime(*datetime),
    }
}

fn is_utc(tzid: &str) -> bool {
    matches!(tzid, "UTC" | "Etc/UTC" | "GMT" | "Etc/GMT")
}

fn to_event<Tz: TimeZone>(record: &IcsRecord, tz: &Tz) -> Event {
    let explicit_end = record.end.as_ref().map(|end| wall_clock(end, tz));

    let (date, end_date, timing) = match wall_clock(&record.start, tz) {
        WallClock::Date(date) => {
            // DTEND on a date is exclusive.
            let end_date = explicit_end
                .and_then(|end| end.date().pred_opt())
                .filter(|end| *end > date);
            (date, end_date, Timing::AllDay)
        }
        WallClock::DateTime(start) => {
            // DURATION only yields an end time; an end date must be explicit.
            let end_time = match (explicit_end, record.duration) {
                (Some(end), _) => end.datetime().time(),
                (None, Some(duration)) => (start + duration).time(),
                (None, None) => start.time(),
            };
            let timing = Timing::Timed {
                start: start.time(),
                end: end_time,
            };
            let end_date = explicit_end.map(|end| end.datetime().date());
            (start.date(), end_date, timing)
        }
    };

    let title = record.summary.clone();
    match &record.rrule {
        Some(rule) => Event::Rrule(RruleEvent {
            id: Some(format!("ics::{}::{}::recurring", record.uid, date)),
            title,
            start_date: date,
            rrule: rule.clone(),
            skip_dates: record
                .exdates
                .iter()
                .map(|exdate| wall_clock(exdate, tz).date())
                .collect(),
            timing,
        }),
        None => Event::Single(SingleEvent {
            id: Some(format!("ics::{}::{}::single", record.uid, date)),
            title,
            date,
            end_date,
            timing,
            completed: None,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn calendar(body: &str) -> String {
        format!("BEGIN:VCALENDAR\nVERSION:2.0\nPRODID:TEST\n{}END:VCALENDAR\n", body)
    }

    #[test]
    fn override_becomes_standalone_event_and_skip_date() {
        let ics = calendar(
            "BEGIN:VEVENT
UID:standup@example.com
SUMMARY:Standup
DTSTART:20240101T090000Z
DTEND:20240101T091500Z
RRULE:FREQ=WEEKLY;BYDAY=MO
END:VEVENT
BEGIN:VEVENT
UID:standup@example.com
SUMMARY:Standup (moved)
RECURRENCE-ID:20240115T090000Z
DTSTART:20240115T100000Z
DTEND:20240115T101500Z
END:VEVENT
",
        );

        let events = parse_ics_in(&ics, &Utc).unwrap();
        assert_eq!(events.len(), 2);

        let Event::Rrule(base) = &events[0] else {
            panic!("expected rule-based base event, got {:?}", events[0]);
        };
        assert_eq!(base.rrule, "FREQ=WEEKLY;BYDAY=MO");
        assert_eq!(base.skip_dates, vec![date(2024, 1, 15)]);
        assert_eq!(
            base.id.as_deref(),
            Some("ics::standup@example.com::2024-01-01::recurring")
        );

        let Event::Single(moved) = &events[1] else {
            panic!("expected single override, got {:?}", events[1]);
        };
        assert_eq!(moved.title, "Standup (moved)");
        assert_eq!(moved.date, date(2024, 1, 15));
        assert_eq!(
            moved.timing,
            Timing::Timed {
                start: time(10, 0),
                end: time(10, 15)
            }
        );
    }

    #[test]
    fn bad_start_date_only_drops_that_record() {
        let ics = calendar(
            "BEGIN:VEVENT
UID:broken
SUMMARY:Broken
DTSTART:2024-13-45
END:VEVENT
BEGIN:VEVENT
UID:fine
SUMMARY:Fine
DTSTART;VALUE=DATE:20240301
END:VEVENT
",
        );

        let events = parse_ics_in(&ics, &Utc).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title(), "Fine");
    }

    #[test]
    fn override_without_base_is_dropped() {
        let ics = calendar(
            "BEGIN:VEVENT
UID:orphan
SUMMARY:Orphan
RECURRENCE-ID:20240115T090000Z
DTSTART:20240115T100000Z
DTEND:20240115T101500Z
END:VEVENT
",
        );

        assert!(parse_ics_in(&ics, &Utc).unwrap().is_empty());
    }

    #[test]
    fn override_of_non_recurring_base_is_dropped() {
        let ics = calendar(
            "BEGIN:VEVENT
UID:once
SUMMARY:Once
DTSTART:20240115T090000Z
DTEND:20240115T100000Z
END:VEVENT
BEGIN:VEVENT
UID:once
SUMMARY:Once (moved)
RECURRENCE-ID:20240115T090000Z
DTSTART:20240116T090000Z
DTEND:20240116T100000Z
END:VEVENT
",
        );

        let events = parse_ics_in(&ics, &Utc).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title(), "Once");
    }

    #[test]
    fn all_day_end_is_made_inclusive() {
        let ics = calendar(
            "BEGIN:VEVENT
UID:trip
SUMMARY:Trip
DTSTART;VALUE=DATE:20240301
DTEND;VALUE=DATE:20240304
END:VEVENT
BEGIN:VEVENT
UID:day
SUMMARY:Day
DTSTART;VALUE=DATE:20240310
DTEND;VALUE=DATE:20240311
END:VEVENT
",
        );

        let events = parse_ics_in(&ics, &Utc).unwrap();
        let Event::Single(trip) = &events[0] else {
            panic!("expected single event");
        };
        assert_eq!(trip.timing, Timing::AllDay);
        assert_eq!(trip.end_date, Some(date(2024, 3, 3)));

        let Event::Single(day) = &events[1] else {
            panic!("expected single event");
        };
        assert_eq!(day.end_date, None);
    }

    #[test]
    fn utc_times_are_shifted_into_the_zone_and_zoned_times_kept() {
        let ics = calendar(
            "BEGIN:VEVENT
UID:utc
SUMMARY:Call
DTSTART:20240301T230000Z
DURATION:PT2H
END:VEVENT
BEGIN:VEVENT
UID:zoned
SUMMARY:Lunch
DTSTART;TZID=Europe/Paris:20240301T120000
DTEND;TZID=Europe/Paris:20240301T130000
END:VEVENT
",
        );

        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        let events = parse_ics_in(&ics, &plus_two).unwrap();

        let Event::Single(call) = &events[0] else {
            panic!("expected single event");
        };
        assert_eq!(call.date, date(2024, 3, 2));
        assert_eq!(
            call.timing,
            Timing::Timed {
                start: time(1, 0),
                end: time(3, 0)
            }
        );

        let Event::Single(lunch) = &events[1] else {
            panic!("expected single event");
        };
        assert_eq!(
            lunch.timing,
            Timing::Timed {
                start: time(12, 0),
                end: time(13, 0)
            }
        );
    }

    #[test]
    fn exdates_become_skip_dates() {
        let ics = calendar(
            "BEGIN:VEVENT
UID:gym
SUMMARY:Gym
DTSTART;VALUE=DATE:20240101
RRULE:FREQ=WEEKLY;BYDAY=MO
EXDATE;VALUE=DATE:20240115,20240108
END:VEVENT
",
        );

        let events = parse_ics_in(&ics, &Utc).unwrap();
        let Event::Rrule(gym) = &events[0] else {
            panic!("expected rule-based event");
        };
        assert_eq!(gym.skip_dates, vec![date(2024, 1, 8), date(2024, 1, 15)]);
        assert_eq!(gym.timing, Timing::AllDay);
    }

    #[test]
    fn duration_sets_end_time_but_not_end_date() {
        let ics = calendar(
            "BEGIN:VEVENT
UID:late
SUMMARY:Late show
DTSTART:20240301T230000Z
DURATION:PT2H
END:VEVENT
",
        );

        let events = parse_ics_in(&ics, &Utc).unwrap();
        let Event::Single(show) = &events[0] else {
            panic!("expected single event");
        };
        assert_eq!(show.date, date(2024, 3, 1));
        assert_eq!(show.end_date, None);
        assert_eq!(
            show.timing,
            Timing::Timed {
                start: time(23, 0),
                end: time(1, 0)
            }
        );
    }

    #[test]
    fn all_day_series_with_date_until_is_kept() {
        let ics = calendar(
            "BEGIN:VEVENT
UID:gym
SUMMARY:Gym
DTSTART;VALUE=DATE:20240101
RRULE:FREQ=WEEKLY;BYDAY=MO;UNTIL=20240301
END:VEVENT
BEGIN:VEVENT
UID:sync
SUMMARY:Sync
DTSTART:20240102T100000Z
DTEND:20240102T110000Z
RRULE:FREQ=WEEKLY;UNTIL=20240301T100000Z
END:VEVENT
",
        );

        let events = parse_ics_in(&ics, &Utc).unwrap();
        let mut titles: Vec<&str> = events.iter().map(|e| e.title()).collect();
        titles.sort();
        assert_eq!(titles, vec!["Gym", "Sync"]);

        let gym = events.iter().find(|e| e.title() == "Gym").unwrap();
        let Event::Rrule(gym) = gym else {
            panic!("expected rule-based event");
        };
        assert_eq!(gym.timing, Timing::AllDay);
        assert!(gym.rrule.contains("UNTIL=20240301"));
    }
}
