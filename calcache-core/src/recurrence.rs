//! Occurrence expansion.
//!
//! Expands any event into the concrete occurrences that fall inside a date
//! range, honoring series bounds and skipped dates. Recurrence rules go through
//! the rrule crate; the wall-clock times are handed to it as UTC and read back
//! the same way, so no zone conversion happens here.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rrule::RRuleSet;

use crate::date_range::DateRange;
use crate::error::{CalCacheError, CalCacheResult, ValidationError};
use crate::event::{Event, Timing};

/// Upper bound on expanded instances of a single rule.
const MAX_RULE_OCCURRENCES: u16 = 1000;

/// One concrete instance of an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occurrence {
    pub start: NaiveDateTime,
    /// Exclusive end. All-day occurrences end at midnight after their last day.
    pub end: NaiveDateTime,
    pub all_day: bool,
}

impl Occurrence {
    fn new(first: NaiveDate, last: NaiveDate, timing: Timing) -> Self {
        match timing {
            Timing::AllDay => Occurrence {
                start: first.and_time(NaiveTime::MIN),
                end: (last + Duration::days(1)).and_time(NaiveTime::MIN),
                all_day: true,
            },
            Timing::Timed { start, end } => {
                let start = first.and_time(start);
                let mut end = last.and_time(end);
                // Ends before it starts on the same day: runs past midnight.
                if end < start {
                    end += Duration::days(1);
                }
                Occurrence {
                    start,
                    end,
                    all_day: false,
                }
            }
        }
    }

    /// Last calendar date this occurrence touches.
    pub fn last_date(&self) -> NaiveDate {
        if self.all_day || (self.end.time() == NaiveTime::MIN && self.end > self.start) {
            (self.end - Duration::days(1)).date()
        } else {
            self.end.date()
        }
    }
}

/// Build an iCalendar-format rule set string for the rrule crate parser.
fn rrule_set_string(rule: &str, start_date: NaiveDate, start_time: Option<NaiveTime>) -> String {
    let dtstart = start_date.and_time(start_time.unwrap_or(NaiveTime::MIN));
    format!(
        "DTSTART:{}Z\nRRULE:{}",
        dtstart.format("%Y%m%dT%H%M%S"),
        until_in_utc(rule)
    )
}

/// DTSTART is always handed to the engine in UTC, and the engine requires
/// UNTIL in the same form. A date-only UNTIL (as all-day feeds write it)
/// covers its whole last day; a floating one is read as UTC.
fn until_in_utc(rule: &str) -> String {
    rule.split(';')
        .map(|part| match part.split_once('=') {
            Some((key, value)) if key.eq_ignore_ascii_case("UNTIL") => {
                if value.len() == 8 && value.bytes().all(|b| b.is_ascii_digit()) {
                    format!("{}={}T235959Z", key, value)
                } else if !value.ends_with(['Z', 'z']) {
                    format!("{}={}Z", key, value)
                } else {
                    part.to_string()
                }
            }
            _ => part.to_string(),
        })
        .collect::<Vec<_>>()
        .join(";")
}

/// Check that a rule can be expanded, returning the parser's complaint if not.
pub(crate) fn check_rrule(rule: &str, start_date: NaiveDate) -> Result<(), String> {
    rrule_set_string(rule, start_date, None)
        .parse::<RRuleSet>()
        .map(|_| ())
        .map_err(|e| e.to_string())
}

/// Expand an event into its occurrences within `range`, sorted by start.
pub fn occurrences(event: &Event, range: &DateRange) -> CalCacheResult<Vec<Occurrence>> {
    let mut found = match event {
        Event::Single(e) => {
            let occurrence = Occurrence::new(e.date, e.end_date.unwrap_or(e.date), e.timing);
            if range.overlaps(occurrence.start.date(), occurrence.last_date()) {
                vec![occurrence]
            } else {
                Vec::new()
            }
        }
        Event::Recurring(e) => {
            let first = e.start_recur.map_or(range.from, |s| s.max(range.from));
            let last = e.end_recur.map_or(range.to, |end| end.min(range.to));

            first
                .iter_days()
                .take_while(|day| *day <= last)
                .filter(|day| e.days_of_week.contains(&day.weekday()))
                .filter(|day| !e.skip_dates.contains(day))
                .map(|day| Occurrence::new(day, day, e.timing))
                .collect()
        }
        Event::Rrule(e) => {
            let rrule_set: RRuleSet = rrule_set_string(&e.rrule, e.start_date, e.timing.start_time())
                .parse()
                .map_err(|err: rrule::RRuleError| {
                    CalCacheError::Validation(ValidationError::InvalidField {
                        field: "rrule",
                        value: format!("{} ({})", e.rrule, err),
                    })
                })?;

            // after/before are exclusive, so widen by a second on each side.
            let tz: rrule::Tz = Utc.into();
            let after = (range.from.and_time(NaiveTime::MIN).and_utc() - Duration::seconds(1))
                .with_timezone(&tz);
            let before = ((range.to + Duration::days(1)).and_time(NaiveTime::MIN).and_utc())
                .with_timezone(&tz);

            let result = rrule_set.after(after).before(before).all(MAX_RULE_OCCURRENCES);

            result
                .dates
                .iter()
                .map(|dt| dt.naive_utc().date())
                .filter(|day| !e.skip_dates.contains(day))
                .map(|day| Occurrence::new(day, day, e.timing))
                .collect()
        }
    };

    found.sort_by_key(|o| o.start);
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{RecurringEvent, RruleEvent, SingleEvent};
    use chrono::Weekday;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    // January 2024 starts on a Monday.
    fn january() -> DateRange {
        DateRange::new(date(2024, 1, 1), date(2024, 1, 31))
    }

    #[test]
    fn weekday_series_respects_bounds_and_skips() {
        let event = Event::Recurring(RecurringEvent {
            id: None,
            title: "Standup".into(),
            days_of_week: vec![Weekday::Mon],
            start_recur: Some(date(2024, 1, 5)),
            end_recur: Some(date(2024, 1, 25)),
            timing: Timing::Timed {
                start: time(9, 0),
                end: time(9, 15),
            },
            skip_dates: vec![date(2024, 1, 15)],
        });

        let days: Vec<NaiveDate> = occurrences(&event, &january())
            .unwrap()
            .iter()
            .map(|o| o.start.date())
            .collect();

        assert_eq!(days, vec![date(2024, 1, 8), date(2024, 1, 22)]);
    }

    #[test]
    fn rrule_series_skips_dates() {
        let event = Event::Rrule(RruleEvent {
            id: None,
            title: "Gym".into(),
            start_date: date(2024, 1, 1),
            rrule: "FREQ=WEEKLY;BYDAY=MO".into(),
            skip_dates: vec![date(2024, 1, 8)],
            timing: Timing::AllDay,
        });

        let occurrences = occurrences(&event, &january()).unwrap();
        let days: Vec<NaiveDate> = occurrences.iter().map(|o| o.start.date()).collect();

        assert_eq!(
            days,
            vec![
                date(2024, 1, 1),
                date(2024, 1, 15),
                date(2024, 1, 22),
                date(2024, 1, 29)
            ]
        );
        assert!(occurrences.iter().all(|o| o.all_day));
    }

    #[test]
    fn date_only_until_ends_on_its_day() {
        let event = Event::Rrule(RruleEvent {
            id: None,
            title: "Gym".into(),
            start_date: date(2024, 1, 1),
            rrule: "FREQ=WEEKLY;BYDAY=MO;UNTIL=20240115".into(),
            skip_dates: Vec::new(),
            timing: Timing::Timed {
                start: time(18, 0),
                end: time(19, 0),
            },
        });

        let days: Vec<NaiveDate> = occurrences(&event, &january())
            .unwrap()
            .iter()
            .map(|o| o.start.date())
            .collect();

        assert_eq!(days, vec![date(2024, 1, 1), date(2024, 1, 8), date(2024, 1, 15)]);
        assert!(check_rrule("FREQ=DAILY;UNTIL=20240301", date(2024, 1, 1)).is_ok());
    }

    #[test]
    fn until_is_rewritten_to_utc() {
        assert_eq!(
            until_in_utc("FREQ=WEEKLY;UNTIL=20240301;BYDAY=MO"),
            "FREQ=WEEKLY;UNTIL=20240301T235959Z;BYDAY=MO"
        );
        assert_eq!(
            until_in_utc("FREQ=DAILY;UNTIL=20240301T100000"),
            "FREQ=DAILY;UNTIL=20240301T100000Z"
        );
        assert_eq!(
            until_in_utc("FREQ=DAILY;UNTIL=20240301T100000Z"),
            "FREQ=DAILY;UNTIL=20240301T100000Z"
        );
        assert_eq!(until_in_utc("FREQ=DAILY;COUNT=3"), "FREQ=DAILY;COUNT=3");
    }

    #[test]
    fn multi_day_single_event_overlapping_range_start() {
        let event = Event::Single(SingleEvent {
            id: None,
            title: "Trip".into(),
            date: date(2023, 12, 30),
            end_date: Some(date(2024, 1, 2)),
            timing: Timing::AllDay,
            completed: None,
        });

        let found = occurrences(&event, &january()).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].end, date(2024, 1, 3).and_time(NaiveTime::MIN));
        assert_eq!(found[0].last_date(), date(2024, 1, 2));
    }

    #[test]
    fn overnight_timed_event_ends_next_day() {
        let event = Event::Single(SingleEvent {
            id: None,
            title: "Night shift".into(),
            date: date(2024, 1, 10),
            end_date: None,
            timing: Timing::Timed {
                start: time(22, 0),
                end: time(6, 0),
            },
            completed: None,
        });

        let found = occurrences(&event, &january()).unwrap();
        assert_eq!(found[0].end, date(2024, 1, 11).and_time(time(6, 0)));
    }
}
