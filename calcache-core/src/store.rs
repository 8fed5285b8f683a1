//! In-memory index of known events.
//!
//! Records are owned by one id-keyed map. The calendar and (calendar, file)
//! indices only hold ids and are updated by the same private paths that touch
//! the map, so an index can't name an id the map doesn't have.

use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;
use std::path::{Path, PathBuf};

use crate::calendar::Location;
use crate::event::Event;

/// An event with the calendar that owns it and where it lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEvent {
    pub calendar_id: String,
    pub location: Option<Location>,
    pub event: Event,
}

type FileKey = (String, PathBuf);

/// Ids filed under a secondary key.
#[derive(Debug)]
struct Index<K> {
    entries: HashMap<K, BTreeSet<String>>,
}

impl<K> Default for Index<K> {
    fn default() -> Self {
        Index {
            entries: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash> Index<K> {
    fn insert(&mut self, key: K, id: &str) {
        self.entries.entry(key).or_default().insert(id.to_string());
    }

    fn remove(&mut self, key: &K, id: &str) {
        if let Some(ids) = self.entries.get_mut(key) {
            ids.remove(id);
            if ids.is_empty() {
                self.entries.remove(key);
            }
        }
    }

    fn get<'a>(&'a self, key: &K) -> impl Iterator<Item = &'a String> + use<'a, K> {
        self.entries.get(key).into_iter().flatten()
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

#[derive(Debug, Default)]
pub struct EventStore {
    events: HashMap<String, StoredEvent>,
    by_calendar: Index<String>,
    by_file: Index<FileKey>,
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record. An existing record with the same id is replaced.
    pub fn add(&mut self, id: String, record: StoredEvent) {
        self.delete(&id);

        self.by_calendar.insert(record.calendar_id.clone(), &id);
        if let Some(key) = file_key(&record) {
            self.by_file.insert(key, &id);
        }
        self.events.insert(id, record);
    }

    /// Remove a record from every index. Returns it if it was there.
    pub fn delete(&mut self, id: &str) -> Option<StoredEvent> {
        let record = self.events.remove(id)?;

        self.by_calendar.remove(&record.calendar_id, id);
        if let Some(key) = file_key(&record) {
            self.by_file.remove(&key, id);
        }
        Some(record)
    }

    pub fn get(&self, id: &str) -> Option<&StoredEvent> {
        self.events.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.events.contains_key(id)
    }

    /// Records owned by a calendar, ordered by id.
    pub fn events_in_calendar(&self, calendar_id: &str) -> Vec<(&str, &StoredEvent)> {
        self.resolve(self.by_calendar.get(&calendar_id.to_string()))
    }

    /// Records a calendar sourced from one file, ordered by id.
    pub fn events_in_file(&self, calendar_id: &str, path: &Path) -> Vec<(&str, &StoredEvent)> {
        self.resolve(
            self.by_file
                .get(&(calendar_id.to_string(), path.to_path_buf())),
        )
    }

    /// Every record anchored to `path`, across calendars.
    pub fn ids_at_path(&self, path: &Path) -> Vec<String> {
        let mut ids: Vec<String> = self
            .by_file
            .entries
            .iter()
            .filter(|((_, file), _)| file == path)
            .flat_map(|(_, ids)| ids.iter().cloned())
            .collect();
        ids.sort();
        ids
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StoredEvent)> {
        self.events.iter().map(|(id, record)| (id.as_str(), record))
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.by_calendar.clear();
        self.by_file.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn resolve<'a>(&'a self, ids: impl Iterator<Item = &'a String>) -> Vec<(&'a str, &'a StoredEvent)> {
        ids.filter_map(|id| self.events.get_key_value(id))
            .map(|(id, record)| (id.as_str(), record))
            .collect()
    }
}

fn file_key(record: &StoredEvent) -> Option<FileKey> {
    record
        .location
        .as_ref()
        .map(|location| (record.calendar_id.clone(), location.path.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{SingleEvent, Timing};
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn record(calendar: &str, file: Option<&str>, title: &str) -> StoredEvent {
        StoredEvent {
            calendar_id: calendar.to_string(),
            location: file.map(Location::new),
            event: Event::Single(SingleEvent {
                id: None,
                title: title.to_string(),
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                end_date: None,
                timing: Timing::AllDay,
                completed: None,
            }),
        }
    }

    #[test]
    fn add_replaces_and_moves_between_indices() {
        let mut store = EventStore::new();
        store.add("1".into(), record("a", Some("a/x.md"), "first"));
        store.add("1".into(), record("b", Some("b/y.md"), "second"));

        assert_eq!(store.len(), 1);
        assert!(store.events_in_calendar("a").is_empty());
        assert!(store.events_in_file("a", Path::new("a/x.md")).is_empty());
        assert_eq!(store.events_in_calendar("b")[0].1.event.title(), "second");
        assert_eq!(store.events_in_file("b", Path::new("b/y.md"))[0].0, "1");
    }

    #[test]
    fn delete_is_a_no_op_for_unknown_ids() {
        let mut store = EventStore::new();
        store.add("1".into(), record("a", None, "first"));
        assert!(store.delete("2").is_none());
        assert!(store.delete("1").is_some());
        assert!(store.is_empty());
        assert!(store.by_calendar.entries.is_empty());
    }

    #[test]
    fn ids_at_path_spans_calendars() {
        let mut store = EventStore::new();
        store.add("1".into(), record("a", Some("shared.md"), "one"));
        store.add("2".into(), record("b", Some("shared.md"), "two"));
        store.add("3".into(), record("b", Some("other.md"), "three"));

        assert_eq!(store.ids_at_path(Path::new("shared.md")), vec!["1", "2"]);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add {
            id: u8,
            calendar: u8,
            file: Option<u8>,
        },
        Delete {
            id: u8,
        },
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..8, 0u8..3, proptest::option::of(0u8..3))
                .prop_map(|(id, calendar, file)| Op::Add { id, calendar, file }),
            (0u8..8).prop_map(|id| Op::Delete { id }),
        ]
    }

    proptest! {
        #[test]
        fn indices_never_drift(ops in proptest::collection::vec(op(), 0..64)) {
            let mut store = EventStore::new();
            let mut model: HashMap<String, StoredEvent> = HashMap::new();

            for op in ops {
                match op {
                    Op::Add { id, calendar, file } => {
                        let file = file.map(|f| format!("cal{}/{}.md", calendar, f));
                        let rec = record(&format!("cal{}", calendar), file.as_deref(), &id.to_string());
                        store.add(id.to_string(), rec.clone());
                        model.insert(id.to_string(), rec);
                    }
                    Op::Delete { id } => {
                        store.delete(&id.to_string());
                        model.remove(&id.to_string());
                    }
                }
            }

            prop_assert_eq!(&store.events, &model);

            for (calendar, ids) in &store.by_calendar.entries {
                prop_assert!(!ids.is_empty());
                for id in ids {
                    let rec = store.events.get(id);
                    prop_assert!(rec.is_some_and(|r| &r.calendar_id == calendar));
                }
            }
            for ((calendar, path), ids) in &store.by_file.entries {
                prop_assert!(!ids.is_empty());
                for id in ids {
                    let anchored = store.events.get(id).is_some_and(|r| {
                        &r.calendar_id == calendar
                            && r.location.as_ref().map(|l| &l.path) == Some(path)
                    });
                    prop_assert!(anchored, "file index names {} under the wrong key", id);
                }
            }
            for (id, rec) in &store.events {
                let listed = store.events_in_calendar(&rec.calendar_id);
                prop_assert!(listed.iter().any(|(listed_id, _)| *listed_id == id.as_str()));
                if let Some(location) = &rec.location {
                    let listed = store.events_in_file(&rec.calendar_id, &location.path);
                    prop_assert!(listed.iter().any(|(listed_id, _)| *listed_id == id.as_str()));
                }
            }
        }
    }
}
