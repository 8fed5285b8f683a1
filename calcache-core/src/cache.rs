//! The event cache.
//!
//! [`EventCache`] owns the configured calendars and the [`EventStore`] built
//! from them. Edits go through the owning calendar first and only touch the
//! store once the write succeeded. External changes are reconciled one file at
//! a time, and subscribers get one [`CacheUpdate`] per operation that changed
//! something.
//!
//! Every mutating operation takes `&mut self`, so a store update can't be
//! observed halfway even when the operation awaits calendar I/O.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::calendar::{Calendar, LocalCalendar, SourcedEvent};
use crate::config::CalCacheConfig;
use crate::diff::events_are_different;
use crate::error::{CalCacheError, CalCacheResult};
use crate::event::Event;
use crate::store::{EventStore, StoredEvent};
use crate::vault::Vault;
use crate::view::{EventInput, EventSource, to_event_input};

/// What changed in one operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheUpdate {
    pub ids_to_remove: Vec<String>,
    pub to_add: Vec<EventInput>,
}

impl CacheUpdate {
    pub fn is_empty(&self) -> bool {
        self.ids_to_remove.is_empty() && self.to_add.is_empty()
    }
}

type Subscriber = Box<dyn FnMut(&CacheUpdate) + Send>;

/// Hands out ids to events that don't carry one. Ids are only unique for the
/// lifetime of the cache and restart on every `initialize`.
#[derive(Debug, Default)]
struct IdGenerator {
    next: u64,
}

impl IdGenerator {
    fn id_for(&mut self, event: &Event) -> String {
        match event.id() {
            Some(id) => id.to_string(),
            None => {
                self.next += 1;
                format!("_{}", self.next)
            }
        }
    }

    fn reset(&mut self) {
        self.next = 0;
    }
}

pub struct EventCache {
    config: CalCacheConfig,
    vault: Arc<dyn Vault>,
    calendars: Vec<Calendar>,
    store: EventStore,
    ids: IdGenerator,
    subscribers: Vec<Subscriber>,
}

impl EventCache {
    /// An empty cache. Call [`initialize`](Self::initialize) and
    /// [`populate`](Self::populate) before querying it.
    pub fn new(config: CalCacheConfig, vault: Arc<dyn Vault>) -> Self {
        EventCache {
            config,
            vault,
            calendars: Vec::new(),
            store: EventStore::new(),
            ids: IdGenerator::default(),
            subscribers: Vec::new(),
        }
    }

    /// Replace the configuration. Takes effect on the next `initialize`.
    pub fn set_config(&mut self, config: CalCacheConfig) {
        self.config = config;
    }

    /// Forget every stored event and restart id minting. Calendars are kept;
    /// call [`populate`](Self::populate) to load them again.
    pub fn clear(&mut self) {
        self.store.clear();
        self.ids.reset();
    }

    /// Drop every calendar and event, then rebuild the calendars from config.
    ///
    /// Sources of an unknown type, missing required fields, or repeating an
    /// earlier calendar's id are skipped.
    pub fn initialize(&mut self) {
        self.calendars.clear();
        self.clear();

        for source in &self.config.calendars {
            let Some(calendar) =
                Calendar::from_source(source, &self.vault, self.config.trash_to_system)
            else {
                warn!(kind = %source.kind, "Skipping unsupported or misconfigured calendar");
                continue;
            };

            if self.calendars.iter().any(|c| c.id() == calendar.id()) {
                warn!(calendar = calendar.id(), "Skipping duplicate calendar");
                continue;
            }
            self.calendars.push(calendar);
        }

        info!(count = self.calendars.len(), "Initialized calendars");
    }

    /// Load every calendar's events into the store. A calendar that can't be
    /// read is logged and contributes nothing.
    pub async fn populate(&mut self) {
        self.store.clear();

        for calendar in &self.calendars {
            let events = match calendar.events().await {
                Ok(events) => events,
                Err(e) => {
                    warn!(calendar = calendar.id(), "Failed to read calendar: {}", e);
                    continue;
                }
            };

            debug!(calendar = calendar.id(), count = events.len(), "Populating");
            for (event, location) in events {
                let id = self.ids.id_for(&event);
                self.store.add(
                    id,
                    StoredEvent {
                        calendar_id: calendar.id().to_string(),
                        location,
                        event,
                    },
                );
            }
        }

        info!(count = self.store.len(), "Populated event cache");
    }

    // =========================================================================
    // Edits
    // =========================================================================

    /// Create `event` in an editable calendar and return its id.
    ///
    /// Subscribers are not notified.
    pub async fn add_event(&mut self, calendar_id: &str, event: Event) -> CalCacheResult<String> {
        let event = event.validated()?;
        let calendar = find_editable(&self.calendars, calendar_id)?;
        let location = calendar.create_event(&event).await?;

        let id = self.ids.id_for(&event);
        self.store.add(
            id.clone(),
            StoredEvent {
                calendar_id: calendar_id.to_string(),
                location: Some(location),
                event,
            },
        );
        debug!(id, calendar = calendar_id, "Added event");
        Ok(id)
    }

    /// Replace the event stored under `id` with `new_event`, writing it to its
    /// note first. Returns the id the new event is stored under.
    ///
    /// On failure the store is left as it was.
    pub async fn modify_event(&mut self, id: &str, new_event: Event) -> CalCacheResult<String> {
        let new_event = new_event.validated()?;
        let record = self
            .store
            .get(id)
            .ok_or_else(|| CalCacheError::EventNotFound(id.to_string()))?;
        let calendar = find_editable(&self.calendars, &record.calendar_id)?;
        let location = record
            .location
            .clone()
            .ok_or_else(|| CalCacheError::NoLocation(id.to_string()))?;

        let new_location = calendar.update_event(&location, &new_event).await?;

        let calendar_id = calendar.id().to_string();
        let color = calendar.color().to_string();
        self.store.delete(id);
        let new_id = self.ids.id_for(&new_event);
        let record = StoredEvent {
            calendar_id,
            location: Some(new_location),
            event: new_event,
        };
        let update = CacheUpdate {
            ids_to_remove: vec![id.to_string()],
            to_add: vec![to_event_input(&new_id, &record, Some(&color))],
        };
        self.store.add(new_id.clone(), record);

        debug!(old = id, new = %new_id, "Modified event");
        self.notify(&update);
        Ok(new_id)
    }

    /// Trash the note behind `id` and forget the event.
    pub async fn delete_event(&mut self, id: &str) -> CalCacheResult<()> {
        let record = self
            .store
            .get(id)
            .ok_or_else(|| CalCacheError::EventNotFound(id.to_string()))?;
        let calendar = find_editable(&self.calendars, &record.calendar_id)?;
        let location = record
            .location
            .clone()
            .ok_or_else(|| CalCacheError::NoLocation(id.to_string()))?;

        calendar.delete_event(&location).await?;

        self.store.delete(id);
        debug!(id, "Deleted event");
        self.notify(&CacheUpdate {
            ids_to_remove: vec![id.to_string()],
            to_add: Vec::new(),
        });
        Ok(())
    }

    // =========================================================================
    // External changes
    // =========================================================================

    /// Reconcile the store with a note that changed outside the cache.
    ///
    /// Every editable calendar that owns the path is re-read for that file.
    /// Calendars whose events didn't change are left alone; the rest have their
    /// records for the file replaced. Subscribers get a single update covering
    /// all calendars, and none if nothing changed.
    pub async fn file_updated(&mut self, path: &Path) {
        let mut update = CacheUpdate::default();

        for calendar in &self.calendars {
            let Some(local) = calendar.as_editable() else {
                continue;
            };
            if !local.contains_path(path) {
                continue;
            }

            let new_events = match local.events_in_file(path).await {
                Ok(events) => events,
                Err(e) => {
                    warn!(calendar = local.id(), path = %path.display(), "Failed to re-read note: {}", e);
                    continue;
                }
            };
            let old = self.store.events_in_file(local.id(), path);
            let old: Vec<(String, Event)> = old
                .into_iter()
                .map(|(id, record)| (id.to_string(), record.event.clone()))
                .collect();

            replace_if_changed(
                &mut self.store,
                &mut self.ids,
                calendar,
                old,
                new_events,
                &mut update,
            );
        }

        if !update.is_empty() {
            self.notify(&update);
        }
    }

    /// Forget every event anchored to a note that was deleted.
    pub fn file_deleted(&mut self, path: &Path) {
        let ids = self.store.ids_at_path(path);
        if ids.is_empty() {
            return;
        }

        for id in &ids {
            self.store.delete(id);
        }
        debug!(path = %path.display(), count = ids.len(), "Dropped events of deleted note");
        self.notify(&CacheUpdate {
            ids_to_remove: ids,
            to_add: Vec::new(),
        });
    }

    /// Re-read every read-only calendar and replace those whose events changed.
    pub async fn refresh_read_only_calendars(&mut self) {
        let mut update = CacheUpdate::default();

        for calendar in self.calendars.iter().filter(|c| !c.is_editable()) {
            let new_events = match calendar.events().await {
                Ok(events) => events,
                Err(e) => {
                    warn!(calendar = calendar.id(), "Failed to refresh calendar: {}", e);
                    continue;
                }
            };
            let old: Vec<(String, Event)> = self
                .store
                .events_in_calendar(calendar.id())
                .into_iter()
                .map(|(id, record)| (id.to_string(), record.event.clone()))
                .collect();

            replace_if_changed(
                &mut self.store,
                &mut self.ids,
                calendar,
                old,
                new_events,
                &mut update,
            );
        }

        if !update.is_empty() {
            self.notify(&update);
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn calendars(&self) -> &[Calendar] {
        &self.calendars
    }

    pub fn get_event_by_id(&self, id: &str) -> Option<&Event> {
        self.store.get(id).map(|record| &record.event)
    }

    pub fn calendar_id_for_event(&self, id: &str) -> Option<&str> {
        self.store.get(id).map(|record| record.calendar_id.as_str())
    }

    /// Whether `modify_event` and `delete_event` can act on `id`.
    pub fn is_editable(&self, id: &str) -> bool {
        self.store.get(id).is_some_and(|record| {
            record.location.is_some()
                && find_editable(&self.calendars, &record.calendar_id).is_ok()
        })
    }

    /// Every stored record with its id.
    pub fn records(&self) -> impl Iterator<Item = (&str, &StoredEvent)> {
        self.store.iter()
    }

    /// Events grouped by calendar, in calendar order, ready for display.
    pub fn get_all_events(&self) -> Vec<EventSource> {
        self.calendars
            .iter()
            .map(|calendar| EventSource {
                id: calendar.id().to_string(),
                color: calendar.color().to_string(),
                editable: calendar.is_editable(),
                events: self
                    .store
                    .events_in_calendar(calendar.id())
                    .into_iter()
                    .map(|(id, record)| to_event_input(id, record, Some(calendar.color())))
                    .collect(),
            })
            .collect()
    }

    // =========================================================================
    // Subscribers
    // =========================================================================

    /// Register a callback. Callbacks run in registration order, before the
    /// operation that triggered them returns.
    pub fn subscribe(&mut self, callback: impl FnMut(&CacheUpdate) + Send + 'static) {
        self.subscribers.push(Box::new(callback));
    }

    /// Receive updates through a channel, in the order they happen.
    pub fn subscribe_channel(&mut self) -> mpsc::UnboundedReceiver<CacheUpdate> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribe(move |update| {
            // A dropped receiver just stops listening.
            let _ = tx.send(update.clone());
        });
        rx
    }

    fn notify(&mut self, update: &CacheUpdate) {
        debug!(
            removed = update.ids_to_remove.len(),
            added = update.to_add.len(),
            subscribers = self.subscribers.len(),
            "Notifying subscribers"
        );
        for subscriber in &mut self.subscribers {
            subscriber(update);
        }
    }
}

fn find_editable<'a>(calendars: &'a [Calendar], calendar_id: &str) -> CalCacheResult<&'a LocalCalendar> {
    let calendar = calendars
        .iter()
        .find(|c| c.id() == calendar_id)
        .ok_or_else(|| CalCacheError::CalendarNotFound(calendar_id.to_string()))?;

    calendar
        .as_editable()
        .ok_or_else(|| CalCacheError::ReadOnlyCalendar(calendar_id.to_string()))
}

/// Swap a calendar's `old` records for `new` ones unless they are
/// structurally the same, recording the swap in `update`.
fn replace_if_changed(
    store: &mut EventStore,
    ids: &mut IdGenerator,
    calendar: &Calendar,
    old: Vec<(String, Event)>,
    new: Vec<SourcedEvent>,
    update: &mut CacheUpdate,
) {
    let old_events: Vec<Event> = old.iter().map(|(_, event)| event.clone()).collect();
    let new_events: Vec<Event> = new.iter().map(|(event, _)| event.clone()).collect();
    if !events_are_different(&old_events, &new_events) {
        debug!(calendar = calendar.id(), "No changes");
        return;
    }

    for (id, _) in old {
        store.delete(&id);
        update.ids_to_remove.push(id);
    }

    for (event, location) in new {
        let id = ids.id_for(&event);
        let record = StoredEvent {
            calendar_id: calendar.id().to_string(),
            location,
            event,
        };
        update
            .to_add
            .push(to_event_input(&id, &record, Some(calendar.color())));
        store.add(id, record);
    }
}
