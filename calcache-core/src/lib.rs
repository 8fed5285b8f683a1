//! Core of calcache: a synchronized in-memory cache of calendar events.
//!
//! Events come from calendars backed by notes in a vault (editable) or by
//! ICS feeds (read-only). The [`EventCache`] indexes them, writes edits back
//! to the owning calendar, reconciles external file changes and tells
//! subscribers what changed.

pub mod cache;
pub mod calendar;
pub mod config;
pub mod date_range;
pub mod diff;
pub mod error;
pub mod event;
pub mod frontmatter;
pub mod ics;
pub mod recurrence;
pub mod store;
pub mod vault;
pub mod view;

pub use cache::{CacheUpdate, EventCache};
pub use calendar::{Calendar, Location};
pub use config::{CalCacheConfig, CalendarSource};
pub use error::{CalCacheError, CalCacheResult, ValidationError};
pub use event::{Completion, Event, RecurringEvent, RruleEvent, SingleEvent, Timing};
pub use store::{EventStore, StoredEvent};
pub use vault::{FsVault, MemoryVault, Vault};
pub use view::{EventInput, EventSource};
