//! Calendar sources.
//!
//! A calendar is either a directory of notes in the vault, which can be edited,
//! or an ICS feed (a file or a URL), which is read-only.

mod ics;
mod local;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::warn;

use crate::config::CalendarSource;
use crate::error::CalCacheResult;
use crate::event::Event;
use crate::vault::Vault;

pub use ics::{IcsCalendar, IcsSource};
pub use local::LocalCalendar;

/// Where an event lives on disk.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    /// Vault-relative path of the note
    pub path: PathBuf,
    /// Line within the note, for sources that put several events in one file
    pub line: Option<usize>,
}

impl Location {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Location {
            path: path.into(),
            line: None,
        }
    }
}

/// An event read from a calendar, with its location if it has one.
pub type SourcedEvent = (Event, Option<Location>);

pub enum Calendar {
    Local(LocalCalendar),
    Ics(IcsCalendar),
}

impl Calendar {
    /// Build a calendar from a configured source.
    ///
    /// Returns `None` for unknown types or sources missing their required field.
    pub fn from_source(
        source: &CalendarSource,
        vault: &Arc<dyn Vault>,
        trash_to_system: bool,
    ) -> Option<Calendar> {
        match source.kind.as_str() {
            "local" => {
                let directory = source.params.get_str("directory")?;
                Some(Calendar::Local(LocalCalendar::new(
                    directory,
                    &source.color,
                    Arc::clone(vault),
                    trash_to_system,
                )))
            }
            "ical" => {
                let url = source.params.get_str("url")?;
                let Some(remote) = IcsSource::remote(url) else {
                    warn!(url, "Not an http, https or webcal URL");
                    return None;
                };
                Some(Calendar::Ics(IcsCalendar::new(
                    format!("ical::{}", url),
                    &source.color,
                    remote,
                )))
            }
            "ics" => {
                let path = source.params.get_str("path")?;
                Some(Calendar::Ics(IcsCalendar::new(
                    format!("ics::{}", path),
                    &source.color,
                    IcsSource::file(path),
                )))
            }
            _ => None,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Calendar::Local(c) => c.id(),
            Calendar::Ics(c) => c.id(),
        }
    }

    pub fn color(&self) -> &str {
        match self {
            Calendar::Local(c) => c.color(),
            Calendar::Ics(c) => c.color(),
        }
    }

    pub fn is_editable(&self) -> bool {
        self.as_editable().is_some()
    }

    pub fn as_editable(&self) -> Option<&LocalCalendar> {
        match self {
            Calendar::Local(c) => Some(c),
            Calendar::Ics(_) => None,
        }
    }

    /// Every event in the calendar.
    pub async fn events(&self) -> CalCacheResult<Vec<SourcedEvent>> {
        match self {
            Calendar::Local(c) => c.events().await,
            Calendar::Ics(c) => c.events().await,
        }
    }
}
