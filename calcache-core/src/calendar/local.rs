//! Calendar backed by a directory of notes, one event per note.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use super::{Location, SourcedEvent};
use crate::error::{CalCacheError, CalCacheResult};
use crate::event::Event;
use crate::frontmatter;
use crate::vault::Vault;

const NOTE_EXTENSION: &str = "md";

pub struct LocalCalendar {
    id: String,
    color: String,
    directory: PathBuf,
    vault: Arc<dyn Vault>,
    trash_to_system: bool,
}

impl LocalCalendar {
    pub fn new(directory: &str, color: &str, vault: Arc<dyn Vault>, trash_to_system: bool) -> Self {
        let directory = directory.trim_matches('/');
        LocalCalendar {
            id: format!("local::{}", directory),
            color: color.to_string(),
            directory: PathBuf::from(directory),
            vault,
            trash_to_system,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn color(&self) -> &str {
        &self.color
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Whether a vault path is a note of this calendar. Subdirectories are not.
    pub fn contains_path(&self, path: &Path) -> bool {
        path.parent() == Some(self.directory.as_path())
            && path.extension().is_some_and(|ext| ext == NOTE_EXTENSION)
    }

    pub async fn events(&self) -> CalCacheResult<Vec<SourcedEvent>> {
        let files = match self.vault.list(&self.directory).await {
            Ok(files) => files,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(calendar = %self.id, "Calendar directory doesn't exist yet");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut events = Vec::new();
        for path in files.iter().filter(|path| self.contains_path(path)) {
            events.extend(self.events_in_file(path).await?);
        }
        Ok(events)
    }

    /// Events defined by one note. A missing note, or a note that isn't a
    /// valid event, has none.
    pub async fn events_in_file(&self, path: &Path) -> CalCacheResult<Vec<SourcedEvent>> {
        let metadata = match self.vault.metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                warn!(path = %path.display(), "Skipping note: {}", e);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let Some(raw) = metadata else {
            debug!(path = %path.display(), "Note has no frontmatter");
            return Ok(Vec::new());
        };

        match Event::validate(&raw) {
            Ok(event) => Ok(vec![(event, Some(Location::new(path)))]),
            Err(e) => {
                warn!(path = %path.display(), "Skipping note: {}", e);
                Ok(Vec::new())
            }
        }
    }

    /// Write a new note for `event`.
    pub async fn create_event(&self, event: &Event) -> CalCacheResult<Location> {
        let path = self.path_for(event);
        let note = frontmatter::render(&event.to_raw(), "")?;

        self.vault
            .create(&path, &note)
            .await
            .map_err(|e| write_error(e, &path))?;

        debug!(calendar = %self.id, path = %path.display(), "Created event note");
        Ok(Location::new(path))
    }

    /// Rewrite the note at `location` to hold `event`, keeping its body, and
    /// rename it if the event's name changed.
    pub async fn update_event(&self, location: &Location, event: &Event) -> CalCacheResult<Location> {
        let target = self.path_for(event);
        let renaming = target != location.path;
        if renaming && self.vault.exists(&target).await {
            return Err(CalCacheError::AlreadyExists(target));
        }

        let raw = event.to_raw();
        let transform = move |text: &str| {
            frontmatter::merge(text, &raw, Event::KEYS)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
        };
        self.vault.rewrite(&location.path, &transform).await?;

        if renaming {
            self.vault
                .rename(&location.path, &target)
                .await
                .map_err(|e| write_error(e, &target))?;
            debug!(from = %location.path.display(), to = %target.display(), "Renamed event note");
        }

        Ok(Location::new(target))
    }

    pub async fn delete_event(&self, location: &Location) -> CalCacheResult<()> {
        self.vault.trash(&location.path, self.trash_to_system).await?;
        debug!(calendar = %self.id, path = %location.path.display(), "Trashed event note");
        Ok(())
    }

    fn path_for(&self, event: &Event) -> PathBuf {
        self.directory
            .join(format!("{}.{}", sanitize_filename(&event.basename()), NOTE_EXTENSION))
    }
}

fn write_error(err: io::Error, path: &Path) -> CalCacheError {
    match err.kind() {
        io::ErrorKind::AlreadyExists => CalCacheError::AlreadyExists(path.to_path_buf()),
        _ => CalCacheError::Io(err),
    }
}

/// Drop characters that aren't allowed in note names.
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::MemoryVault;

    const DENTIST: &str = "+++\ntitle = \"Dentist\"\ndate = \"2024-03-04\"\nallDay = true\n+++\nBring the card.\n";

    fn calendar() -> (Arc<MemoryVault>, LocalCalendar) {
        let vault = Arc::new(MemoryVault::new());
        let calendar = LocalCalendar::new("events", "red", vault.clone(), false);
        (vault, calendar)
    }

    fn event(title: &str, date: &str) -> Event {
        let raw = toml::from_str(&format!(
            "title = \"{}\"\ndate = \"{}\"\nallDay = true",
            title, date
        ))
        .unwrap();
        Event::validate(&raw).unwrap()
    }

    #[test]
    fn contains_only_direct_notes() {
        let (_, calendar) = calendar();
        assert!(calendar.contains_path(Path::new("events/a.md")));
        assert!(!calendar.contains_path(Path::new("events/sub/a.md")));
        assert!(!calendar.contains_path(Path::new("events/a.txt")));
        assert!(!calendar.contains_path(Path::new("other/a.md")));
    }

    #[tokio::test]
    async fn enumerates_valid_notes_and_skips_the_rest() {
        let (vault, calendar) = calendar();
        vault.insert("events/2024-03-04 Dentist.md", DENTIST);
        vault.insert("events/plain.md", "no frontmatter here");
        vault.insert("events/broken.md", "+++\ntitle = \"x\"\nallDay = false\n+++\n");
        vault.insert("events/nested/deep.md", DENTIST);
        vault.insert("other/2024-03-04 Dentist.md", DENTIST);

        let events = calendar.events().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0.title(), "Dentist");
        assert_eq!(
            events[0].1,
            Some(Location::new("events/2024-03-04 Dentist.md"))
        );
    }

    #[tokio::test]
    async fn missing_directory_or_note_has_no_events() {
        let (_, calendar) = calendar();
        assert!(calendar.events().await.unwrap().is_empty());
        assert!(
            calendar
                .events_in_file(Path::new("events/gone.md"))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn create_refuses_to_overwrite() {
        let (vault, calendar) = calendar();
        let lunch = event("Lunch", "2024-03-05");

        let location = calendar.create_event(&lunch).await.unwrap();
        assert_eq!(location.path, PathBuf::from("events/2024-03-05 Lunch.md"));
        assert_eq!(
            calendar.events_in_file(&location.path).await.unwrap()[0].0,
            lunch
        );

        let err = calendar.create_event(&lunch).await.unwrap_err();
        assert!(matches!(err, CalCacheError::AlreadyExists(_)));
        assert_eq!(vault.paths().len(), 1);
    }

    #[tokio::test]
    async fn update_keeps_body_and_renames() {
        let (vault, calendar) = calendar();
        vault.insert("events/2024-03-04 Dentist.md", DENTIST);
        let old = Location::new("events/2024-03-04 Dentist.md");

        let moved = event("Dentist", "2024-03-11");
        let location = calendar.update_event(&old, &moved).await.unwrap();

        assert_eq!(location.path, PathBuf::from("events/2024-03-11 Dentist.md"));
        assert!(vault.get(&old.path).is_none());
        let note = vault.get(&location.path).unwrap();
        assert!(note.ends_with("+++\nBring the card.\n"));
        assert_eq!(
            calendar.events_in_file(&location.path).await.unwrap()[0].0,
            moved
        );
    }

    #[tokio::test]
    async fn update_keeps_keys_the_event_does_not_own() {
        let (vault, calendar) = calendar();
        let path = PathBuf::from("events/2024-03-04 Dentist.md");
        vault.insert(
            path.clone(),
            DENTIST.replace("+++\nBring", "tags = [\"health\"]\n+++\nBring"),
        );

        let same_day = event("Dentist", "2024-03-04");
        let location = calendar
            .update_event(&Location::new(path.clone()), &same_day)
            .await
            .unwrap();
        assert_eq!(location.path, path);

        let note = vault.get(&path).unwrap();
        let table = frontmatter::read(&note).unwrap().unwrap();
        assert_eq!(table["tags"][0].as_str(), Some("health"));
        assert_eq!(table["title"].as_str(), Some("Dentist"));
    }

    #[tokio::test]
    async fn update_fails_without_touching_anything_when_target_is_taken() {
        let (vault, calendar) = calendar();
        vault.insert("events/2024-03-04 Dentist.md", DENTIST);
        vault.insert("events/2024-03-11 Dentist.md", "taken");

        let err = calendar
            .update_event(
                &Location::new("events/2024-03-04 Dentist.md"),
                &event("Dentist", "2024-03-11"),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, CalCacheError::AlreadyExists(_)));
        assert_eq!(
            vault.get(Path::new("events/2024-03-04 Dentist.md")).as_deref(),
            Some(DENTIST)
        );
    }

    #[tokio::test]
    async fn delete_moves_note_to_trash() {
        let (vault, calendar) = calendar();
        vault.insert("events/2024-03-04 Dentist.md", DENTIST);

        calendar
            .delete_event(&Location::new("events/2024-03-04 Dentist.md"))
            .await
            .unwrap();

        assert_eq!(
            vault.paths(),
            vec![PathBuf::from(".trash/2024-03-04 Dentist.md")]
        );
    }

    #[test]
    fn sanitizes_note_names() {
        assert_eq!(sanitize_filename("a/b: c?"), "ab c");
    }
}
