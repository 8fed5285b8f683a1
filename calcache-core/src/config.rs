//! calcache configuration.
//!
//! Lives at ~/.config/calcache/config.toml and lists the calendar sources the
//! cache is built from:
//!
//! ```toml
//! vault_dir = "~/calendar"
//!
//! [[calendars]]
//! type = "local"
//! directory = "events"
//! color = "#3b82f6"
//!
//! [[calendars]]
//! type = "ical"
//! url = "webcal://example.com/holidays.ics"
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use config::{Config, File};
use serde::{Deserialize, Serialize};

use crate::error::{CalCacheError, CalCacheResult};

static DEFAULT_VAULT_DIR: &str = "~/calendar";
static DEFAULT_COLOR: &str = "#808080";

fn default_vault_dir() -> PathBuf {
    PathBuf::from(DEFAULT_VAULT_DIR)
}

fn default_color() -> String {
    DEFAULT_COLOR.to_string()
}

/// Type-specific fields of a calendar source.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct SourceParams(pub HashMap<String, toml::Value>);

impl SourceParams {
    /// A non-empty string field.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(|value| value.as_str())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

/// One `[[calendars]]` entry.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CalendarSource {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(flatten)]
    pub params: SourceParams,
}

impl CalendarSource {
    pub fn new(kind: &str, color: &str, params: &[(&str, &str)]) -> Self {
        CalendarSource {
            kind: kind.to_string(),
            color: color.to_string(),
            params: SourceParams(
                params
                    .iter()
                    .map(|(k, v)| (k.to_string(), toml::Value::String(v.to_string())))
                    .collect(),
            ),
        }
    }

    /// Notes in a vault directory.
    pub fn local(directory: &str, color: &str) -> Self {
        Self::new("local", color, &[("directory", directory)])
    }

    /// A remote feed (http, https or webcal).
    pub fn ical(url: &str, color: &str) -> Self {
        Self::new("ical", color, &[("url", url)])
    }

    /// An .ics file on disk.
    pub fn ics(path: &str, color: &str) -> Self {
        Self::new("ics", color, &[("path", path)])
    }
}

/// Global configuration at ~/.config/calcache/config.toml
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CalCacheConfig {
    #[serde(default = "default_vault_dir")]
    pub vault_dir: PathBuf,

    /// Delete notes permanently instead of moving them into the vault's .trash
    #[serde(default)]
    pub trash_to_system: bool,

    #[serde(default)]
    pub calendars: Vec<CalendarSource>,
}

impl Default for CalCacheConfig {
    fn default() -> Self {
        CalCacheConfig {
            vault_dir: default_vault_dir(),
            trash_to_system: false,
            calendars: Vec::new(),
        }
    }
}

impl CalCacheConfig {
    pub fn config_path() -> CalCacheResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| CalCacheError::Config("Could not determine config directory".into()))?
            .join("calcache");

        Ok(config_dir.join("config.toml"))
    }

    /// Load the config, writing a commented default file first if none exists.
    pub fn load() -> CalCacheResult<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> CalCacheResult<Self> {
        Config::builder()
            .add_source(File::from(path.to_path_buf()).required(false))
            .build()
            .map_err(|e| CalCacheError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| CalCacheError::Config(e.to_string()))
    }

    /// Create a default config file with all options commented out.
    pub fn create_default_config(path: &Path) -> CalCacheResult<()> {
        let contents = format!(
            "\
# calcache configuration

# Where your notes live:
# vault_dir = \"{}\"

# Delete notes permanently instead of moving them to <vault>/.trash:
# trash_to_system = false

# Calendars, one [[calendars]] entry each:
#
# [[calendars]]
# type = \"local\"
# directory = \"events\"
# color = \"#3b82f6\"
#
# [[calendars]]
# type = \"ical\"
# url = \"webcal://example.com/holidays.ics\"
#
# [[calendars]]
# type = \"ics\"
# path = \"~/Downloads/conference.ics\"
",
            DEFAULT_VAULT_DIR
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CalCacheError::Config(format!("Could not create config directory: {e}"))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| CalCacheError::Config(format!("Could not write config file: {e}")))?;

        Ok(())
    }

    /// The vault directory with `~` expanded.
    pub fn vault_path(&self) -> PathBuf {
        let full_path_str = shellexpand::tilde(&self.vault_dir.to_string_lossy()).into_owned();

        PathBuf::from(full_path_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_calendar_sources() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r##"
vault_dir = "/tmp/notes"
trash_to_system = true

[[calendars]]
type = "local"
directory = "events"
color = "#ff0000"

[[calendars]]
type = "ical"
url = "https://example.com/feed.ics"
"##,
        )
        .unwrap();

        let config = CalCacheConfig::load_from(&path).unwrap();
        assert_eq!(config.vault_path(), PathBuf::from("/tmp/notes"));
        assert!(config.trash_to_system);
        assert_eq!(config.calendars.len(), 2);
        assert_eq!(config.calendars[0], CalendarSource::local("events", "#ff0000"));
        assert_eq!(config.calendars[1].kind, "ical");
        assert_eq!(config.calendars[1].color, DEFAULT_COLOR);
        assert_eq!(
            config.calendars[1].params.get_str("url"),
            Some("https://example.com/feed.ics")
        );
    }

    #[test]
    fn default_config_file_loads_as_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        CalCacheConfig::create_default_config(&path).unwrap();
        let config = CalCacheConfig::load_from(&path).unwrap();

        assert_eq!(config, CalCacheConfig::default());
    }
}
