//! File storage behind the note calendars.
//!
//! A [`Vault`] is a directory of notes addressed by paths relative to its root.
//! Writes either land whole or fail with an `io::Error`; readers never observe
//! partially written notes.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use toml::Table;
use tracing::debug;

use crate::frontmatter;

/// Directory (relative to the vault root) that receives trashed notes.
pub const TRASH_DIR: &str = ".trash";

/// Transformation applied by [`Vault::rewrite`].
pub type Transform<'a> = &'a (dyn Fn(&str) -> io::Result<String> + Send + Sync);

#[async_trait]
pub trait Vault: Send + Sync {
    async fn read(&self, path: &Path) -> io::Result<String>;

    /// Create a new note. Fails with `ErrorKind::AlreadyExists` if one is there.
    async fn create(&self, path: &Path, contents: &str) -> io::Result<()>;

    /// Replace a note's contents with `transform` applied to them.
    async fn rewrite(&self, path: &Path, transform: Transform<'_>) -> io::Result<()>;

    /// Move a note. Fails with `ErrorKind::AlreadyExists` if `to` is taken.
    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Delete a note permanently, or move it into [`TRASH_DIR`].
    async fn trash(&self, path: &Path, to_system_trash: bool) -> io::Result<()>;

    async fn exists(&self, path: &Path) -> bool;

    /// Files directly inside `dir`, sorted.
    async fn list(&self, dir: &Path) -> io::Result<Vec<PathBuf>>;

    /// Frontmatter of a note, or `None` if it has none.
    async fn metadata(&self, path: &Path) -> io::Result<Option<Table>> {
        let text = self.read(path).await?;
        frontmatter::read(&text).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

fn already_exists(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("{} already exists", path.display()),
    )
}

/// Trash destinations for a note, in order of preference.
fn trash_candidates(path: &Path) -> impl Iterator<Item = PathBuf> {
    let stem = path
        .file_stem()
        .map(OsStr::to_string_lossy)
        .unwrap_or_default()
        .into_owned();
    let extension = path.extension().map(|e| e.to_string_lossy().into_owned());
    let trash = PathBuf::from(TRASH_DIR);

    (1..=100).map(move |n| {
        let name = match (n, &extension) {
            (1, Some(ext)) => format!("{}.{}", stem, ext),
            (1, None) => stem.clone(),
            (n, Some(ext)) => format!("{}-{}.{}", stem, n, ext),
            (n, None) => format!("{}-{}", stem, n),
        };
        trash.join(name)
    })
}

fn trash_is_full(path: &Path) -> io::Error {
    io::Error::other(format!(
        "Too many trashed notes named like '{}'",
        path.display()
    ))
}

// =============================================================================
// Filesystem
// =============================================================================

/// A vault rooted at a directory on disk.
#[derive(Debug, Clone)]
pub struct FsVault {
    root: PathBuf,
}

impl FsVault {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsVault { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }

    async fn ensure_parent(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Vault for FsVault {
    async fn read(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(self.resolve(path)).await
    }

    async fn create(&self, path: &Path, contents: &str) -> io::Result<()> {
        let full = self.resolve(path);
        self.ensure_parent(&full).await?;

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&full)
            .await?;
        file.write_all(contents.as_bytes()).await?;
        file.flush().await?;
        debug!(path = %path.display(), "Created note");
        Ok(())
    }

    async fn rewrite(&self, path: &Path, transform: Transform<'_>) -> io::Result<()> {
        let full = self.resolve(path);
        let current = fs::read_to_string(&full).await?;
        let updated = transform(&current)?;

        let mut temp_name = full.file_name().unwrap_or_default().to_os_string();
        temp_name.push(".tmp");
        let temp = full.with_file_name(temp_name);

        fs::write(&temp, updated).await?;
        fs::rename(&temp, &full).await?;
        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let target = self.resolve(to);
        if fs::try_exists(&target).await? {
            return Err(already_exists(to));
        }
        self.ensure_parent(&target).await?;
        fs::rename(self.resolve(from), &target).await?;
        debug!(from = %from.display(), to = %to.display(), "Renamed note");
        Ok(())
    }

    async fn trash(&self, path: &Path, to_system_trash: bool) -> io::Result<()> {
        let full = self.resolve(path);
        if to_system_trash {
            return fs::remove_file(&full).await;
        }

        fs::create_dir_all(self.root.join(TRASH_DIR)).await?;
        for candidate in trash_candidates(path) {
            let target = self.resolve(&candidate);
            if !fs::try_exists(&target).await? {
                fs::rename(&full, &target).await?;
                debug!(path = %path.display(), to = %candidate.display(), "Trashed note");
                return Ok(());
            }
        }
        Err(trash_is_full(path))
    }

    async fn exists(&self, path: &Path) -> bool {
        fs::try_exists(self.resolve(path)).await.unwrap_or(false)
    }

    async fn list(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let mut entries = fs::read_dir(self.resolve(dir)).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push(dir.join(entry.file_name()));
            }
        }
        files.sort();
        Ok(files)
    }
}

// =============================================================================
// In memory
// =============================================================================

/// A vault held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryVault {
    files: Mutex<BTreeMap<PathBuf, String>>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    fn files(&self) -> MutexGuard<'_, BTreeMap<PathBuf, String>> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write a note directly, as an external editor would.
    pub fn insert(&self, path: impl Into<PathBuf>, contents: impl Into<String>) {
        self.files().insert(path.into(), contents.into());
    }

    /// Remove a note directly, as an external editor would.
    pub fn remove(&self, path: &Path) -> Option<String> {
        self.files().remove(path)
    }

    pub fn get(&self, path: &Path) -> Option<String> {
        self.files().get(path).cloned()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.files().keys().cloned().collect()
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{} not found", path.display()),
    )
}

#[async_trait]
impl Vault for MemoryVault {
    async fn read(&self, path: &Path) -> io::Result<String> {
        self.get(path).ok_or_else(|| not_found(path))
    }

    async fn create(&self, path: &Path, contents: &str) -> io::Result<()> {
        let mut files = self.files();
        if files.contains_key(path) {
            return Err(already_exists(path));
        }
        files.insert(path.to_path_buf(), contents.to_string());
        Ok(())
    }

    async fn rewrite(&self, path: &Path, transform: Transform<'_>) -> io::Result<()> {
        let mut files = self.files();
        let current = files.get_mut(path).ok_or_else(|| not_found(path))?;
        *current = transform(current)?;
        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut files = self.files();
        if files.contains_key(to) {
            return Err(already_exists(to));
        }
        let contents = files.remove(from).ok_or_else(|| not_found(from))?;
        files.insert(to.to_path_buf(), contents);
        Ok(())
    }

    async fn trash(&self, path: &Path, to_system_trash: bool) -> io::Result<()> {
        let mut files = self.files();
        let contents = files.remove(path).ok_or_else(|| not_found(path))?;
        if to_system_trash {
            return Ok(());
        }

        match trash_candidates(path).find(|candidate| !files.contains_key(candidate)) {
            Some(target) => {
                files.insert(target, contents);
                Ok(())
            }
            None => {
                files.insert(path.to_path_buf(), contents);
                Err(trash_is_full(path))
            }
        }
    }

    async fn exists(&self, path: &Path) -> bool {
        self.files().contains_key(path)
    }

    async fn list(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        Ok(self
            .files()
            .keys()
            .filter(|path| path.parent() == Some(dir))
            .cloned()
            .collect())
    }
}
