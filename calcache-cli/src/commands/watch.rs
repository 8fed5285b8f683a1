use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use calcache_core::EventCache;
use notify::event::{ModifyKind, RenameMode};
use notify::{Config, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use owo_colors::OwoColorize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::render::Render;

/// A vault-relative change to feed into the cache.
#[derive(Debug, PartialEq, Eq)]
enum FileChange {
    Updated(PathBuf),
    Deleted(PathBuf),
}

pub async fn run(mut cache: EventCache, root: PathBuf, refresh: Option<Duration>) -> Result<()> {
    // Watcher events carry absolute, resolved paths
    let root = std::fs::canonicalize(&root).unwrap_or(root);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut watcher = RecommendedWatcher::new(
        move |res: Result<notify::Event, notify::Error>| match res {
            Ok(event) => {
                let _ = tx.send(event);
            }
            Err(e) => warn!("Watch error: {}", e),
        },
        Config::default(),
    )?;
    watcher.watch(&root, RecursiveMode::Recursive)?;

    let mut updates = cache.subscribe_channel();
    let mut refresh = refresh.map(tokio::time::interval);
    if let Some(interval) = refresh.as_mut() {
        // The first tick fires immediately and the cache is already fresh
        interval.tick().await;
    }

    println!("{}", format!("Watching {}", root.display()).dimmed());

    loop {
        tokio::select! {
            Some(event) = rx.recv() => {
                for change in changes(&root, &event) {
                    debug!(?change, "Vault change");
                    match change {
                        FileChange::Updated(path) => cache.file_updated(&path).await,
                        FileChange::Deleted(path) => cache.file_deleted(&path),
                    }
                }
            }
            Some(update) = updates.recv() => {
                println!("{}", update.render());
            }
            _ = tick(&mut refresh) => {
                cache.refresh_read_only_calendars().await;
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    Ok(())
}

async fn tick(refresh: &mut Option<tokio::time::Interval>) {
    match refresh {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Translate a watcher event into vault-relative changes.
///
/// Paths outside the vault or under a dot-directory (the trash included)
/// are ignored.
fn changes(root: &Path, event: &notify::Event) -> Vec<FileChange> {
    let relative = |path: &PathBuf| -> Option<PathBuf> {
        let rel = path.strip_prefix(root).ok()?;
        let hidden = rel.components().any(|c| match c {
            Component::Normal(name) => name.to_string_lossy().starts_with('.'),
            _ => false,
        });
        (!hidden).then(|| rel.to_path_buf())
    };

    let paths = event.paths.iter().filter_map(relative);

    match event.kind {
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any) => {
            paths.map(FileChange::Updated).collect()
        }
        EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            paths.map(FileChange::Deleted).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            paths.map(FileChange::Updated).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            // [from, to]
            let mut out = Vec::new();
            if let Some(from) = event.paths.first().and_then(relative) {
                out.push(FileChange::Deleted(from));
            }
            if let Some(to) = event.paths.get(1).and_then(relative) {
                out.push(FileChange::Updated(to));
            }
            out
        }
        EventKind::Modify(ModifyKind::Name(_)) => paths
            .map(|rel| {
                if root.join(&rel).exists() {
                    FileChange::Updated(rel)
                } else {
                    FileChange::Deleted(rel)
                }
            })
            .collect(),
        _ => Vec::new(),
    }
}
