use crate::resource::{Source, SourceId};
use anyhow::{anyhow, Result};
use notify::event::ModifyKind;
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};
use std::time::Duration;

#[derive(Debug, Clone)]
struct WatchedRoot {
    source: SourceId,
    original: PathBuf,
    normalized: PathBuf,
}

/// Watches source roots and reports which sources saw file changes, so only those are reloaded.
pub struct SourceWatcher {
    watcher: RecommendedWatcher,
    rx: Receiver<notify::Result<Event>>,
    roots: Vec<WatchedRoot>,
}

pub fn normalize_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else if let Ok(cwd) = env::current_dir() {
        cwd.join(path)
    } else {
        path.to_path_buf()
    };
    fs::canonicalize(&absolute).unwrap_or(absolute)
}

impl SourceWatcher {
    pub fn new() -> Result<Self> {
        let (tx, rx) = channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })?;
        if let Err(err) = watcher.configure(NotifyConfig::default().with_poll_interval(Duration::from_millis(500))) {
            log::warn!("[watch] watcher configuration warning: {err}");
        }
        Ok(Self { watcher, rx, roots: Vec::new() })
    }

    /// Watches the root of every source in `sources` and stops watching roots no longer listed.
    pub fn sync(&mut self, sources: &[Source]) -> Result<()> {
        let desired: Vec<(SourceId, PathBuf)> = sources.iter().map(|source| (source.id(), source.root())).collect();
        let obsolete: Vec<WatchedRoot> = self
            .roots
            .iter()
            .filter(|root| !desired.iter().any(|(id, path)| id == &root.source && path == &root.original))
            .cloned()
            .collect();
        for root in obsolete {
            self.roots.retain(|watched| watched.original != root.original || watched.source != root.source);
            if let Err(err) = self.watcher.unwatch(&root.original) {
                log::debug!("[watch] unwatch '{}' failed: {err}", root.original.display());
            }
        }
        for (source, original) in desired {
            if self.roots.iter().any(|root| root.source == source && root.original == original) {
                continue;
            }
            self.watcher
                .watch(&original, RecursiveMode::Recursive)
                .map_err(|err| anyhow!("watch failed for '{}': {err}", original.display()))?;
            let normalized = normalize_path(&original);
            self.roots.push(WatchedRoot { source, original, normalized });
        }
        Ok(())
    }

    pub fn watched_sources(&self) -> Vec<SourceId> {
        self.roots.iter().map(|root| root.source.clone()).collect()
    }

    /// Sources touched by events received since the last call, in first-seen order.
    pub fn drain_changed(&mut self) -> Vec<SourceId> {
        let mut changed = Vec::new();
        while let Ok(res) = self.rx.try_recv() {
            match res {
                Ok(event) => {
                    if !is_relevant(&event.kind) {
                        continue;
                    }
                    for path in event.paths {
                        if let Some(source) = resolve_source(&self.roots, &path) {
                            if !changed.contains(&source) {
                                changed.push(source);
                            }
                        }
                    }
                }
                Err(err) => log::warn!("[watch] watcher error: {err}"),
            }
        }
        changed
    }
}

// Deepest matching root wins so a mod nested inside another tree maps to itself.
fn resolve_source(roots: &[WatchedRoot], path: &Path) -> Option<SourceId> {
    let normalized = normalize_path(path);
    roots
        .iter()
        .filter(|root| normalized.starts_with(&root.normalized) || path.starts_with(&root.original))
        .max_by_key(|root| root.normalized.components().count())
        .map(|root| root.source.clone())
}

fn is_relevant(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Name(_))
            | EventKind::Modify(ModifyKind::Any)
            | EventKind::Create(_)
            | EventKind::Remove(_)
    )
}
