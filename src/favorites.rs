use crate::resource::SourceId;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FavoriteEntry {
    #[serde(rename = "isFavorite", default)]
    pub is_favorite: bool,
}

/// Persisted favorite flags: source id -> resource id -> entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FavoritesSnapshot {
    sources: BTreeMap<SourceId, BTreeMap<String, FavoriteEntry>>,
}

impl FavoritesSnapshot {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path_ref = path.as_ref();
        let text = fs::read_to_string(path_ref)
            .with_context(|| format!("Failed to read favorites file {}", path_ref.display()))?;
        let snapshot = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse favorites JSON from {}", path_ref.display()))?;
        Ok(snapshot)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(&path) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                if path.as_ref().exists() {
                    log::warn!("[favorites] {err:?}; starting without favorites");
                }
                Self::default()
            }
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path_ref = path.as_ref();
        if let Some(parent) = path_ref.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create favorites directory {}", parent.display()))?;
        }
        let text = serde_json::to_string_pretty(self).context("Failed to serialize favorites")?;
        fs::write(path_ref, text).with_context(|| format!("Failed to write favorites file {}", path_ref.display()))
    }

    pub fn set(&mut self, source: &SourceId, resource_id: impl Into<String>, is_favorite: bool) {
        self.sources.entry(source.clone()).or_default().insert(resource_id.into(), FavoriteEntry { is_favorite });
    }

    /// Missing entries read as not favorited.
    pub fn is_favorite(&self, source: &SourceId, resource_id: &str) -> bool {
        self.sources.get(source).and_then(|entries| entries.get(resource_id)).is_some_and(|entry| entry.is_favorite)
    }

    pub fn source(&self, source: &SourceId) -> Option<&BTreeMap<String, FavoriteEntry>> {
        self.sources.get(source)
    }

    /// Replaces the entries recorded for `source`.
    pub fn replace_source(&mut self, source: &SourceId, entries: BTreeMap<String, FavoriteEntry>) {
        if entries.is_empty() {
            self.sources.remove(source);
        } else {
            self.sources.insert(source.clone(), entries);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sources.values().all(|entries| entries.values().all(|entry| !entry.is_favorite))
    }
}
