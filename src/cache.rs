use crate::error::{ResourceError, Result};
use image::RgbaImage;
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;

/// Decodes bitmaps from disk. The database goes through this seam for every image it reads.
pub trait BitmapLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<RgbaImage>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FsBitmapLoader;

impl BitmapLoader for FsBitmapLoader {
    fn load(&self, path: &Path) -> Result<RgbaImage> {
        let bytes = std::fs::read(path).map_err(|err| ResourceError::io(path, err))?;
        let image = image::load_from_memory(&bytes)
            .map_err(|source| ResourceError::Decode { path: path.to_path_buf(), source })?;
        Ok(image.to_rgba8())
    }
}

/// Path-keyed cache that stores the in-flight load, so concurrent requests for the same path share
/// one load. Failed loads are not cached.
pub struct InflightCache<T> {
    entries: Mutex<HashMap<PathBuf, Arc<OnceCell<Arc<T>>>>>,
}

impl<T> Default for InflightCache<T> {
    fn default() -> Self {
        Self { entries: Mutex::new(HashMap::new()) }
    }
}

impl<T> InflightCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_load<F, Fut>(&self, path: &Path, load: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let cell = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(entries.entry(path.to_path_buf()).or_default())
        };
        let value = cell.get_or_try_init(move || async move { load().await.map(Arc::new) }).await?;
        Ok(Arc::clone(value))
    }

    pub fn get(&self, path: &Path) -> Option<Arc<T>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(path).and_then(|cell| cell.get().cloned())
    }

    pub fn invalidate(&self, path: &Path) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(path).is_some()
    }

    /// Drops every entry keyed under `root`; returns how many were removed.
    pub fn invalidate_under(&self, root: &Path) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|path, _| !path.starts_with(root));
        before - entries.len()
    }

    pub fn clear(&self) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.clear();
    }

    pub fn len(&self) -> usize {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.values().filter(|cell| cell.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Runs the loader on the blocking pool.
pub async fn load_bitmap(loader: &Arc<dyn BitmapLoader>, path: &Path) -> Result<RgbaImage> {
    let loader = Arc::clone(loader);
    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || loader.load(&owned))
        .await
        .map_err(|err| ResourceError::io(path, std::io::Error::other(err)))?
}

pub async fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path).await.map_err(|err| ResourceError::io(path, err))
}

pub async fn read_text(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path).await.map_err(|err| ResourceError::io(path, err))
}
