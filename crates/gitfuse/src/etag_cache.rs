//! ETag cache for conditional GitHub requests.
//!
//! Maps an API route to the last ETag and body the server returned for it.
//! A request carrying a cached ETag that comes back `304 Not Modified` reuses
//! the cached body and does not count against the primary rate limit.
//!
//! The cache can be persisted as JSON so a restarted mount revalidates instead
//! of refetching everything.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File name used inside the cache directory.
pub const CACHE_FILE_NAME: &str = "etags.json";

const CACHE_FORMAT_VERSION: u32 = 1;

/// Errors that can occur while persisting the cache.
#[derive(Debug, Error)]
pub enum EtagCacheError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid cache file {path}: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A cached response for one route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub etag: String,
    /// Raw response body.
    pub body: String,
    /// Next page advertised by the `Link` header of the cached response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page: Option<u32>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    entries: HashMap<String, CachedResponse>,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, CachedResponse>,
    dirty: bool,
}

/// Shared ETag cache. Cloning shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct EtagCache {
    inner: Arc<Mutex<Inner>>,
    path: Option<PathBuf>,
}

impl EtagCache {
    /// A cache that is never written to disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the cache from `dir`, creating an empty one if no file exists.
    ///
    /// A corrupt or incompatible file is logged and ignored.
    pub fn load(dir: impl AsRef<Path>) -> Self {
        let path = dir.as_ref().join(CACHE_FILE_NAME);
        let entries = match read_cache_file(&path) {
            Ok(Some(file)) if file.version == CACHE_FORMAT_VERSION => {
                tracing::debug!(path = %path.display(), entries = file.entries.len(), "Loaded ETag cache");
                file.entries
            }
            Ok(Some(file)) => {
                tracing::warn!(
                    path = %path.display(),
                    version = file.version,
                    "Ignoring ETag cache with unknown format version"
                );
                HashMap::new()
            }
            Ok(None) => HashMap::new(),
            Err(e) => {
                tracing::warn!("Ignoring unreadable ETag cache: {}", e);
                HashMap::new()
            }
        };

        Self {
            inner: Arc::new(Mutex::new(Inner {
                entries,
                dirty: false,
            })),
            path: Some(path),
        }
    }

    /// Path of the backing file, if persistent.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, route: &str) -> Option<CachedResponse> {
        self.lock().entries.get(route).cloned()
    }

    /// Cached ETag for a route.
    pub fn etag(&self, route: &str) -> Option<String> {
        self.lock().entries.get(route).map(|e| e.etag.clone())
    }

    pub fn put(&self, route: impl Into<String>, response: CachedResponse) {
        let mut inner = self.lock();
        inner.entries.insert(route.into(), response);
        inner.dirty = true;
    }

    pub fn remove(&self, route: &str) {
        let mut inner = self.lock();
        if inner.entries.remove(route).is_some() {
            inner.dirty = true;
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the cache to disk if it changed since the last save.
    ///
    /// Returns `Ok(false)` when there was nothing to write or the cache is
    /// in-memory only.
    pub fn save(&self) -> Result<bool, EtagCacheError> {
        let Some(path) = &self.path else {
            return Ok(false);
        };

        let json = {
            let inner = self.lock();
            if !inner.dirty {
                return Ok(false);
            }
            let file = CacheFile {
                version: CACHE_FORMAT_VERSION,
                entries: inner.entries.clone(),
            };
            serde_json::to_string(&file).map_err(|source| EtagCacheError::Format {
                path: path.clone(),
                source,
            })?
        };

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| EtagCacheError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        // Write to a sibling file and rename so a crash never leaves a torn file.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|source| EtagCacheError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, path).map_err(|source| EtagCacheError::Io {
            path: path.clone(),
            source,
        })?;

        self.lock().dirty = false;
        tracing::debug!(path = %path.display(), "Saved ETag cache");
        Ok(true)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn read_cache_file(path: &Path) -> Result<Option<CacheFile>, EtagCacheError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(EtagCacheError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|source| EtagCacheError::Format {
            path: path.to_path_buf(),
            source,
        })
}
