//! Process-global image cache.
//!
//! Apply invocations within one process share decoded image blobs keyed by
//! source URL or filesystem path, so a watched Markdown file that is saved
//! repeatedly does not re-read or re-upload unchanged pictures.
//!
//! The cache is a lookup table, not an owner: slides hold their own `Arc`
//! references and entries merely point at the same allocations. Lookup
//! takes the read lock, store takes the write lock, and the store path
//! compacts the table so that entries whose images share a checksum all
//! point at the copy with the newest modification time.
//!
//! Upload state is per-image and survives in this cache across Apply
//! invocations; [`ImageCache::clear_all_upload_state`] resets it between
//! runs.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use super::image::Image;

/// The process-wide cache, initialized lazily on first lookup.
static GLOBAL: OnceLock<ImageCache> = OnceLock::new();

/// Image lookup table keyed by URL or filesystem path.
#[derive(Default)]
pub struct ImageCache {
    entries: RwLock<HashMap<String, Arc<Image>>>,
}

impl ImageCache {
    /// The process-global instance.
    pub fn global() -> &'static ImageCache {
        GLOBAL.get_or_init(ImageCache::default)
    }

    /// Create a private cache (tests, embedding).
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an image by URL or path.
    pub fn get(&self, key: &str) -> Option<Arc<Image>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    /// Store an image under a key and compact the table.
    ///
    /// Compaction dedupes by checksum: every entry whose image has the
    /// same checksum as `image` is re-pointed at whichever copy carries
    /// the newest modification time, so repeated stores of a re-saved
    /// file converge on one allocation.
    pub fn store(&self, key: impl Into<String>, image: Arc<Image>) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let checksum = image.checksum();
        entries.insert(key.into(), image.clone());

        // Pick the preferred copy for this checksum.
        let mut preferred = image;
        for existing in entries.values() {
            if existing.checksum() == checksum && newer(existing, &preferred) {
                preferred = existing.clone();
            }
        }
        for existing in entries.values_mut() {
            if existing.checksum() == checksum && !Arc::ptr_eq(existing, &preferred) {
                *existing = preferred.clone();
            }
        }
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all entries.
    pub fn clear(&self) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.clear();
    }

    /// Reset the upload state of every cached image to `NotStarted`.
    ///
    /// Call between successive Apply invocations within one process.
    pub fn clear_all_upload_state(&self) {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        for image in entries.values() {
            image.reset_upload_state();
        }
    }
}

fn newer(a: &Arc<Image>, b: &Arc<Image>) -> bool {
    match (a.mod_time(), b.mod_time()) {
        (Some(ta), Some(tb)) => ta > tb,
        (Some(_), None) => true,
        _ => false,
    }
}

// =============================================================================
// Tests
// =============================================================================
