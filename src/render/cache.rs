//! Byte-budgeted LRU cache for rendered artifacts, one per format/book

use std::sync::Arc;

use lru::LruCache;

use crate::error::CacheError;
use crate::render::request::RenderOptions;
use crate::render::types::PageArtifact;

/// Cache key for rendered pages
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PageKey {
    /// Page number (1-based)
    pub page: usize,
    /// Render width the artifact was produced for
    pub width: u32,
    /// Theme colors baked into the artifact
    pub fg: i32,
    pub bg: i32,
}

impl PageKey {
    /// Create a cache key from render options
    #[must_use]
    pub fn from_options(page: usize, options: &RenderOptions) -> Self {
        Self {
            page,
            width: options.width,
            fg: options.fg,
            bg: options.bg,
        }
    }
}

struct CacheEntry {
    artifact: Arc<PageArtifact>,
    size: u64,
}

/// Memory-bounded store of rendered artifacts.
///
/// Eviction is strict least-recently-accessed first; entries that have
/// never been re-accessed fall out in insertion order (older first).
/// Usage never exceeds the budget after a successful insert.
pub struct FormatCache {
    entries: LruCache<PageKey, CacheEntry>,
    budget: u64,
    usage: u64,
}

impl FormatCache {
    /// Create a cache with the given byte budget
    #[must_use]
    pub fn new(budget: u64) -> Self {
        Self {
            entries: LruCache::unbounded(),
            budget,
            usage: 0,
        }
    }

    /// Get a cached artifact, promoting it in the LRU order
    #[must_use]
    pub fn get(&mut self, key: &PageKey) -> Option<Arc<PageArtifact>> {
        self.entries.get(key).map(|e| Arc::clone(&e.artifact))
    }

    /// Check for a key without promoting it
    #[must_use]
    pub fn contains(&self, key: &PageKey) -> bool {
        self.entries.contains(key)
    }

    /// Insert an artifact, evicting least-recently-used entries until it
    /// fits. An artifact larger than the entire budget is rejected
    /// rather than evicting everything for nothing.
    pub fn put(&mut self, key: PageKey, artifact: Arc<PageArtifact>) -> Result<(), CacheError> {
        let size = artifact.size_bytes();
        if size > self.budget {
            return Err(CacheError::EntryTooLarge {
                size,
                budget: self.budget,
            });
        }

        // Replacing an entry releases its old size first
        if let Some(old) = self.entries.pop(&key) {
            self.usage -= old.size;
        }

        while self.usage + size > self.budget {
            match self.entries.pop_lru() {
                Some((_, evicted)) => self.usage -= evicted.size,
                None => break,
            }
        }

        self.usage += size;
        self.entries.push(key, CacheEntry { artifact, size });
        debug_assert!(self.usage <= self.budget);
        Ok(())
    }

    /// Drop every cached artifact
    pub fn invalidate_all(&mut self) {
        self.entries.clear();
        self.usage = 0;
    }

    /// Drop all cached variants of one page
    pub fn invalidate_page(&mut self, page: usize) {
        let keys: Vec<_> = self
            .entries
            .iter()
            .filter(|(k, _)| k.page == page)
            .map(|(k, _)| k.clone())
            .collect();

        for key in keys {
            if let Some(entry) = self.entries.pop(&key) {
                self.usage -= entry.size;
            }
        }
    }

    /// Current resident bytes
    #[must_use]
    pub fn usage(&self) -> u64 {
        self.usage
    }

    /// Configured byte budget
    #[must_use]
    pub fn budget(&self) -> u64 {
        self.budget
    }

    /// Number of cached artifacts
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
