use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lru::LruCache;

use crate::Schema;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Resolved schemas keyed by destination path.
///
/// A destination's schema is derived once and reused for every later batch.
/// Unbounded by default; with a capacity, the least recently used destination
/// is forgotten first and re-derived on its next batch.
pub struct SchemaCache {
    entries: LruCache<PathBuf, Arc<Schema>>,
    hits: u64,
    misses: u64,
}

impl SchemaCache {
    pub fn new(capacity: Option<NonZeroUsize>) -> Self {
        let entries = match capacity {
            Some(cap) => LruCache::new(cap),
            None => LruCache::unbounded(),
        };
        Self {
            entries,
            hits: 0,
            misses: 0,
        }
    }

    /// The cached schema for `destination`, or the result of `resolve` (cached on success).
    pub fn get_or_resolve<E>(
        &mut self,
        destination: &Path,
        resolve: impl FnOnce() -> Result<Schema, E>,
    ) -> Result<Arc<Schema>, E> {
        if let Some(schema) = self.entries.get(destination) {
            self.hits += 1;
            return Ok(Arc::clone(schema));
        }

        self.misses += 1;
        let schema = Arc::new(resolve()?);
        log::debug!("resolved columns for {}: {schema}", destination.display());
        self.entries.put(destination.to_path_buf(), Arc::clone(&schema));
        Ok(schema)
    }

    pub fn peek(&self, destination: &Path) -> Option<Arc<Schema>> {
        self.entries.peek(destination).cloned()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.entries.len(),
        }
    }
}

impl Default for SchemaCache {
    fn default() -> Self {
        Self::new(None)
    }
}
