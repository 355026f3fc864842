//! Cached disk dictionary
//!
//! Wraps a [`DiskDictionary`] with LRU caches for name and id lookups.
//! Entries are Arc-wrapped so a cache hit only bumps a refcount. Misses by
//! name are cached too (as `None`), since repeated probes for absent terms are
//! common in query evaluation.

use super::disk::DiskDictionary;
use super::entry::DiskEntry;
use super::name_codec::NameCodec;
use super::postings::Postings;
use crate::config::DictConfig;
use crate::Result;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(1024) {
    Some(n) => n,
    None => unreachable!(),
};

pub struct CachedDiskDictionary<K: NameCodec, P: Postings> {
    dict: DiskDictionary<K, P>,
    by_name: Mutex<LruCache<K, Option<Arc<DiskEntry<K>>>>>,
    by_id: Mutex<LruCache<u64, Option<Arc<DiskEntry<K>>>>>,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
}

impl<K: NameCodec, P: Postings> CachedDiskDictionary<K, P> {
    pub fn new(dict: DiskDictionary<K, P>, config: &DictConfig) -> Self {
        let capacity = NonZeroUsize::new(config.cache_capacity).unwrap_or(DEFAULT_CAPACITY);
        Self {
            dict,
            by_name: Mutex::new(LruCache::new(capacity)),
            by_id: Mutex::new(LruCache::new(capacity)),
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
        }
    }

    pub fn open(path: impl AsRef<Path>, config: &DictConfig) -> Result<Self> {
        Ok(Self::new(DiskDictionary::open(path, config)?, config))
    }

    pub fn dictionary(&self) -> &DiskDictionary<K, P> {
        &self.dict
    }

    pub fn into_inner(self) -> DiskDictionary<K, P> {
        self.dict
    }

    /// Exact lookup by name through the cache
    pub fn get(&self, name: &K) -> Result<Option<Arc<DiskEntry<K>>>> {
        if let Some(cached) = self.by_name.lock().get(name) {
            self.hit_count.fetch_add(1, Ordering::Relaxed);
            return Ok(cached.clone());
        }
        self.miss_count.fetch_add(1, Ordering::Relaxed);

        // lock not held during the disk lookup
        let entry = self.dict.get(name)?.map(Arc::new);
        if let Some(entry) = &entry {
            self.by_id.lock().put(entry.id, Some(Arc::clone(entry)));
        }
        self.by_name.lock().put(name.clone(), entry.clone());
        Ok(entry)
    }

    /// Lookup by entry id through the cache
    pub fn get_by_id(&self, id: u64) -> Result<Option<Arc<DiskEntry<K>>>> {
        if let Some(cached) = self.by_id.lock().get(&id) {
            self.hit_count.fetch_add(1, Ordering::Relaxed);
            return Ok(cached.clone());
        }
        self.miss_count.fetch_add(1, Ordering::Relaxed);

        let entry = self.dict.get_by_id(id)?.map(Arc::new);
        if let Some(entry) = &entry {
            self.by_name.lock().put(entry.name.clone(), Some(Arc::clone(entry)));
        }
        self.by_id.lock().put(id, entry.clone());
        Ok(entry)
    }

    /// Postings for `name` (entry cached, postings decoded on every call)
    pub fn postings(&self, name: &K) -> Result<Option<P>> {
        match self.get(name)? {
            Some(entry) => self.dict.read_postings(&entry).map(Some),
            None => Ok(None),
        }
    }

    pub fn hit_rate(&self) -> f64 {
        let hits = self.hit_count.load(Ordering::Relaxed) as f64;
        let misses = self.miss_count.load(Ordering::Relaxed) as f64;
        if hits + misses == 0.0 {
            0.0
        } else {
            hits / (hits + misses)
        }
    }

    pub fn stats(&self) -> CacheStats {
        let by_name = self.by_name.lock();
        let by_id = self.by_id.lock();
        CacheStats {
            capacity: by_name.cap().get(),
            name_entries: by_name.len(),
            id_entries: by_id.len(),
            hits: self.hit_count.load(Ordering::Relaxed),
            misses: self.miss_count.load(Ordering::Relaxed),
            hit_rate: self.hit_rate(),
        }
    }

    /// Drop every cached entry and reset the counters
    pub fn clear(&self) {
        self.by_name.lock().clear();
        self.by_id.lock().clear();
        self.hit_count.store(0, Ordering::Relaxed);
        self.miss_count.store(0, Ordering::Relaxed);
    }
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Capacity of each cache
    pub capacity: usize,
    pub name_entries: usize,
    pub id_entries: usize,
    pub hits: u64,
    pub misses: u64,
    /// 0.0 - 1.0
    pub hit_rate: f64,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "Cache: {}+{}/{} entries, {:.1}% hit rate ({} hits, {} misses)",
            self.name_entries,
            self.id_entries,
            self.capacity,
            self.hit_rate * 100.0,
            self.hits,
            self.misses
        )
    }
}
