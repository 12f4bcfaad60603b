//! Path-keyed LRU cache for stat records.
//!
//! Keys are absolute, normalized remote paths. The cache is bounded by
//! `size_limit` and optionally by `max_age`; when disabled it behaves
//! as if permanently empty without losing its contents.

use crate::error::{FtpError, FtpResult};
use crate::types::{CacheStats, StatRecord};
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

pub const DEFAULT_SIZE_LIMIT: usize = 5000;

struct CacheNode {
    record: StatRecord,
    inserted: Instant,
    /// Key into the LRU order map; larger means more recently used.
    used: u64,
}

/// Bounded LRU cache of stat records.
pub struct StatCache {
    entries: HashMap<String, CacheNode>,
    /// Use-sequence → path, ordered least-recently-used first.
    order: BTreeMap<u64, String>,
    sequence: u64,
    size_limit: usize,
    max_age: Option<f64>,
    enabled: bool,
}

impl StatCache {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: BTreeMap::new(),
            sequence: 0,
            size_limit: DEFAULT_SIZE_LIMIT,
            max_age: None,
            enabled: true,
        }
    }

    // ─── Configuration ───────────────────────────────────────────

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    /// Make every lookup miss and every insert a no-op. The existing
    /// contents are kept and become visible again on `enable`.
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn size_limit(&self) -> usize {
        self.size_limit
    }

    /// Change the size bound, evicting least-recently-used entries if
    /// the cache is now over it.
    pub fn resize(&mut self, size_limit: usize) -> FtpResult<()> {
        if size_limit == 0 {
            return Err(FtpError::permanent("cache size limit must be at least 1"));
        }
        self.size_limit = size_limit;
        self.evict_to_limit();
        Ok(())
    }

    pub fn max_age(&self) -> Option<f64> {
        self.max_age
    }

    /// Entries older than `max_age` seconds are treated as absent.
    pub fn set_max_age(&mut self, max_age: Option<f64>) {
        self.max_age = max_age;
    }

    // ─── Operations ──────────────────────────────────────────────

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&mut self, path: &str) -> Option<StatRecord> {
        if !self.enabled {
            return None;
        }
        let expired = match self.entries.get(path) {
            None => return None,
            Some(node) => match self.max_age {
                Some(max_age) => node.inserted.elapsed().as_secs_f64() > max_age,
                None => false,
            },
        };
        if expired {
            self.remove(path);
            return None;
        }
        self.sequence += 1;
        let sequence = self.sequence;
        let node = self.entries.get_mut(path)?;
        self.order.remove(&node.used);
        node.used = sequence;
        self.order.insert(sequence, path.to_string());
        Some(node.record.clone())
    }

    pub fn put(&mut self, path: &str, record: StatRecord) {
        if !self.enabled {
            return;
        }
        self.remove(path);
        self.sequence += 1;
        self.order.insert(self.sequence, path.to_string());
        self.entries.insert(
            path.to_string(),
            CacheNode {
                record,
                inserted: Instant::now(),
                used: self.sequence,
            },
        );
        self.evict_to_limit();
    }

    /// Drop the entry for `path`, if cached.
    pub fn invalidate(&mut self, path: &str) {
        if !self.enabled {
            return;
        }
        self.remove(path);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            size_limit: self.size_limit,
            enabled: self.enabled,
        }
    }

    // ─── Internals ───────────────────────────────────────────────

    fn remove(&mut self, path: &str) {
        if let Some(node) = self.entries.remove(path) {
            self.order.remove(&node.used);
        }
    }

    fn evict_to_limit(&mut self) {
        while self.entries.len() > self.size_limit {
            let Some((&oldest, _)) = self.order.iter().next() else {
                break;
            };
            if let Some(path) = self.order.remove(&oldest) {
                self.entries.remove(&path);
            }
        }
    }
}

impl Default for StatCache {
    fn default() -> Self {
        Self::new()
    }
}
