use std::collections::BTreeMap;

use crate::coord::TileCoord;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TileKey {
    /// Source identity, e.g. the style id or `"osm"`.
    pub source: String,
    pub coord: TileCoord,
}

impl TileKey {
    pub fn new(source: impl Into<String>, coord: TileCoord) -> Self {
        Self {
            source: source.into(),
            coord,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    #[error("tile too large for budget: requested={requested} max={max}")]
    BudgetExceeded { requested: usize, max: usize },
    #[error("unknown tile")]
    UnknownKey,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    bytes: Vec<u8>,
    last_used_tick: u64,
    pin_count: u32,
}

/// Byte-budgeted tile cache.
///
/// Notes on determinism:
/// - Entries are keyed in a `BTreeMap` for stable traversal order.
/// - Eviction is LRU by `last_used_tick`, with a tie-break by key ordering.
/// - Pinned (visible) tiles are evicted only when nothing else is left.
#[derive(Debug)]
pub struct TileCache {
    max_bytes: usize,
    used_bytes: usize,
    tick: u64,
    entries: BTreeMap<TileKey, CacheEntry>,
}

impl TileCache {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            used_bytes: 0,
            tick: 0,
            entries: BTreeMap::new(),
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn used_bytes(&self) -> usize {
        self.used_bytes
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &TileKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Cached bytes; counts as a use for LRU purposes.
    pub fn get(&mut self, key: &TileKey) -> Option<&[u8]> {
        self.tick += 1;
        let entry = self.entries.get_mut(key)?;
        entry.last_used_tick = self.tick;
        Some(entry.bytes.as_slice())
    }

    /// Stores a tile, evicting older ones to stay within budget.
    ///
    /// Returns the evicted keys in eviction order.
    pub fn insert(&mut self, key: TileKey, bytes: Vec<u8>) -> Result<Vec<TileKey>, CacheError> {
        if bytes.len() > self.max_bytes {
            return Err(CacheError::BudgetExceeded {
                requested: bytes.len(),
                max: self.max_bytes,
            });
        }
        self.tick += 1;
        let size = bytes.len();
        let pin_count = match self.entries.remove(&key) {
            Some(old) => {
                self.used_bytes = self.used_bytes.saturating_sub(old.bytes.len());
                old.pin_count
            }
            None => 0,
        };
        self.entries.insert(
            key.clone(),
            CacheEntry {
                bytes,
                last_used_tick: self.tick,
                pin_count,
            },
        );
        self.used_bytes += size;
        Ok(self.evict_as_needed(&key))
    }

    pub fn pin(&mut self, key: &TileKey) -> Result<(), CacheError> {
        let entry = self.entries.get_mut(key).ok_or(CacheError::UnknownKey)?;
        entry.pin_count = entry.pin_count.saturating_add(1);
        Ok(())
    }

    pub fn unpin(&mut self, key: &TileKey) -> Result<(), CacheError> {
        let entry = self.entries.get_mut(key).ok_or(CacheError::UnknownKey)?;
        entry.pin_count = entry.pin_count.saturating_sub(1);
        Ok(())
    }

    pub fn remove(&mut self, key: &TileKey) -> bool {
        match self.entries.remove(key) {
            Some(e) => {
                self.used_bytes = self.used_bytes.saturating_sub(e.bytes.len());
                true
            }
            None => false,
        }
    }

    /// Drops every tile of `source` (a style switch invalidates its tiles).
    pub fn clear_source(&mut self, source: &str) -> usize {
        let keys: Vec<TileKey> = self
            .entries
            .keys()
            .filter(|k| k.source == source)
            .cloned()
            .collect();
        for k in &keys {
            self.remove(k);
        }
        keys.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.used_bytes = 0;
    }

    fn evict_as_needed(&mut self, protected: &TileKey) -> Vec<TileKey> {
        let mut evicted = Vec::new();
        while self.used_bytes > self.max_bytes {
            let pick = |allow_pinned: bool| {
                self.entries
                    .iter()
                    .filter(|(k, e)| *k != protected && (allow_pinned || e.pin_count == 0))
                    .min_by(|(ka, ea), (kb, eb)| {
                        ea.last_used_tick
                            .cmp(&eb.last_used_tick)
                            .then_with(|| ka.cmp(kb))
                    })
                    .map(|(k, _)| k.clone())
            };
            let Some(key) = pick(false).or_else(|| pick(true)) else {
                break;
            };
            self.remove(&key);
            evicted.push(key);
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::{CacheError, TileCache, TileKey};
    use crate::coord::TileCoord;

    fn key(x: u32) -> TileKey {
        TileKey::new("osm", TileCoord::new(4, x, 0))
    }

    #[test]
    fn lru_eviction_is_deterministic() {
        let mut cache = TileCache::new(10);
        cache.insert(key(1), vec![0; 6]).unwrap();
        let evicted = cache.insert(key(2), vec![0; 6]).unwrap();

        // Total 12 > 10, so the older tile goes.
        assert_eq!(evicted, vec![key(1)]);
        assert!(cache.contains(&key(2)));
        assert!(cache.used_bytes() <= cache.max_bytes());
    }

    #[test]
    fn get_refreshes_recency() {
        let mut cache = TileCache::new(12);
        cache.insert(key(1), vec![0; 4]).unwrap();
        cache.insert(key(2), vec![0; 4]).unwrap();
        assert!(cache.get(&key(1)).is_some());
        let evicted = cache.insert(key(3), vec![0; 8]).unwrap();
        assert_eq!(evicted, vec![key(2)]);
    }

    #[test]
    fn pinned_tiles_survive_while_possible() {
        let mut cache = TileCache::new(10);
        cache.insert(key(1), vec![0; 4]).unwrap();
        cache.pin(&key(1)).unwrap();
        cache.insert(key(2), vec![0; 4]).unwrap();
        let evicted = cache.insert(key(3), vec![0; 4]).unwrap();
        assert_eq!(evicted, vec![key(2)]);
        assert!(cache.contains(&key(1)));
    }

    #[test]
    fn oversized_tiles_are_rejected() {
        let mut cache = TileCache::new(4);
        assert_eq!(
            cache.insert(key(1), vec![0; 5]),
            Err(CacheError::BudgetExceeded {
                requested: 5,
                max: 4
            })
        );
    }

    #[test]
    fn clear_source_drops_only_that_source() {
        let mut cache = TileCache::new(100);
        cache.insert(key(1), vec![0; 4]).unwrap();
        cache
            .insert(TileKey::new("mapbox/dark-v11", TileCoord::new(4, 1, 0)), vec![0; 4])
            .unwrap();
        assert_eq!(cache.clear_source("osm"), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.used_bytes(), 4);
    }
}
