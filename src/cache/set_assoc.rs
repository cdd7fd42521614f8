//! Set-associative page cache: random-within-set eviction, no explicit
//! dirty bit (every eviction writes back unconditionally).

use rand::Rng;

use crate::cache::{CacheStats, PageCache};
use crate::constants::PGSZ;

pub struct SetAssociativeCache {
    data: Vec<[u8; PGSZ]>,
    tags: Vec<Option<u64>>,
    num_sets: usize,
    num_ways: usize,
    stats: CacheStats,
}

impl SetAssociativeCache {
    pub fn new(num_sets: usize, num_ways: usize) -> Self {
        assert!(num_sets > 0 && num_ways > 0);
        let n = num_sets * num_ways;
        SetAssociativeCache {
            data: vec![[0u8; PGSZ]; n],
            tags: vec![None; n],
            num_sets,
            num_ways,
            stats: CacheStats::default(),
        }
    }

    fn set_of(&self, lpn: u64) -> usize {
        (lpn as usize) % self.num_sets
    }
}

impl PageCache for SetAssociativeCache {
    fn lookup(&mut self, lpn: u64) -> Option<usize> {
        let set = self.set_of(lpn);
        let base = set * self.num_ways;
        let found = (0..self.num_ways).find(|&way| self.tags[base + way] == Some(lpn));
        if found.is_some() {
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;
        }
        found.map(|way| base + way)
    }

    fn touch(&mut self, _slot: usize) {
        // No recency notion under random-within-set replacement.
    }

    fn mark_dirty(&mut self, _slot: usize) {
        // Every slot is implicitly dirty; write-back happens unconditionally
        // on eviction.
    }

    fn is_dirty(&self, slot: usize) -> bool {
        self.tags[slot].is_some()
    }

    fn reserve_slot(&mut self, lpn: u64) -> (usize, Option<(u64, bool)>) {
        let set = self.set_of(lpn);
        let base = set * self.num_ways;
        let way = rand::thread_rng().gen_range(0..self.num_ways);
        let slot = base + way;
        let evicted = self.tags[slot].map(|old_lpn| (old_lpn, true));
        self.tags[slot] = None;
        (slot, evicted)
    }

    fn bind(&mut self, slot: usize, lpn: u64) {
        self.tags[slot] = Some(lpn);
    }

    fn slot_bytes(&self, slot: usize) -> &[u8; PGSZ] {
        &self.data[slot]
    }

    fn slot_bytes_mut(&mut self, slot: usize) -> &mut [u8; PGSZ] {
        &mut self.data[slot]
    }

    fn stats(&self) -> CacheStats {
        self.stats
    }

    fn reset(&mut self) {
        self.tags.iter_mut().for_each(|t| *t = None);
        self.data.iter_mut().for_each(|d| *d = [0u8; PGSZ]);
        self.stats = CacheStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_then_bind_then_hit() {
        let mut cache = SetAssociativeCache::new(2, 1);
        assert_eq!(cache.lookup(0), None);
        let (slot, evicted) = cache.reserve_slot(0);
        assert!(evicted.is_none());
        cache.bind(slot, 0);
        assert_eq!(cache.lookup(0), Some(slot));
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn single_way_set_always_evicts_resident() {
        let mut cache = SetAssociativeCache::new(1, 1);
        let (slot0, _) = cache.reserve_slot(0);
        cache.bind(slot0, 0);
        let (slot1, evicted) = cache.reserve_slot(1);
        assert_eq!(slot1, slot0);
        assert_eq!(evicted, Some((0, true)));
    }
}
