//! Fully-associative LRU page cache: doubly-linked free/LRU list of `N`
//! entries plus the Robin-Hood buffer metadata table for `lpn → slot`
//! lookup.

use crate::cache::robinhood::RobinHoodMap;
use crate::cache::{CacheStats, PageCache};
use crate::constants::PGSZ;

const NIL: usize = usize::MAX;

struct Slot {
    lpn: Option<u64>,
    dirty: bool,
    data: [u8; PGSZ],
    prev: usize,
    next: usize,
}

/// `head` is the least-recently-used end (next eviction candidate); `tail`
/// is the most-recently-used end.
pub struct FullyAssociativeLruCache {
    slots: Vec<Slot>,
    index: RobinHoodMap,
    head: usize,
    tail: usize,
    stats: CacheStats,
}

impl FullyAssociativeLruCache {
    pub fn new(entry_count: usize) -> Self {
        assert!(entry_count > 0);
        let mut slots = Vec::with_capacity(entry_count);
        for i in 0..entry_count {
            slots.push(Slot {
                lpn: None,
                dirty: false,
                data: [0u8; PGSZ],
                prev: if i == 0 { NIL } else { i - 1 },
                next: if i + 1 == entry_count { NIL } else { i + 1 },
            });
        }
        FullyAssociativeLruCache {
            slots,
            index: RobinHoodMap::with_entry_count(entry_count),
            head: 0,
            tail: entry_count - 1,
            stats: CacheStats::default(),
        }
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = (self.slots[slot].prev, self.slots[slot].next);
        if prev != NIL {
            self.slots[prev].next = next;
        } else {
            self.head = next;
        }
        if next != NIL {
            self.slots[next].prev = prev;
        } else {
            self.tail = prev;
        }
    }

    fn push_tail(&mut self, slot: usize) {
        self.slots[slot].prev = self.tail;
        self.slots[slot].next = NIL;
        if self.tail != NIL {
            self.slots[self.tail].next = slot;
        } else {
            self.head = slot;
        }
        self.tail = slot;
    }

    fn move_to_tail(&mut self, slot: usize) {
        if self.tail == slot {
            return;
        }
        self.unlink(slot);
        self.push_tail(slot);
    }
}

impl PageCache for FullyAssociativeLruCache {
    fn lookup(&mut self, lpn: u64) -> Option<usize> {
        let found = self.index.get(lpn);
        if found.is_some() {
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;
        }
        found
    }

    fn touch(&mut self, slot: usize) {
        self.move_to_tail(slot);
    }

    fn mark_dirty(&mut self, slot: usize) {
        self.slots[slot].dirty = true;
    }

    fn is_dirty(&self, slot: usize) -> bool {
        self.slots[slot].dirty
    }

    fn reserve_slot(&mut self, _lpn: u64) -> (usize, Option<(u64, bool)>) {
        let slot = self.head;
        let evicted = self.slots[slot].lpn.map(|old_lpn| {
            let dirty = self.slots[slot].dirty;
            self.index.remove(old_lpn);
            (old_lpn, dirty)
        });
        self.slots[slot].lpn = None;
        self.slots[slot].dirty = false;
        // Detach from the list entirely so a concurrent reservation (after
        // this cache lock is released for the caller's NAND round-trip and
        // reacquired elsewhere) can't pick the same slot again before
        // `bind` reinserts it.
        self.unlink(slot);
        (slot, evicted)
    }

    fn bind(&mut self, slot: usize, lpn: u64) {
        self.slots[slot].lpn = Some(lpn);
        self.index.insert(lpn, slot);
        self.push_tail(slot);
    }

    fn slot_bytes(&self, slot: usize) -> &[u8; PGSZ] {
        &self.slots[slot].data
    }

    fn slot_bytes_mut(&mut self, slot: usize) -> &mut [u8; PGSZ] {
        &mut self.slots[slot].data
    }

    fn stats(&self) -> CacheStats {
        self.stats
    }

    fn reset(&mut self) {
        let n = self.slots.len();
        *self = FullyAssociativeLruCache::new(n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_bind_hit_roundtrip() {
        let mut cache = FullyAssociativeLruCache::new(2);
        assert_eq!(cache.lookup(10), None);
        let (slot, evicted) = cache.reserve_slot(10);
        assert!(evicted.is_none());
        cache.bind(slot, 10);
        assert_eq!(cache.lookup(10), Some(slot));
    }

    #[test]
    fn eviction_picks_least_recently_used() {
        let mut cache = FullyAssociativeLruCache::new(2);
        let (s0, _) = cache.reserve_slot(0);
        cache.bind(s0, 0);
        let (s1, _) = cache.reserve_slot(1);
        cache.bind(s1, 1);
        // Touch 0 so it becomes most-recently-used; 1 should be evicted next.
        let slot0 = cache.lookup(0).unwrap();
        cache.touch(slot0);
        let (_, evicted) = cache.reserve_slot(2);
        assert_eq!(evicted.map(|(lpn, _)| lpn), Some(1));
    }

    #[test]
    fn dirty_eviction_reports_dirty() {
        let mut cache = FullyAssociativeLruCache::new(1);
        let (slot, _) = cache.reserve_slot(0);
        cache.bind(slot, 0);
        cache.mark_dirty(slot);
        let (_, evicted) = cache.reserve_slot(1);
        assert_eq!(evicted, Some((0, true)));
    }
}
