//! Buffer metadata table: an open-addressed `lpn → slot` hash with
//! Robin-Hood displacement on insertion and back-shift on deletion (spec
//! §4.4.1).

const EMPTY: u64 = u64::MAX;

#[derive(Clone, Copy)]
struct Entry {
    lpn: u64,
    slot: usize,
    psl: u32,
}

impl Entry {
    fn empty() -> Self {
        Entry {
            lpn: EMPTY,
            slot: 0,
            psl: 0,
        }
    }
}

pub struct RobinHoodMap {
    entries: Vec<Entry>,
    mask: usize,
    len: usize,
}

fn fibonacci_hash(lpn: u64) -> u64 {
    lpn.wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

impl RobinHoodMap {
    /// Capacity is rounded up to a power of two at least 2x `entry_count`,
    /// matching the spec's "capacity ≥ 2× buffer-entry count".
    pub fn with_entry_count(entry_count: usize) -> Self {
        let capacity = (entry_count.max(1) * 2).next_power_of_two();
        RobinHoodMap {
            entries: vec![Entry::empty(); capacity],
            mask: capacity - 1,
            len: 0,
        }
    }

    fn home(&self, lpn: u64) -> usize {
        (fibonacci_hash(lpn) as usize) & self.mask
    }

    pub fn get(&self, lpn: u64) -> Option<usize> {
        let mut idx = self.home(lpn);
        let mut psl = 0u32;
        loop {
            let e = &self.entries[idx];
            if e.lpn == EMPTY || psl > e.psl {
                return None;
            }
            if e.lpn == lpn {
                return Some(e.slot);
            }
            idx = (idx + 1) & self.mask;
            psl += 1;
        }
    }

    pub fn insert(&mut self, lpn: u64, slot: usize) {
        debug_assert!(
            self.len < self.entries.len(),
            "buffer metadata table overfull"
        );
        let mut cur = Entry { lpn, slot, psl: 0 };
        let mut idx = self.home(lpn);
        loop {
            let existing = self.entries[idx];
            if existing.lpn == EMPTY {
                self.entries[idx] = cur;
                self.len += 1;
                return;
            }
            if existing.lpn == cur.lpn {
                self.entries[idx] = cur;
                return;
            }
            if existing.psl < cur.psl {
                self.entries[idx] = cur;
                cur = existing;
            }
            idx = (idx + 1) & self.mask;
            cur.psl += 1;
        }
    }

    pub fn remove(&mut self, lpn: u64) -> bool {
        let mut idx = self.home(lpn);
        let mut psl = 0u32;
        loop {
            let e = self.entries[idx];
            if e.lpn == EMPTY || psl > e.psl {
                return false;
            }
            if e.lpn == lpn {
                break;
            }
            idx = (idx + 1) & self.mask;
            psl += 1;
        }
        // Back-shift the probe chain that follows.
        let mut cur = idx;
        loop {
            let next = (cur + 1) & self.mask;
            let next_entry = self.entries[next];
            if next_entry.lpn == EMPTY || next_entry.psl == 0 {
                self.entries[cur] = Entry::empty();
                break;
            }
            let mut shifted = next_entry;
            shifted.psl -= 1;
            self.entries[cur] = shifted;
            cur = next;
        }
        self.len -= 1;
        true
    }

    pub fn clear(&mut self) {
        self.entries.iter_mut().for_each(|e| *e = Entry::empty());
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_get() {
        let mut map = RobinHoodMap::with_entry_count(8);
        for lpn in 0..8 {
            map.insert(lpn, lpn as usize);
        }
        for lpn in 0..8 {
            assert_eq!(map.get(lpn), Some(lpn as usize));
        }
    }

    #[test]
    fn remove_then_miss() {
        let mut map = RobinHoodMap::with_entry_count(8);
        for lpn in 0..8 {
            map.insert(lpn, lpn as usize);
        }
        assert!(map.remove(3));
        assert_eq!(map.get(3), None);
        for lpn in [0, 1, 2, 4, 5, 6, 7] {
            assert_eq!(map.get(lpn), Some(lpn as usize));
        }
    }

    #[test]
    fn displacement_under_collisions() {
        let mut map = RobinHoodMap::with_entry_count(4);
        // Force probing by inserting many keys that commonly collide under
        // a small table.
        let keys: Vec<u64> = (0..8).collect();
        for (i, &k) in keys.iter().enumerate() {
            map.insert(k, i);
        }
        for (i, &k) in keys.iter().enumerate() {
            assert_eq!(map.get(k), Some(i));
        }
    }
}
