//! The page-level DRAM cache ("tobssd buffer"): one trait, two
//! interchangeable organizations.

pub mod lru;
pub mod robinhood;
pub mod set_assoc;

pub use lru::FullyAssociativeLruCache;
pub use set_assoc::SetAssociativeCache;

use crate::constants::PGSZ;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Unifies the set-associative and fully-associative LRU engines so the
/// byte path is written once (spec §9 "Two cache organizations").
pub trait PageCache: Send {
    /// Looks up `lpn`'s resident slot, if any, and records a hit/miss.
    fn lookup(&mut self, lpn: u64) -> Option<usize>;
    /// Updates recency on a hit (no-op for the set-associative engine).
    fn touch(&mut self, slot: usize);
    fn mark_dirty(&mut self, slot: usize);
    fn is_dirty(&self, slot: usize) -> bool;
    /// Picks a slot to bind `lpn` to. If the slot was already bound to a
    /// different LPN, that binding is removed from the index and reported
    /// back (with its dirty flag) so the caller can write it back outside
    /// the cache lock; the slot itself is left unbound until [`bind`] is
    /// called.
    ///
    /// [`bind`]: PageCache::bind
    fn reserve_slot(&mut self, lpn: u64) -> (usize, Option<(u64, bool)>);
    /// Finalizes a slot's binding to `lpn`, after any write-back and/or
    /// promotion has completed.
    fn bind(&mut self, slot: usize, lpn: u64);
    fn slot_bytes(&self, slot: usize) -> &[u8; PGSZ];
    fn slot_bytes_mut(&mut self, slot: usize) -> &mut [u8; PGSZ];
    fn stats(&self) -> CacheStats;
    fn reset(&mut self);
}

/// Construction-time choice of cache organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CacheOrg {
    SetAssociative,
    FullyAssociativeLru,
}

pub fn build_cache(
    org: CacheOrg,
    entry_count: usize,
    num_sets: usize,
    num_ways: usize,
) -> Box<dyn PageCache> {
    match org {
        CacheOrg::SetAssociative => Box::new(SetAssociativeCache::new(num_sets, num_ways)),
        CacheOrg::FullyAssociativeLru => Box::new(FullyAssociativeLruCache::new(entry_count)),
    }
}
