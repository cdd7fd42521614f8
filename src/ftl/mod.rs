//! The FTL and cache engine: NAND state, address tables, write pointer,
//! latency model, and the DRAM buffer, composed behind the three mutex
//! regions the spec names (buffer index, LUN busy windows, allocation).

pub mod alloc;
pub mod checksum;
pub mod gc;
pub mod latency;
pub mod maptbl;
pub mod writepointer;

use std::sync::Mutex;

use crate::cache::{build_cache, CacheOrg, CacheStats, PageCache};
use crate::constants::{is_unmapped_realppa, PGSZ};
use crate::ftl::alloc::AllocState;
use crate::ftl::gc::GarbageCollector;
use crate::ftl::latency::{LatencyModel, NandOp};
use crate::nand::backend::{Backend, Direction};
use crate::nand::Params;

/// Construction-time sizing for the DRAM buffer, independent of NAND
/// geometry.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub org: CacheOrg,
    pub entry_count: usize,
    pub num_sets: usize,
    pub num_ways: usize,
}

pub struct Ssd {
    pub params: Params,
    alloc: Mutex<AllocState>,
    latency: LatencyModel,
    backend: Backend,
    cache: Mutex<Box<dyn PageCache>>,
    cache_cfg: CacheConfig,
    gc: Box<dyn GarbageCollector>,
}

impl Ssd {
    pub fn new(params: Params, cache_cfg: CacheConfig, gc: Box<dyn GarbageCollector>) -> anyhow::Result<Self> {
        params.validate()?;
        let tt_pgs = params.tt_pgs();
        Ok(Ssd {
            alloc: Mutex::new(AllocState::new(&params)),
            latency: LatencyModel::new(&params),
            backend: Backend::new(tt_pgs),
            cache: Mutex::new(build_cache(
                cache_cfg.org,
                cache_cfg.entry_count,
                cache_cfg.num_sets,
                cache_cfg.num_ways,
            )),
            cache_cfg,
            gc,
            params,
        })
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.lock().unwrap().stats()
    }

    /// `ssd_reset`: all tables, the write pointer, the cache, and NAND
    /// contents return to their post-init state.
    pub fn reset(&self) {
        self.alloc.lock().unwrap().reset(&self.params);
        self.latency.reset();
        self.backend.reset();
        let mut cache = self.cache.lock().unwrap();
        *cache = build_cache(
            self.cache_cfg.org,
            self.cache_cfg.entry_count,
            self.cache_cfg.num_sets,
            self.cache_cfg.num_ways,
        );
    }

    // ---- Block (page-aligned) read/write paths: spec §4.3 ----

    /// Writes `nlb` whole pages starting at logical page `lba`. `buf` must
    /// hold exactly `nlb * PGSZ` bytes. Returns the request latency (the
    /// maximum per-page latency).
    pub fn ssd_write(&self, lba: u64, nlb: u64, buf: &[u8], stime: u64) -> u64 {
        assert_eq!(buf.len(), nlb as usize * PGSZ);
        let mut max_lat = 0u64;
        let mut alloc = self.alloc.lock().unwrap();
        for i in 0..nlb {
            let lpn = lba + i;
            let mut page = [0u8; PGSZ];
            page.copy_from_slice(&buf[(i as usize) * PGSZ..(i as usize + 1) * PGSZ]);
            let (_, lat) = alloc.write_lpn(
                &self.params,
                &self.latency,
                &self.backend,
                lpn,
                &page,
                stime,
                self.gc.as_ref(),
            );
            max_lat = max_lat.max(lat);
        }
        max_lat
    }

    /// Reads `nlb` whole pages starting at logical page `lba` into `buf`.
    /// Unmapped or invalid LPNs are skipped; their region of `buf` is left
    /// untouched (spec §9, resolved open question). Returns the request
    /// latency (maximum per-page latency, 0 if every page was skipped).
    pub fn ssd_read(&self, lba: u64, nlb: u64, buf: &mut [u8], stime: u64) -> u64 {
        assert_eq!(buf.len(), nlb as usize * PGSZ);
        let mut max_lat = 0u64;
        for i in 0..nlb {
            let lpn = lba + i;
            let resolved = {
                let alloc = self.alloc.lock().unwrap();
                let realppa = alloc.maptbl.get_maptbl_ent(lpn);
                if is_unmapped_realppa(realppa) {
                    None
                } else {
                    let composite = crate::nand::pgidx2ppa(&self.params, realppa as usize);
                    let blk_idx = composite.blk_idx(&self.params);
                    let status = alloc.blocks[blk_idx].pages[composite.pg].status;
                    if !matches!(status, crate::nand::PageStatus::Valid) {
                        None
                    } else {
                        let lun_idx = composite.lun_idx(&self.params);
                        let stored_csum = alloc.blocks[blk_idx].read_csum(composite.pg);
                        Some((realppa, lun_idx, stored_csum))
                    }
                }
            };
            let Some((realppa, lun_idx, stored_csum)) = resolved else {
                continue;
            };
            let lat = self
                .latency
                .advance_status(&self.params, lun_idx, NandOp::Read, stime);
            let mut page = [0u8; PGSZ];
            self.backend.rw(realppa as usize, &mut page, Direction::Read);
            let csum = checksum::page_crc32c(&page);
            if csum != stored_csum {
                log::warn!(
                    "CRC mismatch reading lpn={lpn} ppa={realppa}: expected {stored_csum:#x}, got {csum:#x}"
                );
            }
            buf[(i as usize) * PGSZ..(i as usize + 1) * PGSZ].copy_from_slice(&page);
            max_lat = max_lat.max(lat);
        }
        max_lat
    }

    // ---- Byte-addressable cache-backed path: spec §4.4 ----

    /// `write_buffer`: writes `size` bytes at byte offset `lpn * PGSZ +
    /// offset`, walking however many pages the range spans. Returns the
    /// maximum per-page latency.
    pub fn write_buffer(&self, lpn: u64, offset: usize, data: &[u8], stime: u64) -> u64 {
        if data.is_empty() {
            return 0;
        }
        let mut max_lat = 0u64;
        let mut cur_lpn = lpn;
        let mut cur_offset = offset;
        let mut pos = 0usize;
        while pos < data.len() {
            let take = (PGSZ - cur_offset).min(data.len() - pos);
            let lat = self.buffer_page_txn(cur_lpn, cur_offset, stime, |slot_bytes| {
                slot_bytes[cur_offset..cur_offset + take].copy_from_slice(&data[pos..pos + take]);
                true
            });
            max_lat = max_lat.max(lat);
            pos += take;
            cur_lpn += 1;
            cur_offset = 0;
        }
        max_lat
    }

    /// `read_buffer`: symmetric to [`write_buffer`](Ssd::write_buffer).
    pub fn read_buffer(&self, lpn: u64, offset: usize, data: &mut [u8], stime: u64) -> u64 {
        if data.is_empty() {
            return 0;
        }
        let mut max_lat = 0u64;
        let mut cur_lpn = lpn;
        let mut cur_offset = offset;
        let mut pos = 0usize;
        while pos < data.len() {
            let take = (PGSZ - cur_offset).min(data.len() - pos);
            let mut out = [0u8; PGSZ];
            let lat = self.buffer_page_txn(cur_lpn, cur_offset, stime, |slot_bytes| {
                out[cur_offset..cur_offset + take].copy_from_slice(&slot_bytes[cur_offset..cur_offset + take]);
                false
            });
            data[pos..pos + take].copy_from_slice(&out[cur_offset..cur_offset + take]);
            max_lat = max_lat.max(lat);
            pos += take;
            cur_lpn += 1;
            cur_offset = 0;
        }
        max_lat
    }

    /// One page's worth of the buffer walk (spec §4.4 steps 1-5). `apply`
    /// is handed the slot's byte buffer to splice the user's partial-page
    /// copy into (for reads, it copies out instead and returns `false` so
    /// the slot isn't marked dirty).
    fn buffer_page_txn(
        &self,
        lpn: u64,
        offset: usize,
        stime: u64,
        apply: impl FnOnce(&mut [u8; PGSZ]) -> bool,
    ) -> u64 {
        let mut cache = self.cache.lock().unwrap();
        if let Some(slot) = cache.lookup(lpn) {
            let is_write = apply(cache.slot_bytes_mut(slot));
            if is_write {
                cache.mark_dirty(slot);
            }
            cache.touch(slot);
            return 0;
        }

        let (slot, evicted) = cache.reserve_slot(lpn);
        let evicted_bytes = evicted
            .as_ref()
            .filter(|(_, dirty)| *dirty)
            .map(|_| *cache.slot_bytes(slot));
        drop(cache);

        let mut total_lat = 0u64;
        if let Some((old_lpn, dirty)) = evicted {
            if dirty {
                let bytes = evicted_bytes.expect("dirty eviction must have captured bytes");
                let (_, lat) = self.alloc.lock().unwrap().write_lpn(
                    &self.params,
                    &self.latency,
                    &self.backend,
                    old_lpn,
                    &bytes,
                    stime,
                    self.gc.as_ref(),
                );
                total_lat = total_lat.max(lat);
            }
        }

        let mut page = [0u8; PGSZ];
        let promote = {
            let alloc = self.alloc.lock().unwrap();
            let realppa = alloc.maptbl.get_maptbl_ent(lpn);
            if is_unmapped_realppa(realppa) {
                None
            } else {
                Some((realppa, alloc.ppa_lun_idx(&self.params, realppa)))
            }
        };
        if let Some((realppa, lun_idx)) = promote {
            let lat = self
                .latency
                .advance_status(&self.params, lun_idx, NandOp::Read, stime);
            self.backend.rw(realppa as usize, &mut page, Direction::Read);
            total_lat = total_lat.max(lat);
        }

        let mut cache = self.cache.lock().unwrap();
        cache.bind(slot, lpn);
        *cache.slot_bytes_mut(slot) = page;
        let is_write = apply(cache.slot_bytes_mut(slot));
        if is_write {
            cache.mark_dirty(slot);
        }
        cache.touch(slot);

        total_lat
    }
}
