//! The allocation-mutex critical section: NAND block/page state, the
//! address tables, and the write pointer, bundled so every write path
//! (block, byte/cache-eviction, GC relocation) shares one invariant-
//! maintenance routine.

use crate::constants::PGSZ;
use crate::ftl::gc::GarbageCollector;
use crate::ftl::latency::{LatencyModel, NandOp};
use crate::ftl::maptbl::MapTable;
use crate::ftl::writepointer::{Allocator, WritePointer};
use crate::nand::backend::{Backend, Direction};
use crate::nand::{pgidx2ppa, ppa2pgidx, Block, Params, Ppa};

pub struct AllocState {
    /// Flat-indexed by `Ppa::blk_idx`.
    pub blocks: Vec<Block>,
    pub maptbl: MapTable,
    pub wp: WritePointer,
    pub allocator: Allocator,
}

impl AllocState {
    pub fn new(params: &Params) -> Self {
        let mut allocator = Allocator::new(params);
        let wp = WritePointer::seat_initial(&mut allocator, params);
        AllocState {
            blocks: vec![Block::new(params.pgs_per_blk); params.tt_blks()],
            maptbl: MapTable::new(params.tt_pgs()),
            wp,
            allocator,
        }
    }

    pub fn reset(&mut self, params: &Params) {
        self.blocks = vec![Block::new(params.pgs_per_blk); params.tt_blks()];
        self.maptbl.reset();
        self.allocator.reset(params);
        self.wp = WritePointer::seat_initial(&mut self.allocator, params);
    }

    pub fn current_blk_idx(&self, params: &Params) -> usize {
        Ppa {
            ch: self.wp.ch,
            lun: self.wp.lun,
            blk: self.wp.blk,
            pg: 0,
        }
        .blk_idx(params)
    }

    pub fn blk_pg_to_realppa(&self, params: &Params, blk_idx: usize, pg: usize) -> u64 {
        let ppa = pgidx2ppa(params, blk_idx * params.pgs_per_blk);
        ppa2pgidx(
            params,
            &Ppa {
                ch: ppa.ch,
                lun: ppa.lun,
                blk: ppa.blk,
                pg,
            },
        ) as u64
    }

    pub fn ppa_lun_idx(&self, params: &Params, realppa: u64) -> usize {
        pgidx2ppa(params, realppa as usize).lun_idx(params)
    }

    /// `get_new_page`: the PPA at the current write-pointer position,
    /// without advancing it.
    pub fn get_new_page(&self) -> Ppa {
        Ppa {
            ch: self.wp.ch,
            lun: self.wp.lun,
            blk: self.wp.blk,
            pg: self.wp.pg,
        }
    }

    /// Shared invariant-maintenance write path (spec §4.1): invalidate the
    /// old mapping if any, allocate a fresh PPA, program the page, and
    /// advance the write pointer. Used uniformly by block writes, cache
    /// evictions, and GC relocation so GC-candidate bookkeeping never gets
    /// skipped on any path.
    pub fn write_lpn(
        &mut self,
        params: &Params,
        latency: &LatencyModel,
        backend: &Backend,
        lpn: u64,
        data: &[u8; PGSZ],
        stime: u64,
        gc: &dyn GarbageCollector,
    ) -> (u64, u64) {
        let old_ppa = self.maptbl.get_maptbl_ent(lpn);
        if old_ppa != crate::constants::UNMAPPED_PPA {
            let old_composite = pgidx2ppa(params, old_ppa as usize);
            let old_blk_idx = old_composite.blk_idx(params);
            self.blocks[old_blk_idx].mark_page_invalid(old_composite.pg);
            self.maptbl.clear_rmap_ent(old_ppa);
        }

        let new_composite = self.get_new_page();
        let new_ppa = ppa2pgidx(params, &new_composite) as u64;
        self.maptbl.set_maptbl_ent(lpn, new_ppa);
        self.maptbl.set_rmap_ent(lpn, new_ppa);

        let new_blk_idx = new_composite.blk_idx(params);
        self.blocks[new_blk_idx].mark_page_valid(new_composite.pg);

        let lun_idx = new_composite.lun_idx(params);
        let lat = latency.advance_status(params, lun_idx, NandOp::Write, stime);

        let mut buf = *data;
        backend.rw(new_ppa as usize, &mut buf, Direction::Write);
        let csum = crate::ftl::checksum::page_crc32c(data);
        self.blocks[new_blk_idx].record_csum(new_composite.pg, csum);

        self.advance_write_pointer(params, latency, backend, gc);

        (new_ppa, lat)
    }

    /// `ssd_advance_write_pointer`.
    fn advance_write_pointer(
        &mut self,
        params: &Params,
        latency: &LatencyModel,
        backend: &Backend,
        gc: &dyn GarbageCollector,
    ) {
        self.wp.pg += 1;
        if self.wp.pg < params.pgs_per_blk {
            return;
        }

        let mut seated = self.wp.take_next_free_blk(&mut self.allocator, params);
        let mut attempts = 0;
        while seated.is_none() {
            attempts += 1;
            assert!(
                attempts <= params.tt_blks(),
                "free-block exhaustion: GC could not reclaim any block"
            );
            let mut ctx = crate::ftl::gc::GcCtx {
                params,
                alloc: self,
                latency,
                backend,
            };
            let reclaimed = gc.collect_one(&mut ctx);
            assert!(
                reclaimed,
                "free-block exhaustion: no GC candidate available"
            );
            seated = self.wp.take_next_free_blk(&mut self.allocator, params);
        }
        let (ch, lun, blk) = seated.unwrap();
        self.wp.ch = ch;
        self.wp.lun = lun;
        self.wp.blk = blk;
        self.wp.pg = 0;

        if gc.should_start(self.allocator.free_block_count(), params) {
            let mut ctx = crate::ftl::gc::GcCtx {
                params,
                alloc: self,
                latency,
                backend,
            };
            gc.collect_one(&mut ctx);
        }
    }

    /// `mark_block_free`, returning the erased block to the allocator. The
    /// erase latency updates the source LUN's busy window so subsequent
    /// operations on it queue correctly, but (per spec §4.3) is not added
    /// to the latency returned to the host request that triggered GC.
    pub fn erase_block(
        &mut self,
        params: &Params,
        latency: &LatencyModel,
        blk_idx: usize,
    ) {
        let ppa = pgidx2ppa(params, blk_idx * params.pgs_per_blk);
        let lun_idx = ppa.lun_idx(params);
        latency.advance_status(params, lun_idx, NandOp::Erase, 0);
        self.blocks[blk_idx].mark_free();
        self.allocator.return_free_block(ppa.ch, blk_idx);
    }
}
