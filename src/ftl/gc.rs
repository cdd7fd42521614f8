//! Garbage collection collaborator contract (`bytefs_should_start_gc`,
//! `bytefs_gc`), invoked only from `ssd_advance_write_pointer`.

use crate::ftl::alloc::AllocState;
use crate::ftl::latency::LatencyModel;
use crate::nand::backend::Backend;
use crate::nand::Params;

pub struct GcCtx<'a> {
    pub params: &'a Params,
    pub alloc: &'a mut AllocState,
    pub latency: &'a LatencyModel,
    pub backend: &'a Backend,
}

pub trait GarbageCollector: Send + Sync {
    fn should_start(&self, free_blk_count: usize, params: &Params) -> bool {
        (free_blk_count as f64) < params.gc_thresh_pct * params.tt_blks() as f64
    }

    /// Reclaim exactly one GC-candidate block: migrate its VALID pages
    /// (re-issuing writes through the same invariant-maintenance path used
    /// by the host write paths) and erase the source block. Returns `true`
    /// if a block was reclaimed, `false` if there was no GC candidate to
    /// pick (distinct from "no free blocks", which the caller treats as
    /// fatal exhaustion).
    fn collect_one(&self, ctx: &mut GcCtx) -> bool;
}

/// Greedy default: always reclaims the GC-candidate block with the most
/// invalid pages, maximizing pages freed per erase.
pub struct GreedyGc;

impl GarbageCollector for GreedyGc {
    fn collect_one(&self, ctx: &mut GcCtx) -> bool {
        let current_blk_idx = ctx.alloc.current_blk_idx(ctx.params);
        let victim = ctx
            .alloc
            .blocks
            .iter()
            .enumerate()
            .filter(|(idx, b)| b.gc_candidate && *idx != current_blk_idx)
            .max_by_key(|(_, b)| b.ipc)
            .map(|(idx, _)| idx);

        let Some(blk_idx) = victim else {
            return false;
        };

        let pgs_per_blk = ctx.params.pgs_per_blk;
        let valid_pages: Vec<usize> = (0..pgs_per_blk)
            .filter(|&pg| {
                matches!(
                    ctx.alloc.blocks[blk_idx].pages[pg].status,
                    crate::nand::PageStatus::Valid
                )
            })
            .collect();

        for pg in valid_pages {
            let realppa = ctx.alloc.blk_pg_to_realppa(ctx.params, blk_idx, pg);
            let lpn = ctx.alloc.maptbl.get_rmap_ent(realppa);
            debug_assert_ne!(lpn, crate::constants::INVALID_LPN);

            let mut buf = [0u8; crate::constants::PGSZ];
            let src_lun_idx = ctx.alloc.ppa_lun_idx(ctx.params, realppa);
            ctx.backend.rw(realppa as usize, &mut buf, crate::nand::backend::Direction::Read);
            ctx.latency.advance_status(
                ctx.params,
                src_lun_idx,
                crate::ftl::latency::NandOp::Read,
                0,
            );

            ctx.alloc
                .write_lpn(ctx.params, ctx.latency, ctx.backend, lpn, &buf, 0, self);
        }

        ctx.alloc.erase_block(ctx.params, ctx.latency, blk_idx);
        true
    }
}
