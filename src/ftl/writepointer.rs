//! Write pointer and the free-block allocator collaborator.

use std::collections::VecDeque;

use crate::nand::Params;

/// Names the next physical page to be programmed.
#[derive(Debug, Clone, Copy, Default)]
pub struct WritePointer {
    pub ch: usize,
    pub lun: usize,
    pub blk: usize,
    pub pg: usize,
    /// Round-robin cursor over channels, consulted when a new block is
    /// needed from the allocator.
    next_ch_cursor: usize,
}

/// `bytefs_get_next_free_blk` collaborator: a per-channel queue of blocks
/// that have been erased (or never written) and are available to seat as
/// the write pointer's current block.
pub struct Allocator {
    free_blocks: Vec<VecDeque<usize>>,
}

impl Allocator {
    /// Seeds every channel's free list with its blocks in order; block 0 of
    /// channel 0/LUN 0 is popped immediately by the caller to seat the
    /// initial write pointer.
    pub fn new(params: &Params) -> Self {
        let mut free_blocks = vec![VecDeque::new(); params.nchs];
        for lun in 0..params.tt_luns() {
            let ch = lun / params.luns_per_ch;
            let lun_in_ch = lun % params.luns_per_ch;
            for blk in 0..params.blks_per_lun {
                let blk_idx = (ch * params.luns_per_ch + lun_in_ch) * params.blks_per_lun + blk;
                free_blocks[ch].push_back(blk_idx);
            }
        }
        Allocator { free_blocks }
    }

    pub fn free_block_count(&self) -> usize {
        self.free_blocks.iter().map(VecDeque::len).sum()
    }

    pub fn return_free_block(&mut self, ch: usize, blk_idx: usize) {
        self.free_blocks[ch].push_back(blk_idx);
    }

    pub fn reset(&mut self, params: &Params) {
        *self = Allocator::new(params);
    }
}

/// Decodes a flat block index into `(ch, lun_in_ch, blk)`.
fn decode_blk_idx(params: &Params, blk_idx: usize) -> (usize, usize, usize) {
    let lun_idx = blk_idx / params.blks_per_lun;
    let blk = blk_idx % params.blks_per_lun;
    let ch = lun_idx / params.luns_per_ch;
    let lun_in_ch = lun_idx % params.luns_per_ch;
    (ch, lun_in_ch, blk)
}

impl WritePointer {
    /// Pulls the initial block (channel 0) to seat the write pointer at
    /// construction time.
    pub fn seat_initial(allocator: &mut Allocator, params: &Params) -> Self {
        let blk_idx = allocator.free_blocks[0]
            .pop_front()
            .expect("fresh device must have at least one block per channel");
        let (ch, lun, blk) = decode_blk_idx(params, blk_idx);
        WritePointer {
            ch,
            lun,
            blk,
            pg: 0,
            next_ch_cursor: 1 % params.nchs,
        }
    }

    /// Round-robin search for the next free block, starting at the current
    /// cursor. Returns `(ch, lun, blk)`; advances the cursor on success.
    /// `None` signals free-block exhaustion.
    pub fn take_next_free_blk(
        &mut self,
        allocator: &mut Allocator,
        params: &Params,
    ) -> Option<(usize, usize, usize)> {
        for offset in 0..params.nchs {
            let ch = (self.next_ch_cursor + offset) % params.nchs;
            if let Some(blk_idx) = allocator.free_blocks[ch].pop_front() {
                self.next_ch_cursor = (ch + 1) % params.nchs;
                let (_, lun, blk) = decode_blk_idx(params, blk_idx);
                return Some((ch, lun, blk));
            }
        }
        None
    }
}
