//! Flat byte arena standing in for the physical NAND media.

use std::sync::Mutex;

use crate::constants::PGSZ;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

/// Page-indexed byte arena. Out of scope per the spec beyond a flat
/// `backend_rw(pgidx, buf, dir)` contract; a single coarse-grained mutex is
/// sufficient since callers only ever touch one page at a time and never
/// hold it across a latency-bearing operation.
pub struct Backend {
    bytes: Mutex<Vec<u8>>,
}

impl Backend {
    pub fn new(tt_pgs: usize) -> Self {
        Backend {
            bytes: Mutex::new(vec![0u8; tt_pgs * PGSZ]),
        }
    }

    pub fn rw(&self, pgidx: usize, buf: &mut [u8; PGSZ], dir: Direction) {
        let mut bytes = self.bytes.lock().unwrap();
        let start = pgidx * PGSZ;
        let slice = &mut bytes[start..start + PGSZ];
        match dir {
            Direction::Read => buf.copy_from_slice(slice),
            Direction::Write => slice.copy_from_slice(buf),
        }
    }

    pub fn reset(&self) {
        let mut bytes = self.bytes.lock().unwrap();
        bytes.iter_mut().for_each(|b| *b = 0);
    }
}
