//! Logical→physical map (`maptbl`) and its reverse (`rmap`).

use crate::constants::{INVALID_LPN, UNMAPPED_PPA};

/// `maptbl[lpn] -> realppa` and `rmap[realppa] -> lpn`, kept mutually
/// consistent by callers under the allocation mutex.
pub struct MapTable {
    maptbl: Vec<u64>,
    rmap: Vec<u64>,
}

impl MapTable {
    pub fn new(tt_pgs: usize) -> Self {
        MapTable {
            maptbl: vec![UNMAPPED_PPA; tt_pgs],
            rmap: vec![INVALID_LPN; tt_pgs],
        }
    }

    pub fn get_maptbl_ent(&self, lpn: u64) -> u64 {
        assert!((lpn as usize) < self.maptbl.len(), "lpn out of range");
        self.maptbl[lpn as usize]
    }

    pub fn set_maptbl_ent(&mut self, lpn: u64, ppa: u64) {
        assert!((lpn as usize) < self.maptbl.len(), "lpn out of range");
        self.maptbl[lpn as usize] = ppa;
    }

    pub fn get_rmap_ent(&self, realppa: u64) -> u64 {
        assert!((realppa as usize) < self.rmap.len(), "ppa out of range");
        self.rmap[realppa as usize]
    }

    pub fn set_rmap_ent(&mut self, lpn: u64, realppa: u64) {
        assert!((realppa as usize) < self.rmap.len(), "ppa out of range");
        self.rmap[realppa as usize] = lpn;
    }

    pub fn clear_rmap_ent(&mut self, realppa: u64) {
        self.set_rmap_ent(INVALID_LPN, realppa);
    }

    pub fn reset(&mut self) {
        self.maptbl.iter_mut().for_each(|e| *e = UNMAPPED_PPA);
        self.rmap.iter_mut().for_each(|e| *e = INVALID_LPN);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_table_is_entirely_unmapped() {
        let table = MapTable::new(4);
        for lpn in 0..4 {
            assert_eq!(table.get_maptbl_ent(lpn), UNMAPPED_PPA);
        }
        for ppa in 0..4 {
            assert_eq!(table.get_rmap_ent(ppa), INVALID_LPN);
        }
    }

    #[test]
    fn mutual_consistency_round_trip() {
        let mut table = MapTable::new(4);
        table.set_maptbl_ent(2, 3);
        table.set_rmap_ent(2, 3);
        assert_eq!(table.get_maptbl_ent(2), 3);
        assert_eq!(table.get_rmap_ent(3), 2);
    }

    #[test]
    #[should_panic]
    fn out_of_range_lpn_asserts() {
        let table = MapTable::new(4);
        table.get_maptbl_ent(4);
    }
}
