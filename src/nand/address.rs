//! Physical page addressing: composite `{ch, lun, blk, pg}` and flat `realppa`.

/// Geometry parameters. Immutable once the device is constructed.
#[derive(Debug, Clone, Copy)]
pub struct Params {
    pub nchs: usize,
    pub luns_per_ch: usize,
    pub blks_per_lun: usize,
    pub pgs_per_blk: usize,
    pub pg_rd_lat_ns: u64,
    pub pg_wr_lat_ns: u64,
    pub blk_er_lat_ns: u64,
    /// Fraction of free blocks below which `bytefs_should_start_gc` fires.
    pub gc_thresh_pct: f64,
}

impl Params {
    pub fn tt_luns(&self) -> usize {
        self.nchs * self.luns_per_ch
    }

    pub fn tt_blks(&self) -> usize {
        self.tt_luns() * self.blks_per_lun
    }

    pub fn tt_pgs(&self) -> usize {
        self.tt_blks() * self.pgs_per_blk
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.nchs > 0, "nchs must be nonzero");
        anyhow::ensure!(self.luns_per_ch > 0, "luns_per_ch must be nonzero");
        anyhow::ensure!(self.blks_per_lun > 0, "blks_per_lun must be nonzero");
        anyhow::ensure!(self.pgs_per_blk > 0, "pgs_per_blk must be nonzero");
        anyhow::ensure!(
            self.gc_thresh_pct > 0.0 && self.gc_thresh_pct < 1.0,
            "gc_thresh_pct must be in (0, 1)"
        );
        Ok(())
    }
}

/// Composite physical page address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ppa {
    pub ch: usize,
    pub lun: usize,
    pub blk: usize,
    pub pg: usize,
}

impl Ppa {
    /// Flat LUN index, used to index the per-LUN status table.
    pub fn lun_idx(&self, params: &Params) -> usize {
        self.ch * params.luns_per_ch + self.lun
    }

    /// Flat block index, used to index per-block metadata.
    pub fn blk_idx(&self, params: &Params) -> usize {
        self.lun_idx(params) * params.blks_per_lun + self.blk
    }
}

/// Composite → flat conversion. Mirrors the collaborator's arithmetic form
/// rather than a fixed-width bit-pack, since channel/LUN/block/page counts
/// are runtime-configured and need not be powers of two.
pub fn ppa2pgidx(params: &Params, ppa: &Ppa) -> usize {
    let pgs_per_lun = params.pgs_per_blk * params.blks_per_lun;
    let pgs_per_ch = pgs_per_lun * params.luns_per_ch;
    ppa.ch * pgs_per_ch + ppa.lun * pgs_per_lun + ppa.blk * params.pgs_per_blk + ppa.pg
}

/// Flat → composite conversion, the inverse of [`ppa2pgidx`].
pub fn pgidx2ppa(params: &Params, pgidx: usize) -> Ppa {
    let mut rem = pgidx;
    let pgs_per_lun = params.pgs_per_blk * params.blks_per_lun;
    let pgs_per_ch = pgs_per_lun * params.luns_per_ch;

    let ch = rem / pgs_per_ch;
    rem %= pgs_per_ch;
    let lun = rem / pgs_per_lun;
    rem %= pgs_per_lun;
    let blk = rem / params.pgs_per_blk;
    let pg = rem % params.pgs_per_blk;

    Ppa { ch, lun, blk, pg }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_params() -> Params {
        Params {
            nchs: 2,
            luns_per_ch: 3,
            blks_per_lun: 4,
            pgs_per_blk: 5,
            pg_rd_lat_ns: 1,
            pg_wr_lat_ns: 2,
            blk_er_lat_ns: 3,
            gc_thresh_pct: 0.1,
        }
    }

    #[test]
    fn roundtrip_every_page() {
        let params = test_params();
        for idx in 0..params.tt_pgs() {
            let ppa = pgidx2ppa(&params, idx);
            assert_eq!(ppa2pgidx(&params, &ppa), idx);
        }
    }

    #[test]
    fn derived_totals() {
        let params = test_params();
        assert_eq!(params.tt_luns(), 6);
        assert_eq!(params.tt_blks(), 24);
        assert_eq!(params.tt_pgs(), 120);
    }

    #[test]
    fn composite_ordering_is_row_major() {
        let params = test_params();
        let first = pgidx2ppa(&params, 0);
        assert_eq!(first, Ppa { ch: 0, lun: 0, blk: 0, pg: 0 });
        let last = pgidx2ppa(&params, params.tt_pgs() - 1);
        assert_eq!(
            last,
            Ppa {
                ch: params.nchs - 1,
                lun: params.luns_per_ch - 1,
                blk: params.blks_per_lun - 1,
                pg: params.pgs_per_blk - 1,
            }
        );
    }
}
