//! Command-line configuration: device geometry, cache sizing, and pipeline
//! tuning (spec §6 "Configuration").

use clap::Parser;

use crate::cache::CacheOrg;
use crate::ftl::CacheConfig;
use crate::nand::Params;
use crate::pipeline::DeviceConfig;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Byte-addressable SSD emulator", long_about = None)]
pub struct Args {
    /// NAND channels.
    #[arg(long, default_value_t = 8)]
    pub nchs: usize,
    /// LUNs per channel.
    #[arg(long, default_value_t = 2)]
    pub luns_per_ch: usize,
    /// Blocks per LUN.
    #[arg(long, default_value_t = 64)]
    pub blks_per_lun: usize,
    /// Pages per block.
    #[arg(long, default_value_t = 256)]
    pub pgs_per_blk: usize,
    /// Modeled page read latency, in nanoseconds.
    #[arg(long, default_value_t = 48_000)]
    pub pg_rd_lat_ns: u64,
    /// Modeled page write latency, in nanoseconds.
    #[arg(long, default_value_t = 200_000)]
    pub pg_wr_lat_ns: u64,
    /// Modeled block erase latency, in nanoseconds.
    #[arg(long, default_value_t = 3_000_000)]
    pub blk_er_lat_ns: u64,
    /// Free-block fraction below which garbage collection kicks in.
    #[arg(long, default_value_t = 0.1)]
    pub gc_thresh_pct: f64,

    /// DRAM page cache organization.
    #[arg(long, value_enum, default_value_t = CacheOrg::FullyAssociativeLru)]
    pub cache_org: CacheOrg,
    /// Fully-associative LRU cache entry count (ignored for set-associative).
    #[arg(long, default_value_t = 1024)]
    pub cache_entries: usize,
    /// Set-associative cache set count (ignored for fully-associative LRU).
    #[arg(long, default_value_t = 256)]
    pub cache_sets: usize,
    /// Set-associative cache ways per set (ignored for fully-associative LRU).
    #[arg(long, default_value_t = 4)]
    pub cache_ways: usize,

    /// Submission/completion ring depth.
    #[arg(long, default_value_t = 1024)]
    pub ring_capacity: usize,
    /// Maximum number of in-flight nowait completions the poller may hold.
    #[arg(long, default_value_t = 4096)]
    pub heap_capacity: usize,

    /// Pin the FTL worker thread to this CPU, if set.
    #[arg(long)]
    pub ftl_cpu: Option<usize>,
    /// Pin the poller thread to this CPU, if set.
    #[arg(long)]
    pub poller_cpu: Option<usize>,
}

impl Args {
    pub fn into_device_config(self) -> anyhow::Result<DeviceConfig> {
        let params = Params {
            nchs: self.nchs,
            luns_per_ch: self.luns_per_ch,
            blks_per_lun: self.blks_per_lun,
            pgs_per_blk: self.pgs_per_blk,
            pg_rd_lat_ns: self.pg_rd_lat_ns,
            pg_wr_lat_ns: self.pg_wr_lat_ns,
            blk_er_lat_ns: self.blk_er_lat_ns,
            gc_thresh_pct: self.gc_thresh_pct,
        };
        params.validate()?;
        anyhow::ensure!(self.ring_capacity > 0, "ring-capacity must be nonzero");
        anyhow::ensure!(self.heap_capacity > 0, "heap-capacity must be nonzero");

        Ok(DeviceConfig {
            params,
            cache: CacheConfig {
                org: self.cache_org,
                entry_count: self.cache_entries,
                num_sets: self.cache_sets,
                num_ways: self.cache_ways,
            },
            ring_capacity: self.ring_capacity,
            heap_capacity: self.heap_capacity,
            ftl_cpu: self.ftl_cpu,
            poller_cpu: self.poller_cpu,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn defaults_produce_a_valid_device_config() {
        Args::command().debug_assert();
        let args = Args::parse_from(["bytessd"]);
        assert!(args.into_device_config().is_ok());
    }

    #[test]
    fn zero_gc_threshold_is_rejected() {
        let mut args = Args::parse_from(["bytessd"]);
        args.gc_thresh_pct = 0.0;
        assert!(args.into_device_config().is_err());
    }
}
