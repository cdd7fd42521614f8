#[macro_use]
extern crate log;

use clap::Parser;

use bytessd::cli::Args;
use bytessd::pipeline::Device;
use bytessd::constants::PGSZ;

/// Presentation scaffolding, not part of the core contract: parses
/// configuration, brings up a device, and runs it through a short
/// write/read/byte-access sequence so a fresh checkout has something to
/// run.
pub fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();
    let config = args.into_device_config()?;
    let device = Device::new(config)?;

    let mut page = vec![0xABu8; PGSZ];
    let ret = device.nvme_issue(true, 0, 1, &mut page);
    info!("nvme_issue(write, lba=0, nlb=1) -> {ret}");

    let mut readback = vec![0u8; PGSZ];
    let ret = device.nvme_issue(false, 0, 1, &mut readback);
    info!("nvme_issue(read, lba=0, nlb=1) -> {ret}");
    if readback != page {
        warn!("readback did not match what was written");
    }

    let mut bytes: Vec<u8> = b"hello byte-addressable ssd".to_vec();
    device.byte_issue(true, PGSZ as u64 * 2 + 10, &mut bytes);
    let mut byte_readback = vec![0u8; bytes.len()];
    device.byte_issue(false, PGSZ as u64 * 2 + 10, &mut byte_readback);
    info!(
        "byte_issue roundtrip ok: {}",
        byte_readback == bytes
    );

    let stats = device.ssd().cache_stats();
    info!("cache stats: {} hits, {} misses", stats.hits, stats.misses);

    device.shutdown();
    Ok(())
}
