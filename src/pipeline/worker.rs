//! The FTL worker: the single dedicated thread that dequeues submitted
//! events, executes them against the SSD core, and hands completions to
//! the poller (spec §4.5).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::constants::{opcode, PGSZ};
use crate::ftl::Ssd;
use crate::pipeline::queue::Ring;
use crate::util::{now_ns, pin_to_cpu};

/// Runs until `stop` is set. `cpu` is a best-effort affinity hint (spec
/// §9 "Per-thread affinity").
pub fn run(ssd: Arc<Ssd>, to_ftl: Arc<Ring>, to_poller: Arc<Ring>, stop: Arc<AtomicBool>, cpu: Option<usize>) {
    if let Some(cpu) = cpu {
        if !pin_to_cpu(cpu) {
            log::warn!("ftl worker: failed to pin to cpu {cpu}, continuing unpinned");
        }
    }
    log::info!("ftl worker: started");

    while !stop.load(Ordering::Acquire) {
        let Some(mut event) = to_ftl.try_get() else {
            std::thread::yield_now();
            continue;
        };

        let s_time = now_ns();
        event.s_time.store(s_time, Ordering::Release);
        let lba = event.cmd.cdw10;
        let nlb = event.cmd.cdw12;
        let lat = match event.cmd.opcode {
            opcode::WRITE => {
                let payload = event.payload.lock().unwrap();
                debug_assert_eq!(payload.len(), nlb as usize * PGSZ);
                ssd.ssd_write(lba, nlb, &payload, s_time)
            }
            opcode::READ => {
                let mut payload = event.payload.lock().unwrap();
                debug_assert_eq!(payload.len(), nlb as usize * PGSZ);
                ssd.ssd_read(lba, nlb, &mut payload, s_time)
            }
            other => {
                log::error!("ftl worker: received unknown opcode {other}");
                0
            }
        };
        event.reqlat.store(lat, Ordering::Release);
        event.expire_time.store(s_time + lat, Ordering::Release);

        to_poller.put_wait(event);
    }
    log::info!("ftl worker: stopped");
}
