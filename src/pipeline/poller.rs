//! The poller: the single dedicated thread that releases completions at
//! wall-clock expiry (spec §4.5).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::pipeline::event::release_outstanding;
use crate::pipeline::queue::{EventHeap, Ring};
use crate::util::{now_ns, pin_to_cpu};

pub fn run(to_poller: Arc<Ring>, stop: Arc<AtomicBool>, heap_capacity: usize, cpu: Option<usize>) {
    if let Some(cpu) = cpu {
        if !pin_to_cpu(cpu) {
            log::warn!("poller: failed to pin to cpu {cpu}, continuing unpinned");
        }
    }
    log::info!("poller: started");

    let mut heap = EventHeap::new(heap_capacity);
    while !stop.load(Ordering::Acquire) {
        // Drain the completion ring: blocking events are releasable
        // immediately, nowait events wait in the heap for their expiry.
        while let Some(event) = to_poller.try_get() {
            if event.if_block {
                event.mark_completed();
            } else {
                heap.push(event);
            }
        }

        let now = now_ns();
        while heap.peek_expire_time().map_or(false, |t| t <= now) {
            let event = heap.pop();
            if let (Some(bio), Some(counter)) = (event.bio.clone(), event.outstanding.clone()) {
                release_outstanding(&counter, bio);
            }
            // `event` (and its payload Arc) drops here, releasing the event.
        }

        if heap.is_empty() {
            std::thread::yield_now();
        }
    }
    log::info!("poller: stopped ({} events still pending)", heap.len());
}
