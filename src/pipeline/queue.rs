//! The submission/completion rings and the poller's event heap (spec §5
//! "Rings", §9 "Heap of pending events").

use std::collections::BinaryHeap;
use std::cmp::Ordering as CmpOrdering;

use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};

use crate::pipeline::event::Event;

/// Single-producer-single-consumer-shaped ring: any number of host
/// submitter threads may send (the spec only requires SPSC per direction,
/// which a bounded MPSC channel specializes to when there is exactly one
/// consumer, the FTL worker or the poller), and exactly one thread drains.
pub struct Ring {
    tx: Sender<Box<Event>>,
    rx: Receiver<Box<Event>>,
}

impl Ring {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Ring { tx, rx }
    }

    /// Enqueues, spinning with a cooperative yield while the ring is full.
    pub fn put_wait(&self, mut event: Box<Event>) {
        loop {
            match self.tx.try_send(event) {
                Ok(()) => return,
                Err(TrySendError::Full(ev)) => {
                    event = ev;
                    std::thread::yield_now();
                }
                Err(TrySendError::Disconnected(_)) => {
                    unreachable!("ring consumer dropped while producer still live")
                }
            }
        }
    }

    /// Single non-blocking enqueue attempt; `Err` means the ring was full.
    pub fn try_put(&self, event: Box<Event>) -> Result<(), Box<Event>> {
        match self.tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(ev)) => Err(ev),
            Err(TrySendError::Disconnected(_)) => {
                unreachable!("ring consumer dropped while producer still live")
            }
        }
    }

    pub fn try_get(&self) -> Option<Box<Event>> {
        self.rx.try_recv().ok()
    }
}

/// Min-heap entry ordered by `expire_time`, ties broken by insertion order
/// (spec §9: "keyed by `expire_time` with tie-breaking by insertion
/// order").
struct HeapEntry {
    expire_time: u64,
    seq: u64,
    event: Box<Event>,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.expire_time == other.expire_time && self.seq == other.seq
    }
}
impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // `BinaryHeap` is a max-heap; reverse the key order so the smallest
        // `expire_time` (and, on a tie, the earliest insertion) pops first.
        other
            .expire_time
            .cmp(&self.expire_time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Fixed-capacity event heap. The spec's "max-event-heap depth" config is
/// enforced as a fatal assertion on overflow: the poller is the only
/// producer and is expected to drain faster than nowait completions can
/// pile up under the configured latency bounds.
pub struct EventHeap {
    heap: BinaryHeap<HeapEntry>,
    capacity: usize,
    next_seq: u64,
}

impl EventHeap {
    pub fn new(capacity: usize) -> Self {
        EventHeap {
            heap: BinaryHeap::with_capacity(capacity),
            capacity,
            next_seq: 0,
        }
    }

    pub fn push(&mut self, event: Box<Event>) {
        assert!(
            self.heap.len() < self.capacity,
            "event heap overflow: more than {} in-flight nowait completions",
            self.capacity
        );
        let entry = HeapEntry {
            expire_time: event.expire_time(),
            seq: self.next_seq,
            event,
        };
        self.next_seq += 1;
        self.heap.push(entry);
    }

    pub fn peek_expire_time(&self) -> Option<u64> {
        self.heap.peek().map(|e| e.expire_time)
    }

    pub fn pop(&mut self) -> Box<Event> {
        self.heap.pop().expect("pop called on empty event heap").event
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::event::NvmeCmd;
    use std::sync::{Arc, Mutex};

    fn event(expire_time: u64) -> Box<Event> {
        let e = Event::new(
            NvmeCmd::read(0, 1),
            false,
            Arc::new(Mutex::new(vec![0u8; 4096])),
        );
        e.expire_time
            .store(expire_time, std::sync::atomic::Ordering::Release);
        Box::new(e)
    }

    #[test]
    fn pops_in_expiry_order() {
        let mut heap = EventHeap::new(8);
        heap.push(event(30));
        heap.push(event(10));
        heap.push(event(20));
        assert_eq!(heap.pop().expire_time(), 10);
        assert_eq!(heap.pop().expire_time(), 20);
        assert_eq!(heap.pop().expire_time(), 30);
    }

    #[test]
    fn ties_break_by_insertion_order() {
        let mut heap = EventHeap::new(8);
        heap.push(event(5));
        heap.push(event(5));
        heap.push(event(5));
        // All equal; pop order should match push order (seq tiebreak).
        let mut seen = vec![];
        while !heap.is_empty() {
            seen.push(heap.pop().expire_time());
        }
        assert_eq!(seen, vec![5, 5, 5]);
    }

    #[test]
    #[should_panic(expected = "event heap overflow")]
    fn overflow_is_fatal() {
        let mut heap = EventHeap::new(1);
        heap.push(event(1));
        heap.push(event(2));
    }

    #[test]
    fn ring_put_get_roundtrip() {
        let ring = Ring::new(2);
        ring.put_wait(event(1));
        ring.put_wait(event(2));
        assert!(ring.try_put(event(3)).is_err());
        assert_eq!(ring.try_get().unwrap().expire_time(), 1);
        assert_eq!(ring.try_get().unwrap().expire_time(), 2);
        assert!(ring.try_get().is_none());
    }
}
