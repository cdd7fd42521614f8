//! Request events: the NVMe-style command record, the event that flows
//! between the FTL worker and the poller, and the host block callback
//! (spec §3 "Request event", §6 "Command record", "Host block callback").

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::constants::opcode;

/// NVMe-style command record. Fields mirror the wire contract named in the
/// spec; `prp1` is carried for structural fidelity with the opcode/LBA/
/// length/data-pointer contract but the simulated payload itself travels
/// out-of-band as an owned buffer (see [`Event::payload`]) rather than a raw
/// virtual address, since this crate has no MMU/DMA layer to dereference one
/// through.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct NvmeCmd {
    pub opcode: u8,
    pub fused: u8,
    pub psdt: u8,
    pub cid: u16,
    pub nsid: u32,
    pub mptr: u64,
    pub prp1: u64,
    pub prp2: u64,
    /// CDW10: logical page number (LBA).
    pub cdw10: u64,
    /// CDW12: number of logical blocks (pages).
    pub cdw12: u64,
}

impl NvmeCmd {
    pub fn new(opcode: u8, lba: u64, nlb: u64) -> Self {
        NvmeCmd {
            opcode,
            fused: 0,
            psdt: 0,
            cid: 0,
            nsid: 1,
            mptr: 0,
            prp1: 0,
            prp2: 0,
            cdw10: lba,
            cdw12: nlb,
        }
    }

    pub fn write(lba: u64, nlb: u64) -> Self {
        Self::new(opcode::WRITE, lba, nlb)
    }

    pub fn read(lba: u64, nlb: u64) -> Self {
        Self::new(opcode::READ, lba, nlb)
    }
}

pub use crate::constants::BioStatus;

/// The host's block I/O descriptor: a status cell plus the completion
/// callback the poller fires (`bio_endio`).
pub struct Bio {
    status: Mutex<BioStatus>,
    end_io: Box<dyn FnOnce(BioStatus) + Send>,
}

impl Bio {
    pub fn new(end_io: impl FnOnce(BioStatus) + Send + 'static) -> Self {
        Bio {
            status: Mutex::new(BioStatus::Ok),
            end_io: Box::new(end_io),
        }
    }

    pub fn set_status(&self, status: BioStatus) {
        *self.status.lock().unwrap() = status;
    }

    /// Fires the completion callback exactly once, consuming `self`.
    pub fn complete(self) {
        let status = *self.status.lock().unwrap();
        (self.end_io)(status);
    }
}

/// Shared "outstanding vectors" counter: several events can reference one
/// host bio (a single host I/O split across internal requests); the bio's
/// completion callback fires only once the last reference releases it.
pub type OutstandingCounter = Arc<AtomicU64>;

pub fn new_outstanding_counter(refs: u64) -> OutstandingCounter {
    Arc::new(AtomicU64::new(refs.max(1)))
}

/// One unit of work flowing through the FTL worker and poller (spec §3).
///
/// `s_time`/`expire_time`/`reqlat` are atomics rather than plain fields: the
/// `Event` itself is moved into the submission ring and on into the
/// poller's heap, so the issuing thread keeps only cloned handles (these
/// atomics, plus `completed`) to observe the worker's and poller's updates
/// without owning the `Event`.
pub struct Event {
    pub cmd: NvmeCmd,
    pub s_time: Arc<AtomicU64>,
    pub expire_time: Arc<AtomicU64>,
    pub reqlat: Arc<AtomicU64>,
    completed: Arc<AtomicBool>,
    pub if_block: bool,
    /// Owned buffer the FTL worker reads from (writes) or fills (reads).
    pub payload: Arc<Mutex<Vec<u8>>>,
    pub bio: Option<Arc<Bio>>,
    pub outstanding: Option<OutstandingCounter>,
}

impl Event {
    pub fn new(cmd: NvmeCmd, if_block: bool, payload: Arc<Mutex<Vec<u8>>>) -> Self {
        Event {
            cmd,
            s_time: Arc::new(AtomicU64::new(0)),
            expire_time: Arc::new(AtomicU64::new(0)),
            reqlat: Arc::new(AtomicU64::new(0)),
            completed: Arc::new(AtomicBool::new(false)),
            if_block,
            payload,
            bio: None,
            outstanding: None,
        }
    }

    pub fn completed_handle(&self) -> Arc<AtomicBool> {
        self.completed.clone()
    }

    pub fn mark_completed(&self) {
        self.completed.store(true, Ordering::Release);
    }

    pub fn expire_time(&self) -> u64 {
        self.expire_time.load(Ordering::Acquire)
    }
}

/// Releases one reference on a bio's outstanding-vector counter. Only the
/// poller thread calls this, so the load-then-branch is race-free (spec
/// §4.5: "decrement ... when it reaches 1, free the counter and invoke the
/// host's bio completion callback").
pub fn release_outstanding(counter: &OutstandingCounter, bio: Arc<Bio>) {
    if counter.load(Ordering::Acquire) > 1 {
        counter.fetch_sub(1, Ordering::AcqRel);
    } else {
        match Arc::try_unwrap(bio) {
            Ok(bio) => bio.complete(),
            Err(_) => log::error!("bio outstanding counter reached 1 but bio is still aliased"),
        }
    }
}
