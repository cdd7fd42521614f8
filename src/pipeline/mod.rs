//! The timing-ordered request pipeline: the event and command types, the
//! rings and completion heap, the FTL worker and poller threads, and the
//! host-facing [`Device`] (spec §3-§6).

pub mod device;
pub mod event;
pub mod poller;
pub mod queue;
pub mod worker;

pub use device::{Device, DeviceConfig};
pub use event::{new_outstanding_counter, Bio, BioStatus, Event, NvmeCmd, OutstandingCounter};
