#[macro_use]
extern crate log;

pub mod cache;
pub mod cli;
pub mod constants;
pub mod ftl;
pub mod nand;
pub mod pipeline;
pub mod util;

pub use cli::Args;
pub use pipeline::{Device, DeviceConfig};
