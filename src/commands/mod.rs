//! CLI command implementations
//!
//! Every command takes an open [`DeviceSession`](crate::devices::DeviceSession),
//! so the same code runs against USB hardware and the simulated device.

pub mod info;
pub mod memory;
mod progress;
pub mod storage;
