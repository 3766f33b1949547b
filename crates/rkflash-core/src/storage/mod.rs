//! Loader-mode operations
//!
//! Everything here is a method on [`Session`](crate::session::Session) built
//! from one or more frame exchanges. Multi-chunk operations report progress
//! per chunk and stop at the first failure; nothing is retried, and whatever
//! the device already wrote stays written.

pub mod chunk;
mod device;
mod lba;
mod memory;
pub mod serial;
pub mod types;

pub use chunk::{lba_chunks, LbaChunks, LbaOperation};
pub use serial::{SN_LBA, SN_MAX_LEN};
pub use types::{Capability, FlashInfo, StorageKind};

/// Bytes per LBA sector
pub const SECTOR_SIZE: usize = 512;

/// First sector of the vendor storage window; vendor index `i` lives at
/// `VENDOR_LBA_BASE + i`
pub const VENDOR_LBA_BASE: u32 = 0xfff0_0000;

/// Largest memory transfer per `READ_SDRAM`/`WRITE_SDRAM` exchange
pub const MEMORY_CHUNK: usize = 16384;

/// Length of the `READ_CHIP_INFO` block
pub const CHIP_INFO_LEN: usize = 16;
