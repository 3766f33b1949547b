//! rkflash-core - Rockchip USB boot protocol engine
//!
//! This crate implements the host side of the Rockchip USB boot protocol. It
//! knows nothing about USB enumeration: everything goes through the
//! [`Transport`] trait, which the `rkflash-usb` crate implements on top of
//! `nusb` and `rkflash-dummy` implements in memory.
//!
//! # Layers
//!
//! - [`protocol`]: CBW/CSW-style request and response frames, opcode tables
//! - [`transport`]: the byte-level channel and its chunked send/receive helpers
//! - [`session`]: a claimed device plus the tag generator; runs one exchange
//! - [`maskrom`]: the control-transfer upload encoding used by the boot ROM
//! - [`bootstrap`]: memory write/execute built from maskrom uploads
//! - [`storage`]: memory, LBA, vendor storage, OTP and serial-number operations
//!
//! # Example
//!
//! ```ignore
//! use rkflash_core::{Session, BootMode, chip};
//! use rkflash_core::progress::NoProgress;
//!
//! let mut session = Session::new(transport, chip::lookup(0x350b), BootMode::Loader);
//! session.ready()?;
//! let info = session.flash_detect()?;
//! println!("{} sectors", info.sector_total);
//!
//! let mut buf = vec![0u8; 64 * 512];
//! session.read_lba(0, 64, &mut buf, &mut NoProgress)?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod bootstrap;
pub mod chip;
pub mod error;
pub mod maskrom;
pub mod progress;
pub mod protocol;
pub mod session;
pub mod storage;
pub mod transport;

pub use chip::ChipDescriptor;
pub use error::{scratch, Error, ProtocolError, Result};
pub use session::{BootMode, Session};
pub use transport::Transport;
