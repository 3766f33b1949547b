//! rkflash-usb - USB access to Rockchip devices
//!
//! Finds devices with vendor id 0x2207, matches the product id against the
//! chip table, claims interface 0 (detaching any kernel driver) and resolves
//! the bulk endpoint pair. The boot mode comes from the low bit of `bcdUSB`:
//! clear means maskrom, set means a loader is running.
//!
//! [`RockUsb`] implements [`rkflash_core::Transport`], so everything in
//! `rkflash-core` runs on top of it.
//!
//! # Example
//!
//! ```no_run
//! use rkflash_usb::RockUsb;
//!
//! let mut session = RockUsb::open()?.into_session();
//! if !session.is_maskrom() {
//!     let cap = session.capability()?;
//!     println!("direct LBA: {}", cap.direct_lba());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod device;
mod error;

pub use device::{RockDeviceInfo, RockUsb, RockUsbConfig, BULK_TIMEOUT};
pub use error::{Result, UsbError};
