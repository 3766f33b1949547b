//! Device session and the single-exchange primitive
//!
//! A [`Session`] owns a claimed device's [`Transport`], the identified chip,
//! the boot mode and the random source used for request tags. Every storage
//! and memory operation is a method on `Session` and borrows it mutably, so
//! at most one request is ever outstanding.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::chip::ChipDescriptor;
use crate::error::{Error, Result};
use crate::protocol::frame::{Command, Response, RESPONSE_LEN};
use crate::transport::{recv_all, send_all, Transport};

/// Which firmware is answering on the USB side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootMode {
    /// Boot ROM: only accepts control-transfer uploads
    Maskrom,
    /// Secondary loader: accepts bulk commands
    Loader,
}

impl BootMode {
    /// Classify from the device descriptor's `bcdUSB` field
    ///
    /// The boot ROM reports an even `bcdUSB`; loaders set bit 0.
    pub fn from_bcd_usb(bcd_usb: u16) -> Self {
        if bcd_usb & 0x0001 == 0 {
            BootMode::Maskrom
        } else {
            BootMode::Loader
        }
    }
}

impl std::fmt::Display for BootMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BootMode::Maskrom => write!(f, "maskrom"),
            BootMode::Loader => write!(f, "loader"),
        }
    }
}

/// Data phase of one exchange
pub enum DataPhase<'a> {
    /// No data between request and response
    None,
    /// Receive exactly `buf.len()` bytes before the response
    In(&'a mut [u8]),
    /// Send these bytes before the response
    Out(&'a [u8]),
}

/// A claimed Rockchip device
pub struct Session<T: Transport> {
    transport: T,
    chip: &'static ChipDescriptor,
    mode: BootMode,
    rng: StdRng,
}

impl<T: Transport> Session<T> {
    /// Create a session with an entropy-seeded tag generator
    pub fn new(transport: T, chip: &'static ChipDescriptor, mode: BootMode) -> Self {
        Self::with_rng(transport, chip, mode, StdRng::from_entropy())
    }

    /// Create a session with a caller-supplied tag generator
    ///
    /// Seeding the generator makes the tag sequence reproducible.
    pub fn with_rng(
        transport: T,
        chip: &'static ChipDescriptor,
        mode: BootMode,
        rng: StdRng,
    ) -> Self {
        log::debug!("Session for {} in {} mode", chip, mode);
        Self {
            transport,
            chip,
            mode,
            rng,
        }
    }

    /// The identified chip
    pub fn chip(&self) -> &'static ChipDescriptor {
        self.chip
    }

    /// The boot mode detected at open time
    pub fn mode(&self) -> BootMode {
        self.mode
    }

    /// Whether the device is in maskrom mode
    pub fn is_maskrom(&self) -> bool {
        self.mode == BootMode::Maskrom
    }

    /// Borrow the transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutably borrow the transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Close the session and hand back the transport
    pub fn into_transport(self) -> T {
        self.transport
    }

    pub(crate) fn require_mode(&self, required: BootMode) -> Result<()> {
        if self.mode != required {
            return Err(Error::WrongMode { required });
        }
        Ok(())
    }

    /// Run one request/data/response exchange
    ///
    /// Returns the tag that was used. Fails with [`Error::Protocol`] when the
    /// response signature or tag is wrong; the device status byte is not
    /// interpreted.
    pub fn execute(&mut self, cmd: &Command, data: DataPhase<'_>) -> Result<u32> {
        let tag: u32 = self.rng.gen();
        let request = cmd.request(tag);

        log::debug!(
            "{:?} sub=0x{:02x} addr=0x{:08x} size={:?} len={} tag={:08x}",
            cmd.block.opcode,
            cmd.block.subcode,
            cmd.block.address,
            cmd.block.size,
            cmd.transfer_length,
            tag
        );

        send_all(&mut self.transport, &request.encode())?;
        match data {
            DataPhase::None => {}
            DataPhase::In(buf) => recv_all(&mut self.transport, buf)?,
            DataPhase::Out(buf) => send_all(&mut self.transport, buf)?,
        }

        let mut raw = [0u8; RESPONSE_LEN];
        recv_all(&mut self.transport, &mut raw)?;
        let response = Response::decode(&raw);
        response.validate(tag)?;

        if response.status != 0 {
            log::debug!(
                "{:?} completed with status 0x{:02x}, residue {}",
                cmd.block.opcode,
                response.status,
                response.residue
            );
        }
        Ok(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boot_mode_from_bcd() {
        assert_eq!(BootMode::from_bcd_usb(0x0200), BootMode::Maskrom);
        assert_eq!(BootMode::from_bcd_usb(0x0201), BootMode::Loader);
        assert_eq!(BootMode::from_bcd_usb(0x0110), BootMode::Maskrom);
        assert_eq!(BootMode::from_bcd_usb(0x0311), BootMode::Loader);
    }

    #[test]
    fn test_boot_mode_display() {
        assert_eq!(BootMode::Maskrom.to_string(), "maskrom");
        assert_eq!(BootMode::Loader.to_string(), "loader");
    }
}
