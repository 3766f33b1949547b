//! Single-exchange queries and control commands

use super::types::{Capability, FlashInfo, StorageKind, FLASH_ID_LEN, FLASH_INFO_LEN};
use super::CHIP_INFO_LEN;
use crate::error::{scratch, Error, Result};
use crate::protocol::frame::Command;
use crate::protocol::opcodes::{Opcode, EXEC_SUBCODE, RESET_MASKROM, RESET_NORMAL};
use crate::session::{DataPhase, Session};
use crate::transport::Transport;

impl<T: Transport> Session<T> {
    fn query(&mut self, opcode: Opcode, buf: &mut [u8]) -> Result<()> {
        let cmd = Command::new(opcode).transfer_length(buf.len() as u32);
        self.execute(&cmd, DataPhase::In(buf))?;
        Ok(())
    }

    fn control(&mut self, cmd: Command) -> Result<()> {
        self.execute(&cmd, DataPhase::None)?;
        Ok(())
    }

    /// Check that the loader answers (`TEST_UNIT_READY`)
    pub fn ready(&mut self) -> Result<()> {
        self.control(Command::new(Opcode::TestUnitReady))
    }

    /// Read the 16-byte chip information block
    pub fn chip_info(&mut self) -> Result<[u8; CHIP_INFO_LEN]> {
        let mut buf = [0u8; CHIP_INFO_LEN];
        self.query(Opcode::ReadChipInfo, &mut buf)?;
        Ok(buf)
    }

    /// Read the loader's capability flags
    pub fn capability(&mut self) -> Result<Capability> {
        let mut buf = [0u8; 8];
        self.query(Opcode::ReadCapability, &mut buf)?;
        let cap = Capability::from_bytes(buf);
        log::debug!("Capability: {:?}", cap);
        Ok(cap)
    }

    /// Reboot the device, optionally back into maskrom
    pub fn reset(&mut self, maskrom: bool) -> Result<()> {
        let subcode = if maskrom { RESET_MASKROM } else { RESET_NORMAL };
        log::info!(
            "Resetting device{}",
            if maskrom { " into maskrom" } else { "" }
        );
        self.control(Command::new(Opcode::ResetDevice).subcode(subcode))
    }

    /// Ask the loader to jump to `addr`, passing `dtb` as the device tree address
    pub fn exec(&mut self, addr: u32, dtb: u32) -> Result<()> {
        log::info!("Executing at 0x{:08x} (dtb 0x{:08x})", addr, dtb);
        self.control(
            Command::new(Opcode::ExecSdram)
                .subcode(EXEC_SUBCODE)
                .address(addr)
                .wide_size(dtb),
        )
    }

    /// Switch the USB link to SuperSpeed
    pub fn switch_usb3(&mut self) -> Result<()> {
        self.control(Command::new(Opcode::SwitchUsb3))
    }

    /// Read flash geometry and ID
    pub fn flash_detect(&mut self) -> Result<FlashInfo> {
        let mut info = [0u8; FLASH_INFO_LEN];
        self.query(Opcode::ReadFlashInfo, &mut info)?;
        let mut id = [0u8; FLASH_ID_LEN];
        self.query(Opcode::ReadFlashId, &mut id)?;
        Ok(FlashInfo::parse(&info, &id))
    }

    /// Read `len` bytes of OTP starting at `offset`
    pub fn otp_read(&mut self, offset: u32, len: u16) -> Result<Vec<u8>> {
        let mut buf = scratch(len as usize)?;
        let cmd = Command::new(Opcode::ReadOtpChip)
            .address(offset)
            .size(len)
            .transfer_length(u32::from(len));
        self.execute(&cmd, DataPhase::In(&mut buf))?;
        Ok(buf)
    }

    /// Which storage medium the loader is currently using
    pub fn storage_read(&mut self) -> Result<StorageKind> {
        let mut buf = [0u8; 4];
        self.query(Opcode::ReadStorage, &mut buf)?;
        let mask = u32::from_le_bytes(buf);
        let kind = StorageKind::from_mask(mask);
        log::debug!("Storage mask 0x{:08x} -> {}", mask, kind);
        Ok(kind)
    }

    /// Make `kind` the active storage medium
    pub fn storage_switch(&mut self, kind: StorageKind) -> Result<()> {
        let subcode = kind
            .subcode()
            .ok_or_else(|| Error::InvalidArgument(format!("cannot switch to {} storage", kind)))?;
        log::info!("Switching storage to {}", kind);
        self.control(Command::new(Opcode::SwitchStorage).subcode(subcode))
    }
}
