//! Boot commands: maskrom upload, memory access, execution, reset

use std::fs;
use std::path::Path;

use rkflash_core::maskrom::{CODE_LOADER, CODE_SRAM};
use rkflash_core::{scratch, BootMode};

use super::progress::IndicatifProgress;
use crate::devices::DeviceSession;

/// Upload the DDR init stage, then the usbplug/loader stage
pub fn cmd_maskrom(
    session: &mut DeviceSession,
    ddr: &Path,
    usbplug: &Path,
    rc4: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("Uploading DDR init {:?}", ddr);
    session.maskrom_upload_file(CODE_SRAM, ddr, rc4)?;
    // give the ROM time to run DDR init before the next stage
    std::thread::sleep(std::time::Duration::from_millis(10));
    println!("Uploading {:?}", usbplug);
    session.maskrom_upload_file(CODE_LOADER, usbplug, rc4)?;
    println!("Done");
    Ok(())
}

/// Dump `len` bytes of device memory at `addr` to `file`
pub fn cmd_read(
    session: &mut DeviceSession,
    addr: u32,
    len: u32,
    file: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut data = scratch(len as usize)?;
    let mut progress = IndicatifProgress::new("Reading");
    session.read_memory(addr, &mut data, &mut progress)?;
    fs::write(file, &data)?;
    println!("Wrote {} bytes to {:?}", data.len(), file);
    Ok(())
}

/// Load `file` into device memory at `addr`
///
/// Uses `WRITE_SDRAM` when a loader is running, the write bootstrap when the
/// device is in maskrom.
pub fn cmd_write(
    session: &mut DeviceSession,
    addr: u32,
    file: &Path,
    rc4: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = fs::read(file)?;
    println!("Read {} bytes from {:?}", data.len(), file);
    let mut progress = IndicatifProgress::new("Writing");
    match session.mode() {
        BootMode::Loader => session.write_memory(addr, &data, &mut progress)?,
        BootMode::Maskrom => session.bootstrap_write(addr, &data, rc4, &mut progress)?,
    }
    Ok(())
}

pub fn cmd_run(
    session: &mut DeviceSession,
    addr: u32,
    rc4: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    session.bootstrap_exec(addr, rc4)?;
    println!("Jumped to 0x{:08x}", addr);
    Ok(())
}

pub fn cmd_exec(
    session: &mut DeviceSession,
    addr: u32,
    dtb: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    session.exec(addr, dtb)?;
    println!("Executing 0x{:08x} (dtb 0x{:08x})", addr, dtb);
    Ok(())
}

pub fn cmd_reset(
    session: &mut DeviceSession,
    maskrom: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    session.reset(maskrom)?;
    println!("Reset{}", if maskrom { " to maskrom" } else { "" });
    Ok(())
}

pub fn cmd_usb3(session: &mut DeviceSession) -> Result<(), Box<dyn std::error::Error>> {
    session.switch_usb3()?;
    println!("Switched to USB 3, the device will re-enumerate");
    Ok(())
}
