//! Query commands: chip info, capabilities, flash geometry, storage, OTP

use rkflash_core::storage::Capability;

use crate::devices::DeviceSession;

/// Print a byte slice as a classic hex dump
pub fn hexdump(data: &[u8], base: u32) {
    for (i, line) in data.chunks(16).enumerate() {
        let hex: Vec<String> = line.iter().map(|b| format!("{:02x}", b)).collect();
        let ascii: String = line
            .iter()
            .map(|&b| if b.is_ascii_graphic() { b as char } else { '.' })
            .collect();
        println!(
            "{:08x}  {:<47}  |{}|",
            base.wrapping_add((i * 16) as u32),
            hex.join(" "),
            ascii
        );
    }
}

/// Print the session's chip and mode, then the loader's chip info block
pub fn cmd_version(session: &mut DeviceSession) -> Result<(), Box<dyn std::error::Error>> {
    println!("Chip: {}", session.chip());
    println!("Mode: {}", session.mode());
    session.ready()?;
    let info = session.chip_info()?;
    // the loader reports the chip id reversed, e.g. "8853" for RK3588
    let id: String = info[..4]
        .iter()
        .rev()
        .filter(|b| b.is_ascii_graphic())
        .map(|&b| b as char)
        .collect();
    println!("Chip info: {}", id);
    hexdump(&info, 0);
    Ok(())
}

pub fn cmd_capability(session: &mut DeviceSession) -> Result<(), Box<dyn std::error::Error>> {
    let cap = session.capability()?;
    println!("Capability: 0x{:016x}", cap.bits());
    for (name, flag) in Capability::all().iter_names() {
        let mark = if cap.contains(flag) { "x" } else { " " };
        println!("  [{}] {}", mark, name);
    }
    Ok(())
}

pub fn cmd_flash_info(session: &mut DeviceSession) -> Result<(), Box<dyn std::error::Error>> {
    let info = session.flash_detect()?;
    println!("{}", info);
    Ok(())
}

pub fn cmd_storage(session: &mut DeviceSession) -> Result<(), Box<dyn std::error::Error>> {
    let kind = session.storage_read()?;
    println!("Storage: {}", kind);
    Ok(())
}

pub fn cmd_otp_read(
    session: &mut DeviceSession,
    offset: u32,
    len: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = session.otp_read(offset, len)?;
    hexdump(&data, offset);
    Ok(())
}
