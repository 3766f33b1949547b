//! Storage commands: LBA erase/read/write, serial number, vendor storage

use std::path::Path;

use rkflash_core::storage::StorageKind;

use super::info::hexdump;
use super::progress::IndicatifProgress;
use crate::devices::DeviceSession;

/// Parse a hex byte string such as `deadbeef` or `de:ad:be:ef`
pub fn parse_hex_bytes(s: &str) -> Result<Vec<u8>, String> {
    let digits: Vec<u8> = s
        .strip_prefix("0x")
        .unwrap_or(s)
        .bytes()
        .filter(|c| !matches!(c, b':' | b' ' | b'-'))
        .collect();
    if digits.len() % 2 != 0 {
        return Err("Hex string has an odd number of digits".into());
    }
    digits
        .chunks(2)
        .map(|pair| {
            let text = std::str::from_utf8(pair).map_err(|e| e.to_string())?;
            u8::from_str_radix(text, 16).map_err(|e| format!("Invalid hex byte '{}': {}", text, e))
        })
        .collect()
}

pub fn cmd_flash_erase(
    session: &mut DeviceSession,
    sec: u32,
    cnt: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut progress = IndicatifProgress::new("Erasing");
    session.erase_lba(sec, cnt, &mut progress)?;
    Ok(())
}

pub fn cmd_flash_read(
    session: &mut DeviceSession,
    sec: u32,
    cnt: u32,
    file: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut progress = IndicatifProgress::new("Reading");
    session.read_lba_file(sec, cnt, file, &mut progress)?;
    println!("Wrote {} sectors to {:?}", cnt, file);
    Ok(())
}

pub fn cmd_flash_write(
    session: &mut DeviceSession,
    sec: u32,
    file: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut progress = IndicatifProgress::new("Writing");
    let count = session.write_lba_file(sec, file, &mut progress)?;
    println!("Wrote {} sectors at 0x{:08x}", count, sec);
    Ok(())
}

pub fn cmd_sn_read(session: &mut DeviceSession) -> Result<(), Box<dyn std::error::Error>> {
    let sn = session.sn_read()?;
    println!("SN: {}", sn);
    Ok(())
}

pub fn cmd_sn_write(
    session: &mut DeviceSession,
    sn: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    session.sn_write(sn)?;
    println!("SN written");
    Ok(())
}

pub fn cmd_vs_read(
    session: &mut DeviceSession,
    vendor_type: u8,
    index: u32,
    len: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = session.vs_read(vendor_type, index, len as usize)?;
    hexdump(&data, 0);
    Ok(())
}

pub fn cmd_vs_write(
    session: &mut DeviceSession,
    vendor_type: u8,
    index: u32,
    hex: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = parse_hex_bytes(hex)?;
    session.vs_write(vendor_type, index, &data)?;
    println!(
        "Wrote {} bytes to vendor item {} (type {})",
        data.len(),
        index,
        vendor_type
    );
    Ok(())
}

pub fn cmd_storage_switch(
    session: &mut DeviceSession,
    kind: StorageKind,
) -> Result<(), Box<dyn std::error::Error>> {
    session.storage_switch(kind)?;
    let active = session.storage_read()?;
    println!("Storage: {}", active);
    if active != kind {
        return Err(format!("Device reports {} after switching to {}", active, kind).into());
    }
    Ok(())
}
