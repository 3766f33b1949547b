//! Serial number sector
//!
//! ```text
//!   0  marker   LE u32, 1 when valid
//!   4  length   LE u32, at most 504
//!   8  ascii    `length` bytes, rest of the sector zero
//! ```

use super::SECTOR_SIZE;
use crate::error::{Error, Result};

/// Sector holding the serial number record
pub const SN_LBA: u32 = 0xfff0_0001;
/// Largest serial number that fits in the record
pub const SN_MAX_LEN: usize = SECTOR_SIZE - 8;

const SN_VALID: u32 = 1;

/// Build the sector for `sn`
pub fn encode_serial(sn: &str) -> Result<[u8; SECTOR_SIZE]> {
    let bytes = sn.as_bytes();
    if bytes.len() > SN_MAX_LEN {
        return Err(Error::InvalidArgument(format!(
            "serial number is {} bytes, at most {} allowed",
            bytes.len(),
            SN_MAX_LEN
        )));
    }
    let mut sector = [0u8; SECTOR_SIZE];
    sector[0..4].copy_from_slice(&SN_VALID.to_le_bytes());
    sector[4..8].copy_from_slice(&(bytes.len() as u32).to_le_bytes());
    sector[8..8 + bytes.len()].copy_from_slice(bytes);
    Ok(sector)
}

/// Extract the serial number, if the record is valid
pub fn parse_serial(sector: &[u8; SECTOR_SIZE]) -> Result<String> {
    let marker = u32::from_le_bytes([sector[0], sector[1], sector[2], sector[3]]);
    let len = u32::from_le_bytes([sector[4], sector[5], sector[6], sector[7]]) as usize;
    if marker != SN_VALID || len > SN_MAX_LEN {
        return Err(Error::SerialNotPresent);
    }
    Ok(String::from_utf8_lossy(&sector[8..8 + len]).into_owned())
}
