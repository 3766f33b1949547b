//! CLI argument parsing

use clap::{Parser, Subcommand};
use rkflash_core::storage::StorageKind;
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>()
            .map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Parse a string as a hex or decimal u16
fn parse_hex_u16(s: &str) -> Result<u16, String> {
    let value = parse_hex_u32(s)?;
    u16::try_from(value).map_err(|_| format!("Value 0x{:x} does not fit in 16 bits", value))
}

/// Parse a string as a hex or decimal u8
fn parse_hex_u8(s: &str) -> Result<u8, String> {
    let value = parse_hex_u32(s)?;
    u8::try_from(value).map_err(|_| format!("Value 0x{:x} does not fit in 8 bits", value))
}

fn parse_storage(s: &str) -> Result<StorageKind, String> {
    s.parse()
}

#[derive(Parser)]
#[command(name = "rkflash")]
#[command(author, version, about = "Rockchip USB boot protocol tool", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Index among connected Rockchip devices
    #[arg(short, long, default_value_t = 0, global = true)]
    pub device: usize,

    /// Use the simulated device instead of USB
    #[arg(long, global = true)]
    pub dummy: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List connected Rockchip devices
    List,

    /// Show chip info
    Version,

    /// Show loader capabilities
    Capability,

    /// Reset the device
    Reset {
        /// Reboot into maskrom instead of a normal boot
        #[arg(long)]
        maskrom: bool,
    },

    /// Jump to code in device memory (loader)
    Exec {
        /// Entry address (hex or decimal)
        #[arg(value_parser = parse_hex_u32)]
        addr: u32,

        /// Device tree address passed to the entry point
        #[arg(value_parser = parse_hex_u32, default_value = "0")]
        dtb: u32,
    },

    /// Upload DDR init and usbplug stages through the boot ROM
    Maskrom {
        /// DDR init binary
        ddr: PathBuf,

        /// usbplug or loader binary
        usbplug: PathBuf,

        /// Obfuscate uploads with the boot ROM's RC4 key
        #[arg(long)]
        rc4: bool,
    },

    /// Read device memory to a file
    Read {
        /// Start address (hex or decimal)
        #[arg(value_parser = parse_hex_u32)]
        addr: u32,

        /// Number of bytes
        #[arg(value_parser = parse_hex_u32)]
        len: u32,

        /// Output file
        file: PathBuf,
    },

    /// Write a file to device memory
    ///
    /// In loader mode this uses WRITE_SDRAM; in maskrom mode it pages the
    /// data in through the write bootstrap.
    Write {
        /// Start address (hex or decimal)
        #[arg(value_parser = parse_hex_u32)]
        addr: u32,

        /// Input file
        file: PathBuf,

        /// Obfuscate bootstrap uploads (maskrom only)
        #[arg(long)]
        rc4: bool,
    },

    /// Run code in device memory through the exec bootstrap (maskrom)
    Run {
        /// Entry address (hex or decimal)
        #[arg(value_parser = parse_hex_u32)]
        addr: u32,

        /// Obfuscate the bootstrap upload
        #[arg(long)]
        rc4: bool,
    },

    /// Show flash geometry and ID
    FlashInfo,

    /// Erase sectors
    FlashErase {
        /// First sector (hex or decimal)
        #[arg(value_parser = parse_hex_u32)]
        sec: u32,

        /// Number of sectors
        #[arg(value_parser = parse_hex_u32)]
        cnt: u32,
    },

    /// Read sectors to a file
    FlashRead {
        /// First sector (hex or decimal)
        #[arg(value_parser = parse_hex_u32)]
        sec: u32,

        /// Number of sectors
        #[arg(value_parser = parse_hex_u32)]
        cnt: u32,

        /// Output file
        file: PathBuf,
    },

    /// Write a file to sectors
    FlashWrite {
        /// First sector (hex or decimal)
        #[arg(value_parser = parse_hex_u32)]
        sec: u32,

        /// Input file; the last sector is zero-padded
        file: PathBuf,
    },

    /// Read the serial number
    SnRead,

    /// Write the serial number
    SnWrite {
        /// New serial number (at most 504 bytes)
        sn: String,
    },

    /// Read a vendor storage item
    VsRead {
        /// Vendor storage type
        #[arg(value_parser = parse_hex_u8)]
        vendor_type: u8,

        /// Item index
        #[arg(value_parser = parse_hex_u32)]
        index: u32,

        /// Number of bytes
        #[arg(value_parser = parse_hex_u32)]
        len: u32,
    },

    /// Write a vendor storage item
    VsWrite {
        /// Vendor storage type
        #[arg(value_parser = parse_hex_u8)]
        vendor_type: u8,

        /// Item index
        #[arg(value_parser = parse_hex_u32)]
        index: u32,

        /// Data as hex bytes (e.g. deadbeef or de:ad:be:ef)
        hex: String,
    },

    /// Read OTP
    OtpRead {
        /// Byte offset (hex or decimal)
        #[arg(value_parser = parse_hex_u32)]
        offset: u32,

        /// Number of bytes
        #[arg(value_parser = parse_hex_u16)]
        len: u16,
    },

    /// Show the active storage medium
    Storage,

    /// Select the active storage medium
    StorageSwitch {
        /// flash, emmc, sd, sd1, spinor, spinand, ram, usb, sata or pcie
        #[arg(value_parser = parse_storage)]
        kind: StorageKind,
    },

    /// Switch the loader to USB 3
    Usb3,
}
