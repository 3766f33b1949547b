//! rkflash - Rockchip USB boot protocol tool
//!
//! Talks to Rockchip SoCs over USB while they sit in the boot ROM
//! ("maskrom") or run a USB loader. In maskrom the tool can upload the DDR
//! init and loader stages, or page arbitrary data into memory through small
//! bootstrap programs. With a loader running it can read and write memory
//! and block storage, manage the serial number and vendor storage, and read
//! OTP.
//!
//! # Architecture
//!
//! All protocol logic lives in `rkflash-core` behind the `Transport` trait.
//! This binary only picks a backend (`rkflash-usb` or the simulated device
//! from `rkflash-dummy`), opens a session and dispatches subcommands.

mod cli;
mod commands;
mod devices;

use clap::Parser;
use cli::{Cli, Commands};
use commands::{info, memory, storage};

/// Default log filter for a `-v` count; `RUST_LOG` still takes precedence
fn log_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logger
    let filter = log_filter(cli.verbose);
    let env = env_logger::Env::default().default_filter_or(filter);
    env_logger::Builder::from_env(env).init();

    if let Commands::List = cli.command {
        return devices::list_devices();
    }

    let mut session = devices::open_session(cli.device, cli.dummy)?;
    let s = &mut session;

    let result = match cli.command {
        Commands::List => Ok(()),
        Commands::Version => info::cmd_version(s),
        Commands::Capability => info::cmd_capability(s),
        Commands::Reset { maskrom } => memory::cmd_reset(s, maskrom),
        Commands::Exec { addr, dtb } => memory::cmd_exec(s, addr, dtb),
        Commands::Maskrom { ddr, usbplug, rc4 } => memory::cmd_maskrom(s, &ddr, &usbplug, rc4),
        Commands::Read { addr, len, file } => memory::cmd_read(s, addr, len, &file),
        Commands::Write { addr, file, rc4 } => memory::cmd_write(s, addr, &file, rc4),
        Commands::Run { addr, rc4 } => memory::cmd_run(s, addr, rc4),
        Commands::FlashInfo => info::cmd_flash_info(s),
        Commands::FlashErase { sec, cnt } => storage::cmd_flash_erase(s, sec, cnt),
        Commands::FlashRead { sec, cnt, file } => storage::cmd_flash_read(s, sec, cnt, &file),
        Commands::FlashWrite { sec, file } => storage::cmd_flash_write(s, sec, &file),
        Commands::SnRead => storage::cmd_sn_read(s),
        Commands::SnWrite { sn } => storage::cmd_sn_write(s, &sn),
        Commands::VsRead {
            vendor_type,
            index,
            len,
        } => storage::cmd_vs_read(s, vendor_type, index, len),
        Commands::VsWrite {
            vendor_type,
            index,
            hex,
        } => storage::cmd_vs_write(s, vendor_type, index, &hex),
        Commands::OtpRead { offset, len } => info::cmd_otp_read(s, offset, len),
        Commands::Storage => info::cmd_storage(s),
        Commands::StorageSwitch { kind } => storage::cmd_storage_switch(s, kind),
        Commands::Usb3 => memory::cmd_usb3(s),
    };

    result
}
