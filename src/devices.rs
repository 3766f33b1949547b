//! Device backend selection
//!
//! Opens either a USB device or the simulated one, depending on the CLI
//! flags and the features enabled at compile time.

use rkflash_core::{Session, Transport};

/// A session over whichever backend was selected
pub type DeviceSession = Session<Box<dyn Transport>>;

/// Open the device chosen on the command line
#[allow(unused_variables)]
pub fn open_session(
    device_index: usize,
    dummy: bool,
) -> Result<DeviceSession, Box<dyn std::error::Error>> {
    if dummy {
        return open_dummy();
    }

    #[cfg(feature = "usb")]
    {
        use rkflash_usb::{RockUsb, RockUsbConfig};

        let usb = RockUsb::open_with_config(RockUsbConfig { device_index })?;
        let (chip, mode) = (usb.chip(), usb.mode());
        let transport: Box<dyn Transport> = Box::new(usb);
        Ok(Session::new(transport, chip, mode))
    }

    #[cfg(not(feature = "usb"))]
    {
        Err("USB support not compiled in (enable the 'usb' feature or pass --dummy)".into())
    }
}

#[cfg(feature = "dummy")]
fn open_dummy() -> Result<DeviceSession, Box<dyn std::error::Error>> {
    use rkflash_dummy::DummyRock;

    let dummy = DummyRock::new_default();
    log::info!(
        "Using simulated {} in {} mode",
        dummy.chip(),
        dummy.config().mode
    );
    let (chip, mode) = (dummy.chip(), dummy.config().mode);
    let transport: Box<dyn Transport> = Box::new(dummy);
    Ok(Session::new(transport, chip, mode))
}

#[cfg(not(feature = "dummy"))]
fn open_dummy() -> Result<DeviceSession, Box<dyn std::error::Error>> {
    Err("Simulated device not compiled in (enable the 'dummy' feature)".into())
}

/// List connected devices
pub fn list_devices() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(feature = "usb")]
    {
        let devices = rkflash_usb::RockUsb::list_devices()?;
        if devices.is_empty() {
            println!("No Rockchip devices found");
        }
        for (index, device) in devices.iter().enumerate() {
            println!("{}: {}", index, device);
        }
        Ok(())
    }

    #[cfg(not(feature = "usb"))]
    {
        Err("USB support not compiled in (enable the 'usb' feature)".into())
    }
}
