//! Rockchip USB device discovery and transport
//!
//! This module provides the `RockUsb` struct, which owns a claimed Rockchip
//! device and implements the core `Transport` trait on top of `nusb`.

use std::time::Duration;

use nusb::transfer::{Buffer, Bulk, ControlOut, ControlType, In, Out, Recipient};
use nusb::{Endpoint, Interface, MaybeFuture};
use rkflash_core::chip::{self, ChipDescriptor, ROCKCHIP_USB_VENDOR};
use rkflash_core::transport::{Transport, MAX_BULK_CHUNK};
use rkflash_core::{BootMode, Result as CoreResult, Session};

use crate::error::{Result, UsbError};

/// Per-call bulk transfer timeout
pub const BULK_TIMEOUT: Duration = Duration::from_millis(2000);
/// Per-call control transfer timeout
pub const CONTROL_TIMEOUT: Duration = Duration::from_secs(5);

/// Rockchip devices always expose the boot protocol on interface 0
const INTERFACE: u8 = 0;

/// Options for opening a device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RockUsbConfig {
    /// Index among connected Rockchip devices
    pub device_index: usize,
}

/// A claimed Rockchip device in maskrom or loader mode
///
/// Holds the interface for control transfers and the bulk endpoint pair for
/// framed commands. Dropping it releases the interface.
pub struct RockUsb {
    interface: Interface,
    out_ep: Endpoint<Bulk, Out>,
    in_ep: Endpoint<Bulk, In>,
    chip: &'static ChipDescriptor,
    mode: BootMode,
}

impl RockUsb {
    /// Open the first Rockchip device
    pub fn open() -> Result<Self> {
        Self::open_with_config(RockUsbConfig::default())
    }

    /// Open the Rockchip device selected by `config`
    pub fn open_with_config(config: RockUsbConfig) -> Result<Self> {
        let devices: Vec<_> = nusb::list_devices()
            .wait()
            .map_err(|e| UsbError::OpenFailed(e.to_string()))?
            .filter(|d| d.vendor_id() == ROCKCHIP_USB_VENDOR)
            .collect();

        let device_info = devices
            .get(config.device_index)
            .ok_or(UsbError::DeviceNotFound)?;
        let chip = chip::lookup(device_info.product_id());
        let mode = BootMode::from_bcd_usb(device_info.usb_version());

        log::info!(
            "Opening {} ({:04x}:{:04x}) in {} mode at bus {} address {}",
            chip,
            device_info.vendor_id(),
            device_info.product_id(),
            mode,
            device_info.busnum(),
            device_info.device_address()
        );
        if chip.is_unknown() {
            log::warn!(
                "Product id 0x{:04x} is not in the chip table",
                device_info.product_id()
            );
        }

        let device = device_info
            .open()
            .wait()
            .map_err(|e| UsbError::OpenFailed(e.to_string()))?;

        let config_desc = device
            .active_configuration()
            .map_err(|e| UsbError::OpenFailed(format!("Failed to get config: {}", e)))?;

        let mut in_addr: Option<u8> = None;
        let mut out_addr: Option<u8> = None;
        for iface in config_desc.interface_alt_settings() {
            for ep in iface.endpoints() {
                if ep.transfer_type() != nusb::descriptors::TransferType::Bulk {
                    continue;
                }
                if ep.direction() == nusb::transfer::Direction::In {
                    in_addr = Some(ep.address());
                } else {
                    out_addr = Some(ep.address());
                }
            }
        }
        let in_addr = in_addr.ok_or(UsbError::EndpointNotFound)?;
        let out_addr = out_addr.ok_or(UsbError::EndpointNotFound)?;
        log::debug!("Bulk IN EP 0x{:02X}, OUT EP 0x{:02X}", in_addr, out_addr);

        let interface = device
            .detach_and_claim_interface(INTERFACE)
            .wait()
            .map_err(|e| UsbError::ClaimFailed(e.to_string()))?;

        let out_ep = interface
            .endpoint::<Bulk, Out>(out_addr)
            .map_err(|e| UsbError::ClaimFailed(e.to_string()))?;
        let in_ep = interface
            .endpoint::<Bulk, In>(in_addr)
            .map_err(|e| UsbError::ClaimFailed(e.to_string()))?;

        Ok(Self {
            interface,
            out_ep,
            in_ep,
            chip,
            mode,
        })
    }

    /// List all connected Rockchip devices
    pub fn list_devices() -> Result<Vec<RockDeviceInfo>> {
        let devices = nusb::list_devices()
            .wait()
            .map_err(|e| UsbError::OpenFailed(e.to_string()))?
            .filter(|d| d.vendor_id() == ROCKCHIP_USB_VENDOR)
            .map(|d| RockDeviceInfo {
                bus: d.busnum(),
                address: d.device_address(),
                chip: chip::lookup(d.product_id()),
                product_id: d.product_id(),
                mode: BootMode::from_bcd_usb(d.usb_version()),
            })
            .collect();

        Ok(devices)
    }

    /// The identified chip
    pub fn chip(&self) -> &'static ChipDescriptor {
        self.chip
    }

    /// Boot mode read from `bcdUSB`
    pub fn mode(&self) -> BootMode {
        self.mode
    }

    /// Wrap this device in a session with an entropy-seeded tag generator
    pub fn into_session(self) -> Session<Self> {
        let (chip, mode) = (self.chip, self.mode);
        Session::new(self, chip, mode)
    }

    fn usb_write(&mut self, data: &[u8]) -> Result<usize> {
        let len = data.len().min(MAX_BULK_CHUNK);
        let mut buf = Buffer::new(len);
        buf.extend_from_slice(&data[..len]);

        let completion = self.out_ep.transfer_blocking(buf, BULK_TIMEOUT);
        completion
            .into_result()
            .map_err(|e| UsbError::TransferFailed(e.to_string()))?;

        log::trace!("USB write {} bytes", len);
        Ok(len)
    }

    fn usb_read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let max_packet_size = self.in_ep.max_packet_size();
        // Request length must be a multiple of max packet size
        let wanted = buffer.len().min(MAX_BULK_CHUNK);
        let request_len = wanted.div_ceil(max_packet_size) * max_packet_size;
        let mut in_buf = Buffer::new(request_len);
        in_buf.set_requested_len(request_len);

        let completion = self.in_ep.transfer_blocking(in_buf, BULK_TIMEOUT);
        let data = completion
            .into_result()
            .map_err(|e| UsbError::TransferFailed(e.to_string()))?;

        let received = copy_received(buffer, wanted, &data)?;

        log::trace!("USB read {} bytes", received);
        Ok(received)
    }

    fn control_write(
        &mut self,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
    ) -> Result<usize> {
        self.interface
            .control_out(
                ControlOut {
                    control_type: ControlType::Vendor,
                    recipient: Recipient::Device,
                    request,
                    value,
                    index,
                    data,
                },
                CONTROL_TIMEOUT,
            )
            .wait()
            .map_err(|e| UsbError::TransferFailed(format!("Control transfer failed: {}", e)))?;

        log::trace!(
            "USB control 0x{:02x} index 0x{:04x}: {} bytes",
            request,
            index,
            data.len()
        );
        Ok(data.len())
    }
}

impl Transport for RockUsb {
    fn bulk_out(&mut self, data: &[u8]) -> CoreResult<usize> {
        Ok(self.usb_write(data)?)
    }

    fn bulk_in(&mut self, buf: &mut [u8]) -> CoreResult<usize> {
        Ok(self.usb_read(buf)?)
    }

    fn control_out(
        &mut self,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
    ) -> CoreResult<usize> {
        Ok(self.control_write(request, value, index, data)?)
    }
}

/// Information about a connected Rockchip device
#[derive(Debug, Clone)]
pub struct RockDeviceInfo {
    /// USB bus number
    pub bus: u8,
    /// USB device address
    pub address: u8,
    /// USB product id
    pub product_id: u16,
    /// Matched chip, or the unknown sentinel
    pub chip: &'static ChipDescriptor,
    /// Boot mode read from `bcdUSB`
    pub mode: BootMode,
}

impl std::fmt::Display for RockDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (2207:{:04x}) {} at bus {} address {}",
            self.chip, self.product_id, self.mode, self.bus, self.address
        )
    }
}

/// Copy a bulk IN completion into the caller's buffer
///
/// The request is rounded up to whole packets, so the completion may be
/// larger than `wanted` only if the device sent more than was asked for.
fn copy_received(buffer: &mut [u8], wanted: usize, data: &[u8]) -> Result<usize> {
    if data.len() > wanted {
        return Err(UsbError::TransferFailed(format!(
            "device sent {} bytes, expected at most {}",
            data.len(),
            wanted
        )));
    }
    buffer[..data.len()].copy_from_slice(data);
    Ok(data.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_received_short_and_exact() {
        let mut buf = [0u8; 13];
        assert_eq!(copy_received(&mut buf, 13, &[1, 2, 3]).unwrap(), 3);
        assert_eq!(&buf[..3], &[1, 2, 3]);

        let data = [7u8; 13];
        assert_eq!(copy_received(&mut buf, 13, &data).unwrap(), 13);
        assert_eq!(buf, data);
    }

    #[test]
    fn test_copy_received_rejects_overrun() {
        let mut buf = [0u8; 13];
        let data = [0u8; 64];
        assert!(matches!(
            copy_received(&mut buf, 13, &data),
            Err(UsbError::TransferFailed(_))
        ));
        assert_eq!(buf, [0u8; 13]);

        let err: rkflash_core::Error = UsbError::TransferFailed("x".into()).into();
        assert!(matches!(err, rkflash_core::Error::Transport(_)));
    }
}
