//! Error types for Rockchip USB access

use std::fmt;

/// Result type for USB operations
pub type Result<T> = std::result::Result<T, UsbError>;

/// Errors that can occur while finding or talking to a Rockchip device
#[derive(Debug)]
pub enum UsbError {
    /// No Rockchip device at the requested index
    DeviceNotFound,
    /// Failed to open device
    OpenFailed(String),
    /// Failed to claim interface 0
    ClaimFailed(String),
    /// The device does not expose a bulk endpoint pair
    EndpointNotFound,
    /// USB transfer failed
    TransferFailed(String),
    /// Core library error
    Core(rkflash_core::Error),
}

impl fmt::Display for UsbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UsbError::DeviceNotFound => write!(f, "Rockchip device not found (VID:2207)"),
            UsbError::OpenFailed(msg) => write!(f, "Failed to open device: {}", msg),
            UsbError::ClaimFailed(msg) => write!(f, "Failed to claim interface: {}", msg),
            UsbError::EndpointNotFound => write!(f, "No bulk IN/OUT endpoint pair found"),
            UsbError::TransferFailed(msg) => write!(f, "USB transfer failed: {}", msg),
            UsbError::Core(e) => write!(f, "Core error: {}", e),
        }
    }
}

impl std::error::Error for UsbError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            UsbError::Core(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rkflash_core::Error> for UsbError {
    fn from(e: rkflash_core::Error) -> Self {
        UsbError::Core(e)
    }
}

impl From<UsbError> for rkflash_core::Error {
    fn from(e: UsbError) -> Self {
        match e {
            UsbError::Core(inner) => inner,
            other => rkflash_core::Error::Transport(other.to_string()),
        }
    }
}
