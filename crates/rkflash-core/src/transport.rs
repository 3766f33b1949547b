//! Transport layer abstraction
//!
//! A [`Transport`] is a claimed device with one bulk endpoint pair and access
//! to vendor control requests. Implementations report what the hardware did;
//! the helpers in this module turn that into all-or-nothing transfers.

use crate::error::{Error, Result};

/// Largest single bulk OUT submission
pub const MAX_BULK_CHUNK: usize = 128 * 1024;

/// Byte channel to a Rockchip device
pub trait Transport {
    /// Write bytes to the bulk OUT endpoint
    ///
    /// Returns the number of bytes the device accepted.
    fn bulk_out(&mut self, data: &[u8]) -> Result<usize>;

    /// Read bytes from the bulk IN endpoint
    ///
    /// Returns the number of bytes received, at most `buf.len()`.
    fn bulk_in(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Issue a host-to-device vendor control request
    ///
    /// Returns the number of data bytes the device accepted.
    fn control_out(&mut self, request: u8, value: u16, index: u16, data: &[u8]) -> Result<usize>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn bulk_out(&mut self, data: &[u8]) -> Result<usize> {
        (**self).bulk_out(data)
    }

    fn bulk_in(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).bulk_in(buf)
    }

    fn control_out(&mut self, request: u8, value: u16, index: u16, data: &[u8]) -> Result<usize> {
        (**self).control_out(request, value, index, data)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn bulk_out(&mut self, data: &[u8]) -> Result<usize> {
        (**self).bulk_out(data)
    }

    fn bulk_in(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).bulk_in(buf)
    }

    fn control_out(&mut self, request: u8, value: u16, index: u16, data: &[u8]) -> Result<usize> {
        (**self).control_out(request, value, index, data)
    }
}

/// Send all of `data`, in chunks of at most [`MAX_BULK_CHUNK`] bytes
///
/// A zero-length completion means the device stopped accepting data and is
/// reported as [`Error::ShortTransfer`].
pub fn send_all<T: Transport + ?Sized>(transport: &mut T, data: &[u8]) -> Result<()> {
    let mut sent = 0;
    while sent < data.len() {
        let end = data.len().min(sent + MAX_BULK_CHUNK);
        let n = transport.bulk_out(&data[sent..end])?;
        if n == 0 {
            return Err(Error::ShortTransfer {
                expected: data.len(),
                actual: sent,
            });
        }
        sent += n;
    }
    log::trace!("bulk out {} bytes", sent);
    Ok(())
}

/// Fill all of `buf` from the bulk IN endpoint
pub fn recv_all<T: Transport + ?Sized>(transport: &mut T, buf: &mut [u8]) -> Result<()> {
    let mut received = 0;
    while received < buf.len() {
        let n = transport.bulk_in(&mut buf[received..])?;
        if n == 0 {
            return Err(Error::ShortTransfer {
                expected: buf.len(),
                actual: received,
            });
        }
        received += n;
    }
    log::trace!("bulk in {} bytes", received);
    Ok(())
}
