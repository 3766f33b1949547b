//! Memory access in maskrom mode
//!
//! The boot ROM can only run uploaded code. To poke device memory we upload
//! a tiny program with its parameters appended, let the ROM run it through
//! handler 0x471, and repeat per page.
//!
//! The bundled images are position-independent AArch32 code. Their contract
//! is all that matters here:
//!
//! ```text
//! write image:  code[40] | addr (LE u32) | len (LE u32) | data[len]
//!               copies data to addr, returns to the boot ROM
//! exec image:   code[8]  | target (LE u32)
//!               branches to target, does not return
//! ```
//!
//! SoCs whose boot ROM runs in another instruction set need their own
//! [`BootstrapImage`]s; the session methods accept any image.

use crate::error::{scratch, Error, Result};
use crate::maskrom::{self, CODE_SRAM};
use crate::progress::Progress;
use crate::session::{BootMode, Session};
use crate::transport::Transport;

/// Largest data page carried by one write-image upload
pub const PAGE_SIZE: usize = 1024;

/// A bundled program with a parameter block at a fixed offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapImage {
    /// Short identifier for logs
    pub name: &'static str,
    /// Image revision, bumped whenever the code words change
    pub version: u32,
    /// Program text as little-endian 32-bit words
    pub code: &'static [u32],
    /// Byte offset of the parameter block
    pub param_offset: usize,
}

/// Copy `len` bytes from the parameter block to `addr`, then return
pub static WRITE_MEMORY: BootstrapImage = BootstrapImage {
    name: "write-memory",
    version: 1,
    code: &[
        0xE28F_0020, // add   r0, pc, #32        @ r0 = &params
        0xE490_1004, // ldr   r1, [r0], #4       @ addr
        0xE490_2004, // ldr   r2, [r0], #4       @ len
        0xE352_0000, // 1: cmp r2, #0
        0x0A00_0003, // beq   2f
        0xE4D0_3001, // ldrb  r3, [r0], #1
        0xE4C1_3001, // strb  r3, [r1], #1
        0xE242_2001, // sub   r2, r2, #1
        0xEAFF_FFF9, // b     1b
        0xE12F_FF1E, // 2: bx lr
    ],
    param_offset: 40,
};

/// Branch to the address in the parameter block
pub static EXEC_MEMORY: BootstrapImage = BootstrapImage {
    name: "exec-memory",
    version: 1,
    code: &[
        0xE59F_0000, // ldr   r0, [pc, #0]       @ target
        0xE12F_FF10, // bx    r0
    ],
    param_offset: 8,
};

impl BootstrapImage {
    fn code_len(&self) -> usize {
        self.code.len() * 4
    }

    fn build(&self, params: &[u8]) -> Result<Vec<u8>> {
        let len = self.param_offset.max(self.code_len()) + params.len();
        let mut buf = scratch(len)?;
        for (dst, word) in buf.chunks_exact_mut(4).zip(self.code) {
            dst.copy_from_slice(&word.to_le_bytes());
        }
        buf[self.param_offset..self.param_offset + params.len()].copy_from_slice(params);
        Ok(buf)
    }

    /// Build an upload that copies `data` to `addr`
    pub fn write_image(&self, addr: u32, data: &[u8]) -> Result<Vec<u8>> {
        let len = u32::try_from(data.len())
            .map_err(|_| Error::InvalidArgument(format!("page of {} bytes", data.len())))?;
        let mut params = scratch(8 + data.len())?;
        params[0..4].copy_from_slice(&addr.to_le_bytes());
        params[4..8].copy_from_slice(&len.to_le_bytes());
        params[8..].copy_from_slice(data);
        self.build(&params)
    }

    /// Build an upload that jumps to `addr`
    pub fn exec_image(&self, addr: u32) -> Result<Vec<u8>> {
        self.build(&addr.to_le_bytes())
    }
}

impl<T: Transport> Session<T> {
    /// Write device memory through the boot ROM, one page per upload
    pub fn bootstrap_write<P: Progress + ?Sized>(
        &mut self,
        addr: u32,
        data: &[u8],
        rc4: bool,
        progress: &mut P,
    ) -> Result<()> {
        self.bootstrap_write_with(&WRITE_MEMORY, addr, data, rc4, progress)
    }

    /// Like [`bootstrap_write`](Self::bootstrap_write) with a caller-supplied image
    pub fn bootstrap_write_with<P: Progress + ?Sized>(
        &mut self,
        image: &BootstrapImage,
        addr: u32,
        data: &[u8],
        rc4: bool,
        progress: &mut P,
    ) -> Result<()> {
        self.require_mode(BootMode::Maskrom)?;
        log::debug!(
            "{} v{}: {} bytes to 0x{:08x}",
            image.name,
            image.version,
            data.len(),
            addr
        );

        progress.start(data.len() as u64);
        let mut page_addr = addr;
        for page in data.chunks(PAGE_SIZE) {
            let upload = image.write_image(page_addr, page)?;
            maskrom::upload(self.transport_mut(), CODE_SRAM, &upload, rc4)?;
            page_addr = page_addr.wrapping_add(page.len() as u32);
            progress.update(page.len() as u64);
        }
        progress.stop();
        Ok(())
    }

    /// Jump to code already resident in device memory
    pub fn bootstrap_exec(&mut self, addr: u32, rc4: bool) -> Result<()> {
        self.bootstrap_exec_with(&EXEC_MEMORY, addr, rc4)
    }

    /// Like [`bootstrap_exec`](Self::bootstrap_exec) with a caller-supplied image
    pub fn bootstrap_exec_with(
        &mut self,
        image: &BootstrapImage,
        addr: u32,
        rc4: bool,
    ) -> Result<()> {
        self.require_mode(BootMode::Maskrom)?;
        log::info!("Executing at 0x{:08x}", addr);
        let upload = image.exec_image(addr)?;
        maskrom::upload(self.transport_mut(), CODE_SRAM, &upload, rc4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_offsets_follow_code() {
        assert_eq!(WRITE_MEMORY.code_len(), WRITE_MEMORY.param_offset);
        assert_eq!(EXEC_MEMORY.code_len(), EXEC_MEMORY.param_offset);
    }

    #[test]
    fn test_write_image_layout() {
        let img = WRITE_MEMORY.write_image(0xFF8C_0000, b"abc").unwrap();
        assert_eq!(img.len(), 40 + 8 + 3);
        assert_eq!(&img[0..4], &[0x20, 0x00, 0x8F, 0xE2]);
        assert_eq!(&img[40..44], &0xFF8C_0000u32.to_le_bytes());
        assert_eq!(&img[44..48], &3u32.to_le_bytes());
        assert_eq!(&img[48..], b"abc");
    }

    #[test]
    fn test_exec_image_layout() {
        let img = EXEC_MEMORY.exec_image(0x0020_0000).unwrap();
        assert_eq!(img.len(), 12);
        assert_eq!(&img[4..8], &0xE12F_FF10u32.to_le_bytes());
        assert_eq!(&img[8..12], &[0x00, 0x00, 0x20, 0x00]);
    }

    #[test]
    fn test_empty_page() {
        let img = WRITE_MEMORY.write_image(0x1000, &[]).unwrap();
        assert_eq!(img.len(), 48);
        assert_eq!(&img[44..48], &[0, 0, 0, 0]);
    }
}
