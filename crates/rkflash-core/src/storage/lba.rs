//! LBA erase, read and write, plus the records stored in reserved sectors

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use super::chunk::{lba_chunks, LbaOperation};
use super::serial::{encode_serial, parse_serial, SN_LBA};
use super::{SECTOR_SIZE, VENDOR_LBA_BASE};
use crate::error::{scratch, Error, Result};
use crate::progress::{NoProgress, Progress};
use crate::protocol::frame::Command;
use crate::protocol::opcodes::Opcode;
use crate::session::{DataPhase, Session};
use crate::transport::Transport;

/// Bytes in `count` sectors
fn sector_bytes(count: u32) -> usize {
    count as usize * SECTOR_SIZE
}

/// Sectors needed to hold `len` bytes
fn sectors_for(len: u64) -> Result<u32> {
    u32::try_from(len.div_ceil(SECTOR_SIZE as u64))
        .map_err(|_| Error::InvalidArgument(format!("{} bytes exceed the LBA space", len)))
}

fn check_buffer(have: usize, count: u32) -> Result<()> {
    let need = sector_bytes(count);
    if have < need {
        return Err(Error::InvalidArgument(format!(
            "buffer holds {} bytes, {} sectors need {}",
            have, count, need
        )));
    }
    Ok(())
}

fn lba_command(opcode: Opcode, subcode: u8, sec: u32, count: u32) -> Command {
    let transfer = match opcode {
        Opcode::EraseLba => 0,
        _ => count * SECTOR_SIZE as u32,
    };
    Command::new(opcode)
        .subcode(subcode)
        .address(sec)
        .size(count as u16)
        .transfer_length(transfer)
}

/// Read until `buf` is full or the reader is exhausted; zero the rest
fn fill_from<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    buf[filled..].fill(0);
    Ok(filled)
}

impl<T: Transport> Session<T> {
    fn read_lba_sub<P: Progress + ?Sized>(
        &mut self,
        subcode: u8,
        sec: u32,
        count: u32,
        buf: &mut [u8],
        progress: &mut P,
    ) -> Result<()> {
        check_buffer(buf.len(), count)?;
        let chunks = lba_chunks(LbaOperation::Read, sec, count)?;
        progress.start(sector_bytes(count) as u64);
        let mut offset = 0;
        for (chunk_sec, n) in chunks {
            let len = sector_bytes(n);
            let cmd = lba_command(Opcode::ReadLba, subcode, chunk_sec, n);
            self.execute(&cmd, DataPhase::In(&mut buf[offset..offset + len]))?;
            offset += len;
            progress.update(len as u64);
        }
        progress.stop();
        Ok(())
    }

    fn write_lba_sub<P: Progress + ?Sized>(
        &mut self,
        subcode: u8,
        sec: u32,
        count: u32,
        data: &[u8],
        progress: &mut P,
    ) -> Result<()> {
        check_buffer(data.len(), count)?;
        let chunks = lba_chunks(LbaOperation::Write, sec, count)?;
        progress.start(sector_bytes(count) as u64);
        let mut offset = 0;
        for (chunk_sec, n) in chunks {
            let len = sector_bytes(n);
            let cmd = lba_command(Opcode::WriteLba, subcode, chunk_sec, n);
            self.execute(&cmd, DataPhase::Out(&data[offset..offset + len]))?;
            offset += len;
            progress.update(len as u64);
        }
        progress.stop();
        Ok(())
    }

    /// Erase `count` sectors starting at `sec`
    pub fn erase_lba<P: Progress + ?Sized>(
        &mut self,
        sec: u32,
        count: u32,
        progress: &mut P,
    ) -> Result<()> {
        let chunks = lba_chunks(LbaOperation::Erase, sec, count)?;
        log::debug!("Erasing {} sectors at 0x{:08x}", count, sec);
        progress.start(sector_bytes(count) as u64);
        for (chunk_sec, n) in chunks {
            let cmd = lba_command(Opcode::EraseLba, 0, chunk_sec, n);
            self.execute(&cmd, DataPhase::None)?;
            progress.update(sector_bytes(n) as u64);
        }
        progress.stop();
        Ok(())
    }

    /// Read `count` sectors starting at `sec` into `buf`
    ///
    /// `buf` must hold at least `count * 512` bytes. On failure its contents
    /// are unspecified.
    pub fn read_lba<P: Progress + ?Sized>(
        &mut self,
        sec: u32,
        count: u32,
        buf: &mut [u8],
        progress: &mut P,
    ) -> Result<()> {
        self.read_lba_sub(0, sec, count, buf, progress)
    }

    /// Write `count` sectors from `data` starting at `sec`
    pub fn write_lba<P: Progress + ?Sized>(
        &mut self,
        sec: u32,
        count: u32,
        data: &[u8],
        progress: &mut P,
    ) -> Result<()> {
        self.write_lba_sub(0, sec, count, data, progress)
    }

    /// Stream `count` sectors starting at `sec` into `writer`
    pub fn read_lba_to<W, P>(
        &mut self,
        sec: u32,
        count: u32,
        writer: &mut W,
        progress: &mut P,
    ) -> Result<()>
    where
        W: Write + ?Sized,
        P: Progress + ?Sized,
    {
        let chunks = lba_chunks(LbaOperation::Read, sec, count)?;
        let max = LbaOperation::Read.max_chunk(count).min(count);
        let mut buf = scratch(sector_bytes(max))?;

        progress.start(sector_bytes(count) as u64);
        for (chunk_sec, n) in chunks {
            let chunk = &mut buf[..sector_bytes(n)];
            let cmd = lba_command(Opcode::ReadLba, 0, chunk_sec, n);
            self.execute(&cmd, DataPhase::In(&mut *chunk))?;
            writer.write_all(chunk)?;
            progress.update(chunk.len() as u64);
        }
        writer.flush()?;
        progress.stop();
        Ok(())
    }

    /// Stream `count` sectors from `reader` starting at `sec`
    ///
    /// If the reader runs dry the remaining bytes are written as zeros, so a
    /// trailing partial sector is zero-padded.
    pub fn write_lba_from<R, P>(
        &mut self,
        sec: u32,
        count: u32,
        reader: &mut R,
        progress: &mut P,
    ) -> Result<()>
    where
        R: Read + ?Sized,
        P: Progress + ?Sized,
    {
        let chunks = lba_chunks(LbaOperation::Write, sec, count)?;
        let max = LbaOperation::Write.max_chunk(count).min(count);
        let mut buf = scratch(sector_bytes(max))?;

        progress.start(sector_bytes(count) as u64);
        for (chunk_sec, n) in chunks {
            let chunk = &mut buf[..sector_bytes(n)];
            fill_from(reader, chunk)?;
            let cmd = lba_command(Opcode::WriteLba, 0, chunk_sec, n);
            self.execute(&cmd, DataPhase::Out(&*chunk))?;
            progress.update(chunk.len() as u64);
        }
        progress.stop();
        Ok(())
    }

    /// Read `count` sectors starting at `sec` into a new file at `path`
    ///
    /// A partially written file is left in place on failure.
    pub fn read_lba_file<P: Progress + ?Sized>(
        &mut self,
        sec: u32,
        count: u32,
        path: &Path,
        progress: &mut P,
    ) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.read_lba_to(sec, count, &mut writer, progress)
    }

    /// Write the whole file at `path` starting at `sec`
    ///
    /// Returns the number of sectors written.
    pub fn write_lba_file<P: Progress + ?Sized>(
        &mut self,
        sec: u32,
        path: &Path,
        progress: &mut P,
    ) -> Result<u32> {
        let file = File::open(path)?;
        let count = sectors_for(file.metadata()?.len())?;
        log::info!(
            "Writing {} ({} sectors) at 0x{:08x}",
            path.display(),
            count,
            sec
        );
        let mut reader = BufReader::new(file);
        self.write_lba_from(sec, count, &mut reader, progress)?;
        Ok(count)
    }

    /// Read the serial number record
    pub fn sn_read(&mut self) -> Result<String> {
        let mut sector = [0u8; SECTOR_SIZE];
        self.read_lba(SN_LBA, 1, &mut sector, &mut NoProgress)?;
        parse_serial(&sector)
    }

    /// Replace the serial number record
    pub fn sn_write(&mut self, sn: &str) -> Result<()> {
        let sector = encode_serial(sn)?;
        log::info!("Writing serial number '{}'", sn);
        self.write_lba(SN_LBA, 1, &sector, &mut NoProgress)
    }

    fn vendor_lba(index: u32) -> Result<u32> {
        VENDOR_LBA_BASE
            .checked_add(index)
            .ok_or_else(|| Error::InvalidArgument(format!("vendor index {} out of range", index)))
    }

    /// Read `len` bytes of vendor storage item `index` of type `vendor_type`
    pub fn vs_read(&mut self, vendor_type: u8, index: u32, len: usize) -> Result<Vec<u8>> {
        let sec = Self::vendor_lba(index)?;
        let count = sectors_for(len as u64)?;
        let mut buf = scratch(sector_bytes(count))?;
        self.read_lba_sub(vendor_type, sec, count, &mut buf, &mut NoProgress)?;
        buf.truncate(len);
        Ok(buf)
    }

    /// Write `data` to vendor storage item `index` of type `vendor_type`
    ///
    /// The last sector is zero-padded.
    pub fn vs_write(&mut self, vendor_type: u8, index: u32, data: &[u8]) -> Result<()> {
        let sec = Self::vendor_lba(index)?;
        let count = sectors_for(data.len() as u64)?;
        let mut buf = scratch(sector_bytes(count))?;
        buf[..data.len()].copy_from_slice(data);
        self.write_lba_sub(vendor_type, sec, count, &buf, &mut NoProgress)
    }
}
