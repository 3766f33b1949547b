//! rkflash-dummy - Simulated Rockchip device for testing
//!
//! This crate provides a device that speaks the Rockchip USB boot protocol
//! entirely in memory. It decodes request frames, serves the data phase from
//! emulated DRAM, LBA storage, vendor storage and OTP, and answers with a
//! well-formed response. Maskrom uploads are checked like the boot ROM does
//! and the bundled bootstrap images are interpreted.
//!
//! Every decoded request and every completed upload is recorded so tests can
//! assert on what went over the wire. Faults can be injected into the next
//! response or the next bulk transfer.

use std::collections::{HashMap, VecDeque};

use rand::rngs::StdRng;
use rand::SeedableRng;
use rkflash_core::bootstrap::{EXEC_MEMORY, WRITE_MEMORY};
use rkflash_core::chip::{self, ChipDescriptor};
use rkflash_core::maskrom::{self, UPLOAD_CHUNK, UPLOAD_REQUEST};
use rkflash_core::protocol::frame::{decode_request, Request, Response, REQUEST_LEN};
use rkflash_core::protocol::opcodes::{Direction, Opcode};
use rkflash_core::protocol::SizeField;
use rkflash_core::storage::{FlashInfo, StorageKind, SECTOR_SIZE, VENDOR_LBA_BASE};
use rkflash_core::{BootMode, Error, Result, Session, Transport};

/// Configuration for the simulated device
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// USB product id reported at discovery
    pub product_id: u16,
    /// Boot mode reported at discovery
    pub mode: BootMode,
    /// `READ_CAPABILITY` block
    pub capability: [u8; 8],
    /// `READ_CHIP_INFO` block
    pub chip_info: [u8; 16],
    /// Flash geometry; `sector_total` bounds LBA access
    pub flash_info: FlashInfo,
    /// Device address of the first emulated DRAM byte
    pub memory_base: u32,
    /// Emulated DRAM size
    pub memory_size: usize,
    /// OTP contents
    pub otp: Vec<u8>,
    /// Storage medium selected at power-on
    pub storage: StorageKind,
    /// Whether the boot ROM expects RC4-obfuscated uploads
    pub rc4: bool,
}

impl Default for DummyConfig {
    fn default() -> Self {
        let mut chip_info = [0u8; 16];
        chip_info[0..4].copy_from_slice(b"8853");
        Self {
            product_id: 0x350b, // RK3588
            mode: BootMode::Loader,
            capability: [0x0f, 0x02, 0, 0, 0, 0, 0, 0],
            chip_info,
            flash_info: FlashInfo {
                sector_total: 0x0100_0000, // 8 GiB
                block_size: 0x0400,
                page_size: 0x20,
                ecc_bits: 0,
                access_time: 0x28,
                manufacturer_id: 0,
                chip_select: 0x01,
                id: *b"EMMC ",
            },
            memory_base: 0x0020_0000,
            memory_size: 1024 * 1024,
            otp: (0..=255).collect(),
            storage: StorageKind::Emmc,
            rc4: false,
        }
    }
}

/// A completed maskrom upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    /// Handler selected by the control request index
    pub code: u16,
    /// Payload after CRC check and de-obfuscation
    pub payload: Vec<u8>,
    /// Whether the trailing CRC matched
    pub crc_ok: bool,
}

/// What the simulated device expects on the bulk OUT endpoint
enum Phase {
    /// Waiting for a 31-byte request
    Command,
    /// Collecting `len` data bytes for `request`
    Data { request: Request, len: usize },
}

/// Simulated Rockchip device
pub struct DummyRock {
    config: DummyConfig,
    memory: Vec<u8>,
    sectors: HashMap<u32, Vec<u8>>,
    vendor: HashMap<(u8, u32), Vec<u8>>,
    storage: StorageKind,
    phase: Phase,
    rx: Vec<u8>,
    tx: VecDeque<u8>,
    upload_rx: Vec<u8>,
    requests: Vec<Request>,
    uploads: Vec<Upload>,
    resets: Vec<u8>,
    execs: Vec<(u32, u32)>,
    usb3: bool,
    corruption: Option<(usize, usize, u8)>,
    fail_transfer: bool,
}

impl DummyRock {
    /// Create a simulated device
    pub fn new(config: DummyConfig) -> Self {
        let memory = vec![0u8; config.memory_size];
        let storage = config.storage;
        Self {
            config,
            memory,
            sectors: HashMap::new(),
            vendor: HashMap::new(),
            storage,
            phase: Phase::Command,
            rx: Vec::new(),
            tx: VecDeque::new(),
            upload_rx: Vec::new(),
            requests: Vec::new(),
            uploads: Vec::new(),
            resets: Vec::new(),
            execs: Vec::new(),
            usb3: false,
            corruption: None,
            fail_transfer: false,
        }
    }

    /// Create a simulated RK3588 in loader mode
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Get the configuration
    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    /// Chip matching the configured product id
    pub fn chip(&self) -> &'static ChipDescriptor {
        chip::lookup(self.config.product_id)
    }

    /// Wrap in a session with an entropy-seeded tag generator
    pub fn into_session(self) -> Session<Self> {
        let (chip, mode) = (self.chip(), self.config.mode);
        Session::new(self, chip, mode)
    }

    /// Wrap in a session whose tags are reproducible from `seed`
    pub fn into_seeded_session(self, seed: u64) -> Session<Self> {
        let (chip, mode) = (self.chip(), self.config.mode);
        Session::with_rng(self, chip, mode, StdRng::seed_from_u64(seed))
    }

    /// Every request decoded so far
    pub fn requests(&self) -> &[Request] {
        &self.requests
    }

    /// Forget recorded requests
    pub fn clear_requests(&mut self) {
        self.requests.clear();
    }

    /// Every completed maskrom upload
    pub fn uploads(&self) -> &[Upload] {
        &self.uploads
    }

    /// `RESET_DEVICE` subcodes received
    pub fn resets(&self) -> &[u8] {
        &self.resets
    }

    /// `(address, dtb)` pairs from `EXEC_SDRAM` and exec bootstrap uploads
    pub fn execs(&self) -> &[(u32, u32)] {
        &self.execs
    }

    /// Whether `SWITCH_USB3` was received
    pub fn usb3(&self) -> bool {
        self.usb3
    }

    /// Currently selected storage medium
    pub fn storage(&self) -> StorageKind {
        self.storage
    }

    /// Emulated DRAM
    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    /// Mutable emulated DRAM
    pub fn memory_mut(&mut self) -> &mut [u8] {
        &mut self.memory
    }

    /// Contents of one LBA sector (zeros if never written)
    pub fn sector(&self, lba: u32) -> Vec<u8> {
        self.sectors
            .get(&lba)
            .cloned()
            .unwrap_or_else(|| vec![0u8; SECTOR_SIZE])
    }

    /// Overwrite one LBA sector
    pub fn set_sector(&mut self, lba: u32, data: &[u8]) {
        let mut sector = vec![0u8; SECTOR_SIZE];
        let len = data.len().min(SECTOR_SIZE);
        sector[..len].copy_from_slice(&data[..len]);
        self.sectors.insert(lba, sector);
    }

    /// Number of sectors holding data
    pub fn written_sectors(&self) -> usize {
        self.sectors.len()
    }

    /// XOR `mask` into byte `offset` of the next response frame
    pub fn corrupt_next_response(&mut self, offset: usize, mask: u8) {
        self.corrupt_response(0, offset, mask);
    }

    /// XOR `mask` into byte `offset` of the response after `skip` good ones
    pub fn corrupt_response(&mut self, skip: usize, offset: usize, mask: u8) {
        self.corruption = Some((skip, offset, mask));
    }

    /// Discard whatever the device has queued for the host
    pub fn drop_pending_input(&mut self) {
        self.tx.clear();
    }

    /// Make the next bulk transfer fail at the transport level
    pub fn fail_next_transfer(&mut self) {
        self.fail_transfer = true;
    }

    fn take_failure(&mut self) -> Result<()> {
        if std::mem::take(&mut self.fail_transfer) {
            return Err(Error::Transport("injected failure".into()));
        }
        Ok(())
    }

    fn lba_in_range(&self, lba: u32, count: u32) -> bool {
        let end = u64::from(lba) + u64::from(count);
        end <= u64::from(self.config.flash_info.sector_total) || lba >= VENDOR_LBA_BASE
    }

    fn memory_range(&self, addr: u32, len: usize) -> Option<std::ops::Range<usize>> {
        let start = addr.checked_sub(self.config.memory_base)? as usize;
        let end = start.checked_add(len)?;
        (end <= self.memory.len()).then_some(start..end)
    }

    fn respond(&mut self, tag: u32, ok: bool) {
        let mut response = Response::ok(tag);
        if !ok {
            response.status = 1;
        }
        let mut raw = response.encode();
        match self.corruption.take() {
            Some((0, offset, mask)) => {
                if let Some(byte) = raw.get_mut(offset) {
                    *byte ^= mask;
                }
            }
            Some((skip, offset, mask)) => self.corruption = Some((skip - 1, offset, mask)),
            None => {}
        }
        self.tx.extend(raw);
    }

    /// Bytes the host sends after `request`
    fn out_len(request: &Request) -> usize {
        match (request.block.opcode, request.block.size) {
            (Opcode::WriteSdram, SizeField::Narrow(n)) => n as usize,
            (Opcode::WriteLba, SizeField::Narrow(n)) => n as usize * SECTOR_SIZE,
            (Opcode::EraseLba, _) => 0,
            _ if request.direction == Direction::Out => request.transfer_length as usize,
            _ => 0,
        }
    }

    fn handle_request(&mut self, request: Request) {
        log::debug!("dummy: {:?}", request.block);
        self.requests.push(request);
        let out = Self::out_len(&request);
        if out > 0 {
            self.phase = Phase::Data { request, len: out };
            return;
        }

        let tag = request.tag;
        let block = request.block;
        let size = match block.size {
            SizeField::Narrow(n) => u32::from(n),
            SizeField::Wide(n) => n,
        };
        let (data, ok): (Vec<u8>, bool) = match block.opcode {
            Opcode::TestUnitReady => (Vec::new(), true),
            Opcode::ReadCapability => (self.config.capability.to_vec(), true),
            Opcode::ReadChipInfo => (self.config.chip_info.to_vec(), true),
            Opcode::ReadFlashInfo => (self.config.flash_info.encode_info().to_vec(), true),
            Opcode::ReadFlashId => (self.config.flash_info.id.to_vec(), true),
            Opcode::ReadStorage => {
                let mask = self.storage.mask().unwrap_or(0);
                (mask.to_le_bytes().to_vec(), true)
            }
            Opcode::ReadOtpChip => {
                let mut data = vec![0u8; size as usize];
                let start = (block.address as usize).min(self.config.otp.len());
                let end = (start + data.len()).min(self.config.otp.len());
                data[..end - start].copy_from_slice(&self.config.otp[start..end]);
                (data, end - start == size as usize)
            }
            Opcode::ReadSdram => match self.memory_range(block.address, size as usize) {
                Some(range) => (self.memory[range].to_vec(), true),
                None => (vec![0u8; size as usize], false),
            },
            Opcode::ReadLba => self.read_lba(block.subcode, block.address, size),
            Opcode::EraseLba => {
                let ok = self.lba_in_range(block.address, size);
                if ok {
                    for i in 0..size {
                        self.sectors.remove(&(block.address + i));
                    }
                }
                (Vec::new(), ok)
            }
            Opcode::SwitchStorage => {
                self.storage = StorageKind::from_subcode(block.subcode);
                (Vec::new(), self.storage != StorageKind::Unknown)
            }
            Opcode::SwitchUsb3 => {
                self.usb3 = true;
                (Vec::new(), true)
            }
            Opcode::ResetDevice => {
                self.resets.push(block.subcode);
                (Vec::new(), true)
            }
            Opcode::ExecSdram => {
                self.execs.push((block.address, size));
                (Vec::new(), true)
            }
            _ if request.direction == Direction::In => {
                (vec![0u8; request.transfer_length as usize], false)
            }
            _ => (Vec::new(), false),
        };
        self.tx.extend(data);
        self.respond(tag, ok);
    }

    fn read_lba(&self, subcode: u8, lba: u32, count: u32) -> (Vec<u8>, bool) {
        let mut data = Vec::with_capacity(count as usize * SECTOR_SIZE);
        if !self.lba_in_range(lba, count) {
            data.resize(count as usize * SECTOR_SIZE, 0);
            return (data, false);
        }
        for i in 0..count {
            let sector = if subcode == 0 {
                self.sectors.get(&(lba + i))
            } else {
                self.vendor.get(&(subcode, lba + i))
            };
            match sector {
                Some(s) => data.extend_from_slice(s),
                None => data.resize(data.len() + SECTOR_SIZE, 0),
            }
        }
        (data, true)
    }

    fn handle_data(&mut self, request: Request, data: Vec<u8>) {
        let block = request.block;
        let ok = match block.opcode {
            Opcode::WriteSdram => match self.memory_range(block.address, data.len()) {
                Some(range) => {
                    self.memory[range].copy_from_slice(&data);
                    true
                }
                None => false,
            },
            Opcode::WriteLba => {
                let count = (data.len() / SECTOR_SIZE) as u32;
                let ok = self.lba_in_range(block.address, count);
                if ok {
                    for (i, sector) in data.chunks(SECTOR_SIZE).enumerate() {
                        let lba = block.address + i as u32;
                        if block.subcode == 0 {
                            self.sectors.insert(lba, sector.to_vec());
                        } else {
                            self.vendor.insert((block.subcode, lba), sector.to_vec());
                        }
                    }
                }
                ok
            }
            _ => false,
        };
        self.respond(request.tag, ok);
    }

    fn process_rx(&mut self) {
        loop {
            match self.phase {
                Phase::Command => {
                    if self.rx.len() < REQUEST_LEN {
                        return;
                    }
                    let mut raw = [0u8; REQUEST_LEN];
                    raw.copy_from_slice(&self.rx[..REQUEST_LEN]);
                    self.rx.drain(..REQUEST_LEN);
                    match decode_request(&raw) {
                        Some(request) => self.handle_request(request),
                        None => log::warn!("dummy: dropping malformed request"),
                    }
                }
                Phase::Data { request, len } => {
                    if self.rx.len() < len {
                        return;
                    }
                    let data: Vec<u8> = self.rx.drain(..len).collect();
                    self.phase = Phase::Command;
                    self.handle_data(request, data);
                }
            }
        }
    }

    fn finish_upload(&mut self, code: u16) {
        let mut buf = std::mem::take(&mut self.upload_rx);
        // trailing zero sent after a 4094-remainder payload
        if buf.len() % UPLOAD_CHUNK == 1 {
            buf.pop();
        }
        if buf.len() < 2 {
            return;
        }
        let body_len = buf.len() - 2;
        let crc = u16::from_be_bytes([buf[body_len], buf[body_len + 1]]);
        let crc_ok = maskrom::crc16(&buf[..body_len]) == crc;
        buf.truncate(body_len);
        if self.config.rc4 {
            maskrom::rc4_obfuscate(&mut buf);
        }
        if crc_ok && code == maskrom::CODE_SRAM {
            self.run_bootstrap(&buf);
        }
        self.uploads.push(Upload {
            code,
            payload: buf,
            crc_ok,
        });
    }

    fn word(buf: &[u8], offset: usize) -> Option<u32> {
        let bytes = buf.get(offset..offset + 4)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn starts_with_code(buf: &[u8], code: &[u32]) -> bool {
        code.iter()
            .enumerate()
            .all(|(i, w)| Self::word(buf, i * 4) == Some(*w))
    }

    /// Interpret the bundled bootstrap images
    fn run_bootstrap(&mut self, buf: &[u8]) {
        if Self::starts_with_code(buf, WRITE_MEMORY.code) {
            let p = WRITE_MEMORY.param_offset;
            let (Some(addr), Some(len)) = (Self::word(buf, p), Self::word(buf, p + 4)) else {
                return;
            };
            let data = &buf[p + 8..];
            let len = (len as usize).min(data.len());
            if let Some(range) = self.memory_range(addr, len) {
                self.memory[range].copy_from_slice(&data[..len]);
            }
        } else if Self::starts_with_code(buf, EXEC_MEMORY.code) {
            if let Some(addr) = Self::word(buf, EXEC_MEMORY.param_offset) {
                self.execs.push((addr, 0));
            }
        }
    }
}

impl Transport for DummyRock {
    fn bulk_out(&mut self, data: &[u8]) -> Result<usize> {
        self.take_failure()?;
        self.rx.extend_from_slice(data);
        self.process_rx();
        Ok(data.len())
    }

    fn bulk_in(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.take_failure()?;
        let n = buf.len().min(self.tx.len());
        for (dst, src) in buf.iter_mut().zip(self.tx.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }

    fn control_out(&mut self, request: u8, _value: u16, index: u16, data: &[u8]) -> Result<usize> {
        if request != UPLOAD_REQUEST {
            return Ok(0);
        }
        self.upload_rx.extend_from_slice(data);
        if data.len() < UPLOAD_CHUNK {
            self.finish_upload(index);
        }
        Ok(data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rkflash_core::maskrom::{CODE_LOADER, CODE_SRAM};
    use rkflash_core::progress::{NoProgress, Progress};
    use rkflash_core::protocol::Command;
    use rkflash_core::storage::{Capability, SN_LBA, SN_MAX_LEN};
    use rkflash_core::transport::recv_all;
    use rkflash_core::ProtocolError;

    fn loader() -> Session<DummyRock> {
        DummyRock::new_default().into_seeded_session(1)
    }

    fn maskrom() -> Session<DummyRock> {
        DummyRock::new(DummyConfig {
            mode: BootMode::Maskrom,
            ..Default::default()
        })
        .into_seeded_session(1)
    }

    /// Records progress calls
    #[derive(Default)]
    struct Recorder {
        total: u64,
        done: u64,
        updates: usize,
        stopped: bool,
    }

    impl Progress for Recorder {
        fn start(&mut self, total_bytes: u64) {
            self.total = total_bytes;
        }
        fn update(&mut self, delta_bytes: u64) {
            self.done += delta_bytes;
            self.updates += 1;
        }
        fn stop(&mut self) {
            self.stopped = true;
        }
    }

    #[test]
    fn test_ready_and_chip_info() {
        let mut s = loader();
        s.ready().unwrap();
        let info = s.chip_info().unwrap();
        assert_eq!(&info[0..4], b"8853");
        assert_eq!(s.chip().name, "RK3588");
    }

    #[test]
    fn test_capability_direct_lba_bit() {
        for (byte0, expected) in [(0x01u8, true), (0x00, false), (0xfe, false), (0xff, true)] {
            let mut config = DummyConfig::default();
            config.capability = [byte0, 0, 0, 0, 0, 0, 0, 0];
            let mut s = DummyRock::new(config).into_seeded_session(7);
            let cap = s.capability().unwrap();
            assert_eq!(cap.direct_lba(), expected, "byte0 = {:#04x}", byte0);
            assert_eq!(cap.contains(Capability::DIRECT_LBA), expected);
        }
    }

    #[test]
    fn test_storage_switch_subcodes() {
        let mut s = loader();
        s.storage_switch(StorageKind::Sd).unwrap();
        s.storage_switch(StorageKind::SpiNor).unwrap();
        let reqs = s.transport().requests();
        assert_eq!(reqs[0].block.opcode, Opcode::SwitchStorage);
        assert_eq!(reqs[0].block.subcode, 2);
        assert_eq!(reqs[1].block.subcode, 9);
        assert_eq!(s.storage_read().unwrap(), StorageKind::SpiNor);
    }

    #[test]
    fn test_storage_switch_unknown_rejected() {
        let mut s = loader();
        assert!(matches!(
            s.storage_switch(StorageKind::Unknown),
            Err(Error::InvalidArgument(_))
        ));
        assert!(s.transport().requests().is_empty());
    }

    #[test]
    fn test_storage_read_default() {
        let mut s = loader();
        assert_eq!(s.storage_read().unwrap(), StorageKind::Emmc);
    }

    #[test]
    fn test_serial_round_trip() {
        for sn in [
            String::new(),
            "RK3588-0001".to_string(),
            "Z".repeat(SN_MAX_LEN),
        ] {
            let mut s = loader();
            s.sn_write(&sn).unwrap();
            assert_eq!(s.sn_read().unwrap(), sn);
        }
    }

    #[test]
    fn test_serial_corrupted_marker() {
        let mut s = loader();
        s.sn_write("ABC").unwrap();
        let mut sector = s.transport().sector(SN_LBA);
        sector[0] = 0x02;
        s.transport_mut().set_sector(SN_LBA, &sector);
        assert!(matches!(s.sn_read(), Err(Error::SerialNotPresent)));
    }

    #[test]
    fn test_serial_too_long_not_sent() {
        let mut s = loader();
        assert!(s.sn_write(&"Z".repeat(SN_MAX_LEN + 1)).is_err());
        assert!(s.transport().requests().is_empty());
    }

    #[test]
    fn test_lba_write_read() {
        let mut s = loader();
        let data: Vec<u8> = (0..300 * 512).map(|i| (i % 251) as u8).collect();
        let mut progress = Recorder::default();
        s.write_lba(1000, 300, &data, &mut progress).unwrap();
        assert_eq!(progress.total, 300 * 512);
        assert_eq!(progress.done, 300 * 512);
        assert_eq!(progress.updates, 3);
        assert!(progress.stopped);

        let mut buf = vec![0u8; 300 * 512];
        s.read_lba(1000, 300, &mut buf, &mut NoProgress).unwrap();
        assert_eq!(buf, data);
    }

    #[test]
    fn test_lba_chunks_on_the_wire() {
        for (count, max) in [(1u32, 128u32), (129, 128), (65536, 128), (70000, 32768)] {
            let mut s = loader();
            s.erase_lba(0x100, count, &mut NoProgress).unwrap();
            let reqs = s.transport().requests();
            let mut next = 0x100u32;
            let mut total = 0u32;
            for req in reqs {
                assert_eq!(req.block.opcode, Opcode::EraseLba);
                assert_eq!(req.transfer_length, 0);
                let SizeField::Narrow(n) = req.block.size else {
                    panic!("erase must use a 16-bit size");
                };
                assert!(u32::from(n) <= max);
                assert_eq!(req.block.address, next);
                next += u32::from(n);
                total += u32::from(n);
            }
            assert_eq!(total, count);
        }
    }

    #[test]
    fn test_large_read_uses_large_chunks() {
        let mut s = loader();
        let count = 65537u32;
        let mut buf = vec![0u8; count as usize * 512];
        s.read_lba(0, count, &mut buf, &mut NoProgress).unwrap();
        let sizes: Vec<_> = s
            .transport()
            .requests()
            .iter()
            .map(|r| (r.block.size, r.transfer_length))
            .collect();
        assert_eq!(
            sizes,
            vec![
                (SizeField::Narrow(16384), 16384 * 512),
                (SizeField::Narrow(16384), 16384 * 512),
                (SizeField::Narrow(16384), 16384 * 512),
                (SizeField::Narrow(16384), 16384 * 512),
                (SizeField::Narrow(1), 512),
            ]
        );
    }

    #[test]
    fn test_erase_clears_sectors() {
        let mut s = loader();
        s.write_lba(10, 2, &[0xAA; 1024], &mut NoProgress).unwrap();
        assert_eq!(s.transport().written_sectors(), 2);
        s.erase_lba(10, 2, &mut NoProgress).unwrap();
        assert_eq!(s.transport().written_sectors(), 0);
    }

    #[test]
    fn test_erase_at_top_of_lba_space() {
        let mut s = loader();
        let start = 0xFFFF_FF00;
        s.write_lba(start, 0x100, &vec![0x11; 0x100 * 512], &mut NoProgress)
            .unwrap();
        assert_eq!(s.transport().written_sectors(), 0x100);
        assert_eq!(s.transport().sector(u32::MAX), [0x11; 512]);

        s.erase_lba(start, 0x100, &mut NoProgress).unwrap();
        assert_eq!(s.transport().written_sectors(), 0);
        let last = s.transport().requests().last().copied().unwrap();
        assert_eq!(last.block.opcode, Opcode::EraseLba);
        assert_eq!(last.block.address, 0xFFFF_FF80);
    }

    #[test]
    fn test_streamed_write_pads_last_sector() {
        let mut s = loader();
        let data = vec![0x5Au8; 700];
        let mut reader: &[u8] = &data;
        s.write_lba_from(20, 2, &mut reader, &mut NoProgress)
            .unwrap();
        let second = s.transport().sector(21);
        assert!(second[..188].iter().all(|&b| b == 0x5A));
        assert!(second[188..].iter().all(|&b| b == 0));

        let mut out = Vec::new();
        s.read_lba_to(20, 2, &mut out, &mut NoProgress).unwrap();
        assert_eq!(out.len(), 1024);
        assert_eq!(&out[..700], &data[..]);
    }

    #[test]
    fn test_vendor_storage_round_trip() {
        let mut s = loader();
        s.vs_write(1, 3, b"vendor blob").unwrap();
        assert_eq!(s.vs_read(1, 3, 11).unwrap(), b"vendor blob");
        // a different type is a different item
        assert_eq!(s.vs_read(2, 3, 4).unwrap(), vec![0u8; 4]);

        let req = s.transport().requests()[0];
        assert_eq!(req.block.opcode, Opcode::WriteLba);
        assert_eq!(req.block.subcode, 1);
        assert_eq!(req.block.address, VENDOR_LBA_BASE + 3);
    }

    #[test]
    fn test_otp_read() {
        let mut s = loader();
        let otp = s.otp_read(0x10, 8).unwrap();
        assert_eq!(otp, (0x10..0x18).collect::<Vec<u8>>());
        let req = s.transport().requests()[0];
        assert_eq!(req.block.address, 0x10);
        assert_eq!(req.block.size, SizeField::Narrow(8));
        assert_eq!(req.transfer_length, 8);
    }

    #[test]
    fn test_flash_detect() {
        let mut s = loader();
        let info = s.flash_detect().unwrap();
        assert_eq!(info, DummyConfig::default().flash_info);
    }

    #[test]
    fn test_flash_detect_fails_on_second_exchange() {
        let mut s = loader();
        s.transport_mut().corrupt_response(1, 5, 0xFF);
        assert!(matches!(
            s.flash_detect(),
            Err(Error::Protocol(ProtocolError::TagMismatch { .. }))
        ));
        assert_eq!(s.transport().requests().len(), 2);
        assert_eq!(
            s.transport().requests()[1].block.opcode,
            Opcode::ReadFlashId
        );
    }

    #[test]
    fn test_memory_read_write() {
        let mut s = loader();
        let data: Vec<u8> = (0..40000u32).map(|i| (i * 3) as u8).collect();
        s.write_memory(0x0020_1000, &data, &mut NoProgress).unwrap();
        let mut buf = vec![0u8; data.len()];
        s.read_memory(0x0020_1000, &mut buf, &mut NoProgress)
            .unwrap();
        assert_eq!(buf, data);

        let sizes: Vec<_> = s
            .transport()
            .requests()
            .iter()
            .filter(|r| r.block.opcode == Opcode::WriteSdram)
            .map(|r| (r.block.address, r.block.size, r.transfer_length))
            .collect();
        assert_eq!(
            sizes,
            vec![
                (0x0020_1000, SizeField::Narrow(16384), 0),
                (0x0020_5000, SizeField::Narrow(16384), 0),
                (0x0020_9000, SizeField::Narrow(7232), 0),
            ]
        );
    }

    #[test]
    fn test_memory_requires_loader() {
        let mut s = maskrom();
        let mut buf = [0u8; 4];
        assert!(matches!(
            s.read_memory(0x0020_0000, &mut buf, &mut NoProgress),
            Err(Error::WrongMode {
                required: BootMode::Loader
            })
        ));
    }

    #[test]
    fn test_reset_and_exec() {
        let mut s = loader();
        s.reset(true).unwrap();
        s.reset(false).unwrap();
        s.exec(0x0020_0000, 0x0830_0000).unwrap();
        s.switch_usb3().unwrap();
        let dev = s.transport();
        assert_eq!(dev.resets(), &[3, 0]);
        assert_eq!(dev.execs(), &[(0x0020_0000, 0x0830_0000)]);
        assert!(dev.usb3());
        assert_eq!(dev.requests()[2].block.subcode, 0xaa);
    }

    #[test]
    fn test_tags_are_deterministic_with_seed() {
        let tags = |seed| {
            let mut s = DummyRock::new_default().into_seeded_session(seed);
            for _ in 0..5 {
                s.ready().unwrap();
            }
            s.transport()
                .requests()
                .iter()
                .map(|r| r.tag)
                .collect::<Vec<_>>()
        };
        assert_eq!(tags(42), tags(42));
        assert_ne!(tags(42), tags(43));
    }

    #[test]
    fn test_corrupted_response_rejected() {
        for offset in 0..8 {
            let mut s = loader();
            s.transport_mut().corrupt_next_response(offset, 0x01);
            let err = s.ready().unwrap_err();
            match offset {
                0..=3 => assert!(matches!(
                    err,
                    Error::Protocol(ProtocolError::BadSignature { .. })
                )),
                _ => assert!(matches!(
                    err,
                    Error::Protocol(ProtocolError::TagMismatch { .. })
                )),
            }
            // the session keeps working afterwards
            s.ready().unwrap();
        }
    }

    #[test]
    fn test_status_byte_is_not_a_failure() {
        let mut s = loader();
        s.transport_mut().corrupt_next_response(12, 0x01);
        s.ready().unwrap();
    }

    #[test]
    fn test_corruption_aborts_chunked_operation() {
        let mut s = loader();
        s.transport_mut().corrupt_next_response(4, 0x80);
        let mut progress = Recorder::default();
        assert!(s.erase_lba(0, 1000, &mut progress).is_err());
        // stopped after the first chunk
        assert_eq!(s.transport().requests().len(), 1);
        assert_eq!(progress.done, 0);
        assert!(!progress.stopped);
    }

    #[test]
    fn test_transport_failure_is_returned() {
        let mut s = loader();
        s.transport_mut().fail_next_transfer();
        assert!(matches!(s.ready(), Err(Error::Transport(_))));
    }

    #[test]
    fn test_missing_response_is_short_transfer() {
        let mut dev = DummyRock::new_default();
        let request = Command::new(Opcode::TestUnitReady).request(1);
        dev.bulk_out(&request.encode()).unwrap();
        dev.drop_pending_input();
        let mut buf = [0u8; 13];
        assert!(matches!(
            recv_all(&mut dev, &mut buf),
            Err(Error::ShortTransfer {
                expected: 13,
                actual: 0
            })
        ));
    }

    #[test]
    fn test_maskrom_upload_recorded() {
        let mut s = maskrom();
        let ddr: Vec<u8> = (0..5000u32).map(|i| i as u8).collect();
        s.maskrom_upload(CODE_SRAM, &ddr, false).unwrap();
        s.maskrom_upload(CODE_LOADER, b"usbplug", false).unwrap();
        let uploads = s.transport().uploads();
        assert_eq!(uploads.len(), 2);
        assert_eq!(uploads[0].code, CODE_SRAM);
        assert_eq!(uploads[0].payload, ddr);
        assert!(uploads[0].crc_ok);
        assert_eq!(uploads[1].code, CODE_LOADER);
        assert_eq!(uploads[1].payload, b"usbplug");
    }

    #[test]
    fn test_maskrom_upload_rc4() {
        let mut s = DummyRock::new(DummyConfig {
            mode: BootMode::Maskrom,
            rc4: true,
            ..Default::default()
        })
        .into_seeded_session(1);
        s.maskrom_upload(CODE_LOADER, b"obfuscated", true).unwrap();
        let upload = &s.transport().uploads()[0];
        assert!(upload.crc_ok);
        assert_eq!(upload.payload, b"obfuscated");
    }

    #[test]
    fn test_maskrom_upload_boundaries() {
        for len in [4094usize, 4095, 4096] {
            let mut s = maskrom();
            let payload = vec![0x11u8; len];
            s.maskrom_upload(CODE_LOADER, &payload, false).unwrap();
            let upload = &s.transport().uploads()[0];
            assert!(upload.crc_ok, "len {}", len);
            assert_eq!(&upload.payload[..len], &payload[..]);
        }
    }

    #[test]
    fn test_bootstrap_write_pages_into_memory() {
        let mut s = maskrom();
        let data: Vec<u8> = (0..2500u32).map(|i| (i ^ 0x5a) as u8).collect();
        let mut progress = Recorder::default();
        s.bootstrap_write(0x0020_0100, &data, false, &mut progress)
            .unwrap();
        assert_eq!(progress.updates, 3);
        assert_eq!(progress.done, 2500);

        let dev = s.transport();
        let uploads = dev.uploads();
        assert_eq!(uploads.len(), 3);
        assert!(uploads.iter().all(|u| u.code == CODE_SRAM && u.crc_ok));
        assert_eq!(&dev.memory()[0x100..0x100 + 2500], &data[..]);
    }

    #[test]
    fn test_bootstrap_exec() {
        let mut s = maskrom();
        s.bootstrap_exec(0x0020_0000, false).unwrap();
        assert_eq!(s.transport().execs(), &[(0x0020_0000, 0)]);
    }

    #[test]
    fn test_bootstrap_requires_maskrom() {
        let mut s = loader();
        assert!(matches!(
            s.bootstrap_exec(0x0020_0000, false),
            Err(Error::WrongMode {
                required: BootMode::Maskrom
            })
        ));
        assert!(s.transport().uploads().is_empty());
    }
}
