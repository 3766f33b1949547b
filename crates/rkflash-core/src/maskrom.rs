//! Maskrom code upload
//!
//! In maskrom mode the boot ROM accepts exactly one thing: a blob pushed
//! through vendor control request 0x0C, which it then checks and runs. The
//! `index` field selects the handler (0x471 loads into SRAM and returns,
//! 0x472 loads the next stage and jumps to it).
//!
//! Encoding:
//!
//! 1. optionally RC4-obfuscate the payload with a fixed, public key
//! 2. if `len % 4096 == 4095`, extend by one zero byte; if it is 4094, send a
//!    lone zero byte after everything else (the ROM cannot terminate a
//!    transfer cleanly at either remainder)
//! 3. append CRC-16/CCITT-FALSE of the buffer, big-endian
//! 4. send in control transfers of at most 4096 bytes

use std::path::Path;

use crc::{Crc, CRC_16_IBM_3740};
use rc4::consts::U16;
use rc4::{KeyInit, Rc4, StreamCipher};

use crate::error::{scratch, Error, Result};
use crate::session::Session;
use crate::transport::Transport;

/// Vendor control request number used for uploads
pub const UPLOAD_REQUEST: u8 = 0x0c;
/// Largest single control transfer
pub const UPLOAD_CHUNK: usize = 4096;

/// Handler that runs the upload from SRAM and returns to the boot ROM
pub const CODE_SRAM: u16 = 0x0471;
/// Handler that runs the upload as the next boot stage
pub const CODE_LOADER: u16 = 0x0472;

/// Obfuscation key shared by every Rockchip boot ROM
pub const RC4_KEY: [u8; 16] = [124, 78, 3, 4, 85, 5, 9, 7, 45, 44, 123, 56, 23, 13, 23, 17];

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// A payload ready to be sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedUpload {
    /// Bytes for the main sequence of control transfers
    pub data: Vec<u8>,
    /// Whether a trailing single zero byte must follow
    pub pend: bool,
}

impl EncodedUpload {
    /// Control transfers in the order they are sent
    pub fn transfers(&self) -> impl Iterator<Item = &[u8]> {
        const ZERO: &[u8] = &[0];
        self.data
            .chunks(UPLOAD_CHUNK)
            .chain(self.pend.then_some(ZERO))
    }
}

/// CRC-16 as computed by the boot ROM (poly 0x1021, init 0xFFFF)
pub fn crc16(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}

/// Apply the boot ROM's RC4 obfuscation in place
pub fn rc4_obfuscate(data: &mut [u8]) {
    let mut cipher = Rc4::<U16>::new(&RC4_KEY.into());
    cipher.apply_keystream(data);
}

/// Encode a payload for upload
pub fn encode(payload: &[u8], rc4: bool) -> Result<EncodedUpload> {
    let mut len = payload.len();
    let mut buf = scratch(len + 5)?;
    buf[..len].copy_from_slice(payload);

    if rc4 {
        rc4_obfuscate(&mut buf[..len]);
    }

    let mut pend = false;
    match len % UPLOAD_CHUNK {
        4095 => len += 1,
        4094 => pend = true,
        _ => {}
    }

    let crc = crc16(&buf[..len]);
    buf[len..len + 2].copy_from_slice(&crc.to_be_bytes());
    len += 2;
    buf.truncate(len);

    Ok(EncodedUpload { data: buf, pend })
}

/// Encode `payload` and push it to the boot ROM handler `code`
///
/// The ROM discards incomplete uploads, so a short chunk simply aborts.
pub fn upload<T: Transport + ?Sized>(
    transport: &mut T,
    code: u16,
    payload: &[u8],
    rc4: bool,
) -> Result<()> {
    let encoded = encode(payload, rc4)?;
    log::debug!(
        "Uploading {} bytes to handler 0x{:04x} (rc4={}, pend={})",
        payload.len(),
        code,
        rc4,
        encoded.pend
    );

    for chunk in encoded.transfers() {
        let n = transport.control_out(UPLOAD_REQUEST, 0, code, chunk)?;
        if n != chunk.len() {
            return Err(Error::ShortTransfer {
                expected: chunk.len(),
                actual: n,
            });
        }
    }
    Ok(())
}

impl<T: Transport> Session<T> {
    /// Upload and run a payload through the boot ROM
    pub fn maskrom_upload(&mut self, code: u16, payload: &[u8], rc4: bool) -> Result<()> {
        if !self.is_maskrom() {
            log::warn!(
                "Device is in {} mode; maskrom upload may be ignored",
                self.mode()
            );
        }
        upload(self.transport_mut(), code, payload, rc4)
    }

    /// Upload and run the contents of a file through the boot ROM
    pub fn maskrom_upload_file(&mut self, code: u16, path: &Path, rc4: bool) -> Result<()> {
        let payload = std::fs::read(path)?;
        log::info!(
            "Uploading {} ({} bytes) to handler 0x{:04x}",
            path.display(),
            payload.len(),
            code
        );
        self.maskrom_upload(code, &payload, rc4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16_check_value() {
        assert_eq!(crc16(b"123456789"), 0x29B1);
        assert_eq!(crc16(&[]), 0xFFFF);
    }

    #[test]
    fn test_rc4_known_answer() {
        // RC4 is its own inverse
        let mut data = *b"rockchip maskrom";
        rc4_obfuscate(&mut data);
        assert_ne!(&data, b"rockchip maskrom");
        rc4_obfuscate(&mut data);
        assert_eq!(&data, b"rockchip maskrom");
    }

    #[test]
    fn test_encode_appends_big_endian_crc() {
        let enc = encode(b"123456789", false).unwrap();
        assert_eq!(enc.data.len(), 11);
        assert_eq!(&enc.data[9..], &[0x29, 0xB1]);
        assert!(!enc.pend);
    }

    #[test]
    fn test_encode_rc4_only_covers_payload() {
        let payload = vec![0u8; 100];
        let enc = encode(&payload, true).unwrap();
        let mut expected = payload.clone();
        rc4_obfuscate(&mut expected);
        assert_eq!(&enc.data[..100], &expected[..]);
        assert_eq!(&enc.data[100..], &crc16(&expected).to_be_bytes()[..]);
    }

    #[test]
    fn test_encode_is_deterministic() {
        let payload: Vec<u8> = (0..5000u32).map(|i| (i * 7) as u8).collect();
        assert_eq!(
            encode(&payload, true).unwrap(),
            encode(&payload, true).unwrap()
        );
        assert_eq!(
            encode(&payload, false).unwrap(),
            encode(&payload, false).unwrap()
        );
    }

    #[test]
    fn test_boundary_4095_extends_by_one() {
        for len in [4095usize, 8191] {
            let enc = encode(&vec![0xAAu8; len], false).unwrap();
            assert_eq!(enc.data.len(), len + 1 + 2);
            assert_eq!(enc.data[len], 0);
            assert!(!enc.pend);
            let mut padded = vec![0xAAu8; len];
            padded.push(0);
            assert_eq!(&enc.data[len + 1..], &crc16(&padded).to_be_bytes()[..]);
        }
    }

    #[test]
    fn test_boundary_4094_sets_pend() {
        let enc = encode(&vec![0x55u8; 4094], false).unwrap();
        assert_eq!(enc.data.len(), 4096);
        assert!(enc.pend);
        let transfers: Vec<_> = enc.transfers().collect();
        assert_eq!(transfers.len(), 2);
        assert_eq!(transfers[0].len(), 4096);
        assert_eq!(transfers[1], &[0u8][..]);
    }

    #[test]
    fn test_other_remainders_unchanged() {
        for len in [0usize, 1, 4093, 4096, 4097, 12288] {
            let enc = encode(&vec![1u8; len], false).unwrap();
            assert_eq!(enc.data.len(), len + 2, "len {}", len);
            assert!(!enc.pend, "len {}", len);
        }
    }

    /// Records control transfers and accepts `short_by` fewer bytes on call `short_at`
    struct Rom {
        transfers: Vec<(u8, u16, usize)>,
        short_at: usize,
        short_by: usize,
        fail: bool,
    }

    impl Rom {
        fn new(short_at: usize, short_by: usize) -> Self {
            Self {
                transfers: Vec::new(),
                short_at,
                short_by,
                fail: false,
            }
        }
    }

    impl Transport for Rom {
        fn bulk_out(&mut self, _: &[u8]) -> Result<usize> {
            Ok(0)
        }

        fn bulk_in(&mut self, _: &mut [u8]) -> Result<usize> {
            Ok(0)
        }

        fn control_out(&mut self, request: u8, _: u16, index: u16, data: &[u8]) -> Result<usize> {
            let call = self.transfers.len();
            self.transfers.push((request, index, data.len()));
            if call != self.short_at {
                return Ok(data.len());
            }
            if self.fail {
                return Err(Error::Transport("stall".into()));
            }
            Ok(data.len() - self.short_by)
        }
    }

    #[test]
    fn test_upload_sends_every_transfer() {
        let mut rom = Rom::new(usize::MAX, 0);
        upload(&mut rom, CODE_SRAM, &[0u8; 8190], false).unwrap();
        assert_eq!(
            rom.transfers,
            vec![
                (UPLOAD_REQUEST, CODE_SRAM, 4096),
                (UPLOAD_REQUEST, CODE_SRAM, 4096),
                (UPLOAD_REQUEST, CODE_SRAM, 1),
            ]
        );
    }

    #[test]
    fn test_upload_stops_at_short_chunk() {
        // 8190 bytes encode to two full chunks plus the pend byte
        let payload = [0u8; 8190];
        let mut rom = Rom::new(1, 100);
        let err = upload(&mut rom, CODE_LOADER, &payload, false).unwrap_err();
        assert!(matches!(
            err,
            Error::ShortTransfer {
                expected: 4096,
                actual: 3996
            }
        ));
        assert_eq!(rom.transfers.len(), 2);

        let mut rom = Rom::new(0, 1);
        assert!(upload(&mut rom, CODE_SRAM, &payload, true).is_err());
        assert_eq!(rom.transfers.len(), 1);
    }

    #[test]
    fn test_upload_stops_at_failed_chunk() {
        let mut rom = Rom::new(0, 0);
        rom.fail = true;
        let err = upload(&mut rom, CODE_SRAM, &[0u8; 8190], true).unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(rom.transfers.len(), 1);
    }

    #[test]
    fn test_transfers_chunking() {
        let enc = encode(&vec![0u8; 10000], false).unwrap();
        let sizes: Vec<_> = enc.transfers().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![4096, 4096, 1810]);
    }
}
