//! Request and response frames
//!
//! The framing is borrowed from USB mass storage (CBW/CSW) but the byte order
//! is not uniform: signatures, tags and command-block fields are big-endian,
//! while the frame-level transfer length and the residue are little-endian.
//! Real devices depend on this mix, so every field is written explicitly.
//!
//! ```text
//! Request (31 bytes)
//!   0  signature "USBC"      BE u32
//!   4  tag                   BE u32
//!   8  transfer length       LE u32
//!  12  direction flag        0x80 IN / 0x00 OUT
//!  13  lun
//!  14  command length        6 / 10 / 16
//!  15  command block         16 bytes, see CommandBlock
//!
//! Response (13 bytes)
//!   0  signature "USBS"      BE u32
//!   4  tag                   BE u32
//!   8  residue               LE u32
//!  12  status
//! ```

use super::opcodes::{Direction, Opcode};
use crate::error::ProtocolError;

/// Request signature, `"USBC"`
pub const REQUEST_SIGNATURE: u32 = 0x5553_4243;
/// Response signature, `"USBS"`
pub const RESPONSE_SIGNATURE: u32 = 0x5553_4253;

/// Encoded request size
pub const REQUEST_LEN: usize = 31;
/// Encoded response size
pub const RESPONSE_LEN: usize = 13;
/// Encoded command block size
pub const COMMAND_BLOCK_LEN: usize = 16;

/// Size field of a command block
///
/// Most commands carry a 16-bit count. `EXEC_SDRAM` overlays a 32-bit value
/// on the same offset, spilling into the two reserved bytes that follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeField {
    /// Big-endian u16 at offset 7
    Narrow(u16),
    /// Big-endian u32 at offset 7
    Wide(u32),
}

/// The 16-byte command block
///
/// ```text
///  0 opcode   1 subcode   2..6 address (BE)   6 reserved
///  7..9 size (BE)         9..16 reserved
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandBlock {
    /// Command opcode
    pub opcode: Opcode,
    /// Opcode-specific subcode
    pub subcode: u8,
    /// Address, sector or offset, depending on the opcode
    pub address: u32,
    /// Count field
    pub size: SizeField,
}

impl CommandBlock {
    /// A command block with only the opcode set
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            subcode: 0,
            address: 0,
            size: SizeField::Narrow(0),
        }
    }

    /// Encode into 16 bytes
    pub fn encode(&self) -> [u8; COMMAND_BLOCK_LEN] {
        let mut buf = [0u8; COMMAND_BLOCK_LEN];
        buf[0] = self.opcode as u8;
        buf[1] = self.subcode;
        buf[2..6].copy_from_slice(&self.address.to_be_bytes());
        match self.size {
            SizeField::Narrow(n) => buf[7..9].copy_from_slice(&n.to_be_bytes()),
            SizeField::Wide(n) => buf[7..11].copy_from_slice(&n.to_be_bytes()),
        }
        buf
    }
}

/// Everything needed to issue one exchange, minus the tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    /// Command block
    pub block: CommandBlock,
    /// Value for the frame's transfer-length field
    pub transfer_length: u32,
    /// Direction flag
    pub direction: Direction,
    /// Logical unit (flash chip select)
    pub lun: u8,
}

impl Command {
    /// A command for `opcode` using its table direction and no payload
    pub fn new(opcode: Opcode) -> Self {
        Self {
            block: CommandBlock::new(opcode),
            transfer_length: 0,
            direction: opcode.direction(),
            lun: 0,
        }
    }

    /// Set the subcode
    pub fn subcode(mut self, subcode: u8) -> Self {
        self.block.subcode = subcode;
        self
    }

    /// Set the address field
    pub fn address(mut self, address: u32) -> Self {
        self.block.address = address;
        self
    }

    /// Set a 16-bit size field
    pub fn size(mut self, size: u16) -> Self {
        self.block.size = SizeField::Narrow(size);
        self
    }

    /// Set a 32-bit size field
    pub fn wide_size(mut self, size: u32) -> Self {
        self.block.size = SizeField::Wide(size);
        self
    }

    /// Set the frame-level transfer length
    pub fn transfer_length(mut self, len: u32) -> Self {
        self.transfer_length = len;
        self
    }

    /// Build the wire request for this command
    pub fn request(&self, tag: u32) -> Request {
        Request {
            tag,
            transfer_length: self.transfer_length,
            direction: self.direction,
            lun: self.lun,
            command_length: self.block.opcode.command_length(),
            block: self.block,
        }
    }
}

/// A request frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    /// Correlation tag
    pub tag: u32,
    /// Declared data length
    pub transfer_length: u32,
    /// Direction flag
    pub direction: Direction,
    /// Logical unit
    pub lun: u8,
    /// Valid bytes in the command block
    pub command_length: u8,
    /// Command block
    pub block: CommandBlock,
}

impl Request {
    /// Encode into 31 bytes
    pub fn encode(&self) -> [u8; REQUEST_LEN] {
        let mut buf = [0u8; REQUEST_LEN];
        buf[0..4].copy_from_slice(&REQUEST_SIGNATURE.to_be_bytes());
        buf[4..8].copy_from_slice(&self.tag.to_be_bytes());
        buf[8..12].copy_from_slice(&self.transfer_length.to_le_bytes());
        buf[12] = self.direction.flag();
        buf[13] = self.lun;
        buf[14] = self.command_length;
        buf[15..31].copy_from_slice(&self.block.encode());
        buf
    }
}

/// A response frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    /// Signature as received
    pub signature: u32,
    /// Tag as received
    pub tag: u32,
    /// Bytes the device did not transfer
    pub residue: u32,
    /// Device status byte
    pub status: u8,
}

impl Response {
    /// Decode 13 bytes without validating anything
    pub fn decode(buf: &[u8; RESPONSE_LEN]) -> Self {
        Self {
            signature: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
            tag: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            residue: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            status: buf[12],
        }
    }

    /// Encode into 13 bytes (used by simulated devices)
    pub fn encode(&self) -> [u8; RESPONSE_LEN] {
        let mut buf = [0u8; RESPONSE_LEN];
        buf[0..4].copy_from_slice(&self.signature.to_be_bytes());
        buf[4..8].copy_from_slice(&self.tag.to_be_bytes());
        buf[8..12].copy_from_slice(&self.residue.to_le_bytes());
        buf[12] = self.status;
        buf
    }

    /// A well-formed response to the request carrying `tag`
    pub fn ok(tag: u32) -> Self {
        Self {
            signature: RESPONSE_SIGNATURE,
            tag,
            residue: 0,
            status: 0,
        }
    }

    /// Check that this response answers the request carrying `tag`
    pub fn validate(&self, tag: u32) -> Result<(), ProtocolError> {
        if self.signature != RESPONSE_SIGNATURE {
            return Err(ProtocolError::BadSignature {
                found: self.signature,
            });
        }
        if self.tag != tag {
            return Err(ProtocolError::TagMismatch {
                expected: tag,
                found: self.tag,
            });
        }
        Ok(())
    }
}

/// Decode a request frame (used by simulated devices)
pub fn decode_request(buf: &[u8; REQUEST_LEN]) -> Option<Request> {
    if u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) != REQUEST_SIGNATURE {
        return None;
    }
    let opcode = Opcode::from_u8(buf[15])?;
    let direction = match buf[12] {
        0x80 => Direction::In,
        0x00 => Direction::Out,
        _ => return None,
    };
    let cb = &buf[15..31];
    let size = if opcode == Opcode::ExecSdram {
        SizeField::Wide(u32::from_be_bytes([cb[7], cb[8], cb[9], cb[10]]))
    } else {
        SizeField::Narrow(u16::from_be_bytes([cb[7], cb[8]]))
    };
    Some(Request {
        tag: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
        transfer_length: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
        direction,
        lun: buf[13],
        command_length: buf[14],
        block: CommandBlock {
            opcode,
            subcode: cb[1],
            address: u32::from_be_bytes([cb[2], cb[3], cb[4], cb[5]]),
            size,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_layout() {
        let cmd = Command::new(Opcode::ReadLba)
            .address(0x1234_5678)
            .size(0x0080)
            .transfer_length(0x0001_0000);
        let buf = cmd.request(0xDEAD_BEEF).encode();

        assert_eq!(&buf[0..4], b"USBC");
        assert_eq!(&buf[4..8], &[0xDE, 0xAD, 0xBE, 0xEF]);
        // transfer length is little-endian
        assert_eq!(&buf[8..12], &[0x00, 0x00, 0x01, 0x00]);
        assert_eq!(buf[12], 0x80);
        assert_eq!(buf[13], 0);
        assert_eq!(buf[14], 10);
        assert_eq!(buf[15], 0x14);
        assert_eq!(buf[16], 0);
        // address and size are big-endian
        assert_eq!(&buf[17..21], &[0x12, 0x34, 0x56, 0x78]);
        assert_eq!(buf[21], 0);
        assert_eq!(&buf[22..24], &[0x00, 0x80]);
        assert!(buf[24..31].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_wide_size_spills_into_reserved() {
        let cmd = Command::new(Opcode::ExecSdram)
            .address(0x0020_0000)
            .wide_size(0x0830_0000);
        let block = cmd.block.encode();
        assert_eq!(&block[7..11], &[0x08, 0x30, 0x00, 0x00]);
        assert_eq!(block[11], 0);
    }

    #[test]
    fn test_out_direction_flag() {
        let buf = Command::new(Opcode::ResetDevice).request(1).encode();
        assert_eq!(buf[12], 0x00);
        assert_eq!(buf[14], 6);
    }

    #[test]
    fn test_response_validate() {
        let res = Response::ok(0x0102_0304);
        assert_eq!(&res.encode()[0..4], b"USBS");
        assert!(res.validate(0x0102_0304).is_ok());
        assert_eq!(
            res.validate(0x0102_0305),
            Err(ProtocolError::TagMismatch {
                expected: 0x0102_0305,
                found: 0x0102_0304
            })
        );
    }

    #[test]
    fn test_single_byte_corruption_rejected() {
        let tag = 0xA5A5_5A5A;
        let good = Response::ok(tag).encode();
        for i in 0..8 {
            let mut bad = good;
            bad[i] ^= 0x01;
            assert!(
                Response::decode(&bad).validate(tag).is_err(),
                "corruption at byte {} accepted",
                i
            );
        }
        // residue and status are not part of the check
        let mut tail = good;
        tail[8] = 0xFF;
        tail[12] = 0x01;
        assert!(Response::decode(&tail).validate(tag).is_ok());
    }

    #[test]
    fn test_decode_request() {
        let cmd = Command::new(Opcode::WriteLba)
            .address(0xfff0_0001)
            .size(1)
            .transfer_length(512);
        let req = cmd.request(42);
        assert_eq!(decode_request(&req.encode()), Some(req));

        let exec = Command::new(Opcode::ExecSdram)
            .wide_size(0xCAFE_F00D)
            .request(7);
        assert_eq!(decode_request(&exec.encode()), Some(exec));

        let mut bad = req.encode();
        bad[0] = b'X';
        assert_eq!(decode_request(&bad), None);
    }
}
