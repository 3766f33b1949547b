//! Rockchip USB command opcodes
//!
//! Each opcode carries a fixed command-block length and data direction. The
//! table lives in one place so frame construction never infers either from
//! the numeric value.

/// Direction of the data phase, from the host's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Host to device
    Out,
    /// Device to host
    In,
}

impl Direction {
    /// Value of the request's direction flag byte
    pub const fn flag(self) -> u8 {
        match self {
            Direction::Out => 0x00,
            Direction::In => 0x80,
        }
    }
}

/// Command opcodes understood by maskrom and loader firmware
#[allow(missing_docs)]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    TestUnitReady = 0x00,
    ReadFlashId = 0x01,
    TestBadBlock = 0x03,
    ReadSector = 0x04,
    WriteSector = 0x05,
    EraseNormal = 0x06,
    EraseForce = 0x0b,
    ReadLba = 0x14,
    WriteLba = 0x15,
    EraseSystem = 0x16,
    ReadSdram = 0x17,
    WriteSdram = 0x18,
    ExecSdram = 0x19,
    ReadFlashInfo = 0x1a,
    ReadChipInfo = 0x1b,
    SetResetFlag = 0x1e,
    WriteEfuse = 0x1f,
    ReadEfuse = 0x20,
    ReadSpiFlash = 0x21,
    WriteSpiFlash = 0x22,
    WriteNewEfuse = 0x23,
    ReadNewEfuse = 0x24,
    EraseLba = 0x25,
    ReadComLog = 0x28,
    SwitchStorage = 0x2a,
    ReadStorage = 0x2b,
    ReadOtpChip = 0x2c,
    ReadCapability = 0xaa,
    SwitchUsb3 = 0xbb,
    ResetDevice = 0xff,
}

const UNLISTED: (Opcode, u8, Direction) = (Opcode::TestUnitReady, 6, Direction::In);

/// (opcode, command length, direction)
const OPCODE_TABLE: &[(Opcode, u8, Direction)] = &[
    (Opcode::TestUnitReady, 6, Direction::In),
    (Opcode::ReadFlashId, 6, Direction::In),
    (Opcode::TestBadBlock, 10, Direction::In),
    (Opcode::ReadSector, 10, Direction::In),
    (Opcode::WriteSector, 10, Direction::Out),
    (Opcode::EraseNormal, 10, Direction::Out),
    (Opcode::EraseForce, 10, Direction::Out),
    (Opcode::ReadLba, 10, Direction::In),
    (Opcode::WriteLba, 10, Direction::Out),
    (Opcode::EraseSystem, 6, Direction::Out),
    (Opcode::ReadSdram, 10, Direction::In),
    (Opcode::WriteSdram, 10, Direction::Out),
    (Opcode::ExecSdram, 10, Direction::Out),
    (Opcode::ReadFlashInfo, 6, Direction::In),
    (Opcode::ReadChipInfo, 6, Direction::In),
    (Opcode::SetResetFlag, 6, Direction::Out),
    (Opcode::WriteEfuse, 16, Direction::Out),
    (Opcode::ReadEfuse, 16, Direction::In),
    (Opcode::ReadSpiFlash, 10, Direction::In),
    (Opcode::WriteSpiFlash, 10, Direction::Out),
    (Opcode::WriteNewEfuse, 16, Direction::Out),
    (Opcode::ReadNewEfuse, 16, Direction::In),
    (Opcode::EraseLba, 10, Direction::Out),
    (Opcode::ReadComLog, 10, Direction::In),
    (Opcode::SwitchStorage, 6, Direction::Out),
    (Opcode::ReadStorage, 6, Direction::In),
    (Opcode::ReadOtpChip, 10, Direction::In),
    (Opcode::ReadCapability, 6, Direction::In),
    (Opcode::SwitchUsb3, 6, Direction::Out),
    (Opcode::ResetDevice, 6, Direction::Out),
];

impl Opcode {
    fn entry(self) -> &'static (Opcode, u8, Direction) {
        OPCODE_TABLE
            .iter()
            .find(|(op, _, _)| *op == self)
            .unwrap_or(&UNLISTED)
    }

    /// Command-block length the device expects (6, 10 or 16)
    pub fn command_length(self) -> u8 {
        self.entry().1
    }

    /// Direction of this opcode's data phase
    pub fn direction(self) -> Direction {
        self.entry().2
    }

    /// Decode an opcode byte
    pub fn from_u8(value: u8) -> Option<Self> {
        OPCODE_TABLE
            .iter()
            .map(|(op, _, _)| *op)
            .find(|op| *op as u8 == value)
    }
}

/// `RESET_DEVICE` subcode: plain reboot
pub const RESET_NORMAL: u8 = 0x00;
/// `RESET_DEVICE` subcode: reboot into maskrom
pub const RESET_MASKROM: u8 = 0x03;
/// `EXEC_SDRAM` subcode used by the loader's jump handler
pub const EXEC_SUBCODE: u8 = 0xaa;
