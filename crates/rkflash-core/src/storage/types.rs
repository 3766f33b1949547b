//! Records returned by loader queries

use bitflags::bitflags;

use super::SECTOR_SIZE;

/// Geometry reported by `READ_FLASH_INFO` plus the `READ_FLASH_ID` bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlashInfo {
    /// Total 512-byte sectors
    pub sector_total: u32,
    /// Erase block size in sectors
    pub block_size: u16,
    /// Page size in sectors
    pub page_size: u8,
    /// ECC strength in bits
    pub ecc_bits: u8,
    /// Access timing
    pub access_time: u8,
    /// Index into the manufacturer table
    pub manufacturer_id: u8,
    /// Bitmap of populated chip selects
    pub chip_select: u8,
    /// Raw flash ID
    pub id: [u8; 5],
}

/// Length of the `READ_FLASH_INFO` block
pub const FLASH_INFO_LEN: usize = 11;
/// Length of the `READ_FLASH_ID` block
pub const FLASH_ID_LEN: usize = 5;

const MANUFACTURERS: &[&str] = &[
    "SAMSUNG", "TOSHIBA", "HYNIX", "INFINEON", "MICRON", "RENESAS", "ST", "INTEL",
];

impl FlashInfo {
    /// Merge the two query results
    pub fn parse(info: &[u8; FLASH_INFO_LEN], id: &[u8; FLASH_ID_LEN]) -> Self {
        Self {
            sector_total: u32::from_le_bytes([info[0], info[1], info[2], info[3]]),
            block_size: u16::from_le_bytes([info[4], info[5]]),
            page_size: info[6],
            ecc_bits: info[7],
            access_time: info[8],
            manufacturer_id: info[9],
            chip_select: info[10],
            id: *id,
        }
    }

    /// Encode the info block (used by simulated devices)
    pub fn encode_info(&self) -> [u8; FLASH_INFO_LEN] {
        let mut buf = [0u8; FLASH_INFO_LEN];
        buf[0..4].copy_from_slice(&self.sector_total.to_le_bytes());
        buf[4..6].copy_from_slice(&self.block_size.to_le_bytes());
        buf[6] = self.page_size;
        buf[7] = self.ecc_bits;
        buf[8] = self.access_time;
        buf[9] = self.manufacturer_id;
        buf[10] = self.chip_select;
        buf
    }

    /// Capacity in bytes
    pub fn capacity(&self) -> u64 {
        u64::from(self.sector_total) * SECTOR_SIZE as u64
    }

    /// Manufacturer name, if the id is in the table
    pub fn manufacturer(&self) -> Option<&'static str> {
        MANUFACTURERS.get(self.manufacturer_id as usize).copied()
    }
}

impl std::fmt::Display for FlashInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Manufacturer: {} ({})",
            self.manufacturer().unwrap_or("UNKNOWN"),
            self.manufacturer_id
        )?;
        writeln!(
            f,
            "Flash size:   {} MiB ({} sectors)",
            self.capacity() >> 20,
            self.sector_total
        )?;
        writeln!(f, "Block size:   {} KiB", u32::from(self.block_size) / 2)?;
        writeln!(f, "Page size:    {} KiB", u32::from(self.page_size) / 2)?;
        writeln!(f, "ECC bits:     {}", self.ecc_bits)?;
        writeln!(f, "Access time:  {}", self.access_time)?;
        writeln!(f, "Chip select:  0x{:02x}", self.chip_select)?;
        write!(
            f,
            "Flash ID:     {:02x} {:02x} {:02x} {:02x} {:02x}",
            self.id[0], self.id[1], self.id[2], self.id[3], self.id[4]
        )
    }
}

bitflags! {
    /// Loader capabilities reported by `READ_CAPABILITY`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capability: u64 {
        /// LBA addressing is direct, without the 4 MiB IDB offset
        const DIRECT_LBA         = 1 << 0;
        /// Vendor storage partition is reachable
        const VENDOR_STORAGE     = 1 << 1;
        /// First 4 MiB of storage can be accessed
        const FIRST_4M_ACCESS    = 1 << 2;
        /// `READ_LBA` is supported
        const READ_LBA           = 1 << 3;
        /// New-style vendor storage layout
        const NEW_VENDOR_STORAGE = 1 << 4;
        /// `READ_COM_LOG` is supported
        const READ_COM_LOG       = 1 << 5;
        /// IDB configuration can be read
        const READ_IDB_CONFIG    = 1 << 6;
        /// Secure mode can be read
        const READ_SECURE_MODE   = 1 << 7;
        /// New IDB format
        const NEW_IDB            = 1 << 8;
        /// `SWITCH_STORAGE` is supported
        const SWITCH_STORAGE     = 1 << 9;
        /// LBA parity checking
        const LBA_PARITY         = 1 << 10;
        /// `READ_OTP_CHIP` is supported
        const READ_OTP_CHIP      = 1 << 11;
        /// `SWITCH_USB3` is supported
        const SWITCH_USB3        = 1 << 12;
    }
}

impl Capability {
    /// Decode the 8-byte little-endian capability block
    ///
    /// Unnamed bits are kept.
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        Self::from_bits_retain(u64::from_le_bytes(bytes))
    }

    /// Whether LBA addressing is direct
    pub fn direct_lba(&self) -> bool {
        self.contains(Self::DIRECT_LBA)
    }

    /// Whether vendor storage is reachable
    pub fn vendor_storage(&self) -> bool {
        self.contains(Self::VENDOR_STORAGE)
    }

    /// Whether the storage medium can be switched
    pub fn switch_storage(&self) -> bool {
        self.contains(Self::SWITCH_STORAGE)
    }

    /// Whether OTP can be read
    pub fn read_otp(&self) -> bool {
        self.contains(Self::READ_OTP_CHIP)
    }

    /// Whether the link can be switched to USB 3
    pub fn switch_usb3(&self) -> bool {
        self.contains(Self::SWITCH_USB3)
    }
}

/// Boot medium selected on the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKind {
    /// Raw NAND
    Flash,
    /// eMMC
    Emmc,
    /// First SD slot
    Sd,
    /// Second SD slot
    Sd1,
    /// SPI NOR
    SpiNor,
    /// SPI NAND
    SpiNand,
    /// RAM disk
    Ram,
    /// USB mass storage
    Usb,
    /// SATA
    Sata,
    /// PCIe NVMe
    Pcie,
    /// Anything the table does not name
    Unknown,
}

/// (kind, switch subcode, name); the reported mask is `1 << subcode`
const STORAGE_TABLE: &[(StorageKind, u8, &str)] = &[
    (StorageKind::Flash, 0, "flash"),
    (StorageKind::Emmc, 1, "emmc"),
    (StorageKind::Sd, 2, "sd"),
    (StorageKind::Sd1, 3, "sd1"),
    (StorageKind::Ram, 6, "ram"),
    (StorageKind::Usb, 7, "usb"),
    (StorageKind::SpiNand, 8, "spinand"),
    (StorageKind::SpiNor, 9, "spinor"),
    (StorageKind::Sata, 10, "sata"),
    (StorageKind::Pcie, 11, "pcie"),
];

impl StorageKind {
    /// Every switchable kind, in table order
    pub fn all() -> impl Iterator<Item = StorageKind> {
        STORAGE_TABLE.iter().map(|(kind, _, _)| *kind)
    }

    fn entry(self) -> Option<&'static (StorageKind, u8, &'static str)> {
        STORAGE_TABLE.iter().find(|(kind, _, _)| *kind == self)
    }

    /// `SWITCH_STORAGE` subcode, `None` for [`StorageKind::Unknown`]
    pub fn subcode(self) -> Option<u8> {
        self.entry().map(|e| e.1)
    }

    /// One-hot value `READ_STORAGE` reports for this kind
    pub fn mask(self) -> Option<u32> {
        self.subcode().map(|s| 1u32 << s)
    }

    /// Kind for a `SWITCH_STORAGE` subcode
    pub fn from_subcode(subcode: u8) -> Self {
        STORAGE_TABLE
            .iter()
            .find(|(_, s, _)| *s == subcode)
            .map_or(StorageKind::Unknown, |e| e.0)
    }

    /// Kind for a `READ_STORAGE` value; zero or multiple bits are unknown
    pub fn from_mask(mask: u32) -> Self {
        if mask.count_ones() != 1 {
            return StorageKind::Unknown;
        }
        match u8::try_from(mask.trailing_zeros()) {
            Ok(bit) => Self::from_subcode(bit),
            Err(_) => StorageKind::Unknown,
        }
    }

    /// Lowercase name
    pub fn name(self) -> &'static str {
        self.entry().map_or("unknown", |e| e.2)
    }
}

impl std::fmt::Display for StorageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for StorageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        STORAGE_TABLE
            .iter()
            .find(|(_, _, name)| *name == lower)
            .map(|e| e.0)
            .ok_or_else(|| {
                let names: Vec<_> = Self::all().map(|k| k.name()).collect();
                format!(
                    "unknown storage '{}', expected one of: {}",
                    s,
                    names.join(", ")
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flash_info_parse() {
        let info = [
            0x00, 0x00, 0x3a, 0x00, 0x00, 0x04, 0x08, 0x28, 0x32, 0x01, 0x01,
        ];
        let id = [0x98, 0xd7, 0x84, 0x93, 0x72];
        let fi = FlashInfo::parse(&info, &id);
        assert_eq!(fi.sector_total, 0x003a_0000);
        assert_eq!(fi.block_size, 0x0400);
        assert_eq!(fi.page_size, 8);
        assert_eq!(fi.ecc_bits, 0x28);
        assert_eq!(fi.access_time, 0x32);
        assert_eq!(fi.manufacturer(), Some("TOSHIBA"));
        assert_eq!(fi.chip_select, 1);
        assert_eq!(fi.id, id);
        assert_eq!(fi.encode_info(), info);
        assert_eq!(fi.capacity(), 0x003a_0000u64 * 512);
    }

    #[test]
    fn test_unknown_manufacturer() {
        let fi = FlashInfo {
            manufacturer_id: 200,
            ..Default::default()
        };
        assert_eq!(fi.manufacturer(), None);
    }

    #[test]
    fn test_capability_bits() {
        let cap = Capability::from_bytes([0x01, 0, 0, 0, 0, 0, 0, 0]);
        assert!(cap.direct_lba());
        assert!(!cap.vendor_storage());

        let cap = Capability::from_bytes([0xfe, 0x1a, 0, 0, 0, 0, 0, 0]);
        assert!(!cap.direct_lba());
        assert!(cap.vendor_storage());
        assert!(cap.switch_storage());
        assert!(cap.read_otp());
        assert!(cap.switch_usb3());

        // unnamed bits survive
        let cap = Capability::from_bytes([0, 0, 0, 0, 0, 0, 0, 0x80]);
        assert_eq!(cap.bits(), 1 << 63);
    }

    #[test]
    fn test_storage_subcodes() {
        assert_eq!(StorageKind::Sd.subcode(), Some(2));
        assert_eq!(StorageKind::SpiNor.subcode(), Some(9));
        assert_eq!(StorageKind::Emmc.subcode(), Some(1));
        assert_eq!(StorageKind::Unknown.subcode(), None);
    }

    #[test]
    fn test_storage_table_round_trips() {
        for kind in StorageKind::all() {
            let sub = kind.subcode().unwrap();
            assert_eq!(StorageKind::from_subcode(sub), kind);
            assert_eq!(StorageKind::from_mask(kind.mask().unwrap()), kind);
            assert_eq!(kind.name().parse::<StorageKind>(), Ok(kind));
        }
    }

    #[test]
    fn test_storage_unknown_values() {
        assert_eq!(StorageKind::from_mask(0), StorageKind::Unknown);
        assert_eq!(StorageKind::from_mask(0b110), StorageKind::Unknown);
        assert_eq!(StorageKind::from_mask(1 << 4), StorageKind::Unknown);
        assert_eq!(StorageKind::from_mask(1 << 31), StorageKind::Unknown);
        assert_eq!(StorageKind::from_subcode(5), StorageKind::Unknown);
        assert!("floppy".parse::<StorageKind>().is_err());
        assert_eq!("SPINOR".parse::<StorageKind>(), Ok(StorageKind::SpiNor));
    }
}
