//! Known Rockchip SoCs, keyed by USB product id

/// Rockchip USB vendor id, shared by every SoC in maskrom and loader mode
pub const ROCKCHIP_USB_VENDOR: u16 = 0x2207;

/// A SoC as identified by its USB product id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChipDescriptor {
    /// USB product id
    pub pid: u16,
    /// Marketing name
    pub name: &'static str,
}

/// Descriptor used for product ids missing from [`CHIPS`]
pub static UNKNOWN: ChipDescriptor = ChipDescriptor {
    pid: 0x0000,
    name: "UNKNOWN",
};

/// Every product id we recognize
#[rustfmt::skip]
pub static CHIPS: &[ChipDescriptor] = &[
    ChipDescriptor { pid: 0x110c, name: "RK1106" },
    ChipDescriptor { pid: 0x180a, name: "RK1808" },
    ChipDescriptor { pid: 0x281a, name: "RK2818" },
    ChipDescriptor { pid: 0x290a, name: "RK2918" },
    ChipDescriptor { pid: 0x292a, name: "RK2928" },
    ChipDescriptor { pid: 0x292c, name: "RK3026" },
    ChipDescriptor { pid: 0x300a, name: "RK3066" },
    ChipDescriptor { pid: 0x300b, name: "RK3168" },
    ChipDescriptor { pid: 0x301a, name: "RK3036" },
    ChipDescriptor { pid: 0x310a, name: "RK3066" },
    ChipDescriptor { pid: 0x310b, name: "RK3188" },
    ChipDescriptor { pid: 0x310c, name: "RK3128" },
    ChipDescriptor { pid: 0x320a, name: "RK3288" },
    ChipDescriptor { pid: 0x320b, name: "RK3228" },
    ChipDescriptor { pid: 0x320c, name: "RK3328" },
    ChipDescriptor { pid: 0x330a, name: "RK3368" },
    ChipDescriptor { pid: 0x330c, name: "RK3399" },
    ChipDescriptor { pid: 0x330d, name: "PX30" },
    ChipDescriptor { pid: 0x330e, name: "RK3308" },
    ChipDescriptor { pid: 0x350a, name: "RK3568" },
    ChipDescriptor { pid: 0x350b, name: "RK3588" },
    ChipDescriptor { pid: 0x350d, name: "RK3562" },
    ChipDescriptor { pid: 0x350e, name: "RK3576" },
];

/// Look up a product id, falling back to [`UNKNOWN`]
pub fn lookup(pid: u16) -> &'static ChipDescriptor {
    CHIPS.iter().find(|c| c.pid == pid).unwrap_or(&UNKNOWN)
}

impl ChipDescriptor {
    /// Whether this is the [`UNKNOWN`] sentinel
    pub fn is_unknown(&self) -> bool {
        self.pid == UNKNOWN.pid
    }
}

impl std::fmt::Display for ChipDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({:04x}:{:04x})",
            self.name, ROCKCHIP_USB_VENDOR, self.pid
        )
    }
}
