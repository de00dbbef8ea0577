//! Configuration space register tables and capability lists.

use crate::driver::{AccessWidth, DeviceHandle, DriverResult, PciDriver};

/// A named configuration space register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Register {
    pub name: &'static str,
    /// Offset in config space, relative to the Express capability for
    /// Express registers
    pub offset: u32,
    pub width: AccessWidth,
    pub description: &'static str,
}

const fn reg(name: &'static str, offset: u32, bits: u32, description: &'static str) -> Register {
    let width = match bits {
        8 => AccessWidth::Bits8,
        16 => AccessWidth::Bits16,
        64 => AccessWidth::Bits64,
        _ => AccessWidth::Bits32,
    };
    Register {
        name,
        offset,
        width,
        description,
    }
}

/// Standard type 0 header.
pub const PCI_REGS: &[Register] = &[
    reg("VID", 0x00, 16, "Vendor ID"),
    reg("DID", 0x02, 16, "Device ID"),
    reg("CMD", 0x04, 16, "Command"),
    reg("STS", 0x06, 16, "Status"),
    reg("RID_CLCD", 0x08, 32, "Revision ID & Class Code"),
    reg("SCC", 0x0a, 8, "Sub Class Code"),
    reg("BCC", 0x0b, 8, "Base Class Code"),
    reg("CALN", 0x0c, 8, "Cache Line Size"),
    reg("LAT", 0x0d, 8, "Latency Timer"),
    reg("HDR", 0x0e, 8, "Header Type"),
    reg("BIST", 0x0f, 8, "Built-in Self Test"),
    reg("BADDR0", 0x10, 32, "Base Address 0"),
    reg("BADDR1", 0x14, 32, "Base Address 1"),
    reg("BADDR2", 0x18, 32, "Base Address 2"),
    reg("BADDR3", 0x1c, 32, "Base Address 3"),
    reg("BADDR4", 0x20, 32, "Base Address 4"),
    reg("BADDR5", 0x24, 32, "Base Address 5"),
    reg("CIS", 0x28, 32, "CardBus CIS pointer"),
    reg("SVID", 0x2c, 16, "Sub-system Vendor ID"),
    reg("SDID", 0x2e, 16, "Sub-system Device ID"),
    reg("EROM", 0x30, 32, "Expansion ROM Base Address"),
    reg("NEW_CAP", 0x34, 8, "New Capabilities Pointer"),
    reg("INTLN", 0x3c, 8, "Interrupt Line"),
    reg("INTPIN", 0x3d, 8, "Interrupt Pin"),
    reg("MINGNT", 0x3e, 8, "Minimum Required Burst Period"),
    reg("MAXLAT", 0x3f, 8, "Maximum Latency"),
];

/// PCI Express capability structure.
pub const PCIE_REGS: &[Register] = &[
    reg("PCIE_CAP_ID", 0x00, 8, "PCI Express Capability ID"),
    reg("NEXT_CAP_PTR", 0x01, 8, "Next Capability Pointer"),
    reg("CAP_REG", 0x02, 16, "Capabilities Register"),
    reg("DEV_CAPS", 0x04, 32, "Device Capabilities"),
    reg("DEV_CTL", 0x08, 16, "Device Control"),
    reg("DEV_STS", 0x0a, 16, "Device Status"),
    reg("LNK_CAPS", 0x0c, 32, "Link Capabilities"),
    reg("LNK_CTL", 0x10, 16, "Link Control"),
    reg("LNK_STS", 0x12, 16, "Link Status"),
    reg("SLOT_CAPS", 0x14, 32, "Slot Capabilities"),
    reg("SLOT_CTL", 0x18, 16, "Slot Control"),
    reg("SLOT_STS", 0x1a, 16, "Slot Status"),
    reg("ROOT_CAPS", 0x1e, 16, "Root Capabilities"),
    reg("ROOT_CTL", 0x1c, 16, "Root Control"),
    reg("ROOT_STS", 0x20, 32, "Root Status"),
    reg("DEV_CAPS2", 0x24, 32, "Device Capabilities 2"),
    reg("DEV_CTL2", 0x28, 16, "Device Control 2"),
    reg("DEV_STS2", 0x2a, 16, "Device Status 2"),
    reg("LNK_CAPS2", 0x2c, 32, "Link Capabilities 2"),
    reg("LNK_CTL2", 0x30, 16, "Link Control 2"),
    reg("LNK_STS2", 0x32, 16, "Link Status 2"),
    reg("SLOT_CAPS2", 0x34, 32, "Slot Capabilities 2"),
    reg("SLOT_CTL2", 0x38, 16, "Slot Control 2"),
    reg("SLOT_STS2", 0x3a, 16, "Slot Status 2"),
];

const STS_OFFSET: u32 = 0x06;
const STS_CAP_LIST: u64 = 0x10;
const CAP_PTR_OFFSET: u32 = 0x34;
const EXT_CAP_START: u32 = 0x100;
const MAX_CAPS: usize = 48;

pub const CAP_ID_EXPRESS: u32 = 0x10;

/// A capability found on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capability {
    pub id: u32,
    pub offset: u32,
}

pub fn cap_name(id: u32) -> &'static str {
    match id {
        0x00 => "Null Capability",
        0x01 => "Power Management",
        0x02 => "Accelerated Graphics Port",
        0x03 => "Vital Product Data",
        0x04 => "Slot Identification",
        0x05 => "Message Signalled Interrupts (MSI)",
        0x06 => "CompactPCI HotSwap",
        0x07 => "PCI-X",
        0x08 => "HyperTransport",
        0x09 => "Vendor-Specific",
        0x0a => "Debug port",
        0x0b => "CompactPCI Central Resource Control",
        0x0c => "PCI Standard Hot-Plug Controller",
        0x0d => "Bridge subsystem vendor/device ID",
        0x0e => "AGP Target PCI-PCI bridge",
        0x0f => "Secure Device",
        0x10 => "PCI Express",
        0x11 => "Extended Message Signalled Interrupts (MSI-X)",
        0x12 => "SATA Data/Index Conf.",
        0x13 => "PCI Advanced Features",
        _ => "Unknown",
    }
}

pub fn ext_cap_name(id: u32) -> &'static str {
    match id {
        0x01 => "Advanced Error Reporting (AER)",
        0x02 => "Virtual Channel (VC)",
        0x03 => "Device Serial Number",
        0x04 => "Power Budgeting",
        0x0b => "Vendor-Specific Extended Capability (VSEC)",
        0x0d => "Access Control Services (ACS)",
        0x0e => "Alternative Routing-ID Interpretation (ARI)",
        0x0f => "Address Translation Services (ATS)",
        0x10 => "Single Root I/O Virtualization (SR-IOV)",
        0x11 => "Multi-Root I/O Virtualization (MR-IOV)",
        0x12 => "Multicast",
        0x15 => "Resizable BAR",
        0x18 => "Latency Tolerance Reporting (LTR)",
        0x19 => "Secondary PCI Express",
        0x1e => "L1 PM Substates",
        0x1f => "Precision Time Measurement (PTM)",
        _ => "Unknown",
    }
}

/// Walk the standard capability list, optionally keeping only `filter`.
pub fn scan_caps(
    driver: &mut dyn PciDriver,
    handle: DeviceHandle,
    filter: Option<u32>,
) -> DriverResult<Vec<Capability>> {
    let mut caps = Vec::new();
    let status = driver.read_cfg(handle, STS_OFFSET, AccessWidth::Bits16)?;
    if status & STS_CAP_LIST == 0 {
        return Ok(caps);
    }

    let mut offset = driver.read_cfg(handle, CAP_PTR_OFFSET, AccessWidth::Bits8)? as u32 & 0xfc;
    while offset != 0 && caps.len() < MAX_CAPS {
        let header = driver.read_cfg(handle, offset, AccessWidth::Bits16)? as u32;
        let id = header & 0xff;
        if filter.map_or(true, |f| f == id) {
            caps.push(Capability { id, offset });
        }
        offset = (header >> 8) & 0xfc;
    }
    Ok(caps)
}

/// Walk the PCI Express extended capability list.
///
/// Devices without a PCI Express capability have no extended list.
pub fn scan_ext_caps(
    driver: &mut dyn PciDriver,
    handle: DeviceHandle,
    filter: Option<u32>,
) -> DriverResult<Vec<Capability>> {
    let mut caps = Vec::new();
    if express_offset(driver, handle)?.is_none() {
        return Ok(caps);
    }

    let mut offset = EXT_CAP_START;
    while offset != 0 && caps.len() < MAX_CAPS {
        let header = driver.read_cfg(handle, offset, AccessWidth::Bits32)? as u32;
        if header == 0 || header == u32::MAX {
            break;
        }
        let id = header & 0xffff;
        if filter.map_or(true, |f| f == id) {
            caps.push(Capability { id, offset });
        }
        offset = (header >> 20) & 0xffc;
    }
    Ok(caps)
}

/// Offset of the PCI Express capability, if the device has one.
pub fn express_offset(driver: &mut dyn PciDriver, handle: DeviceHandle) -> DriverResult<Option<u32>> {
    Ok(scan_caps(driver, handle, Some(CAP_ID_EXPRESS))?
        .first()
        .map(|cap| cap.offset))
}
