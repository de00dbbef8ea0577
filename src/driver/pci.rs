//! PCI driver port.

use std::fmt;

use super::DriverResult;

/// Bus location of a PCI function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PciSlot {
    pub domain: u32,
    pub bus: u32,
    pub slot: u32,
    pub function: u32,
}

impl fmt::Display for PciSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Domain [0x{:x}], Bus [0x{:x}], Slot [0x{:x}], Function [0x{:x}]",
            self.domain, self.bus, self.slot, self.function
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PciDeviceId {
    pub vendor_id: u32,
    pub device_id: u32,
}

impl PciDeviceId {
    /// Whether this id matches a search where `0` stands for "any".
    pub fn matches(&self, vendor_id: u32, device_id: u32) -> bool {
        (vendor_id == 0 || vendor_id == self.vendor_id)
            && (device_id == 0 || device_id == self.device_id)
    }
}

/// One function found by a bus scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PciScanEntry {
    pub id: PciDeviceId,
    pub slot: PciSlot,
}

/// Opaque handle of an open device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(pub u64);

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// Width of a single register or memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessWidth {
    Bits8,
    Bits16,
    #[default]
    Bits32,
    Bits64,
}

impl AccessWidth {
    pub const ALL: [AccessWidth; 4] = [Self::Bits8, Self::Bits16, Self::Bits32, Self::Bits64];

    pub fn bytes(self) -> usize {
        match self {
            Self::Bits8 => 1,
            Self::Bits16 => 2,
            Self::Bits32 => 4,
            Self::Bits64 => 8,
        }
    }

    pub fn bits(self) -> u32 {
        self.bytes() as u32 * 8
    }

    /// Width of `bytes` bytes, if it is one of the supported sizes.
    pub fn from_bytes(bytes: usize) -> Option<Self> {
        Self::ALL.into_iter().find(|w| w.bytes() == bytes)
    }

    /// Largest value an access of this width can carry.
    pub fn max_value(self) -> u64 {
        match self {
            Self::Bits64 => u64::MAX,
            other => (1u64 << other.bits()) - 1,
        }
    }
}

impl fmt::Display for AccessWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bit", self.bits())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrSpaceKind {
    Memory,
    Io,
}

impl fmt::Display for AddrSpaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Memory => "Memory",
            Self::Io => "I/O",
        })
    }
}

/// One base address register of an open device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddrSpace {
    pub bar: usize,
    pub kind: AddrSpaceKind,
    pub base: u64,
    pub size: u64,
    pub active: bool,
}

/// Plug-and-play or power management notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PciEvent {
    Insert,
    Remove,
    PowerChangedD0,
    PowerChangedD1,
    PowerChangedD2,
    PowerChangedD3,
    PowerSystemWorking,
    PowerSystemSleeping1,
    PowerSystemSleeping2,
    PowerSystemSleeping3,
    PowerSystemHibernate,
    PowerSystemShutdown,
}

impl fmt::Display for PciEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Insert => "WD_INSERT",
            Self::Remove => "WD_REMOVE",
            Self::PowerChangedD0 => "WD_POWER_CHANGED_D0",
            Self::PowerChangedD1 => "WD_POWER_CHANGED_D1",
            Self::PowerChangedD2 => "WD_POWER_CHANGED_D2",
            Self::PowerChangedD3 => "WD_POWER_CHANGED_D3",
            Self::PowerSystemWorking => "WD_POWER_SYSTEM_WORKING",
            Self::PowerSystemSleeping1 => "WD_POWER_SYSTEM_SLEEPING1",
            Self::PowerSystemSleeping2 => "WD_POWER_SYSTEM_SLEEPING2",
            Self::PowerSystemSleeping3 => "WD_POWER_SYSTEM_SLEEPING3",
            Self::PowerSystemHibernate => "WD_POWER_SYSTEM_HIBERNATE",
            Self::PowerSystemShutdown => "WD_POWER_SYSTEM_SHUTDOWN",
        })
    }
}

/// Called from driver context when an event arrives.
pub type EventHandler = Box<dyn Fn(DeviceHandle, PciEvent) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptKind {
    MsiX,
    Msi,
    LevelSensitive,
    EdgeTriggered,
}

impl fmt::Display for InterruptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MsiX => "Extended Message-Signaled Interrupt (MSI-X)",
            Self::Msi => "Message-Signaled Interrupt (MSI)",
            Self::LevelSensitive => "Level-Sensitive Interrupt",
            Self::EdgeTriggered => "Edge-Triggered Interrupt",
        })
    }
}

/// Interrupt types a device supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InterruptOptions {
    pub level_sensitive: bool,
    pub msi: bool,
    pub msix: bool,
}

impl InterruptOptions {
    pub fn is_msi(&self) -> bool {
        self.msi || self.msix
    }
}

/// Details passed to an [`InterruptHandler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptInfo {
    /// Interrupts received since enabling
    pub count: u32,
    pub kind: InterruptKind,
    /// Set for MSI and MSI-X
    pub message_data: Option<u32>,
}

/// Called from driver context for every interrupt.
pub type InterruptHandler = Box<dyn Fn(DeviceHandle, &InterruptInfo) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaRequest {
    /// Physically contiguous buffer; `addr_width` 0 picks the default
    Contiguous { size: u32, addr_width: u32 },
    ScatterGather { size: u32 },
    /// Claim memory reserved at boot
    Reserved { phys_addr: u64, size: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaPage {
    pub phys_addr: u64,
    pub size: u32,
}

/// A locked DMA buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DmaBuffer {
    pub request: DmaRequest,
    /// Handle other processes use to attach to the buffer
    pub global_handle: u32,
    pub user_addr: u64,
    pub pages: Vec<DmaPage>,
}

impl DmaBuffer {
    pub fn size(&self) -> u64 {
        self.pages.iter().map(|p| u64::from(p.size)).sum()
    }
}

/// Access to PCI devices through the native driver.
pub trait PciDriver {
    fn scan(&mut self) -> DriverResult<Vec<PciScanEntry>>;
    fn open(&mut self, slot: PciSlot) -> DriverResult<DeviceHandle>;
    fn close(&mut self, handle: DeviceHandle) -> DriverResult<()>;
    fn device_info(&self, handle: DeviceHandle) -> DriverResult<PciScanEntry>;

    fn read_cfg(&mut self, handle: DeviceHandle, offset: u32, width: AccessWidth)
        -> DriverResult<u64>;
    fn write_cfg(
        &mut self,
        handle: DeviceHandle,
        offset: u32,
        width: AccessWidth,
        value: u64,
    ) -> DriverResult<()>;
    fn read_cfg_block(&mut self, handle: DeviceHandle, offset: u32, len: usize)
        -> DriverResult<Vec<u8>>;
    fn write_cfg_block(&mut self, handle: DeviceHandle, offset: u32, data: &[u8])
        -> DriverResult<()>;

    fn addr_spaces(&self, handle: DeviceHandle) -> DriverResult<Vec<AddrSpace>>;
    fn read_addr(
        &mut self,
        handle: DeviceHandle,
        bar: usize,
        offset: u64,
        width: AccessWidth,
    ) -> DriverResult<u64>;
    fn write_addr(
        &mut self,
        handle: DeviceHandle,
        bar: usize,
        offset: u64,
        width: AccessWidth,
        value: u64,
    ) -> DriverResult<()>;
    fn read_block(
        &mut self,
        handle: DeviceHandle,
        bar: usize,
        offset: u64,
        len: usize,
        width: AccessWidth,
    ) -> DriverResult<Vec<u8>>;
    fn write_block(
        &mut self,
        handle: DeviceHandle,
        bar: usize,
        offset: u64,
        data: &[u8],
        width: AccessWidth,
    ) -> DriverResult<()>;

    fn event_register(&mut self, handle: DeviceHandle, handler: EventHandler)
        -> DriverResult<()>;
    fn event_unregister(&mut self, handle: DeviceHandle) -> DriverResult<()>;
    fn events_registered(&self, handle: DeviceHandle) -> bool;

    fn int_enable(&mut self, handle: DeviceHandle, handler: InterruptHandler)
        -> DriverResult<()>;
    fn int_disable(&mut self, handle: DeviceHandle) -> DriverResult<()>;
    fn int_enabled(&self, handle: DeviceHandle) -> bool;
    fn int_options(&self, handle: DeviceHandle) -> DriverResult<InterruptOptions>;

    fn dma_alloc(&mut self, handle: DeviceHandle, request: DmaRequest) -> DriverResult<DmaBuffer>;
    fn dma_free(&mut self, handle: DeviceHandle, buffer: DmaBuffer) -> DriverResult<()>;

    fn sriov_enable(&mut self, handle: DeviceHandle, num_vfs: u32) -> DriverResult<()>;
    fn sriov_disable(&mut self, handle: DeviceHandle) -> DriverResult<()>;
    fn sriov_num_vfs(&self, handle: DeviceHandle) -> DriverResult<u32>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_width_limits() {
        assert_eq!(AccessWidth::Bits8.max_value(), 0xff);
        assert_eq!(AccessWidth::Bits32.max_value(), 0xffff_ffff);
        assert_eq!(AccessWidth::Bits64.max_value(), u64::MAX);
        assert_eq!(AccessWidth::from_bytes(2), Some(AccessWidth::Bits16));
        assert_eq!(AccessWidth::from_bytes(3), None);
        assert_eq!(AccessWidth::default().to_string(), "32 bit");
    }

    #[test]
    fn zero_ids_match_anything() {
        let id = PciDeviceId {
            vendor_id: 0x10ee,
            device_id: 0x7011,
        };
        assert!(id.matches(0, 0));
        assert!(id.matches(0x10ee, 0));
        assert!(!id.matches(0x10ee, 0x7012));
    }
}
