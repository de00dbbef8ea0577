//! USB driver port.
//!
//! Unlike the PCI port this one is shared with background listener threads,
//! so every call takes `&self` and implementations must be `Send + Sync`.

use std::fmt;

use super::DriverResult;

/// Opaque handle of an attached device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UsbDeviceHandle(pub u64);

impl fmt::Display for UsbDeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeType {
    Control,
    Isochronous,
    Bulk,
    Interrupt,
}

impl PipeType {
    /// Transfer type encoded in an endpoint's `bmAttributes`.
    pub fn from_attributes(attributes: u8) -> Self {
        match attributes & 0x3 {
            0 => Self::Control,
            1 => Self::Isochronous,
            2 => Self::Bulk,
            _ => Self::Interrupt,
        }
    }
}

impl fmt::Display for PipeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Control => "Control",
            Self::Isochronous => "Isochronous",
            Self::Bulk => "Bulk",
            Self::Interrupt => "Interrupt",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeDirection {
    In,
    Out,
    InOut,
}

impl fmt::Display for PipeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::In => "In",
            Self::Out => "Out",
            Self::InOut => "In & Out",
        })
    }
}

/// Endpoint descriptor of an alternate setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbEndpoint {
    pub address: u8,
    pub attributes: u8,
    pub max_packet_size: u16,
    pub interval: u8,
}

impl UsbEndpoint {
    pub fn pipe(&self) -> UsbPipe {
        UsbPipe {
            number: u32::from(self.address),
            max_packet_size: u32::from(self.max_packet_size),
            kind: PipeType::from_attributes(self.attributes),
            direction: if self.address & 0x80 != 0 {
                PipeDirection::In
            } else {
                PipeDirection::Out
            },
            interval: u32::from(self.interval),
        }
    }
}

/// A pipe of the active configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbPipe {
    pub number: u32,
    pub max_packet_size: u32,
    pub kind: PipeType,
    pub direction: PipeDirection,
    pub interval: u32,
}

impl UsbPipe {
    /// The default control pipe every device has.
    pub fn control(max_packet_size: u32) -> Self {
        Self {
            number: 0,
            max_packet_size,
            kind: PipeType::Control,
            direction: PipeDirection::InOut,
            interval: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbAltSetting {
    pub alternate: u8,
    pub class: u8,
    pub subclass: u8,
    pub protocol: u8,
    pub endpoints: Vec<UsbEndpoint>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbInterfaceInfo {
    pub number: u32,
    pub alt_settings: Vec<UsbAltSetting>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbConfiguration {
    pub value: u8,
    pub interfaces: Vec<UsbInterfaceInfo>,
}

/// Snapshot of an attached device and its active setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbDevice {
    pub handle: UsbDeviceHandle,
    pub vendor_id: u16,
    pub product_id: u16,
    pub interface_number: u32,
    pub alt_setting: u32,
    pub configurations: Vec<UsbConfiguration>,
    pub pipe0: UsbPipe,
    /// Pipes of the active alternate setting
    pub pipes: Vec<UsbPipe>,
}

impl UsbDevice {
    /// Look up a pipe of the active setting; `0` is the control pipe.
    pub fn find_pipe(&self, number: u32) -> Option<UsbPipe> {
        if number == 0 {
            return Some(self.pipe0);
        }
        self.pipes.iter().copied().find(|p| p.number == number)
    }
}

/// Serial number string descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialNumber {
    pub index: u8,
    pub value: String,
}

/// Access to USB devices through the native driver.
pub trait UsbDriver: Send + Sync {
    /// Devices currently attached.
    fn devices(&self) -> DriverResult<Vec<UsbDevice>>;
    fn device(&self, handle: UsbDeviceHandle) -> DriverResult<UsbDevice>;
    fn set_interface(&self, handle: UsbDeviceHandle, interface: u32, alt_setting: u32)
        -> DriverResult<()>;
    fn reset_pipe(&self, handle: UsbDeviceHandle, pipe: u32) -> DriverResult<()>;

    /// Move data over `pipe`. Reads fill `buf`; writes send it. Control
    /// transfers carry an 8-byte setup packet. Returns the bytes moved.
    fn transfer(
        &self,
        handle: UsbDeviceHandle,
        pipe: u32,
        direction: PipeDirection,
        buf: &mut [u8],
        setup: Option<&[u8; 8]>,
    ) -> DriverResult<usize>;

    /// Abort any transfer pending on `pipe`.
    fn halt_transfer(&self, handle: UsbDeviceHandle, pipe: u32) -> DriverResult<()>;

    /// Submit (`true`) or cancel a selective suspend request.
    fn selective_suspend(&self, handle: UsbDeviceHandle, submit: bool) -> DriverResult<()>;

    /// `None` when the device has no serial number descriptor.
    fn serial_number(&self, handle: UsbDeviceHandle) -> DriverResult<Option<SerialNumber>>;

    /// Named registry properties the driver knows for the device.
    fn properties(&self, handle: UsbDeviceHandle) -> DriverResult<Vec<(String, String)>>;
}
