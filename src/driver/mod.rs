//! Driver collaborator ports
//!
//! Leaf callbacks of the diagnostic menus reach the device only through
//! these traits. Failures are reported as raw driver [`Status`] codes so a
//! leaf can hand them straight back to the navigator.
//!
//! # Module Structure
//!
//! - `pci` - PCI device access: config space, address spaces, events,
//!   interrupts, DMA and SR-IOV
//! - `usb` - USB device access: pipes, transfers, suspend
//! - `ipc` - process groups, messages, shared interrupts and shared
//!   kernel buffers
//! - `sim` - in-memory backends used for demos and tests

pub mod ipc;
pub mod pci;
pub mod sim;
pub mod usb;

use crate::status::Status;

pub use ipc::{
    BufferLayout, IpcDriver, IpcIdentity, IpcMessage, IpcProcess, KernelBuffer, MessageHandler,
    Recipient, IPC_MSG_CONTIG_DMA_BUFFER_READY, IPC_MSG_KERNEL_BUFFER_READY,
};
pub use pci::{
    AccessWidth, AddrSpace, AddrSpaceKind, DeviceHandle, DmaBuffer, DmaPage, DmaRequest,
    EventHandler, InterruptHandler, InterruptInfo, InterruptKind, InterruptOptions, PciDeviceId,
    PciDriver, PciEvent, PciScanEntry, PciSlot,
};
pub use usb::{
    PipeDirection, PipeType, SerialNumber, UsbAltSetting, UsbConfiguration, UsbDevice,
    UsbDeviceHandle, UsbDriver, UsbEndpoint, UsbInterfaceInfo, UsbPipe,
};

/// Result of one driver call.
pub type DriverResult<T> = Result<T, Status>;
