//! In-memory driver backends
//!
//! `SimPci` and `SimUsb` serve the devices described by the `[simulator]`
//! config section so the diagnostic menus run without hardware. `SimIpc`
//! plays the IPC group made of the configured peer processes. They keep
//! just enough state to make reads reflect writes; they do not model
//! real driver timing or error behavior.

mod ipc;
mod pci;
mod usb;

pub use ipc::SimIpc;
pub use pci::SimPci;
pub use usb::SimUsb;
