//! PCI and USB diagnostic menus
//!
//! Each subtree is a [`MenuTree`](crate::menu::MenuTree) whose leaves call
//! into a driver port. Sessions own the driver and the open-device
//! registry; feature contexts clone the session and add their own state.
//!
//! # Module Structure
//!
//! - `registry` - open device handles with one active entry
//! - `pci` - PCI main menu and its feature submenus
//! - `usb` - USB main menu, pipe transfers and the listener thread

pub mod pci;
pub mod registry;
pub mod usb;

pub use registry::DeviceRegistry;

use crate::console::Console;
use crate::error::DiagResult;
use crate::status::{describe, Status};

/// `0x.. - description`, the form driver failures are reported in.
pub fn status_text(status: Status) -> String {
    format!("0x{:x} - {}", status.code(), describe(status))
}

/// Wait for the operator to press Enter.
pub fn pause(console: &mut dyn Console) -> DiagResult<()> {
    write!(console, "Press ENTER to continue")?;
    console.read_line()?;
    writeln!(console)
}
