//! USB diagnostics menu
//!
//! All USB menus share one [`UsbSession`] context: the driver, the attached
//! devices with one active entry, and the transfer mode. The root entry
//! refreshes the device list from the driver each time the operator comes
//! back to it, so "Refresh" is just a leaf that returns to the root.
//!
//! # Module Structure
//!
//! - `device` - configurations, alternate settings, serial number, device
//!   properties and device selection
//! - `pipes` - pipe listing, single and streaming transfers, pipe reset
//! - `listen` - background pipe listener
//! - `suspend` - selective suspend submenu

mod device;
mod listen;
mod pipes;
mod suspend;

use std::sync::Arc;

use log::{error, info, warn};

use crate::config::UsbConfig;
use crate::console::{print_error, Console, NotifySink};
use crate::diag::{status_text, DeviceRegistry};
use crate::driver::{DriverResult, UsbDevice, UsbDeviceHandle, UsbDriver};
use crate::error::DiagResult;
use crate::menu::{shared, MenuOption, MenuTree};
use crate::status::{Status, WINDRIVER_STATUS_ERROR};

pub use listen::{listen_to_pipe, ListenMode};
pub use pipes::print_device_pipes;

/// State shared by every USB menu.
pub struct UsbSession {
    driver: Arc<dyn UsbDriver>,
    devices: DeviceRegistry<UsbDeviceHandle>,
    /// Streaming data transfers instead of single blocking ones
    stream_mode: bool,
    suspended: bool,
    settings: UsbConfig,
    notify: NotifySink,
}

impl UsbSession {
    pub fn new(driver: Arc<dyn UsbDriver>, settings: &UsbConfig, notify: NotifySink) -> Self {
        Self {
            driver,
            devices: DeviceRegistry::new(),
            stream_mode: settings.stream_mode,
            suspended: false,
            settings: settings.clone(),
            notify,
        }
    }

    pub fn driver(&self) -> &dyn UsbDriver {
        self.driver.as_ref()
    }

    pub fn active(&self) -> Option<UsbDeviceHandle> {
        self.devices.active()
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn stream_mode(&self) -> bool {
        self.stream_mode
    }

    /// Sync the registry with the devices the driver reports attached.
    ///
    /// Detached devices are dropped; new ones are appended without
    /// changing the active device unless none was active.
    pub fn refresh(&mut self) -> DriverResult<Vec<UsbDevice>> {
        let attached = self.driver.devices()?;
        self.devices
            .retain(|h| attached.iter().any(|d| d.handle == *h));
        for device in &attached {
            if !self.devices.iter().any(|h| h == device.handle) {
                info!(
                    "attached USB device {} ({:04x}:{:04x})",
                    device.handle, device.vendor_id, device.product_id
                );
                self.devices.insert(device.handle);
            }
        }
        Ok(attached)
    }

    /// Snapshot of the active device, or the status to hand back to the
    /// navigator after telling the operator.
    fn active_device(&self, console: &mut dyn Console) -> DiagResult<Result<UsbDevice, Status>> {
        let device = self.active().map(|h| self.driver.device(h));
        match device {
            Some(Ok(device)) => Ok(Ok(device)),
            other => {
                if let Some(Err(status)) = other {
                    error!("USB device lookup failed: {}", status);
                }
                print_error(console, "Could not get active device")?;
                Ok(Err(WINDRIVER_STATUS_ERROR))
            }
        }
    }

    /// Root entry: wait until a device is attached, then show which one is
    /// active.
    fn enter_main(&mut self, console: &mut dyn Console) -> DiagResult<Status> {
        loop {
            match self.refresh() {
                Ok(_) if self.devices.has_active() => break,
                Ok(_) => {}
                Err(status) => warn!("listing USB devices failed: {}", status),
            }
            writeln!(console)?;
            writeln!(console, "No Devices are currently connected.")?;
            writeln!(console, "Press Enter to re check or enter EXIT to exit")?;
            let line = console.read_line()?;
            if line.trim().eq_ignore_ascii_case("EXIT") {
                return Ok(WINDRIVER_STATUS_ERROR);
            }
        }

        let device = match self.active_device(console)? {
            Ok(device) => device,
            Err(status) => return Ok(status),
        };
        writeln!(console)?;
        writeln!(
            console,
            "Main Menu (active Dev/Prod/Interface/Alt. Setting: 0x{:x}/0x{:x}/{}/{})",
            device.vendor_id, device.product_id, device.interface_number, device.alt_setting
        )?;
        writeln!(console, "----------")?;
        Ok(Status::SUCCESS)
    }
}

/// Tell the operator a driver call failed and return its status.
fn report_failure(console: &mut dyn Console, what: &str, status: Status) -> DiagResult<Status> {
    error!("{}: {}", what, status);
    print_error(console, &format!("{}. Error [{}]", what, status_text(status)))?;
    Ok(status)
}

/// Build the USB main menu over `session`.
pub fn build_menu(session: UsbSession) -> DiagResult<MenuTree> {
    let ctx = shared(session);
    let mut tree = MenuTree::new(MenuOption::new("").on_entry(UsbSession::enter_main), &ctx);
    let root = tree.root();

    tree.attach_siblings(
        root,
        [
            MenuOption::new("Display device configurations").on_entry(device::print_configurations),
            MenuOption::new("Change interface alternate setting").on_entry(device::change_alt_setting),
            MenuOption::new("Reset Pipe").on_entry(pipes::reset_pipe),
        ],
        &ctx,
    )?;
    pipes::attach(&mut tree, root, &ctx)?;
    suspend::attach(&mut tree, root, &ctx)?;
    tree.attach_siblings(
        root,
        [
            MenuOption::new("Select Device")
                .on_entry(device::select_device)
                .hidden_when(|session: &UsbSession| session.device_count() <= 1),
            MenuOption::new("Display device serial number").on_entry(device::print_serial_number),
            MenuOption::new("Display device information").on_entry(device::print_properties),
            MenuOption::new("Refresh"),
        ],
        &ctx,
    )?;

    Ok(tree)
}
