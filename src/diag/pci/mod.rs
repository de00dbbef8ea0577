//! PCI diagnostics menu
//!
//! The root "PCI main menu" offers bus scanning and device selection, the
//! shared buffer and IPC submenus when an IPC driver is present, and six
//! feature submenus that stay hidden until a device is open. Every
//! feature context holds a clone of the [`PciSession`], so all of them see
//! the same driver and the same active device.
//!
//! # Module Structure
//!
//! - `regs` - register tables and capability list walking
//! - `access` - offset, block and address prompts
//! - `device` - bus scan and find-and-open
//! - `ipc` - shared kernel buffers and IPC group messaging
//! - `cfg` - configuration space submenu
//! - `events` - plug-and-play and power management events
//! - `rw_addr` - memory and I/O range access
//! - `interrupts` - interrupt enable/disable
//! - `dma` - DMA buffer allocation
//! - `sriov` - SR-IOV enable/disable

mod access;
mod cfg;
mod device;
mod dma;
mod events;
mod interrupts;
pub mod ipc;
pub mod regs;
mod rw_addr;
mod sriov;

use std::cell::{Cell, RefMut};
use std::rc::Rc;

use log::{error, info};

use crate::console::{print_error, Console, NotifySink};
use crate::diag::{status_text, DeviceRegistry};
use crate::driver::{DeviceHandle, DriverResult, IpcDriver, PciDriver};
use crate::error::DiagResult;
use crate::menu::{shared, MenuOption, MenuTree, Shared};
use crate::status::{Status, INVALID_HANDLE};

pub use device::{find_and_open, print_all_devices};

/// State shared by every PCI menu: the driver, the open device and the
/// output channel for driver notifications.
#[derive(Clone)]
pub struct PciSession {
    driver: Shared<dyn PciDriver>,
    devices: Shared<DeviceRegistry<DeviceHandle>>,
    sriov_enabled: Rc<Cell<bool>>,
    notify: NotifySink,
    ipc: Option<Shared<dyn IpcDriver>>,
}

impl PciSession {
    pub fn new(driver: Shared<dyn PciDriver>, notify: NotifySink) -> Self {
        Self {
            driver,
            devices: shared(DeviceRegistry::new()),
            sriov_enabled: Rc::new(Cell::new(false)),
            notify,
            ipc: None,
        }
    }

    /// Offer the shared buffer and IPC menus over `ipc`.
    pub fn with_ipc(mut self, ipc: Shared<dyn IpcDriver>) -> Self {
        self.ipc = Some(ipc);
        self
    }

    pub fn ipc(&self) -> Option<Shared<dyn IpcDriver>> {
        self.ipc.clone()
    }

    pub fn driver(&self) -> RefMut<'_, dyn PciDriver> {
        self.driver.borrow_mut()
    }

    /// Handle of the open device, if any.
    pub fn active(&self) -> Option<DeviceHandle> {
        self.devices.borrow().active()
    }

    pub fn has_device(&self) -> bool {
        self.active().is_some()
    }

    /// Active handle, or `INVALID_HANDLE` when no device is open.
    pub fn device(&self) -> DriverResult<DeviceHandle> {
        self.active().ok_or(INVALID_HANDLE)
    }

    pub fn notify(&self) -> NotifySink {
        NotifySink::clone(&self.notify)
    }

    /// Record whether this session turned SR-IOV on for the open device.
    pub(crate) fn set_sriov_enabled(&self, enabled: bool) {
        self.sriov_enabled.set(enabled);
    }

    pub(crate) fn adopt(&self, handle: DeviceHandle) {
        self.devices.borrow_mut().open(handle);
    }

    /// Close the active device, disabling SR-IOV first if this session
    /// enabled it. Failures are reported and the handle is dropped anyway.
    pub fn close_active(&self, console: &mut dyn Console) -> DiagResult<()> {
        let Some(handle) = self.active() else {
            return Ok(());
        };
        self.devices.borrow_mut().remove(handle);
        self.close_handle(handle, console)
    }

    /// Close every device the session still holds.
    pub fn close_all(&self, console: &mut dyn Console) -> DiagResult<()> {
        let handles = self.devices.borrow_mut().drain();
        for handle in handles {
            self.close_handle(handle, console)?;
        }
        Ok(())
    }

    /// Release everything the session holds: every open device, then the
    /// IPC registration.
    pub fn shutdown(&self, console: &mut dyn Console) -> DiagResult<()> {
        self.close_all(console)?;
        if let Some(ipc) = &self.ipc {
            let mut ipc = ipc.borrow_mut();
            if ipc.is_registered() {
                ipc.unregister();
                info!("unregistered from IPC");
            }
        }
        Ok(())
    }

    fn close_handle(&self, handle: DeviceHandle, console: &mut dyn Console) -> DiagResult<()> {
        if self.sriov_enabled.replace(false) {
            if let Err(status) = self.driver().sriov_disable(handle) {
                error!("disabling SR-IOV on {} failed: {}", handle, status);
                print_error(
                    console,
                    &format!("pci_diag: Failed Disabling SR-IOV: {}", status_text(status)),
                )?;
            }
        }

        let closed = {
            let mut driver = self.driver();
            if driver.int_enabled(handle) {
                if let Err(status) = driver.int_disable(handle) {
                    error!("disabling interrupts on {} failed: {}", handle, status);
                }
            }
            driver.close(handle)
        };
        if let Err(status) = closed {
            error!("closing {} failed: {}", handle, status);
            print_error(
                console,
                &format!("pci_diag: Failed closing PCI device: {}", status_text(status)),
            )?;
        } else {
            info!("closed PCI device {}", handle);
        }
        Ok(())
    }

    /// Open the first device matching the ids, as done at startup.
    ///
    /// A zero vendor id skips the lookup.
    pub fn open_default(
        &self,
        console: &mut dyn Console,
        vendor_id: u32,
        device_id: u32,
    ) -> DiagResult<Option<DeviceHandle>> {
        if vendor_id == 0 {
            return Ok(None);
        }
        find_and_open(self, console, vendor_id, device_id)
    }
}

/// Build the PCI main menu over `session`.
pub fn build_menu(session: &PciSession) -> DiagResult<MenuTree> {
    let root_ctx = shared(session.clone());
    let mut tree = MenuTree::new(
        MenuOption::new("")
            .title("PCI main menu")
            .on_exit(|session: &mut PciSession, console| {
                session.shutdown(console)?;
                Ok(Status::SUCCESS)
            }),
        &root_ctx,
    );
    let root = tree.root();

    tree.attach_siblings(
        root,
        [
            MenuOption::new("Scan PCI bus").on_entry(|session: &mut PciSession, console| {
                print_all_devices(session, console)?;
                Ok(Status::SUCCESS)
            }),
            MenuOption::new("Find and open a PCI device").on_entry(
                |session: &mut PciSession, console| {
                    session.close_active(console)?;
                    find_and_open(session, console, 0, 0)?;
                    Ok(Status::SUCCESS)
                },
            ),
        ],
        &root_ctx,
    )?;

    ipc::attach(&mut tree, root, session)?;
    cfg::attach(&mut tree, root, session)?;
    events::attach(&mut tree, root, session)?;
    rw_addr::attach(&mut tree, root, session)?;
    interrupts::attach(&mut tree, root, session)?;
    dma::attach(&mut tree, root, session)?;
    sriov::attach(&mut tree, root, session)?;

    Ok(tree)
}


#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::test_support::*;
    use super::*;
    use crate::config::SimPciDevice;
    use crate::console::{notify_sink, ScriptedConsole};
    use crate::driver::sim::{SimIpc, SimPci};
    use crate::driver::IpcIdentity;
    use crate::menu::Navigator;

    #[test]
    fn feature_menus_hidden_until_a_device_is_open() {
        let fixture = open_session(SimPciDevice::default());
        let session = PciSession::new(fixture.session.driver.clone(), fixture.session.notify());
        let mut tree = build_menu(&session).unwrap();
        let mut console = ScriptedConsole::scripted("99\n");
        Navigator::new(&mut tree).run(&mut console).unwrap();
        let out = console.output();
        assert!(out.contains("1. Scan PCI bus\n2. Find and open a PCI device\n99. Exit Menu"));
    }

    #[test]
    fn exit_closes_the_open_device() {
        let fixture = open_session(SimPciDevice::default());
        let mut tree = build_menu(&fixture.session).unwrap();
        let mut console = ScriptedConsole::scripted("99\n");
        let status = Navigator::new(&mut tree).run(&mut console).unwrap();
        assert_eq!(status, Status::SUCCESS);
        assert!(fixture.sim.borrow().open_handles().is_empty());
        assert!(!fixture.session.has_device());
        assert!(console.output().contains("3. Read/write the PCI configuration space"));
    }

    #[test]
    fn close_active_disables_sriov_enabled_here() {
        let fixture = open_session(SimPciDevice::default());
        let handle = fixture.session.active().unwrap();
        fixture.session.driver().sriov_enable(handle, 2).unwrap();
        fixture.session.set_sriov_enabled(true);

        let mut console = ScriptedConsole::scripted("");
        fixture.session.close_active(&mut console).unwrap();
        assert!(console.output().is_empty());
        assert!(fixture.sim.borrow().open_handles().is_empty());
    }

    #[test]
    fn close_all_releases_every_adopted_device() {
        let sim = Rc::new(RefCell::new(SimPci::new(&[
            SimPciDevice::default(),
            SimPciDevice {
                slot: 3,
                ..SimPciDevice::default()
            },
        ])));
        let driver: Shared<dyn PciDriver> = sim.clone();
        let session = PciSession::new(driver, notify_sink(std::io::sink()));
        let slots: Vec<_> = sim.borrow_mut().scan().unwrap().iter().map(|e| e.slot).collect();
        for slot in slots {
            let handle = sim.borrow_mut().open(slot).unwrap();
            session.adopt(handle);
        }
        assert_eq!(sim.borrow().open_handles().len(), 2);

        let mut console = ScriptedConsole::scripted("");
        session.close_all(&mut console).unwrap();
        assert!(sim.borrow().open_handles().is_empty());
        assert!(!session.has_device());
        assert!(console.output().is_empty());
    }

    #[test]
    fn ipc_menus_follow_device_selection() {
        let fixture = open_session(SimPciDevice::default());
        let ipc: Shared<dyn IpcDriver> = Rc::new(RefCell::new(SimIpc::new(&[])));
        let session = fixture.session.clone().with_ipc(Rc::clone(&ipc));
        ipc.borrow_mut()
            .register(
                IpcIdentity {
                    name: "test",
                    group_id: 1,
                    sub_group_id: 2,
                },
                Box::new(|_| {}),
            )
            .unwrap();

        let mut tree = build_menu(&session).unwrap();
        let mut console = ScriptedConsole::scripted("99\n");
        Navigator::new(&mut tree).run(&mut console).unwrap();
        assert!(console.output().contains(
            "2. Find and open a PCI device\n3. Allocate/free Shared Buffer\n4. Manage IPC\n\
             5. Read/write the PCI configuration space"
        ));
        assert!(!ipc.borrow().is_registered());
        assert!(fixture.sim.borrow().open_handles().is_empty());
    }

    #[test]
    fn open_default_skips_zero_vendor() {
        let fixture = open_session(SimPciDevice::default());
        let mut console = ScriptedConsole::scripted("");
        assert_eq!(
            fixture.session.open_default(&mut console, 0, 0).unwrap(),
            None
        );
        assert!(console.output().is_empty());
    }
}
