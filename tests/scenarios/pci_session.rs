//! PCI diagnostics over the simulated bus.

use std::cell::RefCell;
use std::rc::Rc;

use diagmenu::config::SimPciDevice;
use diagmenu::console::{notify_sink, ScriptedConsole};
use diagmenu::diag::pci::{self, PciSession};
use diagmenu::driver::sim::SimPci;
use diagmenu::driver::PciDriver;
use diagmenu::menu::{Navigator, Shared};
use diagmenu::status::Status;

use crate::common::Captured;

fn two_boards() -> Rc<RefCell<SimPci>> {
    Rc::new(RefCell::new(SimPci::new(&[
        SimPciDevice::default(),
        SimPciDevice {
            device_id: 0x7012,
            slot: 1,
            ..SimPciDevice::default()
        },
    ])))
}

fn session_over(sim: &Rc<RefCell<SimPci>>) -> PciSession {
    let driver: Shared<dyn PciDriver> = sim.clone();
    PciSession::new(driver, notify_sink(Captured::default()))
}

#[test]
fn scan_lists_every_device_with_location() {
    let sim = two_boards();
    let session = session_over(&sim);
    let mut tree = pci::build_menu(&session).unwrap();
    let mut console = ScriptedConsole::scripted("1\n\n\n99\n");

    Navigator::new(&mut tree).run(&mut console).unwrap();

    let out = console.output();
    assert!(out.contains("Found 2 devices on the PCI bus:\n---------------------------------\n"));
    assert!(out.contains(" 1. Vendor ID: [0x10ee], Device ID: [0x7011]\n"));
    assert!(out.contains(
        " 2. Vendor ID: [0x10ee], Device ID: [0x7012]\n    Location: Domain [0x0], Bus [0x1], Slot [0x1], Function [0x0]\n"
    ));
    assert_eq!(out.matches("Press ENTER to proceed to next device").count(), 2);
}

#[test]
fn open_by_vendor_then_exit_closes_the_device() {
    let sim = two_boards();
    let session = session_over(&sim);
    let mut tree = pci::build_menu(&session).unwrap();
    let mut console = ScriptedConsole::scripted("2\n10ee\n0\n2\n99\n");

    let status = Navigator::new(&mut tree).run(&mut console).unwrap();

    assert_eq!(status, Status::SUCCESS);
    let out = console.output();
    assert!(out.contains("Found 2 matching devices [ Vendor ID 0x10ee, Device ID 0x0 (ALL) ]:"));
    assert!(out.contains("Select a device (1 - 2) (to cancel press 'x'): "));
    assert!(out.contains("3. Read/write the PCI configuration space\n"));
    assert!(out.contains("7. Allocate/free memory for DMA\n"));
    assert!(!session.has_device());
    assert!(sim.borrow().open_handles().is_empty());
}

#[test]
fn reopening_replaces_the_active_device() {
    let sim = two_boards();
    let session = session_over(&sim);
    let mut tree = pci::build_menu(&session).unwrap();
    let mut console = ScriptedConsole::scripted("2\n10ee\n7011\n2\n10ee\n7012\n");

    // the script ends inside the root menu
    assert!(Navigator::new(&mut tree).run(&mut console).is_err());

    assert_eq!(sim.borrow().open_handles().len(), 1);
    assert_eq!(session.active(), sim.borrow().open_handles().first().copied());
}

#[test]
fn unmatched_search_leaves_features_hidden() {
    let sim = two_boards();
    let session = session_over(&sim);
    let mut tree = pci::build_menu(&session).unwrap();
    let mut console = ScriptedConsole::scripted("2\n8086\n0\n99\n");

    Navigator::new(&mut tree).run(&mut console).unwrap();

    let out = console.output();
    assert!(out.contains(
        "No matching PCI device was found for search criteria (Vendor ID 0x8086, Device ID 0x0)"
    ));
    assert!(!out.contains("3. Read/write the PCI configuration space"));
}
