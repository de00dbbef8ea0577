//! USB diagnostics over the simulated host.

use std::sync::Arc;
use std::time::Duration;

use diagmenu::config::{SimUsbDevice, UsbConfig};
use diagmenu::console::{notify_sink, ScriptedConsole};
use diagmenu::diag::usb::{self, UsbSession};
use diagmenu::driver::sim::SimUsb;
use diagmenu::driver::UsbDriver;
use diagmenu::menu::{MenuTree, Navigator};
use diagmenu::status::{Status, WINDRIVER_STATUS_ERROR};

use crate::common::Captured;

fn menu(devices: &[SimUsbDevice], settings: &UsbConfig, notified: &Captured) -> MenuTree {
    let driver: Arc<dyn UsbDriver> =
        Arc::new(SimUsb::new(devices).with_transfer_delay(Duration::ZERO));
    let session = UsbSession::new(driver, settings, notify_sink(notified.clone()));
    usb::build_menu(session).unwrap()
}

fn run(devices: &[SimUsbDevice], settings: &UsbConfig, script: &str) -> (Status, String) {
    let mut tree = menu(devices, settings, &Captured::default());
    let mut console = ScriptedConsole::scripted(script);
    let status = Navigator::new(&mut tree).run(&mut console).unwrap();
    (status, console.output())
}

#[test]
fn bulk_read_dumps_the_received_bytes() {
    let (status, out) = run(
        &[SimUsbDevice::default()],
        &UsbConfig::default(),
        "4\n1\n81\n4\n99\n99\n",
    );

    assert_eq!(status, Status::SUCCESS);
    assert!(out.contains("Read/Write from/to device's pipes using Single Blocking Transfers\n"));
    assert!(out.contains("Transferred 4 bytes\n00 01 02 03 \n"));
}

#[test]
fn switching_transfer_mode_reveals_stream_checks() {
    let (_, out) = run(
        &[SimUsbDevice::default()],
        &UsbConfig::default(),
        "4\n7\n99\n99\n",
    );

    let before = out.find("using Single Blocking Transfers").unwrap();
    let after = out.find("using Streaming Data Transfers").unwrap();
    assert!(before < after);
    assert!(!out[..after].contains("5. Check streaming READ speed"));
    assert!(out[after..].contains("5. Check streaming READ speed\n6. Check streaming WRITE speed\n"));
}

#[test]
fn control_pipe_is_refused_in_stream_mode() {
    let settings = UsbConfig {
        stream_mode: true,
        ..UsbConfig::default()
    };
    let (_, out) = run(&[SimUsbDevice::default()], &settings, "4\n1\n0\n99\n99\n");

    assert!(out.contains("Cannot perform stream transfer using control pipe."));
    assert!(!out.contains("Please enter setup packet"));
}

#[test]
fn listening_writes_to_the_notify_sink() {
    let notified = Captured::default();
    let mut tree = menu(&[SimUsbDevice::default()], &UsbConfig::default(), &notified);
    let mut console = ScriptedConsole::scripted("4\n3\n81\n\n\n99\n99\n");

    Navigator::new(&mut tree).run(&mut console).unwrap();

    let out = console.output();
    assert!(out.contains("Start listening to pipe\n"));
    assert!(out.contains("Stop listening to pipe\n"));
    assert!(!out.contains("Transfer failed"));
}

#[test]
fn no_devices_until_exit_ends_the_session() {
    let (status, out) = run(&[], &UsbConfig::default(), "\nexit\n");

    assert_eq!(status, WINDRIVER_STATUS_ERROR);
    assert_eq!(
        out.matches("No Devices are currently connected.\nPress Enter to re check or enter EXIT to exit\n")
            .count(),
        2
    );
    assert!(!out.contains("Exit Menu"));
}

#[test]
fn selecting_a_device_changes_the_header() {
    let devices = [
        SimUsbDevice::default(),
        SimUsbDevice {
            vendor_id: 0xabcd,
            product_id: 0x0001,
            serial: None,
        },
    ];
    let (_, out) = run(&devices, &UsbConfig::default(), "6\n2\n7\n99\n");

    assert!(out.contains("  2. Vendor id: 0xabcd, Product id: 0x1, Interface number: 0, Alt. Setting: 0\n"));
    assert!(out.contains("Setting: 0xabcd/0x1/0/0)"));
    assert!(out.ends_with("Serial number is not available\n\nMain Menu (active Dev/Prod/Interface/Alt. Setting: 0xabcd/0x1/0/0)\n----------\n1. Display device configurations\n2. Change interface alternate setting\n3. Reset Pipe\n4. Read/Write from pipes\n5. Selective Suspend\n6. Select Device\n7. Display device serial number\n8. Display device information\n9. Refresh\n99. Exit Menu\n\nEnter option: "));
}
