//! Bus scan listing and device selection.

use log::{error, info};

use super::PciSession;
use crate::console::{input_number, input_u32, print_error, Console, Input};
use crate::diag::status_text;
use crate::driver::{DeviceHandle, PciScanEntry};
use crate::error::DiagResult;

/// List every device on the bus, pausing after each one.
pub fn print_all_devices(session: &PciSession, console: &mut dyn Console) -> DiagResult<()> {
    let scanned = session.driver().scan();
    let devices = match scanned {
        Ok(devices) => devices,
        Err(status) => {
            return print_error(
                console,
                &format!("Failed scanning PCI bus. Error [{}]", status_text(status)),
            );
        }
    };

    if devices.is_empty() {
        return writeln!(console, "No devices were found on the PCI bus");
    }

    writeln!(console)?;
    writeln!(console, "Found {} devices on the PCI bus:", devices.len())?;
    writeln!(console, "---------------------------------")?;
    for (i, entry) in devices.iter().enumerate() {
        writeln!(
            console,
            "{:2}. Vendor ID: [0x{:x}], Device ID: [0x{:x}]",
            i + 1,
            entry.id.vendor_id,
            entry.id.device_id
        )?;
        writeln!(console, "    Location: {}", entry.slot)?;
        write!(console, "Press ENTER to proceed to next device")?;
        console.read_line()?;
        writeln!(console)?;
    }
    Ok(())
}

/// Find a device by vendor/device id and make it the active device.
///
/// A zero `vendor_id` prompts for both ids, where zero matches any. When
/// several devices match, the operator picks one.
pub fn find_and_open(
    session: &PciSession,
    console: &mut dyn Console,
    vendor_id: u32,
    device_id: u32,
) -> DiagResult<Option<DeviceHandle>> {
    let Some(entry) = find_device(session, console, vendor_id, device_id)? else {
        return Ok(None);
    };

    let opened = session.driver().open(entry.slot);
    match opened {
        Ok(handle) => {
            info!("opened PCI device {} at {}", handle, entry.slot);
            session.adopt(handle);
            Ok(Some(handle))
        }
        Err(status) => {
            error!("opening {} failed: {}", entry.slot, status);
            print_error(
                console,
                &format!("Failed opening PCI device. Error [{}]", status_text(status)),
            )?;
            Ok(None)
        }
    }
}

fn find_device(
    session: &PciSession,
    console: &mut dyn Console,
    mut vendor_id: u32,
    mut device_id: u32,
) -> DiagResult<Option<PciScanEntry>> {
    if vendor_id == 0 {
        let Input::Value(vendor) = input_u32(console, "Enter vendor ID", true, 0, 0)? else {
            return Ok(None);
        };
        let Input::Value(device) = input_u32(console, "Enter device ID", true, 0, 0)? else {
            return Ok(None);
        };
        vendor_id = vendor;
        device_id = device;
    }

    let scanned = session.driver().scan();
    let devices: Vec<PciScanEntry> = match scanned {
        Ok(devices) => devices
            .into_iter()
            .filter(|entry| entry.id.matches(vendor_id, device_id))
            .collect(),
        Err(status) => {
            print_error(
                console,
                &format!(
                    "DeviceFind: Failed scanning the PCI bus.\nError [{}]",
                    status_text(status)
                ),
            )?;
            return Ok(None);
        }
    };

    if devices.is_empty() {
        writeln!(
            console,
            "No matching PCI device was found for search criteria (Vendor ID 0x{:x}, Device ID 0x{:x})",
            vendor_id, device_id
        )?;
        return Ok(None);
    }

    writeln!(
        console,
        "\nFound {} matching device{} [ Vendor ID 0x{:x}{}, Device ID 0x{:x}{} ]:",
        devices.len(),
        if devices.len() > 1 { "s" } else { "" },
        vendor_id,
        if vendor_id == 0 { " (ALL)" } else { "" },
        device_id,
        if device_id == 0 { " (ALL)" } else { "" }
    )?;
    for (i, entry) in devices.iter().enumerate() {
        writeln!(console)?;
        writeln!(
            console,
            "{:2}. Vendor ID: 0x{:x}, Device ID: 0x{:x}",
            i + 1,
            entry.id.vendor_id,
            entry.id.device_id
        )?;
        writeln!(console, "    Location: {}", entry.slot)?;
    }
    writeln!(console)?;

    if devices.len() == 1 {
        return Ok(devices.first().copied());
    }

    let prompt = format!("Select a device (1 - {})", devices.len());
    match input_number(console, &prompt, false, 1, devices.len() as u64)? {
        Input::Value(choice) => Ok(devices.get(choice as usize - 1).copied()),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimPciDevice;
    use crate::console::ScriptedConsole;
    use crate::diag::pci::test_support::open_session;

    fn two_devices() -> Vec<SimPciDevice> {
        vec![
            SimPciDevice::default(),
            SimPciDevice {
                vendor_id: 0x8086,
                device_id: 0x1533,
                slot: 3,
                ..SimPciDevice::default()
            },
        ]
    }

    fn session_over(devices: &[SimPciDevice]) -> PciSession {
        use crate::console::notify_sink;
        use crate::driver::sim::SimPci;
        use crate::driver::PciDriver;
        use crate::menu::{shared, Shared};

        let driver: Shared<dyn PciDriver> = shared(SimPci::new(devices));
        PciSession::new(driver, notify_sink(std::io::sink()))
    }

    #[test]
    fn scan_lists_each_device_with_location() {
        let session = session_over(&two_devices());
        let mut console = ScriptedConsole::scripted("\n\n");
        print_all_devices(&session, &mut console).unwrap();
        let out = console.output();
        assert!(out.contains("Found 2 devices on the PCI bus:"));
        assert!(out.contains(" 2. Vendor ID: [0x8086], Device ID: [0x1533]"));
        assert!(out.contains(
            "    Location: Domain [0x0], Bus [0x1], Slot [0x3], Function [0x0]"
        ));
    }

    #[test]
    fn empty_bus_is_reported() {
        let session = session_over(&[]);
        let mut console = ScriptedConsole::scripted("");
        print_all_devices(&session, &mut console).unwrap();
        assert_eq!(console.output(), "No devices were found on the PCI bus\n");
    }

    #[test]
    fn wildcard_search_prompts_for_selection() {
        let session = session_over(&two_devices());
        let mut console = ScriptedConsole::scripted("0\n0\n2\n");
        let handle = find_and_open(&session, &mut console, 0, 0).unwrap();
        assert!(handle.is_some());
        assert_eq!(session.active(), handle);
        let out = console.output();
        assert!(out.contains("Found 2 matching devices [ Vendor ID 0x0 (ALL), Device ID 0x0 (ALL) ]:"));
        assert!(out.contains("Select a device (1 - 2)"));
        let info = session.driver().device_info(handle.unwrap()).unwrap();
        assert_eq!(info.id.vendor_id, 0x8086);
    }

    #[test]
    fn vendor_id_wider_than_32_bits_is_rejected() {
        let session = session_over(&two_devices());
        let mut console = ScriptedConsole::scripted("1000010ee\n");
        assert_eq!(find_and_open(&session, &mut console, 0, 0).unwrap(), None);
        assert!(!session.has_device());
        assert!(console
            .output()
            .contains("Invalid input: Input must be between 0x0 and 0xFFFFFFFF"));
        assert!(console.remaining_input().is_empty());
    }

    #[test]
    fn single_match_opens_without_prompt() {
        let session = session_over(&two_devices());
        let mut console = ScriptedConsole::scripted("");
        let handle = session.open_default(&mut console, 0x10ee, 0x7011).unwrap();
        assert!(handle.is_some());
        assert!(console.output().contains("Found 1 matching device [ Vendor ID 0x10ee, Device ID 0x7011 ]:"));
    }

    #[test]
    fn no_match_leaves_session_without_device() {
        let session = session_over(&two_devices());
        let mut console = ScriptedConsole::scripted("");
        assert_eq!(find_and_open(&session, &mut console, 0x1234, 0).unwrap(), None);
        assert!(!session.has_device());
        assert!(console.output().contains(
            "No matching PCI device was found for search criteria (Vendor ID 0x1234, Device ID 0x0)"
        ));
    }

    #[test]
    fn reopening_the_active_device_fails_cleanly() {
        let fixture = open_session(SimPciDevice::default());
        let mut console = ScriptedConsole::scripted("");
        let result = find_and_open(&fixture.session, &mut console, 0x10ee, 0x7011).unwrap();
        assert_eq!(result, None);
        assert!(console.output().contains("Failed opening PCI device. Error [0x20000011"));
    }
}
