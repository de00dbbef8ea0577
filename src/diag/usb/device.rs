//! Device-level USB actions: descriptors, settings and selection.

use log::info;

use super::{report_failure, UsbSession};
use crate::console::{input_menu_choice, input_number, print_error, Console, Input};
use crate::driver::UsbConfiguration;
use crate::error::DiagResult;
use crate::menu::EXIT_MENU_OPTION;
use crate::status::{Status, INVALID_PARAMETER};

fn print_configuration(console: &mut dyn Console, index: usize, config: &UsbConfiguration) -> DiagResult<()> {
    writeln!(
        console,
        "The configuration indexed {} has {} interface(s):",
        index,
        config.interfaces.len()
    )?;
    for interface in &config.interfaces {
        writeln!(
            console,
            "interface no. {} has {} alternate settings:",
            interface.number,
            interface.alt_settings.len()
        )?;
        for alt in &interface.alt_settings {
            writeln!(
                console,
                "  alternate: {}, endpoints: {}, class: 0x{:x}, subclass: 0x{:x}, protocol: 0x{:x}",
                alt.alternate,
                alt.endpoints.len(),
                alt.class,
                alt.subclass,
                alt.protocol
            )?;
            for ep in &alt.endpoints {
                writeln!(
                    console,
                    "    end-point address: 0x{:02x}, attributes: 0x{:x}, max packet {}, Interval: {}",
                    ep.address, ep.attributes, ep.max_packet_size, ep.interval
                )?;
            }
        }
        writeln!(console)?;
    }
    writeln!(console)
}

pub(super) fn print_configurations(
    session: &mut UsbSession,
    console: &mut dyn Console,
) -> DiagResult<Status> {
    let device = match session.active_device(console)? {
        Ok(device) => device,
        Err(status) => return Ok(status),
    };
    let configs = &device.configurations;

    writeln!(console, "This device has {} configurations:", configs.len())?;
    for (i, config) in configs.iter().enumerate() {
        writeln!(
            console,
            "  {}. Configuration value {} (has {} interfaces)",
            i,
            config.value,
            config.interfaces.len()
        )?;
    }

    let mut index = 0;
    if configs.len() > 1 {
        let prompt = "Please enter the configuration index to display (dec - zero based)";
        let Input::Value(picked) = input_number(console, prompt, false, 0, 0)? else {
            return Ok(INVALID_PARAMETER);
        };
        index = usize::try_from(picked).unwrap_or(usize::MAX);
    }
    let Some(config) = configs.get(index) else {
        print_error(
            console,
            &format!(
                "ERROR: Invalid configuration index, valid values are 0-{}",
                configs.len().saturating_sub(1)
            ),
        )?;
        return Ok(INVALID_PARAMETER);
    };
    print_configuration(console, index, config)?;
    Ok(Status::SUCCESS)
}

pub(super) fn change_alt_setting(
    session: &mut UsbSession,
    console: &mut dyn Console,
) -> DiagResult<Status> {
    let device = match session.active_device(console)? {
        Ok(device) => device,
        Err(status) => return Ok(status),
    };

    let prompt = "Please enter the interface number (dec)";
    let Input::Value(interface) = input_number(console, prompt, false, 0, 0)? else {
        return Ok(INVALID_PARAMETER);
    };
    let prompt = "Please enter the alternate setting index (dec)";
    let Input::Value(alt_setting) = input_number(console, prompt, false, 0, 0)? else {
        return Ok(INVALID_PARAMETER);
    };
    let (Ok(interface), Ok(alt_setting)) = (u32::try_from(interface), u32::try_from(alt_setting))
    else {
        return Ok(INVALID_PARAMETER);
    };

    match session.driver().set_interface(device.handle, interface, alt_setting) {
        Ok(()) => {
            info!(
                "{} switched to interface {} alternate setting {}",
                device.handle, interface, alt_setting
            );
            writeln!(console, "Interface alternate setting changed successfully")?;
            Ok(Status::SUCCESS)
        }
        Err(status) => report_failure(console, "Failed setting the interface", status),
    }
}

pub(super) fn select_device(
    session: &mut UsbSession,
    console: &mut dyn Console,
) -> DiagResult<Status> {
    if let Err(status) = session.active_device(console)? {
        return Ok(status);
    }
    if session.device_count() <= 1 {
        return Ok(Status::SUCCESS);
    }

    let handles: Vec<_> = session.devices.iter().collect();
    for (i, handle) in handles.iter().enumerate() {
        match session.driver().device(*handle) {
            Ok(device) => writeln!(
                console,
                "  {}. Vendor id: 0x{:x}, Product id: 0x{:x}, Interface number: {}, Alt. Setting: {}",
                i + 1,
                device.vendor_id,
                device.product_id,
                device.interface_number,
                device.alt_setting
            )?,
            Err(_) => writeln!(console, "  {}. Device {} is no longer attached", i + 1, handle)?,
        }
    }

    writeln!(console, "Please enter the device number (1 - {}, dec):", handles.len())?;
    if let Input::Value(choice) = input_menu_choice(console, handles.len() as u32)? {
        // the exit option keeps the current device
        if let Some(index) = choice.checked_sub(1).filter(|_| choice != EXIT_MENU_OPTION) {
            session.devices.select(index as usize);
        }
    }
    Ok(Status::SUCCESS)
}

pub(super) fn print_serial_number(
    session: &mut UsbSession,
    console: &mut dyn Console,
) -> DiagResult<Status> {
    let device = match session.active_device(console)? {
        Ok(device) => device,
        Err(status) => return Ok(status),
    };
    match session.driver().serial_number(device.handle) {
        Ok(None) => {
            writeln!(console, "Serial number is not available")?;
            Ok(Status::SUCCESS)
        }
        Ok(Some(serial)) => {
            writeln!(console, "Serial number string descriptor index: [{}]", serial.index)?;
            writeln!(
                console,
                "Serial number: length [{}], [{}]",
                serial.value.len(),
                serial.value
            )?;
            Ok(Status::SUCCESS)
        }
        Err(status) => report_failure(console, "Failed reading the serial number", status),
    }
}

pub(super) fn print_properties(
    session: &mut UsbSession,
    console: &mut dyn Console,
) -> DiagResult<Status> {
    let device = match session.active_device(console)? {
        Ok(device) => device,
        Err(status) => return Ok(status),
    };
    // properties the driver cannot report are skipped
    let properties = session.driver().properties(device.handle).unwrap_or_default();
    for (name, value) in properties {
        writeln!(console, "{:<46}: {}", name, value)?;
    }
    Ok(Status::SUCCESS)
}
