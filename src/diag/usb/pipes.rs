//! Pipe listing and transfers.

use std::time::Instant;

use log::{debug, info};

use super::listen::{listen_to_pipe, ListenMode};
use super::{report_failure, UsbSession};
use crate::console::{
    input_number, print_error, print_hex_dump, print_success, read_hex_buffer, report_throughput,
    Console, Input,
};
use crate::driver::{DriverResult, PipeDirection, PipeType, UsbDevice, UsbDeviceHandle, UsbDriver, UsbPipe};
use crate::error::DiagResult;
use crate::menu::{MenuOption, MenuTree, NodeId, Shared};
use crate::status::{Status, INSUFFICIENT_RESOURCES, INVALID_PARAMETER};

pub(super) fn attach(tree: &mut MenuTree, parent: NodeId, ctx: &Shared<UsbSession>) -> DiagResult<()> {
    let menu = tree.add_option(
        parent,
        MenuOption::new("Read/Write from pipes").on_entry(enter),
        ctx,
    )?;

    tree.attach_siblings(
        menu,
        [
            MenuOption::new("Read from pipe")
                .on_entry(|session: &mut UsbSession, console| read_write(session, console, PipeDirection::In)),
            MenuOption::new("Write to pipe")
                .on_entry(|session: &mut UsbSession, console| read_write(session, console, PipeDirection::Out)),
            MenuOption::new("Listen to pipe (continuous read)")
                .on_entry(|session: &mut UsbSession, console| listen(session, console, ListenMode::Print)),
            MenuOption::new("Measure pipe speed (continuous read)")
                .on_entry(|session: &mut UsbSession, console| listen(session, console, ListenMode::Measure)),
            MenuOption::new("Check streaming READ speed")
                .on_entry(|session: &mut UsbSession, console| {
                    check_stream_speed(session, console, PipeDirection::In)
                })
                .hidden_when(|session: &UsbSession| !session.stream_mode),
            MenuOption::new("Check streaming WRITE speed")
                .on_entry(|session: &mut UsbSession, console| {
                    check_stream_speed(session, console, PipeDirection::Out)
                })
                .hidden_when(|session: &UsbSession| !session.stream_mode),
            MenuOption::new("Switch transfer mode").on_entry(|session: &mut UsbSession, _| {
                session.stream_mode = !session.stream_mode;
                info!("USB stream mode {}", if session.stream_mode { "on" } else { "off" });
                Ok(Status::SUCCESS)
            }),
        ],
        ctx,
    )?;
    Ok(())
}

fn print_pipe(console: &mut dyn Console, pipe: &UsbPipe) -> DiagResult<()> {
    writeln!(
        console,
        "  pipe num. 0x{:x}: packet size {}, type {}, dir {}, interval {} (ms)",
        pipe.number, pipe.max_packet_size, pipe.kind, pipe.direction, pipe.interval
    )
}

/// Print the control pipe and the pipes of the active alternate setting.
pub fn print_device_pipes(console: &mut dyn Console, device: &UsbDevice) -> DiagResult<()> {
    writeln!(console, "Control pipe:")?;
    print_pipe(console, &device.pipe0)?;
    writeln!(console, "Interface {}", device.interface_number)?;
    if device.pipes.is_empty() {
        return writeln!(
            console,
            "  no pipes are defined for this device other than the default pipe (number 0)."
        );
    }
    writeln!(console, "Alternate Setting: {}", device.alt_setting)?;
    for pipe in &device.pipes {
        print_pipe(console, pipe)?;
    }
    Ok(())
}

fn is_control(pipe: &UsbPipe) -> bool {
    pipe.number == 0 || pipe.kind == PipeType::Control
}

/// Prompt for a pipe number of `device`.
fn prompt_pipe(console: &mut dyn Console, device: &UsbDevice) -> DiagResult<Result<UsbPipe, Status>> {
    let prompt = "Please enter the pipe number (hex)";
    let Input::Value(number) = input_number(console, prompt, true, 0, 0)? else {
        return Ok(Err(INVALID_PARAMETER));
    };
    let found = u32::try_from(number).ok().and_then(|n| device.find_pipe(n));
    match found {
        Some(pipe) => Ok(Ok(pipe)),
        None => {
            print_error(
                console,
                &format!("The pipe number 0x{:x} does not exist. Please try again.", number),
            )?;
            Ok(Err(INVALID_PARAMETER))
        }
    }
}

/// Zeroed buffer of `size` bytes, or `None` if it cannot be allocated.
fn alloc_buffer(size: usize) -> Option<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(size).ok()?;
    buf.resize(size, 0);
    Some(buf)
}

/// Move `buf` over `pipe` in chunks of at most `chunk` bytes.
///
/// Stops early on a short chunk. Returns the total moved.
pub(super) fn stream_transfer(
    driver: &dyn UsbDriver,
    handle: UsbDeviceHandle,
    pipe: u32,
    direction: PipeDirection,
    buf: &mut [u8],
    chunk: usize,
) -> DriverResult<usize> {
    let mut moved = 0;
    for part in buf.chunks_mut(chunk.max(1)) {
        let n = driver.transfer(handle, pipe, direction, part, None)?;
        moved += n;
        if n < part.len() {
            break;
        }
    }
    Ok(moved)
}

fn enter(session: &mut UsbSession, console: &mut dyn Console) -> DiagResult<Status> {
    let device = match session.active_device(console)? {
        Ok(device) => device,
        Err(status) => return Ok(status),
    };
    print_device_pipes(console, &device)?;
    writeln!(console)?;
    writeln!(
        console,
        "Read/Write from/to device's pipes using {}",
        if session.stream_mode {
            "Streaming Data Transfers"
        } else {
            "Single Blocking Transfers"
        }
    )?;
    writeln!(console, "---------------------")?;
    Ok(Status::SUCCESS)
}

pub(super) fn reset_pipe(session: &mut UsbSession, console: &mut dyn Console) -> DiagResult<Status> {
    let device = match session.active_device(console)? {
        Ok(device) => device,
        Err(status) => return Ok(status),
    };
    print_device_pipes(console, &device)?;

    let prompt = "Please enter the pipe number (hex)";
    let Input::Value(number) = input_number(console, prompt, true, 0, 0)? else {
        return Ok(INVALID_PARAMETER);
    };
    let Ok(number) = u32::try_from(number) else {
        return Ok(INVALID_PARAMETER);
    };
    writeln!(console)?;

    match session.driver().reset_pipe(device.handle, number) {
        Ok(()) => {
            info!("reset pipe 0x{:x} of {}", number, device.handle);
            print_success(console, "Pipe reset completed successfully")?;
            Ok(Status::SUCCESS)
        }
        Err(status) => report_failure(console, &format!("Failed resetting pipe 0x{:x}", number), status),
    }
}

fn read_write(
    session: &mut UsbSession,
    console: &mut dyn Console,
    direction: PipeDirection,
) -> DiagResult<Status> {
    let device = match session.active_device(console)? {
        Ok(device) => device,
        Err(status) => return Ok(status),
    };
    let pipe = match prompt_pipe(console, &device)? {
        Ok(pipe) => pipe,
        Err(status) => return Ok(status),
    };

    let mut setup = None;
    if is_control(&pipe) {
        if session.stream_mode {
            print_error(
                console,
                "Cannot perform stream transfer using control pipe.\n\
                 please switch to Single Blocking Transfer mode or change the pipe number",
            )?;
            return Ok(INVALID_PARAMETER);
        }
        write!(console, "Please enter setup packet (hex - 8 bytes): ")?;
        let typed = read_hex_buffer(console, 8)?;
        let mut packet = [0u8; 8];
        packet[..typed.len()].copy_from_slice(&typed);
        setup = Some(packet);
    }

    let prompt = "Please enter the size of the buffer (dec)";
    let Input::Value(size) = input_number(console, prompt, false, 0, 0)? else {
        return Ok(INVALID_PARAMETER);
    };
    let Some(mut buf) = usize::try_from(size).ok().and_then(alloc_buffer) else {
        print_error(console, "Cannot alloc memory")?;
        return Ok(INSUFFICIENT_RESOURCES);
    };
    if direction == PipeDirection::Out && !buf.is_empty() {
        write!(console, "Please enter the input buffer (hex): ")?;
        let typed = read_hex_buffer(console, buf.len())?;
        buf[..typed.len()].copy_from_slice(&typed);
    }

    let driver = session.driver();
    let moved = if session.stream_mode {
        let chunk = session.settings.listen_buffer_size as usize;
        stream_transfer(driver, device.handle, pipe.number, direction, &mut buf, chunk)
    } else {
        driver.transfer(device.handle, pipe.number, direction, &mut buf, setup.as_ref())
    };

    match moved {
        Ok(n) => {
            debug!("moved {} bytes over pipe 0x{:x}", n, pipe.number);
            writeln!(console, "Transferred {} bytes", n)?;
            if direction == PipeDirection::In {
                print_hex_dump(console, &buf[..n])?;
            }
            Ok(Status::SUCCESS)
        }
        Err(status) => report_failure(console, "Transfer failed", status),
    }
}

fn listen(session: &mut UsbSession, console: &mut dyn Console, mode: ListenMode) -> DiagResult<Status> {
    let device = match session.active_device(console)? {
        Ok(device) => device,
        Err(status) => return Ok(status),
    };
    let pipe = match prompt_pipe(console, &device)? {
        Ok(pipe) => pipe,
        Err(status) => return Ok(status),
    };
    if is_control(&pipe) {
        writeln!(console, "Cannot listen to control pipes.")?;
        return Ok(INVALID_PARAMETER);
    }

    let buffer_size = session.stream_mode.then_some(session.settings.listen_buffer_size);
    listen_to_pipe(
        session.driver.clone(),
        device.handle,
        pipe,
        mode,
        buffer_size,
        console,
        session.notify.clone(),
    )
}

fn check_stream_speed(
    session: &mut UsbSession,
    console: &mut dyn Console,
    direction: PipeDirection,
) -> DiagResult<Status> {
    let device = match session.active_device(console)? {
        Ok(device) => device,
        Err(status) => return Ok(status),
    };
    let pipe = match prompt_pipe(console, &device)? {
        Ok(pipe) => pipe,
        Err(status) => return Ok(status),
    };
    if is_control(&pipe) {
        writeln!(console, "Cannot perform stream transfer with control pipe")?;
        return Ok(INVALID_PARAMETER);
    }

    let settings = &session.settings;
    writeln!(
        console,
        "The size of the buffer to transfer(dec): {}",
        settings.stream_transfer_size
    )?;
    writeln!(
        console,
        "The size of the internal Rx/Tx stream buffer (dec): {}",
        settings.stream_buffer_size
    )?;
    writeln!(
        console,
        "Making the transfer of {} times the buffer size, please wait ...",
        settings.stream_iterations
    )?;

    let Some(mut buf) = alloc_buffer(settings.stream_transfer_size as usize) else {
        print_error(console, "Failed allocating memory")?;
        return Ok(INSUFFICIENT_RESOURCES);
    };
    let target = u64::from(settings.stream_transfer_size) * u64::from(settings.stream_iterations);

    let start = Instant::now();
    let mut total = 0u64;
    while total < target {
        let moved = stream_transfer(
            session.driver(),
            device.handle,
            pipe.number,
            direction,
            &mut buf,
            settings.stream_buffer_size as usize,
        );
        match moved {
            Ok(0) => break,
            Ok(n) => total += n as u64,
            Err(status) => return report_failure(console, "Transfer failed", status),
        }
    }
    report_throughput(console, total, start)?;
    Ok(Status::SUCCESS)
}
