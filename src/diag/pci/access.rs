//! Offset, block and address access prompts shared by the PCI menus.

use std::fmt;

use log::error;

use crate::console::{
    input_menu_choice, input_number, parse_number, print_error, print_hex_dump, read_hex_buffer,
    Console, Input, CANCEL_CHAR,
};
use crate::diag::{pause, status_text};
use crate::driver::{AccessWidth, DeviceHandle, PciDriver};
use crate::error::DiagResult;
use crate::status::{Status, INSUFFICIENT_RESOURCES, INVALID_PARAMETER};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

impl Direction {
    fn verb(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }

    fn past(self) -> &'static str {
        match self {
            Self::Read => "Read",
            Self::Write => "Wrote",
        }
    }

    fn preposition(self) -> &'static str {
        match self {
            Self::Read => "from",
            Self::Write => "to",
        }
    }
}

/// Where a block transfer lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Config,
    Bar { bar: usize, width: AccessWidth },
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config => f.write_str("configuration space"),
            Self::Bar { bar, .. } => write!(f, "BAR {}", bar),
        }
    }
}

/// Prompt for offset and length, then move a block through `target`.
pub fn read_write_block(
    driver: &mut dyn PciDriver,
    handle: DeviceHandle,
    console: &mut dyn Console,
    direction: Direction,
    target: Target,
) -> DiagResult<()> {
    let Some(offset) = prompt_value(console, "offset", "the offset")? else {
        return Ok(());
    };
    let Some(bytes) = prompt_value(console, "bytes", "the number of bytes to transfer")? else {
        return Ok(());
    };
    if bytes == 0 {
        return Ok(());
    }

    let Ok(len) = usize::try_from(bytes) else {
        error!("block of {} bytes does not fit in memory", bytes);
        print_error(
            console,
            &format!(
                "Failed allocating [{}] data buffer. Error {}",
                direction.verb(),
                status_text(INSUFFICIENT_RESOURCES)
            ),
        )?;
        writeln!(console)?;
        return pause(console);
    };
    // configuration space offsets are 32 bits wide
    let cfg_offset = match target {
        Target::Config => match u32::try_from(offset) {
            Ok(cfg_offset) => cfg_offset,
            Err(_) => {
                report_block_failure(console, direction, target, bytes, offset, INVALID_PARAMETER)?;
                writeln!(console)?;
                return pause(console);
            }
        },
        Target::Bar { .. } => 0,
    };

    let result = match direction {
        Direction::Read => match target {
            Target::Config => driver.read_cfg_block(handle, cfg_offset, len),
            Target::Bar { bar, width } => driver.read_block(handle, bar, offset, len, width),
        },
        Direction::Write => {
            write!(console, "data to write (hex format): 0x")?;
            let data = read_hex_buffer(console, len)?;
            if data.len() < len {
                writeln!(console)?;
                return pause(console);
            }
            let written = match target {
                Target::Config => driver.write_cfg_block(handle, cfg_offset, &data),
                Target::Bar { bar, width } => driver.write_block(handle, bar, offset, &data, width),
            };
            written.map(|()| data)
        }
    };

    match result {
        Ok(data) => match direction {
            Direction::Read => print_hex_dump(console, &data)?,
            Direction::Write => writeln!(console, "Wrote 0x{:x} bytes to offset 0x{:x}", bytes, offset)?,
        },
        Err(status) => report_block_failure(console, direction, target, bytes, offset, status)?,
    }

    writeln!(console)?;
    pause(console)
}

fn report_block_failure(
    console: &mut dyn Console,
    direction: Direction,
    target: Target,
    bytes: u64,
    offset: u64,
    status: Status,
) -> DiagResult<()> {
    error!("block {} of {} bytes in {} failed: {}", direction.verb(), bytes, target, status);
    print_error(
        console,
        &format!(
            "Failed to {} 0x{:x} bytes {} offset 0x{:x}. Error {}",
            direction.verb(),
            bytes,
            direction.preposition(),
            offset,
            status_text(status)
        ),
    )
}

/// Read or write a single value of `width` at an offset in `bar`.
pub fn read_write_addr(
    driver: &mut dyn PciDriver,
    handle: DeviceHandle,
    console: &mut dyn Console,
    direction: Direction,
    bar: usize,
    width: AccessWidth,
) -> DiagResult<()> {
    let prompt = match direction {
        Direction::Read => "Enter offset to read from",
        Direction::Write => "Enter offset to write to",
    };
    let Some(offset) = prompt_value(console, prompt, "the offset")? else {
        return Ok(());
    };

    let result = match direction {
        Direction::Read => driver.read_addr(handle, bar, offset, width),
        Direction::Write => {
            let Some(value) = input_write_data(console, width)? else {
                return Ok(());
            };
            driver.write_addr(handle, bar, offset, width, value).map(|()| value)
        }
    };

    match result {
        Ok(value) => writeln!(
            console,
            "{} 0x{:X} {} offset 0x{:x} in BAR {}",
            direction.past(),
            value,
            direction.preposition(),
            offset,
            bar
        ),
        Err(status) => print_error(
            console,
            &format!(
                "Failed to {} {} offset 0x{:x} in BAR {}. Error {}",
                direction.verb(),
                direction.preposition(),
                offset,
                bar,
                status_text(status)
            ),
        ),
    }
}

/// Prompt for a value that fits in `width`. `None` on cancel or bad input.
pub fn input_write_data(console: &mut dyn Console, width: AccessWidth) -> DiagResult<Option<u64>> {
    let max = width.max_value();
    write!(
        console,
        "Enter data to write (max value: 0x{:X}) or '{}' to cancel: 0x",
        max, CANCEL_CHAR
    )?;
    let line = console.read_line()?;
    let token = line.trim();
    if token
        .chars()
        .next()
        .is_some_and(|c| c.eq_ignore_ascii_case(&CANCEL_CHAR))
    {
        return Ok(None);
    }

    let Some(value) = parse_number(token, true) else {
        writeln!(console, "Invalid input")?;
        return Ok(None);
    };
    if value > max {
        writeln!(console, "Error: Value is too big (max legal value is 0x{:X})", max)?;
        return Ok(None);
    }
    Ok(Some(value))
}

/// Offer the four access widths. `None` when cancelled or invalid.
pub fn select_width(console: &mut dyn Console) -> DiagResult<Option<AccessWidth>> {
    writeln!(console)?;
    writeln!(console, "Select read/write mode:")?;
    writeln!(console, "-----------------------")?;
    for (i, width) in AccessWidth::ALL.iter().enumerate() {
        writeln!(console, "{}. {} bits ({} bytes)", i + 1, width.bits(), width.bytes())?;
    }
    writeln!(console)?;

    let Input::Value(option) = input_menu_choice(console, AccessWidth::ALL.len() as u32)? else {
        return Ok(None);
    };
    // the exit option leaves the mode unchanged
    Ok(option
        .checked_sub(1)
        .and_then(|i| AccessWidth::ALL.get(i as usize))
        .copied())
}

fn prompt_value(console: &mut dyn Console, prompt: &str, what: &str) -> DiagResult<Option<u64>> {
    match input_number(console, prompt, true, 0, 0)? {
        Input::Value(value) => Ok(Some(value)),
        other => {
            let reason = if other.is_cancelled() { "Canceled" } else { "Failed" };
            print_error(console, &format!("{} getting {}", reason, what))?;
            Ok(None)
        }
    }
}
