//! Numeric and hex input with cancel semantics.

use super::Console;
use crate::error::DiagResult;
use crate::menu::EXIT_MENU_OPTION;

/// Typing a token that starts with this character cancels an input prompt.
pub const CANCEL_CHAR: char = 'x';

/// Outcome of reading one value from the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input<T> {
    /// A valid value
    Value(T),
    /// Malformed or out-of-range input; a diagnostic was already printed
    Invalid,
    /// The operator typed the cancel sentinel
    Cancelled,
}

impl<T> Input<T> {
    pub fn value(self) -> Option<T> {
        match self {
            Input::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Input::Cancelled)
    }
}

fn is_cancel(token: &str) -> bool {
    token
        .chars()
        .next()
        .is_some_and(|c| c.eq_ignore_ascii_case(&CANCEL_CHAR))
}

/// Parse a decimal or hex token. Hex tokens may carry a `0x` prefix.
pub fn parse_number(token: &str, hex: bool) -> Option<u64> {
    let token = token.trim();
    if hex {
        let digits = token
            .strip_prefix("0x")
            .or_else(|| token.strip_prefix("0X"))
            .unwrap_or(token);
        u64::from_str_radix(digits, 16).ok()
    } else {
        token.parse().ok()
    }
}

/// Option number at the start of `token`. Trailing text after the digits
/// is ignored, so "2abc" reads as 2.
pub fn parse_option(token: &str) -> Option<u32> {
    let token = token.trim_start();
    let end = token
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(token.len());
    token[..end].parse().ok()
}

/// Prompt for a number and validate it.
///
/// The range `[min, max]` is only enforced when `max > min`. An empty
/// prompt falls back to `Enter input`.
pub fn input_number(
    console: &mut dyn Console,
    prompt: &str,
    hex: bool,
    min: u64,
    max: u64,
) -> DiagResult<Input<u64>> {
    let prompt = if prompt.is_empty() {
        "Enter input"
    } else {
        prompt
    };
    write!(
        console,
        "{} (to cancel press '{}'): {}",
        prompt,
        CANCEL_CHAR,
        if hex { "0x" } else { "" }
    )?;

    let line = console.read_line()?;
    let token = line.trim();
    if is_cancel(token) {
        return Ok(Input::Cancelled);
    }

    let Some(value) = parse_number(token, hex) else {
        writeln!(console, "Invalid input")?;
        return Ok(Input::Invalid);
    };

    if max > min && (value < min || value > max) {
        if hex {
            writeln!(
                console,
                "Invalid input: Input must be between 0x{:X} and 0x{:X}",
                min, max
            )?;
        } else {
            writeln!(console, "Invalid input: Input must be between {} and {}", min, max)?;
        }
        return Ok(Input::Invalid);
    }

    Ok(Input::Value(value))
}

/// [`input_number`] for 32-bit values. Without a range of its own the
/// value is still bounded by `u32::MAX`.
pub fn input_u32(
    console: &mut dyn Console,
    prompt: &str,
    hex: bool,
    min: u32,
    max: u32,
) -> DiagResult<Input<u32>> {
    let (min, max) = if max > min { (min, max) } else { (0, u32::MAX) };
    Ok(
        match input_number(console, prompt, hex, u64::from(min), u64::from(max))? {
            Input::Value(value) => u32::try_from(value).map_or(Input::Invalid, Input::Value),
            Input::Invalid => Input::Invalid,
            Input::Cancelled => Input::Cancelled,
        },
    )
}

/// Prompt for a menu option in `1..=max` or the exit sentinel.
///
/// `max == 0` accepts any number.
pub fn input_menu_choice(console: &mut dyn Console, max: u32) -> DiagResult<Input<u32>> {
    write!(console, "Enter option: ")?;
    let line = console.read_line()?;
    let token = line.trim();
    if is_cancel(token) {
        return Ok(Input::Cancelled);
    }

    let Some(choice) = parse_option(token) else {
        writeln!(console, "Invalid option")?;
        return Ok(Input::Invalid);
    };

    if choice == EXIT_MENU_OPTION || max == 0 {
        return Ok(Input::Value(choice));
    }

    if choice == 0 || choice > max {
        if max == 1 {
            writeln!(
                console,
                "Invalid option: Option must be 1, or {} to exit",
                EXIT_MENU_OPTION
            )?;
        } else {
            writeln!(
                console,
                "Invalid option: Option must be between 1 - {}, or {} to exit",
                max, EXIT_MENU_OPTION
            )?;
        }
        return Ok(Input::Invalid);
    }

    Ok(Input::Value(choice))
}

fn hex_digit(byte: u8) -> Option<u8> {
    (byte as char).to_digit(16).map(|d| d as u8)
}

/// Read `count` bytes typed as consecutive two-digit hex groups.
///
/// A non-hex character discards the pair in progress. After the last byte
/// the rest of the line is consumed, so the input is left positioned after
/// the next newline. Returns fewer bytes only if input ends early. The
/// buffer grows with the typed input, so `count` may exceed what fits in
/// memory.
pub fn read_hex_buffer(console: &mut dyn Console, count: usize) -> DiagResult<Vec<u8>> {
    let mut bytes = Vec::new();

    'outer: while bytes.len() < count {
        let mut pair = 0u8;
        for shift in [4u8, 0] {
            let Some(byte) = console.read_byte()? else {
                break 'outer;
            };
            match hex_digit(byte) {
                Some(digit) => pair |= digit << shift,
                None => continue 'outer,
            }
        }
        bytes.push(pair);
    }

    while let Some(byte) = console.read_byte()? {
        if byte == b'\n' || byte == b'\r' {
            break;
        }
    }

    Ok(bytes)
}
