//! Line-oriented console I/O
//!
//! The navigator and every diagnostic callback talk to the operator through
//! the [`Console`] trait so sessions can be driven by stdio or by scripted
//! input in tests.
//!
//! # Module Structure
//!
//! - `input` - numeric, menu-choice and hex-buffer input with cancel handling
//! - `output` - hex dumps, throughput reporting and the off-thread notify sink
//! - `style` - optional colored status and error lines

mod input;
mod output;
mod style;

use std::fmt;
use std::io::{self, BufRead, Cursor, Write};

use crate::error::{DiagError, DiagResult};

pub use input::{
    input_menu_choice, input_number, input_u32, parse_number, parse_option, read_hex_buffer, Input,
    CANCEL_CHAR,
};
pub use output::{
    format_hex_dump, notify_sink, print_hex_dump, report_throughput, throughput_line,
    throughput_mb_per_sec, NotifySink,
};
pub use style::{print_error, print_success, warning_text};

/// Operator console used by the navigator and by menu callbacks.
pub trait Console {
    /// Read one line, without its trailing newline.
    ///
    /// Returns [`DiagError::InputClosed`] at end of input.
    fn read_line(&mut self) -> DiagResult<String>;

    /// Read a single byte, or `None` at end of input.
    fn read_byte(&mut self) -> DiagResult<Option<u8>>;

    /// Write formatted text. Lets `write!`/`writeln!` target a console.
    fn write_fmt(&mut self, args: fmt::Arguments<'_>) -> DiagResult<()>;

    /// Whether styled output should be emitted.
    fn supports_color(&self) -> bool {
        false
    }
}

/// [`Console`] over any buffered reader and writer.
pub struct LineConsole<R, W> {
    reader: R,
    writer: W,
    color: bool,
}

impl<R: BufRead, W: Write> LineConsole<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            color: false,
        }
    }

    /// Enable or disable styled output.
    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    pub fn into_writer(self) -> W {
        self.writer
    }
}

impl LineConsole<io::StdinLock<'static>, io::Stdout> {
    /// Console bound to the process's stdin and stdout.
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

/// Console fed from an in-memory script, capturing everything written.
pub type ScriptedConsole = LineConsole<Cursor<Vec<u8>>, Vec<u8>>;

impl ScriptedConsole {
    pub fn scripted(input: impl Into<String>) -> Self {
        Self::new(Cursor::new(input.into().into_bytes()), Vec::new())
    }

    /// Everything written so far.
    pub fn output(&self) -> String {
        String::from_utf8_lossy(&self.writer).into_owned()
    }

    /// Bytes of scripted input not consumed yet.
    pub fn remaining_input(&self) -> &[u8] {
        let pos = (self.reader.position() as usize).min(self.reader.get_ref().len());
        &self.reader.get_ref()[pos..]
    }
}

impl<R: BufRead, W: Write> Console for LineConsole<R, W> {
    fn read_line(&mut self) -> DiagResult<String> {
        self.writer.flush()?;
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Err(DiagError::InputClosed);
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(line)
    }

    fn read_byte(&mut self) -> DiagResult<Option<u8>> {
        self.writer.flush()?;
        let byte = match self.reader.fill_buf()?.first() {
            Some(byte) => *byte,
            None => return Ok(None),
        };
        self.reader.consume(1);
        Ok(Some(byte))
    }

    fn write_fmt(&mut self, args: fmt::Arguments<'_>) -> DiagResult<()> {
        self.writer.write_fmt(args)?;
        Ok(())
    }

    fn supports_color(&self) -> bool {
        self.color
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_line_strips_line_endings() {
        let mut console = ScriptedConsole::scripted("first\r\nsecond\n");
        assert_eq!(console.read_line().unwrap(), "first");
        assert_eq!(console.read_line().unwrap(), "second");
    }

    #[test]
    fn read_line_reports_closed_input() {
        let mut console = ScriptedConsole::scripted("");
        assert!(matches!(console.read_line(), Err(DiagError::InputClosed)));
    }

    #[test]
    fn read_byte_walks_input_then_ends() {
        let mut console = ScriptedConsole::scripted("ab");
        assert_eq!(console.read_byte().unwrap(), Some(b'a'));
        assert_eq!(console.read_byte().unwrap(), Some(b'b'));
        assert_eq!(console.read_byte().unwrap(), None);
    }

    #[test]
    fn write_macros_target_dyn_console() {
        let mut console = ScriptedConsole::scripted("");
        {
            let dynamic: &mut dyn Console = &mut console;
            write!(dynamic, "{}-", 1).unwrap();
            writeln!(dynamic, "{}", 2).unwrap();
        }
        assert_eq!(console.output(), "1-2\n");
    }

    #[test]
    fn color_is_opt_in() {
        let console = ScriptedConsole::scripted("");
        assert!(!console.supports_color());
        assert!(console.with_color(true).supports_color());
    }
}
