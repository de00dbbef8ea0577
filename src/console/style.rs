//! Colored status lines.

use crossterm::style::{Color, Stylize};

use super::Console;
use crate::error::DiagResult;

/// Semantic colors used on the operator console.
pub mod colors {
    use super::Color;

    pub const SUCCESS: Color = Color::Green;
    pub const ERROR: Color = Color::Red;
    pub const WARNING: Color = Color::Yellow;
}

fn styled(text: &str, color: Color, enabled: bool) -> String {
    if enabled {
        text.with(color).to_string()
    } else {
        text.to_string()
    }
}

/// Print a failure line, red when the console supports color.
pub fn print_error(console: &mut dyn Console, message: &str) -> DiagResult<()> {
    let line = styled(message, colors::ERROR, console.supports_color());
    writeln!(console, "{}", line)
}

pub fn print_success(console: &mut dyn Console, message: &str) -> DiagResult<()> {
    let line = styled(message, colors::SUCCESS, console.supports_color());
    writeln!(console, "{}", line)
}

/// Yellow warning text, used for notices that do not fail an action.
pub fn warning_text(message: &str, enabled: bool) -> String {
    styled(message, colors::WARNING, enabled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::ScriptedConsole;

    #[test]
    fn plain_output_without_color() {
        let mut console = ScriptedConsole::scripted("");
        print_error(&mut console, "Failed opening device").unwrap();
        assert_eq!(console.output(), "Failed opening device\n");
    }

    #[test]
    fn colored_output_keeps_message_text() {
        let mut console = ScriptedConsole::scripted("").with_color(true);
        print_success(&mut console, "done").unwrap();
        assert!(console.output().contains("done"));
    }

    #[test]
    fn warning_text_is_plain_when_disabled() {
        assert_eq!(warning_text("careful", false), "careful");
    }
}
