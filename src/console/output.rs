//! Hex dumps, throughput reports and off-thread output.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use super::Console;
use crate::error::DiagResult;

const BYTES_PER_LINE: usize = 16;

/// Output channel for text produced off the navigator thread.
///
/// Driver event handlers and pipe listener threads print through this so
/// their lines never interleave mid-line with each other.
pub type NotifySink = Arc<Mutex<Box<dyn Write + Send>>>;

/// Wrap a writer into a [`NotifySink`].
pub fn notify_sink(writer: impl Write + Send + 'static) -> NotifySink {
    Arc::new(Mutex::new(Box::new(writer)))
}

/// Render bytes as `XX ` groups, 16 per line.
pub fn format_hex_dump(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3 + bytes.len() / BYTES_PER_LINE + 1);
    for line in bytes.chunks(BYTES_PER_LINE) {
        for byte in line {
            out.push_str(&format!("{:02X} ", byte));
        }
        out.push('\n');
    }
    out
}

pub fn print_hex_dump(console: &mut dyn Console, bytes: &[u8]) -> DiagResult<()> {
    if bytes.is_empty() {
        writeln!(console, "Empty buffer")?;
        return Ok(());
    }
    write!(console, "{}", format_hex_dump(bytes))
}

/// Whole MB/s for `bytes` moved in `elapsed_ms`.
///
/// One millisecond is added to the denominator so instantaneous transfers
/// do not divide by zero.
pub fn throughput_mb_per_sec(bytes: u64, elapsed_ms: u64) -> u64 {
    let rate = u128::from(bytes) * 1000 / ((u128::from(elapsed_ms) + 1) * 1024 * 1024);
    rate as u64
}

/// One-line throughput summary, without a trailing newline.
pub fn throughput_line(bytes: u64, start: Instant) -> String {
    let elapsed_ms = start.elapsed().as_millis() as u64;
    format!(
        "Transferred {} bytes, elapsed time {}[ms], rate {}[MB/sec]",
        bytes,
        elapsed_ms,
        throughput_mb_per_sec(bytes, elapsed_ms)
    )
}

pub fn report_throughput(console: &mut dyn Console, bytes: u64, start: Instant) -> DiagResult<()> {
    writeln!(console, "{}", throughput_line(bytes, start))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::ScriptedConsole;

    #[test]
    fn hex_dump_wraps_at_sixteen_bytes() {
        let bytes: Vec<u8> = (0u8..18).collect();
        let dump = format_hex_dump(&bytes);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            "00 01 02 03 04 05 06 07 08 09 0A 0B 0C 0D 0E 0F "
        );
        assert_eq!(lines[1], "10 11 ");
    }

    #[test]
    fn empty_dump_prints_notice() {
        let mut console = ScriptedConsole::scripted("");
        print_hex_dump(&mut console, &[]).unwrap();
        assert_eq!(console.output(), "Empty buffer\n");
    }

    #[test]
    fn throughput_guards_zero_elapsed_time() {
        assert_eq!(throughput_mb_per_sec(0, 0), 0);
        // 1 MiB in 0 ms counts as 1 ms
        assert_eq!(throughput_mb_per_sec(1024 * 1024, 0), 1000);
        assert_eq!(throughput_mb_per_sec(10 * 1024 * 1024, 999), 10);
    }

    #[test]
    fn throughput_report_format() {
        let mut console = ScriptedConsole::scripted("");
        report_throughput(&mut console, 4096, Instant::now()).unwrap();
        let out = console.output();
        assert!(out.starts_with("Transferred 4096 bytes, elapsed time "));
        assert!(out.trim_end().ends_with("[MB/sec]"));
    }

    #[test]
    fn notify_sink_is_shareable_across_threads() {
        let sink = notify_sink(Vec::new());
        let worker = Arc::clone(&sink);
        std::thread::spawn(move || {
            let mut out = worker.lock().unwrap();
            writeln!(out, "from worker").unwrap();
        })
        .join()
        .unwrap();
        assert_eq!(Arc::strong_count(&sink), 1);
    }
}
