//! Continuous pipe reads on a background thread.
//!
//! The navigator thread keeps the console and waits for <Enter>; the
//! listener thread owns its buffer and reports through the notify sink.
//! Stopping sets the stop flag, halts the pipe so a pending read returns,
//! and joins the thread before the bytes and status are read back.

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use log::{debug, error, warn};

use super::pipes::stream_transfer;
use crate::console::{format_hex_dump, print_error, throughput_line, Console, NotifySink};
use crate::diag::status_text;
use crate::driver::{PipeDirection, PipeType, UsbDeviceHandle, UsbDriver, UsbPipe};
use crate::error::DiagResult;
use crate::status::{Status, INSUFFICIENT_RESOURCES};

/// What the listener does with the data it reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenMode {
    /// Hex-dump every read
    Print,
    /// Count bytes and report the throughput when stopped
    Measure,
}

/// Bytes requested per read: eight packets for isochronous pipes,
/// thirty-six for the others.
fn read_size(pipe: &UsbPipe) -> usize {
    let packets = if pipe.kind == PipeType::Isochronous { 8 } else { 36 };
    pipe.max_packet_size as usize * packets
}

fn notify(sink: &NotifySink, text: &str) {
    let Ok(mut out) = sink.lock() else {
        return;
    };
    if let Err(e) = out.write_all(text.as_bytes()).and_then(|()| out.flush()) {
        warn!("dropped listener output: {}", e);
    }
}

/// Counters shared between the menu thread and a running listener.
#[derive(Default)]
struct ListenState {
    stop: AtomicBool,
    bytes: AtomicU64,
    error: AtomicU32,
}

/// Running listener thread. Dropping it stops the thread.
struct Listener {
    driver: Arc<dyn UsbDriver>,
    handle: UsbDeviceHandle,
    pipe: u32,
    state: Arc<ListenState>,
    thread: Option<JoinHandle<()>>,
}

impl Listener {
    fn start(
        driver: Arc<dyn UsbDriver>,
        handle: UsbDeviceHandle,
        pipe: UsbPipe,
        mode: ListenMode,
        stream_chunk: Option<usize>,
        sink: NotifySink,
    ) -> std::io::Result<Self> {
        let state = Arc::new(ListenState::default());
        let worker = Arc::clone(&state);
        let reader = Arc::clone(&driver);
        let mut buf = vec![0u8; read_size(&pipe)];

        let thread = thread::Builder::new()
            .name(format!("usb-listen-{:x}", pipe.number))
            .spawn(move || {
                let start = Instant::now();
                loop {
                    let read = match stream_chunk {
                        Some(chunk) => stream_transfer(
                            reader.as_ref(),
                            handle,
                            pipe.number,
                            PipeDirection::In,
                            &mut buf,
                            chunk,
                        ),
                        None => reader.transfer(handle, pipe.number, PipeDirection::In, &mut buf, None),
                    };
                    let n = read.as_ref().map_or(0, |n| *n);
                    worker.bytes.fetch_add(n as u64, Ordering::SeqCst);

                    if worker.stop.load(Ordering::SeqCst) {
                        break;
                    }
                    if let Err(status) = read {
                        worker.error.store(status.code(), Ordering::SeqCst);
                        notify(&sink, "Listen ended due to an error, press <Enter> to stop.\n");
                        break;
                    }
                    if mode == ListenMode::Print {
                        notify(&sink, &format_hex_dump(&buf[..n]));
                    }
                }
                if mode == ListenMode::Measure {
                    let total = worker.bytes.load(Ordering::SeqCst);
                    notify(&sink, &format!("{}\n", throughput_line(total, start)));
                }
            })?;

        Ok(Self {
            driver,
            handle,
            pipe: pipe.number,
            state,
            thread: Some(thread),
        })
    }

    /// Stop the thread and return the bytes read and the status it ended with.
    fn stop(&mut self) -> (u64, Status) {
        if let Some(thread) = self.thread.take() {
            self.state.stop.store(true, Ordering::SeqCst);
            if let Err(status) = self.driver.halt_transfer(self.handle, self.pipe) {
                debug!("halting pipe 0x{:x} returned {}", self.pipe, status);
            }
            if thread.join().is_err() {
                error!("listener thread for pipe 0x{:x} panicked", self.pipe);
            }
        }
        (
            self.state.bytes.load(Ordering::SeqCst),
            Status(self.state.error.load(Ordering::SeqCst)),
        )
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Read `pipe` continuously until the operator presses Enter.
///
/// With `stream_chunk` set, each read is split into transfers of at most
/// that many bytes.
pub fn listen_to_pipe(
    driver: Arc<dyn UsbDriver>,
    handle: UsbDeviceHandle,
    pipe: UsbPipe,
    mode: ListenMode,
    stream_chunk: Option<u32>,
    console: &mut dyn Console,
    sink: NotifySink,
) -> DiagResult<Status> {
    writeln!(
        console,
        "Press <Enter> to start listening. While listening, press <Enter> to stop\n"
    )?;
    console.read_line()?;

    writeln!(console, "Start listening to pipe")?;
    let mut listener = match Listener::start(
        driver,
        handle,
        pipe,
        mode,
        stream_chunk.map(|c| c as usize),
        sink,
    ) {
        Ok(listener) => listener,
        Err(e) => {
            error!("cannot start listener thread: {}", e);
            print_error(
                console,
                &format!("Error listening to pipe 0x{:x}. {}", pipe.number, e),
            )?;
            return Ok(INSUFFICIENT_RESOURCES);
        }
    };

    console.read_line()?;
    writeln!(console, "Stop listening to pipe")?;
    let (bytes, status) = listener.stop();
    debug!("listener on pipe 0x{:x} read {} bytes", pipe.number, bytes);

    if !status.is_success() {
        print_error(
            console,
            &format!("Transfer failed. Error [{}]", status_text(status)),
        )?;
    }
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimUsbDevice;
    use crate::console::ScriptedConsole;
    use crate::diag::usb::test_support::Fixture;
    use crate::status::INVALID_PARAMETER;

    fn pipe(fixture: &Fixture, number: u32) -> (UsbDeviceHandle, UsbPipe) {
        let device = fixture.sim.devices().unwrap().remove(0);
        let pipe = device.find_pipe(number).unwrap();
        (device.handle, pipe)
    }

    fn driver(fixture: &Fixture) -> Arc<dyn UsbDriver> {
        fixture.sim.clone()
    }

    #[test]
    fn read_size_depends_on_pipe_type() {
        let mut pipe = UsbPipe::control(64);
        pipe.kind = PipeType::Bulk;
        assert_eq!(read_size(&pipe), 64 * 36);
        pipe.kind = PipeType::Isochronous;
        assert_eq!(read_size(&pipe), 64 * 8);
    }

    #[test]
    fn print_mode_starts_and_stops() {
        let fixture = Fixture::new(&[SimUsbDevice::default()]);
        let (handle, pipe) = pipe(&fixture, 0x81);
        let mut console = ScriptedConsole::scripted("\n\n");
        let sink = crate::console::notify_sink(fixture.notified.clone());
        let status = listen_to_pipe(
            driver(&fixture),
            handle,
            pipe,
            ListenMode::Print,
            None,
            &mut console,
            sink,
        )
        .unwrap();
        assert_eq!(status, Status::SUCCESS);
        let out = console.output();
        assert!(out.starts_with("Press <Enter> to start listening."));
        assert!(out.contains("Start listening to pipe\n"));
        assert!(out.ends_with("Stop listening to pipe\n"));
    }

    #[test]
    fn measure_mode_reports_throughput() {
        let fixture = Fixture::new(&[SimUsbDevice::default()]);
        let (handle, pipe) = pipe(&fixture, 0x83);
        let mut console = ScriptedConsole::scripted("\n\n");
        let sink = crate::console::notify_sink(fixture.notified.clone());
        listen_to_pipe(
            driver(&fixture),
            handle,
            pipe,
            ListenMode::Measure,
            Some(512),
            &mut console,
            sink,
        )
        .unwrap();
        assert!(fixture.notified.text().contains("[MB/sec]\n"));
    }

    #[test]
    fn read_error_ends_listening_with_its_status() {
        let fixture = Fixture::new(&[SimUsbDevice::default()]);
        // an OUT pipe cannot be read
        let (handle, pipe) = pipe(&fixture, 0x02);
        let sink = crate::console::notify_sink(fixture.notified.clone());
        let mut listener =
            Listener::start(driver(&fixture), handle, pipe, ListenMode::Print, None, sink).unwrap();

        let deadline = Instant::now() + std::time::Duration::from_secs(5);
        while !fixture.notified.text().contains("Listen ended due to an error") {
            assert!(Instant::now() < deadline, "listener never reported the error");
            thread::sleep(std::time::Duration::from_millis(1));
        }
        let (bytes, status) = listener.stop();
        assert_eq!(bytes, 0);
        assert_eq!(status, INVALID_PARAMETER);
    }

    #[test]
    fn dropping_a_listener_stops_it() {
        let fixture = Fixture::new(&[SimUsbDevice::default()]);
        let (handle, pipe) = pipe(&fixture, 0x81);
        let sink = crate::console::notify_sink(fixture.notified.clone());
        let listener =
            Listener::start(driver(&fixture), handle, pipe, ListenMode::Measure, None, sink).unwrap();
        let state = Arc::clone(&listener.state);
        drop(listener);
        assert!(state.stop.load(Ordering::SeqCst));
        assert!(fixture.notified.text().contains("[MB/sec]"));
    }
}
