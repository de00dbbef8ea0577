//! Common helpers for diagmenu integration tests.
//!
//! - `diagmenu`: binary invocation isolated from the user's config
//! - `run_scripted`: feed a whole operator script on stdin
//! - `Captured`: notify sink whose contents stay readable

#![allow(dead_code)]

use std::io::{self, Write};
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::sync::{Arc, Mutex};

const ENV_OVERRIDES: &[&str] = &[
    "DIAGMENU_VERBOSITY",
    "DIAGMENU_COLOR",
    "DIAGMENU_PCI_VENDOR_ID",
    "DIAGMENU_PCI_DEVICE_ID",
    "DIAGMENU_USB_STREAM_MODE",
];

/// Binary running in `dir`, with no config file and no color.
pub fn diagmenu(dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_diagmenu"));
    cmd.current_dir(dir)
        .env("HOME", dir)
        .env("XDG_CONFIG_HOME", dir.join(".config"))
        .args(["--color", "never"]);
    for key in ENV_OVERRIDES {
        cmd.env_remove(key);
    }
    cmd
}

pub fn run_scripted(mut cmd: Command, input: &str) -> Output {
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = cmd.spawn().expect("spawn diagmenu");
    // The binary may exit (e.g. on a config error) before reading stdin;
    // a closed pipe is fine, the caller asserts on the exit status/output.
    match child
        .stdin
        .take()
        .expect("stdin is piped")
        .write_all(input.as_bytes())
    {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {}
        Err(e) => panic!("write script: {e:?}"),
    }
    child.wait_with_output().expect("wait for diagmenu")
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[derive(Clone, Default)]
pub struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
