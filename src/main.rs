//! Diagmenu CLI - interactive PCI and USB device diagnostics
//!
//! Usage: diagmenu [-v...] [--config PATH] [--color MODE] <COMMAND>
//!
//! Commands:
//!   pci   Run the PCI diagnostics menu
//!   usb   Run the USB diagnostics menu

use std::cell::RefCell;
use std::io;
use std::process;
use std::rc::Rc;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use is_terminal::IsTerminal;
use log::{error, info};

use diagmenu::cli::{Cli, Commands};
use diagmenu::config::{self, ColorMode, Config, Verbosity};
use diagmenu::console::{notify_sink, Console, LineConsole};
use diagmenu::diag::pci::{self, PciSession};
use diagmenu::diag::usb::{self, UsbSession};
use diagmenu::driver::sim::{SimIpc, SimPci, SimUsb};
use diagmenu::driver::{IpcDriver, PciDriver, UsbDriver};
use diagmenu::error::{DiagError, DiagResult};
use diagmenu::logging::{level_for, StderrLogger};
use diagmenu::menu::{Navigator, Shared};
use diagmenu::status::Status;

fn main() {
    match run() {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    StderrLogger::init(level_for(cli.verbose, Verbosity::Normal)).context("installing logger")?;

    let (mut config, _) = config::load(cli.config.as_deref()).context("loading configuration")?;
    log::set_max_level(level_for(cli.verbose, config.output.verbosity));
    if let Some(color) = cli.color {
        config.output.color = color;
    }
    let color = match config.output.color {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal(),
    };
    let mut console = LineConsole::stdio().with_color(color);

    let finished = match cli.command {
        Commands::Pci {
            vendor_id,
            device_id,
        } => {
            if let Some(vendor_id) = vendor_id {
                config.pci.default_vendor_id = vendor_id;
            }
            if let Some(device_id) = device_id {
                config.pci.default_device_id = device_id;
            }
            run_pci(&config, &mut console)
        }
        Commands::Usb { stream } => {
            config.usb.stream_mode |= stream;
            run_usb(&config, &mut console)
        }
    };

    match finished {
        Ok(status) => {
            info!("session ended with status {}", status);
            Ok(status.exit_code())
        }
        // end of input is how scripted sessions finish
        Err(DiagError::InputClosed) => {
            info!("console input closed, leaving");
            Ok(0)
        }
        Err(e) => Err(e).context("menu session failed"),
    }
}

fn run_pci(config: &Config, console: &mut dyn Console) -> DiagResult<Status> {
    let driver: Shared<dyn PciDriver> =
        Rc::new(RefCell::new(SimPci::new(&config.simulator.pci_devices)));
    let ipc: Shared<dyn IpcDriver> =
        Rc::new(RefCell::new(SimIpc::new(&config.simulator.ipc_processes)));
    let session = PciSession::new(driver, notify_sink(io::stdout())).with_ipc(ipc);
    session.open_default(
        console,
        config.pci.default_vendor_id,
        config.pci.default_device_id,
    )?;

    let mut tree = pci::build_menu(&session)?;
    let finished = Navigator::new(&mut tree).run(console);
    // a session cut short by end of input still releases the device
    if let Err(e) = session.shutdown(console) {
        error!("releasing the PCI session failed: {}", e);
    }
    finished
}

fn run_usb(config: &Config, console: &mut dyn Console) -> DiagResult<Status> {
    let driver: Arc<dyn UsbDriver> = Arc::new(SimUsb::new(&config.simulator.usb_devices));
    let session = UsbSession::new(driver, &config.usb, notify_sink(io::stdout()));
    let mut tree = usb::build_menu(session)?;
    Navigator::new(&mut tree).run(console)
}
