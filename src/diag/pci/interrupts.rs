//! Interrupt enable/disable submenu.

use std::io::Write;

use log::{info, warn};

use super::PciSession;
use crate::console::{print_error, print_success, warning_text, Console, NotifySink};
use crate::diag::status_text;
use crate::driver::{DeviceHandle, InterruptHandler, InterruptInfo};
use crate::error::DiagResult;
use crate::menu::{shared, MenuOption, MenuTree, NodeId};
use crate::status::Status;

pub struct IntMenu {
    session: PciSession,
    enabled: bool,
}

pub fn attach(tree: &mut MenuTree, parent: NodeId, session: &PciSession) -> DiagResult<()> {
    let ctx = shared(IntMenu {
        session: session.clone(),
        enabled: false,
    });

    let menu = tree.add_option(
        parent,
        MenuOption::new("Enable/disable the device's interrupts")
            .title("Interrupts")
            .on_entry(IntMenu::enter)
            .hidden_when(|menu: &IntMenu| !menu.session.has_device()),
        &ctx,
    )?;

    tree.attach_siblings(
        menu,
        [
            MenuOption::new("Enable interrupts")
                .on_entry(IntMenu::enable)
                .hidden_when(|menu: &IntMenu| menu.enabled),
            MenuOption::new("Disable interrupts")
                .on_entry(IntMenu::disable)
                .hidden_when(|menu: &IntMenu| !menu.enabled),
        ],
        &ctx,
    )?;
    Ok(())
}

/// Handler that reports each interrupt to `sink`.
pub fn interrupt_printer(sink: NotifySink) -> InterruptHandler {
    Box::new(move |_: DeviceHandle, info: &InterruptInfo| {
        let Ok(mut out) = sink.lock() else {
            return;
        };
        let mut report = format!(
            "Got interrupt number {}\nInterrupt Type: {}\n",
            info.count, info.kind
        );
        if let Some(data) = info.message_data {
            report.push_str(&format!("Message Data: 0x{:x}\n", data));
        }
        if let Err(e) = out.write_all(report.as_bytes()).and_then(|()| out.flush()) {
            warn!("dropped interrupt report: {}", e);
        }
    })
}

impl IntMenu {
    fn enter(&mut self, console: &mut dyn Console) -> DiagResult<Status> {
        let handle = match self.session.device() {
            Ok(handle) => handle,
            Err(status) => return Ok(status),
        };
        let (enabled, options) = {
            let driver = self.session.driver();
            (driver.int_enabled(handle), driver.int_options(handle))
        };
        self.enabled = enabled;

        let options = options.unwrap_or_default();
        if options.level_sensitive && !self.enabled {
            let msi = options.is_msi();
            let warning = format!(
                "\nWARNING!!!\n----------\nYour hardware has level sensitive interrupts.\n\
                 Before enabling the interrupts, {} first make sure the driver\n\
                 acknowledges {}interrupts when they occur, as dictated by the\n\
                 hardware's specification.\n",
                if msi { "it is recommended that you" } else { "you must" },
                if msi { "level sensitive " } else { "" }
            );
            writeln!(console, "{}", warning_text(&warning, console.supports_color()))?;
        }
        Ok(Status::SUCCESS)
    }

    fn enable(&mut self, console: &mut dyn Console) -> DiagResult<Status> {
        let handle = match self.session.device() {
            Ok(handle) => handle,
            Err(status) => return Ok(status),
        };
        let handler = interrupt_printer(self.session.notify());
        let enabled = self.session.driver().int_enable(handle, handler);
        match enabled {
            Ok(()) => {
                info!("interrupts enabled on {}", handle);
                self.enabled = true;
                print_success(console, "Interrupts enabled")?;
                Ok(Status::SUCCESS)
            }
            Err(status) => {
                print_error(
                    console,
                    &format!("Failed enabling interrupts. Error [{}]", status_text(status)),
                )?;
                Ok(status)
            }
        }
    }

    fn disable(&mut self, console: &mut dyn Console) -> DiagResult<Status> {
        let handle = match self.session.device() {
            Ok(handle) => handle,
            Err(status) => return Ok(status),
        };
        let disabled = self.session.driver().int_disable(handle);
        match disabled {
            Ok(()) => {
                info!("interrupts disabled on {}", handle);
                self.enabled = false;
                print_success(console, "Interrupts disabled")?;
                Ok(Status::SUCCESS)
            }
            Err(status) => {
                print_error(
                    console,
                    &format!("Failed disabling interrupts: {}", status_text(status)),
                )?;
                Ok(status)
            }
        }
    }
}
