//! Plug-and-play and power management event registration.

use std::io::Write;

use log::{info, warn};

use super::PciSession;
use crate::console::{print_error, print_success, Console, NotifySink};
use crate::diag::status_text;
use crate::driver::{DeviceHandle, EventHandler, PciEvent};
use crate::error::DiagResult;
use crate::menu::{shared, MenuOption, MenuTree, NodeId};
use crate::status::Status;

pub struct EventsMenu {
    session: PciSession,
    registered: bool,
}

pub fn attach(tree: &mut MenuTree, parent: NodeId, session: &PciSession) -> DiagResult<()> {
    let ctx = shared(EventsMenu {
        session: session.clone(),
        registered: false,
    });

    let menu = tree.add_option(
        parent,
        MenuOption::new("Register/unregister plug-and-play and power management events")
            .title("Plug-and-play and power management events")
            .on_entry(|menu: &mut EventsMenu, _| {
                menu.sync();
                Ok(Status::SUCCESS)
            })
            .hidden_when(|menu: &EventsMenu| !menu.session.has_device()),
        &ctx,
    )?;

    tree.attach_siblings(
        menu,
        [
            MenuOption::new("Register Events")
                .on_entry(EventsMenu::register)
                .hidden_when(|menu: &EventsMenu| menu.registered),
            MenuOption::new("Unregister Events")
                .on_entry(EventsMenu::unregister)
                .hidden_when(|menu: &EventsMenu| !menu.registered),
        ],
        &ctx,
    )?;
    Ok(())
}

/// Handler that prints each event to `sink`.
pub fn event_printer(sink: NotifySink) -> EventHandler {
    Box::new(move |handle: DeviceHandle, event: PciEvent| {
        let Ok(mut out) = sink.lock() else {
            return;
        };
        if let Err(e) = writeln!(
            out,
            "\nReceived event notification (device handle {}): {}",
            handle, event
        ) {
            warn!("dropped event notification: {}", e);
        }
        let _ = out.flush();
    })
}

impl EventsMenu {
    fn sync(&mut self) {
        self.registered = self
            .session
            .active()
            .is_some_and(|handle| self.session.driver().events_registered(handle));
    }

    fn register(&mut self, console: &mut dyn Console) -> DiagResult<Status> {
        let handle = match self.session.device() {
            Ok(handle) => handle,
            Err(status) => return Ok(status),
        };
        let handler = event_printer(self.session.notify());
        let registered = self.session.driver().event_register(handle, handler);
        match registered {
            Ok(()) => {
                info!("registered events on {}", handle);
                self.registered = true;
                print_success(console, "Events registered")?;
                Ok(Status::SUCCESS)
            }
            Err(status) => {
                print_error(
                    console,
                    &format!("Failed to register events. Last error [{}]", status_text(status)),
                )?;
                Ok(status)
            }
        }
    }

    fn unregister(&mut self, console: &mut dyn Console) -> DiagResult<Status> {
        let handle = match self.session.device() {
            Ok(handle) => handle,
            Err(status) => return Ok(status),
        };
        let unregistered = self.session.driver().event_unregister(handle);
        match unregistered {
            Ok(()) => {
                info!("unregistered events on {}", handle);
                self.registered = false;
                print_success(console, "Events unregistered")?;
                Ok(Status::SUCCESS)
            }
            Err(status) => {
                print_error(
                    console,
                    &format!(
                        "Failed to unregister events. Last error [{}]",
                        status_text(status)
                    ),
                )?;
                Ok(status)
            }
        }
    }
}
