//! Selective suspend submenu.

use log::info;

use super::{report_failure, UsbSession};
use crate::console::Console;
use crate::error::DiagResult;
use crate::menu::{MenuOption, MenuTree, NodeId, Shared};
use crate::status::Status;

pub(super) fn attach(tree: &mut MenuTree, parent: NodeId, ctx: &Shared<UsbSession>) -> DiagResult<()> {
    let menu = tree.add_option(
        parent,
        MenuOption::new("Selective Suspend")
            .title("Toggle suspend mode")
            .on_entry(|session: &mut UsbSession, console| {
                Ok(match session.active_device(console)? {
                    Ok(_) => Status::SUCCESS,
                    Err(status) => status,
                })
            }),
        ctx,
    )?;

    tree.attach_siblings(
        menu,
        [
            MenuOption::new("Enter suspend mode")
                .on_entry(toggle)
                .hidden_when(|session: &UsbSession| session.suspended),
            MenuOption::new("Leave suspend mode")
                .on_entry(toggle)
                .hidden_when(|session: &UsbSession| !session.suspended),
        ],
        ctx,
    )?;
    Ok(())
}

fn toggle(session: &mut UsbSession, console: &mut dyn Console) -> DiagResult<Status> {
    let device = match session.active_device(console)? {
        Ok(device) => device,
        Err(status) => return Ok(status),
    };
    let submit = !session.suspended;
    match session.driver().selective_suspend(device.handle, submit) {
        Ok(()) => {
            session.suspended = submit;
            info!(
                "selective suspend {} for {}",
                if submit { "submitted" } else { "cancelled" },
                device.handle
            );
            Ok(Status::SUCCESS)
        }
        Err(status) => report_failure(console, "Selective suspend request failed", status),
    }
}
