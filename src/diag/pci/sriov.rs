//! SR-IOV enable/disable submenu.

use log::info;

use super::PciSession;
use crate::console::{input_number, print_error, print_success, Console, Input};
use crate::diag::status_text;
use crate::error::DiagResult;
use crate::menu::{shared, MenuOption, MenuTree, NodeId};
use crate::status::{Status, INVALID_PARAMETER};

pub struct SriovMenu {
    session: PciSession,
    /// Virtual functions enabled, as read on entry
    num_vfs: u32,
}

pub fn attach(tree: &mut MenuTree, parent: NodeId, session: &PciSession) -> DiagResult<()> {
    let ctx = shared(SriovMenu {
        session: session.clone(),
        num_vfs: 0,
    });

    let menu = tree.add_option(
        parent,
        MenuOption::new("Enable/disable SR-IOV capability")
            .on_entry(SriovMenu::enter)
            .on_exit(|menu: &mut SriovMenu, _| {
                menu.num_vfs = 0;
                Ok(Status::SUCCESS)
            })
            .hidden_when(|menu: &SriovMenu| !menu.session.has_device()),
        &ctx,
    )?;

    tree.attach_siblings(
        menu,
        [
            MenuOption::new("Enable SR-IOV")
                .on_entry(SriovMenu::enable)
                .hidden_when(|menu: &SriovMenu| menu.num_vfs > 0),
            MenuOption::new("Disable SR-IOV")
                .on_entry(SriovMenu::disable)
                .hidden_when(|menu: &SriovMenu| menu.num_vfs == 0),
        ],
        &ctx,
    )?;
    Ok(())
}

impl SriovMenu {
    fn enter(&mut self, console: &mut dyn Console) -> DiagResult<Status> {
        let handle = match self.session.device() {
            Ok(handle) => handle,
            Err(status) => return Ok(status),
        };
        writeln!(console)?;
        let queried = self.session.driver().sriov_num_vfs(handle);
        match queried {
            Ok(num_vfs) => {
                self.num_vfs = num_vfs;
                writeln!(
                    console,
                    "SR-IOV is {}. dwNumVFs: [{}]",
                    if num_vfs > 0 { "Enabled" } else { "Disabled" },
                    num_vfs
                )?;
            }
            Err(_) => {
                self.num_vfs = 0;
                writeln!(console, "Could not obtain dwNumVFs.")?;
            }
        }
        writeln!(console, "-----------")?;
        Ok(Status::SUCCESS)
    }

    fn enable(&mut self, console: &mut dyn Console) -> DiagResult<Status> {
        let handle = match self.session.device() {
            Ok(handle) => handle,
            Err(status) => return Ok(status),
        };
        let prompt = "How many Virtual Functions would you like to enable:";
        let Input::Value(wanted) = input_number(console, prompt, false, 0, 0)? else {
            writeln!(console, "Wrong Input")?;
            return Ok(INVALID_PARAMETER);
        };
        let Ok(wanted) = u32::try_from(wanted) else {
            writeln!(console, "Wrong Input")?;
            return Ok(INVALID_PARAMETER);
        };

        let enabled = self.session.driver().sriov_enable(handle, wanted);
        match enabled {
            Ok(()) => {
                info!("enabled {} virtual functions on {}", wanted, handle);
                self.session.set_sriov_enabled(true);
                print_success(console, "SR-IOV enabled successfully")?;
                Ok(Status::SUCCESS)
            }
            Err(status) => {
                print_error(
                    console,
                    &format!("Failed enabling SR-IOV. Error [{}]", status_text(status)),
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
        let disabled = self.session.driver().sriov_disable(handle);
        match disabled {
            Ok(()) => {
                info!("disabled SR-IOV on {}", handle);
                self.session.set_sriov_enabled(false);
                print_success(console, "SR-IOV disabled successfully")?;
                Ok(Status::SUCCESS)
            }
            Err(status) => {
                print_error(
                    console,
                    &format!("Failed disabling SR-IOV. Error [{}]", status_text(status)),
                )?;
                Ok(status)
            }
        }
    }
}
