//! Memory and I/O range access submenu.

use super::access::{read_write_addr, read_write_block, select_width, Direction, Target};
use super::PciSession;
use crate::console::{input_number, Console, Input};
use crate::driver::{AccessWidth, AddrSpace};
use crate::error::DiagResult;
use crate::menu::{shared, MenuOption, MenuTree, NodeId};
use crate::status::{Status, INVALID_PARAMETER, NO_RESOURCES_ON_DEVICE};

/// Active BAR, access width and transfer type for the submenu.
pub struct AddrMenu {
    session: PciSession,
    /// Picked on entry and forgotten on exit
    bar: Option<usize>,
    width: AccessWidth,
    block: bool,
}

pub fn attach(tree: &mut MenuTree, parent: NodeId, session: &PciSession) -> DiagResult<()> {
    let ctx = shared(AddrMenu {
        session: session.clone(),
        bar: None,
        width: AccessWidth::Bits32,
        block: false,
    });

    let menu = tree.add_option(
        parent,
        MenuOption::new("Read/write memory and I/O addresses on the device")
            .title("Read/write the device's memory and I/O ranges")
            .on_entry(AddrMenu::enter)
            .on_exit(|menu: &mut AddrMenu, _| {
                menu.bar = None;
                Ok(Status::SUCCESS)
            })
            .hidden_when(|menu: &AddrMenu| !menu.session.has_device()),
        &ctx,
    )?;

    tree.attach_siblings(
        menu,
        [
            MenuOption::new("Change active address space for read/write")
                .on_entry(AddrMenu::select_bar),
            MenuOption::new("Change active read/write mode").on_entry(
                |menu: &mut AddrMenu, console| {
                    if let Some(width) = select_width(console)? {
                        menu.width = width;
                    }
                    Ok(Status::SUCCESS)
                },
            ),
            MenuOption::new("Toggle active transfer type").on_entry(|menu: &mut AddrMenu, _| {
                menu.block = !menu.block;
                Ok(Status::SUCCESS)
            }),
            MenuOption::new("Read from active address space")
                .on_entry(|menu: &mut AddrMenu, console| menu.transfer(console, Direction::Read)),
            MenuOption::new("Write to active address space")
                .on_entry(|menu: &mut AddrMenu, console| menu.transfer(console, Direction::Write)),
        ],
        &ctx,
    )?;
    Ok(())
}

fn describe_space(space: &AddrSpace) -> String {
    if space.active {
        format!(
            "0x{:016X} - 0x{:016X} (0x{:x} bytes)",
            space.base,
            space.base + space.size.saturating_sub(1),
            space.size
        )
    } else {
        "Inactive address space".to_string()
    }
}

impl AddrMenu {
    fn spaces(&self) -> Vec<AddrSpace> {
        match self.session.device() {
            Ok(handle) => self.session.driver().addr_spaces(handle).unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }

    fn enter(&mut self, console: &mut dyn Console) -> DiagResult<Status> {
        if self.bar.is_none() {
            self.bar = self.spaces().iter().find(|s| s.active).map(|s| s.bar);
        }
        let Some(bar) = self.bar else {
            writeln!(console, "MenuReadWriteAddr: Error - No active address spaces found")?;
            return Ok(NO_RESOURCES_ON_DEVICE);
        };

        writeln!(console)?;
        writeln!(console, "Current Read/Write configurations:")?;
        writeln!(console, "----------------------------------")?;
        writeln!(console, "Currently active address space : BAR {}", bar)?;
        writeln!(console, "Currently active read/write mode: {}", self.width)?;
        writeln!(
            console,
            "Currently active transfer type: {}",
            if self.block {
                "block transfers"
            } else {
                "non-block transfers"
            }
        )?;
        writeln!(console)?;
        Ok(Status::SUCCESS)
    }

    fn select_bar(&mut self, console: &mut dyn Console) -> DiagResult<Status> {
        let spaces = self.spaces();

        writeln!(console)?;
        writeln!(console, "Select an active address space:")?;
        writeln!(console, "-------------------------------")?;
        for (i, space) in spaces.iter().enumerate() {
            writeln!(
                console,
                "{}. {:<22} {:<7} {}",
                i + 1,
                format!("BAR {}", space.bar),
                space.kind.to_string(),
                describe_space(space)
            )?;
        }
        writeln!(console)?;

        let Input::Value(choice) = input_number(console, "Enter option", false, 1, spaces.len() as u64)?
        else {
            return Ok(INVALID_PARAMETER);
        };
        let picked = (choice as usize).checked_sub(1).and_then(|i| spaces.get(i));
        let Some(space) = picked.filter(|s| s.active) else {
            writeln!(console, "You have selected an inactive address space")?;
            return Ok(INVALID_PARAMETER);
        };
        self.bar = Some(space.bar);
        Ok(Status::SUCCESS)
    }

    fn transfer(&mut self, console: &mut dyn Console, direction: Direction) -> DiagResult<Status> {
        let handle = match self.session.device() {
            Ok(handle) => handle,
            Err(status) => return Ok(status),
        };
        let Some(bar) = self.bar else {
            return Ok(NO_RESOURCES_ON_DEVICE);
        };

        let mut driver = self.session.driver();
        if self.block {
            let target = Target::Bar {
                bar,
                width: self.width,
            };
            read_write_block(&mut *driver, handle, console, direction, target)?;
        } else {
            read_write_addr(&mut *driver, handle, console, direction, bar, self.width)?;
        }
        Ok(Status::SUCCESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SimBar, SimBarKind, SimPciDevice};
    use crate::console::ScriptedConsole;
    use crate::diag::pci::test_support::open_session;
    use crate::menu::Navigator;

    fn addr_tree(session: &PciSession) -> MenuTree {
        let root_ctx = shared(());
        let mut tree = MenuTree::new(MenuOption::new(""), &root_ctx);
        let root = tree.root();
        attach(&mut tree, root, session).unwrap();
        tree
    }

    #[test]
    fn entry_reports_defaults() {
        let fixture = open_session(SimPciDevice::default());
        let mut tree = addr_tree(&fixture.session);
        let mut console = ScriptedConsole::scripted("1\n99\n99\n");
        Navigator::new(&mut tree).run(&mut console).unwrap();
        let out = console.output();
        assert!(out.contains("Currently active address space : BAR 0\n"));
        assert!(out.contains("Currently active read/write mode: 32 bit\n"));
        assert!(out.contains("Currently active transfer type: non-block transfers\n"));
    }

    #[test]
    fn device_without_bars_backtracks() {
        let fixture = open_session(SimPciDevice {
            bars: Vec::new(),
            ..SimPciDevice::default()
        });
        let mut tree = addr_tree(&fixture.session);
        let mut console = ScriptedConsole::scripted("1\n99\n");
        let status = Navigator::new(&mut tree).run(&mut console).unwrap();
        assert_eq!(status, NO_RESOURCES_ON_DEVICE);
        assert!(console
            .output()
            .contains("MenuReadWriteAddr: Error - No active address spaces found"));
    }

    #[test]
    fn settings_carry_into_transfers() {
        let fixture = open_session(SimPciDevice {
            bars: vec![
                SimBar {
                    kind: SimBarKind::Memory,
                    size: 0x1000,
                },
                SimBar {
                    kind: SimBarKind::Io,
                    size: 0x100,
                },
            ],
            ..SimPciDevice::default()
        });
        let handle = fixture.session.active().unwrap();
        let mut tree = addr_tree(&fixture.session);
        // select BAR 1, 16-bit mode, write 0xbeef at 0x20, then leave
        let script = "1\n1\n2\n2\n2\n5\n20\nbeef\n99\n99\n";
        let mut console = ScriptedConsole::scripted(script);
        Navigator::new(&mut tree).run(&mut console).unwrap();

        let out = console.output();
        assert!(out.contains("2. BAR 1                  I/O     0x000000000000E000"));
        assert!(out.contains("Currently active address space : BAR 1"));
        assert!(out.contains("Currently active read/write mode: 16 bit"));
        assert!(out.contains("Wrote 0xBEEF to offset 0x20 in BAR 1"));
        assert_eq!(
            fixture
                .session
                .driver()
                .read_addr(handle, 1, 0x20, AccessWidth::Bits16),
            Ok(0xbeef)
        );
    }

    #[test]
    fn block_mode_uses_block_transfers() {
        let fixture = open_session(SimPciDevice::default());
        let mut tree = addr_tree(&fixture.session);
        let script = "1\n3\n4\n0\n8\n\n99\n99\n";
        let mut console = ScriptedConsole::scripted(script);
        Navigator::new(&mut tree).run(&mut console).unwrap();
        let out = console.output();
        assert!(out.contains("Currently active transfer type: block transfers"));
        assert!(out.contains("00 00 00 00 00 00 00 00 \n"));
    }
}
