//! Configuration space submenu.

use log::error;

use super::access::{input_write_data, read_write_block, Direction, Target};
use super::regs::{self, Register, PCIE_REGS, PCI_REGS};
use super::PciSession;
use crate::console::{input_menu_choice, input_u32, parse_option, print_error, Console, Input};
use crate::diag::{pause, status_text};
use crate::driver::{DeviceHandle, PciDriver};
use crate::error::DiagResult;
use crate::menu::{shared, MenuOption, MenuTree, NodeId, EXIT_MENU_OPTION};
use crate::status::Status;

const NAME_WIDTH: usize = 22;

/// Context of the configuration space submenu.
pub struct CfgMenu {
    session: PciSession,
    /// Offset of the PCI Express capability, refreshed on entry
    express: Option<u32>,
}

pub fn attach(tree: &mut MenuTree, parent: NodeId, session: &PciSession) -> DiagResult<()> {
    let ctx = shared(CfgMenu {
        session: session.clone(),
        express: None,
    });

    let menu = tree.add_option(
        parent,
        MenuOption::new("Read/write the PCI configuration space")
            .title("Read/write the device's configuration space")
            .on_entry(CfgMenu::enter)
            .hidden_when(|menu: &CfgMenu| !menu.session.has_device()),
        &ctx,
    )?;

    let not_express = |menu: &CfgMenu| menu.express.is_none();
    tree.attach_siblings(
        menu,
        [
            MenuOption::new("Read from an offset").on_entry(|menu: &mut CfgMenu, console| {
                menu.block(console, Direction::Read)
            }),
            MenuOption::new("Write to an offset").on_entry(|menu: &mut CfgMenu, console| {
                menu.block(console, Direction::Write)
            }),
            MenuOption::new("Read all configuration registers defined for the device (see list above)")
                .on_entry(CfgMenu::read_all),
            MenuOption::new("Read from a named register").on_entry(|menu: &mut CfgMenu, console| {
                menu.named_register(console, Direction::Read, false)
            }),
            MenuOption::new("Write to a named register").on_entry(|menu: &mut CfgMenu, console| {
                menu.named_register(console, Direction::Write, false)
            }),
            MenuOption::new("Read from a named PCI Express register")
                .on_entry(|menu: &mut CfgMenu, console| {
                    menu.named_register(console, Direction::Read, true)
                })
                .hidden_when(not_express),
            MenuOption::new("Write to a named PCI Express register")
                .on_entry(|menu: &mut CfgMenu, console| {
                    menu.named_register(console, Direction::Write, true)
                })
                .hidden_when(not_express),
            MenuOption::new("Scan PCI/PCIe capabilities").on_entry(CfgMenu::scan_capabilities),
        ],
        &ctx,
    )?;
    Ok(())
}

impl CfgMenu {
    fn enter(&mut self, console: &mut dyn Console) -> DiagResult<Status> {
        let handle = match self.session.device() {
            Ok(handle) => handle,
            Err(status) => return Ok(status),
        };
        self.express = match regs::express_offset(&mut *self.session.driver(), handle) {
            Ok(offset) => offset,
            Err(status) => {
                error!("capability walk on {} failed: {}", handle, status);
                None
            }
        };

        writeln!(console)?;
        writeln!(console, "Configuration registers:")?;
        write!(console, "------------------------")?;
        print_register_table(console, PCI_REGS, 0, 0)?;
        if let Some(offset) = self.express {
            print_register_table(console, PCIE_REGS, offset, PCI_REGS.len())?;
        }
        writeln!(console)?;
        Ok(Status::SUCCESS)
    }

    fn block(&mut self, console: &mut dyn Console, direction: Direction) -> DiagResult<Status> {
        let handle = match self.session.device() {
            Ok(handle) => handle,
            Err(status) => return Ok(status),
        };
        let mut driver = self.session.driver();
        read_write_block(&mut *driver, handle, console, direction, Target::Config)?;
        Ok(Status::SUCCESS)
    }

    fn read_all(&mut self, console: &mut dyn Console) -> DiagResult<Status> {
        let handle = match self.session.device() {
            Ok(handle) => handle,
            Err(status) => return Ok(status),
        };
        let mut driver = self.session.driver();
        read_regs_all(&mut *driver, handle, console, PCI_REGS, None)?;
        if let Some(offset) = self.express {
            read_regs_all(&mut *driver, handle, console, PCIE_REGS, Some(offset))?;
        }
        Ok(Status::SUCCESS)
    }

    fn named_register(
        &mut self,
        console: &mut dyn Console,
        direction: Direction,
        express: bool,
    ) -> DiagResult<Status> {
        let handle = match self.session.device() {
            Ok(handle) => handle,
            Err(status) => return Ok(status),
        };
        let (table, base) = if express {
            match self.express {
                Some(offset) => (PCIE_REGS, offset),
                None => return Ok(Status::SUCCESS),
            }
        } else {
            (PCI_REGS, 0)
        };
        let mut driver = self.session.driver();
        read_write_reg(&mut *driver, handle, console, table, base, direction)?;
        Ok(Status::SUCCESS)
    }

    fn scan_capabilities(&mut self, console: &mut dyn Console) -> DiagResult<Status> {
        let handle = match self.session.device() {
            Ok(handle) => handle,
            Err(status) => return Ok(status),
        };
        let mut driver = self.session.driver();
        scan_capabilities(&mut *driver, handle, console)?;
        Ok(Status::SUCCESS)
    }
}

/// Print the register table, offsets shifted by `base` and numbering
/// continuing after `numbered_before` rows.
pub fn print_register_table(
    console: &mut dyn Console,
    table: &[Register],
    base: u32,
    numbered_before: usize,
) -> DiagResult<()> {
    let express = base != 0;
    writeln!(console)?;
    writeln!(console, "PCI {}Registers", if express { "Express " } else { "" })?;
    writeln!(console, "----{}---------", if express { "--------" } else { "" })?;
    writeln!(
        console,
        "{:3} {:<w$} {:<10} {:<5} {:<4} {}",
        "",
        "Name",
        "Offset",
        "Size",
        "R/W",
        "Description",
        w = NAME_WIDTH
    )?;
    writeln!(
        console,
        "{:3} {:<w$} {:<10} {:<5} {:<4} {}",
        "",
        "----",
        "------",
        "----",
        "---",
        "-----------",
        w = NAME_WIDTH
    )?;
    for (i, reg) in table.iter().enumerate() {
        writeln!(
            console,
            "{:2}. {:<w$} 0x{:<8X} {:<5} {:<4} {}",
            i + 1 + numbered_before,
            reg.name,
            reg.offset + base,
            reg.width.bytes(),
            "RW",
            reg.description,
            w = NAME_WIDTH
        )?;
    }
    Ok(())
}

/// Read and print every register of `table`. `express` carries the
/// capability offset for the PCI Express table.
pub fn read_regs_all(
    driver: &mut dyn PciDriver,
    handle: DeviceHandle,
    console: &mut dyn Console,
    table: &[Register],
    express: Option<u32>,
) -> DiagResult<()> {
    let base = express.unwrap_or(0);
    writeln!(console)?;
    writeln!(
        console,
        "{} registers data:",
        if express.is_some() {
            "PCI Express configuration"
        } else {
            "PCI configuration"
        }
    )?;
    writeln!(console, "---------------------------------")?;
    writeln!(console)?;
    writeln!(console, "{:3} {:<w$} {:<10}  {}", "", "Name", "Data", "Description", w = NAME_WIDTH)?;
    writeln!(console, "{:3} {:<w$} {:<10}  {}", "", "----", "----", "-----------", w = NAME_WIDTH)?;

    for (i, reg) in table.iter().enumerate() {
        write!(console, "{:2}. {:<w$} ", i + 1, reg.name, w = NAME_WIDTH)?;
        match driver.read_cfg(handle, reg.offset + base, reg.width) {
            Ok(value) => write!(console, "0x{:<8X}  ", value)?,
            Err(status) => write!(console, "Error: 0x{:<9x}  ", status.code())?,
        }
        writeln!(console, "{}", reg.description)?;
    }
    pause(console)
}

/// Let the operator pick a register from `table` and read or write it.
pub fn read_write_reg(
    driver: &mut dyn PciDriver,
    handle: DeviceHandle,
    console: &mut dyn Console,
    table: &[Register],
    base: u32,
    direction: Direction,
) -> DiagResult<()> {
    writeln!(console)?;
    writeln!(console, "PCI configuration registers:")?;
    writeln!(console, "----------------------------")?;
    print_register_table(console, table, base, 0)?;

    writeln!(console)?;
    write!(
        console,
        "Select a register from the list above to {} or 0 to cancel: ",
        match direction {
            Direction::Read => "read from",
            Direction::Write => "write to",
        }
    )?;
    let line = console.read_line()?;
    let Some(choice) = parse_option(&line) else {
        writeln!(console, "Invalid selection")?;
        return pause(console);
    };
    if choice == 0 {
        return Ok(());
    }
    let Some(reg) = table.get(choice as usize - 1) else {
        writeln!(
            console,
            "Selection ({}) is out of range (1 - {})",
            choice,
            table.len()
        )?;
        return pause(console);
    };

    let offset = reg.offset + base;
    let result = match direction {
        Direction::Read => driver.read_cfg(handle, offset, reg.width),
        Direction::Write => match input_write_data(console, reg.width)? {
            Some(value) => driver.write_cfg(handle, offset, reg.width, value).map(|()| value),
            None => return pause(console),
        },
    };

    match result {
        Ok(value) => writeln!(
            console,
            "{} 0x{:X} {} register {} at offset [0x{:x}]",
            match direction {
                Direction::Read => "Read",
                Direction::Write => "Wrote",
            },
            value,
            match direction {
                Direction::Read => "from",
                Direction::Write => "to",
            },
            reg.name,
            offset
        )?,
        Err(status) => print_error(
            console,
            &format!(
                "Failed {} {}. Error [{}]",
                match direction {
                    Direction::Read => "reading data from",
                    Direction::Write => "writing data to",
                },
                reg.name,
                status_text(status)
            ),
        )?,
    }
    writeln!(console)?;
    pause(console)
}

/// Offer the capability scan variants and print what is found.
pub fn scan_capabilities(
    driver: &mut dyn PciDriver,
    handle: DeviceHandle,
    console: &mut dyn Console,
) -> DiagResult<()> {
    writeln!(console)?;
    writeln!(console, "Select scan option (PCI/PCI-Express, all/specific):")?;
    writeln!(console, "-------------------------------------------------------")?;
    writeln!(console, "1. Scan PCI capabilities")?;
    writeln!(console, "2. Scan specific PCI capability")?;
    writeln!(console, "3. Scan PCI Express extended capabilities")?;
    writeln!(console, "4. Scan specific PCI Express extended capability")?;
    writeln!(console)?;

    let option = match input_menu_choice(console, 4)? {
        Input::Value(option) if option != EXIT_MENU_OPTION => option,
        _ => return Ok(()),
    };

    let extended = option >= 3;
    let filter = if option % 2 == 0 {
        let prompt = format!(
            "Enter requested {}capability ID (hexadecimal)",
            if extended { "extended " } else { "" }
        );
        match input_u32(console, &prompt, true, 0, 0)? {
            Input::Value(id) => Some(id),
            _ => return Ok(()),
        }
    } else {
        None
    };

    let scanned = if extended {
        regs::scan_ext_caps(driver, handle, filter)
    } else {
        regs::scan_caps(driver, handle, filter)
    };
    let caps = match scanned {
        Ok(caps) => caps,
        Err(status) => {
            return print_error(
                console,
                &format!(
                    "Failed scanning PCI capabilities. Error [{}]",
                    status_text(status)
                ),
            );
        }
    };

    let kind = if extended { "Express extended " } else { "" };
    if caps.is_empty() {
        return writeln!(console, "No PCI {}capabilities found", kind);
    }
    writeln!(console, "PCI {}capabilities found", kind)?;
    for (i, cap) in caps.iter().enumerate() {
        let name = if extended {
            regs::ext_cap_name(cap.id)
        } else {
            regs::cap_name(cap.id)
        };
        writeln!(
            console,
            "    {}) {} - ID [0x{:x}], offset [0x{:x}]",
            i + 1,
            name,
            cap.id,
            cap.offset
        )?;
    }
    Ok(())
}
