use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::ColorMode;

/// Diagmenu - interactive PCI and USB device diagnostics
#[derive(Parser, Debug)]
#[command(name = "diagmenu")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "Menus are driven from stdin; enter 99 to leave a menu.")]
pub struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of the default search
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// When to color status lines
    #[arg(long, value_enum, global = true)]
    pub color: Option<ColorMode>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the PCI diagnostics menu
    Pci {
        /// Vendor id of a device to open at startup (hex)
        #[arg(long, value_parser = parse_hex_u32)]
        vendor_id: Option<u32>,

        /// Device id of the device to open at startup (hex)
        #[arg(long, value_parser = parse_hex_u32)]
        device_id: Option<u32>,
    },

    /// Run the USB diagnostics menu
    Usb {
        /// Start in streaming transfer mode
        #[arg(long)]
        stream: bool,
    },
}

fn parse_hex_u32(value: &str) -> Result<u32, String> {
    crate::console::parse_number(value, true)
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| format!("'{}' is not a 32-bit hex number", value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn pci_ids_parse_as_hex() {
        let cli = Cli::parse_from(["diagmenu", "pci", "--vendor-id", "0x10ee", "--device-id", "7"]);
        match cli.command {
            Commands::Pci {
                vendor_id,
                device_id,
            } => {
                assert_eq!(vendor_id, Some(0x10ee));
                assert_eq!(device_id, Some(7));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from(["diagmenu", "usb", "--stream", "-vv", "--color", "never"]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.color, Some(ColorMode::Never));
        assert!(matches!(cli.command, Commands::Usb { stream: true }));
    }

    #[test]
    fn bad_hex_is_rejected() {
        assert!(Cli::try_parse_from(["diagmenu", "pci", "--vendor-id", "zz"]).is_err());
    }
}
