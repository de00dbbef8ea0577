//! Configuration module for diagmenu
//!
//! Configuration hierarchy:
//! 1. CLI flags (highest priority)
//! 2. Environment variables (DIAGMENU_*)
//! 3. Project config (./diagmenu.toml) or `--config PATH`
//! 4. User config (<config dir>/diagmenu/config.toml)
//! 5. Built-in defaults (lowest priority)

mod loader;
mod types;

pub use loader::{
    apply_overrides, load, resolve_config_path, with_env_overrides, ConfigWarning,
    PROJECT_CONFIG_FILE,
};
pub use types::{
    ColorMode, Config, OutputConfig, PciConfig, SimBar, SimBarKind, SimIpcProcess, SimPciDevice,
    SimUsbDevice,
    SimulatorConfig, UsbConfig, Verbosity,
};
