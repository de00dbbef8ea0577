//! Diagmenu - interactive hierarchical menu engine with PCI and USB
//! diagnostic consoles
//!
//! A [`menu::MenuTree`] holds numbered options with entry, exit and
//! visibility callbacks; the [`menu::Navigator`] walks it over a
//! [`console::Console`]. The `diag` menus drive devices through the
//! [`driver`] ports, backed here by in-memory simulators.

pub mod cli;
pub mod config;
pub mod console;
pub mod diag;
pub mod driver;
pub mod error;
pub mod logging;
pub mod menu;
pub mod status;

// Re-exports for convenience
pub use config::Config;
pub use error::{DiagError, DiagResult};
pub use menu::{MenuOption, MenuTree, Navigator};
pub use status::Status;
