//! Configuration type definitions

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DiagError, DiagResult};

use super::loader::{self, ConfigWarning};

/// Output configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub verbosity: Verbosity,

    #[serde(default)]
    pub color: ColorMode,
}

/// Color output mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    #[default]
    Auto,
    Always,
    Never,
}

/// Verbosity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
    Debug,
}

/// PCI diagnostics configuration
///
/// A non-zero `default_vendor_id` opens the first matching device at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PciConfig {
    #[serde(default)]
    pub default_vendor_id: u32,

    #[serde(default)]
    pub default_device_id: u32,
}

/// USB diagnostics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsbConfig {
    /// Start in streaming transfer mode
    #[serde(default)]
    pub stream_mode: bool,

    #[serde(default = "default_listen_buffer_size")]
    pub listen_buffer_size: u32,

    #[serde(default = "default_stream_buffer_size")]
    pub stream_buffer_size: u32,

    #[serde(default = "default_stream_transfer_size")]
    pub stream_transfer_size: u32,

    #[serde(default = "default_stream_iterations")]
    pub stream_iterations: u32,
}

impl Default for UsbConfig {
    fn default() -> Self {
        Self {
            stream_mode: false,
            listen_buffer_size: default_listen_buffer_size(),
            stream_buffer_size: default_stream_buffer_size(),
            stream_transfer_size: default_stream_transfer_size(),
            stream_iterations: default_stream_iterations(),
        }
    }
}

fn default_listen_buffer_size() -> u32 {
    0x20000
}

fn default_stream_buffer_size() -> u32 {
    5_120_000
}

fn default_stream_transfer_size() -> u32 {
    256 * 1024
}

fn default_stream_iterations() -> u32 {
    1500
}

/// Kind of a simulated base address register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SimBarKind {
    #[default]
    Memory,
    Io,
}

/// One simulated base address register
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimBar {
    #[serde(default)]
    pub kind: SimBarKind,
    pub size: u64,
}

/// One simulated PCI function
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimPciDevice {
    pub vendor_id: u32,
    pub device_id: u32,

    #[serde(default)]
    pub domain: u32,

    #[serde(default)]
    pub bus: u32,

    #[serde(default)]
    pub slot: u32,

    #[serde(default)]
    pub function: u32,

    /// Expose a PCI Express capability and extended capabilities
    #[serde(default = "default_true")]
    pub express: bool,

    #[serde(default = "default_bars")]
    pub bars: Vec<SimBar>,

    #[serde(default = "default_true")]
    pub level_sensitive: bool,

    #[serde(default)]
    pub msi: bool,

    #[serde(default)]
    pub msix: bool,

    /// Virtual functions the device can expose; 0 disables SR-IOV
    #[serde(default = "default_total_vfs")]
    pub total_vfs: u32,
}

impl Default for SimPciDevice {
    fn default() -> Self {
        Self {
            vendor_id: 0x10ee,
            device_id: 0x7011,
            domain: 0,
            bus: 1,
            slot: 0,
            function: 0,
            express: true,
            bars: default_bars(),
            level_sensitive: true,
            msi: false,
            msix: false,
            total_vfs: default_total_vfs(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_bars() -> Vec<SimBar> {
    vec![
        SimBar {
            kind: SimBarKind::Memory,
            size: 0x1000,
        },
        SimBar {
            kind: SimBarKind::Io,
            size: 0x100,
        },
    ]
}

fn default_total_vfs() -> u32 {
    8
}

/// One simulated USB device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimUsbDevice {
    pub vendor_id: u16,
    pub product_id: u16,

    #[serde(default)]
    pub serial: Option<String>,
}

impl Default for SimUsbDevice {
    fn default() -> Self {
        Self {
            vendor_id: 0x1234,
            product_id: 0x5678,
            serial: Some("DM0001".to_string()),
        }
    }
}

/// Another process already registered in the simulated IPC group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimIpcProcess {
    pub name: String,

    #[serde(default)]
    pub sub_group_id: u32,
}

impl Default for SimIpcProcess {
    fn default() -> Self {
        Self {
            name: "Peer diagnostic program".to_string(),
            sub_group_id: 1,
        }
    }
}

/// In-memory devices served by the simulator backends
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    #[serde(default = "default_pci_devices")]
    pub pci_devices: Vec<SimPciDevice>,

    #[serde(default = "default_usb_devices")]
    pub usb_devices: Vec<SimUsbDevice>,

    #[serde(default = "default_ipc_processes")]
    pub ipc_processes: Vec<SimIpcProcess>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            pci_devices: default_pci_devices(),
            usb_devices: default_usb_devices(),
            ipc_processes: default_ipc_processes(),
        }
    }
}

fn default_ipc_processes() -> Vec<SimIpcProcess> {
    vec![SimIpcProcess::default()]
}

fn default_pci_devices() -> Vec<SimPciDevice> {
    vec![SimPciDevice::default()]
}

fn default_usb_devices() -> Vec<SimUsbDevice> {
    vec![SimUsbDevice::default()]
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub pci: PciConfig,

    #[serde(default)]
    pub usb: UsbConfig,

    #[serde(default)]
    pub simulator: SimulatorConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> DiagResult<Self> {
        let (config, _warnings) = loader::load_with_warnings(path)?;
        Ok(config)
    }

    /// Load configuration and collect non-fatal warnings (e.g. unknown keys).
    pub fn load_with_warnings(path: &Path) -> DiagResult<(Self, Vec<ConfigWarning>)> {
        loader::load_with_warnings(path)
    }

    /// Apply environment variable overrides (DIAGMENU_* prefix)
    pub fn with_env_overrides(self) -> DiagResult<Self> {
        loader::with_env_overrides(self)
    }

    /// Reject values that parse but cannot be used.
    pub fn validate(&self) -> DiagResult<()> {
        let invalid = |key: &str, message: String| {
            Err(DiagError::InvalidConfig {
                key: key.to_string(),
                message,
            })
        };

        if self.pci.default_vendor_id > 0xffff {
            return invalid(
                "pci.default_vendor_id",
                format!("0x{:x} does not fit in 16 bits", self.pci.default_vendor_id),
            );
        }
        if self.pci.default_device_id > 0xffff {
            return invalid(
                "pci.default_device_id",
                format!("0x{:x} does not fit in 16 bits", self.pci.default_device_id),
            );
        }

        let usb = &self.usb;
        for (key, value) in [
            ("usb.listen_buffer_size", usb.listen_buffer_size),
            ("usb.stream_buffer_size", usb.stream_buffer_size),
            ("usb.stream_transfer_size", usb.stream_transfer_size),
            ("usb.stream_iterations", usb.stream_iterations),
        ] {
            if value == 0 {
                return invalid(key, "must be greater than zero".to_string());
            }
        }
        if usb.stream_transfer_size > usb.stream_buffer_size {
            return invalid(
                "usb.stream_transfer_size",
                format!(
                    "{} exceeds usb.stream_buffer_size ({})",
                    usb.stream_transfer_size, usb.stream_buffer_size
                ),
            );
        }

        for (i, device) in self.simulator.pci_devices.iter().enumerate() {
            if device.bars.len() > 6 {
                return invalid(
                    &format!("simulator.pci_devices[{i}].bars"),
                    format!("{} BARs given, at most 6 allowed", device.bars.len()),
                );
            }
            if let Some(bar) = device.bars.iter().find(|b| !b.size.is_power_of_two()) {
                return invalid(
                    &format!("simulator.pci_devices[{i}].bars"),
                    format!("size 0x{:x} is not a power of two", bar.size),
                );
            }
        }

        Ok(())
    }
}
