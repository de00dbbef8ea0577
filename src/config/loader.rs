//! Configuration discovery and loading

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::console::parse_number;
use crate::error::{DiagError, DiagResult};

use super::types::{ColorMode, Config, Verbosity};

/// File name looked up in the working directory.
pub const PROJECT_CONFIG_FILE: &str = "diagmenu.toml";

/// Non-fatal configuration warning surfaced to CLI users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub key: String,
    pub file: PathBuf,
    pub line: Option<usize>,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown config key '{}' in {}", self.key, self.file.display())?;
        if let Some(line) = self.line {
            write!(f, ":{}", line)?;
        }
        if let Some(suggestion) = &self.suggestion {
            write!(f, " (did you mean '{}'?)", suggestion)?;
        }
        Ok(())
    }
}

/// Load configuration and collect non-fatal warnings (e.g. unknown keys).
pub fn load_with_warnings(path: &Path) -> DiagResult<(Config, Vec<ConfigWarning>)> {
    let content = fs::read_to_string(path)?;

    let mut unknown_paths: Vec<String> = Vec::new();
    let deserializer = toml::de::Deserializer::new(&content);

    let config: Config = serde_ignored::deserialize(deserializer, |p| {
        unknown_paths.push(p.to_string());
    })
    .map_err(|e| DiagError::ConfigParse {
        file: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let warnings = unknown_paths
        .into_iter()
        .map(|path_str| {
            let key = path_str
                .split('.')
                .next_back()
                .unwrap_or(path_str.as_str())
                .to_string();
            ConfigWarning {
                key: key.clone(),
                file: path.to_path_buf(),
                line: find_line_number(&content, &key),
                suggestion: suggest_key(&key),
            }
        })
        .collect();

    Ok((config, warnings))
}

/// First config file that applies.
///
/// An explicit path always wins, even when it does not exist (loading it
/// then reports the error). Otherwise `./diagmenu.toml`, then
/// `<config dir>/diagmenu/config.toml`.
pub fn resolve_config_path(explicit: Option<&Path>, cwd: &Path) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    let project = cwd.join(PROJECT_CONFIG_FILE);
    if project.is_file() {
        return Some(project);
    }

    dirs::config_dir()
        .map(|dir| dir.join("diagmenu").join("config.toml"))
        .filter(|path| path.is_file())
}

/// Load the effective configuration: file (if any), then environment.
///
/// Unknown keys are logged as warnings and returned to the caller.
pub fn load(explicit: Option<&Path>) -> DiagResult<(Config, Vec<ConfigWarning>)> {
    let cwd = std::env::current_dir()?;
    let (config, warnings) = match resolve_config_path(explicit, &cwd) {
        Some(path) => {
            debug!("loading config from {}", path.display());
            load_with_warnings(&path)?
        }
        None => {
            debug!("no config file found, using defaults");
            (Config::default(), Vec::new())
        }
    };

    for warning in &warnings {
        warn!("{}", warning);
    }

    let config = with_env_overrides(config)?;
    config.validate()?;
    Ok((config, warnings))
}

/// Apply environment variable overrides (DIAGMENU_* prefix)
pub fn with_env_overrides(config: Config) -> DiagResult<Config> {
    apply_overrides(config, |key| std::env::var(key).ok())
}

/// Apply overrides from `lookup`, keyed by environment variable name.
pub fn apply_overrides(
    mut config: Config,
    lookup: impl Fn(&str) -> Option<String>,
) -> DiagResult<Config> {
    // DIAGMENU_VERBOSITY
    if let Some(verbosity) = lookup("DIAGMENU_VERBOSITY") {
        config.output.verbosity = match verbosity.to_lowercase().as_str() {
            "quiet" => Verbosity::Quiet,
            "verbose" => Verbosity::Verbose,
            "debug" => Verbosity::Debug,
            _ => Verbosity::Normal,
        };
    }

    // DIAGMENU_COLOR
    if let Some(color) = lookup("DIAGMENU_COLOR") {
        config.output.color = match color.to_lowercase().as_str() {
            "always" => ColorMode::Always,
            "never" => ColorMode::Never,
            _ => ColorMode::Auto,
        };
    }

    // DIAGMENU_PCI_VENDOR_ID / DIAGMENU_PCI_DEVICE_ID (hex)
    if let Some(value) = lookup("DIAGMENU_PCI_VENDOR_ID") {
        config.pci.default_vendor_id = parse_hex_id("DIAGMENU_PCI_VENDOR_ID", &value)?;
    }
    if let Some(value) = lookup("DIAGMENU_PCI_DEVICE_ID") {
        config.pci.default_device_id = parse_hex_id("DIAGMENU_PCI_DEVICE_ID", &value)?;
    }

    // DIAGMENU_USB_STREAM_MODE
    if let Some(value) = lookup("DIAGMENU_USB_STREAM_MODE") {
        config.usb.stream_mode = value.to_lowercase() != "false" && value != "0";
    }

    Ok(config)
}

fn parse_hex_id(key: &str, value: &str) -> DiagResult<u32> {
    parse_number(value, true)
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| DiagError::InvalidConfig {
            key: key.to_string(),
            message: format!("'{}' is not a hex number", value),
        })
}

fn find_line_number(content: &str, needle: &str) -> Option<usize> {
    content
        .lines()
        .position(|line| line.contains(needle))
        .map(|i| i + 1)
}

fn suggest_key(unknown: &str) -> Option<String> {
    const CANDIDATES: &[&str] = &[
        "output",
        "verbosity",
        "color",
        "pci",
        "default_vendor_id",
        "default_device_id",
        "usb",
        "stream_mode",
        "listen_buffer_size",
        "stream_buffer_size",
        "stream_transfer_size",
        "stream_iterations",
        "simulator",
        "pci_devices",
        "usb_devices",
        "vendor_id",
        "device_id",
        "product_id",
        "express",
        "bars",
        "level_sensitive",
        "total_vfs",
        "serial",
        "ipc_processes",
        "name",
        "sub_group_id",
    ];

    CANDIDATES
        .iter()
        .map(|candidate| (candidate, levenshtein(unknown, candidate)))
        .min_by_key(|(_, dist)| *dist)
        .filter(|(_, dist)| *dist <= 2)
        .map(|(candidate, _)| candidate.to_string())
}

fn levenshtein(a: &str, b: &str) -> usize {
    if a == b {
        return 0;
    }

    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();

    let mut prev: Vec<usize> = (0..=b_bytes.len()).collect();
    let mut curr = vec![0usize; b_bytes.len() + 1];

    for (i, &ac) in a_bytes.iter().enumerate() {
        curr[0] = i + 1;
        for (j, &bc) in b_bytes.iter().enumerate() {
            let cost = usize::from(ac != bc);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        prev.clone_from_slice(&curr);
    }

    prev[b_bytes.len()]
}
