//! CLI configuration management

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use usbraw::DeviceFilter;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CliConfig {
    #[serde(default)]
    pub general: GeneralSettings,
    #[serde(default)]
    pub usb: UsbSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "GeneralSettings::default_log_level")]
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}

impl GeneralSettings {
    fn default_log_level() -> String {
        "warn".to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsbSettings {
    /// Timeout for every bulk and control transfer, in milliseconds
    #[serde(default = "UsbSettings::default_timeout_ms")]
    pub timeout_ms: u64,
    /// VID:PID patterns restricting which devices are listed
    /// (e.g. "0x1ab1:*"); empty means no restriction
    #[serde(default)]
    pub filters: Vec<String>,
}

impl Default for UsbSettings {
    fn default() -> Self {
        Self {
            timeout_ms: Self::default_timeout_ms(),
            filters: Vec::new(),
        }
    }
}

impl UsbSettings {
    fn default_timeout_ms() -> u64 {
        usbraw::backend::DEFAULT_TIMEOUT.as_millis() as u64
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Parsed form of `filters`
    pub fn device_filters(&self) -> Result<Vec<DeviceFilter>> {
        self.filters
            .iter()
            .map(|pattern| {
                pattern
                    .parse::<DeviceFilter>()
                    .with_context(|| format!("Invalid filter '{}', expected VID:PID", pattern))
            })
            .collect()
    }

    /// Whether a device passes the configured filters
    pub fn allows(&self, vendor_id: u16, product_id: u16) -> Result<bool> {
        let filters = self.device_filters()?;
        Ok(filters.is_empty() || filters.iter().any(|f| f.matches_ids(vendor_id, product_id)))
    }
}

/// Levels accepted for `general.log_level`
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// System-wide fallback consulted after the per-user file
const SYSTEM_CONFIG_PATH: &str = "/etc/usbraw/config.toml";

impl CliConfig {
    /// Per-user file first, then the system-wide one
    pub fn search_paths() -> [PathBuf; 2] {
        [Self::default_path(), PathBuf::from(SYSTEM_CONFIG_PATH)]
    }

    /// Read `path`, or the first existing file of [`search_paths`](Self::search_paths)
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None => Self::search_paths()
                .into_iter()
                .find(|candidate| candidate.is_file())
                .context("No usbraw configuration file present")?,
        };

        let text = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read {}", path.display()))?;
        let config = Self::from_toml(&text).with_context(|| format!("Bad configuration in {}", path.display()))?;

        tracing::debug!("Configuration read from {}", path.display());
        Ok(config)
    }

    /// Built-in settings when no usable file exists
    pub fn load_or_default() -> Self {
        Self::load(None).unwrap_or_else(|e| {
            tracing::debug!("{:#}; falling back to built-in settings", e);
            Self::default()
        })
    }

    /// Parse and validate TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the settings to `path`, creating missing parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir).with_context(|| format!("Cannot create {}", dir.display()))?;
        }
        fs::write(path, toml::to_string_pretty(self)?)
            .with_context(|| format!("Cannot write {}", path.display()))?;

        tracing::info!("Configuration written to {}", path.display());
        Ok(())
    }

    /// `<config dir>/usbraw/config.toml`, relative to the working directory
    /// when the platform has no config dir
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("usbraw")
            .join("config.toml")
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            LOG_LEVELS.contains(&self.general.log_level.as_str()),
            "general.log_level '{}' is not one of {}",
            self.general.log_level,
            LOG_LEVELS.join(", ")
        );
        ensure!(self.usb.timeout_ms > 0, "usb.timeout_ms must be greater than zero");
        self.usb.device_filters()?;
        Ok(())
    }
}

/// Load a config file given on the command line, expanding `~`
pub fn load_config(path: &str) -> Result<CliConfig> {
    let path_buf = PathBuf::from(shellexpand::tilde(path).as_ref());
    CliConfig::load(Some(path_buf))
}
