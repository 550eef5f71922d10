//! Manager configuration management

use crate::engine::EngineSettings;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Driver attribute the keyboard link status is published on
pub const DEFAULT_STATUS_FILE: &str =
    "/sys/bus/platform/drivers/xiaomi-keyboard/soc:xiaomi_keyboard/xiaomi_keyboard_conn_status";

pub const DEFAULT_INPUT_CLASS_DIR: &str = "/sys/class/input";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManagerConfig {
    #[serde(default)]
    pub manager: ManagerSettings,
    #[serde(default)]
    pub usb: UsbSettings,
    #[serde(default)]
    pub paths: PathSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerSettings {
    #[serde(default)]
    pub service_mode: bool,
    #[serde(default = "ManagerSettings::default_log_level")]
    pub log_level: String,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            service_mode: false,
            log_level: Self::default_log_level(),
        }
    }
}

impl ManagerSettings {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

/// USB transfer tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsbSettings {
    /// Timeout of a single transfer in milliseconds
    #[serde(default = "UsbSettings::default_transfer_timeout")]
    pub transfer_timeout_ms: u64,
    /// Seconds without a keyboard before the host link is reset
    #[serde(default = "UsbSettings::default_discovery_timeout")]
    pub discovery_timeout_secs: u64,
    /// Wall-clock budget of one report drain in milliseconds
    #[serde(default = "UsbSettings::default_report_budget")]
    pub report_budget_ms: u64,
    /// Connect query sends per check
    #[serde(default = "UsbSettings::default_connect_attempts")]
    pub connect_attempts: u32,
    /// Response reads per connect query send
    #[serde(default = "UsbSettings::default_max_response_reads")]
    pub max_response_reads: u32,
}

impl Default for UsbSettings {
    fn default() -> Self {
        Self {
            transfer_timeout_ms: Self::default_transfer_timeout(),
            discovery_timeout_secs: Self::default_discovery_timeout(),
            report_budget_ms: Self::default_report_budget(),
            connect_attempts: Self::default_connect_attempts(),
            max_response_reads: Self::default_max_response_reads(),
        }
    }
}

impl UsbSettings {
    fn default_transfer_timeout() -> u64 {
        500
    }

    fn default_discovery_timeout() -> u64 {
        20
    }

    fn default_report_budget() -> u64 {
        20
    }

    fn default_connect_attempts() -> u32 {
        2
    }

    fn default_max_response_reads() -> u32 {
        64
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            transfer_timeout: Duration::from_millis(self.transfer_timeout_ms),
            discovery_timeout: Duration::from_secs(self.discovery_timeout_secs),
            report_budget: Duration::from_millis(self.report_budget_ms),
            connect_attempts: self.connect_attempts,
            max_response_reads: self.max_response_reads,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSettings {
    /// Keyboard driver status attribute (watched and written)
    #[serde(default = "PathSettings::default_status_file")]
    pub status_file: PathBuf,
    /// Root of the input device class in sysfs
    #[serde(default = "PathSettings::default_input_class_dir")]
    pub input_class_dir: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            status_file: Self::default_status_file(),
            input_class_dir: Self::default_input_class_dir(),
        }
    }
}

impl PathSettings {
    fn default_status_file() -> PathBuf {
        PathBuf::from(DEFAULT_STATUS_FILE)
    }

    fn default_input_class_dir() -> PathBuf {
        PathBuf::from(DEFAULT_INPUT_CLASS_DIR)
    }

    /// Status file with `~` expanded
    pub fn status_file(&self) -> PathBuf {
        expand_path(&self.status_file)
    }

    /// Input class directory with `~` expanded
    pub fn input_class_dir(&self) -> PathBuf {
        expand_path(&self.input_class_dir)
    }
}

impl ManagerConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            expand_path(&p)
        } else {
            // Try standard locations in order
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/kbd-manager/manager.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: ManagerConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("kbd-manager").join("manager.toml")
        } else {
            PathBuf::from(".config/kbd-manager/manager.toml")
        }
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.manager.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.manager.log_level,
                valid_levels.join(", ")
            ));
        }

        let usb = &self.usb;
        for (name, value) in [
            ("transfer_timeout_ms", usb.transfer_timeout_ms),
            ("discovery_timeout_secs", usb.discovery_timeout_secs),
            ("report_budget_ms", usb.report_budget_ms),
            ("connect_attempts", u64::from(usb.connect_attempts)),
            ("max_response_reads", u64::from(usb.max_response_reads)),
        ] {
            if value == 0 {
                return Err(anyhow!("Invalid usb.{}: must be greater than 0", name));
            }
        }

        if self.paths.status_file.as_os_str().is_empty() {
            return Err(anyhow!("paths.status_file must not be empty"));
        }

        Ok(())
    }
}

fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref())
}
