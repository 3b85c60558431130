use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrayConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub privilege: PrivilegeConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub tray: IconConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Input node name such as `event10`, or `auto` to detect a touchpad.
    #[serde(default = "default_device_id")]
    pub id: String,
    #[serde(default = "default_input_root")]
    pub input_root: PathBuf,
    #[serde(default)]
    pub inhibit_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivilegeConfig {
    #[serde(default = "default_helper")]
    pub helper: String,
    #[serde(default = "default_shell")]
    pub shell: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IconConfig {
    #[serde(default = "default_icon_enabled")]
    pub icon_enabled: String,
    #[serde(default = "default_icon_disabled")]
    pub icon_disabled: String,
    /// Replaces a state icon no installed theme provides. Empty disables.
    #[serde(default = "default_icon_fallback")]
    pub icon_fallback: String,
}

// Defaults

fn default_device_id() -> String { "event10".into() }
fn default_input_root() -> PathBuf { PathBuf::from("/sys/class/input") }
fn default_helper() -> String { "pkexec".into() }
fn default_shell() -> String { "bash".into() }
fn default_timeout_secs() -> u64 { 30 }
fn default_interval_ms() -> u64 { 2000 }
fn default_true() -> bool { true }
fn default_icon_enabled() -> String { "input-touchpad".into() }
fn default_icon_disabled() -> String { "input-touchpad-off".into() }
fn default_icon_fallback() -> String { "input-mouse".into() }

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            id: default_device_id(),
            input_root: default_input_root(),
            inhibit_path: None,
        }
    }
}

impl Default for PrivilegeConfig {
    fn default() -> Self {
        Self {
            helper: default_helper(),
            shell: default_shell(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self { interval_ms: default_interval_ms() }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for IconConfig {
    fn default() -> Self {
        Self {
            icon_enabled: default_icon_enabled(),
            icon_disabled: default_icon_disabled(),
            icon_fallback: default_icon_fallback(),
        }
    }
}

impl PrivilegeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        // A zero interval would spin the event loop
        Duration::from_millis(self.interval_ms.max(100))
    }
}

pub fn default_config_path() -> PathBuf {
    dirs_path().join("config.toml")
}

fn dirs_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
            PathBuf::from(home).join(".config")
        });
    base.join("touchpad-tray")
}

/// Read the config if present, defaults otherwise. Never writes.
pub fn read_config(path: &Path) -> Result<TrayConfig> {
    if !path.exists() {
        return Ok(TrayConfig::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    let config: TrayConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config: {}", path.display()))?;
    Ok(config)
}

/// Like `read_config`, but writes the commented default file on first run.
pub fn load_config(path: &Path) -> Result<TrayConfig> {
    if !path.exists() {
        log::info!("Config file not found at {}, generating default", path.display());
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match std::fs::write(path, DEFAULT_CONFIG) {
            Ok(()) => log::info!("Created default config at {}", path.display()),
            Err(e) => log::warn!("Failed to write default config: {}", e),
        }
        return Ok(TrayConfig::default());
    }
    read_config(path)
}

/// Persist `device.id`, keeping the rest of the file's formatting and comments.
pub fn save_device_to_config(path: &Path, id: &str) -> Result<()> {
    let content = if path.exists() {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?
    } else {
        DEFAULT_CONFIG.to_string()
    };
    let mut doc = content
        .parse::<toml_edit::DocumentMut>()
        .with_context(|| format!("Failed to parse config: {}", path.display()))?;

    if !doc.contains_key("device") {
        doc["device"] = toml_edit::Item::Table(toml_edit::Table::new());
    }
    doc["device"]["id"] = toml_edit::value(id);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, doc.to_string())
        .with_context(|| format!("Failed to write config: {}", path.display()))?;
    log::info!("Persisted device {} to {}", id, path.display());
    Ok(())
}

const DEFAULT_CONFIG: &str = r#"# touchpad-tray: toggle the touchpad from the system tray
# Configuration file, generated automatically on first run.
# Uncomment and edit values to customise. Defaults are shown.

[device]
# Input node of the touchpad (see `touchpad-tray devices`), or "auto" to detect it
id = "event10"
# Where input nodes live
input_root = "/sys/class/input"
# Explicit inhibit attribute; overrides id when set
# inhibit_path = "/sys/class/input/event10/device/inhibited"

[privilege]
# Helper that runs the write as root
helper = "pkexec"
shell = "bash"
# Seconds to wait for the password prompt before giving up
timeout_secs = 30

[refresh]
# How often the tray re-reads the touchpad state (ms)
interval_ms = 2000

[notifications]
enabled = true

[tray]
# Theme icon names
icon_enabled  = "input-touchpad"
icon_disabled = "input-touchpad-off"
# Shown in place of either icon above when no installed theme ships it ("" to disable)
icon_fallback = "input-mouse"
"#;
