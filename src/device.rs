use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::DeviceConfig;
use crate::state::{DeviceState, StateReader};

pub const AUTO: &str = "auto";

#[derive(Debug, Clone)]
pub struct InputDevice {
    pub id: String,
    pub name: String,
    /// `None` when the device has no inhibit switch.
    pub state: Option<DeviceState>,
}

impl InputDevice {
    pub fn looks_like_touchpad(&self) -> bool {
        let name = self.name.to_lowercase();
        name.contains("touchpad") || name.contains("trackpad")
    }
}

pub fn inhibit_path(input_root: &Path, id: &str) -> PathBuf {
    input_root.join(id).join("device").join("inhibited")
}

/// Turn the device section of the config into the inhibit attribute to drive.
pub fn resolve(cfg: &DeviceConfig) -> Result<PathBuf> {
    if let Some(path) = &cfg.inhibit_path {
        return Ok(path.clone());
    }
    if cfg.id != AUTO {
        return Ok(inhibit_path(&cfg.input_root, &cfg.id));
    }

    let found = list_devices(&cfg.input_root)?
        .into_iter()
        .find(|d| d.looks_like_touchpad() && d.state.is_some())
        .with_context(|| format!("No touchpad with an inhibit switch found under {}", cfg.input_root.display()))?;
    log::info!("Detected touchpad {} ({})", found.id, found.name);
    Ok(inhibit_path(&cfg.input_root, &found.id))
}

/// All `event*` nodes under `input_root`, ordered by event number.
pub fn list_devices(input_root: &Path) -> Result<Vec<InputDevice>> {
    let entries = fs::read_dir(input_root)
        .with_context(|| format!("Failed to list {}", input_root.display()))?;

    let mut devices = Vec::new();
    for entry in entries.flatten() {
        let id = entry.file_name().to_string_lossy().into_owned();
        if event_number(&id).is_none() {
            continue;
        }

        let dir = entry.path().join("device");
        let name = fs::read_to_string(dir.join("name"))
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        let state = StateReader::new(dir.join("inhibited")).try_read().ok();

        devices.push(InputDevice { id, name, state });
    }

    devices.sort_by_key(|d| event_number(&d.id));
    Ok(devices)
}

fn event_number(id: &str) -> Option<u32> {
    id.strip_prefix("event")?.parse().ok()
}
