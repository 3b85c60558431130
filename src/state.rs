use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Enablement of the touchpad as reported by the kernel inhibit switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Enabled,
    Disabled,
}

/// Icon selector handed to the tray; mapped to theme icon names by config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IconToken {
    TouchpadOn,
    TouchpadOff,
}

impl DeviceState {
    pub fn toggled(&self) -> Self {
        match self {
            DeviceState::Enabled => DeviceState::Disabled,
            DeviceState::Disabled => DeviceState::Enabled,
        }
    }

    /// Value written to `inhibited` to reach this state.
    pub fn inhibit_value(&self) -> &'static str {
        match self {
            DeviceState::Enabled => "0",
            DeviceState::Disabled => "1",
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, DeviceState::Enabled)
    }

    pub fn label(&self) -> &'static str {
        match self {
            DeviceState::Enabled => "Enabled",
            DeviceState::Disabled => "Disabled",
        }
    }

    pub fn status_text(&self) -> &'static str {
        match self {
            DeviceState::Enabled => "Enabled ✓",
            DeviceState::Disabled => "Disabled ✗",
        }
    }

    pub fn icon(&self) -> IconToken {
        match self {
            DeviceState::Enabled => IconToken::TouchpadOn,
            DeviceState::Disabled => IconToken::TouchpadOff,
        }
    }
}

impl IconToken {
    pub fn as_str(&self) -> &'static str {
        match self {
            IconToken::TouchpadOn => "touchpad-on",
            IconToken::TouchpadOff => "touchpad-off",
        }
    }
}

/// Parse the content of an `inhibited` attribute. Only an exact `0` means enabled.
pub fn parse_inhibited(content: &str) -> DeviceState {
    if content.trim() == "0" {
        DeviceState::Enabled
    } else {
        DeviceState::Disabled
    }
}

/// Reads the touchpad state from its sysfs `inhibited` attribute.
#[derive(Debug, Clone)]
pub struct StateReader {
    path: PathBuf,
}

impl StateReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn try_read(&self) -> io::Result<DeviceState> {
        let content = fs::read_to_string(&self.path)?;
        Ok(parse_inhibited(&content))
    }

    /// Current state, re-read from sysfs on every call.
    ///
    /// Fails open: if the attribute can't be read the touchpad is reported as
    /// `Enabled`, so an unreadable switch never shows up as a disabled device.
    pub fn read(&self) -> DeviceState {
        match self.try_read() {
            Ok(state) => state,
            Err(e) => {
                log::debug!("Failed to read {}: {}", self.path.display(), e);
                DeviceState::Enabled
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn reader_with(content: &str) -> (tempfile::TempDir, StateReader) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inhibited");
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        (dir, StateReader::new(path))
    }

    #[test]
    fn only_trimmed_zero_is_enabled() {
        for content in ["0", "0\n", "  0  ", "\t0\r\n"] {
            let (_dir, reader) = reader_with(content);
            assert_eq!(reader.read(), DeviceState::Enabled, "content {:?}", content);
        }
        for content in ["", "\n", "1", "1\n", "00", "abc", "0 1", "-0"] {
            let (_dir, reader) = reader_with(content);
            assert_eq!(reader.read(), DeviceState::Disabled, "content {:?}", content);
        }
    }

    #[test]
    fn missing_file_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let reader = StateReader::new(dir.path().join("event99/device/inhibited"));
        assert!(reader.try_read().is_err());
        assert_eq!(reader.read(), DeviceState::Enabled);
    }

    #[test]
    fn directory_instead_of_file_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let reader = StateReader::new(dir.path());
        assert_eq!(reader.read(), DeviceState::Enabled);
    }

    #[test]
    fn reads_are_never_cached() {
        let (dir, reader) = reader_with("0\n");
        assert_eq!(reader.read(), DeviceState::Enabled);
        fs::write(dir.path().join("inhibited"), "1\n").unwrap();
        assert_eq!(reader.read(), DeviceState::Disabled);
    }

    #[test]
    fn toggled_state_writes_the_complement() {
        assert_eq!(DeviceState::Enabled.toggled().inhibit_value(), "1");
        assert_eq!(DeviceState::Disabled.toggled().inhibit_value(), "0");
        assert_eq!(DeviceState::Enabled.icon().as_str(), "touchpad-on");
        assert_eq!(DeviceState::Disabled.icon().as_str(), "touchpad-off");
    }
}
