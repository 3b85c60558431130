use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use calloop::channel::Sender;
use ksni::menu::StandardItem;
use ksni::{MenuItem, ToolTip, Tray, TrayService};

use crate::config::IconConfig;
use crate::controller::{StatusSink, StatusView};
use crate::state::IconToken;

/// Requests raised from the tray thread, handled on the event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrayEvent {
    Toggle,
    Quit,
}

pub struct TouchpadTray {
    view: StatusView,
    icons: IconConfig,
    events: Sender<TrayEvent>,
}

impl TouchpadTray {
    pub fn new(icons: IconConfig, events: Sender<TrayEvent>) -> Self {
        Self { view: StatusView::checking(), icons, events }
    }

    fn send(&self, event: TrayEvent) {
        if self.events.send(event).is_err() {
            log::warn!("Event loop gone, dropping tray event {:?}", event);
        }
    }

    fn theme_icon(&self) -> String {
        match self.view.icon {
            IconToken::TouchpadOn => self.icons.icon_enabled.clone(),
            IconToken::TouchpadOff => self.icons.icon_disabled.clone(),
        }
    }
}

impl Tray for TouchpadTray {
    fn id(&self) -> String {
        "touchpad-tray".into()
    }

    fn title(&self) -> String {
        "Touchpad".into()
    }

    fn category(&self) -> ksni::Category {
        ksni::Category::Hardware
    }

    fn icon_name(&self) -> String {
        self.theme_icon()
    }

    fn tool_tip(&self) -> ToolTip {
        ToolTip {
            title: format!("Touchpad {}", self.view.status),
            description: String::new(),
            icon_name: self.theme_icon(),
            icon_pixmap: Vec::new(),
        }
    }

    // Left click
    fn activate(&mut self, _x: i32, _y: i32) {
        self.send(TrayEvent::Toggle);
    }

    fn menu(&self) -> Vec<MenuItem<Self>> {
        vec![
            StandardItem {
                label: format!("Touchpad: {}", self.view.status),
                enabled: false,
                ..Default::default()
            }
            .into(),
            MenuItem::Separator,
            StandardItem {
                label: "Toggle Touchpad".into(),
                icon_name: self.theme_icon(),
                activate: Box::new(|tray: &mut Self| tray.send(TrayEvent::Toggle)),
                ..Default::default()
            }
            .into(),
            StandardItem {
                label: "Quit".into(),
                icon_name: "application-exit".into(),
                activate: Box::new(|tray: &mut Self| tray.send(TrayEvent::Quit)),
                ..Default::default()
            }
            .into(),
        ]
    }
}

const ICON_EXTENSIONS: [&str; 3] = ["svg", "png", "xpm"];

/// Base directories searched for icon themes and pixmaps, per the XDG base dir layout.
pub fn icon_data_dirs() -> Vec<PathBuf> {
    let home = std::env::var("HOME").map(PathBuf::from).ok();
    let data_home = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .ok()
        .or_else(|| home.as_ref().map(|h| h.join(".local/share")));
    let data_dirs = std::env::var("XDG_DATA_DIRS")
        .unwrap_or_else(|_| "/usr/local/share:/usr/share".into());

    let mut dirs: Vec<PathBuf> = data_home.into_iter().collect();
    dirs.extend(data_dirs.split(':').filter(|d| !d.is_empty()).map(PathBuf::from));
    dirs
}

/// Whether any installed theme under `data_dirs` ships `name`.
/// Themes nest icons two levels deep (`<size>/<context>` or `<context>/<size>`).
pub fn icon_installed(name: &str, data_dirs: &[PathBuf]) -> bool {
    data_dirs.iter().any(|dir| {
        has_icon_file(&dir.join("pixmaps"), name) || subdirs(&dir.join("icons")).any(|theme| {
            subdirs(&theme).any(|level| subdirs(&level).any(|leaf| has_icon_file(&leaf, name)))
        })
    })
}

fn subdirs(dir: &Path) -> impl Iterator<Item = PathBuf> {
    fs::read_dir(dir)
        .into_iter()
        .flatten()
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir())
}

fn has_icon_file(dir: &Path, name: &str) -> bool {
    ICON_EXTENSIONS.iter().any(|ext| dir.join(format!("{}.{}", name, ext)).is_file())
}

/// Swap in `icon_fallback` for state icons the installed themes don't provide.
pub fn resolve_icons(icons: &IconConfig, data_dirs: &[PathBuf]) -> IconConfig {
    let mut resolved = icons.clone();
    if icons.icon_fallback.is_empty() {
        return resolved;
    }
    for name in [&mut resolved.icon_enabled, &mut resolved.icon_disabled] {
        if !icon_installed(name, data_dirs) {
            log::info!("Icon {} not found in any theme, using {}", name, icons.icon_fallback);
            *name = icons.icon_fallback.clone();
        }
    }
    resolved
}

/// Pushes refreshed status into the running tray service.
pub struct TraySink {
    handle: Mutex<ksni::Handle<TouchpadTray>>,
}

impl StatusSink for TraySink {
    fn publish(&self, view: &StatusView) {
        let handle = self.handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let view = view.clone();
        handle.update(move |tray: &mut TouchpadTray| {
            if tray.view != view {
                log::debug!("Tray status -> {}", view.status);
                tray.view = view;
            }
        });
    }
}

/// Start the StatusNotifierItem service on its own thread.
pub fn spawn(icons: IconConfig, events: Sender<TrayEvent>) -> TraySink {
    let icons = resolve_icons(&icons, &icon_data_dirs());
    let service = TrayService::new(TouchpadTray::new(icons, events));
    let handle = service.handle();
    service.spawn();
    log::info!("Tray icon registered");
    TraySink { handle: Mutex::new(handle) }
}
