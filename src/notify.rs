use notify_rust::Notification;

/// Fire-and-forget user notifications. Implementations never fail to the caller.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str);
}

/// Desktop notifications over the freedesktop notification service.
#[derive(Debug, Clone)]
pub struct DesktopNotifier {
    icon: String,
}

impl DesktopNotifier {
    pub fn new(icon: impl Into<String>) -> Self {
        Self { icon: icon.into() }
    }
}

impl Notifier for DesktopNotifier {
    fn notify(&self, title: &str, body: &str) {
        let result = Notification::new()
            .appname("touchpad-tray")
            .summary(title)
            .body(body)
            .icon(&self.icon)
            .show();
        if let Err(e) = result {
            log::warn!("Failed to show notification '{}: {}': {}", title, body, e);
        }
    }
}

/// Used when notifications are turned off; outcomes still reach the log.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, body: &str) {
        log::info!("{}: {}", title, body);
    }
}
