//! Desktop-style notifications gated by the user's preference.

use std::sync::Arc;

use multiuploader_settings::SettingsStore;

/// Delivers a notification to the user.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str);
}

/// Reports whether the application window currently has focus.
pub trait FocusProbe: Send + Sync {
    fn is_focused(&self) -> bool;
}

/// For front ends without a window; treated as never focused.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoWindow;

impl FocusProbe for NoWindow {
    fn is_focused(&self) -> bool {
        false
    }
}

/// Forwards notifications only when the configured
/// [`NotificationMode`](multiuploader_settings::NotificationMode) allows it.
#[derive(Clone)]
pub struct NotificationGate {
    notifier: Arc<dyn Notifier>,
    settings: Arc<dyn SettingsStore>,
    focus: Arc<dyn FocusProbe>,
}

impl NotificationGate {
    pub fn new(
        notifier: Arc<dyn Notifier>,
        settings: Arc<dyn SettingsStore>,
        focus: Arc<dyn FocusProbe>,
    ) -> Self {
        Self {
            notifier,
            settings,
            focus,
        }
    }

    /// Sends the notification if allowed. Returns whether it was sent.
    pub fn send(&self, title: &str, body: &str) -> bool {
        let mode = self.settings.global_config().notification_mode;
        if !mode.allows(self.focus.is_focused()) {
            tracing::debug!(?mode, title, "notification suppressed");
            return false;
        }
        self.notifier.notify(title, body);
        true
    }
}
