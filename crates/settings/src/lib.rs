//! Application settings.
//!
//! Settings are stored as TOML:
//! - Linux: `~/.config/multiuploader/settings.toml`
//! - Windows: `%APPDATA%/multiuploader/settings.toml`

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("settings I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid settings file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Colour scheme preference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Auto,
    Light,
    Dark,
}

/// When upload notifications are shown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationMode {
    Disabled,
    /// Only while the application window does not have focus.
    #[default]
    Unfocused,
    Always,
}

impl NotificationMode {
    /// Whether a notification should be shown given the current focus state.
    pub fn allows(self, focused: bool) -> bool {
        match self {
            Self::Disabled => false,
            Self::Unfocused => !focused,
            Self::Always => true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    pub theme: Theme,
    pub notification_mode: NotificationMode,
}

/// Per-provider settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub enabled: bool,
    pub api_key: String,
}

/// Read access to settings, as needed by the upload stack.
pub trait SettingsStore: Send + Sync {
    /// Stored API key for `provider`, empty if none.
    fn provider_api_key(&self, provider: &str) -> String;

    fn is_provider_enabled(&self, provider: &str) -> bool;

    fn global_config(&self) -> GlobalConfig;
}

/// Complete settings document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub global: GlobalConfig,

    /// Provider settings keyed by provider display name.
    pub providers: BTreeMap<String, ProviderSettings>,
}

impl Settings {
    /// Loads settings from `path`, falling back to defaults if the file does
    /// not exist.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Loads settings from the platform default location.
    pub fn load_default() -> Result<Self, SettingsError> {
        Self::load(&settings_path())
    }

    /// Writes settings to `path`, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        // Contains API keys.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "settings saved");
        Ok(())
    }

    pub fn save_default(&self) -> Result<(), SettingsError> {
        self.save(&settings_path())
    }

    /// Settings for `provider`, or defaults (disabled, no key).
    pub fn provider(&self, provider: &str) -> ProviderSettings {
        self.providers.get(provider).cloned().unwrap_or_default()
    }

    pub fn set_provider(&mut self, provider: &str, settings: ProviderSettings) {
        self.providers.insert(provider.to_string(), settings);
    }

    pub fn set_global(&mut self, global: GlobalConfig) {
        self.global = global;
    }
}

impl SettingsStore for Settings {
    fn provider_api_key(&self, provider: &str) -> String {
        self.providers
            .get(provider)
            .map(|p| p.api_key.clone())
            .unwrap_or_default()
    }

    fn is_provider_enabled(&self, provider: &str) -> bool {
        self.providers.get(provider).is_some_and(|p| p.enabled)
    }

    fn global_config(&self) -> GlobalConfig {
        self.global
    }
}

/// Returns the platform-specific settings file path.
pub fn settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata)
            .join("multiuploader")
            .join("settings.toml")
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".config")
            .join("multiuploader")
            .join("settings.toml")
    }
}
