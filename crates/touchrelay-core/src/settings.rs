// Touchrelay Settings Module
// User configuration loaded from TOML

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::session::{SessionConfig, DEFAULT_INPUT_DIR, DEFAULT_POLL_TIMEOUT_MS};
use crate::transform::{Orientation, Vector2};

/// Errors that can occur when loading settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(String),

    #[error("Invalid setting value: {0}")]
    InvalidValue(String),
}

/// Logical screen the virtual touchscreen is mapped onto
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScreenSettings {
    pub width: u32,
    pub height: u32,
    /// Display rotation index, 0-3
    pub orientation: i32,
    /// Use the alternate digitizer wiring table
    pub other_touch: bool,
}

impl Default for ScreenSettings {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
            orientation: 0,
            other_touch: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionSettings {
    /// Observe panels without grabbing or re-emitting
    pub read_only: bool,
    pub input_dir: PathBuf,
    pub poll_timeout_ms: i32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            read_only: false,
            input_dir: PathBuf::from(DEFAULT_INPUT_DIR),
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
        }
    }
}

/// Settings for touchrelay
///
/// Loaded from a TOML file (default: ~/.config/touchrelay/settings.toml).
/// Every field is optional; missing sections fall back to defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub screen: ScreenSettings,
    pub session: SessionSettings,

    /// Path to the settings file (for reload)
    #[serde(skip)]
    source_path: Option<PathBuf>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load settings from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(&path)?;
        let mut settings = Self::from_toml(&content)?;
        settings.source_path = Some(path.as_ref().to_path_buf());
        Ok(settings)
    }

    /// Load settings from TOML string
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let settings: Settings =
            toml::from_str(content).map_err(|e| SettingsError::TomlParse(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Get the default settings path
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("touchrelay").join("settings.toml"))
    }

    /// Load from the default location, or defaults if there is no file
    pub fn load_default() -> Result<Self, SettingsError> {
        if let Some(path) = Self::default_path() {
            if path.exists() {
                return Self::from_file(path);
            }
        }
        Ok(Self::new())
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    /// Reload settings from the file they were loaded from
    pub fn reload(&mut self) -> Result<(), SettingsError> {
        match self.source_path.clone() {
            Some(path) => {
                *self = Self::from_file(path)?;
                Ok(())
            }
            None => Err(SettingsError::InvalidValue("No source path set".to_string())),
        }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.screen.width == 0 || self.screen.height == 0 {
            return Err(SettingsError::InvalidValue(format!(
                "screen size must be non-zero, got {}x{}",
                self.screen.width, self.screen.height
            )));
        }
        if !(0..=3).contains(&self.screen.orientation) {
            return Err(SettingsError::InvalidValue(format!(
                "orientation must be 0-3, got {}",
                self.screen.orientation
            )));
        }
        if self.session.poll_timeout_ms <= 0 {
            return Err(SettingsError::InvalidValue(format!(
                "poll_timeout_ms must be positive, got {}",
                self.session.poll_timeout_ms
            )));
        }
        Ok(())
    }

    pub fn screen_size(&self) -> Vector2 {
        Vector2::new(self.screen.width as f32, self.screen.height as f32)
    }

    pub fn orientation(&self) -> Orientation {
        Orientation::from_index(self.screen.orientation)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            input_dir: self.session.input_dir.clone(),
            poll_timeout_ms: self.session.poll_timeout_ms,
        }
    }
}

/// Default settings content for a new installation
pub fn default_settings_content() -> &'static str {
    r#"# Touchrelay Settings
# Place this file at: ~/.config/touchrelay/settings.toml

[screen]
# Logical screen size in pixels
width = 1080
height = 1920
# Display rotation: 0, 1 (90), 2 (180), 3 (270)
orientation = 0
# Panel wired with swapped axes
other_touch = false

[session]
# Observe panels without grabbing them or creating a virtual device
read_only = false
input_dir = "/dev/input"
poll_timeout_ms = 100
"#
}
