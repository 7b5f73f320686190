//! Device bridge module: a common controller interface over `adb` and `hdc`.
//!
//! Every call shells out to the platform bridge with a bounded timeout. All
//! coordinates here are raw device pixels; normalization happens in
//! [`crate::actions`].

mod adb;
mod command;
mod hdc;

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tokio::sync::OnceCell;

pub use adb::{parse_devices, AdbConfig, AdbController, DeviceInfo, ADB_KEYCODES};
pub use command::CommandRunner;
pub use hdc::{HdcConfig, HdcController, HDC_KEYCODES};

/// Default per-command timeout in milliseconds.
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 30_000;

/// Default number of connectivity probes.
pub const DEFAULT_RETRY_COUNT: u32 = 3;

/// Device bridge errors.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Command `{command}` failed (exit code {code:?}): {stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("Command `{0}` timed out after {1}ms")]
    Timeout(String, u64),
    #[error("Unknown key: {0}")]
    UnknownKey(String),
    #[error("Failed to parse screen size from output: {0}")]
    ScreenSize(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unsupported platform: {0}")]
    Unsupported(String),
}

/// Device family behind a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    Harmony,
    Ios,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Android => "android",
            Platform::Harmony => "harmony",
            Platform::Ios => "ios",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "android" | "adb" => Ok(Platform::Android),
            "harmony" | "harmonyos" | "hdc" => Ok(Platform::Harmony),
            "ios" => Ok(Platform::Ios),
            other => Err(DeviceError::Unsupported(other.to_string())),
        }
    }
}

/// Screen dimensions in device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

impl ScreenSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Connection parameters shared by all controllers.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Serial / connect key of the target device. `None` uses the only attached device.
    pub device_id: Option<String>,
    /// Timeout applied to every bridge command.
    pub timeout_ms: u64,
    /// Number of connectivity probes made by `is_connected`.
    pub retry_count: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            device_id: None,
            timeout_ms: DEFAULT_COMMAND_TIMEOUT_MS,
            retry_count: DEFAULT_RETRY_COUNT,
        }
    }
}

impl ControllerConfig {
    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }
}

/// Raw device I/O implemented once per device family.
#[async_trait]
pub trait DeviceController: Send + Sync {
    /// Device family, used to pick the right app identifiers.
    fn platform(&self) -> Platform;

    fn config(&self) -> &ControllerConfig;

    /// Storage for [`DeviceController::get_cached_screen_size`].
    fn screen_size_cache(&self) -> &OnceCell<ScreenSize>;

    async fn tap(&self, x: u32, y: u32) -> Result<(), DeviceError>;

    async fn long_press(&self, x: u32, y: u32, duration_ms: u64) -> Result<(), DeviceError>;

    async fn swipe(
        &self,
        x1: u32,
        y1: u32,
        x2: u32,
        y2: u32,
        duration_ms: u64,
    ) -> Result<(), DeviceError>;

    async fn input_text(&self, text: &str) -> Result<(), DeviceError>;

    /// Press a logical key (`back`, `home`, `enter`, ...) or a raw numeric key code.
    async fn press_key(&self, key: &str) -> Result<(), DeviceError>;

    /// Capture the screen as encoded image bytes (PNG on ADB, JPEG on HDC).
    async fn screenshot(&self) -> Result<Vec<u8>, DeviceError>;

    async fn get_screen_size(&self) -> Result<ScreenSize, DeviceError>;

    /// Launch an app. `sub_id` is the activity (Android) or ability (HarmonyOS).
    async fn open_app(&self, app_id: &str, sub_id: Option<&str>) -> Result<(), DeviceError>;

    /// Connectivity check. Never fails; an unreachable device is `false`.
    async fn is_connected(&self) -> bool;

    /// Screen size, queried once and cached for the controller's lifetime.
    async fn get_cached_screen_size(&self) -> Result<ScreenSize, DeviceError> {
        self.screen_size_cache()
            .get_or_try_init(|| self.get_screen_size())
            .await
            .copied()
    }
}

/// Resolve a logical key name against a key table, falling back to a raw integer code.
pub(crate) fn resolve_key_code(table: &[(&str, u32)], key: &str) -> Result<u32, DeviceError> {
    let name = key.trim().to_lowercase();
    table
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, code)| *code)
        .or_else(|| name.parse::<u32>().ok())
        .ok_or_else(|| DeviceError::UnknownKey(key.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_from_str() {
        assert_eq!("android".parse::<Platform>().unwrap(), Platform::Android);
        assert_eq!("HDC".parse::<Platform>().unwrap(), Platform::Harmony);
        assert_eq!("ios".parse::<Platform>().unwrap(), Platform::Ios);
        assert!("symbian".parse::<Platform>().is_err());
    }

    #[test]
    fn test_controller_config_builders() {
        let config = ControllerConfig::default()
            .with_device_id("emulator-5554")
            .with_timeout_ms(500)
            .with_retry_count(1);
        assert_eq!(config.device_id.as_deref(), Some("emulator-5554"));
        assert_eq!(config.timeout_ms, 500);
        assert_eq!(config.retry_count, 1);

        let defaults = ControllerConfig::default();
        assert_eq!(defaults.timeout_ms, 30_000);
        assert_eq!(defaults.retry_count, 3);
        assert!(defaults.device_id.is_none());
    }

    #[test]
    fn test_resolve_key_code() {
        let table = [("back", 4), ("home", 3)];
        assert_eq!(resolve_key_code(&table, "back").unwrap(), 4);
        assert_eq!(resolve_key_code(&table, " HOME ").unwrap(), 3);
        assert_eq!(resolve_key_code(&table, "187").unwrap(), 187);
        assert!(matches!(
            resolve_key_code(&table, "launch_rocket"),
            Err(DeviceError::UnknownKey(_))
        ));
    }
}
