//! Android controller over the `adb` bridge.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use super::command::CommandRunner;
use super::{resolve_key_code, ControllerConfig, DeviceController, DeviceError, Platform, ScreenSize};

/// Logical key names to Android `KEYCODE_*` values.
pub const ADB_KEYCODES: &[(&str, u32)] = &[
    ("back", 4),
    ("home", 3),
    ("enter", 66),
    ("volume_up", 24),
    ("volume_down", 25),
    ("power", 26),
    ("menu", 82),
    ("tab", 61),
    ("delete", 67),
    ("space", 62),
];

static SIZE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)x(\d+)").unwrap());

/// Configuration for [`AdbController`].
#[derive(Debug, Clone)]
pub struct AdbConfig {
    pub adb_path: String,
    pub controller: ControllerConfig,
}

impl Default for AdbConfig {
    fn default() -> Self {
        Self {
            adb_path: "adb".to_string(),
            controller: ControllerConfig::default(),
        }
    }
}

impl AdbConfig {
    pub fn with_adb_path(mut self, adb_path: impl Into<String>) -> Self {
        self.adb_path = adb_path.into();
        self
    }

    pub fn with_controller(mut self, controller: ControllerConfig) -> Self {
        self.controller = controller;
        self
    }
}

/// One row of `adb devices` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub device_id: String,
    /// `device`, `offline`, `unauthorized`, ...
    pub status: String,
}

/// Parse the output of `adb devices`.
pub fn parse_devices(output: &str) -> Vec<DeviceInfo> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("List of devices") && !line.starts_with('*'))
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let device_id = parts.next()?.to_string();
            let status = parts.next()?.to_string();
            Some(DeviceInfo { device_id, status })
        })
        .collect()
}

/// Parse `wm size` output. An override size wins over the physical size since
/// input events are dispatched in the overridden coordinate space.
fn parse_wm_size(output: &str) -> Option<ScreenSize> {
    let line = output
        .lines()
        .find(|l| l.contains("Override size"))
        .or_else(|| output.lines().find(|l| SIZE_RE.is_match(l)))?;
    let caps = SIZE_RE.captures(line)?;
    let width = caps[1].parse().ok()?;
    let height = caps[2].parse().ok()?;
    Some(ScreenSize::new(width, height))
}

/// Escape text for `input text`.
pub(crate) fn escape_input_text(text: &str) -> String {
    text.replace(' ', "%s")
        .replace('\'', "\\'")
        .replace('"', "\\\"")
}

/// Android device controller.
///
/// # Example
/// ```rust,no_run
/// use mobile_agent::device::{AdbConfig, AdbController, DeviceController};
///
/// # async fn demo() -> Result<(), mobile_agent::device::DeviceError> {
/// let adb = AdbController::new(AdbConfig::default());
/// if adb.is_connected().await {
///     adb.tap(540, 1170).await?;
/// }
/// # Ok(())
/// # }
/// ```
pub struct AdbController {
    config: AdbConfig,
    runner: CommandRunner,
    screen_size: OnceCell<ScreenSize>,
}

impl AdbController {
    pub fn new(config: AdbConfig) -> Self {
        let runner = CommandRunner::new(&config.adb_path, "-s", &config.controller);
        Self {
            config,
            runner,
            screen_size: OnceCell::new(),
        }
    }

    /// Create a controller for the given device serial with default settings.
    pub fn for_device(device_id: impl Into<String>) -> Self {
        Self::new(AdbConfig::default().with_controller(ControllerConfig::default().with_device_id(device_id)))
    }

    async fn shell(&self, args: &[&str]) -> Result<String, DeviceError> {
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push("shell");
        full.extend_from_slice(args);
        self.runner.run_text(&full).await
    }

    /// List attached devices. Uses the bare bridge, ignoring the device selector.
    pub async fn list_devices(&self) -> Result<Vec<DeviceInfo>, DeviceError> {
        let bare = CommandRunner::new(
            &self.config.adb_path,
            "-s",
            &ControllerConfig {
                device_id: None,
                ..self.config.controller.clone()
            },
        );
        let output = bare.run_text(&["devices"]).await?;
        Ok(parse_devices(&output))
    }

    async fn probe_connected(&self) -> Result<bool, DeviceError> {
        let devices = self.list_devices().await?;
        let online = |d: &&DeviceInfo| d.status == "device";
        Ok(match self.config.controller.device_id.as_deref() {
            Some(id) => devices.iter().filter(online).any(|d| d.device_id == id),
            None => devices.iter().any(|d| online(&d)),
        })
    }
}

#[async_trait]
impl DeviceController for AdbController {
    fn platform(&self) -> Platform {
        Platform::Android
    }

    fn config(&self) -> &ControllerConfig {
        &self.config.controller
    }

    fn screen_size_cache(&self) -> &OnceCell<ScreenSize> {
        &self.screen_size
    }

    async fn tap(&self, x: u32, y: u32) -> Result<(), DeviceError> {
        self.shell(&["input", "tap", &x.to_string(), &y.to_string()])
            .await
            .map(|_| ())
    }

    async fn long_press(&self, x: u32, y: u32, duration_ms: u64) -> Result<(), DeviceError> {
        let (x, y) = (x.to_string(), y.to_string());
        self.shell(&["input", "swipe", &x, &y, &x, &y, &duration_ms.to_string()])
            .await
            .map(|_| ())
    }

    async fn swipe(
        &self,
        x1: u32,
        y1: u32,
        x2: u32,
        y2: u32,
        duration_ms: u64,
    ) -> Result<(), DeviceError> {
        self.shell(&[
            "input",
            "swipe",
            &x1.to_string(),
            &y1.to_string(),
            &x2.to_string(),
            &y2.to_string(),
            &duration_ms.to_string(),
        ])
        .await
        .map(|_| ())
    }

    async fn input_text(&self, text: &str) -> Result<(), DeviceError> {
        if text.is_ascii() {
            let escaped = escape_input_text(text);
            self.shell(&["input", "text", &escaped]).await?;
        } else {
            // `input text` cannot carry non-ASCII; go through the ADB Keyboard IME.
            debug!("typing non-ascii text via ADB Keyboard broadcast");
            let encoded = STANDARD.encode(text.as_bytes());
            self.shell(&["am", "broadcast", "-a", "ADB_INPUT_B64", "--es", "msg", &encoded])
                .await?;
        }
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<(), DeviceError> {
        let code = resolve_key_code(ADB_KEYCODES, key)?;
        self.shell(&["input", "keyevent", &code.to_string()])
            .await
            .map(|_| ())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DeviceError> {
        let bytes = self.runner.run(&["exec-out", "screencap", "-p"]).await?;
        if bytes.is_empty() {
            return Err(DeviceError::CommandFailed {
                command: "exec-out screencap -p".to_string(),
                code: Some(0),
                stderr: "empty screenshot".to_string(),
            });
        }
        Ok(bytes)
    }

    async fn get_screen_size(&self) -> Result<ScreenSize, DeviceError> {
        let output = self.shell(&["wm", "size"]).await?;
        parse_wm_size(&output).ok_or_else(|| DeviceError::ScreenSize(output.trim().to_string()))
    }

    async fn open_app(&self, app_id: &str, sub_id: Option<&str>) -> Result<(), DeviceError> {
        match sub_id {
            Some(activity) if !activity.is_empty() => {
                let component = format!("{}/{}", app_id, activity);
                self.shell(&["am", "start", "-n", &component]).await?;
            }
            _ => {
                self.shell(&[
                    "monkey",
                    "-p",
                    app_id,
                    "-c",
                    "android.intent.category.LAUNCHER",
                    "1",
                ])
                .await?;
            }
        }
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        let attempts = self.config.controller.retry_count.max(1);
        for attempt in 1..=attempts {
            match self.probe_connected().await {
                Ok(true) => return true,
                Ok(false) => debug!(attempt, "device not listed by adb"),
                Err(e) => warn!(attempt, error = %e, "adb connectivity probe failed"),
            }
            if attempt < attempts {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }
        false
    }
}
