//! HarmonyOS controller over the `hdc` bridge.
//!
//! UI input goes through `uitest uiInput`. `snapshot_display` only writes JPEG
//! files on the device, so screenshots are captured remotely and pulled with
//! `file recv` into a local temporary file.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, warn};
use uuid::Uuid;

use super::command::CommandRunner;
use super::{resolve_key_code, ControllerConfig, DeviceController, DeviceError, Platform, ScreenSize};

/// Logical key names to HarmonyOS key codes.
pub const HDC_KEYCODES: &[(&str, u32)] = &[
    ("back", 2),
    ("home", 1),
    ("enter", 66),
    ("volume_up", 16),
    ("volume_down", 17),
    ("power", 18),
    ("menu", 82),
    ("tab", 61),
    ("delete", 67),
    ("space", 62),
];

const REMOTE_SCREENSHOT_DIR: &str = "/data/local/tmp";

static RESOLUTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:physical|render)\s+resolution[=:]\s*(\d+)x(\d+)").unwrap()
});
static WIDTH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)width[:\s]+(\d+)").unwrap());
static HEIGHT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)height[:\s]+(\d+)").unwrap());
static BUNDLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"bundle name \[([^\]]+)\]").unwrap());

/// Configuration for [`HdcController`].
#[derive(Debug, Clone)]
pub struct HdcConfig {
    pub hdc_path: String,
    pub controller: ControllerConfig,
}

impl Default for HdcConfig {
    fn default() -> Self {
        Self {
            hdc_path: "hdc".to_string(),
            controller: ControllerConfig::default(),
        }
    }
}

impl HdcConfig {
    pub fn with_hdc_path(mut self, hdc_path: impl Into<String>) -> Self {
        self.hdc_path = hdc_path.into();
        self
    }

    pub fn with_controller(mut self, controller: ControllerConfig) -> Self {
        self.controller = controller;
        self
    }
}

/// `uitest` swipes take a speed in px/s rather than a duration.
/// 300ms maps to the tool's default of 600.
pub(crate) fn swipe_speed(duration_ms: u64) -> u64 {
    (600 * 300 / duration_ms.max(1)).clamp(200, 40_000)
}

/// Parse `hidumper -s RenderService -a screen` output.
fn parse_screen_info(output: &str) -> Option<ScreenSize> {
    if let Some(caps) = RESOLUTION_RE.captures(output) {
        return Some(ScreenSize::new(caps[1].parse().ok()?, caps[2].parse().ok()?));
    }
    let width = WIDTH_RE.captures(output)?[1].parse().ok()?;
    let height = HEIGHT_RE.captures(output)?[1].parse().ok()?;
    Some(ScreenSize::new(width, height))
}

fn parse_current_bundle(output: &str) -> Option<String> {
    BUNDLE_RE.captures(output).map(|caps| caps[1].to_string())
}

/// HarmonyOS device controller.
pub struct HdcController {
    config: HdcConfig,
    runner: CommandRunner,
    screen_size: OnceCell<ScreenSize>,
}

impl HdcController {
    pub fn new(config: HdcConfig) -> Self {
        let runner = CommandRunner::new(&config.hdc_path, "-t", &config.controller);
        Self {
            config,
            runner,
            screen_size: OnceCell::new(),
        }
    }

    async fn shell(&self, args: &[&str]) -> Result<String, DeviceError> {
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push("shell");
        full.extend_from_slice(args);
        self.runner.run_text(&full).await
    }

    async fn ui_input(&self, args: &[&str]) -> Result<(), DeviceError> {
        let mut full = vec!["uitest", "uiInput"];
        full.extend_from_slice(args);
        self.shell(&full).await.map(|_| ())
    }

    /// Bundle name of the foreground ability, or `None` when it cannot be determined.
    pub async fn get_current_app(&self) -> Result<Option<String>, DeviceError> {
        let output = self.shell(&["aa", "dump", "-a"]).await?;
        Ok(parse_current_bundle(&output))
    }

    pub async fn go_back(&self) -> Result<(), DeviceError> {
        self.press_key("back").await
    }

    pub async fn go_home(&self) -> Result<(), DeviceError> {
        self.press_key("home").await
    }

    async fn probe_connected(&self) -> Result<bool, DeviceError> {
        let bare = CommandRunner::new(
            &self.config.hdc_path,
            "-t",
            &ControllerConfig {
                device_id: None,
                ..self.config.controller.clone()
            },
        );
        let output = bare.run_text(&["list", "targets"]).await?;
        Ok(match self.config.controller.device_id.as_deref() {
            Some(id) => output.contains(id),
            None => output.lines().any(|l| !l.trim().is_empty()) && !output.contains("[Empty]"),
        })
    }
}

#[async_trait]
impl DeviceController for HdcController {
    fn platform(&self) -> Platform {
        Platform::Harmony
    }

    fn config(&self) -> &ControllerConfig {
        &self.config.controller
    }

    fn screen_size_cache(&self) -> &OnceCell<ScreenSize> {
        &self.screen_size
    }

    async fn tap(&self, x: u32, y: u32) -> Result<(), DeviceError> {
        self.ui_input(&["click", &x.to_string(), &y.to_string()]).await
    }

    async fn long_press(&self, x: u32, y: u32, duration_ms: u64) -> Result<(), DeviceError> {
        self.ui_input(&[
            "longClick",
            &x.to_string(),
            &y.to_string(),
            &duration_ms.to_string(),
        ])
        .await
    }

    async fn swipe(
        &self,
        x1: u32,
        y1: u32,
        x2: u32,
        y2: u32,
        duration_ms: u64,
    ) -> Result<(), DeviceError> {
        self.ui_input(&[
            "swipe",
            &x1.to_string(),
            &y1.to_string(),
            &x2.to_string(),
            &y2.to_string(),
            &swipe_speed(duration_ms).to_string(),
        ])
        .await
    }

    async fn input_text(&self, text: &str) -> Result<(), DeviceError> {
        self.ui_input(&["inputText", text]).await
    }

    async fn press_key(&self, key: &str) -> Result<(), DeviceError> {
        let code = resolve_key_code(HDC_KEYCODES, key)?;
        self.ui_input(&["keyEvent", &code.to_string()]).await
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DeviceError> {
        let remote = format!("{}/screenshot_{}.jpeg", REMOTE_SCREENSHOT_DIR, Uuid::new_v4().simple());
        self.shell(&["snapshot_display", "-f", &remote]).await?;

        let local = tempfile::Builder::new()
            .prefix("hdc_screenshot_")
            .suffix(".jpeg")
            .tempfile()?;
        let local_path = local.path().to_string_lossy().into_owned();

        let pulled = self.runner.run(&["file", "recv", &remote, &local_path]).await;
        let bytes = match pulled {
            Ok(_) => tokio::fs::read(local.path()).await.map_err(DeviceError::from),
            Err(e) => Err(e),
        };

        if let Err(e) = self.shell(&["rm", "-f", &remote]).await {
            debug!(error = %e, remote = %remote, "failed to remove remote screenshot");
        }

        let bytes = bytes?;
        if bytes.is_empty() {
            return Err(DeviceError::CommandFailed {
                command: format!("file recv {}", remote),
                code: Some(0),
                stderr: "empty screenshot".to_string(),
            });
        }
        Ok(bytes)
    }

    async fn get_screen_size(&self) -> Result<ScreenSize, DeviceError> {
        let output = self
            .shell(&["hidumper", "-s", "RenderService", "-a", "screen"])
            .await?;
        parse_screen_info(&output).ok_or_else(|| DeviceError::ScreenSize(output.trim().to_string()))
    }

    /// `sub_id` is either an ability name or `module/ability`.
    async fn open_app(&self, app_id: &str, sub_id: Option<&str>) -> Result<(), DeviceError> {
        let mut args = vec!["aa", "start", "-b", app_id];
        if let Some(target) = sub_id.filter(|s| !s.is_empty()) {
            match target.split_once('/') {
                Some((module, ability)) => args.extend_from_slice(&["-m", module, "-a", ability]),
                None => args.extend_from_slice(&["-a", target]),
            }
        }
        self.shell(&args).await.map(|_| ())
    }

    async fn is_connected(&self) -> bool {
        let attempts = self.config.controller.retry_count.max(1);
        for attempt in 1..=attempts {
            match self.probe_connected().await {
                Ok(true) => return true,
                Ok(false) => debug!(attempt, "device not listed by hdc"),
                Err(e) => warn!(attempt, error = %e, "hdc connectivity probe failed"),
            }
            if attempt < attempts {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swipe_speed() {
        assert_eq!(swipe_speed(300), 600);
        assert_eq!(swipe_speed(0), 40_000);
        assert_eq!(swipe_speed(1), 40_000);
        assert_eq!(swipe_speed(100), 1800);
        assert_eq!(swipe_speed(5000), 200);
    }

    #[test]
    fn test_parse_screen_info_resolution() {
        let output = "screen[0]: id=0, powerstatus=POWER_STATUS_ON\n  physical resolution=1260x2844\n";
        assert_eq!(parse_screen_info(output), Some(ScreenSize::new(1260, 2844)));
        let output = "Render Resolution: 1080x2400";
        assert_eq!(parse_screen_info(output), Some(ScreenSize::new(1080, 2400)));
    }

    #[test]
    fn test_parse_screen_info_width_height() {
        let output = "width: 1080, height: 2400";
        assert_eq!(parse_screen_info(output), Some(ScreenSize::new(1080, 2400)));
        assert_eq!(parse_screen_info("no screen here"), None);
    }

    #[test]
    fn test_parse_current_bundle() {
        let output = "  AbilityRecord ID #12\n    app name [com.huawei.hmos.photos]\n    bundle name [com.huawei.hmos.photos]\n";
        assert_eq!(
            parse_current_bundle(output).as_deref(),
            Some("com.huawei.hmos.photos")
        );
        assert_eq!(parse_current_bundle(""), None);
    }

    #[test]
    fn test_keycodes() {
        assert_eq!(resolve_key_code(HDC_KEYCODES, "back").unwrap(), 2);
        assert_eq!(resolve_key_code(HDC_KEYCODES, "home").unwrap(), 1);
        assert_eq!(resolve_key_code(HDC_KEYCODES, "power").unwrap(), 18);
        assert_eq!(resolve_key_code(HDC_KEYCODES, "2054").unwrap(), 2054);
    }

    #[cfg(unix)]
    mod bridge {
        use super::*;
        use crate::testing::fake_bridge;

        const SCRIPT: &str = r#"
case "$*" in
  "list targets") echo "FMR0223C13000649" ;;
  *"hidumper"*) echo "physical resolution=1260x2844" ;;
  *"aa dump -a"*) echo "bundle name [com.example.notes]" ;;
  *"file recv"*) for last; do :; done; printf 'JPEGDATA' > "$last" ;;
esac
"#;

        fn controller(script: &std::path::Path, device: &str) -> HdcController {
            HdcController::new(
                HdcConfig::default()
                    .with_hdc_path(script.to_string_lossy())
                    .with_controller(
                        ControllerConfig::default()
                            .with_device_id(device)
                            .with_retry_count(1),
                    ),
            )
        }

        #[tokio::test]
        async fn test_input_commands() {
            let dir = tempfile::tempdir().unwrap();
            let bridge = fake_bridge(dir.path(), SCRIPT);
            let hdc = controller(&bridge.script, "FMR0223C13000649");

            hdc.tap(100, 200).await.unwrap();
            hdc.swipe(1, 2, 3, 4, 300).await.unwrap();
            hdc.go_back().await.unwrap();
            hdc.open_app("com.huawei.hmos.photos", Some("entry/MainAbility"))
                .await
                .unwrap();

            let calls = bridge.calls();
            assert_eq!(calls[0], "-t FMR0223C13000649 shell uitest uiInput click 100 200");
            assert_eq!(calls[1], "-t FMR0223C13000649 shell uitest uiInput swipe 1 2 3 4 600");
            assert_eq!(calls[2], "-t FMR0223C13000649 shell uitest uiInput keyEvent 2");
            assert_eq!(
                calls[3],
                "-t FMR0223C13000649 shell aa start -b com.huawei.hmos.photos -m entry -a MainAbility"
            );
        }

        #[tokio::test]
        async fn test_screenshot_pulls_and_cleans_up() {
            let dir = tempfile::tempdir().unwrap();
            let bridge = fake_bridge(dir.path(), SCRIPT);
            let hdc = controller(&bridge.script, "FMR0223C13000649");

            let bytes = hdc.screenshot().await.unwrap();
            assert_eq!(bytes, b"JPEGDATA");

            let calls = bridge.calls();
            assert!(calls[0].contains("shell snapshot_display -f /data/local/tmp/screenshot_"));
            assert!(calls[1].contains("file recv /data/local/tmp/screenshot_"));
            assert!(calls[2].contains("shell rm -f /data/local/tmp/screenshot_"));
        }

        #[tokio::test]
        async fn test_screen_size_and_current_app() {
            let dir = tempfile::tempdir().unwrap();
            let bridge = fake_bridge(dir.path(), SCRIPT);
            let hdc = controller(&bridge.script, "FMR0223C13000649");

            assert_eq!(
                hdc.get_screen_size().await.unwrap(),
                ScreenSize::new(1260, 2844)
            );
            assert_eq!(
                hdc.get_current_app().await.unwrap().as_deref(),
                Some("com.example.notes")
            );
        }

        #[tokio::test]
        async fn test_is_connected() {
            let dir = tempfile::tempdir().unwrap();
            let bridge = fake_bridge(dir.path(), SCRIPT);
            assert!(controller(&bridge.script, "FMR0223C13000649").is_connected().await);
            assert!(!controller(&bridge.script, "OTHER").is_connected().await);
        }
    }
}
