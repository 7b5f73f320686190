//! Device action facade: the fixed catalogue of atomic actions an agent can take.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use image::ImageFormat;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::coordinates::normalize_point;
use crate::config::AppMapper;
use crate::device::{DeviceController, DeviceError, ScreenSize};
use crate::interaction::{InputType, InteractionHandler, NoOpInteractionHandler};
use crate::model::ImageData;

/// Default settle time after a UI-changing action.
pub const DEFAULT_TOOL_DELAY_MS: u64 = 400;

/// Bounds applied to the `wait` action.
pub const MIN_WAIT_MS: u64 = 200;
pub const MAX_WAIT_MS: u64 = 10_000;

/// Upper bound on repeated taps in one `click`.
pub const MAX_CLICKS: u32 = 10;

const CLICK_INTERVAL_MS: u64 = 100;
const FOCUS_SETTLE_MS: u64 = 200;
const DEFAULT_LONG_PRESS_MS: u64 = 1000;
const DEFAULT_SWIPE_MS: u64 = 300;
const DEFAULT_WAIT_MS: u64 = 1000;

/// Facade errors. Anything else is reported as a failed [`ActionResult`].
#[derive(Error, Debug)]
pub enum ActionError {
    #[error("No controller configured")]
    NoController,
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Structured outcome of one action.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ActionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Action-specific fields (coordinates, values, image data, ...).
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl ActionResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_data(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// A captured screen with its dimensions.
#[derive(Debug, Clone)]
pub struct Screenshot {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// `png` or `jpeg`, sniffed from the bytes.
    pub format: &'static str,
}

impl Screenshot {
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.data)
    }

    pub fn to_image_data(&self) -> ImageData {
        ImageData {
            base64: self.to_base64(),
            mime_type: format!("image/{}", self.format),
        }
    }
}

fn sniff_format(data: &[u8]) -> &'static str {
    match image::guess_format(data) {
        Ok(ImageFormat::Jpeg) => "jpeg",
        Ok(ImageFormat::WebP) => "webp",
        _ => "png",
    }
}

/// One entry of the action catalogue.
#[derive(Debug, Clone, Copy)]
pub struct ActionSpec {
    pub name: &'static str,
    pub parameters: &'static str,
    pub description: &'static str,
}

/// Every action [`DeviceActions::call`] understands.
pub const ACTION_CATALOGUE: &[ActionSpec] = &[
    ActionSpec {
        name: "click",
        parameters: "x, y, count?",
        description: "Tap a screen position",
    },
    ActionSpec {
        name: "long_press",
        parameters: "x, y, duration_ms?",
        description: "Press and hold a screen position",
    },
    ActionSpec {
        name: "input_text",
        parameters: "text, press_enter?, x?, y?",
        description: "Type text, optionally tapping a field first",
    },
    ActionSpec {
        name: "scroll",
        parameters: "x1, y1, x2, y2, duration_ms?",
        description: "Swipe from the start point to the end point",
    },
    ActionSpec {
        name: "wait",
        parameters: "duration_ms",
        description: "Wait for content to load (200-10000 ms)",
    },
    ActionSpec {
        name: "open_app",
        parameters: "app_name",
        description: "Launch an app by name, alias or package id",
    },
    ActionSpec {
        name: "screenshot",
        parameters: "",
        description: "Capture the current screen",
    },
    ActionSpec {
        name: "press_key",
        parameters: "key",
        description: "Press back, home, enter, volume_up, volume_down, power, menu, tab, delete or space",
    },
    ActionSpec {
        name: "human_interact",
        parameters: "prompt",
        description: "Ask the human operator for help (login, captcha, payment confirmation)",
    },
    ActionSpec {
        name: "variable_storage",
        parameters: "action (read|write|list|delete), key?, value?",
        description: "Read or write values shared between sub-tasks",
    },
    ActionSpec {
        name: "check_connection",
        parameters: "",
        description: "Check that the device is reachable",
    },
];

/// Render catalogue lines (`- name(params): description`) for the named actions.
pub fn describe_actions(names: &[&str]) -> String {
    ACTION_CATALOGUE
        .iter()
        .filter(|spec| names.contains(&spec.name))
        .map(|spec| format!("- {}({}): {}", spec.name, spec.parameters, spec.description))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Wraps a controller, an interaction handler and the variable store behind the
/// action catalogue.
pub struct DeviceActions {
    controller: Option<Arc<dyn DeviceController>>,
    interaction: Arc<dyn InteractionHandler>,
    app_mapper: Arc<AppMapper>,
    tool_delay: Duration,
    variables: Mutex<BTreeMap<String, String>>,
}

impl Default for DeviceActions {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceActions {
    /// A facade without a controller, using the bundled app map.
    pub fn new() -> Self {
        let app_mapper = AppMapper::bundled().unwrap_or_else(|e| {
            warn!(error = %e, "Bundled app map is invalid, app names will be used literally");
            AppMapper::default()
        });
        Self {
            controller: None,
            interaction: Arc::new(NoOpInteractionHandler::new()),
            app_mapper: Arc::new(app_mapper),
            tool_delay: Duration::from_millis(DEFAULT_TOOL_DELAY_MS),
            variables: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn with_controller(mut self, controller: Arc<dyn DeviceController>) -> Self {
        self.controller = Some(controller);
        self
    }

    pub fn with_interaction_handler(mut self, handler: Arc<dyn InteractionHandler>) -> Self {
        self.interaction = handler;
        self
    }

    pub fn with_app_mapper(mut self, mapper: Arc<AppMapper>) -> Self {
        self.app_mapper = mapper;
        self
    }

    pub fn with_tool_delay_ms(mut self, delay_ms: u64) -> Self {
        self.tool_delay = Duration::from_millis(delay_ms);
        self
    }

    pub fn has_controller(&self) -> bool {
        self.controller.is_some()
    }

    pub fn app_mapper(&self) -> &AppMapper {
        &self.app_mapper
    }

    pub fn catalogue(&self) -> &'static [ActionSpec] {
        ACTION_CATALOGUE
    }

    /// Snapshot of the variable store.
    pub fn variables(&self) -> BTreeMap<String, String> {
        self.store().clone()
    }

    pub fn set_variable(&self, key: impl Into<String>, value: impl Into<String>) {
        self.store().insert(key.into(), value.into());
    }

    fn store(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.variables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn controller(&self) -> Result<&Arc<dyn DeviceController>, ActionError> {
        self.controller.as_ref().ok_or(ActionError::NoController)
    }

    async fn screen_size(&self) -> Result<ScreenSize, ActionError> {
        Ok(self.controller()?.get_cached_screen_size().await?)
    }

    async fn to_pixels(&self, x: f64, y: f64) -> Result<(u32, u32), ActionError> {
        let size = self.screen_size().await?;
        Ok(normalize_point(x, y, size.width, size.height))
    }

    async fn settle(&self) {
        if !self.tool_delay.is_zero() {
            tokio::time::sleep(self.tool_delay).await;
        }
    }

    /// Tap `(x, y)` `count` times, 100 ms apart. `count` is clamped to 1..=10.
    pub async fn click(&self, x: f64, y: f64, count: u32) -> Result<ActionResult, ActionError> {
        let controller = self.controller()?;
        let (px, py) = self.to_pixels(x, y).await?;
        let count = count.clamp(1, MAX_CLICKS);
        debug!(x = px, y = py, count, "click");

        for i in 0..count {
            controller.tap(px, py).await?;
            if i + 1 < count {
                tokio::time::sleep(Duration::from_millis(CLICK_INTERVAL_MS)).await;
            }
        }
        self.settle().await;

        Ok(
            ActionResult::success(format!("click executed at ({px}, {py}) count={count}"))
                .with_data("x", px)
                .with_data("y", py)
                .with_data("count", count),
        )
    }

    pub async fn long_press(
        &self,
        x: f64,
        y: f64,
        duration_ms: u64,
    ) -> Result<ActionResult, ActionError> {
        let controller = self.controller()?;
        let (px, py) = self.to_pixels(x, y).await?;
        debug!(x = px, y = py, duration_ms, "long_press");

        controller.long_press(px, py, duration_ms).await?;
        self.settle().await;

        Ok(ActionResult::success(format!(
            "long_press executed at ({px}, {py}) duration={duration_ms}ms"
        ))
        .with_data("x", px)
        .with_data("y", py)
        .with_data("duration_ms", duration_ms))
    }

    /// Type `text`. When `focus` is given the field is tapped first.
    pub async fn input_text(
        &self,
        text: &str,
        press_enter: bool,
        focus: Option<(f64, f64)>,
    ) -> Result<ActionResult, ActionError> {
        let controller = self.controller()?;
        if let Some((x, y)) = focus {
            let (px, py) = self.to_pixels(x, y).await?;
            controller.tap(px, py).await?;
            tokio::time::sleep(Duration::from_millis(FOCUS_SETTLE_MS)).await;
        }
        debug!(chars = text.chars().count(), press_enter, "input_text");

        controller.input_text(text).await?;
        if press_enter {
            controller.press_key("enter").await?;
        }
        self.settle().await;

        Ok(
            ActionResult::success(format!("input executed text='{text}' enter={press_enter}"))
                .with_data("text", text)
                .with_data("press_enter", press_enter),
        )
    }

    pub async fn scroll(
        &self,
        from: (f64, f64),
        to: (f64, f64),
        duration_ms: u64,
    ) -> Result<ActionResult, ActionError> {
        let controller = self.controller()?;
        let (sx, sy) = self.to_pixels(from.0, from.1).await?;
        let (ex, ey) = self.to_pixels(to.0, to.1).await?;
        debug!(sx, sy, ex, ey, duration_ms, "scroll");

        controller.swipe(sx, sy, ex, ey, duration_ms).await?;
        self.settle().await;

        Ok(
            ActionResult::success(format!("scroll executed from ({sx},{sy}) to ({ex},{ey})"))
                .with_data("from", json!({ "x": sx, "y": sy }))
                .with_data("to", json!({ "x": ex, "y": ey })),
        )
    }

    /// Sleep for `duration_ms`, clamped to 200..=10000.
    pub async fn wait(&self, duration_ms: u64) -> Result<ActionResult, ActionError> {
        let duration_ms = duration_ms.clamp(MIN_WAIT_MS, MAX_WAIT_MS);
        tokio::time::sleep(Duration::from_millis(duration_ms)).await;
        Ok(
            ActionResult::success(format!("wait executed for {duration_ms} ms"))
                .with_data("duration_ms", duration_ms),
        )
    }

    /// Launch an app by name or alias, or by a literal package/bundle id.
    pub async fn open_app(&self, app_name: &str) -> Result<ActionResult, ActionError> {
        let controller = self.controller()?;
        let platform = controller.platform();

        let (package, sub_id) = match self.app_mapper.resolve(app_name, Some(platform)) {
            Some((_, config)) => config.launch_target(),
            None => {
                debug!(app_name, %platform, "App not in map, using name as package id");
                (app_name.to_string(), None)
            }
        };
        info!(app_name, package = %package, sub_id = ?sub_id, "open_app");

        controller.open_app(&package, sub_id.as_deref()).await?;
        self.settle().await;

        Ok(ActionResult::success(format!(
            "open_app executed app='{app_name}' package='{package}' activity='{}'",
            sub_id.as_deref().unwrap_or("")
        ))
        .with_data("package", package)
        .with_data("activity", sub_id.map(Value::from).unwrap_or(Value::Null)))
    }

    /// Capture the screen along with the cached screen size.
    pub async fn capture(&self) -> Result<Screenshot, ActionError> {
        let controller = self.controller()?;
        let data = controller.screenshot().await?;
        let size = controller.get_cached_screen_size().await?;
        let format = sniff_format(&data);
        debug!(bytes = data.len(), format, "screenshot");
        Ok(Screenshot {
            data,
            width: size.width,
            height: size.height,
            format,
        })
    }

    pub async fn screenshot(&self) -> Result<ActionResult, ActionError> {
        let shot = self.capture().await?;
        Ok(ActionResult {
            success: true,
            ..Default::default()
        }
        .with_data("image_base64", shot.to_base64())
        .with_data("width", shot.width)
        .with_data("height", shot.height)
        .with_data("format", shot.format))
    }

    pub async fn press_key(&self, key: &str) -> Result<ActionResult, ActionError> {
        let controller = self.controller()?;
        debug!(key, "press_key");
        controller.press_key(key).await?;
        self.settle().await;
        Ok(ActionResult::success(format!("press_key executed key={key}")).with_data("key", key))
    }

    /// Ask the operator for free text. Cancellation and timeout are reported, not raised.
    pub async fn human_interact(&self, prompt: &str) -> Result<ActionResult, ActionError> {
        let result = self
            .interaction
            .request_input(prompt, InputType::Text, None, None)
            .await;

        let error = if result.success() {
            None
        } else if result.cancelled {
            Some("cancelled")
        } else if result.timed_out {
            Some("timed_out")
        } else {
            Some("unknown_error")
        };

        let message = match error {
            Some(e) => format!("human_interact prompt='{prompt}' error='{e}'"),
            None => format!("human_interact prompt='{prompt}'"),
        };

        Ok(ActionResult {
            success: error.is_none(),
            message: Some(message),
            error: error.map(str::to_string),
            data: Map::new(),
        }
        .with_data("value", result.value.map(Value::from).unwrap_or(Value::Null))
        .with_data("cancelled", result.cancelled)
        .with_data("timed_out", result.timed_out))
    }

    /// Read, write, list or delete entries of the variable store.
    ///
    /// `read` takes a comma-separated key list; several keys return a map.
    pub fn variable_storage(
        &self,
        operation: &str,
        key: Option<&str>,
        value: Option<&str>,
    ) -> Result<ActionResult, ActionError> {
        let mut store = self.store();
        let key = key.map(str::trim).filter(|k| !k.is_empty());

        let result = match operation {
            "read" | "read_variable" => {
                let Some(key) = key else {
                    return Ok(ActionResult::failure("read requires a key"));
                };
                let keys: Vec<&str> = key
                    .split(',')
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .collect();
                if keys.len() == 1 {
                    let found = store.get(keys[0]).cloned();
                    ActionResult::success(format!("read {}", keys[0]))
                        .with_data("exists", found.is_some())
                        .with_data("value", found.map(Value::from).unwrap_or(Value::Null))
                } else {
                    let values: Map<String, Value> = keys
                        .iter()
                        .map(|k| {
                            let v = store.get(*k).cloned().map(Value::from);
                            (k.to_string(), v.unwrap_or(Value::Null))
                        })
                        .collect();
                    ActionResult::success(format!("read {}", keys.join(",")))
                        .with_data("value", Value::Object(values))
                }
            }
            "write" | "write_variable" => {
                let Some(key) = key else {
                    return Ok(ActionResult::failure("write requires a key"));
                };
                store.insert(key.to_string(), value.unwrap_or_default().to_string());
                ActionResult::success(format!("write {key} completed"))
            }
            "list" | "list_all_variable" => {
                let keys: Vec<&String> = store.keys().collect();
                ActionResult::success(format!("{} variables", keys.len()))
                    .with_data("count", keys.len())
                    .with_data("variables", json!(keys))
            }
            "delete" | "delete_variable" => {
                let Some(key) = key else {
                    return Ok(ActionResult::failure("delete requires a key"));
                };
                let deleted = store.remove(key).is_some();
                ActionResult::success(format!("delete {key}")).with_data("deleted", deleted)
            }
            other => ActionResult::failure(format!("unsupported operation {other}")),
        };
        Ok(result)
    }

    /// Connectivity probe. An unreachable device is a successful `connected: false`.
    pub async fn check_connection(&self) -> Result<ActionResult, ActionError> {
        let controller = self.controller()?;
        let connected = controller.is_connected().await;
        let mut result = ActionResult {
            success: true,
            ..Default::default()
        }
        .with_data("connected", connected);
        if connected {
            let size = controller.get_cached_screen_size().await?;
            result = result.with_data("screen_size", json!(size));
        }
        Ok(result)
    }

    /// Dispatch a named action with JSON keyword arguments.
    ///
    /// Coordinates may be given as `x`/`y` or as a `point_2d` pair; missing ones
    /// default to the screen centre. Unknown names and missing required
    /// arguments come back as failed results.
    pub async fn call(&self, name: &str, args: &Value) -> Result<ActionResult, ActionError> {
        let args = Args(args);
        match name {
            "click" => {
                let (x, y) = args.point("point_2d", "x", "y", (0.5, 0.5));
                let count = args.u64("count").or_else(|| args.u64("num_clicks")).unwrap_or(1);
                self.click(x, y, count.min(u32::MAX as u64) as u32).await
            }
            "long_press" => {
                let (x, y) = args.point("point_2d", "x", "y", (0.5, 0.5));
                let duration = args.u64("duration_ms").unwrap_or(DEFAULT_LONG_PRESS_MS);
                self.long_press(x, y, duration).await
            }
            "input_text" | "input" => {
                let text = args.str("text").unwrap_or_default();
                let press_enter = args.bool("press_enter").or_else(|| args.bool("enter"));
                let focus = args.optional_point("point_2d", "x", "y");
                self.input_text(text, press_enter.unwrap_or(false), focus).await
            }
            "scroll" => {
                let from = args.point("point_2d_start", "x1", "y1", (0.5, 0.8));
                let to = args.point("point_2d_end", "x2", "y2", (0.5, 0.2));
                let duration = args.u64("duration_ms").unwrap_or(DEFAULT_SWIPE_MS);
                self.scroll(from, to, duration).await
            }
            "wait" => {
                let duration = args
                    .u64("duration_ms")
                    .or_else(|| args.u64("duration"))
                    .unwrap_or(DEFAULT_WAIT_MS);
                self.wait(duration).await
            }
            "open_app" => match args.str("app_name").or_else(|| args.str("appname")) {
                Some(app) if !app.trim().is_empty() => self.open_app(app.trim()).await,
                _ => Ok(ActionResult::failure("Missing required parameter: app_name")),
            },
            "screenshot" => self.screenshot().await,
            "press_key" => self.press_key(args.str("key").unwrap_or("back")).await,
            "human_interact" => match args.str("prompt") {
                Some(prompt) => self.human_interact(prompt).await,
                None => Ok(ActionResult::failure("Missing required parameter: prompt")),
            },
            "variable_storage" => {
                let operation = args
                    .str("action")
                    .or_else(|| args.str("operation"))
                    .unwrap_or("list");
                let key = args.str("key").or_else(|| args.str("name"));
                let value = args.string("value");
                self.variable_storage(operation, key, value.as_deref())
            }
            "check_connection" => self.check_connection().await,
            other => Ok(ActionResult::failure(format!("Unknown action type: {other}"))),
        }
    }
}

/// Lenient accessors over a JSON argument object.
struct Args<'a>(&'a Value);

impl<'a> Args<'a> {
    fn get(&self, key: &str) -> Option<&'a Value> {
        self.0.get(key)
    }

    fn f64(&self, key: &str) -> Option<f64> {
        let value = self.get(key)?;
        value
            .as_f64()
            .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
    }

    fn u64(&self, key: &str) -> Option<u64> {
        self.f64(key).filter(|v| *v >= 0.0).map(|v| v.round() as u64)
    }

    fn bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    fn str(&self, key: &str) -> Option<&'a str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Strings as-is, other scalars rendered as JSON text.
    fn string(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    fn optional_point(&self, pair: &str, x: &str, y: &str) -> Option<(f64, f64)> {
        if let Some(Value::Array(items)) = self.get(pair) {
            if let [px, py, ..] = items.as_slice() {
                if let (Some(px), Some(py)) = (px.as_f64(), py.as_f64()) {
                    return Some((px, py));
                }
            }
        }
        Some((self.f64(x)?, self.f64(y)?))
    }

    fn point(&self, pair: &str, x: &str, y: &str, default: (f64, f64)) -> (f64, f64) {
        self.optional_point(pair, x, y).unwrap_or_else(|| {
            (
                self.f64(x).unwrap_or(default.0),
                self.f64(y).unwrap_or(default.1),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Platform;
    use crate::interaction::NoOpInteractionHandler;
    use crate::testing::{Call, MockController};

    fn actions(controller: Arc<MockController>) -> DeviceActions {
        DeviceActions::new()
            .with_controller(controller)
            .with_tool_delay_ms(0)
    }

    #[tokio::test]
    async fn test_no_controller() {
        let facade = DeviceActions::new();
        let err = facade.click(0.5, 0.5, 1).await.unwrap_err();
        assert!(matches!(err, ActionError::NoController));
        assert_eq!(err.to_string(), "No controller configured");
        assert!(facade.screenshot().await.is_err());

        // Store and wait work without a device.
        assert!(facade.wait(200).await.unwrap().success);
        assert!(facade.variable_storage("list", None, None).unwrap().success);
    }

    #[tokio::test]
    async fn test_click_normalizes_every_scale() {
        let mock = Arc::new(MockController::new());
        let facade = actions(mock.clone());

        let result = facade.click(0.5, 0.5, 1).await.unwrap();
        assert!(result.success);
        assert_eq!(result.get("x"), Some(&json!(540)));
        assert_eq!(result.get("y"), Some(&json!(1170)));

        facade.click(500.0, 500.0, 1).await.unwrap();
        facade.click(1500.0, 3000.0, 1).await.unwrap();
        facade.click(-3.0, 0.0, 1).await.unwrap();

        assert_eq!(
            mock.taps(),
            vec![(540, 1170), (540, 1170), (1079, 2339), (0, 0)]
        );
        // Screen size is queried once per controller.
        assert_eq!(mock.size_queries(), 1);
    }

    #[tokio::test]
    async fn test_click_count_and_device_failure() {
        let mock = Arc::new(MockController::new().with_failing_taps(1));
        let facade = actions(mock.clone());

        let err = facade.click(0.1, 0.1, 1).await.unwrap_err();
        assert!(matches!(err, ActionError::Device(_)));

        let result = facade.click(0.1, 0.1, 0).await.unwrap();
        assert_eq!(result.get("count"), Some(&json!(1)));
        facade.click(0.1, 0.1, 2).await.unwrap();
        assert_eq!(mock.taps().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_count_is_bounded() {
        let mock = Arc::new(MockController::new());
        let facade = actions(mock.clone());

        let result = facade
            .call("click", &json!({"x": 0.5, "y": 0.5, "count": 1_000_000}))
            .await
            .unwrap();
        assert_eq!(result.get("count"), Some(&json!(MAX_CLICKS)));
        assert_eq!(mock.taps().len(), MAX_CLICKS as usize);
    }

    #[tokio::test]
    async fn test_input_text_with_focus_and_enter() {
        let mock = Arc::new(MockController::new());
        let facade = actions(mock.clone());

        facade
            .input_text("hello", true, Some((0.5, 0.1)))
            .await
            .unwrap();
        assert_eq!(
            mock.actions(),
            vec![
                Call::Tap(540, 234),
                Call::InputText("hello".to_string()),
                Call::PressKey("enter".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_scroll_defaults_through_call() {
        let mock = Arc::new(MockController::new());
        let facade = actions(mock.clone());

        let result = facade.call("scroll", &json!({})).await.unwrap();
        assert_eq!(result.get("from"), Some(&json!({"x": 540, "y": 1872})));
        assert_eq!(result.get("to"), Some(&json!({"x": 540, "y": 468})));
        assert_eq!(mock.actions(), vec![Call::Swipe(540, 1872, 540, 468, 300)]);
    }

    #[tokio::test]
    async fn test_call_accepts_point_pairs() {
        let mock = Arc::new(MockController::new());
        let facade = actions(mock.clone());

        facade
            .call("click", &json!({"point_2d": [0.25, 0.5], "num_clicks": 1}))
            .await
            .unwrap();
        facade
            .call("long_press", &json!({"x": "0.5", "y": 0.5}))
            .await
            .unwrap();
        assert_eq!(
            mock.actions(),
            vec![Call::Tap(270, 1170), Call::LongPress(540, 1170, 1000)]
        );
    }

    #[tokio::test]
    async fn test_open_app_resolves_per_platform() {
        let android = Arc::new(MockController::new());
        actions(android.clone()).open_app("微信").await.unwrap();
        actions(android.clone())
            .open_app("com.example.notes")
            .await
            .unwrap();
        assert_eq!(
            android.actions(),
            vec![
                Call::OpenApp("com.tencent.mm".to_string(), Some(".ui.LauncherUI".to_string())),
                Call::OpenApp("com.example.notes".to_string(), None),
            ]
        );

        let harmony = Arc::new(MockController::harmony());
        assert_eq!(harmony.platform(), Platform::Harmony);
        let result = actions(harmony.clone()).open_app("WeChat").await.unwrap();
        assert_eq!(result.get("package"), Some(&json!("com.tencent.wechat")));
        assert_eq!(
            harmony.actions(),
            vec![Call::OpenApp(
                "com.tencent.wechat".to_string(),
                Some("entry/MainAbility".to_string())
            )]
        );
    }

    #[tokio::test]
    async fn test_open_app_requires_name() {
        let mock = Arc::new(MockController::new());
        let result = actions(mock.clone())
            .call("open_app", &json!({"app_name": "  "}))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(mock.actions().is_empty());
    }

    #[tokio::test]
    async fn test_screenshot_reports_format_and_size() {
        let mock = Arc::new(MockController::new());
        let result = actions(mock).screenshot().await.unwrap();

        assert!(result.success);
        assert_eq!(result.get("format"), Some(&json!("png")));
        assert_eq!(result.get("width"), Some(&json!(1080)));
        assert_eq!(result.get("height"), Some(&json!(2340)));
        let encoded = result.get("image_base64").and_then(Value::as_str).unwrap();
        assert_eq!(
            BASE64.decode(encoded).unwrap(),
            crate::testing::PNG_BYTES.to_vec()
        );
    }

    #[test]
    fn test_sniff_format() {
        assert_eq!(sniff_format(b"\xff\xd8\xff\xe0\0\x10JFIF"), "jpeg");
        assert_eq!(sniff_format(crate::testing::PNG_BYTES), "png");
        assert_eq!(sniff_format(b"garbage"), "png");
    }

    #[tokio::test]
    async fn test_wait_is_clamped() {
        let facade = DeviceActions::new();
        let result = facade.wait(5).await.unwrap();
        assert_eq!(result.get("duration_ms"), Some(&json!(200)));
    }

    #[tokio::test]
    async fn test_press_key_and_unknown_action() {
        let mock = Arc::new(MockController::new());
        let facade = actions(mock.clone());

        let result = facade.call("press_key", &json!({"key": "home"})).await.unwrap();
        assert_eq!(result.get("key"), Some(&json!("home")));

        let result = facade.call("teleport", &json!({})).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Unknown action type: teleport"));
        assert_eq!(mock.actions(), vec![Call::PressKey("home".to_string())]);
    }

    #[tokio::test]
    async fn test_human_interact_outcomes() {
        let cancelled = DeviceActions::new();
        let result = cancelled.human_interact("Scan the QR code").await.unwrap();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("cancelled"));
        assert_eq!(result.get("cancelled"), Some(&json!(true)));
        assert_eq!(result.get("value"), Some(&Value::Null));

        let answered = DeviceActions::new()
            .with_interaction_handler(Arc::new(NoOpInteractionHandler::with_default("1234")));
        let result = answered
            .call("human_interact", &json!({"prompt": "Enter the code"}))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.get("value"), Some(&json!("1234")));
        assert!(result.error.is_none());
    }

    #[test]
    fn test_variable_storage_operations() {
        let facade = DeviceActions::new();

        let result = facade
            .variable_storage("write", Some("address"), Some("No. 1 Main St"))
            .unwrap();
        assert!(result.success);
        facade.set_variable("code", "42");

        let result = facade.variable_storage("read", Some("address"), None).unwrap();
        assert_eq!(result.get("value"), Some(&json!("No. 1 Main St")));
        assert_eq!(result.get("exists"), Some(&json!(true)));

        let result = facade
            .variable_storage("read_variable", Some("address, missing"), None)
            .unwrap();
        assert_eq!(
            result.get("value"),
            Some(&json!({"address": "No. 1 Main St", "missing": null}))
        );

        let result = facade.variable_storage("list", None, None).unwrap();
        assert_eq!(result.get("count"), Some(&json!(2)));
        assert_eq!(result.get("variables"), Some(&json!(["address", "code"])));

        let result = facade.variable_storage("delete", Some("code"), None).unwrap();
        assert_eq!(result.get("deleted"), Some(&json!(true)));
        assert!(!facade.variable_storage("write", None, Some("x")).unwrap().success);
        assert!(!facade.variable_storage("truncate", None, None).unwrap().success);

        assert_eq!(facade.variables().len(), 1);
    }

    #[tokio::test]
    async fn test_variable_storage_through_call() {
        let facade = DeviceActions::new();
        facade
            .call(
                "variable_storage",
                &json!({"action": "write", "key": "count", "value": 3}),
            )
            .await
            .unwrap();
        assert_eq!(facade.variables().get("count").map(String::as_str), Some("3"));
    }

    #[tokio::test]
    async fn test_check_connection() {
        let online = actions(Arc::new(MockController::new()));
        let result = online.check_connection().await.unwrap();
        assert_eq!(result.get("connected"), Some(&json!(true)));
        assert_eq!(
            result.get("screen_size"),
            Some(&json!({"width": 1080, "height": 2340}))
        );

        let offline = actions(Arc::new(MockController::disconnected()));
        let result = offline.check_connection().await.unwrap();
        assert!(result.success);
        assert_eq!(result.get("connected"), Some(&json!(false)));
        assert!(result.get("screen_size").is_none());
    }

    #[test]
    fn test_describe_actions() {
        let text = describe_actions(&["click", "wait"]);
        assert_eq!(text.lines().count(), 2);
        assert!(text.starts_with("- click(x, y, count?)"));
        assert_eq!(DeviceActions::new().catalogue().len(), 11);
    }

    #[test]
    fn test_action_result_serialization() {
        let value = ActionResult::success("done").with_data("x", 1).to_value();
        assert_eq!(value, json!({"success": true, "message": "done", "x": 1}));
    }
}
