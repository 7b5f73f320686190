//! Test doubles shared by unit tests across modules.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::OnceCell;

use crate::device::{ControllerConfig, DeviceController, DeviceError, Platform, ScreenSize};
use crate::model::{CompletionRequest, CompletionService, ModelError};

/// Minimal bytes recognised as PNG by `image::guess_format`.
pub(crate) const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDRfake";

/// One recorded controller invocation.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Tap(u32, u32),
    LongPress(u32, u32, u64),
    Swipe(u32, u32, u32, u32, u64),
    InputText(String),
    PressKey(String),
    Screenshot,
    OpenApp(String, Option<String>),
}

/// In-memory controller that records every call.
pub(crate) struct MockController {
    platform: Platform,
    size: ScreenSize,
    connected: bool,
    failing_taps: AtomicUsize,
    config: ControllerConfig,
    cache: OnceCell<ScreenSize>,
    size_queries: AtomicUsize,
    calls: Mutex<Vec<Call>>,
}

impl MockController {
    pub(crate) fn new() -> Self {
        Self {
            platform: Platform::Android,
            size: ScreenSize::new(1080, 2340),
            connected: true,
            failing_taps: AtomicUsize::new(0),
            config: ControllerConfig::default(),
            cache: OnceCell::new(),
            size_queries: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn harmony() -> Self {
        Self {
            platform: Platform::Harmony,
            ..Self::new()
        }
    }

    pub(crate) fn disconnected() -> Self {
        Self {
            connected: false,
            ..Self::new()
        }
    }

    /// The next `n` taps fail with a command error.
    pub(crate) fn with_failing_taps(self, n: usize) -> Self {
        self.failing_taps.store(n, Ordering::SeqCst);
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn taps(&self) -> Vec<(u32, u32)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Tap(x, y) => Some((x, y)),
                _ => None,
            })
            .collect()
    }

    /// Calls other than screenshots.
    pub(crate) fn actions(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| *c != Call::Screenshot)
            .collect()
    }

    pub(crate) fn size_queries(&self) -> usize {
        self.size_queries.load(Ordering::SeqCst)
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl DeviceController for MockController {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn config(&self) -> &ControllerConfig {
        &self.config
    }

    fn screen_size_cache(&self) -> &OnceCell<ScreenSize> {
        &self.cache
    }

    async fn tap(&self, x: u32, y: u32) -> Result<(), DeviceError> {
        self.record(Call::Tap(x, y));
        let remaining = self.failing_taps.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_taps.store(remaining - 1, Ordering::SeqCst);
            return Err(DeviceError::CommandFailed {
                command: "input tap".to_string(),
                code: Some(1),
                stderr: "device offline".to_string(),
            });
        }
        Ok(())
    }

    async fn long_press(&self, x: u32, y: u32, duration_ms: u64) -> Result<(), DeviceError> {
        self.record(Call::LongPress(x, y, duration_ms));
        Ok(())
    }

    async fn swipe(
        &self,
        x1: u32,
        y1: u32,
        x2: u32,
        y2: u32,
        duration_ms: u64,
    ) -> Result<(), DeviceError> {
        self.record(Call::Swipe(x1, y1, x2, y2, duration_ms));
        Ok(())
    }

    async fn input_text(&self, text: &str) -> Result<(), DeviceError> {
        self.record(Call::InputText(text.to_string()));
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<(), DeviceError> {
        self.record(Call::PressKey(key.to_string()));
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DeviceError> {
        self.record(Call::Screenshot);
        Ok(PNG_BYTES.to_vec())
    }

    async fn get_screen_size(&self) -> Result<ScreenSize, DeviceError> {
        self.size_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.size)
    }

    async fn open_app(&self, app_id: &str, sub_id: Option<&str>) -> Result<(), DeviceError> {
        self.record(Call::OpenApp(app_id.to_string(), sub_id.map(str::to_string)));
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connected
    }
}

/// Completion service replaying a fixed script of responses.
pub(crate) struct ScriptedCompletion {
    responses: Mutex<VecDeque<Result<String, String>>>,
    fallback: Option<String>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletion {
    pub(crate) fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(|s| Ok(s.into())).collect()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Response returned once the script is exhausted.
    pub(crate) fn with_fallback(mut self, response: impl Into<String>) -> Self {
        self.fallback = Some(response.into());
        self
    }

    /// Every request fails with the given API error.
    pub(crate) fn failing(message: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::from(vec![Err(message.into())])),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ModelError> {
        self.requests.lock().unwrap().push(request);
        let next = {
            let mut responses = self.responses.lock().unwrap();
            match responses.front() {
                Some(Err(_)) if responses.len() == 1 => responses.front().cloned(),
                _ => responses.pop_front(),
            }
        };
        match next {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(ModelError::ApiError(message)),
            None => self
                .fallback
                .clone()
                .ok_or_else(|| ModelError::ApiError("script exhausted".to_string())),
        }
    }
}

/// A shell script standing in for `adb`/`hdc` that logs its argument vector.
#[cfg(unix)]
pub(crate) struct FakeBridge {
    pub(crate) script: PathBuf,
    log: PathBuf,
}

#[cfg(unix)]
impl FakeBridge {
    /// Logged argument vectors, one per invocation.
    pub(crate) fn calls(&self) -> Vec<String> {
        std::fs::read_to_string(&self.log)
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

/// Write an executable fake bridge into `dir`. `body` runs after logging and
/// may dispatch on `"$*"`.
#[cfg(unix)]
pub(crate) fn fake_bridge(dir: &Path, body: &str) -> FakeBridge {
    use std::os::unix::fs::PermissionsExt;

    let log = dir.join("calls.log");
    let script = dir.join("bridge.sh");
    let content = format!(
        "#!/bin/sh\necho \"$@\" >> '{}'\n{}\nexit 0\n",
        log.display(),
        body
    );
    std::fs::write(&script, content).unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    FakeBridge { script, log }
}
