//! State shared by every agent strategy: status machine, history and screen analysis.

use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

use crate::actions::{ActionError, ActionResult, DeviceActions, Screenshot};
use crate::config::VISION_ANALYSIS_PROMPT;
use crate::model::{parse_json_object, CompletionRequest, CompletionService, ModelError};

/// Default model for both completion services.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Default round budget.
pub const DEFAULT_MAX_ROUNDS: u32 = 50;

/// Failure raised inside a round. Strategies fold it into an [`AgentResult`].
#[derive(Error, Debug)]
pub enum AgentError {
    #[error(transparent)]
    Action(#[from] ActionError),
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Idle,
    Running,
    Paused,
    Completed,
    Failed,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Idle => "idle",
            AgentStatus::Running => "running",
            AgentStatus::Paused => "paused",
            AgentStatus::Completed => "completed",
            AgentStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentStatus::Completed | AgentStatus::Failed)
    }
}

/// One screen perception result.
#[derive(Debug, Clone, Default, Serialize)]
pub struct VisionAnalysis {
    pub description: String,
    pub elements: Vec<Value>,
    pub suggested_action: Option<String>,
    pub confidence: f64,
    pub raw_response: String,
}

impl VisionAnalysis {
    /// Parse the first JSON object in `raw`. Unparsable text becomes the description.
    pub fn parse(raw: &str) -> Self {
        let Some(data) = parse_json_object(raw) else {
            tracing::warn!("Vision response is not JSON, using raw text as description");
            return Self {
                description: raw.to_string(),
                raw_response: raw.to_string(),
                ..Default::default()
            };
        };

        Self {
            description: data
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            elements: data
                .get("elements")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            suggested_action: data
                .get("suggested_action")
                .and_then(Value::as_str)
                .map(str::to_string),
            confidence: data
                .get("confidence")
                .and_then(Value::as_f64)
                .unwrap_or(0.0),
            raw_response: raw.to_string(),
        }
    }
}

/// Final outcome of one `execute()` call.
#[derive(Debug, Clone, Default)]
pub struct AgentResult {
    pub success: bool,
    pub message: String,
    pub steps_executed: u32,
    pub final_screenshot: Option<Vec<u8>>,
    pub variables: BTreeMap<String, String>,
    pub error: Option<String>,
}

impl AgentResult {
    pub fn succeeded(message: impl Into<String>, steps_executed: u32) -> Self {
        Self {
            success: true,
            message: message.into(),
            steps_executed,
            ..Default::default()
        }
    }

    pub fn failed(message: impl Into<String>, steps_executed: u32, error: Option<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            steps_executed,
            error,
            ..Default::default()
        }
    }

    pub fn with_screenshot(mut self, screenshot: Vec<u8>) -> Self {
        self.final_screenshot = Some(screenshot);
        self
    }

    pub fn with_variables(mut self, variables: BTreeMap<String, String>) -> Self {
        self.variables = variables;
        self
    }
}

/// One executed action.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub round: u32,
    pub action: String,
    pub success: bool,
    pub result: Value,
    /// Screen description the action was decided on.
    pub screen: Option<String>,
    pub timestamp: DateTime<Local>,
}

/// Cloneable handle for pausing a running agent from another task.
///
/// Pausing is cooperative: the loop observes it at the top of its next round.
#[derive(Debug, Clone)]
pub struct StopHandle {
    status: Arc<Mutex<AgentStatus>>,
}

impl StopHandle {
    fn new() -> Self {
        Self {
            status: Arc::new(Mutex::new(AgentStatus::Idle)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AgentStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> AgentStatus {
        *self.lock()
    }

    /// `running -> paused`. Returns whether the transition happened.
    pub fn stop(&self) -> bool {
        let mut status = self.lock();
        if *status == AgentStatus::Running {
            *status = AgentStatus::Paused;
            true
        } else {
            false
        }
    }

    /// `paused -> running`. Returns whether the transition happened.
    pub fn resume(&self) -> bool {
        let mut status = self.lock();
        if *status == AgentStatus::Paused {
            *status = AgentStatus::Running;
            true
        } else {
            false
        }
    }

    fn set(&self, status: AgentStatus) {
        *self.lock() = status;
    }
}

/// Collaborators and bookkeeping shared by the strategies.
pub struct AgentCore {
    actions: Arc<DeviceActions>,
    llm: Arc<dyn CompletionService>,
    vlm: Arc<dyn CompletionService>,
    llm_model: String,
    vlm_model: String,
    max_rounds: u32,
    control: StopHandle,
    current_round: u32,
    history: Vec<HistoryEntry>,
}

impl AgentCore {
    /// `llm` also serves vision calls unless [`AgentCore::with_vlm`] is set.
    pub fn new(actions: Arc<DeviceActions>, llm: Arc<dyn CompletionService>) -> Self {
        Self {
            actions,
            vlm: llm.clone(),
            llm,
            llm_model: DEFAULT_MODEL.to_string(),
            vlm_model: DEFAULT_MODEL.to_string(),
            max_rounds: DEFAULT_MAX_ROUNDS,
            control: StopHandle::new(),
            current_round: 0,
            history: Vec::new(),
        }
    }

    pub fn with_vlm(mut self, vlm: Arc<dyn CompletionService>) -> Self {
        self.vlm = vlm;
        self
    }

    pub fn with_llm_model(mut self, model: impl Into<String>) -> Self {
        self.llm_model = model.into();
        self
    }

    pub fn with_vlm_model(mut self, model: impl Into<String>) -> Self {
        self.vlm_model = model.into();
        self
    }

    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// A fresh core over the same collaborators, with its own status and budget.
    pub fn child(&self, max_rounds: u32) -> Self {
        Self {
            actions: self.actions.clone(),
            llm: self.llm.clone(),
            vlm: self.vlm.clone(),
            llm_model: self.llm_model.clone(),
            vlm_model: self.vlm_model.clone(),
            max_rounds,
            control: StopHandle::new(),
            current_round: 0,
            history: Vec::new(),
        }
    }

    pub fn actions(&self) -> &Arc<DeviceActions> {
        &self.actions
    }

    pub fn status(&self) -> AgentStatus {
        self.control.status()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.control.clone()
    }

    pub fn max_rounds(&self) -> u32 {
        self.max_rounds
    }

    pub fn current_round(&self) -> u32 {
        self.current_round
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// Back to `idle` with an empty history.
    pub fn reset(&mut self) {
        self.control.set(AgentStatus::Idle);
        self.current_round = 0;
        self.history.clear();
    }

    /// Reset, then enter `running`.
    pub(crate) fn begin(&mut self) {
        self.reset();
        self.control.set(AgentStatus::Running);
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.status() == AgentStatus::Paused
    }

    pub(crate) fn next_round(&mut self) -> u32 {
        self.current_round += 1;
        self.current_round
    }

    pub(crate) fn has_rounds_left(&self) -> bool {
        self.current_round < self.max_rounds
    }

    /// Describe a screenshot with the vision model.
    pub async fn analyze_screen(
        &self,
        screenshot: &Screenshot,
        context: &str,
        task: &str,
    ) -> Result<VisionAnalysis, ModelError> {
        let mut parts = Vec::new();
        if !task.is_empty() {
            parts.push(format!("Task: {task}"));
        }
        if !context.is_empty() {
            parts.push(format!("Context: {context}"));
        }

        let request = CompletionRequest::new(
            self.vlm_model.as_str(),
            VISION_ANALYSIS_PROMPT,
            parts.join("\n"),
        )
        .with_image(screenshot.to_image_data());
        let raw = self.vlm.complete(request).await?;
        Ok(VisionAnalysis::parse(&raw))
    }

    pub async fn take_screenshot_and_analyze(
        &self,
        context: &str,
        task: &str,
    ) -> Result<(Screenshot, VisionAnalysis), AgentError> {
        let screenshot = self.actions.capture().await?;
        let analysis = self.analyze_screen(&screenshot, context, task).await?;
        tracing::debug!(description = %analysis.description, "Screen analyzed");
        Ok((screenshot, analysis))
    }

    /// Text-only call to the language model.
    pub(crate) async fn complete(&self, system: &str, user: String) -> Result<String, ModelError> {
        let request = CompletionRequest::new(self.llm_model.as_str(), system, user);
        self.llm.complete(request).await
    }

    pub(crate) fn record(
        &mut self,
        action: impl Into<String>,
        result: &ActionResult,
        analysis: Option<&VisionAnalysis>,
    ) {
        self.history.push(HistoryEntry {
            round: self.current_round,
            action: action.into(),
            success: result.success,
            result: result.to_value(),
            screen: analysis.map(|a| a.description.clone()),
            timestamp: Local::now(),
        });
    }

    /// Enter `completed` and build the success result.
    pub(crate) fn complete_run(&self, message: impl Into<String>) -> AgentResult {
        self.control.set(AgentStatus::Completed);
        AgentResult::succeeded(message, self.current_round).with_variables(self.actions.variables())
    }

    /// Enter `failed` and build the failure result.
    pub(crate) fn fail_run(&self, message: impl Into<String>, error: Option<String>) -> AgentResult {
        self.control.set(AgentStatus::Failed);
        AgentResult::failed(message, self.current_round, error)
            .with_variables(self.actions.variables())
    }

    pub(crate) fn fail_with(&self, error: AgentError) -> AgentResult {
        tracing::error!(error = %error, "Execution error");
        self.fail_run(format!("Execution error: {error}"), Some(error.to_string()))
    }

    pub(crate) fn rounds_exhausted(&self) -> AgentResult {
        tracing::error!(max_rounds = self.max_rounds, "Max rounds reached");
        self.fail_run(
            format!("Max rounds ({}) reached", self.max_rounds),
            Some("max_rounds_exceeded".to_string()),
        )
    }

    pub(crate) fn paused_result(&self) -> AgentResult {
        tracing::warn!(round = self.current_round, "Execution paused");
        AgentResult::failed("Execution paused", self.current_round, None)
            .with_variables(self.actions.variables())
    }
}

/// Fields of a JSON object argument, or an empty map.
pub(crate) fn object_or_empty(value: Option<&Value>) -> Value {
    match value {
        Some(Value::Object(map)) => Value::Object(map.clone()),
        _ => Value::Object(Map::new()),
    }
}

/// A task-execution strategy.
#[async_trait]
pub trait MobileAgent: Send {
    /// Run `task` to a terminal (or paused) state.
    async fn execute(&mut self, task: &str) -> AgentResult;

    fn core(&self) -> &AgentCore;

    fn core_mut(&mut self) -> &mut AgentCore;

    fn status(&self) -> AgentStatus {
        self.core().status()
    }

    fn stop_handle(&self) -> StopHandle {
        self.core().stop_handle()
    }

    fn history(&self) -> &[HistoryEntry] {
        self.core().history()
    }

    fn reset(&mut self) {
        self.core_mut().reset();
    }
}
