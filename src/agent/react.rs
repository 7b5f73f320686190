//! Reactive strategy: perceive, decide one action, act, repeat.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::Instrument;
use uuid::Uuid;

use super::base::{AgentCore, AgentError, AgentResult, HistoryEntry, MobileAgent, VisionAnalysis};
use crate::actions::describe_actions;
use crate::config::{build_decision_prompt, build_decision_user_prompt};
use crate::model::parse_json_object;

/// Device actions a decision may name, besides `complete` and `fail`.
pub const DECISION_ACTIONS: &[&str] = &[
    "click",
    "long_press",
    "input_text",
    "scroll",
    "press_key",
    "open_app",
    "wait",
    "human_interact",
    "variable_storage",
];

/// Number of past actions shown to the model.
const RECENT_WINDOW: usize = 3;

/// One parsed decision: an action name plus its arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub action: String,
    pub args: Value,
}

impl Decision {
    fn fallback() -> Self {
        Self {
            action: "wait".to_string(),
            args: json!({ "type": "wait", "duration_ms": 1000 }),
        }
    }

    /// Parse the first JSON object carrying a string `type`; anything else is a 1 s wait.
    pub fn parse(raw: &str) -> Self {
        let parsed = parse_json_object(raw).and_then(|object| {
            let action = object.get("type")?.as_str()?.trim().to_string();
            (!action.is_empty()).then(|| (action, object))
        });

        match parsed {
            Some((action, object)) => Self {
                action,
                args: Value::Object(object),
            },
            None => {
                tracing::warn!(response = %raw, "Malformed decision, falling back to wait");
                Self::fallback()
            }
        }
    }

    /// `message` (or `reason`) given with `complete`/`fail`.
    pub fn message(&self) -> Option<&str> {
        self.args
            .get("message")
            .or_else(|| self.args.get("reason"))
            .and_then(Value::as_str)
    }

    /// Arguments without the bookkeeping keys.
    fn params(&self) -> Value {
        let mut params = match &self.args {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        params.remove("type");
        params.remove("reason");
        Value::Object(params)
    }
}

/// Reactive agent bounded by `max_rounds`.
pub struct ReactAgent {
    core: AgentCore,
    system_prompt: String,
}

impl ReactAgent {
    pub fn new(core: AgentCore) -> Self {
        Self {
            core,
            system_prompt: build_decision_prompt(&describe_actions(DECISION_ACTIONS)),
        }
    }

    /// Rolling window of the last outcomes, `- action: Success|Failed` per line.
    pub fn build_context(history: &[HistoryEntry]) -> String {
        let start = history.len().saturating_sub(RECENT_WINDOW);
        history[start..]
            .iter()
            .map(|entry| {
                let outcome = if entry.success { "Success" } else { "Failed" };
                format!("- {}: {}", entry.action, outcome)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    async fn decide(&self, task: &str, analysis: &VisionAnalysis) -> Result<Decision, AgentError> {
        let recent = Self::build_context(self.core.history());
        let mut screen = analysis.description.clone();
        if let Some(suggested) = &analysis.suggested_action {
            screen.push_str(&format!("\nSuggested: {suggested}"));
        }
        let raw = self
            .core
            .complete(
                &self.system_prompt,
                build_decision_user_prompt(task, &screen, &recent),
            )
            .await?;
        Ok(Decision::parse(&raw))
    }

    async fn run(&mut self, task: &str) -> Result<AgentResult, AgentError> {
        while self.core.has_rounds_left() {
            if self.core.is_paused() {
                return Ok(self.core.paused_result());
            }

            let round = self.core.next_round();
            let context = Self::build_context(self.core.history());
            let (screenshot, analysis) = self.core.take_screenshot_and_analyze(&context, task).await?;
            let decision = self.decide(task, &analysis).await?;
            tracing::info!(
                round,
                max_rounds = self.core.max_rounds(),
                action = %decision.action,
                "Round decided"
            );

            match decision.action.as_str() {
                "complete" => {
                    let message = decision.message().unwrap_or("Task completed").to_string();
                    return Ok(self
                        .core
                        .complete_run(message)
                        .with_screenshot(screenshot.data));
                }
                "fail" => {
                    let message = decision.message().unwrap_or("Task failed").to_string();
                    return Ok(self
                        .core
                        .fail_run(message.clone(), Some(message)));
                }
                action => {
                    let params = decision.params();
                    let result = self.core.actions().call(action, &params).await?;
                    if !result.success {
                        tracing::warn!(action, error = ?result.error, "Action reported failure");
                    }
                    self.core
                        .record(format!("{action}: {params}"), &result, Some(&analysis));
                }
            }
        }

        Ok(self.core.rounds_exhausted())
    }
}

#[async_trait]
impl MobileAgent for ReactAgent {
    async fn execute(&mut self, task: &str) -> AgentResult {
        self.core.begin();
        let span = tracing::info_span!("react", run_id = %Uuid::new_v4());
        async {
            tracing::info!(task, "Starting task");
            match self.run(task).await {
                Ok(result) => result,
                Err(e) => self.core.fail_with(e),
            }
        }
        .instrument(span)
        .await
    }

    fn core(&self) -> &AgentCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AgentCore {
        &mut self.core
    }
}
