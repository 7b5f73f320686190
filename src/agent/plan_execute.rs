//! Plan-Execute strategy: plan once, execute step by step, replan on failure.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::Instrument;
use uuid::Uuid;

use super::base::{
    object_or_empty, AgentCore, AgentError, AgentResult, MobileAgent, VisionAnalysis,
};
use crate::actions::ActionResult;
use crate::config::{build_plan_user_prompt, build_replan_task, PLAN_SYSTEM_PROMPT};
use crate::model::parse_json_array;

/// Step types a plan may contain.
pub const PLAN_ACTIONS: &[&str] = &[
    "click",
    "long_press",
    "input_text",
    "scroll",
    "press_key",
    "open_app",
    "wait",
];

/// Default replanning budget per run.
pub const DEFAULT_MAX_REPLANS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Done,
    Failed,
}

/// One step of an [`ExecutionPlan`].
#[derive(Debug, Clone)]
pub struct PlanStep {
    /// 1-based position in the plan.
    pub index: usize,
    pub description: String,
    pub action_type: String,
    pub parameters: Value,
    status: StepStatus,
    result: Option<ActionResult>,
}

impl PlanStep {
    pub fn new(
        index: usize,
        description: impl Into<String>,
        action_type: impl Into<String>,
        parameters: Value,
    ) -> Self {
        Self {
            index,
            description: description.into(),
            action_type: action_type.into(),
            parameters,
            status: StepStatus::Pending,
            result: None,
        }
    }

    pub fn status(&self) -> StepStatus {
        self.status
    }

    pub fn result(&self) -> Option<&ActionResult> {
        self.result.as_ref()
    }

    pub fn mark_running(&mut self) {
        self.status = StepStatus::Running;
    }

    pub fn mark_done(&mut self, result: ActionResult) {
        self.status = StepStatus::Done;
        self.result = Some(result);
    }

    pub fn mark_failed(&mut self, result: ActionResult) {
        self.status = StepStatus::Failed;
        self.result = Some(result);
    }
}

/// Ordered steps plus the index of the next one to run.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub task: String,
    steps: Vec<PlanStep>,
    current_step: usize,
}

impl ExecutionPlan {
    pub fn new(task: impl Into<String>, steps: Vec<PlanStep>) -> Self {
        Self {
            task: task.into(),
            steps,
            current_step: 0,
        }
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn is_complete(&self) -> bool {
        self.current_step == self.steps.len()
    }

    /// `current_step / len`; an empty plan counts as done.
    pub fn progress(&self) -> f64 {
        if self.steps.is_empty() {
            1.0
        } else {
            self.current_step as f64 / self.steps.len() as f64
        }
    }

    pub fn current(&self) -> Option<&PlanStep> {
        self.steps.get(self.current_step)
    }

    fn current_mut(&mut self) -> Option<&mut PlanStep> {
        self.steps.get_mut(self.current_step)
    }

    /// Move past the current step. No-op once complete.
    pub fn advance(&mut self) {
        if self.current_step < self.steps.len() {
            self.current_step += 1;
        }
    }

    /// Keep finished steps, append `replacement`, renumber and resume after the kept ones.
    fn splice(&mut self, replacement: Vec<PlanStep>) {
        self.steps.retain(|step| step.status == StepStatus::Done);
        self.current_step = self.steps.len();
        self.steps.extend(replacement);
        for (i, step) in self.steps.iter_mut().enumerate() {
            step.index = i + 1;
        }
    }
}

/// Parse the first JSON array of `{description, action_type, parameters}` objects.
pub fn parse_plan(task: &str, raw: &str) -> ExecutionPlan {
    let items = parse_json_array(raw).unwrap_or_else(|| {
        tracing::warn!(response = %raw, "Plan response has no JSON array");
        Vec::new()
    });

    let steps = items
        .iter()
        .filter_map(Value::as_object)
        .enumerate()
        .map(|(i, item)| step_from_json(i + 1, item))
        .collect();
    ExecutionPlan::new(task, steps)
}

fn step_from_json(index: usize, item: &Map<String, Value>) -> PlanStep {
    let text = |key: &str| item.get(key).and_then(Value::as_str).map(str::to_string);
    PlanStep::new(
        index,
        text("description").unwrap_or_else(|| format!("Step {index}")),
        text("action_type").unwrap_or_else(|| "wait".to_string()),
        object_or_empty(item.get("parameters")),
    )
}

/// Plan-Execute agent.
pub struct PlanExecuteAgent {
    core: AgentCore,
    replan_on_failure: bool,
    max_replans: u32,
    replan_count: u32,
    plan: Option<ExecutionPlan>,
}

impl PlanExecuteAgent {
    pub fn new(core: AgentCore) -> Self {
        Self {
            core,
            replan_on_failure: true,
            max_replans: DEFAULT_MAX_REPLANS,
            replan_count: 0,
            plan: None,
        }
    }

    pub fn with_replan_on_failure(mut self, enabled: bool) -> Self {
        self.replan_on_failure = enabled;
        self
    }

    pub fn with_max_replans(mut self, max_replans: u32) -> Self {
        self.max_replans = max_replans;
        self
    }

    pub fn plan(&self) -> Option<&ExecutionPlan> {
        self.plan.as_ref()
    }

    pub fn progress(&self) -> f64 {
        self.plan.as_ref().map_or(0.0, ExecutionPlan::progress)
    }

    pub fn replan_count(&self) -> u32 {
        self.replan_count
    }

    async fn generate_plan(
        &self,
        task: &str,
        analysis: &VisionAnalysis,
    ) -> Result<ExecutionPlan, AgentError> {
        let user = build_plan_user_prompt(task, &analysis.description, &analysis.elements);
        let raw = self.core.complete(PLAN_SYSTEM_PROMPT, user).await?;
        Ok(parse_plan(task, &raw))
    }

    /// Run one step. Only reported failures reach the replanner; device errors end the run.
    async fn execute_step(&self, step: &PlanStep) -> Result<ActionResult, AgentError> {
        if !PLAN_ACTIONS.contains(&step.action_type.as_str()) {
            return Ok(ActionResult::failure(format!(
                "Unknown action type: {}",
                step.action_type
            )));
        }
        Ok(self
            .core
            .actions()
            .call(&step.action_type, &step.parameters)
            .await?)
    }

    /// Plan again from the current screen. Returns whether a non-empty plan came back.
    async fn replan(&mut self, task: &str, failed: &PlanStep) -> Result<bool, AgentError> {
        self.replan_count += 1;
        let context = format!("Step {} failed: {}", failed.index, failed.description);
        let (_, analysis) = self.core.take_screenshot_and_analyze(&context, task).await?;
        let replacement = self
            .generate_plan(&build_replan_task(task, &failed.description), &analysis)
            .await?;

        if replacement.steps.is_empty() {
            return Ok(false);
        }
        if let Some(plan) = self.plan.as_mut() {
            plan.splice(replacement.steps);
        }
        Ok(true)
    }

    async fn run(&mut self, task: &str) -> Result<AgentResult, AgentError> {
        let (_, analysis) = self.core.take_screenshot_and_analyze("", task).await?;
        tracing::info!("Generating execution plan");
        let plan = self.generate_plan(task, &analysis).await?;

        if plan.steps.is_empty() {
            tracing::error!("Failed to generate execution plan");
            return Ok(self
                .core
                .fail_run("Failed to generate execution plan", Some("empty_plan".to_string())));
        }
        tracing::info!(steps = plan.steps.len(), "Plan generated");
        for step in plan.steps() {
            tracing::info!("  {}. {}", step.index, step.description);
        }
        self.plan = Some(plan);

        loop {
            let Some(step) = self.plan.as_ref().and_then(ExecutionPlan::current).cloned() else {
                break;
            };
            if !self.core.has_rounds_left() {
                return Ok(self.core.rounds_exhausted());
            }
            if self.core.is_paused() {
                return Ok(self.core.paused_result());
            }

            let round = self.core.next_round();
            tracing::info!(round, step = step.index, description = %step.description, "Executing step");
            if let Some(current) = self.plan.as_mut().and_then(ExecutionPlan::current_mut) {
                current.mark_running();
            }

            let outcome = self.execute_step(&step).await?;
            self.core.record(
                format!("Step {}: {}", step.index, step.description),
                &outcome,
                None,
            );

            if outcome.success {
                if let Some(plan) = self.plan.as_mut() {
                    if let Some(current) = plan.current_mut() {
                        current.mark_done(outcome);
                    }
                    plan.advance();
                }
                continue;
            }

            tracing::warn!(step = step.index, error = ?outcome.error, "Step failed");
            let error = outcome
                .error
                .clone()
                .unwrap_or_else(|| "step_failed".to_string());
            if let Some(current) = self.plan.as_mut().and_then(ExecutionPlan::current_mut) {
                current.mark_failed(outcome);
            }
            let message = format!("Step {} failed: {}", step.index, step.description);

            if !self.replan_on_failure {
                return Ok(self.core.fail_run(message, Some(error)));
            }
            if self.replan_count >= self.max_replans {
                tracing::error!(max_replans = self.max_replans, "Replanning budget exhausted");
                return Ok(self
                    .core
                    .fail_run(message, Some("max_replans_exceeded".to_string())));
            }

            tracing::info!(
                attempt = self.replan_count + 1,
                max_replans = self.max_replans,
                "Replanning"
            );
            if !self.replan(task, &step).await? {
                tracing::error!(step = step.index, "Replan produced no steps");
                return Ok(self.core.fail_run(message, Some(error)));
            }
        }

        let (screenshot, _) = self.core.take_screenshot_and_analyze("", task).await?;
        Ok(self
            .core
            .complete_run("Plan executed successfully")
            .with_screenshot(screenshot.data))
    }
}

#[async_trait]
impl MobileAgent for PlanExecuteAgent {
    async fn execute(&mut self, task: &str) -> AgentResult {
        self.core.begin();
        self.plan = None;
        self.replan_count = 0;
        let span = tracing::info_span!("plan_execute", run_id = %Uuid::new_v4());
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
