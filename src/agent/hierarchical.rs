//! Hierarchical strategy: split the task per app and run a reactive sub-agent for each.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::Instrument;
use uuid::Uuid;

use super::base::{AgentCore, AgentError, AgentResult, MobileAgent};
use super::react::ReactAgent;
use crate::actions::ActionResult;
use crate::config::{build_decompose_user_prompt, DECOMPOSE_SYSTEM_PROMPT};
use crate::model::parse_json_array;

/// Default round budget of each sub-agent.
pub const DEFAULT_SUB_AGENT_MAX_ROUNDS: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubTaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// One app-scoped unit of work.
#[derive(Debug, Clone)]
pub struct SubTask {
    /// 1-based position in the plan.
    pub index: usize,
    pub app: String,
    pub objective: String,
    status: SubTaskStatus,
    result: Option<AgentResult>,
    variables_in: BTreeMap<String, String>,
    variables_out: BTreeMap<String, String>,
}

impl SubTask {
    pub fn new(index: usize, app: impl Into<String>, objective: impl Into<String>) -> Self {
        Self {
            index,
            app: app.into(),
            objective: objective.into(),
            status: SubTaskStatus::Pending,
            result: None,
            variables_in: BTreeMap::new(),
            variables_out: BTreeMap::new(),
        }
    }

    pub fn status(&self) -> SubTaskStatus {
        self.status
    }

    pub fn result(&self) -> Option<&AgentResult> {
        self.result.as_ref()
    }

    /// Variable store snapshot taken before the sub-task ran.
    pub fn variables_in(&self) -> &BTreeMap<String, String> {
        &self.variables_in
    }

    /// Keys the sub-task added or changed.
    pub fn variables_out(&self) -> &BTreeMap<String, String> {
        &self.variables_out
    }

    pub fn mark_running(&mut self, variables_in: BTreeMap<String, String>) {
        self.status = SubTaskStatus::Running;
        self.variables_in = variables_in;
    }

    /// Record the sub-agent outcome and the store delta against `variables_in`.
    pub fn finish(&mut self, result: AgentResult, variables_after: &BTreeMap<String, String>) {
        self.status = if result.success {
            SubTaskStatus::Completed
        } else {
            SubTaskStatus::Failed
        };
        self.variables_out = variables_after
            .iter()
            .filter(|(key, value)| self.variables_in.get(*key) != Some(*value))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        self.result = Some(result);
    }

    /// Task text handed to the sub-agent.
    fn prompt(&self) -> String {
        let mut prompt = format!("App: {}\nObjective: {}", self.app, self.objective);
        if !self.variables_in.is_empty() {
            let variables = serde_json::to_string(&self.variables_in).unwrap_or_default();
            prompt.push_str(&format!("\nAvailable variables: {variables}"));
        }
        prompt
    }
}

#[derive(Debug, Clone)]
pub struct HierarchicalPlan {
    pub task: String,
    sub_tasks: Vec<SubTask>,
    current_index: usize,
}

impl HierarchicalPlan {
    pub fn new(task: impl Into<String>, sub_tasks: Vec<SubTask>) -> Self {
        Self {
            task: task.into(),
            sub_tasks,
            current_index: 0,
        }
    }

    pub fn sub_tasks(&self) -> &[SubTask] {
        &self.sub_tasks
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn is_complete(&self) -> bool {
        self.current_index == self.sub_tasks.len()
    }

    /// `None` once every sub-task has been visited.
    pub fn current_sub_task(&self) -> Option<&SubTask> {
        self.sub_tasks.get(self.current_index)
    }

    fn current_sub_task_mut(&mut self) -> Option<&mut SubTask> {
        self.sub_tasks.get_mut(self.current_index)
    }

    pub fn advance(&mut self) {
        if self.current_index < self.sub_tasks.len() {
            self.current_index += 1;
        }
    }
}

/// Parse the first JSON array of `{app, objective}` objects.
pub fn parse_decomposition(task: &str, raw: &str) -> HierarchicalPlan {
    let items = parse_json_array(raw).unwrap_or_else(|| {
        tracing::warn!(response = %raw, "Decomposition response has no JSON array");
        Vec::new()
    });

    let sub_tasks = items
        .iter()
        .filter_map(Value::as_object)
        .enumerate()
        .map(|(i, item)| sub_task_from_json(i + 1, item))
        .collect();
    HierarchicalPlan::new(task, sub_tasks)
}

fn sub_task_from_json(index: usize, item: &Map<String, Value>) -> SubTask {
    let text = |key: &str| item.get(key).and_then(Value::as_str).map(str::to_string);
    SubTask::new(
        index,
        text("app").unwrap_or_else(|| "Unknown".to_string()),
        text("objective").unwrap_or_else(|| format!("Sub-task {index}")),
    )
}

pub struct HierarchicalAgent {
    core: AgentCore,
    sub_agent_max_rounds: u32,
    plan: Option<HierarchicalPlan>,
}

impl HierarchicalAgent {
    pub fn new(core: AgentCore) -> Self {
        Self {
            core,
            sub_agent_max_rounds: DEFAULT_SUB_AGENT_MAX_ROUNDS,
            plan: None,
        }
    }

    pub fn with_sub_agent_max_rounds(mut self, max_rounds: u32) -> Self {
        self.sub_agent_max_rounds = max_rounds;
        self
    }

    pub fn plan(&self) -> Option<&HierarchicalPlan> {
        self.plan.as_ref()
    }

    async fn decompose(&self, task: &str) -> Result<HierarchicalPlan, AgentError> {
        let (_, analysis) = self.core.take_screenshot_and_analyze("", task).await?;
        let variables = self.core.actions().variables();
        let variables = if variables.is_empty() {
            String::new()
        } else {
            serde_json::to_string(&variables).unwrap_or_default()
        };
        let user = build_decompose_user_prompt(task, &analysis.description, &variables);
        let raw = self.core.complete(DECOMPOSE_SYSTEM_PROMPT, user).await?;
        Ok(parse_decomposition(task, &raw))
    }

    async fn run(&mut self, task: &str) -> Result<AgentResult, AgentError> {
        tracing::info!("Decomposing task");
        let plan = self.decompose(task).await?;
        if plan.sub_tasks.is_empty() {
            tracing::error!("Failed to generate hierarchical plan");
            return Ok(self
                .core
                .fail_run("Failed to generate hierarchical plan", Some("empty_plan".to_string())));
        }
        tracing::info!(sub_tasks = plan.sub_tasks.len(), "Task decomposed");
        for sub_task in plan.sub_tasks() {
            tracing::info!("  {}. [{}] {}", sub_task.index, sub_task.app, sub_task.objective);
        }
        self.plan = Some(plan);

        loop {
            if self.plan.as_ref().map_or(true, HierarchicalPlan::is_complete) {
                break;
            }
            if !self.core.has_rounds_left() {
                return Ok(self.core.rounds_exhausted());
            }
            if self.core.is_paused() {
                return Ok(self.core.paused_result());
            }
            let Some(sub_task) = self.plan.as_mut().and_then(HierarchicalPlan::current_sub_task_mut)
            else {
                break;
            };

            self.core.next_round();
            sub_task.mark_running(self.core.actions().variables());
            let index = sub_task.index;
            let objective = sub_task.objective.clone();
            let prompt = sub_task.prompt();
            tracing::info!(index, app = %sub_task.app, objective = %objective, "Running sub-task");

            let mut sub_agent = ReactAgent::new(self.core.child(self.sub_agent_max_rounds));
            let result = sub_agent.execute(&prompt).await;

            let outcome = if result.success {
                ActionResult::success(result.message.clone())
            } else {
                ActionResult::failure(result.error.clone().unwrap_or_else(|| result.message.clone()))
            };
            self.core
                .record(format!("Sub-task {index}: {objective}"), &outcome, None);

            let variables = self.core.actions().variables();
            let success = result.success;
            let error = result.error.clone().or_else(|| Some(result.message.clone()));

            let Some(plan) = self.plan.as_mut() else {
                break;
            };
            if let Some(sub_task) = plan.current_sub_task_mut() {
                sub_task.finish(result, &variables);
                if !sub_task.variables_out.is_empty() {
                    tracing::debug!(index, variables_out = ?sub_task.variables_out, "Sub-task produced variables");
                }
            }

            if !success {
                tracing::error!(index, error = ?error, "Sub-task failed");
                return Ok(self
                    .core
                    .fail_run(format!("Sub-task {index} failed: {objective}"), error));
            }
            plan.advance();
        }

        let (screenshot, _) = self.core.take_screenshot_and_analyze("", task).await?;
        Ok(self
            .core
            .complete_run("Hierarchical plan executed successfully")
            .with_screenshot(screenshot.data))
    }
}

#[async_trait]
impl MobileAgent for HierarchicalAgent {
    async fn execute(&mut self, task: &str) -> AgentResult {
        self.core.begin();
        self.plan = None;
        let span = tracing::info_span!("hierarchical", run_id = %Uuid::new_v4());
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
