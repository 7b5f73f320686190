//! Construction of controllers, interaction handlers and agents by name.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::base::{AgentCore, MobileAgent, DEFAULT_MAX_ROUNDS, DEFAULT_MODEL};
use super::hierarchical::{HierarchicalAgent, DEFAULT_SUB_AGENT_MAX_ROUNDS};
use super::plan_execute::{PlanExecuteAgent, DEFAULT_MAX_REPLANS};
use super::react::ReactAgent;
use crate::actions::DeviceActions;
use crate::device::{
    AdbConfig, AdbController, ControllerConfig, DeviceController, DeviceError, HdcConfig,
    HdcController, Platform,
};
use crate::interaction::{
    CliInteractionHandler, InteractionHandler, InterruptSignal, NoOpInteractionHandler,
};
use crate::model::CompletionService;

/// Strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AgentMode {
    #[default]
    React,
    PlanExecute,
    Hierarchical,
}

impl AgentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentMode::React => "react",
            AgentMode::PlanExecute => "plan_execute",
            AgentMode::Hierarchical => "hierarchical",
        }
    }
}

impl fmt::Display for AgentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "react" => Ok(AgentMode::React),
            "plan_execute" | "plan" => Ok(AgentMode::PlanExecute),
            "hierarchical" => Ok(AgentMode::Hierarchical),
            other => Err(format!("Unknown agent mode: {other}")),
        }
    }
}

/// Strategy knobs understood by [`create_agent`].
#[derive(Debug, Clone)]
pub struct AgentOptions {
    pub mode: AgentMode,
    pub llm_model: String,
    pub vlm_model: String,
    pub max_rounds: u32,
    pub sub_agent_max_rounds: u32,
    pub replan_on_failure: bool,
    pub max_replans: u32,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            mode: AgentMode::React,
            llm_model: DEFAULT_MODEL.to_string(),
            vlm_model: DEFAULT_MODEL.to_string(),
            max_rounds: DEFAULT_MAX_ROUNDS,
            sub_agent_max_rounds: DEFAULT_SUB_AGENT_MAX_ROUNDS,
            replan_on_failure: true,
            max_replans: DEFAULT_MAX_REPLANS,
        }
    }
}

/// Build a controller for `kind` (`adb`/`android` or `hdc`/`harmony`).
pub fn create_controller(
    kind: &str,
    config: ControllerConfig,
    adb_path: &str,
    hdc_path: &str,
) -> Result<Arc<dyn DeviceController>, DeviceError> {
    match kind.parse::<Platform>()? {
        Platform::Android => Ok(Arc::new(AdbController::new(
            AdbConfig::default()
                .with_adb_path(adb_path)
                .with_controller(config),
        ))),
        Platform::Harmony => Ok(Arc::new(HdcController::new(
            HdcConfig::default()
                .with_hdc_path(hdc_path)
                .with_controller(config),
        ))),
        Platform::Ios => Err(DeviceError::Unsupported("ios".to_string())),
    }
}

/// `cli` prompts on the console and gives up when `interrupt` fires; anything else never blocks.
pub fn create_interaction_handler(
    kind: &str,
    lang: &str,
    interrupt: InterruptSignal,
) -> Arc<dyn InteractionHandler> {
    match kind.trim().to_lowercase().as_str() {
        "cli" | "console" => {
            Arc::new(CliInteractionHandler::new(lang).with_interrupt(interrupt))
        }
        _ => Arc::new(NoOpInteractionHandler::new()),
    }
}

/// Build the strategy selected by `options.mode`. Without `vlm`, `llm` also serves vision.
pub fn create_agent(
    actions: Arc<DeviceActions>,
    llm: Arc<dyn CompletionService>,
    vlm: Option<Arc<dyn CompletionService>>,
    options: &AgentOptions,
) -> Box<dyn MobileAgent> {
    let mut core = AgentCore::new(actions, llm)
        .with_llm_model(options.llm_model.as_str())
        .with_vlm_model(options.vlm_model.as_str())
        .with_max_rounds(options.max_rounds);
    if let Some(vlm) = vlm {
        core = core.with_vlm(vlm);
    }
    tracing::debug!(mode = %options.mode, max_rounds = options.max_rounds, "Creating agent");

    match options.mode {
        AgentMode::React => Box::new(ReactAgent::new(core)),
        AgentMode::PlanExecute => Box::new(
            PlanExecuteAgent::new(core)
                .with_replan_on_failure(options.replan_on_failure)
                .with_max_replans(options.max_replans),
        ),
        AgentMode::Hierarchical => Box::new(
            HierarchicalAgent::new(core).with_sub_agent_max_rounds(options.sub_agent_max_rounds),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::base::AgentStatus;
    use crate::interaction::InputType;
    use crate::testing::{Call, MockController, ScriptedCompletion};

    #[test]
    fn test_agent_mode_parse() {
        assert_eq!("react".parse::<AgentMode>(), Ok(AgentMode::React));
        assert_eq!("Plan-Execute".parse::<AgentMode>(), Ok(AgentMode::PlanExecute));
        assert_eq!("hierarchical".parse::<AgentMode>(), Ok(AgentMode::Hierarchical));
        assert!("swarm".parse::<AgentMode>().is_err());
        assert_eq!(AgentMode::PlanExecute.to_string(), "plan_execute");
    }

    #[test]
    fn test_create_controller() {
        let config = ControllerConfig::default().with_device_id("emulator-5554");
        let adb = create_controller("adb", config.clone(), "adb", "hdc").unwrap();
        assert_eq!(adb.platform(), Platform::Android);
        let hdc = create_controller("harmony", config.clone(), "adb", "hdc").unwrap();
        assert_eq!(hdc.platform(), Platform::Harmony);

        assert!(matches!(
            create_controller("ios", config.clone(), "adb", "hdc"),
            Err(DeviceError::Unsupported(_))
        ));
        assert!(create_controller("symbian", config, "adb", "hdc").is_err());
    }

    #[tokio::test]
    async fn test_noop_handler_by_default() {
        let handler = create_interaction_handler("noop", "en", InterruptSignal::never());
        let result = handler
            .request_input("Confirm?", InputType::Confirmation, None, None)
            .await;
        assert!(!result.success());
        assert!(result.cancelled);
    }

    #[tokio::test]
    async fn test_create_agent_uses_options() {
        let mock = Arc::new(MockController::new());
        let actions = Arc::new(
            DeviceActions::new()
                .with_controller(mock.clone())
                .with_tool_delay_ms(0),
        );
        let llm = Arc::new(ScriptedCompletion::new([
            r#"{"type": "press_key", "key": "home"}"#,
            r#"{"type": "complete"}"#,
        ]));
        let vlm = Arc::new(ScriptedCompletion::new(Vec::<String>::new()).with_fallback("{}"));
        let options = AgentOptions {
            max_rounds: 7,
            llm_model: "planner".to_string(),
            vlm_model: "looker".to_string(),
            ..AgentOptions::default()
        };

        let vision: Arc<dyn CompletionService> = vlm.clone();
        let mut agent = create_agent(actions, llm.clone(), Some(vision), &options);
        assert_eq!(agent.core().max_rounds(), 7);

        let result = agent.execute("Go home").await;
        assert!(result.success);
        assert_eq!(agent.status(), AgentStatus::Completed);
        assert_eq!(mock.actions(), vec![Call::PressKey("home".to_string())]);
        assert!(llm.requests().iter().all(|r| r.model == "planner"));
        assert!(vlm.requests().iter().all(|r| r.model == "looker"));
    }
}
