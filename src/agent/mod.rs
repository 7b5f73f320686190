//! Agent strategies built on a shared core: reactive, plan-execute and hierarchical.

mod base;
mod factory;
mod hierarchical;
mod plan_execute;
mod react;

pub use base::{
    AgentCore, AgentError, AgentResult, AgentStatus, HistoryEntry, MobileAgent, StopHandle,
    VisionAnalysis, DEFAULT_MAX_ROUNDS, DEFAULT_MODEL,
};
pub use factory::{
    create_agent, create_controller, create_interaction_handler, AgentMode, AgentOptions,
};
pub use hierarchical::{
    parse_decomposition, HierarchicalAgent, HierarchicalPlan, SubTask, SubTaskStatus,
    DEFAULT_SUB_AGENT_MAX_ROUNDS,
};
pub use plan_execute::{
    parse_plan, ExecutionPlan, PlanExecuteAgent, PlanStep, StepStatus, DEFAULT_MAX_REPLANS,
    PLAN_ACTIONS,
};
pub use react::{Decision, ReactAgent, DECISION_ACTIONS};
