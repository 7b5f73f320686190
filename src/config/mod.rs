//! Configuration module: app map, console messages and model prompts.

mod apps;
mod i18n;
mod prompts;

pub use apps::{
    AndroidAppConfig, AppConfig, AppMapError, AppMapper, HarmonyAppConfig, IosAppConfig,
};
pub use i18n::{get_messages, Messages, MESSAGES_EN, MESSAGES_ZH};
pub use prompts::{
    build_decision_prompt, build_decision_user_prompt, build_decompose_user_prompt,
    build_plan_user_prompt, build_replan_task, DECOMPOSE_SYSTEM_PROMPT, PLAN_SYSTEM_PROMPT,
    VISION_ANALYSIS_PROMPT,
};
