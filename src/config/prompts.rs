//! System prompts for the vision, decision and planning calls.

use chrono::Local;
use serde_json::Value;

/// Vision analyzer role: describe the screen and suggest the next action.
pub static VISION_ANALYSIS_PROMPT: &str = r#"You are a mobile UI analyzer. Analyze the screenshot and provide:
1. A brief description of the current screen state
2. Key UI elements visible (buttons, text fields, lists, etc.)
3. Suggested next action based on the task

Respond in JSON format:
{
    "description": "Brief description of the screen",
    "elements": [{"type": "button", "text": "Submit", "location": "bottom"}],
    "suggested_action": "What action to take next",
    "confidence": 0.0-1.0
}"#;

static DECISION_RULES: &str = r#"You are a GUI action planner operating a mobile phone. Your job is to finish the task.
- If the screen content hasn't loaded, use `wait` to allow time for it to load.
- Do not use `variable_storage` repeatedly.
- Scrolling many times in a row may mean you have reached the bottom of the page.
- If you find yourself repeating the same actions, step back and rethink your approach.
- Before completing, check carefully that the task has been completed fully and accurately.
- For payments, authorizations, deletions, logins, captchas or QR codes, ask the human with `human_interact`.

Coordinates are fractions of the screen (0-1), per-mille values (1-1000) or pixels (>1000)."#;

static DECISION_FORMAT: &str = r#"Choose exactly ONE next action and respond with a single JSON object:
{"type": "<action>", ...parameters, "reason": "why"}

Examples:
{"type": "click", "x": 0.5, "y": 0.3, "reason": "Tap the search box"}
{"type": "input_text", "text": "hello", "press_enter": true}
{"type": "complete", "message": "The message was sent"}
{"type": "fail", "message": "The app requires an account that is not available"}"#;

/// Plan generation: an ordered list of atomic steps.
pub static PLAN_SYSTEM_PROMPT: &str = r#"You are a mobile automation planner. Generate a step-by-step plan to complete the task.

Each step should be a specific action:
- click: Click at a UI element
- long_press: Press and hold a UI element
- input_text: Enter text
- scroll: Scroll the screen
- press_key: Press a key (back, home, enter)
- open_app: Open an application
- wait: Wait for something to load

Respond with a JSON array of steps:
[
    {"description": "Open WeChat app", "action_type": "open_app", "parameters": {"app_name": "微信"}},
    {"description": "Click search button", "action_type": "click", "parameters": {"x": 0.9, "y": 0.05}},
    {"description": "Enter search text", "action_type": "input_text", "parameters": {"text": "hello"}}
]

Keep plans concise (3-10 steps). Each step should be atomic and verifiable."#;

/// Sub-task decomposition: one entry per app.
pub static DECOMPOSE_SYSTEM_PROMPT: &str = r#"You are a mobile task planner. Break down complex tasks into app-level sub-tasks.

Each sub-task should:
1. Focus on a single app
2. Have a clear, achievable objective
3. Be executable independently

When a later sub-task needs a value produced by an earlier one, say so in the objectives:
the earlier sub-task stores it with variable_storage, the later one reads it.

Respond with JSON:
[
    {"app": "Camera", "objective": "Take a photo and save it"},
    {"app": "WeChat", "objective": "Send the saved photo to a contact"}
]

Common apps: Camera, WeChat, Alipay, Settings, Photos, Browser, etc.
Keep sub-tasks high-level (the low-level agent will figure out the clicks)."#;

fn now() -> String {
    Local::now().format("%Y/%m/%d %H:%M:%S").to_string()
}

fn elements_text(elements: &[Value]) -> String {
    if elements.is_empty() {
        "Not specified".to_string()
    } else {
        serde_json::to_string(elements).unwrap_or_default()
    }
}

/// Decision system prompt listing the allowed actions.
///
/// `catalogue` is the rendered action list, one `- name(params): description` per line.
pub fn build_decision_prompt(catalogue: &str) -> String {
    format!(
        "{DECISION_RULES}\n\n## Actions\n{catalogue}\n\
         - complete(message): The task is finished\n\
         - fail(message): The task cannot be finished\n\n{DECISION_FORMAT}"
    )
}

/// User prompt for one decision round.
pub fn build_decision_user_prompt(task: &str, screen: &str, recent: &str) -> String {
    let recent = if recent.is_empty() { "None" } else { recent };
    format!(
        "Current datetime: {}\nTask: {task}\n\nCurrent screen: {screen}\n\nRecent actions:\n{recent}\n\n\
         Decide the next action. Respond with JSON only.",
        now()
    )
}

/// User prompt for plan generation from the current screen.
pub fn build_plan_user_prompt(task: &str, screen: &str, elements: &[Value]) -> String {
    format!(
        "Task: {task}\n\nCurrent screen: {screen}\nVisible elements: {}\n\n\
         Generate a plan to complete this task. Respond with JSON array only.",
        elements_text(elements)
    )
}

/// Task text used when replanning after `failed_step`.
pub fn build_replan_task(task: &str, failed_step: &str) -> String {
    format!("{task} (continuing from failed step: {failed_step})")
}

/// User prompt for app-level decomposition.
pub fn build_decompose_user_prompt(task: &str, screen: &str, variables: &str) -> String {
    let variables = if variables.is_empty() { "None" } else { variables };
    format!(
        "Task: {task}\n\nCurrent screen: {screen}\nCurrent variables: {variables}\n\n\
         Break this task into app-level sub-tasks. Respond with JSON array only."
    )
}
