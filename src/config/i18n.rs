//! Console messages for the interactive surfaces (CLI prompts, task output).

/// Console message table.
#[derive(Debug, Clone)]
pub struct Messages {
    pub human_input_required: &'static str,
    pub enter_number: &'static str,
    pub input_timeout: &'static str,
    pub starting_task: &'static str,
    pub task_completed: &'static str,
    pub task_failed: &'static str,
    pub steps_executed: &'static str,
    pub variables: &'static str,
    pub connection_failed: &'static str,
    pub connection_successful: &'static str,
    pub interactive_hint: &'static str,
    pub task_prompt: &'static str,
    pub goodbye: &'static str,
    pub stopping: &'static str,
}

/// Chinese messages
pub static MESSAGES_ZH: Messages = Messages {
    human_input_required: "需要人工输入",
    enter_number: "请输入序号",
    input_timeout: "[超时] 未收到输入",
    starting_task: "开始执行任务",
    task_completed: "任务完成",
    task_failed: "任务失败",
    steps_executed: "执行步数",
    variables: "变量",
    connection_failed: "设备连接失败",
    connection_successful: "设备连接成功",
    interactive_hint: "交互模式：输入任务后回车，输入 quit 或 exit 退出。",
    task_prompt: "任务",
    goodbye: "再见！",
    stopping: "正在停止，再按一次 Ctrl-C 立即退出",
};

/// English messages
pub static MESSAGES_EN: Messages = Messages {
    human_input_required: "Human Input Required",
    enter_number: "Enter number",
    input_timeout: "[Timeout] No input received",
    starting_task: "Starting task",
    task_completed: "Task completed",
    task_failed: "Task failed",
    steps_executed: "Steps executed",
    variables: "Variables",
    connection_failed: "Device connection failed",
    connection_successful: "Device connected",
    interactive_hint: "Interactive mode. Type a task and press Enter; 'quit' or 'exit' to leave.",
    task_prompt: "Task",
    goodbye: "Goodbye!",
    stopping: "Stopping after the current step; press Ctrl-C again to quit now",
};

/// Get console messages by language.
///
/// # Arguments
/// * `lang` - Language code, "cn" for Chinese, "en" for English. Unknown codes fall back to English.
pub fn get_messages(lang: &str) -> &'static Messages {
    match lang {
        "cn" | "zh" => &MESSAGES_ZH,
        _ => &MESSAGES_EN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_messages() {
        let zh = get_messages("cn");
        assert_eq!(zh.human_input_required, "需要人工输入");

        let en = get_messages("en");
        assert_eq!(en.human_input_required, "Human Input Required");
        assert_eq!(en.enter_number, "Enter number");
    }

    #[test]
    fn test_unknown_language_falls_back_to_english() {
        assert_eq!(get_messages("fr").task_completed, "Task completed");
    }
}
