//! Mobile Agent - vision-driven Android / HarmonyOS automation
//!
//! This is the CLI entry point for the mobile-agent tool.
//! Run with: cargo run --bin mobile-agent -- "open WeChat and ..."

use anyhow::Context;
use mobile_agent::agent::{create_agent, create_controller, create_interaction_handler, MobileAgent};
use mobile_agent::config::{get_messages, Messages};
use mobile_agent::interaction::{ConsoleInput, InterruptSignal};
use mobile_agent::model::{CompletionService, ModelClient};
use mobile_agent::{AgentResult, AppSettings, DeviceActions};
use std::env;
use std::io::{self, Write};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Exit status after a second Ctrl-C.
const INTERRUPTED_EXIT_CODE: i32 = 130;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (ignore errors if file doesn't exist)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // The only SIGINT listener in the process; everything else watches `interrupt`.
    let (presses, interrupt) = InterruptSignal::channel();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            presses.send_modify(|n| *n += 1);
        }
    });

    let args: Vec<String> = env::args().skip(1).collect();
    let settings = AppSettings::from_env();
    let messages = get_messages(&settings.lang);
    let options = settings.agent_options();

    let controller = create_controller(
        &settings.controller,
        settings.controller_config(),
        &settings.adb_path,
        &settings.hdc_path,
    )
    .with_context(|| format!("Cannot create `{}` controller", settings.controller))?;
    let handler =
        create_interaction_handler(&settings.interaction, &settings.lang, interrupt.clone());

    let actions = Arc::new(
        DeviceActions::new()
            .with_controller(controller.clone())
            .with_interaction_handler(handler)
            .with_app_mapper(settings.app_mapper())
            .with_tool_delay_ms(settings.tool_delay_ms),
    );

    let llm: Arc<dyn CompletionService> = Arc::new(ModelClient::new(settings.llm_config()));
    let vlm = settings
        .vlm_config()
        .map(|config| Arc::new(ModelClient::new(config)) as Arc<dyn CompletionService>);

    println!("🤖 Mobile Agent");
    println!("================================================");
    println!("Controller: {} ({})", settings.controller, controller.platform());
    println!("Strategy: {}", options.mode);
    println!("Model: {} @ {}", settings.model_name, settings.base_url);
    if !settings.vlm_base_url.is_empty() {
        println!("Vision model: {} @ {}", options.vlm_model, settings.vlm_base_url);
    }
    if !settings.device_id.is_empty() {
        println!("Device: {}", settings.device_id);
    }
    println!("================================================\n");

    let connection = actions.check_connection().await?;
    let connected = connection
        .get("connected")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    if !connected {
        eprintln!("❌ {}", messages.connection_failed);
        anyhow::bail!("{}", messages.connection_failed);
    }
    match connection.get("screen_size") {
        Some(size) => println!("✅ {} {}\n", messages.connection_successful, size),
        None => println!("✅ {}\n", messages.connection_successful),
    }

    let mut agent = create_agent(actions, llm, vlm, &options);

    if !args.is_empty() {
        let task = args.join(" ");
        run_task(agent.as_mut(), &task, messages, &interrupt).await;
        return Ok(());
    }

    println!("{}\n", messages.interactive_hint);
    let input = ConsoleInput::stdin();
    loop {
        print!("📝 {}: ", messages.task_prompt);
        io::stdout().flush()?;

        let mut idle = interrupt.clone();
        let line = tokio::select! {
            line = input.next_line() => line,
            _ = idle.next() => {
                println!("\n{} 👋", messages.goodbye);
                break;
            }
        };
        let Some(line) = line else {
            break;
        };
        let task = line.trim();

        if task.is_empty() {
            continue;
        }
        if task == "quit" || task == "exit" {
            println!("{} 👋", messages.goodbye);
            break;
        }

        run_task(agent.as_mut(), task, messages, &interrupt).await;
    }

    Ok(())
}

/// Run one task. The first Ctrl-C pauses the agent at its next round, the second exits.
async fn run_task(
    agent: &mut dyn MobileAgent,
    task: &str,
    messages: &Messages,
    interrupt: &InterruptSignal,
) {
    println!("▶️ {}: {}\n", messages.starting_task, task);
    let stop = agent.stop_handle();
    let mut interrupt = interrupt.clone();
    let mut stopping = false;

    let mut run = agent.execute(task);
    let result = loop {
        tokio::select! {
            result = &mut run => break result,
            _ = interrupt.next() => {
                if stopping {
                    std::process::exit(INTERRUPTED_EXIT_CODE);
                }
                stopping = true;
                stop.stop();
                println!("\n⏸ {}", messages.stopping);
            }
        }
    };
    print_summary(&result, messages);
}

fn print_summary(result: &AgentResult, messages: &Messages) {
    if result.success {
        println!("\n✅ {}: {}", messages.task_completed, result.message);
    } else {
        println!("\n❌ {}: {}", messages.task_failed, result.message);
        if let Some(error) = &result.error {
            println!("   {error}");
        }
    }
    println!("{}: {}", messages.steps_executed, result.steps_executed);
    if !result.variables.is_empty() {
        println!("{}:", messages.variables);
        for (key, value) in &result.variables {
            println!("  {key} = {value}");
        }
    }
    println!();
}
