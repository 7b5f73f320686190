//! Human-in-the-loop input strategies.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use std::future::Future;
use std::io::{self, BufRead, Write};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, warn};

use crate::config::{get_messages, Messages};

/// Affirmative answers accepted by [`InteractionHandler::confirm`].
pub const AFFIRMATIVE_ANSWERS: &[&str] = &["y", "yes", "true", "1", "确认", "是"];

/// Kind of answer expected from the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputType {
    Text,
    Confirmation,
    Choice,
}

/// Outcome of one human-input request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InteractionResult {
    pub value: Option<String>,
    pub cancelled: bool,
    pub timed_out: bool,
}

impl InteractionResult {
    pub fn answered(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            ..Default::default()
        }
    }

    pub fn cancelled() -> Self {
        Self {
            cancelled: true,
            ..Default::default()
        }
    }

    pub fn timed_out() -> Self {
        Self {
            timed_out: true,
            ..Default::default()
        }
    }

    /// An answer was given, and the request was neither cancelled nor timed out.
    pub fn success(&self) -> bool {
        !self.cancelled && !self.timed_out && self.value.is_some()
    }
}

/// Errors a callback may report. Both are folded into an [`InteractionResult`].
#[derive(Error, Debug)]
pub enum InteractionError {
    #[error("Interaction timed out")]
    Timeout,
    #[error("Interaction failed: {0}")]
    Failed(String),
}

/// Owned copy of a request, handed to callbacks.
#[derive(Debug, Clone)]
pub struct InteractionRequest {
    pub prompt: String,
    pub input_type: InputType,
    pub choices: Vec<String>,
    pub timeout: Option<Duration>,
}

/// Requests input from a human operator.
#[async_trait]
pub trait InteractionHandler: Send + Sync {
    async fn request_input(
        &self,
        prompt: &str,
        input_type: InputType,
        choices: Option<&[String]>,
        timeout: Option<Duration>,
    ) -> InteractionResult;

    /// Ask a yes/no question. Anything but an affirmative answer is `false`.
    async fn confirm(&self, prompt: &str, timeout: Option<Duration>) -> bool {
        let result = self
            .request_input(prompt, InputType::Confirmation, None, timeout)
            .await;
        match result.value {
            Some(ref value) if result.success() => {
                let answer = value.trim().to_lowercase();
                AFFIRMATIVE_ANSWERS.contains(&answer.as_str())
            }
            _ => false,
        }
    }
}

/// Build the console prompt for a request.
pub(crate) fn format_prompt(
    messages: &Messages,
    prompt: &str,
    input_type: InputType,
    choices: &[String],
) -> String {
    let mut display = format!("\n[{}] {}", messages.human_input_required, prompt);
    match input_type {
        InputType::Confirmation => display.push_str(" (y/n)"),
        InputType::Choice if !choices.is_empty() => {
            display.push('\n');
            for (i, choice) in choices.iter().enumerate() {
                display.push_str(&format!("  {}. {}\n", i + 1, choice));
            }
            display.push_str(messages.enter_number);
        }
        _ => {}
    }
    display.push_str(": ");
    display
}

/// Map a 1-based numeric answer onto the choice list; anything else is kept as typed.
pub(crate) fn resolve_choice(value: &str, choices: &[String]) -> String {
    let value = value.trim();
    value
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|idx| choices.get(idx))
        .cloned()
        .unwrap_or_else(|| value.to_string())
}

/// Shared source of operator lines.
///
/// Clones read from the same queue. A waiter that gives up leaves the next line
/// queued for whoever reads after it.
#[derive(Clone)]
pub struct ConsoleInput {
    lines: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
}

static STDIN: Lazy<ConsoleInput> = Lazy::new(|| {
    let (tx, input) = ConsoleInput::channel();
    let spawned = std::thread::Builder::new()
        .name("stdin-lines".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to read stdin");
                        break;
                    }
                }
            }
        });
    if let Err(e) = spawned {
        warn!(error = %e, "cannot start stdin reader");
    }
    input
});

impl ConsoleInput {
    /// The process-wide stdin reader, started on first use.
    pub fn stdin() -> Self {
        STDIN.clone()
    }

    /// A line source fed by the returned sender. Dropping the sender is end of input.
    pub fn channel() -> (mpsc::UnboundedSender<String>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        let input = Self {
            lines: Arc::new(Mutex::new(rx)),
        };
        (tx, input)
    }

    /// Next line, or `None` at end of input. Cancel-safe.
    pub async fn next_line(&self) -> Option<String> {
        self.lines.lock().await.recv().await
    }
}

/// Operator interrupts (Ctrl-C presses), broadcast by whoever owns the signal.
#[derive(Clone)]
pub struct InterruptSignal {
    presses: watch::Receiver<u64>,
}

impl InterruptSignal {
    pub fn channel() -> (watch::Sender<u64>, Self) {
        let (tx, presses) = watch::channel(0);
        (tx, Self { presses })
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        Self::channel().1
    }

    /// Resolve on the next press after this call. Pending forever once the sender is gone.
    pub async fn next(&mut self) {
        self.presses.borrow_and_update();
        if self.presses.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Console handler. Lines come from a [`ConsoleInput`] so a timed-out request
/// never swallows the operator's next answer.
pub struct CliInteractionHandler {
    messages: &'static Messages,
    /// `None` reads from [`ConsoleInput::stdin`].
    input: Option<ConsoleInput>,
    interrupt: InterruptSignal,
}

impl Default for CliInteractionHandler {
    fn default() -> Self {
        Self::new("en")
    }
}

impl CliInteractionHandler {
    pub fn new(lang: &str) -> Self {
        Self {
            messages: get_messages(lang),
            input: None,
            interrupt: InterruptSignal::never(),
        }
    }

    pub fn with_input(mut self, input: ConsoleInput) -> Self {
        self.input = Some(input);
        self
    }

    /// Cancel pending prompts when the signal fires.
    pub fn with_interrupt(mut self, interrupt: InterruptSignal) -> Self {
        self.interrupt = interrupt;
        self
    }
}

#[async_trait]
impl InteractionHandler for CliInteractionHandler {
    async fn request_input(
        &self,
        prompt: &str,
        input_type: InputType,
        choices: Option<&[String]>,
        timeout: Option<Duration>,
    ) -> InteractionResult {
        let choices = choices.unwrap_or_default();
        let display = format_prompt(self.messages, prompt, input_type, choices);
        let mut stdout = io::stdout();
        if let Err(e) = stdout.write_all(display.as_bytes()).and_then(|_| stdout.flush()) {
            warn!(error = %e, "failed to write prompt");
        }

        let input = self.input.clone().unwrap_or_else(ConsoleInput::stdin);
        let mut interrupt = self.interrupt.clone();
        let read = async {
            match timeout {
                Some(limit) => tokio::time::timeout(limit, input.next_line()).await.ok(),
                None => Some(input.next_line().await),
            }
        };
        let line = tokio::select! {
            line = read => line,
            _ = interrupt.next() => {
                debug!("interrupted while waiting for operator input");
                return InteractionResult::cancelled();
            }
        };

        match line {
            None => {
                println!("\n{}", self.messages.input_timeout);
                InteractionResult::timed_out()
            }
            Some(Some(line)) => {
                let value = if input_type == InputType::Choice && !choices.is_empty() {
                    resolve_choice(&line, choices)
                } else {
                    line.trim().to_string()
                };
                InteractionResult::answered(value)
            }
            Some(None) => InteractionResult::cancelled(),
        }
    }
}

/// Boxed future returned by interaction callbacks.
pub type CallbackFuture =
    Pin<Box<dyn Future<Output = Result<Option<String>, InteractionError>> + Send>>;

type Callback = Box<dyn Fn(InteractionRequest) -> CallbackFuture + Send + Sync>;

/// Forwards requests to caller-supplied code (GUI bridge, chat channel, test harness).
///
/// `Ok(None)` and callback errors map to cancelled; [`InteractionError::Timeout`]
/// or exceeding the request timeout maps to timed out.
pub struct CallbackInteractionHandler {
    callback: Callback,
}

impl CallbackInteractionHandler {
    /// Wrap an async callback.
    pub fn new<F, Fut>(callback: F) -> Self
    where
        F: Fn(InteractionRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<String>, InteractionError>> + Send + 'static,
    {
        Self {
            callback: Box::new(move |request| -> CallbackFuture { Box::pin(callback(request)) }),
        }
    }

    /// Wrap a synchronous callback.
    pub fn from_sync<F>(callback: F) -> Self
    where
        F: Fn(&InteractionRequest) -> Result<Option<String>, InteractionError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            callback: Box::new(move |request| -> CallbackFuture {
                let result = callback(&request);
                Box::pin(async move { result })
            }),
        }
    }
}

#[async_trait]
impl InteractionHandler for CallbackInteractionHandler {
    async fn request_input(
        &self,
        prompt: &str,
        input_type: InputType,
        choices: Option<&[String]>,
        timeout: Option<Duration>,
    ) -> InteractionResult {
        let request = InteractionRequest {
            prompt: prompt.to_string(),
            input_type,
            choices: choices.map(<[String]>::to_vec).unwrap_or_default(),
            timeout,
        };

        let pending = (self.callback)(request);
        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, pending).await {
                Ok(outcome) => outcome,
                Err(_) => Err(InteractionError::Timeout),
            },
            None => pending.await,
        };

        match outcome {
            Ok(Some(value)) => InteractionResult::answered(value),
            Ok(None) => InteractionResult::cancelled(),
            Err(InteractionError::Timeout) => InteractionResult::timed_out(),
            Err(e) => {
                debug!(error = %e, "interaction callback failed");
                InteractionResult::cancelled()
            }
        }
    }
}

/// Handler for unattended runs: answers with a fixed default, or cancels.
#[derive(Debug, Clone, Default)]
pub struct NoOpInteractionHandler {
    default_value: Option<String>,
}

impl NoOpInteractionHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default(value: impl Into<String>) -> Self {
        Self {
            default_value: Some(value.into()),
        }
    }
}

#[async_trait]
impl InteractionHandler for NoOpInteractionHandler {
    async fn request_input(
        &self,
        _prompt: &str,
        _input_type: InputType,
        _choices: Option<&[String]>,
        _timeout: Option<Duration>,
    ) -> InteractionResult {
        match &self.default_value {
            Some(value) => InteractionResult::answered(value.clone()),
            None => InteractionResult::cancelled(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MESSAGES_EN;

    fn choices() -> Vec<String> {
        vec!["Camera".to_string(), "Gallery".to_string()]
    }

    #[test]
    fn test_result_success() {
        assert!(InteractionResult::answered("ok").success());
        assert!(InteractionResult::answered("").success());
        assert!(!InteractionResult::cancelled().success());
        assert!(!InteractionResult::timed_out().success());
        assert!(!InteractionResult::default().success());
    }

    #[test]
    fn test_format_prompt() {
        assert_eq!(
            format_prompt(&MESSAGES_EN, "Enter code", InputType::Text, &[]),
            "\n[Human Input Required] Enter code: "
        );
        assert_eq!(
            format_prompt(&MESSAGES_EN, "Proceed?", InputType::Confirmation, &[]),
            "\n[Human Input Required] Proceed? (y/n): "
        );
        assert_eq!(
            format_prompt(&MESSAGES_EN, "Pick one", InputType::Choice, &choices()),
            "\n[Human Input Required] Pick one\n  1. Camera\n  2. Gallery\nEnter number: "
        );
    }

    #[test]
    fn test_resolve_choice() {
        assert_eq!(resolve_choice("2\n", &choices()), "Gallery");
        assert_eq!(resolve_choice("0", &choices()), "0");
        assert_eq!(resolve_choice("3", &choices()), "3");
        assert_eq!(resolve_choice(" Files ", &choices()), "Files");
    }

    #[tokio::test]
    async fn test_noop_handler() {
        let handler = NoOpInteractionHandler::new();
        let result = handler.request_input("x", InputType::Text, None, None).await;
        assert!(result.cancelled);
        assert!(!result.success());

        let handler = NoOpInteractionHandler::with_default("42");
        let result = handler.request_input("x", InputType::Text, None, None).await;
        assert_eq!(result.value.as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn test_confirm_vocabulary() {
        for answer in ["y", "YES", "true", "1", "确认", "是"] {
            let handler = NoOpInteractionHandler::with_default(answer);
            assert!(handler.confirm("ok?", None).await, "{answer} should confirm");
        }
        for answer in ["n", "no", "maybe", ""] {
            let handler = NoOpInteractionHandler::with_default(answer);
            assert!(!handler.confirm("ok?", None).await, "{answer} should not confirm");
        }
        assert!(!NoOpInteractionHandler::new().confirm("ok?", None).await);
    }

    #[tokio::test]
    async fn test_callback_handler_outcomes() {
        let handler = CallbackInteractionHandler::from_sync(|request| {
            Ok(Some(format!("echo:{}", request.prompt)))
        });
        let result = handler.request_input("hi", InputType::Text, None, None).await;
        assert_eq!(result.value.as_deref(), Some("echo:hi"));

        let handler = CallbackInteractionHandler::from_sync(|_| Ok(None));
        assert!(handler.request_input("hi", InputType::Text, None, None).await.cancelled);

        let handler =
            CallbackInteractionHandler::from_sync(|_| Err(InteractionError::Failed("boom".into())));
        assert!(handler.request_input("hi", InputType::Text, None, None).await.cancelled);

        let handler = CallbackInteractionHandler::from_sync(|_| Err(InteractionError::Timeout));
        assert!(handler.request_input("hi", InputType::Text, None, None).await.timed_out);
    }

    #[tokio::test]
    async fn test_async_callback_receives_choices() {
        let handler = CallbackInteractionHandler::new(|request: InteractionRequest| async move {
            Ok(request.choices.last().cloned())
        });
        let options = choices();
        let result = handler
            .request_input("pick", InputType::Choice, Some(&options), None)
            .await;
        assert_eq!(result.value.as_deref(), Some("Gallery"));
    }

    #[tokio::test]
    async fn test_async_callback_timeout() {
        let handler = CallbackInteractionHandler::new(|_request: InteractionRequest| async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Some("late".to_string()))
        });
        let result = handler
            .request_input("wait", InputType::Text, None, Some(Duration::from_millis(50)))
            .await;
        assert!(result.timed_out);
        assert!(result.value.is_none());
    }

    fn console(lang: &str) -> (mpsc::UnboundedSender<String>, CliInteractionHandler) {
        let (tx, input) = ConsoleInput::channel();
        (tx, CliInteractionHandler::new(lang).with_input(input))
    }

    #[tokio::test]
    async fn test_cli_handler_reads_lines() {
        let (tx, handler) = console("en");
        tx.send("  hello ".to_string()).unwrap();
        tx.send("1".to_string()).unwrap();

        let result = handler.request_input("say", InputType::Text, None, None).await;
        assert_eq!(result.value.as_deref(), Some("hello"));

        let options = choices();
        let result = handler
            .request_input("pick", InputType::Choice, Some(&options), None)
            .await;
        assert_eq!(result.value.as_deref(), Some("Camera"));
    }

    #[tokio::test]
    async fn test_cli_handler_end_of_input() {
        let (tx, handler) = console("en");
        drop(tx);
        let result = handler.request_input("say", InputType::Text, None, None).await;
        assert!(result.cancelled);
    }

    #[tokio::test]
    async fn test_line_after_timeout_reaches_next_request() {
        let (tx, handler) = console("en");

        let result = handler
            .request_input("code", InputType::Text, None, Some(Duration::from_millis(50)))
            .await;
        assert!(result.timed_out);

        let sender = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            tx.send("1234".to_string()).unwrap();
            tx
        });
        let result = handler
            .request_input("code", InputType::Text, None, Some(Duration::from_secs(5)))
            .await;
        assert_eq!(result.value.as_deref(), Some("1234"));
        assert!(!result.timed_out);
        drop(sender.await.unwrap());
    }

    #[tokio::test]
    async fn test_console_input_shared_between_readers() {
        let (tx, input) = ConsoleInput::channel();
        let handler = CliInteractionHandler::new("en").with_input(input.clone());

        tx.send("open settings".to_string()).unwrap();
        tx.send("y".to_string()).unwrap();

        assert_eq!(input.next_line().await.as_deref(), Some("open settings"));
        assert!(handler.confirm("Proceed?", None).await);
    }

    #[tokio::test]
    async fn test_interrupt_cancels_prompt() {
        let (tx, handler) = console("en");
        let (presses, interrupt) = InterruptSignal::channel();
        let handler = handler.with_interrupt(interrupt);

        let pressed = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            presses.send_modify(|n| *n += 1);
            presses
        });
        let result = handler.request_input("say", InputType::Text, None, None).await;
        assert!(result.cancelled);
        let _presses = pressed.await.unwrap();

        // The line typed afterwards is still delivered.
        tx.send("later".to_string()).unwrap();
        let result = handler.request_input("say", InputType::Text, None, None).await;
        assert_eq!(result.value.as_deref(), Some("later"));
    }

    #[tokio::test]
    async fn test_interrupt_before_request_is_ignored() {
        let (tx, handler) = console("en");
        let (presses, interrupt) = InterruptSignal::channel();
        let handler = handler.with_interrupt(interrupt);

        presses.send_modify(|n| *n += 1);
        tx.send("ok".to_string()).unwrap();
        let result = handler.request_input("say", InputType::Text, None, None).await;
        assert_eq!(result.value.as_deref(), Some("ok"));
    }
}
