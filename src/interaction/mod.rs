//! Human interaction module: pluggable strategies for asking an operator for input.

mod handler;

pub use handler::{
    CallbackFuture, CallbackInteractionHandler, CliInteractionHandler, ConsoleInput, InputType,
    InteractionError, InteractionHandler, InteractionRequest, InteractionResult, InterruptSignal,
    NoOpInteractionHandler, AFFIRMATIVE_ANSWERS,
};
