//! Completion service module: the LLM/VLM seam used by agents.

mod client;
mod extract;

pub use client::{
    CompletionRequest, CompletionService, ImageData, MessageBuilder, ModelClient, ModelConfig,
    ModelError, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_SECS,
};
pub use extract::{extract_json_array, extract_json_object, parse_json_array, parse_json_object};
