// Copyright 2025 Zhipu AI (Original Python implementation)
// Copyright 2025 ModerRAS (Rust implementation)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Mobile Agent
//!
//! Vision-driven agent for automating Android and HarmonyOS devices.
//!
//! A multimodal model looks at device screenshots and picks actions, which are
//! executed over `adb` or `hdc` through a single action facade. Three strategies
//! share the same core: a reactive observe/decide/act loop, plan-then-execute with
//! replanning, and a hierarchical mode that splits a task into per-app sub-tasks
//! and hands values between them through a variable store.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mobile_agent::agent::{create_agent, create_controller, AgentOptions};
//! use mobile_agent::device::ControllerConfig;
//! use mobile_agent::{DeviceActions, ModelClient, ModelConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let controller = create_controller("adb", ControllerConfig::default(), "adb", "hdc")?;
//!     let actions = Arc::new(DeviceActions::new().with_controller(controller));
//!     let llm = Arc::new(ModelClient::new(ModelConfig::default()));
//!
//!     let mut agent = create_agent(actions, llm, None, &AgentOptions::default());
//!     let result = agent.execute("打开微信").await;
//!
//!     println!("Task result: {}", result.message);
//!     Ok(())
//! }
//! ```

pub mod actions;
pub mod agent;
pub mod config;
pub mod device;
pub mod interaction;
pub mod model;
pub mod settings;

#[cfg(test)]
mod testing;

pub use actions::{ActionError, ActionResult, CoordinateSystem, DeviceActions};
pub use agent::{
    AgentError, AgentMode, AgentOptions, AgentResult, AgentStatus, HierarchicalAgent, MobileAgent,
    PlanExecuteAgent, ReactAgent, StopHandle,
};
pub use config::AppMapper;
pub use device::{AdbController, DeviceController, DeviceError, HdcController, Platform};
pub use interaction::{InteractionHandler, InteractionResult};
pub use model::{CompletionService, ModelClient, ModelConfig};
pub use settings::AppSettings;
