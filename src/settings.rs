//! Settings for the `mobile-agent` binary.
//! Persisted in the platform-specific config directory via `directories::ProjectDirs`,
//! with environment variables layered on top.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::actions::DEFAULT_TOOL_DELAY_MS;
use crate::agent::{
    AgentMode, AgentOptions, DEFAULT_MAX_REPLANS, DEFAULT_MAX_ROUNDS, DEFAULT_MODEL,
    DEFAULT_SUB_AGENT_MAX_ROUNDS,
};
use crate::config::AppMapper;
use crate::device::{ControllerConfig, DEFAULT_COMMAND_TIMEOUT_MS, DEFAULT_RETRY_COUNT};
use crate::model::{ModelConfig, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_SECS};

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Cannot determine config directory")]
    NoConfigDir,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to serialize settings: {0}")]
    Json(#[from] serde_json::Error),
}

/// Application settings that can be saved and loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Controller kind ("adb" or "hdc")
    pub controller: String,
    /// Device serial / connect key (empty: the only attached device)
    pub device_id: String,
    pub adb_path: String,
    pub hdc_path: String,
    /// Timeout of every bridge command in milliseconds
    pub command_timeout_ms: u64,
    /// Connectivity probes made before giving up
    pub retry_count: u32,
    /// Settle delay after UI actions in milliseconds
    pub tool_delay_ms: u64,
    /// Strategy ("react", "plan_execute" or "hierarchical")
    pub agent_mode: String,
    pub max_rounds: u32,
    pub sub_agent_max_rounds: u32,
    pub replan_on_failure: bool,
    pub max_replans: u32,
    /// Interaction handler ("cli" or "noop")
    pub interaction: String,
    /// App map YAML overriding the bundled one (empty: bundled)
    pub app_map_path: String,
    /// Language model API base URL
    pub base_url: String,
    pub api_key: String,
    pub model_name: String,
    /// Vision model API base URL (empty: the language model serves vision too)
    pub vlm_base_url: String,
    pub vlm_api_key: String,
    pub vlm_model_name: String,
    /// Language code ("cn" or "en")
    pub lang: String,
    /// Maximum retries for model requests
    pub max_retries: u32,
    /// Retry delay in seconds
    pub retry_delay: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            controller: "adb".to_string(),
            device_id: String::new(),
            adb_path: "adb".to_string(),
            hdc_path: "hdc".to_string(),
            command_timeout_ms: DEFAULT_COMMAND_TIMEOUT_MS,
            retry_count: DEFAULT_RETRY_COUNT,
            tool_delay_ms: DEFAULT_TOOL_DELAY_MS,
            agent_mode: AgentMode::React.to_string(),
            max_rounds: DEFAULT_MAX_ROUNDS,
            sub_agent_max_rounds: DEFAULT_SUB_AGENT_MAX_ROUNDS,
            replan_on_failure: true,
            max_replans: DEFAULT_MAX_REPLANS,
            interaction: "cli".to_string(),
            app_map_path: String::new(),
            base_url: "http://localhost:8000/v1".to_string(),
            api_key: "EMPTY".to_string(),
            model_name: DEFAULT_MODEL.to_string(),
            vlm_base_url: String::new(),
            vlm_api_key: String::new(),
            vlm_model_name: String::new(),
            lang: "cn".to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY_SECS,
        }
    }
}

fn parse_or<T: FromStr>(name: &str, raw: &str, fallback: T) -> T {
    raw.trim().parse().unwrap_or_else(|_| {
        tracing::warn!(name, value = raw, "Ignoring unparsable setting");
        fallback
    })
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl AppSettings {
    /// Get the config directory path.
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "moderras", "mobile-agent")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the settings file path.
    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("settings.json"))
    }

    /// Load settings from the config file, falling back to defaults.
    pub fn load() -> Self {
        Self::settings_path()
            .and_then(|path| fs::read_to_string(path).ok())
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default()
    }

    /// Saved settings with the process environment applied.
    pub fn from_env() -> Self {
        let mut settings = Self::load();
        settings.apply_env(|name| env::var(name).ok());
        settings
    }

    /// Override fields from `lookup(VAR)`. Unset or unparsable values keep the current one.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let text = |name: &str, field: &mut String| {
            if let Some(value) = lookup(name) {
                *field = value;
            }
        };
        text("MOBILE_CONTROLLER", &mut self.controller);
        text("MOBILE_DEVICE_ID", &mut self.device_id);
        text("MOBILE_ADB_PATH", &mut self.adb_path);
        text("MOBILE_HDC_PATH", &mut self.hdc_path);
        text("MOBILE_AGENT_MODE", &mut self.agent_mode);
        text("MOBILE_INTERACTION", &mut self.interaction);
        text("MOBILE_APP_MAP", &mut self.app_map_path);
        text("MODEL_BASE_URL", &mut self.base_url);
        text("MODEL_API_KEY", &mut self.api_key);
        text("MODEL_NAME", &mut self.model_name);
        text("VLM_BASE_URL", &mut self.vlm_base_url);
        text("VLM_API_KEY", &mut self.vlm_api_key);
        text("VLM_MODEL_NAME", &mut self.vlm_model_name);
        text("AGENT_LANG", &mut self.lang);

        if let Some(v) = lookup("MOBILE_COMMAND_TIMEOUT_MS") {
            self.command_timeout_ms = parse_or("MOBILE_COMMAND_TIMEOUT_MS", &v, self.command_timeout_ms);
        }
        if let Some(v) = lookup("MOBILE_RETRY_COUNT") {
            self.retry_count = parse_or("MOBILE_RETRY_COUNT", &v, self.retry_count);
        }
        if let Some(v) = lookup("MOBILE_TOOL_DELAY_MS") {
            self.tool_delay_ms = parse_or("MOBILE_TOOL_DELAY_MS", &v, self.tool_delay_ms);
        }
        if let Some(v) = lookup("MOBILE_MAX_ROUNDS") {
            self.max_rounds = parse_or("MOBILE_MAX_ROUNDS", &v, self.max_rounds);
        }
        if let Some(v) = lookup("MOBILE_SUB_AGENT_MAX_ROUNDS") {
            self.sub_agent_max_rounds =
                parse_or("MOBILE_SUB_AGENT_MAX_ROUNDS", &v, self.sub_agent_max_rounds);
        }
        if let Some(v) = lookup("MOBILE_MAX_REPLANS") {
            self.max_replans = parse_or("MOBILE_MAX_REPLANS", &v, self.max_replans);
        }
        if let Some(v) = lookup("MODEL_MAX_RETRIES") {
            self.max_retries = parse_or("MODEL_MAX_RETRIES", &v, self.max_retries);
        }
        if let Some(v) = lookup("MODEL_RETRY_DELAY") {
            self.retry_delay = parse_or("MODEL_RETRY_DELAY", &v, self.retry_delay);
        }
        if let Some(v) = lookup("MOBILE_REPLAN_ON_FAILURE") {
            match parse_flag(&v) {
                Some(flag) => self.replan_on_failure = flag,
                None => tracing::warn!(value = %v, "Ignoring unparsable MOBILE_REPLAN_ON_FAILURE"),
            }
        }
    }

    /// Save settings to the config file.
    pub fn save(&self) -> Result<PathBuf, SettingsError> {
        let dir = Self::config_dir().ok_or(SettingsError::NoConfigDir)?;
        fs::create_dir_all(&dir)?;

        let path = dir.join("settings.json");
        fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }

    pub fn controller_config(&self) -> ControllerConfig {
        let config = ControllerConfig::default()
            .with_timeout_ms(self.command_timeout_ms)
            .with_retry_count(self.retry_count);
        if self.device_id.trim().is_empty() {
            config
        } else {
            config.with_device_id(self.device_id.trim())
        }
    }

    /// Endpoint for text calls.
    pub fn llm_config(&self) -> ModelConfig {
        ModelConfig::default()
            .with_base_url(&self.base_url)
            .with_api_key(&self.api_key)
            .with_model_name(&self.model_name)
            .with_max_retries(self.max_retries)
            .with_retry_delay(self.retry_delay)
    }

    /// Endpoint for vision calls, or `None` when the language model serves them.
    pub fn vlm_config(&self) -> Option<ModelConfig> {
        if self.vlm_base_url.trim().is_empty() {
            return None;
        }
        let api_key = if self.vlm_api_key.is_empty() {
            &self.api_key
        } else {
            &self.vlm_api_key
        };
        Some(
            ModelConfig::default()
                .with_base_url(&self.vlm_base_url)
                .with_api_key(api_key)
                .with_model_name(self.vlm_model())
                .with_max_retries(self.max_retries)
                .with_retry_delay(self.retry_delay),
        )
    }

    fn vlm_model(&self) -> &str {
        if self.vlm_model_name.is_empty() {
            &self.model_name
        } else {
            &self.vlm_model_name
        }
    }

    pub fn agent_options(&self) -> AgentOptions {
        let mode = self.agent_mode.parse().unwrap_or_else(|e: String| {
            tracing::warn!(error = %e, "Falling back to the react strategy");
            AgentMode::React
        });
        AgentOptions {
            mode,
            llm_model: self.model_name.clone(),
            vlm_model: self.vlm_model().to_string(),
            max_rounds: self.max_rounds,
            sub_agent_max_rounds: self.sub_agent_max_rounds,
            replan_on_failure: self.replan_on_failure,
            max_replans: self.max_replans,
        }
    }

    /// The configured app map file, or the bundled map.
    pub fn app_mapper(&self) -> Arc<AppMapper> {
        let mapper = if self.app_map_path.trim().is_empty() {
            AppMapper::bundled()
        } else {
            AppMapper::from_path(self.app_map_path.trim())
        };
        Arc::new(mapper.unwrap_or_else(|e| {
            tracing::warn!(error = %e, path = %self.app_map_path, "App map unavailable, app names will be used literally");
            AppMapper::default()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_env_overrides() {
        let mut settings = AppSettings::default();
        settings.apply_env(lookup(&[
            ("MOBILE_CONTROLLER", "hdc"),
            ("MOBILE_DEVICE_ID", "FMR0223"),
            ("MOBILE_MAX_ROUNDS", "12"),
            ("MOBILE_AGENT_MODE", "hierarchical"),
            ("MOBILE_REPLAN_ON_FAILURE", "false"),
            ("MODEL_NAME", "qwen-max"),
            ("MOBILE_RETRY_COUNT", "lots"),
        ]));

        assert_eq!(settings.controller, "hdc");
        assert_eq!(settings.max_rounds, 12);
        assert!(!settings.replan_on_failure);
        assert_eq!(settings.retry_count, DEFAULT_RETRY_COUNT);
        assert_eq!(
            settings.controller_config().device_id.as_deref(),
            Some("FMR0223")
        );

        let options = settings.agent_options();
        assert_eq!(options.mode, AgentMode::Hierarchical);
        assert_eq!(options.llm_model, "qwen-max");
        assert_eq!(options.vlm_model, "qwen-max");
    }

    #[test]
    fn test_vlm_config_inherits_key() {
        let mut settings = AppSettings::default();
        assert!(settings.vlm_config().is_none());

        settings.api_key = "sk-text".to_string();
        settings.vlm_base_url = "https://vision.example/v1".to_string();
        settings.vlm_model_name = "qwen-vl".to_string();
        let vlm = settings.vlm_config().unwrap();
        assert_eq!(vlm.api_key, "sk-text");
        assert_eq!(vlm.model_name, "qwen-vl");
        assert_eq!(settings.agent_options().vlm_model, "qwen-vl");
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings: AppSettings =
            serde_json::from_str(r#"{"controller": "hdc", "max_replans": 5}"#).unwrap();
        assert_eq!(settings.controller, "hdc");
        assert_eq!(settings.max_replans, 5);
        assert_eq!(settings.max_rounds, DEFAULT_MAX_ROUNDS);
        assert!(settings.controller_config().device_id.is_none());
    }

    #[test]
    fn test_unknown_mode_falls_back() {
        let settings = AppSettings {
            agent_mode: "swarm".to_string(),
            ..AppSettings::default()
        };
        assert_eq!(settings.agent_options().mode, AgentMode::React);
    }

    #[test]
    fn test_missing_app_map_falls_back() {
        let settings = AppSettings {
            app_map_path: "/nonexistent/app_map.yaml".to_string(),
            ..AppSettings::default()
        };
        assert!(settings.app_mapper().resolve("微信", None).is_none());
        assert!(AppSettings::default().app_mapper().resolve("微信", None).is_some());
    }
}
