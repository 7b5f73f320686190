//! Bounded invocation of a device bridge executable.

use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use super::{ControllerConfig, DeviceError};

/// Runs a bridge executable (`adb`, `hdc`) with a device selector prefix and a timeout.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    program: String,
    prefix: Vec<String>,
    timeout_ms: u64,
}

impl CommandRunner {
    /// # Arguments
    /// * `program` - Path or name of the bridge executable.
    /// * `device_flag` - Selector flag placed before the device id (`-s` for adb, `-t` for hdc).
    /// * `config` - Controller configuration supplying the device id and timeout.
    pub fn new(program: impl Into<String>, device_flag: &str, config: &ControllerConfig) -> Self {
        let prefix = match &config.device_id {
            Some(id) if !id.is_empty() => vec![device_flag.to_string(), id.clone()],
            _ => Vec::new(),
        };
        Self {
            program: program.into(),
            prefix,
            timeout_ms: config.timeout_ms,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Full argument vector for a subcommand, device selector first.
    pub fn build_args(&self, args: &[&str]) -> Vec<String> {
        self.prefix
            .iter()
            .cloned()
            .chain(args.iter().map(|a| a.to_string()))
            .collect()
    }

    /// Run a subcommand and return its raw stdout.
    ///
    /// Fails on spawn errors, non-zero exit status, or when the timeout elapses.
    pub async fn run(&self, args: &[&str]) -> Result<Vec<u8>, DeviceError> {
        let full_args = self.build_args(args);
        let rendered = format!("{} {}", self.program, full_args.join(" "));
        debug!(command = %rendered, "running device command");

        let child = Command::new(&self.program)
            .args(&full_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| DeviceError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let output = tokio::time::timeout(
            Duration::from_millis(self.timeout_ms),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| DeviceError::Timeout(rendered.clone(), self.timeout_ms))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let stderr = if stderr.is_empty() {
                String::from_utf8_lossy(&output.stdout).trim().to_string()
            } else {
                stderr
            };
            return Err(DeviceError::CommandFailed {
                command: rendered,
                code: output.status.code(),
                stderr,
            });
        }

        Ok(output.stdout)
    }

    /// Run a subcommand and decode stdout as (lossy) UTF-8.
    pub async fn run_text(&self, args: &[&str]) -> Result<String, DeviceError> {
        let stdout = self.run(args).await?;
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }
}
