//! Command runner - spawns step commands as shell subprocesses

use crate::core::Shell;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

/// Error types for runner operations
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to spawn {program}: {message}")]
    Spawn { program: String, message: String },
}

/// One script to run
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    pub shell: &'a Shell,
    pub command: &'a str,
    /// The complete environment of the child; nothing else is inherited
    pub env: &'a BTreeMap<String, String>,
    pub workdir: &'a Path,
}

/// What a finished command produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit status; `-1` when the process was killed by a signal
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn new(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout followed by stderr
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => {
                let mut out = self.stdout.clone();
                if !out.ends_with('\n') {
                    out.push('\n');
                }
                out.push_str(&self.stderr);
                out
            }
        }
    }
}

/// Trait for command execution - allows for different implementations
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run one command to completion
    async fn run(&self, invocation: &Invocation<'_>) -> Result<CommandOutput, RunnerError>;
}

/// Runs commands through a real shell
#[derive(Debug, Clone, Default)]
pub struct ShellRunner;

impl ShellRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, invocation: &Invocation<'_>) -> Result<CommandOutput, RunnerError> {
        let (program, args) = invocation.shell.argv();
        // The script and its output may hold secrets; the executor logs them masked
        debug!(
            "Spawning {} in {} with {} env vars",
            program,
            invocation.workdir.display(),
            invocation.env.len()
        );

        // The child is killed if the surrounding step times out and drops this future
        let output = Command::new(&program)
            .args(&args)
            .arg(invocation.command)
            .env_clear()
            .envs(invocation.env)
            .current_dir(invocation.workdir)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| RunnerError::Spawn {
                program: program.clone(),
                message: e.to_string(),
            })?;

        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if exit_code != 0 {
            warn!("{} exited with code {}", program, exit_code);
        }

        debug!("{} returned {} bytes of output", program, stdout.len() + stderr.len());

        Ok(CommandOutput {
            exit_code,
            stdout,
            stderr,
        })
    }
}
