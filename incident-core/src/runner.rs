use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: Option<String>,
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("command timed out after {seconds}s")]
    Timeout { seconds: u64 },
    #[error("failed to run command: {0}")]
    Io(#[from] std::io::Error),
}

/// Executes one command against the target system.
#[async_trait]
pub trait StepRunner: Send + Sync {
    async fn run(&self, command: &str, timeout: Duration) -> Result<CommandOutput, RunnerError>;
}

/// Runs commands through `sh -c`. The child is killed if the timeout fires.
#[derive(Clone, Debug, Default)]
pub struct ShellStepRunner;

#[async_trait]
impl StepRunner for ShellStepRunner {
    async fn run(&self, command: &str, timeout: Duration) -> Result<CommandOutput, RunnerError> {
        let child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .kill_on_drop(true)
            .output();

        let out = match tokio::time::timeout(timeout, child).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(RunnerError::Timeout {
                    seconds: timeout.as_secs(),
                })
            }
        };

        let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
        Ok(CommandOutput {
            success: out.status.success(),
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: (!stderr.is_empty()).then_some(stderr),
        })
    }
}

/// Reports success for every command without touching anything.
#[derive(Clone, Debug, Default)]
pub struct SimulatedStepRunner;

#[async_trait]
impl StepRunner for SimulatedStepRunner {
    async fn run(&self, command: &str, _timeout: Duration) -> Result<CommandOutput, RunnerError> {
        tracing::debug!(command, "simulated command");
        Ok(CommandOutput {
            success: true,
            stdout: format!("[SIMULATED] Command executed successfully: {command}"),
            stderr: None,
        })
    }
}
