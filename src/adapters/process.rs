use crate::domain::model::{Invocation, RunOutcome};
use crate::domain::ports::ProcessRunner;
use crate::utils::error::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

/// 以 tokio::process 實作的子行程執行器
#[derive(Debug, Clone, Default)]
pub struct TokioProcessRunner {
    working_dir: Option<PathBuf>,
    envs: BTreeMap<String, String>,
}

impl TokioProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_envs(mut self, envs: BTreeMap<String, String>) -> Self {
        self.envs.extend(envs);
        self
    }

    fn command(&self, invocation: &Invocation) -> Command {
        let mut command = Command::new(&invocation.program);
        command.args(&invocation.args).envs(&self.envs);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        command
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    fn locate(&self, program: &str) -> Option<PathBuf> {
        which::which(program).ok()
    }

    async fn run(&self, invocation: &Invocation) -> Result<RunOutcome> {
        tracing::debug!("▶️ {}", invocation.command_line());
        let mut command = self.command(invocation);

        if invocation.capture {
            let output = command
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output()
                .await?;

            Ok(RunOutcome {
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        } else {
            let status = command.status().await?;

            Ok(RunOutcome {
                code: status.code(),
                ..RunOutcome::default()
            })
        }
    }
}
