use crate::core::{Interpreter, Invocation, ProcessRunner, StepRecord};
use crate::utils::error::{LauncherError, Result};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// 以直譯器執行外部腳本，只觀察結束碼
pub struct TaskInvoker<'a, R: ProcessRunner + ?Sized> {
    runner: &'a R,
    scripts_dir: PathBuf,
}

impl<'a, R: ProcessRunner + ?Sized> TaskInvoker<'a, R> {
    pub fn new(runner: &'a R, scripts_dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            scripts_dir: scripts_dir.into(),
        }
    }

    pub fn script_path(&self, routine: &str) -> PathBuf {
        self.scripts_dir.join(routine)
    }

    pub fn invocation(&self, interpreter: &Path, routine: &str, args: &[String]) -> Invocation {
        let mut full_args = vec![self.script_path(routine).display().to_string()];
        full_args.extend(args.iter().cloned());
        Invocation::inherited(interpreter, full_args)
    }

    /// 執行一次，不重試。非零結束碼記錄在 StepRecord 中由呼叫端判斷
    pub async fn invoke(
        &self,
        interpreter: &Interpreter,
        routine: &str,
        args: &[String],
    ) -> Result<StepRecord> {
        let script = self.script_path(routine);
        if !script.is_file() {
            return Err(LauncherError::RoutineMissing { path: script });
        }

        tracing::info!("🚀 Running {}", routine);
        let start_time = Instant::now();
        let outcome = self
            .runner
            .run(&self.invocation(&interpreter.path, routine, args))
            .await?;
        let duration = start_time.elapsed();

        tracing::info!(
            "Routine {} finished (exit code: {:?}, duration: {:?})",
            routine,
            outcome.code,
            duration
        );

        Ok(StepRecord {
            name: routine.to_string(),
            exit_code: outcome.code,
            duration,
        })
    }
}

impl StepRecord {
    pub fn ensure_success(&self) -> Result<()> {
        if self.exit_code == Some(0) {
            Ok(())
        } else {
            Err(LauncherError::DelegatedTaskFailed {
                routine: self.name.clone(),
                code: self.exit_code,
            })
        }
    }
}
