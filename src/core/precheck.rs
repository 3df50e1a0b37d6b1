use crate::config::toml_config::InterpreterConfig;
use crate::core::installer::DependencyInstaller;
use crate::core::{Interpreter, Invocation, ProcessRunner};
use crate::utils::error::{LauncherError, Result};
use std::path::PathBuf;

/// 依賴檢查結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyCheck {
    /// 檢查期間是否執行過安裝
    pub installed: bool,
}

/// 環境預檢：直譯器可用、依賴可匯入
pub struct EnvironmentPrechecker<'a, R: ProcessRunner + ?Sized> {
    runner: &'a R,
    interpreter: &'a InterpreterConfig,
}

impl<'a, R: ProcessRunner + ?Sized> EnvironmentPrechecker<'a, R> {
    pub fn new(runner: &'a R, interpreter: &'a InterpreterConfig) -> Self {
        Self {
            runner,
            interpreter,
        }
    }

    /// 解析直譯器並以 `--version` 確認可以執行
    pub async fn check_interpreter(&self) -> Result<Interpreter> {
        for path in self.candidate_paths() {
            let invocation = Invocation::captured(&path, vec!["--version".to_string()]);

            match self.runner.run(&invocation).await {
                Ok(outcome) if outcome.success() => {
                    // Python 2 把版本寫到 stderr
                    let version = first_line(&outcome.stdout)
                        .or_else(|| first_line(&outcome.stderr))
                        .unwrap_or_else(|| "unknown version".to_string());

                    tracing::info!("✅ Interpreter: {} ({})", path.display(), version);
                    return Ok(Interpreter { path, version });
                }
                Ok(outcome) => {
                    tracing::debug!(
                        "Candidate {} rejected: --version exited with {:?}",
                        path.display(),
                        outcome.code
                    );
                }
                Err(e) => {
                    tracing::debug!("Candidate {} could not start: {}", path.display(), e);
                }
            }
        }

        Err(LauncherError::InterpreterMissing {
            tried: self.tried_description(),
        })
    }

    /// 逐一嘗試匯入，回傳缺少的模組；無法啟動的匯入也算缺少
    pub async fn probe_dependencies(
        &self,
        interpreter: &Interpreter,
        names: &[String],
    ) -> Vec<String> {
        let mut missing = Vec::new();

        for name in names {
            let invocation = Invocation::captured(
                &interpreter.path,
                vec!["-c".to_string(), format!("import {}", name)],
            );
            match self.runner.run(&invocation).await {
                Ok(outcome) if outcome.success() => {
                    tracing::debug!("Dependency available: {}", name);
                }
                Ok(outcome) => {
                    tracing::debug!("Dependency missing: {} ({})", name, outcome.stderr.trim());
                    missing.push(name.clone());
                }
                Err(e) => {
                    tracing::debug!("Dependency probe for {} could not start: {}", name, e);
                    missing.push(name.clone());
                }
            }
        }

        missing
    }

    /// 缺少依賴時觸發一次安裝，安裝後重新確認
    pub async fn check_dependencies(
        &self,
        interpreter: &Interpreter,
        names: &[String],
        installer: &DependencyInstaller<'_, R>,
    ) -> Result<DependencyCheck> {
        if names.is_empty() {
            return Ok(DependencyCheck { installed: false });
        }

        let missing = self.probe_dependencies(interpreter, names).await;
        if missing.is_empty() {
            tracing::info!("✅ Dependencies available: {}", names.join(", "));
            return Ok(DependencyCheck { installed: false });
        }

        tracing::warn!("⚠️ Missing dependencies: {}", missing.join(", "));
        installer.install(interpreter).await?;

        let still_missing = self.probe_dependencies(interpreter, &missing).await;
        if !still_missing.is_empty() {
            return Err(LauncherError::DependencyMissing {
                names: still_missing,
            });
        }

        tracing::info!("✅ Dependencies installed: {}", missing.join(", "));
        Ok(DependencyCheck { installed: true })
    }

    fn candidate_paths(&self) -> Vec<PathBuf> {
        match &self.interpreter.path {
            Some(path) => vec![path.clone()],
            None => self
                .interpreter
                .candidates
                .iter()
                .filter_map(|candidate| self.runner.locate(candidate))
                .collect(),
        }
    }

    fn tried_description(&self) -> String {
        match &self.interpreter.path {
            Some(path) => path.display().to_string(),
            None => self.interpreter.candidates.join(", "),
        }
    }
}

fn first_line(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}
