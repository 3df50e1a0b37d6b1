use crate::core::{Interpreter, Invocation, ProcessRunner};
use crate::utils::error::{LauncherError, Result};
use std::path::{Path, PathBuf};

/// 依 requirements 清單安裝依賴
pub struct DependencyInstaller<'a, R: ProcessRunner + ?Sized> {
    runner: &'a R,
    manifest: PathBuf,
}

impl<'a, R: ProcessRunner + ?Sized> DependencyInstaller<'a, R> {
    pub fn new(runner: &'a R, manifest: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            manifest: manifest.into(),
        }
    }

    pub fn invocation(&self, interpreter: &Path) -> Invocation {
        Invocation::inherited(
            interpreter,
            vec![
                "-m".to_string(),
                "pip".to_string(),
                "install".to_string(),
                "-r".to_string(),
                self.manifest.display().to_string(),
            ],
        )
    }

    pub async fn install(&self, interpreter: &Interpreter) -> Result<()> {
        if !self.manifest.is_file() {
            return Err(LauncherError::InstallFailed {
                reason: format!("manifest not found: {}", self.manifest.display()),
            });
        }

        println!("📦 Installing dependencies from {}...", self.manifest.display());
        tracing::info!("📦 Installing dependencies from {}", self.manifest.display());

        let outcome = self
            .runner
            .run(&self.invocation(&interpreter.path))
            .await
            .map_err(|e| LauncherError::InstallFailed {
                reason: e.to_string(),
            })?;

        if !outcome.success() {
            return Err(LauncherError::InstallFailed {
                reason: match outcome.code {
                    Some(code) => format!("pip exited with code {}", code),
                    None => "pip was terminated by a signal".to_string(),
                },
            });
        }

        tracing::info!("✅ Dependency installation finished");
        Ok(())
    }
}
