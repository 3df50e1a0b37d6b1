use crate::config::toml_config::LauncherConfig;
use crate::core::installer::DependencyInstaller;
use crate::core::invoker::TaskInvoker;
use crate::core::precheck::EnvironmentPrechecker;
use crate::core::{
    FlowKind, Interpreter, Invocation, LaunchReport, LaunchState, ProcessRunner,
};
use crate::utils::error::{LauncherError, Result};
use std::path::{Path, PathBuf};

/// 標記腳本本身的預設工作表
const ROUTINE_DEFAULT_SHEET: &str = "Sheet1";

/// 轉換腳本的命令列模式參數；沒有 input 時不傳任何參數
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConvertArgs {
    pub input: Option<String>,
    pub output: Option<String>,
    pub routine_config: Option<String>,
    pub no_summary: bool,
}

impl ConvertArgs {
    pub fn routine_args(&self) -> Vec<String> {
        let Some(input) = &self.input else {
            return Vec::new();
        };

        let mut args = vec![input.clone(), "--no-gui".to_string()];
        if let Some(output) = &self.output {
            args.push("-o".to_string());
            args.push(output.clone());
        }
        if let Some(config) = &self.routine_config {
            args.push("-c".to_string());
            args.push(config.clone());
        }
        if self.no_summary {
            args.push("--no-summary".to_string());
        }
        args
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkArgs {
    pub file: String,
    pub sheet: Option<String>,
    pub output: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowRequest {
    TestFlow,
    Convert(ConvertArgs),
    Mark(MarkArgs),
}

impl FlowRequest {
    pub fn kind(&self) -> FlowKind {
        match self {
            FlowRequest::TestFlow => FlowKind::TestFlow,
            FlowRequest::Convert(_) => FlowKind::Convert,
            FlowRequest::Mark(_) => FlowKind::Mark,
        }
    }
}

/// 流程中的一個委派步驟
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStep {
    pub routine: String,
    pub args: Vec<String>,
    /// 執行前必須存在的輸入檔
    pub requires: Option<PathBuf>,
    /// 執行後預期產生的檔案
    pub produces: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowPlan {
    pub dependencies: Vec<String>,
    pub steps: Vec<PlannedStep>,
}

/// 一次流程執行的結果；錯誤已反映在 report 的 final_state
#[derive(Debug)]
pub struct LaunchOutcome {
    pub report: LaunchReport,
    pub error: Option<LauncherError>,
}

impl LaunchOutcome {
    /// 流程開始前就失敗 (例如找不到活頁簿) 時的報告
    pub fn halted(flow: FlowKind, error: LauncherError) -> Self {
        FlowRun::new(flow).finish(Err(error))
    }

    pub fn exit_code(&self) -> u8 {
        self.error.as_ref().map_or(0, LauncherError::exit_code)
    }

    pub fn into_result(self) -> Result<LaunchReport> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.report),
        }
    }
}

/// check 指令的結果；status 在直譯器或安裝失敗時為 None
#[derive(Debug)]
pub struct CheckOutcome {
    pub outcome: LaunchOutcome,
    pub status: Option<EnvironmentStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyStatus {
    pub name: String,
    pub available: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentStatus {
    pub interpreter: Interpreter,
    pub dependencies: Vec<DependencyStatus>,
    pub installed: bool,
}

impl EnvironmentStatus {
    pub fn missing(&self) -> Vec<String> {
        self.dependencies
            .iter()
            .filter(|dep| !dep.available)
            .map(|dep| dep.name.clone())
            .collect()
    }

    pub fn ensure_complete(&self) -> Result<()> {
        let missing = self.missing();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(LauncherError::DependencyMissing { names: missing })
        }
    }
}

struct FlowRun {
    state: LaunchState,
    report: LaunchReport,
}

impl FlowRun {
    fn new(flow: FlowKind) -> Self {
        Self {
            state: LaunchState::Start,
            report: LaunchReport::new(flow),
        }
    }

    fn transition(&mut self, next: LaunchState) {
        tracing::debug!("{}: {} -> {}", self.report.flow, self.state, next);
        self.state = next;
        self.report.final_state = next;
    }

    fn finish(mut self, result: Result<()>) -> LaunchOutcome {
        match &result {
            Ok(()) => {
                self.transition(LaunchState::Done);
                tracing::info!("✅ {} finished", self.report.flow);
            }
            Err(e) => {
                self.transition(LaunchState::Halt);
                self.report.error = Some(e.to_string());
                tracing::error!("❌ {} halted: {}", self.report.flow, e);
            }
        }

        LaunchOutcome {
            report: self.report,
            error: result.err(),
        }
    }
}

/// 啟動器：環境檢查後依序執行委派腳本，任何失敗都停止後續步驟
pub struct Launcher<R: ProcessRunner> {
    runner: R,
    config: LauncherConfig,
}

impl<R: ProcessRunner> Launcher<R> {
    pub fn new(runner: R, config: LauncherConfig) -> Self {
        Self { runner, config }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn config(&self) -> &LauncherConfig {
        &self.config
    }

    fn prechecker(&self) -> EnvironmentPrechecker<'_, R> {
        EnvironmentPrechecker::new(&self.runner, &self.config.interpreter)
    }

    fn installer(&self) -> DependencyInstaller<'_, R> {
        DependencyInstaller::new(&self.runner, self.config.manifest_path())
    }

    fn invoker(&self) -> TaskInvoker<'_, R> {
        TaskInvoker::new(&self.runner, self.config.scripts_dir())
    }

    pub fn plan(&self, request: &FlowRequest) -> FlowPlan {
        let config = &self.config;

        match request {
            FlowRequest::TestFlow => {
                let flow = &config.test_flow;
                FlowPlan {
                    dependencies: flow.dependencies.clone(),
                    steps: vec![
                        PlannedStep {
                            routine: flow.generator.clone(),
                            args: Vec::new(),
                            requires: None,
                            produces: Some(config.resolve(Path::new(&flow.input))),
                        },
                        PlannedStep {
                            routine: flow.marker.clone(),
                            args: vec![flow.input.clone(), "-o".to_string(), flow.output.clone()],
                            requires: Some(config.resolve(Path::new(&flow.input))),
                            produces: Some(config.resolve(Path::new(&flow.output))),
                        },
                    ],
                }
            }
            FlowRequest::Convert(args) => FlowPlan {
                dependencies: config.convert.dependencies.clone(),
                steps: vec![PlannedStep {
                    routine: config.convert.routine.clone(),
                    args: args.routine_args(),
                    requires: args.input.as_ref().map(|input| config.resolve(Path::new(input))),
                    produces: args
                        .input
                        .as_ref()
                        .and(args.output.as_ref())
                        .map(|output| config.resolve(Path::new(output))),
                }],
            },
            FlowRequest::Mark(args) => {
                let sheet = args.sheet.as_deref().unwrap_or(&config.mark.sheet);
                let mut routine_args = vec![args.file.clone()];
                if sheet != ROUTINE_DEFAULT_SHEET {
                    routine_args.push("-s".to_string());
                    routine_args.push(sheet.to_string());
                }
                if let Some(output) = &args.output {
                    routine_args.push("-o".to_string());
                    routine_args.push(output.clone());
                }

                FlowPlan {
                    dependencies: config.mark.dependencies.clone(),
                    steps: vec![PlannedStep {
                        routine: config.mark.routine.clone(),
                        args: routine_args,
                        requires: Some(config.resolve(Path::new(&args.file))),
                        produces: args.output.as_ref().map(|output| config.resolve(Path::new(output))),
                    }],
                }
            }
        }
    }

    /// dry run 用：列出流程會執行的命令，不啟動任何子行程
    pub fn describe(&self, request: &FlowRequest) -> Vec<String> {
        let plan = self.plan(request);
        let interpreter = self.display_interpreter();
        let mut lines = vec![Invocation::captured(&interpreter, vec!["--version".to_string()])
            .command_line()];

        for name in &plan.dependencies {
            lines.push(
                Invocation::captured(&interpreter, vec!["-c".to_string(), format!("import {}", name)])
                    .command_line(),
            );
        }
        if !plan.dependencies.is_empty() {
            lines.push(format!(
                "{}  (only if an import fails)",
                self.installer().invocation(&interpreter).command_line()
            ));
        }

        let invoker = self.invoker();
        for step in &plan.steps {
            lines.push(
                invoker
                    .invocation(&interpreter, &step.routine, &step.args)
                    .command_line(),
            );
        }
        lines
    }

    fn display_interpreter(&self) -> PathBuf {
        let interpreter = &self.config.interpreter;
        interpreter
            .path
            .clone()
            .or_else(|| {
                interpreter
                    .candidates
                    .iter()
                    .find_map(|candidate| self.runner.locate(candidate))
            })
            .or_else(|| interpreter.candidates.first().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("python"))
    }

    pub async fn launch(&self, request: &FlowRequest) -> LaunchOutcome {
        let mut run = FlowRun::new(request.kind());
        let plan = self.plan(request);

        let result = self.execute(&plan, &mut run).await;
        run.finish(result)
    }

    async fn execute(&self, plan: &FlowPlan, run: &mut FlowRun) -> Result<()> {
        run.transition(LaunchState::CheckEnv);
        let prechecker = self.prechecker();
        let interpreter = prechecker.check_interpreter().await?;
        run.report.interpreter = Some(interpreter.clone());

        if !plan.dependencies.is_empty() {
            let installer = self.installer();
            let check = prechecker
                .check_dependencies(&interpreter, &plan.dependencies, &installer)
                .await?;
            run.report.installed = check.installed;
        }

        run.transition(LaunchState::Invoke);
        let invoker = self.invoker();

        for step in &plan.steps {
            if let Some(required) = &step.requires {
                if !required.exists() {
                    return Err(LauncherError::MissingInput {
                        path: required.clone(),
                    });
                }
            }

            let record = invoker
                .invoke(&interpreter, &step.routine, &step.args)
                .await?;
            run.report.steps.push(record.clone());
            record.ensure_success()?;

            if let Some(produced) = &step.produces {
                if produced.exists() {
                    tracing::info!("📁 Output: {}", produced.display());
                } else {
                    tracing::warn!(
                        "⚠️ {} succeeded but {} was not found",
                        step.routine,
                        produced.display()
                    );
                }
            }
        }

        Ok(())
    }

    /// check 指令：環境檢查並產生報告，任何依賴缺少即為 HALT
    pub async fn check(&self, install: bool) -> CheckOutcome {
        let mut run = FlowRun::new(FlowKind::Check);
        run.transition(LaunchState::CheckEnv);

        let (status, result) = match self.check_environment(install).await {
            Ok(status) => {
                run.report.interpreter = Some(status.interpreter.clone());
                run.report.installed = status.installed;
                let result = status.ensure_complete();
                (Some(status), result)
            }
            Err(e) => (None, Err(e)),
        };

        CheckOutcome {
            outcome: run.finish(result),
            status,
        }
    }

    /// 只做環境檢查；install 為 true 時缺少的依賴會安裝一次
    pub async fn check_environment(&self, install: bool) -> Result<EnvironmentStatus> {
        let prechecker = self.prechecker();
        let interpreter = prechecker.check_interpreter().await?;
        let names = self.config.all_dependencies();

        let mut missing = prechecker.probe_dependencies(&interpreter, &names).await;
        let mut installed = false;
        if install && !missing.is_empty() {
            self.installer().install(&interpreter).await?;
            installed = true;
            missing = prechecker.probe_dependencies(&interpreter, &missing).await;
        }

        let dependencies = names
            .into_iter()
            .map(|name| DependencyStatus {
                available: !missing.contains(&name),
                name,
            })
            .collect();

        Ok(EnvironmentStatus {
            interpreter,
            dependencies,
            installed,
        })
    }
}

/// 將執行報告寫成 JSON
pub fn write_report(report: &LaunchReport, path: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(report)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, content)?;
    Ok(())
}
